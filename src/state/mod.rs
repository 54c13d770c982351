pub(crate) mod note_sync;

use crate::api::ApiClient;
use crate::models::{Category, Note};
use crate::storage::SIDEBAR_COLLAPSED_KEY;
use leptos::prelude::*;

#[derive(Clone)]
pub(crate) struct AppState {
    pub api_client: RwSignal<ApiClient>,

    /// Loaded from the note registry, in server order.
    pub notes: RwSignal<Vec<Note>>,
    pub notes_loading: RwSignal<bool>,
    pub notes_error: RwSignal<Option<String>>,

    pub categories: RwSignal<Vec<Category>>,

    /// The note bound to the current editing session (None while a fresh
    /// unsaved note is open).
    pub active_note_id: RwSignal<Option<String>>,

    /// Working copy of the active note; may run ahead of the registry
    /// until the next successful autosave.
    pub working_title: RwSignal<String>,
    pub working_content: RwSignal<String>,

    /// Sidebar search query (filters title + plain-text content locally).
    pub search_query: RwSignal<String>,

    pub sidebar_collapsed: RwSignal<bool>,

    /// One-line non-blocking notification (autosave failures etc.).
    pub notice: RwSignal<Option<String>>,
}

impl AppState {
    pub fn new() -> Self {
        let sidebar_collapsed = web_sys::window()
            .and_then(|w| w.local_storage().ok().flatten())
            .and_then(|s| s.get_item(SIDEBAR_COLLAPSED_KEY).ok().flatten())
            .map(|v| v == "1" || v == "true")
            .unwrap_or(false);

        Self {
            api_client: RwSignal::new(ApiClient::from_env()),
            notes: RwSignal::new(vec![]),
            notes_loading: RwSignal::new(false),
            notes_error: RwSignal::new(None),
            categories: RwSignal::new(vec![]),
            active_note_id: RwSignal::new(None),
            working_title: RwSignal::new(String::new()),
            working_content: RwSignal::new(String::new()),
            search_query: RwSignal::new(String::new()),
            sidebar_collapsed: RwSignal::new(sidebar_collapsed),
            notice: RwSignal::new(None),
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone)]
pub(crate) struct AppContext(pub AppState);
