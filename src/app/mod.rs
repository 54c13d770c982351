use crate::pages::NotesPage;
use crate::state::note_sync::NoteSyncController;
use crate::state::{AppContext, AppState};
use leptos::prelude::*;
use leptos_router::components::{Route, Router, Routes};
use leptos_router::path;

#[component]
pub fn App() -> impl IntoView {
    let app_context = AppContext(AppState::new());
    provide_context(app_context.clone());

    // One autosave controller for the whole app lifetime; pages reach it
    // through context.
    provide_context(NoteSyncController::new(app_context));

    // IMPORTANT:
    // - Leptos CSR requires the `csr` feature on `leptos`.
    // - router hooks require a <Router> context.
    view! {
        <Router>
            <Routes fallback=|| view! { <div class="px-4 py-8 text-xs text-muted-foreground">"Not found"</div> }>
                <Route path=path!("note/:note_id") view=NotesPage />
                <Route path=path!("") view=NotesPage />
            </Routes>
        </Router>
    }
}
