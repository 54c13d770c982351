use crate::util::now_ms;
use serde::{Deserialize, Serialize};

pub(crate) const SIDEBAR_COLLAPSED_KEY: &str = "scribenote_sidebar_collapsed";
pub(crate) const WORKING_COPY_KEY: &str = "scribenote_working_copy";

pub(crate) fn load_json_from_storage<T: for<'de> Deserialize<'de>>(key: &str) -> Option<T> {
    let storage = web_sys::window().and_then(|w| w.local_storage().ok().flatten())?;
    let json = storage.get_item(key).ok().flatten()?;
    serde_json::from_str(&json).ok()
}

pub(crate) fn save_json_to_storage<T: Serialize>(key: &str, value: &T) {
    if let Ok(json) = serde_json::to_string(value) {
        if let Some(storage) = web_sys::window().and_then(|w| w.local_storage().ok().flatten()) {
            let _ = storage.set_item(key, &json);
        }
    }
}

pub(crate) fn remove_from_storage(key: &str) {
    if let Some(storage) = web_sys::window().and_then(|w| w.local_storage().ok().flatten()) {
        let _ = storage.remove_item(key);
    }
}

/// Mirror of the active note's unsaved state. Written on every edit so a
/// crashed or closed tab can offer recovery when the same note is reopened.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub(crate) struct WorkingCopy {
    pub saved_ms: i64,

    /// Absent while the session has no server-side note yet.
    #[serde(default)]
    pub note_id: Option<String>,

    pub title: String,
    pub content: String,
}

pub(crate) fn save_working_copy(note_id: Option<&str>, title: &str, content: &str) {
    let copy = WorkingCopy {
        saved_ms: now_ms(),
        note_id: note_id.map(|s| s.to_string()),
        title: title.to_string(),
        content: content.to_string(),
    };
    save_json_to_storage(WORKING_COPY_KEY, &copy);
}

pub(crate) fn load_working_copy() -> Option<WorkingCopy> {
    load_json_from_storage::<WorkingCopy>(WORKING_COPY_KEY)
}

pub(crate) fn clear_working_copy() {
    remove_from_storage(WORKING_COPY_KEY);
}

/// The backup is only worth offering when it is newer than the persisted
/// record and actually differs from it.
pub(crate) fn recoverable_working_copy(
    note_id: &str,
    server_title: &str,
    server_content: &str,
) -> Option<WorkingCopy> {
    let copy = load_working_copy()?;
    if copy.note_id.as_deref() != Some(note_id) {
        return None;
    }
    if copy.title == server_title && copy.content == server_content {
        return None;
    }
    Some(copy)
}
