use serde::{Deserialize, Serialize};

/// A persisted note record. The backend is the system of record; the copy
/// held by the editing session is a working copy that may run ahead of it
/// until the next successful save.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub(crate) struct Note {
    pub id: String,
    pub title: String,

    /// Serialized document markup (see `doc::codec`).
    pub content: String,

    pub created_at: String,
    pub updated_at: String,

    #[serde(default)]
    pub tags: Vec<String>,

    #[serde(default)]
    pub category_id: Option<String>,

    #[serde(default)]
    pub is_starred: bool,

    /// Manual sort key within the note list.
    #[serde(default)]
    pub order: i64,
}

impl Note {
    pub fn display_title(&self) -> &str {
        let t = self.title.trim();
        if t.is_empty() {
            "Untitled"
        } else {
            t
        }
    }
}

/// Categories form a forest via `parent_id`. A note references a category by
/// id but does not own it; deleting a category leaves its notes uncategorized.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Category {
    pub id: String,
    pub name: String,

    #[serde(default)]
    pub parent_id: Option<String>,

    #[serde(default)]
    pub order: i64,
}

/// Partial update payload for `update_note`. Absent fields are left
/// untouched by the backend.
#[derive(Serialize, Clone, Debug, Default)]
pub(crate) struct NoteUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,

    /// `Some(None)` clears the category (serialized as an explicit null);
    /// `None` leaves it untouched (omitted from the payload).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category_id: Option<Option<String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_starred: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub order: Option<i64>,
}
