mod api;
mod app;
mod components;
mod doc;
mod editor;
mod export;
mod models;
mod pages;
mod state;
mod storage;
mod util;

use crate::app::App;
use leptos::prelude::*;

// Needed for `#[wasm_bindgen(start)]` on the wasm entrypoint.
#[cfg(all(target_arch = "wasm32", not(test)))]
use wasm_bindgen::prelude::wasm_bindgen;

// WASM-only tests (run with `cargo test --target wasm32-unknown-unknown` + wasm-bindgen-test-runner)
#[cfg(all(test, target_arch = "wasm32"))]
mod wasm_tests {
    use crate::storage::{
        clear_working_copy, load_working_copy, recoverable_working_copy, save_working_copy,
    };
    use wasm_bindgen_test::*;

    wasm_bindgen_test_configure!(run_in_browser);

    #[wasm_bindgen_test]
    fn test_working_copy_storage_roundtrip() {
        clear_working_copy();
        assert!(load_working_copy().is_none());

        save_working_copy(Some("n1"), "Title", "<p>body</p>");
        let copy = load_working_copy().expect("working copy should load");
        assert_eq!(copy.note_id.as_deref(), Some("n1"));
        assert_eq!(copy.title, "Title");
        assert_eq!(copy.content, "<p>body</p>");

        clear_working_copy();
        assert!(load_working_copy().is_none());
    }

    #[wasm_bindgen_test]
    fn test_recoverable_working_copy_requires_divergence() {
        clear_working_copy();
        save_working_copy(Some("n1"), "Title", "<p>local</p>");

        // Same content as the server: nothing to recover.
        assert!(recoverable_working_copy("n1", "Title", "<p>local</p>").is_none());
        // Different note: not ours.
        assert!(recoverable_working_copy("n2", "Other", "<p>x</p>").is_none());
        // Diverged: offer the backup.
        let copy = recoverable_working_copy("n1", "Title", "<p>server</p>")
            .expect("diverged copy should be offered");
        assert_eq!(copy.content, "<p>local</p>");

        clear_working_copy();
    }
}

// Only register the WASM start function for normal builds (not for tests),
// otherwise wasm-bindgen-test will end up with multiple entry symbols.
#[cfg_attr(all(target_arch = "wasm32", not(test)), wasm_bindgen(start))]
pub fn main() {
    console_error_panic_hook::set_once();
    mount_to_body(App);
}
