use crate::api::{ApiError, ApiErrorKind};
use crate::models::{Note, NoteUpdate};
use crate::state::AppContext;
use crate::storage::save_working_copy;
use leptos::prelude::*;
use leptos::task::spawn_local;
use std::sync::{Arc, Mutex};
use wasm_bindgen::JsCast;

pub(crate) const AUTOSAVE_DEBOUNCE_MS: i32 = 1000;

/// Save lifecycle of the active editing session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum SaveState {
    Idle,
    /// Local change not yet scheduled (only while a save is in flight).
    Dirty,
    /// Debounce timer running.
    Scheduled,
    /// Persistence call in flight.
    Saving,
    Error,
}

/// Create and update debounces run on separate lanes: while no note id is
/// bound to the session, edits schedule a create; afterwards they schedule
/// updates. Each lane owns at most one timer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum SaveLane {
    Create,
    Update,
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum SyncEvent {
    Edited { title: String, content: String },
    TimerFired(SaveLane),
    SaveDone { epoch: u64, record: Note },
    SaveFailed {
        epoch: u64,
        missing: bool,
        message: String,
    },
    NoteSwitched { note: Option<Note> },
    ManualSave,
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum SyncAction {
    StartTimer(SaveLane),
    CancelTimer(SaveLane),
    Save {
        epoch: u64,
        lane: SaveLane,
        note_id: Option<String>,
        title: String,
        content: String,
    },
    /// Replace the session's working copy with the server record (and the
    /// registry entry). With `keep_local_edits` the editor text is left
    /// alone because newer local changes exist; only id/timestamps bind.
    Adopt {
        record: Note,
        keep_local_edits: bool,
    },
    /// Refresh the note's entry in the registry's collection view only.
    /// Used when a save for a note the user has already left resolves: its
    /// result must not clobber the now-active session.
    TouchRegistry { record: Note },
    Notify { message: String },
}

/// The decision core of the autosave controller, with no timers or I/O of
/// its own: events in, actions out. Everything time- or network-dependent
/// is owned by `NoteSyncController`, which keeps this machine testable.
pub(crate) struct AutosaveMachine {
    /// Bumped on every note switch. In-flight saves carry the epoch they
    /// were issued under; a mismatch marks their response as belonging to
    /// a session the user has left.
    epoch: u64,
    state: SaveState,
    note_id: Option<String>,
    title: String,
    content: String,
    /// Local changes not yet carried by any save call.
    dirty: bool,
    timer: Option<SaveLane>,
}

impl AutosaveMachine {
    pub fn new(note: Option<&Note>) -> Self {
        Self {
            epoch: 0,
            state: SaveState::Idle,
            note_id: note.map(|n| n.id.clone()),
            title: note.map(|n| n.title.clone()).unwrap_or_default(),
            content: note.map(|n| n.content.clone()).unwrap_or_default(),
            dirty: false,
            timer: None,
        }
    }

    pub fn state(&self) -> SaveState {
        self.state
    }

    pub fn note_id(&self) -> Option<&str> {
        self.note_id.as_deref()
    }

    fn lane(&self) -> SaveLane {
        if self.note_id.is_none() {
            SaveLane::Create
        } else {
            SaveLane::Update
        }
    }

    fn schedule(&mut self, actions: &mut Vec<SyncAction>) {
        if let Some(old) = self.timer.take() {
            actions.push(SyncAction::CancelTimer(old));
        }
        let lane = self.lane();
        self.timer = Some(lane);
        self.state = SaveState::Scheduled;
        actions.push(SyncAction::StartTimer(lane));
    }

    fn fire(&mut self, lane: SaveLane, actions: &mut Vec<SyncAction>) {
        self.state = SaveState::Saving;
        self.dirty = false;
        actions.push(SyncAction::Save {
            epoch: self.epoch,
            lane,
            note_id: self.note_id.clone(),
            title: self.title.clone(),
            content: self.content.clone(),
        });
    }

    pub fn on_event(&mut self, event: SyncEvent) -> Vec<SyncAction> {
        let mut actions = Vec::new();

        match event {
            SyncEvent::Edited { title, content } => {
                self.title = title;
                self.content = content;
                self.dirty = true;

                match self.state {
                    // A save is in flight: the edit queues; dirtiness is
                    // re-evaluated when the call resolves. Never two
                    // in-flight calls for one note.
                    SaveState::Saving => self.state = SaveState::Dirty,
                    SaveState::Dirty => {}
                    _ => self.schedule(&mut actions),
                }
            }

            SyncEvent::TimerFired(lane) => {
                // Stale timers (cancelled or superseded) are ignored.
                if self.state != SaveState::Scheduled || self.timer != Some(lane) {
                    return actions;
                }
                self.timer = None;
                self.fire(lane, &mut actions);
            }

            SyncEvent::ManualSave => match self.state {
                SaveState::Saving | SaveState::Dirty => {}
                SaveState::Idle if !self.dirty => {}
                _ => {
                    if let Some(old) = self.timer.take() {
                        actions.push(SyncAction::CancelTimer(old));
                    }
                    let lane = self.lane();
                    self.fire(lane, &mut actions);
                }
            },

            SyncEvent::SaveDone { epoch, record } => {
                if epoch != self.epoch {
                    // The user switched notes while this save was in
                    // flight; only the collection view may learn about it.
                    actions.push(SyncAction::TouchRegistry { record });
                    return actions;
                }

                // The returned id binds the session from now on (this is
                // what turns a pending create into updates).
                self.note_id = Some(record.id.clone());

                if self.dirty {
                    // Edits arrived while the call was in flight: adopt the
                    // server identity but keep the local text, and schedule
                    // the queued update.
                    actions.push(SyncAction::Adopt {
                        record,
                        keep_local_edits: true,
                    });
                    self.schedule(&mut actions);
                } else {
                    self.title = record.title.clone();
                    self.content = record.content.clone();
                    self.state = SaveState::Idle;
                    actions.push(SyncAction::Adopt {
                        record,
                        keep_local_edits: false,
                    });
                }
            }

            SyncEvent::SaveFailed {
                epoch,
                missing,
                message,
            } => {
                if epoch != self.epoch {
                    actions.push(SyncAction::Notify { message });
                    return actions;
                }

                // Local working copy is retained; no automatic retry. The
                // next edit or a manual save re-enters the cycle.
                self.state = SaveState::Error;
                self.dirty = true;
                if missing {
                    // The note vanished server-side; unbinding the id lets
                    // the next save re-create it.
                    self.note_id = None;
                }
                actions.push(SyncAction::Notify { message });
            }

            SyncEvent::NoteSwitched { note } => {
                if let Some(old) = self.timer.take() {
                    actions.push(SyncAction::CancelTimer(old));
                }
                // In-flight saves are left to complete; bumping the epoch
                // makes their eventual response stale.
                self.epoch += 1;
                self.state = SaveState::Idle;
                self.dirty = false;
                self.note_id = note.as_ref().map(|n| n.id.clone());
                self.title = note.as_ref().map(|n| n.title.clone()).unwrap_or_default();
                self.content = note.map(|n| n.content).unwrap_or_default();
            }
        }

        actions
    }
}

/// Browser half of the autosave controller: owns the debounce timer handles
/// and runs persistence calls, feeding their outcomes back into the
/// machine.
#[derive(Clone)]
pub(crate) struct NoteSyncController {
    app_state: AppContext,
    machine: Arc<Mutex<AutosaveMachine>>,

    autosave_ms: i32,
    create_timer: Arc<Mutex<Option<i32>>>,
    update_timer: Arc<Mutex<Option<i32>>>,
}

impl NoteSyncController {
    pub fn new(app_state: AppContext) -> Self {
        Self {
            app_state,
            machine: Arc::new(Mutex::new(AutosaveMachine::new(None))),
            autosave_ms: AUTOSAVE_DEBOUNCE_MS,
            create_timer: Arc::new(Mutex::new(None)),
            update_timer: Arc::new(Mutex::new(None)),
        }
    }

    pub fn save_state(&self) -> SaveState {
        self.machine
            .lock()
            .map(|m| m.state())
            .unwrap_or(SaveState::Idle)
    }

    /// Called by the editor page on every title/content change.
    pub fn on_note_changed(&self, title: &str, content: &str) {
        let note_id = self
            .machine
            .lock()
            .ok()
            .and_then(|m| m.note_id().map(|s| s.to_string()));
        save_working_copy(note_id.as_deref(), title, content);

        self.dispatch(SyncEvent::Edited {
            title: title.to_string(),
            content: content.to_string(),
        });
    }

    /// Called when the user selects another note (or starts a fresh one).
    pub fn set_active_note(&self, note: Option<Note>) {
        self.dispatch(SyncEvent::NoteSwitched { note });
    }

    /// Explicit save (mod+S / toolbar), skipping the debounce.
    pub fn save_now(&self) {
        self.dispatch(SyncEvent::ManualSave);
    }

    fn dispatch(&self, event: SyncEvent) {
        let actions = match self.machine.lock() {
            Ok(mut m) => m.on_event(event),
            Err(_) => return,
        };

        for action in actions {
            self.run(action);
        }
    }

    fn timer_cell(&self, lane: SaveLane) -> &Arc<Mutex<Option<i32>>> {
        match lane {
            SaveLane::Create => &self.create_timer,
            SaveLane::Update => &self.update_timer,
        }
    }

    fn run(&self, action: SyncAction) {
        match action {
            SyncAction::StartTimer(lane) => self.start_timer(lane),
            SyncAction::CancelTimer(lane) => self.cancel_timer(lane),
            SyncAction::Save {
                epoch,
                lane,
                note_id,
                title,
                content,
            } => self.issue_save(epoch, lane, note_id, title, content),
            SyncAction::Adopt {
                record,
                keep_local_edits,
            } => self.adopt(record, keep_local_edits),
            SyncAction::TouchRegistry { record } => self.touch_registry(record),
            SyncAction::Notify { message } => self.notify(message),
        }
    }

    fn start_timer(&self, lane: SaveLane) {
        let Some(win) = web_sys::window() else {
            return;
        };

        self.cancel_timer(lane);

        let s2 = self.clone();
        let cb = wasm_bindgen::closure::Closure::once_into_js(move || {
            s2.dispatch(SyncEvent::TimerFired(lane));
        });

        let tid = win
            .set_timeout_with_callback_and_timeout_and_arguments_0(
                cb.as_ref().unchecked_ref(),
                self.autosave_ms,
            )
            .unwrap_or(0);

        if let Ok(mut cell) = self.timer_cell(lane).lock() {
            *cell = Some(tid);
        }
    }

    fn cancel_timer(&self, lane: SaveLane) {
        let Some(win) = web_sys::window() else {
            return;
        };
        if let Ok(mut cell) = self.timer_cell(lane).lock() {
            if let Some(tid) = cell.take() {
                win.clear_timeout_with_handle(tid);
            }
        }
    }

    fn issue_save(
        &self,
        epoch: u64,
        lane: SaveLane,
        note_id: Option<String>,
        title: String,
        content: String,
    ) {
        let api_client = self.app_state.0.api_client.get_untracked();
        let s2 = self.clone();

        spawn_local(async move {
            let result = match (lane, note_id) {
                (SaveLane::Update, Some(id)) => {
                    api_client
                        .update_note(
                            &id,
                            NoteUpdate {
                                title: Some(title),
                                content: Some(content),
                                ..Default::default()
                            },
                        )
                        .await
                }
                // A create carries the full initial title/content; the
                // server assigns id and timestamps.
                _ => api_client.create_note(&title, &content).await,
            };

            match result {
                Ok(record) => s2.dispatch(SyncEvent::SaveDone { epoch, record }),
                Err(e) => s2.dispatch(SyncEvent::SaveFailed {
                    epoch,
                    missing: e.kind == ApiErrorKind::NotFound,
                    message: save_error_message(&e),
                }),
            }
        });
    }

    fn adopt(&self, record: Note, keep_local_edits: bool) {
        self.touch_registry(record.clone());

        let st = &self.app_state.0;
        st.active_note_id.set(Some(record.id.clone()));
        if !keep_local_edits {
            st.working_title.set(record.title.clone());
            st.working_content.set(record.content.clone());
        }
        st.notice.set(None);
    }

    fn touch_registry(&self, record: Note) {
        self.app_state.0.notes.update(|notes| {
            match notes.iter_mut().find(|n| n.id == record.id) {
                Some(existing) => *existing = record,
                None => notes.insert(0, record),
            }
        });
    }

    fn notify(&self, message: String) {
        web_sys::console::warn_1(&format!("autosave: {message}").into());
        self.app_state.0.notice.set(Some(message));
    }
}

fn save_error_message(e: &ApiError) -> String {
    match e.kind {
        ApiErrorKind::NotFound => "This note no longer exists on the server; \
                                   your changes are kept locally and the next \
                                   save will re-create it."
            .to_string(),
        _ => format!("Saving failed: {e}. Your changes are kept locally."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server_note(id: &str, title: &str, content: &str) -> Note {
        Note {
            id: id.to_string(),
            title: title.to_string(),
            content: content.to_string(),
            created_at: "2024-01-01T00:00:00Z".to_string(),
            updated_at: "2024-01-01T00:00:01Z".to_string(),
            tags: vec![],
            category_id: None,
            is_starred: false,
            order: 0,
        }
    }

    fn edited(title: &str, content: &str) -> SyncEvent {
        SyncEvent::Edited {
            title: title.to_string(),
            content: content.to_string(),
        }
    }

    /// Virtual-clock harness: replays timestamped events against the
    /// machine, simulating the debounce timer, and records every save.
    struct Harness {
        machine: AutosaveMachine,
        timer_due: Option<(SaveLane, i64)>,
        saves: Vec<SyncAction>,
        side_effects: Vec<SyncAction>,
    }

    impl Harness {
        fn new(note: Option<&Note>) -> Self {
            Self {
                machine: AutosaveMachine::new(note),
                timer_due: None,
                saves: Vec::new(),
                side_effects: Vec::new(),
            }
        }

        fn feed(&mut self, now: i64, event: SyncEvent) {
            for action in self.machine.on_event(event) {
                match action {
                    SyncAction::StartTimer(lane) => {
                        self.timer_due = Some((lane, now + AUTOSAVE_DEBOUNCE_MS as i64));
                    }
                    SyncAction::CancelTimer(_) => self.timer_due = None,
                    save @ SyncAction::Save { .. } => self.saves.push(save),
                    other => self.side_effects.push(other),
                }
            }
        }

        /// Advance the clock, firing the debounce timer if it is due.
        fn advance_to(&mut self, now: i64) {
            if let Some((lane, due)) = self.timer_due {
                if due <= now {
                    self.timer_due = None;
                    self.feed(due, SyncEvent::TimerFired(lane));
                }
            }
        }
    }

    #[test]
    fn test_debounce_coalesces_rapid_edits() {
        let note = server_note("n1", "t", "c");
        let mut h = Harness::new(Some(&note));

        h.feed(0, edited("t", "a"));
        h.advance_to(200);
        h.feed(200, edited("t", "ab"));
        h.advance_to(400);
        h.feed(400, edited("t", "abc"));

        // Nothing fires inside the quiet window.
        h.advance_to(1300);
        assert!(h.saves.is_empty());

        // One save at ~1400, carrying the content as of the last edit.
        h.advance_to(1450);
        assert_eq!(h.saves.len(), 1);
        match &h.saves[0] {
            SyncAction::Save {
                lane,
                note_id,
                content,
                ..
            } => {
                assert_eq!(*lane, SaveLane::Update);
                assert_eq!(note_id.as_deref(), Some("n1"));
                assert_eq!(content, "abc");
            }
            other => panic!("unexpected action {other:?}"),
        }
        assert_eq!(h.machine.state(), SaveState::Saving);
    }

    #[test]
    fn test_create_then_edit_issues_single_create() {
        let mut h = Harness::new(None);

        h.feed(0, edited("My title", ""));
        // A content edit 100ms later restarts the same create debounce.
        h.advance_to(100);
        h.feed(100, edited("My title", "<p>body</p>"));

        h.advance_to(2000);
        assert_eq!(h.saves.len(), 1);
        match &h.saves[0] {
            SyncAction::Save {
                lane,
                note_id,
                title,
                content,
                ..
            } => {
                assert_eq!(*lane, SaveLane::Create);
                assert!(note_id.is_none());
                assert_eq!(title, "My title");
                assert_eq!(content, "<p>body</p>");
            }
            other => panic!("unexpected action {other:?}"),
        }
    }

    #[test]
    fn test_edit_during_create_flight_queues_update_not_second_create() {
        let mut h = Harness::new(None);

        h.feed(0, edited("t", ""));
        h.advance_to(1100);
        assert_eq!(h.saves.len(), 1);
        assert_eq!(h.machine.state(), SaveState::Saving);

        // Edit lands while the create call is in flight.
        h.feed(1200, edited("t", "<p>late</p>"));
        assert_eq!(h.machine.state(), SaveState::Dirty);
        assert_eq!(h.saves.len(), 1, "no second create");

        // The create resolves and binds the id; the queued edit becomes a
        // scheduled update against it.
        h.feed(
            1300,
            SyncEvent::SaveDone {
                epoch: 0,
                record: server_note("fresh-id", "t", ""),
            },
        );
        assert_eq!(h.machine.note_id(), Some("fresh-id"));
        assert_eq!(h.machine.state(), SaveState::Scheduled);

        h.advance_to(2400);
        assert_eq!(h.saves.len(), 2);
        match &h.saves[1] {
            SyncAction::Save {
                lane,
                note_id,
                content,
                ..
            } => {
                assert_eq!(*lane, SaveLane::Update);
                assert_eq!(note_id.as_deref(), Some("fresh-id"));
                assert_eq!(content, "<p>late</p>");
            }
            other => panic!("unexpected action {other:?}"),
        }

        // Identity was adopted without clobbering the local text.
        assert!(h.side_effects.iter().any(|a| matches!(
            a,
            SyncAction::Adopt {
                keep_local_edits: true,
                ..
            }
        )));
    }

    #[test]
    fn test_cross_note_race_does_not_clobber_active_note() {
        let a = server_note("a", "Note A", "<p>a</p>");
        let b = server_note("b", "Note B", "<p>b</p>");

        let mut h = Harness::new(Some(&a));
        h.feed(0, edited("Note A", "<p>a2</p>"));
        h.advance_to(1100);
        assert_eq!(h.saves.len(), 1);

        // Switch to B while A's save is in flight.
        h.feed(1200, SyncEvent::NoteSwitched { note: Some(b) });
        assert_eq!(h.machine.note_id(), Some("b"));
        assert_eq!(h.machine.state(), SaveState::Idle);

        // A's save resolves afterwards: only the registry entry updates;
        // the active session is untouched.
        h.feed(
            1500,
            SyncEvent::SaveDone {
                epoch: 0,
                record: server_note("a", "Note A", "<p>a2</p>"),
            },
        );

        assert_eq!(h.machine.note_id(), Some("b"));
        assert_eq!(h.machine.state(), SaveState::Idle);
        assert!(h
            .side_effects
            .iter()
            .any(|e| matches!(e, SyncAction::TouchRegistry { record } if record.id == "a")));
        assert!(!h
            .side_effects
            .iter()
            .any(|e| matches!(e, SyncAction::Adopt { .. })));
    }

    #[test]
    fn test_switch_cancels_pending_debounce() {
        let a = server_note("a", "A", "");
        let mut h = Harness::new(Some(&a));

        h.feed(0, edited("A", "<p>x</p>"));
        assert!(h.timer_due.is_some());

        h.feed(500, SyncEvent::NoteSwitched { note: None });
        assert!(h.timer_due.is_none());

        // The cancelled timer never fires.
        h.advance_to(5000);
        assert!(h.saves.is_empty());
    }

    #[test]
    fn test_save_failure_reports_once_and_keeps_local_copy() {
        let a = server_note("a", "A", "");
        let mut h = Harness::new(Some(&a));

        h.feed(0, edited("A", "<p>x</p>"));
        h.advance_to(1100);
        h.feed(
            1200,
            SyncEvent::SaveFailed {
                epoch: 0,
                missing: false,
                message: "network down".to_string(),
            },
        );

        assert_eq!(h.machine.state(), SaveState::Error);
        let notices = h
            .side_effects
            .iter()
            .filter(|e| matches!(e, SyncAction::Notify { .. }))
            .count();
        assert_eq!(notices, 1);

        // No automatic retry...
        h.advance_to(10_000);
        assert_eq!(h.saves.len(), 1);

        // ...but a manual save retries with the retained working copy.
        h.feed(10_000, SyncEvent::ManualSave);
        assert_eq!(h.saves.len(), 2);
        match &h.saves[1] {
            SyncAction::Save { content, .. } => assert_eq!(content, "<p>x</p>"),
            other => panic!("unexpected action {other:?}"),
        }
    }

    #[test]
    fn test_vanished_note_resaves_as_create() {
        let a = server_note("a", "A", "");
        let mut h = Harness::new(Some(&a));

        h.feed(0, edited("A", "<p>x</p>"));
        h.advance_to(1100);
        h.feed(
            1200,
            SyncEvent::SaveFailed {
                epoch: 0,
                missing: true,
                message: "gone".to_string(),
            },
        );

        // The binding is dropped so the next cycle re-creates the note.
        assert!(h.machine.note_id().is_none());
        h.feed(1300, edited("A", "<p>x2</p>"));
        h.advance_to(2400);
        assert_eq!(h.saves.len(), 2);
        assert!(matches!(
            &h.saves[1],
            SyncAction::Save {
                lane: SaveLane::Create,
                ..
            }
        ));
    }

    #[test]
    fn test_successful_save_adopts_server_record() {
        let a = server_note("a", "A", "<p>x</p>");
        let mut h = Harness::new(Some(&a));

        h.feed(0, edited("A", "<p>x2</p>"));
        h.advance_to(1100);
        h.feed(
            1200,
            SyncEvent::SaveDone {
                epoch: 0,
                record: server_note("a", "A", "<p>x2</p>"),
            },
        );

        assert_eq!(h.machine.state(), SaveState::Idle);
        assert!(h.side_effects.iter().any(|e| matches!(
            e,
            SyncAction::Adopt {
                keep_local_edits: false,
                ..
            }
        )));
    }

    #[test]
    fn test_manual_save_when_clean_is_a_noop() {
        let a = server_note("a", "A", "");
        let mut h = Harness::new(Some(&a));
        h.feed(0, SyncEvent::ManualSave);
        assert!(h.saves.is_empty());
        assert_eq!(h.machine.state(), SaveState::Idle);
    }

    #[test]
    fn test_stale_timer_does_not_fire_twice() {
        let a = server_note("a", "A", "");
        let mut h = Harness::new(Some(&a));

        h.feed(0, edited("A", "<p>1</p>"));
        // Simulate a timer callback that survived its cancellation.
        h.feed(300, edited("A", "<p>2</p>"));
        h.feed(1000, SyncEvent::TimerFired(SaveLane::Update));
        h.feed(1000, SyncEvent::TimerFired(SaveLane::Create));

        // Only the machine-sanctioned firing path issues saves.
        h.advance_to(1300);
        assert_eq!(h.saves.len(), 1);
    }
}
