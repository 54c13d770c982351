use crate::components::ui::{
    Alert, AlertDescription, Button, ButtonSize, ButtonVariant, Input, Separator, Spinner,
};
use crate::editor::RichTextEditor;
use crate::export::{download_note, ExportFormat};
use crate::models::{Note, NoteUpdate};
use crate::state::note_sync::{NoteSyncController, SaveState};
use crate::state::AppContext;
use crate::storage::{clear_working_copy, recoverable_working_copy, SIDEBAR_COLLAPSED_KEY};
use crate::util::{content_preview, note_matches_query};
use icons::{Download, FileText, Menu, Plus, Search, Star, Trash2, X};
use leptos::ev;
use leptos::html;
use leptos::prelude::*;
use leptos::task::spawn_local;
use leptos_dom::helpers::window_event_listener;
use leptos_router::hooks::{use_navigate, use_params_map};
use wasm_bindgen::JsCast;

fn load_notes(app_state: &AppContext) {
    let st = app_state.0.clone();
    if st.notes_loading.get_untracked() {
        return;
    }

    st.notes_loading.set(true);
    st.notes_error.set(None);

    let api_client = st.api_client.get_untracked();
    spawn_local(async move {
        match api_client.list_notes().await {
            Ok(list) => st.notes.set(list),
            Err(e) => st.notes_error.set(Some(e.to_string())),
        }
        st.notes_loading.set(false);
    });
}

fn load_categories(app_state: &AppContext) {
    let st = app_state.0.clone();
    let api_client = st.api_client.get_untracked();
    spawn_local(async move {
        // Categories are decorative for the editing flow; failures only log.
        match api_client.list_categories().await {
            Ok(list) => st.categories.set(list),
            Err(e) => web_sys::console::warn_1(&format!("categories: {e}").into()),
        }
    });
}

fn patch_note(app_state: &AppContext, id: String, update: NoteUpdate) {
    let st = app_state.0.clone();
    let api_client = st.api_client.get_untracked();
    spawn_local(async move {
        match api_client.update_note(&id, update).await {
            Ok(record) => st.notes.update(|notes| {
                if let Some(n) = notes.iter_mut().find(|n| n.id == record.id) {
                    *n = record;
                }
            }),
            Err(e) => st.notice.set(Some(e.to_string())),
        }
    });
}

/// The single-screen shell: notes sidebar + rich-text editor. Routed both
/// bare (no note open) and with a `note_id` parameter.
#[component]
pub fn NotesPage() -> impl IntoView {
    let app_state = expect_context::<AppContext>();
    let controller = expect_context::<NoteSyncController>();

    // RwSignals are Copy; closures below capture these, not the context.
    let notes = app_state.0.notes;
    let notes_loading = app_state.0.notes_loading;
    let active_note_id = app_state.0.active_note_id;
    let working_title = app_state.0.working_title;
    let working_content = app_state.0.working_content;
    let search_query = app_state.0.search_query;
    let categories = app_state.0.categories;
    let notice = app_state.0.notice;
    let sidebar_collapsed = app_state.0.sidebar_collapsed;

    let params = use_params_map();
    let navigate = use_navigate();

    let search_ref: NodeRef<html::Input> = NodeRef::new();

    // The save indicator derives from the signals that change around save
    // transitions, so it refreshes without polling.
    let save_label = {
        let controller = controller.clone();
        move || {
            working_title.track();
            working_content.track();
            notes.track();
            notice.track();
            match controller.save_state() {
                SaveState::Idle => "Saved",
                SaveState::Dirty | SaveState::Scheduled => "Unsaved changes",
                SaveState::Saving => "Saving…",
                SaveState::Error => "Save failed",
            }
        }
    };

    {
        let app_state = app_state.clone();
        Effect::new(move |_| {
            load_notes(&app_state);
            load_categories(&app_state);
        });
    }

    // Bind the editing session to the routed note once it is available.
    {
        let controller = controller.clone();
        Effect::new(move |_| {
            let wanted = params.read().get("note_id").unwrap_or_default();
            let all = notes.get();

            if wanted.is_empty() {
                if active_note_id.get_untracked().is_some() {
                    active_note_id.set(None);
                    working_title.set(String::new());
                    working_content.set(String::new());
                    controller.set_active_note(None);
                }
                return;
            }

            if active_note_id.get_untracked().as_deref() == Some(wanted.as_str()) {
                return;
            }

            let Some(note) = all.iter().find(|n| n.id == wanted).cloned() else {
                return;
            };

            let mut title = note.title.clone();
            let mut content = note.content.clone();
            let mut recovered = false;
            if let Some(backup) = recoverable_working_copy(&note.id, &title, &content) {
                // A newer local working copy survived a closed tab; prefer
                // it and let the autosave cycle persist it.
                title = backup.title;
                content = backup.content;
                recovered = true;
                notice.set(Some("Recovered unsaved local changes.".to_string()));
            }

            active_note_id.set(Some(note.id.clone()));
            working_title.set(title.clone());
            working_content.set(content.clone());
            controller.set_active_note(Some(note));

            if recovered {
                controller.on_note_changed(&title, &content);
            }
        });
    }

    let open_note = {
        let navigate = navigate.clone();
        Callback::new(move |id: String| {
            navigate(
                &format!("/note/{}", urlencoding::encode(&id)),
                Default::default(),
            );
        })
    };

    let new_note = {
        let controller = controller.clone();
        let navigate = navigate.clone();
        move || {
            active_note_id.set(None);
            working_title.set(String::new());
            working_content.set(String::new());
            controller.set_active_note(None);
            navigate("/", Default::default());
        }
    };

    // Global shortcuts: mod+N new note, mod+S save now, mod+K search.
    {
        let controller = controller.clone();
        let new_note = new_note.clone();
        let handle = window_event_listener(ev::keydown, move |ev: web_sys::KeyboardEvent| {
            let modifier = ev.ctrl_key() || ev.meta_key();
            if !modifier {
                return;
            }
            match ev.key().to_lowercase().as_str() {
                "n" => {
                    ev.prevent_default();
                    new_note();
                }
                "s" => {
                    ev.prevent_default();
                    controller.save_now();
                }
                "k" => {
                    ev.prevent_default();
                    if let Some(el) = search_ref.get_untracked() {
                        let _ = el.focus();
                    }
                }
                _ => {}
            }
        });
        on_cleanup(move || handle.remove());
    }

    let filtered_notes = move || {
        let q = search_query.get();
        let mut list: Vec<Note> = notes
            .get()
            .into_iter()
            .filter(|n| note_matches_query(&n.title, &n.content, &q))
            .collect();
        // Starred first, then the server's (updated_at) ordering.
        list.sort_by_key(|n| !n.is_starred);
        list
    };

    let on_editor_change = {
        let controller = controller.clone();
        Callback::new(move |content: String| {
            controller.on_note_changed(&working_title.get_untracked(), &content);
        })
    };

    let on_title_input = {
        let controller = controller.clone();
        move |ev: web_sys::Event| {
            let Some(value) = event_target_value_opt(&ev) else {
                return;
            };
            working_title.set(value.clone());
            controller.on_note_changed(&value, &working_content.get_untracked());
        }
    };

    let selected_category: RwSignal<Option<String>> = RwSignal::new(None);
    Effect::new(move |_| {
        let picked = active_note_id.get().and_then(|id| {
            notes
                .get()
                .iter()
                .find(|n| n.id == id)
                .and_then(|n| n.category_id.clone())
        });
        selected_category.set(picked);
    });

    let on_select_category = {
        let app_state = app_state.clone();
        Callback::new(move |category_id: Option<String>| {
            let Some(id) = active_note_id.get_untracked() else {
                return;
            };
            patch_note(
                &app_state,
                id,
                NoteUpdate {
                    category_id: Some(category_id),
                    ..Default::default()
                },
            );
        })
    };

    let toggle_sidebar = move || {
        sidebar_collapsed.update(|c| *c = !*c);
        if let Some(storage) = web_sys::window().and_then(|w| w.local_storage().ok().flatten()) {
            let flag = if sidebar_collapsed.get_untracked() { "1" } else { "0" };
            let _ = storage.set_item(SIDEBAR_COLLAPSED_KEY, flag);
        }
    };

    view! {
        <div class="flex h-screen w-full overflow-hidden bg-background text-foreground">
            <Show when=move || !sidebar_collapsed.get() fallback=|| ().into_view()>
            <aside class="flex w-[300px] shrink-0 flex-col border-r border-border bg-background">
                <div class="flex flex-col gap-3 p-4">
                    <Button
                        class="w-full"
                        size=ButtonSize::Sm
                        on:click={
                            let new_note = new_note.clone();
                            move |_| new_note()
                        }
                    >
                        <Plus />
                        "New Note"
                    </Button>

                    <div class="relative">
                        <Search class="pointer-events-none absolute left-2.5 top-2.5 size-4 text-muted-foreground" />
                        <Input
                            class="pl-8"
                            placeholder="Search notes..."
                            bind_value=search_query
                            node_ref=search_ref
                        />
                    </div>
                </div>

                <Separator />

                <NotesList
                    notes=Signal::derive(filtered_notes)
                    loading=notes_loading.into()
                    on_open=open_note
                />
            </aside>
            </Show>

            <main class="flex min-w-0 flex-1 flex-col">
                <header class="flex items-center gap-3 border-b border-border px-4 py-3">
                    <Button
                        variant=ButtonVariant::Ghost
                        size=ButtonSize::Icon
                        attr:title="Toggle sidebar"
                        on:click=move |_| toggle_sidebar()
                    >
                        <Menu />
                    </Button>
                    <FileText class="size-4 shrink-0 text-muted-foreground" />
                    <input
                        class="w-full bg-transparent text-lg font-semibold outline-none placeholder:text-muted-foreground"
                        placeholder="Note title"
                        prop:value=move || working_title.get()
                        on:input=on_title_input
                    />
                    <span class="shrink-0 whitespace-nowrap text-xs text-muted-foreground">
                        {save_label}
                    </span>
                </header>

                {move || {
                    notice.get().map(|msg| view! {
                        <div class="px-4 pt-3">
                            <Alert class="flex items-center justify-between border-destructive/30">
                                <AlertDescription class="text-destructive text-xs">{msg}</AlertDescription>
                                <Button
                                    variant=ButtonVariant::Ghost
                                    size=ButtonSize::Icon
                                    on:click=move |_| notice.set(None)
                                >
                                    <X />
                                </Button>
                            </Alert>
                        </div>
                    })
                }}

                <div class="min-h-0 flex-1 overflow-auto p-4">
                    <RichTextEditor
                        content=working_content
                        on_change=on_editor_change
                        categories=categories
                        selected_category=selected_category
                        on_select_category=on_select_category
                    />
                </div>
            </main>
        </div>
    }
}

fn event_target_value_opt(ev: &web_sys::Event) -> Option<String> {
    ev.target()?
        .dyn_into::<web_sys::HtmlInputElement>()
        .ok()
        .map(|i| i.value())
}

#[component]
fn NotesList(
    notes: Signal<Vec<Note>>,
    loading: Signal<bool>,
    on_open: Callback<String>,
) -> impl IntoView {
    let delete_confirm_id: RwSignal<Option<String>> = RwSignal::new(None);

    view! {
        <div class="min-h-0 flex-1 space-y-1.5 overflow-auto px-2 pb-4">
            <Show when=move || loading.get() && notes.get().is_empty() fallback=|| ().into_view()>
                <div class="flex items-center gap-2 px-4 py-6 text-xs text-muted-foreground">
                    <Spinner />
                    "Loading notes..."
                </div>
            </Show>

            <Show when=move || !loading.get() && notes.get().is_empty() fallback=|| ().into_view()>
                <div class="flex flex-col items-center gap-2 px-4 py-10 text-center">
                    <FileText class="size-10 text-muted-foreground/50" />
                    <div class="text-sm font-medium">"No notes yet"</div>
                    <div class="text-xs text-muted-foreground">
                        "Create your first note to get started"
                    </div>
                </div>
            </Show>

            {move || {
                notes
                    .get()
                    .into_iter()
                    .map(|note| {
                        view! {
                            <NoteRow note=note on_open=on_open delete_confirm_id=delete_confirm_id />
                        }
                    })
                    .collect_view()
            }}
        </div>
    }
}

#[component]
fn NoteRow(
    note: Note,
    on_open: Callback<String>,
    delete_confirm_id: RwSignal<Option<String>>,
) -> impl IntoView {
    let app_state = expect_context::<AppContext>();
    let controller = expect_context::<NoteSyncController>();

    let active_note_id = app_state.0.active_note_id;

    let id = note.id.clone();
    let starred = note.is_starred;
    let preview = content_preview(&note.content, 100);
    let title = note.display_title().to_string();

    let is_active = {
        let id = id.clone();
        move || active_note_id.get().as_deref() == Some(id.as_str())
    };

    let toggle_star = {
        let id = id.clone();
        let app_state = app_state.clone();
        move || {
            patch_note(
                &app_state,
                id.clone(),
                NoteUpdate {
                    is_starred: Some(!starred),
                    ..Default::default()
                },
            );
        }
    };

    let delete_note = {
        let id = id.clone();
        let app_state = app_state.clone();
        let controller = controller.clone();
        move || {
            let st = app_state.0.clone();
            let api_client = st.api_client.get_untracked();
            let controller = controller.clone();
            let id = id.clone();
            spawn_local(async move {
                match api_client.delete_note(&id).await {
                    Ok(()) => {
                        st.notes.update(|list| list.retain(|n| n.id != id));
                        if st.active_note_id.get_untracked().as_deref() == Some(id.as_str()) {
                            st.active_note_id.set(None);
                            st.working_title.set(String::new());
                            st.working_content.set(String::new());
                            controller.set_active_note(None);
                            clear_working_copy();
                        }
                    }
                    Err(e) => st.notice.set(Some(e.to_string())),
                }
            });
        }
    };

    let export = {
        let note = note.clone();
        move |format: ExportFormat| download_note(&note, format)
    };

    let row_class = {
        let is_active = is_active.clone();
        move || {
            let base = "group relative cursor-pointer rounded-lg border p-3 transition-colors";
            if is_active() {
                format!("{base} border-border bg-accent")
            } else {
                format!("{base} border-border bg-background hover:bg-accent/50")
            }
        }
    };

    let confirm_open = {
        let id = id.clone();
        move || delete_confirm_id.get().as_deref() == Some(id.as_str())
    };

    view! {
        <div
            class=row_class
            on:click={
                let id = id.clone();
                move |_| on_open.run(id.clone())
            }
        >
            <div class="flex w-full items-center gap-2">
                <div class="min-w-0 flex-1">
                    <div class="flex items-center gap-1.5">
                        <Show when=move || starred fallback=|| ().into_view()>
                            <Star class="size-3 shrink-0 fill-amber-400 text-amber-400" />
                        </Show>
                        <h3 class="truncate text-sm font-medium">{title.clone()}</h3>
                    </div>
                    <p class="truncate text-xs text-muted-foreground">{preview.clone()}</p>
                </div>

                <div
                    class="flex items-center gap-1"
                    on:click=|ev: web_sys::MouseEvent| ev.stop_propagation()
                >
                    <Show
                        when=confirm_open
                        fallback={
                            let id = id.clone();
                            let toggle_star = toggle_star.clone();
                            let export = export.clone();
                            move || {
                                let id = id.clone();
                                let toggle_star = toggle_star.clone();
                                let export_md = export.clone();
                                let export_html = export.clone();
                                view! {
                                    <div class="flex items-center gap-1 opacity-0 transition-opacity group-hover:opacity-100">
                                        <Button
                                            variant=ButtonVariant::Ghost
                                            size=ButtonSize::Icon
                                            attr:title="Star"
                                            on:click=move |_| toggle_star()
                                        >
                                            <Star />
                                        </Button>
                                        <Button
                                            variant=ButtonVariant::Ghost
                                            size=ButtonSize::Icon
                                            attr:title="Export as Markdown"
                                            on:click=move |_| export_md(ExportFormat::Markdown)
                                        >
                                            <Download />
                                        </Button>
                                        <Button
                                            variant=ButtonVariant::Ghost
                                            size=ButtonSize::Icon
                                            attr:title="Export as HTML"
                                            on:click=move |_| export_html(ExportFormat::Html)
                                        >
                                            <FileText />
                                        </Button>
                                        <Button
                                            variant=ButtonVariant::Danger
                                            size=ButtonSize::Icon
                                            attr:title="Delete"
                                            on:click=move |_| delete_confirm_id.set(Some(id.clone()))
                                        >
                                            <Trash2 />
                                        </Button>
                                    </div>
                                }
                            }
                        }
                    >
                        {
                            let delete_note = delete_note.clone();
                            view! {
                                <div class="flex items-center gap-1.5">
                                    <Button
                                        variant=ButtonVariant::Outline
                                        size=ButtonSize::Sm
                                        on:click=move |_| delete_confirm_id.set(None)
                                    >
                                        "Cancel"
                                    </Button>
                                    <Button
                                        variant=ButtonVariant::Danger
                                        size=ButtonSize::Sm
                                        on:click={
                                            let delete_note = delete_note.clone();
                                            move |_| {
                                                delete_note();
                                                delete_confirm_id.set(None);
                                            }
                                        }
                                    >
                                        "Delete"
                                    </Button>
                                </div>
                            }
                        }
                    </Show>
                </div>
            </div>
        </div>
    }
}
