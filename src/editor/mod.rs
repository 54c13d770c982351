pub(crate) mod engine;

use crate::doc::position::{Position, Selection};
use crate::doc::{Document, MarkKind, TextAlign};
use crate::editor::engine::{ActiveBlock, EditorState};
use crate::models::Category;
use leptos::html;
use leptos::prelude::*;
use wasm_bindgen::JsCast;

/// Convert a UTF-16 code-unit offset (what the DOM reports) into a
/// character offset within `s`.
pub(crate) fn utf16_to_char_idx(s: &str, pos_utf16: u32) -> usize {
    let mut units: u32 = 0;
    for (chars, ch) in s.chars().enumerate() {
        if units >= pos_utf16 {
            return chars;
        }
        units += ch.len_utf16() as u32;
    }
    s.chars().count()
}

pub(crate) fn char_idx_to_utf16(s: &str, chars: usize) -> u32 {
    s.chars().take(chars).map(|c| c.len_utf16() as u32).sum()
}

/// A top-level block index plus a character offset inside that block: the
/// coordinate the DOM bridge works in. Mark wrappers nest arbitrarily in
/// the rendered HTML, but the concatenated text of a block matches the
/// model exactly, so a character offset survives the round trip.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct BlockOffset {
    pub block: usize,
    pub chars: usize,
}

/// Resolve a block-relative character offset to a model position.
pub(crate) fn position_at_block_offset(doc: &Document, at: BlockOffset) -> Position {
    let mut remaining = at.chars;
    let mut last: Option<(Vec<usize>, usize)> = None;

    for path in doc.text_paths() {
        if path.first().copied() != Some(at.block) {
            continue;
        }
        let len = doc.node_at(&path).map(|n| n.char_len()).unwrap_or(0);
        if remaining <= len {
            return Position::new(path, remaining);
        }
        remaining -= len;
        last = Some((path, len));
    }

    // Past the end of the block's text: settle on the last leaf's end.
    match last {
        Some((path, len)) => Position::new(path, len),
        None => doc.clamp_position(&Position::new(vec![at.block], 0)),
    }
}

/// Inverse of `position_at_block_offset`.
pub(crate) fn block_offset_of_position(doc: &Document, pos: &Position) -> BlockOffset {
    let block = pos.path.first().copied().unwrap_or(0);
    let mut chars = 0;

    for path in doc.text_paths() {
        if path.first().copied() != Some(block) {
            continue;
        }
        if path == pos.path {
            return BlockOffset {
                block,
                chars: chars + pos.offset,
            };
        }
        chars += doc.node_at(&path).map(|n| n.char_len()).unwrap_or(0);
    }

    BlockOffset { block, chars: 0 }
}

// ---------------------------------------------------------------------------
// DOM bridge
// ---------------------------------------------------------------------------

/// Walk up from `node` to the editor root, returning the index of the
/// top-level block element containing it.
fn top_level_block_index(root: &web_sys::Element, node: &web_sys::Node) -> Option<usize> {
    let root_node: &web_sys::Node = root.as_ref();
    let mut current = node.clone();

    loop {
        let parent = current.parent_node()?;
        if parent.is_same_node(Some(root_node)) {
            // Index of `current` among the root's element children.
            let children = root_node.child_nodes();
            let mut index = 0;
            for i in 0..children.length() {
                let Some(child) = children.item(i) else {
                    continue;
                };
                if child.is_same_node(Some(&current)) {
                    return Some(index);
                }
                if child.node_type() == web_sys::Node::ELEMENT_NODE {
                    index += 1;
                }
            }
            return None;
        }
        current = parent;
    }
}

/// Character offset of (`target`, `utf16_offset`) within the text of
/// `scope`, walking text nodes in document order.
fn char_offset_within(
    scope: &web_sys::Node,
    target: &web_sys::Node,
    utf16_offset: u32,
) -> Option<usize> {
    fn walk(
        node: &web_sys::Node,
        target: &web_sys::Node,
        utf16_offset: u32,
        acc: &mut usize,
    ) -> bool {
        if node.node_type() == web_sys::Node::TEXT_NODE {
            let text = node.text_content().unwrap_or_default();
            if node.is_same_node(Some(target)) {
                *acc += utf16_to_char_idx(&text, utf16_offset);
                return true;
            }
            *acc += text.chars().count();
            return false;
        }

        // An element target means "offset-th child boundary".
        if node.is_same_node(Some(target)) {
            let children = node.child_nodes();
            for i in 0..utf16_offset.min(children.length()) {
                if let Some(child) = children.item(i) {
                    *acc += child.text_content().unwrap_or_default().chars().count();
                }
            }
            return true;
        }

        let children = node.child_nodes();
        for i in 0..children.length() {
            if let Some(child) = children.item(i) {
                if walk(&child, target, utf16_offset, acc) {
                    return true;
                }
            }
        }
        false
    }

    let mut acc = 0;
    if walk(scope, target, utf16_offset, &mut acc) {
        Some(acc)
    } else {
        None
    }
}

fn dom_point_to_block_offset(
    root: &web_sys::Element,
    node: &web_sys::Node,
    utf16_offset: u32,
) -> Option<BlockOffset> {
    let root_node: &web_sys::Node = root.as_ref();

    // A point on the root itself addresses a block boundary.
    if node.is_same_node(Some(root_node)) {
        let last = root.child_element_count().saturating_sub(1) as usize;
        return Some(BlockOffset {
            block: (utf16_offset as usize).min(last),
            chars: 0,
        });
    }

    let block = top_level_block_index(root, node)?;
    let block_el = root.children().item(block as u32)?;
    let chars = char_offset_within(block_el.as_ref(), node, utf16_offset)?;
    Some(BlockOffset { block, chars })
}

/// Read the browser selection and translate it into a model selection
/// against `doc`. Returns None when the selection lies outside the editor.
pub(crate) fn read_dom_selection(root: &web_sys::Element, doc: &Document) -> Option<Selection> {
    let sel = web_sys::window()?.get_selection().ok()??;
    let anchor_node = sel.anchor_node()?;
    let focus_node = sel.focus_node()?;

    let root_node: &web_sys::Node = root.as_ref();
    if !root_node.contains(Some(&anchor_node)) || !root_node.contains(Some(&focus_node)) {
        return None;
    }

    let anchor = dom_point_to_block_offset(root, &anchor_node, sel.anchor_offset())?;
    let focus = dom_point_to_block_offset(root, &focus_node, sel.focus_offset())?;

    Some(Selection::range(
        position_at_block_offset(doc, anchor),
        position_at_block_offset(doc, focus),
    ))
}

/// Re-apply a model selection to the freshly rendered DOM.
pub(crate) fn restore_dom_selection(root: &web_sys::Element, doc: &Document, sel: &Selection) {
    fn dom_point(
        root: &web_sys::Element,
        doc: &Document,
        pos: &Position,
    ) -> Option<(web_sys::Node, u32)> {
        let at = block_offset_of_position(doc, pos);
        let block_el = root.children().item(at.block as u32)?;

        // Walk text nodes until the char offset is inside one.
        fn find(node: &web_sys::Node, remaining: &mut usize) -> Option<(web_sys::Node, u32)> {
            if node.node_type() == web_sys::Node::TEXT_NODE {
                let text = node.text_content().unwrap_or_default();
                let len = text.chars().count();
                if *remaining <= len {
                    return Some((node.clone(), char_idx_to_utf16(&text, *remaining)));
                }
                *remaining -= len;
                return None;
            }
            let children = node.child_nodes();
            for i in 0..children.length() {
                if let Some(child) = children.item(i) {
                    if let Some(found) = find(&child, remaining) {
                        return Some(found);
                    }
                }
            }
            None
        }

        let mut remaining = at.chars;
        find(block_el.as_ref(), &mut remaining)
            .or_else(|| Some((block_el.clone().into(), 0)))
    }

    let Some(window) = web_sys::window() else {
        return;
    };
    let Ok(Some(dom_sel)) = window.get_selection() else {
        return;
    };
    let Some(document) = window.document() else {
        return;
    };

    let Some((anchor_node, anchor_off)) = dom_point(root, doc, &sel.anchor) else {
        return;
    };
    let Some((head_node, head_off)) = dom_point(root, doc, &sel.head) else {
        return;
    };

    let Ok(range) = document.create_range() else {
        return;
    };
    if range.set_start(&anchor_node, anchor_off).is_err() {
        return;
    }
    let _ = range.set_end(&head_node, head_off);

    let _ = dom_sel.remove_all_ranges();
    let _ = dom_sel.add_range(&range);
}

// ---------------------------------------------------------------------------
// Editor component
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, PartialEq, Eq)]
enum ToolbarCmd {
    Undo,
    Redo,
    Bold,
    Italic,
    Underline,
    Strike,
    Superscript,
    Subscript,
    Highlight,
    CodeBlock,
    BulletList,
    OrderedList,
    TaskList,
    Blockquote,
    Heading(u8),
    Align(TextAlign),
    Link,
    Image,
    Table,
    Rule,
}

/// The rich-text editor: renders the document model, feeds DOM edits back
/// through the engine, and exposes the toolbar command surface.
///
/// `content` is the serialized working copy owned by the page; every
/// committed transaction publishes the new serialization through
/// `on_change`, which drives the autosave controller.
#[component]
pub fn RichTextEditor(
    content: RwSignal<String>,
    on_change: Callback<String>,
    #[prop(optional)] categories: Option<RwSignal<Vec<Category>>>,
    #[prop(optional)] selected_category: Option<RwSignal<Option<String>>>,
    #[prop(optional, into)] on_select_category: Option<Callback<Option<String>>>,
) -> impl IntoView {
    let state: StoredValue<EditorState> =
        StoredValue::new(EditorState::from_markup(&content.get_untracked()));

    let doc_html: RwSignal<String> =
        RwSignal::new(state.with_value(|st| st.serialize()));
    let active_marks: RwSignal<Vec<MarkKind>> = RwSignal::new(vec![]);
    let active_block: RwSignal<ActiveBlock> = RwSignal::new(ActiveBlock::Paragraph);
    let active_align: RwSignal<Option<TextAlign>> = RwSignal::new(None);
    let can_undo: RwSignal<bool> = RwSignal::new(false);
    let can_redo: RwSignal<bool> = RwSignal::new(false);

    let surface_ref: NodeRef<html::Div> = NodeRef::new();

    let refresh_toolbar = move || {
        state.with_value(|st| {
            active_marks.set(st.active_marks());
            active_block.set(st.active_block());
            active_align.set(st.active_align());
            can_undo.set(st.can_undo());
            can_redo.set(st.can_redo());
        });
    };

    // External content changes (note switch, server adoption) reset the
    // session: fresh document, empty history.
    Effect::new(move |_| {
        let incoming = content.get();
        let current = state.with_value(|st| st.serialize());
        if incoming != current {
            state.set_value(EditorState::from_markup(&incoming));
            doc_html.set(state.with_value(|st| st.serialize()));
            refresh_toolbar();
        }
    });

    // Push the rendered HTML + restored selection after the DOM settles.
    let rerender = move || {
        let html = state.with_value(|st| st.serialize());
        doc_html.set(html.clone());
        content.set(html.clone());
        on_change.run(html);
        refresh_toolbar();

        if let Some(el) = surface_ref.get_untracked() {
            let restore = move || {
                state.with_value(|st| {
                    restore_dom_selection(&el, st.doc(), st.selection());
                });
            };
            // Restore on the next tick so Leptos has written inner_html.
            if let Some(win) = web_sys::window() {
                let cb = wasm_bindgen::closure::Closure::once_into_js(restore);
                let _ = win.set_timeout_with_callback_and_timeout_and_arguments_0(
                    cb.as_ref().unchecked_ref(),
                    0,
                );
            }
        }
    };

    // Pull the browser selection into the engine before running a command.
    let sync_selection = move || {
        let Some(el) = surface_ref.get_untracked() else {
            return;
        };
        state.update_value(|st| {
            if let Some(sel) = read_dom_selection(&el, st.doc()) {
                st.set_selection(sel);
            }
        });
    };

    let exec = move |cmd: ToolbarCmd| {
        sync_selection();

        let result = state.try_update_value(|st| match cmd {
            ToolbarCmd::Undo => {
                st.undo();
                Ok(())
            }
            ToolbarCmd::Redo => {
                st.redo();
                Ok(())
            }
            ToolbarCmd::Bold => st.toggle_bold(),
            ToolbarCmd::Italic => st.toggle_italic(),
            ToolbarCmd::Underline => st.toggle_underline(),
            ToolbarCmd::Strike => st.toggle_strike(),
            ToolbarCmd::Superscript => st.toggle_superscript(),
            ToolbarCmd::Subscript => st.toggle_subscript(),
            ToolbarCmd::Highlight => st.toggle_highlight(None),
            ToolbarCmd::CodeBlock => st.toggle_code_block(),
            ToolbarCmd::BulletList => st.toggle_bullet_list(),
            ToolbarCmd::OrderedList => st.toggle_ordered_list(),
            ToolbarCmd::TaskList => st.toggle_task_list(),
            ToolbarCmd::Blockquote => st.toggle_blockquote(),
            ToolbarCmd::Heading(level) => st.toggle_heading(level),
            ToolbarCmd::Align(side) => st.set_text_align(side),
            ToolbarCmd::Link => {
                if st.active_marks().contains(&MarkKind::Link) {
                    st.unset_link()
                } else {
                    let url = web_sys::window()
                        .and_then(|w| w.prompt_with_message("Enter URL:").ok().flatten());
                    match url {
                        Some(url) if !url.trim().is_empty() => st.set_link(&url),
                        _ => Ok(()),
                    }
                }
            }
            ToolbarCmd::Image => {
                let url = web_sys::window()
                    .and_then(|w| w.prompt_with_message("Enter image URL:").ok().flatten());
                match url {
                    Some(url) if !url.trim().is_empty() => st.insert_image(&url),
                    _ => Ok(()),
                }
            }
            ToolbarCmd::Table => st.insert_table(3, 3),
            ToolbarCmd::Rule => st.insert_horizontal_rule(),
        });

        // Structure violations reject the edit locally; nothing to show.
        if let Some(Err(e)) = result {
            web_sys::console::warn_1(&format!("editor: {e}").into());
        }
        rerender();
    };

    // Native contenteditable edits (typing, paste, IME) re-enter the
    // engine as one whole-document transaction.
    let on_input = move |_ev: web_sys::Event| {
        let Some(el) = surface_ref.get_untracked() else {
            return;
        };
        let raw = el.inner_html();

        state.update_value(|st| {
            let parsed_sel = read_dom_selection(&el, &Document::parse(&raw));
            if let Err(e) = st.replace_with_markup(&raw, parsed_sel) {
                web_sys::console::warn_1(&format!("editor: {e}").into());
            }
        });

        let canonical = state.with_value(|st| st.serialize());
        content.set(canonical.clone());
        on_change.run(canonical.clone());
        refresh_toolbar();

        // Only rewrite the surface when canonicalization changed it, to
        // avoid resetting the caret on plain typing.
        if canonical != raw {
            doc_html.set(canonical);
            if let Some(win) = web_sys::window() {
                let cb = wasm_bindgen::closure::Closure::once_into_js(move || {
                    state.with_value(|st| {
                        restore_dom_selection(&el, st.doc(), st.selection());
                    });
                });
                let _ = win.set_timeout_with_callback_and_timeout_and_arguments_0(
                    cb.as_ref().unchecked_ref(),
                    0,
                );
            }
        }
    };

    let on_keydown = move |ev: web_sys::KeyboardEvent| {
        let modifier = ev.ctrl_key() || ev.meta_key();
        if !modifier {
            return;
        }

        let cmd = match ev.key().to_lowercase().as_str() {
            "b" => Some(ToolbarCmd::Bold),
            "i" => Some(ToolbarCmd::Italic),
            "u" => Some(ToolbarCmd::Underline),
            "z" if ev.shift_key() => Some(ToolbarCmd::Redo),
            "z" => Some(ToolbarCmd::Undo),
            "y" => Some(ToolbarCmd::Redo),
            _ => None,
        };

        if let Some(cmd) = cmd {
            ev.prevent_default();
            exec(cmd);
        }
    };

    let mark_btn = move |cmd: ToolbarCmd, kind: MarkKind, label: &'static str, glyph: &'static str| {
        view! {
            <ToolbarButton
                label=label
                glyph=glyph
                active=Signal::derive(move || active_marks.get().contains(&kind))
                on_press=Callback::new(move |_| exec(cmd))
            />
        }
    };

    let block_btn = move |cmd: ToolbarCmd,
                          matches: fn(&ActiveBlock) -> bool,
                          label: &'static str,
                          glyph: &'static str| {
        view! {
            <ToolbarButton
                label=label
                glyph=glyph
                active=Signal::derive(move || matches(&active_block.get()))
                on_press=Callback::new(move |_| exec(cmd))
            />
        }
    };

    view! {
        <div class="flex w-full flex-col gap-2">
            <div class="flex items-center justify-between">
                {categories.map(|cats| view! {
                    <CategoryPicker
                        categories=cats
                        selected=selected_category.unwrap_or_else(|| RwSignal::new(None))
                        on_select=on_select_category.unwrap_or_else(|| Callback::new(|_| {}))
                    />
                })}
            </div>

            <div class="flex flex-wrap items-center gap-3 rounded-lg border border-input bg-muted/40 p-1.5">
                // History
                <div class="flex gap-0.5">
                    <ToolbarButton
                        label="Undo" glyph="↶"
                        active=Signal::derive(|| false)
                        disabled=Signal::derive(move || !can_undo.get())
                        on_press=Callback::new(move |_| exec(ToolbarCmd::Undo))
                    />
                    <ToolbarButton
                        label="Redo" glyph="↷"
                        active=Signal::derive(|| false)
                        disabled=Signal::derive(move || !can_redo.get())
                        on_press=Callback::new(move |_| exec(ToolbarCmd::Redo))
                    />
                </div>

                // Inline marks
                <div class="flex gap-0.5">
                    {mark_btn(ToolbarCmd::Bold, MarkKind::Bold, "Bold", "B")}
                    {mark_btn(ToolbarCmd::Italic, MarkKind::Italic, "Italic", "I")}
                    {mark_btn(ToolbarCmd::Underline, MarkKind::Underline, "Underline", "U")}
                    {mark_btn(ToolbarCmd::Strike, MarkKind::Strike, "Strikethrough", "S")}
                    {mark_btn(ToolbarCmd::Highlight, MarkKind::Highlight, "Highlight", "M")}
                    {mark_btn(ToolbarCmd::Superscript, MarkKind::Superscript, "Superscript", "x²")}
                    {mark_btn(ToolbarCmd::Subscript, MarkKind::Subscript, "Subscript", "x₂")}
                </div>

                // Headings
                <div class="flex gap-0.5">
                    {block_btn(ToolbarCmd::Heading(1), |b| *b == ActiveBlock::Heading(1), "Heading 1", "H1")}
                    {block_btn(ToolbarCmd::Heading(2), |b| *b == ActiveBlock::Heading(2), "Heading 2", "H2")}
                    {block_btn(ToolbarCmd::Heading(3), |b| *b == ActiveBlock::Heading(3), "Heading 3", "H3")}
                </div>

                // Lists and quote
                <div class="flex gap-0.5">
                    {block_btn(ToolbarCmd::BulletList, |b| *b == ActiveBlock::BulletList, "Bullet list", "•≡")}
                    {block_btn(ToolbarCmd::OrderedList, |b| *b == ActiveBlock::OrderedList, "Ordered list", "1≡")}
                    {block_btn(ToolbarCmd::TaskList, |b| *b == ActiveBlock::TaskList, "Task list", "☑")}
                    {block_btn(ToolbarCmd::Blockquote, |b| *b == ActiveBlock::Blockquote, "Quote", "❝")}
                    {block_btn(ToolbarCmd::CodeBlock, |b| *b == ActiveBlock::CodeBlock, "Code block", "</>")}
                </div>

                // Alignment
                <div class="flex gap-0.5">
                    <ToolbarButton
                        label="Align left" glyph="⇤"
                        active=Signal::derive(move || active_align.get() == Some(TextAlign::Left))
                        on_press=Callback::new(move |_| exec(ToolbarCmd::Align(TextAlign::Left)))
                    />
                    <ToolbarButton
                        label="Align center" glyph="⇹"
                        active=Signal::derive(move || active_align.get() == Some(TextAlign::Center))
                        on_press=Callback::new(move |_| exec(ToolbarCmd::Align(TextAlign::Center)))
                    />
                    <ToolbarButton
                        label="Align right" glyph="⇥"
                        active=Signal::derive(move || active_align.get() == Some(TextAlign::Right))
                        on_press=Callback::new(move |_| exec(ToolbarCmd::Align(TextAlign::Right)))
                    />
                </div>

                // Insertions
                <div class="flex gap-0.5">
                    {mark_btn(ToolbarCmd::Link, MarkKind::Link, "Link", "🔗")}
                    <ToolbarButton
                        label="Image" glyph="🖼"
                        active=Signal::derive(|| false)
                        on_press=Callback::new(move |_| exec(ToolbarCmd::Image))
                    />
                    <ToolbarButton
                        label="Table" glyph="⊞"
                        active=Signal::derive(move || active_block.get() == ActiveBlock::Table)
                        on_press=Callback::new(move |_| exec(ToolbarCmd::Table))
                    />
                    <ToolbarButton
                        label="Horizontal rule" glyph="—"
                        active=Signal::derive(|| false)
                        on_press=Callback::new(move |_| exec(ToolbarCmd::Rule))
                    />
                </div>
            </div>

            <div
                node_ref=surface_ref
                class="prose max-w-none min-h-[240px] w-full rounded-md border border-input bg-background p-4 text-sm focus:outline-none"
                contenteditable="true"
                spellcheck="true"
                on:input=on_input
                on:keydown=on_keydown
                on:mouseup=move |_| { sync_selection(); refresh_toolbar(); }
                on:keyup=move |_| { sync_selection(); refresh_toolbar(); }
                inner_html=move || doc_html.get()
            ></div>
        </div>
    }
}

#[component]
fn ToolbarButton(
    label: &'static str,
    glyph: &'static str,
    active: Signal<bool>,
    #[prop(optional)] disabled: Option<Signal<bool>>,
    on_press: Callback<()>,
) -> impl IntoView {
    let classes = move || {
        let base = "inline-flex h-8 w-8 items-center justify-center rounded-md text-xs \
                    font-medium transition-colors hover:bg-accent hover:text-accent-foreground \
                    disabled:pointer-events-none disabled:opacity-50";
        if active.get() {
            format!("{base} bg-primary text-primary-foreground")
        } else {
            format!("{base} text-muted-foreground")
        }
    };

    view! {
        <button
            type="button"
            title=label
            class=classes
            disabled=move || disabled.map(|d| d.get()).unwrap_or(false)
            on:mousedown=move |ev: web_sys::MouseEvent| {
                // Keep the editor selection alive while clicking toolbar
                // buttons.
                ev.prevent_default();
            }
            on:click=move |_| on_press.run(())
        >
            {glyph}
        </button>
    }
}

/// Category assignment for the open note (the category forest itself is
/// managed elsewhere; this only picks one).
#[component]
fn CategoryPicker(
    categories: RwSignal<Vec<Category>>,
    selected: RwSignal<Option<String>>,
    on_select: Callback<Option<String>>,
) -> impl IntoView {
    let on_change = move |ev: web_sys::Event| {
        let Some(target) = ev.target() else {
            return;
        };
        let Ok(select) = target.dyn_into::<web_sys::HtmlSelectElement>() else {
            return;
        };
        let value = select.value();
        let picked = if value.is_empty() { None } else { Some(value) };
        selected.set(picked.clone());
        on_select.run(picked);
    };

    view! {
        <select
            class="h-8 rounded-md border border-input bg-background px-2 text-xs text-foreground"
            on:change=on_change
        >
            <option value="" selected=move || selected.get().is_none()>
                "No category"
            </option>
            {move || {
                categories
                    .get()
                    .into_iter()
                    .map(|c| {
                        let id = c.id.clone();
                        let is_selected = move || selected.get().as_deref() == Some(id.as_str());
                        view! {
                            <option value=c.id.clone() selected=is_selected>
                                {c.name.clone()}
                            </option>
                        }
                    })
                    .collect_view()
            }}
        </select>
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_utf16_char_conversion_handles_surrogates() {
        let s = "a𝕏b"; // 𝕏 is 2 UTF-16 units, 1 char
        assert_eq!(utf16_to_char_idx(s, 0), 0);
        assert_eq!(utf16_to_char_idx(s, 1), 1);
        assert_eq!(utf16_to_char_idx(s, 3), 2);
        assert_eq!(utf16_to_char_idx(s, 4), 3);
        assert_eq!(char_idx_to_utf16(s, 2), 3);
        assert_eq!(char_idx_to_utf16(s, 3), 4);
    }

    #[test]
    fn test_block_offset_roundtrip_through_nested_structure() {
        let doc = Document::parse(
            "<p>Hello <strong>world</strong></p><ul><li><p>item</p></li></ul>",
        );

        // Char 8 of block 0 falls inside the bold run ("wo|rld").
        let pos = position_at_block_offset(&doc, BlockOffset { block: 0, chars: 8 });
        assert_eq!(pos.path, vec![0, 1]);
        assert_eq!(pos.offset, 2);
        assert_eq!(
            block_offset_of_position(&doc, &pos),
            BlockOffset { block: 0, chars: 8 }
        );

        // Block 1 offsets descend into the list item.
        let pos = position_at_block_offset(&doc, BlockOffset { block: 1, chars: 2 });
        assert_eq!(pos.path, vec![1, 0, 0, 0]);
        assert_eq!(pos.offset, 2);
    }

    #[test]
    fn test_block_offset_clamps_past_end() {
        let doc = Document::parse("<p>ab</p>");
        let pos = position_at_block_offset(&doc, BlockOffset { block: 0, chars: 99 });
        assert_eq!(pos.path, vec![0, 0]);
        assert_eq!(pos.offset, 2);
    }
}
