//! Document ⇄ markup codec.
//!
//! `serialize` is deterministic: container/leaf nesting mirrors the tree and
//! marks are emitted in one canonical order, so re-serializing a parsed
//! document is byte-stable. `parse` is permissive by contract: persisted
//! content may come from an older schema, so unknown tags degrade to
//! transparent containers, broken nesting is repaired, and no input ever
//! produces an error.

use crate::doc::{same_mark_set, Document, Mark, Node, NodeKind, TextAlign};

pub(crate) fn serialize(doc: &Document) -> String {
    let mut out = String::new();
    for block in doc.blocks() {
        write_node(block, &mut out);
    }
    out
}

pub(crate) fn parse(markup: &str) -> Document {
    let raw = parse_raw(markup);
    let mut blocks = Vec::new();
    let mut pending = InlineBuffer::default();

    lower_block_children(&raw, &mut pending, &mut blocks, &[]);
    pending.flush_into(&mut blocks);

    // Lowering only builds legal nodes; an empty result still becomes the
    // one-empty-paragraph document.
    Document::from_blocks(blocks).unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Serialization
// ---------------------------------------------------------------------------

fn write_node(node: &Node, out: &mut String) {
    match &node.kind {
        NodeKind::Text => write_text_leaf(node, out),
        NodeKind::Paragraph => write_container(node, "p", out),
        NodeKind::Heading { level } => {
            let tag = match level {
                1 => "h1",
                2 => "h2",
                _ => "h3",
            };
            write_container(node, tag, out);
        }
        NodeKind::BulletList => write_container(node, "ul", out),
        NodeKind::OrderedList => write_container(node, "ol", out),
        NodeKind::ListItem => write_container(node, "li", out),
        NodeKind::TaskList => {
            out.push_str("<ul data-type=\"taskList\">");
            write_children(node, out);
            out.push_str("</ul>");
        }
        NodeKind::TaskItem { checked } => {
            out.push_str("<li data-checked=\"");
            out.push_str(if *checked { "true" } else { "false" });
            out.push_str("\">");
            write_children(node, out);
            out.push_str("</li>");
        }
        NodeKind::Table => write_container(node, "table", out),
        NodeKind::TableRow => write_container(node, "tr", out),
        NodeKind::TableCell => write_container(node, "td", out),
        NodeKind::Blockquote => write_container(node, "blockquote", out),
        NodeKind::CodeBlock { language } => {
            out.push_str("<pre><code");
            if let Some(lang) = language {
                out.push_str(" class=\"language-");
                out.push_str(&escape_attr(lang));
                out.push('"');
            }
            out.push('>');
            for child in &node.children {
                if let Some(t) = &child.text {
                    out.push_str(&escape_text(t));
                }
            }
            out.push_str("</code></pre>");
        }
        NodeKind::Image { src } => {
            out.push_str("<img src=\"");
            out.push_str(&escape_attr(src));
            out.push_str("\">");
        }
        NodeKind::HorizontalRule => out.push_str("<hr>"),
    }
}

fn write_container(node: &Node, tag: &str, out: &mut String) {
    out.push('<');
    out.push_str(tag);
    if let Some(align) = node.align {
        out.push_str(" style=\"text-align: ");
        out.push_str(align.as_ref());
        out.push_str("\"");
    }
    out.push('>');
    write_children(node, out);
    out.push_str("</");
    out.push_str(tag);
    out.push('>');
}

/// Write children, coalescing adjacent text leaves that carry the same mark
/// set. The in-memory tree may hold split runs after mark edits; merging at
/// write time keeps the serialized form canonical.
fn write_children(node: &Node, out: &mut String) {
    let children = &node.children;
    let mut i = 0;

    while i < children.len() {
        let child = &children[i];
        if !child.is_text() {
            write_node(child, out);
            i += 1;
            continue;
        }

        let mut merged = child.text.clone().unwrap_or_default();
        let mut j = i + 1;
        while j < children.len()
            && children[j].is_text()
            && same_mark_set(&children[j].marks, &child.marks)
        {
            merged.push_str(children[j].text.as_deref().unwrap_or_default());
            j += 1;
        }

        if j == i + 1 {
            write_text_leaf(child, out);
        } else {
            let mut leaf = child.clone();
            leaf.text = Some(merged);
            write_text_leaf(&leaf, out);
        }
        i = j;
    }
}

fn write_text_leaf(node: &Node, out: &mut String) {
    let text = node.text.as_deref().unwrap_or_default();

    // Marks are kept sorted (see `sorted_marks`), so opening them in order
    // and closing in reverse yields the canonical nesting.
    let mut close_stack: Vec<String> = Vec::new();
    for mark in &node.marks {
        match mark {
            Mark::Link { href } => {
                out.push_str("<a href=\"");
                out.push_str(&escape_attr(href));
                out.push_str("\">");
                close_stack.push("</a>".to_string());
            }
            Mark::Bold => {
                out.push_str("<strong>");
                close_stack.push("</strong>".to_string());
            }
            Mark::Italic => {
                out.push_str("<em>");
                close_stack.push("</em>".to_string());
            }
            Mark::Underline => {
                out.push_str("<u>");
                close_stack.push("</u>".to_string());
            }
            Mark::Strike => {
                out.push_str("<s>");
                close_stack.push("</s>".to_string());
            }
            Mark::Highlight { color } => {
                match color {
                    Some(c) => {
                        out.push_str("<mark data-color=\"");
                        out.push_str(&escape_attr(c));
                        out.push_str("\">");
                    }
                    None => out.push_str("<mark>"),
                }
                close_stack.push("</mark>".to_string());
            }
            Mark::Superscript => {
                out.push_str("<sup>");
                close_stack.push("</sup>".to_string());
            }
            Mark::Subscript => {
                out.push_str("<sub>");
                close_stack.push("</sub>".to_string());
            }
            Mark::TextStyle { color, font } => {
                out.push_str("<span style=\"");
                let mut first = true;
                if let Some(c) = color {
                    out.push_str("color: ");
                    out.push_str(&escape_attr(c));
                    first = false;
                }
                if let Some(f) = font {
                    if !first {
                        out.push_str("; ");
                    }
                    out.push_str("font-family: ");
                    out.push_str(&escape_attr(f));
                }
                out.push_str("\">");
                close_stack.push("</span>".to_string());
            }
        }
    }

    out.push_str(&escape_text(text));

    while let Some(close) = close_stack.pop() {
        out.push_str(&close);
    }
}

fn escape_text(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(ch),
        }
    }
    out
}

fn escape_attr(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Raw parsing: markup -> generic tag tree (no schema knowledge)
// ---------------------------------------------------------------------------

#[derive(Clone, Debug)]
enum Raw {
    Text(String),
    Element {
        name: String,
        attrs: Vec<(String, String)>,
        children: Vec<Raw>,
    },
}

impl Raw {
    fn attr(&self, key: &str) -> Option<&str> {
        match self {
            Raw::Element { attrs, .. } => attrs
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.as_str()),
            Raw::Text(_) => None,
        }
    }
}

fn is_void_tag(name: &str) -> bool {
    matches!(name, "img" | "hr" | "br" | "input" | "meta" | "link")
}

/// Tokenize + build the raw tree in one pass. Unclosed tags auto-close at
/// end of input; stray closing tags pop up to the matching open element if
/// one exists and are ignored otherwise.
fn parse_raw(input: &str) -> Vec<Raw> {
    struct Open {
        name: String,
        attrs: Vec<(String, String)>,
        children: Vec<Raw>,
    }

    let mut roots: Vec<Raw> = Vec::new();
    let mut stack: Vec<Open> = Vec::new();
    let bytes = input.as_bytes();
    let mut i = 0;

    fn push_node(roots: &mut Vec<Raw>, stack: &mut [Open], node: Raw) {
        if let Some(top) = stack.last_mut() {
            top.children.push(node);
        } else {
            roots.push(node);
        }
    }

    while i < bytes.len() {
        if bytes[i] != b'<' {
            let start = i;
            while i < bytes.len() && bytes[i] != b'<' {
                i += 1;
            }
            let text = decode_entities(&input[start..i]);
            if !text.is_empty() {
                push_node(&mut roots, &mut stack, Raw::Text(text));
            }
            continue;
        }

        // Comments and doctype-ish constructs are skipped wholesale.
        if input[i..].starts_with("<!--") {
            i = match input[i..].find("-->") {
                Some(end) => i + end + 3,
                None => bytes.len(),
            };
            continue;
        }
        if i + 1 < bytes.len() && (bytes[i + 1] == b'!' || bytes[i + 1] == b'?') {
            i = match input[i..].find('>') {
                Some(end) => i + end + 1,
                None => bytes.len(),
            };
            continue;
        }

        let Some(rel_end) = input[i..].find('>') else {
            // A dangling `<` near EOF is literal text.
            push_node(&mut roots, &mut stack, Raw::Text(input[i..].to_string()));
            break;
        };
        let inner = &input[i + 1..i + rel_end];
        i += rel_end + 1;

        if let Some(name) = inner.strip_prefix('/') {
            let name = name.trim().to_ascii_lowercase();
            // Close the nearest matching open element, auto-closing anything
            // opened after it. Unmatched closers are dropped.
            if let Some(pos) = stack.iter().rposition(|o| o.name == name) {
                while stack.len() > pos {
                    let Some(done) = stack.pop() else {
                        break;
                    };
                    push_node(
                        &mut roots,
                        &mut stack,
                        Raw::Element {
                            name: done.name,
                            attrs: done.attrs,
                            children: done.children,
                        },
                    );
                }
            }
            continue;
        }

        let self_closing = inner.ends_with('/');
        let inner = inner.strip_suffix('/').unwrap_or(inner);
        let (name, attrs) = parse_tag_body(inner);
        if name.is_empty() {
            continue;
        }

        if self_closing || is_void_tag(&name) {
            push_node(
                &mut roots,
                &mut stack,
                Raw::Element {
                    name,
                    attrs,
                    children: Vec::new(),
                },
            );
        } else {
            stack.push(Open {
                name,
                attrs,
                children: Vec::new(),
            });
        }
    }

    while let Some(done) = stack.pop() {
        push_node(
            &mut roots,
            &mut stack,
            Raw::Element {
                name: done.name,
                attrs: done.attrs,
                children: done.children,
            },
        );
    }

    roots
}

fn parse_tag_body(s: &str) -> (String, Vec<(String, String)>) {
    let s = s.trim();
    let name_end = s
        .find(|c: char| c.is_whitespace())
        .unwrap_or(s.len());
    let name = s[..name_end].to_ascii_lowercase();
    let mut attrs = Vec::new();

    let rest = &s[name_end..];
    let chars: Vec<char> = rest.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        while i < chars.len() && chars[i].is_whitespace() {
            i += 1;
        }
        if i >= chars.len() {
            break;
        }

        let key_start = i;
        while i < chars.len() && chars[i] != '=' && !chars[i].is_whitespace() {
            i += 1;
        }
        let key: String = chars[key_start..i].iter().collect::<String>().to_ascii_lowercase();
        if key.is_empty() {
            i += 1;
            continue;
        }

        while i < chars.len() && chars[i].is_whitespace() {
            i += 1;
        }

        if i >= chars.len() || chars[i] != '=' {
            attrs.push((key, String::new()));
            continue;
        }
        i += 1; // consume '='
        while i < chars.len() && chars[i].is_whitespace() {
            i += 1;
        }

        let value = if i < chars.len() && (chars[i] == '"' || chars[i] == '\'') {
            let quote = chars[i];
            i += 1;
            let val_start = i;
            while i < chars.len() && chars[i] != quote {
                i += 1;
            }
            let v: String = chars[val_start..i].iter().collect();
            if i < chars.len() {
                i += 1; // consume closing quote
            }
            v
        } else {
            let val_start = i;
            while i < chars.len() && !chars[i].is_whitespace() {
                i += 1;
            }
            chars[val_start..i].iter().collect()
        };

        attrs.push((key, decode_entities(&value)));
    }

    (name, attrs)
}

fn decode_entities(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut rest = s;

    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];

        // Entities are short; give up after a handful of chars so stray
        // ampersands stay literal.
        let semi = rest
            .char_indices()
            .take(12)
            .find(|(_, c)| *c == ';')
            .map(|(i, _)| i);
        let Some(semi) = semi else {
            out.push('&');
            rest = &rest[1..];
            continue;
        };

        let entity = &rest[1..semi];
        let decoded = match entity {
            "amp" => Some('&'),
            "lt" => Some('<'),
            "gt" => Some('>'),
            "quot" => Some('"'),
            "apos" => Some('\''),
            "nbsp" => Some(' '),
            _ => entity
                .strip_prefix('#')
                .and_then(|num| {
                    if let Some(hex) = num.strip_prefix('x').or_else(|| num.strip_prefix('X')) {
                        u32::from_str_radix(hex, 16).ok()
                    } else {
                        num.parse::<u32>().ok()
                    }
                })
                .and_then(char::from_u32),
        };

        match decoded {
            Some(c) => {
                out.push(c);
                rest = &rest[semi + 1..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }

    out.push_str(rest);
    out
}

// ---------------------------------------------------------------------------
// Lowering: raw tree -> well-formed document nodes
// ---------------------------------------------------------------------------

/// Inline content accumulated while walking block context, flushed into an
/// implicit paragraph when a real block begins (this is how stray text and
/// unknown inline wrappers degrade to paragraphs).
#[derive(Default)]
struct InlineBuffer {
    runs: Vec<Node>,
}

impl InlineBuffer {
    fn push_text(&mut self, text: &str, marks: &[Mark]) {
        if text.is_empty() {
            return;
        }

        // Merge with the previous run when the mark set is identical, so
        // split raw text nodes normalize to one leaf. Compare in canonical
        // order; nesting order in the source is irrelevant.
        let marks = crate::doc::sorted_marks(marks.to_vec());
        if let Some(last) = self.runs.last_mut() {
            if same_mark_set(&last.marks, &marks) {
                if let Some(t) = &mut last.text {
                    t.push_str(text);
                    return;
                }
            }
        }

        self.runs.push(Node::text_with_marks(text, marks));
    }

    fn flush_into(&mut self, out: &mut Vec<Node>) {
        if self.runs.is_empty() {
            return;
        }
        let runs = std::mem::take(&mut self.runs);
        if runs.iter().all(|r| is_blank(r.text.as_deref())) {
            return;
        }
        out.push(Node::paragraph(runs));
    }
}

fn is_blank(text: Option<&str>) -> bool {
    text.map(|t| t.chars().all(|c| c.is_whitespace()))
        .unwrap_or(true)
}

fn heading_level(name: &str) -> Option<u8> {
    match name {
        "h1" => Some(1),
        "h2" => Some(2),
        // Levels beyond the supported three degrade to the deepest one.
        "h3" | "h4" | "h5" | "h6" => Some(3),
        _ => None,
    }
}

fn mark_for(raw: &Raw, name: &str) -> Option<Mark> {
    match name {
        "strong" | "b" => Some(Mark::Bold),
        "em" | "i" => Some(Mark::Italic),
        "u" => Some(Mark::Underline),
        "s" | "del" | "strike" => Some(Mark::Strike),
        "sup" => Some(Mark::Superscript),
        "sub" => Some(Mark::Subscript),
        "mark" => Some(Mark::Highlight {
            color: raw.attr("data-color").map(|c| c.to_string()),
        }),
        "a" => Some(Mark::Link {
            href: raw.attr("href").unwrap_or_default().to_string(),
        }),
        "span" => {
            let style = raw.attr("style").unwrap_or_default();
            let color = style_value(style, "color");
            let font = style_value(style, "font-family");
            if color.is_none() && font.is_none() {
                None
            } else {
                Some(Mark::TextStyle { color, font })
            }
        }
        _ => None,
    }
}

fn style_value(style: &str, key: &str) -> Option<String> {
    for decl in style.split(';') {
        let mut parts = decl.splitn(2, ':');
        let k = parts.next().unwrap_or_default().trim();
        let v = parts.next().unwrap_or_default().trim();
        if k.eq_ignore_ascii_case(key) && !v.is_empty() {
            return Some(v.to_string());
        }
    }
    None
}

fn parse_align(raw: &Raw) -> Option<TextAlign> {
    let style = raw.attr("style")?;
    match style_value(style, "text-align")?.as_str() {
        "left" => Some(TextAlign::Left),
        "center" => Some(TextAlign::Center),
        "right" => Some(TextAlign::Right),
        _ => None,
    }
}

fn lower_block_children(
    raws: &[Raw],
    pending: &mut InlineBuffer,
    out: &mut Vec<Node>,
    marks: &[Mark],
) {
    for raw in raws {
        match raw {
            Raw::Text(t) => pending.push_text(t, marks),
            Raw::Element { name, children, .. } => {
                if let Some(mark) = mark_for(raw, name) {
                    let mut nested = marks.to_vec();
                    nested.push(mark);
                    lower_block_children(children, pending, out, &nested);
                    continue;
                }

                if let Some(block) = lower_block_element(raw, name, children) {
                    pending.flush_into(out);
                    out.push(block);
                    continue;
                }

                // Unknown or transparent container (div, tbody, span without
                // styles, future tags): its children are lowered in place.
                lower_block_children(children, pending, out, marks);
            }
        }
    }
}

/// Build a block node from a known block tag; `None` means "not a block"
/// and the caller treats the element as transparent.
fn lower_block_element(raw: &Raw, name: &str, children: &[Raw]) -> Option<Node> {
    if let Some(level) = heading_level(name) {
        let mut node = Node::with_children(
            NodeKind::Heading { level },
            lower_inline_children(children),
        );
        node.align = parse_align(raw);
        return Some(node);
    }

    match name {
        "p" => {
            let mut node = Node::paragraph(lower_inline_children(children));
            node.align = parse_align(raw);
            Some(node)
        }
        "ul" => {
            if raw.attr("data-type") == Some("taskList") {
                Some(Node::with_children(
                    NodeKind::TaskList,
                    lower_list_items(children, true),
                ))
            } else {
                Some(Node::with_children(
                    NodeKind::BulletList,
                    lower_list_items(children, false),
                ))
            }
        }
        "ol" => Some(Node::with_children(
            NodeKind::OrderedList,
            lower_list_items(children, false),
        )),
        "blockquote" => Some(Node::with_children(
            NodeKind::Blockquote,
            lower_nested_blocks(children),
        )),
        "table" => Some(Node::with_children(
            NodeKind::Table,
            lower_table_rows(children),
        )),
        "pre" => Some(lower_code_block(children)),
        "img" => Some(Node::new(NodeKind::Image {
            src: raw.attr("src").unwrap_or_default().to_string(),
        })),
        "hr" => Some(Node::new(NodeKind::HorizontalRule)),
        _ => None,
    }
}

/// Lower children in a blocks-only context (list item, blockquote, cell).
/// Trailing inline content becomes a final paragraph.
fn lower_nested_blocks(raws: &[Raw]) -> Vec<Node> {
    let mut out = Vec::new();
    let mut pending = InlineBuffer::default();
    lower_block_children(raws, &mut pending, &mut out, &[]);
    pending.flush_into(&mut out);
    if out.is_empty() {
        out.push(Node::empty_paragraph());
    }
    out
}

/// Inline-only context (paragraph, heading). Nested block tags are treated
/// as transparent so their text still survives.
fn lower_inline_children(raws: &[Raw]) -> Vec<Node> {
    let mut buf = InlineBuffer::default();
    collect_inline(raws, &[], &mut buf);
    buf.runs
        .into_iter()
        .filter(|r| !r.text.as_deref().unwrap_or_default().is_empty())
        .collect()
}

fn collect_inline(raws: &[Raw], marks: &[Mark], buf: &mut InlineBuffer) {
    for raw in raws {
        match raw {
            Raw::Text(t) => buf.push_text(t, marks),
            Raw::Element { name, children, .. } => {
                if name == "br" {
                    buf.push_text("\n", marks);
                    continue;
                }
                if name == "img" || name == "hr" {
                    // Void blocks have no inline degradation; dropped.
                    continue;
                }
                match mark_for(raw, name) {
                    Some(mark) => {
                        let mut nested = marks.to_vec();
                        nested.push(mark);
                        collect_inline(children, &nested, buf);
                    }
                    None => collect_inline(children, marks, buf),
                }
            }
        }
    }
}

fn lower_list_items(raws: &[Raw], task: bool) -> Vec<Node> {
    let mut items = Vec::new();

    for raw in raws {
        match raw {
            Raw::Element { name, children, .. } if name == "li" => {
                let kind = if task {
                    NodeKind::TaskItem {
                        checked: raw.attr("data-checked") == Some("true"),
                    }
                } else {
                    NodeKind::ListItem
                };
                items.push(Node::with_children(kind, lower_nested_blocks(children)));
            }
            Raw::Element { children, .. } => {
                // A nested wrapper between the list and its items is
                // transparent; anything else is hoisted into an item so the
                // content survives.
                let nested = lower_list_items(children, task);
                if !nested.is_empty() {
                    items.extend(nested);
                } else {
                    let blocks = lower_nested_blocks(std::slice::from_ref(raw));
                    let kind = if task {
                        NodeKind::TaskItem { checked: false }
                    } else {
                        NodeKind::ListItem
                    };
                    items.push(Node::with_children(kind, blocks));
                }
            }
            Raw::Text(t) => {
                if !t.chars().all(|c| c.is_whitespace()) {
                    let kind = if task {
                        NodeKind::TaskItem { checked: false }
                    } else {
                        NodeKind::ListItem
                    };
                    items.push(Node::with_children(
                        kind,
                        vec![Node::paragraph(vec![Node::text(t.clone())])],
                    ));
                }
            }
        }
    }

    if items.is_empty() {
        let kind = if task {
            NodeKind::TaskItem { checked: false }
        } else {
            NodeKind::ListItem
        };
        items.push(Node::with_children(kind, vec![Node::empty_paragraph()]));
    }

    items
}

fn lower_table_rows(raws: &[Raw]) -> Vec<Node> {
    let mut rows = Vec::new();

    for raw in raws {
        match raw {
            Raw::Element { name, children, .. } if name == "tr" => {
                let mut cells = Vec::new();
                for cell in children {
                    if let Raw::Element { name, children, .. } = cell {
                        if name == "td" || name == "th" {
                            cells.push(Node::with_children(
                                NodeKind::TableCell,
                                lower_nested_blocks(children),
                            ));
                        }
                    }
                }
                if cells.is_empty() {
                    cells.push(Node::with_children(
                        NodeKind::TableCell,
                        vec![Node::empty_paragraph()],
                    ));
                }
                rows.push(Node::with_children(NodeKind::TableRow, cells));
            }
            // thead/tbody/tfoot wrappers are transparent.
            Raw::Element { children, .. } => rows.extend(lower_table_rows(children)),
            Raw::Text(_) => {}
        }
    }

    if rows.is_empty() {
        rows.push(Node::with_children(
            NodeKind::TableRow,
            vec![Node::with_children(
                NodeKind::TableCell,
                vec![Node::empty_paragraph()],
            )],
        ));
    }

    rows
}

fn lower_code_block(children: &[Raw]) -> Node {
    // <pre><code class="language-x"> is canonical, but bare <pre> text is
    // accepted too.
    let mut language = None;
    let mut text = String::new();

    fn collect_raw_text(raws: &[Raw], out: &mut String) {
        for raw in raws {
            match raw {
                Raw::Text(t) => out.push_str(t),
                Raw::Element { name, children, .. } => {
                    if name == "br" {
                        out.push('\n');
                    }
                    collect_raw_text(children, out);
                }
            }
        }
    }

    for child in children {
        if let Raw::Element { name, .. } = child {
            if name == "code" {
                language = child.attr("class").and_then(|c| {
                    c.split_whitespace()
                        .find_map(|cls| cls.strip_prefix("language-"))
                        .map(|l| l.to_string())
                });
            }
        }
    }
    collect_raw_text(children, &mut text);

    let children = if text.is_empty() {
        Vec::new()
    } else {
        vec![Node::text(text)]
    };

    Node::with_children(NodeKind::CodeBlock { language }, children)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doc::Mark;

    fn roundtrip(markup: &str) -> String {
        serialize(&parse(markup))
    }

    #[test]
    fn test_serialize_basic_blocks() {
        let doc = Document::from_blocks(vec![
            Node::with_children(NodeKind::Heading { level: 1 }, vec![Node::text("Title")]),
            Node::paragraph(vec![
                Node::text("Hello "),
                Node::text_with_marks("world", vec![Mark::Bold]),
            ]),
        ])
        .expect("well-formed");

        assert_eq!(
            serialize(&doc),
            "<h1>Title</h1><p>Hello <strong>world</strong></p>"
        );
    }

    #[test]
    fn test_parse_reconstructs_marks_and_structure() {
        let doc = parse("<h1>Title</h1><p>Hello <b>world</b></p>");
        assert_eq!(doc.blocks().len(), 2);
        assert_eq!(doc.blocks()[0].kind, NodeKind::Heading { level: 1 });

        let para = &doc.blocks()[1];
        assert_eq!(para.children.len(), 2);
        assert_eq!(para.children[1].text.as_deref(), Some("world"));
        assert!(para.children[1].has_mark(crate::doc::MarkKind::Bold));
    }

    #[test]
    fn test_roundtrip_is_idempotent() {
        let inputs = [
            "<h1>Title</h1><p>Hello <b>world</b></p>",
            "<ul><li><p>a</p></li><li><p>b</p></li></ul>",
            "<ul data-type=\"taskList\"><li data-checked=\"true\"><p>done</p></li></ul>",
            "<table><tr><td><p>x</p></td><td><p>y</p></td></tr></table>",
            "<pre><code class=\"language-rust\">fn main() {}</code></pre>",
            "<blockquote><p>quoted</p></blockquote>",
            "<p style=\"text-align: center\">mid</p><hr><img src=\"https://x/y.png\">",
            "<p><a href=\"https://example.com\"><strong>link</strong></a> plain</p>",
            "<p><span style=\"color: red; font-family: serif\">styled</span></p>",
            "<p><mark data-color=\"#ff0\">hi</mark> <sup>a</sup><sub>b</sub></p>",
        ];

        for input in inputs {
            let once = roundtrip(input);
            let twice = serialize(&parse(&once));
            assert_eq!(once, twice, "roundtrip not stable for {input}");
        }
    }

    #[test]
    fn test_unknown_tags_degrade_to_paragraph_text() {
        let doc = parse("<widget data-x=\"1\">hello <blink>there</blink></widget>");
        assert_eq!(doc.blocks().len(), 1);
        assert_eq!(doc.blocks()[0].kind, NodeKind::Paragraph);
        assert_eq!(doc.text_content(), "hello there");
    }

    #[test]
    fn test_broken_nesting_is_repaired() {
        // <b> left open across a block boundary, stray </i>.
        let doc = parse("<p><b>bold</p><p>after</i></p>");
        let out = serialize(&doc);
        assert!(out.contains("<strong>bold</strong>"));
        assert!(out.contains("<p>after</p>"));
        assert_eq!(serialize(&parse(&out)), out);
    }

    #[test]
    fn test_stray_text_wrapped_in_paragraph() {
        let doc = parse("loose text<p>real</p>");
        assert_eq!(doc.blocks().len(), 2);
        assert_eq!(doc.blocks()[0].kind, NodeKind::Paragraph);
        assert_eq!(doc.text_content(), "loose text\nreal");
    }

    #[test]
    fn test_entities_decode_and_escape() {
        let doc = parse("<p>a &amp; b &lt;c&gt; &#233;</p>");
        assert_eq!(doc.text_content(), "a & b <c> é");
        assert_eq!(serialize(&doc), "<p>a &amp; b &lt;c&gt; é</p>");
    }

    #[test]
    fn test_list_with_bare_inline_items() {
        // Items without the canonical inner paragraph still parse.
        let doc = parse("<ul><li>one</li><li>two</li></ul>");
        let list = &doc.blocks()[0];
        assert_eq!(list.kind, NodeKind::BulletList);
        assert_eq!(list.children.len(), 2);
        assert_eq!(list.children[0].kind, NodeKind::ListItem);
        assert_eq!(list.children[0].children[0].kind, NodeKind::Paragraph);
    }

    #[test]
    fn test_tbody_is_transparent() {
        let doc = parse("<table><tbody><tr><td>x</td></tr></tbody></table>");
        let table = &doc.blocks()[0];
        assert_eq!(table.children.len(), 1);
        assert_eq!(table.children[0].kind, NodeKind::TableRow);
    }

    #[test]
    fn test_heading_levels_clamp() {
        let doc = parse("<h5>deep</h5>");
        assert_eq!(doc.blocks()[0].kind, NodeKind::Heading { level: 3 });
    }

    #[test]
    fn test_empty_input_yields_empty_paragraph() {
        let doc = parse("");
        assert_eq!(doc.blocks().len(), 1);
        assert_eq!(doc.blocks()[0].kind, NodeKind::Paragraph);
        assert_eq!(serialize(&doc), "<p></p>");
    }

    #[test]
    fn test_malformed_input_never_panics() {
        for junk in [
            "<",
            "<p",
            "<p><b>",
            "</div></div>",
            "<img",
            "<table><td>orphan</td></table>",
            "<!-- unterminated",
            "<p>&bogus; &#xZZ; &amp</p>",
        ] {
            let _ = parse(junk);
        }
    }

    #[test]
    fn test_mark_order_is_canonical() {
        // Same formatting, different source nesting -> same serialization.
        let a = roundtrip("<p><strong><em>x</em></strong></p>");
        let b = roundtrip("<p><em><strong>x</strong></em></p>");
        assert_eq!(a, b);
    }
}
