//! Note export: Markdown with front matter, or a standalone HTML page.

use crate::doc::{Document, Mark, MarkKind, Node, NodeKind};
use crate::models::Note;
use wasm_bindgen::JsCast;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ExportFormat {
    Markdown,
    Html,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Markdown => "md",
            ExportFormat::Html => "html",
        }
    }
}

pub(crate) fn export_note(note: &Note, format: ExportFormat) -> String {
    match format {
        ExportFormat::Markdown => note_to_markdown(note),
        ExportFormat::Html => note_to_html(note),
    }
}

pub(crate) fn note_to_markdown(note: &Note) -> String {
    let mut out = format!(
        "---\ntitle: {}\ndate: {}\nupdated: {}\ntags: {}\n---\n\n",
        note.display_title(),
        note.created_at,
        note.updated_at,
        note.tags.join(", ")
    );

    let doc = Document::parse(&note.content);
    for (i, block) in doc.blocks().iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        render_block_md(block, "", &mut out);
    }
    out
}

pub(crate) fn note_to_html(note: &Note) -> String {
    let title = note.display_title();
    let tags = note
        .tags
        .iter()
        .map(|t| format!("<meta name=\"tag\" content=\"{t}\">"))
        .collect::<Vec<_>>()
        .join("\n  ");

    format!(
        "<!DOCTYPE html>\n<html>\n<head>\n  <meta charset=\"utf-8\">\n  \
         <title>{title}</title>\n  <meta name=\"date\" content=\"{created}\">\n  \
         <meta name=\"last-modified\" content=\"{updated}\">\n  {tags}\n  <style>\n    \
         body {{\n      max-width: 800px;\n      margin: 40px auto;\n      \
         padding: 0 20px;\n      font-family: system-ui, -apple-system, sans-serif;\n      \
         line-height: 1.6;\n      color: #333;\n    }}\n  </style>\n</head>\n<body>\n  \
         <h1>{title}</h1>\n  {content}\n</body>\n</html>",
        title = title,
        created = note.created_at,
        updated = note.updated_at,
        tags = tags,
        // Re-serializing through the model canonicalizes legacy markup.
        content = Document::parse(&note.content).serialize(),
    )
}

fn render_block_md(node: &Node, indent: &str, out: &mut String) {
    match &node.kind {
        NodeKind::Paragraph => {
            out.push_str(indent);
            out.push_str(&inline_md(node));
            out.push('\n');
        }
        NodeKind::Heading { level } => {
            out.push_str(indent);
            for _ in 0..*level {
                out.push('#');
            }
            out.push(' ');
            out.push_str(&inline_md(node));
            out.push('\n');
        }
        NodeKind::BulletList => {
            for item in &node.children {
                render_list_item_md(item, indent, "- ", out);
            }
        }
        NodeKind::OrderedList => {
            for (i, item) in node.children.iter().enumerate() {
                render_list_item_md(item, indent, &format!("{}. ", i + 1), out);
            }
        }
        NodeKind::TaskList => {
            for item in &node.children {
                let marker = match item.kind {
                    NodeKind::TaskItem { checked: true } => "- [x] ",
                    _ => "- [ ] ",
                };
                render_list_item_md(item, indent, marker, out);
            }
        }
        NodeKind::Blockquote => {
            for child in &node.children {
                let mut inner = String::new();
                render_block_md(child, "", &mut inner);
                for line in inner.lines() {
                    out.push_str(indent);
                    out.push_str("> ");
                    out.push_str(line);
                    out.push('\n');
                }
            }
        }
        NodeKind::CodeBlock { language } => {
            out.push_str(indent);
            out.push_str("```");
            if let Some(lang) = language {
                out.push_str(lang);
            }
            out.push('\n');
            let mut text = String::new();
            node.collect_text(&mut text);
            out.push_str(&text);
            if !text.ends_with('\n') {
                out.push('\n');
            }
            out.push_str(indent);
            out.push_str("```\n");
        }
        NodeKind::Image { src } => {
            out.push_str(indent);
            out.push_str(&format!("![]({src})\n"));
        }
        NodeKind::HorizontalRule => {
            out.push_str(indent);
            out.push_str("---\n");
        }
        NodeKind::Table => {
            for (r, row) in node.children.iter().enumerate() {
                let cells: Vec<String> = row
                    .children
                    .iter()
                    .map(|cell| {
                        let mut text = String::new();
                        cell.collect_text(&mut text);
                        text.replace('\n', " ")
                    })
                    .collect();
                out.push_str(indent);
                out.push_str(&format!("| {} |\n", cells.join(" | ")));
                if r == 0 {
                    out.push_str(indent);
                    out.push_str(&format!(
                        "|{}\n",
                        " --- |".repeat(cells.len().max(1))
                    ));
                }
            }
        }
        // Item/row/cell nodes are rendered by their containers; a stray one
        // falls back to its text.
        _ => {
            let mut text = String::new();
            node.collect_text(&mut text);
            out.push_str(indent);
            out.push_str(&text);
            out.push('\n');
        }
    }
}

fn render_list_item_md(item: &Node, indent: &str, marker: &str, out: &mut String) {
    for (i, child) in item.children.iter().enumerate() {
        if i == 0 {
            let mut inner = String::new();
            render_block_md(child, "", &mut inner);
            out.push_str(indent);
            out.push_str(marker);
            out.push_str(inner.trim_end_matches('\n'));
            out.push('\n');
        } else {
            render_block_md(child, &format!("{indent}  "), out);
        }
    }
}

fn inline_md(node: &Node) -> String {
    let mut out = String::new();
    for child in &node.children {
        let Some(text) = &child.text else {
            continue;
        };

        let mut piece = text.clone();
        if child.has_mark(MarkKind::Bold) {
            piece = format!("**{piece}**");
        }
        if child.has_mark(MarkKind::Italic) {
            piece = format!("*{piece}*");
        }
        if child.has_mark(MarkKind::Strike) {
            piece = format!("~~{piece}~~");
        }
        if let Some(Mark::Link { href }) = child
            .marks
            .iter()
            .find(|m| m.kind() == MarkKind::Link)
        {
            piece = format!("[{piece}]({href})");
        }
        out.push_str(&piece);
    }
    out
}

/// Trigger a browser download of the exported note (Blob + anchor click).
pub(crate) fn download_note(note: &Note, format: ExportFormat) {
    let content = export_note(note, format);
    let filename = format!(
        "{}.{}",
        if note.title.trim().is_empty() {
            "untitled"
        } else {
            note.title.trim()
        },
        format.extension()
    );

    let Some(document) = web_sys::window().and_then(|w| w.document()) else {
        return;
    };

    let parts = js_sys::Array::new();
    parts.push(&content.into());
    let bag = web_sys::BlobPropertyBag::new();
    bag.set_type("text/plain;charset=utf-8");

    let Ok(blob) = web_sys::Blob::new_with_str_sequence_and_options(&parts, &bag) else {
        return;
    };
    let Ok(url) = web_sys::Url::create_object_url_with_blob(&blob) else {
        return;
    };

    if let Ok(a) = document.create_element("a") {
        if let Ok(a) = a.dyn_into::<web_sys::HtmlAnchorElement>() {
            a.set_href(&url);
            a.set_download(&filename);
            a.click();
        }
    }
    let _ = web_sys::Url::revoke_object_url(&url);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note(content: &str) -> Note {
        Note {
            id: "n1".to_string(),
            title: "Plans".to_string(),
            content: content.to_string(),
            created_at: "2024-05-01T12:00:00Z".to_string(),
            updated_at: "2024-05-02T09:00:00Z".to_string(),
            tags: vec!["life".to_string(), "todo".to_string()],
            category_id: None,
            is_starred: false,
            order: 0,
        }
    }

    #[test]
    fn test_markdown_front_matter_and_body() {
        let md = note_to_markdown(&note("<h2>Week</h2><p>Do <strong>things</strong></p>"));
        assert!(md.starts_with("---\ntitle: Plans\n"));
        assert!(md.contains("tags: life, todo"));
        assert!(md.contains("## Week"));
        assert!(md.contains("Do **things**"));
    }

    #[test]
    fn test_markdown_lists_and_tasks() {
        let md = note_to_markdown(&note(
            "<ul><li><p>a</p></li></ul>\
             <ol><li><p>b</p></li><li><p>c</p></li></ol>\
             <ul data-type=\"taskList\"><li data-checked=\"true\"><p>done</p></li></ul>",
        ));
        assert!(md.contains("- a"));
        assert!(md.contains("1. b"));
        assert!(md.contains("2. c"));
        assert!(md.contains("- [x] done"));
    }

    #[test]
    fn test_markdown_code_and_quote() {
        let md = note_to_markdown(&note(
            "<blockquote><p>wise</p></blockquote>\
             <pre><code class=\"language-rust\">fn x() {}</code></pre>",
        ));
        assert!(md.contains("> wise"));
        assert!(md.contains("```rust\nfn x() {}\n```"));
    }

    #[test]
    fn test_html_export_is_standalone_page() {
        let html = note_to_html(&note("<p>body</p>"));
        assert!(html.starts_with("<!DOCTYPE html>"));
        assert!(html.contains("<title>Plans</title>"));
        assert!(html.contains("<meta name=\"tag\" content=\"life\">"));
        assert!(html.contains("<p>body</p>"));
    }
}
