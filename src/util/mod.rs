use crate::doc::Document;

pub(crate) fn now_ms() -> i64 {
    js_sys::Date::now().round() as i64
}

/// Plain-text preview of serialized note content, for the sidebar list.
pub(crate) fn content_preview(content: &str, max_chars: usize) -> String {
    let text = Document::parse(content).text_content();
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");

    if flat.chars().count() <= max_chars {
        return flat;
    }
    let mut out: String = flat.chars().take(max_chars).collect();
    out.push('…');
    out
}

/// Case-insensitive match against a note's title or plain-text content.
pub(crate) fn note_matches_query(title: &str, content: &str, query: &str) -> bool {
    let q = query.trim().to_lowercase();
    if q.is_empty() {
        return true;
    }
    if title.to_lowercase().contains(&q) {
        return true;
    }
    Document::parse(content)
        .text_content()
        .to_lowercase()
        .contains(&q)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_preview_strips_markup_and_truncates() {
        let html = "<h1>Shopping</h1><p>milk <strong>and</strong> eggs</p>";
        assert_eq!(content_preview(html, 100), "Shopping milk and eggs");
        assert_eq!(content_preview(html, 8), "Shopping…");
    }

    #[test]
    fn test_note_matches_query_ignores_tags_and_case() {
        let html = "<p>Hello <strong>World</strong></p>";
        assert!(note_matches_query("", html, "world"));
        assert!(note_matches_query("Title", html, "tit"));
        assert!(!note_matches_query("Title", html, "strong"));
        assert!(note_matches_query("Title", html, "  "));
    }
}
