pub(crate) mod codec;
pub(crate) mod position;

use crate::doc::position::{Position, Selection};

/// Closed set of node types. Containers carry children; `Text` carries the
/// string payload (and marks); `Image`/`HorizontalRule` are void leaves.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum NodeKind {
    Paragraph,
    Heading { level: u8 },
    BulletList,
    OrderedList,
    ListItem,
    TaskList,
    TaskItem { checked: bool },
    Table,
    TableRow,
    TableCell,
    CodeBlock { language: Option<String> },
    Image { src: String },
    HorizontalRule,
    Blockquote,
    Text,
}

impl NodeKind {
    /// True for kinds that may appear directly under the document root
    /// (and inside list items, blockquotes and table cells).
    pub fn is_block(&self) -> bool {
        !matches!(
            self,
            NodeKind::Text
                | NodeKind::ListItem
                | NodeKind::TaskItem { .. }
                | NodeKind::TableRow
                | NodeKind::TableCell
        )
    }

    pub fn is_leaf(&self) -> bool {
        matches!(
            self,
            NodeKind::Text | NodeKind::Image { .. } | NodeKind::HorizontalRule
        )
    }

    /// Container/child rules. Leaves allow nothing.
    pub fn allows_child(&self, child: &NodeKind) -> bool {
        match self {
            NodeKind::Paragraph | NodeKind::Heading { .. } => matches!(child, NodeKind::Text),
            NodeKind::CodeBlock { .. } => matches!(child, NodeKind::Text),
            NodeKind::BulletList | NodeKind::OrderedList => matches!(child, NodeKind::ListItem),
            NodeKind::TaskList => matches!(child, NodeKind::TaskItem { .. }),
            NodeKind::ListItem | NodeKind::TaskItem { .. } => child.is_block(),
            NodeKind::Blockquote => child.is_block(),
            NodeKind::Table => matches!(child, NodeKind::TableRow),
            NodeKind::TableRow => matches!(child, NodeKind::TableCell),
            NodeKind::TableCell => child.is_block(),
            NodeKind::Text | NodeKind::Image { .. } | NodeKind::HorizontalRule => false,
        }
    }

    /// Whether `align` is meaningful on this kind (mirrors the persisted
    /// format, which only carries text-align on paragraphs and headings).
    pub fn supports_align(&self) -> bool {
        matches!(self, NodeKind::Paragraph | NodeKind::Heading { .. })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, strum::Display, strum::AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub(crate) enum TextAlign {
    Left,
    Center,
    Right,
}

/// Inline formatting applied to a text leaf, independent of tree structure.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Mark {
    Bold,
    Italic,
    Underline,
    Strike,
    Highlight { color: Option<String> },
    Link { href: String },
    Superscript,
    Subscript,
    TextStyle { color: Option<String>, font: Option<String> },
}

/// Mark discriminant, used wherever two marks of the same type must compare
/// equal regardless of attributes (toggle detection, toolbar state).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(crate) enum MarkKind {
    Link,
    Bold,
    Italic,
    Underline,
    Strike,
    Highlight,
    Superscript,
    Subscript,
    TextStyle,
}

impl Mark {
    pub fn kind(&self) -> MarkKind {
        match self {
            Mark::Bold => MarkKind::Bold,
            Mark::Italic => MarkKind::Italic,
            Mark::Underline => MarkKind::Underline,
            Mark::Strike => MarkKind::Strike,
            Mark::Highlight { .. } => MarkKind::Highlight,
            Mark::Link { .. } => MarkKind::Link,
            Mark::Superscript => MarkKind::Superscript,
            Mark::Subscript => MarkKind::Subscript,
            Mark::TextStyle { .. } => MarkKind::TextStyle,
        }
    }
}

/// One element of the document tree. Each node is exclusively owned by its
/// parent; there is no sharing and no cycles.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Node {
    pub kind: NodeKind,
    pub align: Option<TextAlign>,
    pub marks: Vec<Mark>,
    pub text: Option<String>,
    pub children: Vec<Node>,
}

impl Node {
    pub fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            align: None,
            marks: Vec::new(),
            text: None,
            children: Vec::new(),
        }
    }

    pub fn text(s: impl Into<String>) -> Self {
        Self {
            kind: NodeKind::Text,
            align: None,
            marks: Vec::new(),
            text: Some(s.into()),
            children: Vec::new(),
        }
    }

    pub fn text_with_marks(s: impl Into<String>, marks: Vec<Mark>) -> Self {
        let mut n = Self::text(s);
        n.marks = sorted_marks(marks);
        n
    }

    pub fn with_children(kind: NodeKind, children: Vec<Node>) -> Self {
        let mut n = Self::new(kind);
        n.children = children;
        n
    }

    pub fn paragraph(inline: Vec<Node>) -> Self {
        Self::with_children(NodeKind::Paragraph, inline)
    }

    pub fn empty_paragraph() -> Self {
        Self::new(NodeKind::Paragraph)
    }

    pub fn is_text(&self) -> bool {
        matches!(self.kind, NodeKind::Text)
    }

    /// Character length of a text leaf (0 for anything else).
    pub fn char_len(&self) -> usize {
        self.text.as_deref().map(|t| t.chars().count()).unwrap_or(0)
    }

    pub fn has_mark(&self, kind: MarkKind) -> bool {
        self.marks.iter().any(|m| m.kind() == kind)
    }

    /// Validate this subtree against the container/child rules.
    pub fn validate(&self) -> Result<(), StructureViolation> {
        if self.is_text() {
            if !self.children.is_empty() {
                return Err(StructureViolation::new("text node with children"));
            }
            if self.text.is_none() {
                return Err(StructureViolation::new("text node without payload"));
            }
            return Ok(());
        }

        if self.text.is_some() {
            return Err(StructureViolation::new(
                "text payload on a non-text node",
            ));
        }

        for child in &self.children {
            if !self.kind.allows_child(&child.kind) {
                return Err(StructureViolation::parenting(&self.kind, &child.kind));
            }
            child.validate()?;
        }

        Ok(())
    }

    /// Plain-text projection of this subtree (no separators; callers that
    /// want block boundaries walk blocks themselves).
    pub fn collect_text(&self, out: &mut String) {
        if let Some(t) = &self.text {
            out.push_str(t);
            return;
        }
        for child in &self.children {
            child.collect_text(out);
        }
    }
}

/// Canonical mark order. Keeping marks sorted makes mark-set comparison and
/// serialization deterministic (round-trips are byte-stable).
pub(crate) fn sorted_marks(mut marks: Vec<Mark>) -> Vec<Mark> {
    marks.sort_by_key(|m| m.kind());
    marks.dedup_by_key(|m| m.kind());
    marks
}

pub(crate) fn same_mark_set(a: &[Mark], b: &[Mark]) -> bool {
    a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x == y)
}

/// An edit was rejected because it would break tree well-formedness.
/// Recovered locally: the operation is dropped, the tree is untouched.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct StructureViolation {
    pub message: String,
}

impl StructureViolation {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    fn parenting(parent: &NodeKind, child: &NodeKind) -> Self {
        Self::new(format!("{:?} cannot contain {:?}", parent, child))
    }
}

impl std::fmt::Display for StructureViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "structure violation: {}", self.message)
    }
}

/// A rooted, well-formed tree of nodes. The document exclusively owns its
/// top-level blocks.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Document {
    blocks: Vec<Node>,
}

impl Document {
    /// An empty document still renders as one empty paragraph.
    pub fn new() -> Self {
        Self {
            blocks: vec![Node::empty_paragraph()],
        }
    }

    pub fn from_blocks(blocks: Vec<Node>) -> Result<Self, StructureViolation> {
        for b in &blocks {
            if !b.kind.is_block() {
                return Err(StructureViolation::new(format!(
                    "{:?} is not a top-level block",
                    b.kind
                )));
            }
            b.validate()?;
        }

        if blocks.is_empty() {
            return Ok(Self::new());
        }

        Ok(Self { blocks })
    }

    pub fn blocks(&self) -> &[Node] {
        &self.blocks
    }

    pub(crate) fn blocks_mut(&mut self) -> &mut Vec<Node> {
        &mut self.blocks
    }

    pub fn parse(markup: &str) -> Self {
        codec::parse(markup)
    }

    pub fn serialize(&self) -> String {
        codec::serialize(self)
    }

    pub fn validate(&self) -> Result<(), StructureViolation> {
        for b in &self.blocks {
            if !b.kind.is_block() {
                return Err(StructureViolation::new(format!(
                    "{:?} is not a top-level block",
                    b.kind
                )));
            }
            b.validate()?;
        }
        Ok(())
    }

    pub fn node_at(&self, path: &[usize]) -> Option<&Node> {
        let (&first, rest) = path.split_first()?;
        let mut node = self.blocks.get(first)?;
        for &idx in rest {
            node = node.children.get(idx)?;
        }
        Some(node)
    }

    pub(crate) fn node_at_mut(&mut self, path: &[usize]) -> Option<&mut Node> {
        let (&first, rest) = path.split_first()?;
        let mut node = self.blocks.get_mut(first)?;
        for &idx in rest {
            node = node.children.get_mut(idx)?;
        }
        Some(node)
    }

    /// Plain-text projection with one newline between top-level blocks.
    /// Used for search matching and list previews.
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        for (i, b) in self.blocks.iter().enumerate() {
            if i > 0 {
                out.push('\n');
            }
            b.collect_text(&mut out);
        }
        out
    }

    /// Paths of all text leaves, in document order.
    pub fn text_paths(&self) -> Vec<Vec<usize>> {
        let mut out = Vec::new();
        for (i, b) in self.blocks.iter().enumerate() {
            collect_text_paths(b, &mut vec![i], &mut out);
        }
        out
    }

    /// Text leaves covered by `sel`, with the character sub-range of each.
    /// Boundary leaves are clipped to the selection's offsets.
    pub fn text_spans_in_range(&self, sel: &Selection) -> Vec<TextSpan> {
        let (from, to) = sel.ordered();
        let mut out = Vec::new();

        for path in self.text_paths() {
            if position::path_cmp(&path, &from.path) == std::cmp::Ordering::Less
                || position::path_cmp(&path, &to.path) == std::cmp::Ordering::Greater
            {
                continue;
            }

            let Some(leaf) = self.node_at(&path) else {
                continue;
            };
            let len = leaf.char_len();

            let start = if path == from.path {
                from.offset.min(len)
            } else {
                0
            };
            let end = if path == to.path { to.offset.min(len) } else { len };

            if start > end {
                continue;
            }

            out.push(TextSpan { path, start, end });
        }

        out
    }

    /// Mark kinds active over the whole selection: a mark counts as active
    /// only if every character in the range carries it. For a caret, the
    /// marks of the leaf under the caret.
    pub fn marks_in_range(&self, sel: &Selection) -> Vec<MarkKind> {
        let spans = self.text_spans_in_range(sel);

        let mut first = true;
        let mut active: Vec<MarkKind> = Vec::new();

        for span in &spans {
            // Empty boundary spans carry no characters; they don't vote,
            // except when the whole selection is a caret.
            if span.start == span.end && !sel.is_caret() {
                continue;
            }

            let Some(leaf) = self.node_at(&span.path) else {
                continue;
            };
            let kinds: Vec<MarkKind> = leaf.marks.iter().map(|m| m.kind()).collect();

            if first {
                active = kinds;
                first = false;
            } else {
                active.retain(|k| kinds.contains(k));
            }
        }

        if first {
            return Vec::new();
        }
        active
    }

    /// The nearest position that is valid in this document, for selections
    /// whose node vanished: walk up the path until a node exists, then
    /// clamp the child index / offset.
    pub fn clamp_position(&self, pos: &Position) -> Position {
        let mut path = pos.path.clone();

        loop {
            if let Some(node) = self.node_at(&path) {
                let offset = if node.is_text() {
                    pos.offset.min(node.char_len())
                } else {
                    pos.offset.min(node.children.len())
                };
                return Position { path, offset };
            }

            // Try the previous sibling before giving up a level.
            if let Some(last) = path.last_mut() {
                if *last > 0 {
                    *last -= 1;
                    continue;
                }
            }

            path.pop();
            if path.is_empty() {
                return Position {
                    path: vec![0],
                    offset: 0,
                };
            }
        }
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

/// A contiguous character range inside a single text leaf.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct TextSpan {
    pub path: Vec<usize>,
    pub start: usize,
    pub end: usize,
}

fn collect_text_paths(node: &Node, path: &mut Vec<usize>, out: &mut Vec<Vec<usize>>) {
    if node.is_text() {
        out.push(path.clone());
        return;
    }
    for (i, child) in node.children.iter().enumerate() {
        path.push(i);
        collect_text_paths(child, path, out);
        path.pop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doc::position::Position;

    fn sample() -> Document {
        Document::from_blocks(vec![
            Node::with_children(
                NodeKind::Heading { level: 1 },
                vec![Node::text("Title")],
            ),
            Node::paragraph(vec![
                Node::text("Hello "),
                Node::text_with_marks("world", vec![Mark::Bold]),
            ]),
        ])
        .expect("sample document is well-formed")
    }

    #[test]
    fn test_empty_document_has_one_paragraph() {
        let d = Document::new();
        assert_eq!(d.blocks().len(), 1);
        assert_eq!(d.blocks()[0].kind, NodeKind::Paragraph);
    }

    #[test]
    fn test_table_only_contains_rows() {
        let bad = Node::with_children(NodeKind::Table, vec![Node::empty_paragraph()]);
        assert!(bad.validate().is_err());

        let good = Node::with_children(
            NodeKind::Table,
            vec![Node::with_children(
                NodeKind::TableRow,
                vec![Node::with_children(
                    NodeKind::TableCell,
                    vec![Node::empty_paragraph()],
                )],
            )],
        );
        assert!(good.validate().is_ok());
    }

    #[test]
    fn test_text_payload_only_on_leaves() {
        let mut n = Node::empty_paragraph();
        n.text = Some("oops".to_string());
        assert!(n.validate().is_err());
    }

    #[test]
    fn test_list_item_cannot_sit_at_top_level() {
        let err = Document::from_blocks(vec![Node::new(NodeKind::ListItem)]);
        assert!(err.is_err());
    }

    #[test]
    fn test_text_content_projection() {
        let d = sample();
        assert_eq!(d.text_content(), "Title\nHello world");
    }

    #[test]
    fn test_node_at_walks_the_tree() {
        let d = sample();
        let leaf = d.node_at(&[1, 1]).expect("leaf exists");
        assert_eq!(leaf.text.as_deref(), Some("world"));
        assert!(leaf.has_mark(MarkKind::Bold));
        assert!(d.node_at(&[5]).is_none());
    }

    #[test]
    fn test_marks_in_range_requires_full_coverage() {
        let d = sample();

        // "world" only: bold is active.
        let sel = Selection::range(Position::new(vec![1, 1], 0), Position::new(vec![1, 1], 5));
        assert_eq!(d.marks_in_range(&sel), vec![MarkKind::Bold]);

        // "Hello world": bold does not cover "Hello ", so nothing is active.
        let sel = Selection::range(Position::new(vec![1, 0], 0), Position::new(vec![1, 1], 5));
        assert!(d.marks_in_range(&sel).is_empty());
    }

    #[test]
    fn test_clamp_position_collapses_to_survivor() {
        let d = sample();
        let clamped = d.clamp_position(&Position::new(vec![7, 3], 2));
        assert!(d.node_at(&clamped.path).is_some());
    }

    #[test]
    fn test_sorted_marks_dedups_by_kind() {
        let marks = sorted_marks(vec![
            Mark::Italic,
            Mark::Bold,
            Mark::Bold,
            Mark::Link {
                href: "https://example.com".to_string(),
            },
        ]);
        assert_eq!(
            marks.iter().map(|m| m.kind()).collect::<Vec<_>>(),
            vec![MarkKind::Link, MarkKind::Bold, MarkKind::Italic]
        );
    }
}
