//! The editing engine: primitive invertible steps, transactions, undo/redo
//! history, and one command per semantic toolbar action.
//!
//! All mutation is synchronous and atomic: a command either commits one
//! transaction (a single undo step) or leaves the document untouched.

use crate::doc::position::{path_starts_with, pos_cmp, Position, Selection};
use crate::doc::{
    same_mark_set, sorted_marks, Document, Mark, MarkKind, Node, NodeKind, StructureViolation,
    TextAlign,
};

const HISTORY_LIMIT: usize = 100;

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum CommandError {
    /// Malformed command parameters; rejected before any mutation.
    InvalidArgument(String),
    /// The edit would break tree well-formedness.
    Structure(StructureViolation),
}

impl std::fmt::Display for CommandError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CommandError::InvalidArgument(msg) => write!(f, "invalid argument: {msg}"),
            CommandError::Structure(e) => write!(f, "{e}"),
        }
    }
}

impl From<StructureViolation> for CommandError {
    fn from(e: StructureViolation) -> Self {
        CommandError::Structure(e)
    }
}

/// Node attributes that can change without touching children: the kind
/// payload (heading level, checked flag, code language, …) and alignment.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct NodeAttrs {
    pub kind: NodeKind,
    pub align: Option<TextAlign>,
}

/// Primitive edit operations. Every step records enough of the prior state
/// to be exactly invertible.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Step {
    /// Replace `removed.len()` children of `parent` starting at `index`
    /// with `inserted` (node insertion and range deletion are the
    /// degenerate forms).
    Splice {
        parent: Vec<usize>,
        index: usize,
        removed: Vec<Node>,
        inserted: Vec<Node>,
    },
    InsertText {
        path: Vec<usize>,
        offset: usize,
        text: String,
    },
    DeleteText {
        path: Vec<usize>,
        offset: usize,
        text: String,
    },
    /// Replace the whole mark set of the text leaf at `path`.
    SetMarks {
        path: Vec<usize>,
        before: Vec<Mark>,
        after: Vec<Mark>,
    },
    SetAttrs {
        path: Vec<usize>,
        before: NodeAttrs,
        after: NodeAttrs,
    },
}

impl Step {
    #[allow(dead_code)]
    pub fn set_mark(path: Vec<usize>, before: Vec<Mark>, mark: Mark) -> Self {
        let mut after = before.clone();
        after.push(mark);
        Step::SetMarks {
            path,
            before,
            after: sorted_marks(after),
        }
    }

    #[allow(dead_code)]
    pub fn unset_mark(path: Vec<usize>, before: Vec<Mark>, kind: MarkKind) -> Self {
        let after = before.iter().filter(|m| m.kind() != kind).cloned().collect();
        Step::SetMarks {
            path,
            before,
            after,
        }
    }

    pub fn invert(&self) -> Step {
        match self {
            Step::Splice {
                parent,
                index,
                removed,
                inserted,
            } => Step::Splice {
                parent: parent.clone(),
                index: *index,
                removed: inserted.clone(),
                inserted: removed.clone(),
            },
            Step::InsertText { path, offset, text } => Step::DeleteText {
                path: path.clone(),
                offset: *offset,
                text: text.clone(),
            },
            Step::DeleteText { path, offset, text } => Step::InsertText {
                path: path.clone(),
                offset: *offset,
                text: text.clone(),
            },
            Step::SetMarks {
                path,
                before,
                after,
            } => Step::SetMarks {
                path: path.clone(),
                before: after.clone(),
                after: before.clone(),
            },
            Step::SetAttrs {
                path,
                before,
                after,
            } => Step::SetAttrs {
                path: path.clone(),
                before: after.clone(),
                after: before.clone(),
            },
        }
    }

    pub fn apply(&self, doc: &mut Document) -> Result<(), StructureViolation> {
        match self {
            Step::Splice {
                parent,
                index,
                removed,
                inserted,
            } => {
                // Validate against the parent's rules before mutating.
                if parent.is_empty() {
                    for node in inserted {
                        if !node.kind.is_block() {
                            return Err(StructureViolation::new(format!(
                                "{:?} is not a top-level block",
                                node.kind
                            )));
                        }
                        node.validate()?;
                    }
                } else {
                    let parent_kind = doc
                        .node_at(parent)
                        .map(|n| n.kind.clone())
                        .ok_or_else(|| StructureViolation::new("splice parent missing"))?;
                    for node in inserted {
                        if !parent_kind.allows_child(&node.kind) {
                            return Err(StructureViolation::new(format!(
                                "{:?} cannot contain {:?}",
                                parent_kind, node.kind
                            )));
                        }
                        node.validate()?;
                    }
                }

                let children = if parent.is_empty() {
                    doc.blocks_mut()
                } else {
                    &mut doc
                        .node_at_mut(parent)
                        .ok_or_else(|| StructureViolation::new("splice parent missing"))?
                        .children
                };

                if *index > children.len() || index + removed.len() > children.len() {
                    return Err(StructureViolation::new("splice out of bounds"));
                }

                children.splice(*index..*index + removed.len(), inserted.iter().cloned());
                Ok(())
            }
            Step::InsertText { path, offset, text } => {
                let node = doc
                    .node_at_mut(path)
                    .ok_or_else(|| StructureViolation::new("text node missing"))?;
                let payload = node
                    .text
                    .as_mut()
                    .ok_or_else(|| StructureViolation::new("insert into non-text node"))?;
                let byte = char_to_byte(payload, *offset)
                    .ok_or_else(|| StructureViolation::new("offset past end of text"))?;
                payload.insert_str(byte, text);
                Ok(())
            }
            Step::DeleteText { path, offset, text } => {
                let node = doc
                    .node_at_mut(path)
                    .ok_or_else(|| StructureViolation::new("text node missing"))?;
                let payload = node
                    .text
                    .as_mut()
                    .ok_or_else(|| StructureViolation::new("delete from non-text node"))?;
                let start = char_to_byte(payload, *offset)
                    .ok_or_else(|| StructureViolation::new("offset past end of text"))?;
                let end = start + text.len();
                if payload.get(start..end) != Some(text.as_str()) {
                    return Err(StructureViolation::new("deleted text does not match"));
                }
                payload.replace_range(start..end, "");
                Ok(())
            }
            Step::SetMarks { path, after, .. } => {
                let node = doc
                    .node_at_mut(path)
                    .ok_or_else(|| StructureViolation::new("text node missing"))?;
                if !node.is_text() {
                    return Err(StructureViolation::new("marks on non-text node"));
                }
                node.marks = sorted_marks(after.clone());
                Ok(())
            }
            Step::SetAttrs { path, after, .. } => {
                // The new kind must still accept the existing children and
                // remain legal under its parent.
                let node = doc
                    .node_at(path)
                    .ok_or_else(|| StructureViolation::new("node missing"))?;
                for child in &node.children {
                    if !after.kind.allows_child(&child.kind) {
                        return Err(StructureViolation::new(format!(
                            "{:?} cannot contain {:?}",
                            after.kind, child.kind
                        )));
                    }
                }
                if path.len() == 1 {
                    if !after.kind.is_block() {
                        return Err(StructureViolation::new(format!(
                            "{:?} is not a top-level block",
                            after.kind
                        )));
                    }
                } else {
                    let parent_kind = doc
                        .node_at(&path[..path.len() - 1])
                        .map(|n| n.kind.clone())
                        .ok_or_else(|| StructureViolation::new("parent missing"))?;
                    if !parent_kind.allows_child(&after.kind) {
                        return Err(StructureViolation::new(format!(
                            "{:?} cannot contain {:?}",
                            parent_kind, after.kind
                        )));
                    }
                }

                let node = doc
                    .node_at_mut(path)
                    .ok_or_else(|| StructureViolation::new("node missing"))?;
                node.kind = after.kind.clone();
                node.align = if after.kind.supports_align() {
                    after.align
                } else {
                    None
                };
                Ok(())
            }
        }
    }
}

fn char_to_byte(s: &str, chars: usize) -> Option<usize> {
    if chars == 0 {
        return Some(0);
    }
    let mut seen = 0;
    for (i, _) in s.char_indices() {
        if seen == chars {
            return Some(i);
        }
        seen += 1;
    }
    if seen == chars {
        Some(s.len())
    } else {
        None
    }
}

/// Remap a position through one step: positions after a deletion collapse
/// to the deletion start; positions after an insertion shift by the
/// inserted length. Positions inside a deleted subtree collapse to the
/// splice boundary (the caller clamps against the new document).
pub(crate) fn map_position(step: &Step, pos: &Position) -> Position {
    match step {
        Step::Splice {
            parent,
            index,
            removed,
            inserted,
        } => {
            if pos.path.len() <= parent.len() || !path_starts_with(&pos.path, parent) {
                return pos.clone();
            }

            let child = pos.path[parent.len()];
            if child < *index {
                return pos.clone();
            }

            if child >= index + removed.len() {
                let mut path = pos.path.clone();
                path[parent.len()] = child - removed.len() + inserted.len();
                return Position::new(path, pos.offset);
            }

            // Inside the replaced range: collapse to its start.
            let mut path = parent.clone();
            path.push(*index);
            Position::new(path, 0)
        }
        Step::InsertText { path, offset, text } => {
            if pos.path != *path || pos.offset < *offset {
                return pos.clone();
            }
            Position::new(pos.path.clone(), pos.offset + text.chars().count())
        }
        Step::DeleteText { path, offset, text } => {
            if pos.path != *path || pos.offset <= *offset {
                return pos.clone();
            }
            let len = text.chars().count();
            let new_offset = if pos.offset >= offset + len {
                pos.offset - len
            } else {
                *offset
            };
            Position::new(pos.path.clone(), new_offset)
        }
        Step::SetMarks { .. } | Step::SetAttrs { .. } => pos.clone(),
    }
}

/// Remap any live selection through a transaction's steps, collapsing to
/// the nearest valid boundary when its nodes were deleted.
#[allow(dead_code)]
pub(crate) fn map_selection(steps: &[Step], sel: &Selection, doc: &Document) -> Selection {
    let mut anchor = sel.anchor.clone();
    let mut head = sel.head.clone();
    for step in steps {
        anchor = map_position(step, &anchor);
        head = map_position(step, &head);
    }
    Selection::range(doc.clamp_position(&anchor), doc.clamp_position(&head))
}

/// One atomic, invertible batch of steps plus the selections on either side.
#[derive(Clone, Debug)]
pub(crate) struct Transaction {
    pub steps: Vec<Step>,
    pub selection_before: Selection,
    pub selection_after: Selection,
}

impl Transaction {
    pub fn inverted(&self) -> Transaction {
        Transaction {
            steps: self.steps.iter().rev().map(|s| s.invert()).collect(),
            selection_before: self.selection_after.clone(),
            selection_after: self.selection_before.clone(),
        }
    }
}

/// Undo/redo stacks, bounded. Pushing after an undo clears the redo stack.
#[derive(Default)]
pub(crate) struct History {
    undo: Vec<Transaction>,
    redo: Vec<Transaction>,
}

impl History {
    pub fn push(&mut self, tr: Transaction) {
        self.redo.clear();
        self.undo.push(tr);
        if self.undo.len() > HISTORY_LIMIT {
            self.undo.remove(0);
        }
    }

    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }
}

/// Block descriptor for toolbar highlight state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum ActiveBlock {
    Paragraph,
    Heading(u8),
    BulletList,
    OrderedList,
    TaskList,
    CodeBlock,
    Blockquote,
    Table,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ListKind {
    Bullet,
    Ordered,
    Task,
}

impl ListKind {
    fn list_kind(&self) -> NodeKind {
        match self {
            ListKind::Bullet => NodeKind::BulletList,
            ListKind::Ordered => NodeKind::OrderedList,
            ListKind::Task => NodeKind::TaskList,
        }
    }

    fn item_kind(&self) -> NodeKind {
        match self {
            ListKind::Bullet | ListKind::Ordered => NodeKind::ListItem,
            ListKind::Task => NodeKind::TaskItem { checked: false },
        }
    }

    fn matches(&self, kind: &NodeKind) -> bool {
        matches!(
            (self, kind),
            (ListKind::Bullet, NodeKind::BulletList)
                | (ListKind::Ordered, NodeKind::OrderedList)
                | (ListKind::Task, NodeKind::TaskList)
        )
    }
}

/// The in-memory editing session: document, selection and history.
pub(crate) struct EditorState {
    doc: Document,
    selection: Selection,
    history: History,
}

impl EditorState {
    pub fn new() -> Self {
        Self::with_document(Document::new())
    }

    pub fn with_document(doc: Document) -> Self {
        let selection = Selection::caret(doc.clamp_position(&Position::start()));
        Self {
            doc,
            selection,
            history: History::default(),
        }
    }

    pub fn from_markup(markup: &str) -> Self {
        Self::with_document(Document::parse(markup))
    }

    pub fn doc(&self) -> &Document {
        &self.doc
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn serialize(&self) -> String {
        self.doc.serialize()
    }

    pub fn set_selection(&mut self, sel: Selection) {
        let anchor = self.doc.clamp_position(&sel.anchor);
        let head = self.doc.clamp_position(&sel.head);
        self.selection = Selection::range(anchor, head);
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    /// Marks active over the whole current selection (toolbar state).
    pub fn active_marks(&self) -> Vec<MarkKind> {
        self.doc.marks_in_range(&self.selection)
    }

    /// Block descriptor at the selection head (toolbar state).
    pub fn active_block(&self) -> ActiveBlock {
        let path = &self.selection.head.path;

        // The innermost list/table/quote ancestor wins over the textblock.
        for depth in (1..=path.len()).rev() {
            let Some(node) = self.doc.node_at(&path[..depth]) else {
                continue;
            };
            match &node.kind {
                NodeKind::BulletList => return ActiveBlock::BulletList,
                NodeKind::OrderedList => return ActiveBlock::OrderedList,
                NodeKind::TaskList => return ActiveBlock::TaskList,
                NodeKind::Blockquote => return ActiveBlock::Blockquote,
                NodeKind::Table => return ActiveBlock::Table,
                NodeKind::CodeBlock { .. } => return ActiveBlock::CodeBlock,
                NodeKind::Heading { level } => return ActiveBlock::Heading(*level),
                _ => {}
            }
        }

        ActiveBlock::Paragraph
    }

    pub fn active_align(&self) -> Option<TextAlign> {
        let container = self.textblock_at_head()?;
        self.doc.node_at(&container).and_then(|n| n.align)
    }

    // -- commit machinery ---------------------------------------------------

    /// Apply `steps` atomically: they run against a scratch copy and only
    /// replace the live document when every step succeeds.
    fn commit(
        &mut self,
        steps: Vec<Step>,
        selection_after: Selection,
    ) -> Result<(), CommandError> {
        if steps.is_empty() {
            return Ok(());
        }

        let mut next = self.doc.clone();
        for step in &steps {
            step.apply(&mut next)?;
        }

        let selection_after = Selection::range(
            next.clamp_position(&selection_after.anchor),
            next.clamp_position(&selection_after.head),
        );

        let tr = Transaction {
            steps,
            selection_before: self.selection.clone(),
            selection_after: selection_after.clone(),
        };

        self.doc = next;
        self.selection = selection_after;
        self.history.push(tr);
        Ok(())
    }

    /// Undo one transaction. A no-op (not an error) when the stack is empty.
    pub fn undo(&mut self) {
        let Some(tr) = self.history.undo.pop() else {
            return;
        };

        let inverse = tr.inverted();
        let mut next = self.doc.clone();
        let mut ok = true;
        for step in &inverse.steps {
            if step.apply(&mut next).is_err() {
                ok = false;
                break;
            }
        }

        if ok {
            self.doc = next;
            self.selection = Selection::range(
                self.doc.clamp_position(&inverse.selection_after.anchor),
                self.doc.clamp_position(&inverse.selection_after.head),
            );
            self.history.redo.push(tr);
        }
    }

    pub fn redo(&mut self) {
        let Some(tr) = self.history.redo.pop() else {
            return;
        };

        let mut next = self.doc.clone();
        let mut ok = true;
        for step in &tr.steps {
            if step.apply(&mut next).is_err() {
                ok = false;
                break;
            }
        }

        if ok {
            self.doc = next;
            self.selection = Selection::range(
                self.doc.clamp_position(&tr.selection_after.anchor),
                self.doc.clamp_position(&tr.selection_after.head),
            );
            self.history.undo.push(tr);
        }
    }

    // -- mark commands ------------------------------------------------------

    pub fn toggle_bold(&mut self) -> Result<(), CommandError> {
        self.toggle_mark(Mark::Bold)
    }

    pub fn toggle_italic(&mut self) -> Result<(), CommandError> {
        self.toggle_mark(Mark::Italic)
    }

    pub fn toggle_underline(&mut self) -> Result<(), CommandError> {
        self.toggle_mark(Mark::Underline)
    }

    pub fn toggle_strike(&mut self) -> Result<(), CommandError> {
        self.toggle_mark(Mark::Strike)
    }

    pub fn toggle_superscript(&mut self) -> Result<(), CommandError> {
        self.toggle_mark(Mark::Superscript)
    }

    pub fn toggle_subscript(&mut self) -> Result<(), CommandError> {
        self.toggle_mark(Mark::Subscript)
    }

    pub fn toggle_highlight(&mut self, color: Option<String>) -> Result<(), CommandError> {
        self.toggle_mark(Mark::Highlight { color })
    }

    pub fn set_link(&mut self, href: &str) -> Result<(), CommandError> {
        if href.trim().is_empty() {
            return Err(CommandError::InvalidArgument("empty link target".into()));
        }
        let href = href.to_string();
        self.apply_marks(move |marks| {
            let mut next: Vec<Mark> = marks
                .iter()
                .filter(|m| m.kind() != MarkKind::Link)
                .cloned()
                .collect();
            next.push(Mark::Link { href: href.clone() });
            next
        })
    }

    pub fn unset_link(&mut self) -> Result<(), CommandError> {
        self.apply_marks(|marks| {
            marks
                .iter()
                .filter(|m| m.kind() != MarkKind::Link)
                .cloned()
                .collect()
        })
    }

    /// Toggle policy ("any-unset implies apply-to-all"): if every character
    /// in the range already carries the mark, one keypress removes it
    /// everywhere; otherwise one keypress applies it everywhere. A single
    /// toggle never produces a mixed partial state.
    fn toggle_mark(&mut self, mark: Mark) -> Result<(), CommandError> {
        let kind = mark.kind();
        let all_set = self.active_marks().contains(&kind);

        if all_set {
            self.apply_marks(move |marks| {
                marks
                    .iter()
                    .filter(|m| m.kind() != kind)
                    .cloned()
                    .collect()
            })
        } else {
            self.apply_marks(move |marks| {
                let mut next: Vec<Mark> =
                    marks.iter().filter(|m| m.kind() != kind).cloned().collect();
                next.push(mark.clone());
                next
            })
        }
    }

    /// Rewrite the mark sets of every character in the selection with `f`,
    /// splitting boundary leaves as needed. Fully covered leaves get plain
    /// set/unset-mark steps; partially covered ones are split first.
    fn apply_marks(
        &mut self,
        f: impl Fn(&[Mark]) -> Vec<Mark>,
    ) -> Result<(), CommandError> {
        let spans = self.doc.text_spans_in_range(&self.selection);
        if spans.is_empty() || self.selection.is_caret() {
            return Ok(());
        }

        // Record where the selection sits, in characters within each
        // container, so it can be re-anchored after leaves split.
        let (from, to) = self.selection.ordered();
        let from_abs = self.abs_offset(from);
        let to_abs = self.abs_offset(to);
        let reversed = pos_cmp(&self.selection.anchor, &self.selection.head)
            == std::cmp::Ordering::Greater;

        let mut steps: Vec<Step> = Vec::new();

        // Later spans first, so earlier paths stay valid while leaves split.
        for span in spans.iter().rev() {
            if span.start == span.end {
                continue;
            }
            let Some(leaf) = self.doc.node_at(&span.path) else {
                continue;
            };
            let before = leaf.marks.clone();
            let after = sorted_marks(f(&before));
            if same_mark_set(&before, &after) {
                continue;
            }

            let len = leaf.char_len();
            if span.start == 0 && span.end == len {
                steps.push(Step::SetMarks {
                    path: span.path.clone(),
                    before,
                    after,
                });
                continue;
            }

            // Boundary leaf: split into up to three runs around the range.
            let text = leaf.text.clone().unwrap_or_default();
            let chars: Vec<char> = text.chars().collect();
            let mut pieces: Vec<Node> = Vec::new();

            if span.start > 0 {
                pieces.push(Node::text_with_marks(
                    chars[..span.start].iter().collect::<String>(),
                    before.clone(),
                ));
            }
            pieces.push(Node::text_with_marks(
                chars[span.start..span.end].iter().collect::<String>(),
                after,
            ));
            if span.end < len {
                pieces.push(Node::text_with_marks(
                    chars[span.end..].iter().collect::<String>(),
                    before.clone(),
                ));
            }

            let (parent, index) = split_path(&span.path);
            steps.push(Step::Splice {
                parent,
                index,
                removed: vec![leaf.clone()],
                inserted: pieces,
            });
        }

        if steps.is_empty() {
            return Ok(());
        }

        // Scratch-apply to locate the new selection by character offset.
        let mut next = self.doc.clone();
        for step in &steps {
            step.apply(&mut next)?;
        }
        let new_from = position_at_abs(&next, &from_abs);
        let new_to = position_at_abs(&next, &to_abs);
        let selection_after = if reversed {
            Selection::range(new_to, new_from)
        } else {
            Selection::range(new_from, new_to)
        };

        self.commit(steps, selection_after)
    }

    // -- block commands -----------------------------------------------------

    /// Toggle the selected textblocks to `heading(level)`; if every one of
    /// them is already at that level, demote them all to paragraphs.
    pub fn toggle_heading(&mut self, level: u8) -> Result<(), CommandError> {
        if !(1..=3).contains(&level) {
            return Err(CommandError::InvalidArgument(format!(
                "heading level {level} out of range"
            )));
        }

        let containers = self.textblocks_in_range();
        if containers.is_empty() {
            return Ok(());
        }

        let all_at_level = containers.iter().all(|path| {
            matches!(
                self.doc.node_at(path).map(|n| &n.kind),
                Some(NodeKind::Heading { level: l }) if *l == level
            )
        });

        let target = if all_at_level {
            NodeKind::Paragraph
        } else {
            NodeKind::Heading { level }
        };

        let mut steps = Vec::new();
        for path in containers {
            let Some(node) = self.doc.node_at(&path) else {
                continue;
            };
            if !matches!(node.kind, NodeKind::Paragraph | NodeKind::Heading { .. }) {
                continue;
            }
            if node.kind == target {
                continue;
            }
            steps.push(Step::SetAttrs {
                path,
                before: NodeAttrs {
                    kind: node.kind.clone(),
                    align: node.align,
                },
                after: NodeAttrs {
                    kind: target.clone(),
                    align: node.align,
                },
            });
        }

        let selection_after = self.selection.clone();
        self.commit(steps, selection_after)
    }

    pub fn set_text_align(&mut self, align: TextAlign) -> Result<(), CommandError> {
        let mut steps = Vec::new();
        for path in self.textblocks_in_range() {
            let Some(node) = self.doc.node_at(&path) else {
                continue;
            };
            if !node.kind.supports_align() || node.align == Some(align) {
                continue;
            }
            steps.push(Step::SetAttrs {
                path,
                before: NodeAttrs {
                    kind: node.kind.clone(),
                    align: node.align,
                },
                after: NodeAttrs {
                    kind: node.kind.clone(),
                    align: Some(align),
                },
            });
        }

        let selection_after = self.selection.clone();
        self.commit(steps, selection_after)
    }

    pub fn toggle_bullet_list(&mut self) -> Result<(), CommandError> {
        self.toggle_list(ListKind::Bullet)
    }

    pub fn toggle_ordered_list(&mut self) -> Result<(), CommandError> {
        self.toggle_list(ListKind::Ordered)
    }

    pub fn toggle_task_list(&mut self) -> Result<(), CommandError> {
        self.toggle_list(ListKind::Task)
    }

    /// Wrap the selected top-level blocks into one list of `kind`, or
    /// unwrap them when the whole selection already sits in such lists.
    /// A selection spanning list and non-list siblings re-wraps everything
    /// into a single list, merging existing items in document order.
    pub fn toggle_list(&mut self, kind: ListKind) -> Result<(), CommandError> {
        let (start, end) = self.top_level_range();
        let blocks: Vec<Node> = self.doc.blocks()[start..=end].to_vec();

        let all_match = blocks.iter().all(|b| kind.matches(&b.kind));

        let inserted: Vec<Node> = if all_match {
            // Unwrap: splice every item's blocks back as siblings.
            blocks
                .iter()
                .flat_map(|list| list.children.iter())
                .flat_map(|item| item.children.iter().cloned())
                .collect()
        } else {
            let mut items: Vec<Node> = Vec::new();
            for block in &blocks {
                match &block.kind {
                    // Items of any list kind are adopted (task state is
                    // dropped when leaving a task list).
                    NodeKind::BulletList | NodeKind::OrderedList | NodeKind::TaskList => {
                        for item in &block.children {
                            items.push(Node::with_children(
                                kind.item_kind(),
                                item.children.clone(),
                            ));
                        }
                    }
                    _ => {
                        items.push(Node::with_children(kind.item_kind(), vec![block.clone()]));
                    }
                }
            }
            vec![Node::with_children(kind.list_kind(), items)]
        };

        // Wrap/unwrap preserves the flattened text-leaf sequence, so the
        // selection survives by leaf ordinal.
        let from_ord = self.leaf_ordinal(&self.selection.ordered().0.clone(), start, end);
        let to_ord = self.leaf_ordinal(&self.selection.ordered().1.clone(), start, end);

        let steps = vec![Step::Splice {
            parent: vec![],
            index: start,
            removed: blocks,
            inserted: inserted.clone(),
        }];

        let mut next = self.doc.clone();
        for step in &steps {
            step.apply(&mut next)?;
        }

        let new_from = position_at_ordinal(&next, start, &inserted, from_ord);
        let new_to = position_at_ordinal(&next, start, &inserted, to_ord);
        self.commit(steps, Selection::range(new_from, new_to))
    }

    pub fn toggle_blockquote(&mut self) -> Result<(), CommandError> {
        let (start, end) = self.top_level_range();
        let blocks: Vec<Node> = self.doc.blocks()[start..=end].to_vec();

        let all_quotes = blocks.iter().all(|b| b.kind == NodeKind::Blockquote);

        let inserted: Vec<Node> = if all_quotes {
            blocks
                .iter()
                .flat_map(|q| q.children.iter().cloned())
                .collect()
        } else {
            let mut inner = Vec::new();
            for block in &blocks {
                match &block.kind {
                    NodeKind::Blockquote => inner.extend(block.children.iter().cloned()),
                    _ => inner.push(block.clone()),
                }
            }
            vec![Node::with_children(NodeKind::Blockquote, inner)]
        };

        let from_ord = self.leaf_ordinal(&self.selection.ordered().0.clone(), start, end);
        let to_ord = self.leaf_ordinal(&self.selection.ordered().1.clone(), start, end);

        let steps = vec![Step::Splice {
            parent: vec![],
            index: start,
            removed: blocks,
            inserted: inserted.clone(),
        }];

        let mut next = self.doc.clone();
        for step in &steps {
            step.apply(&mut next)?;
        }

        let new_from = position_at_ordinal(&next, start, &inserted, from_ord);
        let new_to = position_at_ordinal(&next, start, &inserted, to_ord);
        self.commit(steps, Selection::range(new_from, new_to))
    }

    /// Toggle the selected textblocks into one code block (marks are
    /// stripped: code has no inline formatting), or back to paragraphs.
    pub fn toggle_code_block(&mut self) -> Result<(), CommandError> {
        let (start, end) = self.top_level_range();
        let blocks: Vec<Node> = self.doc.blocks()[start..=end].to_vec();

        let all_code = blocks
            .iter()
            .all(|b| matches!(b.kind, NodeKind::CodeBlock { .. }));

        let inserted: Vec<Node> = if all_code {
            blocks
                .iter()
                .map(|b| {
                    let mut text = String::new();
                    b.collect_text(&mut text);
                    if text.is_empty() {
                        Node::empty_paragraph()
                    } else {
                        Node::paragraph(vec![Node::text(text)])
                    }
                })
                .collect()
        } else {
            let mut text = String::new();
            for (i, b) in blocks.iter().enumerate() {
                if i > 0 {
                    text.push('\n');
                }
                b.collect_text(&mut text);
            }
            let children = if text.is_empty() {
                Vec::new()
            } else {
                vec![Node::text(text)]
            };
            vec![Node::with_children(
                NodeKind::CodeBlock { language: None },
                children,
            )]
        };

        let steps = vec![Step::Splice {
            parent: vec![],
            index: start,
            removed: blocks,
            inserted: inserted.clone(),
        }];

        let caret = Position::new(vec![start], 0);
        self.commit(steps, Selection::caret(caret))
    }

    // -- insert commands ----------------------------------------------------

    /// Insert an empty rows×cols grid after the current block. Rejects
    /// degenerate dimensions before any mutation.
    pub fn insert_table(&mut self, rows: usize, cols: usize) -> Result<(), CommandError> {
        if rows < 1 || cols < 1 {
            return Err(CommandError::InvalidArgument(format!(
                "table dimensions {rows}x{cols}"
            )));
        }

        let table = Node::with_children(
            NodeKind::Table,
            (0..rows)
                .map(|_| {
                    Node::with_children(
                        NodeKind::TableRow,
                        (0..cols)
                            .map(|_| {
                                Node::with_children(
                                    NodeKind::TableCell,
                                    vec![Node::empty_paragraph()],
                                )
                            })
                            .collect(),
                    )
                })
                .collect(),
        );

        let index = self.top_level_range().1 + 1;
        let steps = vec![Step::Splice {
            parent: vec![],
            index,
            removed: vec![],
            inserted: vec![table],
        }];

        // Caret into the first cell's paragraph.
        let caret = Position::new(vec![index, 0, 0, 0], 0);
        self.commit(steps, Selection::caret(caret))
    }

    pub fn insert_image(&mut self, src: &str) -> Result<(), CommandError> {
        if src.trim().is_empty() {
            return Err(CommandError::InvalidArgument("empty image source".into()));
        }

        let index = self.top_level_range().1 + 1;
        let steps = vec![Step::Splice {
            parent: vec![],
            index,
            removed: vec![],
            inserted: vec![Node::new(NodeKind::Image {
                src: src.to_string(),
            })],
        }];

        let selection_after = self.selection.clone();
        self.commit(steps, selection_after)
    }

    pub fn insert_horizontal_rule(&mut self) -> Result<(), CommandError> {
        let index = self.top_level_range().1 + 1;
        let steps = vec![Step::Splice {
            parent: vec![],
            index,
            removed: vec![],
            inserted: vec![Node::new(NodeKind::HorizontalRule)],
        }];

        let selection_after = self.selection.clone();
        self.commit(steps, selection_after)
    }

    // -- typing gestures ----------------------------------------------------

    /// Replace the whole document with re-parsed markup, as one undoable
    /// transaction. This is the path for edits made natively by the
    /// browser's contenteditable (typing, paste): the new surface is
    /// parsed permissively and committed wholesale.
    pub fn replace_with_markup(
        &mut self,
        markup: &str,
        selection: Option<Selection>,
    ) -> Result<(), CommandError> {
        let next = Document::parse(markup);
        if next.serialize() == self.doc.serialize() {
            if let Some(sel) = selection {
                self.set_selection(sel);
            }
            return Ok(());
        }

        let steps = vec![Step::Splice {
            parent: vec![],
            index: 0,
            removed: self.doc.blocks().to_vec(),
            inserted: next.blocks().to_vec(),
        }];

        let selection_after = selection.unwrap_or_else(|| self.selection.clone());
        self.commit(steps, selection_after)
    }

    /// Insert text at the caret (replacing the selection first if any).
    #[allow(dead_code)]
    pub fn insert_text(&mut self, text: &str) -> Result<(), CommandError> {
        if text.is_empty() {
            return Ok(());
        }
        if !self.selection.is_caret() {
            self.delete_selection()?;
        }

        let head = self.selection.head.clone();
        let at_leaf = self
            .doc
            .node_at(&head.path)
            .map(|n| n.is_text())
            .unwrap_or(false);

        if at_leaf {
            let steps = vec![Step::InsertText {
                path: head.path.clone(),
                offset: head.offset,
                text: text.to_string(),
            }];
            let caret = Position::new(head.path, head.offset + text.chars().count());
            return self.commit(steps, Selection::caret(caret));
        }

        // Caret in an empty container: grow a fresh text leaf.
        let (parent, index) = if self
            .doc
            .node_at(&head.path)
            .map(|n| n.kind.allows_child(&NodeKind::Text))
            .unwrap_or(false)
        {
            (head.path.clone(), head.offset.min(
                self.doc
                    .node_at(&head.path)
                    .map(|n| n.children.len())
                    .unwrap_or(0),
            ))
        } else {
            return Ok(());
        };

        let mut leaf_path = parent.clone();
        leaf_path.push(index);
        let steps = vec![Step::Splice {
            parent,
            index,
            removed: vec![],
            inserted: vec![Node::text(text)],
        }];
        let caret = Position::new(leaf_path, text.chars().count());
        self.commit(steps, Selection::caret(caret))
    }

    /// Delete the selected character range. Spans are removed per
    /// container; containers themselves are left in place (an emptied
    /// textblock stays as an empty block).
    #[allow(dead_code)]
    pub fn delete_selection(&mut self) -> Result<(), CommandError> {
        if self.selection.is_caret() {
            return Ok(());
        }

        let spans = self.doc.text_spans_in_range(&self.selection);
        let from = self.selection.ordered().0.clone();

        let mut steps = Vec::new();
        for span in spans.iter().rev() {
            if span.start == span.end {
                continue;
            }
            let Some(leaf) = self.doc.node_at(&span.path) else {
                continue;
            };
            let text = leaf.text.clone().unwrap_or_default();
            let chars: Vec<char> = text.chars().collect();

            if span.start == 0 && span.end == chars.len() {
                // Whole leaf goes away.
                let (parent, index) = split_path(&span.path);
                steps.push(Step::Splice {
                    parent,
                    index,
                    removed: vec![leaf.clone()],
                    inserted: vec![],
                });
            } else {
                steps.push(Step::DeleteText {
                    path: span.path.clone(),
                    offset: span.start,
                    text: chars[span.start..span.end].iter().collect(),
                });
            }
        }

        self.commit(steps, Selection::caret(from))
    }

    // -- shared helpers -----------------------------------------------------

    /// Top-level block range touched by the selection, clamped to the
    /// document.
    fn top_level_range(&self) -> (usize, usize) {
        let (a, b) = self.selection.block_range();
        let last = self.doc.blocks().len().saturating_sub(1);
        (a.min(last), b.min(last))
    }

    /// The textblock (paragraph/heading/code block) containing the head.
    fn textblock_at_head(&self) -> Option<Vec<usize>> {
        let path = &self.selection.head.path;
        for depth in (1..=path.len()).rev() {
            if let Some(node) = self.doc.node_at(&path[..depth]) {
                if matches!(
                    node.kind,
                    NodeKind::Paragraph | NodeKind::Heading { .. } | NodeKind::CodeBlock { .. }
                ) {
                    return Some(path[..depth].to_vec());
                }
            }
        }
        None
    }

    /// Unique textblock container paths intersecting the selection, in
    /// document order. Falls back to the caret's textblock for selections
    /// that cover no text (empty paragraphs).
    fn textblocks_in_range(&self) -> Vec<Vec<usize>> {
        let spans = self.doc.text_spans_in_range(&self.selection);
        let mut out: Vec<Vec<usize>> = Vec::new();

        for span in &spans {
            let (container, _) = split_path(&span.path);
            if out.last() != Some(&container) {
                out.push(container);
            }
        }

        if out.is_empty() {
            if let Some(c) = self.textblock_at_head() {
                out.push(c);
            }
        }
        out
    }

    /// (container path, char offset) form of a position, so selections can
    /// be re-anchored after inline leaves split or merge.
    fn abs_offset(&self, pos: &Position) -> (Vec<usize>, usize) {
        let Some(node) = self.doc.node_at(&pos.path) else {
            return (pos.path.clone(), 0);
        };

        if !node.is_text() {
            return (pos.path.clone(), 0);
        }

        let (container, leaf_idx) = split_path(&pos.path);
        let mut chars = 0;
        if let Some(parent) = self.doc.node_at(&container) {
            for child in parent.children.iter().take(leaf_idx) {
                chars += child.char_len();
            }
        }
        (container, chars + pos.offset)
    }

    /// Ordinal of the text leaf containing `pos` within top-level blocks
    /// `start..=end`, plus the offset inside it.
    fn leaf_ordinal(&self, pos: &Position, start: usize, end: usize) -> (usize, usize) {
        let mut ordinal = 0;
        for path in self.doc.text_paths() {
            let top = path.first().copied().unwrap_or(0);
            if top < start || top > end {
                continue;
            }
            if path == pos.path {
                return (ordinal, pos.offset);
            }
            ordinal += 1;
        }
        (0, 0)
    }
}

impl Default for EditorState {
    fn default() -> Self {
        Self::new()
    }
}

fn split_path(path: &[usize]) -> (Vec<usize>, usize) {
    match path.split_last() {
        Some((&last, parent)) => (parent.to_vec(), last),
        None => (Vec::new(), 0),
    }
}

/// Find the position for a (container, char offset) pair recorded before an
/// inline rebuild.
fn position_at_abs(doc: &Document, abs: &(Vec<usize>, usize)) -> Position {
    let (container, mut chars) = (abs.0.clone(), abs.1);
    let Some(parent) = doc.node_at(&container) else {
        return doc.clamp_position(&Position::new(container, 0));
    };
    if parent.is_text() {
        return doc.clamp_position(&Position::new(container, chars));
    }

    for (i, child) in parent.children.iter().enumerate() {
        let len = child.char_len();
        if chars <= len {
            let mut path = container.clone();
            path.push(i);
            return Position::new(path, chars);
        }
        chars -= len;
    }

    doc.clamp_position(&Position::new(container, parent.children.len()))
}

/// Find the `ordinal`-th text leaf inside the freshly `inserted` top-level
/// region beginning at block `start`.
fn position_at_ordinal(
    doc: &Document,
    start: usize,
    inserted: &[Node],
    ordinal: (usize, usize),
) -> Position {
    let mut seen = 0;
    for (i, _) in inserted.iter().enumerate() {
        let top = start + i;
        let mut paths = Vec::new();
        if let Some(block) = doc.node_at(&[top]) {
            collect_leaf_paths(block, &mut vec![top], &mut paths);
        }
        for path in paths {
            if seen == ordinal.0 {
                return Position::new(path, ordinal.1);
            }
            seen += 1;
        }
    }

    doc.clamp_position(&Position::new(vec![start], 0))
}

fn collect_leaf_paths(node: &Node, path: &mut Vec<usize>, out: &mut Vec<Vec<usize>>) {
    if node.is_text() {
        out.push(path.clone());
        return;
    }
    for (i, child) in node.children.iter().enumerate() {
        path.push(i);
        collect_leaf_paths(child, path, out);
        path.pop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCENARIO: &str = "<h1>Title</h1><p>Hello <b>world</b></p>";

    fn select_world(state: &mut EditorState) {
        // "world" is the second inline run of the second block.
        state.set_selection(Selection::range(
            Position::new(vec![1, 1], 0),
            Position::new(vec![1, 1], 5),
        ));
    }

    #[test]
    fn test_toggle_bold_removes_then_restores_marks() {
        let mut state = EditorState::from_markup(SCENARIO);
        let canonical = state.serialize();
        select_world(&mut state);

        state.toggle_bold().expect("toggle off");
        assert_eq!(state.serialize(), "<h1>Title</h1><p>Hello world</p>");

        state.toggle_bold().expect("toggle on");
        assert_eq!(state.serialize(), canonical);
    }

    #[test]
    fn test_toggle_bold_partial_leaf_splits_runs() {
        let mut state = EditorState::from_markup("<p>abcdef</p>");
        state.set_selection(Selection::range(
            Position::new(vec![0, 0], 2),
            Position::new(vec![0, 0], 4),
        ));

        state.toggle_bold().expect("toggle");
        assert_eq!(state.serialize(), "<p>ab<strong>cd</strong>ef</p>");

        // The selection still covers "cd"; a second toggle restores the
        // original (runs merge back at serialization).
        state.toggle_bold().expect("toggle back");
        assert_eq!(state.serialize(), "<p>abcdef</p>");
    }

    #[test]
    fn test_toggle_mark_mixed_range_applies_everywhere() {
        // "any-unset implies apply-to-all": half-bold selection turns fully
        // bold on the first toggle, fully plain on the second.
        let mut state = EditorState::from_markup("<p>ab<strong>cd</strong></p>");
        state.set_selection(Selection::range(
            Position::new(vec![0, 0], 0),
            Position::new(vec![0, 1], 2),
        ));

        state.toggle_bold().expect("apply to all");
        assert_eq!(state.serialize(), "<p><strong>abcd</strong></p>");

        state.toggle_bold().expect("unset all");
        assert_eq!(state.serialize(), "<p>abcd</p>");
    }

    #[test]
    fn test_undo_redo_inverse_law() {
        let mut state = EditorState::from_markup(SCENARIO);
        let before = state.serialize();
        select_world(&mut state);

        state.toggle_bold().expect("toggle");
        let after = state.serialize();
        assert_ne!(before, after);

        state.undo();
        assert_eq!(state.serialize(), before);

        state.redo();
        assert_eq!(state.serialize(), after);
    }

    #[test]
    fn test_undo_redo_empty_stacks_are_noops() {
        let mut state = EditorState::from_markup("<p>x</p>");
        state.undo();
        state.redo();
        assert_eq!(state.serialize(), "<p>x</p>");
    }

    #[test]
    fn test_new_edit_clears_redo() {
        let mut state = EditorState::from_markup("<p>abc</p>");
        state.set_selection(Selection::range(
            Position::new(vec![0, 0], 0),
            Position::new(vec![0, 0], 3),
        ));

        state.toggle_bold().expect("toggle");
        state.undo();
        assert!(state.can_redo());

        state.toggle_italic().expect("new edit");
        assert!(!state.can_redo());
    }

    #[test]
    fn test_toggle_heading_promotes_and_demotes() {
        let mut state = EditorState::from_markup("<p>hello</p>");
        state.set_selection(Selection::caret(Position::new(vec![0, 0], 2)));

        state.toggle_heading(2).expect("promote");
        assert_eq!(state.serialize(), "<h2>hello</h2>");
        assert_eq!(state.active_block(), ActiveBlock::Heading(2));

        state.toggle_heading(2).expect("demote");
        assert_eq!(state.serialize(), "<p>hello</p>");
        assert_eq!(state.active_block(), ActiveBlock::Paragraph);
    }

    #[test]
    fn test_toggle_heading_rejects_bad_level() {
        let mut state = EditorState::from_markup("<p>hello</p>");
        let err = state.toggle_heading(7);
        assert!(matches!(err, Err(CommandError::InvalidArgument(_))));
        assert_eq!(state.serialize(), "<p>hello</p>");
    }

    #[test]
    fn test_toggle_list_wraps_multiple_blocks_into_one_list() {
        let mut state = EditorState::from_markup("<p>one</p><p>two</p>");
        state.set_selection(Selection::range(
            Position::new(vec![0, 0], 0),
            Position::new(vec![1, 0], 3),
        ));

        state.toggle_bullet_list().expect("wrap");
        assert_eq!(
            state.serialize(),
            "<ul><li><p>one</p></li><li><p>two</p></li></ul>"
        );
        assert_eq!(state.active_block(), ActiveBlock::BulletList);
    }

    #[test]
    fn test_toggle_list_unwraps_back_to_blocks() {
        let mut state = EditorState::from_markup("<ul><li><p>one</p></li><li><p>two</p></li></ul>");
        state.set_selection(Selection::range(
            Position::new(vec![0, 0, 0, 0], 0),
            Position::new(vec![0, 1, 0, 0], 3),
        ));

        state.toggle_bullet_list().expect("unwrap");
        assert_eq!(state.serialize(), "<p>one</p><p>two</p>");
    }

    #[test]
    fn test_toggle_list_mixed_selection_merges_into_single_list() {
        let mut state =
            EditorState::from_markup("<ul><li><p>one</p></li></ul><p>two</p>");
        state.set_selection(Selection::range(
            Position::new(vec![0, 0, 0, 0], 0),
            Position::new(vec![1, 0], 3),
        ));

        state.toggle_bullet_list().expect("merge");
        assert_eq!(
            state.serialize(),
            "<ul><li><p>one</p></li><li><p>two</p></li></ul>"
        );
    }

    #[test]
    fn test_toggle_list_converts_between_kinds() {
        let mut state = EditorState::from_markup("<ul><li><p>one</p></li></ul>");
        state.set_selection(Selection::caret(Position::new(vec![0, 0, 0, 0], 0)));

        state.toggle_ordered_list().expect("convert");
        assert_eq!(state.serialize(), "<ol><li><p>one</p></li></ol>");
    }

    #[test]
    fn test_toggle_task_list_roundtrip() {
        let mut state = EditorState::from_markup("<p>todo</p>");
        state.set_selection(Selection::caret(Position::new(vec![0, 0], 0)));

        state.toggle_task_list().expect("wrap");
        assert_eq!(
            state.serialize(),
            "<ul data-type=\"taskList\"><li data-checked=\"false\"><p>todo</p></li></ul>"
        );

        state.toggle_task_list().expect("unwrap");
        assert_eq!(state.serialize(), "<p>todo</p>");
    }

    #[test]
    fn test_selection_survives_list_wrap() {
        let mut state = EditorState::from_markup("<p>one</p><p>two</p>");
        state.set_selection(Selection::range(
            Position::new(vec![0, 0], 1),
            Position::new(vec![1, 0], 2),
        ));

        state.toggle_bullet_list().expect("wrap");

        let (from, to) = {
            let (f, t) = state.selection().ordered();
            (f.clone(), t.clone())
        };
        assert_eq!(from.path, vec![0, 0, 0, 0]);
        assert_eq!(from.offset, 1);
        assert_eq!(to.path, vec![0, 1, 0, 0]);
        assert_eq!(to.offset, 2);
    }

    #[test]
    fn test_insert_table_builds_full_grid() {
        let mut state = EditorState::from_markup("<p>x</p>");
        state.insert_table(2, 2).expect("insert");
        let row = "<tr><td><p></p></td><td><p></p></td></tr>";
        assert_eq!(
            state.serialize(),
            format!("<p>x</p><table>{row}{row}</table>")
        );
    }

    #[test]
    fn test_insert_table_rejects_degenerate_dimensions() {
        let mut state = EditorState::from_markup("<p>x</p>");
        assert!(matches!(
            state.insert_table(0, 3),
            Err(CommandError::InvalidArgument(_))
        ));
        assert!(matches!(
            state.insert_table(3, 0),
            Err(CommandError::InvalidArgument(_))
        ));
        assert_eq!(state.serialize(), "<p>x</p>");
    }

    #[test]
    fn test_insert_image_and_rule() {
        let mut state = EditorState::from_markup("<p>x</p>");
        state.insert_image("https://example.com/a.png").expect("img");
        state.insert_horizontal_rule().expect("hr");
        assert!(state.serialize().contains("<img src=\"https://example.com/a.png\">"));
        assert!(state.serialize().contains("<hr>"));

        assert!(matches!(
            state.insert_image("   "),
            Err(CommandError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_set_link_replaces_existing_link() {
        let mut state =
            EditorState::from_markup("<p><a href=\"https://old\">x</a></p>");
        state.set_selection(Selection::range(
            Position::new(vec![0, 0], 0),
            Position::new(vec![0, 0], 1),
        ));

        state.set_link("https://new").expect("relink");
        assert_eq!(state.serialize(), "<p><a href=\"https://new\">x</a></p>");

        state.unset_link().expect("unlink");
        assert_eq!(state.serialize(), "<p>x</p>");
    }

    #[test]
    fn test_set_text_align_roundtrips_through_codec() {
        let mut state = EditorState::from_markup("<p>mid</p>");
        state.set_selection(Selection::caret(Position::new(vec![0, 0], 0)));

        state.set_text_align(TextAlign::Center).expect("align");
        let out = state.serialize();
        assert_eq!(out, "<p style=\"text-align: center\">mid</p>");
        assert_eq!(Document::parse(&out).serialize(), out);
    }

    #[test]
    fn test_toggle_code_block_strips_marks() {
        let mut state = EditorState::from_markup("<p>a <strong>b</strong></p>");
        state.set_selection(Selection::caret(Position::new(vec![0, 0], 0)));

        state.toggle_code_block().expect("to code");
        assert_eq!(state.serialize(), "<pre><code>a b</code></pre>");

        state.toggle_code_block().expect("back");
        assert_eq!(state.serialize(), "<p>a b</p>");
    }

    #[test]
    fn test_insert_text_at_caret() {
        let mut state = EditorState::from_markup("<p>helo</p>");
        state.set_selection(Selection::caret(Position::new(vec![0, 0], 2)));

        state.insert_text("l").expect("type");
        assert_eq!(state.serialize(), "<p>hello</p>");
        assert_eq!(state.selection().head.offset, 3);
    }

    #[test]
    fn test_insert_text_replaces_selection() {
        let mut state = EditorState::from_markup("<p>abcdef</p>");
        state.set_selection(Selection::range(
            Position::new(vec![0, 0], 1),
            Position::new(vec![0, 0], 5),
        ));

        state.insert_text("X").expect("replace");
        assert_eq!(state.serialize(), "<p>aXf</p>");
    }

    #[test]
    fn test_insert_text_into_empty_paragraph() {
        let mut state = EditorState::new();
        state.insert_text("hi").expect("type");
        assert_eq!(state.serialize(), "<p>hi</p>");
    }

    #[test]
    fn test_structure_violation_leaves_document_intact() {
        let mut state = EditorState::from_markup("<p>x</p>");
        let before = state.serialize();

        // A list item can never sit at the top level.
        let step = Step::Splice {
            parent: vec![],
            index: 0,
            removed: vec![],
            inserted: vec![Node::new(NodeKind::ListItem)],
        };
        let err = state.commit(vec![step], Selection::default());
        assert!(matches!(err, Err(CommandError::Structure(_))));
        assert_eq!(state.serialize(), before);
        assert!(!state.can_undo());
    }

    #[test]
    fn test_map_position_shifts_after_insertion() {
        let step = Step::InsertText {
            path: vec![0, 0],
            offset: 2,
            text: "ab".to_string(),
        };

        let before = Position::new(vec![0, 0], 5);
        assert_eq!(map_position(&step, &before).offset, 7);

        let untouched = Position::new(vec![0, 0], 1);
        assert_eq!(map_position(&step, &untouched).offset, 1);
    }

    #[test]
    fn test_map_position_collapses_into_deletion() {
        let step = Step::DeleteText {
            path: vec![0, 0],
            offset: 2,
            text: "cde".to_string(),
        };

        // Inside the deleted range: collapse to its start.
        assert_eq!(map_position(&step, &Position::new(vec![0, 0], 4)).offset, 2);
        // Past the deleted range: shift left.
        assert_eq!(map_position(&step, &Position::new(vec![0, 0], 7)).offset, 4);
    }

    #[test]
    fn test_map_position_through_splice() {
        let step = Step::Splice {
            parent: vec![],
            index: 1,
            removed: vec![Node::empty_paragraph(), Node::empty_paragraph()],
            inserted: vec![Node::empty_paragraph()],
        };

        // Before the splice: untouched.
        assert_eq!(map_position(&step, &Position::new(vec![0, 0], 3)).path, vec![0, 0]);
        // After it: sibling index shifts by the length delta.
        assert_eq!(map_position(&step, &Position::new(vec![3, 0], 1)).path, vec![2, 0]);
        // Inside it: collapse to the splice start.
        assert_eq!(map_position(&step, &Position::new(vec![2, 0], 1)).path, vec![1]);
    }

    #[test]
    fn test_map_selection_collapses_into_deleted_subtree() {
        let mut doc = Document::parse("<p>a</p><p>b</p><p>c</p>");
        let steps = vec![Step::Splice {
            parent: vec![],
            index: 1,
            removed: vec![doc.blocks()[1].clone()],
            inserted: vec![],
        }];
        for s in &steps {
            s.apply(&mut doc).expect("splice applies");
        }

        // A selection inside the deleted block lands on a valid boundary
        // of the surviving document.
        let sel = Selection::caret(Position::new(vec![1, 0], 1));
        let mapped = map_selection(&steps, &sel, &doc);
        assert!(doc.node_at(&mapped.head.path).is_some());

        // A selection after it shifts left with the removed block.
        let sel = Selection::caret(Position::new(vec![2, 0], 1));
        let mapped = map_selection(&steps, &sel, &doc);
        assert_eq!(mapped.head.path, vec![1, 0]);
        assert_eq!(mapped.head.offset, 1);
    }

    #[test]
    fn test_history_is_bounded() {
        let mut state = EditorState::from_markup("<p></p>");
        for _ in 0..(HISTORY_LIMIT + 20) {
            state.insert_text("x").expect("type");
        }
        assert_eq!(state.history.undo.len(), HISTORY_LIMIT);
    }

    #[test]
    fn test_roundtrip_of_command_reachable_documents() {
        // Drive a realistic editing session, checking the codec round-trip
        // after every command.
        let mut state = EditorState::new();
        state.insert_text("Shopping").expect("type");
        state.toggle_heading(1).expect("heading");

        let end = Position::new(vec![0, 0], 8);
        state.set_selection(Selection::caret(end));

        state.insert_table(1, 2).expect("table");
        state.insert_horizontal_rule().expect("hr");
        state.toggle_task_list().expect("task list");

        let out = state.serialize();
        assert_eq!(Document::parse(&out).serialize(), out);
    }
}
