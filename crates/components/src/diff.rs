//! Text diff spans.
//!
//! Actions carry the change they make as a list of equal/insert/delete
//! spans. Spans are computed line-wise with `similar` and adjacent lines
//! of the same tag are merged.

use serde::{Deserialize, Serialize};
use similar::ChangeTag;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiffOp {
    Equal,
    Insert,
    Delete,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffSpan {
    pub op: DiffOp,
    pub text: String,
}

/// Ordered spans turning one text into another.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentDiff {
    spans: Vec<DiffSpan>,
}

impl ContentDiff {
    /// Diff with no spans at all. Used where content must not be shown.
    pub fn empty() -> Self {
        Self::default()
    }

    /// `text` appears from nothing.
    pub fn insertion(text: impl Into<String>) -> Self {
        Self::single(DiffOp::Insert, text.into())
    }

    /// `text` disappears.
    pub fn deletion(text: impl Into<String>) -> Self {
        Self::single(DiffOp::Delete, text.into())
    }

    /// Line diff from `old` to `new`.
    pub fn text_diff(old: &str, new: &str) -> Self {
        let diff = similar::TextDiff::from_lines(old, new);
        let mut out = ContentDiff::empty();
        for change in diff.iter_all_changes() {
            let op = match change.tag() {
                ChangeTag::Equal => DiffOp::Equal,
                ChangeTag::Insert => DiffOp::Insert,
                ChangeTag::Delete => DiffOp::Delete,
            };
            out.push(op, change.value());
        }
        out
    }

    fn single(op: DiffOp, text: String) -> Self {
        if text.is_empty() {
            return Self::empty();
        }
        Self {
            spans: vec![DiffSpan { op, text }],
        }
    }

    fn push(&mut self, op: DiffOp, text: &str) {
        match self.spans.last_mut() {
            Some(last) if last.op == op => last.text.push_str(text),
            _ => self.spans.push(DiffSpan {
                op,
                text: text.to_string(),
            }),
        }
    }

    pub fn spans(&self) -> &[DiffSpan] {
        &self.spans
    }

    /// True when the two sides were identical.
    pub fn is_unchanged(&self) -> bool {
        self.spans.iter().all(|s| s.op == DiffOp::Equal)
    }

    pub fn insertions(&self) -> usize {
        self.count_lines(DiffOp::Insert)
    }

    pub fn deletions(&self) -> usize {
        self.count_lines(DiffOp::Delete)
    }

    fn count_lines(&self, op: DiffOp) -> usize {
        self.spans
            .iter()
            .filter(|s| s.op == op)
            .map(|s| s.text.lines().count())
            .sum()
    }

    /// Render as `+`/`-`/` ` prefixed lines.
    pub fn to_patch(&self) -> String {
        let mut out = String::new();
        for span in &self.spans {
            let prefix = match span.op {
                DiffOp::Equal => ' ',
                DiffOp::Insert => '+',
                DiffOp::Delete => '-',
            };
            for line in span.text.lines() {
                out.push(prefix);
                out.push_str(line);
                out.push('\n');
            }
        }
        out
    }
}
