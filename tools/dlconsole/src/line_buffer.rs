//! Append-only log of the current run's output.
//!
//! Chunks are stored as-is and split into lines lazily. Each append only adds
//! new segments to the line cache, prior content is never re-split.

use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct LineBuffer {
    text: String,
    pending: Vec<String>,
    lines: Arc<Vec<String>>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one chunk. Returns `false` when the chunk left the buffer
    /// unchanged (empty keep-alive, or whitespace before the first line).
    pub fn append(&mut self, chunk: &str) -> bool {
        if chunk.is_empty() {
            return false;
        }

        let stored = if self.is_empty() {
            let trimmed = chunk.trim_start();
            if trimmed.is_empty() {
                return false;
            }
            trimmed
        } else {
            self.text.push('\n');
            chunk
        };

        self.text.push_str(stored);
        self.pending.push(stored.to_string());
        true
    }

    /// Snapshot of the current lines. Cheap to clone; callers that keep it
    /// across an append must fetch again to see new lines.
    pub fn lines(&mut self) -> Arc<Vec<String>> {
        if !self.pending.is_empty() {
            let lines = Arc::make_mut(&mut self.lines);
            for chunk in self.pending.drain(..) {
                lines.extend(
                    chunk
                        .split('\n')
                        .map(|segment| segment.strip_suffix('\r').unwrap_or(segment))
                        .map(ToOwned::to_owned),
                );
            }
        }
        Arc::clone(&self.lines)
    }

    pub fn line_count(&mut self) -> usize {
        self.lines().len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn clear(&mut self) {
        self.text.clear();
        self.pending.clear();
        self.lines = Arc::new(Vec::new());
    }
}

#[cfg(test)]
mod tests {
    use super::LineBuffer;

    #[test]
    fn leading_blank_rows_are_stripped_once_after_clear() {
        let mut buffer = LineBuffer::new();
        assert!(buffer.append("\n\n  first"));
        assert!(buffer.append("\nsecond"));
        assert_eq!(buffer.lines().as_slice(), ["first", "", "second"]);

        buffer.clear();
        assert!(buffer.lines().is_empty());
        assert!(!buffer.append("\n \n"));
        assert!(buffer.append("\nagain"));
        assert_eq!(buffer.lines().as_slice(), ["again"]);
    }

    #[test]
    fn empty_chunks_are_ignored_and_blank_lines_kept() {
        let mut buffer = LineBuffer::new();
        buffer.append("a");
        assert!(!buffer.append(""));
        buffer.append("");
        buffer.append("b\n\nc");
        assert_eq!(buffer.lines().as_slice(), ["a", "b", "", "c"]);
    }

    #[test]
    fn snapshots_do_not_observe_later_appends() {
        let mut buffer = LineBuffer::new();
        buffer.append("one");
        let snapshot = buffer.lines();
        buffer.append("two");
        assert_eq!(snapshot.len(), 1);
        assert_eq!(buffer.lines().len(), 2);
    }

    #[test]
    fn carriage_returns_do_not_leak_into_rows() {
        let mut buffer = LineBuffer::new();
        buffer.append("a\r\nb\r");
        assert_eq!(buffer.lines().as_slice(), ["a", "b"]);
    }
}
