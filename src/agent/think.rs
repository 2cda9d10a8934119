//! Removal of inline `<think>...</think>` reasoning blocks.
//!
//! Reasoning models interleave their scratchpad with the answer. The
//! [`ThinkFilter`] strips it from a stream of chunks without ever emitting
//! part of a tag, and [`strip_think`] applies the same filter to a whole
//! string.

const OPEN: &str = "<think>";
const CLOSE: &str = "</think>";

/// Incremental think-block remover.
///
/// Text after an unclosed `<think>` is dropped. Leading whitespace of the
/// visible output is skipped so the answer does not start with the blank
/// lines that usually follow `</think>`.
#[derive(Debug, Default)]
pub struct ThinkFilter {
    inside: bool,
    started: bool,
    pending: String,
}

impl ThinkFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and get back the text that is safe to show.
    pub fn push(&mut self, chunk: &str) -> String {
        self.pending.push_str(chunk);
        let mut out = String::new();

        loop {
            if self.inside {
                if let Some(end) = self.pending.find(CLOSE) {
                    self.pending.drain(..end + CLOSE.len());
                    self.inside = false;
                    continue;
                }
                let keep = partial_tag_len(&self.pending, CLOSE);
                let cut = self.pending.len() - keep;
                self.pending.drain(..cut);
                break;
            }

            if let Some(start) = self.pending.find(OPEN) {
                out.push_str(&self.pending[..start]);
                self.pending.drain(..start + OPEN.len());
                self.inside = true;
                continue;
            }
            let keep = partial_tag_len(&self.pending, OPEN);
            let cut = self.pending.len() - keep;
            out.push_str(&self.pending[..cut]);
            self.pending.drain(..cut);
            break;
        }

        self.visible(out)
    }

    /// Flush whatever was held back waiting for a possible tag.
    pub fn finish(&mut self) -> String {
        let rest = std::mem::take(&mut self.pending);
        if self.inside {
            return String::new();
        }
        self.visible(rest)
    }

    fn visible(&mut self, text: String) -> String {
        if self.started {
            return text;
        }
        let trimmed = text.trim_start();
        if !trimmed.is_empty() {
            self.started = true;
        }
        trimmed.to_string()
    }
}

/// Length of the longest proper prefix of `tag` that `s` ends with.
fn partial_tag_len(s: &str, tag: &str) -> usize {
    (1..tag.len())
        .rev()
        .find(|&k| s.ends_with(&tag[..k]))
        .unwrap_or(0)
}

/// Remove every think block (and a dangling unclosed one), then trim.
///
/// ```
/// use xiaoclaw::agent::strip_think;
///
/// assert_eq!(strip_think("<think>plan</think>\n\nHi!"), "Hi!");
/// assert_eq!(strip_think("Answer <think>still going"), "Answer");
/// ```
pub fn strip_think(text: &str) -> String {
    let mut filter = ThinkFilter::new();
    let mut out = filter.push(text);
    out.push_str(&filter.finish());
    out.trim().to_string()
}
