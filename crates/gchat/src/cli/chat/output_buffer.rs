//! Holds streamed text back until it can be rendered without splitting a markdown construct.
//!
//! Text is released one complete line at a time, and nothing is released while a fenced code
//! block is open. Fence boundaries are therefore always render boundaries.

pub const FENCE: &str = "```";

/// Converts markdown to the text written to the terminal.
pub trait MarkdownRenderer {
    fn render(&self, markdown: &str) -> String;
}

/// Writes markdown as-is. Used when output is not a terminal.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainRenderer;

impl MarkdownRenderer for PlainRenderer {
    fn render(&self, markdown: &str) -> String {
        markdown.to_owned()
    }
}

#[derive(Debug)]
pub struct OutputBuffer<R> {
    renderer: R,
    pending: String,
    in_fence: bool,
}

impl<R: MarkdownRenderer> OutputBuffer<R> {
    pub fn new(renderer: R) -> Self {
        Self {
            renderer,
            pending: String::new(),
            in_fence: false,
        }
    }

    /// Whether an unterminated fenced code block is pending.
    pub fn in_fence(&self) -> bool {
        self.in_fence
    }

    pub fn pending(&self) -> &str {
        &self.pending
    }

    /// Adds a fragment and renders every line that became safe to display.
    pub fn append(&mut self, text: &str) -> Option<String> {
        self.pending.push_str(text);
        self.in_fence = fence_count(&self.pending) % 2 == 1;
        if self.in_fence {
            return None;
        }

        let cut = safe_cut(&self.pending);
        if cut == 0 {
            return None;
        }

        let rest = self.pending.split_off(cut);
        let ready = std::mem::replace(&mut self.pending, rest);
        Some(self.renderer.render(&ready))
    }

    /// Renders whatever is pending, even inside an open fence, and resets the buffer.
    pub fn flush(&mut self) -> Option<String> {
        self.in_fence = false;
        if self.pending.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.pending);
        Some(self.renderer.render(&rest))
    }
}

fn fence_count(text: &str) -> usize {
    text.matches(FENCE).count()
}

/// The end of the last complete line whose preceding text has balanced fences. A fence marker
/// that starts and ends within one line moves the cut back to the previous line.
fn safe_cut(text: &str) -> usize {
    let mut cut = 0;
    let mut fences = 0;
    let mut start = 0;
    for (index, _) in text.match_indices('\n') {
        let end = index + 1;
        fences += fence_count(&text[start..end]);
        start = end;
        if fences % 2 == 0 {
            cut = end;
        }
    }
    cut
}
