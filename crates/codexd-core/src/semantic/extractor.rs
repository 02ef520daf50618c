//! Content extractor - isolates the assistant's reply from terminal chrome
//!
//! The wrapped CLI prints its reply on the line right after a bare `codex`
//! marker line, then redraws a bordered box as prompt chrome. Only that one
//! line is captured; once the box border shows up after captured content,
//! nothing else from the session is surfaced.
//!
//! ```text
//! codex                 <- marker
//! Hello world           <- captured
//! ╭──────────────╮      <- box border: everything after is ignored
//! │ send a message │
//! ```

use serde::{Deserialize, Serialize};

use super::normalize::StreamNormalizer;

// ========== Configuration ==========

/// How the terminating box border is recognized
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoxBorder {
    /// A top edge of any width: `╭`, one or more `─`, optional `╮`
    TopEdge,
    /// An exact string, compared against the trimmed line
    Literal(String),
}

impl Default for BoxBorder {
    fn default() -> Self {
        BoxBorder::TopEdge
    }
}

impl BoxBorder {
    /// Check a trimmed line against the border
    pub fn matches(&self, trimmed: &str) -> bool {
        match self {
            BoxBorder::Literal(border) => trimmed == border,
            BoxBorder::TopEdge => {
                let Some(rest) = trimmed.strip_prefix('╭') else {
                    return false;
                };
                let rest = rest.strip_suffix('╮').unwrap_or(rest);
                !rest.is_empty() && rest.chars().all(|c| c == '─')
            }
        }
    }
}

/// Marker token and box border used by the extractor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarkerConfig {
    pub marker_token: String,
    pub box_border: BoxBorder,
}

impl Default for MarkerConfig {
    fn default() -> Self {
        Self {
            marker_token: "codex".to_string(),
            box_border: BoxBorder::default(),
        }
    }
}

// ========== Extractor ==========

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExtractState {
    /// Waiting for a marker line
    AwaitingMarker,
    /// Marker seen: the next line is the reply
    ExpectingContent,
    /// Reply captured: a box border now closes the session's content
    AfterContent,
    /// Box border seen: drop everything
    Closed,
}

/// Line-by-line reply extractor for one session
#[derive(Debug, Clone)]
pub struct ContentExtractor {
    markers: MarkerConfig,
    state: ExtractState,
}

impl ContentExtractor {
    pub fn new(markers: MarkerConfig) -> Self {
        Self {
            markers,
            state: ExtractState::AwaitingMarker,
        }
    }

    /// True right after a marker line
    pub fn expecting_content(&self) -> bool {
        self.state == ExtractState::ExpectingContent
    }

    /// True once the terminating box border has been seen
    pub fn ignore_rest(&self) -> bool {
        self.state == ExtractState::Closed
    }

    /// Feed one complete line. Returns the line (untrimmed) when it is reply content.
    pub fn feed_line(&mut self, line: &str) -> Option<String> {
        let trimmed = line.trim();
        match self.state {
            ExtractState::Closed => None,
            ExtractState::ExpectingContent => {
                if self.markers.box_border.matches(trimmed) {
                    self.state = ExtractState::Closed;
                    None
                } else {
                    self.state = ExtractState::AfterContent;
                    Some(line.to_string())
                }
            }
            ExtractState::AfterContent => {
                if self.markers.box_border.matches(trimmed) {
                    self.state = ExtractState::Closed;
                } else if trimmed == self.markers.marker_token {
                    self.state = ExtractState::ExpectingContent;
                }
                None
            }
            ExtractState::AwaitingMarker => {
                if trimmed == self.markers.marker_token {
                    self.state = ExtractState::ExpectingContent;
                }
                None
            }
        }
    }
}

// ========== Partial-line reassembly ==========

/// Splits a chunked stream into complete lines.
///
/// Every line is delivered exactly once, in order, no matter how the
/// transport chunked the bytes.
#[derive(Debug, Clone, Default)]
pub struct LineAssembler {
    partial: String,
}

impl LineAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return the lines it completed
    pub fn push(&mut self, chunk: &str) -> Vec<String> {
        let mut text = std::mem::take(&mut self.partial);
        text.push_str(chunk);

        let mut lines: Vec<String> = text.split('\n').map(str::to_string).collect();
        self.partial = lines.pop().unwrap_or_default();
        lines
    }

    /// The trailing fragment not yet terminated by a newline
    pub fn partial(&self) -> &str {
        &self.partial
    }

    /// Take the trailing fragment as a final line (end of stream)
    pub fn take_partial(&mut self) -> Option<String> {
        if self.partial.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.partial))
        }
    }
}

// ========== Pipeline ==========

/// Raw chunk -> normalizer -> line reassembly -> extractor -> display buffer
#[derive(Debug)]
pub struct OutputPipeline {
    normalizer: StreamNormalizer,
    lines: LineAssembler,
    extractor: ContentExtractor,
    display: String,
}

impl OutputPipeline {
    pub fn new(markers: MarkerConfig) -> Self {
        Self {
            normalizer: StreamNormalizer::new(),
            lines: LineAssembler::new(),
            extractor: ContentExtractor::new(markers),
            display: String::new(),
        }
    }

    /// Rebuild a pipeline by replaying a raw buffer
    pub fn replay(raw: &str, markers: MarkerConfig) -> Self {
        let mut pipeline = Self::new(markers);
        pipeline.push(raw);
        pipeline
    }

    /// Feed a raw chunk. Returns true when the display buffer grew.
    pub fn push(&mut self, raw_chunk: &str) -> bool {
        let normalized = self.normalizer.feed(raw_chunk);
        let lines = self.lines.push(&normalized);
        self.extract(lines)
    }

    /// End of stream: flush held-back text and treat the partial line as complete
    pub fn finish(&mut self) -> bool {
        let normalized = self.normalizer.finish();
        let mut lines = self.lines.push(&normalized);
        if let Some(last) = self.lines.take_partial() {
            lines.push(last);
        }
        self.extract(lines)
    }

    fn extract(&mut self, lines: Vec<String>) -> bool {
        let before = self.display.len();
        for line in lines {
            if let Some(content) = self.extractor.feed_line(&line) {
                self.display.push_str(&content);
                self.display.push('\n');
            }
        }
        self.display.len() != before
    }

    pub fn display(&self) -> &str {
        &self.display
    }

    pub fn partial_line(&self) -> &str {
        self.lines.partial()
    }

    pub fn expecting_content(&self) -> bool {
        self.extractor.expecting_content()
    }

    pub fn ignore_rest(&self) -> bool {
        self.extractor.ignore_rest()
    }
}
