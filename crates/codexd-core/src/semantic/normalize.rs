//! Terminal output normalizer
//!
//! Turns raw PTY text into canonical text:
//! - ANSI escape sequences (CSI, OSC, charset selection, two-byte escapes) removed
//! - `\r\n` and bare `\r` rewritten to `\n`
//! - C0/C1 control characters other than `\n` and `\t` removed
//! - runs of 3+ newlines collapsed to exactly 2
//!
//! `normalize` additionally trims, and is meant for a complete accumulated
//! buffer. Streaming chunks go through `StreamNormalizer`, which never trims
//! and carries escape sequences or a `\r` split across chunk boundaries.

use once_cell::sync::Lazy;
use regex::Regex;

// ========== Patterns ==========

/// Complete escape sequence.
/// Order matters: CSI and OSC must win over the generic two-byte form.
static ESCAPE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\x1b(?:\[[0-?]*[ -/]*[@-~]|\][^\x07\x1b\n]*(?:\x07|\x1b\\)|[()][0-9A-Za-z]|[@-Z\\-_])")
        .unwrap()
});

/// A tail that may still grow into a complete escape sequence
static INCOMPLETE_ESCAPE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\x1b(?:\[[0-?]*[ -/]*|\][^\x07\x1b\n]*\x1b?|[()])?$").unwrap()
});

static CARRIAGE_RETURN_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\r\n?").unwrap());

/// C0 controls except `\t` (0x09), `\n` (0x0A) and `\r` (0x0D, handled above),
/// DEL, and the C1 range U+0080..U+009F
static CONTROL_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\x00-\x08\x0B\x0C\x0E-\x1F\x7F\x{80}-\x{9F}]").unwrap());

static BLANK_RUN_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());

/// Escape sequences longer than this are not carried over; they get stripped
/// as plain control characters instead.
const MAX_ESCAPE_CARRY: usize = 256;

/// Maximum consecutive newlines kept in normalized text
const MAX_NEWLINE_RUN: usize = 2;

// ========== One-shot ==========

/// Strip escapes, unify line endings and drop control characters.
/// Blank-line runs are left alone.
fn strip(text: &str) -> String {
    let text = ESCAPE_PATTERN.replace_all(text, "");
    let text = CARRIAGE_RETURN_PATTERN.replace_all(&text, "\n");
    CONTROL_PATTERN.replace_all(&text, "").into_owned()
}

/// Normalize a streaming chunk: like `normalize` but without trimming,
/// so boundary whitespace survives until more data arrives.
pub fn normalize_chunk(text: &str) -> String {
    let stripped = strip(text);
    BLANK_RUN_PATTERN.replace_all(&stripped, "\n\n").into_owned()
}

/// Normalize a complete accumulated buffer.
///
/// Idempotent: `normalize(&normalize(x)) == normalize(x)`.
pub fn normalize(text: &str) -> String {
    normalize_chunk(text).trim().to_string()
}

// ========== Streaming ==========

/// Incremental normalizer for one output stream.
///
/// Feeding chunks `c1..cn` yields, concatenated, the same text as
/// `normalize_chunk(c1 + .. + cn)` once `finish` has been called.
#[derive(Debug, Default)]
pub struct StreamNormalizer {
    /// Raw tail held back from the previous chunk
    carry: String,
    /// Newlines at the end of everything emitted so far
    trailing_newlines: usize,
}

impl StreamNormalizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Normalize the next chunk, holding back anything that may be continued
    pub fn feed(&mut self, chunk: &str) -> String {
        let mut text = std::mem::take(&mut self.carry);
        text.push_str(chunk);

        let cut = holdback_start(&text);
        self.carry = text.split_off(cut);
        self.emit(&text)
    }

    /// Flush whatever is held back (end of stream)
    pub fn finish(&mut self) -> String {
        let text = std::mem::take(&mut self.carry);
        self.emit(&text)
    }

    /// Raw text currently held back
    pub fn pending(&self) -> &str {
        &self.carry
    }

    fn emit(&mut self, text: &str) -> String {
        let stripped = strip(text);
        let mut out = String::with_capacity(stripped.len());
        for ch in stripped.chars() {
            if ch == '\n' {
                if self.trailing_newlines < MAX_NEWLINE_RUN {
                    out.push('\n');
                }
                self.trailing_newlines += 1;
            } else {
                self.trailing_newlines = 0;
                out.push(ch);
            }
        }
        out
    }
}

/// Byte offset from which `text` must be carried into the next chunk
fn holdback_start(text: &str) -> usize {
    // A trailing `\r` may be the first half of `\r\n`
    let mut cut = if text.ends_with('\r') {
        text.len() - 1
    } else {
        text.len()
    };

    // Check the last two ESC bytes: an OSC terminated by `ESC \` may be
    // split right between its two terminator bytes.
    for (idx, _) in text.match_indices('\x1b').rev().take(2) {
        let tail = &text[idx..];
        if tail.len() <= MAX_ESCAPE_CARRY && INCOMPLETE_ESCAPE_PATTERN.is_match(tail) {
            cut = cut.min(idx);
        }
    }

    // `\r` + held escape + `\n` is still one line break
    if text[..cut].ends_with('\r') {
        cut -= 1;
    }

    cut
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_color_and_cursor_sequences() {
        let raw = "\x1b[1;32mgreen\x1b[0m \x1b[2K\x1b[?25lhidden\x1b[?25h";
        assert_eq!(normalize(raw), "green hidden");
    }

    #[test]
    fn test_strips_osc_title() {
        assert_eq!(normalize("\x1b]0;codex\x07hello"), "hello");
        assert_eq!(normalize("\x1b]2;title\x1b\\hello"), "hello");
    }

    #[test]
    fn test_line_endings() {
        assert_eq!(normalize_chunk("a\r\nb\rc\n"), "a\nb\nc\n");
    }

    #[test]
    fn test_control_characters_removed_except_tab_and_newline() {
        assert_eq!(normalize_chunk("a\x07b\x08c\td\n\x7f"), "abc\td\n");
    }

    #[test]
    fn test_c1_controls_removed() {
        assert_eq!(normalize("a\u{9b}b\u{85}c\u{80}\u{9f}d"), "abcd");
        // Neighbouring printable Latin-1 survives
        assert_eq!(normalize("caf\u{e9} \u{a0}ok"), "caf\u{e9} \u{a0}ok");
    }

    #[test]
    fn test_blank_runs_collapsed() {
        assert_eq!(normalize_chunk("a\n\n\n\n\nb"), "a\n\nb");
        assert_eq!(normalize_chunk("a\n\nb"), "a\n\nb");
        // Control characters between newlines do not protect the run
        assert_eq!(normalize_chunk("a\n\x01\n\x02\nb"), "a\n\nb");
    }

    #[test]
    fn test_trim_only_on_complete_buffer() {
        assert_eq!(normalize("  hello \n\n"), "hello");
        assert_eq!(normalize_chunk("  hello \n"), "  hello \n");
    }

    #[test]
    fn test_normalize_idempotent() {
        let samples = [
            "",
            "plain",
            "\x1b[31mred\x1b[0m\r\n\r\n\r\nnext",
            "\x1b\x01[31m odd",
            "  \t lead\n\n\n\ntrail \r",
            "\x1b]0;t\x07╭──────╮\n│ box │\n╰──────╯",
            "\x1b[",
            "a\x1b",
        ];
        for sample in samples {
            let once = normalize(sample);
            assert_eq!(normalize(&once), once, "not idempotent for {:?}", sample);
            let chunk = normalize_chunk(sample);
            assert_eq!(normalize_chunk(&chunk), chunk, "chunk not idempotent for {:?}", sample);
        }
    }

    #[test]
    fn test_stream_carries_split_crlf() {
        let mut normalizer = StreamNormalizer::new();
        let mut out = normalizer.feed("line one\r");
        assert_eq!(normalizer.pending(), "\r");
        out.push_str(&normalizer.feed("\nline two\n"));
        out.push_str(&normalizer.finish());
        assert_eq!(out, "line one\nline two\n");
    }

    #[test]
    fn test_stream_carries_split_escape() {
        let mut normalizer = StreamNormalizer::new();
        let mut out = normalizer.feed("cod\x1b[3");
        assert_eq!(out, "cod");
        out.push_str(&normalizer.feed("2mex\x1b[0m\n"));
        assert_eq!(out, "codex\n");
    }

    #[test]
    fn test_stream_matches_one_shot_for_every_split() {
        let raw = "\x1b]0;codex\x07start\r\n\x1b[1mcodex\x1b[0m\r\nHello\n\n\n\nworld\r\x1b[2K╭──╮\n";
        let expected = normalize_chunk(raw);

        let boundaries: Vec<usize> = raw
            .char_indices()
            .map(|(i, _)| i)
            .chain(std::iter::once(raw.len()))
            .collect();

        for &a in &boundaries {
            for &b in boundaries.iter().filter(|&&b| b >= a) {
                let mut normalizer = StreamNormalizer::new();
                let mut out = String::new();
                out.push_str(&normalizer.feed(&raw[..a]));
                out.push_str(&normalizer.feed(&raw[a..b]));
                out.push_str(&normalizer.feed(&raw[b..]));
                out.push_str(&normalizer.finish());
                assert_eq!(out, expected, "split at {} / {}", a, b);
            }
        }
    }

    #[test]
    fn test_stream_collapses_blank_runs_across_chunks() {
        let mut normalizer = StreamNormalizer::new();
        let mut out = normalizer.feed("a\n\n");
        out.push_str(&normalizer.feed("\n\nb"));
        assert_eq!(out, "a\n\nb");
    }
}
