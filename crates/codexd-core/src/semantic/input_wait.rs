//! Input-wait detector
//!
//! Decides from the tail of the display buffer whether the assistant is
//! blocked on human input. Best effort: a missed prompt only means the
//! session keeps showing as running.
//!
//! ## Detection order (first match wins)
//!
//! 1. Onboarding hint: `Try: "explain this codebase to me"` → Explanation
//! 2. `Enter to send` footer → General
//! 3. Generic waiting heuristics (bare prompt glyph, "press enter", ...) → General

use once_cell::sync::Lazy;
use regex::Regex;

use crate::types::{InputWait, PromptType};

/// Number of trailing lines inspected
pub const TAIL_LINES: usize = 5;

/// Reply offered for the onboarding prompt
pub const EXPLANATION_SUGGESTION: &str = "explain this codebase to me";

/// Line that ends in a bare prompt glyph (`>`, `❯`, `›`)
static PROMPT_GLYPH_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:^|\s)[>❯›]\s*$").unwrap());

static WAITING_PHRASE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)press enter|waiting for input|enter your response|type your message").unwrap()
});

/// Input-wait classifier
#[derive(Debug, Clone)]
pub struct InputWaitDetector {
    tail_lines: usize,
}

impl Default for InputWaitDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl InputWaitDetector {
    pub fn new() -> Self {
        Self {
            tail_lines: TAIL_LINES,
        }
    }

    /// Classify a display buffer
    pub fn detect(&self, display: &str) -> InputWait {
        let text = display.trim_end();
        if text.is_empty() {
            return InputWait::not_waiting();
        }

        let lines: Vec<&str> = text.lines().collect();
        let tail = &lines[lines.len().saturating_sub(self.tail_lines)..];
        let tail_lower = tail.join("\n").to_lowercase();

        if tail_lower.contains("try:") && tail_lower.contains("explain this codebase") {
            return InputWait::waiting(PromptType::Explanation)
                .with_suggestion(EXPLANATION_SUGGESTION);
        }

        if tail_lower.contains("enter to send") {
            return InputWait::waiting(PromptType::General);
        }

        if self.has_waiting_heuristic(tail) {
            return InputWait::waiting(PromptType::General);
        }

        InputWait::not_waiting()
    }

    fn has_waiting_heuristic(&self, tail: &[&str]) -> bool {
        let ends_in_prompt = tail
            .last()
            .map_or(false, |line| PROMPT_GLYPH_PATTERN.is_match(line));

        ends_in_prompt || tail.iter().any(|line| WAITING_PHRASE_PATTERN.is_match(line))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explanation_prompt() {
        let detector = InputWaitDetector::new();
        let display = "Welcome to Codex\nTry: \"EXPLAIN THIS CODEBASE TO ME\"\n";
        let wait = detector.detect(display);
        assert!(wait.is_waiting_for_input);
        assert_eq!(wait.prompt_type, Some(PromptType::Explanation));
        assert_eq!(wait.suggestion.as_deref(), Some("explain this codebase to me"));
    }

    #[test]
    fn test_explanation_across_tail_lines() {
        let detector = InputWaitDetector::new();
        let display = "Ready.\ntry:\n  explain this codebase to me\n  fix the failing test\n";
        assert_eq!(
            detector.detect(display).prompt_type,
            Some(PromptType::Explanation)
        );
    }

    #[test]
    fn test_enter_to_send() {
        let detector = InputWaitDetector::new();
        let wait = detector.detect("Done.\nctrl+c to exit | Enter to send\n");
        assert!(wait.is_waiting_for_input);
        assert_eq!(wait.prompt_type, Some(PromptType::General));
        assert_eq!(wait.suggestion, None);
    }

    #[test]
    fn test_generic_heuristics() {
        let detector = InputWaitDetector::new();
        for display in [
            "Applied patch\n❯ ",
            "Question for you\n>",
            "Press Enter to continue",
            "Waiting for input...",
            "Please enter your response below",
            "Type your message",
        ] {
            let wait = detector.detect(display);
            assert!(wait.is_waiting_for_input, "missed: {:?}", display);
            assert_eq!(wait.prompt_type, Some(PromptType::General));
        }
    }

    #[test]
    fn test_negative() {
        let detector = InputWaitDetector::new();
        let wait = detector.detect("Building...\nStill working\n");
        assert_eq!(wait, InputWait::not_waiting());
        assert!(!wait.is_waiting_for_input);
        assert_eq!(wait.prompt_type, None);

        assert_eq!(detector.detect(""), InputWait::not_waiting());
        assert_eq!(detector.detect("\n\n  \n"), InputWait::not_waiting());
        // Arrows inside text are not prompts
        assert!(!detector.detect("a -> b\nx => y is done").is_waiting_for_input);
    }

    #[test]
    fn test_only_tail_is_inspected() {
        let detector = InputWaitDetector::new();
        let display = "Try: explain this codebase\n1\n2\n3\n4\n5\n";
        assert!(!detector.detect(display).is_waiting_for_input);
    }

    #[test]
    fn test_rule_order() {
        let detector = InputWaitDetector::new();
        // Explanation wins over the enter-to-send footer
        let display = "Try: explain this codebase to me\nEnter to send";
        assert_eq!(
            detector.detect(display).prompt_type,
            Some(PromptType::Explanation)
        );
    }
}
