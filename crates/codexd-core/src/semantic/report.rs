//! Output reporting helpers
//!
//! Pull error lines, the launch command and completion hints out of
//! normalized output for final/error rendering.

use once_cell::sync::Lazy;
use regex::Regex;

/// `error:`, `failed:` and `exception:` capture the remainder of the line
static ERROR_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r"(?i)error:\s*(.+)").unwrap(),
        Regex::new(r"(?i)failed:\s*(.+)").unwrap(),
        Regex::new(r"(?i)exception:\s*(.+)").unwrap(),
    ]
});

static TRACEBACK_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)traceback").unwrap());

static COMPLETION_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r"(?i)process\s+finished").unwrap(),
        Regex::new(r"(?i)command\s+completed").unwrap(),
        Regex::new(r"(?i)execution\s+finished").unwrap(),
        Regex::new(r"(?i)codex\s+session\s+ended").unwrap(),
        Regex::new(r"(?m)^\s*[$>❯]\s*$").unwrap(),
    ]
});

/// Collect error messages, one entry per matching pattern per line
pub fn extract_errors(text: &str) -> Vec<String> {
    let mut errors = Vec::new();
    for line in text.lines() {
        for pattern in ERROR_PATTERNS.iter() {
            if let Some(caps) = pattern.captures(line) {
                if let Some(message) = caps.get(1) {
                    errors.push(message.as_str().trim().to_string());
                }
            }
        }
        if TRACEBACK_PATTERN.is_match(line) {
            errors.push(line.trim().to_string());
        }
    }
    errors
}

/// First line that looks like a `codex ... --flag` invocation
pub fn extract_command(text: &str) -> Option<String> {
    text.lines()
        .find(|line| line.to_lowercase().contains("codex") && line.contains("--"))
        .map(|line| line.trim().to_string())
}

/// Whether the output shows the assistant finished (shell prompt back, etc.)
pub fn detect_completion(text: &str) -> bool {
    COMPLETION_PATTERNS.iter().any(|pattern| pattern.is_match(text))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_errors() {
        let text = "compiling\nerror: mismatched types\nTest FAILED: integration\nok\nTraceback (most recent call last):";
        assert_eq!(
            extract_errors(text),
            vec![
                "mismatched types".to_string(),
                "integration".to_string(),
                "Traceback (most recent call last):".to_string(),
            ]
        );
        assert!(extract_errors("all good\n").is_empty());
    }

    #[test]
    fn test_extract_command() {
        let text = "starting\n$ codex --provider openai --approval-mode full-auto \"fix\"\nrunning";
        assert_eq!(
            extract_command(text).as_deref(),
            Some("$ codex --provider openai --approval-mode full-auto \"fix\"")
        );
        assert_eq!(extract_command("codex\nreply"), None);
    }

    #[test]
    fn test_detect_completion() {
        assert!(detect_completion("work\nProcess finished with exit code 0"));
        assert!(detect_completion("done\n$ \n"));
        assert!(detect_completion("Codex session ended"));
        assert!(!detect_completion("still thinking about it"));
    }
}
