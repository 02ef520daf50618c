//! Chat mention stripping

use once_cell::sync::Lazy;
use regex::Regex;

/// `<@U123>` / `<@W123>` user and bot mentions
static USER_MENTION: Lazy<Regex> = Lazy::new(|| Regex::new(r"<@[UW][A-Z0-9]+>").unwrap());

/// `<#C123|general>` channel links
static CHANNEL_MENTION: Lazy<Regex> = Lazy::new(|| Regex::new(r"<#[A-Z0-9]+\|[^>]+>").unwrap());

/// `<!here>` and `<!channel>` broadcasts
static BROADCAST_MENTION: Lazy<Regex> = Lazy::new(|| Regex::new(r"<!(?:here|channel)>").unwrap());

/// Strip mentions from a message, leaving the task text.
///
/// An empty result means the message carried no task.
pub fn extract_mention_text(text: &str) -> String {
    let text = USER_MENTION.replace_all(text, "");
    let text = CHANNEL_MENTION.replace_all(&text, "");
    let text = BROADCAST_MENTION.replace_all(&text, "");
    text.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_bot_mention() {
        assert_eq!(
            extract_mention_text("<@U07ABC123> fix the failing test"),
            "fix the failing test"
        );
        assert_eq!(extract_mention_text("<@W1> hi <@U2>"), "hi");
    }

    #[test]
    fn test_strips_channel_and_broadcast() {
        assert_eq!(
            extract_mention_text("<!here> see <#C024BE7LR|general> <!channel>"),
            "see"
        );
    }

    #[test]
    fn test_keeps_other_angle_brackets() {
        assert_eq!(
            extract_mention_text("<@U1> compare <https://example.com> with Vec<u8>"),
            "compare <https://example.com> with Vec<u8>"
        );
    }

    #[test]
    fn test_empty_after_stripping() {
        assert_eq!(extract_mention_text("<@U07ABC123>   "), "");
        assert_eq!(extract_mention_text(""), "");
    }
}
