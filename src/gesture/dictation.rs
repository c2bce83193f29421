//! Transcript cleanup for dictation segments.

use regex::Regex;
use std::sync::OnceLock;

/// Strip recognizer noise markers and collapse whitespace so only spoken words
/// reach the composer.
pub fn sanitize_transcript(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return String::new();
    }
    static NON_SPEECH_RE: OnceLock<Regex> = OnceLock::new();
    let re = NON_SPEECH_RE.get_or_init(|| {
        Regex::new(
            r"(?i)\[\s*\]|\(\s*\)|\[(?:\s*(?:silence|noise|inaudible|blank_audio|blank audio|music|laughter|applause|cough|breath(?:ing)?|wind|background)\s*)\]|\((?:\s*(?:silence|noise|inaudible|blank audio|music|laughter|applause|cough|breath(?:ing)?|wind|background)\s*)\)",
        )
        .expect("non-speech regex should compile")
    });
    let without_markers = re.replace_all(trimmed, " ");
    without_markers
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Append a final segment to the committed composer text. Returns the cleaned
/// segment, or `None` when nothing speakable was left.
pub(super) fn commit_segment(buffer: &mut String, segment: &str) -> Option<String> {
    let cleaned = sanitize_transcript(segment);
    if cleaned.is_empty() {
        return None;
    }
    buffer.push_str(&cleaned);
    buffer.push(' ');
    Some(cleaned)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_noise_markers() {
        assert_eq!(sanitize_transcript("  [BLANK_AUDIO] hello (cough) there "), "hello there");
    }

    #[test]
    fn empty_after_cleanup() {
        assert_eq!(sanitize_transcript("[silence]"), "");
    }

    #[test]
    fn committed_segments_end_with_space() {
        let mut buffer = String::new();
        assert_eq!(commit_segment(&mut buffer, "hello"), Some("hello".to_string()));
        assert_eq!(commit_segment(&mut buffer, " world  "), Some("world".to_string()));
        assert_eq!(buffer, "hello world ");
    }

    #[test]
    fn blank_segments_are_not_committed() {
        let mut buffer = String::from("keep ");
        assert_eq!(commit_segment(&mut buffer, "[noise]"), None);
        assert_eq!(buffer, "keep ");
    }
}
