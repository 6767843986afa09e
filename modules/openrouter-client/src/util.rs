/// Truncate a string to at most `max_bytes` bytes without splitting a
/// multi-byte character.
pub fn truncate_to_char_boundary(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let end = (0..=max_bytes)
        .rev()
        .find(|&i| s.is_char_boundary(i))
        .unwrap_or(0);
    &s[..end]
}

/// Strip a markdown code fence wrapping a model response, including an
/// optional `json` language tag on the opening fence.
pub fn strip_code_blocks(response: &str) -> &str {
    let trimmed = response.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let inner = inner.strip_suffix("```").unwrap_or(inner);
    inner.strip_prefix("json").unwrap_or(inner).trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncation_respects_char_boundaries() {
        let caption = "Vorführung der Bodycam-Aufnahme: 傷害事件";
        for cap in 0..caption.len() {
            let cut = truncate_to_char_boundary(caption, cap);
            assert!(cut.len() <= cap);
            assert!(caption.starts_with(cut));
        }
    }

    #[test]
    fn short_snippets_pass_through_untouched() {
        assert_eq!(
            truncate_to_char_boundary("State v. Ortega, sentencing video", 500),
            "State v. Ortega, sentencing video"
        );
    }

    #[test]
    fn fenced_verdicts_unwrap_to_bare_json() {
        let fenced = "```json\n{\"recommendation\": \"STRONG\"}\n```";
        assert_eq!(strip_code_blocks(fenced), "{\"recommendation\": \"STRONG\"}");
        let untagged = "```\n{\"recommendation\": \"SKIP\"}\n```";
        assert_eq!(strip_code_blocks(untagged), "{\"recommendation\": \"SKIP\"}");
    }

    #[test]
    fn unfenced_responses_only_get_trimmed() {
        assert_eq!(strip_code_blocks("  {\"score\": 3}\n"), "{\"score\": 3}");
    }
}
