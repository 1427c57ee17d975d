//! Small helpers shared across modules.

/// Normalize optional text by trimming whitespace and dropping empties.
///
/// Returns `None` when the input is `None` or trims down to nothing.
pub fn normalize_text_option(value: Option<String>) -> Option<String> {
    let value = value?;
    let value = value.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Check if a string starts with `http://` or `https://`.
pub fn is_http_url(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://")
}

/// Truncate text to at most 180 characters for log and error messages.
pub fn compact_text(value: &str) -> String {
    value.trim().chars().take(180).collect()
}

/// Current Unix timestamp in seconds.
pub fn unix_timestamp_now() -> i64 {
    chrono::Utc::now().timestamp()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_text_option_drops_blank_values() {
        assert_eq!(normalize_text_option(None), None);
        assert_eq!(normalize_text_option(Some(String::new())), None);
        assert_eq!(normalize_text_option(Some("  \t ".to_string())), None);
    }

    #[test]
    fn normalize_text_option_trims_value() {
        assert_eq!(
            normalize_text_option(Some("  AIzaSyExample  ".to_string())),
            Some("AIzaSyExample".to_string())
        );
    }

    #[test]
    fn is_http_url_accepts_valid_schemes() {
        assert!(is_http_url("https://demo.firebaseio.com"));
        assert!(is_http_url("http://127.0.0.1:9000"));
        assert!(!is_http_url("wss://demo.firebaseio.com"));
        assert!(!is_http_url("demo.firebaseio.com"));
    }

    #[test]
    fn compact_text_counts_characters_not_bytes() {
        let long = "😰".repeat(300);
        let compacted = compact_text(&long);
        assert_eq!(compacted.chars().count(), 180);
    }

    #[test]
    fn unix_timestamp_now_is_past_2024() {
        assert!(unix_timestamp_now() > 1_704_067_200);
    }
}
