//! Sliding-window text segmenter.
//!
//! Splits extracted document text into overlapping fixed-size windows:
//! a `window_size`-character frame slides forward by
//! `window_size - overlap` characters from offset 0, and the final
//! window is clipped to the end of the text rather than padded. Windows
//! are the unit of embedding and retrieval.
//!
//! This is a pure function — no I/O, no side effects — and it is
//! character-based, so a window never splits a UTF-8 code point.

use crate::error::RagError;

/// Split `text` into ordered overlapping windows.
///
/// Produces zero windows for empty input. Rejects `overlap >= window_size`
/// with [`RagError::Configuration`] — such a frame would never advance.
pub fn segment(text: &str, window_size: usize, overlap: usize) -> Result<Vec<String>, RagError> {
    if window_size == 0 || overlap >= window_size {
        return Err(RagError::Configuration(format!(
            "invalid window sizing: window_size={window_size}, overlap={overlap} \
             (overlap must be smaller than window_size)"
        )));
    }

    if text.is_empty() {
        return Ok(Vec::new());
    }

    let chars: Vec<char> = text.chars().collect();
    let step = window_size - overlap;
    let mut windows = Vec::new();
    let mut start = 0usize;

    loop {
        let end = (start + window_size).min(chars.len());
        windows.push(chars[start..end].iter().collect());
        if end == chars.len() {
            break;
        }
        start += step;
    }

    Ok(windows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_text_no_windows() {
        let windows = segment("", 1000, 200).unwrap();
        assert!(windows.is_empty());
    }

    #[test]
    fn test_short_text_single_window() {
        let windows = segment("hello world", 1000, 200).unwrap();
        assert_eq!(windows, vec!["hello world".to_string()]);
    }

    #[test]
    fn test_2500_chars_three_windows() {
        let text: String = std::iter::repeat('x').take(2500).collect();
        let windows = segment(&text, 1000, 200).unwrap();
        // 0–1000, 800–1800, 1600–2500
        assert_eq!(windows.len(), 3);
        assert_eq!(windows[0].chars().count(), 1000);
        assert_eq!(windows[1].chars().count(), 1000);
        assert_eq!(windows[2].chars().count(), 900);
    }

    #[test]
    fn test_window_count_formula() {
        // windows = ceil(max(L - O, 0) / (W - O)), min 1 for non-empty text
        for (len, window, overlap) in [
            (1usize, 1000usize, 200usize),
            (500, 1000, 200),
            (1000, 1000, 200),
            (1001, 1000, 200),
            (2500, 1000, 200),
            (10_000, 1000, 200),
            (37, 10, 3),
        ] {
            let text: String = std::iter::repeat('a').take(len).collect();
            let windows = segment(&text, window, overlap).unwrap();
            let expected = usize::max(1, len.saturating_sub(overlap).div_ceil(window - overlap));
            assert_eq!(
                windows.len(),
                expected,
                "len={len} window={window} overlap={overlap}"
            );
        }
    }

    #[test]
    fn test_windows_reconstruct_original() {
        let text: String = (0..3000).map(|i| char::from(b'a' + (i % 26) as u8)).collect();
        let overlap = 200;
        let windows = segment(&text, 1000, overlap).unwrap();

        let mut rebuilt = windows[0].clone();
        for window in &windows[1..] {
            rebuilt.extend(window.chars().skip(overlap));
        }
        assert_eq!(rebuilt, text);
    }

    #[test]
    fn test_overlap_content_matches() {
        let text: String = (0..1500).map(|i| char::from(b'a' + (i % 26) as u8)).collect();
        let windows = segment(&text, 1000, 200).unwrap();
        assert_eq!(windows.len(), 2);
        let tail: String = windows[0].chars().skip(800).collect();
        let head: String = windows[1].chars().take(200).collect();
        assert_eq!(tail, head);
    }

    #[test]
    fn test_multibyte_boundary_safety() {
        let text: String = std::iter::repeat('é').take(1500).collect();
        let windows = segment(&text, 1000, 200).unwrap();
        assert_eq!(windows.len(), 2);
        assert_eq!(windows[0].chars().count(), 1000);
    }

    #[test]
    fn test_overlap_equal_to_window_rejected() {
        let err = segment("some text", 100, 100).unwrap_err();
        assert!(matches!(err, RagError::Configuration(_)));
    }

    #[test]
    fn test_overlap_larger_than_window_rejected() {
        let err = segment("some text", 100, 150).unwrap_err();
        assert!(matches!(err, RagError::Configuration(_)));
    }

    #[test]
    fn test_zero_window_rejected() {
        let err = segment("some text", 0, 0).unwrap_err();
        assert!(matches!(err, RagError::Configuration(_)));
    }

    #[test]
    fn test_deterministic() {
        let text = "The quick brown fox jumps over the lazy dog. ".repeat(100);
        let a = segment(&text, 300, 60).unwrap();
        let b = segment(&text, 300, 60).unwrap();
        assert_eq!(a, b);
    }
}
