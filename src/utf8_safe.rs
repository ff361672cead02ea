//! UTF-8 boundary helpers for engine output and log truncation.
//!
//! Engine output arrives as raw byte chunks that can end in the middle of a
//! multi-byte character; these helpers keep the incomplete tail around
//! instead of replacing it with U+FFFD.

/// Returns a prefix of the string up to `max_chars` characters.
/// Respects UTF-8 boundaries and won't panic on multi-byte characters.
pub fn safe_prefix(s: &str, max_chars: usize) -> &str {
    if s.is_empty() || max_chars == 0 {
        return "";
    }

    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Length of the longest prefix of `bytes` that does not end inside an
/// incomplete multi-byte sequence.
///
/// Invalid bytes are treated as complete (they will be decoded lossily);
/// only a truncated sequence at the very end is held back.
pub fn complete_prefix_len(bytes: &[u8]) -> usize {
    let len = bytes.len();
    // A UTF-8 sequence is at most 4 bytes, so only the last 3 can be a dangling lead.
    let lookback = len.min(3);
    for back in 1..=lookback {
        let idx = len - back;
        let byte = bytes[idx];
        if byte & 0b1100_0000 == 0b1000_0000 {
            // continuation byte, keep looking for the lead
            continue;
        }
        let needed = sequence_len(byte);
        if needed > back {
            return idx;
        }
        return len;
    }
    len
}

/// Decode the complete part of `bytes`, returning the text and the number
/// of bytes consumed.
pub fn decode_complete(bytes: &[u8]) -> (String, usize) {
    let end = complete_prefix_len(bytes);
    (String::from_utf8_lossy(&bytes[..end]).into_owned(), end)
}

fn sequence_len(lead: u8) -> usize {
    match lead {
        0x00..=0x7F => 1,
        0xC0..=0xDF => 2,
        0xE0..=0xEF => 3,
        0xF0..=0xF7 => 4,
        _ => 1,
    }
}
