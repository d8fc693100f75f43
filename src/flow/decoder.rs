//! UTF-8 boundary decoder
//!
//! Holds back a trailing incomplete multi-byte sequence so that downstream
//! consumers (xterm-style renderers) never see half a character. The decoder
//! never rewrites bytes: everything fed in comes back out, in order, either
//! from a later `feed` or from `flush`.

/// Longest UTF-8 sequence; the carry never holds more than `MAX_SEQ_LEN - 1` bytes.
const MAX_SEQ_LEN: usize = 4;

#[derive(Debug, Default)]
pub struct Utf8Decoder {
    carry: Vec<u8>,
}

impl Utf8Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `bytes` to the carry-over and release the longest prefix that
    /// ends on a sequence boundary.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<u8> {
        let mut buf = if self.carry.is_empty() {
            bytes.to_vec()
        } else {
            let mut combined = std::mem::take(&mut self.carry);
            combined.extend_from_slice(bytes);
            combined
        };

        let safe_end = find_utf8_safe_boundary(&buf);
        if safe_end < buf.len() {
            self.carry = buf.split_off(safe_end);
        }
        buf
    }

    /// Force-release whatever partial sequence is still held.
    pub fn flush(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.carry)
    }

    /// Number of bytes currently held back.
    pub fn pending(&self) -> usize {
        self.carry.len()
    }
}

/// Index up to which `buf` consists of complete characters.
///
/// Only a trailing, still-completable sequence is excluded. Invalid bytes
/// (stray continuations, bad lead bytes, over-long runs) are released as-is;
/// rendering them is the consumer's problem and holding them could stall
/// output forever.
pub fn find_utf8_safe_boundary(buf: &[u8]) -> usize {
    let len = buf.len();
    let mut i = len;

    while i > 0 && i > len.saturating_sub(MAX_SEQ_LEN) {
        let byte = buf[i - 1];

        // ASCII
        if byte & 0x80 == 0 {
            return len;
        }

        // Continuation byte, keep walking back to find the lead
        if byte & 0xC0 == 0x80 {
            i -= 1;
            continue;
        }

        let char_len = if byte & 0xF8 == 0xF0 {
            4
        } else if byte & 0xF0 == 0xE0 {
            3
        } else if byte & 0xE0 == 0xC0 {
            2
        } else {
            return len;
        };

        let start = i - 1;
        return if len - start >= char_len { len } else { start };
    }

    len
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_ascii_passes_through() {
        let mut decoder = Utf8Decoder::new();
        assert_eq!(decoder.feed(b"hello world"), b"hello world");
        assert_eq!(decoder.pending(), 0);
    }

    #[test]
    fn test_split_cjk_is_held_back() {
        // "你好" = E4 BD A0 E5 A5 BD
        let mut decoder = Utf8Decoder::new();
        assert_eq!(decoder.feed(&[0xE4, 0xBD, 0xA0, 0xE5, 0xA5]), "你".as_bytes());
        assert_eq!(decoder.pending(), 2);
        assert_eq!(decoder.feed(&[0xBD]), "好".as_bytes());
        assert_eq!(decoder.pending(), 0);
    }

    #[test]
    fn test_emoji_byte_by_byte() {
        let emoji = "😀".as_bytes();
        let mut decoder = Utf8Decoder::new();
        assert!(decoder.feed(&emoji[..1]).is_empty());
        assert!(decoder.feed(&emoji[1..2]).is_empty());
        assert!(decoder.feed(&emoji[2..3]).is_empty());
        assert_eq!(decoder.feed(&emoji[3..]), emoji);
    }

    #[test]
    fn test_flush_releases_truncated_sequence() {
        let mut decoder = Utf8Decoder::new();
        assert_eq!(decoder.feed(&[b'a', 0xF0, 0x9F]), b"a");
        assert_eq!(decoder.flush(), vec![0xF0, 0x9F]);
        assert!(decoder.flush().is_empty());
    }

    #[test]
    fn test_invalid_bytes_are_not_held() {
        let mut decoder = Utf8Decoder::new();
        // Stray continuation run longer than any sequence
        assert_eq!(decoder.feed(&[0x80, 0x80, 0x80, 0x80]).len(), 4);
        // Invalid lead byte
        assert_eq!(decoder.feed(&[0xFF]), vec![0xFF]);
        // Complete sequence followed by an extra continuation
        assert_eq!(decoder.feed(&[0xC3, 0xA9, 0xA9]), vec![0xC3, 0xA9, 0xA9]);
        assert_eq!(decoder.pending(), 0);
    }

    fn chunked_bytes() -> impl Strategy<Value = (Vec<u8>, Vec<usize>)> {
        let text = prop_oneof![
            "[a-z0-9 \\n]{0,64}".prop_map(String::into_bytes),
            "[\\u{80}-\\u{10FFFF}a-z]{0,32}".prop_map(String::into_bytes),
            proptest::collection::vec(any::<u8>(), 0..64),
        ];
        (text, proptest::collection::vec(0usize..8, 0..16))
    }

    proptest! {
        /// Concatenated outputs plus the final flush reproduce the input exactly.
        #[test]
        fn feed_then_flush_is_lossless((bytes, cuts) in chunked_bytes()) {
            let mut decoder = Utf8Decoder::new();
            let mut out = Vec::new();
            let mut rest: &[u8] = &bytes;
            for cut in cuts {
                let n = cut.min(rest.len());
                out.extend(decoder.feed(&rest[..n]));
                rest = &rest[n..];
            }
            out.extend(decoder.feed(rest));
            out.extend(decoder.flush());
            prop_assert_eq!(out, bytes);
        }

        /// Every non-flush chunk of valid text is itself valid UTF-8.
        #[test]
        fn valid_text_chunks_end_on_boundaries(
            text in "[\\u{0}-\\u{10FFFF}]{0,48}",
            cuts in proptest::collection::vec(0usize..6, 0..16),
        ) {
            let bytes = text.as_bytes();
            let mut decoder = Utf8Decoder::new();
            let mut rest: &[u8] = bytes;
            for cut in cuts {
                let n = cut.min(rest.len());
                let chunk = decoder.feed(&rest[..n]);
                prop_assert!(std::str::from_utf8(&chunk).is_ok());
                prop_assert!(decoder.pending() < MAX_SEQ_LEN);
                rest = &rest[n..];
            }
            let chunk = decoder.feed(rest);
            prop_assert!(std::str::from_utf8(&chunk).is_ok());
            prop_assert!(decoder.flush().is_empty());
        }
    }
}
