//! Permissive UTF-8 decoding of streamed output chunks.

/// Decodes a byte stream chunk by chunk, replacing invalid bytes.
///
/// A multi-byte sequence cut at a chunk boundary is held back until the rest
/// arrives instead of being replaced.
#[derive(Debug, Default)]
pub struct ChunkDecoder {
    pending: Vec<u8>,
}

impl ChunkDecoder {
    pub fn decode(&mut self, chunk: &[u8]) -> String {
        self.pending.extend_from_slice(chunk);
        let split = self.pending.len() - incomplete_tail(&self.pending);
        let text = String::from_utf8_lossy(&self.pending[..split]).into_owned();
        self.pending.drain(..split);
        text
    }

    /// Flush whatever is held back, replacing an unfinished sequence.
    pub fn finish(&mut self) -> String {
        let text = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        text
    }
}

/// Length of a trailing, not yet complete UTF-8 sequence.
fn incomplete_tail(bytes: &[u8]) -> usize {
    for back in 1..=bytes.len().min(3) {
        let byte = bytes[bytes.len() - back];
        if byte & 0b1100_0000 == 0b1000_0000 {
            continue;
        }
        let width = match byte {
            0xF0..=0xF7 => 4,
            0xE0..=0xEF => 3,
            0xC0..=0xDF => 2,
            _ => 1,
        };
        return if width > back { back } else { 0 };
    }
    0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reassembles_split_sequence() {
        let bytes = "port 22 ✓ open".as_bytes();
        let check = bytes.iter().position(|b| *b == 0xE2).expect("lead byte");

        let mut decoder = ChunkDecoder::default();
        let mut out = decoder.decode(&bytes[..check + 1]);
        out.push_str(&decoder.decode(&bytes[check + 1..]));
        out.push_str(&decoder.finish());

        assert_eq!(out, "port 22 ✓ open");
    }

    #[test]
    fn replaces_invalid_bytes() {
        let mut decoder = ChunkDecoder::default();
        let out = decoder.decode(b"ok \xFF done");
        assert_eq!(out, "ok \u{FFFD} done");
    }

    #[test]
    fn finish_replaces_truncated_tail() {
        let mut decoder = ChunkDecoder::default();
        assert_eq!(decoder.decode(b"abc\xE2\x9C"), "abc");
        assert_eq!(decoder.finish(), "\u{FFFD}");
    }
}
