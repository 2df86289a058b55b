/// Incremental newline splitter for byte chunks read off a growing file.
///
/// Bytes after the last LF are carried between pushes, so a write that lands
/// mid-line (or mid-UTF-8-sequence) surfaces only once its terminator
/// arrives. CR characters are stripped, invalid UTF-8 is replaced, and empty
/// segments are dropped.
#[derive(Debug, Default)]
pub struct LineBuffer {
    carry: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk; returns every newline-terminated line it completes.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.carry.extend_from_slice(bytes);

        let Some(last_newline) = self.carry.iter().rposition(|&b| b == b'\n') else {
            return Vec::new();
        };

        let tail = self.carry.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.carry, tail);

        complete
            .split(|&b| b == b'\n')
            .filter(|segment| !segment.is_empty())
            .filter_map(|segment| {
                let text = String::from_utf8_lossy(segment).replace('\r', "");
                if text.is_empty() { None } else { Some(text) }
            })
            .collect()
    }

    /// Drop the carried tail; used when the source file was truncated and
    /// old partial content must not leak into the new content
    pub fn reset(&mut self) {
        self.carry.clear();
    }

    #[cfg(test)]
    fn carry_len(&self) -> usize {
        self.carry.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_complete_lines() {
        let mut buffer = LineBuffer::new();
        let lines = buffer.push(b"one\ntwo\n");
        assert_eq!(lines, vec!["one", "two"]);
        assert_eq!(buffer.carry_len(), 0);
    }

    #[test]
    fn test_partial_line_carried() {
        let mut buffer = LineBuffer::new();
        assert!(buffer.push(b"par").is_empty());
        assert!(buffer.push(b"tial").is_empty());
        let lines = buffer.push(b" line\nnext");
        assert_eq!(lines, vec!["partial line"]);
        assert_eq!(buffer.carry_len(), 4);
        assert_eq!(buffer.push(b"\n"), vec!["next"]);
    }

    #[test]
    fn test_cr_stripped() {
        let mut buffer = LineBuffer::new();
        let lines = buffer.push(b"dos\r\nunix\n");
        assert_eq!(lines, vec!["dos", "unix"]);
    }

    #[test]
    fn test_empty_lines_filtered() {
        let mut buffer = LineBuffer::new();
        let lines = buffer.push(b"a\n\n\r\nb\n");
        assert_eq!(lines, vec!["a", "b"]);
    }

    #[test]
    fn test_utf8_split_across_chunks() {
        let text = "héllo wörld\n";
        let bytes = text.as_bytes();
        let mut buffer = LineBuffer::new();
        // Split inside the two-byte é sequence
        assert!(buffer.push(&bytes[..2]).is_empty());
        let lines = buffer.push(&bytes[2..]);
        assert_eq!(lines, vec!["héllo wörld"]);
    }

    #[test]
    fn test_reset_drops_carry() {
        let mut buffer = LineBuffer::new();
        buffer.push(b"dangling");
        buffer.reset();
        assert_eq!(buffer.push(b"fresh\n"), vec!["fresh"]);
    }

    // Any chunking of a stream yields the same lines as one whole push
    #[test]
    fn test_chunk_boundaries_do_not_matter() {
        let stream = b"alpha\r\nbeta\n\ngamma delta\nepsilon\n";
        let expected = {
            let mut buffer = LineBuffer::new();
            buffer.push(stream)
        };

        for chunk_size in 1..stream.len() {
            let mut buffer = LineBuffer::new();
            let mut lines = Vec::new();
            for chunk in stream.chunks(chunk_size) {
                lines.extend(buffer.push(chunk));
            }
            assert_eq!(lines, expected, "chunk size {chunk_size}");
            assert_eq!(buffer.carry_len(), 0);
        }
    }
}
