//
// Copyright 2017-2026 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! Newline framing over arbitrary read chunk boundaries

use bytes::BytesMut;

/// Accumulates raw read chunks and yields complete `\n`-terminated lines.
///
/// Reads arrive in arbitrary slices; a line may span many reads, and one
/// read may carry many lines. Bytes after the last terminator stay buffered
/// until a later read completes them. A trailing `\r` before the terminator
/// is trimmed; neither terminator byte appears in the yielded text.
#[derive(Debug, Default)]
pub struct LineBuffer {
    buf: BytesMut,
}

impl LineBuffer {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one raw read chunk.
    pub fn extend(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Iterate over the complete lines buffered so far, consuming them.
    ///
    /// Each call to `next` splits off one line; iteration ends at the first
    /// unterminated remainder, which stays buffered. The iterator borrows
    /// the buffer mutably, so callers drain it before reading again.
    pub fn lines(&mut self) -> Lines<'_> {
        Lines { buf: &mut self.buf }
    }

    /// Bytes buffered but not yet terminated.
    pub fn pending_bytes(&self) -> usize {
        self.buf.len()
    }
}

/// Draining iterator over the complete lines in a [`LineBuffer`].
#[derive(Debug)]
pub struct Lines<'a> {
    buf: &'a mut BytesMut,
}

impl Iterator for Lines<'_> {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        let pos = self.buf.iter().position(|&b| b == b'\n')?;
        let mut line = self.buf.split_to(pos + 1);
        line.truncate(pos);
        if line.last() == Some(&b'\r') {
            line.truncate(line.len() - 1);
        }
        // Contents are opaque to the framing layer; lossy decoding keeps
        // malformed input from taking the connection down.
        Some(String::from_utf8_lossy(&line).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn drain(buf: &mut LineBuffer) -> Vec<String> {
        buf.lines().collect()
    }

    #[test]
    fn test_single_complete_line() {
        let mut buf = LineBuffer::new();
        buf.extend(b"NICK alice\n");
        assert_eq!(drain(&mut buf), vec!["NICK alice"]);
        assert_eq!(buf.pending_bytes(), 0);
    }

    #[test]
    fn test_crlf_terminator_trimmed() {
        let mut buf = LineBuffer::new();
        buf.extend(b"PING :token\r\n");
        assert_eq!(drain(&mut buf), vec!["PING :token"]);
    }

    #[test]
    fn test_partial_line_stays_buffered() {
        let mut buf = LineBuffer::new();
        buf.extend(b"PRIVMSG #room :hel");
        assert!(drain(&mut buf).is_empty());
        assert_eq!(buf.pending_bytes(), 18);
        buf.extend(b"lo\n");
        assert_eq!(drain(&mut buf), vec!["PRIVMSG #room :hello"]);
    }

    #[test]
    fn test_multiple_lines_in_one_read() {
        let mut buf = LineBuffer::new();
        buf.extend(b"one\ntwo\r\nthree\nfour");
        assert_eq!(drain(&mut buf), vec!["one", "two", "three"]);
        assert_eq!(buf.pending_bytes(), 4);
    }

    #[test]
    fn test_empty_line_yields_empty_string() {
        let mut buf = LineBuffer::new();
        buf.extend(b"\n\r\nx\n");
        assert_eq!(drain(&mut buf), vec!["", "", "x"]);
    }

    #[test]
    fn test_interior_cr_preserved() {
        let mut buf = LineBuffer::new();
        buf.extend(b"a\rb\n");
        assert_eq!(drain(&mut buf), vec!["a\rb"]);
    }

    #[test]
    fn test_invalid_utf8_decoded_lossily() {
        let mut buf = LineBuffer::new();
        buf.extend(b"ok \xff\xfe bytes\n");
        let lines = drain(&mut buf);
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with("ok "));
        assert!(lines[0].ends_with(" bytes"));
    }

    #[test]
    fn test_early_iterator_drop_keeps_remaining_lines() {
        let mut buf = LineBuffer::new();
        buf.extend(b"first\nsecond\n");
        let first = buf.lines().next();
        assert_eq!(first.as_deref(), Some("first"));
        assert_eq!(drain(&mut buf), vec!["second"]);
    }

    proptest! {
        /// Splitting the input at arbitrary chunk boundaries never changes
        /// the framed output.
        #[test]
        fn test_chunking_is_transparent(
            lines in proptest::collection::vec("[a-zA-Z0-9 ]{0,40}", 0..8),
            splits in proptest::collection::vec(0usize..64, 0..8),
        ) {
            let mut wire = Vec::new();
            for line in &lines {
                wire.extend_from_slice(line.as_bytes());
                wire.push(b'\n');
            }

            let mut buf = LineBuffer::new();
            let mut framed = Vec::new();
            let mut rest: &[u8] = &wire;
            for split in &splits {
                let take = (*split).min(rest.len());
                let (chunk, tail) = rest.split_at(take);
                buf.extend(chunk);
                framed.extend(buf.lines());
                rest = tail;
            }
            buf.extend(rest);
            framed.extend(buf.lines());

            prop_assert_eq!(framed, lines);
            prop_assert_eq!(buf.pending_bytes(), 0);
        }
    }
}
