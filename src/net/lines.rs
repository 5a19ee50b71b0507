//! Newline-delimited frame decoder.
//!
//! Wire format: one UTF-8 JSON document per line.
//!
//! ```text
//! ┌──────────────────────┬────┐
//! │ JSON document (N B)  │ \n │
//! └──────────────────────┴────┘
//! ```
//!
//! Bytes accumulate until a newline arrives, so a single read may hold
//! part of a line or several lines at once.  A line that grows past
//! [`MAX_LINE_LEN`] is discarded up to its terminating newline.

/// Longest accepted line, excluding the newline.
pub const MAX_LINE_LEN: usize = 4096;

#[derive(Debug, Default)]
pub struct LineDecoder {
    buf: Vec<u8>,
    /// Inside an overlong line; drop bytes until the next newline.
    discarding: bool,
    overflows: u32,
}

impl LineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append bytes and return every line they complete.  Blank lines
    /// and a trailing `\r` are stripped.
    pub fn feed(&mut self, data: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        for chunk in data.split_inclusive(|&b| b == b'\n') {
            let (body, complete) = match chunk.split_last() {
                Some((b'\n', body)) => (body, true),
                _ => (chunk, false),
            };

            if self.discarding {
                if complete {
                    self.discarding = false;
                }
                continue;
            }

            if self.buf.len() + body.len() > MAX_LINE_LEN {
                self.buf.clear();
                self.overflows += 1;
                self.discarding = !complete;
                continue;
            }
            self.buf.extend_from_slice(body);

            if complete {
                let line = String::from_utf8_lossy(&self.buf);
                let line = line.trim_end_matches('\r');
                if !line.trim().is_empty() {
                    lines.push(line.to_owned());
                }
                self.buf.clear();
            }
        }
        lines
    }

    /// Lines dropped for exceeding [`MAX_LINE_LEN`].
    pub fn overflows(&self) -> u32 {
        self.overflows
    }

    pub fn reset(&mut self) {
        self.buf.clear();
        self.discarding = false;
    }
}
