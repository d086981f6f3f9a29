//! Line splitting for dvgrab output
//!
//! dvgrab redraws its status line with bare carriage returns. Every
//! `\r`-terminated fragment becomes its own line so progress scrolls as
//! history instead of being overwritten.

/// Incremental splitter over raw stream bytes
#[derive(Debug, Default)]
pub struct LineSplitter {
    buf: Vec<u8>,
    /// Last byte seen was `\r`; a following `\n` belongs to it
    pending_cr: bool,
    /// Current line has contained a `\r`
    line_had_cr: bool,
}

impl LineSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume a chunk and return the lines it completed
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();

        for &byte in chunk {
            match byte {
                b'\r' => {
                    let fragment = self.take();
                    if !fragment.trim().is_empty() {
                        lines.push(fragment);
                    }
                    self.pending_cr = true;
                    self.line_had_cr = true;
                }
                b'\n' => {
                    let joined_crlf = self.pending_cr && self.buf.is_empty();
                    let fragment = self.take();
                    if !joined_crlf && (!self.line_had_cr || !fragment.trim().is_empty()) {
                        lines.push(fragment);
                    }
                    self.pending_cr = false;
                    self.line_had_cr = false;
                }
                _ => {
                    self.pending_cr = false;
                    self.buf.push(byte);
                }
            }
        }

        lines
    }

    /// Flush an unterminated trailing fragment at end of stream
    pub fn finish(&mut self) -> Option<String> {
        let fragment = self.take();
        self.pending_cr = false;
        self.line_had_cr = false;
        (!fragment.trim().is_empty()).then_some(fragment)
    }

    fn take(&mut self) -> String {
        let text = String::from_utf8_lossy(&self.buf).trim_end().to_string();
        self.buf.clear();
        text
    }
}
