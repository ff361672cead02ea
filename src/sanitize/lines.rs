use crate::utf8_safe::decode_complete;

/// A piece of engine output ready for sanitizing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub text: String,
    /// Ended with a line terminator (`\n`, `\r\n`, or `\r`).
    pub terminated: bool,
    /// Continues a line that was already partially flushed.
    pub continuation: bool,
}

/// Reassembles arbitrarily chunked output into lines.
///
/// Splits happen only at ASCII line terminators, so complete lines never cut
/// a multi-byte character. `\r\n` split across two chunks still counts as a
/// single terminator.
#[derive(Debug, Default)]
pub struct LineAssembler {
    pending: Vec<u8>,
    skip_lf: bool,
    mid_line: bool,
}

impl LineAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk, returning every line it completed.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<Segment> {
        let mut lines = Vec::new();
        for &byte in bytes {
            if self.skip_lf {
                self.skip_lf = false;
                if byte == b'\n' {
                    continue;
                }
            }
            match byte {
                b'\n' => lines.push(self.take_line()),
                b'\r' => {
                    lines.push(self.take_line());
                    self.skip_lf = true;
                }
                _ => self.pending.push(byte),
            }
        }
        lines
    }

    /// The complete characters buffered so far, without consuming them.
    pub fn pending_text(&self) -> Option<String> {
        let (text, used) = decode_complete(&self.pending);
        (used > 0).then_some(text)
    }

    /// A partial of the current line has already been flushed.
    pub fn is_mid_line(&self) -> bool {
        self.mid_line
    }

    /// Emit the buffered partial line, holding back an incomplete trailing character.
    pub fn flush_partial(&mut self) -> Option<Segment> {
        if self.pending.is_empty() {
            return None;
        }
        let (text, used) = decode_complete(&self.pending);
        if used == 0 {
            return None;
        }
        self.pending.drain(..used);
        let segment = Segment {
            text,
            terminated: false,
            continuation: self.mid_line,
        };
        self.mid_line = true;
        Some(segment)
    }

    /// Emit everything left, decoding lossily. Used when the stream closes.
    pub fn finish(&mut self) -> Option<Segment> {
        if self.pending.is_empty() {
            return None;
        }
        let text = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        let continuation = self.mid_line;
        self.mid_line = false;
        Some(Segment {
            text,
            terminated: false,
            continuation,
        })
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    fn take_line(&mut self) -> Segment {
        let text = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        let continuation = self.mid_line;
        self.mid_line = false;
        Segment {
            text,
            terminated: true,
            continuation,
        }
    }
}
