//! Output sanitizer: removes lines that only exist because of the bridge
//! itself (prompts, echoed load/bootstrap/interrupt directives) and
//! normalizes every line ending to `\n`.
//!
//! The pattern set is fixed at startup. Anything that does not match passes
//! through untouched and in order.

mod lines;

pub use lines::{LineAssembler, Segment};

use crate::config::{ARTIFACT_PREFIX, ARTIFACT_SUFFIX, INTERRUPT_DIRECTIVE, PROMPT};
use regex::Regex;
use std::sync::Arc;

/// What the engine prints after running the interrupt directive.
const INTERRUPT_RESULT: &str = "-> CmdPeriod";
const LOAD_CALL: &str = ".load;";

/// `body` follows an opening quote. True while it can still end up as an
/// artifact load echo: the literal is open, or it closed on an artifact
/// file name and is followed by a prefix of `.load;`.
fn partial_load_echo(body: &str) -> bool {
    let mut escaped = false;
    for (idx, ch) in body.char_indices() {
        match ch {
            _ if escaped => escaped = false,
            '\\' => escaped = true,
            '"' => {
                let literal = &body[..idx];
                let tail = &body[idx + 1..];
                let name = literal.rsplit('/').next().unwrap_or(literal);
                return name.starts_with(ARTIFACT_PREFIX)
                    && name.ends_with(ARTIFACT_SUFFIX)
                    && LOAD_CALL.starts_with(tail);
            }
            _ => {}
        }
    }
    true
}

#[derive(Debug, Clone)]
pub struct OutputSanitizer {
    bootstrap_echo: String,
    internal_echo: Regex,
}

impl OutputSanitizer {
    /// `bootstrap_directive` is the exact line written once per boot.
    pub fn new(bootstrap_directive: &str) -> Self {
        let pattern = format!(
            r#"^(?:"(?:[^"\\]|\\.)*{prefix}[^"\\/]*{suffix}"\.load;?|{interrupt};?|{result})$"#,
            prefix = regex::escape(ARTIFACT_PREFIX),
            suffix = regex::escape(ARTIFACT_SUFFIX),
            interrupt = regex::escape(INTERRUPT_DIRECTIVE.trim_end_matches(';')),
            result = regex::escape(INTERRUPT_RESULT),
        );
        let internal_echo =
            Regex::new(&pattern).expect("internal echo pattern is built from escaped constants");
        Self {
            bootstrap_echo: bootstrap_directive.trim().trim_end_matches(';').to_string(),
            internal_echo,
        }
    }

    /// Sanitize a single line (without its terminator). `None` drops it.
    pub fn sanitize_line(&self, line: &str) -> Option<String> {
        let mut rest = line;
        let mut prompted = false;
        while let Some(stripped) = rest.strip_prefix(PROMPT) {
            rest = stripped;
            prompted = true;
        }
        if rest == PROMPT.trim_end() {
            return None;
        }

        let trimmed = rest.trim();
        if prompted && trimmed.is_empty() {
            return None;
        }
        if trimmed.trim_end_matches(';') == self.bootstrap_echo {
            return None;
        }
        if self.internal_echo.is_match(trimmed) {
            return None;
        }
        Some(rest.to_string())
    }

    /// Whether an unterminated line could still turn into something
    /// [`sanitize_line`](Self::sanitize_line) drops once the rest arrives.
    pub fn may_become_internal(&self, partial: &str) -> bool {
        let mut rest = partial;
        let mut prompted = false;
        while let Some(stripped) = rest.strip_prefix(PROMPT) {
            rest = stripped;
            prompted = true;
        }
        if !rest.is_empty() && PROMPT.starts_with(rest) {
            return true;
        }
        let candidate = rest.trim_start();
        if candidate.is_empty() {
            return prompted;
        }
        if INTERRUPT_DIRECTIVE.starts_with(candidate) || INTERRUPT_RESULT.starts_with(candidate) {
            return true;
        }
        if format!("{};", self.bootstrap_echo).starts_with(candidate) {
            return true;
        }
        candidate
            .strip_prefix('"')
            .map_or(false, partial_load_echo)
    }

    /// Sanitize a block of text, normalizing line endings.
    pub fn sanitize(&self, text: &str) -> String {
        let normalized = normalize_line_endings(text);
        let mut out = String::with_capacity(normalized.len());
        for piece in normalized.split_inclusive('\n') {
            let (line, terminated) = match piece.strip_suffix('\n') {
                Some(line) => (line, true),
                None => (piece, false),
            };
            if let Some(kept) = self.sanitize_line(line) {
                out.push_str(&kept);
                if terminated {
                    out.push('\n');
                }
            }
        }
        out
    }
}

/// Sanitizes one output stream chunk by chunk.
///
/// Wraps a [`LineAssembler`] so partial lines can be flushed on idle. Patterns
/// only apply from the start of a line, so a continuation of an emitted
/// partial passes through verbatim; if the partial itself was dropped (a bare
/// prompt, typically) the continuation is filtered as a fresh line.
#[derive(Debug)]
pub struct StreamFilter {
    sanitizer: Arc<OutputSanitizer>,
    assembler: LineAssembler,
    suppressed_partial: bool,
}

impl StreamFilter {
    pub fn new(sanitizer: Arc<OutputSanitizer>) -> Self {
        Self {
            sanitizer,
            assembler: LineAssembler::new(),
            suppressed_partial: false,
        }
    }

    /// Feed a raw chunk; returns sanitized text for every completed line.
    pub fn push(&mut self, bytes: &[u8]) -> String {
        let segments = self.assembler.push(bytes);
        self.render(segments)
    }

    /// Emit the pending partial line, if any. A line that may still grow
    /// into an internal echo stays buffered until it ends or diverges.
    pub fn flush_partial(&mut self) -> String {
        let line_start = !self.assembler.is_mid_line() || self.suppressed_partial;
        if line_start {
            if let Some(partial) = self.assembler.pending_text() {
                if self.sanitizer.may_become_internal(&partial) {
                    return String::new();
                }
            }
        }
        let segment = self.assembler.flush_partial();
        self.render(segment)
    }

    /// Emit everything left once the stream closed.
    pub fn finish(&mut self) -> String {
        let segment = self.assembler.finish();
        self.render(segment)
    }

    pub fn has_pending(&self) -> bool {
        self.assembler.has_pending()
    }

    fn render(&mut self, segments: impl IntoIterator<Item = Segment>) -> String {
        let mut out = String::new();
        for segment in segments {
            let line_start = !segment.continuation || self.suppressed_partial;
            let kept = if line_start {
                self.sanitizer.sanitize_line(&segment.text)
            } else {
                Some(segment.text)
            };
            self.suppressed_partial = !segment.terminated && line_start && kept.is_none();
            if let Some(text) = kept {
                out.push_str(&text);
                if segment.terminated {
                    out.push('\n');
                }
            }
        }
        out
    }
}

/// Turn `\r\n` and lone `\r` into `\n`.
pub fn normalize_line_endings(text: &str) -> String {
    if !text.contains('\r') {
        return text.to_string();
    }
    text.replace("\r\n", "\n").replace('\r', "\n")
}
