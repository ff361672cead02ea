use super::state::Marker;
use crate::config::{BOOT_MARKER, COMPILE_MARKER};

/// Finds lifecycle markers in a chunked byte stream.
///
/// Keeps the last `longest marker - 1` bytes between feeds so a marker split
/// across reads is still found, and reports each occurrence exactly once.
#[derive(Debug)]
pub struct MarkerScanner {
    markers: Vec<(Marker, Vec<u8>)>,
    tail: Vec<u8>,
    keep: usize,
}

impl Default for MarkerScanner {
    fn default() -> Self {
        Self::new()
    }
}

impl MarkerScanner {
    pub fn new() -> Self {
        Self::with_markers(&[
            (Marker::Compiled, COMPILE_MARKER),
            (Marker::ServerBooted, BOOT_MARKER),
        ])
    }

    pub fn with_markers(markers: &[(Marker, &str)]) -> Self {
        let markers: Vec<(Marker, Vec<u8>)> = markers
            .iter()
            .filter(|(_, text)| !text.is_empty())
            .map(|(marker, text)| (*marker, text.as_bytes().to_vec()))
            .collect();
        let keep = markers
            .iter()
            .map(|(_, bytes)| bytes.len())
            .max()
            .unwrap_or(1)
            .saturating_sub(1);
        Self {
            markers,
            tail: Vec::with_capacity(keep),
            keep,
        }
    }

    /// Scan a new chunk; returns markers in the order they appear.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<Marker> {
        let carried = self.tail.len();
        let mut window = std::mem::take(&mut self.tail);
        window.extend_from_slice(chunk);

        let mut found: Vec<(usize, Marker)> = Vec::new();
        for (marker, needle) in &self.markers {
            // Only occurrences that include at least one new byte count.
            let start = (carried + 1).saturating_sub(needle.len());
            let mut offset = start;
            while let Some(pos) = find(&window[offset..], needle) {
                found.push((offset + pos, *marker));
                offset += pos + needle.len();
            }
        }
        found.sort_by_key(|(pos, _)| *pos);

        let cut = window.len().saturating_sub(self.keep);
        self.tail = window.split_off(cut);
        found.into_iter().map(|(_, marker)| marker).collect()
    }

    #[cfg(test)]
    pub(crate) fn residual_len(&self) -> usize {
        self.tail.len()
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
