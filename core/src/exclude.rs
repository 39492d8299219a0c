//! Regions of a markdown document that typography rules must never rewrite:
//! fenced code blocks, inline code spans and the target half of `[text](url)`
//! links.

use serde::{Deserialize, Serialize};

const CODE_DELIMITER: u8 = b'`';
const FENCE_MIN_RUN: usize = 3;

/// Half-open byte range `[start, end)` over the scanned text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExcludedRange {
    pub start: usize,
    pub end: usize,
}

impl ExcludedRange {
    /// True when `[start, end)` shares at least one position with this range.
    pub fn overlaps(&self, start: usize, end: usize) -> bool {
        start < self.end && end > self.start
    }
}

/// True if `[start, end)` overlaps any of `ranges`.
pub fn overlaps_any(ranges: &[ExcludedRange], start: usize, end: usize) -> bool {
    ranges.iter().any(|range| range.overlaps(start, end))
}

/// Walks `text` once and collects every excluded range.
///
/// Unterminated fences and inline spans run to the end of the text. An
/// unterminated link target (`](` with no later `)`) excludes nothing.
pub fn find_excluded_ranges(text: &str) -> Vec<ExcludedRange> {
    let bytes = text.as_bytes();
    let mut ranges = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            CODE_DELIMITER => {
                let run = run_length(bytes, i, CODE_DELIMITER);
                if run >= FENCE_MIN_RUN {
                    let end = find_closing_fence(bytes, i + run, run).unwrap_or(bytes.len());
                    ranges.push(ExcludedRange { start: i, end });
                    i = end;
                    continue;
                }
                match find_byte(bytes, i + 1, CODE_DELIMITER) {
                    Some(close) => {
                        ranges.push(ExcludedRange {
                            start: i,
                            end: close + 1,
                        });
                        i = close + 1;
                    }
                    None => {
                        ranges.push(ExcludedRange {
                            start: i,
                            end: bytes.len(),
                        });
                        break;
                    }
                }
            }
            b']' if bytes.get(i + 1) == Some(&b'(') => {
                let target = i + 1;
                match find_byte(bytes, target, b')') {
                    Some(close) => {
                        ranges.push(ExcludedRange {
                            start: target,
                            end: close + 1,
                        });
                        i = close + 1;
                    }
                    None => i += 1,
                }
            }
            _ => i += 1,
        }
    }

    ranges
}

fn run_length(bytes: &[u8], start: usize, needle: u8) -> usize {
    bytes[start..].iter().take_while(|&&b| b == needle).count()
}

fn find_byte(bytes: &[u8], start: usize, needle: u8) -> Option<usize> {
    if start >= bytes.len() {
        return None;
    }
    bytes[start..]
        .iter()
        .position(|&b| b == needle)
        .map(|pos| pos + start)
}

/// Returns the end of the first delimiter run at or after `start` that is at
/// least `min_run` long.
fn find_closing_fence(bytes: &[u8], start: usize, min_run: usize) -> Option<usize> {
    let mut cursor = start;
    while let Some(pos) = find_byte(bytes, cursor, CODE_DELIMITER) {
        let run = run_length(bytes, pos, CODE_DELIMITER);
        if run >= min_run {
            return Some(pos + run);
        }
        cursor = pos + run;
    }
    None
}
