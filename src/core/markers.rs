//! Recognises the status lines `typst watch` prints on stderr.

use crate::constants::{TEXT_COMPILED_SUCCESSFULLY, TEXT_COMPILED_WITH_ERRORS, TEXT_COMPILING};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WatchStatus {
    Compiling,
    CompiledWithErrors,
    CompiledSuccessfully,
}

impl WatchStatus {
    const ALL: [WatchStatus; 3] = [
        WatchStatus::Compiling,
        WatchStatus::CompiledWithErrors,
        WatchStatus::CompiledSuccessfully,
    ];

    fn marker(&self) -> &'static str {
        match self {
            WatchStatus::Compiling => TEXT_COMPILING,
            WatchStatus::CompiledWithErrors => TEXT_COMPILED_WITH_ERRORS,
            WatchStatus::CompiledSuccessfully => TEXT_COMPILED_SUCCESSFULLY,
        }
    }
}

/// A status marker and the byte range it occupies in the scanned chunk.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MarkerMatch {
    pub status: WatchStatus,
    pub start: usize,
    pub end: usize,
}

/// Finds every marker in `chunk`, ordered by position. Matching is case-sensitive.
pub fn scan(chunk: &str) -> Vec<MarkerMatch> {
    let mut matches: Vec<MarkerMatch> = WatchStatus::ALL
        .into_iter()
        .flat_map(|status| {
            let marker = status.marker();
            chunk.match_indices(marker).map(move |(start, _)| MarkerMatch {
                status,
                start,
                end: start + marker.len(),
            })
        })
        .collect();

    matches.sort_by_key(|m| m.start);
    matches
}

/// The end of `text` that may hold the beginning of a marker cut off by a
/// chunk boundary.
pub fn unfinished_tail(text: &str) -> &str {
    let longest = WatchStatus::ALL
        .iter()
        .map(|status| status.marker().len())
        .max()
        .unwrap_or(0);
    let mut start = text.len().saturating_sub(longest.saturating_sub(1));
    while !text.is_char_boundary(start) {
        start += 1;
    }
    &text[start..]
}
