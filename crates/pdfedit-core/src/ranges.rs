//! Page range expressions for split
//!
//! An expression is a comma-separated list of tokens, each a 1-based page
//! number (`5`) or an inclusive range (`2-4`). Pages come out in the order
//! written. Range ends past the document are clamped, tokens that still
//! select nothing are dropped, and repeated pages keep their first position.

use crate::error::{PdfEditError, Result};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::debug;

lazy_static! {
    static ref TOKEN: Regex = Regex::new(r"^\s*(\d+)\s*(?:-\s*(\d+)\s*)?$").unwrap();
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "mode", content = "expression", rename_all = "lowercase")]
pub enum PageSelection {
    All,
    Custom(String),
}

/// Resolve a range expression against a document of `page_count` pages.
///
/// Returns 0-based page indices.
pub fn parse_page_ranges(expression: &str, page_count: usize) -> Vec<usize> {
    let mut seen = HashSet::new();
    let mut pages = Vec::new();

    for token in expression.split(',') {
        if token.trim().is_empty() {
            continue;
        }
        let Some(caps) = TOKEN.captures(token) else {
            debug!(token, "Dropping malformed range token");
            continue;
        };
        let Ok(start) = caps[1].parse::<usize>() else {
            continue;
        };
        let end = match caps.get(2) {
            Some(m) => match m.as_str().parse::<usize>() {
                Ok(end) => end,
                Err(_) => continue,
            },
            None => start,
        };

        let start = start.max(1);
        let end = end.min(page_count);
        if start > end {
            debug!(token, page_count, "Dropping out-of-range token");
            continue;
        }

        for page in start..=end {
            if seen.insert(page) {
                pages.push(page - 1);
            }
        }
    }

    pages
}

/// Resolve a selection, failing when nothing is selected
pub fn resolve_selection(selection: &PageSelection, page_count: usize) -> Result<Vec<usize>> {
    let pages = match selection {
        PageSelection::All => (0..page_count).collect(),
        PageSelection::Custom(expression) => parse_page_ranges(expression, page_count),
    };
    if pages.is_empty() {
        let detail = match selection {
            PageSelection::All => "document has no pages".to_string(),
            PageSelection::Custom(expression) => format!(
                "'{}' selects no page of a {}-page document",
                expression, page_count
            ),
        };
        return Err(PdfEditError::SplitRange(detail));
    }
    Ok(pages)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_single_pages_and_ranges() {
        assert_eq!(parse_page_ranges("1-3,5", 6), vec![0, 1, 2, 4]);
        assert_eq!(parse_page_ranges(" 2 - 4 ", 6), vec![1, 2, 3]);
    }

    #[test]
    fn test_order_is_as_written() {
        assert_eq!(parse_page_ranges("5,1-2", 6), vec![4, 0, 1]);
    }

    #[test]
    fn test_duplicates_keep_first_position() {
        assert_eq!(parse_page_ranges("3,1-4", 6), vec![2, 0, 1, 3]);
    }

    #[test]
    fn test_out_of_bounds_clamped_or_dropped() {
        assert_eq!(parse_page_ranges("5-20", 6), vec![4, 5]);
        assert_eq!(parse_page_ranges("9,0,2", 6), vec![1]);
        assert_eq!(parse_page_ranges("0-2", 6), vec![0, 1]);
    }

    #[test]
    fn test_malformed_tokens_dropped() {
        assert_eq!(parse_page_ranges("a,2,,3-x,4-3", 6), vec![1]);
    }

    #[test]
    fn test_empty_selection_is_split_range_error() {
        let err = resolve_selection(&PageSelection::Custom("10-12".into()), 6).unwrap_err();
        assert!(matches!(err, PdfEditError::SplitRange(_)));
        assert!(err.to_string().contains("No pages selected"));
    }

    #[test]
    fn test_all_selection() {
        assert_eq!(
            resolve_selection(&PageSelection::All, 3).unwrap(),
            vec![0, 1, 2]
        );
    }

    #[test]
    fn test_selection_json() {
        let s: PageSelection =
            serde_json::from_str(r#"{"mode":"custom","expression":"1-3"}"#).unwrap();
        assert_eq!(s, PageSelection::Custom("1-3".into()));
        let s: PageSelection = serde_json::from_str(r#"{"mode":"all"}"#).unwrap();
        assert_eq!(s, PageSelection::All);
    }
}
