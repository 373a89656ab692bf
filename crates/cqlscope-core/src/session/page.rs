//! A fetched page of rows.

use cqlscope_abstraction::{PagingState, ResultPage, Row};
use std::time::Duration;

/// One page of query results plus fetch timing and the continuation token.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    /// Column names in result-set order.
    pub columns: Vec<String>,
    /// Rows in fetch order.
    pub rows: Vec<Row>,
    /// Wall-clock time spent in the fetch.
    pub elapsed: Duration,
    /// Token for the next page; `None` when there are no more pages.
    pub paging_state: Option<PagingState>,
}

impl Page {
    /// The terminal page: no rows, zero elapsed time, no token.
    pub fn empty() -> Self {
        Self::default()
    }

    pub(crate) fn from_result(result: ResultPage, elapsed: Duration) -> Self {
        Self {
            columns: result.columns,
            rows: result.rows,
            elapsed,
            paging_state: result.paging_state,
        }
    }

    /// Elapsed time in seconds.
    pub fn elapsed_secs(&self) -> f64 {
        self.elapsed.as_secs_f64()
    }

    /// True when another page can be fetched.
    pub fn has_more(&self) -> bool {
        self.paging_state.is_some()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_page() {
        let page = Page::empty();
        assert!(page.is_empty());
        assert_eq!(page.elapsed_secs(), 0.0);
        assert!(!page.has_more());
    }

    #[test]
    fn test_from_result_keeps_token() {
        let result = ResultPage {
            columns: vec!["k".to_string()],
            rows: vec![Row::new().with("k", "v")],
            paging_state: Some(PagingState::new(vec![9u8])),
        };
        let page = Page::from_result(result, Duration::from_millis(1500));
        assert_eq!(page.len(), 1);
        assert!(page.has_more());
        assert_eq!(page.paging_state.as_ref().map(PagingState::as_bytes), Some(&[9u8][..]));
        assert!((page.elapsed_secs() - 1.5).abs() < f64::EPSILON);
    }
}
