//! Offset pagination shared by every list endpoint.

use serde::{Deserialize, Serialize};

/// Default page size.
pub const DEFAULT_LIMIT: u32 = 10;

/// Largest page size a caller may request.
pub const MAX_LIMIT: u32 = 100;

/// Normalized page request: `page >= 1`, `1 <= limit <= MAX_LIMIT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    /// 1-based page number.
    pub page: u32,
    /// Page size.
    pub limit: u32,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 1,
            limit: DEFAULT_LIMIT,
        }
    }
}

impl PageRequest {
    /// Apply defaults and clamp out-of-range values.
    pub fn new(page: Option<u32>, limit: Option<u32>) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            limit: limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT),
        }
    }

    /// Rows to skip.
    pub fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.limit)
    }

    /// Build the response metadata for `total` matching rows.
    pub fn paginate(&self, total: u64) -> Pagination {
        Pagination {
            page: self.page,
            limit: self.limit,
            total,
            pages: total.div_ceil(u64::from(self.limit)),
        }
    }

    /// Slice an in-memory result set already in display order.
    pub fn slice<T: Clone>(&self, rows: &[T]) -> Vec<T> {
        rows.iter()
            .skip(usize::try_from(self.offset()).unwrap_or(usize::MAX))
            .take(self.limit as usize)
            .cloned()
            .collect()
    }
}

/// Pagination metadata returned with list responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    /// Current page.
    pub page: u32,
    /// Page size.
    pub limit: u32,
    /// Total matching rows.
    pub total: u64,
    /// `ceil(total / limit)`.
    pub pages: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn defaults() {
        let p = PageRequest::new(None, None);
        assert_eq!(p, PageRequest { page: 1, limit: 10 });
        assert_eq!(p.offset(), 0);
    }

    #[test]
    fn clamps_out_of_range() {
        let p = PageRequest::new(Some(0), Some(500));
        assert_eq!(p.page, 1);
        assert_eq!(p.limit, MAX_LIMIT);
        assert_eq!(PageRequest::new(None, Some(0)).limit, 1);
    }

    #[test]
    fn pages_round_up() {
        let p = PageRequest::new(Some(2), Some(10));
        let meta = p.paginate(21);
        assert_eq!(meta.pages, 3);
        assert_eq!(meta.total, 21);
        assert_eq!(p.paginate(0).pages, 0);
        assert_eq!(p.paginate(20).pages, 2);
    }

    #[test]
    fn slice_returns_requested_page() {
        let rows: Vec<u32> = (1..=25).collect();
        let page = PageRequest::new(Some(3), Some(10)).slice(&rows);
        assert_eq!(page, vec![21, 22, 23, 24, 25]);
        assert!(PageRequest::new(Some(4), Some(10)).slice(&rows).is_empty());
    }

    proptest! {
        #[test]
        fn pages_cover_all_rows(total in 0u64..10_000, limit in 1u32..=100) {
            let meta = PageRequest::new(Some(1), Some(limit)).paginate(total);
            prop_assert!(meta.pages * u64::from(limit) >= total);
            prop_assert!(meta.pages == 0 || (meta.pages - 1) * u64::from(limit) < total);
        }
    }
}
