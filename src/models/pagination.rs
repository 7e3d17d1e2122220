//! Paging over PostgREST collections.
//!
//! PostgREST pages with `limit`/`offset` query parameters and reports the
//! total row count in the `Content-Range` response header (`0-24/57`) when
//! the request carries `Prefer: count=exact`.

use serde::{Deserialize, Serialize};

/// Page query parameters accepted by list endpoints.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Pagination {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

impl Pagination {
    const MAX_PER_PAGE: u32 = 100;
    const DEFAULT_PER_PAGE: u32 = 20;

    pub fn limit(&self) -> u32 {
        self.per_page
            .unwrap_or(Self::DEFAULT_PER_PAGE)
            .clamp(1, Self::MAX_PER_PAGE)
    }

    pub fn current_page(&self) -> u32 {
        self.page.unwrap_or(1).max(1)
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.current_page() - 1) * u64::from(self.limit())
    }
}

/// Extract the total count from a `Content-Range` header value.
///
/// Returns `None` for `*` totals (count not requested) or malformed values.
pub fn total_from_content_range(value: &str) -> Option<u64> {
    value.rsplit_once('/').and_then(|(_, total)| total.trim().parse().ok())
}

#[derive(Debug, Clone, Serialize)]
pub struct PagedResult<T: Serialize> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub per_page: u32,
    pub total_pages: u64,
}

impl<T: Serialize> PagedResult<T> {
    pub fn new(items: Vec<T>, total: u64, pagination: &Pagination) -> Self {
        let per_page = pagination.limit();
        Self {
            items,
            total,
            page: pagination.current_page(),
            per_page,
            total_pages: total.div_ceil(u64::from(per_page)),
        }
    }
}
