//! Paging requests and the `(skip, take)` window they resolve to.
//!
//! # Invariants
//! - Page indexes are zero-based: page 0 is the first page.
//! - A `PageRequest` is validated when built; an invalid one never exists.
//! - `skip` and `take` both fit in `i64`, the widest SQL LIMIT/OFFSET.

use crate::repo::error::{RepoError, RepoResult};

/// Concrete rows to skip and take after filtering and sorting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PagingWindow {
    pub skip: u64,
    pub take: u64,
}

impl PagingWindow {
    /// Slices an already sorted sequence.
    pub fn apply<T>(&self, items: Vec<T>) -> Vec<T> {
        let skip = usize::try_from(self.skip).unwrap_or(usize::MAX);
        let take = usize::try_from(self.take).unwrap_or(usize::MAX);
        items.into_iter().skip(skip).take(take).collect()
    }

    /// Narrows the window to at most `limit` rows from its start.
    pub fn narrowed(self, limit: u64) -> Self {
        Self {
            skip: self.skip,
            take: self.take.min(limit),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PageKind {
    Limit,
    Window { page_index: u64 },
}

/// Either a limit or a zero-based `(page_index, page_size)` window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    kind: PageKind,
    window: PagingWindow,
}

impl PageRequest {
    /// First `limit` rows.
    pub fn limit(limit: i64) -> RepoResult<Self> {
        if limit <= 0 {
            return Err(RepoError::InvalidArgument(format!(
                "limit must be positive, got {limit}"
            )));
        }
        Ok(Self {
            kind: PageKind::Limit,
            window: PagingWindow {
                skip: 0,
                take: limit.unsigned_abs(),
            },
        })
    }

    /// Zero-based page `page_index` of `page_size` rows.
    pub fn page(page_index: i64, page_size: i64) -> RepoResult<Self> {
        if page_index < 0 {
            return Err(RepoError::InvalidArgument(format!(
                "page index must not be negative, got {page_index}"
            )));
        }
        if page_size <= 0 {
            return Err(RepoError::InvalidArgument(format!(
                "page size must be positive, got {page_size}"
            )));
        }
        let skip = page_index.checked_mul(page_size).ok_or_else(|| {
            RepoError::InvalidArgument(format!(
                "page {page_index} of size {page_size} overflows the row offset"
            ))
        })?;

        Ok(Self {
            kind: PageKind::Window {
                page_index: page_index.unsigned_abs(),
            },
            window: PagingWindow {
                skip: skip.unsigned_abs(),
                take: page_size.unsigned_abs(),
            },
        })
    }

    pub fn window(&self) -> PagingWindow {
        self.window
    }

    /// Zero-based page index, `None` for limit requests.
    pub fn page_index(&self) -> Option<u64> {
        match self.kind {
            PageKind::Limit => None,
            PageKind::Window { page_index } => Some(page_index),
        }
    }
}
