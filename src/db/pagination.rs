//! Page-number pagination shared by list queries

use serde::Deserialize;

use crate::error::StorageError;

/// Raw `page` / `page_size` query parameters
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PageParams {
    pub page: Option<i64>,
    pub page_size: Option<i64>,
}

/// Validated page window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page: i64,
    pub page_size: i64,
}

impl Pagination {
    /// Validate against the configured default and maximum page size
    pub fn from_params(
        params: PageParams,
        default_size: i64,
        max_size: i64,
    ) -> Result<Self, StorageError> {
        let page = params.page.unwrap_or(1);
        if page < 1 {
            return Err(StorageError::field("page", "Must be 1 or greater."));
        }
        let page_size = params.page_size.unwrap_or(default_size);
        if page_size < 1 {
            return Err(StorageError::field("page_size", "Must be 1 or greater."));
        }
        let page_size = page_size.min(max_size);
        if (page - 1).checked_mul(page_size).is_none() {
            return Err(StorageError::field("page", "Page number is too large."));
        }
        Ok(Self { page, page_size })
    }

    pub fn limit(&self) -> i64 {
        self.page_size
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1) * self.page_size
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self { page: 1, page_size: 10 }
    }
}

/// One page of results plus the total match count
#[derive(Debug, Clone)]
pub struct Paged<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: Pagination,
}

impl<T> Paged<T> {
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Paged<U> {
        Paged {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            page: self.page,
        }
    }

    pub fn has_next(&self) -> bool {
        self.page.offset() + (self.items.len() as i64) < self.total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_size_is_clamped() {
        let p = Pagination::from_params(
            PageParams { page: Some(3), page_size: Some(500) },
            10,
            100,
        )
        .unwrap();
        assert_eq!(p.page_size, 100);
        assert_eq!(p.offset(), 200);
    }

    #[test]
    fn test_zero_page_rejected() {
        let err = Pagination::from_params(PageParams { page: Some(0), page_size: None }, 10, 100);
        assert!(matches!(err, Err(StorageError::Validation(_))));
    }

    #[test]
    fn test_overflowing_page_rejected() {
        let err = Pagination::from_params(
            PageParams { page: Some(i64::MAX), page_size: Some(10) },
            10,
            100,
        );
        match err {
            Err(StorageError::Validation(errors)) => assert_eq!(errors.messages("page").len(), 1),
            other => panic!("unexpected result: {other:?}"),
        }

        let last = Pagination::from_params(
            PageParams { page: Some(i64::MAX / 100), page_size: Some(100) },
            10,
            100,
        )
        .unwrap();
        assert!(last.offset() > 0);
    }
}
