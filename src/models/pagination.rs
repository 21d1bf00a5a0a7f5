// src/models/pagination.rs

use serde::{Deserialize, Serialize};

pub const DEFAULT_PAGE_SIZE: u32 = 10;
pub const MAX_PAGE_SIZE: u32 = 1000;

/// Query parameters for page-number pagination.
#[derive(Debug, Default, Deserialize)]
pub struct PageParams {
    /// 1-based page number (default: 1).
    pub page: Option<u32>,

    /// Items per page (default: 10, max: 1000).
    pub page_size: Option<u32>,
}

impl PageParams {
    pub fn page(&self) -> Page {
        Page {
            number: self.page.unwrap_or(1).max(1),
            size: self
                .page_size
                .unwrap_or(DEFAULT_PAGE_SIZE)
                .clamp(1, MAX_PAGE_SIZE),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub number: u32,
    pub size: u32,
}

impl Page {
    pub fn offset(&self) -> i64 {
        i64::from(self.number - 1) * i64::from(self.size)
    }

    pub fn limit(&self) -> i64 {
        i64::from(self.size)
    }
}

/// One page of results plus the neighbouring page numbers, if any.
#[derive(Debug, Serialize)]
pub struct Paginated<T> {
    pub count: i64,
    pub next: Option<u32>,
    pub previous: Option<u32>,
    pub results: Vec<T>,
}

impl<T> Paginated<T> {
    pub fn new(page: Page, count: i64, results: Vec<T>) -> Self {
        let next = (page.offset() + page.limit() < count).then_some(page.number + 1);
        let previous = (page.number > 1).then(|| page.number - 1);
        Self {
            count,
            next,
            previous,
            results,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_params_are_clamped() {
        let page = PageParams {
            page: Some(0),
            page_size: Some(5000),
        }
        .page();
        assert_eq!(page, Page { number: 1, size: MAX_PAGE_SIZE });

        let page = PageParams::default().page();
        assert_eq!(page.size, DEFAULT_PAGE_SIZE);
        assert_eq!(page.offset(), 0);
    }

    #[test]
    fn neighbours() {
        let page = Page { number: 2, size: 10 };
        let paged = Paginated::new(page, 25, vec![(); 10]);
        assert_eq!(paged.next, Some(3));
        assert_eq!(paged.previous, Some(1));

        let last = Paginated::new(Page { number: 3, size: 10 }, 25, vec![(); 5]);
        assert_eq!(last.next, None);
    }
}
