use serde::Serialize;

pub const DEFAULT_ITEMS_PER_PAGE: u32 = 10;
pub const MAX_ITEMS_PER_PAGE: u32 = 100;
/// Page sizes offered by the listing pages' selector.
pub const ITEMS_PER_PAGE_OPTIONS: [u32; 3] = [10, 20, 50];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub limit: u32,
}

impl PageRequest {
    /// Builds a request from raw query values. Pages are 1-based; anything
    /// below 1 becomes 1 and the limit is kept within 1..=MAX_ITEMS_PER_PAGE.
    pub fn new(page: Option<u32>, limit: Option<u32>) -> Self {
        PageRequest {
            page: page.unwrap_or(1).max(1),
            limit: limit
                .unwrap_or(DEFAULT_ITEMS_PER_PAGE)
                .clamp(1, MAX_ITEMS_PER_PAGE),
        }
    }

    /// Builds a request from untyped query strings. Anything that is not a
    /// whole number falls back to the default, and negatives clamp like zero.
    pub fn from_query(page: Option<&str>, limit: Option<&str>) -> Self {
        PageRequest::new(parse_query_number(page), parse_query_number(limit))
    }

    pub fn offset(&self) -> usize {
        (self.page as usize - 1) * self.limit as usize
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        PageRequest::new(None, None)
    }
}

/// `"-3"` -> `Some(0)`, `"abc"` -> `None`, huge values saturate.
pub fn parse_query_number(raw: Option<&str>) -> Option<u32> {
    raw.and_then(|v| v.trim().parse::<i64>().ok())
        .map(|n| n.clamp(0, u32::MAX as i64) as u32)
}

#[derive(Debug, Serialize, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total_count: usize,
    pub has_more: bool,
    pub current_page: u32,
    pub total_pages: u32,
}

/// Slices one page out of an already ordered list. A page past the end is
/// empty rather than an error.
pub fn paginate<T>(items: Vec<T>, request: PageRequest) -> Page<T> {
    let total_count = items.len();
    let total_pages = total_count.div_ceil(request.limit as usize) as u32;

    let items = items
        .into_iter()
        .skip(request.offset())
        .take(request.limit as usize)
        .collect();

    Page {
        items,
        total_count,
        has_more: request.page < total_pages,
        current_page: request.page,
        total_pages,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_defaults_and_clamps() {
        assert_eq!(PageRequest::new(None, None), PageRequest { page: 1, limit: 10 });
        assert_eq!(PageRequest::new(Some(0), Some(0)), PageRequest { page: 1, limit: 1 });
        assert_eq!(PageRequest::new(Some(3), Some(5000)).limit, MAX_ITEMS_PER_PAGE);
    }

    #[test]
    fn query_strings_are_parsed_leniently() {
        assert_eq!(PageRequest::from_query(Some("-1"), Some("-5")), PageRequest { page: 1, limit: 1 });
        assert_eq!(PageRequest::from_query(Some("abc"), Some("")), PageRequest { page: 1, limit: 10 });
        assert_eq!(PageRequest::from_query(Some(" 4 "), Some("20")), PageRequest { page: 4, limit: 20 });
        assert_eq!(PageRequest::from_query(Some("99999999999"), None).page, u32::MAX);
    }

    #[test]
    fn middle_page_has_more() {
        let page = paginate((1..=25).collect::<Vec<_>>(), PageRequest::new(Some(2), Some(10)));
        assert_eq!(page.items, (11..=20).collect::<Vec<_>>());
        assert_eq!(page.total_count, 25);
        assert_eq!(page.total_pages, 3);
        assert!(page.has_more);
    }

    #[test]
    fn last_page_is_partial() {
        let page = paginate((1..=25).collect::<Vec<_>>(), PageRequest::new(Some(3), Some(10)));
        assert_eq!(page.items, vec![21, 22, 23, 24, 25]);
        assert!(!page.has_more);
    }

    #[test]
    fn page_past_the_end_is_empty() {
        let page = paginate(vec![1, 2, 3], PageRequest::new(Some(7), Some(10)));
        assert!(page.items.is_empty());
        assert_eq!(page.total_pages, 1);
        assert!(!page.has_more);
    }

    #[test]
    fn empty_list_has_no_pages() {
        let page = paginate(Vec::<u8>::new(), PageRequest::default());
        assert_eq!(page.total_pages, 0);
        assert_eq!(page.current_page, 1);
        assert!(!page.has_more);
    }
}
