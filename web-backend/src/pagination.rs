use serde::Serialize;

pub const DEFAULT_PAGE_SIZE: i64 = 10;
pub const MAX_PAGE_SIZE: i64 = 100;

/// Paginated response envelope shared by every list endpoint.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub data: Vec<T>,
    pub current_page: i64,
    pub total_pages: i64,
    pub total_items: i64,
    pub items_per_page: i64,
}

impl<T> Page<T> {
    pub fn new(data: Vec<T>, page: i64, limit: i64, total_items: i64) -> Self {
        Page {
            data,
            current_page: page,
            total_pages: total_pages(total_items, limit),
            total_items,
            items_per_page: limit,
        }
    }
}

/// Normalize raw query parameters into a usable (page, limit) pair.
pub fn clamp_paging(page: Option<i64>, limit: Option<i64>) -> (i64, i64) {
    let page = page.unwrap_or(1).max(1);
    let limit = limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
    (page, limit)
}

pub fn total_pages(total_items: i64, limit: i64) -> i64 {
    if total_items <= 0 {
        0
    } else {
        (total_items + limit - 1) / limit
    }
}

pub fn offset(page: i64, limit: i64) -> i64 {
    (page - 1) * limit
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamps_out_of_range_parameters() {
        assert_eq!(clamp_paging(None, None), (1, DEFAULT_PAGE_SIZE));
        assert_eq!(clamp_paging(Some(0), Some(0)), (1, 1));
        assert_eq!(clamp_paging(Some(-3), Some(1000)), (1, MAX_PAGE_SIZE));
        assert_eq!(clamp_paging(Some(4), Some(25)), (4, 25));
    }

    #[test]
    fn total_pages_rounds_up() {
        assert_eq!(total_pages(0, 10), 0);
        assert_eq!(total_pages(1, 10), 1);
        assert_eq!(total_pages(10, 10), 1);
        assert_eq!(total_pages(11, 10), 2);
        assert_eq!(total_pages(55, 10), 6);
    }

    #[test]
    fn last_page_covers_all_items() {
        // currentPage * itemsPerPage >= totalItems once currentPage == totalPages
        for total in 0..200i64 {
            for limit in 1..15i64 {
                let pages = total_pages(total, limit);
                assert!(pages * limit >= total, "total={} limit={}", total, limit);
            }
        }
    }

    #[test]
    fn offsets_are_zero_based_pages() {
        assert_eq!(offset(1, 10), 0);
        assert_eq!(offset(3, 10), 20);
    }
}
