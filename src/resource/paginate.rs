//! Fixed-size pagination over a filtered collection. Pages are 1-based.
use serde_json::Value;

pub fn total_pages(count: usize, page_size: usize) -> usize {
    if page_size == 0 {
        return 0;
    }
    count.div_ceil(page_size)
}

/// Clamp a requested page into `[1, max(total_pages, 1)]`.
pub fn clamp_page(page: usize, total_pages: usize) -> usize {
    page.clamp(1, total_pages.max(1))
}

/// The slice for `page`. Pages outside the collection are empty; callers
/// clamp before asking.
pub fn page_slice<T>(items: &[T], page: usize, page_size: usize) -> &[T] {
    if page == 0 || page_size == 0 {
        return &[];
    }
    let start = (page - 1).saturating_mul(page_size);
    if start >= items.len() {
        return &[];
    }
    let end = start.saturating_add(page_size).min(items.len());
    &items[start..end]
}

/// One rendered page of a list screen.
#[derive(Debug, Clone, PartialEq)]
pub struct PageView {
    pub rows: Vec<Value>,
    pub page: usize,
    pub page_size: usize,
    pub total_pages: usize,
    pub total_items: usize,
}

impl PageView {
    pub fn build(filtered: &[Value], page: usize, page_size: usize) -> Self {
        let total_pages = total_pages(filtered.len(), page_size);
        let page = clamp_page(page, total_pages);
        Self {
            rows: page_slice(filtered, page, page_size).to_vec(),
            page,
            page_size,
            total_pages,
            total_items: filtered.len(),
        }
    }

    pub fn has_prev(&self) -> bool {
        self.page > 1
    }

    pub fn has_next(&self) -> bool {
        self.page < self.total_pages
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn twenty_three_records_page_size_ten() {
        let items: Vec<u32> = (1..=23).collect();
        assert_eq!(total_pages(items.len(), 10), 3);
        assert_eq!(page_slice(&items, 1, 10), &(1..=10).collect::<Vec<_>>()[..]);
        assert_eq!(page_slice(&items, 3, 10), &[21, 22, 23]);
        assert!(page_slice(&items, 4, 10).is_empty());
    }

    #[test]
    fn pages_concatenate_to_the_collection() {
        for n in 0..40usize {
            for size in 1..12usize {
                let items: Vec<usize> = (0..n).collect();
                let pages = total_pages(n, size);
                let rebuilt: Vec<usize> = (1..=pages)
                    .flat_map(|p| page_slice(&items, p, size).to_vec())
                    .collect();
                assert_eq!(rebuilt, items, "n={n} size={size}");
            }
        }
    }

    #[test]
    fn clamp_keeps_page_in_range() {
        assert_eq!(clamp_page(0, 3), 1);
        assert_eq!(clamp_page(9, 3), 3);
        assert_eq!(clamp_page(2, 0), 1);
    }

    #[test]
    fn empty_collection_has_zero_pages_and_no_navigation() {
        let view = PageView::build(&[], 1, 10);
        assert_eq!(view.total_pages, 0);
        assert_eq!(view.page, 1);
        assert!(view.is_empty());
        assert!(!view.has_prev());
        assert!(!view.has_next());
    }

    #[test]
    fn page_view_clamps_requested_page() {
        let items: Vec<Value> = (1..=23).map(|i| json!({"id": i})).collect();
        let view = PageView::build(&items, 7, 10);
        assert_eq!(view.page, 3);
        assert_eq!(view.rows.len(), 3);
        assert!(view.has_prev());
        assert!(!view.has_next());
    }
}
