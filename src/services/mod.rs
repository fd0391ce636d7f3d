// Storefront
pub mod catalog;
pub mod cart;
pub mod checkout;
pub mod orders;

// Back office
pub mod inventory;
pub mod invoice;

// Customers
pub mod accounts;

use serde::Serialize;

/// Largest page size accepted from clients
pub const MAX_PER_PAGE: u64 = 100;

/// One page of a listing, as returned by services
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u64,
    pub per_page: u64,
}

impl<T> Page<T> {
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            page: self.page,
            per_page: self.per_page,
        }
    }
}

/// Normalizes 1-based page parameters: missing or zero page becomes 1 and
/// the page size is clamped to `1..=MAX_PER_PAGE`.
pub fn page_params(page: Option<u64>, per_page: Option<u64>, default_per_page: u64) -> (u64, u64) {
    let page = page.filter(|p| *p > 0).unwrap_or(1);
    let per_page = per_page
        .unwrap_or(default_per_page)
        .clamp(1, MAX_PER_PAGE);
    (page, per_page)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_params_apply_defaults_and_bounds() {
        assert_eq!(page_params(None, None, 12), (1, 12));
        assert_eq!(page_params(Some(0), Some(0), 12), (1, 1));
        assert_eq!(page_params(Some(3), Some(500), 12), (3, MAX_PER_PAGE));
    }
}
