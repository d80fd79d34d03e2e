use serde::{Deserialize, Serialize};

use super::Product;

/// Hard ceiling on the number of products the catalog will hold.
pub const MAX_PRODUCTS: usize = 5;

/// The read-only view of the catalog handed to presentation.
///
/// `product_count` and `is_at_max_limit` are projections of `products` and
/// are only ever produced together with it by [`CatalogSnapshot::loaded`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogSnapshot {
    pub products: Vec<Product>,
    pub product_count: usize,
    pub is_at_max_limit: bool,
    pub loading: bool,
    pub refreshing: bool,
}

impl CatalogSnapshot {
    /// Snapshot before the first read: nothing known, a load pending.
    pub fn pending() -> Self {
        Self {
            products: Vec::new(),
            product_count: 0,
            is_at_max_limit: false,
            loading: true,
            refreshing: false,
        }
    }

    /// Snapshot of a completed full read.
    pub fn loaded(products: Vec<Product>) -> Self {
        let product_count = products.len();
        Self {
            products,
            product_count,
            is_at_max_limit: product_count >= MAX_PRODUCTS,
            loading: false,
            refreshing: false,
        }
    }
}

impl Default for CatalogSnapshot {
    fn default() -> Self {
        Self::pending()
    }
}

/// Result of a create request. Hitting the limit is an expected outcome,
/// not a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateOutcome {
    Created { id: i32 },
    LimitReached,
}

impl CreateOutcome {
    pub fn is_created(&self) -> bool {
        matches!(self, CreateOutcome::Created { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn product(id: i32) -> Product {
        let now = Utc::now();
        Product::with_id(id, format!("p{id}"), 1, 1.0, None, now, now)
    }

    #[test]
    fn loaded_derives_count_and_limit() {
        let below = CatalogSnapshot::loaded((1..5).map(product).collect());
        assert_eq!(below.product_count, 4);
        assert!(!below.is_at_max_limit);

        let full = CatalogSnapshot::loaded((1..=5).map(product).collect());
        assert_eq!(full.product_count, MAX_PRODUCTS);
        assert!(full.is_at_max_limit);
        assert!(!full.loading && !full.refreshing);
    }

    #[test]
    fn pending_is_loading_and_empty() {
        let snapshot = CatalogSnapshot::default();
        assert!(snapshot.loading);
        assert_eq!(snapshot.product_count, 0);
    }
}
