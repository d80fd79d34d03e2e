use crate::entities::{NewProduct, Product, ProductPatch};
use crate::errors::DomainError;
use async_trait::async_trait;

/// Durable store for the catalog - the only component allowed to touch the
/// storage medium. It knows nothing about the catalog size limit.
#[async_trait]
pub trait ProductRepository: Send + Sync {
    /// Create the backing structure if missing. Safe to call repeatedly.
    async fn initialize(&self) -> Result<(), DomainError>;

    /// Every product, most recently updated first.
    async fn find_all(&self) -> Result<Vec<Product>, DomainError>;

    /// Case-insensitive substring match on the name, same order as
    /// `find_all`. A blank fragment matches everything.
    async fn find_by_name_contains(&self, fragment: &str) -> Result<Vec<Product>, DomainError>;

    async fn find_by_id(&self, id: i32) -> Result<Option<Product>, DomainError>;

    /// Stores the product, assigning id and timestamps. Returns the new id.
    async fn insert(&self, product: &NewProduct) -> Result<i32, DomainError>;

    /// Applies the supplied fields and bumps `updated_at`. Returns `false`
    /// (and changes nothing) when no product has this id.
    async fn update(&self, id: i32, patch: &ProductPatch) -> Result<bool, DomainError>;

    /// Returns `false` when no product has this id.
    async fn delete(&self, id: i32) -> Result<bool, DomainError>;

    async fn count(&self) -> Result<usize, DomainError>;
}
