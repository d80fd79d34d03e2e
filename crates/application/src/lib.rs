use domain::*;
use infrastructure::*;
use std::sync::Arc;
use tracing::info;

/// Inventory Application - wires the SQLite store to the catalog service.
///
/// Built explicitly and handed to presentation; there is no process-wide
/// instance.
pub struct InventoryApp {
    pub catalog_service: Arc<CatalogService>,
}

impl InventoryApp {
    pub fn new(database_path: &str) -> Result<Self, DomainError> {
        // Infrastructure layer - database setup
        let database = Database::new(database_path)?;
        let pool = database.get_pool().clone();

        let product_repository: Arc<dyn ProductRepository> =
            Arc::new(SqliteProductRepository::new(pool));

        info!(database_path, "Inventory store opened");
        Ok(Self::with_repository(product_repository))
    }

    /// Build around an already constructed store.
    pub fn with_repository(product_repository: Arc<dyn ProductRepository>) -> Self {
        Self {
            catalog_service: Arc::new(CatalogService::new(product_repository)),
        }
    }

    /// Open the store and load the catalog, ready for presentation.
    pub async fn start(database_path: &str) -> Result<Self, DomainError> {
        let app = Self::new(database_path)?;
        app.catalog_service.initialize().await?;
        Ok(app)
    }
}
