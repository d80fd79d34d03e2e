pub mod sqlite_product_repository;

pub use sqlite_product_repository::SqliteProductRepository;
