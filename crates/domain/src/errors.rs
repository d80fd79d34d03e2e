use thiserror::Error;

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Product not found with id: {0}")]
    ProductNotFound(i32),

    #[error("Repository error: {0}")]
    RepositoryError(String),
}
