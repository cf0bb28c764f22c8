use thiserror::Error;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("duplicate resource: {0}")]
    Duplicate(String),
    #[error("business rule violation: {0}")]
    BusinessRule(String),
    #[error("service failure: {0}")]
    Service(String),
}
