pub mod aggregator;
pub mod communities;
pub mod contacts;
pub mod endorsements;
pub mod error;
pub mod identity;
pub mod membership;
pub mod notifications;
pub mod ports;
pub mod rating;
pub mod users;
pub mod util;

pub type DomainResult<T> = Result<T, error::DomainError>;
