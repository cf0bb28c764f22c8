use std::future::Future;
use std::pin::Pin;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub mod communities;
pub mod contacts;
pub mod endorsements;
pub mod membership;
pub mod notifications;
pub mod tx;
pub mod users;
