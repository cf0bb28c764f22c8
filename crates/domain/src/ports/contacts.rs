use crate::DomainResult;
use crate::contacts::{Contact, ContactMetrics};

use super::BoxFuture;

pub trait ContactRepository: Send + Sync {
    fn insert(&self, contact: &Contact) -> BoxFuture<'_, DomainResult<Contact>>;

    fn get(&self, contact_id: &str) -> BoxFuture<'_, DomainResult<Option<Contact>>>;

    fn update(&self, contact: &Contact) -> BoxFuture<'_, DomainResult<Contact>>;

    /// Writes all three derived fields in one update. The aggregator is the
    /// only caller.
    fn update_metrics(
        &self,
        contact_id: &str,
        metrics: &ContactMetrics,
    ) -> BoxFuture<'_, DomainResult<()>>;
}
