use crate::DomainResult;
use crate::endorsements::Endorsement;

use super::BoxFuture;

pub trait EndorsementRepository: Send + Sync {
    /// Inserts a new endorsement. The store enforces uniqueness of the
    /// `(contact_id, user_id, community_id)` triple and must answer a
    /// violation with `DomainError::Duplicate`; that signal, not the
    /// pre-check, is what closes the check-then-act race.
    fn insert(&self, endorsement: &Endorsement) -> BoxFuture<'_, DomainResult<Endorsement>>;

    fn get(&self, endorsement_id: &str) -> BoxFuture<'_, DomainResult<Option<Endorsement>>>;

    fn update(&self, endorsement: &Endorsement) -> BoxFuture<'_, DomainResult<Endorsement>>;

    fn find_by_triple(
        &self,
        contact_id: &str,
        user_id: &str,
        community_id: &str,
    ) -> BoxFuture<'_, DomainResult<Option<Endorsement>>>;

    /// All non-deleted endorsements for a contact.
    fn list_by_contact(&self, contact_id: &str) -> BoxFuture<'_, DomainResult<Vec<Endorsement>>>;

    /// Verified, non-deleted endorsements authored by a user; feeds the
    /// endorser-standing weight.
    fn count_verified_by_endorser(&self, user_id: &str) -> BoxFuture<'_, DomainResult<u64>>;
}
