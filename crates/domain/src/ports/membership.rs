use crate::DomainResult;
use crate::membership::CommunityMember;

use super::BoxFuture;

pub trait MembershipRepository: Send + Sync {
    /// Inserts a membership row. `(community_id, user_id)` is unique at the
    /// store; a violation surfaces as `DomainError::Duplicate`.
    fn insert(&self, member: &CommunityMember) -> BoxFuture<'_, DomainResult<CommunityMember>>;

    fn get(
        &self,
        community_id: &str,
        user_id: &str,
    ) -> BoxFuture<'_, DomainResult<Option<CommunityMember>>>;

    fn update(&self, member: &CommunityMember) -> BoxFuture<'_, DomainResult<CommunityMember>>;

    fn list_by_community(
        &self,
        community_id: &str,
    ) -> BoxFuture<'_, DomainResult<Vec<CommunityMember>>>;
}
