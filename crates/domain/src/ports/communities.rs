use crate::DomainResult;
use crate::communities::Community;

use super::BoxFuture;

pub trait CommunityRepository: Send + Sync {
    fn insert(&self, community: &Community) -> BoxFuture<'_, DomainResult<Community>>;

    fn get(&self, community_id: &str) -> BoxFuture<'_, DomainResult<Option<Community>>>;

    fn update(&self, community: &Community) -> BoxFuture<'_, DomainResult<Community>>;
}
