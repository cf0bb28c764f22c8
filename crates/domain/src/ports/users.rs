use crate::DomainResult;
use crate::users::User;

use super::BoxFuture;

pub trait UserRepository: Send + Sync {
    fn insert(&self, user: &User) -> BoxFuture<'_, DomainResult<User>>;

    fn get(&self, user_id: &str) -> BoxFuture<'_, DomainResult<Option<User>>>;

    fn update(&self, user: &User) -> BoxFuture<'_, DomainResult<User>>;
}
