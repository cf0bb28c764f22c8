use std::sync::Arc;

use crate::DomainResult;

use super::BoxFuture;
use super::communities::CommunityRepository;
use super::contacts::ContactRepository;
use super::endorsements::EndorsementRepository;
use super::membership::MembershipRepository;
use super::users::UserRepository;

/// Accessor bundle over every repository the core touches. Outside a
/// transaction each call is autocommitted; inside [`UnitOfWork::transaction`]
/// all calls share the transaction's fate.
pub trait Repositories: Send + Sync {
    fn users(&self) -> &dyn UserRepository;
    fn communities(&self) -> &dyn CommunityRepository;
    fn memberships(&self) -> &dyn MembershipRepository;
    fn contacts(&self) -> &dyn ContactRepository;
    fn endorsements(&self) -> &dyn EndorsementRepository;
}

/// Mutation logic handed to a transaction. The closure receives the
/// transactional view of the repositories and owns everything else it needs.
pub type TxWork =
    Box<dyn FnOnce(Arc<dyn Repositories>) -> BoxFuture<'static, DomainResult<()>> + Send>;

/// Scoped-execution primitive: everything inside `work` commits or rolls back
/// atomically. A unique-constraint violation inside the scope surfaces as
/// `DomainError::Duplicate` and rolls the scope back.
pub trait UnitOfWork: Repositories {
    fn transaction(&self, work: TxWork) -> BoxFuture<'_, DomainResult<()>>;
}
