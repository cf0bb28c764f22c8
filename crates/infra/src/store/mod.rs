use std::collections::HashMap;
use std::sync::Arc;

use metrics::counter;
use neighbourly_domain::DomainResult;
use neighbourly_domain::communities::Community;
use neighbourly_domain::contacts::{Contact, ContactMetrics};
use neighbourly_domain::endorsements::Endorsement;
use neighbourly_domain::error::DomainError;
use neighbourly_domain::membership::CommunityMember;
use neighbourly_domain::ports::BoxFuture;
use neighbourly_domain::ports::communities::CommunityRepository;
use neighbourly_domain::ports::contacts::ContactRepository;
use neighbourly_domain::ports::endorsements::EndorsementRepository;
use neighbourly_domain::ports::membership::MembershipRepository;
use neighbourly_domain::ports::tx::{Repositories, TxWork, UnitOfWork};
use neighbourly_domain::ports::users::UserRepository;
use neighbourly_domain::users::User;
use tokio::sync::{Mutex, RwLock};

const ENDORSEMENTS_CREATED_TOTAL: &str = "neighbourly_endorsements_created_total";
const ENDORSEMENT_DUPLICATES_TOTAL: &str = "neighbourly_endorsement_duplicates_total";

/// Transactional in-memory backend. All tables live behind one lock so a
/// transaction can snapshot and restore them as a unit; the gate mutex
/// serializes transactions against each other while plain reads stay
/// concurrent.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    inner: Arc<StoreInner>,
}

#[derive(Default)]
struct StoreInner {
    state: RwLock<StoreState>,
    tx_gate: Mutex<()>,
}

#[derive(Clone, Default)]
struct StoreState {
    users: HashMap<String, User>,
    communities: HashMap<String, Community>,
    memberships: HashMap<(String, String), CommunityMember>,
    contacts: HashMap<String, Contact>,
    endorsements: HashMap<String, Endorsement>,
    // (contact_id, user_id, community_id) -> endorsement_id
    endorsement_triples: HashMap<(String, String, String), String>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Repositories for InMemoryStore {
    fn users(&self) -> &dyn UserRepository {
        self
    }

    fn communities(&self) -> &dyn CommunityRepository {
        self
    }

    fn memberships(&self) -> &dyn MembershipRepository {
        self
    }

    fn contacts(&self) -> &dyn ContactRepository {
        self
    }

    fn endorsements(&self) -> &dyn EndorsementRepository {
        self
    }
}

impl UnitOfWork for InMemoryStore {
    fn transaction(&self, work: TxWork) -> BoxFuture<'_, DomainResult<()>> {
        Box::pin(async move {
            let _gate = self.inner.tx_gate.lock().await;
            let snapshot = self.inner.state.read().await.clone();
            let view: Arc<dyn Repositories> = Arc::new(self.clone());
            match work(view).await {
                Ok(()) => Ok(()),
                Err(err) => {
                    *self.inner.state.write().await = snapshot;
                    Err(err)
                }
            }
        })
    }
}

impl UserRepository for InMemoryStore {
    fn insert(&self, user: &User) -> BoxFuture<'_, DomainResult<User>> {
        let user = user.clone();
        let inner = self.inner.clone();
        Box::pin(async move {
            let mut state = inner.state.write().await;
            if state.users.contains_key(&user.user_id) {
                return Err(DomainError::Duplicate(format!("user {}", user.user_id)));
            }
            state.users.insert(user.user_id.clone(), user.clone());
            Ok(user)
        })
    }

    fn get(&self, user_id: &str) -> BoxFuture<'_, DomainResult<Option<User>>> {
        let user_id = user_id.to_string();
        let inner = self.inner.clone();
        Box::pin(async move { Ok(inner.state.read().await.users.get(&user_id).cloned()) })
    }

    fn update(&self, user: &User) -> BoxFuture<'_, DomainResult<User>> {
        let user = user.clone();
        let inner = self.inner.clone();
        Box::pin(async move {
            let mut state = inner.state.write().await;
            if !state.users.contains_key(&user.user_id) {
                return Err(DomainError::NotFound(format!("user {}", user.user_id)));
            }
            state.users.insert(user.user_id.clone(), user.clone());
            Ok(user)
        })
    }
}

impl CommunityRepository for InMemoryStore {
    fn insert(&self, community: &Community) -> BoxFuture<'_, DomainResult<Community>> {
        let community = community.clone();
        let inner = self.inner.clone();
        Box::pin(async move {
            let mut state = inner.state.write().await;
            if state.communities.contains_key(&community.community_id) {
                return Err(DomainError::Duplicate(format!(
                    "community {}",
                    community.community_id
                )));
            }
            state
                .communities
                .insert(community.community_id.clone(), community.clone());
            Ok(community)
        })
    }

    fn get(&self, community_id: &str) -> BoxFuture<'_, DomainResult<Option<Community>>> {
        let community_id = community_id.to_string();
        let inner = self.inner.clone();
        Box::pin(
            async move { Ok(inner.state.read().await.communities.get(&community_id).cloned()) },
        )
    }

    fn update(&self, community: &Community) -> BoxFuture<'_, DomainResult<Community>> {
        let community = community.clone();
        let inner = self.inner.clone();
        Box::pin(async move {
            let mut state = inner.state.write().await;
            if !state.communities.contains_key(&community.community_id) {
                return Err(DomainError::NotFound(format!(
                    "community {}",
                    community.community_id
                )));
            }
            state
                .communities
                .insert(community.community_id.clone(), community.clone());
            Ok(community)
        })
    }
}

impl MembershipRepository for InMemoryStore {
    fn insert(&self, member: &CommunityMember) -> BoxFuture<'_, DomainResult<CommunityMember>> {
        let member = member.clone();
        let inner = self.inner.clone();
        Box::pin(async move {
            let key = (member.community_id.clone(), member.user_id.clone());
            let mut state = inner.state.write().await;
            if state.memberships.contains_key(&key) {
                return Err(DomainError::Duplicate(format!(
                    "membership of user {} in community {}",
                    member.user_id, member.community_id
                )));
            }
            state.memberships.insert(key, member.clone());
            Ok(member)
        })
    }

    fn get(
        &self,
        community_id: &str,
        user_id: &str,
    ) -> BoxFuture<'_, DomainResult<Option<CommunityMember>>> {
        let key = (community_id.to_string(), user_id.to_string());
        let inner = self.inner.clone();
        Box::pin(async move { Ok(inner.state.read().await.memberships.get(&key).cloned()) })
    }

    fn update(&self, member: &CommunityMember) -> BoxFuture<'_, DomainResult<CommunityMember>> {
        let member = member.clone();
        let inner = self.inner.clone();
        Box::pin(async move {
            let key = (member.community_id.clone(), member.user_id.clone());
            let mut state = inner.state.write().await;
            if !state.memberships.contains_key(&key) {
                return Err(DomainError::NotFound(format!(
                    "membership of user {} in community {}",
                    member.user_id, member.community_id
                )));
            }
            state.memberships.insert(key, member.clone());
            Ok(member)
        })
    }

    fn list_by_community(
        &self,
        community_id: &str,
    ) -> BoxFuture<'_, DomainResult<Vec<CommunityMember>>> {
        let community_id = community_id.to_string();
        let inner = self.inner.clone();
        Box::pin(async move {
            let state = inner.state.read().await;
            let mut members: Vec<_> = state
                .memberships
                .values()
                .filter(|member| member.community_id == community_id)
                .cloned()
                .collect();
            members.sort_by(|left, right| {
                left.created_at_ms
                    .cmp(&right.created_at_ms)
                    .then_with(|| left.user_id.cmp(&right.user_id))
            });
            Ok(members)
        })
    }
}

impl ContactRepository for InMemoryStore {
    fn insert(&self, contact: &Contact) -> BoxFuture<'_, DomainResult<Contact>> {
        let contact = contact.clone();
        let inner = self.inner.clone();
        Box::pin(async move {
            let mut state = inner.state.write().await;
            if state.contacts.contains_key(&contact.contact_id) {
                return Err(DomainError::Duplicate(format!(
                    "contact {}",
                    contact.contact_id
                )));
            }
            state
                .contacts
                .insert(contact.contact_id.clone(), contact.clone());
            Ok(contact)
        })
    }

    fn get(&self, contact_id: &str) -> BoxFuture<'_, DomainResult<Option<Contact>>> {
        let contact_id = contact_id.to_string();
        let inner = self.inner.clone();
        Box::pin(async move { Ok(inner.state.read().await.contacts.get(&contact_id).cloned()) })
    }

    fn update(&self, contact: &Contact) -> BoxFuture<'_, DomainResult<Contact>> {
        let contact = contact.clone();
        let inner = self.inner.clone();
        Box::pin(async move {
            let mut state = inner.state.write().await;
            if !state.contacts.contains_key(&contact.contact_id) {
                return Err(DomainError::NotFound(format!(
                    "contact {}",
                    contact.contact_id
                )));
            }
            state
                .contacts
                .insert(contact.contact_id.clone(), contact.clone());
            Ok(contact)
        })
    }

    fn update_metrics(
        &self,
        contact_id: &str,
        metrics: &ContactMetrics,
    ) -> BoxFuture<'_, DomainResult<()>> {
        let contact_id = contact_id.to_string();
        let metrics = metrics.clone();
        let inner = self.inner.clone();
        Box::pin(async move {
            let mut state = inner.state.write().await;
            let contact = state
                .contacts
                .get_mut(&contact_id)
                .ok_or_else(|| DomainError::NotFound(format!("contact {contact_id}")))?;
            contact.endorsements_count = metrics.endorsements_count;
            contact.verified_endorsements_count = metrics.verified_endorsements_count;
            contact.average_rating = metrics.average_rating;
            Ok(())
        })
    }
}

impl EndorsementRepository for InMemoryStore {
    fn insert(&self, endorsement: &Endorsement) -> BoxFuture<'_, DomainResult<Endorsement>> {
        let endorsement = endorsement.clone();
        let inner = self.inner.clone();
        Box::pin(async move {
            let triple = (
                endorsement.contact_id.clone(),
                endorsement.user_id.clone(),
                endorsement.community_id.clone(),
            );
            let mut state = inner.state.write().await;
            if state.endorsements.contains_key(&endorsement.endorsement_id) {
                return Err(DomainError::Duplicate(format!(
                    "endorsement {}",
                    endorsement.endorsement_id
                )));
            }
            if state.endorsement_triples.contains_key(&triple) {
                counter!(ENDORSEMENT_DUPLICATES_TOTAL).increment(1);
                return Err(DomainError::Duplicate(format!(
                    "user {} has already endorsed contact {} in community {}",
                    endorsement.user_id, endorsement.contact_id, endorsement.community_id
                )));
            }
            state
                .endorsement_triples
                .insert(triple, endorsement.endorsement_id.clone());
            state
                .endorsements
                .insert(endorsement.endorsement_id.clone(), endorsement.clone());
            counter!(ENDORSEMENTS_CREATED_TOTAL).increment(1);
            Ok(endorsement)
        })
    }

    fn get(&self, endorsement_id: &str) -> BoxFuture<'_, DomainResult<Option<Endorsement>>> {
        let endorsement_id = endorsement_id.to_string();
        let inner = self.inner.clone();
        Box::pin(async move {
            Ok(inner
                .state
                .read()
                .await
                .endorsements
                .get(&endorsement_id)
                .cloned())
        })
    }

    fn update(&self, endorsement: &Endorsement) -> BoxFuture<'_, DomainResult<Endorsement>> {
        let endorsement = endorsement.clone();
        let inner = self.inner.clone();
        Box::pin(async move {
            let mut state = inner.state.write().await;
            if !state.endorsements.contains_key(&endorsement.endorsement_id) {
                return Err(DomainError::NotFound(format!(
                    "endorsement {}",
                    endorsement.endorsement_id
                )));
            }
            state
                .endorsements
                .insert(endorsement.endorsement_id.clone(), endorsement.clone());
            Ok(endorsement)
        })
    }

    fn find_by_triple(
        &self,
        contact_id: &str,
        user_id: &str,
        community_id: &str,
    ) -> BoxFuture<'_, DomainResult<Option<Endorsement>>> {
        let triple = (
            contact_id.to_string(),
            user_id.to_string(),
            community_id.to_string(),
        );
        let inner = self.inner.clone();
        Box::pin(async move {
            let state = inner.state.read().await;
            let Some(endorsement_id) = state.endorsement_triples.get(&triple) else {
                return Ok(None);
            };
            Ok(state.endorsements.get(endorsement_id).cloned())
        })
    }

    fn list_by_contact(&self, contact_id: &str) -> BoxFuture<'_, DomainResult<Vec<Endorsement>>> {
        let contact_id = contact_id.to_string();
        let inner = self.inner.clone();
        Box::pin(async move {
            let state = inner.state.read().await;
            let mut endorsements: Vec<_> = state
                .endorsements
                .values()
                .filter(|endorsement| {
                    endorsement.contact_id == contact_id && endorsement.deleted_at_ms.is_none()
                })
                .cloned()
                .collect();
            endorsements.sort_by(|left, right| {
                left.created_at_ms
                    .cmp(&right.created_at_ms)
                    .then_with(|| left.endorsement_id.cmp(&right.endorsement_id))
            });
            Ok(endorsements)
        })
    }

    fn count_verified_by_endorser(&self, user_id: &str) -> BoxFuture<'_, DomainResult<u64>> {
        let user_id = user_id.to_string();
        let inner = self.inner.clone();
        Box::pin(async move {
            let state = inner.state.read().await;
            let count = state
                .endorsements
                .values()
                .filter(|endorsement| {
                    endorsement.user_id == user_id
                        && endorsement.is_verified
                        && endorsement.deleted_at_ms.is_none()
                })
                .count() as u64;
            Ok(count)
        })
    }
}
