use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::DomainResult;
use crate::aggregator::ContactMetricsAggregator;
use crate::contacts::Contact;
use crate::error::DomainError;
use crate::identity::ActorIdentity;
use crate::membership::MembershipStatus;
use crate::notifications::{NotificationEvent, NotificationKind};
use crate::ports::notifications::NotificationPort;
use crate::ports::tx::UnitOfWork;
use crate::rating::RatingWeights;
use crate::util::now_ms;

pub const MIN_RATING: u8 = 1;
pub const MAX_RATING: u8 = 5;
pub const MIN_COMMENT_LENGTH: usize = 10;
pub const MAX_COMMENT_LENGTH: usize = 500;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Endorsement {
    pub endorsement_id: String,
    pub contact_id: String,
    pub user_id: String,
    pub community_id: String,
    pub rating: u8,
    pub comment: Option<String>,
    /// Monotone: once set, this layer never clears it.
    pub is_verified: bool,
    pub verified_by: Option<String>,
    pub verified_at_ms: Option<i64>,
    /// Soft lifecycle; a retracted endorsement stays on record but feeds no
    /// aggregate.
    pub deleted_at_ms: Option<i64>,
    pub created_at_ms: i64,
    pub updated_at_ms: i64,
}

#[derive(Clone, Debug)]
pub struct EndorsementCreate {
    pub contact_id: String,
    pub community_id: String,
    pub rating: u8,
    pub comment: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct EndorsementUpdate {
    pub rating: Option<u8>,
    pub comment: Option<String>,
}

#[derive(Clone)]
pub struct EndorsementService {
    uow: Arc<dyn UnitOfWork>,
    notifier: Arc<dyn NotificationPort>,
    aggregator: ContactMetricsAggregator,
}

impl EndorsementService {
    pub fn new(
        uow: Arc<dyn UnitOfWork>,
        notifier: Arc<dyn NotificationPort>,
        weights: RatingWeights,
    ) -> Self {
        Self {
            uow,
            notifier,
            aggregator: ContactMetricsAggregator::new(weights),
        }
    }

    /// Creates an endorsement on behalf of `actor`, who must be an active
    /// member of the target community. The insert and the metric recompute
    /// share one transaction; the duplicate pre-check is advisory and the
    /// store's uniqueness constraint on `(contact_id, user_id, community_id)`
    /// is the authoritative signal under concurrent requests.
    pub async fn create(
        &self,
        actor: ActorIdentity,
        input: EndorsementCreate,
    ) -> DomainResult<Endorsement> {
        let input = validate_endorsement_create(&input)?;

        let contact = self.require_active_contact(&input.contact_id).await?;
        self.require_active_community(&input.community_id).await?;
        self.require_active_membership(&input.community_id, &actor.user_id)
            .await?;

        if self
            .uow
            .endorsements()
            .find_by_triple(&input.contact_id, &actor.user_id, &input.community_id)
            .await?
            .is_some()
        {
            return Err(DomainError::Duplicate(
                "user has already endorsed this contact in this community".into(),
            ));
        }

        let now = now_ms();
        let endorsement = Endorsement {
            endorsement_id: crate::util::uuid_v7_without_dashes(),
            contact_id: input.contact_id,
            user_id: actor.user_id,
            community_id: input.community_id,
            rating: input.rating,
            comment: input.comment,
            is_verified: false,
            verified_by: None,
            verified_at_ms: None,
            deleted_at_ms: None,
            created_at_ms: now,
            updated_at_ms: now,
        };

        let created = endorsement.clone();
        let aggregator = self.aggregator.clone();
        self.uow
            .transaction(Box::new(move |repos| {
                Box::pin(async move {
                    repos.endorsements().insert(&created).await?;
                    aggregator
                        .recompute(repos.as_ref(), &created.contact_id, now)
                        .await?;
                    Ok(())
                })
            }))
            .await?;

        info!(
            endorsement_id = %endorsement.endorsement_id,
            contact_id = %endorsement.contact_id,
            user_id = %endorsement.user_id,
            "endorsement created"
        );

        self.dispatch(NotificationEvent::new(
            NotificationKind::EndorsementReceived,
            contact.owner_id.clone(),
            Some(endorsement.endorsement_id.clone()),
            serde_json::json!({
                "contact_id": endorsement.contact_id,
                "contact_name": contact.contact_name,
                "community_id": endorsement.community_id,
                "rating": endorsement.rating,
                "has_comment": endorsement.comment.is_some(),
            }),
        ))
        .await;

        Ok(endorsement)
    }

    /// Marks an endorsement verified. Verifying an already-verified
    /// endorsement is a logged no-op success; `verified_by`/`verified_at_ms`
    /// keep their original values and the metrics are untouched.
    pub async fn verify(
        &self,
        endorsement_id: &str,
        verifier_id: &str,
    ) -> DomainResult<Endorsement> {
        let endorsement = self.require_endorsement(endorsement_id).await?;

        self.uow
            .users()
            .get(verifier_id)
            .await?
            .ok_or_else(|| DomainError::NotFound(format!("user {verifier_id}")))?;

        if verifier_id == endorsement.user_id {
            return Err(DomainError::BusinessRule(
                "an endorsement cannot be verified by its own author".into(),
            ));
        }

        // Retraction and already-verified are judged on the in-transaction
        // read. Two racing verifies serialize at the store; the loser re-reads
        // a verified row and takes the no-op path instead of rewriting the
        // winner's verified_by/verified_at.
        let out: Arc<Mutex<Option<(Endorsement, bool)>>> = Arc::new(Mutex::new(None));
        let slot = Arc::clone(&out);
        let id = endorsement_id.to_string();
        let verifier = verifier_id.to_string();
        let aggregator = self.aggregator.clone();
        self.uow
            .transaction(Box::new(move |repos| {
                Box::pin(async move {
                    let row = repos
                        .endorsements()
                        .get(&id)
                        .await?
                        .ok_or_else(|| DomainError::NotFound(format!("endorsement {id}")))?;
                    if row.deleted_at_ms.is_some() {
                        return Err(DomainError::BusinessRule(
                            "a retracted endorsement cannot be verified".into(),
                        ));
                    }
                    if row.is_verified {
                        *slot.lock().expect("verify result slot") = Some((row, false));
                        return Ok(());
                    }

                    let now = now_ms();
                    let mut verified = row;
                    verified.is_verified = true;
                    verified.verified_by = Some(verifier);
                    verified.verified_at_ms = Some(now);
                    verified.updated_at_ms = now;
                    let verified = repos.endorsements().update(&verified).await?;
                    aggregator
                        .recompute(repos.as_ref(), &verified.contact_id, now)
                        .await?;
                    *slot.lock().expect("verify result slot") = Some((verified, true));
                    Ok(())
                })
            }))
            .await?;

        let (verified, applied) = out
            .lock()
            .expect("verify result slot")
            .take()
            .ok_or_else(|| DomainError::Service("verify transaction produced no row".into()))?;

        if !applied {
            info!(
                endorsement_id = %verified.endorsement_id,
                verifier_id,
                "endorsement already verified, no-op"
            );
            return Ok(verified);
        }

        info!(
            endorsement_id = %verified.endorsement_id,
            verifier_id,
            "endorsement verified"
        );

        let context = serde_json::json!({
            "contact_id": verified.contact_id,
            "community_id": verified.community_id,
            "verified_by": verifier_id,
        });
        self.dispatch(NotificationEvent::new(
            NotificationKind::EndorsementVerified,
            verified.user_id.clone(),
            Some(verified.endorsement_id.clone()),
            context.clone(),
        ))
        .await;
        if let Some(contact) = self.uow.contacts().get(&verified.contact_id).await? {
            self.dispatch(NotificationEvent::new(
                NotificationKind::ContactEndorsementVerified,
                contact.owner_id,
                Some(verified.endorsement_id.clone()),
                context,
            ))
            .await;
        }

        Ok(verified)
    }

    /// Author-only edit of rating and/or comment. Verification state is left
    /// untouched; metrics are recomputed in the same transaction.
    pub async fn update(
        &self,
        actor: ActorIdentity,
        endorsement_id: &str,
        input: EndorsementUpdate,
    ) -> DomainResult<Endorsement> {
        let endorsement = self.require_endorsement(endorsement_id).await?;
        if endorsement.user_id != actor.user_id {
            return Err(DomainError::BusinessRule(
                "only the endorsing user may update an endorsement".into(),
            ));
        }
        if endorsement.deleted_at_ms.is_some() {
            return Err(DomainError::BusinessRule(
                "a retracted endorsement cannot be updated".into(),
            ));
        }

        let mut changed = endorsement.clone();
        if let Some(rating) = input.rating {
            validate_rating(rating)?;
            changed.rating = rating;
        }
        if let Some(comment) = input.comment {
            changed.comment = Some(validate_comment(&comment)?);
        }
        let now = now_ms();
        changed.updated_at_ms = now;

        let updated = changed.clone();
        let aggregator = self.aggregator.clone();
        self.uow
            .transaction(Box::new(move |repos| {
                Box::pin(async move {
                    repos.endorsements().update(&updated).await?;
                    aggregator
                        .recompute(repos.as_ref(), &updated.contact_id, now)
                        .await?;
                    Ok(())
                })
            }))
            .await?;

        if changed.rating != endorsement.rating {
            if let Some(contact) = self.uow.contacts().get(&changed.contact_id).await? {
                self.dispatch(NotificationEvent::new(
                    NotificationKind::RatingUpdated,
                    contact.owner_id,
                    Some(changed.endorsement_id.clone()),
                    serde_json::json!({
                        "contact_id": changed.contact_id,
                        "average_rating": contact.average_rating,
                    }),
                ))
                .await;
            }
        }

        Ok(changed)
    }

    /// Author-only soft delete. The row stays on record with `deleted_at_ms`
    /// set and drops out of every aggregate; retracting twice is a no-op.
    pub async fn retract(
        &self,
        actor: ActorIdentity,
        endorsement_id: &str,
    ) -> DomainResult<Endorsement> {
        let endorsement = self.require_endorsement(endorsement_id).await?;
        if endorsement.user_id != actor.user_id {
            return Err(DomainError::BusinessRule(
                "only the endorsing user may retract an endorsement".into(),
            ));
        }
        if endorsement.deleted_at_ms.is_some() {
            return Ok(endorsement);
        }

        let now = now_ms();
        let mut retracted = endorsement.clone();
        retracted.deleted_at_ms = Some(now);
        retracted.updated_at_ms = now;

        let updated = retracted.clone();
        let aggregator = self.aggregator.clone();
        self.uow
            .transaction(Box::new(move |repos| {
                Box::pin(async move {
                    repos.endorsements().update(&updated).await?;
                    aggregator
                        .recompute(repos.as_ref(), &updated.contact_id, now)
                        .await?;
                    Ok(())
                })
            }))
            .await?;

        info!(
            endorsement_id = %retracted.endorsement_id,
            user_id = %retracted.user_id,
            "endorsement retracted"
        );
        Ok(retracted)
    }

    pub async fn get(&self, endorsement_id: &str) -> DomainResult<Endorsement> {
        self.require_endorsement(endorsement_id).await
    }

    pub async fn list_by_contact(&self, contact_id: &str) -> DomainResult<Vec<Endorsement>> {
        self.uow.endorsements().list_by_contact(contact_id).await
    }

    async fn require_endorsement(&self, endorsement_id: &str) -> DomainResult<Endorsement> {
        self.uow
            .endorsements()
            .get(endorsement_id)
            .await?
            .ok_or_else(|| DomainError::NotFound(format!("endorsement {endorsement_id}")))
    }

    async fn require_active_contact(&self, contact_id: &str) -> DomainResult<Contact> {
        let contact = self
            .uow
            .contacts()
            .get(contact_id)
            .await?
            .ok_or_else(|| DomainError::NotFound(format!("contact {contact_id}")))?;
        if !contact.is_active {
            return Err(DomainError::Validation(format!(
                "contact {contact_id} is inactive"
            )));
        }
        Ok(contact)
    }

    async fn require_active_community(&self, community_id: &str) -> DomainResult<()> {
        let community = self
            .uow
            .communities()
            .get(community_id)
            .await?
            .ok_or_else(|| DomainError::NotFound(format!("community {community_id}")))?;
        if !community.is_active {
            return Err(DomainError::Validation(format!(
                "community {community_id} is inactive"
            )));
        }
        Ok(())
    }

    async fn require_active_membership(
        &self,
        community_id: &str,
        user_id: &str,
    ) -> DomainResult<()> {
        let membership = self.uow.memberships().get(community_id, user_id).await?;
        match membership {
            Some(member) if member.status == MembershipStatus::Active => Ok(()),
            _ => Err(DomainError::Validation(format!(
                "user {user_id} is not an active member of community {community_id}"
            ))),
        }
    }

    async fn dispatch(&self, event: NotificationEvent) {
        let kind = event.kind.as_str();
        let recipient = event.recipient_id.clone();
        if let Err(err) = self.notifier.notify(event).await {
            warn!(
                error = %err,
                kind,
                recipient_id = %recipient,
                "notification dispatch failed"
            );
        }
    }
}

fn validate_endorsement_create(
    input: &EndorsementCreate,
) -> Result<EndorsementCreate, DomainError> {
    let contact_id = input.contact_id.trim().to_string();
    if contact_id.is_empty() {
        return Err(DomainError::Validation("contact_id is required".into()));
    }
    let community_id = input.community_id.trim().to_string();
    if community_id.is_empty() {
        return Err(DomainError::Validation("community_id is required".into()));
    }

    validate_rating(input.rating)?;

    let comment = match &input.comment {
        Some(comment) => Some(validate_comment(comment)?),
        None => None,
    };

    Ok(EndorsementCreate {
        contact_id,
        community_id,
        rating: input.rating,
        comment,
    })
}

fn validate_rating(rating: u8) -> DomainResult<()> {
    if !(MIN_RATING..=MAX_RATING).contains(&rating) {
        return Err(DomainError::Validation(format!(
            "rating must be between {MIN_RATING} and {MAX_RATING}"
        )));
    }
    Ok(())
}

fn validate_comment(comment: &str) -> Result<String, DomainError> {
    let comment = comment.trim().to_string();
    let length = comment.chars().count();
    if length < MIN_COMMENT_LENGTH {
        return Err(DomainError::Validation(format!(
            "comment must be at least {MIN_COMMENT_LENGTH} characters"
        )));
    }
    if length > MAX_COMMENT_LENGTH {
        return Err(DomainError::Validation(format!(
            "comment exceeds max length of {MAX_COMMENT_LENGTH}"
        )));
    }
    Ok(comment)
}
