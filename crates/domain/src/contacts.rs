use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::DomainResult;
use crate::error::DomainError;
use crate::identity::ActorIdentity;
use crate::ports::tx::UnitOfWork;
use crate::util::now_ms;

const MAX_CONTACT_NAME_LENGTH: usize = 100;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Contact {
    pub contact_id: String,
    pub owner_id: String,
    pub contact_name: String,
    pub community_ids: Vec<String>,
    pub is_active: bool,
    /// Derived trust metrics. Written only by the aggregator, always by full
    /// recomputation from the endorsement set.
    pub endorsements_count: u64,
    pub verified_endorsements_count: u64,
    pub average_rating: Option<f64>,
    pub created_at_ms: i64,
    pub updated_at_ms: i64,
}

/// The three derived fields, written together in one update.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ContactMetrics {
    pub endorsements_count: u64,
    pub verified_endorsements_count: u64,
    pub average_rating: Option<f64>,
}

#[derive(Clone, Debug)]
pub struct ContactCreate {
    pub contact_name: String,
    pub community_ids: Vec<String>,
}

#[derive(Clone)]
pub struct ContactService {
    uow: Arc<dyn UnitOfWork>,
}

impl ContactService {
    pub fn new(uow: Arc<dyn UnitOfWork>) -> Self {
        Self { uow }
    }

    pub async fn create(&self, actor: ActorIdentity, input: ContactCreate) -> DomainResult<Contact> {
        let input = validate_contact_create(&input)?;

        let owner = self
            .uow
            .users()
            .get(&actor.user_id)
            .await?
            .ok_or_else(|| DomainError::NotFound(format!("user {}", actor.user_id)))?;
        if !owner.is_active {
            return Err(DomainError::Validation(format!(
                "user {} is inactive",
                owner.user_id
            )));
        }

        for community_id in &input.community_ids {
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
        }

        let now = now_ms();
        let contact = Contact {
            contact_id: crate::util::uuid_v7_without_dashes(),
            owner_id: owner.user_id,
            contact_name: input.contact_name,
            community_ids: input.community_ids,
            is_active: true,
            endorsements_count: 0,
            verified_endorsements_count: 0,
            average_rating: None,
            created_at_ms: now,
            updated_at_ms: now,
        };
        self.uow.contacts().insert(&contact).await
    }

    pub async fn get(&self, contact_id: &str) -> DomainResult<Contact> {
        self.uow
            .contacts()
            .get(contact_id)
            .await?
            .ok_or_else(|| DomainError::NotFound(format!("contact {contact_id}")))
    }

    pub async fn add_to_community(
        &self,
        contact_id: &str,
        community_id: &str,
    ) -> DomainResult<Contact> {
        let mut contact = self.get(contact_id).await?;
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
        if contact.community_ids.iter().any(|id| id == community_id) {
            return Err(DomainError::Duplicate(format!(
                "contact {contact_id} is already listed in community {community_id}"
            )));
        }
        contact.community_ids.push(community_id.to_string());
        contact.updated_at_ms = now_ms();
        self.uow.contacts().update(&contact).await
    }

    pub async fn deactivate(&self, contact_id: &str) -> DomainResult<Contact> {
        let mut contact = self.get(contact_id).await?;
        if !contact.is_active {
            return Ok(contact);
        }
        contact.is_active = false;
        contact.updated_at_ms = now_ms();
        self.uow.contacts().update(&contact).await
    }
}

fn validate_contact_create(input: &ContactCreate) -> Result<ContactCreate, DomainError> {
    let contact_name = input.contact_name.trim().to_string();
    if contact_name.is_empty() {
        return Err(DomainError::Validation("contact name is required".into()));
    }
    if contact_name.chars().count() > MAX_CONTACT_NAME_LENGTH {
        return Err(DomainError::Validation(format!(
            "contact name exceeds max length of {MAX_CONTACT_NAME_LENGTH}"
        )));
    }

    let mut community_ids = Vec::with_capacity(input.community_ids.len());
    let mut seen = std::collections::HashSet::new();
    for raw in &input.community_ids {
        let id = raw.trim().to_string();
        if id.is_empty() {
            continue;
        }
        if seen.insert(id.clone()) {
            community_ids.push(id);
        }
    }

    Ok(ContactCreate {
        contact_name,
        community_ids,
    })
}
