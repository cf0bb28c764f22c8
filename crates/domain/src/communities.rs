use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::DomainResult;
use crate::error::DomainError;

pub const MAX_COMMUNITY_NAME_LENGTH: usize = 100;
pub const MAX_RELATED_COMMUNITIES: usize = 10;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PrivacyLevel {
    Public,
    Private,
    InvitationOnly,
}

impl PrivacyLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Private => "private",
            Self::InvitationOnly => "invitation_only",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        value.parse().ok()
    }
}

impl FromStr for PrivacyLevel {
    type Err = &'static str;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "public" => Ok(Self::Public),
            "private" => Ok(Self::Private),
            "invitation_only" => Ok(Self::InvitationOnly),
            _ => Err("unknown privacy level"),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Community {
    pub community_id: String,
    pub name: String,
    pub owner_id: String,
    pub privacy_level: PrivacyLevel,
    pub is_active: bool,
    /// Derived counters, written only by the membership manager in the same
    /// transaction as the membership change they summarize.
    pub total_members: u64,
    pub active_members: u64,
    /// Symmetric links to other communities; both sides carry the entry.
    pub related_community_ids: Vec<String>,
    pub created_at_ms: i64,
    pub updated_at_ms: i64,
}

#[derive(Clone, Debug)]
pub struct CommunityCreate {
    pub name: String,
    pub privacy_level: PrivacyLevel,
}

/// The only forbidden transition is opening a previously invitation-only
/// membership list straight to the world; it must pass through `private`.
pub fn validate_privacy_transition(from: PrivacyLevel, to: PrivacyLevel) -> DomainResult<()> {
    if from == PrivacyLevel::InvitationOnly && to == PrivacyLevel::Public {
        return Err(DomainError::Validation(
            "invitation_only communities must move to private before going public".into(),
        ));
    }
    Ok(())
}

pub fn validate_community_create(input: &CommunityCreate) -> Result<CommunityCreate, DomainError> {
    let name = input.name.trim().to_string();
    if name.is_empty() {
        return Err(DomainError::Validation("community name is required".into()));
    }
    if name.chars().count() > MAX_COMMUNITY_NAME_LENGTH {
        return Err(DomainError::Validation(format!(
            "community name exceeds max length of {MAX_COMMUNITY_NAME_LENGTH}"
        )));
    }
    Ok(CommunityCreate {
        name,
        privacy_level: input.privacy_level,
    })
}
