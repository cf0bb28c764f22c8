use std::str::FromStr;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::DomainResult;
use crate::communities::{
    Community, CommunityCreate, MAX_RELATED_COMMUNITIES, PrivacyLevel,
    validate_community_create, validate_privacy_transition,
};
use crate::error::DomainError;
use crate::identity::ActorIdentity;
use crate::ports::tx::{Repositories, UnitOfWork};
use crate::util::now_ms;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MemberRole {
    Member,
    Organizer,
}

impl MemberRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Member => "member",
            Self::Organizer => "organizer",
        }
    }
}

impl FromStr for MemberRole {
    type Err = &'static str;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "member" => Ok(Self::Member),
            "organizer" => Ok(Self::Organizer),
            _ => Err("unknown member role"),
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MembershipStatus {
    Pending,
    Active,
    Removed,
}

impl MembershipStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Removed => "removed",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MembershipAction {
    Invite,
    Accept,
    Remove,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct CommunityMember {
    pub community_id: String,
    pub user_id: String,
    pub role: MemberRole,
    pub status: MembershipStatus,
    pub invited_by: Option<String>,
    /// Set when the invitation is accepted; cleared again if the member is
    /// removed and later re-invited.
    pub joined_at_ms: Option<i64>,
    pub created_at_ms: i64,
    pub updated_at_ms: i64,
}

#[derive(Clone, Debug)]
pub struct MembershipCommand {
    pub community_id: String,
    pub user_id: String,
    pub action: MembershipAction,
    pub role: MemberRole,
}

/// Drives the invite -> pending -> active -> removed lifecycle and keeps the
/// community's member counters in step with it. Every state change reads the
/// current row and counters inside the transaction that writes them, so two
/// racing commands cannot both apply.
#[derive(Clone)]
pub struct MembershipService {
    uow: Arc<dyn UnitOfWork>,
}

impl MembershipService {
    pub fn new(uow: Arc<dyn UnitOfWork>) -> Self {
        Self { uow }
    }

    /// Creates a community owned by `actor`, with the owner seeded as an
    /// active organizer member and the counters starting at 1/1.
    pub async fn create_community(
        &self,
        actor: ActorIdentity,
        input: CommunityCreate,
    ) -> DomainResult<Community> {
        let input = validate_community_create(&input)?;

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

        let now = now_ms();
        let community = Community {
            community_id: crate::util::uuid_v7_without_dashes(),
            name: input.name,
            owner_id: owner.user_id.clone(),
            privacy_level: input.privacy_level,
            is_active: true,
            total_members: 1,
            active_members: 1,
            related_community_ids: vec![],
            created_at_ms: now,
            updated_at_ms: now,
        };
        let owner_member = CommunityMember {
            community_id: community.community_id.clone(),
            user_id: owner.user_id,
            role: MemberRole::Organizer,
            status: MembershipStatus::Active,
            invited_by: None,
            joined_at_ms: Some(now),
            created_at_ms: now,
            updated_at_ms: now,
        };

        let created = community.clone();
        self.uow
            .transaction(Box::new(move |repos| {
                Box::pin(async move {
                    repos.communities().insert(&created).await?;
                    repos.memberships().insert(&owner_member).await?;
                    Ok(())
                })
            }))
            .await?;

        info!(
            community_id = %community.community_id,
            owner_id = %community.owner_id,
            "community created"
        );
        Ok(community)
    }

    pub async fn manage_membership(
        &self,
        actor: ActorIdentity,
        command: MembershipCommand,
    ) -> DomainResult<CommunityMember> {
        let community = self.require_active_community(&command.community_id).await?;

        let target = self
            .uow
            .users()
            .get(&command.user_id)
            .await?
            .ok_or_else(|| DomainError::NotFound(format!("user {}", command.user_id)))?;
        if !target.is_active {
            return Err(DomainError::Validation(format!(
                "user {} is inactive",
                target.user_id
            )));
        }

        match command.action {
            MembershipAction::Invite => self.invite(actor, community, command).await,
            MembershipAction::Accept => self.accept(actor, command).await,
            MembershipAction::Remove => self.remove(actor, community, command).await,
        }
    }

    /// Changes a community's privacy level. Setting the level it already has
    /// is a no-op success. Who may call this is the caller's concern; only
    /// the transition rule is enforced here, and always against the
    /// in-transaction read so a concurrent change cannot smuggle in the
    /// forbidden edge.
    pub async fn manage_privacy_level(
        &self,
        community_id: &str,
        new_level: PrivacyLevel,
        updated_by: &str,
    ) -> DomainResult<Community> {
        self.require_active_community(community_id).await?;

        let out: Arc<Mutex<Option<Community>>> = Arc::new(Mutex::new(None));
        let slot = Arc::clone(&out);
        let id = community_id.to_string();
        self.uow
            .transaction(Box::new(move |repos| {
                Box::pin(async move {
                    let community = require_community(repos.as_ref(), &id).await?;
                    if community.privacy_level == new_level {
                        *slot.lock().expect("privacy result slot") = Some(community);
                        return Ok(());
                    }
                    validate_privacy_transition(community.privacy_level, new_level)?;

                    let mut changed = community;
                    changed.privacy_level = new_level;
                    changed.updated_at_ms = now_ms();
                    let updated = repos.communities().update(&changed).await?;
                    *slot.lock().expect("privacy result slot") = Some(updated);
                    Ok(())
                })
            }))
            .await?;

        let updated = out
            .lock()
            .expect("privacy result slot")
            .take()
            .ok_or_else(|| DomainError::Service("privacy transaction produced no row".into()))?;

        info!(
            community_id,
            privacy_level = new_level.as_str(),
            updated_by,
            "community privacy level changed"
        );
        Ok(updated)
    }

    /// Links two communities. The link is symmetric: both rows carry the
    /// other's id, written in one transaction.
    pub async fn add_related_community(
        &self,
        community_id: &str,
        related_id: &str,
    ) -> DomainResult<()> {
        if community_id == related_id {
            return Err(DomainError::Validation(
                "a community cannot be related to itself".into(),
            ));
        }
        self.require_active_community(community_id).await?;
        self.require_active_community(related_id).await?;

        let left = community_id.to_string();
        let right = related_id.to_string();
        self.uow
            .transaction(Box::new(move |repos| {
                Box::pin(async move {
                    let mut a = require_community(repos.as_ref(), &left).await?;
                    let mut b = require_community(repos.as_ref(), &right).await?;

                    if a.related_community_ids.iter().any(|id| *id == right)
                        || b.related_community_ids.iter().any(|id| *id == left)
                    {
                        return Err(DomainError::Duplicate(format!(
                            "communities {left} and {right} are already related"
                        )));
                    }
                    if a.related_community_ids.len() >= MAX_RELATED_COMMUNITIES
                        || b.related_community_ids.len() >= MAX_RELATED_COMMUNITIES
                    {
                        return Err(DomainError::BusinessRule(format!(
                            "a community may have at most {MAX_RELATED_COMMUNITIES} related communities"
                        )));
                    }

                    let now = now_ms();
                    a.related_community_ids.push(right.clone());
                    a.updated_at_ms = now;
                    b.related_community_ids.push(left.clone());
                    b.updated_at_ms = now;
                    repos.communities().update(&a).await?;
                    repos.communities().update(&b).await?;
                    Ok(())
                })
            }))
            .await
    }

    /// Unlinks two communities from both sides. Unlinking communities that
    /// are not related is a no-op.
    pub async fn remove_related_community(
        &self,
        community_id: &str,
        related_id: &str,
    ) -> DomainResult<()> {
        self.require_active_community(community_id).await?;

        let left = community_id.to_string();
        let right = related_id.to_string();
        self.uow
            .transaction(Box::new(move |repos| {
                Box::pin(async move {
                    let mut a = require_community(repos.as_ref(), &left).await?;
                    let now = now_ms();
                    a.related_community_ids.retain(|id| *id != right);
                    a.updated_at_ms = now;
                    repos.communities().update(&a).await?;

                    if let Some(mut b) = repos.communities().get(&right).await? {
                        b.related_community_ids.retain(|id| *id != left);
                        b.updated_at_ms = now;
                        repos.communities().update(&b).await?;
                    }
                    Ok(())
                })
            }))
            .await
    }

    pub async fn get_community(&self, community_id: &str) -> DomainResult<Community> {
        self.uow
            .communities()
            .get(community_id)
            .await?
            .ok_or_else(|| DomainError::NotFound(format!("community {community_id}")))
    }

    pub async fn list_members(&self, community_id: &str) -> DomainResult<Vec<CommunityMember>> {
        self.require_active_community(community_id).await?;
        self.uow.memberships().list_by_community(community_id).await
    }

    async fn invite(
        &self,
        actor: ActorIdentity,
        community: Community,
        command: MembershipCommand,
    ) -> DomainResult<CommunityMember> {
        if community.privacy_level == PrivacyLevel::InvitationOnly {
            let acting_member = self
                .uow
                .memberships()
                .get(&community.community_id, &actor.user_id)
                .await?;
            if !invite_authorized(&community, &actor.user_id, acting_member.as_ref()) {
                return Err(DomainError::BusinessRule(
                    "only the owner or an active organizer may invite into an invitation-only community"
                        .into(),
                ));
            }
        }

        let out: Arc<Mutex<Option<CommunityMember>>> = Arc::new(Mutex::new(None));
        let slot = Arc::clone(&out);
        let invited_by = actor.user_id.clone();
        self.uow
            .transaction(Box::new(move |repos| {
                Box::pin(async move {
                    let existing = repos
                        .memberships()
                        .get(&command.community_id, &command.user_id)
                        .await?;
                    let now = now_ms();

                    let member = match existing {
                        None => {
                            let member = CommunityMember {
                                community_id: command.community_id.clone(),
                                user_id: command.user_id.clone(),
                                role: command.role,
                                status: MembershipStatus::Pending,
                                invited_by: Some(invited_by),
                                joined_at_ms: None,
                                created_at_ms: now,
                                updated_at_ms: now,
                            };
                            repos.memberships().insert(&member).await?
                        }
                        Some(row) if row.status == MembershipStatus::Removed => {
                            // A removed member can be invited back; the old
                            // row is restored rather than duplicated.
                            let mut member = row;
                            member.status = MembershipStatus::Pending;
                            member.role = command.role;
                            member.invited_by = Some(invited_by);
                            member.joined_at_ms = None;
                            member.updated_at_ms = now;
                            repos.memberships().update(&member).await?
                        }
                        Some(row) => {
                            return Err(DomainError::Duplicate(format!(
                                "user {} already has {} membership in community {}",
                                row.user_id,
                                row.status.as_str(),
                                row.community_id
                            )));
                        }
                    };

                    let mut community =
                        require_community(repos.as_ref(), &command.community_id).await?;
                    community.total_members += 1;
                    community.updated_at_ms = now;
                    repos.communities().update(&community).await?;

                    *slot.lock().expect("membership result slot") = Some(member);
                    Ok(())
                })
            }))
            .await?;

        let member = out
            .lock()
            .expect("membership result slot")
            .take()
            .ok_or_else(|| DomainError::Service("membership transaction produced no row".into()))?;
        info!(
            community_id = %member.community_id,
            user_id = %member.user_id,
            invited_by = %actor.user_id,
            "member invited"
        );
        Ok(member)
    }

    async fn accept(
        &self,
        actor: ActorIdentity,
        command: MembershipCommand,
    ) -> DomainResult<CommunityMember> {
        if actor.user_id != command.user_id {
            return Err(DomainError::BusinessRule(
                "only the invited user may accept the invitation".into(),
            ));
        }

        let out: Arc<Mutex<Option<CommunityMember>>> = Arc::new(Mutex::new(None));
        let slot = Arc::clone(&out);
        self.uow
            .transaction(Box::new(move |repos| {
                Box::pin(async move {
                    let row = repos
                        .memberships()
                        .get(&command.community_id, &command.user_id)
                        .await?
                        .ok_or_else(|| {
                            DomainError::NotFound(format!(
                                "membership of user {} in community {}",
                                command.user_id, command.community_id
                            ))
                        })?;
                    if row.status != MembershipStatus::Pending {
                        return Err(DomainError::BusinessRule(format!(
                            "membership is {}, only a pending invitation can be accepted",
                            row.status.as_str()
                        )));
                    }

                    let now = now_ms();
                    let mut member = row;
                    member.status = MembershipStatus::Active;
                    member.joined_at_ms = Some(now);
                    member.updated_at_ms = now;
                    let member = repos.memberships().update(&member).await?;

                    let mut community =
                        require_community(repos.as_ref(), &command.community_id).await?;
                    community.active_members += 1;
                    community.updated_at_ms = now;
                    repos.communities().update(&community).await?;

                    *slot.lock().expect("membership result slot") = Some(member);
                    Ok(())
                })
            }))
            .await?;

        let member = out
            .lock()
            .expect("membership result slot")
            .take()
            .ok_or_else(|| DomainError::Service("membership transaction produced no row".into()))?;
        info!(
            community_id = %member.community_id,
            user_id = %member.user_id,
            "invitation accepted"
        );
        Ok(member)
    }

    async fn remove(
        &self,
        actor: ActorIdentity,
        community: Community,
        command: MembershipCommand,
    ) -> DomainResult<CommunityMember> {
        if command.user_id == community.owner_id {
            return Err(DomainError::BusinessRule(
                "the community owner cannot be removed from their own community".into(),
            ));
        }

        let self_removal = actor.user_id == command.user_id;
        if !self_removal && actor.user_id != community.owner_id {
            let acting_member = self
                .uow
                .memberships()
                .get(&community.community_id, &actor.user_id)
                .await?;
            let is_organizer = matches!(
                acting_member,
                Some(ref member)
                    if member.role == MemberRole::Organizer
                        && member.status == MembershipStatus::Active
            );
            if !is_organizer {
                return Err(DomainError::BusinessRule(
                    "only the owner, an active organizer, or the member themselves may remove a membership"
                        .into(),
                ));
            }
        }

        let out: Arc<Mutex<Option<CommunityMember>>> = Arc::new(Mutex::new(None));
        let slot = Arc::clone(&out);
        self.uow
            .transaction(Box::new(move |repos| {
                Box::pin(async move {
                    let row = repos
                        .memberships()
                        .get(&command.community_id, &command.user_id)
                        .await?
                        .ok_or_else(|| {
                            DomainError::NotFound(format!(
                                "membership of user {} in community {}",
                                command.user_id, command.community_id
                            ))
                        })?;

                    if row.status == MembershipStatus::Removed {
                        *slot.lock().expect("membership result slot") = Some(row);
                        return Ok(());
                    }

                    let was_active = row.status == MembershipStatus::Active;
                    let now = now_ms();
                    let mut member = row;
                    member.status = MembershipStatus::Removed;
                    member.updated_at_ms = now;
                    let member = repos.memberships().update(&member).await?;

                    let mut community =
                        require_community(repos.as_ref(), &command.community_id).await?;
                    community.total_members = community.total_members.saturating_sub(1);
                    if was_active {
                        community.active_members = community.active_members.saturating_sub(1);
                    }
                    community.updated_at_ms = now;
                    repos.communities().update(&community).await?;

                    *slot.lock().expect("membership result slot") = Some(member);
                    Ok(())
                })
            }))
            .await?;

        let member = out
            .lock()
            .expect("membership result slot")
            .take()
            .ok_or_else(|| DomainError::Service("membership transaction produced no row".into()))?;
        info!(
            community_id = %member.community_id,
            user_id = %member.user_id,
            removed_by = %actor.user_id,
            "member removed"
        );
        Ok(member)
    }

    async fn require_active_community(&self, community_id: &str) -> DomainResult<Community> {
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
        Ok(community)
    }
}

async fn require_community(repos: &dyn Repositories, community_id: &str) -> DomainResult<Community> {
    repos
        .communities()
        .get(community_id)
        .await?
        .ok_or_else(|| DomainError::NotFound(format!("community {community_id}")))
}

/// Invitation-only communities accept invites only from the owner or an
/// active organizer.
pub fn invite_authorized(
    community: &Community,
    acting_user_id: &str,
    acting_member: Option<&CommunityMember>,
) -> bool {
    if community.owner_id == acting_user_id {
        return true;
    }
    matches!(
        acting_member,
        Some(member)
            if member.role == MemberRole::Organizer && member.status == MembershipStatus::Active
    )
}
