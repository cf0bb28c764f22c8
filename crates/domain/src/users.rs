use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::DomainResult;
use crate::error::DomainError;
use crate::ports::tx::UnitOfWork;
use crate::util::now_ms;

const MAX_USERNAME_LENGTH: usize = 50;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Member,
    Moderator,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Member => "member",
            Self::Moderator => "moderator",
            Self::Admin => "admin",
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub user_id: String,
    pub username: String,
    pub email: String,
    pub is_active: bool,
    /// Ordered, duplicate-free.
    pub roles: Vec<Role>,
    pub created_at_ms: i64,
    pub updated_at_ms: i64,
}

#[derive(Clone, Debug)]
pub struct UserCreate {
    pub username: String,
    pub email: String,
}

#[derive(Clone)]
pub struct UserService {
    uow: Arc<dyn UnitOfWork>,
}

impl UserService {
    pub fn new(uow: Arc<dyn UnitOfWork>) -> Self {
        Self { uow }
    }

    pub async fn register(&self, input: UserCreate) -> DomainResult<User> {
        let input = validate_user_create(&input)?;
        let now = now_ms();
        let user = User {
            user_id: crate::util::uuid_v7_without_dashes(),
            username: input.username,
            email: input.email,
            is_active: true,
            roles: vec![Role::Member],
            created_at_ms: now,
            updated_at_ms: now,
        };
        self.uow.users().insert(&user).await
    }

    pub async fn get(&self, user_id: &str) -> DomainResult<User> {
        self.uow
            .users()
            .get(user_id)
            .await?
            .ok_or_else(|| DomainError::NotFound(format!("user {user_id}")))
    }

    pub async fn assign_role(&self, user_id: &str, role: Role) -> DomainResult<User> {
        let mut user = self.get(user_id).await?;
        if user.roles.contains(&role) {
            return Ok(user);
        }
        user.roles.push(role);
        user.updated_at_ms = now_ms();
        self.uow.users().update(&user).await
    }

    pub async fn remove_role(&self, user_id: &str, role: &Role) -> DomainResult<User> {
        let mut user = self.get(user_id).await?;
        let before = user.roles.len();
        user.roles.retain(|existing| existing != role);
        if user.roles.len() == before {
            return Err(DomainError::NotFound(format!(
                "role {} on user {user_id}",
                role.as_str()
            )));
        }
        user.updated_at_ms = now_ms();
        self.uow.users().update(&user).await
    }

    /// Soft deactivation only; users stay referenced by their endorsements.
    pub async fn deactivate(&self, user_id: &str) -> DomainResult<User> {
        let mut user = self.get(user_id).await?;
        if !user.is_active {
            return Ok(user);
        }
        user.is_active = false;
        user.updated_at_ms = now_ms();
        self.uow.users().update(&user).await
    }

    pub async fn reactivate(&self, user_id: &str) -> DomainResult<User> {
        let mut user = self.get(user_id).await?;
        if user.is_active {
            return Ok(user);
        }
        user.is_active = true;
        user.updated_at_ms = now_ms();
        self.uow.users().update(&user).await
    }
}

fn validate_user_create(input: &UserCreate) -> Result<UserCreate, DomainError> {
    let username = input.username.trim().to_string();
    if username.is_empty() {
        return Err(DomainError::Validation("username is required".into()));
    }
    if username.chars().count() > MAX_USERNAME_LENGTH {
        return Err(DomainError::Validation(format!(
            "username exceeds max length of {MAX_USERNAME_LENGTH}"
        )));
    }

    let email = input.email.trim().to_string();
    if email.is_empty() || !email.contains('@') {
        return Err(DomainError::Validation("a valid email is required".into()));
    }

    Ok(UserCreate { username, email })
}
