use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::modules::storage::audit::{Audit, Record, UserId};
use crate::modules::utils::random::generate_verify_code;

/// Account status, stored as a small integer
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(into = "i8", try_from = "i8")]
pub enum UserStatus {
    Deleted = -1,
    NotActive = 0,
    Active = 1,
}

impl UserStatus {
    /// Status only moves forward: NotActive -> Active, anything live -> Deleted
    pub fn can_transition_to(self, next: UserStatus) -> bool {
        matches!(
            (self, next),
            (UserStatus::NotActive, UserStatus::Active)
                | (UserStatus::NotActive, UserStatus::Deleted)
                | (UserStatus::Active, UserStatus::Deleted)
        )
    }
}

impl From<UserStatus> for i8 {
    fn from(status: UserStatus) -> Self {
        status as i8
    }
}

impl TryFrom<i8> for UserStatus {
    type Error = String;

    fn try_from(value: i8) -> Result<Self, Self::Error> {
        match value {
            -1 => Ok(UserStatus::Deleted),
            0 => Ok(UserStatus::NotActive),
            1 => Ok(UserStatus::Active),
            other => Err(format!("unknown user status {}", other)),
        }
    }
}

impl fmt::Display for UserStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            UserStatus::Deleted => "deleted",
            UserStatus::NotActive => "not active",
            UserStatus::Active => "active",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Error, PartialEq)]
#[error("user {user_id} cannot move from {from} to {to}")]
pub struct InvalidTransition {
    pub user_id: UserId,
    pub from: UserStatus,
    pub to: UserStatus,
}

/// A registered account
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub name: String,
    pub slug: String, // Fixed at creation, never recomputed
    pub password_hash: String,
    pub status: UserStatus,
    pub is_admin: bool,
    pub verify_code: String,
    #[serde(flatten)]
    pub audit: Audit,
    pub last_request_at: Option<DateTime<Utc>>,
}

impl User {
    /// Build an unsaved user. Admins start active, everyone else has to
    /// verify their email first.
    pub fn new(
        email: &str,
        name: &str,
        slug: String,
        password_hash: String,
        is_admin: bool,
        actor: Option<UserId>,
    ) -> Self {
        let status = if is_admin {
            UserStatus::Active
        } else {
            UserStatus::NotActive
        };

        Self {
            id: 0,
            email: email.to_string(),
            name: name.to_string(),
            slug,
            password_hash,
            status,
            is_admin,
            verify_code: generate_verify_code(),
            audit: Audit::new(actor),
            last_request_at: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == UserStatus::Active
    }

    /// Move to `next`, rejecting anything the state machine does not allow
    pub fn transition_to(&mut self, next: UserStatus) -> Result<(), InvalidTransition> {
        if !self.status.can_transition_to(next) {
            return Err(InvalidTransition {
                user_id: self.id,
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }

    /// Replace the verification code, invalidating any mailed link
    pub fn rotate_verify_code(&mut self) {
        self.verify_code = generate_verify_code();
    }
}

impl Record for User {
    const ENTITY: &'static str = "user";

    fn id(&self) -> u64 {
        self.id
    }

    fn set_id(&mut self, id: u64) {
        self.id = id;
    }

    fn audit(&self) -> &Audit {
        &self.audit
    }

    fn audit_mut(&mut self) -> &mut Audit {
        &mut self.audit
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::utils::random::VERIFY_CODE_LENGTH;

    fn user(is_admin: bool) -> User {
        User::new(
            "test@example.com",
            "Test User",
            "test-user".to_string(),
            "hash".to_string(),
            is_admin,
            None,
        )
    }

    #[test]
    fn test_initial_status() {
        let regular = user(false);
        assert_eq!(regular.status, UserStatus::NotActive);
        assert!(!regular.is_active());
        assert_eq!(regular.verify_code.len(), VERIFY_CODE_LENGTH);

        let admin = user(true);
        assert_eq!(admin.status, UserStatus::Active);
        assert!(admin.is_active());
    }

    #[test]
    fn test_state_machine() {
        use UserStatus::*;

        assert!(NotActive.can_transition_to(Active));
        assert!(NotActive.can_transition_to(Deleted));
        assert!(Active.can_transition_to(Deleted));

        assert!(!Active.can_transition_to(NotActive));
        assert!(!Deleted.can_transition_to(Active));
        assert!(!Deleted.can_transition_to(NotActive));
        assert!(!Active.can_transition_to(Active));
    }

    #[test]
    fn test_transition_rejected() {
        let mut admin = user(true);
        let err = admin.transition_to(UserStatus::NotActive).unwrap_err();
        assert_eq!(err.from, UserStatus::Active);
        assert_eq!(admin.status, UserStatus::Active);

        let mut regular = user(false);
        regular.transition_to(UserStatus::Active).unwrap();
        assert!(regular.is_active());
    }

    #[test]
    fn test_status_serialized_as_integer() {
        let json = serde_json::to_value(user(false)).unwrap();
        assert_eq!(json["status"], 0);
        assert_eq!(json["is_admin"], false);
        assert!(json.get("created_at").is_some());

        assert!(serde_json::from_str::<UserStatus>("5").is_err());
        assert_eq!(
            serde_json::from_str::<UserStatus>("-1").unwrap(),
            UserStatus::Deleted
        );
    }

    #[test]
    fn test_rotate_verify_code() {
        let mut regular = user(false);
        let before = regular.verify_code.clone();
        regular.rotate_verify_code();
        assert_ne!(before, regular.verify_code);
        assert_eq!(regular.verify_code.len(), VERIFY_CODE_LENGTH);
    }
}
