use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::modules::utils::time::now;

/// Primary key of a user row
pub type UserId = u64;

/// Audit columns shared by every persisted entity
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Audit {
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub created_by: Option<UserId>,
    pub updated_by: Option<UserId>,
}

impl Audit {
    pub fn new(actor: Option<UserId>) -> Self {
        let timestamp = now();
        Self {
            created_at: timestamp,
            updated_at: timestamp,
            created_by: actor,
            updated_by: actor,
        }
    }

    /// Mark the row as modified by `actor`
    pub fn touch(&mut self, actor: Option<UserId>) {
        self.updated_at = now();
        self.updated_by = actor;
    }
}

/// A row that can be saved into a [`Table`](super::store::Table).
///
/// Saving assigns the id on first insert and stamps the audit columns on
/// every write.
pub trait Record: Clone {
    /// Entity name used in storage errors
    const ENTITY: &'static str;

    fn id(&self) -> u64;
    fn set_id(&mut self, id: u64);
    fn audit(&self) -> &Audit;
    fn audit_mut(&mut self) -> &mut Audit;

    fn touch(&mut self, actor: Option<UserId>) {
        self.audit_mut().touch(actor);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_touch_updates_modifier_only() {
        let mut audit = Audit::new(Some(1));
        let created_at = audit.created_at;
        assert_eq!(audit.created_at, audit.updated_at);

        audit.touch(Some(7));
        assert_eq!(audit.created_by, Some(1));
        assert_eq!(audit.updated_by, Some(7));
        assert_eq!(audit.created_at, created_at);
        assert!(audit.updated_at >= created_at);
    }
}
