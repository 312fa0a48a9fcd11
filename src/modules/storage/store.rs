use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tempfile::NamedTempFile;
use thiserror::Error;

use super::audit::{Record, UserId};
use crate::modules::accounts::user::{User, UserStatus};
use crate::modules::mail::outgoing::OutgoingMail;

/// Persisted entity types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    User,
    OutgoingMail,
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("{entity} with {field} '{value}' already exists")]
    UniqueViolation {
        entity: &'static str,
        field: &'static str,
        value: String,
    },
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: u64 },
    #[error("user {id} cannot move from {from} to {to}")]
    InvalidStatusChange {
        id: UserId,
        from: UserStatus,
        to: UserStatus,
    },
    #[error("Corrupt database: {0}")]
    Corrupt(String),
    #[error("Database lock poisoned")]
    Poisoned,
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Invalid data: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Lookup of existing slugs, consulted when deriving a new one
pub trait SlugSource {
    /// All slugs of `kind` starting with `prefix`, or `None` if the entity
    /// has no slug column
    fn slugs_with_prefix(&self, kind: EntityKind, prefix: &str) -> Option<Vec<String>>;
}

/// Rows of one entity keyed by an auto-increment id
#[derive(Debug, Clone)]
pub struct Table<R: Record> {
    rows: BTreeMap<u64, R>,
    next_id: u64,
}

impl<R: Record> Table<R> {
    fn new() -> Self {
        Self {
            rows: BTreeMap::new(),
            next_id: 1,
        }
    }

    fn from_rows(rows: Vec<R>) -> Result<Self, StorageError> {
        let mut table = Self::new();
        for row in rows {
            let id = row.id();
            if table.rows.insert(id, row).is_some() {
                return Err(StorageError::Corrupt(format!(
                    "duplicate {} id {}",
                    R::ENTITY,
                    id
                )));
            }
            table.next_id = table.next_id.max(id + 1);
        }
        Ok(table)
    }

    pub fn get(&self, id: u64) -> Option<&R> {
        self.rows.get(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &R> {
        self.rows.values()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn insert(&mut self, mut record: R) -> R {
        let id = self.next_id;
        self.next_id += 1;
        record.set_id(id);
        self.rows.insert(id, record.clone());
        record
    }

    /// Replace an existing row, returning the previous version
    fn update(&mut self, mut record: R, actor: Option<UserId>) -> Result<(R, R), StorageError> {
        let previous = match self.rows.get(&record.id()) {
            Some(previous) => previous.clone(),
            None => {
                return Err(StorageError::NotFound {
                    entity: R::ENTITY,
                    id: record.id(),
                })
            }
        };
        record.touch(actor);
        self.rows.insert(record.id(), record.clone());
        Ok((record, previous))
    }

    fn restore(&mut self, record: R) {
        self.rows.insert(record.id(), record);
    }

    fn remove(&mut self, id: u64) {
        self.rows.remove(&id);
    }
}

#[derive(Deserialize, Default)]
struct Snapshot {
    #[serde(default)]
    users: Vec<User>,
    #[serde(default)]
    outgoing_mails: Vec<OutgoingMail>,
}

#[derive(Serialize)]
struct SnapshotRef<'a> {
    users: Vec<&'a User>,
    outgoing_mails: Vec<&'a OutgoingMail>,
}

/// The user and outgoing mail tables.
///
/// Email and slug uniqueness is enforced here on every insert and update, not
/// only by callers probing beforehand. When backed by a file, every mutation
/// is flushed to disk before it is reported as done.
#[derive(Debug)]
pub struct Database {
    users: Table<User>,
    outgoing_mails: Table<OutgoingMail>,
    emails: HashMap<String, UserId>,
    slugs: BTreeMap<String, UserId>,
    path: Option<PathBuf>,
}

impl Database {
    pub fn in_memory() -> Self {
        Self {
            users: Table::new(),
            outgoing_mails: Table::new(),
            emails: HashMap::new(),
            slugs: BTreeMap::new(),
            path: None,
        }
    }

    /// Open the JSON database at `path`, starting empty if it does not exist yet
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        let snapshot = match fs::read_to_string(path) {
            Ok(raw) => serde_json::from_str(&raw)?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                log::info!("Creating new database at {}", path.display());
                Snapshot::default()
            }
            Err(e) => return Err(e.into()),
        };

        let mut db = Self::in_memory();
        db.path = Some(path.to_path_buf());
        db.users = Table::from_rows(snapshot.users)?;
        db.outgoing_mails = Table::from_rows(snapshot.outgoing_mails)?;

        for user in db.users.iter() {
            if db.emails.insert(user.email.clone(), user.id).is_some() {
                return Err(StorageError::Corrupt(format!(
                    "duplicate user email '{}'",
                    user.email
                )));
            }
            if db.slugs.insert(user.slug.clone(), user.id).is_some() {
                return Err(StorageError::Corrupt(format!(
                    "duplicate user slug '{}'",
                    user.slug
                )));
            }
        }

        log::debug!(
            "Loaded {} users and {} outgoing mails from {}",
            db.users.len(),
            db.outgoing_mails.len(),
            path.display()
        );
        Ok(db)
    }

    fn persist(&self) -> Result<(), StorageError> {
        let path = match &self.path {
            Some(path) => path,
            None => return Ok(()),
        };

        let snapshot = SnapshotRef {
            users: self.users.iter().collect(),
            outgoing_mails: self.outgoing_mails.iter().collect(),
        };
        let data = serde_json::to_string_pretty(&snapshot)?;

        // Write next to the target and rename so a crash never leaves half a file
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut file = NamedTempFile::new_in(dir)?;
        file.write_all(data.as_bytes())?;
        file.persist(path).map_err(|e| StorageError::Io(e.error))?;
        Ok(())
    }

    fn check_user_unique(&self, user: &User) -> Result<(), StorageError> {
        if let Some(&owner) = self.emails.get(&user.email) {
            if owner != user.id {
                return Err(StorageError::UniqueViolation {
                    entity: User::ENTITY,
                    field: "email",
                    value: user.email.clone(),
                });
            }
        }
        if let Some(&owner) = self.slugs.get(&user.slug) {
            if owner != user.id {
                return Err(StorageError::UniqueViolation {
                    entity: User::ENTITY,
                    field: "slug",
                    value: user.slug.clone(),
                });
            }
        }
        Ok(())
    }

    fn index_user(&mut self, user: &User) {
        self.emails.insert(user.email.clone(), user.id);
        self.slugs.insert(user.slug.clone(), user.id);
    }

    fn unindex_user(&mut self, user: &User) {
        self.emails.remove(&user.email);
        self.slugs.remove(&user.slug);
    }

    /// Insert a new user, assigning its id
    pub fn insert_user(&mut self, user: User) -> Result<User, StorageError> {
        self.check_user_unique(&user)?;

        let user = self.users.insert(user);
        self.index_user(&user);

        if let Err(e) = self.persist() {
            self.unindex_user(&user);
            self.users.remove(user.id);
            return Err(e);
        }
        Ok(user)
    }

    /// Save changes to an existing user
    pub fn update_user(&mut self, user: User, actor: Option<UserId>) -> Result<User, StorageError> {
        if let Some(stored) = self.users.get(user.id) {
            if stored.status != user.status && !stored.status.can_transition_to(user.status) {
                return Err(StorageError::InvalidStatusChange {
                    id: user.id,
                    from: stored.status,
                    to: user.status,
                });
            }
        }
        self.check_user_unique(&user)?;

        let (user, previous) = self.users.update(user, actor)?;
        self.unindex_user(&previous);
        self.index_user(&user);

        if let Err(e) = self.persist() {
            self.unindex_user(&user);
            self.index_user(&previous);
            self.users.restore(previous);
            return Err(e);
        }
        Ok(user)
    }

    pub fn user(&self, id: UserId) -> Option<&User> {
        self.users.get(id)
    }

    pub fn user_by_email(&self, email: &str) -> Option<&User> {
        self.emails.get(email).and_then(|id| self.users.get(*id))
    }

    pub fn find_user<P>(&self, predicate: P) -> Option<&User>
    where
        P: Fn(&User) -> bool,
    {
        self.users.iter().find(|user| predicate(user))
    }

    /// Whether an admin was ever created, deleted or not. Only one user may
    /// hold the flag.
    pub fn has_admin(&self) -> bool {
        self.users.iter().any(|user| user.is_admin)
    }

    /// The live admin account, used as fallback owner
    pub fn admin(&self) -> Option<&User> {
        self.users
            .iter()
            .find(|user| user.is_admin && user.status != UserStatus::Deleted)
    }

    /// Owner for a new or modified row: the acting user, else the admin
    pub fn attribute(&self, actor: Option<UserId>) -> Option<UserId> {
        actor.or_else(|| self.admin().map(|admin| admin.id))
    }

    pub fn users(&self) -> impl Iterator<Item = &User> {
        self.users.iter()
    }

    /// Record an outgoing mail, assigning its id
    pub fn insert_mail(&mut self, mail: OutgoingMail) -> Result<OutgoingMail, StorageError> {
        let mail = self.outgoing_mails.insert(mail);
        if let Err(e) = self.persist() {
            self.outgoing_mails.remove(mail.id);
            return Err(e);
        }
        Ok(mail)
    }

    pub fn update_mail(
        &mut self,
        mail: OutgoingMail,
        actor: Option<UserId>,
    ) -> Result<OutgoingMail, StorageError> {
        let (mail, previous) = self.outgoing_mails.update(mail, actor)?;
        if let Err(e) = self.persist() {
            self.outgoing_mails.restore(previous);
            return Err(e);
        }
        Ok(mail)
    }

    pub fn mail(&self, id: u64) -> Option<&OutgoingMail> {
        self.outgoing_mails.get(id)
    }

    pub fn mails(&self) -> impl Iterator<Item = &OutgoingMail> {
        self.outgoing_mails.iter()
    }

    /// Whether any row of `kind` holds `value` in `field`.
    ///
    /// `None` means the entity has no such field.
    pub fn exists(&self, kind: EntityKind, field: &str, value: &str) -> Option<bool> {
        match (kind, field) {
            (EntityKind::User, "email") => Some(self.emails.contains_key(value)),
            (EntityKind::User, "slug") => Some(self.slugs.contains_key(value)),
            (EntityKind::User, "name") => Some(self.users.iter().any(|u| u.name == value)),
            (EntityKind::OutgoingMail, "email_to") => {
                Some(self.outgoing_mails.iter().any(|m| m.email_to == value))
            }
            (EntityKind::OutgoingMail, "subject") => {
                Some(self.outgoing_mails.iter().any(|m| m.subject == value))
            }
            _ => None,
        }
    }
}

impl SlugSource for Database {
    fn slugs_with_prefix(&self, kind: EntityKind, prefix: &str) -> Option<Vec<String>> {
        match kind {
            EntityKind::User => Some(
                self.slugs
                    .range(prefix.to_string()..)
                    .take_while(|(slug, _)| slug.starts_with(prefix))
                    .map(|(slug, _)| slug.clone())
                    .collect(),
            ),
            EntityKind::OutgoingMail => None,
        }
    }
}

/// Shared handle to the database; every operation holds the lock for its own
/// read-modify-write only
#[derive(Debug)]
pub struct Store {
    inner: Mutex<Database>,
}

impl Store {
    pub fn new(db: Database) -> Self {
        Self {
            inner: Mutex::new(db),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Database::in_memory())
    }

    pub fn open(path: &Path) -> Result<Self, StorageError> {
        Ok(Self::new(Database::open(path)?))
    }

    pub fn lock(&self) -> Result<MutexGuard<'_, Database>, StorageError> {
        self.inner.lock().map_err(|_| StorageError::Poisoned)
    }
}
