use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use super::transport::{Envelope, MailTransport};
use crate::modules::storage::audit::{Audit, Record, UserId};
use crate::modules::storage::store::{StorageError, Store};
use crate::modules::utils::logging::log_mail_event;
use crate::modules::utils::time::now;

/// Delivery state of an outgoing mail, stored as a small integer
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(into = "i8", try_from = "i8")]
pub enum MailStatus {
    Canceled = -1,
    Outgoing = 0,
    Sent = 1,
    Received = 2,
    Failed = 3,
}

impl From<MailStatus> for i8 {
    fn from(status: MailStatus) -> Self {
        status as i8
    }
}

impl TryFrom<i8> for MailStatus {
    type Error = String;

    fn try_from(value: i8) -> Result<Self, Self::Error> {
        match value {
            -1 => Ok(MailStatus::Canceled),
            0 => Ok(MailStatus::Outgoing),
            1 => Ok(MailStatus::Sent),
            2 => Ok(MailStatus::Received),
            3 => Ok(MailStatus::Failed),
            other => Err(format!("unknown mail status {}", other)),
        }
    }
}

impl fmt::Display for MailStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            MailStatus::Canceled => "canceled",
            MailStatus::Outgoing => "outgoing",
            MailStatus::Sent => "sent",
            MailStatus::Received => "received",
            MailStatus::Failed => "failed",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Error)]
pub enum MailError {
    #[error("mail {id} is {status}, cannot {action}")]
    InvalidState {
        id: u64,
        status: MailStatus,
        action: &'static str,
    },
    #[error("mail {0} not found")]
    NotFound(u64),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Record of one send attempt, independent of the transport used
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct OutgoingMail {
    pub id: u64,
    pub subject: String,
    pub email_from: String,
    pub email_to: String,
    pub email_cc: Option<String>,
    pub body: String,
    pub body_html: Option<String>,
    pub status: MailStatus,
    pub send_at: Option<DateTime<Utc>>, // Set only by a successful attempt
    #[serde(flatten)]
    pub audit: Audit,
}

impl OutgoingMail {
    pub fn new(subject: &str, email_from: &str, email_to: &str, body: &str) -> Self {
        Self {
            id: 0,
            subject: subject.to_string(),
            email_from: email_from.to_string(),
            email_to: email_to.to_string(),
            email_cc: None,
            body: body.to_string(),
            body_html: None,
            status: MailStatus::Outgoing,
            send_at: None,
            audit: Audit::new(None),
        }
    }

    pub fn with_html(mut self, body_html: &str) -> Self {
        self.body_html = Some(body_html.to_string());
        self
    }

    pub fn with_cc(mut self, email_cc: &str) -> Self {
        self.email_cc = Some(email_cc.to_string());
        self
    }

    pub fn envelope(&self) -> Envelope<'_> {
        Envelope {
            subject: &self.subject,
            body: &self.body,
            html_body: self.body_html.as_deref(),
            from: &self.email_from,
            to: &self.email_to,
            cc: self.email_cc.as_deref(),
        }
    }
}

impl Record for OutgoingMail {
    const ENTITY: &'static str = "outgoing mail";

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

/// Owns the lifecycle of outgoing mail records
pub struct MailTracker {
    transport: Arc<dyn MailTransport>,
    default_sender: String,
}

impl MailTracker {
    pub fn new(transport: Arc<dyn MailTransport>, default_sender: &str) -> Self {
        Self {
            transport,
            default_sender: default_sender.to_string(),
        }
    }

    /// New unsent mail from the configured sender
    pub fn compose(
        &self,
        subject: &str,
        email_to: &str,
        body: &str,
        body_html: Option<&str>,
    ) -> OutgoingMail {
        let mail = OutgoingMail::new(subject, &self.default_sender, email_to, body);
        match body_html {
            Some(html) => mail.with_html(html),
            None => mail,
        }
    }

    /// Attempt delivery once and persist the record with its final status.
    ///
    /// A transport failure is not an error here: the record is stored as
    /// `Failed` and returned like any other outcome. Only storage problems
    /// are reported.
    pub fn send_email(
        &self,
        store: &Store,
        mut mail: OutgoingMail,
        actor: Option<UserId>,
    ) -> Result<OutgoingMail, MailError> {
        if mail.id != 0 || mail.status != MailStatus::Outgoing {
            return Err(MailError::InvalidState {
                id: mail.id,
                status: mail.status,
                action: "send",
            });
        }

        // The store is not locked while the transport works
        let failure = match self.transport.send(&mail.envelope()) {
            Ok(()) => {
                mail.status = MailStatus::Sent;
                mail.send_at = Some(now());
                None
            }
            Err(e) => {
                mail.status = MailStatus::Failed;
                Some(e.to_string())
            }
        };

        let mut db = store.lock()?;
        mail.audit = Audit::new(db.attribute(actor));
        let mail = db.insert_mail(mail)?;

        log_mail_event(
            mail.id,
            &mail.email_to,
            &mail.status.to_string(),
            failure.as_deref(),
        );
        Ok(mail)
    }

    /// Reconcile a sent mail with a delivery confirmation
    pub fn mark_received(
        &self,
        store: &Store,
        id: u64,
        actor: Option<UserId>,
    ) -> Result<OutgoingMail, MailError> {
        let mut db = store.lock()?;
        let mut mail = db.mail(id).cloned().ok_or(MailError::NotFound(id))?;
        if mail.status != MailStatus::Sent {
            return Err(MailError::InvalidState {
                id,
                status: mail.status,
                action: "mark as received",
            });
        }

        mail.status = MailStatus::Received;
        let owner = db.attribute(actor);
        let mail = db.update_mail(mail, owner)?;
        log_mail_event(mail.id, &mail.email_to, &mail.status.to_string(), None);
        Ok(mail)
    }
}
