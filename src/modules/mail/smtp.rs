use lettre::message::header::ContentType;
use lettre::message::{Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::transport::smtp::PoolConfig;
use lettre::{Message, SmtpTransport, Transport};
use std::time::Duration;

use super::credentials::SmtpPasswordStore;
use super::transport::{Envelope, MailTransport, TransportError};
use crate::modules::config::SmtpSettings;

fn parse_mailbox(field: &'static str, value: &str) -> Result<Mailbox, TransportError> {
    value.parse().map_err(|e: lettre::address::AddressError| TransportError::Address {
        field,
        value: value.to_string(),
        reason: e.to_string(),
    })
}

/// Build the MIME message for an envelope; plain text only, or
/// multipart/alternative when an HTML body is present
pub fn build_message(envelope: &Envelope<'_>) -> Result<Message, TransportError> {
    let mut builder = Message::builder()
        .from(parse_mailbox("from", envelope.from)?)
        .to(parse_mailbox("to", envelope.to)?)
        .subject(envelope.subject);

    if let Some(cc) = envelope.cc {
        builder = builder.cc(parse_mailbox("cc", cc)?);
    }

    let message = match envelope.html_body {
        Some(html) => builder.multipart(MultiPart::alternative_plain_html(
            envelope.body.to_string(),
            html.to_string(),
        )),
        None => builder
            .header(ContentType::TEXT_PLAIN)
            .body(envelope.body.to_string()),
    };

    message.map_err(|e| TransportError::Message(e.to_string()))
}

/// Mail transport backed by an authenticated SMTP relay
pub struct SmtpMailer {
    transport: SmtpTransport,
}

impl SmtpMailer {
    /// Set up the relay connection. The password falls back to the system
    /// keyring when the settings do not carry one.
    pub fn from_settings(settings: &SmtpSettings) -> Result<Self, TransportError> {
        let password = match &settings.password {
            Some(password) => password.clone(),
            None => SmtpPasswordStore::new(&settings.username)?.get()?,
        };

        // Implicit TLS for SSL ports, STARTTLS otherwise
        let builder = if settings.use_ssl {
            SmtpTransport::relay(&settings.host)
        } else {
            SmtpTransport::starttls_relay(&settings.host)
        }
        .map_err(|e| TransportError::Delivery(format!("Failed to create SMTP transport: {}", e)))?;

        let transport = builder
            .credentials(Credentials::new(settings.username.clone(), password))
            .port(settings.port)
            .pool_config(PoolConfig::new().max_size(1))
            .timeout(Some(Duration::from_secs(settings.timeout_secs)))
            .build();

        Ok(Self { transport })
    }
}

impl MailTransport for SmtpMailer {
    fn send(&self, envelope: &Envelope<'_>) -> Result<(), TransportError> {
        let message = build_message(envelope)?;
        self.transport
            .send(&message)
            .map(|_| ())
            .map_err(|e| TransportError::Delivery(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope<'a>(to: &'a str, html_body: Option<&'a str>) -> Envelope<'a> {
        Envelope {
            subject: "Account Registration Verification",
            body: "Hi, Cak Juice.",
            html_body,
            from: "noreply@example.com",
            to,
            cc: None,
        }
    }

    fn formatted(message: &Message) -> String {
        String::from_utf8_lossy(&message.formatted()).to_string()
    }

    #[test]
    fn test_plain_message() {
        let message = build_message(&envelope("user@example.com", None)).unwrap();
        let raw = formatted(&message);
        assert!(raw.contains("Subject: Account Registration Verification"));
        assert!(raw.contains("To: user@example.com"));
        assert!(raw.contains("text/plain"));
        assert!(!raw.contains("multipart/alternative"));
    }

    #[test]
    fn test_html_message_is_multipart() {
        let message =
            build_message(&envelope("user@example.com", Some("<p>Hi, Cak Juice</p>"))).unwrap();
        let raw = formatted(&message);
        assert!(raw.contains("multipart/alternative"));
        assert!(raw.contains("text/html"));
    }

    #[test]
    fn test_cc_header() {
        let mut with_cc = envelope("user@example.com", None);
        with_cc.cc = Some("copy@example.com");
        let raw = formatted(&build_message(&with_cc).unwrap());
        assert!(raw.contains("Cc: copy@example.com"));
    }

    #[test]
    fn test_invalid_recipient() {
        let err = build_message(&envelope("not an address", None)).unwrap_err();
        assert!(matches!(err, TransportError::Address { field: "to", .. }));
    }

    #[test]
    fn test_mailer_from_explicit_password() {
        let settings = SmtpSettings {
            host: "smtp.example.com".to_string(),
            port: 465,
            username: "noreply@example.com".to_string(),
            password: Some("app-password".to_string()),
            use_ssl: true,
            timeout_secs: 5,
        };
        assert!(SmtpMailer::from_settings(&settings).is_ok());
    }
}
