use thiserror::Error;

/// Everything a transport needs to deliver one message
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Envelope<'a> {
    pub subject: &'a str,
    pub body: &'a str,
    pub html_body: Option<&'a str>,
    pub from: &'a str,
    pub to: &'a str,
    pub cc: Option<&'a str>,
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Invalid {field} address '{value}': {reason}")]
    Address {
        field: &'static str,
        value: String,
        reason: String,
    },
    #[error("Failed to build message: {0}")]
    Message(String),
    #[error("Mail credentials unavailable: {0}")]
    Credentials(String),
    #[error("Failed to send email: {0}")]
    Delivery(String),
}

/// Synchronous, single-attempt delivery. Timeouts are the transport's job.
pub trait MailTransport: Send + Sync {
    fn send(&self, envelope: &Envelope<'_>) -> Result<(), TransportError>;
}

/// Writes messages to the log instead of delivering them; used when no SMTP
/// relay is configured
pub struct LogTransport;

impl MailTransport for LogTransport {
    fn send(&self, envelope: &Envelope<'_>) -> Result<(), TransportError> {
        log::info!(
            "Mail not delivered (no SMTP relay configured): from={} to={} subject={:?}\n{}",
            envelope.from,
            envelope.to,
            envelope.subject,
            envelope.body
        );
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::mock::RecordingTransport;
    use super::*;

    fn envelope() -> Envelope<'static> {
        Envelope {
            subject: "Hello",
            body: "Plain body",
            html_body: Some("<p>Plain body</p>"),
            from: "noreply@example.com",
            to: "user@example.com",
            cc: None,
        }
    }

    #[test]
    fn test_log_transport_accepts_everything() {
        assert!(LogTransport.send(&envelope()).is_ok());
    }

    #[test]
    fn test_recording_transport() {
        let transport = RecordingTransport::new();
        transport.send(&envelope()).unwrap();
        let attempts = transport.attempts();
        assert_eq!(attempts.len(), 1);
        assert_eq!(attempts[0].to, "user@example.com");
        assert_eq!(attempts[0].html_body.as_deref(), Some("<p>Plain body</p>"));

        let failing = RecordingTransport::failing();
        assert!(matches!(
            failing.send(&envelope()),
            Err(TransportError::Delivery(_))
        ));
        assert_eq!(failing.attempts().len(), 1);
    }
}
