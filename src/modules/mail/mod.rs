pub mod credentials;
pub mod outgoing;
pub mod smtp;
pub mod templates;
pub mod transport;

pub use credentials::SmtpPasswordStore;
pub use outgoing::{MailError, MailStatus, MailTracker, OutgoingMail};
pub use smtp::SmtpMailer;
pub use templates::{verification_mail, RenderedMail};
pub use transport::{Envelope, LogTransport, MailTransport, TransportError};
