// First, declare the modules folder itself
mod modules;

// Re-export everything from modules for easier access
pub use modules::{accounts, config, mail, storage, utils};

// Re-export commonly used types
pub use modules::accounts::lifecycle::{AccountError, AccountService, RequestContext};
pub use modules::accounts::user::{User, UserStatus};
pub use modules::config::Settings;
pub use modules::mail::outgoing::{MailStatus, MailTracker, OutgoingMail};
pub use modules::storage::store::Store;

// Constants
pub const SETTINGS_FILE: &str = "usergate.json";
pub const DEFAULT_PASSWORD_ITERATIONS: u32 = 100_000;

// Type aliases
pub type HmacSha256 = hmac::Hmac<sha2::Sha256>;
