pub mod lifecycle;
pub mod password;
pub mod user;
pub mod validation;

// Re-export the main types and functions
pub use lifecycle::{AccountError, AccountService, RequestContext, SetupError};
pub use password::{HashError, PasswordHasher, Pbkdf2Hasher};
pub use user::{InvalidTransition, User, UserStatus};
pub use validation::{FieldErrors, ResendVerifyForm, SameValue, SignupForm, UniqueValue};
