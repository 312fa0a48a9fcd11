pub mod logging;
pub mod random;
pub mod slug;
pub mod time;
pub mod urls;

pub use random::{generate_random_string, generate_verify_code, VERIFY_CODE_LENGTH};
pub use slug::{generate_slug, slugify};
pub use urls::{BaseUrlBuilder, UrlBuilder};
