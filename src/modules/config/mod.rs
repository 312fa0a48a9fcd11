pub mod settings;

pub use settings::{
    LogSettings, MailSettings, SecuritySettings, Settings, SiteSettings, SmtpSettings,
    StorageSettings,
};
