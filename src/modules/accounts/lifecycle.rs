use std::sync::Arc;
use thiserror::Error;

use super::password::{HashError, PasswordHasher, Pbkdf2Hasher};
use super::user::{InvalidTransition, User, UserStatus};
use super::validation::{FieldErrors, ResendVerifyForm, SignupForm};
use crate::modules::config::Settings;
use crate::modules::mail::outgoing::{MailError, MailTracker, OutgoingMail};
use crate::modules::mail::smtp::SmtpMailer;
use crate::modules::mail::templates::verification_mail;
use crate::modules::mail::transport::{LogTransport, MailTransport, TransportError};
use crate::modules::storage::audit::UserId;
use crate::modules::storage::store::{Database, EntityKind, StorageError, Store};
use crate::modules::utils::logging::log_auth_event;
use crate::modules::utils::slug::{generate_slug, slugify};
use crate::modules::utils::time::now;
use crate::modules::utils::urls::{BaseUrlBuilder, UrlBuilder};

#[derive(Debug, Error)]
pub enum AccountError {
    #[error("{0}")]
    Validation(FieldErrors),
    #[error("Invalid email or password")]
    AuthFailure,
    #[error("You are not permitted to do this")]
    NotPermitted,
    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),
    #[error(transparent)]
    Mail(#[from] MailError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Hasher(#[from] HashError),
}

impl From<FieldErrors> for AccountError {
    fn from(errors: FieldErrors) -> Self {
        AccountError::Validation(errors)
    }
}

/// Who is performing the current request
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RequestContext {
    pub current_user: Option<UserId>,
}

impl RequestContext {
    pub fn anonymous() -> Self {
        Self { current_user: None }
    }

    pub fn as_user(id: UserId) -> Self {
        Self {
            current_user: Some(id),
        }
    }
}

#[derive(Debug, Error)]
pub enum SetupError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Hasher(#[from] HashError),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Registration, verification and login over a shared store
pub struct AccountService {
    store: Store,
    hasher: Box<dyn PasswordHasher>,
    mailer: MailTracker,
    urls: Box<dyn UrlBuilder>,
}

impl AccountService {
    pub fn new(
        store: Store,
        hasher: Box<dyn PasswordHasher>,
        mailer: MailTracker,
        urls: Box<dyn UrlBuilder>,
    ) -> Self {
        Self {
            store,
            hasher,
            mailer,
            urls,
        }
    }

    /// Wire up the service from configuration: file or in-memory store,
    /// PBKDF2 hasher, SMTP relay when configured and the log transport
    /// otherwise
    pub fn from_settings(settings: &Settings) -> Result<Self, SetupError> {
        let store = match &settings.storage.path {
            Some(path) => Store::open(path)?,
            None => Store::in_memory(),
        };
        let hasher = Pbkdf2Hasher::new(settings.security.password_iterations)?;
        let transport: Arc<dyn MailTransport> = match &settings.mail.smtp {
            Some(smtp) => Arc::new(SmtpMailer::from_settings(smtp)?),
            None => {
                log::warn!("No SMTP relay configured, outgoing mail will only be logged");
                Arc::new(LogTransport)
            }
        };

        Ok(Self::new(
            store,
            Box::new(hasher),
            MailTracker::new(transport, &settings.mail.default_sender),
            Box::new(BaseUrlBuilder::new(&settings.site.base_url)),
        ))
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn mailer(&self) -> &MailTracker {
        &self.mailer
    }

    /// Create an account.
    ///
    /// The first account ever created becomes the admin and is active right
    /// away; everyone else starts inactive and is mailed a verification link.
    /// A failed verification mail does not fail the registration.
    pub fn register(&self, ctx: &RequestContext, form: &SignupForm) -> Result<User, AccountError> {
        if let Err(errors) = form.validate(&*self.store.lock()?) {
            log_auth_event("register", &form.email, false, Some("validation failed"));
            return Err(errors.into());
        }

        // Hashing is slow, keep it outside the lock
        let password_hash = self.hasher.hash(&form.password)?;

        let user = {
            let mut db = self.store.lock()?;
            let slug = generate_slug(&*db, EntityKind::User, &form.name)
                .unwrap_or_else(|| slugify(&form.name));
            let is_admin = !db.has_admin();
            let user = User::new(
                &form.email,
                &form.name,
                slug,
                password_hash,
                is_admin,
                db.attribute(ctx.current_user),
            );
            insert_new_user(&mut db, user)?
        };

        log_auth_event(
            "register",
            &user.email,
            true,
            Some(if user.is_admin { "admin" } else { "pending verification" }),
        );

        if !user.is_admin {
            self.send_verification_mail(ctx, &user)?;
        }
        Ok(user)
    }

    /// Log in with email and password. Every failure looks the same to the
    /// caller.
    pub fn authenticate(&self, email: &str, password: &str) -> Result<User, AccountError> {
        let candidate = self
            .store
            .lock()?
            .user_by_email(email)
            .filter(|user| user.is_active())
            .cloned();

        let user = match candidate {
            Some(user) if self.hasher.verify(&user.password_hash, password) => user,
            _ => {
                log_auth_event("login", email, false, None);
                return Err(AccountError::AuthFailure);
            }
        };

        // Re-read under the lock: the account may have changed while the
        // hash was being checked
        let user = {
            let mut db = self.store.lock()?;
            let mut current = match db.user(user.id) {
                Some(current) if current.is_active() => current.clone(),
                _ => {
                    log_auth_event("login", email, false, Some("account changed"));
                    return Err(AccountError::AuthFailure);
                }
            };
            current.last_request_at = Some(now());
            let user_id = current.id;
            db.update_user(current, Some(user_id))?
        };

        log_auth_event("login", email, true, None);
        Ok(user)
    }

    /// Activate the pending account holding `code`
    pub fn verify_by_code(&self, ctx: &RequestContext, code: &str) -> Result<User, AccountError> {
        let mut db = self.store.lock()?;
        let user = db
            .find_user(|user| user.status == UserStatus::NotActive && user.verify_code == code)
            .cloned();

        match user {
            Some(user) => {
                let user = self.set_verified(&mut db, ctx, user)?;
                log_auth_event("verify", &user.email, true, None);
                Ok(user)
            }
            None => {
                log::warn!("Verification attempted with an unknown or used code");
                Err(AccountError::NotPermitted)
            }
        }
    }

    /// Mark the user active. The code is rotated so the mailed link is dead
    /// once used.
    fn set_verified(
        &self,
        db: &mut Database,
        ctx: &RequestContext,
        mut user: User,
    ) -> Result<User, AccountError> {
        user.transition_to(UserStatus::Active)?;
        user.rotate_verify_code();
        let actor = ctx.current_user.or(Some(user.id));
        Ok(db.update_user(user, actor)?)
    }

    /// Issue a new verification code and mail it to a pending account
    pub fn resend_verification(
        &self,
        ctx: &RequestContext,
        form: &ResendVerifyForm,
    ) -> Result<User, AccountError> {
        form.validate()?;

        let user = {
            let mut db = self.store.lock()?;
            let mut user = match db.user_by_email(&form.email) {
                Some(user) => user.clone(),
                None => {
                    return Err(FieldErrors::single(
                        "email",
                        "No account is registered with this email.",
                    )
                    .into())
                }
            };

            match user.status {
                UserStatus::NotActive => {}
                UserStatus::Active => {
                    return Err(
                        FieldErrors::single("email", "This account is already verified.").into(),
                    )
                }
                UserStatus::Deleted => {
                    return Err(
                        FieldErrors::single("email", "This account has been deleted.").into(),
                    )
                }
            }

            user.rotate_verify_code();
            let actor = db.attribute(ctx.current_user);
            db.update_user(user, actor)?
        };

        log_auth_event("resend_verification", &user.email, true, None);
        self.send_verification_mail(ctx, &user)?;
        Ok(user)
    }

    /// Mail the user a link carrying their current verification code.
    ///
    /// Blocks until the transport gives up; the returned record tells whether
    /// the mail went out.
    pub fn send_verification_mail(
        &self,
        ctx: &RequestContext,
        user: &User,
    ) -> Result<OutgoingMail, AccountError> {
        let link = self.urls.build_verification_url(&user.verify_code);
        let rendered = verification_mail(&user.name, &link);
        let mail = self.mailer.compose(
            &rendered.subject,
            &user.email,
            &rendered.body,
            Some(&rendered.body_html),
        );
        Ok(self.mailer.send_email(&self.store, mail, ctx.current_user)?)
    }

    /// Session user loader
    pub fn get_user(&self, id: UserId) -> Result<Option<User>, AccountError> {
        Ok(self.store.lock()?.user(id).cloned())
    }

    pub fn users(&self) -> Result<Vec<User>, AccountError> {
        Ok(self.store.lock()?.users().cloned().collect())
    }

    pub fn outgoing_mails(&self) -> Result<Vec<OutgoingMail>, AccountError> {
        Ok(self.store.lock()?.mails().cloned().collect())
    }
}

/// Insert, turning a lost race on the email index into the same field error
/// the form check would have produced
fn insert_new_user(db: &mut Database, user: User) -> Result<User, AccountError> {
    match db.insert_user(user) {
        Ok(user) => Ok(user),
        Err(StorageError::UniqueViolation { field: "email", .. }) => Err(FieldErrors::single(
            "email",
            "This email is already registered.",
        )
        .into()),
        Err(e) => Err(e.into()),
    }
}
