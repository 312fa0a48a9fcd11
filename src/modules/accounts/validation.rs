use itertools::Itertools;
use std::collections::BTreeMap;
use std::fmt;

use crate::modules::storage::store::{Database, EntityKind};

const MISCONFIGURED: &str = "Something went wrong, please contact the administrator!";

/// Submitted form values by field name
pub type FormData<'a> = BTreeMap<&'static str, &'a str>;

/// Validation messages grouped by the field they belong to
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldErrors {
    errors: BTreeMap<String, Vec<String>>,
}

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(field: &str, message: &str) -> Self {
        let mut errors = Self::new();
        errors.add(field, message);
        errors
    }

    pub fn add(&mut self, field: &str, message: &str) {
        self.errors
            .entry(field.to_string())
            .or_default()
            .push(message.to_string());
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn get(&self, field: &str) -> &[String] {
        self.errors.get(field).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.errors.keys().map(String::as_str)
    }

    /// Record the outcome of a field's rule chain
    fn check(&mut self, field: &str, outcome: Result<(), String>) {
        if let Err(message) = outcome {
            self.add(field, &message);
        }
    }

    pub fn into_result(self) -> Result<(), FieldErrors> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let summary = self
            .errors
            .iter()
            .map(|(field, messages)| format!("{}: {}", field, messages.iter().join(" ")))
            .join("; ");
        f.write_str(&summary)
    }
}

impl std::error::Error for FieldErrors {}

fn is_blank(value: &str) -> bool {
    value.trim().is_empty()
}

pub fn required(value: &str) -> Result<(), String> {
    if is_blank(value) {
        return Err("This field is required.".to_string());
    }
    Ok(())
}

/// Character-count bounds, inclusive
pub fn length(value: &str, min: Option<usize>, max: Option<usize>) -> Result<(), String> {
    let count = value.chars().count();
    match (min, max) {
        (Some(min), Some(max)) if count < min || count > max => Err(format!(
            "Field must be between {} and {} characters long.",
            min, max
        )),
        (Some(min), None) if count < min => {
            Err(format!("Field must be at least {} characters long.", min))
        }
        (None, Some(max)) if count > max => {
            Err(format!("Field cannot be longer than {} characters.", max))
        }
        _ => Ok(()),
    }
}

/// Basic email format check
pub fn is_valid_email(email: &str) -> bool {
    let (local, domain) = match email.split_once('@') {
        Some(parts) => parts,
        None => return false,
    };
    !local.is_empty()
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !email.contains(char::is_whitespace)
        && !domain.contains('@')
        && email.len() >= 5
}

pub fn email(value: &str) -> Result<(), String> {
    if !is_valid_email(value) {
        return Err("Invalid email address.".to_string());
    }
    Ok(())
}

/// Requires a field to hold the same value as another field of the form
pub struct SameValue {
    same_field: &'static str,
    message: Option<String>,
}

impl SameValue {
    pub fn new(same_field: &'static str) -> Self {
        Self {
            same_field,
            message: None,
        }
    }

    pub fn with_message(mut self, message: &str) -> Self {
        self.message = Some(message.to_string());
        self
    }

    pub fn check(&self, form: &FormData<'_>, value: &str) -> Result<(), String> {
        if is_blank(value) {
            return Ok(());
        }
        let other = match form.get(self.same_field) {
            Some(other) => other,
            None => return Err(MISCONFIGURED.to_string()),
        };
        if *other != value {
            return Err(self
                .message
                .clone()
                .unwrap_or_else(|| format!("Value does not match {}!", self.same_field)));
        }
        Ok(())
    }
}

/// Requires a value not yet stored in `field_name` of any `entity` row
pub struct UniqueValue {
    entity: EntityKind,
    field_name: &'static str,
    message: Option<String>,
}

impl UniqueValue {
    pub fn new(entity: EntityKind, field_name: &'static str) -> Self {
        Self {
            entity,
            field_name,
            message: None,
        }
    }

    pub fn with_message(mut self, message: &str) -> Self {
        self.message = Some(message.to_string());
        self
    }

    pub fn check(&self, db: &Database, value: &str) -> Result<(), String> {
        let taken = match db.exists(self.entity, self.field_name, value) {
            Some(taken) => taken,
            None => return Err(MISCONFIGURED.to_string()),
        };
        if taken && !is_blank(value) {
            return Err(self
                .message
                .clone()
                .unwrap_or_else(|| format!("{} already exists!", self.field_name)));
        }
        Ok(())
    }
}

/// Registration form
#[derive(Debug, Clone, Default)]
pub struct SignupForm {
    pub email: String,
    pub name: String,
    pub password: String,
    pub password_confirm: String,
}

impl SignupForm {
    pub fn new(email: &str, name: &str, password: &str, password_confirm: &str) -> Self {
        Self {
            email: email.to_string(),
            name: name.to_string(),
            password: password.to_string(),
            password_confirm: password_confirm.to_string(),
        }
    }

    fn data(&self) -> FormData<'_> {
        let mut data = FormData::new();
        data.insert("email", self.email.as_str());
        data.insert("name", self.name.as_str());
        data.insert("password", self.password.as_str());
        data.insert("password_confirm", self.password_confirm.as_str());
        data
    }

    /// Run every field's rules; the first failing rule of each field is reported
    pub fn validate(&self, db: &Database) -> Result<(), FieldErrors> {
        let data = self.data();
        let unique_email = UniqueValue::new(EntityKind::User, "email")
            .with_message("This email is already registered.");
        let same_password = SameValue::new("password").with_message("Passwords do not match.");
        let mut errors = FieldErrors::new();

        let value = self.email.as_str();
        errors.check(
            "email",
            required(value)
                .and_then(|_| email(value))
                .and_then(|_| length(value, None, Some(128)))
                .and_then(|_| unique_email.check(db, value)),
        );

        let value = self.name.as_str();
        errors.check(
            "name",
            required(value).and_then(|_| length(value, None, Some(100))),
        );

        let value = self.password.as_str();
        errors.check(
            "password",
            required(value).and_then(|_| length(value, Some(6), Some(32))),
        );

        let value = self.password_confirm.as_str();
        errors.check(
            "password_confirm",
            required(value)
                .and_then(|_| length(value, Some(6), Some(32)))
                .and_then(|_| same_password.check(&data, value)),
        );

        errors.into_result()
    }
}

/// Request for a fresh verification mail
#[derive(Debug, Clone, Default)]
pub struct ResendVerifyForm {
    pub email: String,
}

impl ResendVerifyForm {
    pub fn new(email: &str) -> Self {
        Self {
            email: email.to_string(),
        }
    }

    pub fn validate(&self) -> Result<(), FieldErrors> {
        let mut errors = FieldErrors::new();
        let value = self.email.as_str();
        errors.check(
            "email",
            required(value)
                .and_then(|_| email(value))
                .and_then(|_| length(value, None, Some(128))),
        );
        errors.into_result()
    }
}
