use keyring::Entry;

use super::transport::TransportError;

const KEYRING_SERVICE: &str = "usergate";

/// Keyring user for the password of one SMTP account
fn keyring_user(username: &str) -> String {
    format!("smtp:{}", username)
}

/// SMTP password kept in the system keyring instead of the settings file
pub struct SmtpPasswordStore {
    keyring: Entry,
}

impl SmtpPasswordStore {
    pub fn new(username: &str) -> Result<Self, TransportError> {
        let keyring = Entry::new(KEYRING_SERVICE, &keyring_user(username))
            .map_err(|e| TransportError::Credentials(format!("Failed to open keyring: {}", e)))?;
        Ok(Self { keyring })
    }

    pub fn store(&self, password: &str) -> Result<(), TransportError> {
        self.keyring
            .set_password(password)
            .map_err(|e| TransportError::Credentials(format!("Failed to store password: {}", e)))
    }

    pub fn get(&self) -> Result<String, TransportError> {
        self.keyring.get_password().map_err(|e| {
            TransportError::Credentials(format!("Failed to retrieve password: {}", e))
        })
    }

    pub fn delete(&self) -> Result<(), TransportError> {
        self.keyring
            .delete_password()
            .map_err(|e| TransportError::Credentials(format!("Failed to delete password: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyring_user_per_smtp_account() {
        assert_eq!(keyring_user("mailer@example.com"), "smtp:mailer@example.com");
        assert_ne!(keyring_user("a"), keyring_user("b"));
    }
}
