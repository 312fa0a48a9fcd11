use rand::distributions::Alphanumeric;
use rand::rngs::OsRng;
use rand::Rng;

/// Length of the code mailed out for email verification
pub const VERIFY_CODE_LENGTH: usize = 32;

/// Generate a random string drawn uniformly from `A-Z`, `a-z` and `0-9`.
///
/// Backed by the operating system's CSPRNG so the result can be used as a
/// bearer token.
pub fn generate_random_string(length: usize) -> String {
    OsRng
        .sample_iter(&Alphanumeric)
        .take(length)
        .map(char::from)
        .collect()
}

/// Fresh verification code for a user
pub fn generate_verify_code() -> String {
    generate_random_string(VERIFY_CODE_LENGTH)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_string_length_and_alphabet() {
        for length in [0, 1, 8, 32, 100] {
            let value = generate_random_string(length);
            assert_eq!(value.len(), length);
            assert!(value.chars().all(|c| c.is_ascii_alphanumeric()));
        }
    }

    #[test]
    fn test_verify_codes_differ() {
        let first = generate_verify_code();
        let second = generate_verify_code();
        assert_eq!(first.len(), VERIFY_CODE_LENGTH);
        // 62^32 possibilities, a collision here means the source is broken
        assert_ne!(first, second);
    }
}
