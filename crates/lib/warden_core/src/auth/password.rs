//! Password hashing via bcrypt, and the password policy.

use super::AuthError;

/// bcrypt cost factor.
const BCRYPT_COST: u32 = 10;

const MIN_LENGTH: usize = 8;
const MAX_LENGTH: usize = 64;

/// Hash a password with bcrypt (cost 10).
pub fn hash_password(password: &str) -> Result<String, AuthError> {
    bcrypt::hash(password, BCRYPT_COST)
        .map_err(|e| AuthError::Internal(format!("bcrypt hash: {e}")))
}

/// Verify a password against a bcrypt hash.
pub fn verify_password(password: &str, hash: &str) -> Result<bool, AuthError> {
    bcrypt::verify(password, hash).map_err(|e| AuthError::Internal(format!("bcrypt verify: {e}")))
}

/// 8–64 characters with at least one upper-case letter, one lower-case
/// letter and one digit.
pub fn validate_policy(password: &str) -> Result<(), AuthError> {
    let len = password.chars().count();
    if !(MIN_LENGTH..=MAX_LENGTH).contains(&len) {
        return Err(AuthError::ValidationError(format!(
            "Password must be between {MIN_LENGTH} and {MAX_LENGTH} characters"
        )));
    }
    if !password.chars().any(|c| c.is_uppercase()) {
        return Err(AuthError::ValidationError(
            "Password must contain an upper-case letter".into(),
        ));
    }
    if !password.chars().any(|c| c.is_lowercase()) {
        return Err(AuthError::ValidationError(
            "Password must contain a lower-case letter".into(),
        ));
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Err(AuthError::ValidationError(
            "Password must contain a number".into(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policy_accepts_mixed_case_with_digit() {
        assert!(validate_policy("Sentinel42").is_ok());
    }

    #[test]
    fn policy_rejections() {
        for bad in [
            "Short1",
            "alllowercase1",
            "ALLUPPERCASE1",
            "NoDigitsHere",
            format!("A1{}", "a".repeat(63)).as_str(),
        ] {
            assert!(
                matches!(validate_policy(bad), Err(AuthError::ValidationError(_))),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn hash_then_verify() {
        let hash = hash_password("Sentinel42").unwrap();
        assert!(verify_password("Sentinel42", &hash).unwrap());
        assert!(!verify_password("sentinel42", &hash).unwrap());
    }
}
