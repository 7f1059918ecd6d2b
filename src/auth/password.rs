use bcrypt::{hash, verify, DEFAULT_COST};

use crate::errors::{AppError, Result};

pub struct PasswordService;

impl PasswordService {
    pub fn hash_password(password: &str) -> Result<String> {
        hash(password, DEFAULT_COST)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to hash password: {}", e)))
    }

    /// A malformed stored hash counts as a mismatch.
    pub fn verify_password(password: &str, hash: &str) -> bool {
        verify(password, hash).unwrap_or(false)
    }

    pub fn validate_password_strength(password: &str) -> Result<()> {
        if password.chars().count() < 8 {
            return Err(AppError::validation("Password must be at least 8 characters long"));
        }

        let has_letter = password.chars().any(|c| c.is_alphabetic());
        let has_digit = password.chars().any(|c| c.is_ascii_digit());

        if !has_letter || !has_digit {
            return Err(AppError::validation(
                "Password must contain at least one letter and one digit",
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_hashing_and_verification() {
        let password = "sukari2024";
        let hash = PasswordService::hash_password(password).unwrap();

        assert!(PasswordService::verify_password(password, &hash));
        assert!(!PasswordService::verify_password("wrong_password1", &hash));
        assert!(!PasswordService::verify_password(password, "not-a-bcrypt-hash"));
    }

    #[test]
    fn test_password_strength_validation() {
        assert!(PasswordService::validate_password_strength("sukari2024").is_ok());
        assert!(PasswordService::validate_password_strength("short1").is_err());
        assert!(PasswordService::validate_password_strength("onlyletters").is_err());
        assert!(PasswordService::validate_password_strength("12345678").is_err());
    }
}
