//! User account entity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Account role. Exactly one superuser may act on other owners' links.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserRole {
    Superuser,
    Creator,
    User,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Superuser => "SUPERUSER",
            Self::Creator => "CREATOR",
            Self::User => "USER",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_uppercase().as_str() {
            "SUPERUSER" => Some(Self::Superuser),
            "CREATOR" => Some(Self::Creator),
            "USER" => Some(Self::User),
            _ => None,
        }
    }
}

/// An account that owns links.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub uid: String,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub role: UserRole,
    pub created_at: DateTime<Utc>,
    pub active: bool,
}

/// Input for registering or updating an account.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password: String,
    pub role: UserRole,
}

impl NewUser {
    /// Derives the stable uid for this account from its name.
    pub fn uid(&self) -> String {
        hash_secret(&self.name)[..16].to_string()
    }

    /// Turns the input into a stored user, hashing the password.
    pub fn into_user(self) -> User {
        User {
            uid: self.uid(),
            password_hash: hash_secret(&self.password),
            name: self.name,
            email: self.email,
            role: self.role,
            created_at: Utc::now(),
            active: true,
        }
    }
}

/// SHA-256 hex digest used for passwords and uid derivation.
pub fn hash_secret(value: &str) -> String {
    hex::encode(Sha256::digest(value.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_user(name: &str) -> NewUser {
        NewUser {
            name: name.to_string(),
            email: format!("{}@example.com", name),
            password: "secret".to_string(),
            role: UserRole::User,
        }
    }

    #[test]
    fn test_uid_is_stable_per_name() {
        assert_eq!(new_user("alice").uid(), new_user("alice").uid());
        assert_ne!(new_user("alice").uid(), new_user("bob").uid());
        assert_eq!(new_user("alice").uid().len(), 16);
    }

    #[test]
    fn test_into_user_hashes_password() {
        let user = new_user("alice").into_user();

        assert_ne!(user.password_hash, "secret");
        assert_eq!(user.password_hash, hash_secret("secret"));
        assert!(user.active);
    }

    #[test]
    fn test_role_round_trip() {
        for role in [UserRole::Superuser, UserRole::Creator, UserRole::User] {
            assert_eq!(UserRole::parse(role.as_str()), Some(role));
        }
        assert_eq!(UserRole::parse("superuser"), Some(UserRole::Superuser));
        assert_eq!(UserRole::parse("root"), None);
    }
}
