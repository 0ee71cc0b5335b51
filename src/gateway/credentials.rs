//! Password hashing and user-credential persistence. bcrypt cost 12,
//! matching the original deployment's tuning; password-strength and
//! user_id-safety rules are enforced here rather than at the model layer so
//! creation/update can report a specific reason back to the caller.

use mongodb::bson::doc;
use tracing::warn;

use crate::db::Db;
use crate::models::{LlmQuota, Role, User, UserProfile};

const BCRYPT_COST: u32 = 12;

pub fn validate_user_id_safety(user_id: &str) -> Result<(), &'static str> {
    if user_id.contains("..") || user_id.contains('/') || user_id.contains('\\') {
        return Err("user_id contains invalid path characters");
    }
    if user_id.is_empty() || !user_id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
        return Err("user_id must contain only alphanumeric characters, underscores, or hyphens");
    }
    Ok(())
}

pub fn validate_password_strength(password: &str) -> Result<(), &'static str> {
    if password.len() < 8 {
        return Err("password must be at least 8 characters long");
    }
    if !password.chars().any(|c| c.is_ascii_uppercase()) {
        return Err("password must contain at least one uppercase letter");
    }
    if !password.chars().any(|c| c.is_ascii_lowercase()) {
        return Err("password must contain at least one lowercase letter");
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Err("password must contain at least one digit");
    }
    if !password.chars().any(|c| "!@#$%^&*()_+-=[]{};':\"\\|,.<>/?`~".contains(c)) {
        return Err("password must contain at least one special character/symbol");
    }
    Ok(())
}

pub struct CredentialsService {
    db: Db,
}

impl CredentialsService {
    pub fn new(db: Db) -> Self {
        CredentialsService { db }
    }

    pub async fn get_credentials(&self, user_id: &str) -> Option<User> {
        self.db.user_auth_credentials.find_one(doc! {"user_id": user_id}).await.ok().flatten()
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn create_credentials(&self, user_id: &str, password: &str, role: Role, max_bots: u32, max_enabled_features: u32, quota_dollars_per_period: f64, profile: UserProfile) -> Result<(), String> {
        validate_user_id_safety(user_id).map_err(|e| e.to_string())?;
        validate_password_strength(password).map_err(|e| e.to_string())?;

        if self.get_credentials(user_id).await.is_some() {
            return Err(format!("user '{user_id}' already exists"));
        }

        let password_hash = bcrypt::hash(password, BCRYPT_COST).map_err(|e| e.to_string())?;
        let user = User {
            user_id: user_id.to_string(),
            password_hash,
            role,
            owned_bots: Vec::new(),
            max_bots,
            max_enabled_features,
            llm_quota: LlmQuota { dollars_per_period: quota_dollars_per_period, dollars_used: 0.0, last_reset: chrono::Utc::now(), reset_days: 7, enabled: true },
            profile,
        };

        self.db.user_auth_credentials.insert_one(&user).await.map_err(|e| e.to_string())?;
        Ok(())
    }

    /// Generic merge-update for admin CRUD: callers build the `$set`
    /// document themselves (role/limits/profile/quota fields), matching
    /// the original's `auth_service.update_credentials(user_id, **update_data)`
    /// kwargs-merge shape.
    pub async fn update_fields(&self, user_id: &str, patch: mongodb::bson::Document) -> Result<(), String> {
        if self.get_credentials(user_id).await.is_none() {
            return Err(format!("user '{user_id}' not found"));
        }
        self.db
            .user_auth_credentials
            .update_one(doc! {"user_id": user_id}, doc! {"$set": patch})
            .await
            .map_err(|e| e.to_string())?;
        Ok(())
    }

    pub async fn update_password(&self, user_id: &str, new_password: &str) -> Result<(), String> {
        validate_password_strength(new_password).map_err(|e| e.to_string())?;
        if self.get_credentials(user_id).await.is_none() {
            return Err(format!("user '{user_id}' not found"));
        }
        let password_hash = bcrypt::hash(new_password, BCRYPT_COST).map_err(|e| e.to_string())?;
        self.db
            .user_auth_credentials
            .update_one(doc! {"user_id": user_id}, doc! {"$set": {"password_hash": password_hash}})
            .await
            .map_err(|e| e.to_string())?;
        Ok(())
    }

    pub async fn delete_credentials(&self, user_id: &str) -> bool {
        matches!(self.db.user_auth_credentials.delete_one(doc! {"user_id": user_id}).await, Ok(r) if r.deleted_count > 0)
    }

    /// Returns the authenticated `User` on a password match, `None` on any
    /// mismatch (unknown user_id and wrong password look identical to the
    /// caller, same as the original).
    pub async fn authenticate(&self, user_id: &str, password: &str) -> Option<User> {
        let user = self.get_credentials(user_id).await?;
        match bcrypt::verify(password, &user.password_hash) {
            Ok(true) => Some(user),
            Ok(false) => None,
            Err(e) => {
                warn!(user_id, "bcrypt verification error: {e}");
                None
            }
        }
    }

    pub async fn add_owned_configuration(&self, user_id: &str, config_id: &str) -> bool {
        matches!(
            self.db
                .user_auth_credentials
                .update_one(doc! {"user_id": user_id}, doc! {"$addToSet": {"owned_bots": config_id}})
                .await,
            Ok(r) if r.modified_count > 0 || r.matched_count > 0
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_short_passwords() {
        assert!(validate_password_strength("Ab1!").is_err());
    }

    #[test]
    fn accepts_strong_password() {
        assert!(validate_password_strength("Str0ng!Pass").is_ok());
    }

    #[test]
    fn rejects_path_traversal_user_ids() {
        assert!(validate_user_id_safety("../etc").is_err());
    }
}
