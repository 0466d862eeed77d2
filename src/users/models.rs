use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_LANGUAGE: &str = "uz";

/// A chat user who has pressed /start at least once
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub telegram_id: i64,
    pub username: Option<String>,
    pub first_name: Option<String>,
    #[serde(default = "default_language")]
    pub language_code: String,
    pub phone_number: Option<String>,
    pub email: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn default_language() -> String {
    DEFAULT_LANGUAGE.to_string()
}

impl UserProfile {
    pub fn new(telegram_id: i64, username: Option<String>, first_name: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            telegram_id,
            username,
            first_name,
            language_code: default_language(),
            phone_number: None,
            email: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply the fields set in `update` and bump `updated_at`
    pub fn apply(&mut self, update: ProfileUpdate) {
        let ProfileUpdate {
            username,
            first_name,
            language_code,
            phone_number,
            email,
        } = update;

        if username.is_some() {
            self.username = username;
        }
        if first_name.is_some() {
            self.first_name = first_name;
        }
        if let Some(code) = language_code {
            self.language_code = code;
        }
        if phone_number.is_some() {
            self.phone_number = phone_number;
        }
        if email.is_some() {
            self.email = email;
        }
        self.updated_at = Utc::now();
    }
}

/// Partial profile; `None` leaves a field untouched
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileUpdate {
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub language_code: Option<String>,
    pub phone_number: Option<String>,
    pub email: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_profile_defaults() {
        let profile = UserProfile::new(42, Some("ali".into()), None);
        assert_eq!(profile.language_code, "uz");
        assert_eq!(profile.created_at, profile.updated_at);
    }

    #[test]
    fn test_apply_only_touches_set_fields() {
        let mut profile = UserProfile::new(42, Some("ali".into()), Some("Ali".into()));
        profile.apply(ProfileUpdate {
            first_name: Some("Alisher".into()),
            ..Default::default()
        });

        assert_eq!(profile.username.as_deref(), Some("ali"));
        assert_eq!(profile.first_name.as_deref(), Some("Alisher"));
        assert!(profile.updated_at >= profile.created_at);
    }
}
