//! The signed-in user.

use serde::{Deserialize, Serialize};

/// Identity every shared-dictionary operation acts as.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentUser {
    pub email: String,
    pub display_name: String,
}

impl CurrentUser {
    pub fn new(email: &str, display_name: impl Into<String>) -> Self {
        Self {
            email: normalize_email(email),
            display_name: display_name.into(),
        }
    }
}

/// Emails are map keys on shared words, so they are compared in one canonical form.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}
