use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{AccessLevel, Page, Role};
use crate::crypto::Credential;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StaffUser {
    pub id: String,
    /// Matrícula, digits only.
    pub registration: String,
    pub full_name: String,
    pub role: Role,
    pub username: String,
    #[serde(default)]
    pub access: AccessLevel,
    #[serde(default)]
    pub pages: Vec<Page>,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<Credential>,
    pub created_at: DateTime<Utc>,
}

impl StaffUser {
    pub fn is_admin(&self) -> bool {
        self.access == AccessLevel::Admin
    }

    /// Copy safe to hand to the frontend.
    pub fn public(&self) -> StaffUser {
        StaffUser {
            credential: None,
            ..self.clone()
        }
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StaffUserInput {
    pub registration: String,
    pub full_name: String,
    pub role: Role,
    pub username: String,
    #[serde(default)]
    pub access: AccessLevel,
    #[serde(default)]
    pub pages: Vec<Page>,
}

impl StaffUserInput {
    pub fn new(registration: &str, full_name: &str, role: Role, username: &str) -> Self {
        Self {
            registration: registration.to_string(),
            full_name: full_name.to_string(),
            role,
            username: username.to_string(),
            access: AccessLevel::Standard,
            pages: Vec::new(),
        }
    }

    pub fn admin(mut self) -> Self {
        self.access = AccessLevel::Admin;
        self
    }

    pub fn with_pages(mut self, pages: &[Page]) -> Self {
        self.pages = pages.to_vec();
        self
    }
}
