mod enums;
mod patient;
mod user;
mod visit;

use serde::{Deserialize, Serialize};

pub use enums::{
    AccessLevel, CareLevel, CareType, Modality, Page, PatientStatus, Role, Sex, VisitStatus,
};
pub use patient::{Address, Patient, PatientInput};
pub use user::{StaffUser, StaffUserInput};
pub use visit::{Visit, VisitInput};

use crate::recycle::RecycleBin;

pub const DB_VERSION: u8 = 1;

/// Label used wherever a grouping key is missing.
pub const NOT_INFORMED: &str = "Não informado";

/// The whole dataset, stored as one encrypted JSON document.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Database {
    pub version: u8,
    pub patients: Vec<Patient>,
    pub users: Vec<StaffUser>,
    pub visits: Vec<Visit>,
    pub recycle: RecycleBin,
}

impl Default for Database {
    fn default() -> Self {
        Self {
            version: DB_VERSION,
            patients: Vec::new(),
            users: Vec::new(),
            visits: Vec::new(),
            recycle: RecycleBin::default(),
        }
    }
}

impl Database {
    pub fn patient(&self, id: &str) -> Option<&Patient> {
        self.patients.iter().find(|p| p.id == id)
    }

    pub fn user(&self, id: &str) -> Option<&StaffUser> {
        self.users.iter().find(|u| u.id == id)
    }

    pub fn visit(&self, id: &str) -> Option<&Visit> {
        self.visits.iter().find(|v| v.id == id)
    }
}

/// Trims and drops empty optional text.
pub(crate) fn clean_optional(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
