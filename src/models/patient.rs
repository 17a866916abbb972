use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::{CareLevel, CareType, PatientStatus, Sex};

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct Address {
    pub street: Option<String>,
    pub number: Option<String>,
    pub district: Option<String>,
    pub city: Option<String>,
    pub zip: Option<String>,
}

impl Address {
    pub fn is_empty(&self) -> bool {
        [
            &self.street,
            &self.number,
            &self.district,
            &self.city,
            &self.zip,
        ]
        .iter()
        .all(|part| part.as_deref().map_or(true, |v| v.trim().is_empty()))
    }

    /// Single line as printed on the patient card.
    pub fn one_line(&self) -> String {
        let street = match (&self.street, &self.number) {
            (Some(street), Some(number)) => format!("{street}, {number}"),
            (Some(street), None) => street.clone(),
            (None, Some(number)) => number.clone(),
            (None, None) => String::new(),
        };
        [Some(street), self.district.clone(), self.city.clone(), self.zip.clone()]
            .into_iter()
            .flatten()
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" - ")
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Patient {
    pub id: String,
    #[serde(default)]
    pub cns: Option<String>,
    #[serde(default)]
    pub cpf: Option<String>,
    pub full_name: String,
    pub birth_date: NaiveDate,
    pub sex: Sex,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub address: Option<Address>,
    #[serde(default)]
    pub care_level: Option<CareLevel>,
    #[serde(default)]
    pub status: PatientStatus,
    #[serde(default)]
    pub care_types: Vec<CareType>,
    pub admitted_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Patient {
    /// Age in whole years on `today`.
    pub fn age_on(&self, today: NaiveDate) -> u32 {
        today.years_since(self.birth_date).unwrap_or(0)
    }

    pub fn is_active(&self) -> bool {
        self.status == PatientStatus::Active
    }
}

/// Form payload for creating or editing a patient.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PatientInput {
    #[serde(default)]
    pub cns: Option<String>,
    #[serde(default)]
    pub cpf: Option<String>,
    pub full_name: String,
    pub birth_date: NaiveDate,
    pub sex: Sex,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub address: Option<Address>,
    #[serde(default)]
    pub care_level: Option<CareLevel>,
    #[serde(default)]
    pub status: Option<PatientStatus>,
    #[serde(default)]
    pub care_types: Vec<CareType>,
}

impl PatientInput {
    pub fn new(full_name: &str, birth_date: NaiveDate, sex: Sex) -> Self {
        Self {
            cns: None,
            cpf: None,
            full_name: full_name.to_string(),
            birth_date,
            sex,
            phone: None,
            address: None,
            care_level: None,
            status: None,
            care_types: Vec::new(),
        }
    }

    pub fn with_cpf(mut self, cpf: &str) -> Self {
        self.cpf = Some(cpf.to_string());
        self
    }

    pub fn with_cns(mut self, cns: &str) -> Self {
        self.cns = Some(cns.to_string());
        self
    }

    pub fn with_care_level(mut self, level: CareLevel) -> Self {
        self.care_level = Some(level);
        self
    }

    pub fn with_status(mut self, status: PatientStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_care_types(mut self, care_types: &[CareType]) -> Self {
        self.care_types = care_types.to_vec();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_line_skips_missing_parts() {
        let address = Address {
            street: Some("Rua das Flores".into()),
            number: Some("12".into()),
            city: Some("Joinville".into()),
            ..Address::default()
        };
        assert_eq!(address.one_line(), "Rua das Flores, 12 - Joinville");
        assert!(Address::default().is_empty());
    }

    #[test]
    fn patient_document_uses_camel_case_keys() {
        let raw = r#"{
            "id": "p1",
            "fullName": "MARIA",
            "birthDate": "1950-03-10",
            "sex": "Feminino",
            "status": "Ativo",
            "careTypes": ["Curativo"],
            "admittedAt": "2024-01-01T10:00:00Z",
            "updatedAt": "2024-01-01T10:00:00Z"
        }"#;
        let patient: Patient = serde_json::from_str(raw).unwrap();
        assert_eq!(patient.care_types, vec![CareType::WoundCare]);
        assert_eq!(patient.care_level, None);
        assert_eq!(
            patient.age_on(NaiveDate::from_ymd_opt(2025, 3, 9).unwrap()),
            74
        );
    }
}
