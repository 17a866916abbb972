use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{CareLevel, Modality, VisitStatus};

/// Atendimento: one care encounter. Patient and provider names are
/// denormalised so the dashboard can group without joins.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Visit {
    pub id: String,
    pub patient_id: String,
    #[serde(default)]
    pub patient_name: String,
    pub provider_id: String,
    #[serde(default)]
    pub provider_name: String,
    pub modality: Modality,
    #[serde(default)]
    pub care_level: Option<CareLevel>,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub status: VisitStatus,
    #[serde(default)]
    pub notes: Option<String>,
}

impl Visit {
    /// Whole minutes between start and end, when both are known.
    pub fn duration_minutes(&self) -> Option<i64> {
        self.ended_at
            .map(|end| (end - self.started_at).num_minutes())
    }

    pub fn is_completed(&self) -> bool {
        self.status == VisitStatus::Completed
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VisitInput {
    pub patient_id: String,
    pub provider_id: String,
    pub modality: Modality,
    #[serde(default)]
    pub care_level: Option<CareLevel>,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub status: Option<VisitStatus>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl VisitInput {
    pub fn new(
        patient_id: &str,
        provider_id: &str,
        modality: Modality,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            patient_id: patient_id.to_string(),
            provider_id: provider_id.to_string(),
            modality,
            care_level: None,
            started_at,
            ended_at: None,
            status: None,
            notes: None,
        }
    }

    pub fn ended_at(mut self, ended_at: DateTime<Utc>) -> Self {
        self.ended_at = Some(ended_at);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn duration_is_whole_minutes() {
        let start = Utc.with_ymd_and_hms(2025, 3, 3, 9, 0, 0).unwrap();
        let visit = Visit {
            id: "v1".into(),
            patient_id: "p1".into(),
            patient_name: "A".into(),
            provider_id: "u1".into(),
            provider_name: "B".into(),
            modality: Modality::Scheduled,
            care_level: None,
            started_at: start,
            ended_at: Some(start + chrono::Duration::seconds(45 * 60 + 59)),
            status: VisitStatus::Completed,
            notes: None,
        };
        assert_eq!(visit.duration_minutes(), Some(45));
        assert!(visit.is_completed());
    }
}
