//! Deleted records are parked here so a deletion can be undone.

use chrono::{DateTime, Utc};
use log::info;
use serde::{Deserialize, Serialize};

use crate::crypto::new_id;
use crate::error::{EmadError, EmadResult};
use crate::models::{Database, Patient, StaffUser, Visit};
use crate::{patients, users};

pub const RECYCLE_LIMIT: usize = 50;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    Patient,
    User,
    Visit,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RecycleItem {
    pub id: String,
    pub kind: RecordKind,
    pub record_id: String,
    pub label: String,
    pub deleted_at: DateTime<Utc>,
    pub payload: serde_json::Value,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct RecycleBin {
    pub items: Vec<RecycleItem>,
}

impl RecycleBin {
    fn push(&mut self, item: RecycleItem) -> String {
        let id = item.id.clone();
        self.items.push(item);
        if self.items.len() > RECYCLE_LIMIT {
            let overflow = self.items.len() - RECYCLE_LIMIT;
            self.items.drain(..overflow);
        }
        id
    }

    fn pop(&mut self, id: &str) -> Option<RecycleItem> {
        let idx = self.items.iter().position(|item| item.id == id)?;
        Some(self.items.remove(idx))
    }
}

fn park<T: Serialize>(
    db: &mut Database,
    kind: RecordKind,
    record_id: &str,
    label: &str,
    record: &T,
) -> EmadResult<String> {
    let payload = serde_json::to_value(record)?;
    let id = db.recycle.push(RecycleItem {
        id: new_id("lix"),
        kind,
        record_id: record_id.to_string(),
        label: label.to_string(),
        deleted_at: Utc::now(),
        payload,
    });
    Ok(id)
}

pub(crate) fn park_patient(db: &mut Database, patient: &Patient) -> EmadResult<String> {
    park(
        db,
        RecordKind::Patient,
        patient.id.as_str(),
        patient.full_name.as_str(),
        patient,
    )
}

pub(crate) fn park_user(db: &mut Database, user: &StaffUser) -> EmadResult<String> {
    park(
        db,
        RecordKind::User,
        user.id.as_str(),
        user.full_name.as_str(),
        user,
    )
}

pub(crate) fn park_visit(db: &mut Database, visit: &Visit) -> EmadResult<String> {
    let label = format!(
        "{} - {}",
        visit.patient_name,
        visit.started_at.format("%d/%m/%Y %H:%M")
    );
    park(
        db,
        RecordKind::Visit,
        visit.id.as_str(),
        label.as_str(),
        visit,
    )
}

fn restore(db: &mut Database, item: &RecycleItem) -> EmadResult<()> {
    let record_id = item.record_id.as_str();
    let clash = match item.kind {
        RecordKind::Patient => db.patient(record_id).is_some(),
        RecordKind::User => db.user(record_id).is_some(),
        RecordKind::Visit => db.visit(record_id).is_some(),
    };
    if clash {
        return Err(EmadError::Conflict(format!(
            "Registro {record_id} já existe; não é possível restaurar."
        )));
    }

    match item.kind {
        RecordKind::Patient => {
            let patient: Patient = serde_json::from_value(item.payload.clone())?;
            patients::ensure_unique_documents(db, &patient.cpf, &patient.cns, None)?;
            db.patients.push(patient);
        }
        RecordKind::User => {
            let user: StaffUser = serde_json::from_value(item.payload.clone())?;
            users::ensure_unique(db, user.registration.as_str(), user.username.as_str(), None)?;
            db.users.push(user);
        }
        RecordKind::Visit => {
            let visit: Visit = serde_json::from_value(item.payload.clone())?;
            if db.patient(visit.patient_id.as_str()).is_none() {
                return Err(EmadError::Conflict(format!(
                    "Paciente {} não existe mais; restaure-o antes do atendimento.",
                    visit.patient_id
                )));
            }
            if db.user(visit.provider_id.as_str()).is_none() {
                return Err(EmadError::Conflict(format!(
                    "Profissional {} não existe mais; restaure-o antes do atendimento.",
                    visit.provider_id
                )));
            }
            db.visits.push(visit);
        }
    }
    Ok(())
}

/// Restores a parked record and returns its id. The item stays in the bin
/// when the record would clash with current data: same id, a taken
/// CPF/CNS, matrícula or username, or a visit whose patient or provider is
/// gone.
pub fn undo(db: &mut Database, item_id: &str) -> EmadResult<String> {
    let item = db
        .recycle
        .pop(item_id)
        .ok_or_else(|| EmadError::not_found("Item da lixeira", item_id))?;

    if let Err(err) = restore(db, &item) {
        db.recycle.items.push(item);
        return Err(err);
    }
    info!("Restored {:?} {} from recycle bin", item.kind, item.record_id);
    Ok(item.record_id)
}

/// Most recent first.
pub fn list(db: &Database) -> Vec<RecycleItem> {
    db.recycle.items.iter().rev().cloned().collect()
}

pub fn purge(db: &mut Database) -> usize {
    let count = db.recycle.items.len();
    db.recycle.items.clear();
    count
}
