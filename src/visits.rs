//! Atendimentos: logging, completing, and listing care visits.

use chrono::{DateTime, Utc};
use log::info;

use crate::crypto::new_id;
use crate::error::{EmadError, EmadResult};
use crate::models::{clean_optional, Database, Visit, VisitInput, VisitStatus};
use crate::recycle;
use crate::text::clamp_string;

const NOTES_MAX: usize = 4000;

fn check_window(started_at: DateTime<Utc>, ended_at: Option<DateTime<Utc>>) -> EmadResult<()> {
    if ended_at.is_some_and(|end| end <= started_at) {
        return Err(EmadError::validation(
            "endedAt",
            "Horário de término deve ser posterior ao início",
        ));
    }
    Ok(())
}

fn resolve(db: &Database, input: &VisitInput) -> EmadResult<Visit> {
    check_window(input.started_at, input.ended_at)?;
    let patient = db
        .patient(input.patient_id.as_str())
        .ok_or_else(|| EmadError::not_found("Paciente", input.patient_id.as_str()))?;
    let provider = db
        .user(input.provider_id.as_str())
        .ok_or_else(|| EmadError::not_found("Profissional", input.provider_id.as_str()))?;

    let status = input.status.unwrap_or(if input.ended_at.is_some() {
        VisitStatus::Completed
    } else {
        VisitStatus::InProgress
    });
    if status == VisitStatus::Completed && input.ended_at.is_none() {
        return Err(EmadError::validation(
            "endedAt",
            "Atendimento concluído precisa de horário de término",
        ));
    }

    Ok(Visit {
        id: String::new(),
        patient_id: patient.id.clone(),
        patient_name: patient.full_name.clone(),
        provider_id: provider.id.clone(),
        provider_name: provider.full_name.clone(),
        modality: input.modality,
        care_level: input.care_level.or(patient.care_level),
        started_at: input.started_at,
        ended_at: input.ended_at,
        status,
        notes: clean_optional(
            input
                .notes
                .as_deref()
                .map(|notes| clamp_string(notes, NOTES_MAX, true)),
        ),
    })
}

pub fn create(db: &mut Database, input: VisitInput) -> EmadResult<Visit> {
    let mut visit = resolve(db, &input)?;
    visit.id = new_id("atd");
    info!(
        "Visit {} logged for patient {} by {}",
        visit.id, visit.patient_id, visit.provider_id
    );
    db.visits.push(visit.clone());
    Ok(visit)
}

/// Replaces the editable fields. Without an explicit status the stored one
/// is kept; an open visit still becomes Concluído when an end is supplied.
pub fn update(db: &mut Database, id: &str, mut input: VisitInput) -> EmadResult<Visit> {
    let stored = db
        .visit(id)
        .map(|v| v.status)
        .ok_or_else(|| EmadError::not_found("Atendimento", id))?;
    if input.status.is_none() && stored != VisitStatus::InProgress {
        input.status = Some(stored);
    }
    let mut resolved = resolve(db, &input)?;
    let visit = db
        .visits
        .iter_mut()
        .find(|v| v.id == id)
        .ok_or_else(|| EmadError::not_found("Atendimento", id))?;
    resolved.id = visit.id.clone();
    *visit = resolved.clone();
    info!("Visit {id} updated");
    Ok(resolved)
}

pub fn complete(db: &mut Database, id: &str, ended_at: DateTime<Utc>) -> EmadResult<Visit> {
    let visit = db
        .visits
        .iter_mut()
        .find(|v| v.id == id)
        .ok_or_else(|| EmadError::not_found("Atendimento", id))?;
    if visit.status == VisitStatus::Cancelled {
        return Err(EmadError::Conflict(
            "Atendimento cancelado não pode ser concluído".to_string(),
        ));
    }
    check_window(visit.started_at, Some(ended_at))?;
    visit.ended_at = Some(ended_at);
    visit.status = VisitStatus::Completed;
    info!("Visit {id} completed");
    Ok(visit.clone())
}

pub fn cancel(db: &mut Database, id: &str) -> EmadResult<Visit> {
    let visit = db
        .visits
        .iter_mut()
        .find(|v| v.id == id)
        .ok_or_else(|| EmadError::not_found("Atendimento", id))?;
    visit.status = VisitStatus::Cancelled;
    info!("Visit {id} cancelled");
    Ok(visit.clone())
}

pub fn delete(db: &mut Database, id: &str) -> EmadResult<String> {
    let idx = db
        .visits
        .iter()
        .position(|v| v.id == id)
        .ok_or_else(|| EmadError::not_found("Atendimento", id))?;
    let visit = db.visits.remove(idx);
    let item_id = recycle::park_visit(db, &visit)?;
    info!("Visit {id} moved to recycle bin");
    Ok(item_id)
}

pub fn get(db: &Database, id: &str) -> EmadResult<Visit> {
    db.visit(id)
        .cloned()
        .ok_or_else(|| EmadError::not_found("Atendimento", id))
}

/// Newest first.
pub fn list(db: &Database) -> Vec<Visit> {
    let mut out = db.visits.clone();
    out.sort_by(|a, b| b.started_at.cmp(&a.started_at));
    out
}

pub fn list_for_patient(db: &Database, patient_id: &str) -> Vec<Visit> {
    list(db)
        .into_iter()
        .filter(|v| v.patient_id == patient_id)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::models::{CareLevel, Modality, PatientInput, Role, Sex, StaffUserInput};
    use crate::{patients, users};
    use chrono::{NaiveDate, TimeZone};

    fn seeded() -> (Database, String, String) {
        let mut db = Database::default();
        let patient = patients::create(
            &mut db,
            PatientInput::new("José", NaiveDate::from_ymd_opt(1940, 2, 2).unwrap(), Sex::Male)
                .with_cpf("12345678909")
                .with_care_level(CareLevel::AdII),
        )
        .unwrap();
        let user = users::create(
            &mut db,
            &Config::default().with_iterations(1),
            StaffUserInput::new("10", "Carla Dias", Role::Physician, "carla.dias"),
        )
        .unwrap();
        (db, patient.id, user.id)
    }

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 4, 7, hour, minute, 0).unwrap()
    }

    #[test]
    fn create_copies_names_and_care_level() {
        let (mut db, patient_id, provider_id) = seeded();
        let visit = create(
            &mut db,
            VisitInput::new(&patient_id, &provider_id, Modality::Scheduled, at(9, 0)),
        )
        .unwrap();
        assert_eq!(visit.patient_name, "José");
        assert_eq!(visit.provider_name, "CARLA DIAS");
        assert_eq!(visit.care_level, Some(CareLevel::AdII));
        assert_eq!(visit.status, VisitStatus::InProgress);
    }

    #[test]
    fn end_before_start_is_rejected() {
        let (mut db, patient_id, provider_id) = seeded();
        let input = VisitInput::new(&patient_id, &provider_id, Modality::Telehealth, at(9, 0))
            .ended_at(at(8, 59));
        assert!(matches!(
            create(&mut db, input),
            Err(EmadError::Validation { field: "endedAt", .. })
        ));
    }

    #[test]
    fn unknown_patient_is_rejected() {
        let (mut db, _, provider_id) = seeded();
        let input = VisitInput::new("nobody", &provider_id, Modality::Telehealth, at(9, 0));
        assert!(matches!(create(&mut db, input), Err(EmadError::NotFound { .. })));
    }

    #[test]
    fn completing_sets_end_and_status() {
        let (mut db, patient_id, provider_id) = seeded();
        let visit = create(
            &mut db,
            VisitInput::new(&patient_id, &provider_id, Modality::WalkIn, at(9, 0)),
        )
        .unwrap();
        let done = complete(&mut db, visit.id.as_str(), at(9, 40)).unwrap();
        assert_eq!(done.status, VisitStatus::Completed);
        assert_eq!(done.duration_minutes(), Some(40));

        cancel(&mut db, visit.id.as_str()).unwrap();
        assert!(matches!(
            complete(&mut db, visit.id.as_str(), at(10, 0)),
            Err(EmadError::Conflict(_))
        ));
    }

    #[test]
    fn editing_keeps_the_stored_status() {
        let (mut db, patient_id, provider_id) = seeded();
        let visit = create(
            &mut db,
            VisitInput::new(&patient_id, &provider_id, Modality::WalkIn, at(9, 0)),
        )
        .unwrap();
        cancel(&mut db, visit.id.as_str()).unwrap();

        let mut input = VisitInput::new(&patient_id, &provider_id, Modality::Telehealth, at(9, 15));
        input.notes = Some("Paciente remarcou".to_string());
        let edited = update(&mut db, visit.id.as_str(), input).unwrap();
        assert_eq!(edited.status, VisitStatus::Cancelled);
        assert_eq!(edited.modality, Modality::Telehealth);

        let open = create(
            &mut db,
            VisitInput::new(&patient_id, &provider_id, Modality::WalkIn, at(10, 0)),
        )
        .unwrap();
        let closed = update(
            &mut db,
            open.id.as_str(),
            VisitInput::new(&patient_id, &provider_id, Modality::WalkIn, at(10, 0)).ended_at(at(10, 20)),
        )
        .unwrap();
        assert_eq!(closed.status, VisitStatus::Completed);
    }

    #[test]
    fn ended_at_implies_completed() {
        let (mut db, patient_id, provider_id) = seeded();
        let visit = create(
            &mut db,
            VisitInput::new(&patient_id, &provider_id, Modality::WalkIn, at(9, 0))
                .ended_at(at(9, 30)),
        )
        .unwrap();
        assert!(visit.is_completed());
    }

    #[test]
    fn renaming_people_updates_visit_names() {
        let (mut db, patient_id, provider_id) = seeded();
        create(
            &mut db,
            VisitInput::new(&patient_id, &provider_id, Modality::WalkIn, at(9, 0)),
        )
        .unwrap();
        patients::update(
            &mut db,
            patient_id.as_str(),
            PatientInput::new("José Alves", NaiveDate::from_ymd_opt(1940, 2, 2).unwrap(), Sex::Male)
                .with_cpf("12345678909"),
        )
        .unwrap();
        users::update(
            &mut db,
            &Config::default().with_iterations(1),
            provider_id.as_str(),
            StaffUserInput::new("10", "Carla Dias Lima", Role::Physician, "carla.dias"),
        )
        .unwrap();
        let visit = &list_for_patient(&db, patient_id.as_str())[0];
        assert_eq!(visit.patient_name, "José Alves");
        assert_eq!(visit.provider_name, "CARLA DIAS LIMA");
    }

    #[test]
    fn list_is_newest_first_and_delete_parks() {
        let (mut db, patient_id, provider_id) = seeded();
        let first = create(
            &mut db,
            VisitInput::new(&patient_id, &provider_id, Modality::WalkIn, at(8, 0)),
        )
        .unwrap();
        create(
            &mut db,
            VisitInput::new(&patient_id, &provider_id, Modality::WalkIn, at(11, 0)),
        )
        .unwrap();
        assert_eq!(list(&db)[0].started_at, at(11, 0));

        delete(&mut db, first.id.as_str()).unwrap();
        assert_eq!(db.visits.len(), 1);
        assert_eq!(db.recycle.items.len(), 1);
    }
}
