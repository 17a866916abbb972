use chrono::{NaiveDate, TimeZone, Utc};
use emad_console::dashboard::{self, DashboardFilter, DetailFilter, DetailKind};
use emad_console::export::{self, ExportTable};
use emad_console::models::{
    CareLevel, CareType, Modality, PatientInput, PatientStatus, Role, Sex, StaffUserInput, VisitInput,
};
use emad_console::{patients, recycle, store, users, visits, Config, EmadError, Store};

const PASSWORD: &str = "chave-da-equipe";

fn config(dir: &std::path::Path) -> Config {
    Config::default().with_data_dir(dir).with_iterations(10)
}

#[test]
fn a_day_of_work_survives_a_restart() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    let store = Store::open(&config).unwrap();
    store.auth_setup(PASSWORD).unwrap();

    let (patient_id, nurse_id) = store
        .update(PASSWORD, |db| {
            let nurse = users::create(
                db,
                &config,
                StaffUserInput::new("501", "Paula Reis", Role::Nurse, "paula.reis"),
            )?;
            let patient = patients::create(
                db,
                PatientInput::new("Maria da Silva", NaiveDate::from_ymd_opt(1938, 6, 1).unwrap(), Sex::Female)
                    .with_cns("123456789012345")
                    .with_care_level(CareLevel::AdII)
                    .with_care_types(&[CareType::WoundCare]),
            )?;
            patients::decide_eligibility(db, patient.id.as_str(), true)?;
            Ok((patient.id, nurse.id))
        })
        .unwrap();

    for (day, minutes) in [(3, 30), (4, 50)] {
        let start = Utc.with_ymd_and_hms(2025, 3, day, 9, 0, 0).unwrap();
        store
            .update(PASSWORD, |db| {
                visits::create(
                    db,
                    VisitInput::new(&patient_id, &nurse_id, Modality::Scheduled, start)
                        .ended_at(start + chrono::Duration::minutes(minutes)),
                )
            })
            .unwrap();
    }

    let reopened = Store::open(&config).unwrap();
    let db = reopened.load(PASSWORD).unwrap();
    assert!(store::validate(&db).ok);
    assert_eq!(patients::get(&db, patient_id.as_str()).unwrap().status, PatientStatus::Active);

    let report = dashboard::report(&db, &DashboardFilter::default(), None);
    assert_eq!(report.total_visits, 2);
    assert_eq!(report.metrics.average_minutes, 40.0);
    assert_eq!(report.charts.by_month[0].name, "Março/2025");
    assert_eq!(report.rankings.top_patients[0].count, 2);

    let detail = DetailFilter::toggle(None, DetailKind::Cargo, "Enfermeiro");
    let narrowed = dashboard::report(&db, &DashboardFilter::default(), detail.as_ref());
    assert_eq!(narrowed.detail.len(), 2);

    let csv = export::export_table(&db, ExportTable::Visits);
    assert_eq!(csv.lines().count(), 3);
    assert!(csv.contains("Maria da Silva"));

    let user = users::authenticate(&db, "paula.reis", config.default_staff_password.as_str()).unwrap();
    assert!(user.credential.is_none());
}

#[test]
fn deleted_visit_can_be_restored_after_reopening() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    let store = Store::open(&config).unwrap();
    store.auth_setup(PASSWORD).unwrap();

    let undo_id = store
        .update(PASSWORD, |db| {
            let doctor = users::create(
                db,
                &config,
                StaffUserInput::new("77", "Hugo Prado", Role::Physician, "hugo.prado").admin(),
            )?;
            let patient = patients::create(
                db,
                PatientInput::new("Joana Dias", NaiveDate::from_ymd_opt(1951, 11, 20).unwrap(), Sex::Female)
                    .with_cpf("98765432100"),
            )?;
            let start = Utc.with_ymd_and_hms(2025, 5, 2, 14, 0, 0).unwrap();
            let visit = visits::create(
                db,
                VisitInput::new(&patient.id, &doctor.id, Modality::Telehealth, start),
            )?;
            assert!(matches!(
                patients::delete(db, patient.id.as_str()),
                Err(EmadError::Conflict(_))
            ));
            visits::delete(db, visit.id.as_str())
        })
        .unwrap();

    let reopened = Store::open(&config).unwrap();
    assert!(reopened.load(PASSWORD).unwrap().visits.is_empty());

    reopened
        .update(PASSWORD, |db| recycle::undo(db, undo_id.as_str()))
        .unwrap();
    let db = reopened.load(PASSWORD).unwrap();
    assert_eq!(db.visits.len(), 1);
    assert!(db.recycle.items.is_empty());
}

#[test]
fn wrong_password_is_refused_after_change() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    let store = Store::open(&config).unwrap();
    store.auth_setup(PASSWORD).unwrap();
    store
        .update(PASSWORD, |db| {
            users::create(
                db,
                &config,
                StaffUserInput::new("1", "Ana Melo", Role::Coordinator, "ana.melo").admin(),
            )
        })
        .unwrap();

    assert!(store.auth_change(PASSWORD, "nova-chave").unwrap());
    assert!(matches!(store.load(PASSWORD), Err(EmadError::Unauthorized)));
    assert_eq!(store.load("nova-chave").unwrap().users.len(), 1);
}
