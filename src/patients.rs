//! Patient registry: form validation, CRUD, search, and the eligibility
//! review queue.

use chrono::Utc;
use log::info;

use crate::crypto::new_id;
use crate::error::{EmadError, EmadResult};
use crate::models::{clean_optional, Address, Database, Patient, PatientInput, PatientStatus};
use crate::recycle;
use crate::text::{clamp_string, digits_only, fold, squash_spaces};

const CPF_DIGITS: usize = 11;
const CNS_DIGITS: usize = 15;
const NAME_MAX: usize = 160;

fn normalize_document(
    value: Option<String>,
    field: &'static str,
    expected: usize,
) -> EmadResult<Option<String>> {
    let Some(raw) = clean_optional(value) else {
        return Ok(None);
    };
    let digits = digits_only(raw.as_str());
    if digits.len() != expected {
        return Err(EmadError::validation(
            field,
            format!("{} deve ter {expected} dígitos", field.to_uppercase()),
        ));
    }
    Ok(Some(digits))
}

fn normalize_address(address: Option<Address>) -> Option<Address> {
    let address = address?;
    let out = Address {
        street: clean_optional(address.street),
        number: clean_optional(address.number),
        district: clean_optional(address.district),
        city: clean_optional(address.city),
        zip: clean_optional(address.zip.map(|zip| digits_only(zip.as_str()))),
    };
    if out.is_empty() {
        None
    } else {
        Some(out)
    }
}

/// Checks the form rules and returns the cleaned input.
pub fn validate_input(input: PatientInput) -> EmadResult<PatientInput> {
    let full_name = squash_spaces(clamp_string(input.full_name.as_str(), NAME_MAX, true).as_str());
    if full_name.is_empty() {
        return Err(EmadError::validation(
            "fullName",
            "Nome completo é obrigatório",
        ));
    }
    let cns = normalize_document(input.cns, "cns", CNS_DIGITS)?;
    let cpf = normalize_document(input.cpf, "cpf", CPF_DIGITS)?;
    if cns.is_none() && cpf.is_none() {
        return Err(EmadError::validation(
            "cns",
            "Pelo menos CNS ou CPF deve ser preenchido",
        ));
    }
    if input.birth_date > Utc::now().date_naive() {
        return Err(EmadError::validation(
            "birthDate",
            "Data de nascimento não pode estar no futuro",
        ));
    }

    let mut care_types = input.care_types;
    care_types.sort();
    care_types.dedup();

    Ok(PatientInput {
        cns,
        cpf,
        full_name,
        phone: clean_optional(input.phone),
        address: normalize_address(input.address),
        care_types,
        ..input
    })
}

pub(crate) fn ensure_unique_documents(
    db: &Database,
    cpf: &Option<String>,
    cns: &Option<String>,
    own_id: Option<&str>,
) -> EmadResult<()> {
    for other in db.patients.iter().filter(|p| Some(p.id.as_str()) != own_id) {
        if cpf.is_some() && &other.cpf == cpf {
            return Err(EmadError::Duplicate(
                "Já existe um paciente com esse CPF".to_string(),
            ));
        }
        if cns.is_some() && &other.cns == cns {
            return Err(EmadError::Duplicate(
                "Já existe um paciente com esse CNS".to_string(),
            ));
        }
    }
    Ok(())
}

pub fn create(db: &mut Database, input: PatientInput) -> EmadResult<Patient> {
    let input = validate_input(input)?;
    ensure_unique_documents(db, &input.cpf, &input.cns, None)?;
    let now = Utc::now();
    let patient = Patient {
        id: new_id("pac"),
        cns: input.cns,
        cpf: input.cpf,
        full_name: input.full_name,
        birth_date: input.birth_date,
        sex: input.sex,
        phone: input.phone,
        address: input.address,
        care_level: input.care_level,
        status: input.status.unwrap_or_default(),
        care_types: input.care_types,
        admitted_at: now,
        updated_at: now,
    };
    info!("Patient {} registered", patient.id);
    db.patients.push(patient.clone());
    Ok(patient)
}

pub fn update(db: &mut Database, id: &str, input: PatientInput) -> EmadResult<Patient> {
    let input = validate_input(input)?;
    ensure_unique_documents(db, &input.cpf, &input.cns, Some(id))?;
    let patient = db
        .patients
        .iter_mut()
        .find(|p| p.id == id)
        .ok_or_else(|| EmadError::not_found("Paciente", id))?;

    patient.cns = input.cns;
    patient.cpf = input.cpf;
    patient.full_name = input.full_name;
    patient.birth_date = input.birth_date;
    patient.sex = input.sex;
    patient.phone = input.phone;
    patient.address = input.address;
    patient.care_level = input.care_level;
    if let Some(status) = input.status {
        patient.status = status;
    }
    patient.care_types = input.care_types;
    patient.updated_at = Utc::now();
    let updated = patient.clone();

    for visit in db.visits.iter_mut().filter(|v| v.patient_id == id) {
        visit.patient_name = updated.full_name.clone();
    }
    info!("Patient {id} updated");
    Ok(updated)
}

/// Moves the patient to the recycle bin. Patients with visits are kept so
/// the visit history stays consistent.
pub fn delete(db: &mut Database, id: &str) -> EmadResult<String> {
    let idx = db
        .patients
        .iter()
        .position(|p| p.id == id)
        .ok_or_else(|| EmadError::not_found("Paciente", id))?;
    let visits = db.visits.iter().filter(|v| v.patient_id == id).count();
    if visits > 0 {
        return Err(EmadError::Conflict(format!(
            "Paciente possui {visits} atendimento(s) e não pode ser removido"
        )));
    }
    let patient = db.patients.remove(idx);
    let item_id = recycle::park_patient(db, &patient)?;
    info!("Patient {id} moved to recycle bin");
    Ok(item_id)
}

pub fn get(db: &Database, id: &str) -> EmadResult<Patient> {
    db.patient(id)
        .cloned()
        .ok_or_else(|| EmadError::not_found("Paciente", id))
}

/// All patients sorted by name.
pub fn list(db: &Database) -> Vec<Patient> {
    let mut out = db.patients.clone();
    out.sort_by_cached_key(|p| fold(p.full_name.as_str()));
    out
}

/// Name match ignores case and accents; digit queries also match CPF/CNS.
pub fn search(db: &Database, query: &str) -> Vec<Patient> {
    let needle = fold(query.trim());
    if needle.is_empty() {
        return list(db);
    }
    let digits = digits_only(query);
    list(db)
        .into_iter()
        .filter(|p| {
            fold(p.full_name.as_str()).contains(needle.as_str())
                || (!digits.is_empty()
                    && (p.cpf.as_deref().is_some_and(|cpf| cpf.contains(digits.as_str()))
                        || p.cns.as_deref().is_some_and(|cns| cns.contains(digits.as_str()))))
        })
        .collect()
}

pub fn filter_by_status(db: &Database, status: PatientStatus) -> Vec<Patient> {
    list(db).into_iter().filter(|p| p.status == status).collect()
}

pub fn eligibility_queue(db: &Database) -> Vec<Patient> {
    let mut out = filter_by_status(db, PatientStatus::EligibilityReview);
    out.sort_by_key(|p| p.admitted_at);
    out
}

/// Marks a patient under review as Ativo or Inelegível.
pub fn decide_eligibility(db: &mut Database, id: &str, eligible: bool) -> EmadResult<Patient> {
    let patient = db
        .patients
        .iter_mut()
        .find(|p| p.id == id)
        .ok_or_else(|| EmadError::not_found("Paciente", id))?;
    if patient.status != PatientStatus::EligibilityReview {
        return Err(EmadError::Conflict(format!(
            "Paciente não está em análise de elegibilidade (status atual: {})",
            patient.status
        )));
    }
    patient.status = if eligible {
        PatientStatus::Active
    } else {
        PatientStatus::Ineligible
    };
    patient.updated_at = Utc::now();
    info!("Patient {id} marked {}", patient.status);
    Ok(patient.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CareType, Sex};
    use chrono::NaiveDate;

    fn input(name: &str, cpf: &str) -> PatientInput {
        PatientInput::new(name, NaiveDate::from_ymd_opt(1948, 6, 1).unwrap(), Sex::Female)
            .with_cpf(cpf)
    }

    #[test]
    fn cns_or_cpf_is_required() {
        let bare = PatientInput::new("Ana", NaiveDate::from_ymd_opt(1950, 1, 1).unwrap(), Sex::Female);
        let err = validate_input(bare).unwrap_err();
        assert!(matches!(err, EmadError::Validation { field: "cns", .. }));
    }

    #[test]
    fn documents_are_reduced_to_digits() {
        let cleaned = validate_input(input("  Ana   Souza ", "123.456.789-09")).unwrap();
        assert_eq!(cleaned.cpf.as_deref(), Some("12345678909"));
        assert_eq!(cleaned.full_name, "Ana Souza");
        assert!(validate_input(input("Ana", "123")).is_err());
    }

    #[test]
    fn future_birth_date_is_rejected() {
        let mut future = input("Ana", "12345678909");
        future.birth_date = Utc::now().date_naive() + chrono::Days::new(2);
        assert!(matches!(
            validate_input(future),
            Err(EmadError::Validation { field: "birthDate", .. })
        ));
    }

    #[test]
    fn new_patients_start_in_eligibility_review() {
        let mut db = Database::default();
        let patient = create(&mut db, input("Ana", "12345678909")).unwrap();
        assert_eq!(patient.status, PatientStatus::EligibilityReview);
        assert_eq!(eligibility_queue(&db).len(), 1);
    }

    #[test]
    fn explicit_status_skips_the_queue() {
        let mut db = Database::default();
        create(
            &mut db,
            input("Ana", "12345678909").with_status(PatientStatus::Active),
        )
        .unwrap();
        create(&mut db, input("Bia", "98765432100")).unwrap();

        assert!(eligibility_queue(&db).iter().all(|p| p.full_name == "Bia"));
        let active = filter_by_status(&db, PatientStatus::Active);
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].full_name, "Ana");
    }

    #[test]
    fn duplicate_cpf_is_rejected_except_for_self() {
        let mut db = Database::default();
        let ana = create(&mut db, input("Ana", "12345678909")).unwrap();
        assert!(matches!(
            create(&mut db, input("Bia", "123.456.789-09")),
            Err(EmadError::Duplicate(_))
        ));
        let renamed = update(&mut db, ana.id.as_str(), input("Ana Maria", "12345678909")).unwrap();
        assert_eq!(renamed.full_name, "Ana Maria");
    }

    #[test]
    fn eligibility_decision_only_applies_in_review() {
        let mut db = Database::default();
        let ana = create(&mut db, input("Ana", "12345678909")).unwrap();
        let decided = decide_eligibility(&mut db, ana.id.as_str(), true).unwrap();
        assert_eq!(decided.status, PatientStatus::Active);
        assert!(eligibility_queue(&db).is_empty());
        assert!(matches!(
            decide_eligibility(&mut db, ana.id.as_str(), false),
            Err(EmadError::Conflict(_))
        ));
    }

    #[test]
    fn search_ignores_accents_and_matches_documents() {
        let mut db = Database::default();
        create(&mut db, input("João Conceição", "12345678909")).unwrap();
        create(&mut db, input("Maria Lima", "98765432100")).unwrap();
        assert_eq!(search(&db, "joao")[0].full_name, "João Conceição");
        assert_eq!(search(&db, "987.654")[0].full_name, "Maria Lima");
        assert_eq!(search(&db, "").len(), 2);
        assert!(search(&db, "pedro").is_empty());
    }

    #[test]
    fn care_types_are_deduplicated() {
        let cleaned = validate_input(
            input("Ana", "12345678909").with_care_types(&[
                CareType::WoundCare,
                CareType::Palliative,
                CareType::WoundCare,
            ]),
        )
        .unwrap();
        assert_eq!(cleaned.care_types, vec![CareType::Palliative, CareType::WoundCare]);
    }

    #[test]
    fn delete_moves_patient_to_recycle_bin() {
        let mut db = Database::default();
        let ana = create(&mut db, input("Ana", "12345678909")).unwrap();
        let item = delete(&mut db, ana.id.as_str()).unwrap();
        assert!(db.patients.is_empty());
        assert_eq!(db.recycle.items[0].id, item);
        assert!(matches!(get(&db, ana.id.as_str()), Err(EmadError::NotFound { .. })));
    }
}
