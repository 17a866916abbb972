//! Tauri command layer. Every data command carries the workspace password,
//! and errors cross the IPC boundary as display strings.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tauri::{AppHandle, State};
use tauri_plugin_clipboard_manager::ClipboardExt;
use tauri_plugin_opener::OpenerExt;

use crate::config::Config;
use crate::dashboard::{self, DashboardFilter, DashboardReport, DetailFilter, Overview, PatientProfile};
use crate::export::{self, ExportTable};
use crate::models::{Page, Patient, PatientInput, PatientStatus, StaffUser, StaffUserInput, Visit, VisitInput};
use crate::recycle::{self, RecycleItem};
use crate::store::{self, IntegrityReport, Store};
use crate::{patients, users, visits};

type CommandResult<T> = Result<T, String>;

fn err(error: crate::EmadError) -> String {
    error.to_string()
}

#[derive(Deserialize)]
pub struct DbAuthRequest {
    password: String,
}

#[derive(Deserialize)]
pub struct AuthChangeRequest {
    current: String,
    next: String,
}

#[derive(Deserialize)]
pub struct IdRequest {
    password: String,
    id: String,
}

#[derive(Deserialize)]
pub struct SearchRequest {
    password: String,
    query: String,
}

#[derive(Deserialize)]
pub struct StatusRequest {
    password: String,
    status: PatientStatus,
}

#[derive(Deserialize)]
pub struct PatientSaveRequest {
    password: String,
    id: Option<String>,
    patient: PatientInput,
}

#[derive(Deserialize)]
pub struct EligibilityRequest {
    password: String,
    id: String,
    eligible: bool,
}

#[derive(Deserialize)]
pub struct UserSaveRequest {
    password: String,
    id: Option<String>,
    user: StaffUserInput,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    password: String,
    username: String,
    user_password: String,
}

#[derive(Deserialize)]
pub struct UserPasswordRequest {
    password: String,
    id: String,
    current: String,
    next: String,
}

#[derive(Deserialize)]
pub struct VisitSaveRequest {
    password: String,
    id: Option<String>,
    visit: VisitInput,
}

#[derive(Deserialize)]
pub struct VisitCompleteRequest {
    password: String,
    id: String,
    ended_at: DateTime<Utc>,
}

#[derive(Deserialize)]
pub struct DashboardRequest {
    password: String,
    #[serde(default)]
    filter: DashboardFilter,
    #[serde(default)]
    detail: Option<DetailFilter>,
}

#[derive(Deserialize)]
pub struct TodayRequest {
    password: String,
    #[serde(default)]
    today: Option<NaiveDate>,
}

#[derive(Deserialize)]
pub struct ExportRequest {
    password: String,
    table: ExportTable,
    #[serde(default)]
    filename: Option<String>,
}

#[derive(Serialize)]
pub struct SaveCsvResult {
    ok: bool,
    canceled: bool,
    filename: String,
    path: Option<String>,
}

#[derive(Serialize)]
pub struct StorageInfoResult {
    ok: bool,
    path_label: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResult {
    user: StaffUser,
    pages: Vec<Page>,
}

fn today_or_now(today: Option<NaiveDate>) -> NaiveDate {
    today.unwrap_or_else(|| Utc::now().date_naive())
}

#[tauri::command]
pub fn app_version(app: AppHandle) -> String {
    app.package_info().version.to_string()
}

#[tauri::command]
pub fn storage_info(store: State<'_, Store>) -> StorageInfoResult {
    StorageInfoResult {
        ok: true,
        path_label: store.root().to_string_lossy().to_string(),
    }
}

#[tauri::command]
pub fn open_data_folder(app: AppHandle, store: State<'_, Store>) -> CommandResult<bool> {
    app.opener()
        .open_url(store.root().to_string_lossy().to_string(), Option::<String>::None)
        .map_err(|error: tauri_plugin_opener::Error| error.to_string())?;
    Ok(true)
}

#[tauri::command]
pub fn auth_status(store: State<'_, Store>) -> CommandResult<bool> {
    store.auth_status().map_err(err)
}

#[tauri::command]
pub fn auth_setup(store: State<'_, Store>, payload: DbAuthRequest) -> CommandResult<bool> {
    store.auth_setup(payload.password.as_str()).map_err(err)?;
    Ok(true)
}

#[tauri::command]
pub fn auth_verify(store: State<'_, Store>, payload: DbAuthRequest) -> CommandResult<bool> {
    store.auth_verify(payload.password.as_str()).map_err(err)
}

#[tauri::command]
pub fn auth_change(store: State<'_, Store>, payload: AuthChangeRequest) -> CommandResult<bool> {
    store
        .auth_change(payload.current.as_str(), payload.next.as_str())
        .map_err(err)
}

#[tauri::command]
pub fn db_validate(store: State<'_, Store>, payload: DbAuthRequest) -> CommandResult<IntegrityReport> {
    let db = store.load(payload.password.as_str()).map_err(err)?;
    Ok(store::validate(&db))
}

#[tauri::command]
pub fn patients_list(store: State<'_, Store>, payload: DbAuthRequest) -> CommandResult<Vec<Patient>> {
    let db = store.load(payload.password.as_str()).map_err(err)?;
    Ok(patients::list(&db))
}

#[tauri::command]
pub fn patients_search(store: State<'_, Store>, payload: SearchRequest) -> CommandResult<Vec<Patient>> {
    let db = store.load(payload.password.as_str()).map_err(err)?;
    Ok(patients::search(&db, payload.query.as_str()))
}

#[tauri::command]
pub fn patients_get(store: State<'_, Store>, payload: IdRequest) -> CommandResult<Patient> {
    let db = store.load(payload.password.as_str()).map_err(err)?;
    patients::get(&db, payload.id.as_str()).map_err(err)
}

#[tauri::command]
pub fn patients_save(store: State<'_, Store>, payload: PatientSaveRequest) -> CommandResult<Patient> {
    store
        .update(payload.password.as_str(), |db| match payload.id.as_deref() {
            Some(id) => patients::update(db, id, payload.patient),
            None => patients::create(db, payload.patient),
        })
        .map_err(err)
}

#[tauri::command]
pub fn patients_delete(store: State<'_, Store>, payload: IdRequest) -> CommandResult<serde_json::Value> {
    let undo_id = store
        .update(payload.password.as_str(), |db| patients::delete(db, payload.id.as_str()))
        .map_err(err)?;
    Ok(json!({ "ok": true, "undoId": undo_id }))
}

#[tauri::command]
pub fn patients_by_status(store: State<'_, Store>, payload: StatusRequest) -> CommandResult<Vec<Patient>> {
    let db = store.load(payload.password.as_str()).map_err(err)?;
    Ok(patients::filter_by_status(&db, payload.status))
}

#[tauri::command]
pub fn patients_eligibility_queue(
    store: State<'_, Store>,
    payload: DbAuthRequest,
) -> CommandResult<Vec<Patient>> {
    let db = store.load(payload.password.as_str()).map_err(err)?;
    Ok(patients::eligibility_queue(&db))
}

#[tauri::command]
pub fn patients_decide_eligibility(
    store: State<'_, Store>,
    payload: EligibilityRequest,
) -> CommandResult<Patient> {
    store
        .update(payload.password.as_str(), |db| {
            patients::decide_eligibility(db, payload.id.as_str(), payload.eligible)
        })
        .map_err(err)
}

#[tauri::command]
pub fn copy_patient_summary(
    app: AppHandle,
    store: State<'_, Store>,
    payload: IdRequest,
) -> CommandResult<bool> {
    let db = store.load(payload.password.as_str()).map_err(err)?;
    let patient = patients::get(&db, payload.id.as_str()).map_err(err)?;
    let summary = patient_summary(&patient, Utc::now().date_naive());
    app.clipboard()
        .write_text(summary)
        .map_err(|error| error.to_string())?;
    Ok(true)
}

fn patient_summary(patient: &Patient, today: NaiveDate) -> String {
    let mut lines = vec![
        format!("Paciente: {}", patient.full_name),
        format!(
            "Nascimento: {} ({} anos)",
            patient.birth_date.format("%d/%m/%Y"),
            patient.age_on(today)
        ),
        format!("Sexo: {}", patient.sex),
        format!("Status: {}", patient.status),
    ];
    if let Some(cns) = &patient.cns {
        lines.push(format!("CNS: {cns}"));
    }
    if let Some(cpf) = &patient.cpf {
        lines.push(format!("CPF: {cpf}"));
    }
    if let Some(level) = patient.care_level {
        lines.push(format!("Nível de Atenção: {level}"));
    }
    if !patient.care_types.is_empty() {
        let care: Vec<&str> = patient.care_types.iter().map(|c| c.label()).collect();
        lines.push(format!("Tipo de Cuidado: {}", care.join(", ")));
    }
    if let Some(phone) = &patient.phone {
        lines.push(format!("Telefone: {phone}"));
    }
    if let Some(address) = patient.address.as_ref().filter(|a| !a.is_empty()) {
        lines.push(format!("Endereço: {}", address.one_line()));
    }
    lines.join("\n")
}

#[tauri::command]
pub fn users_list(store: State<'_, Store>, payload: DbAuthRequest) -> CommandResult<Vec<StaffUser>> {
    let db = store.load(payload.password.as_str()).map_err(err)?;
    Ok(users::list(&db))
}

#[tauri::command]
pub fn users_get(store: State<'_, Store>, payload: IdRequest) -> CommandResult<StaffUser> {
    let db = store.load(payload.password.as_str()).map_err(err)?;
    users::get(&db, payload.id.as_str()).map_err(err)
}

#[tauri::command]
pub fn users_suggest_username(full_name: String) -> Option<String> {
    users::suggest_username(full_name.as_str())
}

#[tauri::command]
pub fn users_save(
    store: State<'_, Store>,
    config: State<'_, Config>,
    payload: UserSaveRequest,
) -> CommandResult<StaffUser> {
    store
        .update(payload.password.as_str(), |db| match payload.id.as_deref() {
            Some(id) => users::update(db, &config, id, payload.user),
            None => users::create(db, &config, payload.user),
        })
        .map_err(err)
}

#[tauri::command]
pub fn users_delete(store: State<'_, Store>, payload: IdRequest) -> CommandResult<serde_json::Value> {
    let undo_id = store
        .update(payload.password.as_str(), |db| users::delete(db, payload.id.as_str()))
        .map_err(err)?;
    Ok(json!({ "ok": true, "undoId": undo_id }))
}

#[tauri::command]
pub fn users_login(store: State<'_, Store>, payload: LoginRequest) -> CommandResult<SessionResult> {
    let db = store.load(payload.password.as_str()).map_err(err)?;
    let user = users::authenticate(&db, payload.username.as_str(), payload.user_password.as_str())
        .map_err(err)?;
    Ok(SessionResult {
        pages: users::accessible_pages(&user),
        user,
    })
}

#[tauri::command]
pub fn users_change_password(
    store: State<'_, Store>,
    config: State<'_, Config>,
    payload: UserPasswordRequest,
) -> CommandResult<bool> {
    store
        .update(payload.password.as_str(), |db| {
            users::change_password(
                db,
                &config,
                payload.id.as_str(),
                payload.current.as_str(),
                payload.next.as_str(),
            )
        })
        .map_err(err)?;
    Ok(true)
}

#[tauri::command]
pub fn users_reset_password(
    store: State<'_, Store>,
    config: State<'_, Config>,
    payload: IdRequest,
) -> CommandResult<bool> {
    store
        .update(payload.password.as_str(), |db| {
            users::reset_password(db, &config, payload.id.as_str())
        })
        .map_err(err)?;
    Ok(true)
}

#[tauri::command]
pub fn visits_list(store: State<'_, Store>, payload: DbAuthRequest) -> CommandResult<Vec<Visit>> {
    let db = store.load(payload.password.as_str()).map_err(err)?;
    Ok(visits::list(&db))
}

#[tauri::command]
pub fn visits_for_patient(store: State<'_, Store>, payload: IdRequest) -> CommandResult<Vec<Visit>> {
    let db = store.load(payload.password.as_str()).map_err(err)?;
    Ok(visits::list_for_patient(&db, payload.id.as_str()))
}

#[tauri::command]
pub fn visits_get(store: State<'_, Store>, payload: IdRequest) -> CommandResult<Visit> {
    let db = store.load(payload.password.as_str()).map_err(err)?;
    visits::get(&db, payload.id.as_str()).map_err(err)
}

#[tauri::command]
pub fn visits_save(store: State<'_, Store>, payload: VisitSaveRequest) -> CommandResult<Visit> {
    store
        .update(payload.password.as_str(), |db| match payload.id.as_deref() {
            Some(id) => visits::update(db, id, payload.visit),
            None => visits::create(db, payload.visit),
        })
        .map_err(err)
}

#[tauri::command]
pub fn visits_complete(store: State<'_, Store>, payload: VisitCompleteRequest) -> CommandResult<Visit> {
    store
        .update(payload.password.as_str(), |db| {
            visits::complete(db, payload.id.as_str(), payload.ended_at)
        })
        .map_err(err)
}

#[tauri::command]
pub fn visits_cancel(store: State<'_, Store>, payload: IdRequest) -> CommandResult<Visit> {
    store
        .update(payload.password.as_str(), |db| visits::cancel(db, payload.id.as_str()))
        .map_err(err)
}

#[tauri::command]
pub fn visits_delete(store: State<'_, Store>, payload: IdRequest) -> CommandResult<serde_json::Value> {
    let undo_id = store
        .update(payload.password.as_str(), |db| visits::delete(db, payload.id.as_str()))
        .map_err(err)?;
    Ok(json!({ "ok": true, "undoId": undo_id }))
}

#[tauri::command]
pub fn dashboard_report(
    store: State<'_, Store>,
    payload: DashboardRequest,
) -> CommandResult<DashboardReport> {
    let db = store.load(payload.password.as_str()).map_err(err)?;
    Ok(dashboard::report(&db, &payload.filter, payload.detail.as_ref()))
}

#[tauri::command]
pub fn dashboard_patient_profile(
    store: State<'_, Store>,
    payload: TodayRequest,
) -> CommandResult<PatientProfile> {
    let db = store.load(payload.password.as_str()).map_err(err)?;
    Ok(dashboard::patient_profile(&db, today_or_now(payload.today)))
}

#[tauri::command]
pub fn dashboard_overview(store: State<'_, Store>, payload: TodayRequest) -> CommandResult<Overview> {
    let db = store.load(payload.password.as_str()).map_err(err)?;
    Ok(dashboard::overview(&db, today_or_now(payload.today)))
}

#[tauri::command]
pub fn recycle_list(store: State<'_, Store>, payload: DbAuthRequest) -> CommandResult<Vec<RecycleItem>> {
    let db = store.load(payload.password.as_str()).map_err(err)?;
    Ok(recycle::list(&db))
}

#[tauri::command]
pub fn recycle_undo(store: State<'_, Store>, payload: IdRequest) -> CommandResult<serde_json::Value> {
    match store.update(payload.password.as_str(), |db| recycle::undo(db, payload.id.as_str())) {
        Ok(record_id) => Ok(json!({ "ok": true, "recordId": record_id })),
        Err(error) => Ok(json!({ "ok": false, "error": error.to_string() })),
    }
}

#[tauri::command]
pub fn recycle_purge(store: State<'_, Store>, payload: DbAuthRequest) -> CommandResult<usize> {
    store
        .update(payload.password.as_str(), |db| Ok(recycle::purge(db)))
        .map_err(err)
}

#[tauri::command]
pub fn export_csv(store: State<'_, Store>, payload: ExportRequest) -> CommandResult<SaveCsvResult> {
    let db = store.load(payload.password.as_str()).map_err(err)?;
    let filename = export::sanitize_export_filename(
        payload
            .filename
            .as_deref()
            .unwrap_or(payload.table.default_filename()),
    );
    let content = export::export_table(&db, payload.table);

    let path = rfd::FileDialog::new()
        .set_file_name(filename.as_str())
        .add_filter("CSV", &["csv"])
        .save_file();
    let Some(path) = path else {
        return Ok(SaveCsvResult {
            ok: false,
            canceled: true,
            filename,
            path: None,
        });
    };

    export::write_csv_file(path.as_path(), content.as_str()).map_err(err)?;
    log::info!("Exported {:?} to {}", payload.table, path.display());
    Ok(SaveCsvResult {
        ok: true,
        canceled: false,
        filename,
        path: Some(path.to_string_lossy().to_string()),
    })
}
