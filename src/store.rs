//! Encrypted single-document storage for the console.
//!
//! The workspace password is checked against `auth.json` and also keys the
//! AES-GCM envelope in `emad.enc`. The last decrypted document and its
//! derived key are cached per password fingerprint so repeated commands do
//! not pay for PBKDF2 again.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use log::{debug, info, warn};
use serde::Serialize;

use crate::config::Config;
use crate::crypto::{
    decode_b64, decrypt_envelope_with_key, derive_key, encrypt_text_with_key,
    password_fingerprint, random_salt, Credential, Envelope,
};
use crate::error::{EmadError, EmadResult};
use crate::models::{Database, DB_VERSION};

pub const AUTH_FILE: &str = "auth.json";
pub const DATA_FILE: &str = "emad.enc";

#[derive(Default)]
struct CacheState {
    key: Option<String>,
    value: Option<Database>,
    db_salt: Option<Vec<u8>>,
    db_key: Option<[u8; 32]>,
}

/// An encrypted document ready to be written.
struct Sealed {
    content: String,
    document: Database,
    salt: Vec<u8>,
    key: [u8; 32],
}

pub struct Store {
    root: PathBuf,
    iterations: u32,
    cache: Mutex<CacheState>,
}

#[derive(Serialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct IntegrityReport {
    pub ok: bool,
    pub issues: Vec<String>,
}

impl Store {
    pub fn new(root: impl Into<PathBuf>, iterations: u32) -> EmadResult<Self> {
        let root = root.into();
        fs::create_dir_all(root.as_path())?;
        info!("Using data directory {}", root.display());
        Ok(Self {
            root,
            iterations: iterations.max(1),
            cache: Mutex::new(CacheState::default()),
        })
    }

    pub fn open(config: &Config) -> EmadResult<Self> {
        let root = config.data_dir.clone().ok_or_else(|| {
            EmadError::validation("dataDir", "Diretório de dados não configurado.")
        })?;
        Self::new(root, config.pbkdf2_iterations)
    }

    pub fn root(&self) -> &Path {
        self.root.as_path()
    }

    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    fn auth_path(&self) -> PathBuf {
        self.root.join(AUTH_FILE)
    }

    fn data_path(&self) -> PathBuf {
        self.root.join(DATA_FILE)
    }

    fn read_auth_record(&self) -> EmadResult<Option<Credential>> {
        let path = self.auth_path();
        if !path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(path)?;
        let record: Credential = match serde_json::from_str(raw.as_str()) {
            Ok(value) => value,
            Err(err) => {
                warn!("Ignoring unreadable {AUTH_FILE}: {err}");
                return Ok(None);
            }
        };
        if record.salt.is_empty() || record.hash.is_empty() {
            return Ok(None);
        }
        Ok(Some(record))
    }

    fn write_auth_record(&self, record: &Credential) -> EmadResult<()> {
        let content = serde_json::to_string_pretty(record)?;
        write_text_file(self.auth_path(), content.as_str())
    }

    /// Whether a workspace password has been configured.
    pub fn auth_status(&self) -> EmadResult<bool> {
        Ok(self.read_auth_record()?.is_some())
    }

    pub fn auth_setup(&self, password: &str) -> EmadResult<()> {
        if password.is_empty() {
            return Err(EmadError::validation("password", "Senha é obrigatória."));
        }
        if self.read_auth_record()?.is_some() {
            return Err(EmadError::Conflict(
                "Senha do espaço de trabalho já configurada.".to_string(),
            ));
        }
        self.write_auth_record(&Credential::new(password, self.iterations))?;
        info!("Workspace password configured");
        Ok(())
    }

    pub fn auth_verify(&self, password: &str) -> EmadResult<bool> {
        if password.is_empty() {
            return Ok(false);
        }
        if self.cached_key_matches(password) {
            return Ok(true);
        }
        Ok(self
            .read_auth_record()?
            .is_some_and(|record| record.verify(password)))
    }

    /// Replaces the workspace password and re-encrypts the data file with it.
    ///
    /// The re-encrypted document is staged in a temp file before the new
    /// credential is written, so a failed write leaves the old password valid.
    pub fn auth_change(&self, current: &str, next: &str) -> EmadResult<bool> {
        if next.is_empty() || !self.auth_verify(current)? {
            return Ok(false);
        }
        let previous = self.read_auth_record()?;
        let db = self.load(current)?;
        let sealed = self.seal_document(next, &db, None)?;

        let data_path = self.data_path();
        let staged = data_path.with_extension("tmp");
        fs::write(staged.as_path(), sealed.content.as_str())?;

        if let Err(err) = self.write_auth_record(&Credential::new(next, self.iterations)) {
            let _ = fs::remove_file(staged.as_path());
            return Err(err);
        }
        if let Err(err) = fs::rename(staged.as_path(), data_path.as_path()) {
            warn!("Could not replace {DATA_FILE}; keeping the previous password: {err}");
            let _ = fs::remove_file(staged.as_path());
            if let Some(record) = previous.as_ref() {
                self.write_auth_record(record)?;
            }
            return Err(err.into());
        }

        self.reset_cache();
        self.store_cached(next, &sealed.document);
        self.store_cached_crypto(next, sealed.salt.as_slice(), sealed.key);
        info!("Workspace password changed");
        Ok(true)
    }

    fn ensure_unlocked(&self, password: &str) -> EmadResult<()> {
        if self.auth_verify(password)? {
            Ok(())
        } else {
            Err(EmadError::Unauthorized)
        }
    }

    pub fn load(&self, password: &str) -> EmadResult<Database> {
        if let Some(cached) = self.load_cached(password) {
            debug!("Serving document from cache");
            return Ok(cached);
        }
        self.ensure_unlocked(password)?;

        let path = self.data_path();
        if !path.exists() {
            let out = Database::default();
            self.store_cached(password, &out);
            return Ok(out);
        }
        let raw = fs::read_to_string(path)?;
        let envelope: Envelope = serde_json::from_str(raw.as_str()).map_err(|err| {
            warn!("Data file is not a valid envelope: {err}");
            EmadError::Corrupt(err.to_string())
        })?;
        let salt = decode_b64(envelope.salt.as_str())
            .map_err(|err| EmadError::Corrupt(format!("invalid salt: {err}")))?;
        if salt.is_empty() {
            return Err(EmadError::Corrupt("missing salt".to_string()));
        }
        let key = match self.load_cached_crypto(password) {
            Some((cached_salt, cached_key)) if cached_salt == salt => cached_key,
            _ => derive_key(password, salt.as_slice(), self.iterations),
        };
        let decrypted = decrypt_envelope_with_key(&envelope, &key).ok_or_else(|| {
            warn!("Data file could not be decrypted with the workspace password");
            EmadError::Corrupt("decryption failed".to_string())
        })?;
        let parsed: Database = serde_json::from_str(decrypted.as_str()).map_err(|err| {
            warn!("Decrypted document is not valid JSON: {err}");
            EmadError::Corrupt(err.to_string())
        })?;
        let out = normalize(parsed)?;
        self.store_cached(password, &out);
        self.store_cached_crypto(password, salt.as_slice(), key);
        Ok(out)
    }

    pub fn save(&self, password: &str, db: &Database) -> EmadResult<()> {
        self.ensure_unlocked(password)?;
        let crypto = self.load_cached_crypto(password);
        self.write_document(password, db, crypto)
    }

    fn seal_document(
        &self,
        password: &str,
        db: &Database,
        crypto: Option<(Vec<u8>, [u8; 32])>,
    ) -> EmadResult<Sealed> {
        let document = normalize(db.clone())?;
        let plaintext = serde_json::to_string(&document)?;
        let (salt, key) = match crypto {
            Some(value) => value,
            None => {
                let fresh_salt = random_salt();
                let key = derive_key(password, &fresh_salt, self.iterations);
                (fresh_salt.to_vec(), key)
            }
        };
        let envelope = encrypt_text_with_key(plaintext.as_str(), salt.as_slice(), &key)?;
        Ok(Sealed {
            content: serde_json::to_string(&envelope)?,
            document,
            salt,
            key,
        })
    }

    fn write_document(
        &self,
        password: &str,
        db: &Database,
        crypto: Option<(Vec<u8>, [u8; 32])>,
    ) -> EmadResult<()> {
        let sealed = self.seal_document(password, db, crypto)?;
        write_text_file(self.data_path(), sealed.content.as_str())?;
        self.store_cached(password, &sealed.document);
        self.store_cached_crypto(password, sealed.salt.as_slice(), sealed.key);
        debug!(
            "Saved document: {} patients, {} users, {} visits",
            sealed.document.patients.len(),
            sealed.document.users.len(),
            sealed.document.visits.len()
        );
        Ok(())
    }

    /// Loads, applies `f`, and saves only when `f` succeeds.
    pub fn update<T>(
        &self,
        password: &str,
        f: impl FnOnce(&mut Database) -> EmadResult<T>,
    ) -> EmadResult<T> {
        let mut db = self.load(password)?;
        let out = f(&mut db)?;
        self.save(password, &db)?;
        Ok(out)
    }

    fn cached_key_matches(&self, password: &str) -> bool {
        let fingerprint = password_fingerprint(password);
        self.cache
            .lock()
            .map(|guard| guard.key.as_deref() == Some(fingerprint.as_str()))
            .unwrap_or(false)
    }

    fn load_cached(&self, password: &str) -> Option<Database> {
        let fingerprint = password_fingerprint(password);
        let guard = self.cache.lock().ok()?;
        if guard.key.as_deref() == Some(fingerprint.as_str()) {
            return guard.value.clone();
        }
        None
    }

    fn store_cached(&self, password: &str, value: &Database) {
        if let Ok(mut guard) = self.cache.lock() {
            let fingerprint = password_fingerprint(password);
            if guard.key.as_deref() != Some(fingerprint.as_str()) {
                guard.db_salt = None;
                guard.db_key = None;
            }
            guard.key = Some(fingerprint);
            guard.value = Some(value.clone());
        }
    }

    fn load_cached_crypto(&self, password: &str) -> Option<(Vec<u8>, [u8; 32])> {
        let fingerprint = password_fingerprint(password);
        let guard = self.cache.lock().ok()?;
        if guard.key.as_deref() != Some(fingerprint.as_str()) {
            return None;
        }
        Some((guard.db_salt.clone()?, guard.db_key?))
    }

    fn store_cached_crypto(&self, password: &str, salt: &[u8], key: [u8; 32]) {
        if let Ok(mut guard) = self.cache.lock() {
            let fingerprint = password_fingerprint(password);
            if guard.key.as_deref() != Some(fingerprint.as_str()) {
                guard.value = None;
            }
            guard.key = Some(fingerprint);
            guard.db_salt = Some(salt.to_vec());
            guard.db_key = Some(key);
        }
    }

    fn reset_cache(&self) {
        if let Ok(mut guard) = self.cache.lock() {
            *guard = CacheState::default();
        }
    }
}

fn normalize(mut db: Database) -> EmadResult<Database> {
    if db.version > DB_VERSION {
        return Err(EmadError::Corrupt(format!(
            "versão {} é mais nova que a suportada ({DB_VERSION})",
            db.version
        )));
    }
    db.version = DB_VERSION;
    Ok(db)
}

/// Cross-record consistency checks; never mutates.
pub fn validate(db: &Database) -> IntegrityReport {
    let mut issues = Vec::new();

    let mut seen = HashSet::new();
    for id in db
        .patients
        .iter()
        .map(|p| &p.id)
        .chain(db.users.iter().map(|u| &u.id))
        .chain(db.visits.iter().map(|v| &v.id))
    {
        if !seen.insert(id.as_str()) {
            issues.push(format!("Identificador duplicado: {id}"));
        }
    }

    for visit in &db.visits {
        if db.patient(visit.patient_id.as_str()).is_none() {
            issues.push(format!(
                "Atendimento {} referencia paciente inexistente {}",
                visit.id, visit.patient_id
            ));
        }
        if db.user(visit.provider_id.as_str()).is_none() {
            issues.push(format!(
                "Atendimento {} referencia profissional inexistente {}",
                visit.id, visit.provider_id
            ));
        }
        if visit.duration_minutes().is_some_and(|minutes| minutes < 0) {
            issues.push(format!("Atendimento {} termina antes de começar", visit.id));
        }
    }

    IntegrityReport {
        ok: issues.is_empty(),
        issues,
    }
}

fn write_text_file(path: PathBuf, content: &str) -> EmadResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("tmp");
    fs::write(tmp.as_path(), content)?;
    fs::rename(tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::encrypt_text;
    use crate::models::{Modality, PatientInput, Role, Sex, StaffUserInput, VisitInput};
    use crate::{patients, users, visits};
    use chrono::{Duration, NaiveDate, TimeZone, Utc};

    fn store() -> (tempfile::TempDir, Store) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path(), 10).unwrap();
        (dir, store)
    }

    #[test]
    fn setup_is_required_before_loading() {
        let (_dir, store) = store();
        assert!(!store.auth_status().unwrap());
        assert!(matches!(store.load("x"), Err(EmadError::Unauthorized)));

        store.auth_setup("segredo").unwrap();
        assert!(store.auth_status().unwrap());
        assert_eq!(store.load("segredo").unwrap(), Database::default());
    }

    #[test]
    fn second_setup_is_refused() {
        let (_dir, store) = store();
        store.auth_setup("a").unwrap();
        assert!(matches!(store.auth_setup("b"), Err(EmadError::Conflict(_))));
        assert!(matches!(store.auth_setup(""), Err(EmadError::Validation { .. })));
    }

    #[test]
    fn wrong_password_never_yields_a_document() {
        let (_dir, store) = store();
        store.auth_setup("segredo").unwrap();
        store.load("segredo").unwrap();
        assert!(matches!(store.load("outra"), Err(EmadError::Unauthorized)));
    }

    #[test]
    fn saved_document_survives_a_fresh_store() {
        let (dir, store) = store();
        store.auth_setup("segredo").unwrap();
        store
            .update("segredo", |db| {
                db.recycle.items.clear();
                db.version = 0;
                Ok(())
            })
            .unwrap();

        let reopened = Store::new(dir.path(), 10).unwrap();
        let db = reopened.load("segredo").unwrap();
        assert_eq!(db.version, DB_VERSION);

        let raw = fs::read_to_string(dir.path().join(DATA_FILE)).unwrap();
        assert!(!raw.contains("patients"));
    }

    #[test]
    fn failed_update_does_not_save() {
        let (dir, store) = store();
        store.auth_setup("segredo").unwrap();
        let result: EmadResult<()> = store.update("segredo", |_| Err(EmadError::Unauthorized));
        assert!(result.is_err());
        assert!(!dir.path().join(DATA_FILE).exists());
    }

    #[test]
    fn password_change_rekeys_the_data_file() {
        let (dir, store) = store();
        store.auth_setup("antiga").unwrap();
        store.save("antiga", &Database::default()).unwrap();

        assert!(!store.auth_change("errada", "nova").unwrap());
        assert!(store.auth_change("antiga", "nova").unwrap());

        let reopened = Store::new(dir.path(), 10).unwrap();
        assert!(matches!(reopened.load("antiga"), Err(EmadError::Unauthorized)));
        assert!(reopened.load("nova").is_ok());
    }

    #[test]
    fn newer_versions_are_rejected() {
        let db = Database {
            version: DB_VERSION + 1,
            ..Database::default()
        };
        assert!(matches!(normalize(db), Err(EmadError::Corrupt(_))));
    }

    #[test]
    fn garbage_data_file_is_reported_as_corrupt() {
        let (dir, store) = store();
        store.auth_setup("segredo").unwrap();
        fs::write(dir.path().join(DATA_FILE), "not json").unwrap();
        assert!(matches!(store.load("segredo"), Err(EmadError::Corrupt(_))));
    }

    #[test]
    fn failed_rekey_keeps_the_old_password() {
        let (dir, store) = store();
        store.auth_setup("antiga").unwrap();
        store
            .update("antiga", |db| {
                db.recycle.items.clear();
                Ok(())
            })
            .unwrap();
        fs::create_dir(dir.path().join(DATA_FILE).with_extension("tmp")).unwrap();

        assert!(matches!(store.auth_change("antiga", "nova"), Err(EmadError::Io(_))));

        let reopened = Store::new(dir.path(), 10).unwrap();
        assert!(reopened.load("antiga").is_ok());
        assert!(matches!(reopened.load("nova"), Err(EmadError::Unauthorized)));
    }

    #[test]
    fn bad_salt_or_payload_is_reported_as_corrupt() {
        let (dir, store) = store();
        store.auth_setup("segredo").unwrap();

        let mut envelope = encrypt_text("{}", "segredo", 10).unwrap();
        envelope.salt = "***".to_string();
        fs::write(
            dir.path().join(DATA_FILE),
            serde_json::to_string(&envelope).unwrap(),
        )
        .unwrap();
        assert!(matches!(store.load("segredo"), Err(EmadError::Corrupt(_))));

        let envelope = encrypt_text("isto não é json", "segredo", 10).unwrap();
        fs::write(
            dir.path().join(DATA_FILE),
            serde_json::to_string(&envelope).unwrap(),
        )
        .unwrap();
        assert!(matches!(store.load("segredo"), Err(EmadError::Corrupt(_))));
    }

    #[test]
    fn validate_lists_every_broken_record() {
        let mut db = Database::default();
        let patient = patients::create(
            &mut db,
            PatientInput::new("Lia Souza", NaiveDate::from_ymd_opt(1960, 8, 9).unwrap(), Sex::Female)
                .with_cpf("11122233344"),
        )
        .unwrap();
        let user = users::create(
            &mut db,
            &Config::default().with_iterations(1),
            StaffUserInput::new("5", "Rui Lopes", Role::Nurse, "rui.lopes"),
        )
        .unwrap();
        let start = Utc.with_ymd_and_hms(2025, 2, 1, 10, 0, 0).unwrap();
        let visit = visits::create(
            &mut db,
            VisitInput::new(&patient.id, &user.id, Modality::WalkIn, start),
        )
        .unwrap();
        assert_eq!(validate(&db), IntegrityReport { ok: true, issues: Vec::new() });

        db.patients.push(db.patients[0].clone());
        db.visits[0].ended_at = Some(start - Duration::minutes(5));
        let mut orphan = db.visits[0].clone();
        orphan.id = "atd-orfao".to_string();
        orphan.patient_id = "pac-x".to_string();
        orphan.provider_id = "usr-x".to_string();
        orphan.ended_at = None;
        db.visits.push(orphan);

        let report = validate(&db);
        assert!(!report.ok);
        assert_eq!(
            report.issues,
            vec![
                format!("Identificador duplicado: {}", patient.id),
                format!("Atendimento {} termina antes de começar", visit.id),
                "Atendimento atd-orfao referencia paciente inexistente pac-x".to_string(),
                "Atendimento atd-orfao referencia profissional inexistente usr-x".to_string(),
            ]
        );
    }
}
