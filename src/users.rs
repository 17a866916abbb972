//! Staff accounts: registration, duplicate checks, login, and page access.

use chrono::Utc;
use log::{info, warn};

use crate::config::Config;
use crate::crypto::{new_id, Credential};
use crate::error::{EmadError, EmadResult};
use crate::models::{AccessLevel, Database, Page, StaffUser, StaffUserInput};
use crate::recycle;
use crate::text::{clamp_string, fold, squash_spaces};

/// `first.last` from a full name, or `None` for single-word names.
pub fn suggest_username(full_name: &str) -> Option<String> {
    let names: Vec<&str> = full_name.split_whitespace().collect();
    if names.len() < 2 {
        return None;
    }
    let first = fold(names[0]);
    let last = fold(names[names.len() - 1]);
    Some(format!("{first}.{last}"))
}

/// Applies the form rules: digits-only matrícula, upper-case name,
/// lower-case username without spaces.
pub fn validate_input(input: StaffUserInput) -> EmadResult<StaffUserInput> {
    let registration = input.registration.trim().to_string();
    if registration.is_empty() {
        return Err(EmadError::validation(
            "registration",
            "Matrícula é obrigatória",
        ));
    }
    if !registration.chars().all(|ch| ch.is_ascii_digit()) {
        return Err(EmadError::validation(
            "registration",
            "Matrícula deve conter apenas números",
        ));
    }

    let full_name = squash_spaces(clamp_string(input.full_name.as_str(), 160, true).as_str());
    if full_name.is_empty() {
        return Err(EmadError::validation(
            "fullName",
            "Nome completo é obrigatório",
        ));
    }

    let username = input.username.trim().to_lowercase();
    if username.is_empty() {
        return Err(EmadError::validation(
            "username",
            "Nome de usuário é obrigatório",
        ));
    }
    if username.chars().any(char::is_whitespace) {
        return Err(EmadError::validation(
            "username",
            "Nome de usuário não pode conter espaços",
        ));
    }

    let mut pages = input.pages;
    pages.sort();
    pages.dedup();

    Ok(StaffUserInput {
        registration,
        full_name: full_name.to_uppercase(),
        username,
        pages,
        ..input
    })
}

pub(crate) fn ensure_unique(
    db: &Database,
    registration: &str,
    username: &str,
    own_id: Option<&str>,
) -> EmadResult<()> {
    let others: Vec<&StaffUser> = db
        .users
        .iter()
        .filter(|u| Some(u.id.as_str()) != own_id)
        .collect();
    if others.iter().any(|u| u.registration == registration) {
        return Err(EmadError::Duplicate(
            "Já existe um usuário com essa matrícula".to_string(),
        ));
    }
    if others.iter().any(|u| u.username == username) {
        return Err(EmadError::Duplicate(
            "Já existe um usuário com esse nome de usuário".to_string(),
        ));
    }
    Ok(())
}

fn admin_count(db: &Database) -> usize {
    db.users.iter().filter(|u| u.is_admin()).count()
}

pub fn create(db: &mut Database, config: &Config, input: StaffUserInput) -> EmadResult<StaffUser> {
    let input = validate_input(input)?;
    ensure_unique(db, input.registration.as_str(), input.username.as_str(), None)?;
    let user = StaffUser {
        id: new_id("usr"),
        email: format!("{}@{}", input.username, config.email_domain),
        registration: input.registration,
        full_name: input.full_name,
        role: input.role,
        username: input.username,
        access: input.access,
        pages: input.pages,
        credential: Some(Credential::new(
            config.default_staff_password.as_str(),
            config.pbkdf2_iterations,
        )),
        created_at: Utc::now(),
    };
    info!("User {} created", user.username);
    db.users.push(user.clone());
    Ok(user.public())
}

pub fn update(db: &mut Database, config: &Config, id: &str, input: StaffUserInput) -> EmadResult<StaffUser> {
    let input = validate_input(input)?;
    ensure_unique(
        db,
        input.registration.as_str(),
        input.username.as_str(),
        Some(id),
    )?;
    let demoting_last_admin = db
        .user(id)
        .is_some_and(|u| u.is_admin() && input.access != AccessLevel::Admin)
        && admin_count(db) == 1;
    if demoting_last_admin {
        return Err(EmadError::Conflict(
            "É necessário manter pelo menos um administrador".to_string(),
        ));
    }

    let user = db
        .users
        .iter_mut()
        .find(|u| u.id == id)
        .ok_or_else(|| EmadError::not_found("Usuário", id))?;
    if user.username != input.username {
        user.email = format!("{}@{}", input.username, config.email_domain);
    }
    user.registration = input.registration;
    user.full_name = input.full_name;
    user.role = input.role;
    user.username = input.username;
    user.access = input.access;
    user.pages = input.pages;
    let updated = user.public();

    for visit in db.visits.iter_mut().filter(|v| v.provider_id == id) {
        visit.provider_name = updated.full_name.clone();
    }
    info!("User {} updated", updated.username);
    Ok(updated)
}

pub fn delete(db: &mut Database, id: &str) -> EmadResult<String> {
    let idx = db
        .users
        .iter()
        .position(|u| u.id == id)
        .ok_or_else(|| EmadError::not_found("Usuário", id))?;
    if db.users[idx].is_admin() && admin_count(db) == 1 {
        return Err(EmadError::Conflict(
            "É necessário manter pelo menos um administrador".to_string(),
        ));
    }
    let user = db.users.remove(idx);
    let item_id = recycle::park_user(db, &user)?;
    info!("User {} moved to recycle bin", user.username);
    Ok(item_id)
}

pub fn get(db: &Database, id: &str) -> EmadResult<StaffUser> {
    db.user(id)
        .map(StaffUser::public)
        .ok_or_else(|| EmadError::not_found("Usuário", id))
}

pub fn list(db: &Database) -> Vec<StaffUser> {
    let mut out: Vec<StaffUser> = db.users.iter().map(StaffUser::public).collect();
    out.sort_by_cached_key(|u| fold(u.full_name.as_str()));
    out
}

/// Login by username (case-insensitive) and personal password.
pub fn authenticate(db: &Database, username: &str, password: &str) -> EmadResult<StaffUser> {
    let username = username.trim().to_lowercase();
    let user = db
        .users
        .iter()
        .find(|u| u.username == username)
        .ok_or(EmadError::Unauthorized)?;
    let valid = user
        .credential
        .as_ref()
        .is_some_and(|credential| credential.verify(password));
    if !valid {
        warn!("Failed login for {username}");
        return Err(EmadError::Unauthorized);
    }
    Ok(user.public())
}

pub fn change_password(
    db: &mut Database,
    config: &Config,
    id: &str,
    current: &str,
    next: &str,
) -> EmadResult<()> {
    if next.chars().count() < 6 {
        return Err(EmadError::validation(
            "password",
            "A nova senha deve ter pelo menos 6 caracteres",
        ));
    }
    let user = db
        .users
        .iter_mut()
        .find(|u| u.id == id)
        .ok_or_else(|| EmadError::not_found("Usuário", id))?;
    if !user.credential.as_ref().is_some_and(|c| c.verify(current)) {
        return Err(EmadError::Unauthorized);
    }
    user.credential = Some(Credential::new(next, config.pbkdf2_iterations));
    info!("Password changed for {}", user.username);
    Ok(())
}

/// Puts the account back on the configured default password.
pub fn reset_password(db: &mut Database, config: &Config, id: &str) -> EmadResult<()> {
    let user = db
        .users
        .iter_mut()
        .find(|u| u.id == id)
        .ok_or_else(|| EmadError::not_found("Usuário", id))?;
    user.credential = Some(Credential::new(
        config.default_staff_password.as_str(),
        config.pbkdf2_iterations,
    ));
    info!("Password reset for {}", user.username);
    Ok(())
}

pub fn can_access(user: &StaffUser, page: Page) -> bool {
    user.is_admin() || page == Page::Home || user.pages.contains(&page)
}

/// Pages shown in the navigation for `user`, in menu order.
pub fn accessible_pages(user: &StaffUser) -> Vec<Page> {
    Page::ALL
        .iter()
        .copied()
        .filter(|page| can_access(user, *page))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;

    fn config() -> Config {
        Config::default().with_iterations(2)
    }

    fn nurse(registration: &str, username: &str) -> StaffUserInput {
        StaffUserInput::new(registration, "Ana Paula Souza", Role::Nurse, username)
    }

    #[test]
    fn username_suggestion_uses_first_and_last_name() {
        assert_eq!(
            suggest_username("  João da Conceição "),
            Some("joao.conceicao".to_string())
        );
        assert_eq!(suggest_username("Madonna"), None);
    }

    #[test]
    fn form_normalisation() {
        let cleaned = validate_input(nurse("0042", " Ana.Souza ")).unwrap();
        assert_eq!(cleaned.full_name, "ANA PAULA SOUZA");
        assert_eq!(cleaned.username, "ana.souza");
        assert!(matches!(
            validate_input(nurse("12a", "ana")),
            Err(EmadError::Validation { field: "registration", .. })
        ));
        assert!(validate_input(nurse("1", "ana souza")).is_err());
    }

    #[test]
    fn duplicates_are_rejected() {
        let mut db = Database::default();
        let config = config();
        create(&mut db, &config, nurse("1", "ana")).unwrap();
        let err = create(&mut db, &config, nurse("1", "bia")).unwrap_err();
        assert_eq!(err.to_string(), "Já existe um usuário com essa matrícula");
        let err = create(&mut db, &config, nurse("2", "ANA")).unwrap_err();
        assert_eq!(err.to_string(), "Já existe um usuário com esse nome de usuário");
    }

    #[test]
    fn new_user_logs_in_with_default_password() {
        let mut db = Database::default();
        let config = config();
        let created = create(&mut db, &config, nurse("1", "ana")).unwrap();
        assert_eq!(created.email, "ana@emad.hmsj");
        assert!(created.credential.is_none());

        let user = authenticate(&db, "ANA", "emad123").unwrap();
        assert_eq!(user.id, created.id);
        assert!(matches!(
            authenticate(&db, "ana", "errada"),
            Err(EmadError::Unauthorized)
        ));

        change_password(&mut db, &config, created.id.as_str(), "emad123", "nova-senha").unwrap();
        assert!(authenticate(&db, "ana", "nova-senha").is_ok());
        reset_password(&mut db, &config, created.id.as_str()).unwrap();
        assert!(authenticate(&db, "ana", "emad123").is_ok());
    }

    #[test]
    fn last_admin_is_protected() {
        let mut db = Database::default();
        let config = config();
        let admin = create(&mut db, &config, nurse("1", "chefe").admin()).unwrap();
        assert!(matches!(
            delete(&mut db, admin.id.as_str()),
            Err(EmadError::Conflict(_))
        ));
        assert!(matches!(
            update(&mut db, &config, admin.id.as_str(), nurse("1", "chefe")),
            Err(EmadError::Conflict(_))
        ));
        let other = create(&mut db, &config, nurse("2", "outra").admin()).unwrap();
        delete(&mut db, other.id.as_str()).unwrap();
        assert_eq!(db.users.len(), 1);
    }

    #[test]
    fn page_access() {
        let mut db = Database::default();
        let config = config();
        let user = create(
            &mut db,
            &config,
            nurse("1", "ana").with_pages(&[Page::Visits]),
        )
        .unwrap();
        assert!(can_access(&user, Page::Home));
        assert!(can_access(&user, Page::Visits));
        assert!(!can_access(&user, Page::Dashboard));
        assert_eq!(accessible_pages(&user), vec![Page::Home, Page::Visits]);

        let admin = create(&mut db, &config, nurse("2", "chefe").admin()).unwrap();
        assert_eq!(accessible_pages(&admin).len(), Page::ALL.len());
    }
}
