//! CSV export of the registry tables.

use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::error::EmadResult;
use crate::models::{Database, Visit};
use crate::text::clamp_string;
use crate::{patients, users, visits};

pub const MAX_EXPORT_ROWS: usize = 50_000;

const PATIENT_COLUMNS: [&str; 11] = [
    "Nome",
    "CPF",
    "CNS",
    "Nascimento",
    "Sexo",
    "Telefone",
    "Endereço",
    "Nível",
    "Status",
    "Tipo de Cuidado",
    "Inclusão",
];
const USER_COLUMNS: [&str; 7] = [
    "Matrícula",
    "Nome",
    "Cargo",
    "Usuário",
    "E-mail",
    "Acesso",
    "Páginas",
];
const VISIT_COLUMNS: [&str; 10] = [
    "Data",
    "Início",
    "Fim",
    "Duração (min)",
    "Paciente",
    "Profissional",
    "Modalidade",
    "Nível",
    "Status",
    "Observações",
];

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ExportTable {
    Patients,
    Users,
    Visits,
}

impl ExportTable {
    pub fn default_filename(self) -> &'static str {
        match self {
            ExportTable::Patients => "pacientes.csv",
            ExportTable::Users => "usuarios.csv",
            ExportTable::Visits => "atendimentos.csv",
        }
    }
}

fn opt(value: &Option<String>) -> String {
    value.clone().unwrap_or_default()
}

fn visit_row(visit: &Visit) -> Vec<String> {
    vec![
        visit.started_at.format("%d/%m/%Y").to_string(),
        visit.started_at.format("%H:%M").to_string(),
        visit
            .ended_at
            .map(|end| end.format("%H:%M").to_string())
            .unwrap_or_default(),
        visit
            .duration_minutes()
            .map(|m| m.to_string())
            .unwrap_or_default(),
        visit.patient_name.clone(),
        visit.provider_name.clone(),
        visit.modality.label().to_string(),
        visit
            .care_level
            .map(|level| level.label().to_string())
            .unwrap_or_default(),
        visit.status.label().to_string(),
        opt(&visit.notes),
    ]
}

/// Header and rows for one table, in the order shown on screen.
pub fn table_rows(db: &Database, table: ExportTable) -> (Vec<String>, Vec<Vec<String>>) {
    let (columns, rows): (&[&str], Vec<Vec<String>>) = match table {
        ExportTable::Patients => (
            &PATIENT_COLUMNS[..],
            patients::list(db)
                .iter()
                .map(|p| {
                    vec![
                        p.full_name.clone(),
                        opt(&p.cpf),
                        opt(&p.cns),
                        p.birth_date.format("%d/%m/%Y").to_string(),
                        p.sex.label().to_string(),
                        opt(&p.phone),
                        p.address.as_ref().map(|a| a.one_line()).unwrap_or_default(),
                        p.care_level.map(|l| l.label().to_string()).unwrap_or_default(),
                        p.status.label().to_string(),
                        p.care_types
                            .iter()
                            .map(|c| c.label())
                            .collect::<Vec<_>>()
                            .join("; "),
                        p.admitted_at.format("%d/%m/%Y").to_string(),
                    ]
                })
                .collect(),
        ),
        ExportTable::Users => (
            &USER_COLUMNS[..],
            users::list(db)
                .iter()
                .map(|u| {
                    vec![
                        u.registration.clone(),
                        u.full_name.clone(),
                        u.role.label().to_string(),
                        u.username.clone(),
                        u.email.clone(),
                        u.access.label().to_string(),
                        users::accessible_pages(u)
                            .iter()
                            .map(|p| p.label())
                            .collect::<Vec<_>>()
                            .join("; "),
                    ]
                })
                .collect(),
        ),
        ExportTable::Visits => (
            &VISIT_COLUMNS[..],
            visits::list(db).iter().map(visit_row).collect(),
        ),
    };
    (columns.iter().map(|c| c.to_string()).collect(), rows)
}

fn should_neutralize_csv(value: &str) -> bool {
    let trimmed = value.trim_start();
    if trimmed.is_empty() || trimmed.starts_with('\'') {
        return false;
    }
    matches!(
        trimmed.chars().next(),
        Some('=') | Some('+') | Some('-') | Some('@')
    )
}

fn neutralize_csv_formula(value: &str) -> String {
    if should_neutralize_csv(value) {
        format!("'{value}")
    } else {
        value.to_string()
    }
}

pub fn csv_escape(value: &str) -> String {
    let safe = neutralize_csv_formula(value);
    if safe.contains(',') || safe.contains('"') || safe.contains('\n') || safe.contains('\r') {
        format!("\"{}\"", safe.replace('"', "\"\""))
    } else {
        safe
    }
}

pub fn rows_to_csv(columns: &[String], rows: &[Vec<String>]) -> String {
    let mut lines: Vec<String> = Vec::with_capacity(rows.len() + 1);
    if !columns.is_empty() {
        lines.push(
            columns
                .iter()
                .map(|col| csv_escape(col.as_str()))
                .collect::<Vec<_>>()
                .join(","),
        );
    }
    for row in rows.iter().take(MAX_EXPORT_ROWS) {
        lines.push(
            row.iter()
                .map(|cell| csv_escape(cell.as_str()))
                .collect::<Vec<_>>()
                .join(","),
        );
    }
    lines.join("\n")
}

pub fn export_table(db: &Database, table: ExportTable) -> String {
    let (columns, rows) = table_rows(db, table);
    rows_to_csv(columns.as_slice(), rows.as_slice())
}

/// Writes straight to the path the user picked; nothing else in that folder
/// is touched.
pub fn write_csv_file(path: &Path, content: &str) -> EmadResult<()> {
    fs::write(path, content)?;
    Ok(())
}

fn sanitize_filename(value: &str) -> String {
    let out: String = value
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' || ch == '.' {
                ch
            } else {
                '_'
            }
        })
        .collect();
    let trimmed = out.trim_matches('_');
    if trimmed.is_empty() {
        "emad-export.csv".to_string()
    } else {
        trimmed.to_string()
    }
}

pub fn sanitize_export_filename(value: &str) -> String {
    let trimmed = clamp_string(value, 255, true);
    let safe = sanitize_filename(trimmed.as_str());
    if safe.to_lowercase().ends_with(".csv") {
        safe
    } else {
        format!("{safe}.csv")
    }
}
