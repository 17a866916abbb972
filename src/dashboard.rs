//! Dashboard aggregation. Everything here works on records already loaded
//! in memory; every grouping over the filtered visits accounts for each
//! visit exactly once unless it is explicitly truncated to a top-N.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::models::{
    CareLevel, CareType, Database, Modality, Patient, PatientStatus, Role, Sex, StaffUser, Visit,
    NOT_INFORMED,
};

pub const TOP_N: usize = 10;
pub const AGE_BAND_YEARS: u32 = 10;
pub const AGE_BAND_LAST: u32 = 90;

const MONTHS: [&str; 12] = [
    "Janeiro",
    "Fevereiro",
    "Março",
    "Abril",
    "Maio",
    "Junho",
    "Julho",
    "Agosto",
    "Setembro",
    "Outubro",
    "Novembro",
    "Dezembro",
];

/// Sunday first, as on the printed charts.
const WEEKDAYS: [&str; 7] = ["Dom", "Seg", "Ter", "Qua", "Qui", "Sex", "Sáb"];

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct DashboardFilter {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub patient_id: Option<String>,
    pub provider_id: Option<String>,
    pub role: Option<Role>,
    pub modality: Option<Modality>,
    pub care_level: Option<CareLevel>,
}

impl DashboardFilter {
    fn matches(&self, visit: &Visit, users: &HashMap<&str, &StaffUser>) -> bool {
        let day = visit.started_at.date_naive();
        if self.start_date.is_some_and(|start| day < start) {
            return false;
        }
        if self.end_date.is_some_and(|end| day > end) {
            return false;
        }
        if nonempty(&self.patient_id).is_some_and(|id| id != visit.patient_id) {
            return false;
        }
        if nonempty(&self.provider_id).is_some_and(|id| id != visit.provider_id) {
            return false;
        }
        if let Some(role) = self.role {
            let provider_role = users.get(visit.provider_id.as_str()).map(|u| u.role);
            if provider_role != Some(role) {
                return false;
            }
        }
        if self.modality.is_some_and(|modality| modality != visit.modality) {
            return false;
        }
        if self.care_level.is_some() && self.care_level != visit.care_level {
            return false;
        }
        true
    }
}

fn nonempty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn user_index(db: &Database) -> HashMap<&str, &StaffUser> {
    db.users.iter().map(|u| (u.id.as_str(), u)).collect()
}

pub fn filter_visits<'a>(db: &'a Database, filter: &DashboardFilter) -> Vec<&'a Visit> {
    let users = user_index(db);
    db.visits
        .iter()
        .filter(|visit| filter.matches(visit, &users))
        .collect()
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ChartPoint {
    pub name: String,
    pub value: f64,
}

impl ChartPoint {
    fn new(name: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct RankingEntry {
    pub name: String,
    pub count: usize,
}

/// Descending by count, ties by name.
fn rank<I>(keys: I) -> Vec<RankingEntry>
where
    I: IntoIterator<Item = String>,
{
    let mut counts: HashMap<String, usize> = HashMap::new();
    for key in keys {
        *counts.entry(key).or_insert(0) += 1;
    }
    let mut out: Vec<RankingEntry> = counts
        .into_iter()
        .map(|(name, count)| RankingEntry { name, count })
        .collect();
    out.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.name.cmp(&b.name)));
    out
}

fn or_not_informed(value: &str) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        NOT_INFORMED.to_string()
    } else {
        trimmed.to_string()
    }
}

fn role_label(visit: &Visit, users: &HashMap<&str, &StaffUser>) -> String {
    users
        .get(visit.provider_id.as_str())
        .map(|u| u.role.label().to_string())
        .unwrap_or_else(|| NOT_INFORMED.to_string())
}

fn to_points(entries: Vec<RankingEntry>) -> Vec<ChartPoint> {
    entries
        .into_iter()
        .map(|entry| ChartPoint::new(entry.name, entry.count as f64))
        .collect()
}

fn month_label(year: i32, month: u32) -> String {
    let name = MONTHS
        .get(month.saturating_sub(1) as usize)
        .copied()
        .unwrap_or("?");
    format!("{name}/{year}")
}

/// Positive durations in fractional minutes.
fn positive_minutes(visit: &Visit) -> Option<f64> {
    let end = visit.ended_at?;
    let minutes = (end - visit.started_at).num_milliseconds() as f64 / 60_000.0;
    (minutes > 0.0).then_some(minutes)
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

pub fn visits_by_month(visits: &[&Visit]) -> Vec<ChartPoint> {
    let mut months: BTreeMap<(i32, u32), usize> = BTreeMap::new();
    for visit in visits {
        let date = visit.started_at.date_naive();
        *months.entry((date.year(), date.month())).or_insert(0) += 1;
    }
    months
        .into_iter()
        .map(|((year, month), count)| ChartPoint::new(month_label(year, month), count as f64))
        .collect()
}

pub fn average_duration_by_month(visits: &[&Visit]) -> Vec<ChartPoint> {
    let mut months: BTreeMap<(i32, u32), (f64, usize)> = BTreeMap::new();
    for visit in visits {
        let Some(minutes) = positive_minutes(visit) else {
            continue;
        };
        let date = visit.started_at.date_naive();
        let slot = months.entry((date.year(), date.month())).or_insert((0.0, 0));
        slot.0 += minutes;
        slot.1 += 1;
    }
    months
        .into_iter()
        .map(|((year, month), (total, count))| {
            ChartPoint::new(month_label(year, month), round1(total / count as f64))
        })
        .collect()
}

/// All seven days, zero-filled, Sunday first.
pub fn visits_by_weekday(visits: &[&Visit]) -> Vec<ChartPoint> {
    let mut counts = [0usize; 7];
    for visit in visits {
        let idx = visit.started_at.weekday().num_days_from_sunday() as usize;
        counts[idx] += 1;
    }
    WEEKDAYS
        .iter()
        .zip(counts)
        .map(|(day, count)| ChartPoint::new(*day, count as f64))
        .collect()
}

pub fn visits_by_modality(visits: &[&Visit]) -> Vec<ChartPoint> {
    to_points(rank(visits.iter().map(|v| v.modality.label().to_string())))
}

pub fn visits_by_provider(visits: &[&Visit]) -> Vec<ChartPoint> {
    let mut ranked = rank(visits.iter().map(|v| or_not_informed(v.provider_name.as_str())));
    ranked.truncate(TOP_N);
    to_points(ranked)
}

pub fn visits_by_role(db: &Database, visits: &[&Visit]) -> Vec<ChartPoint> {
    let users = user_index(db);
    to_points(rank(visits.iter().map(|v| role_label(v, &users))))
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DashboardCharts {
    pub average_duration_by_month: Vec<ChartPoint>,
    pub by_month: Vec<ChartPoint>,
    pub by_weekday: Vec<ChartPoint>,
    pub by_modality: Vec<ChartPoint>,
    pub by_provider: Vec<ChartPoint>,
    pub by_role: Vec<ChartPoint>,
}

pub fn charts(db: &Database, visits: &[&Visit]) -> DashboardCharts {
    DashboardCharts {
        average_duration_by_month: average_duration_by_month(visits),
        by_month: visits_by_month(visits),
        by_weekday: visits_by_weekday(visits),
        by_modality: visits_by_modality(visits),
        by_provider: visits_by_provider(visits),
        by_role: visits_by_role(db, visits),
    }
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Rankings {
    pub top_patients: Vec<RankingEntry>,
    pub top_providers: Vec<RankingEntry>,
    pub roles: Vec<RankingEntry>,
    pub modalities: Vec<RankingEntry>,
}

pub fn rankings(db: &Database, visits: &[&Visit]) -> Rankings {
    let users = user_index(db);
    let mut top_patients = rank(visits.iter().map(|v| or_not_informed(v.patient_name.as_str())));
    top_patients.truncate(TOP_N);
    let mut top_providers = rank(visits.iter().map(|v| or_not_informed(v.provider_name.as_str())));
    top_providers.truncate(TOP_N);
    Rankings {
        top_patients,
        top_providers,
        roles: rank(visits.iter().map(|v| role_label(v, &users))),
        modalities: rank(visits.iter().map(|v| v.modality.label().to_string())),
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DetailKind {
    Paciente,
    Profissional,
    Cargo,
    Modalidade,
}

/// Row selected in one of the ranking tables.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct DetailFilter {
    #[serde(rename = "type")]
    pub kind: DetailKind,
    pub value: String,
}

impl DetailFilter {
    /// Selecting the active row again clears the filter.
    pub fn toggle(current: Option<DetailFilter>, kind: DetailKind, value: &str) -> Option<DetailFilter> {
        match current {
            Some(active) if active.kind == kind && active.value == value => None,
            _ => Some(DetailFilter {
                kind,
                value: value.to_string(),
            }),
        }
    }

    pub fn apply<'a>(&self, db: &Database, visits: &[&'a Visit]) -> Vec<&'a Visit> {
        let users = user_index(db);
        visits
            .iter()
            .copied()
            .filter(|visit| match self.kind {
                DetailKind::Paciente => or_not_informed(visit.patient_name.as_str()) == self.value,
                DetailKind::Profissional => {
                    or_not_informed(visit.provider_name.as_str()) == self.value
                }
                DetailKind::Cargo => role_label(visit, &users) == self.value,
                DetailKind::Modalidade => visit.modality.label() == self.value,
            })
            .collect()
    }
}

#[derive(Serialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VisitMetrics {
    pub total_visits: usize,
    pub visits_per_patient: f64,
    pub average_minutes: f64,
    pub total_minutes: f64,
}

/// Metrics over completed visits only.
pub fn metrics(visits: &[&Visit]) -> VisitMetrics {
    let completed: Vec<&Visit> = visits.iter().copied().filter(|v| v.is_completed()).collect();
    if completed.is_empty() {
        return VisitMetrics::default();
    }
    let patients: HashSet<&str> = completed.iter().map(|v| v.patient_id.as_str()).collect();
    let durations: Vec<f64> = completed.iter().filter_map(|v| positive_minutes(v)).collect();
    let total_minutes: f64 = durations.iter().sum();
    VisitMetrics {
        total_visits: completed.len(),
        visits_per_patient: completed.len() as f64 / patients.len() as f64,
        average_minutes: if durations.is_empty() {
            0.0
        } else {
            total_minutes / durations.len() as f64
        },
        total_minutes,
    }
}

/// Whole days, hours and minutes after rounding the total once.
fn split_minutes(minutes: f64) -> (i64, i64, i64) {
    let total = minutes.round() as i64;
    let hours = total / 60;
    (hours / 24, hours % 24, total % 60)
}

/// `45 min`, `2h 5min`, `1d 3h 0min`.
pub fn format_duration_short(minutes: f64) -> String {
    let (days, hours, rest) = split_minutes(minutes);
    if days == 0 && hours == 0 {
        return format!("{rest} min");
    }
    if days == 0 {
        return format!("{hours}h {rest}min");
    }
    format!("{days}d {hours}h {rest}min")
}

/// Sentence form used on the metric cards.
pub fn format_duration_long(minutes: f64) -> String {
    let (days, hours, rest) = split_minutes(minutes);
    if days == 0 && hours == 0 {
        return format!("{rest} minutos");
    }
    if days == 0 {
        return format!("{hours} horas e {rest} minutos");
    }
    let day_word = if days == 1 { "dia" } else { "dias" };
    format!("{days} {day_word}, {hours} horas e {rest} minutos")
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct AgeBand {
    pub band: String,
    pub male: usize,
    pub female: usize,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PatientProfile {
    pub care_types: Vec<RankingEntry>,
    pub by_care_level: Vec<ChartPoint>,
    pub age_pyramid: Vec<AgeBand>,
    pub by_status: Vec<ChartPoint>,
}

fn band_label(start: u32) -> String {
    if start >= AGE_BAND_LAST {
        format!("{AGE_BAND_LAST}+")
    } else {
        format!("{start}-{}", start + AGE_BAND_YEARS - 1)
    }
}

pub fn age_pyramid(patients: &[&Patient], today: NaiveDate) -> Vec<AgeBand> {
    let slots = (AGE_BAND_LAST / AGE_BAND_YEARS + 1) as usize;
    let mut bands: Vec<AgeBand> = (0..slots)
        .map(|idx| AgeBand {
            band: band_label(idx as u32 * AGE_BAND_YEARS),
            male: 0,
            female: 0,
        })
        .collect();
    for patient in patients {
        let idx = ((patient.age_on(today) / AGE_BAND_YEARS) as usize).min(slots - 1);
        match patient.sex {
            Sex::Male => bands[idx].male += 1,
            Sex::Female => bands[idx].female += 1,
        }
    }
    bands
}

pub fn patient_profile(db: &Database, today: NaiveDate) -> PatientProfile {
    let patients: Vec<&Patient> = db.patients.iter().collect();

    let care_types = CareType::ALL
        .iter()
        .map(|care| RankingEntry {
            name: care.label().to_string(),
            count: patients.iter().filter(|p| p.care_types.contains(care)).count(),
        })
        .collect();

    let mut by_care_level: Vec<ChartPoint> = CareLevel::ALL
        .iter()
        .map(|level| {
            let count = patients.iter().filter(|p| p.care_level == Some(*level)).count();
            ChartPoint::new(level.label(), count as f64)
        })
        .collect();
    let without_level = patients.iter().filter(|p| p.care_level.is_none()).count();
    if without_level > 0 {
        by_care_level.push(ChartPoint::new(NOT_INFORMED, without_level as f64));
    }

    let by_status = PatientStatus::ALL
        .iter()
        .map(|status| {
            let count = patients.iter().filter(|p| p.status == *status).count();
            ChartPoint::new(status.label(), count as f64)
        })
        .collect();

    PatientProfile {
        care_types,
        by_care_level,
        age_pyramid: age_pyramid(&patients, today),
        by_status,
    }
}

#[derive(Serialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Overview {
    pub active_patients: usize,
    pub eligibility_review: usize,
    pub visits_today: usize,
    pub staff: usize,
}

/// Quick indicators for the home page.
pub fn overview(db: &Database, today: NaiveDate) -> Overview {
    Overview {
        active_patients: db.patients.iter().filter(|p| p.is_active()).count(),
        eligibility_review: db
            .patients
            .iter()
            .filter(|p| p.status == PatientStatus::EligibilityReview)
            .count(),
        visits_today: db
            .visits
            .iter()
            .filter(|v| v.started_at.date_naive() == today)
            .count(),
        staff: db.users.len(),
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DashboardReport {
    pub total_visits: usize,
    pub charts: DashboardCharts,
    pub rankings: Rankings,
    pub metrics: VisitMetrics,
    pub detail: Vec<Visit>,
}

/// Everything the dashboard page renders for one filter selection.
pub fn report(db: &Database, filter: &DashboardFilter, detail: Option<&DetailFilter>) -> DashboardReport {
    let visits = filter_visits(db, filter);
    let detail_rows = match detail {
        Some(selected) => selected.apply(db, &visits),
        None => visits.clone(),
    };
    let mut detail: Vec<Visit> = detail_rows.into_iter().cloned().collect();
    detail.sort_by(|a, b| b.started_at.cmp(&a.started_at));
    DashboardReport {
        total_visits: visits.len(),
        charts: charts(db, &visits),
        rankings: rankings(db, &visits),
        metrics: metrics(&visits),
        detail,
    }
}
