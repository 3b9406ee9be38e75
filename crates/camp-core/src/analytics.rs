//! Camp analytics and the clinic dashboard.
//!
//! Everything here is a read-only pass over stored records: filter, group, count. The
//! aggregation functions are pure so they can be tested on hand-built records.

use crate::auth::Principal;
use crate::repositories::appointments::AppointmentRecord;
use crate::repositories::camps::CampRecord;
use crate::repositories::clinical::{patient_clinical, PatientClinical, SUSPICIOUS_BIRADS};
use crate::repositories::helpers::parse_id;
use crate::repositories::patients::PatientRecord;
use crate::repositories::queues::QueueEntryRecord;
use crate::repositories::staff::UserRecord;
use crate::store::Storage;
use crate::{CoreError, CoreResult};
use api_shared::{
    AppointmentService, AppointmentStatus, CampAnalytics, CampSummaryRow, ClinicDashboard,
    CountRow, DashboardQuery, DayCount, DoctorWorkload, Permission, QueueStatus, Sex,
};
use camp_uuid::ShardableUuid;
use chrono::NaiveDate;
use std::collections::{BTreeMap, HashMap};

const TOP_DIAGNOSES: usize = 10;
const AGE_BANDS: [&str; 5] = ["0-17", "18-39", "40-59", "60+", "unknown"];

fn age_band(age: Option<u32>) -> &'static str {
    match age {
        None => "unknown",
        Some(0..=17) => "0-17",
        Some(18..=39) => "18-39",
        Some(40..=59) => "40-59",
        Some(_) => "60+",
    }
}

fn row(key: impl Into<String>, count: u64) -> CountRow {
    CountRow {
        key: key.into(),
        count,
    }
}

/// One row per vocabulary term, zero counts included, in vocabulary order.
fn count_terms<T, I>(all: &[T], values: I) -> Vec<CountRow>
where
    T: Copy + PartialEq + std::fmt::Display,
    I: IntoIterator<Item = T>,
{
    let values: Vec<T> = values.into_iter().collect();
    all.iter()
        .map(|term| row(term.to_string(), values.iter().filter(|v| *v == term).count() as u64))
        .collect()
}

/// Most frequent keys first, ties alphabetical.
fn ranked(counts: HashMap<String, u64>, limit: usize) -> Vec<CountRow> {
    let mut rows: Vec<CountRow> = counts.into_iter().map(|(k, c)| row(k, c)).collect();
    rows.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.key.cmp(&b.key)));
    rows.truncate(limit);
    rows
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Completed over non-cancelled appointments.
pub fn completion_rate(appointments: &[&AppointmentRecord]) -> f64 {
    let considered = appointments
        .iter()
        .filter(|a| a.status != AppointmentStatus::Cancelled)
        .count();
    if considered == 0 {
        return 0.0;
    }
    let completed = appointments
        .iter()
        .filter(|a| a.status == AppointmentStatus::Completed)
        .count();
    completed as f64 / considered as f64
}

/// Everything stored for one camp.
pub struct CampData<'a> {
    pub camp: &'a CampRecord,
    pub patients: Vec<&'a PatientRecord>,
    pub appointments: Vec<&'a AppointmentRecord>,
    pub queue: Vec<&'a QueueEntryRecord>,
    pub clinical: Vec<PatientClinical>,
}

pub fn summarise_camp(data: &CampData<'_>, today: NaiveDate) -> CampAnalytics {
    let CampData {
        camp,
        patients,
        appointments,
        queue,
        clinical,
    } = data;

    let by_age_band = AGE_BANDS
        .iter()
        .map(|band| {
            let n = patients
                .iter()
                .filter(|p| age_band(p.age_on(today)) == *band)
                .count();
            row(*band, n as u64)
        })
        .collect();

    let mut diagnoses: HashMap<String, u64> = HashMap::new();
    for d in clinical.iter().flat_map(|c| &c.diagnoses) {
        if d.superseded_by.is_none() {
            *diagnoses
                .entry(d.condition.as_str().trim().to_lowercase())
                .or_default() += 1;
        }
    }

    let mammography: Vec<u8> = clinical
        .iter()
        .flat_map(|c| c.mammography.iter().map(|m| m.birads))
        .collect();
    let birads_distribution = (0..=6u8)
        .map(|category| {
            let n = mammography.iter().filter(|b| **b == category).count();
            row(category.to_string(), n as u64)
        })
        .collect();

    let treatments = clinical.iter().flat_map(|c| &c.treatments);
    let (treatments_recorded, medications_prescribed) =
        treatments.fold((0u64, 0u64), |(t, m), tr| (t + 1, m + tr.medications.len() as u64));

    let waits: Vec<f64> = queue.iter().filter_map(|q| q.wait_minutes()).collect();
    let average_wait_minutes =
        (!waits.is_empty()).then(|| round1(waits.iter().sum::<f64>() / waits.len() as f64));

    CampAnalytics {
        camp_id: camp.id.to_string(),
        camp_name: camp.name.to_string(),
        patients_registered: patients.len() as u64,
        by_sex: count_terms(Sex::ALL, patients.iter().map(|p| p.sex)),
        by_age_band,
        appointments_total: appointments.len() as u64,
        appointments_by_status: count_terms(
            AppointmentStatus::ALL,
            appointments.iter().map(|a| a.status),
        ),
        appointments_by_service: count_terms(
            AppointmentService::ALL,
            appointments.iter().map(|a| a.service),
        ),
        completion_rate: completion_rate(appointments),
        top_diagnoses: ranked(diagnoses, TOP_DIAGNOSES),
        birads_distribution,
        suspicious_findings: mammography.iter().filter(|b| **b >= SUSPICIOUS_BIRADS).count() as u64,
        treatments_recorded,
        medications_prescribed,
        queue_served: queue.iter().filter(|q| q.status == QueueStatus::Served).count() as u64,
        queue_skipped: queue.iter().filter(|q| q.status == QueueStatus::Skipped).count() as u64,
        average_wait_minutes,
    }
}

/// Inclusive date range; an open end matches everything on that side.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DateRange {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

impl DateRange {
    pub fn new(from: Option<NaiveDate>, to: Option<NaiveDate>) -> CoreResult<Self> {
        if let (Some(f), Some(t)) = (from, to) {
            if f > t {
                return Err(CoreError::invalid(format!("from {} is after to {}", f, t)));
            }
        }
        Ok(Self { from, to })
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.from.map_or(true, |f| date >= f) && self.to.map_or(true, |t| date <= t)
    }

    /// True when `[start, end]` shares at least one day with the range.
    pub fn overlaps(&self, start: NaiveDate, end: NaiveDate) -> bool {
        self.from.map_or(true, |f| end >= f) && self.to.map_or(true, |t| start <= t)
    }
}

pub fn summarise_clinic(
    range: DateRange,
    patients: &[PatientRecord],
    appointments: &[AppointmentRecord],
    camps: &[CampRecord],
    staff: &[UserRecord],
) -> ClinicDashboard {
    let patients: Vec<&PatientRecord> = patients
        .iter()
        .filter(|p| range.contains(p.created_at.date_naive()))
        .collect();
    let appointments: Vec<&AppointmentRecord> = appointments
        .iter()
        .filter(|a| range.contains(a.scheduled_at.date_naive()))
        .collect();
    let mut camps: Vec<&CampRecord> = camps
        .iter()
        .filter(|c| range.overlaps(c.start_date, c.end_date))
        .collect();
    camps.sort_by(|a, b| b.start_date.cmp(&a.start_date));

    let mut per_day: BTreeMap<NaiveDate, u64> = BTreeMap::new();
    for p in &patients {
        *per_day.entry(p.created_at.date_naive()).or_default() += 1;
    }

    let camp_rows = camps
        .iter()
        .map(|c| {
            let in_camp: Vec<&&AppointmentRecord> = appointments
                .iter()
                .filter(|a| a.camp_id.as_ref() == Some(&c.id))
                .collect();
            CampSummaryRow {
                camp_id: c.id.to_string(),
                name: c.name.to_string(),
                status: c.status,
                patients: patients
                    .iter()
                    .filter(|p| p.camp_id.as_ref() == Some(&c.id))
                    .count() as u64,
                appointments: in_camp.len() as u64,
                completed: in_camp
                    .iter()
                    .filter(|a| a.status == AppointmentStatus::Completed)
                    .count() as u64,
            }
        })
        .collect();

    let names: HashMap<&ShardableUuid, &str> =
        staff.iter().map(|u| (&u.id, u.name.as_str())).collect();
    let mut per_doctor: HashMap<&ShardableUuid, (u64, u64)> = HashMap::new();
    for a in &appointments {
        if let Some(doctor) = &a.doctor_id {
            let entry = per_doctor.entry(doctor).or_default();
            entry.0 += 1;
            if a.status == AppointmentStatus::Completed {
                entry.1 += 1;
            }
        }
    }
    let mut appointments_per_doctor: Vec<DoctorWorkload> = per_doctor
        .into_iter()
        .map(|(id, (total, completed))| DoctorWorkload {
            doctor_id: id.to_string(),
            doctor_name: names.get(id).copied().unwrap_or("unknown").to_string(),
            appointments: total,
            completed,
        })
        .collect();
    appointments_per_doctor.sort_by(|a, b| {
        b.appointments
            .cmp(&a.appointments)
            .then_with(|| a.doctor_name.cmp(&b.doctor_name))
    });

    ClinicDashboard {
        from: range.from,
        to: range.to,
        total_patients: patients.len() as u64,
        total_appointments: appointments.len() as u64,
        total_camps: camps.len() as u64,
        registrations_per_day: per_day
            .into_iter()
            .map(|(date, count)| DayCount { date, count })
            .collect(),
        camps: camp_rows,
        appointments_per_doctor,
    }
}

#[derive(Clone, Debug)]
pub struct AnalyticsService {
    storage: Storage,
}

impl AnalyticsService {
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }

    pub fn camp(&self, principal: &Principal, camp_id: &str) -> CoreResult<CampAnalytics> {
        principal.require(Permission::ViewAnalytics)?;
        self.camp_in_clinic(principal.clinic_id(), camp_id)
    }

    /// Camp analytics without an authenticated user, for the command line.
    pub fn camp_in_clinic(&self, clinic_id: &ShardableUuid, camp_id: &str) -> CoreResult<CampAnalytics> {
        let camp_id = parse_id("camp", camp_id)?;
        let store = self.storage.tenant(clinic_id);
        let camp = store.load::<CampRecord>(&camp_id, "camp")?;

        let patients = store.list::<PatientRecord>()?;
        let appointments = store.list::<AppointmentRecord>()?;
        let queue = store.list::<QueueEntryRecord>()?;

        let in_camp: Vec<&PatientRecord> = patients
            .iter()
            .filter(|p| p.camp_id.as_ref() == Some(&camp.id))
            .collect();
        let clinical = in_camp
            .iter()
            .map(|p| patient_clinical(&self.storage, clinic_id, &p.id))
            .collect::<CoreResult<Vec<_>>>()?;

        let data = CampData {
            camp: &camp,
            patients: in_camp,
            appointments: appointments
                .iter()
                .filter(|a| a.camp_id.as_ref() == Some(&camp.id))
                .collect(),
            queue: queue
                .iter()
                .filter(|q| q.camp_id.as_ref() == Some(&camp.id))
                .collect(),
            clinical,
        };

        tracing::debug!(camp = %camp.id, patients = data.patients.len(), "camp analytics");
        Ok(summarise_camp(&data, chrono::Utc::now().date_naive()))
    }

    pub fn dashboard(&self, principal: &Principal, query: DashboardQuery) -> CoreResult<ClinicDashboard> {
        principal.require(Permission::ViewAnalytics)?;
        let range = DateRange::new(query.from, query.to)?;
        let store = self.storage.tenant(principal.clinic_id());

        Ok(summarise_clinic(
            range,
            &store.list::<PatientRecord>()?,
            &store.list::<AppointmentRecord>()?,
            &store.list::<CampRecord>()?,
            &store.list::<UserRecord>()?,
        ))
    }
}
