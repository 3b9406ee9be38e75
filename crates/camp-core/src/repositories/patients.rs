//! Patient registration and lookup.

use crate::auth::Principal;
use crate::repositories::appointments::AppointmentRecord;
use crate::repositories::camps::ensure_open;
use crate::repositories::clinical::patient_counts;
use crate::repositories::helpers::{
    optional_email, optional_id, optional_phone, optional_text, parse_id, required_text,
};
use crate::store::{Record, RecordStore, Storage};
use crate::{CoreError, CoreResult};
use api_shared::{
    AppointmentStatus, PatientListQuery, PatientSummary, PatientView, Permission,
    RegisterPatientReq, Sex, UpdatePatientReq,
};
use camp_types::{EmailAddress, NonEmptyText, PhoneNumber};
use camp_uuid::ShardableUuid;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

const MAX_AGE_YEARS: u8 = 130;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PatientRecord {
    pub id: ShardableUuid,
    pub clinic_id: ShardableUuid,
    pub registration_number: String,
    pub first_name: NonEmptyText,
    pub last_name: NonEmptyText,
    pub sex: Sex,
    pub date_of_birth: Option<NaiveDate>,
    pub age_years: Option<u8>,
    pub phone: Option<PhoneNumber>,
    pub email: Option<EmailAddress>,
    pub address: Option<String>,
    pub camp_id: Option<ShardableUuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PatientRecord {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    /// Age in whole years on `today`, from the date of birth when known.
    pub fn age_on(&self, today: NaiveDate) -> Option<u32> {
        match self.date_of_birth {
            Some(dob) => today.years_since(dob),
            None => self.age_years.map(u32::from),
        }
    }

    fn registration_seq(&self) -> u32 {
        self.registration_number
            .strip_prefix('P')
            .and_then(|n| n.parse().ok())
            .unwrap_or(0)
    }

    fn matches(&self, needle: &str) -> bool {
        let needle = needle.to_lowercase();
        let name = self.full_name().to_lowercase();
        let digits: String = needle.chars().filter(char::is_ascii_digit).collect();

        name.contains(&needle)
            || self.registration_number.to_lowercase().contains(&needle)
            || (!digits.is_empty()
                && self
                    .phone
                    .as_ref()
                    .is_some_and(|p| p.digits().contains(&digits)))
    }
}

impl Record for PatientRecord {
    const COLLECTION: &'static str = "patients";

    fn id(&self) -> &ShardableUuid {
        &self.id
    }
}

impl From<&PatientRecord> for PatientView {
    fn from(p: &PatientRecord) -> Self {
        PatientView {
            id: p.id.to_string(),
            registration_number: p.registration_number.clone(),
            first_name: p.first_name.to_string(),
            last_name: p.last_name.to_string(),
            sex: p.sex,
            date_of_birth: p.date_of_birth,
            age_years: p.age_years,
            phone: p.phone.as_ref().map(ToString::to_string),
            email: p.email.as_ref().map(ToString::to_string),
            address: p.address.clone(),
            camp_id: p.camp_id.as_ref().map(ToString::to_string),
            created_at: p.created_at,
            updated_at: p.updated_at,
        }
    }
}

pub(crate) fn load_patient(store: &RecordStore, patient_id: &ShardableUuid) -> CoreResult<PatientRecord> {
    store.load::<PatientRecord>(patient_id, "patient")
}

fn check_age(date_of_birth: Option<NaiveDate>, age_years: Option<u8>) -> CoreResult<()> {
    match (date_of_birth, age_years) {
        (None, None) => Err(CoreError::invalid(
            "either date_of_birth or age_years is required",
        )),
        (Some(dob), _) if dob > Utc::now().date_naive() => {
            Err(CoreError::invalid("date_of_birth is in the future"))
        }
        (_, Some(age)) if age > MAX_AGE_YEARS => Err(CoreError::invalid(format!(
            "age_years must be at most {}",
            MAX_AGE_YEARS
        ))),
        _ => Ok(()),
    }
}

fn next_registration_number(store: &RecordStore) -> CoreResult<String> {
    let max = store
        .list::<PatientRecord>()?
        .iter()
        .map(PatientRecord::registration_seq)
        .max()
        .unwrap_or(0);
    Ok(format!("P{:06}", max + 1))
}

#[derive(Clone, Debug)]
pub struct PatientService {
    storage: Storage,
}

impl PatientService {
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }

    /// # Errors
    ///
    /// - [`CoreError::InvalidInput`] for missing names, no age information or bad contacts.
    /// - [`CoreError::NotFound`] / [`CoreError::InvalidState`] for an unknown or closed camp.
    pub fn register(&self, principal: &Principal, req: RegisterPatientReq) -> CoreResult<PatientView> {
        principal.require(Permission::RegisterPatients)?;
        let first_name = required_text("first_name", &req.first_name)?;
        let last_name = required_text("last_name", &req.last_name)?;
        check_age(req.date_of_birth, req.age_years)?;
        let phone = optional_phone("phone", req.phone)?;
        let email = optional_email("email", req.email)?;
        let camp_id = optional_id("camp", req.camp_id)?;

        let store = self.storage.tenant(principal.clinic_id());
        let mut tx = store.transaction();
        if let Some(camp_id) = &camp_id {
            ensure_open(&store, camp_id)?;
        }

        let now = Utc::now();
        let patient = PatientRecord {
            id: ShardableUuid::new(),
            clinic_id: principal.clinic_id().clone(),
            registration_number: next_registration_number(&store)?,
            first_name,
            last_name,
            sex: req.sex,
            date_of_birth: req.date_of_birth,
            age_years: req.age_years,
            phone,
            email,
            address: optional_text(req.address),
            camp_id,
            created_at: now,
            updated_at: now,
        };
        tx.put(&patient)?;
        tx.commit()?;

        tracing::info!(
            clinic = %patient.clinic_id,
            patient = %patient.id,
            registration = %patient.registration_number,
            "patient registered"
        );
        Ok((&patient).into())
    }

    pub fn get(&self, principal: &Principal, patient_id: &str) -> CoreResult<PatientView> {
        principal.require(Permission::ViewPatients)?;
        let id = parse_id("patient", patient_id)?;
        Ok((&load_patient(&self.storage.tenant(principal.clinic_id()), &id)?).into())
    }

    pub fn update(
        &self,
        principal: &Principal,
        patient_id: &str,
        req: UpdatePatientReq,
    ) -> CoreResult<PatientView> {
        principal.require(Permission::RegisterPatients)?;
        let id = parse_id("patient", patient_id)?;

        let store = self.storage.tenant(principal.clinic_id());
        let mut tx = store.transaction();
        let mut patient = load_patient(&store, &id)?;

        if let Some(first_name) = req.first_name {
            patient.first_name = required_text("first_name", &first_name)?;
        }
        if let Some(last_name) = req.last_name {
            patient.last_name = required_text("last_name", &last_name)?;
        }
        if let Some(sex) = req.sex {
            patient.sex = sex;
        }
        if req.date_of_birth.is_some() || req.age_years.is_some() {
            patient.date_of_birth = req.date_of_birth.or(patient.date_of_birth);
            patient.age_years = req.age_years.or(patient.age_years);
        }
        check_age(patient.date_of_birth, patient.age_years)?;
        if let Some(phone) = req.phone {
            patient.phone = optional_phone("phone", Some(phone))?;
        }
        if let Some(email) = req.email {
            patient.email = optional_email("email", Some(email))?;
        }
        if let Some(address) = req.address {
            patient.address = optional_text(Some(address));
        }
        if let Some(camp) = req.camp_id {
            patient.camp_id = optional_id("camp", Some(camp))?;
            if let Some(camp_id) = &patient.camp_id {
                ensure_open(&store, camp_id)?;
            }
        }
        patient.updated_at = Utc::now();

        tx.put(&patient)?;
        tx.commit()?;

        tracing::info!(patient = %patient.id, "patient updated");
        Ok((&patient).into())
    }

    /// Patients ordered by registration number, optionally filtered.
    pub fn list(&self, principal: &Principal, query: PatientListQuery) -> CoreResult<Vec<PatientView>> {
        principal.require(Permission::ViewPatients)?;
        self.list_in_clinic(principal.clinic_id(), query)
    }

    /// Operator listing without an authenticated user, for the command line.
    pub fn list_in_clinic(
        &self,
        clinic_id: &ShardableUuid,
        query: PatientListQuery,
    ) -> CoreResult<Vec<PatientView>> {
        let camp_id = optional_id("camp", query.camp_id)?;
        let needle = optional_text(query.q);

        let mut patients: Vec<PatientRecord> = self
            .storage
            .tenant(clinic_id)
            .list::<PatientRecord>()?
            .into_iter()
            .filter(|p| camp_id.is_none() || p.camp_id == camp_id)
            .filter(|p| needle.as_deref().map_or(true, |n| p.matches(n)))
            .collect();
        patients.sort_by_key(PatientRecord::registration_seq);
        Ok(patients.iter().map(PatientView::from).collect())
    }

    /// The patient with counts of everything recorded about them.
    pub fn summary(&self, principal: &Principal, patient_id: &str) -> CoreResult<PatientSummary> {
        principal.require(Permission::ViewPatients)?;
        let id = parse_id("patient", patient_id)?;
        let store = self.storage.tenant(principal.clinic_id());
        let patient = load_patient(&store, &id)?;

        let counts = patient_counts(&self.storage, principal.clinic_id(), &id)?;
        let appointments: Vec<AppointmentRecord> = store
            .list::<AppointmentRecord>()?
            .into_iter()
            .filter(|a| a.patient_id == id)
            .collect();
        let last_attended = appointments
            .iter()
            .filter(|a| {
                matches!(
                    a.status,
                    AppointmentStatus::CheckedIn
                        | AppointmentStatus::InProgress
                        | AppointmentStatus::Completed
                )
            })
            .map(|a| a.scheduled_at)
            .max();

        Ok(PatientSummary {
            patient: (&patient).into(),
            diagnoses: counts.diagnoses,
            active_diagnoses: counts.active_diagnoses,
            treatments: counts.treatments,
            mammography: counts.mammography,
            gp_records: counts.gp_records,
            files: counts.files,
            appointments: appointments.len() as u64,
            last_visit_at: last_attended.max(counts.last_recorded_at),
        })
    }
}
