//! Appointment booking and lifecycle.

use crate::auth::Principal;
use crate::constants::{
    DEFAULT_APPOINTMENT_MINUTES, MAX_APPOINTMENT_MINUTES, MIN_APPOINTMENT_MINUTES,
};
use crate::repositories::camps::ensure_open;
use crate::repositories::helpers::{optional_id, optional_text, parse_id};
use crate::repositories::patients::load_patient;
use crate::repositories::queues::{place_in_queue, Placement};
use crate::repositories::staff::UserRecord;
use crate::store::{Record, RecordStore, Storage};
use crate::{CoreError, CoreResult};
use api_shared::{
    AppointmentListQuery, AppointmentService as Service, AppointmentStatus, AppointmentStatusReq,
    AppointmentStatusRes, AppointmentView, BookAppointmentReq, Permission,
    RescheduleAppointmentReq, UserStatus,
};
use camp_uuid::ShardableUuid;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AppointmentRecord {
    pub id: ShardableUuid,
    pub clinic_id: ShardableUuid,
    pub patient_id: ShardableUuid,
    pub doctor_id: Option<ShardableUuid>,
    pub camp_id: Option<ShardableUuid>,
    pub service: Service,
    pub scheduled_at: DateTime<Utc>,
    pub duration_minutes: u32,
    pub status: AppointmentStatus,
    pub notes: Option<String>,
    pub cancel_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AppointmentRecord {
    pub fn ends_at(&self) -> DateTime<Utc> {
        self.scheduled_at + Duration::minutes(i64::from(self.duration_minutes))
    }

    fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.scheduled_at < end && start < self.ends_at()
    }
}

impl Record for AppointmentRecord {
    const COLLECTION: &'static str = "appointments";

    fn id(&self) -> &ShardableUuid {
        &self.id
    }
}

impl From<&AppointmentRecord> for AppointmentView {
    fn from(a: &AppointmentRecord) -> Self {
        AppointmentView {
            id: a.id.to_string(),
            patient_id: a.patient_id.to_string(),
            doctor_id: a.doctor_id.as_ref().map(ToString::to_string),
            camp_id: a.camp_id.as_ref().map(ToString::to_string),
            service: a.service,
            scheduled_at: a.scheduled_at,
            duration_minutes: a.duration_minutes,
            status: a.status,
            notes: a.notes.clone(),
            cancel_reason: a.cancel_reason.clone(),
            created_at: a.created_at,
            updated_at: a.updated_at,
        }
    }
}

/// Whether an appointment may move from `from` to `to`.
pub fn transition_allowed(from: AppointmentStatus, to: AppointmentStatus) -> bool {
    use AppointmentStatus::*;
    matches!(
        (from, to),
        (Scheduled, CheckedIn)
            | (Scheduled, Cancelled)
            | (Scheduled, NoShow)
            | (CheckedIn, InProgress)
            | (CheckedIn, Cancelled)
            | (InProgress, Completed)
    )
}

fn check_duration(minutes: Option<u32>) -> CoreResult<u32> {
    let minutes = minutes.unwrap_or(DEFAULT_APPOINTMENT_MINUTES);
    if !(MIN_APPOINTMENT_MINUTES..=MAX_APPOINTMENT_MINUTES).contains(&minutes) {
        return Err(CoreError::invalid(format!(
            "duration_minutes must be between {} and {}",
            MIN_APPOINTMENT_MINUTES, MAX_APPOINTMENT_MINUTES
        )));
    }
    Ok(minutes)
}

fn ensure_active_doctor(store: &RecordStore, doctor_id: &ShardableUuid) -> CoreResult<()> {
    let doctor = store.load::<UserRecord>(doctor_id, "doctor")?;
    if doctor.status != UserStatus::Active {
        return Err(CoreError::InvalidState(format!(
            "{} is disabled and cannot take appointments",
            doctor.name
        )));
    }
    Ok(())
}

/// Rejects a slot that overlaps another non-cancelled appointment of the same doctor.
fn ensure_doctor_free(
    store: &RecordStore,
    doctor_id: &ShardableUuid,
    start: DateTime<Utc>,
    minutes: u32,
    ignore: Option<&ShardableUuid>,
) -> CoreResult<()> {
    let end = start + Duration::minutes(i64::from(minutes));
    let clash = store.list::<AppointmentRecord>()?.into_iter().find(|a| {
        a.doctor_id.as_ref() == Some(doctor_id)
            && a.status != AppointmentStatus::Cancelled
            && Some(&a.id) != ignore
            && a.overlaps(start, end)
    });
    match clash {
        Some(existing) => Err(CoreError::Conflict(format!(
            "doctor already has an appointment from {} to {}",
            existing.scheduled_at.format("%Y-%m-%d %H:%M"),
            existing.ends_at().format("%H:%M")
        ))),
        None => Ok(()),
    }
}

#[derive(Clone, Debug)]
pub struct AppointmentService {
    storage: Storage,
}

impl AppointmentService {
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }

    /// # Errors
    ///
    /// - [`CoreError::NotFound`] for an unknown patient, doctor or camp.
    /// - [`CoreError::InvalidState`] for a disabled doctor or a closed camp.
    /// - [`CoreError::Conflict`] when the doctor is already booked for an overlapping slot.
    pub fn book(&self, principal: &Principal, req: BookAppointmentReq) -> CoreResult<AppointmentView> {
        principal.require(Permission::ManageAppointments)?;
        let patient_id = parse_id("patient", &req.patient_id)?;
        let doctor_id = optional_id("doctor", req.doctor_id)?;
        let camp_id = optional_id("camp", req.camp_id)?;
        let duration_minutes = check_duration(req.duration_minutes)?;

        let store = self.storage.tenant(principal.clinic_id());
        let mut tx = store.transaction();
        load_patient(&store, &patient_id)?;
        if let Some(camp_id) = &camp_id {
            ensure_open(&store, camp_id)?;
        }
        if let Some(doctor_id) = &doctor_id {
            ensure_active_doctor(&store, doctor_id)?;
            ensure_doctor_free(&store, doctor_id, req.scheduled_at, duration_minutes, None)?;
        }

        let now = Utc::now();
        let appointment = AppointmentRecord {
            id: ShardableUuid::new(),
            clinic_id: principal.clinic_id().clone(),
            patient_id,
            doctor_id,
            camp_id,
            service: req.service,
            scheduled_at: req.scheduled_at,
            duration_minutes,
            status: AppointmentStatus::Scheduled,
            notes: optional_text(req.notes),
            cancel_reason: None,
            created_at: now,
            updated_at: now,
        };
        tx.put(&appointment)?;
        tx.commit()?;

        tracing::info!(
            appointment = %appointment.id,
            service = %appointment.service,
            "appointment booked"
        );
        Ok((&appointment).into())
    }

    /// Appointments matching every given filter, earliest first.
    pub fn list(
        &self,
        principal: &Principal,
        query: AppointmentListQuery,
    ) -> CoreResult<Vec<AppointmentView>> {
        principal.require(Permission::ViewPatients)?;
        let doctor_id = optional_id("doctor", query.doctor_id)?;
        let patient_id = optional_id("patient", query.patient_id)?;
        let camp_id = optional_id("camp", query.camp_id)?;

        let mut appointments: Vec<AppointmentRecord> = self
            .storage
            .tenant(principal.clinic_id())
            .list::<AppointmentRecord>()?
            .into_iter()
            .filter(|a| query.date.map_or(true, |d| a.scheduled_at.date_naive() == d))
            .filter(|a| doctor_id.is_none() || a.doctor_id == doctor_id)
            .filter(|a| patient_id.as_ref().map_or(true, |p| &a.patient_id == p))
            .filter(|a| camp_id.is_none() || a.camp_id == camp_id)
            .filter(|a| query.status.map_or(true, |s| a.status == s))
            .collect();
        appointments.sort_by_key(|a| a.scheduled_at);
        Ok(appointments.iter().map(AppointmentView::from).collect())
    }

    pub fn get(&self, principal: &Principal, appointment_id: &str) -> CoreResult<AppointmentView> {
        principal.require(Permission::ViewPatients)?;
        let id = parse_id("appointment", appointment_id)?;
        let appointment = self
            .storage
            .tenant(principal.clinic_id())
            .load::<AppointmentRecord>(&id, "appointment")?;
        Ok((&appointment).into())
    }

    /// Moves a scheduled appointment, re-checking the doctor's availability.
    pub fn reschedule(
        &self,
        principal: &Principal,
        appointment_id: &str,
        req: RescheduleAppointmentReq,
    ) -> CoreResult<AppointmentView> {
        principal.require(Permission::ManageAppointments)?;
        let id = parse_id("appointment", appointment_id)?;

        let store = self.storage.tenant(principal.clinic_id());
        let mut tx = store.transaction();
        let mut appointment = store.load::<AppointmentRecord>(&id, "appointment")?;
        if appointment.status != AppointmentStatus::Scheduled {
            return Err(CoreError::InvalidState(format!(
                "only scheduled appointments can be rescheduled (status is {})",
                appointment.status
            )));
        }

        let duration_minutes = check_duration(req.duration_minutes.or(Some(appointment.duration_minutes)))?;
        if let Some(doctor_id) = &appointment.doctor_id {
            ensure_doctor_free(&store, doctor_id, req.scheduled_at, duration_minutes, Some(&id))?;
        }

        appointment.scheduled_at = req.scheduled_at;
        appointment.duration_minutes = duration_minutes;
        appointment.updated_at = Utc::now();
        tx.put(&appointment)?;
        tx.commit()?;

        tracing::info!(appointment = %appointment.id, "appointment rescheduled");
        Ok((&appointment).into())
    }

    /// Applies a status transition. Checking in also queues the patient for today.
    ///
    /// # Errors
    ///
    /// [`CoreError::InvalidState`] for transitions outside the lifecycle.
    pub fn update_status(
        &self,
        principal: &Principal,
        appointment_id: &str,
        req: AppointmentStatusReq,
    ) -> CoreResult<AppointmentStatusRes> {
        principal.require(Permission::ManageAppointments)?;
        let id = parse_id("appointment", appointment_id)?;

        let store = self.storage.tenant(principal.clinic_id());
        let mut tx = store.transaction();
        let mut appointment = store.load::<AppointmentRecord>(&id, "appointment")?;
        if !transition_allowed(appointment.status, req.status) {
            return Err(CoreError::InvalidState(format!(
                "cannot move appointment from {} to {}",
                appointment.status, req.status
            )));
        }

        let now = Utc::now();
        let mut queue_entry = None;
        if req.status == AppointmentStatus::CheckedIn {
            if let Some(camp_id) = &appointment.camp_id {
                ensure_open(&store, camp_id)?;
            }
            let placement = place_in_queue(
                &mut tx,
                &store,
                principal.clinic_id(),
                &appointment.patient_id,
                Some(&appointment.id),
                appointment.camp_id.as_ref(),
                now,
            )?;
            queue_entry = Some(match placement {
                Placement::Added(entry) | Placement::AlreadyQueued(entry) => entry,
            });
        }
        if req.status == AppointmentStatus::Cancelled {
            appointment.cancel_reason = optional_text(req.reason);
        }

        appointment.status = req.status;
        appointment.updated_at = now;
        tx.put(&appointment)?;
        tx.commit()?;

        tracing::info!(appointment = %appointment.id, status = %appointment.status, "appointment status changed");
        Ok(AppointmentStatusRes {
            appointment: (&appointment).into(),
            queue_entry: queue_entry.as_ref().map(Into::into),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::camps::tests::create_camp;
    use crate::repositories::camps::CampService;
    use crate::repositories::clinics::tests::onboard_test_clinic;
    use crate::repositories::patients::tests::register;
    use crate::repositories::staff::tests::add_staff;
    use crate::repositories::staff::StaffService;
    use crate::store::tests::test_storage;
    use api_shared::{CampStatus, QueueStatus, UpdateCampReq};
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, hour, minute, 0).unwrap()
    }

    fn book_req(patient_id: &str, doctor_id: Option<&str>, start: DateTime<Utc>) -> BookAppointmentReq {
        BookAppointmentReq {
            patient_id: patient_id.into(),
            doctor_id: doctor_id.map(String::from),
            camp_id: None,
            service: Service::GeneralPhysician,
            scheduled_at: start,
            duration_minutes: Some(30),
            notes: None,
        }
    }

    #[test]
    fn lifecycle_table() {
        use AppointmentStatus::*;
        assert!(transition_allowed(Scheduled, CheckedIn));
        assert!(transition_allowed(CheckedIn, Cancelled));
        assert!(transition_allowed(InProgress, Completed));
        assert!(!transition_allowed(Scheduled, Completed));
        assert!(!transition_allowed(Completed, Cancelled));
        assert!(!transition_allowed(NoShow, CheckedIn));
        assert!(!transition_allowed(Cancelled, Scheduled));
    }

    #[test]
    fn overlapping_bookings_for_one_doctor_conflict() {
        let temp = TempDir::new().unwrap();
        let storage = test_storage(&temp);
        let admin = onboard_test_clinic(&storage, "hope-clinic");
        let doctor = add_staff(&storage, &admin, "doctor", "doc@hope.example");
        let doctor_id = doctor.user_id().to_string();
        let service = AppointmentService::new(storage.clone());
        let a = register(&storage, &admin, "Asha");
        let b = register(&storage, &admin, "Bina");

        let first = service
            .book(&admin, book_req(&a.id, Some(&doctor_id), at(10, 0)))
            .unwrap();
        assert_eq!(first.status, AppointmentStatus::Scheduled);

        let clash = service.book(&admin, book_req(&b.id, Some(&doctor_id), at(10, 15)));
        assert!(matches!(clash, Err(CoreError::Conflict(_))));

        // Back-to-back is fine, and so is the same slot without a doctor.
        service
            .book(&admin, book_req(&b.id, Some(&doctor_id), at(10, 30)))
            .unwrap();
        service.book(&admin, book_req(&b.id, None, at(10, 0))).unwrap();

        // Cancelling frees the slot.
        service
            .update_status(
                &admin,
                &first.id,
                AppointmentStatusReq {
                    status: AppointmentStatus::Cancelled,
                    reason: Some("patient travelling".into()),
                },
            )
            .unwrap();
        let rebooked = service
            .book(&admin, book_req(&b.id, Some(&doctor_id), at(10, 0)))
            .unwrap();
        assert_eq!(rebooked.scheduled_at, at(10, 0));

        let cancelled = service.get(&admin, &first.id).unwrap();
        assert_eq!(cancelled.cancel_reason.as_deref(), Some("patient travelling"));
    }

    #[test]
    fn booking_validates_doctor_duration_and_camp() {
        let temp = TempDir::new().unwrap();
        let storage = test_storage(&temp);
        let admin = onboard_test_clinic(&storage, "hope-clinic");
        let doctor = add_staff(&storage, &admin, "doctor", "doc@hope.example");
        let service = AppointmentService::new(storage.clone());
        let patient = register(&storage, &admin, "Asha");

        let mut too_long = book_req(&patient.id, None, at(9, 0));
        too_long.duration_minutes = Some(600);
        assert!(matches!(service.book(&admin, too_long), Err(CoreError::InvalidInput(_))));

        let mut defaulted = book_req(&patient.id, None, at(9, 0));
        defaulted.duration_minutes = None;
        assert_eq!(service.book(&admin, defaulted).unwrap().duration_minutes, 15);

        let ghost = ShardableUuid::new().to_string();
        assert!(matches!(
            service.book(&admin, book_req(&patient.id, Some(&ghost), at(9, 0))),
            Err(CoreError::NotFound(_))
        ));

        StaffService::new(storage.clone())
            .set_staff_status(&admin, &doctor.user_id().to_string(), UserStatus::Disabled)
            .unwrap();
        assert!(matches!(
            service.book(
                &admin,
                book_req(&patient.id, Some(&doctor.user_id().to_string()), at(9, 0))
            ),
            Err(CoreError::InvalidState(_))
        ));

        let camp = create_camp(&storage, &admin, "Screening");
        CampService::new(storage)
            .update(
                &admin,
                &camp.id,
                UpdateCampReq {
                    status: Some(CampStatus::Closed),
                    ..Default::default()
                },
            )
            .unwrap();
        let mut closed = book_req(&patient.id, None, at(9, 0));
        closed.camp_id = Some(camp.id);
        assert!(matches!(service.book(&admin, closed), Err(CoreError::InvalidState(_))));
    }

    #[test]
    fn check_in_queues_the_patient_once() {
        let temp = TempDir::new().unwrap();
        let storage = test_storage(&temp);
        let admin = onboard_test_clinic(&storage, "hope-clinic");
        let service = AppointmentService::new(storage.clone());
        let patient = register(&storage, &admin, "Asha");
        let booked = service.book(&admin, book_req(&patient.id, None, at(9, 0))).unwrap();

        let status = |s: AppointmentStatus| {
            service.update_status(
                &admin,
                &booked.id,
                AppointmentStatusReq {
                    status: s,
                    reason: None,
                },
            )
        };

        assert!(matches!(
            status(AppointmentStatus::Completed),
            Err(CoreError::InvalidState(_))
        ));

        let checked_in = status(AppointmentStatus::CheckedIn).unwrap();
        let entry = checked_in.queue_entry.unwrap();
        assert_eq!(entry.token_number, 1);
        assert_eq!(entry.status, QueueStatus::Waiting);
        assert_eq!(entry.appointment_id.as_deref(), Some(booked.id.as_str()));
        assert_eq!(entry.queue_date, Utc::now().date_naive());

        assert!(status(AppointmentStatus::InProgress).unwrap().queue_entry.is_none());
        assert_eq!(
            status(AppointmentStatus::Completed).unwrap().appointment.status,
            AppointmentStatus::Completed
        );
        assert!(matches!(
            service.reschedule(
                &admin,
                &booked.id,
                RescheduleAppointmentReq {
                    scheduled_at: at(11, 0),
                    duration_minutes: None,
                }
            ),
            Err(CoreError::InvalidState(_))
        ));
    }

    #[test]
    fn reschedule_rechecks_overlap_but_ignores_itself() {
        let temp = TempDir::new().unwrap();
        let storage = test_storage(&temp);
        let admin = onboard_test_clinic(&storage, "hope-clinic");
        let doctor = add_staff(&storage, &admin, "doctor", "doc@hope.example");
        let doctor_id = doctor.user_id().to_string();
        let service = AppointmentService::new(storage.clone());
        let patient = register(&storage, &admin, "Asha");

        let first = service
            .book(&admin, book_req(&patient.id, Some(&doctor_id), at(9, 0)))
            .unwrap();
        service
            .book(&admin, book_req(&patient.id, Some(&doctor_id), at(11, 0)))
            .unwrap();

        let moved = service
            .reschedule(
                &admin,
                &first.id,
                RescheduleAppointmentReq {
                    scheduled_at: at(9, 10),
                    duration_minutes: Some(20),
                },
            )
            .unwrap();
        assert_eq!(moved.duration_minutes, 20);

        let clash = service.reschedule(
            &admin,
            &first.id,
            RescheduleAppointmentReq {
                scheduled_at: at(10, 45),
                duration_minutes: None,
            },
        );
        assert!(matches!(clash, Err(CoreError::Conflict(_))));

        let by_doctor = service
            .list(
                &doctor,
                AppointmentListQuery {
                    doctor_id: Some(doctor_id),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(by_doctor.len(), 2);
        assert_eq!(by_doctor[0].id, first.id);
    }
}
