//! Walk-in and check-in queues.
//!
//! A queue is identified by clinic, date and optional camp. Tokens start at 1 in every queue and
//! are never reused, even after an entry is skipped.

use crate::auth::Principal;
use crate::repositories::appointments::AppointmentRecord;
use crate::repositories::camps::ensure_open;
use crate::repositories::helpers::{optional_id, parse_id};
use crate::repositories::patients::load_patient;
use crate::store::{Record, RecordStore, Storage, Transaction};
use crate::{CoreError, CoreResult};
use api_shared::{EnqueueReq, Permission, QueueEntryView, QueueSelector, QueueStatus};
use camp_uuid::ShardableUuid;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QueueEntryRecord {
    pub id: ShardableUuid,
    pub clinic_id: ShardableUuid,
    pub patient_id: ShardableUuid,
    pub appointment_id: Option<ShardableUuid>,
    pub camp_id: Option<ShardableUuid>,
    pub queue_date: NaiveDate,
    pub token_number: u32,
    pub status: QueueStatus,
    pub enqueued_at: DateTime<Utc>,
    pub called_at: Option<DateTime<Utc>>,
    pub served_at: Option<DateTime<Utc>>,
}

impl QueueEntryRecord {
    fn in_queue(&self, date: NaiveDate, camp_id: Option<&ShardableUuid>) -> bool {
        self.queue_date == date && self.camp_id.as_ref() == camp_id
    }

    fn is_active(&self) -> bool {
        matches!(self.status, QueueStatus::Waiting | QueueStatus::Called)
    }

    /// Minutes between joining the queue and being called.
    pub fn wait_minutes(&self) -> Option<f64> {
        self.called_at
            .map(|called| (called - self.enqueued_at).num_seconds() as f64 / 60.0)
    }
}

impl Record for QueueEntryRecord {
    const COLLECTION: &'static str = "queue";

    fn id(&self) -> &ShardableUuid {
        &self.id
    }
}

impl From<&QueueEntryRecord> for QueueEntryView {
    fn from(q: &QueueEntryRecord) -> Self {
        QueueEntryView {
            id: q.id.to_string(),
            patient_id: q.patient_id.to_string(),
            appointment_id: q.appointment_id.as_ref().map(ToString::to_string),
            camp_id: q.camp_id.as_ref().map(ToString::to_string),
            queue_date: q.queue_date,
            token_number: q.token_number,
            status: q.status,
            enqueued_at: q.enqueued_at,
            called_at: q.called_at,
            served_at: q.served_at,
        }
    }
}

/// Result of placing a patient in a queue.
pub(crate) enum Placement {
    Added(QueueEntryRecord),
    /// The patient was already waiting or called in this queue.
    AlreadyQueued(QueueEntryRecord),
}

/// Stages a new entry in `tx` unless the patient already holds an active one in the same queue.
pub(crate) fn place_in_queue(
    tx: &mut Transaction<'_>,
    store: &RecordStore,
    clinic_id: &ShardableUuid,
    patient_id: &ShardableUuid,
    appointment_id: Option<&ShardableUuid>,
    camp_id: Option<&ShardableUuid>,
    now: DateTime<Utc>,
) -> CoreResult<Placement> {
    let date = now.date_naive();
    let queue: Vec<QueueEntryRecord> = store
        .list::<QueueEntryRecord>()?
        .into_iter()
        .filter(|e| e.in_queue(date, camp_id))
        .collect();

    if let Some(existing) = queue
        .iter()
        .find(|e| &e.patient_id == patient_id && e.is_active())
    {
        return Ok(Placement::AlreadyQueued(existing.clone()));
    }

    let token_number = queue.iter().map(|e| e.token_number).max().unwrap_or(0) + 1;
    let entry = QueueEntryRecord {
        id: ShardableUuid::new(),
        clinic_id: clinic_id.clone(),
        patient_id: patient_id.clone(),
        appointment_id: appointment_id.cloned(),
        camp_id: camp_id.cloned(),
        queue_date: date,
        token_number,
        status: QueueStatus::Waiting,
        enqueued_at: now,
        called_at: None,
        served_at: None,
    };
    tx.put(&entry)?;
    Ok(Placement::Added(entry))
}

#[derive(Clone, Debug)]
pub struct QueueService {
    storage: Storage,
}

impl QueueService {
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }

    /// Adds a patient to today's queue.
    ///
    /// # Errors
    ///
    /// [`CoreError::Conflict`] if the patient is already waiting or called in that queue.
    pub fn enqueue(&self, principal: &Principal, req: EnqueueReq) -> CoreResult<QueueEntryView> {
        principal.require(Permission::ManageQueue)?;
        let patient_id = parse_id("patient", &req.patient_id)?;
        let appointment_id = optional_id("appointment", req.appointment_id)?;
        let camp_id = optional_id("camp", req.camp_id)?;

        let store = self.storage.tenant(principal.clinic_id());
        let mut tx = store.transaction();
        load_patient(&store, &patient_id)?;
        if let Some(appointment_id) = &appointment_id {
            let appointment = store.load::<AppointmentRecord>(appointment_id, "appointment")?;
            if appointment.patient_id != patient_id {
                return Err(CoreError::invalid(
                    "appointment belongs to a different patient",
                ));
            }
        }
        if let Some(camp_id) = &camp_id {
            ensure_open(&store, camp_id)?;
        }

        let placement = place_in_queue(
            &mut tx,
            &store,
            principal.clinic_id(),
            &patient_id,
            appointment_id.as_ref(),
            camp_id.as_ref(),
            Utc::now(),
        )?;
        match placement {
            Placement::Added(entry) => {
                tx.commit()?;
                tracing::info!(patient = %entry.patient_id, token = entry.token_number, "patient queued");
                Ok((&entry).into())
            }
            Placement::AlreadyQueued(existing) => Err(CoreError::Conflict(format!(
                "patient already holds token {} in this queue",
                existing.token_number
            ))),
        }
    }

    /// One queue, ordered by token.
    pub fn list(&self, principal: &Principal, selector: QueueSelector) -> CoreResult<Vec<QueueEntryView>> {
        principal.require(Permission::ViewPatients)?;
        let (date, camp_id) = resolve_selector(selector)?;
        let mut entries: Vec<QueueEntryRecord> = self
            .storage
            .tenant(principal.clinic_id())
            .list::<QueueEntryRecord>()?
            .into_iter()
            .filter(|e| e.in_queue(date, camp_id.as_ref()))
            .collect();
        entries.sort_by_key(|e| e.token_number);
        Ok(entries.iter().map(QueueEntryView::from).collect())
    }

    /// Calls the lowest waiting token.
    ///
    /// # Errors
    ///
    /// [`CoreError::NotFound`] when nobody is waiting.
    pub fn call_next(&self, principal: &Principal, selector: QueueSelector) -> CoreResult<QueueEntryView> {
        principal.require(Permission::ManageQueue)?;
        let (date, camp_id) = resolve_selector(selector)?;

        let store = self.storage.tenant(principal.clinic_id());
        let mut tx = store.transaction();
        let mut next = store
            .list::<QueueEntryRecord>()?
            .into_iter()
            .filter(|e| e.in_queue(date, camp_id.as_ref()) && e.status == QueueStatus::Waiting)
            .min_by_key(|e| e.token_number)
            .ok_or_else(|| CoreError::not_found("waiting patient"))?;

        next.status = QueueStatus::Called;
        next.called_at = Some(Utc::now());
        tx.put(&next)?;
        tx.commit()?;

        tracing::info!(token = next.token_number, date = %date, "queue token called");
        Ok((&next).into())
    }

    /// Marks a called entry as served.
    pub fn serve(&self, principal: &Principal, entry_id: &str) -> CoreResult<QueueEntryView> {
        self.transition(principal, entry_id, QueueStatus::Served, &[QueueStatus::Called])
    }

    /// Skips a waiting or called entry. Its token is not reused.
    pub fn skip(&self, principal: &Principal, entry_id: &str) -> CoreResult<QueueEntryView> {
        self.transition(
            principal,
            entry_id,
            QueueStatus::Skipped,
            &[QueueStatus::Waiting, QueueStatus::Called],
        )
    }

    fn transition(
        &self,
        principal: &Principal,
        entry_id: &str,
        to: QueueStatus,
        allowed_from: &[QueueStatus],
    ) -> CoreResult<QueueEntryView> {
        principal.require(Permission::ManageQueue)?;
        let id = parse_id("queue entry", entry_id)?;

        let store = self.storage.tenant(principal.clinic_id());
        let mut tx = store.transaction();
        let mut entry = store.load::<QueueEntryRecord>(&id, "queue entry")?;
        if !allowed_from.contains(&entry.status) {
            return Err(CoreError::InvalidState(format!(
                "queue entry is {}, cannot mark it {}",
                entry.status, to
            )));
        }

        entry.status = to;
        if to == QueueStatus::Served {
            entry.served_at = Some(Utc::now());
        }
        tx.put(&entry)?;
        tx.commit()?;

        tracing::info!(token = entry.token_number, status = %to, "queue entry updated");
        Ok((&entry).into())
    }
}

fn resolve_selector(selector: QueueSelector) -> CoreResult<(NaiveDate, Option<ShardableUuid>)> {
    let date = selector.date.unwrap_or_else(|| Utc::now().date_naive());
    Ok((date, optional_id("camp", selector.camp_id)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::camps::tests::create_camp;
    use crate::repositories::clinics::tests::onboard_test_clinic;
    use crate::repositories::patients::tests::register;
    use crate::store::tests::test_storage;
    use tempfile::TempDir;

    fn enqueue(
        service: &QueueService,
        principal: &Principal,
        patient_id: &str,
        camp: Option<&str>,
    ) -> CoreResult<QueueEntryView> {
        service.enqueue(
            principal,
            EnqueueReq {
                patient_id: patient_id.into(),
                appointment_id: None,
                camp_id: camp.map(String::from),
            },
        )
    }

    #[test]
    fn tokens_are_sequential_per_queue() {
        let temp = TempDir::new().unwrap();
        let storage = test_storage(&temp);
        let admin = onboard_test_clinic(&storage, "hope-clinic");
        let camp = create_camp(&storage, &admin, "Screening");
        let service = QueueService::new(storage.clone());

        let a = register(&storage, &admin, "Asha");
        let b = register(&storage, &admin, "Bina");

        assert_eq!(enqueue(&service, &admin, &a.id, None).unwrap().token_number, 1);
        assert_eq!(enqueue(&service, &admin, &b.id, None).unwrap().token_number, 2);
        // The camp queue is separate.
        assert_eq!(enqueue(&service, &admin, &a.id, Some(&camp.id)).unwrap().token_number, 1);

        let dup = enqueue(&service, &admin, &a.id, None);
        assert!(matches!(dup, Err(CoreError::Conflict(_))));

        let listed = service.list(&admin, QueueSelector::default()).unwrap();
        assert_eq!(listed.iter().map(|e| e.token_number).collect::<Vec<_>>(), vec![1, 2]);
    }

    #[test]
    fn call_serve_and_skip_follow_the_queue() {
        let temp = TempDir::new().unwrap();
        let storage = test_storage(&temp);
        let admin = onboard_test_clinic(&storage, "hope-clinic");
        let service = QueueService::new(storage.clone());

        let a = register(&storage, &admin, "Asha");
        let b = register(&storage, &admin, "Bina");
        let first = enqueue(&service, &admin, &a.id, None).unwrap();
        let second = enqueue(&service, &admin, &b.id, None).unwrap();

        // Serving needs a called entry.
        assert!(matches!(
            service.serve(&admin, &first.id),
            Err(CoreError::InvalidState(_))
        ));

        let called = service.call_next(&admin, QueueSelector::default()).unwrap();
        assert_eq!(called.id, first.id);
        assert_eq!(called.status, QueueStatus::Called);
        assert!(called.called_at.is_some());

        let served = service.serve(&admin, &first.id).unwrap();
        assert!(served.served_at.is_some());

        service.skip(&admin, &second.id).unwrap();
        assert!(matches!(
            service.call_next(&admin, QueueSelector::default()),
            Err(CoreError::NotFound(_))
        ));
        assert!(matches!(
            service.skip(&admin, &second.id),
            Err(CoreError::InvalidState(_))
        ));

        // A served patient may rejoin with a fresh token.
        assert_eq!(enqueue(&service, &admin, &a.id, None).unwrap().token_number, 3);
    }

    #[test]
    fn unknown_patients_cannot_queue() {
        let temp = TempDir::new().unwrap();
        let storage = test_storage(&temp);
        let admin = onboard_test_clinic(&storage, "hope-clinic");
        let service = QueueService::new(storage);

        let err = enqueue(&service, &admin, &ShardableUuid::new().to_string(), None).unwrap_err();
        assert!(matches!(err, CoreError::NotFound(_)));
    }
}
