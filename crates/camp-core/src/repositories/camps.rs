//! Health camps: time-boxed outreach events that patients, appointments and queues attach to.

use crate::auth::Principal;
use crate::repositories::helpers::{parse_id, required_text};
use crate::store::{Record, RecordStore, Storage};
use crate::{CoreError, CoreResult};
use api_shared::{CampStatus, CampView, CreateCampReq, Permission, UpdateCampReq};
use camp_types::NonEmptyText;
use camp_uuid::ShardableUuid;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CampRecord {
    pub id: ShardableUuid,
    pub clinic_id: ShardableUuid,
    pub name: NonEmptyText,
    pub location: NonEmptyText,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub status: CampStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Record for CampRecord {
    const COLLECTION: &'static str = "camps";

    fn id(&self) -> &ShardableUuid {
        &self.id
    }
}

impl From<&CampRecord> for CampView {
    fn from(c: &CampRecord) -> Self {
        CampView {
            id: c.id.to_string(),
            name: c.name.to_string(),
            location: c.location.to_string(),
            start_date: c.start_date,
            end_date: c.end_date,
            status: c.status,
            created_at: c.created_at,
            updated_at: c.updated_at,
        }
    }
}

fn check_dates(start: NaiveDate, end: NaiveDate) -> CoreResult<()> {
    if end < start {
        return Err(CoreError::invalid(format!(
            "end_date {} is before start_date {}",
            end, start
        )));
    }
    Ok(())
}

/// Loads a camp that can still take new patients, appointments and queue entries.
///
/// # Errors
///
/// [`CoreError::NotFound`] for unknown camps, [`CoreError::InvalidState`] for closed ones.
pub(crate) fn ensure_open(store: &RecordStore, camp_id: &ShardableUuid) -> CoreResult<CampRecord> {
    let camp = store.load::<CampRecord>(camp_id, "camp")?;
    if camp.status == CampStatus::Closed {
        return Err(CoreError::InvalidState(format!("camp '{}' is closed", camp.name)));
    }
    Ok(camp)
}

#[derive(Clone, Debug)]
pub struct CampService {
    storage: Storage,
}

impl CampService {
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }

    pub fn create(&self, principal: &Principal, req: CreateCampReq) -> CoreResult<CampView> {
        principal.require(Permission::ManageCamps)?;
        let name = required_text("name", &req.name)?;
        let location = required_text("location", &req.location)?;
        check_dates(req.start_date, req.end_date)?;

        let now = Utc::now();
        let camp = CampRecord {
            id: ShardableUuid::new(),
            clinic_id: principal.clinic_id().clone(),
            name,
            location,
            start_date: req.start_date,
            end_date: req.end_date,
            status: req.status.unwrap_or(CampStatus::Planned),
            created_at: now,
            updated_at: now,
        };

        let store = self.storage.tenant(principal.clinic_id());
        let mut tx = store.transaction();
        tx.put(&camp)?;
        tx.commit()?;

        tracing::info!(clinic = %camp.clinic_id, camp = %camp.id, "camp created");
        Ok((&camp).into())
    }

    /// Camps ordered by start date, most recent first.
    pub fn list(&self, principal: &Principal) -> CoreResult<Vec<CampView>> {
        principal.require(Permission::ViewPatients)?;
        let mut camps = self.storage.tenant(principal.clinic_id()).list::<CampRecord>()?;
        camps.sort_by(|a, b| {
            b.start_date
                .cmp(&a.start_date)
                .then_with(|| a.name.as_str().cmp(b.name.as_str()))
        });
        Ok(camps.iter().map(CampView::from).collect())
    }

    pub fn get(&self, principal: &Principal, camp_id: &str) -> CoreResult<CampView> {
        principal.require(Permission::ViewPatients)?;
        let id = parse_id("camp", camp_id)?;
        let camp = self
            .storage
            .tenant(principal.clinic_id())
            .load::<CampRecord>(&id, "camp")?;
        Ok((&camp).into())
    }

    pub fn update(
        &self,
        principal: &Principal,
        camp_id: &str,
        req: UpdateCampReq,
    ) -> CoreResult<CampView> {
        principal.require(Permission::ManageCamps)?;
        let id = parse_id("camp", camp_id)?;

        let store = self.storage.tenant(principal.clinic_id());
        let mut tx = store.transaction();
        let mut camp = store.load::<CampRecord>(&id, "camp")?;

        if let Some(name) = req.name {
            camp.name = required_text("name", &name)?;
        }
        if let Some(location) = req.location {
            camp.location = required_text("location", &location)?;
        }
        camp.start_date = req.start_date.unwrap_or(camp.start_date);
        camp.end_date = req.end_date.unwrap_or(camp.end_date);
        check_dates(camp.start_date, camp.end_date)?;
        if let Some(status) = req.status {
            camp.status = status;
        }
        camp.updated_at = Utc::now();

        tx.put(&camp)?;
        tx.commit()?;

        tracing::info!(camp = %camp.id, status = %camp.status, "camp updated");
        Ok((&camp).into())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::repositories::clinics::tests::onboard_test_clinic;
    use crate::repositories::staff::tests::add_staff;
    use crate::store::tests::test_storage;
    use tempfile::TempDir;

    pub(crate) fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    pub(crate) fn create_camp(storage: &Storage, admin: &Principal, name: &str) -> CampView {
        CampService::new(storage.clone())
            .create(
                admin,
                CreateCampReq {
                    name: name.into(),
                    location: "Village hall".into(),
                    start_date: date(2026, 3, 1),
                    end_date: date(2026, 3, 3),
                    status: Some(CampStatus::Active),
                },
            )
            .unwrap()
    }

    #[test]
    fn end_date_must_not_precede_start() {
        let temp = TempDir::new().unwrap();
        let storage = test_storage(&temp);
        let admin = onboard_test_clinic(&storage, "hope-clinic");
        let service = CampService::new(storage.clone());

        let err = service
            .create(
                &admin,
                CreateCampReq {
                    name: "Screening".into(),
                    location: "School".into(),
                    start_date: date(2026, 3, 5),
                    end_date: date(2026, 3, 4),
                    status: None,
                },
            )
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidInput(_)));

        let camp = create_camp(&storage, &admin, "Screening");
        let err = service
            .update(
                &admin,
                &camp.id,
                UpdateCampReq {
                    end_date: Some(date(2026, 2, 1)),
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidInput(_)));
    }

    #[test]
    fn closed_camps_are_not_open() {
        let temp = TempDir::new().unwrap();
        let storage = test_storage(&temp);
        let admin = onboard_test_clinic(&storage, "hope-clinic");
        let service = CampService::new(storage.clone());
        let camp = create_camp(&storage, &admin, "Screening");
        let camp_id = ShardableUuid::parse(&camp.id).unwrap();
        let store = storage.tenant(admin.clinic_id());

        assert!(ensure_open(&store, &camp_id).is_ok());

        let closed = service
            .update(
                &admin,
                &camp.id,
                UpdateCampReq {
                    status: Some(CampStatus::Closed),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(closed.status, CampStatus::Closed);
        assert!(matches!(
            ensure_open(&store, &camp_id),
            Err(CoreError::InvalidState(_))
        ));
        assert!(matches!(
            ensure_open(&store, &ShardableUuid::new()),
            Err(CoreError::NotFound(_))
        ));
    }

    #[test]
    fn only_camp_managers_create_camps() {
        let temp = TempDir::new().unwrap();
        let storage = test_storage(&temp);
        let admin = onboard_test_clinic(&storage, "hope-clinic");
        let doctor = add_staff(&storage, &admin, "doctor", "doc@hope.example");
        create_camp(&storage, &admin, "Older");

        let service = CampService::new(storage);
        let err = service
            .create(
                &doctor,
                CreateCampReq {
                    name: "Nope".into(),
                    location: "Nowhere".into(),
                    start_date: date(2026, 1, 1),
                    end_date: date(2026, 1, 1),
                    status: None,
                },
            )
            .unwrap_err();
        assert!(matches!(err, CoreError::Forbidden(_)));
        assert_eq!(service.list(&doctor).unwrap().len(), 1);
    }
}
