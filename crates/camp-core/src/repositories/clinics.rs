//! Clinic (tenant) onboarding and profile management.

use crate::auth::{hash_password, Principal};
use crate::constants::{ADMIN_ROLE_NAME, CLINIC_FILE_NAME};
use crate::repositories::helpers::{optional_phone, optional_text, parse_email, required_text};
use crate::repositories::staff::{built_in_roles, RoleRecord, UserRecord};
use crate::store::{read_yaml, scan_sharded, Storage};
use crate::{CoreError, CoreResult};
use api_shared::{
    ClinicStatus, ClinicView, OnboardClinicReq, OnboardClinicRes, Permission, StaffView,
    UpdateClinicReq, UserStatus,
};
use camp_types::{EmailAddress, NonEmptyText, PhoneNumber, Slug};
use camp_uuid::ShardableUuid;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClinicRecord {
    pub id: ShardableUuid,
    pub name: NonEmptyText,
    pub slug: Slug,
    pub address: Option<String>,
    pub contact_email: EmailAddress,
    pub contact_phone: Option<PhoneNumber>,
    pub status: ClinicStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&ClinicRecord> for ClinicView {
    fn from(c: &ClinicRecord) -> Self {
        ClinicView {
            id: c.id.to_string(),
            name: c.name.to_string(),
            slug: c.slug.to_string(),
            address: c.address.clone(),
            contact_email: c.contact_email.to_string(),
            contact_phone: c.contact_phone.as_ref().map(ToString::to_string),
            status: c.status,
            created_at: c.created_at,
            updated_at: c.updated_at,
        }
    }
}

/// Everything written by a successful onboarding.
#[derive(Clone, Debug)]
pub struct Onboarded {
    pub clinic: ClinicRecord,
    pub admin: UserRecord,
    pub roles: Vec<RoleRecord>,
}

impl Onboarded {
    /// The new admin, ready to act on the clinic.
    pub fn admin_principal(&self) -> Principal {
        let admin_roles = self
            .roles
            .iter()
            .filter(|r| self.admin.role_ids.contains(&r.id))
            .cloned()
            .collect();
        Principal::new(self.clinic.clone(), self.admin.clone(), admin_roles)
    }

    pub fn to_response(&self) -> OnboardClinicRes {
        OnboardClinicRes {
            clinic: (&self.clinic).into(),
            admin: StaffView::from(&self.admin),
        }
    }
}

pub(crate) fn load_clinic(storage: &Storage, clinic_id: &ShardableUuid) -> CoreResult<ClinicRecord> {
    storage
        .tenant(clinic_id)
        .read_document(Path::new(CLINIC_FILE_NAME))?
        .ok_or_else(|| CoreError::not_found("clinic"))
}

/// Every clinic on the platform. Unreadable profiles are logged and skipped.
pub(crate) fn list_clinics(storage: &Storage) -> Vec<ClinicRecord> {
    scan_sharded(&storage.cfg().clinics_dir(), CLINIC_FILE_NAME)
        .into_iter()
        .filter_map(|path| match read_yaml::<ClinicRecord>(&path) {
            Ok(found) => found,
            Err(e) => {
                tracing::warn!("skipping unreadable clinic profile {}: {}", path.display(), e);
                None
            }
        })
        .collect()
}

pub(crate) fn find_clinic_by_slug(storage: &Storage, slug: &str) -> CoreResult<Option<ClinicRecord>> {
    let Ok(slug) = Slug::parse(slug) else {
        return Ok(None);
    };
    Ok(list_clinics(storage).into_iter().find(|c| c.slug == slug))
}

#[derive(Clone, Debug)]
pub struct ClinicService {
    storage: Storage,
}

impl ClinicService {
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }

    /// Creates a clinic with its built-in roles and first admin in one transaction.
    ///
    /// # Errors
    ///
    /// - [`CoreError::InvalidInput`] for malformed fields or a short admin password.
    /// - [`CoreError::Conflict`] if the slug is taken.
    pub fn onboard(&self, req: OnboardClinicReq) -> CoreResult<Onboarded> {
        let name = required_text("name", &req.name)?;
        let slug = Slug::parse(&req.slug).map_err(|e| CoreError::invalid(format!("slug: {}", e)))?;
        let contact_email = parse_email("contact_email", &req.contact_email)?;
        let contact_phone = optional_phone("contact_phone", req.contact_phone)?;
        let admin_name = required_text("admin_name", &req.admin_name)?;
        let admin_email = parse_email("admin_email", &req.admin_email)?;
        let admin_phone = optional_phone("admin_phone", req.admin_phone)?;
        let password_hash = hash_password(&req.admin_password, self.storage.cfg().bcrypt_cost())?;

        let now = Utc::now();
        let clinic = ClinicRecord {
            id: ShardableUuid::new(),
            name,
            slug,
            address: optional_text(req.address),
            contact_email,
            contact_phone,
            status: ClinicStatus::Active,
            created_at: now,
            updated_at: now,
        };
        let roles = built_in_roles(&clinic.id, now)?;
        let admin_role_ids = roles
            .iter()
            .filter(|r| r.name.as_str() == ADMIN_ROLE_NAME)
            .map(|r| r.id.clone())
            .collect();
        let admin = UserRecord {
            id: ShardableUuid::new(),
            clinic_id: clinic.id.clone(),
            name: admin_name,
            email: admin_email,
            phone: admin_phone,
            password_hash,
            role_ids: admin_role_ids,
            status: UserStatus::Active,
            created_at: now,
            updated_at: now,
            last_login_at: None,
        };

        let _platform = self.storage.platform_lock();
        if find_clinic_by_slug(&self.storage, clinic.slug.as_str())?.is_some() {
            return Err(CoreError::Conflict(format!(
                "clinic slug '{}' is already taken",
                clinic.slug
            )));
        }

        let store = self.storage.tenant(&clinic.id);
        let mut tx = store.transaction();
        tx.put_document(Path::new(CLINIC_FILE_NAME), &clinic)?;
        for role in &roles {
            tx.put(role)?;
        }
        tx.put(&admin)?;
        tx.commit()?;

        tracing::info!(clinic = %clinic.id, slug = %clinic.slug, "clinic onboarded");

        Ok(Onboarded {
            clinic,
            admin,
            roles,
        })
    }

    pub fn get(&self, principal: &Principal) -> CoreResult<ClinicView> {
        Ok((&load_clinic(&self.storage, principal.clinic_id())?).into())
    }

    /// Updates the caller's clinic profile. Absent fields are left unchanged.
    pub fn update(&self, principal: &Principal, req: UpdateClinicReq) -> CoreResult<ClinicView> {
        principal.require(Permission::ManageClinic)?;

        let store = self.storage.tenant(principal.clinic_id());
        let mut tx = store.transaction();
        let mut clinic = load_clinic(&self.storage, principal.clinic_id())?;

        if let Some(name) = req.name {
            clinic.name = required_text("name", &name)?;
        }
        if let Some(address) = req.address {
            clinic.address = optional_text(Some(address));
        }
        if let Some(email) = req.contact_email {
            clinic.contact_email = parse_email("contact_email", &email)?;
        }
        if let Some(phone) = req.contact_phone {
            clinic.contact_phone = optional_phone("contact_phone", Some(phone))?;
        }
        clinic.updated_at = Utc::now();

        tx.put_document(Path::new(CLINIC_FILE_NAME), &clinic)?;
        tx.commit()?;

        tracing::info!(clinic = %clinic.id, "clinic profile updated");
        Ok((&clinic).into())
    }

    /// All clinics, ordered by slug.
    pub fn list(&self) -> Vec<ClinicView> {
        let mut clinics = list_clinics(&self.storage);
        clinics.sort_by(|a, b| a.slug.as_str().cmp(b.slug.as_str()));
        clinics.iter().map(ClinicView::from).collect()
    }

    pub fn find_by_slug(&self, slug: &str) -> CoreResult<ClinicView> {
        find_clinic_by_slug(&self.storage, slug)?
            .map(|c| ClinicView::from(&c))
            .ok_or_else(|| CoreError::not_found(format!("clinic '{}'", slug)))
    }

    /// Suspends or reactivates a clinic. Suspended clinics cannot log in.
    pub fn set_status(&self, slug: &str, status: ClinicStatus) -> CoreResult<ClinicView> {
        let found = find_clinic_by_slug(&self.storage, slug)?
            .ok_or_else(|| CoreError::not_found(format!("clinic '{}'", slug)))?;

        let store = self.storage.tenant(&found.id);
        let mut tx = store.transaction();
        let mut clinic = load_clinic(&self.storage, &found.id)?;
        clinic.status = status;
        clinic.updated_at = Utc::now();
        tx.put_document(Path::new(CLINIC_FILE_NAME), &clinic)?;
        tx.commit()?;

        tracing::info!(clinic = %clinic.id, status = %status, "clinic status changed");
        Ok((&clinic).into())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::store::tests::test_storage;
    use tempfile::TempDir;

    pub(crate) fn onboard_req(slug: &str) -> OnboardClinicReq {
        OnboardClinicReq {
            name: "Hope Community Clinic".into(),
            slug: slug.into(),
            address: Some("12 Market Road".into()),
            contact_email: "desk@hope.example".into(),
            contact_phone: None,
            admin_name: "Asha Admin".into(),
            admin_email: "admin@hope.example".into(),
            admin_password: "correct horse".into(),
            admin_phone: Some("+91 98765 43210".into()),
        }
    }

    /// Onboards a clinic and returns its admin.
    pub(crate) fn onboard_test_clinic(storage: &Storage, slug: &str) -> Principal {
        ClinicService::new(storage.clone())
            .onboard(onboard_req(slug))
            .unwrap()
            .admin_principal()
    }

    #[test]
    fn onboarding_seeds_roles_and_admin() {
        let temp = TempDir::new().unwrap();
        let storage = test_storage(&temp);
        let onboarded = ClinicService::new(storage.clone())
            .onboard(onboard_req("hope-clinic"))
            .unwrap();

        let store = storage.tenant(&onboarded.clinic.id);
        let mut role_names: Vec<String> = store
            .list::<RoleRecord>()
            .unwrap()
            .into_iter()
            .map(|r| r.name.to_string())
            .collect();
        role_names.sort();
        assert_eq!(role_names, vec!["admin", "doctor", "radiographer", "receptionist"]);

        let admin = onboarded.admin_principal();
        for permission in Permission::ALL {
            assert!(admin.has(*permission));
        }
        assert_ne!(onboarded.admin.password_hash, "correct horse");

        let res = onboarded.to_response();
        assert_eq!(res.clinic.slug, "hope-clinic");
        assert_eq!(res.admin.email, "admin@hope.example");
    }

    #[test]
    fn duplicate_slug_is_a_conflict() {
        let temp = TempDir::new().unwrap();
        let service = ClinicService::new(test_storage(&temp));
        service.onboard(onboard_req("hope-clinic")).unwrap();

        let err = service.onboard(onboard_req("hope-clinic")).unwrap_err();
        assert!(matches!(err, CoreError::Conflict(_)));
        assert_eq!(service.list().len(), 1);
    }

    #[test]
    fn onboarding_rejects_bad_input_before_writing() {
        let temp = TempDir::new().unwrap();
        let service = ClinicService::new(test_storage(&temp));

        let bad_slug = onboard_req("Hope Clinic!");
        assert!(matches!(service.onboard(bad_slug), Err(CoreError::InvalidInput(_))));

        let mut short_password = onboard_req("hope-clinic");
        short_password.admin_password = "short".into();
        assert!(matches!(
            service.onboard(short_password),
            Err(CoreError::InvalidInput(_))
        ));

        assert!(service.list().is_empty());
    }

    #[test]
    fn update_and_status_changes_persist() {
        let temp = TempDir::new().unwrap();
        let storage = test_storage(&temp);
        let admin = onboard_test_clinic(&storage, "hope-clinic");
        let service = ClinicService::new(storage);

        let updated = service
            .update(
                &admin,
                UpdateClinicReq {
                    name: Some("Hope Clinic North".into()),
                    address: Some("  ".into()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(updated.name, "Hope Clinic North");
        assert_eq!(updated.address, None);
        assert_eq!(service.get(&admin).unwrap(), updated);

        let suspended = service.set_status("hope-clinic", ClinicStatus::Suspended).unwrap();
        assert_eq!(suspended.status, ClinicStatus::Suspended);
        assert_eq!(
            service.find_by_slug("hope-clinic").unwrap().status,
            ClinicStatus::Suspended
        );
        assert!(matches!(
            service.set_status("nowhere", ClinicStatus::Active),
            Err(CoreError::NotFound(_))
        ));
    }
}
