//! Roles and staff accounts within a clinic.

use crate::auth::{hash_password, Principal};
use crate::constants::{
    ADMIN_ROLE_NAME, DOCTOR_ROLE_NAME, RADIOGRAPHER_ROLE_NAME, RECEPTIONIST_ROLE_NAME,
};
use crate::repositories::helpers::{optional_phone, optional_text, parse_email, parse_id, required_text};
use crate::store::{Record, RecordStore, Storage};
use crate::{CoreError, CoreResult};
use api_shared::{
    CreateRoleReq, CreateStaffReq, Permission, ResetPasswordReq, RoleView, StaffView,
    UpdateRoleReq, UpdateStaffReq, UserStatus,
};
use camp_types::{EmailAddress, NonEmptyText, PhoneNumber};
use camp_uuid::ShardableUuid;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RoleRecord {
    pub id: ShardableUuid,
    pub clinic_id: ShardableUuid,
    pub name: NonEmptyText,
    pub description: Option<String>,
    pub permissions: BTreeSet<Permission>,
    pub built_in: bool,
    pub created_at: DateTime<Utc>,
}

impl RoleRecord {
    fn is_admin(&self) -> bool {
        self.built_in && self.name.as_str() == ADMIN_ROLE_NAME
    }
}

impl Record for RoleRecord {
    const COLLECTION: &'static str = "roles";

    fn id(&self) -> &ShardableUuid {
        &self.id
    }
}

impl From<&RoleRecord> for RoleView {
    fn from(r: &RoleRecord) -> Self {
        RoleView {
            id: r.id.to_string(),
            name: r.name.to_string(),
            description: r.description.clone(),
            permissions: r.permissions.iter().copied().collect(),
            built_in: r.built_in,
            created_at: r.created_at,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: ShardableUuid,
    pub clinic_id: ShardableUuid,
    pub name: NonEmptyText,
    pub email: EmailAddress,
    pub phone: Option<PhoneNumber>,
    pub password_hash: String,
    pub role_ids: Vec<ShardableUuid>,
    pub status: UserStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_login_at: Option<DateTime<Utc>>,
}

impl Record for UserRecord {
    const COLLECTION: &'static str = "users";

    fn id(&self) -> &ShardableUuid {
        &self.id
    }
}

impl From<&UserRecord> for StaffView {
    fn from(u: &UserRecord) -> Self {
        StaffView {
            id: u.id.to_string(),
            name: u.name.to_string(),
            email: u.email.to_string(),
            phone: u.phone.as_ref().map(ToString::to_string),
            role_ids: u.role_ids.iter().map(ToString::to_string).collect(),
            status: u.status,
            created_at: u.created_at,
            updated_at: u.updated_at,
            last_login_at: u.last_login_at,
        }
    }
}

/// The four roles every clinic starts with.
pub(crate) fn built_in_roles(
    clinic_id: &ShardableUuid,
    now: DateTime<Utc>,
) -> CoreResult<Vec<RoleRecord>> {
    use Permission::*;

    let role = |name: &str, description: &str, permissions: &[Permission]| -> CoreResult<RoleRecord> {
        Ok(RoleRecord {
            id: ShardableUuid::new(),
            clinic_id: clinic_id.clone(),
            name: required_text("role name", name)?,
            description: Some(description.to_string()),
            permissions: permissions.iter().copied().collect(),
            built_in: true,
            created_at: now,
        })
    };

    [
        role(ADMIN_ROLE_NAME, "Full access to the clinic", Permission::ALL),
        role(
            DOCTOR_ROLE_NAME,
            "Consults patients and records clinical findings",
            &[
                ViewPatients,
                RegisterPatients,
                ManageAppointments,
                ManageQueue,
                RecordDiagnosis,
                RecordTreatment,
                RecordGeneralPhysician,
                ViewClinicalRecords,
                UploadFiles,
                SendNotifications,
                ViewAnalytics,
            ],
        ),
        role(
            RADIOGRAPHER_ROLE_NAME,
            "Performs mammography screening",
            &[
                ViewPatients,
                ManageQueue,
                RecordMammography,
                ViewClinicalRecords,
                UploadFiles,
            ],
        ),
        role(
            RECEPTIONIST_ROLE_NAME,
            "Registers patients and runs the front desk",
            &[
                RegisterPatients,
                ViewPatients,
                ManageAppointments,
                ManageQueue,
                SendNotifications,
            ],
        ),
    ]
    .into_iter()
    .collect()
}

/// Resolves caller-supplied role ids, all of which must exist in the clinic.
fn resolve_role_ids(store: &RecordStore, raw: &[String]) -> CoreResult<Vec<ShardableUuid>> {
    let mut ids: Vec<ShardableUuid> = Vec::with_capacity(raw.len());
    for r in raw {
        let id = parse_id("role", r)?;
        if store.get::<RoleRecord>(&id)?.is_none() {
            return Err(CoreError::invalid(format!("role {} does not exist", id)));
        }
        if !ids.contains(&id) {
            ids.push(id);
        }
    }
    Ok(ids)
}

fn ensure_role_name_free(
    store: &RecordStore,
    name: &NonEmptyText,
    except: Option<&ShardableUuid>,
) -> CoreResult<()> {
    let taken = store.list::<RoleRecord>()?.into_iter().any(|r| {
        Some(&r.id) != except && r.name.as_str().eq_ignore_ascii_case(name.as_str())
    });
    if taken {
        return Err(CoreError::Conflict(format!("role '{}' already exists", name)));
    }
    Ok(())
}

#[derive(Clone, Debug)]
pub struct StaffService {
    storage: Storage,
}

impl StaffService {
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }

    // ---- roles ----

    /// Roles are visible to anyone who manages roles or staff.
    pub fn list_roles(&self, principal: &Principal) -> CoreResult<Vec<RoleView>> {
        if !principal.has(Permission::ManageStaff) {
            principal.require(Permission::ManageRoles)?;
        }
        let mut roles = self.storage.tenant(principal.clinic_id()).list::<RoleRecord>()?;
        roles.sort_by(|a, b| a.name.as_str().cmp(b.name.as_str()));
        Ok(roles.iter().map(RoleView::from).collect())
    }

    pub fn get_role(&self, principal: &Principal, role_id: &str) -> CoreResult<RoleView> {
        if !principal.has(Permission::ManageStaff) {
            principal.require(Permission::ManageRoles)?;
        }
        let id = parse_id("role", role_id)?;
        let role = self
            .storage
            .tenant(principal.clinic_id())
            .load::<RoleRecord>(&id, "role")?;
        Ok((&role).into())
    }

    pub fn create_role(&self, principal: &Principal, req: CreateRoleReq) -> CoreResult<RoleView> {
        principal.require(Permission::ManageRoles)?;
        let name = required_text("name", &req.name)?;

        let store = self.storage.tenant(principal.clinic_id());
        let mut tx = store.transaction();
        ensure_role_name_free(&store, &name, None)?;

        let role = RoleRecord {
            id: ShardableUuid::new(),
            clinic_id: principal.clinic_id().clone(),
            name,
            description: optional_text(req.description),
            permissions: req.permissions.into_iter().collect(),
            built_in: false,
            created_at: Utc::now(),
        };
        tx.put(&role)?;
        tx.commit()?;

        tracing::info!(clinic = %role.clinic_id, role = %role.id, "role created");
        Ok((&role).into())
    }

    /// # Errors
    ///
    /// [`CoreError::InvalidState`] when targeting the built-in admin role.
    pub fn update_role(
        &self,
        principal: &Principal,
        role_id: &str,
        req: UpdateRoleReq,
    ) -> CoreResult<RoleView> {
        principal.require(Permission::ManageRoles)?;
        let id = parse_id("role", role_id)?;

        let store = self.storage.tenant(principal.clinic_id());
        let mut tx = store.transaction();
        let mut role = store.load::<RoleRecord>(&id, "role")?;
        if role.is_admin() {
            return Err(CoreError::InvalidState(
                "the built-in admin role cannot be modified".into(),
            ));
        }

        if let Some(name) = req.name {
            let name = required_text("name", &name)?;
            ensure_role_name_free(&store, &name, Some(&role.id))?;
            role.name = name;
        }
        if let Some(description) = req.description {
            role.description = optional_text(Some(description));
        }
        if let Some(permissions) = req.permissions {
            role.permissions = permissions.into_iter().collect();
        }

        tx.put(&role)?;
        tx.commit()?;

        tracing::info!(role = %role.id, "role updated");
        Ok((&role).into())
    }

    /// # Errors
    ///
    /// - [`CoreError::InvalidState`] for the built-in admin role.
    /// - [`CoreError::Conflict`] while any user still holds the role.
    pub fn delete_role(&self, principal: &Principal, role_id: &str) -> CoreResult<()> {
        principal.require(Permission::ManageRoles)?;
        let id = parse_id("role", role_id)?;

        let store = self.storage.tenant(principal.clinic_id());
        let mut tx = store.transaction();
        let role = store.load::<RoleRecord>(&id, "role")?;
        if role.is_admin() {
            return Err(CoreError::InvalidState(
                "the built-in admin role cannot be deleted".into(),
            ));
        }

        let holders = store
            .list::<UserRecord>()?
            .iter()
            .filter(|u| u.role_ids.contains(&id))
            .count();
        if holders > 0 {
            return Err(CoreError::Conflict(format!(
                "role '{}' is assigned to {} staff member(s)",
                role.name, holders
            )));
        }

        tx.delete::<RoleRecord>(&id);
        tx.commit()?;

        tracing::info!(role = %id, "role deleted");
        Ok(())
    }

    // ---- staff ----

    pub fn list_staff(&self, principal: &Principal) -> CoreResult<Vec<StaffView>> {
        principal.require(Permission::ManageStaff)?;
        let mut users = self.storage.tenant(principal.clinic_id()).list::<UserRecord>()?;
        users.sort_by(|a, b| a.name.as_str().cmp(b.name.as_str()));
        Ok(users.iter().map(StaffView::from).collect())
    }

    pub fn get_staff(&self, principal: &Principal, user_id: &str) -> CoreResult<StaffView> {
        principal.require(Permission::ManageStaff)?;
        let id = parse_id("staff", user_id)?;
        let user = self
            .storage
            .tenant(principal.clinic_id())
            .load::<UserRecord>(&id, "staff member")?;
        Ok((&user).into())
    }

    /// # Errors
    ///
    /// - [`CoreError::Conflict`] if the email is already used in this clinic.
    /// - [`CoreError::InvalidInput`] for unknown role ids or a short password.
    pub fn create_staff(&self, principal: &Principal, req: CreateStaffReq) -> CoreResult<StaffView> {
        principal.require(Permission::ManageStaff)?;
        let name = required_text("name", &req.name)?;
        let email = parse_email("email", &req.email)?;
        let phone = optional_phone("phone", req.phone)?;
        let password_hash = hash_password(&req.password, self.storage.cfg().bcrypt_cost())?;

        let store = self.storage.tenant(principal.clinic_id());
        let mut tx = store.transaction();
        if store.list::<UserRecord>()?.iter().any(|u| u.email == email) {
            return Err(CoreError::Conflict(format!(
                "a staff member with email {} already exists",
                email
            )));
        }
        let role_ids = resolve_role_ids(&store, &req.role_ids)?;

        let now = Utc::now();
        let user = UserRecord {
            id: ShardableUuid::new(),
            clinic_id: principal.clinic_id().clone(),
            name,
            email,
            phone,
            password_hash,
            role_ids,
            status: UserStatus::Active,
            created_at: now,
            updated_at: now,
            last_login_at: None,
        };
        tx.put(&user)?;
        tx.commit()?;

        tracing::info!(clinic = %user.clinic_id, user = %user.id, "staff member created");
        Ok((&user).into())
    }

    pub fn update_staff(
        &self,
        principal: &Principal,
        user_id: &str,
        req: UpdateStaffReq,
    ) -> CoreResult<StaffView> {
        principal.require(Permission::ManageStaff)?;
        let id = parse_id("staff", user_id)?;

        let store = self.storage.tenant(principal.clinic_id());
        let mut tx = store.transaction();
        let mut user = store.load::<UserRecord>(&id, "staff member")?;

        if let Some(name) = req.name {
            user.name = required_text("name", &name)?;
        }
        if let Some(phone) = req.phone {
            user.phone = optional_phone("phone", Some(phone))?;
        }
        if let Some(role_ids) = req.role_ids {
            user.role_ids = resolve_role_ids(&store, &role_ids)?;
        }
        user.updated_at = Utc::now();

        tx.put(&user)?;
        tx.commit()?;

        tracing::info!(user = %user.id, "staff member updated");
        Ok((&user).into())
    }

    /// Enables or disables an account. Staff cannot disable themselves.
    pub fn set_staff_status(
        &self,
        principal: &Principal,
        user_id: &str,
        status: UserStatus,
    ) -> CoreResult<StaffView> {
        principal.require(Permission::ManageStaff)?;
        let id = parse_id("staff", user_id)?;
        if status == UserStatus::Disabled && &id == principal.user_id() {
            return Err(CoreError::InvalidState(
                "you cannot disable your own account".into(),
            ));
        }

        let store = self.storage.tenant(principal.clinic_id());
        let mut tx = store.transaction();
        let mut user = store.load::<UserRecord>(&id, "staff member")?;
        user.status = status;
        user.updated_at = Utc::now();
        tx.put(&user)?;
        tx.commit()?;

        tracing::info!(user = %user.id, status = %status, "staff status changed");
        Ok((&user).into())
    }

    /// Administrative reset; does not need the old password.
    pub fn reset_password(
        &self,
        principal: &Principal,
        user_id: &str,
        req: ResetPasswordReq,
    ) -> CoreResult<()> {
        principal.require(Permission::ManageStaff)?;
        let id = parse_id("staff", user_id)?;
        let password_hash = hash_password(&req.new_password, self.storage.cfg().bcrypt_cost())?;

        let store = self.storage.tenant(principal.clinic_id());
        let mut tx = store.transaction();
        let mut user = store.load::<UserRecord>(&id, "staff member")?;
        user.password_hash = password_hash;
        user.updated_at = Utc::now();
        tx.put(&user)?;
        tx.commit()?;

        tracing::info!(user = %user.id, by = %principal.user_id(), "password reset by administrator");
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::auth::AuthService;
    use crate::repositories::clinics::tests::onboard_test_clinic;
    use crate::store::tests::test_storage;
    use api_shared::LoginReq;
    use tempfile::TempDir;

    fn role_id(storage: &Storage, admin: &Principal, name: &str) -> String {
        StaffService::new(storage.clone())
            .list_roles(admin)
            .unwrap()
            .into_iter()
            .find(|r| r.name == name)
            .map(|r| r.id)
            .unwrap()
    }

    /// Creates a staff member holding one built-in role and returns them as a principal.
    pub(crate) fn add_staff(
        storage: &Storage,
        admin: &Principal,
        role_name: &str,
        email: &str,
    ) -> Principal {
        let role = role_id(storage, admin, role_name);
        let view = StaffService::new(storage.clone())
            .create_staff(
                admin,
                CreateStaffReq {
                    name: format!("Staff {}", email),
                    email: email.into(),
                    phone: None,
                    password: "staff password".into(),
                    role_ids: vec![role],
                },
            )
            .unwrap();

        let store = storage.tenant(admin.clinic_id());
        let user = store
            .load::<UserRecord>(&ShardableUuid::parse(&view.id).unwrap(), "user")
            .unwrap();
        let roles = user
            .role_ids
            .iter()
            .map(|id| store.load::<RoleRecord>(id, "role").unwrap())
            .collect();
        Principal::new(admin.clinic.clone(), user, roles)
    }

    #[test]
    fn admin_role_is_immutable() {
        let temp = TempDir::new().unwrap();
        let storage = test_storage(&temp);
        let admin = onboard_test_clinic(&storage, "hope-clinic");
        let service = StaffService::new(storage.clone());
        let admin_role = role_id(&storage, &admin, "admin");

        let err = service
            .update_role(
                &admin,
                &admin_role,
                UpdateRoleReq {
                    permissions: Some(vec![]),
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidState(_)));
        assert!(matches!(
            service.delete_role(&admin, &admin_role),
            Err(CoreError::InvalidState(_))
        ));
    }

    #[test]
    fn role_names_are_unique_ignoring_case() {
        let temp = TempDir::new().unwrap();
        let storage = test_storage(&temp);
        let admin = onboard_test_clinic(&storage, "hope-clinic");
        let service = StaffService::new(storage);

        let created = service
            .create_role(
                &admin,
                CreateRoleReq {
                    name: "Nurse".into(),
                    description: None,
                    permissions: vec![Permission::ViewPatients, Permission::ViewPatients],
                },
            )
            .unwrap();
        assert_eq!(created.permissions, vec![Permission::ViewPatients]);
        assert!(!created.built_in);

        let dup = service.create_role(
            &admin,
            CreateRoleReq {
                name: "NURSE".into(),
                description: None,
                permissions: vec![],
            },
        );
        assert!(matches!(dup, Err(CoreError::Conflict(_))));

        let renamed = service
            .update_role(
                &admin,
                &created.id,
                UpdateRoleReq {
                    name: Some("nurse".into()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(renamed.name, "nurse");
    }

    #[test]
    fn assigned_roles_cannot_be_deleted() {
        let temp = TempDir::new().unwrap();
        let storage = test_storage(&temp);
        let admin = onboard_test_clinic(&storage, "hope-clinic");
        let doctor = add_staff(&storage, &admin, "doctor", "doc@hope.example");
        let service = StaffService::new(storage.clone());
        let doctor_role = doctor.roles[0].id.to_string();

        assert!(matches!(
            service.delete_role(&admin, &doctor_role),
            Err(CoreError::Conflict(_))
        ));

        service
            .update_staff(
                &admin,
                &doctor.user_id().to_string(),
                UpdateStaffReq {
                    role_ids: Some(vec![]),
                    ..Default::default()
                },
            )
            .unwrap();
        service.delete_role(&admin, &doctor_role).unwrap();
        assert!(matches!(
            service.get_role(&admin, &doctor_role),
            Err(CoreError::NotFound(_))
        ));
    }

    #[test]
    fn staff_emails_are_unique_and_roles_must_exist() {
        let temp = TempDir::new().unwrap();
        let storage = test_storage(&temp);
        let admin = onboard_test_clinic(&storage, "hope-clinic");
        let service = StaffService::new(storage);

        let req = |email: &str, role_ids: Vec<String>| CreateStaffReq {
            name: "Ravi".into(),
            email: email.into(),
            phone: None,
            password: "long enough".into(),
            role_ids,
        };

        let dup = service.create_staff(&admin, req("Admin@Hope.example", vec![]));
        assert!(matches!(dup, Err(CoreError::Conflict(_))));

        let missing_role = service.create_staff(
            &admin,
            req("ravi@hope.example", vec![ShardableUuid::new().to_string()]),
        );
        assert!(matches!(missing_role, Err(CoreError::InvalidInput(_))));

        let ok = service.create_staff(&admin, req("ravi@hope.example", vec![])).unwrap();
        assert_eq!(ok.status, UserStatus::Active);
        assert_eq!(service.list_staff(&admin).unwrap().len(), 2);
    }

    #[test]
    fn disabling_blocks_login_but_not_self() {
        let temp = TempDir::new().unwrap();
        let storage = test_storage(&temp);
        let admin = onboard_test_clinic(&storage, "hope-clinic");
        let reception = add_staff(&storage, &admin, "receptionist", "desk@hope.example");
        let service = StaffService::new(storage.clone());
        let auth = AuthService::new(storage);

        assert!(matches!(
            service.set_staff_status(&admin, &admin.user_id().to_string(), UserStatus::Disabled),
            Err(CoreError::InvalidState(_))
        ));
        assert!(matches!(
            service.list_staff(&reception),
            Err(CoreError::Forbidden(_))
        ));

        let reception_id = reception.user_id().to_string();
        service
            .set_staff_status(&admin, &reception_id, UserStatus::Disabled)
            .unwrap();
        let login = |password: &str| {
            auth.login(LoginReq {
                clinic_slug: "hope-clinic".into(),
                email: "desk@hope.example".into(),
                password: password.into(),
            })
        };
        assert!(matches!(login("staff password"), Err(CoreError::Forbidden(_))));

        service
            .set_staff_status(&admin, &reception_id, UserStatus::Active)
            .unwrap();
        service
            .reset_password(
                &admin,
                &reception_id,
                ResetPasswordReq {
                    new_password: "fresh password".into(),
                },
            )
            .unwrap();
        assert!(login("staff password").is_err());
        assert!(login("fresh password").is_ok());
    }
}
