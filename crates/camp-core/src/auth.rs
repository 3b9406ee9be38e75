//! Staff authentication and authorisation.
//!
//! - Passwords are hashed with bcrypt at the configured cost.
//! - Session tokens are `base64url(claims JSON) "." base64url(HMAC-SHA256(secret, claims))`.
//!   They carry only the user id, clinic id, issue time and expiry.
//! - Every authenticated request re-loads the clinic, user and roles, so disabling a user or
//!   editing a role takes effect on the next request rather than at token expiry.

use crate::author::Author;
use crate::constants::MIN_PASSWORD_LEN;
use crate::repositories::clinics::{find_clinic_by_slug, load_clinic, ClinicRecord};
use crate::repositories::staff::{RoleRecord, UserRecord};
use crate::store::Storage;
use crate::{CoreError, CoreResult};
use api_shared::{
    ChangePasswordReq, ClinicStatus, LoginReq, LoginRes, MeRes, Permission, StaffView, UserStatus,
};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use camp_types::{EmailAddress, NonEmptyText};
use camp_uuid::ShardableUuid;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::collections::BTreeSet;

type HmacSha256 = Hmac<Sha256>;

const INVALID_CREDENTIALS: &str = "invalid credentials";

/// Rejects passwords shorter than the minimum length.
pub fn validate_new_password(password: &str) -> CoreResult<()> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(CoreError::invalid(format!(
            "password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }
    Ok(())
}

pub fn hash_password(password: &str, cost: u32) -> CoreResult<String> {
    validate_new_password(password)?;
    Ok(bcrypt::hash(password, cost)?)
}

/// Malformed hashes verify as `false` (and are logged) rather than erroring.
pub fn verify_password(password: &str, hash: &str) -> bool {
    match bcrypt::verify(password, hash) {
        Ok(ok) => ok,
        Err(e) => {
            tracing::warn!("stored password hash could not be checked: {}", e);
            false
        }
    }
}

/// Signed token payload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// User id.
    pub sub: String,
    /// Clinic id.
    pub clinic: String,
    pub iat: i64,
    pub exp: i64,
}

/// Issues and verifies HMAC-signed session tokens.
#[derive(Clone)]
pub struct TokenSigner {
    secret: Vec<u8>,
    ttl: chrono::Duration,
}

impl std::fmt::Debug for TokenSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSigner")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl TokenSigner {
    pub fn new(secret: &[u8], ttl: chrono::Duration) -> Self {
        Self {
            secret: secret.to_vec(),
            ttl,
        }
    }

    fn mac(&self) -> CoreResult<HmacSha256> {
        HmacSha256::new_from_slice(&self.secret)
            .map_err(|e| CoreError::invalid(format!("unusable token secret: {}", e)))
    }

    /// Returns the token and its expiry.
    pub fn issue(
        &self,
        user_id: &ShardableUuid,
        clinic_id: &ShardableUuid,
        now: DateTime<Utc>,
    ) -> CoreResult<(String, DateTime<Utc>)> {
        let expires_at = now + self.ttl;
        let claims = TokenClaims {
            sub: user_id.to_string(),
            clinic: clinic_id.to_string(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
        };
        let claims_json = serde_json::to_vec(&claims)
            .map_err(|e| CoreError::invalid(format!("token claims: {}", e)))?;
        let claims_b64 = URL_SAFE_NO_PAD.encode(claims_json);

        let mut mac = self.mac()?;
        mac.update(claims_b64.as_bytes());
        let signature_b64 = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

        Ok((format!("{}.{}", claims_b64, signature_b64), expires_at))
    }

    /// Checks the signature (in constant time) and the expiry.
    pub fn verify(&self, token: &str, now: DateTime<Utc>) -> CoreResult<TokenClaims> {
        let malformed = || CoreError::Unauthorised("malformed token".into());

        let (claims_b64, signature_b64) = token.split_once('.').ok_or_else(malformed)?;
        let signature = URL_SAFE_NO_PAD
            .decode(signature_b64)
            .map_err(|_| malformed())?;

        let mut mac = self.mac()?;
        mac.update(claims_b64.as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| CoreError::Unauthorised("invalid token signature".into()))?;

        let claims_json = URL_SAFE_NO_PAD.decode(claims_b64).map_err(|_| malformed())?;
        let claims: TokenClaims = serde_json::from_slice(&claims_json).map_err(|_| malformed())?;

        if claims.exp <= now.timestamp() {
            return Err(CoreError::Unauthorised("token has expired".into()));
        }

        Ok(claims)
    }
}

/// The authenticated staff member behind a request.
#[derive(Clone, Debug)]
pub struct Principal {
    pub clinic: ClinicRecord,
    pub user: UserRecord,
    pub roles: Vec<RoleRecord>,
    permissions: BTreeSet<Permission>,
}

impl Principal {
    /// Effective permissions are the union of the user's role permissions.
    pub fn new(clinic: ClinicRecord, user: UserRecord, roles: Vec<RoleRecord>) -> Self {
        let permissions = roles
            .iter()
            .flat_map(|role| role.permissions.iter().copied())
            .collect();
        Self {
            clinic,
            user,
            roles,
            permissions,
        }
    }

    pub fn clinic_id(&self) -> &ShardableUuid {
        &self.clinic.id
    }

    pub fn user_id(&self) -> &ShardableUuid {
        &self.user.id
    }

    pub fn permissions(&self) -> &BTreeSet<Permission> {
        &self.permissions
    }

    pub fn has(&self, permission: Permission) -> bool {
        self.permissions.contains(&permission)
    }

    /// Route guard.
    pub fn require(&self, permission: Permission) -> CoreResult<()> {
        if self.has(permission) {
            Ok(())
        } else {
            Err(CoreError::Forbidden(format!(
                "missing permission '{}'",
                permission
            )))
        }
    }

    pub fn role_names(&self) -> Vec<String> {
        self.roles.iter().map(|r| r.name.to_string()).collect()
    }

    /// Commit author for clinical writes.
    pub fn author(&self) -> CoreResult<Author> {
        let role_names = self.role_names();
        let role = if role_names.is_empty() {
            "staff".to_string()
        } else {
            role_names.join(", ")
        };
        Ok(Author {
            name: self.user.name.clone(),
            role: NonEmptyText::new(role).map_err(|_| CoreError::InvalidAuthorRole)?,
            email: self.user.email.clone(),
        })
    }

    pub fn me(&self) -> MeRes {
        MeRes {
            user: StaffView::from(&self.user),
            clinic: (&self.clinic).into(),
            role_names: self.role_names(),
            permissions: self.permissions.iter().copied().collect(),
        }
    }
}

/// Login, token verification and password changes.
#[derive(Clone, Debug)]
pub struct AuthService {
    storage: Storage,
    signer: TokenSigner,
}

impl AuthService {
    pub fn new(storage: Storage) -> Self {
        let signer = TokenSigner::new(storage.cfg().token_secret(), storage.cfg().token_ttl());
        Self { storage, signer }
    }

    /// Authenticates a staff member of the clinic identified by `clinic_slug`.
    ///
    /// Unknown clinic, unknown email and wrong password all produce the same
    /// [`CoreError::Unauthorised`] so callers cannot probe for accounts. Disabled users and
    /// suspended clinics are rejected with [`CoreError::Forbidden`] once the password matched.
    pub fn login(&self, req: LoginReq) -> CoreResult<LoginRes> {
        let invalid = || CoreError::Unauthorised(INVALID_CREDENTIALS.into());

        let clinic = find_clinic_by_slug(&self.storage, &req.clinic_slug)?.ok_or_else(invalid)?;
        let email = EmailAddress::parse(&req.email).map_err(|_| invalid())?;

        // bcrypt runs before the tenant lock is taken; the lock only covers the login stamp.
        let store = self.storage.tenant(&clinic.id);
        let candidate = store
            .list::<UserRecord>()?
            .into_iter()
            .find(|u| u.email == email)
            .ok_or_else(invalid)?;

        if !verify_password(&req.password, &candidate.password_hash) {
            tracing::info!(clinic = %clinic.slug, "failed login attempt");
            return Err(invalid());
        }
        if candidate.status == UserStatus::Disabled {
            return Err(CoreError::Forbidden("account is disabled".into()));
        }
        if clinic.status == ClinicStatus::Suspended {
            return Err(CoreError::Forbidden("clinic is suspended".into()));
        }

        let now = Utc::now();
        let mut tx = store.transaction();
        let mut user = store.get::<UserRecord>(&candidate.id)?.ok_or_else(invalid)?;
        if user.status == UserStatus::Disabled {
            return Err(CoreError::Forbidden("account is disabled".into()));
        }
        user.last_login_at = Some(now);
        tx.put(&user)?;
        tx.commit()?;

        let (token, expires_at) = self.signer.issue(&user.id, &clinic.id, now)?;
        let principal = self.principal_for(clinic, user)?;

        tracing::info!(clinic = %principal.clinic.slug, user = %principal.user.id, "staff logged in");

        Ok(LoginRes {
            token,
            expires_at,
            user: StaffView::from(&principal.user),
            permissions: principal.permissions.iter().copied().collect(),
        })
    }

    /// Resolves a bearer token to a fresh [`Principal`].
    pub fn authenticate(&self, token: &str) -> CoreResult<Principal> {
        let claims = self.signer.verify(token, Utc::now())?;
        let unknown = || CoreError::Unauthorised("token does not match an active account".into());

        let clinic_id = ShardableUuid::parse(&claims.clinic).map_err(|_| unknown())?;
        let user_id = ShardableUuid::parse(&claims.sub).map_err(|_| unknown())?;

        let clinic = load_clinic(&self.storage, &clinic_id).map_err(|_| unknown())?;
        if clinic.status == ClinicStatus::Suspended {
            return Err(CoreError::Forbidden("clinic is suspended".into()));
        }

        let user = self
            .storage
            .tenant(&clinic_id)
            .get::<UserRecord>(&user_id)?
            .ok_or_else(unknown)?;
        if user.status == UserStatus::Disabled {
            return Err(CoreError::Forbidden("account is disabled".into()));
        }

        self.principal_for(clinic, user)
    }

    /// Issues a token without a password check. Used after onboarding and by tests.
    pub fn issue_token(&self, principal: &Principal) -> CoreResult<(String, DateTime<Utc>)> {
        self.signer
            .issue(principal.user_id(), principal.clinic_id(), Utc::now())
    }

    pub fn change_password(&self, principal: &Principal, req: ChangePasswordReq) -> CoreResult<()> {
        let store = self.storage.tenant(principal.clinic_id());
        let current = store.load::<UserRecord>(principal.user_id(), "user")?;

        if !verify_password(&req.current_password, &current.password_hash) {
            return Err(CoreError::Unauthorised(INVALID_CREDENTIALS.into()));
        }
        let new_hash = hash_password(&req.new_password, self.storage.cfg().bcrypt_cost())?;

        let mut tx = store.transaction();
        let mut user = store.load::<UserRecord>(principal.user_id(), "user")?;
        if user.password_hash != current.password_hash {
            return Err(CoreError::Conflict("password was changed concurrently".into()));
        }
        user.password_hash = new_hash;
        user.updated_at = Utc::now();
        tx.put(&user)?;
        tx.commit()?;

        tracing::info!(user = %user.id, "password changed");
        Ok(())
    }

    fn principal_for(&self, clinic: ClinicRecord, user: UserRecord) -> CoreResult<Principal> {
        let store = self.storage.tenant(&clinic.id);
        let mut roles = Vec::with_capacity(user.role_ids.len());
        for role_id in &user.role_ids {
            match store.get::<RoleRecord>(role_id)? {
                Some(role) => roles.push(role),
                None => tracing::warn!(user = %user.id, role = %role_id, "user references a missing role"),
            }
        }
        Ok(Principal::new(clinic, user, roles))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::clinics::tests::onboard_test_clinic;
    use crate::store::tests::{test_storage, TEST_SECRET};
    use tempfile::TempDir;

    fn signer() -> TokenSigner {
        TokenSigner::new(TEST_SECRET.as_bytes(), chrono::Duration::hours(1))
    }

    #[test]
    fn tokens_round_trip_until_expiry() {
        let s = signer();
        let user = ShardableUuid::new();
        let clinic = ShardableUuid::new();
        let now = Utc::now();

        let (token, expires_at) = s.issue(&user, &clinic, now).unwrap();
        let claims = s.verify(&token, now).unwrap();
        assert_eq!(claims.sub, user.to_string());
        assert_eq!(claims.clinic, clinic.to_string());
        assert_eq!(claims.exp, expires_at.timestamp());

        let later = now + chrono::Duration::hours(2);
        assert!(matches!(s.verify(&token, later), Err(CoreError::Unauthorised(_))));
    }

    #[test]
    fn tampered_or_foreign_tokens_are_rejected() {
        let s = signer();
        let now = Utc::now();
        let (token, _) = s
            .issue(&ShardableUuid::new(), &ShardableUuid::new(), now)
            .unwrap();

        let (claims, sig) = token.split_once('.').unwrap();
        let forged_claims = URL_SAFE_NO_PAD.encode(
            serde_json::to_vec(&TokenClaims {
                sub: ShardableUuid::new().to_string(),
                clinic: ShardableUuid::new().to_string(),
                iat: 0,
                exp: i64::MAX,
            })
            .unwrap(),
        );
        assert!(s.verify(&format!("{}.{}", forged_claims, sig), now).is_err());
        assert!(s.verify(claims, now).is_err());
        assert!(s.verify("not-a-token", now).is_err());

        let other = TokenSigner::new(b"another-secret-another-secret-xx", chrono::Duration::hours(1));
        assert!(other.verify(&token, now).is_err());
    }

    #[test]
    fn short_passwords_are_rejected() {
        assert!(hash_password("short", 4).is_err());
        let hash = hash_password("long enough", 4).unwrap();
        assert!(verify_password("long enough", &hash));
        assert!(!verify_password("wrong", &hash));
        assert!(!verify_password("anything", "not-a-bcrypt-hash"));
    }

    #[test]
    fn login_uses_one_error_for_every_credential_failure() {
        let temp = TempDir::new().unwrap();
        let storage = test_storage(&temp);
        onboard_test_clinic(&storage, "hope-clinic");
        let auth = AuthService::new(storage);

        let attempt = |slug: &str, email: &str, password: &str| {
            auth.login(LoginReq {
                clinic_slug: slug.into(),
                email: email.into(),
                password: password.into(),
            })
        };

        for (slug, email, password) in [
            ("nowhere", "admin@hope.example", "correct horse"),
            ("hope-clinic", "ghost@hope.example", "correct horse"),
            ("hope-clinic", "admin@hope.example", "wrong password"),
        ] {
            let err = attempt(slug, email, password).unwrap_err();
            assert_eq!(err.to_string(), "unauthorised: invalid credentials");
        }

        let ok = attempt("hope-clinic", "ADMIN@hope.example", "correct horse").unwrap();
        assert_eq!(ok.permissions.len(), Permission::ALL.len());

        let principal = auth.authenticate(&ok.token).unwrap();
        assert!(principal.has(Permission::ManageStaff));
        assert!(principal.user.last_login_at.is_some());
        assert_eq!(principal.role_names(), vec!["admin".to_string()]);
    }

    #[test]
    fn change_password_requires_current_password() {
        let temp = TempDir::new().unwrap();
        let storage = test_storage(&temp);
        let admin = onboard_test_clinic(&storage, "hope-clinic");
        let auth = AuthService::new(storage);

        let bad = auth.change_password(
            &admin,
            ChangePasswordReq {
                current_password: "nope".into(),
                new_password: "a new secret".into(),
            },
        );
        assert!(matches!(bad, Err(CoreError::Unauthorised(_))));

        let short = auth.change_password(
            &admin,
            ChangePasswordReq {
                current_password: "correct horse".into(),
                new_password: "short".into(),
            },
        );
        assert!(matches!(short, Err(CoreError::InvalidInput(_))));

        auth.change_password(
            &admin,
            ChangePasswordReq {
                current_password: "correct horse".into(),
                new_password: "a new secret".into(),
            },
        )
        .unwrap();

        assert!(auth
            .login(LoginReq {
                clinic_slug: "hope-clinic".into(),
                email: "admin@hope.example".into(),
                password: "a new secret".into(),
            })
            .is_ok());
    }

    #[test]
    fn failed_credential_checks_leave_the_tenant_lock_free() {
        let temp = TempDir::new().unwrap();
        let storage = test_storage(&temp);
        let admin = onboard_test_clinic(&storage, "hope-clinic");
        let auth = AuthService::new(storage.clone());

        let store = storage.tenant(admin.clinic_id());
        let _held = store.lock();

        let (done, finished) = std::sync::mpsc::channel();
        let worker = std::thread::spawn(move || {
            let login = auth.login(LoginReq {
                clinic_slug: "hope-clinic".into(),
                email: "admin@hope.example".into(),
                password: "wrong password".into(),
            });
            let change = auth.change_password(
                &admin,
                ChangePasswordReq {
                    current_password: "nope".into(),
                    new_password: "a new secret".into(),
                },
            );
            let _ = done.send((login.is_err(), change.is_err()));
        });

        let outcome = finished
            .recv_timeout(std::time::Duration::from_secs(10))
            .expect("credential checks blocked on the tenant lock");
        assert_eq!(outcome, (true, true));
        worker.join().unwrap();
    }
}
