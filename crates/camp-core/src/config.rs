//! Core runtime configuration.
//!
//! Configuration is resolved once at process startup and then passed into core services. The
//! intent is to avoid reading process-wide environment variables during request handling, which
//! can lead to inconsistent behaviour in multi-threaded runtimes and test harnesses.
//!
//! Every parser here is a pure function over `Option<String>` values; [`CoreConfig::from_lookup`]
//! takes the lookup as a closure so tests can feed a map instead of the real environment.

use crate::constants::{
    CLINICS_DIR_NAME, DEFAULT_BCRYPT_COST, DEFAULT_DATA_DIR, DEFAULT_MAX_UPLOAD_BYTES,
    DEFAULT_TOKEN_TTL_HOURS, DEFAULT_WHATSAPP_API_URL, MIN_TOKEN_SECRET_BYTES,
};
use crate::{CoreError, CoreResult};
use camp_types::{EmailAddress, NonEmptyText};
use std::path::{Path, PathBuf};

pub const ENV_DATA_DIR: &str = "CAMP_DATA_DIR";
pub const ENV_TOKEN_SECRET: &str = "CAMP_TOKEN_SECRET";
pub const ENV_TOKEN_TTL_HOURS: &str = "CAMP_TOKEN_TTL_HOURS";
pub const ENV_BCRYPT_COST: &str = "CAMP_BCRYPT_COST";
pub const ENV_MAX_UPLOAD_BYTES: &str = "CAMP_MAX_UPLOAD_BYTES";
pub const ENV_EMAIL_API_URL: &str = "CAMP_EMAIL_API_URL";
pub const ENV_EMAIL_API_KEY: &str = "CAMP_EMAIL_API_KEY";
pub const ENV_EMAIL_FROM: &str = "CAMP_EMAIL_FROM";
pub const ENV_WHATSAPP_API_URL: &str = "CAMP_WHATSAPP_API_URL";
pub const ENV_WHATSAPP_PHONE_NUMBER_ID: &str = "CAMP_WHATSAPP_PHONE_NUMBER_ID";
pub const ENV_WHATSAPP_ACCESS_TOKEN: &str = "CAMP_WHATSAPP_ACCESS_TOKEN";

/// Transactional email provider settings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EmailSettings {
    pub api_url: String,
    pub api_key: String,
    pub from: EmailAddress,
}

/// WhatsApp Business Cloud API settings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WhatsAppSettings {
    pub api_url: String,
    pub phone_number_id: String,
    pub access_token: String,
}

/// Outbound channels. A `None` channel is skipped rather than treated as an error.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NotificationSettings {
    pub email: Option<EmailSettings>,
    pub whatsapp: Option<WhatsAppSettings>,
}

/// Core configuration resolved at startup.
#[derive(Clone, Debug)]
pub struct CoreConfig {
    data_dir: PathBuf,
    token_secret: Vec<u8>,
    token_ttl_hours: i64,
    bcrypt_cost: u32,
    max_upload_bytes: usize,
    notifications: NotificationSettings,
}

impl CoreConfig {
    /// Create a new `CoreConfig`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidInput`] if the token secret is shorter than 32 bytes, the TTL
    /// is not positive, the bcrypt cost is outside 4..=31 or the upload limit is zero.
    pub fn new(
        data_dir: PathBuf,
        token_secret: impl Into<Vec<u8>>,
        token_ttl_hours: i64,
        bcrypt_cost: u32,
        max_upload_bytes: usize,
        notifications: NotificationSettings,
    ) -> CoreResult<Self> {
        let token_secret = token_secret.into();
        if token_secret.len() < MIN_TOKEN_SECRET_BYTES {
            return Err(CoreError::invalid(format!(
                "token secret must be at least {} bytes",
                MIN_TOKEN_SECRET_BYTES
            )));
        }
        if token_ttl_hours <= 0 {
            return Err(CoreError::invalid("token TTL must be positive"));
        }
        if !(4..=31).contains(&bcrypt_cost) {
            return Err(CoreError::invalid("bcrypt cost must be between 4 and 31"));
        }
        if max_upload_bytes == 0 {
            return Err(CoreError::invalid("max upload size must be positive"));
        }

        Ok(Self {
            data_dir,
            token_secret,
            token_ttl_hours,
            bcrypt_cost,
            max_upload_bytes,
            notifications,
        })
    }

    /// Resolve the full configuration from a key lookup (normally `std::env::var`).
    pub fn from_lookup<F>(lookup: F) -> CoreResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let data_dir = data_dir_from_env_value(lookup(ENV_DATA_DIR));
        let token_secret = token_secret_from_env_value(lookup(ENV_TOKEN_SECRET))?;
        let token_ttl_hours = parse_or_default(
            ENV_TOKEN_TTL_HOURS,
            lookup(ENV_TOKEN_TTL_HOURS),
            DEFAULT_TOKEN_TTL_HOURS,
        )?;
        let bcrypt_cost =
            parse_or_default(ENV_BCRYPT_COST, lookup(ENV_BCRYPT_COST), DEFAULT_BCRYPT_COST)?;
        let max_upload_bytes = parse_or_default(
            ENV_MAX_UPLOAD_BYTES,
            lookup(ENV_MAX_UPLOAD_BYTES),
            DEFAULT_MAX_UPLOAD_BYTES,
        )?;
        let notifications = NotificationSettings {
            email: email_settings_from_env_values(
                lookup(ENV_EMAIL_API_URL),
                lookup(ENV_EMAIL_API_KEY),
                lookup(ENV_EMAIL_FROM),
            )?,
            whatsapp: whatsapp_settings_from_env_values(
                lookup(ENV_WHATSAPP_API_URL),
                lookup(ENV_WHATSAPP_PHONE_NUMBER_ID),
                lookup(ENV_WHATSAPP_ACCESS_TOKEN),
            )?,
        };

        Self::new(
            data_dir,
            token_secret,
            token_ttl_hours,
            bcrypt_cost,
            max_upload_bytes,
            notifications,
        )
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn clinics_dir(&self) -> PathBuf {
        self.data_dir.join(CLINICS_DIR_NAME)
    }

    pub fn token_secret(&self) -> &[u8] {
        &self.token_secret
    }

    pub fn token_ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(self.token_ttl_hours)
    }

    pub fn bcrypt_cost(&self) -> u32 {
        self.bcrypt_cost
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_bytes
    }

    pub fn notifications(&self) -> &NotificationSettings {
        &self.notifications
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_or_default<T>(key: &str, value: Option<String>, default: T) -> CoreResult<T>
where
    T: std::str::FromStr,
{
    match non_blank(value) {
        Some(raw) => raw
            .parse::<T>()
            .map_err(|_| CoreError::invalid(format!("{} has an invalid value: '{}'", key, raw))),
        None => Ok(default),
    }
}

/// Data directory, defaulting to `clinic_data` in the working directory.
pub fn data_dir_from_env_value(value: Option<String>) -> PathBuf {
    PathBuf::from(non_blank(value).unwrap_or_else(|| DEFAULT_DATA_DIR.into()))
}

/// The token secret has no default: running with a guessable key is never acceptable.
pub fn token_secret_from_env_value(value: Option<String>) -> CoreResult<String> {
    let secret = non_blank(value)
        .ok_or_else(|| CoreError::invalid(format!("{} must be set", ENV_TOKEN_SECRET)))?;
    if secret.len() < MIN_TOKEN_SECRET_BYTES {
        return Err(CoreError::invalid(format!(
            "{} must be at least {} bytes",
            ENV_TOKEN_SECRET, MIN_TOKEN_SECRET_BYTES
        )));
    }
    Ok(secret)
}

/// Email is configured only when all three values are present; a partial set is an error.
pub fn email_settings_from_env_values(
    api_url: Option<String>,
    api_key: Option<String>,
    from: Option<String>,
) -> CoreResult<Option<EmailSettings>> {
    match (non_blank(api_url), non_blank(api_key), non_blank(from)) {
        (None, None, None) => Ok(None),
        (Some(api_url), Some(api_key), Some(from)) => {
            let from = EmailAddress::parse(&from)
                .map_err(|e| CoreError::invalid(format!("{}: {}", ENV_EMAIL_FROM, e)))?;
            Ok(Some(EmailSettings {
                api_url,
                api_key,
                from,
            }))
        }
        _ => Err(CoreError::invalid(format!(
            "{}, {} and {} must be set together",
            ENV_EMAIL_API_URL, ENV_EMAIL_API_KEY, ENV_EMAIL_FROM
        ))),
    }
}

/// WhatsApp is configured when both the phone number id and access token are present. The API
/// base URL falls back to the public Graph API.
pub fn whatsapp_settings_from_env_values(
    api_url: Option<String>,
    phone_number_id: Option<String>,
    access_token: Option<String>,
) -> CoreResult<Option<WhatsAppSettings>> {
    match (non_blank(phone_number_id), non_blank(access_token)) {
        (None, None) => Ok(None),
        (Some(phone_number_id), Some(access_token)) => {
            let api_url = non_blank(api_url)
                .unwrap_or_else(|| DEFAULT_WHATSAPP_API_URL.into())
                .trim_end_matches('/')
                .to_string();
            NonEmptyText::new(&api_url)
                .map_err(|_| CoreError::invalid("WhatsApp API URL cannot be empty"))?;
            Ok(Some(WhatsAppSettings {
                api_url,
                phone_number_id,
                access_token,
            }))
        }
        _ => Err(CoreError::invalid(format!(
            "{} and {} must be set together",
            ENV_WHATSAPP_PHONE_NUMBER_ID, ENV_WHATSAPP_ACCESS_TOKEN
        ))),
    }
}
