//! Outbound email and WhatsApp notifications.
//!
//! Sending is best effort. A channel without configuration is recorded as `skipped`, a provider
//! error as `failed`; neither is returned to the caller, so a notification can never fail the
//! request that triggered it. Every attempt is stored in the clinic's `notifications`
//! collection.
//!
//! - Email goes to a transactional-email HTTP API: `POST {api_url}` with a bearer key and a JSON
//!   body of `from`, `to`, `subject` and `text`.
//! - WhatsApp goes to the Business Cloud API: `POST {api_url}/{phone_number_id}/messages`.

use crate::auth::Principal;
use crate::config::{EmailSettings, NotificationSettings, WhatsAppSettings};
use crate::repositories::clinics::ClinicRecord;
use crate::repositories::helpers::{optional_id, parse_id, required_text};
use crate::repositories::patients::{load_patient, PatientRecord};
use crate::store::{Record, Storage};
use crate::{CoreError, CoreResult};
use api_shared::{
    AppointmentView, NotificationChannel, NotificationListQuery, NotificationStatus,
    NotificationView, NotifyPatientReq, Permission, QueueEntryView,
};
use camp_uuid::ShardableUuid;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;

const DEFAULT_LIST_LIMIT: usize = 100;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub id: ShardableUuid,
    pub clinic_id: ShardableUuid,
    pub channel: NotificationChannel,
    pub recipient: String,
    pub subject: Option<String>,
    pub body: String,
    pub status: NotificationStatus,
    pub error: Option<String>,
    pub patient_id: Option<ShardableUuid>,
    pub appointment_id: Option<ShardableUuid>,
    pub created_at: DateTime<Utc>,
}

impl Record for NotificationRecord {
    const COLLECTION: &'static str = "notifications";

    fn id(&self) -> &ShardableUuid {
        &self.id
    }
}

impl From<&NotificationRecord> for NotificationView {
    fn from(n: &NotificationRecord) -> Self {
        NotificationView {
            id: n.id.to_string(),
            channel: n.channel,
            recipient: n.recipient.clone(),
            subject: n.subject.clone(),
            body: n.body.clone(),
            status: n.status,
            error: n.error.clone(),
            patient_id: n.patient_id.as_ref().map(ToString::to_string),
            appointment_id: n.appointment_id.as_ref().map(ToString::to_string),
            created_at: n.created_at,
        }
    }
}

/// One message on one channel.
#[derive(Clone, Debug)]
pub struct Outgoing {
    pub channel: NotificationChannel,
    pub recipient: String,
    pub subject: Option<String>,
    pub body: String,
    pub patient_id: Option<ShardableUuid>,
    pub appointment_id: Option<ShardableUuid>,
}

/// Messages for every channel the patient can be reached on.
fn patient_messages(
    patient: &PatientRecord,
    only: Option<NotificationChannel>,
    subject: &str,
    body: &str,
    appointment_id: Option<&ShardableUuid>,
) -> Vec<Outgoing> {
    let mut out = Vec::new();
    let wanted = |c: NotificationChannel| only.map_or(true, |o| o == c);

    if let (true, Some(email)) = (wanted(NotificationChannel::Email), &patient.email) {
        out.push(Outgoing {
            channel: NotificationChannel::Email,
            recipient: email.to_string(),
            subject: Some(subject.to_string()),
            body: body.to_string(),
            patient_id: Some(patient.id.clone()),
            appointment_id: appointment_id.cloned(),
        });
    }
    if let (true, Some(phone)) = (wanted(NotificationChannel::Whatsapp), &patient.phone) {
        out.push(Outgoing {
            channel: NotificationChannel::Whatsapp,
            recipient: phone.digits().to_string(),
            subject: None,
            body: body.to_string(),
            patient_id: Some(patient.id.clone()),
            appointment_id: appointment_id.cloned(),
        });
    }
    out
}

#[derive(Clone, Debug)]
pub struct Notifier {
    storage: Storage,
    client: reqwest::Client,
}

impl Notifier {
    pub fn new(storage: Storage) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!("falling back to default HTTP client: {}", e);
                reqwest::Client::new()
            });
        Self { storage, client }
    }

    fn settings(&self) -> &NotificationSettings {
        self.storage.cfg().notifications()
    }

    /// Delivers one message and records the outcome.
    pub async fn send(&self, clinic_id: &ShardableUuid, message: Outgoing) -> NotificationRecord {
        let outcome = match message.channel {
            NotificationChannel::Email => match &self.settings().email {
                Some(email) => Some(self.send_email(email, &message).await),
                None => None,
            },
            NotificationChannel::Whatsapp => match &self.settings().whatsapp {
                Some(whatsapp) => Some(self.send_whatsapp(whatsapp, &message).await),
                None => None,
            },
        };

        let (status, error) = match outcome {
            None => (NotificationStatus::Skipped, Some("channel not configured".to_string())),
            Some(Ok(())) => (NotificationStatus::Sent, None),
            Some(Err(e)) => {
                tracing::warn!(channel = %message.channel, "notification failed: {}", e);
                (NotificationStatus::Failed, Some(e.to_string()))
            }
        };

        let record = NotificationRecord {
            id: ShardableUuid::new(),
            clinic_id: clinic_id.clone(),
            channel: message.channel,
            recipient: message.recipient,
            subject: message.subject,
            body: message.body,
            status,
            error,
            patient_id: message.patient_id,
            appointment_id: message.appointment_id,
            created_at: Utc::now(),
        };

        let store = self.storage.tenant(clinic_id);
        let mut tx = store.transaction();
        if let Err(e) = tx.put(&record).and_then(|()| tx.commit()) {
            tracing::error!(notification = %record.id, "failed to record notification: {}", e);
        }

        tracing::info!(
            clinic = %clinic_id,
            notification = %record.id,
            channel = %record.channel,
            status = %record.status,
            "notification processed"
        );
        record
    }

    async fn send_all(&self, clinic_id: &ShardableUuid, messages: Vec<Outgoing>) -> Vec<NotificationRecord> {
        let mut records = Vec::with_capacity(messages.len());
        for message in messages {
            records.push(self.send(clinic_id, message).await);
        }
        records
    }

    async fn send_email(&self, settings: &EmailSettings, message: &Outgoing) -> CoreResult<()> {
        let body = json!({
            "from": settings.from.as_str(),
            "to": message.recipient,
            "subject": message.subject.as_deref().unwrap_or_default(),
            "text": message.body,
        });
        self.post(&settings.api_url, &settings.api_key, &body).await
    }

    async fn send_whatsapp(&self, settings: &WhatsAppSettings, message: &Outgoing) -> CoreResult<()> {
        let url = format!("{}/{}/messages", settings.api_url, settings.phone_number_id);
        let body = json!({
            "messaging_product": "whatsapp",
            "to": message.recipient,
            "type": "text",
            "text": { "body": message.body },
        });
        self.post(&url, &settings.access_token, &body).await
    }

    async fn post(&self, url: &str, token: &str, body: &serde_json::Value) -> CoreResult<()> {
        let response = self
            .client
            .post(url)
            .bearer_auth(token)
            .json(body)
            .send()
            .await
            .map_err(|e| CoreError::Notification(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(CoreError::Notification(format!(
                "provider returned {}: {}",
                status,
                detail.chars().take(200).collect::<String>()
            )));
        }
        Ok(())
    }

    /// Welcome email for a new staff account.
    pub async fn welcome_staff(
        &self,
        clinic: &ClinicRecord,
        name: &str,
        email: &str,
    ) -> NotificationRecord {
        let body = format!(
            "Hello {},\n\nAn account has been created for you at {}. Sign in with clinic code '{}' and this email address.",
            name, clinic.name, clinic.slug
        );
        self.send(
            &clinic.id,
            Outgoing {
                channel: NotificationChannel::Email,
                recipient: email.to_string(),
                subject: Some(format!("Welcome to {}", clinic.name)),
                body,
                patient_id: None,
                appointment_id: None,
            },
        )
        .await
    }

    /// Confirmation on every channel the patient can be reached on. A patient without contact
    /// details gets nothing.
    pub async fn appointment_confirmation(
        &self,
        principal: &Principal,
        appointment: &AppointmentView,
    ) -> Vec<NotificationRecord> {
        let (Ok(patient_id), Ok(appointment_id)) = (
            ShardableUuid::parse(&appointment.patient_id),
            ShardableUuid::parse(&appointment.id),
        ) else {
            return Vec::new();
        };
        let store = self.storage.tenant(principal.clinic_id());
        let patient = match load_patient(&store, &patient_id) {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(appointment = %appointment.id, "no confirmation sent: {}", e);
                return Vec::new();
            }
        };

        let body = format!(
            "Dear {}, your {} appointment at {} is booked for {} UTC.",
            patient.first_name,
            appointment.service.as_str().replace('_', " "),
            principal.clinic.name,
            appointment.scheduled_at.format("%d %b %Y %H:%M")
        );
        let messages = patient_messages(
            &patient,
            None,
            "Appointment confirmation",
            &body,
            Some(&appointment_id),
        );
        self.send_all(principal.clinic_id(), messages).await
    }

    /// WhatsApp notice that the patient's token has been called.
    pub async fn queue_called(
        &self,
        principal: &Principal,
        entry: &QueueEntryView,
    ) -> Vec<NotificationRecord> {
        let Ok(patient_id) = ShardableUuid::parse(&entry.patient_id) else {
            return Vec::new();
        };
        let store = self.storage.tenant(principal.clinic_id());
        let Ok(patient) = load_patient(&store, &patient_id) else {
            return Vec::new();
        };

        let body = format!(
            "Token {}: please come to the consultation desk at {}.",
            entry.token_number, principal.clinic.name
        );
        let appointment_id = entry
            .appointment_id
            .as_deref()
            .and_then(|id| ShardableUuid::parse(id).ok());
        let messages = patient_messages(
            &patient,
            Some(NotificationChannel::Whatsapp),
            "Your turn",
            &body,
            appointment_id.as_ref(),
        );
        self.send_all(principal.clinic_id(), messages).await
    }

    /// Manual message to a patient.
    ///
    /// # Errors
    ///
    /// [`CoreError::InvalidInput`] when the patient cannot be reached on the requested channel
    /// (or on any channel when none is requested).
    pub async fn notify_patient(
        &self,
        principal: &Principal,
        patient_id: &str,
        req: NotifyPatientReq,
    ) -> CoreResult<Vec<NotificationView>> {
        principal.require(Permission::SendNotifications)?;
        let id = parse_id("patient", patient_id)?;
        let patient = load_patient(&self.storage.tenant(principal.clinic_id()), &id)?;
        let message = required_text("message", &req.message)?;
        let subject = req
            .subject
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| format!("Message from {}", principal.clinic.name));

        let messages = patient_messages(&patient, req.channel, &subject, message.as_str(), None);
        if messages.is_empty() {
            return Err(CoreError::invalid(match req.channel {
                Some(NotificationChannel::Email) => "patient has no email address",
                Some(NotificationChannel::Whatsapp) => "patient has no phone number",
                None => "patient has no email address or phone number",
            }));
        }

        let records = self.send_all(principal.clinic_id(), messages).await;
        Ok(records.iter().map(NotificationView::from).collect())
    }

    /// The notification log, most recent first.
    pub fn list(
        &self,
        principal: &Principal,
        query: NotificationListQuery,
    ) -> CoreResult<Vec<NotificationView>> {
        principal.require(Permission::SendNotifications)?;
        let patient_id = optional_id("patient", query.patient_id)?;

        let mut records = self
            .storage
            .tenant(principal.clinic_id())
            .list::<NotificationRecord>()?;
        records.retain(|n| patient_id.is_none() || n.patient_id == patient_id);
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        records.truncate(query.limit.unwrap_or(DEFAULT_LIST_LIMIT));
        Ok(records.iter().map(NotificationView::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CoreConfig;
    use crate::repositories::clinics::tests::onboard_test_clinic;
    use crate::repositories::patients::tests::register;
    use crate::repositories::staff::tests::add_staff;
    use crate::store::tests::{test_storage, TEST_SECRET};
    use camp_types::EmailAddress;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn notify_req(channel: Option<NotificationChannel>) -> NotifyPatientReq {
        NotifyPatientReq {
            channel,
            subject: None,
            message: "Your reports are ready".into(),
        }
    }

    #[tokio::test]
    async fn unconfigured_channels_are_skipped_and_logged() {
        let temp = TempDir::new().unwrap();
        let storage = test_storage(&temp);
        let admin = onboard_test_clinic(&storage, "hope-clinic");
        let patient = register(&storage, &admin, "Asha");
        let notifier = Notifier::new(storage.clone());

        let sent = notifier.notify_patient(&admin, &patient.id, notify_req(None)).await.unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].channel, NotificationChannel::Whatsapp);
        assert_eq!(sent[0].status, NotificationStatus::Skipped);
        assert_eq!(sent[0].recipient, "919900011122");

        let err = notifier
            .notify_patient(&admin, &patient.id, notify_req(Some(NotificationChannel::Email)))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidInput(_)));

        let log = notifier
            .list(
                &admin,
                NotificationListQuery {
                    patient_id: Some(patient.id.clone()),
                    limit: None,
                },
            )
            .unwrap();
        assert_eq!(log, sent);
    }

    #[tokio::test]
    async fn provider_errors_are_recorded_not_returned() {
        let temp = TempDir::new().unwrap();
        let cfg = CoreConfig::new(
            temp.path().to_path_buf(),
            TEST_SECRET,
            12,
            4,
            1024,
            NotificationSettings {
                email: Some(EmailSettings {
                    // Nothing listens on the discard port.
                    api_url: "http://127.0.0.1:9/send".into(),
                    api_key: "key".into(),
                    from: EmailAddress::parse("clinic@hope.example").unwrap(),
                }),
                whatsapp: None,
            },
        )
        .unwrap();
        let storage = Storage::new(Arc::new(cfg));
        let admin = onboard_test_clinic(&storage, "hope-clinic");
        let notifier = Notifier::new(storage.clone());

        let record = notifier
            .welcome_staff(&admin.clinic, "Dr Rao", "rao@hope.example")
            .await;
        assert_eq!(record.status, NotificationStatus::Failed);
        assert!(record.error.is_some());
        assert_eq!(
            record.subject.as_deref(),
            Some("Welcome to Hope Community Clinic")
        );
    }

    #[tokio::test]
    async fn listing_requires_permission() {
        let temp = TempDir::new().unwrap();
        let storage = test_storage(&temp);
        let admin = onboard_test_clinic(&storage, "hope-clinic");
        let radiographer = add_staff(&storage, &admin, "radiographer", "xray@hope.example");
        let notifier = Notifier::new(storage);

        assert!(matches!(
            notifier.list(&radiographer, NotificationListQuery::default()),
            Err(CoreError::Forbidden(_))
        ));
    }
}
