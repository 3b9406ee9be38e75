use crate::vocab::{BreastDensity, BreastSide, Severity};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct DiagnosisView {
    pub id: String,
    pub patient_id: String,
    pub appointment_id: Option<String>,
    pub condition: String,
    pub icd_code: Option<String>,
    pub severity: Severity,
    pub notes: Option<String>,
    pub diagnosed_by: String,
    pub recorded_at: DateTime<Utc>,
    /// Set once a newer diagnosis replaces this one.
    pub superseded_by: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct RecordDiagnosisReq {
    pub appointment_id: Option<String>,
    pub condition: String,
    pub icd_code: Option<String>,
    pub severity: Severity,
    pub notes: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct SupersedeDiagnosisRes {
    pub previous: DiagnosisView,
    pub current: DiagnosisView,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct MedicationDto {
    pub name: String,
    pub dosage: String,
    pub frequency: String,
    pub duration_days: Option<u16>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct TreatmentView {
    pub id: String,
    pub patient_id: String,
    pub diagnosis_id: Option<String>,
    pub medications: Vec<MedicationDto>,
    pub procedures: Vec<String>,
    pub advice: Option<String>,
    pub follow_up_date: Option<NaiveDate>,
    pub prescribed_by: String,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct RecordTreatmentReq {
    pub diagnosis_id: Option<String>,
    #[serde(default)]
    pub medications: Vec<MedicationDto>,
    #[serde(default)]
    pub procedures: Vec<String>,
    pub advice: Option<String>,
    pub follow_up_date: Option<NaiveDate>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct MammographyView {
    pub id: String,
    pub patient_id: String,
    pub appointment_id: Option<String>,
    pub side: BreastSide,
    /// BI-RADS assessment category, 0 to 6.
    pub birads: u8,
    pub density: Option<BreastDensity>,
    pub findings: Option<String>,
    pub recommendation: Option<String>,
    pub image_hashes: Vec<String>,
    pub performed_by: String,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct RecordMammographyReq {
    pub appointment_id: Option<String>,
    pub side: BreastSide,
    pub birads: u8,
    pub density: Option<BreastDensity>,
    pub findings: Option<String>,
    pub recommendation: Option<String>,
    /// SHA-256 hashes of images previously uploaded for this patient.
    #[serde(default)]
    pub image_hashes: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct VitalsDto {
    pub systolic_bp: Option<u16>,
    pub diastolic_bp: Option<u16>,
    pub pulse: Option<u16>,
    pub temperature_c: Option<f32>,
    pub spo2_percent: Option<u8>,
    pub weight_kg: Option<f32>,
    pub height_cm: Option<f32>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct GpRecordView {
    pub id: String,
    pub patient_id: String,
    pub appointment_id: Option<String>,
    pub vitals: VitalsDto,
    /// Derived from weight and height when both are present.
    pub bmi: Option<f32>,
    pub chief_complaint: String,
    pub history: Option<String>,
    pub examination: Option<String>,
    pub notes: Option<String>,
    pub recorded_by: String,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct RecordGpReq {
    pub appointment_id: Option<String>,
    #[serde(default)]
    pub vitals: VitalsDto,
    pub chief_complaint: String,
    pub history: Option<String>,
    pub examination: Option<String>,
    pub notes: Option<String>,
}

/// One commit in a patient's clinical history.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct HistoryEntry {
    pub commit_id: String,
    /// First line of the commit message, e.g. `diagnosis:create: Diagnosis recorded`.
    pub summary: String,
    pub author_name: Option<String>,
    pub author_role: Option<String>,
    pub committed_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct FileView {
    pub hash: String,
    pub size_bytes: u64,
    pub media_type: Option<String>,
    pub original_filename: String,
    pub uploaded_by: String,
    pub stored_at: DateTime<Utc>,
}
