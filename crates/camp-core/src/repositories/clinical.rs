//! Clinical records: diagnoses, treatments, mammography reports and GP consultations.
//!
//! Each patient has one Git repository under the clinic's `clinical/` directory. Every clinical
//! write is a single commit attributed to the staff member who made it, so the record is an
//! append-only audit trail. Records are never deleted; a diagnosis that turns out wrong is
//! superseded by a new one and both states remain in history.
//!
//! ```text
//! clinical/<s1>/<s2>/<patient_id>/
//!   .gitignore
//!   diagnoses/<id>.yaml
//!   treatments/<id>.yaml
//!   mammography/<id>.yaml
//!   gp/<id>.yaml
//! ```

use crate::auth::Principal;
use crate::constants::{
    CLINICAL_DIR_NAME, DEFAULT_GITIGNORE, DIAGNOSES_DIR_NAME, GP_RECORDS_DIR_NAME,
    MAMMOGRAPHY_DIR_NAME, TREATMENTS_DIR_NAME,
};
use crate::repositories::appointments::AppointmentRecord;
use crate::repositories::helpers::{optional_id, optional_text, parse_id, required_text};
use crate::repositories::patients::{load_patient, PatientRecord};
use crate::store::{read_yaml, RecordStore, Storage};
use crate::versioned_files::{
    CommitAction, CommitDomain, CommitMessage, FileToWrite, VersionedFileService,
};
use crate::{CoreError, CoreResult};
use api_shared::{
    BreastDensity, BreastSide, DiagnosisView, GpRecordView, HistoryEntry, MammographyView,
    MedicationDto, Permission, RecordDiagnosisReq, RecordGpReq, RecordMammographyReq,
    RecordTreatmentReq, Severity, SupersedeDiagnosisRes, TreatmentView, VitalsDto,
};
use camp_files::FilesService;
use camp_types::NonEmptyText;
use camp_uuid::{Sha256Hash, ShardableUuid};
use chrono::{DateTime, NaiveDate, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const GITIGNORE_FILE_NAME: &str = ".gitignore";
const MAX_BIRADS: u8 = 6;
/// BI-RADS 4 and above warrant biopsy or further workup.
pub const SUSPICIOUS_BIRADS: u8 = 4;

/// A YAML document committed to a patient's clinical repository.
trait ClinicalDocument: Serialize + DeserializeOwned {
    const DIR: &'static str;
    const DOMAIN: CommitDomain;

    fn id(&self) -> &ShardableUuid;
    fn recorded_at(&self) -> DateTime<Utc>;

    fn relative_path(id: &ShardableUuid) -> PathBuf {
        Path::new(Self::DIR).join(format!("{}.yaml", id))
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DiagnosisRecord {
    pub id: ShardableUuid,
    pub patient_id: ShardableUuid,
    pub appointment_id: Option<ShardableUuid>,
    pub condition: NonEmptyText,
    pub icd_code: Option<String>,
    pub severity: Severity,
    pub notes: Option<String>,
    /// Staff user id.
    pub diagnosed_by: ShardableUuid,
    pub recorded_at: DateTime<Utc>,
    pub superseded_by: Option<ShardableUuid>,
}

impl ClinicalDocument for DiagnosisRecord {
    const DIR: &'static str = DIAGNOSES_DIR_NAME;
    const DOMAIN: CommitDomain = CommitDomain::Diagnosis;

    fn id(&self) -> &ShardableUuid {
        &self.id
    }

    fn recorded_at(&self) -> DateTime<Utc> {
        self.recorded_at
    }
}

impl From<&DiagnosisRecord> for DiagnosisView {
    fn from(d: &DiagnosisRecord) -> Self {
        DiagnosisView {
            id: d.id.to_string(),
            patient_id: d.patient_id.to_string(),
            appointment_id: d.appointment_id.as_ref().map(ToString::to_string),
            condition: d.condition.to_string(),
            icd_code: d.icd_code.clone(),
            severity: d.severity,
            notes: d.notes.clone(),
            diagnosed_by: d.diagnosed_by.to_string(),
            recorded_at: d.recorded_at,
            superseded_by: d.superseded_by.as_ref().map(ToString::to_string),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Medication {
    pub name: NonEmptyText,
    pub dosage: NonEmptyText,
    pub frequency: NonEmptyText,
    pub duration_days: Option<u16>,
}

impl TryFrom<MedicationDto> for Medication {
    type Error = CoreError;

    fn try_from(m: MedicationDto) -> CoreResult<Self> {
        if m.duration_days == Some(0) {
            return Err(CoreError::invalid("medication duration_days must be positive"));
        }
        Ok(Medication {
            name: required_text("medication name", &m.name)?,
            dosage: required_text("medication dosage", &m.dosage)?,
            frequency: required_text("medication frequency", &m.frequency)?,
            duration_days: m.duration_days,
        })
    }
}

impl From<&Medication> for MedicationDto {
    fn from(m: &Medication) -> Self {
        MedicationDto {
            name: m.name.to_string(),
            dosage: m.dosage.to_string(),
            frequency: m.frequency.to_string(),
            duration_days: m.duration_days,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TreatmentRecord {
    pub id: ShardableUuid,
    pub patient_id: ShardableUuid,
    pub diagnosis_id: Option<ShardableUuid>,
    pub medications: Vec<Medication>,
    pub procedures: Vec<String>,
    pub advice: Option<String>,
    pub follow_up_date: Option<NaiveDate>,
    pub prescribed_by: ShardableUuid,
    pub recorded_at: DateTime<Utc>,
}

impl ClinicalDocument for TreatmentRecord {
    const DIR: &'static str = TREATMENTS_DIR_NAME;
    const DOMAIN: CommitDomain = CommitDomain::Treatment;

    fn id(&self) -> &ShardableUuid {
        &self.id
    }

    fn recorded_at(&self) -> DateTime<Utc> {
        self.recorded_at
    }
}

impl From<&TreatmentRecord> for TreatmentView {
    fn from(t: &TreatmentRecord) -> Self {
        TreatmentView {
            id: t.id.to_string(),
            patient_id: t.patient_id.to_string(),
            diagnosis_id: t.diagnosis_id.as_ref().map(ToString::to_string),
            medications: t.medications.iter().map(MedicationDto::from).collect(),
            procedures: t.procedures.clone(),
            advice: t.advice.clone(),
            follow_up_date: t.follow_up_date,
            prescribed_by: t.prescribed_by.to_string(),
            recorded_at: t.recorded_at,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MammographyRecord {
    pub id: ShardableUuid,
    pub patient_id: ShardableUuid,
    pub appointment_id: Option<ShardableUuid>,
    pub side: BreastSide,
    pub birads: u8,
    pub density: Option<BreastDensity>,
    pub findings: Option<String>,
    pub recommendation: Option<String>,
    pub image_hashes: Vec<Sha256Hash>,
    pub performed_by: ShardableUuid,
    pub recorded_at: DateTime<Utc>,
}

impl MammographyRecord {
    pub fn is_suspicious(&self) -> bool {
        self.birads >= SUSPICIOUS_BIRADS
    }
}

impl ClinicalDocument for MammographyRecord {
    const DIR: &'static str = MAMMOGRAPHY_DIR_NAME;
    const DOMAIN: CommitDomain = CommitDomain::Mammography;

    fn id(&self) -> &ShardableUuid {
        &self.id
    }

    fn recorded_at(&self) -> DateTime<Utc> {
        self.recorded_at
    }
}

impl From<&MammographyRecord> for MammographyView {
    fn from(m: &MammographyRecord) -> Self {
        MammographyView {
            id: m.id.to_string(),
            patient_id: m.patient_id.to_string(),
            appointment_id: m.appointment_id.as_ref().map(ToString::to_string),
            side: m.side,
            birads: m.birads,
            density: m.density,
            findings: m.findings.clone(),
            recommendation: m.recommendation.clone(),
            image_hashes: m.image_hashes.iter().map(ToString::to_string).collect(),
            performed_by: m.performed_by.to_string(),
            recorded_at: m.recorded_at,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GpRecord {
    pub id: ShardableUuid,
    pub patient_id: ShardableUuid,
    pub appointment_id: Option<ShardableUuid>,
    pub vitals: VitalsDto,
    pub bmi: Option<f32>,
    pub chief_complaint: NonEmptyText,
    pub history: Option<String>,
    pub examination: Option<String>,
    pub notes: Option<String>,
    pub recorded_by: ShardableUuid,
    pub recorded_at: DateTime<Utc>,
}

impl ClinicalDocument for GpRecord {
    const DIR: &'static str = GP_RECORDS_DIR_NAME;
    const DOMAIN: CommitDomain = CommitDomain::GeneralPhysician;

    fn id(&self) -> &ShardableUuid {
        &self.id
    }

    fn recorded_at(&self) -> DateTime<Utc> {
        self.recorded_at
    }
}

impl From<&GpRecord> for GpRecordView {
    fn from(g: &GpRecord) -> Self {
        GpRecordView {
            id: g.id.to_string(),
            patient_id: g.patient_id.to_string(),
            appointment_id: g.appointment_id.as_ref().map(ToString::to_string),
            vitals: g.vitals.clone(),
            bmi: g.bmi,
            chief_complaint: g.chief_complaint.to_string(),
            history: g.history.clone(),
            examination: g.examination.clone(),
            notes: g.notes.clone(),
            recorded_by: g.recorded_by.to_string(),
            recorded_at: g.recorded_at,
        }
    }
}

fn check_range<T: PartialOrd + std::fmt::Display + Copy>(
    field: &str,
    value: Option<T>,
    min: T,
    max: T,
) -> CoreResult<()> {
    match value {
        Some(v) if v < min || v > max => Err(CoreError::invalid(format!(
            "{} must be between {} and {}",
            field, min, max
        ))),
        _ => Ok(()),
    }
}

/// Rejects physiologically implausible vitals, which are almost always entry mistakes.
pub fn validate_vitals(v: &VitalsDto) -> CoreResult<()> {
    check_range("systolic_bp", v.systolic_bp, 50, 260)?;
    check_range("diastolic_bp", v.diastolic_bp, 30, 160)?;
    if let (Some(sys), Some(dia)) = (v.systolic_bp, v.diastolic_bp) {
        if dia >= sys {
            return Err(CoreError::invalid("diastolic_bp must be below systolic_bp"));
        }
    }
    check_range("pulse", v.pulse, 20, 250)?;
    check_range("temperature_c", v.temperature_c, 30.0, 45.0)?;
    check_range("spo2_percent", v.spo2_percent, 50, 100)?;
    check_range("weight_kg", v.weight_kg, 0.5, 400.0)?;
    check_range("height_cm", v.height_cm, 30.0, 250.0)?;
    Ok(())
}

/// Body-mass index rounded to one decimal place.
pub fn bmi(weight_kg: Option<f32>, height_cm: Option<f32>) -> Option<f32> {
    let (w, h) = (f64::from(weight_kg?), f64::from(height_cm?));
    let exact = w * 10_000.0 / (h * h);
    Some(((exact * 10.0).round() / 10.0) as f32)
}

pub(crate) fn clinical_root(storage: &Storage, clinic_id: &ShardableUuid) -> PathBuf {
    storage.clinic_dir(clinic_id).join(CLINICAL_DIR_NAME)
}

fn repo_dir(storage: &Storage, clinic_id: &ShardableUuid, patient_id: &ShardableUuid) -> PathBuf {
    patient_id.sharded_dir(&clinical_root(storage, clinic_id))
}

/// Creates the patient's clinical repository on first use. Caller holds the tenant lock.
pub(crate) fn ensure_repo(
    storage: &Storage,
    principal: &Principal,
    patient_id: &ShardableUuid,
) -> CoreResult<PathBuf> {
    let dir = repo_dir(storage, principal.clinic_id(), patient_id);
    if dir.join(".git").is_dir() {
        return Ok(dir);
    }

    let message = CommitMessage::new(
        CommitDomain::Record,
        CommitAction::Create,
        "Clinical record created",
        principal.clinic.name.as_str(),
    )?;
    VersionedFileService::init_and_commit(
        &dir,
        &principal.author()?,
        &message,
        &[FileToWrite {
            relative_path: Path::new(GITIGNORE_FILE_NAME),
            content: DEFAULT_GITIGNORE,
            old_content: None,
        }],
    )?;

    tracing::info!(patient = %patient_id, "clinical repository created");
    Ok(dir)
}

fn read_document<D: ClinicalDocument>(repo: &Path, id: &ShardableUuid) -> CoreResult<Option<D>> {
    read_yaml(&repo.join(D::relative_path(id)))
}

/// Every document of one kind, newest first. Unparsable files are logged and skipped.
fn list_documents<D: ClinicalDocument>(repo: &Path) -> CoreResult<Vec<D>> {
    let dir = repo.join(D::DIR);
    let entries = match fs::read_dir(&dir) {
        Ok(it) => it,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(CoreError::FileRead(e)),
    };

    let mut docs: Vec<D> = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("yaml") {
            continue;
        }
        match read_yaml::<D>(&path) {
            Ok(Some(doc)) => docs.push(doc),
            Ok(None) => {}
            Err(e) => tracing::warn!("skipping unreadable clinical document {}: {}", path.display(), e),
        }
    }
    docs.sort_by(|a, b| b.recorded_at().cmp(&a.recorded_at()));
    Ok(docs)
}

/// Everything recorded for one patient.
#[derive(Clone, Debug, Default)]
pub struct PatientClinical {
    pub diagnoses: Vec<DiagnosisRecord>,
    pub treatments: Vec<TreatmentRecord>,
    pub mammography: Vec<MammographyRecord>,
    pub gp_records: Vec<GpRecord>,
}

impl PatientClinical {
    fn last_recorded_at(&self) -> Option<DateTime<Utc>> {
        let d = self.diagnoses.iter().map(|x| x.recorded_at);
        let t = self.treatments.iter().map(|x| x.recorded_at);
        let m = self.mammography.iter().map(|x| x.recorded_at);
        let g = self.gp_records.iter().map(|x| x.recorded_at);
        d.chain(t).chain(m).chain(g).max()
    }
}

pub(crate) fn patient_clinical(
    storage: &Storage,
    clinic_id: &ShardableUuid,
    patient_id: &ShardableUuid,
) -> CoreResult<PatientClinical> {
    let repo = repo_dir(storage, clinic_id, patient_id);
    if !repo.is_dir() {
        return Ok(PatientClinical::default());
    }
    Ok(PatientClinical {
        diagnoses: list_documents(&repo)?,
        treatments: list_documents(&repo)?,
        mammography: list_documents(&repo)?,
        gp_records: list_documents(&repo)?,
    })
}

/// Counts used by the patient summary.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct ClinicalCounts {
    pub diagnoses: u64,
    pub active_diagnoses: u64,
    pub treatments: u64,
    pub mammography: u64,
    pub gp_records: u64,
    pub files: u64,
    pub last_recorded_at: Option<DateTime<Utc>>,
}

pub(crate) fn patient_counts(
    storage: &Storage,
    clinic_id: &ShardableUuid,
    patient_id: &ShardableUuid,
) -> CoreResult<ClinicalCounts> {
    let clinical = patient_clinical(storage, clinic_id, patient_id)?;
    let files = match FilesService::new(&clinical_root(storage, clinic_id), patient_id) {
        Ok(files) => files.list()?.len() as u64,
        Err(_) => 0,
    };

    Ok(ClinicalCounts {
        diagnoses: clinical.diagnoses.len() as u64,
        active_diagnoses: clinical
            .diagnoses
            .iter()
            .filter(|d| d.superseded_by.is_none())
            .count() as u64,
        treatments: clinical.treatments.len() as u64,
        mammography: clinical.mammography.len() as u64,
        gp_records: clinical.gp_records.len() as u64,
        files,
        last_recorded_at: clinical.last_recorded_at(),
    })
}

/// An appointment referenced by a clinical record must belong to the same patient.
fn check_appointment(
    store: &RecordStore,
    patient: &PatientRecord,
    appointment_id: Option<&ShardableUuid>,
) -> CoreResult<()> {
    if let Some(id) = appointment_id {
        let appointment = store.load::<AppointmentRecord>(id, "appointment")?;
        if appointment.patient_id != patient.id {
            return Err(CoreError::invalid("appointment belongs to a different patient"));
        }
    }
    Ok(())
}

#[derive(Clone, Debug)]
pub struct ClinicalService {
    storage: Storage,
}

impl ClinicalService {
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }

    fn patient(&self, principal: &Principal, patient_id: &str) -> CoreResult<(RecordStore, PatientRecord)> {
        let id = parse_id("patient", patient_id)?;
        let store = self.storage.tenant(principal.clinic_id());
        let patient = load_patient(&store, &id)?;
        Ok((store, patient))
    }

    fn repo_for_reading(&self, principal: &Principal, patient_id: &str) -> CoreResult<PathBuf> {
        principal.require(Permission::ViewClinicalRecords)?;
        let (_, patient) = self.patient(principal, patient_id)?;
        Ok(repo_dir(&self.storage, principal.clinic_id(), &patient.id))
    }

    /// Commits one new document. Caller holds the tenant lock.
    fn commit_new<D: ClinicalDocument>(
        &self,
        principal: &Principal,
        doc: &D,
        patient_id: &ShardableUuid,
        summary: &str,
    ) -> CoreResult<()> {
        let repo = ensure_repo(&self.storage, principal, patient_id)?;
        let content = serde_yaml::to_string(doc).map_err(CoreError::YamlSerialization)?;
        let relative = D::relative_path(doc.id());
        let message = CommitMessage::new(
            D::DOMAIN,
            CommitAction::Create,
            summary,
            principal.clinic.name.as_str(),
        )?;

        VersionedFileService::write_and_commit_files(
            &repo,
            &principal.author()?,
            &message,
            &[FileToWrite {
                relative_path: &relative,
                content: &content,
                old_content: None,
            }],
        )?;
        Ok(())
    }

    // ---- diagnoses ----

    fn build_diagnosis(
        &self,
        principal: &Principal,
        store: &RecordStore,
        patient: &PatientRecord,
        req: RecordDiagnosisReq,
    ) -> CoreResult<DiagnosisRecord> {
        let appointment_id = optional_id("appointment", req.appointment_id)?;
        check_appointment(store, patient, appointment_id.as_ref())?;
        Ok(DiagnosisRecord {
            id: ShardableUuid::new(),
            patient_id: patient.id.clone(),
            appointment_id,
            condition: required_text("condition", &req.condition)?,
            icd_code: optional_text(req.icd_code).map(|c| c.to_uppercase()),
            severity: req.severity,
            notes: optional_text(req.notes),
            diagnosed_by: principal.user_id().clone(),
            recorded_at: Utc::now(),
            superseded_by: None,
        })
    }

    pub fn record_diagnosis(
        &self,
        principal: &Principal,
        patient_id: &str,
        req: RecordDiagnosisReq,
    ) -> CoreResult<DiagnosisView> {
        principal.require(Permission::RecordDiagnosis)?;
        let (store, patient) = self.patient(principal, patient_id)?;
        let diagnosis = self.build_diagnosis(principal, &store, &patient, req)?;

        let _lock = store.lock();
        self.commit_new(principal, &diagnosis, &patient.id, "Diagnosis recorded")?;

        tracing::info!(patient = %patient.id, diagnosis = %diagnosis.id, "diagnosis recorded");
        Ok((&diagnosis).into())
    }

    pub fn list_diagnoses(&self, principal: &Principal, patient_id: &str) -> CoreResult<Vec<DiagnosisView>> {
        let repo = self.repo_for_reading(principal, patient_id)?;
        Ok(list_documents::<DiagnosisRecord>(&repo)?
            .iter()
            .map(DiagnosisView::from)
            .collect())
    }

    pub fn get_diagnosis(
        &self,
        principal: &Principal,
        patient_id: &str,
        diagnosis_id: &str,
    ) -> CoreResult<DiagnosisView> {
        let repo = self.repo_for_reading(principal, patient_id)?;
        let id = parse_id("diagnosis", diagnosis_id)?;
        let diagnosis = read_document::<DiagnosisRecord>(&repo, &id)?
            .ok_or_else(|| CoreError::not_found("diagnosis"))?;
        Ok((&diagnosis).into())
    }

    /// Replaces a diagnosis with a new one. Both files change in one commit.
    ///
    /// # Errors
    ///
    /// [`CoreError::InvalidState`] if the diagnosis was already superseded.
    pub fn supersede_diagnosis(
        &self,
        principal: &Principal,
        patient_id: &str,
        diagnosis_id: &str,
        req: RecordDiagnosisReq,
    ) -> CoreResult<SupersedeDiagnosisRes> {
        principal.require(Permission::RecordDiagnosis)?;
        let (store, patient) = self.patient(principal, patient_id)?;
        let old_id = parse_id("diagnosis", diagnosis_id)?;
        let current = self.build_diagnosis(principal, &store, &patient, req)?;

        let _lock = store.lock();
        let repo = repo_dir(&self.storage, principal.clinic_id(), &patient.id);
        let old_path = DiagnosisRecord::relative_path(&old_id);
        let old_content = match fs::read_to_string(repo.join(&old_path)) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(CoreError::not_found("diagnosis"))
            }
            Err(e) => return Err(CoreError::FileRead(e)),
        };
        let mut previous: DiagnosisRecord =
            serde_yaml::from_str(&old_content).map_err(CoreError::YamlDeserialization)?;
        if let Some(by) = &previous.superseded_by {
            return Err(CoreError::InvalidState(format!(
                "diagnosis was already superseded by {}",
                by
            )));
        }
        previous.superseded_by = Some(current.id.clone());

        let previous_yaml = serde_yaml::to_string(&previous).map_err(CoreError::YamlSerialization)?;
        let current_yaml = serde_yaml::to_string(&current).map_err(CoreError::YamlSerialization)?;
        let current_path = DiagnosisRecord::relative_path(&current.id);
        let message = CommitMessage::new(
            CommitDomain::Diagnosis,
            CommitAction::Superseded,
            "Diagnosis superseded",
            principal.clinic.name.as_str(),
        )?
        .with_trailer("Supersedes", previous.id.to_string())?;

        VersionedFileService::write_and_commit_files(
            &repo,
            &principal.author()?,
            &message,
            &[
                FileToWrite {
                    relative_path: &old_path,
                    content: &previous_yaml,
                    old_content: Some(&old_content),
                },
                FileToWrite {
                    relative_path: &current_path,
                    content: &current_yaml,
                    old_content: None,
                },
            ],
        )?;

        tracing::info!(patient = %patient.id, previous = %previous.id, current = %current.id, "diagnosis superseded");
        Ok(SupersedeDiagnosisRes {
            previous: (&previous).into(),
            current: (&current).into(),
        })
    }

    // ---- treatments ----

    pub fn record_treatment(
        &self,
        principal: &Principal,
        patient_id: &str,
        req: RecordTreatmentReq,
    ) -> CoreResult<TreatmentView> {
        principal.require(Permission::RecordTreatment)?;
        let (_store, patient) = self.patient(principal, patient_id)?;

        let medications = req
            .medications
            .into_iter()
            .map(Medication::try_from)
            .collect::<CoreResult<Vec<_>>>()?;
        let procedures: Vec<String> = req
            .procedures
            .into_iter()
            .filter_map(|p| optional_text(Some(p)))
            .collect();
        let advice = optional_text(req.advice);
        if medications.is_empty() && procedures.is_empty() && advice.is_none() {
            return Err(CoreError::invalid(
                "a treatment needs at least one medication, procedure or advice",
            ));
        }
        if let Some(follow_up) = req.follow_up_date {
            if follow_up < Utc::now().date_naive() {
                return Err(CoreError::invalid("follow_up_date is in the past"));
            }
        }

        let diagnosis_id = optional_id("diagnosis", req.diagnosis_id)?;
        let treatment = TreatmentRecord {
            id: ShardableUuid::new(),
            patient_id: patient.id.clone(),
            diagnosis_id,
            medications,
            procedures,
            advice,
            follow_up_date: req.follow_up_date,
            prescribed_by: principal.user_id().clone(),
            recorded_at: Utc::now(),
        };

        let store = self.storage.tenant(principal.clinic_id());
        let _lock = store.lock();
        if let Some(diagnosis_id) = &treatment.diagnosis_id {
            let repo = repo_dir(&self.storage, principal.clinic_id(), &patient.id);
            if read_document::<DiagnosisRecord>(&repo, diagnosis_id)?.is_none() {
                return Err(CoreError::not_found("diagnosis"));
            }
        }
        self.commit_new(principal, &treatment, &patient.id, "Treatment recorded")?;

        tracing::info!(patient = %patient.id, treatment = %treatment.id, "treatment recorded");
        Ok((&treatment).into())
    }

    pub fn list_treatments(&self, principal: &Principal, patient_id: &str) -> CoreResult<Vec<TreatmentView>> {
        let repo = self.repo_for_reading(principal, patient_id)?;
        Ok(list_documents::<TreatmentRecord>(&repo)?
            .iter()
            .map(TreatmentView::from)
            .collect())
    }

    // ---- mammography ----

    /// # Errors
    ///
    /// [`CoreError::InvalidInput`] for a BI-RADS category above 6 or an image hash that is
    /// not an upload of this patient.
    pub fn record_mammography(
        &self,
        principal: &Principal,
        patient_id: &str,
        req: RecordMammographyReq,
    ) -> CoreResult<MammographyView> {
        principal.require(Permission::RecordMammography)?;
        let (store, patient) = self.patient(principal, patient_id)?;
        if req.birads > MAX_BIRADS {
            return Err(CoreError::invalid(format!(
                "birads must be between 0 and {}",
                MAX_BIRADS
            )));
        }
        let appointment_id = optional_id("appointment", req.appointment_id)?;
        check_appointment(&store, &patient, appointment_id.as_ref())?;

        let mut image_hashes: Vec<Sha256Hash> = Vec::with_capacity(req.image_hashes.len());
        for raw in &req.image_hashes {
            let hash = Sha256Hash::parse(raw.trim())
                .map_err(|_| CoreError::invalid(format!("invalid image hash '{}'", raw)))?;
            if !image_hashes.contains(&hash) {
                image_hashes.push(hash);
            }
        }

        let report = MammographyRecord {
            id: ShardableUuid::new(),
            patient_id: patient.id.clone(),
            appointment_id,
            side: req.side,
            birads: req.birads,
            density: req.density,
            findings: optional_text(req.findings),
            recommendation: optional_text(req.recommendation),
            image_hashes,
            performed_by: principal.user_id().clone(),
            recorded_at: Utc::now(),
        };

        let _lock = store.lock();
        if !report.image_hashes.is_empty() {
            let files = FilesService::new(&clinical_root(&self.storage, principal.clinic_id()), &patient.id)
                .map_err(|_| CoreError::invalid("image hashes must reference uploads of this patient"))?;
            if let Some(missing) = report.image_hashes.iter().find(|h| !files.contains(h)) {
                return Err(CoreError::invalid(format!(
                    "image {} is not an upload of this patient",
                    missing
                )));
            }
        }
        self.commit_new(principal, &report, &patient.id, "Mammography report recorded")?;

        tracing::info!(patient = %patient.id, report = %report.id, birads = report.birads, "mammography recorded");
        Ok((&report).into())
    }

    pub fn list_mammography(&self, principal: &Principal, patient_id: &str) -> CoreResult<Vec<MammographyView>> {
        let repo = self.repo_for_reading(principal, patient_id)?;
        Ok(list_documents::<MammographyRecord>(&repo)?
            .iter()
            .map(MammographyView::from)
            .collect())
    }

    // ---- general physician ----

    pub fn record_gp(
        &self,
        principal: &Principal,
        patient_id: &str,
        req: RecordGpReq,
    ) -> CoreResult<GpRecordView> {
        principal.require(Permission::RecordGeneralPhysician)?;
        let (store, patient) = self.patient(principal, patient_id)?;
        validate_vitals(&req.vitals)?;
        let appointment_id = optional_id("appointment", req.appointment_id)?;
        check_appointment(&store, &patient, appointment_id.as_ref())?;

        let record = GpRecord {
            id: ShardableUuid::new(),
            patient_id: patient.id.clone(),
            appointment_id,
            bmi: bmi(req.vitals.weight_kg, req.vitals.height_cm),
            vitals: req.vitals,
            chief_complaint: required_text("chief_complaint", &req.chief_complaint)?,
            history: optional_text(req.history),
            examination: optional_text(req.examination),
            notes: optional_text(req.notes),
            recorded_by: principal.user_id().clone(),
            recorded_at: Utc::now(),
        };

        let _lock = store.lock();
        self.commit_new(principal, &record, &patient.id, "Consultation recorded")?;

        tracing::info!(patient = %patient.id, record = %record.id, "gp consultation recorded");
        Ok((&record).into())
    }

    pub fn list_gp(&self, principal: &Principal, patient_id: &str) -> CoreResult<Vec<GpRecordView>> {
        let repo = self.repo_for_reading(principal, patient_id)?;
        Ok(list_documents::<GpRecord>(&repo)?
            .iter()
            .map(GpRecordView::from)
            .collect())
    }

    // ---- history ----

    /// Commits of the patient's clinical repository, newest first.
    pub fn history(
        &self,
        principal: &Principal,
        patient_id: &str,
        limit: Option<usize>,
    ) -> CoreResult<Vec<HistoryEntry>> {
        let repo = self.repo_for_reading(principal, patient_id)?;
        if !repo.join(".git").is_dir() {
            return Ok(Vec::new());
        }
        Ok(VersionedFileService::history(&repo, limit)?
            .into_iter()
            .map(|c| HistoryEntry {
                commit_id: c.id,
                summary: c.summary,
                author_name: c.author_name,
                author_role: c.author_role,
                committed_at: c.time,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::clinics::tests::onboard_test_clinic;
    use crate::repositories::patients::tests::register;
    use crate::repositories::staff::tests::add_staff;
    use crate::repositories::uploads::UploadService;
    use crate::store::tests::test_storage;
    use tempfile::TempDir;

    fn diagnosis_req(condition: &str) -> RecordDiagnosisReq {
        RecordDiagnosisReq {
            appointment_id: None,
            condition: condition.into(),
            icd_code: Some("e11.9".into()),
            severity: Severity::Moderate,
            notes: None,
        }
    }

    #[test]
    fn bmi_is_rounded_and_needs_both_measurements() {
        assert_eq!(bmi(Some(70.0), Some(175.0)), Some(22.9));
        assert_eq!(bmi(Some(80.0), Some(160.0)), Some(31.3));
        assert_eq!(bmi(Some(70.0), None), None);
        assert_eq!(bmi(None, Some(160.0)), None);
    }

    #[test]
    fn implausible_vitals_are_rejected() {
        let ok = VitalsDto {
            systolic_bp: Some(120),
            diastolic_bp: Some(80),
            pulse: Some(72),
            temperature_c: Some(36.8),
            spo2_percent: Some(98),
            weight_kg: Some(60.0),
            height_cm: Some(158.0),
        };
        assert!(validate_vitals(&ok).is_ok());
        assert!(validate_vitals(&VitalsDto::default()).is_ok());

        let inverted = VitalsDto {
            diastolic_bp: Some(130),
            ..ok.clone()
        };
        assert!(validate_vitals(&inverted).is_err());

        let feverish = VitalsDto {
            temperature_c: Some(48.0),
            ..ok
        };
        let err = validate_vitals(&feverish).unwrap_err();
        assert!(err.to_string().contains("temperature_c"));
    }

    #[test]
    fn diagnoses_are_committed_and_superseded_once() {
        let temp = TempDir::new().unwrap();
        let storage = test_storage(&temp);
        let admin = onboard_test_clinic(&storage, "hope-clinic");
        let doctor = add_staff(&storage, &admin, "doctor", "doc@hope.example");
        let service = ClinicalService::new(storage.clone());
        let patient = register(&storage, &admin, "Asha");

        assert!(service.history(&doctor, &patient.id, None).unwrap().is_empty());

        let first = service
            .record_diagnosis(&doctor, &patient.id, diagnosis_req("Type 2 diabetes"))
            .unwrap();
        assert_eq!(first.icd_code.as_deref(), Some("E11.9"));
        assert_eq!(first.diagnosed_by, doctor.user_id().to_string());

        let res = service
            .supersede_diagnosis(&doctor, &patient.id, &first.id, diagnosis_req("Prediabetes"))
            .unwrap();
        assert_eq!(res.previous.superseded_by.as_deref(), Some(res.current.id.as_str()));
        assert_eq!(
            service.get_diagnosis(&doctor, &patient.id, &first.id).unwrap(),
            res.previous
        );

        let again = service.supersede_diagnosis(&doctor, &patient.id, &first.id, diagnosis_req("x"));
        assert!(matches!(again, Err(CoreError::InvalidState(_))));

        let missing = service.supersede_diagnosis(
            &doctor,
            &patient.id,
            &ShardableUuid::new().to_string(),
            diagnosis_req("x"),
        );
        assert!(matches!(missing, Err(CoreError::NotFound(_))));

        assert_eq!(service.list_diagnoses(&doctor, &patient.id).unwrap().len(), 2);

        let history = service.history(&doctor, &patient.id, None).unwrap();
        let summaries: Vec<&str> = history.iter().map(|h| h.summary.as_str()).collect();
        assert_eq!(summaries.len(), 3);
        assert!(summaries.contains(&"record:create: Clinical record created"));
        assert!(summaries.contains(&"diagnosis:create: Diagnosis recorded"));
        assert!(summaries.contains(&"diagnosis:superseded: Diagnosis superseded"));
        assert!(history
            .iter()
            .all(|h| h.author_role.as_deref() == Some("doctor")));
        // Commit messages never name the patient.
        assert!(history.iter().all(|h| !h.summary.contains("Asha")));
    }

    #[test]
    fn record_permissions_follow_roles() {
        let temp = TempDir::new().unwrap();
        let storage = test_storage(&temp);
        let admin = onboard_test_clinic(&storage, "hope-clinic");
        let reception = add_staff(&storage, &admin, "receptionist", "desk@hope.example");
        let radiographer = add_staff(&storage, &admin, "radiographer", "xray@hope.example");
        let service = ClinicalService::new(storage.clone());
        let patient = register(&storage, &admin, "Asha");

        assert!(matches!(
            service.record_diagnosis(&radiographer, &patient.id, diagnosis_req("x")),
            Err(CoreError::Forbidden(_))
        ));
        assert!(matches!(
            service.list_diagnoses(&reception, &patient.id),
            Err(CoreError::Forbidden(_))
        ));
        assert!(service.list_diagnoses(&radiographer, &patient.id).unwrap().is_empty());
    }

    #[test]
    fn treatment_links_to_an_existing_diagnosis() {
        let temp = TempDir::new().unwrap();
        let storage = test_storage(&temp);
        let admin = onboard_test_clinic(&storage, "hope-clinic");
        let service = ClinicalService::new(storage.clone());
        let patient = register(&storage, &admin, "Asha");
        let other = register(&storage, &admin, "Bina");
        let diagnosis = service
            .record_diagnosis(&admin, &patient.id, diagnosis_req("Hypertension"))
            .unwrap();

        let req = |diagnosis_id: Option<String>| RecordTreatmentReq {
            diagnosis_id,
            medications: vec![MedicationDto {
                name: "Amlodipine".into(),
                dosage: "5 mg".into(),
                frequency: "once daily".into(),
                duration_days: Some(30),
            }],
            procedures: vec![],
            advice: Some("Reduce salt".into()),
            follow_up_date: None,
        };

        let treatment = service
            .record_treatment(&admin, &patient.id, req(Some(diagnosis.id.clone())))
            .unwrap();
        assert_eq!(treatment.medications[0].name, "Amlodipine");

        // The diagnosis belongs to another patient.
        assert!(matches!(
            service.record_treatment(&admin, &other.id, req(Some(diagnosis.id.clone()))),
            Err(CoreError::NotFound(_))
        ));

        let empty = RecordTreatmentReq {
            diagnosis_id: None,
            medications: vec![],
            procedures: vec!["  ".into()],
            advice: None,
            follow_up_date: None,
        };
        assert!(matches!(
            service.record_treatment(&admin, &patient.id, empty),
            Err(CoreError::InvalidInput(_))
        ));
        assert_eq!(service.list_treatments(&admin, &patient.id).unwrap().len(), 1);
    }

    #[test]
    fn mammography_images_must_be_patient_uploads() {
        let temp = TempDir::new().unwrap();
        let storage = test_storage(&temp);
        let admin = onboard_test_clinic(&storage, "hope-clinic");
        let service = ClinicalService::new(storage.clone());
        let uploads = UploadService::new(storage.clone());
        let patient = register(&storage, &admin, "Asha");
        let other = register(&storage, &admin, "Bina");

        let image = uploads
            .upload(&admin, &patient.id, "left-cc.png", b"\x89PNG\r\n\x1a\nfake image")
            .unwrap();

        let req = |birads: u8, hashes: Vec<String>| RecordMammographyReq {
            appointment_id: None,
            side: BreastSide::Left,
            birads,
            density: Some(BreastDensity::B),
            findings: Some("Irregular mass upper outer quadrant".into()),
            recommendation: Some("Biopsy".into()),
            image_hashes: hashes,
        };

        let report = service
            .record_mammography(&admin, &patient.id, req(4, vec![image.hash.clone()]))
            .unwrap();
        assert_eq!(report.image_hashes, vec![image.hash.clone()]);

        assert!(matches!(
            service.record_mammography(&admin, &patient.id, req(7, vec![])),
            Err(CoreError::InvalidInput(_))
        ));
        assert!(matches!(
            service.record_mammography(&admin, &other.id, req(2, vec![image.hash.clone()])),
            Err(CoreError::InvalidInput(_))
        ));
        assert!(matches!(
            service.record_mammography(&admin, &patient.id, req(2, vec!["abc".into()])),
            Err(CoreError::InvalidInput(_))
        ));

        let counts = patient_counts(
            &storage,
            admin.clinic_id(),
            &ShardableUuid::parse(&patient.id).unwrap(),
        )
        .unwrap();
        assert_eq!(counts.mammography, 1);
        assert_eq!(counts.files, 1);
    }

    #[test]
    fn gp_records_derive_bmi() {
        let temp = TempDir::new().unwrap();
        let storage = test_storage(&temp);
        let admin = onboard_test_clinic(&storage, "hope-clinic");
        let service = ClinicalService::new(storage.clone());
        let patient = register(&storage, &admin, "Asha");

        let record = service
            .record_gp(
                &admin,
                &patient.id,
                RecordGpReq {
                    appointment_id: None,
                    vitals: VitalsDto {
                        weight_kg: Some(80.0),
                        height_cm: Some(160.0),
                        ..Default::default()
                    },
                    chief_complaint: "Headache for three days".into(),
                    history: None,
                    examination: None,
                    notes: None,
                },
            )
            .unwrap();
        assert_eq!(record.bmi, Some(31.3));
        assert_eq!(service.list_gp(&admin, &patient.id).unwrap(), vec![record]);
    }
}
