//! Patient file uploads stored beside the clinical repository.
//!
//! Content lives under the repository's ignored `files/` folder, so uploads never enter Git
//! history; mammography reports reference them by hash instead.

use crate::auth::Principal;
use crate::repositories::clinical::{clinical_root, ensure_repo};
use crate::repositories::helpers::parse_id;
use crate::repositories::patients::load_patient;
use crate::store::Storage;
use crate::{CoreError, CoreResult};
use api_shared::{FileView, Permission};
use camp_files::{FileMetadata, FilesError, FilesService};
use camp_uuid::{Sha256Hash, ShardableUuid};

fn file_view(m: &FileMetadata) -> FileView {
    FileView {
        hash: m.hash.to_string(),
        size_bytes: m.size_bytes,
        media_type: m.media_type.as_ref().map(ToString::to_string),
        original_filename: m.original_filename.to_string(),
        uploaded_by: m.uploaded_by.to_string(),
        stored_at: m.stored_at,
    }
}

#[derive(Clone, Debug)]
pub struct UploadService {
    storage: Storage,
}

impl UploadService {
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }

    fn patient_id(&self, principal: &Principal, raw: &str) -> CoreResult<ShardableUuid> {
        let id = parse_id("patient", raw)?;
        load_patient(&self.storage.tenant(principal.clinic_id()), &id)?;
        Ok(id)
    }

    /// `None` when the patient has no clinical repository yet, and therefore no uploads.
    fn files(&self, principal: &Principal, patient_id: &ShardableUuid) -> CoreResult<Option<FilesService>> {
        match FilesService::new(&clinical_root(&self.storage, principal.clinic_id()), patient_id) {
            Ok(files) => Ok(Some(files)),
            Err(FilesError::InvalidRootDirectory(_)) | Err(FilesError::RepositoryNotFound(_)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Stores an upload for the patient.
    ///
    /// # Errors
    ///
    /// - [`CoreError::PayloadTooLarge`] above the configured upload limit
    /// - [`CoreError::Conflict`] if identical content is already stored for the patient
    /// - [`CoreError::InvalidInput`] for empty content or an unusable filename
    pub fn upload(
        &self,
        principal: &Principal,
        patient_id: &str,
        filename: &str,
        bytes: &[u8],
    ) -> CoreResult<FileView> {
        principal.require(Permission::UploadFiles)?;
        let limit = self.storage.cfg().max_upload_bytes();
        if bytes.len() > limit {
            return Err(CoreError::PayloadTooLarge {
                size: bytes.len(),
                limit,
            });
        }
        let patient_id = self.patient_id(principal, patient_id)?;

        let store = self.storage.tenant(principal.clinic_id());
        let _lock = store.lock();
        ensure_repo(&self.storage, principal, &patient_id)?;
        let files = FilesService::new(&clinical_root(&self.storage, principal.clinic_id()), &patient_id)?;
        let metadata = files.add(filename, bytes, &principal.user.name)?;

        tracing::info!(
            patient = %patient_id,
            hash = %metadata.hash,
            size = metadata.size_bytes,
            "file uploaded"
        );
        Ok(file_view(&metadata))
    }

    /// Upload metadata, newest first.
    pub fn list(&self, principal: &Principal, patient_id: &str) -> CoreResult<Vec<FileView>> {
        principal.require(Permission::ViewClinicalRecords)?;
        let patient_id = self.patient_id(principal, patient_id)?;
        let Some(files) = self.files(principal, &patient_id)? else {
            return Ok(Vec::new());
        };
        let mut listed = files.list()?;
        listed.sort_by(|a, b| b.stored_at.cmp(&a.stored_at));
        Ok(listed.iter().map(file_view).collect())
    }

    /// Metadata and content of one upload.
    pub fn download(
        &self,
        principal: &Principal,
        patient_id: &str,
        hash: &str,
    ) -> CoreResult<(FileView, Vec<u8>)> {
        principal.require(Permission::ViewClinicalRecords)?;
        let patient_id = self.patient_id(principal, patient_id)?;
        let hash = Sha256Hash::parse(hash.trim())
            .map_err(|_| CoreError::invalid(format!("invalid file hash '{}'", hash)))?;
        let files = self
            .files(principal, &patient_id)?
            .ok_or_else(|| CoreError::not_found(format!("file {}", hash)))?;

        let metadata = files.metadata(&hash)?;
        let bytes = files.read(&hash)?;
        Ok((file_view(&metadata), bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::clinics::tests::onboard_test_clinic;
    use crate::repositories::patients::tests::register;
    use crate::repositories::staff::tests::add_staff;
    use crate::store::tests::test_storage;
    use tempfile::TempDir;

    const PNG: &[u8] = b"\x89PNG\r\n\x1a\n\x00\x00\x00\rIHDR";

    #[test]
    fn upload_list_and_download() {
        let temp = TempDir::new().unwrap();
        let storage = test_storage(&temp);
        let admin = onboard_test_clinic(&storage, "hope-clinic");
        let service = UploadService::new(storage.clone());
        let patient = register(&storage, &admin, "Asha");

        assert!(service.list(&admin, &patient.id).unwrap().is_empty());

        let stored = service.upload(&admin, &patient.id, "scans/left-cc.png", PNG).unwrap();
        assert_eq!(stored.original_filename, "left-cc.png");
        assert_eq!(stored.media_type.as_deref(), Some("image/png"));
        assert_eq!(stored.size_bytes, PNG.len() as u64);

        let (view, bytes) = service.download(&admin, &patient.id, &stored.hash).unwrap();
        assert_eq!(view, stored);
        assert_eq!(bytes, PNG);
        assert_eq!(service.list(&admin, &patient.id).unwrap(), vec![stored.clone()]);

        assert!(matches!(
            service.upload(&admin, &patient.id, "again.png", PNG),
            Err(CoreError::Conflict(_))
        ));
        assert!(matches!(
            service.download(&admin, &patient.id, &"0".repeat(64)),
            Err(CoreError::NotFound(_))
        ));
    }

    #[test]
    fn size_limit_and_permissions_apply() {
        let temp = TempDir::new().unwrap();
        let storage = test_storage(&temp);
        let admin = onboard_test_clinic(&storage, "hope-clinic");
        let reception = add_staff(&storage, &admin, "receptionist", "desk@hope.example");
        let service = UploadService::new(storage.clone());
        let patient = register(&storage, &admin, "Asha");

        let limit = storage.cfg().max_upload_bytes();
        let too_big = vec![1u8; limit + 1];
        assert!(matches!(
            service.upload(&admin, &patient.id, "big.bin", &too_big),
            Err(CoreError::PayloadTooLarge { .. })
        ));
        assert!(matches!(
            service.upload(&admin, &patient.id, "empty.bin", b""),
            Err(CoreError::InvalidInput(_))
        ));
        assert!(matches!(
            service.upload(&reception, &patient.id, "a.png", PNG),
            Err(CoreError::Forbidden(_))
        ));
    }
}
