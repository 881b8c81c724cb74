use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use super::schema::{self, EntitySchema, MappingError};
use super::store::{FileStorage, Filter, RemoteStore, StoreError};
use crate::workflows::thesis::domain::{
    DocumentTemplate, FileRef, InternshipRegistration, Lecturer, Notification, PendingFile,
    RecordId, RequirementKind, SeminarRegistration, ThesisDefense, ThesisRegistration,
};

static UPLOAD_SEQUENCE: AtomicU64 = AtomicU64::new(1);

/// Entities persisted through the facade.
pub trait StoredEntity: Serialize + DeserializeOwned + Clone {
    fn schema() -> &'static EntitySchema;
    fn record_id(&self) -> &RecordId;

    /// Storage folder for this entity's uploads.
    fn upload_folder(&self) -> &'static str {
        "documents"
    }

    fn file_slots(&mut self) -> Vec<(&'static str, &mut Option<FileRef>)> {
        Vec::new()
    }
}

/// An upload that failed; the previously stored reference was kept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadFailure {
    pub field: &'static str,
    pub file_name: String,
}

#[derive(Debug, thiserror::Error)]
pub enum RecordsError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Mapping(#[from] MappingError),
    #[error("{table}: record {id} has not been saved yet")]
    NotStored { table: &'static str, id: String },
}

/// Data access facade over the remote store and file storage.
pub struct PortalRecords<S, F> {
    store: Arc<S>,
    files: Arc<F>,
    template: RwLock<DocumentTemplate>,
    requirements: RwLock<BTreeMap<RequirementKind, String>>,
}

impl<S, F> PortalRecords<S, F>
where
    S: RemoteStore + 'static,
    F: FileStorage + 'static,
{
    pub fn new(store: Arc<S>, files: Arc<F>) -> Self {
        let requirements = RequirementKind::ordered()
            .into_iter()
            .map(|kind| (kind, kind.default_text().to_string()))
            .collect();

        Self {
            store,
            files,
            template: RwLock::new(DocumentTemplate::default()),
            requirements: RwLock::new(requirements),
        }
    }

    /// List records matching filters expressed with application field names.
    pub fn list<T: StoredEntity>(&self, filters: &[Filter]) -> Result<Vec<T>, RecordsError> {
        let schema = T::schema();
        let store_filters = filters
            .iter()
            .map(|filter| schema.store_filter(filter))
            .collect::<Result<Vec<_>, _>>()?;

        let rows = self.store.select(schema.table, &store_filters)?;
        rows.into_iter()
            .map(|row| schema.from_row(row).map_err(RecordsError::from))
            .collect()
    }

    pub fn find<T: StoredEntity>(&self, id: &str) -> Result<Option<T>, RecordsError> {
        let mut found = self.list::<T>(&[Filter::eq("id", id)])?;
        Ok(if found.is_empty() {
            None
        } else {
            Some(found.swap_remove(0))
        })
    }

    /// Upsert: local ids are inserted and receive a durable id, stored ids are updated in place.
    pub fn save<T: StoredEntity>(&self, entity: T) -> Result<T, RecordsError> {
        self.save_with_uploads(entity).map(|(saved, _)| saved)
    }

    /// Like [`save`](Self::save), also reporting uploads that fell back to the previous file.
    pub fn save_with_uploads<T: StoredEntity>(
        &self,
        mut entity: T,
    ) -> Result<(T, Vec<UploadFailure>), RecordsError> {
        let failures = self.upload_pending(&mut entity)?;
        let saved = self.persist(entity)?;
        Ok((saved, failures))
    }

    fn persist<T: StoredEntity>(&self, entity: T) -> Result<T, RecordsError> {
        let schema = T::schema();
        let row = schema.to_row(&entity)?;

        match entity.record_id().clone() {
            RecordId::Local(local) => {
                let inserted = self.store.insert(schema.table, row)?;
                let saved: T = schema.from_row(inserted)?;
                debug!(table = schema.table, %local, id = %saved.record_id(), "inserted record");
                Ok(saved)
            }
            RecordId::Stored(id) => {
                match self.store.update(schema.table, &id, row.clone()) {
                    Ok(()) => {}
                    Err(StoreError::NotFound { .. }) => {
                        self.store.insert(schema.table, row)?;
                    }
                    Err(err) => return Err(err.into()),
                }
                debug!(table = schema.table, %id, "updated record");
                Ok(entity)
            }
        }
    }

    pub fn delete<T: StoredEntity>(&self, id: &RecordId) -> Result<(), RecordsError> {
        let table = T::schema().table;
        match id {
            RecordId::Stored(id) => Ok(self.store.delete(table, id)?),
            RecordId::Local(id) => Err(RecordsError::NotStored {
                table,
                id: id.clone(),
            }),
        }
    }

    /// Upload a file to `folder`, returning its public URL.
    ///
    /// Failures are logged and reported as `None`; callers keep their previous reference.
    pub fn upload_file(&self, file: &PendingFile, folder: &str) -> Option<String> {
        let sequence = UPLOAD_SEQUENCE.fetch_add(1, Ordering::Relaxed);
        let stem = format!("{}-{sequence}", Utc::now().timestamp_millis());
        let path = match file.extension() {
            Some(ext) => format!("{folder}/{stem}.{ext}"),
            None => format!("{folder}/{stem}"),
        };

        match self.files.upload(&path, &file.content, &file.mime_type) {
            Ok(url) => Some(url),
            Err(err) => {
                warn!(%path, file = %file.name, error = %err, "file upload failed");
                None
            }
        }
    }

    /// Upload every pending file on `entity`.
    ///
    /// A failed slot falls back to whatever reference the stored record holds.
    pub fn upload_pending<T: StoredEntity>(
        &self,
        entity: &mut T,
    ) -> Result<Vec<UploadFailure>, RecordsError> {
        let folder = entity.upload_folder();
        let mut failures = Vec::new();

        for (field, slot) in entity.file_slots() {
            let Some(FileRef::Pending(file)) = slot.as_ref() else {
                continue;
            };
            match self.upload_file(file, folder) {
                Some(url) => *slot = Some(FileRef::Uploaded(url)),
                None => failures.push(UploadFailure {
                    field,
                    file_name: file.name.clone(),
                }),
            }
        }

        if failures.is_empty() {
            return Ok(failures);
        }

        let mut previous = match entity.record_id() {
            RecordId::Stored(id) => self.find::<T>(id)?,
            RecordId::Local(_) => None,
        };
        let previous_refs: BTreeMap<&'static str, Option<FileRef>> = match previous.as_mut() {
            Some(stored) => stored
                .file_slots()
                .into_iter()
                .map(|(field, slot)| (field, slot.clone()))
                .collect(),
            None => BTreeMap::new(),
        };

        for (field, slot) in entity.file_slots() {
            if failures.iter().any(|failure| failure.field == field) {
                *slot = previous_refs.get(field).cloned().flatten();
            }
        }

        Ok(failures)
    }

    pub fn template(&self) -> DocumentTemplate {
        self.template
            .read()
            .expect("template lock poisoned")
            .clone()
    }

    /// Replace the master template wholesale.
    pub fn replace_template(&self, name: &str, content: Vec<u8>) -> DocumentTemplate {
        let mut guard = self.template.write().expect("template lock poisoned");
        *guard = DocumentTemplate {
            name: name.to_string(),
            content: Some(content),
            last_modified: Some(Utc::now()),
        };
        guard.clone()
    }

    pub fn requirement(&self, kind: RequirementKind) -> String {
        self.requirements
            .read()
            .expect("requirements lock poisoned")
            .get(&kind)
            .cloned()
            .unwrap_or_else(|| "-".to_string())
    }

    pub fn save_requirement(&self, kind: RequirementKind, text: &str) {
        self.requirements
            .write()
            .expect("requirements lock poisoned")
            .insert(kind, text.to_string());
    }
}

impl StoredEntity for ThesisRegistration {
    fn schema() -> &'static EntitySchema {
        &schema::THESIS_REGISTRATIONS
    }

    fn record_id(&self) -> &RecordId {
        &self.id
    }
}

impl StoredEntity for SeminarRegistration {
    fn schema() -> &'static EntitySchema {
        &schema::SEMINARS
    }

    fn record_id(&self) -> &RecordId {
        &self.id
    }

    fn upload_folder(&self) -> &'static str {
        "seminars"
    }

    fn file_slots(&mut self) -> Vec<(&'static str, &mut Option<FileRef>)> {
        vec![("report", &mut self.report)]
    }
}

impl StoredEntity for ThesisDefense {
    fn schema() -> &'static EntitySchema {
        &schema::THESIS_DEFENSES
    }

    fn record_id(&self) -> &RecordId {
        &self.id
    }

    fn upload_folder(&self) -> &'static str {
        "defenses"
    }

    fn file_slots(&mut self) -> Vec<(&'static str, &mut Option<FileRef>)> {
        vec![
            ("fixedManuscript", &mut self.fixed_manuscript),
            ("plagiarismCheck", &mut self.plagiarism_check),
            ("transcript", &mut self.transcript),
        ]
    }
}

impl StoredEntity for InternshipRegistration {
    fn schema() -> &'static EntitySchema {
        &schema::INTERNSHIPS
    }

    fn record_id(&self) -> &RecordId {
        &self.id
    }
}

impl StoredEntity for Lecturer {
    fn schema() -> &'static EntitySchema {
        &schema::LECTURERS
    }

    fn record_id(&self) -> &RecordId {
        &self.id
    }
}

impl StoredEntity for Notification {
    fn schema() -> &'static EntitySchema {
        &schema::NOTIFICATIONS
    }

    fn record_id(&self) -> &RecordId {
        &self.id
    }
}
