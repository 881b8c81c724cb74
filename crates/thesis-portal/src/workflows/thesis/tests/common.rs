use std::collections::HashMap;
use std::io::{Cursor, Write};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use axum::response::Response;
use serde_json::Value;
use zip::write::FileOptions;
use zip::ZipWriter;

use crate::identity::{
    AccountMetadata, AuthAccount, AuthBackend, AuthError, IdentityProvider, SessionContext,
};
use crate::records::{
    FileStorage, Filter, PortalRecords, RemoteStore, Row, StorageError, StoreError,
};
use crate::workflows::thesis::domain::{LecturerForm, PendingFile, User, UserRole};
use crate::workflows::thesis::router::portal_router;
use crate::workflows::thesis::service::ThesisPortalService;

pub(super) type TestService = ThesisPortalService<MemoryStore, MemoryFiles, MemoryAuth>;

#[derive(Default)]
pub(super) struct MemoryStore {
    pub(super) tables: Mutex<HashMap<String, Vec<Row>>>,
    sequence: AtomicU64,
    /// Table whose writes fail as if the store were unreachable.
    pub(super) read_only_table: Mutex<Option<String>>,
}

impl MemoryStore {
    fn check_writable(&self, table: &str) -> Result<(), StoreError> {
        let read_only = self.read_only_table.lock().expect("store mutex poisoned");
        if read_only.as_deref() == Some(table) {
            return Err(StoreError::Unavailable(format!("{table} is read-only")));
        }
        Ok(())
    }

    pub(super) fn rows(&self, table: &str) -> Vec<Row> {
        self.tables
            .lock()
            .expect("store mutex poisoned")
            .get(table)
            .cloned()
            .unwrap_or_default()
    }
}

impl RemoteStore for MemoryStore {
    fn select(&self, table: &str, filters: &[Filter]) -> Result<Vec<Row>, StoreError> {
        Ok(self
            .rows(table)
            .into_iter()
            .filter(|row| filters.iter().all(|filter| filter.matches(row)))
            .collect())
    }

    fn insert(&self, table: &str, mut row: Row) -> Result<Row, StoreError> {
        self.check_writable(table)?;
        let mut tables = self.tables.lock().expect("store mutex poisoned");
        let rows = tables.entry(table.to_string()).or_default();
        let id = match row.get("id").and_then(Value::as_str) {
            Some(id) => id.to_string(),
            None => {
                let next = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
                format!("{table}-{next}")
            }
        };
        if rows.iter().any(|existing| existing.get("id") == Some(&Value::from(id.as_str()))) {
            return Err(StoreError::Conflict {
                table: table.to_string(),
                id,
            });
        }
        row.insert("id".to_string(), Value::from(id));
        rows.push(row.clone());
        Ok(row)
    }

    fn update(&self, table: &str, id: &str, mut row: Row) -> Result<(), StoreError> {
        self.check_writable(table)?;
        let mut tables = self.tables.lock().expect("store mutex poisoned");
        let existing = tables
            .get_mut(table)
            .and_then(|rows| rows.iter_mut().find(|row| row.get("id") == Some(&Value::from(id))))
            .ok_or_else(|| StoreError::NotFound {
                table: table.to_string(),
                id: id.to_string(),
            })?;
        row.insert("id".to_string(), Value::from(id));
        *existing = row;
        Ok(())
    }

    fn delete(&self, table: &str, id: &str) -> Result<(), StoreError> {
        let mut tables = self.tables.lock().expect("store mutex poisoned");
        let rows = tables.entry(table.to_string()).or_default();
        let before = rows.len();
        rows.retain(|row| row.get("id") != Some(&Value::from(id)));
        if rows.len() == before {
            return Err(StoreError::NotFound {
                table: table.to_string(),
                id: id.to_string(),
            });
        }
        Ok(())
    }
}

pub(super) struct UnavailableStore;

impl RemoteStore for UnavailableStore {
    fn select(&self, _table: &str, _filters: &[Filter]) -> Result<Vec<Row>, StoreError> {
        Err(StoreError::Unavailable("connection refused".to_string()))
    }

    fn insert(&self, _table: &str, _row: Row) -> Result<Row, StoreError> {
        Err(StoreError::Unavailable("connection refused".to_string()))
    }

    fn update(&self, _table: &str, _id: &str, _row: Row) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("connection refused".to_string()))
    }

    fn delete(&self, _table: &str, _id: &str) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("connection refused".to_string()))
    }
}

#[derive(Default)]
pub(super) struct MemoryFiles {
    pub(super) failing: AtomicBool,
    pub(super) uploads: Mutex<Vec<String>>,
}

impl MemoryFiles {
    pub(super) fn paths(&self) -> Vec<String> {
        self.uploads.lock().expect("files mutex poisoned").clone()
    }
}

impl FileStorage for MemoryFiles {
    fn upload(&self, path: &str, _content: &[u8], _mime_type: &str) -> Result<String, StorageError> {
        if self.failing.load(Ordering::Relaxed) {
            return Err(StorageError::Unavailable("bucket offline".to_string()));
        }
        self.uploads
            .lock()
            .expect("files mutex poisoned")
            .push(path.to_string());
        Ok(format!("https://files.test/portal/{path}"))
    }
}

#[derive(Default)]
pub(super) struct MemoryAuth {
    pub(super) accounts: Mutex<Vec<AuthAccount>>,
}

impl AuthBackend for MemoryAuth {
    fn sign_in_with_password(&self, email: &str, _password: &str) -> Result<AuthAccount, AuthError> {
        self.accounts
            .lock()
            .expect("auth mutex poisoned")
            .iter()
            .find(|account| account.email.as_deref() == Some(email))
            .cloned()
            .ok_or(AuthError::InvalidCredentials)
    }

    fn sign_up(
        &self,
        email: &str,
        _password: &str,
        metadata: AccountMetadata,
    ) -> Result<AuthAccount, AuthError> {
        let mut accounts = self.accounts.lock().expect("auth mutex poisoned");
        let account = AuthAccount {
            id: format!("stu-{}", accounts.len() + 1),
            email: Some(email.to_string()),
            metadata,
        };
        accounts.push(account.clone());
        Ok(account)
    }

    fn oauth_authorize_url(&self, provider: &str, _redirect_to: &str) -> Result<String, AuthError> {
        Err(AuthError::UnsupportedProvider(provider.to_string()))
    }

    fn exchange_oauth_code(&self, provider: &str, _code: &str) -> Result<AuthAccount, AuthError> {
        Err(AuthError::UnsupportedProvider(provider.to_string()))
    }

    fn current_account(&self) -> Result<Option<AuthAccount>, AuthError> {
        Ok(None)
    }

    fn find_account(&self, user_id: &str) -> Result<Option<AuthAccount>, AuthError> {
        Ok(self
            .accounts
            .lock()
            .expect("auth mutex poisoned")
            .iter()
            .find(|account| account.id == user_id)
            .cloned())
    }

    fn sign_out(&self) -> Result<(), AuthError> {
        Ok(())
    }
}

pub(super) const STUDENT_EMAIL: &str = "ani@kampus.ac.id";
pub(super) const LECTURER_EMAIL: &str = "budi@kampus.ac.id";

pub(super) struct Harness {
    pub(super) service: Arc<TestService>,
    pub(super) store: Arc<MemoryStore>,
    pub(super) files: Arc<MemoryFiles>,
}

pub(super) fn build_service() -> Harness {
    let store = Arc::new(MemoryStore::default());
    let files = Arc::new(MemoryFiles::default());
    let auth = Arc::new(MemoryAuth::default());
    auth.accounts
        .lock()
        .expect("auth mutex poisoned")
        .extend([account(&student(), STUDENT_EMAIL), account(&lecturer(), LECTURER_EMAIL)]);

    let records = Arc::new(PortalRecords::new(store.clone(), files.clone()));
    let identity = Arc::new(IdentityProvider::new(auth, Arc::new(SessionContext::new())));
    Harness {
        service: Arc::new(ThesisPortalService::new(records, identity)),
        store,
        files,
    }
}

pub(super) fn unavailable_service() -> ThesisPortalService<UnavailableStore, MemoryFiles, MemoryAuth>
{
    let records = Arc::new(PortalRecords::new(
        Arc::new(UnavailableStore),
        Arc::new(MemoryFiles::default()),
    ));
    let identity = Arc::new(IdentityProvider::new(
        Arc::new(MemoryAuth::default()),
        Arc::new(SessionContext::new()),
    ));
    ThesisPortalService::new(records, identity)
}

pub(super) fn portal_router_with_service(service: Arc<TestService>) -> axum::Router {
    portal_router(service)
}

fn account(user: &User, email: &str) -> AuthAccount {
    AuthAccount {
        id: user.id.clone(),
        email: Some(email.to_string()),
        metadata: AccountMetadata {
            full_name: Some(user.name.clone()),
            role: Some(user.role),
            identifier: Some(user.identifier.clone()),
        },
    }
}

/// Make `email` the signed-in user of the harness session.
pub(super) fn sign_in(service: &TestService, email: &str) -> User {
    service
        .identity()
        .login_with_password(email, "rahasia")
        .expect("known test account")
}

pub(super) fn student() -> User {
    User {
        id: "stu-ani".to_string(),
        name: "Ani".to_string(),
        role: UserRole::Student,
        identifier: "2020123".to_string(),
    }
}

pub(super) fn lecturer() -> User {
    User {
        id: "lec-budi".to_string(),
        name: "Dr. Budi".to_string(),
        role: UserRole::Lecturer,
        identifier: "1987".to_string(),
    }
}

pub(super) fn pdf(name: &str) -> PendingFile {
    PendingFile {
        name: name.to_string(),
        mime_type: "application/pdf".to_string(),
        content: b"%PDF-1.4".to_vec(),
    }
}

pub(super) fn lecturer_form(name: &str, nip: &str) -> LecturerForm {
    LecturerForm {
        name: name.to_string(),
        nip: nip.to_string(),
        specialization: "Rekayasa Perangkat Lunak".to_string(),
    }
}

/// Minimal `.docx` with the invitation placeholders split across runs.
pub(super) fn letter_template() -> Vec<u8> {
    let document = concat!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
        r#"<w:document><w:body>"#,
        r#"<w:p><w:r><w:t>No: {no_</w:t></w:r><w:r><w:t>surat}</w:t></w:r></w:p>"#,
        r#"<w:p><w:r><w:t>{nama} / {nim}</w:t></w:r></w:p>"#,
        r#"<w:p><w:r><w:t>{judul}</w:t></w:r></w:p>"#,
        r#"<w:p><w:r><w:t>{hari}, {tgl} {waktu} {ruang}</w:t></w:r></w:p>"#,
        r#"<w:p><w:r><w:t>{dosen1}|{dosen2}|{dosen3}|{dosen4}</w:t></w:r></w:p>"#,
        r#"</w:body></w:document>"#,
    );

    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    writer
        .start_file("[Content_Types].xml", FileOptions::default())
        .expect("start entry");
    writer.write_all(b"<Types/>").expect("write entry");
    writer
        .start_file("word/document.xml", FileOptions::default())
        .expect("start entry");
    writer.write_all(document.as_bytes()).expect("write entry");
    writer.finish().expect("finish archive").into_inner()
}

pub(super) fn document_xml(docx: &[u8]) -> String {
    use std::io::Read;

    let mut archive = zip::ZipArchive::new(Cursor::new(docx)).expect("archive");
    let mut entry = archive.by_name("word/document.xml").expect("document entry");
    let mut xml = String::new();
    entry.read_to_string(&mut xml).expect("utf8 document");
    xml
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
