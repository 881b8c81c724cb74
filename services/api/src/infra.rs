use chrono::NaiveDate;
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use thesis_portal::config::StorageConfig;
use thesis_portal::identity::{AccountMetadata, AuthAccount, AuthBackend, AuthError};
use thesis_portal::identity::{IdentityProvider, SessionContext};
use thesis_portal::records::{
    FileStorage, Filter, PortalRecords, RemoteStore, Row, StorageError, StoreError,
};
use thesis_portal::workflows::thesis::ThesisPortalService;

pub type PortalService =
    ThesisPortalService<InMemoryRemoteStore, InMemoryFileStorage, InMemoryAuthBackend>;

/// Portal service wired to the in-memory backends, plus handles the hosts need.
pub struct LocalPortal {
    pub service: Arc<PortalService>,
    pub auth: Arc<InMemoryAuthBackend>,
    pub files: Arc<InMemoryFileStorage>,
}

pub fn local_portal(storage: StorageConfig) -> LocalPortal {
    let files = Arc::new(InMemoryFileStorage::new(storage));
    let auth = Arc::new(InMemoryAuthBackend::default());
    let records = Arc::new(PortalRecords::new(
        Arc::new(InMemoryRemoteStore::default()),
        files.clone(),
    ));
    let identity = Arc::new(IdentityProvider::new(
        auth.clone(),
        Arc::new(SessionContext::new()),
    ));
    LocalPortal {
        service: Arc::new(ThesisPortalService::new(records, identity)),
        auth,
        files,
    }
}

#[derive(Clone)]
pub struct AppState {
    pub readiness: Arc<AtomicBool>,
    pub metrics: Arc<PrometheusHandle>,
}

fn row_id(row: &Row) -> Option<&str> {
    row.get("id").and_then(Value::as_str)
}

/// Process-local stand-in for the hosted tables.
#[derive(Default)]
pub struct InMemoryRemoteStore {
    tables: Mutex<HashMap<String, Vec<Row>>>,
    sequence: AtomicU64,
}

impl RemoteStore for InMemoryRemoteStore {
    fn select(&self, table: &str, filters: &[Filter]) -> Result<Vec<Row>, StoreError> {
        let guard = self.tables.lock().expect("store mutex poisoned");
        Ok(guard
            .get(table)
            .map(|rows| {
                rows.iter()
                    .filter(|row| filters.iter().all(|filter| filter.matches(row)))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn insert(&self, table: &str, mut row: Row) -> Result<Row, StoreError> {
        let mut guard = self.tables.lock().expect("store mutex poisoned");
        let rows = guard.entry(table.to_string()).or_default();
        let id = match row_id(&row) {
            Some(id) => id.to_string(),
            None => format!("{}", self.sequence.fetch_add(1, Ordering::Relaxed) + 1),
        };
        if rows.iter().any(|existing| row_id(existing) == Some(id.as_str())) {
            return Err(StoreError::Conflict {
                table: table.to_string(),
                id,
            });
        }
        row.insert("id".to_string(), Value::String(id));
        rows.push(row.clone());
        Ok(row)
    }

    fn update(&self, table: &str, id: &str, mut row: Row) -> Result<(), StoreError> {
        let mut guard = self.tables.lock().expect("store mutex poisoned");
        let slot = guard
            .get_mut(table)
            .and_then(|rows| rows.iter_mut().find(|existing| row_id(existing) == Some(id)))
            .ok_or_else(|| StoreError::NotFound {
                table: table.to_string(),
                id: id.to_string(),
            })?;
        row.insert("id".to_string(), Value::String(id.to_string()));
        *slot = row;
        Ok(())
    }

    fn delete(&self, table: &str, id: &str) -> Result<(), StoreError> {
        let mut guard = self.tables.lock().expect("store mutex poisoned");
        let rows = guard.get_mut(table).ok_or_else(|| StoreError::NotFound {
            table: table.to_string(),
            id: id.to_string(),
        })?;
        let before = rows.len();
        rows.retain(|existing| row_id(existing) != Some(id));
        if rows.len() == before {
            return Err(StoreError::NotFound {
                table: table.to_string(),
                id: id.to_string(),
            });
        }
        Ok(())
    }
}

/// Keeps uploaded bytes in memory and hands out bucket URLs.
pub struct InMemoryFileStorage {
    config: StorageConfig,
    objects: Mutex<BTreeMap<String, (String, Vec<u8>)>>,
}

impl InMemoryFileStorage {
    pub fn new(config: StorageConfig) -> Self {
        Self {
            config,
            objects: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn paths(&self) -> Vec<String> {
        self.objects
            .lock()
            .expect("storage mutex poisoned")
            .keys()
            .cloned()
            .collect()
    }
}

impl FileStorage for InMemoryFileStorage {
    fn upload(&self, path: &str, content: &[u8], mime_type: &str) -> Result<String, StorageError> {
        if content.is_empty() {
            return Err(StorageError::Rejected(format!("{path} is empty")));
        }
        self.objects
            .lock()
            .expect("storage mutex poisoned")
            .insert(path.to_string(), (mime_type.to_string(), content.to_vec()));
        Ok(self.config.public_url(path))
    }
}

struct StoredAccount {
    account: AuthAccount,
    password: String,
}

/// Password and OAuth accounts for local runs. OAuth codes are issued by
/// [`InMemoryAuthBackend::issue_oauth_code`].
#[derive(Default)]
pub struct InMemoryAuthBackend {
    accounts: Mutex<Vec<StoredAccount>>,
    oauth_codes: Mutex<HashMap<String, AuthAccount>>,
    current: Mutex<Option<String>>,
    sequence: AtomicU64,
}

const OAUTH_PROVIDERS: &[&str] = &["google"];

impl InMemoryAuthBackend {
    fn next_id(&self) -> String {
        format!("usr-{:04}", self.sequence.fetch_add(1, Ordering::Relaxed) + 1)
    }

    fn set_current(&self, id: Option<String>) {
        *self.current.lock().expect("auth mutex poisoned") = id;
    }

    /// Simulate the provider redirect: returns the code the portal exchanges for a session.
    pub fn issue_oauth_code(&self, email: &str, metadata: AccountMetadata) -> String {
        let account = AuthAccount {
            id: self.next_id(),
            email: Some(email.to_string()),
            metadata,
        };
        let code = format!("code-{}", account.id);
        self.oauth_codes
            .lock()
            .expect("auth mutex poisoned")
            .insert(code.clone(), account);
        code
    }
}

impl AuthBackend for InMemoryAuthBackend {
    fn sign_in_with_password(&self, email: &str, password: &str) -> Result<AuthAccount, AuthError> {
        let account = self
            .accounts
            .lock()
            .expect("auth mutex poisoned")
            .iter()
            .find(|stored| {
                stored
                    .account
                    .email
                    .as_deref()
                    .is_some_and(|known| known.eq_ignore_ascii_case(email))
                    && stored.password == password
            })
            .map(|stored| stored.account.clone())
            .ok_or(AuthError::InvalidCredentials)?;
        self.set_current(Some(account.id.clone()));
        Ok(account)
    }

    fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: AccountMetadata,
    ) -> Result<AuthAccount, AuthError> {
        if password.len() < 6 {
            return Err(AuthError::InvalidInput(
                "Password minimal 6 karakter.".to_string(),
            ));
        }
        let mut accounts = self.accounts.lock().expect("auth mutex poisoned");
        let taken = accounts.iter().any(|stored| {
            stored
                .account
                .email
                .as_deref()
                .is_some_and(|known| known.eq_ignore_ascii_case(email))
        });
        if taken {
            return Err(AuthError::AlreadyRegistered(email.to_string()));
        }

        let account = AuthAccount {
            id: self.next_id(),
            email: Some(email.to_string()),
            metadata,
        };
        accounts.push(StoredAccount {
            account: account.clone(),
            password: password.to_string(),
        });
        drop(accounts);
        self.set_current(Some(account.id.clone()));
        Ok(account)
    }

    fn oauth_authorize_url(&self, provider: &str, redirect_to: &str) -> Result<String, AuthError> {
        if !OAUTH_PROVIDERS.contains(&provider) {
            return Err(AuthError::UnsupportedProvider(provider.to_string()));
        }
        Ok(format!(
            "http://localhost/auth/v1/authorize?provider={provider}&redirect_to={redirect_to}"
        ))
    }

    fn exchange_oauth_code(&self, provider: &str, code: &str) -> Result<AuthAccount, AuthError> {
        if !OAUTH_PROVIDERS.contains(&provider) {
            return Err(AuthError::UnsupportedProvider(provider.to_string()));
        }
        let account = self
            .oauth_codes
            .lock()
            .expect("auth mutex poisoned")
            .remove(code)
            .ok_or(AuthError::InvalidCredentials)?;
        self.accounts
            .lock()
            .expect("auth mutex poisoned")
            .push(StoredAccount {
                account: account.clone(),
                password: String::new(),
            });
        self.set_current(Some(account.id.clone()));
        Ok(account)
    }

    fn current_account(&self) -> Result<Option<AuthAccount>, AuthError> {
        let current = self.current.lock().expect("auth mutex poisoned").clone();
        match current {
            Some(id) => self.find_account(&id),
            None => Ok(None),
        }
    }

    fn find_account(&self, user_id: &str) -> Result<Option<AuthAccount>, AuthError> {
        Ok(self
            .accounts
            .lock()
            .expect("auth mutex poisoned")
            .iter()
            .find(|stored| stored.account.id == user_id)
            .map(|stored| stored.account.clone()))
    }

    fn sign_out(&self) -> Result<(), AuthError> {
        self.set_current(None);
        Ok(())
    }
}

pub(crate) fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|err| format!("failed to parse '{raw}' as YYYY-MM-DD ({err})"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: Value) -> Row {
        value.as_object().cloned().expect("object row")
    }

    #[test]
    fn store_assigns_ids_and_rejects_unknown_updates() {
        let store = InMemoryRemoteStore::default();
        let inserted = store
            .insert("lecturers", row(json!({"name": "Budi"})))
            .expect("inserted");
        assert_eq!(inserted["id"], "1");

        let filtered = store
            .select("lecturers", &[Filter::eq("name", "Budi")])
            .expect("selected");
        assert_eq!(filtered.len(), 1);

        assert!(matches!(
            store.update("lecturers", "99", row(json!({"name": "X"}))),
            Err(StoreError::NotFound { .. })
        ));
        assert!(matches!(
            store.insert("lecturers", row(json!({"id": "1"}))),
            Err(StoreError::Conflict { .. })
        ));
    }

    #[test]
    fn password_accounts_must_be_unique() {
        let auth = InMemoryAuthBackend::default();
        auth.sign_up("ani@kampus.ac.id", "rahasia", AccountMetadata::default())
            .expect("registered");

        assert_eq!(
            auth.sign_up("ANI@kampus.ac.id", "rahasia", AccountMetadata::default()),
            Err(AuthError::AlreadyRegistered("ANI@kampus.ac.id".to_string()))
        );
        assert_eq!(
            auth.sign_in_with_password("ani@kampus.ac.id", "salah"),
            Err(AuthError::InvalidCredentials)
        );
    }

    #[test]
    fn oauth_codes_are_single_use() {
        let auth = InMemoryAuthBackend::default();
        let code = auth.issue_oauth_code("dosen@kampus.ac.id", AccountMetadata::default());

        let account = auth.exchange_oauth_code("google", &code).expect("exchanged");
        assert_eq!(
            auth.current_account().expect("session"),
            Some(account.clone())
        );
        assert_eq!(
            auth.exchange_oauth_code("google", &code),
            Err(AuthError::InvalidCredentials)
        );
        assert!(matches!(
            auth.oauth_authorize_url("github", "/"),
            Err(AuthError::UnsupportedProvider(_))
        ));
    }
}
