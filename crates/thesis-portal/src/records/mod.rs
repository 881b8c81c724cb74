pub mod facade;
pub mod schema;
pub mod store;

pub use facade::{PortalRecords, RecordsError, StoredEntity, UploadFailure};
pub use schema::{EntitySchema, FieldMapping, FieldTransform, MappingError};
pub use store::{FileStorage, Filter, RemoteStore, Row, StorageError, StoreError};
