//! Declarative mapping between application entities and store rows.
//!
//! Entities serialize to camelCase JSON objects; each [`EntitySchema`] lists the
//! `(app field, store column, transform)` triples used to translate them. The
//! table is total: serializing a field the schema does not list is an error.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Map, Value};

use super::store::{Filter, Row};

/// How a value changes shape between the application and the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldTransform {
    Identity,
    /// `{"stored": id}` ↔ `"id"`; local placeholder ids are omitted so the store assigns one.
    RecordKey,
    /// `{"uploaded": url}` ↔ `"url"`; pending files must be uploaded first.
    FileUrl,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldMapping {
    pub app: &'static str,
    pub store: &'static str,
    pub transform: FieldTransform,
}

const fn field(app: &'static str, store: &'static str) -> FieldMapping {
    FieldMapping {
        app,
        store,
        transform: FieldTransform::Identity,
    }
}

const fn key() -> FieldMapping {
    FieldMapping {
        app: "id",
        store: "id",
        transform: FieldTransform::RecordKey,
    }
}

const fn file(app: &'static str, store: &'static str) -> FieldMapping {
    FieldMapping {
        app,
        store,
        transform: FieldTransform::FileUrl,
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MappingError {
    #[error("{table}: field `{field}` has no store mapping")]
    UnmappedField { table: &'static str, field: String },
    #[error("{table}: file `{field}` has not been uploaded")]
    PendingFile { table: &'static str, field: &'static str },
    #[error("{table}: column `{column}` holds an unexpected value")]
    InvalidValue { table: &'static str, column: &'static str },
    #[error("{table}: row has no id")]
    MissingKey { table: &'static str },
    #[error("{table}: entity must serialize to an object")]
    NotAnObject { table: &'static str },
    #[error("{table}: {source}")]
    Serde {
        table: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug)]
pub struct EntitySchema {
    pub table: &'static str,
    pub fields: &'static [FieldMapping],
}

impl EntitySchema {
    pub fn store_column(&self, app_field: &str) -> Option<&'static str> {
        self.fields
            .iter()
            .find(|mapping| mapping.app == app_field)
            .map(|mapping| mapping.store)
    }

    /// Translate a filter expressed with application field names.
    pub fn store_filter(&self, filter: &Filter) -> Result<Filter, MappingError> {
        let column =
            self.store_column(&filter.field)
                .ok_or_else(|| MappingError::UnmappedField {
                    table: self.table,
                    field: filter.field.clone(),
                })?;
        Ok(Filter::eq(column, filter.value.clone()))
    }

    pub fn to_row<T: Serialize>(&self, entity: &T) -> Result<Row, MappingError> {
        let value = serde_json::to_value(entity).map_err(|source| MappingError::Serde {
            table: self.table,
            source,
        })?;
        let Value::Object(mut object) = value else {
            return Err(MappingError::NotAnObject { table: self.table });
        };

        let mut row = Row::new();
        for mapping in self.fields {
            let value = object.remove(mapping.app).unwrap_or(Value::Null);
            match mapping.transform {
                FieldTransform::Identity => {
                    row.insert(mapping.store.to_string(), value);
                }
                FieldTransform::RecordKey => {
                    if let Some(id) = value.get("stored").and_then(Value::as_str) {
                        row.insert(mapping.store.to_string(), Value::String(id.to_string()));
                    }
                }
                FieldTransform::FileUrl => {
                    let url = match &value {
                        Value::Null => Value::Null,
                        Value::Object(tagged) if tagged.contains_key("uploaded") => {
                            tagged["uploaded"].clone()
                        }
                        _ => {
                            return Err(MappingError::PendingFile {
                                table: self.table,
                                field: mapping.app,
                            })
                        }
                    };
                    row.insert(mapping.store.to_string(), url);
                }
            }
        }

        if let Some(field) = object.keys().next() {
            return Err(MappingError::UnmappedField {
                table: self.table,
                field: field.clone(),
            });
        }

        Ok(row)
    }

    pub fn from_row<T: DeserializeOwned>(&self, mut row: Row) -> Result<T, MappingError> {
        let mut object = Map::new();
        for mapping in self.fields {
            let Some(value) = row.remove(mapping.store) else {
                if mapping.transform == FieldTransform::RecordKey {
                    return Err(MappingError::MissingKey { table: self.table });
                }
                continue;
            };
            let translated = match mapping.transform {
                FieldTransform::Identity => value,
                FieldTransform::RecordKey => match value {
                    Value::String(id) => json!({ "stored": id }),
                    Value::Number(id) => json!({ "stored": id.to_string() }),
                    _ => return Err(MappingError::MissingKey { table: self.table }),
                },
                FieldTransform::FileUrl => match value {
                    Value::Null => Value::Null,
                    Value::String(url) if url.is_empty() => Value::Null,
                    Value::String(url) => json!({ "uploaded": url }),
                    _ => {
                        return Err(MappingError::InvalidValue {
                            table: self.table,
                            column: mapping.store,
                        })
                    }
                },
            };
            object.insert(mapping.app.to_string(), translated);
        }

        serde_json::from_value(Value::Object(object)).map_err(|source| MappingError::Serde {
            table: self.table,
            source,
        })
    }
}

pub static THESIS_REGISTRATIONS: EntitySchema = EntitySchema {
    table: "thesis_registrations",
    fields: &[
        key(),
        field("studentId", "student_id"),
        field("studentName", "student_name"),
        field("title", "title"),
        field("advisor1Id", "advisor1_id"),
        field("advisor2Id", "advisor2_id"),
        field("status", "status"),
    ],
};

pub static SEMINARS: EntitySchema = EntitySchema {
    table: "seminars",
    fields: &[
        key(),
        field("type", "type"),
        field("studentId", "student_id"),
        field("studentName", "student_name"),
        field("title", "title"),
        file("report", "file_report_url"),
        field("advisor1Id", "advisor1_id"),
        field("advisor2Id", "advisor2_id"),
        field("scheduledDate", "scheduled_date"),
        field("scheduledTime", "scheduled_time"),
        field("scheduledRoom", "scheduled_room"),
        field("examiner1Id", "examiner1_id"),
        field("examiner2Id", "examiner2_id"),
        field("status", "status"),
    ],
};

pub static THESIS_DEFENSES: EntitySchema = EntitySchema {
    table: "thesis_defenses",
    fields: &[
        key(),
        field("thesisId", "thesis_id"),
        field("studentId", "student_id"),
        field("studentName", "student_name"),
        file("fixedManuscript", "file_fixed_url"),
        file("plagiarismCheck", "file_plagiarism_url"),
        file("transcript", "file_transcript_url"),
        field("sksCount", "sks_count"),
        field("adminRequirementsMet", "admin_requirements_met"),
        field("examiner1Id", "examiner1_id"),
        field("examiner2Id", "examiner2_id"),
        field("defenseDate", "defense_date"),
        field("defenseTime", "defense_time"),
        field("defenseRoom", "defense_room"),
        field("letterNumber", "letter_number"),
        field("status", "status"),
    ],
};

pub static INTERNSHIPS: EntitySchema = EntitySchema {
    table: "internships",
    fields: &[
        key(),
        field("studentId", "student_id"),
        field("studentName", "student_name"),
        field("companyName", "company_name"),
        field("advisorId", "advisor_id"),
        field("status", "status"),
    ],
};

pub static LECTURERS: EntitySchema = EntitySchema {
    table: "lecturers",
    fields: &[
        key(),
        field("name", "name"),
        field("nip", "nip"),
        field("specialization", "specialization"),
    ],
};

pub static NOTIFICATIONS: EntitySchema = EntitySchema {
    table: "notifications",
    fields: &[
        key(),
        field("userId", "user_id"),
        field("subject", "subject"),
        field("message", "message"),
        field("timestamp", "created_at"),
        field("isRead", "is_read"),
        field("attachments", "attachments"),
    ],
};
