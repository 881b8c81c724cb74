//! Letter generation from the lecturer-supplied `.docx` master template.

pub mod fields;
pub mod template;

pub use fields::{format_schedule_date, DefenseLetter, FieldMap, DOCX_MIME};
pub use template::{render, DocumentError, RenderError, TemplateError};
