use csv::{QuoteStyle, Terminator, WriterBuilder};

use super::domain::{Lecturer, ThesisDefense, ThesisRegistration};

pub const DEFENSE_SCHEDULE_HEADER: [&str; 9] = [
    "Nama Mahasiswa",
    "Judul Skripsi",
    "SKS",
    "Tanggal Sidang",
    "Waktu",
    "Ruangan",
    "Penguji 1",
    "Penguji 2",
    "Status",
];

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error("cannot finish export: {0}")]
    Buffer(String),
}

fn or_dash(value: Option<&str>) -> &str {
    value.map(str::trim).filter(|v| !v.is_empty()).unwrap_or("-")
}

fn quoted(value: &str) -> String {
    format!("\"{}\"", value.replace('"', "\"\""))
}

/// Left unquoted unless the value would split the row.
fn bare(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        quoted(value)
    } else {
        value.to_string()
    }
}

/// Render the defense schedule as CSV.
///
/// Name, title and examiner cells are always quoted; credits, date, time, room
/// and status are written bare.
pub fn defense_schedule_csv(
    defenses: &[ThesisDefense],
    proposals: &[ThesisRegistration],
    lecturers: &[Lecturer],
) -> Result<String, ExportError> {
    let lecturer_name = |id: Option<&str>| -> String {
        id.and_then(|id| lecturers.iter().find(|l| l.id.as_str() == id))
            .map(|l| l.name.clone())
            .unwrap_or_else(|| "-".to_string())
    };
    let title = |thesis_id: Option<&str>| -> String {
        let title = thesis_id
            .and_then(|id| proposals.iter().find(|p| p.id.as_str() == id))
            .map(|p| p.title.as_str());
        or_dash(title).to_string()
    };

    // Cells arrive already quoted.
    let mut writer = WriterBuilder::new()
        .has_headers(false)
        .quote_style(QuoteStyle::Never)
        .terminator(Terminator::Any(b'\n'))
        .from_writer(Vec::new());
    writer.write_record(DEFENSE_SCHEDULE_HEADER)?;

    for defense in defenses {
        let date = defense
            .defense_date
            .map(|date| date.format("%Y-%m-%d").to_string());
        writer.write_record([
            quoted(or_dash(Some(&defense.student_name))),
            quoted(&title(defense.thesis_id.as_deref())),
            defense.sks_count.to_string(),
            bare(or_dash(date.as_deref())),
            bare(or_dash(defense.defense_time.as_deref())),
            bare(or_dash(defense.defense_room.as_deref())),
            quoted(&lecturer_name(defense.examiner1_id.as_deref())),
            quoted(&lecturer_name(defense.examiner2_id.as_deref())),
            bare(defense.status.label()),
        ])?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|err| ExportError::Buffer(err.to_string()))?;
    String::from_utf8(bytes).map_err(|err| ExportError::Buffer(err.to_string()))
}
