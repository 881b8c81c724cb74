use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate};

use crate::workflows::thesis::domain::{Lecturer, ThesisDefense};

/// MIME type of generated letters.
pub const DOCX_MIME: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

/// Placeholder name to substituted text.
pub type FieldMap = BTreeMap<String, String>;

const WEEKDAYS: [&str; 7] = [
    "Minggu", "Senin", "Selasa", "Rabu", "Kamis", "Jumat", "Sabtu",
];

const MONTHS: [&str; 12] = [
    "Januari",
    "Februari",
    "Maret",
    "April",
    "Mei",
    "Juni",
    "Juli",
    "Agustus",
    "September",
    "Oktober",
    "November",
    "Desember",
];

/// Indonesian weekday and long date, e.g. `("Kamis", "20 Juni 2024")`.
pub fn format_schedule_date(date: NaiveDate) -> (String, String) {
    let weekday = WEEKDAYS[date.weekday().num_days_from_sunday() as usize];
    let month = MONTHS[date.month0() as usize];
    (
        weekday.to_string(),
        format!("{} {} {}", date.day(), month, date.year()),
    )
}

/// Everything a defense invitation letter refers to, already resolved.
#[derive(Debug, Clone, Copy)]
pub struct DefenseLetter<'a> {
    pub defense: &'a ThesisDefense,
    pub student_identifier: &'a str,
    pub title: Option<&'a str>,
    pub advisor1: Option<&'a Lecturer>,
    pub advisor2: Option<&'a Lecturer>,
    pub examiner1: Option<&'a Lecturer>,
    pub examiner2: Option<&'a Lecturer>,
}

fn or_dash(value: Option<&str>) -> String {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or("-")
        .to_string()
}

impl DefenseLetter<'_> {
    pub fn field_map(&self) -> FieldMap {
        let defense = self.defense;
        let (hari, tgl) = match defense.defense_date {
            Some(date) => format_schedule_date(date),
            None => ("-".to_string(), "-".to_string()),
        };
        let waktu = match defense.defense_time.as_deref().map(str::trim) {
            Some(time) if !time.is_empty() => format!("{time} WIB"),
            _ => "-".to_string(),
        };
        let label = |lecturer: Option<&Lecturer>| {
            lecturer
                .map(Lecturer::letter_label)
                .unwrap_or_else(|| "-".to_string())
        };

        [
            ("no_surat", or_dash(defense.letter_number.as_deref())),
            ("nama", or_dash(Some(&defense.student_name))),
            ("nim", or_dash(Some(self.student_identifier))),
            ("judul", or_dash(self.title)),
            ("hari", hari),
            ("tgl", tgl),
            ("waktu", waktu),
            ("ruang", or_dash(defense.defense_room.as_deref())),
            ("dosen1", label(self.advisor1)),
            ("dosen2", label(self.advisor2)),
            ("dosen3", label(self.examiner1)),
            ("dosen4", label(self.examiner2)),
        ]
        .into_iter()
        .map(|(key, value)| (key.to_string(), value))
        .collect()
    }
}
