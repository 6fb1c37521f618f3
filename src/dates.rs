use chrono::{Duration, NaiveDate, NaiveDateTime};

use crate::model::CellValue;

/// Largest serial Excel can display (9999-12-31).
const MAX_EXCEL_SERIAL: f64 = 2_958_465.0;
const MILLIS_PER_DAY: f64 = 86_400_000.0;

/// Day-first formats, tried in order, for dates stored as text.
const TEXT_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%d/%m/%Y %H:%M:%S",
    "%d-%m-%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
    "%d-%m-%Y %H:%M",
];

const TEXT_DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d", "%d-%m-%Y", "%d/%m/%Y", "%Y/%m/%d", "%d.%m.%Y", "%d-%b-%Y", "%d %b %Y",
    "%d-%m-%y", "%d/%m/%y",
];

fn excel_epoch() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(1899, 12, 30)
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .unwrap_or_default()
}

/// Converts an Excel serial day number into a timestamp.
pub fn from_excel_serial(serial: f64) -> Option<NaiveDateTime> {
    if !serial.is_finite() || !(0.0..=MAX_EXCEL_SERIAL).contains(&serial) {
        return None;
    }
    let millis = (serial * MILLIS_PER_DAY).round() as i64;
    excel_epoch().checked_add_signed(Duration::milliseconds(millis))
}

/// Converts a timestamp back into an Excel serial day number.
pub fn to_excel_serial(value: NaiveDateTime) -> f64 {
    let delta = value - excel_epoch();
    delta.num_milliseconds() as f64 / MILLIS_PER_DAY
}

/// Parses text dates, accepting an optional trailing time portion.
pub fn parse_text(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    for format in TEXT_DATETIME_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(value, format) {
            return Some(parsed);
        }
    }
    for format in TEXT_DATE_FORMATS {
        if let Ok(parsed) = NaiveDate::parse_from_str(value, format) {
            return parsed.and_hms_opt(0, 0, 0);
        }
    }
    None
}

/// Interprets a cell as a date. Numbers are treated as Excel serials;
/// anything unparseable yields `None`.
pub fn parse_cell(cell: &CellValue) -> Option<NaiveDateTime> {
    match cell {
        CellValue::Date(value) => Some(*value),
        CellValue::Number(serial) => from_excel_serial(*serial),
        CellValue::Text(value) => parse_text(value),
        CellValue::Empty | CellValue::Bool(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serial_conversion_matches_excel() {
        let date = from_excel_serial(45_536.0).expect("valid serial");
        assert_eq!(date.format("%d-%m-%Y").to_string(), "01-09-2024");
        assert_eq!(to_excel_serial(date), 45_536.0);
    }

    #[test]
    fn text_dates_are_day_first() {
        let parsed = parse_text("03/09/2025").expect("parsed");
        assert_eq!(parsed.format("%Y-%m-%d").to_string(), "2025-09-03");

        let parsed = parse_text("2025-09-03 10:15:00").expect("parsed");
        assert_eq!(parsed.format("%H:%M").to_string(), "10:15");
    }

    #[test]
    fn garbage_is_not_a_date() {
        assert!(parse_text("pending").is_none());
        assert!(parse_cell(&CellValue::Bool(true)).is_none());
        assert!(from_excel_serial(-4.0).is_none());
    }
}
