//! Text formatting applied at the write boundary.

use std::fmt::Display;

use chrono::{DateTime, NaiveDate, TimeZone};

const OPENING_DATE_FORMAT: &str = "%d/%m/%Y";
const COLLECTED_AT_FORMAT: &str = "%d/%m/%Y %H:%M:%S";

/// Brazilian currency text: `R$ 1.234.567,89`.
pub fn format_brl(value: f64) -> String {
    let fixed = format!("{:.2}", value.abs());
    let (int_part, frac_part) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, digit) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(digit);
    }

    let sign = if value < 0.0 && fixed != "0.00" { "-" } else { "" };
    format!("R$ {sign}{grouped},{frac_part}")
}

/// Parse the portal's `dd/mm/YYYY` opening date. A trailing time is ignored.
pub fn parse_opening_date(text: &str) -> Option<NaiveDate> {
    let date = text.split_whitespace().next()?;
    NaiveDate::parse_from_str(date, OPENING_DATE_FORMAT).ok()
}

pub fn format_collected_at<Tz>(at: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    at.format(COLLECTED_AT_FORMAT).to_string()
}
