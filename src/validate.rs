use chrono::{Datelike, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;

// Surname, given name, patronymic: letters only, single separators.
static FULL_NAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-zА-Яа-яЁё]+\s[A-Za-zА-Яа-яЁё]+\s[A-Za-zА-Яа-яЁё]+$")
        .expect("full name pattern")
});
static GROUP_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{8}$").expect("group pattern"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryError {
    Name,
    Group,
    DateFormat,
    FutureYear,
}

impl EntryError {
    pub fn code(self) -> &'static str {
        match self {
            EntryError::Name => "bad_full_name",
            EntryError::Group => "bad_group",
            EntryError::DateFormat | EntryError::FutureYear => "bad_date",
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            EntryError::Name => {
                "full name must be three whitespace-separated words using letters only"
            }
            EntryError::Group => "group must be exactly 8 digits",
            EntryError::DateFormat => "date must be a valid yyyy-mm-dd calendar date",
            EntryError::FutureYear => "date year must not be after the current year",
        }
    }
}

pub fn validate_full_name(name: &str) -> Result<(), EntryError> {
    if FULL_NAME_RE.is_match(name) {
        Ok(())
    } else {
        Err(EntryError::Name)
    }
}

pub fn validate_group(group: &str) -> Result<(), EntryError> {
    if GROUP_RE.is_match(group) {
        Ok(())
    } else {
        Err(EntryError::Group)
    }
}

/// Non-lenient `yyyy-mm-dd` parse with the entry-year cap.
pub fn parse_entry_date(raw: &str, today: NaiveDate) -> Result<NaiveDate, EntryError> {
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| EntryError::DateFormat)?;
    if date.year() > today.year() {
        return Err(EntryError::FutureYear);
    }
    Ok(date)
}

/// Splits a display name into surname, given name, and optional
/// patronymic. `None` when fewer than two tokens remain.
pub fn split_name(full_name: &str) -> Option<(String, String, String)> {
    let mut parts = full_name.split_whitespace();
    let last = parts.next()?.to_string();
    let first = parts.next()?.to_string();
    let patronymic = parts.next().unwrap_or("").to_string();
    Some((last, first, patronymic))
}
