use chrono::{NaiveDate, NaiveDateTime};
use serde::Deserialize;
use thiserror::Error;
use ulid::Ulid;

use crate::limits::MAX_EMAIL_LEN;
use crate::model::*;

/// Parsed request line.
#[derive(Debug, PartialEq)]
pub enum Command {
    Create(BookingDraft),
    Update {
        id: Ulid,
        from: Timestamp,
        to: Timestamp,
    },
    Cancel {
        id: Ulid,
    },
    Get {
        id: Ulid,
    },
    ListByUser {
        user_email: String,
        facility_type: Option<FacilityType>,
    },
    ListByFacility {
        facility_id: Ulid,
    },
    Availability {
        facility_id: Ulid,
        day: NaiveDate,
    },
}

/// Wire shape before any field is interpreted. Strings stay strings so
/// missing and blank values can be told apart from malformed ones.
#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum RawRequest {
    #[serde(rename_all = "camelCase")]
    Create {
        facility_id: Option<String>,
        from: Option<String>,
        to: Option<String>,
        user_email: Option<String>,
    },
    Update {
        id: String,
        from: String,
        to: String,
    },
    Cancel {
        id: String,
    },
    Get {
        id: String,
    },
    #[serde(rename_all = "camelCase")]
    ListByUser {
        user_email: String,
        #[serde(rename = "type")]
        facility_type: Option<FacilityType>,
    },
    #[serde(rename_all = "camelCase")]
    ListByFacility {
        facility_id: String,
    },
    #[serde(rename_all = "camelCase")]
    Availability {
        facility_id: String,
        day: String,
    },
}

pub fn parse_request(line: &str) -> Result<Command, ParseError> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Err(ParseError::Empty);
    }
    let raw: RawRequest =
        serde_json::from_str(trimmed).map_err(|e| ParseError::Json(e.to_string()))?;

    match raw {
        RawRequest::Create {
            facility_id,
            from,
            to,
            user_email,
        } => {
            let user_email = present(user_email);
            if let Some(email) = &user_email {
                check_email(email)?;
            }
            Ok(Command::Create(BookingDraft {
                id: None,
                facility_id: present(facility_id)
                    .map(|v| parse_id("facilityId", &v))
                    .transpose()?,
                from: present(from)
                    .map(|v| parse_timestamp("from", &v))
                    .transpose()?,
                to: present(to).map(|v| parse_timestamp("to", &v)).transpose()?,
                user_email,
            }))
        }
        RawRequest::Update { id, from, to } => Ok(Command::Update {
            id: parse_id("id", &id)?,
            from: parse_timestamp("from", &from)?,
            to: parse_timestamp("to", &to)?,
        }),
        RawRequest::Cancel { id } => Ok(Command::Cancel {
            id: parse_id("id", &id)?,
        }),
        RawRequest::Get { id } => Ok(Command::Get {
            id: parse_id("id", &id)?,
        }),
        RawRequest::ListByUser {
            user_email,
            facility_type,
        } => {
            check_email(&user_email)?;
            Ok(Command::ListByUser {
                user_email,
                facility_type,
            })
        }
        RawRequest::ListByFacility { facility_id } => Ok(Command::ListByFacility {
            facility_id: parse_id("facilityId", &facility_id)?,
        }),
        RawRequest::Availability { facility_id, day } => Ok(Command::Availability {
            facility_id: parse_id("facilityId", &facility_id)?,
            day: NaiveDate::parse_from_str(day.trim(), "%Y-%m-%d")
                .map_err(|_| ParseError::InvalidDate(day))?,
        }),
    }
}

/// Blank counts as absent.
fn present(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn check_email(email: &str) -> Result<(), ParseError> {
    if email.len() > MAX_EMAIL_LEN {
        return Err(ParseError::TooLong("userEmail"));
    }
    Ok(())
}

fn parse_id(field: &'static str, value: &str) -> Result<Ulid, ParseError> {
    Ulid::from_string(value.trim()).map_err(|_| ParseError::InvalidId {
        field,
        value: value.to_string(),
    })
}

/// ISO-8601 local date-time, with `T` or a space, seconds optional.
pub fn parse_timestamp(field: &'static str, value: &str) -> Result<Timestamp, ParseError> {
    let v = value.trim();
    v.parse::<NaiveDateTime>()
        .or_else(|_| NaiveDateTime::parse_from_str(v, "%Y-%m-%dT%H:%M"))
        .or_else(|_| NaiveDateTime::parse_from_str(v, "%Y-%m-%d %H:%M:%S"))
        .or_else(|_| NaiveDateTime::parse_from_str(v, "%Y-%m-%d %H:%M"))
        .map_err(|_| ParseError::InvalidTimestamp {
            field,
            value: value.to_string(),
        })
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("empty request")]
    Empty,
    #[error("invalid request: {0}")]
    Json(String),
    #[error("invalid {field}: {value:?} is not a date-time")]
    InvalidTimestamp { field: &'static str, value: String },
    #[error("invalid {field}: {value:?} is not an id")]
    InvalidId { field: &'static str, value: String },
    #[error("invalid day: {0:?} is not YYYY-MM-DD")]
    InvalidDate(String),
    #[error("{0} too long")]
    TooLong(&'static str),
}
