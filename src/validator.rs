use thiserror::Error;
use ulid::Ulid;

use crate::model::*;
use crate::time_range::{overlaps, project_time_of_day, within, TimeError};

/// Which part of the slot check fired. Users get the same message for all three.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotCause {
    BeforeOpening,
    AfterClosing,
    Overlap(Ulid),
}

/// A user-facing reason for turning a booking down. Checks run in a fixed
/// order and only the first failure is reported.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("Missing fields: {}", .0.join(", "))]
    MissingFields(Vec<&'static str>),
    #[error("From should be before To")]
    FromNotBeforeTo,
    #[error("From and To should be after current time")]
    InThePast,
    #[error("Facility cannot be found {0}")]
    FacilityNotFound(Ulid),
    #[error("Your slot selection is overlap with occupied slots or over operation hours")]
    SlotUnavailable(SlotCause),
}

impl Rejection {
    pub fn cause(&self) -> Option<SlotCause> {
        match self {
            Rejection::SlotUnavailable(cause) => Some(*cause),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// The candidate as a well-formed record. `id` is the draft's id, or nil
    /// for a new booking.
    Accepted(Booking),
    Rejected(Rejection),
}

impl Verdict {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Verdict::Accepted(_))
    }
}

/// Decide whether `candidate` may be stored next to `existing`.
///
/// `existing` is the facility's current bookings; the candidate's own record
/// (matched by id) is skipped. `facility` is whatever the lookup resolved for
/// the candidate's facility id. Only malformed operating hours on the facility
/// produce an `Err`; every user-input problem is a `Verdict::Rejected`.
pub fn validate(
    candidate: &BookingDraft,
    existing: &[Booking],
    facility: Option<&Facility>,
    now: Timestamp,
) -> Result<Verdict, TimeError> {
    let required = match required_fields(candidate) {
        Ok(r) => r,
        Err(rejection) => return Ok(Verdict::Rejected(rejection)),
    };

    if let Err(rejection) = check_from_to(required.from, required.to, now) {
        return Ok(Verdict::Rejected(rejection));
    }

    let Some(facility) = facility.filter(|f| f.id == required.facility_id) else {
        return Ok(Verdict::Rejected(Rejection::FacilityNotFound(
            required.facility_id,
        )));
    };

    if let Some(cause) = check_slot(candidate.id, required.from, required.to, existing, facility)? {
        return Ok(Verdict::Rejected(Rejection::SlotUnavailable(cause)));
    }

    Ok(Verdict::Accepted(Booking {
        id: candidate.id.unwrap_or_else(Ulid::nil),
        facility_id: required.facility_id,
        from: required.from,
        to: required.to,
        user_email: required.user_email,
    }))
}

struct Required {
    facility_id: Ulid,
    from: Timestamp,
    to: Timestamp,
    user_email: String,
}

fn required_fields(candidate: &BookingDraft) -> Result<Required, Rejection> {
    let email = candidate
        .user_email
        .as_deref()
        .filter(|e| !e.trim().is_empty());

    match (candidate.facility_id, candidate.from, candidate.to, email) {
        (Some(facility_id), Some(from), Some(to), Some(email)) => Ok(Required {
            facility_id,
            from,
            to,
            user_email: email.to_string(),
        }),
        (facility_id, from, to, email) => {
            let mut missing = Vec::new();
            if facility_id.is_none() {
                missing.push("facilityId");
            }
            if from.is_none() {
                missing.push("from");
            }
            if to.is_none() {
                missing.push("to");
            }
            if email.is_none() {
                missing.push("userEmail");
            }
            Err(Rejection::MissingFields(missing))
        }
    }
}

fn check_from_to(from: Timestamp, to: Timestamp, now: Timestamp) -> Result<(), Rejection> {
    if from >= to {
        return Err(Rejection::FromNotBeforeTo);
    }
    if from < now || to < now {
        return Err(Rejection::InThePast);
    }
    Ok(())
}

/// Operating hours first, then every other booking on the facility.
fn check_slot(
    self_id: Option<Ulid>,
    from: Timestamp,
    to: Timestamp,
    existing: &[Booking],
    facility: &Facility,
) -> Result<Option<SlotCause>, TimeError> {
    // Opening is placed on the start's day, closing on the end's day.
    let open = project_time_of_day(facility.open(), from)?;
    let close = project_time_of_day(facility.close(), to)?;
    let window_start = open.unwrap_or(from);
    let window_end = close.unwrap_or(to);

    if !within(from, window_start, window_end) || !within(to, window_start, window_end) {
        let cause = if from < window_start {
            SlotCause::BeforeOpening
        } else {
            SlotCause::AfterClosing
        };
        return Ok(Some(cause));
    }

    let clash = existing
        .iter()
        .filter(|b| b.facility_id == facility.id)
        .filter(|b| Some(b.id) != self_id)
        .find(|b| overlaps(from, to, b.from, b.to));

    Ok(clash.map(|b| SlotCause::Overlap(b.id)))
}
