use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::time_range;

/// Wall-clock timestamp in the reference timezone.
pub type Timestamp = NaiveDateTime;

/// Interval from `start` to `end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: Timestamp,
    pub end: Timestamp,
}

impl Span {
    pub fn new(start: Timestamp, end: Timestamp) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    pub fn duration(&self) -> chrono::Duration {
        self.end - self.start
    }

    /// Strict slot conflict: touching endpoints count.
    pub fn conflicts_with(&self, other: &Span) -> bool {
        time_range::overlaps(self.start, self.end, other.start, other.end)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FacilityType {
    Room,
    Facility,
}

/// Daily `("HH:MM", "HH:MM")` window. Either side may be unset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationHours(pub Option<String>, pub Option<String>);

impl OperationHours {
    pub fn new(open: &str, close: &str) -> Self {
        Self(Some(open.to_string()), Some(close.to_string()))
    }

    pub fn open(&self) -> Option<&str> {
        self.0.as_deref()
    }

    pub fn close(&self) -> Option<&str> {
        self.1.as_deref()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Facility {
    pub id: Ulid,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: FacilityType,
    #[serde(default)]
    pub operation_hours: Option<OperationHours>,
}

impl Facility {
    pub fn open(&self) -> Option<&str> {
        self.operation_hours.as_ref().and_then(OperationHours::open)
    }

    pub fn close(&self) -> Option<&str> {
        self.operation_hours.as_ref().and_then(OperationHours::close)
    }
}

/// A persisted booking record. The facility join lives in [`BookingView`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Booking {
    pub id: Ulid,
    pub facility_id: Ulid,
    pub from: Timestamp,
    pub to: Timestamp,
    pub user_email: String,
}

impl Booking {
    pub fn span(&self) -> Span {
        Span::new(self.from, self.to)
    }
}

/// A booking as returned to callers: the record plus the facility it references.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BookingView {
    #[serde(flatten)]
    pub booking: Booking,
    pub facility: Option<Facility>,
}

/// A candidate booking. Fields are typed but may be missing; the validator
/// reports which ones.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BookingDraft {
    /// Set when revalidating an existing booking, so it does not conflict with itself.
    pub id: Option<Ulid>,
    pub facility_id: Option<Ulid>,
    pub from: Option<Timestamp>,
    pub to: Option<Timestamp>,
    pub user_email: Option<String>,
}

impl From<&Booking> for BookingDraft {
    fn from(b: &Booking) -> Self {
        Self {
            id: Some(b.id),
            facility_id: Some(b.facility_id),
            from: Some(b.from),
            to: Some(b.to),
            user_email: Some(b.user_email.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32) -> Timestamp {
        NaiveDate::from_ymd_opt(2030, 1, 7)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    #[test]
    fn span_duration() {
        let s = Span::new(at(9, 0), at(10, 30));
        assert_eq!(s.duration(), chrono::Duration::minutes(90));
    }

    #[test]
    fn span_touching_conflicts() {
        let a = Span::new(at(10, 0), at(11, 0));
        let b = Span::new(at(11, 0), at(12, 0));
        let c = Span::new(at(11, 1), at(12, 0));
        assert!(a.conflicts_with(&b));
        assert!(b.conflicts_with(&a));
        assert!(!a.conflicts_with(&c));
    }

    #[test]
    fn facility_json_shape() {
        let json = r#"{
            "id": "01ARZ3NDEKTSV4RRFFQ69G5FAV",
            "name": "Court 1",
            "type": "Facility",
            "operationHours": ["08:00", "18:00"]
        }"#;
        let f: Facility = serde_json::from_str(json).unwrap();
        assert_eq!(f.kind, FacilityType::Facility);
        assert_eq!(f.open(), Some("08:00"));
        assert_eq!(f.close(), Some("18:00"));
    }

    #[test]
    fn facility_without_hours() {
        let json = r#"{"id": "01ARZ3NDEKTSV4RRFFQ69G5FAV", "name": "Room A", "type": "Room"}"#;
        let f: Facility = serde_json::from_str(json).unwrap();
        assert_eq!(f.operation_hours, None);
        assert_eq!(f.open(), None);
        assert_eq!(f.close(), None);
    }

    #[test]
    fn booking_view_flattens_record() {
        let view = BookingView {
            booking: Booking {
                id: Ulid::nil(),
                facility_id: Ulid::nil(),
                from: at(9, 0),
                to: at(10, 0),
                user_email: "a@example.com".into(),
            },
            facility: None,
        };
        let v = serde_json::to_value(&view).unwrap();
        assert_eq!(v["userEmail"], "a@example.com");
        assert_eq!(v["from"], "2030-01-07T09:00:00");
        assert!(v["facility"].is_null());
    }

    #[test]
    fn draft_from_booking_keeps_identity() {
        let b = Booking {
            id: Ulid::new(),
            facility_id: Ulid::new(),
            from: at(9, 0),
            to: at(10, 0),
            user_email: "a@example.com".into(),
        };
        let d = BookingDraft::from(&b);
        assert_eq!(d.id, Some(b.id));
        assert_eq!(d.facility_id, Some(b.facility_id));
        assert_eq!(d.user_email.as_deref(), Some("a@example.com"));
    }
}
