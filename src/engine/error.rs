use thiserror::Error;
use ulid::Ulid;

use crate::store::StoreError;
use crate::time_range::TimeError;
use crate::validator::Rejection;

#[derive(Debug, Error)]
pub enum EngineError {
    /// The candidate failed validation. Recoverable by resubmitting.
    #[error(transparent)]
    Rejected(#[from] Rejection),
    #[error("Booking is not found")]
    BookingNotFound(Ulid),
    #[error("Facility cannot be found {0}")]
    FacilityNotFound(Ulid),
    /// Stored operating hours that are not `HH:MM`.
    #[error("facility {facility_id} has malformed operation hours: {source}")]
    MalformedFacility {
        facility_id: Ulid,
        #[source]
        source: TimeError,
    },
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl EngineError {
    /// HTTP-style status for the boundary.
    pub fn status_code(&self) -> u16 {
        match self {
            EngineError::Rejected(_) => 400,
            EngineError::BookingNotFound(_) | EngineError::FacilityNotFound(_) => 404,
            EngineError::MalformedFacility { .. } | EngineError::Store(_) => 500,
        }
    }

    pub fn is_internal(&self) -> bool {
        self.status_code() >= 500
    }
}
