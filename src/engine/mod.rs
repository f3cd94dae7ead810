mod availability;
mod error;
mod mutations;
mod queries;

pub use availability::free_windows;
pub use error::EngineError;

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;
use ulid::Ulid;

use crate::clock::Clock;
use crate::facility::FacilityLookup;
use crate::model::*;
use crate::observability;
use crate::store::{RecordStore, StoreError};
use crate::validator::{validate, Verdict};

/// Create, update, cancel and query bookings on top of a [`RecordStore`].
///
/// Writes to one facility are serialized: `create`, `update` and `cancel` hold
/// that facility's lock from the moment they read its bookings until their
/// write lands, so two callers can never both see a slot as free. Nothing is
/// cached between calls; every validation reads a fresh snapshot.
pub struct BookingService<S> {
    store: Arc<S>,
    facilities: FacilityLookup<S>,
    clock: Arc<dyn Clock>,
    facility_locks: DashMap<Ulid, Arc<Mutex<()>>>,
}

impl<S: RecordStore> BookingService<S> {
    pub fn new(store: Arc<S>, clock: Arc<dyn Clock>) -> Self {
        Self {
            facilities: FacilityLookup::new(store.clone()),
            store,
            clock,
            facility_locks: DashMap::new(),
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn facilities(&self) -> &FacilityLookup<S> {
        &self.facilities
    }

    pub(super) async fn lock_facility(&self, facility_id: Ulid) -> OwnedMutexGuard<()> {
        let lock = self.facility_locks.entry(facility_id).or_default().clone();
        lock.lock_owned().await
    }

    /// Current bookings on one facility, ordered by start time.
    pub(super) async fn bookings_for(&self, facility_id: Ulid) -> Result<Vec<Booking>, StoreError> {
        let all: Vec<Booking> = self.store.load_all().await?;
        let mut bookings: Vec<Booking> = all
            .into_iter()
            .filter(|b| b.facility_id == facility_id)
            .collect();
        bookings.sort_by(|a, b| a.from.cmp(&b.from).then(a.id.cmp(&b.id)));
        Ok(bookings)
    }

    pub(super) async fn find_booking(&self, id: Ulid) -> Result<Option<Booking>, StoreError> {
        self.store.load_one(id).await
    }

    pub(super) async fn resolve_facility(
        &self,
        facility_id: Option<Ulid>,
    ) -> Result<Option<Facility>, StoreError> {
        match facility_id {
            Some(id) => self.facilities.load_by_id(id).await,
            None => Ok(None),
        }
    }

    /// Run the validator and turn a rejection into an error.
    pub(super) fn check(
        &self,
        op: &'static str,
        draft: &BookingDraft,
        existing: &[Booking],
        facility: Option<&Facility>,
    ) -> Result<Booking, EngineError> {
        let verdict = validate(draft, existing, facility, self.clock.now()).map_err(|source| {
            EngineError::MalformedFacility {
                facility_id: facility.map_or(Ulid::nil(), |f| f.id),
                source,
            }
        })?;
        match verdict {
            Verdict::Accepted(booking) => {
                metrics::counter!(observability::BOOKINGS_ACCEPTED_TOTAL, "op" => op).increment(1);
                Ok(booking)
            }
            Verdict::Rejected(rejection) => {
                debug!("{op} rejected: {rejection} ({:?})", rejection.cause());
                metrics::counter!(observability::BOOKINGS_REJECTED_TOTAL, "op" => op).increment(1);
                Err(rejection.into())
            }
        }
    }
}
