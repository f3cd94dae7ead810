use tracing::info;
use ulid::Ulid;

use crate::model::*;
use crate::store::{Collection, RecordStore};

use super::{BookingService, EngineError};

impl<S: RecordStore> BookingService<S> {
    /// Validate `draft` against the facility's current bookings and store it
    /// under a fresh id.
    pub async fn create(&self, draft: BookingDraft) -> Result<BookingView, EngineError> {
        // A new booking has no identity yet; a caller-supplied id would
        // exempt that record from the conflict check.
        let draft = BookingDraft { id: None, ..draft };

        // Lock entries are only made for facilities that exist. Ids that
        // resolve to nothing are rejected without one.
        let facility = self.resolve_facility(draft.facility_id).await?;
        let _guard = match &facility {
            Some(f) => Some(self.lock_facility(f.id).await),
            None => None,
        };
        let existing = match &facility {
            Some(f) => self.bookings_for(f.id).await?,
            None => Vec::new(),
        };
        let booking = self.check("create", &draft, &existing, facility.as_ref())?;

        let saved = self.store.insert_one(booking).await?;
        info!(
            "booking {} created on facility {} [{}, {}) for {}",
            saved.id, saved.facility_id, saved.from, saved.to, saved.user_email
        );
        Ok(BookingView {
            booking: saved,
            facility,
        })
    }

    /// Move an existing booking to `[from, to)`. The booking's own current
    /// slot does not count as a conflict. On rejection nothing is written.
    pub async fn update(
        &self,
        id: Ulid,
        from: Timestamp,
        to: Timestamp,
    ) -> Result<BookingView, EngineError> {
        let current = self
            .find_booking(id)
            .await?
            .ok_or(EngineError::BookingNotFound(id))?;
        let _guard = self.lock_facility(current.facility_id).await;
        // Re-read under the lock: it may have been cancelled or moved meanwhile.
        let current = self
            .find_booking(id)
            .await?
            .ok_or(EngineError::BookingNotFound(id))?;

        let draft = BookingDraft {
            from: Some(from),
            to: Some(to),
            ..BookingDraft::from(&current)
        };
        let facility = self.resolve_facility(Some(current.facility_id)).await?;
        let existing = self.bookings_for(current.facility_id).await?;
        let booking = self.check("update", &draft, &existing, facility.as_ref())?;

        let saved = self.store.update(booking).await?;
        info!(
            "booking {} moved from [{}, {}) to [{}, {})",
            saved.id, current.from, current.to, saved.from, saved.to
        );
        Ok(BookingView {
            booking: saved,
            facility,
        })
    }

    /// Delete a booking outright.
    pub async fn cancel(&self, id: Ulid) -> Result<(), EngineError> {
        let current = self
            .find_booking(id)
            .await?
            .ok_or(EngineError::BookingNotFound(id))?;
        let _guard = self.lock_facility(current.facility_id).await;

        if !self.store.remove(Collection::Bookings, id).await? {
            return Err(EngineError::BookingNotFound(id));
        }
        info!("booking {id} cancelled on facility {}", current.facility_id);
        Ok(())
    }
}
