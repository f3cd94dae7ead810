use chrono::{NaiveDate, NaiveTime};
use ulid::Ulid;

use crate::model::*;
use crate::store::RecordStore;
use crate::time_range::project_time_of_day;

use super::availability::free_windows;
use super::{BookingService, EngineError};

impl<S: RecordStore> BookingService<S> {
    /// All bookings made by `user_email`, optionally only on one facility type.
    pub async fn list_by_user(
        &self,
        user_email: &str,
        facility_type: Option<FacilityType>,
    ) -> Result<Vec<BookingView>, EngineError> {
        let all: Vec<Booking> = self.store.load_all().await?;
        let mine: Vec<Booking> = all
            .into_iter()
            .filter(|b| b.user_email == user_email)
            .collect();
        let mut views = self.facilities.join(mine).await?;
        if let Some(kind) = facility_type {
            views.retain(|v| v.facility.as_ref().is_some_and(|f| f.kind == kind));
        }
        Ok(views)
    }

    /// All bookings on one facility, ordered by start time.
    pub async fn list_by_facility(
        &self,
        facility_id: Ulid,
    ) -> Result<Vec<BookingView>, EngineError> {
        let bookings = self.bookings_for(facility_id).await?;
        let facility = self.facilities.load_by_id(facility_id).await?;
        Ok(bookings
            .into_iter()
            .map(|booking| BookingView {
                booking,
                facility: facility.clone(),
            })
            .collect())
    }

    pub async fn load_by_id(&self, id: Ulid) -> Result<Option<BookingView>, EngineError> {
        match self.find_booking(id).await? {
            Some(booking) => Ok(Some(self.facilities.join_one(booking).await?)),
            None => Ok(None),
        }
    }

    /// Free windows on `day`: the facility's operating window (the whole day
    /// when it has none) minus its bookings.
    ///
    /// Windows are gaps between bookings. Because touching slots conflict, a
    /// new booking must start strictly after a window's start when that start
    /// is the end of an existing booking.
    pub async fn availability(
        &self,
        facility_id: Ulid,
        day: NaiveDate,
    ) -> Result<Vec<Span>, EngineError> {
        let facility = self
            .facilities
            .load_by_id(facility_id)
            .await?
            .ok_or(EngineError::FacilityNotFound(facility_id))?;

        let day_start = day.and_time(NaiveTime::MIN);
        let day_end = day_start + chrono::Duration::days(1);
        let malformed = |source| EngineError::MalformedFacility { facility_id, source };
        let open = project_time_of_day(facility.open(), day_start)
            .map_err(malformed)?
            .unwrap_or(day_start);
        let close = project_time_of_day(facility.close(), day_start)
            .map_err(malformed)?
            .unwrap_or(day_end);
        if open >= close {
            return Ok(Vec::new());
        }

        let booked: Vec<Span> = self
            .bookings_for(facility_id)
            .await?
            .iter()
            .map(Booking::span)
            .collect();
        Ok(free_windows(Span::new(open, close), &booked))
    }
}
