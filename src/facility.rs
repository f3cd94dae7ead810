use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tracing::info;
use ulid::Ulid;

use crate::model::*;
use crate::store::{RecordStore, StoreError};

/// Read-only access to facilities, and the facility join on bookings.
pub struct FacilityLookup<S> {
    store: Arc<S>,
}

impl<S: RecordStore> FacilityLookup<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub async fn load_by_id(&self, id: Ulid) -> Result<Option<Facility>, StoreError> {
        self.store.load_one(id).await
    }

    pub async fn load_all(&self) -> Result<HashMap<Ulid, Facility>, StoreError> {
        let facilities: Vec<Facility> = self.store.load_all().await?;
        Ok(facilities.into_iter().map(|f| (f.id, f)).collect())
    }

    /// Attach each booking's facility. Bookings whose facility is gone keep `None`.
    pub async fn join(&self, bookings: Vec<Booking>) -> Result<Vec<BookingView>, StoreError> {
        let facilities = self.load_all().await?;
        Ok(bookings
            .into_iter()
            .map(|booking| {
                let facility = facilities.get(&booking.facility_id).cloned();
                BookingView { booking, facility }
            })
            .collect())
    }

    pub async fn join_one(&self, booking: Booking) -> Result<BookingView, StoreError> {
        let facility = self.load_by_id(booking.facility_id).await?;
        Ok(BookingView { booking, facility })
    }
}

#[derive(Debug, Error)]
pub enum SeedError {
    #[error("cannot read facility seed {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid facility seed: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Insert the facilities listed in a JSON array file. Facilities whose id is
/// already stored are left as they are. Returns how many were added.
pub async fn load_seed_file<S: RecordStore>(store: &S, path: &Path) -> Result<usize, SeedError> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| SeedError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    let seed: Vec<Facility> = serde_json::from_str(&raw)?;

    let existing: Vec<Facility> = store.load_all().await?;
    let mut added = 0;
    for facility in seed {
        if existing.iter().any(|f| f.id == facility.id) {
            continue;
        }
        info!("seeding facility {} ({})", facility.id, facility.name);
        store.insert_one(facility).await?;
        added += 1;
    }
    Ok(added)
}
