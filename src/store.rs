use std::io;
use std::path::Path;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use ulid::Ulid;

use crate::model::{Booking, Facility};
use crate::wal::Wal;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Collection {
    Facilities,
    Bookings,
}

/// A plain record kept in one collection, keyed by its id.
pub trait Record: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    const COLLECTION: Collection;

    /// `Ulid::nil()` means "not assigned yet".
    fn id(&self) -> Ulid;
    fn set_id(&mut self, id: Ulid);
}

impl Record for Facility {
    const COLLECTION: Collection = Collection::Facilities;

    fn id(&self) -> Ulid {
        self.id
    }

    fn set_id(&mut self, id: Ulid) {
        self.id = id;
    }
}

impl Record for Booking {
    const COLLECTION: Collection = Collection::Bookings;

    fn id(&self) -> Ulid {
        self.id
    }

    fn set_id(&mut self, id: Ulid) {
        self.id = id;
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("cannot encode {collection:?} record {id}: {message}")]
    Encode {
        collection: Collection,
        id: Ulid,
        message: String,
    },
    #[error("corrupt {collection:?} record {id}: {message}")]
    Corrupt {
        collection: Collection,
        id: Ulid,
        message: String,
    },
    #[error("{collection:?} record not found: {id}")]
    NotFound { collection: Collection, id: Ulid },
    #[error("{collection:?} record already exists: {id}")]
    AlreadyExists { collection: Collection, id: Ulid },
}

/// Generic persistence over the facility and booking collections.
#[async_trait]
pub trait RecordStore: Send + Sync + 'static {
    /// Every record in `T`'s collection, in id order.
    async fn load_all<T: Record>(&self) -> Result<Vec<T>, StoreError>;

    /// Store a new record, assigning an id if it has none.
    async fn insert_one<T: Record>(&self, record: T) -> Result<T, StoreError>;

    /// Replace the record with the same id. Fails if there is none.
    async fn update<T: Record>(&self, record: T) -> Result<T, StoreError>;

    /// `true` if a record was removed.
    async fn remove(&self, collection: Collection, id: Ulid) -> Result<bool, StoreError>;

    async fn load_one<T: Record>(&self, id: Ulid) -> Result<Option<T>, StoreError> {
        let all: Vec<T> = self.load_all().await?;
        Ok(all.into_iter().find(|r| r.id() == id))
    }
}

/// A log record. Payloads are bincode-encoded records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StoreEvent {
    Put {
        collection: Collection,
        id: Ulid,
        payload: Vec<u8>,
    },
    Removed {
        collection: Collection,
        id: Ulid,
    },
}

/// Record store held in memory and made durable through a [`Wal`].
///
/// All mutations go through one lock so the log order matches the order in
/// which they were applied.
pub struct LogStore {
    facilities: DashMap<Ulid, Vec<u8>>,
    bookings: DashMap<Ulid, Vec<u8>>,
    wal: Mutex<Option<Wal>>,
}

impl LogStore {
    /// A store with no log. Contents are lost on drop.
    pub fn in_memory() -> Self {
        Self {
            facilities: DashMap::new(),
            bookings: DashMap::new(),
            wal: Mutex::new(None),
        }
    }

    /// Replay the log at `path` (if any) and keep appending to it.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let (wal, events) = Wal::open_and_replay(path)?;
        let store = Self {
            facilities: DashMap::new(),
            bookings: DashMap::new(),
            wal: Mutex::new(Some(wal)),
        };
        for event in &events {
            store.apply(event);
        }
        tracing::debug!(
            "replayed {} events from {}: {} facilities, {} bookings",
            events.len(),
            path.display(),
            store.facilities.len(),
            store.bookings.len()
        );
        Ok(store)
    }

    pub fn len(&self, collection: Collection) -> usize {
        self.table(collection).len()
    }

    pub fn is_empty(&self, collection: Collection) -> bool {
        self.table(collection).is_empty()
    }

    fn table(&self, collection: Collection) -> &DashMap<Ulid, Vec<u8>> {
        match collection {
            Collection::Facilities => &self.facilities,
            Collection::Bookings => &self.bookings,
        }
    }

    fn apply(&self, event: &StoreEvent) {
        match event {
            StoreEvent::Put {
                collection,
                id,
                payload,
            } => {
                self.table(*collection).insert(*id, payload.clone());
            }
            StoreEvent::Removed { collection, id } => {
                self.table(*collection).remove(id);
            }
        }
    }

    fn encode<T: Record>(record: &T) -> Result<Vec<u8>, StoreError> {
        bincode::serialize(record).map_err(|e| StoreError::Encode {
            collection: T::COLLECTION,
            id: record.id(),
            message: e.to_string(),
        })
    }

    fn decode<T: Record>(id: Ulid, payload: &[u8]) -> Result<T, StoreError> {
        bincode::deserialize(payload).map_err(|e| StoreError::Corrupt {
            collection: T::COLLECTION,
            id,
            message: e.to_string(),
        })
    }

    /// Rewrite the log as one `Put` per live record.
    ///
    /// The snapshot is taken under the log lock and written without it.
    /// Mutations that land in between are carried over at the swap.
    pub async fn compact(&self) -> Result<(), StoreError> {
        let (path, events) = {
            let mut wal = self.wal.lock().await;
            let Some(wal) = wal.as_mut() else {
                return Ok(());
            };
            if !wal.begin_compaction() {
                return Ok(());
            }
            (wal.path().to_path_buf(), self.snapshot())
        };

        let written =
            tokio::task::spawn_blocking(move || Wal::write_compact_file(&path, &events))
                .await
                .map_err(io::Error::other)
                .and_then(|r| r);

        let mut wal = self.wal.lock().await;
        let Some(wal) = wal.as_mut() else {
            return Ok(());
        };
        let swapped = written.and_then(|()| wal.swap_compact_file());
        if swapped.is_err() {
            wal.abort_compaction();
        }
        Ok(swapped?)
    }

    fn snapshot(&self) -> Vec<StoreEvent> {
        let mut events = Vec::with_capacity(self.facilities.len() + self.bookings.len());
        for collection in [Collection::Facilities, Collection::Bookings] {
            let mut rows: Vec<(Ulid, Vec<u8>)> = self
                .table(collection)
                .iter()
                .map(|e| (*e.key(), e.value().clone()))
                .collect();
            rows.sort_by_key(|(id, _)| *id);
            events.extend(rows.into_iter().map(|(id, payload)| StoreEvent::Put {
                collection,
                id,
                payload,
            }));
        }
        events
    }

    pub async fn appends_since_compact(&self) -> u64 {
        self.wal
            .lock()
            .await
            .as_ref()
            .map_or(0, Wal::appends_since_compact)
    }
}

#[async_trait]
impl RecordStore for LogStore {
    async fn load_all<T: Record>(&self) -> Result<Vec<T>, StoreError> {
        let mut rows: Vec<(Ulid, Vec<u8>)> = self
            .table(T::COLLECTION)
            .iter()
            .map(|e| (*e.key(), e.value().clone()))
            .collect();
        rows.sort_by_key(|(id, _)| *id);
        rows.into_iter()
            .map(|(id, payload)| Self::decode(id, &payload))
            .collect()
    }

    async fn insert_one<T: Record>(&self, mut record: T) -> Result<T, StoreError> {
        if record.id().is_nil() {
            record.set_id(Ulid::new());
        }
        let id = record.id();
        let payload = Self::encode(&record)?;

        let mut wal = self.wal.lock().await;
        if self.table(T::COLLECTION).contains_key(&id) {
            return Err(StoreError::AlreadyExists {
                collection: T::COLLECTION,
                id,
            });
        }
        let event = StoreEvent::Put {
            collection: T::COLLECTION,
            id,
            payload,
        };
        if let Some(wal) = wal.as_mut() {
            wal.append(&event)?;
        }
        self.apply(&event);
        Ok(record)
    }

    async fn update<T: Record>(&self, record: T) -> Result<T, StoreError> {
        let id = record.id();
        let payload = Self::encode(&record)?;

        let mut wal = self.wal.lock().await;
        if !self.table(T::COLLECTION).contains_key(&id) {
            return Err(StoreError::NotFound {
                collection: T::COLLECTION,
                id,
            });
        }
        let event = StoreEvent::Put {
            collection: T::COLLECTION,
            id,
            payload,
        };
        if let Some(wal) = wal.as_mut() {
            wal.append(&event)?;
        }
        self.apply(&event);
        Ok(record)
    }

    async fn remove(&self, collection: Collection, id: Ulid) -> Result<bool, StoreError> {
        let mut wal = self.wal.lock().await;
        if !self.table(collection).contains_key(&id) {
            return Ok(false);
        }
        let event = StoreEvent::Removed { collection, id };
        if let Some(wal) = wal.as_mut() {
            wal.append(&event)?;
        }
        self.apply(&event);
        Ok(true)
    }

    async fn load_one<T: Record>(&self, id: Ulid) -> Result<Option<T>, StoreError> {
        let payload = self
            .table(T::COLLECTION)
            .get(&id)
            .map(|e| e.value().clone());
        payload.map(|p| Self::decode(id, &p)).transpose()
    }
}
