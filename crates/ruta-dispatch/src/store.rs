//! Trip storage backends
//!
//! Writes go through [`TripStore::compare_and_swap`], conditioned on the version the
//! caller read. This is the optimistic lock that orders transitions within one trip.

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::debug;

use ruta_common::{RequesterId, Result, RutaError, TripId, TripKind, TripRequest, WorkerId};

/// Result of a conditional write
#[derive(Debug, Clone)]
pub enum CasOutcome {
    /// Written; carries the stored record with its bumped version
    Committed(TripRequest),
    /// Someone else wrote first; carries the record as it is now
    Conflict(TripRequest),
}

/// Trait for trip storage backends
#[async_trait]
pub trait TripStore: Send + Sync {
    /// Store a new trip. Fails if the id is taken.
    async fn insert(&self, trip: TripRequest) -> Result<TripRequest>;

    /// Get a trip by id
    async fn get(&self, id: &TripId) -> Result<Option<TripRequest>>;

    /// Replace the trip iff its stored version still equals `expected_version`.
    ///
    /// The store sets `version = expected_version + 1` on the written record.
    async fn compare_and_swap(&self, expected_version: u64, trip: TripRequest)
        -> Result<CasOutcome>;

    /// Unassigned `requested` trips of a kind, oldest first
    async fn list_open(&self, kind: TripKind) -> Result<Vec<TripRequest>>;

    /// Trips ever assigned to a worker, oldest first
    async fn list_by_worker(&self, worker_id: &WorkerId) -> Result<Vec<TripRequest>>;

    /// Trips created by a requester, oldest first
    async fn list_by_requester(&self, requester_id: &RequesterId) -> Result<Vec<TripRequest>>;
}

/// In-memory trip store
///
/// Uses DashMap; the compare and the write happen under the same shard lock.
#[derive(Default)]
pub struct InMemoryTripStore {
    trips: DashMap<TripId, TripRequest>,
}

impl InMemoryTripStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.trips.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trips.is_empty()
    }

    fn collect_sorted(&self, keep: impl Fn(&TripRequest) -> bool) -> Vec<TripRequest> {
        let mut trips: Vec<TripRequest> = self
            .trips
            .iter()
            .filter(|t| keep(t.value()))
            .map(|t| t.value().clone())
            .collect();
        trips.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        trips
    }
}

#[async_trait]
impl TripStore for InMemoryTripStore {
    async fn insert(&self, trip: TripRequest) -> Result<TripRequest> {
        match self.trips.entry(trip.id) {
            Entry::Occupied(_) => Err(RutaError::Storage(format!(
                "trip {} already exists",
                trip.id
            ))),
            Entry::Vacant(slot) => {
                slot.insert(trip.clone());
                Ok(trip)
            }
        }
    }

    async fn get(&self, id: &TripId) -> Result<Option<TripRequest>> {
        Ok(self.trips.get(id).map(|t| t.clone()))
    }

    async fn compare_and_swap(
        &self,
        expected_version: u64,
        mut trip: TripRequest,
    ) -> Result<CasOutcome> {
        let mut stored = self
            .trips
            .get_mut(&trip.id)
            .ok_or(RutaError::TripNotFound(trip.id))?;

        if stored.version != expected_version {
            debug!(
                trip = %trip.id,
                expected = expected_version,
                found = stored.version,
                "Version conflict"
            );
            return Ok(CasOutcome::Conflict(stored.clone()));
        }

        trip.version = expected_version + 1;
        *stored = trip.clone();
        Ok(CasOutcome::Committed(trip))
    }

    async fn list_open(&self, kind: TripKind) -> Result<Vec<TripRequest>> {
        Ok(self.collect_sorted(|t| t.kind == kind && t.is_open()))
    }

    async fn list_by_worker(&self, worker_id: &WorkerId) -> Result<Vec<TripRequest>> {
        Ok(self.collect_sorted(|t| t.worker_id.as_ref() == Some(worker_id)))
    }

    async fn list_by_requester(&self, requester_id: &RequesterId) -> Result<Vec<TripRequest>> {
        Ok(self.collect_sorted(|t| &t.requester_id == requester_id))
    }
}
