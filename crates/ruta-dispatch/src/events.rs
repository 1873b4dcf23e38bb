//! Live-update channel
//!
//! Every committed trip change is published here for worker and requester apps to
//! react to. The channel is not a source of truth: delivery is best-effort, lagging
//! subscribers drop messages, and consumers re-read the trip before acting.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::trace;

use ruta_common::{
    CancellationReason, NegotiationStatus, PartyRole, TripRequest, TripStatus, WorkerId,
};

/// Default broadcast buffer per subscriber
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

/// What changed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TripChange {
    Requested,
    Assigned {
        worker_id: WorkerId,
    },
    /// Fee debit failed after assignment; the trip is open again
    AssignmentRolledBack {
        worker_id: WorkerId,
    },
    StatusChanged {
        from: TripStatus,
        to: TripStatus,
    },
    Cancelled {
        reason: CancellationReason,
        penalty_charged: bool,
    },
    NegotiationProposed {
        proposer: PartyRole,
        top_up: Decimal,
    },
    NegotiationResolved {
        status: NegotiationStatus,
    },
}

impl TripChange {
    /// The trip became available to workers
    pub fn opens_trip(&self) -> bool {
        matches!(
            self,
            TripChange::Requested | TripChange::AssignmentRolledBack { .. }
        )
    }
}

/// Snapshot of a trip right after a change
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TripEvent {
    pub trip: TripRequest,
    pub change: TripChange,
    pub at: DateTime<Utc>,
}

impl TripEvent {
    pub fn new(trip: TripRequest, change: TripChange) -> Self {
        Self {
            trip,
            change,
            at: Utc::now(),
        }
    }
}

/// Fan-out of trip events to any number of subscribers
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<TripEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publish an event; returns how many subscribers received it
    pub fn publish(&self, trip: TripRequest, change: TripChange) -> usize {
        let trip_id = trip.id;
        // No subscribers is not an error
        let delivered = self.tx.send(TripEvent::new(trip, change)).unwrap_or(0);
        trace!(trip = %trip_id, delivered, "Trip event published");
        delivered
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TripEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}
