//! Assignment and lifecycle commands
//!
//! Every command is a single version-conditioned write: read the trip, check the guard
//! against what was read, and commit only if nobody else wrote in between. On a
//! conflict the guard is re-evaluated against the newer record, so a worker who loses
//! an accept race sees `AlreadyAssigned` rather than overwriting the winner.
//!
//! The platform fee is debited right after the assignment commits, and
//! `platform_fee_charged` is only set once that debit has gone through. If the debit
//! fails, the assignment is rolled back so the trip does not sit assigned to a worker
//! who never paid for it.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures::stream::{self, BoxStream, StreamExt};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};
use tracing::{debug, error, info, instrument, warn};

use ruta_common::{
    can_transition, ActorId, CancellationReason, Parcel, PartyRole, RequesterId, Result, Route,
    RutaError, TripId, TripKind, TripRequest, TripStatus, WorkerId,
};
use ruta_ledger::{BalanceStatus, InMemoryLedgerStore, Ledger};

use crate::config::DispatchConfig;
use crate::events::{EventBus, TripChange, TripEvent};
use crate::kyc::KycGate;
use crate::metrics::DispatchMetrics;
use crate::negotiation::discard_pending;
use crate::store::{CasOutcome, InMemoryTripStore, TripStore};

/// Ledger reference for the fee charged on assignment
pub const PLATFORM_FEE_REFERENCE: &str = "platform_fee";

/// Ledger reference for a no-show penalty
pub const NO_SHOW_PENALTY_REFERENCE: &str = "no_show_penalty";

/// Whether a worker is taking new requests
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerAvailability {
    pub worker_id: WorkerId,
    pub kind: TripKind,
    pub online: bool,
    pub updated_at: DateTime<Utc>,
}

/// Input for a new trip request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTrip {
    pub requester_id: RequesterId,
    pub kind: TripKind,
    pub route: Route,
    pub base_fare: Decimal,
    #[serde(default)]
    pub parcel: Option<Parcel>,
}

/// Trip lifecycle and assignment service
#[derive(Clone)]
pub struct Dispatcher {
    store: Arc<dyn TripStore>,
    ledger: Ledger,
    kyc: Arc<dyn KycGate>,
    events: EventBus,
    config: Arc<DispatchConfig>,
    availability: Arc<DashMap<WorkerId, WorkerAvailability>>,
    metrics: Arc<DispatchMetrics>,
}

impl Dispatcher {
    pub fn new(
        store: Arc<dyn TripStore>,
        ledger: Ledger,
        kyc: Arc<dyn KycGate>,
        config: DispatchConfig,
    ) -> Result<Self> {
        let events = EventBus::new(config.event_capacity);
        Ok(Self {
            store,
            ledger,
            kyc,
            events,
            config: Arc::new(config),
            availability: Arc::new(DashMap::new()),
            metrics: Arc::new(DispatchMetrics::new()?),
        })
    }

    /// Dispatcher over in-memory trip and ledger stores
    pub fn in_memory(kyc: Arc<dyn KycGate>, config: DispatchConfig) -> Result<Self> {
        let ledger = Ledger::new(Arc::new(InMemoryLedgerStore::new()), config.ledger.clone());
        Self::new(Arc::new(InMemoryTripStore::new()), ledger, kyc, config)
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn metrics(&self) -> &DispatchMetrics {
        &self.metrics
    }

    // ============ QUERIES ============

    pub async fn get_trip(&self, trip_id: TripId) -> Result<TripRequest> {
        self.store
            .get(&trip_id)
            .await?
            .ok_or(RutaError::TripNotFound(trip_id))
    }

    pub async fn trips_for_worker(&self, worker_id: &WorkerId) -> Result<Vec<TripRequest>> {
        self.store.list_by_worker(worker_id).await
    }

    pub async fn trips_for_requester(&self, requester_id: &RequesterId) -> Result<Vec<TripRequest>> {
        self.store.list_by_requester(requester_id).await
    }

    /// Open trips of `kind` the worker may accept
    #[instrument(skip(self))]
    pub async fn list_available(&self, kind: TripKind, worker_id: WorkerId) -> Result<Vec<TripRequest>> {
        self.ensure_can_take(kind, &worker_id).await?;
        self.store.list_open(kind).await
    }

    /// Snapshot of open trips followed by every trip of `kind` that opens later.
    ///
    /// The stream never ends on its own. A trip may show up twice, or after someone
    /// else already took it; `accept` sorts that out.
    pub async fn subscribe_available(
        &self,
        kind: TripKind,
        worker_id: WorkerId,
    ) -> Result<BoxStream<'static, TripRequest>> {
        self.ensure_can_take(kind, &worker_id).await?;

        // Subscribe before the snapshot so nothing falls between the two
        let rx = self.events.subscribe();
        let snapshot = self.store.list_open(kind).await?;

        let live = BroadcastStream::new(rx).filter_map(move |msg| async move {
            match msg {
                Ok(event) if event.trip.kind == kind && event.change.opens_trip() => {
                    Some(event.trip)
                }
                Ok(_) => None,
                Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                    warn!(worker = %worker_id, skipped, "Available-trip feed lagged");
                    None
                }
            }
        });

        Ok(stream::iter(snapshot).chain(live).boxed())
    }

    /// All events for one trip
    pub fn watch_trip(&self, trip_id: TripId) -> BoxStream<'static, TripEvent> {
        BroadcastStream::new(self.events.subscribe())
            .filter_map(move |msg| async move {
                match msg {
                    Ok(event) if event.trip.id == trip_id => Some(event),
                    _ => None,
                }
            })
            .boxed()
    }

    pub fn availability(&self, worker_id: &WorkerId) -> Option<WorkerAvailability> {
        self.availability.get(worker_id).map(|a| a.clone())
    }

    pub fn is_online(&self, worker_id: &WorkerId) -> bool {
        self.availability
            .get(worker_id)
            .map(|a| a.online)
            .unwrap_or(false)
    }

    // ============ COMMANDS ============

    /// Create a new trip in `requested`
    #[instrument(skip(self, new_trip), fields(kind = %new_trip.kind))]
    pub async fn create_trip(&self, new_trip: NewTrip) -> Result<TripRequest> {
        if new_trip.base_fare <= Decimal::ZERO {
            return Err(RutaError::Validation(format!(
                "base fare must be positive, got {}",
                new_trip.base_fare
            )));
        }
        if !new_trip.route.pickup.is_valid() || !new_trip.route.dropoff.is_valid() {
            return Err(RutaError::Validation("route coordinates out of range".into()));
        }
        if new_trip.parcel.is_some() && new_trip.kind == TripKind::Ride {
            return Err(RutaError::Validation("rides do not carry parcels".into()));
        }

        let mut trip = TripRequest::new(
            new_trip.requester_id,
            new_trip.kind,
            new_trip.route,
            new_trip.base_fare,
        );
        trip.parcel = new_trip.parcel;

        let trip = self.store.insert(trip).await?;
        info!(trip = %trip.id, requester = %trip.requester_id, fare = %trip.base_fare, "Trip requested");
        self.metrics
            .trips_created
            .with_label_values(&[trip.kind.as_str()])
            .inc();
        self.events.publish(trip.clone(), TripChange::Requested);
        Ok(trip)
    }

    /// Claim an open trip for a worker and charge the platform fee.
    ///
    /// Exactly one of several racing workers gets the trip; the others see
    /// `AlreadyAssigned` and are not charged.
    #[instrument(skip(self))]
    pub async fn accept(&self, trip_id: TripId, worker_id: WorkerId) -> Result<TripRequest> {
        let result = self.try_accept(trip_id, worker_id).await;

        let outcome = match &result {
            Ok(_) => "won",
            Err(RutaError::AlreadyAssigned { .. }) => "already_assigned",
            Err(RutaError::InsufficientFunds { .. }) => "insufficient_funds",
            Err(RutaError::NotEligible { .. }) => "not_eligible",
            Err(_) => "error",
        };
        self.metrics
            .accept_attempts
            .with_label_values(&[outcome])
            .inc();
        result
    }

    async fn try_accept(&self, trip_id: TripId, worker_id: WorkerId) -> Result<TripRequest> {
        let trip = self.get_trip(trip_id).await?;
        let fee = self.ensure_can_take(trip.kind, &worker_id).await?;

        let (_, assigned) = self
            .update_trip(trip_id, |current| {
                if current.status != TripStatus::Requested {
                    if current.is_terminal() {
                        return Err(RutaError::InvalidTransition {
                            from: current.status,
                            to: TripStatus::Accepted,
                        });
                    }
                    return Err(RutaError::AlreadyAssigned { trip_id });
                }
                if current.worker_id.is_some() {
                    return Err(RutaError::AlreadyAssigned { trip_id });
                }

                let mut next = current.clone();
                next.status = TripStatus::Accepted;
                next.worker_id = Some(worker_id);
                next.accepted_at = Some(Utc::now());
                // Set once the debit has gone through
                next.platform_fee_charged = false;
                next.touch();
                Ok(next)
            })
            .await
            .map_err(|err| {
                if matches!(err, RutaError::AlreadyAssigned { .. }) {
                    debug!(trip = %trip_id, worker = %worker_id, "Lost assignment race");
                }
                err
            })?;

        match self
            .ledger
            .deduct(worker_id, fee, Some(trip_id), PLATFORM_FEE_REFERENCE)
            .await
        {
            Ok(balance) => {
                let assigned = self.mark_fee_charged(trip_id, worker_id).await?;
                info!(trip = %trip_id, worker = %worker_id, %fee, %balance, "Trip assigned");
                self.events
                    .publish(assigned.clone(), TripChange::Assigned { worker_id });
                Ok(assigned)
            }
            Err(err) => {
                warn!(trip = %trip_id, worker = %worker_id, "Fee debit failed, rolling back: {}", err);
                // The caller needs the debit error even if the trip already moved on
                if let Err(rollback_err) = self.rollback_assignment(trip_id, worker_id).await {
                    warn!(trip = %trip_id, worker = %worker_id, "Assignment left in place: {}", rollback_err);
                }
                Err(err)
            }
        }
    }

    /// Record a successful fee debit on the trip the worker was assigned to
    async fn mark_fee_charged(&self, trip_id: TripId, worker_id: WorkerId) -> Result<TripRequest> {
        let (_, trip) = self
            .update_trip(trip_id, |current| {
                if current.worker_id != Some(worker_id) {
                    return Err(RutaError::Conflict(format!(
                        "trip {} lost worker {} before its fee was recorded",
                        trip_id, worker_id
                    )));
                }

                let mut next = current.clone();
                next.platform_fee_charged = true;
                next.touch();
                Ok(next)
            })
            .await
            .map_err(|err| {
                error!(trip = %trip_id, worker = %worker_id, "Fee debited but not recorded: {}", err);
                err
            })?;
        Ok(trip)
    }

    /// Undo an assignment whose fee could not be charged.
    ///
    /// A trip that reached a terminal state in the meantime keeps its worker
    /// but is never marked as paid.
    async fn rollback_assignment(&self, trip_id: TripId, worker_id: WorkerId) -> Result<()> {
        let rolled_back = self
            .update_trip(trip_id, |current| {
                if current.is_terminal() || current.worker_id != Some(worker_id) {
                    return Err(RutaError::Conflict(format!(
                        "trip {} moved on before its assignment could be rolled back",
                        trip_id
                    )));
                }

                let mut next = current.clone();
                next.status = TripStatus::Requested;
                next.worker_id = None;
                next.accepted_at = None;
                next.platform_fee_charged = false;
                // A worker's proposal means nothing once they are off the trip
                if next.negotiation.proposer == Some(PartyRole::Worker) {
                    discard_pending(&mut next);
                }
                next.touch();
                Ok(next)
            })
            .await;

        match rolled_back {
            Ok((_, trip)) => {
                info!(trip = %trip_id, worker = %worker_id, "Assignment rolled back");
                self.events
                    .publish(trip, TripChange::AssignmentRolledBack { worker_id });
                Ok(())
            }
            Err(err) => {
                error!(trip = %trip_id, worker = %worker_id, "Rollback failed: {}", err);
                Err(err)
            }
        }
    }

    /// Move a trip one step along its lifecycle
    #[instrument(skip(self))]
    pub async fn advance_status(&self, trip_id: TripId, target: TripStatus) -> Result<TripRequest> {
        if target == TripStatus::Cancelled {
            return self
                .cancel(trip_id, CancellationReason::Other("cancelled".into()), None)
                .await;
        }

        let (before, trip) = self
            .update_trip(trip_id, |current| {
                // Assignment only happens through `accept`
                if target == TripStatus::Accepted
                    || !can_transition(current.kind, current.status, target)
                {
                    return Err(RutaError::InvalidTransition {
                        from: current.status,
                        to: target,
                    });
                }

                let mut next = current.clone();
                next.status = target;
                if target.is_terminal() {
                    next.completed_at = Some(Utc::now());
                    discard_pending(&mut next);
                }
                next.touch();
                Ok(next)
            })
            .await?;

        info!(trip = %trip_id, from = %before.status, to = %target, "Trip status advanced");
        self.events.publish(
            trip.clone(),
            TripChange::StatusChanged {
                from: before.status,
                to: target,
            },
        );
        Ok(trip)
    }

    /// Cancel a non-terminal trip; worker no-shows are charged a penalty
    #[instrument(skip(self))]
    pub async fn cancel(
        &self,
        trip_id: TripId,
        reason: CancellationReason,
        actor: Option<ActorId>,
    ) -> Result<TripRequest> {
        let (_, trip) = self
            .update_trip(trip_id, |current| {
                if !can_transition(current.kind, current.status, TripStatus::Cancelled) {
                    return Err(RutaError::InvalidTransition {
                        from: current.status,
                        to: TripStatus::Cancelled,
                    });
                }

                let mut next = current.clone();
                next.status = TripStatus::Cancelled;
                next.cancellation_reason = Some(reason.clone());
                next.cancelled_by = actor.clone();
                next.cancelled_at = Some(Utc::now());
                discard_pending(&mut next);
                next.touch();
                Ok(next)
            })
            .await?;

        let mut penalty_charged = false;
        match (reason.at_fault(), trip.worker_id) {
            // Only a worker who paid for the assignment answers for the no-show
            (Some(PartyRole::Worker), Some(worker_id)) if trip.platform_fee_charged => {
                let penalty = self.config.fees.no_show_penalty;
                match self
                    .ledger
                    .deduct(worker_id, penalty, Some(trip_id), NO_SHOW_PENALTY_REFERENCE)
                    .await
                {
                    Ok(balance) => {
                        info!(trip = %trip_id, worker = %worker_id, %penalty, %balance, "No-show penalty charged");
                        penalty_charged = true;
                    }
                    Err(err) => {
                        warn!(trip = %trip_id, worker = %worker_id, "No-show penalty not charged: {}", err);
                    }
                }
            }
            (Some(PartyRole::Requester), _) => {
                debug!(trip = %trip_id, reason = %reason, "Requester no-show, no wallet to charge");
            }
            _ => {}
        }

        info!(trip = %trip_id, reason = %reason, penalty_charged, "Trip cancelled");
        self.metrics
            .cancellations
            .with_label_values(&[if penalty_charged { "true" } else { "false" }])
            .inc();
        self.events.publish(
            trip.clone(),
            TripChange::Cancelled {
                reason,
                penalty_charged,
            },
        );
        Ok(trip)
    }

    /// Go online for `kind` or offline. Going online needs KYC and a funded wallet.
    #[instrument(skip(self))]
    pub async fn set_availability(
        &self,
        worker_id: WorkerId,
        kind: TripKind,
        online: bool,
    ) -> Result<WorkerAvailability> {
        if online {
            self.ensure_can_take(kind, &worker_id).await?;
        }

        let availability = WorkerAvailability {
            worker_id,
            kind,
            online,
            updated_at: Utc::now(),
        };
        self.availability.insert(worker_id, availability.clone());
        info!(worker = %worker_id, %kind, online, "Availability changed");
        Ok(availability)
    }

    /// Low-balance warning for a worker at the fee of `kind`
    pub async fn balance_status(&self, worker_id: &WorkerId, kind: TripKind) -> Result<BalanceStatus> {
        self.ledger
            .balance_status(worker_id, self.config.fees.platform_fee(kind))
            .await
    }

    // ============ GUARDS ============

    /// KYC approved and able to pay at least one fee. Returns the fee.
    async fn ensure_can_take(&self, kind: TripKind, worker_id: &WorkerId) -> Result<Decimal> {
        let required = self.config.kyc.required_for(kind);
        if !self.kyc.is_eligible(worker_id, required).await? {
            return Err(RutaError::NotEligible {
                worker_id: *worker_id,
                reason: format!("required {} documents are not all approved", kind),
            });
        }

        let fee = self.config.fees.platform_fee(kind);
        if self.ledger.transaction_capacity(worker_id, fee).await? < 1 {
            return Err(RutaError::InsufficientFunds {
                required: fee,
                available: self.ledger.get_balance(worker_id).await?,
            });
        }
        Ok(fee)
    }

    /// Conditional write loop.
    ///
    /// `mutate` sees the latest stored trip and returns its replacement, or an error
    /// to abort. On a version conflict it is called again with the newer record.
    pub(crate) async fn update_trip<F>(
        &self,
        trip_id: TripId,
        mut mutate: F,
    ) -> Result<(TripRequest, TripRequest)>
    where
        F: FnMut(&TripRequest) -> Result<TripRequest> + Send,
    {
        let mut current = self.get_trip(trip_id).await?;

        for attempt in 0..=self.config.max_conflict_retries {
            let next = mutate(&current)?;
            match self.store.compare_and_swap(current.version, next).await? {
                CasOutcome::Committed(saved) => return Ok((current, saved)),
                CasOutcome::Conflict(latest) => {
                    debug!(trip = %trip_id, attempt, "Retrying after concurrent write");
                    current = latest;
                }
            }
        }

        Err(RutaError::Conflict(format!(
            "trip {} kept changing after {} retries",
            trip_id, self.config.max_conflict_retries
        )))
    }
}
