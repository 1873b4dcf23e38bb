//! Fare negotiation
//!
//! A top-up counter-offer layered on a trip. One proposal can be open at a time and
//! only the counterparty may resolve it:
//!
//! ```text
//!   none ──propose──► pending ──accept──► accepted ──propose──► pending ...
//!                        │
//!                        └────reject───► rejected ──propose──► pending ...
//! ```
//!
//! Negotiation never moves the trip's lifecycle status. A proposal still pending when
//! the trip reaches a terminal status is discarded.

use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use ruta_common::{
    ActorId, NegotiationStatus, PartyRole, Result, RutaError, TripId, TripRequest,
};

use crate::dispatcher::Dispatcher;
use crate::events::TripChange;

/// Limits on what a proposal may ask for
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NegotiationPolicy {
    /// Allow negative top-ups (discounts). The total fare must stay positive.
    pub allow_discount: bool,
    /// Largest top-up a single proposal may carry
    pub max_top_up: Option<Decimal>,
    /// Accepted proposals add to the current top-up instead of replacing it
    pub stack_top_ups: bool,
}

impl Default for NegotiationPolicy {
    fn default() -> Self {
        Self {
            allow_discount: false,
            max_top_up: None,
            stack_top_ups: false,
        }
    }
}

impl NegotiationPolicy {
    /// Top-up the trip would carry once `proposed` is accepted
    pub fn merged_top_up(&self, trip: &TripRequest, proposed: Decimal) -> Decimal {
        if self.stack_top_ups {
            trip.top_up_fare + proposed
        } else {
            proposed
        }
    }

    fn validate(&self, trip: &TripRequest, proposed: Decimal) -> Result<()> {
        if proposed.is_zero() {
            return Err(RutaError::Validation("top-up must not be zero".into()));
        }
        if proposed.is_sign_negative() && !self.allow_discount {
            return Err(RutaError::Validation(format!(
                "discounts are not allowed, got top-up {}",
                proposed
            )));
        }
        if let Some(max) = self.max_top_up {
            if proposed > max {
                return Err(RutaError::Validation(format!(
                    "top-up {} exceeds the maximum of {}",
                    proposed, max
                )));
            }
        }
        let total = trip.base_fare + self.merged_top_up(trip, proposed);
        if total <= Decimal::ZERO {
            return Err(RutaError::Validation(format!(
                "resulting fare {} must be positive",
                total
            )));
        }
        Ok(())
    }
}

/// Side the actor plays on this trip
pub fn party_role(trip: &TripRequest, actor: &ActorId) -> Result<PartyRole> {
    match actor {
        ActorId::Requester(id) if *id == trip.requester_id => Ok(PartyRole::Requester),
        ActorId::Worker(id) if trip.worker_id == Some(*id) => Ok(PartyRole::Worker),
        _ => Err(RutaError::InvalidNegotiationState(format!(
            "{} is not a party to trip {}",
            actor, trip.id
        ))),
    }
}

/// Open a proposal. Returns the updated trip; the input is untouched.
pub fn propose(
    trip: &TripRequest,
    proposer: PartyRole,
    top_up: Decimal,
    notes: Option<String>,
    policy: &NegotiationPolicy,
) -> Result<TripRequest> {
    if trip.is_terminal() {
        return Err(RutaError::InvalidNegotiationState(format!(
            "trip is {}",
            trip.status
        )));
    }
    if trip.negotiation.is_pending() {
        return Err(RutaError::InvalidNegotiationState(
            "a proposal is already pending".into(),
        ));
    }
    if proposer == PartyRole::Worker && trip.worker_id.is_none() {
        return Err(RutaError::InvalidNegotiationState(
            "no worker is assigned to this trip".into(),
        ));
    }
    policy.validate(trip, top_up)?;

    let mut next = trip.clone();
    next.negotiation.status = NegotiationStatus::Pending;
    next.negotiation.proposer = Some(proposer);
    next.negotiation.proposed_top_up = Some(top_up);
    next.negotiation.notes = notes.map(|n| n.trim().to_string()).filter(|n| !n.is_empty());
    next.negotiation.updated_at = Some(Utc::now());
    next.touch();
    Ok(next)
}

/// Accept or reject the pending proposal on behalf of `resolver`
pub fn resolve(
    trip: &TripRequest,
    resolver: PartyRole,
    accept: bool,
    policy: &NegotiationPolicy,
) -> Result<TripRequest> {
    if !trip.negotiation.is_pending() {
        return Err(RutaError::InvalidNegotiationState(format!(
            "no pending proposal (status is {})",
            trip.negotiation.status
        )));
    }
    if trip.negotiation.proposer == Some(resolver) {
        return Err(RutaError::InvalidNegotiationState(
            "a proposer cannot resolve their own proposal".into(),
        ));
    }

    let mut next = trip.clone();
    if accept {
        let proposed = trip.negotiation.proposed_top_up.unwrap_or(Decimal::ZERO);
        let top_up = policy.merged_top_up(trip, proposed);
        if trip.base_fare + top_up <= Decimal::ZERO {
            return Err(RutaError::Validation(
                "accepting would make the fare non-positive".into(),
            ));
        }
        next.set_top_up(top_up);
        next.negotiation.status = NegotiationStatus::Accepted;
    } else {
        next.negotiation.status = NegotiationStatus::Rejected;
    }
    next.negotiation.updated_at = Some(Utc::now());
    next.touch();
    Ok(next)
}

/// Drop an unresolved proposal; fare fields stay as they are
pub(crate) fn discard_pending(trip: &mut TripRequest) {
    if trip.negotiation.is_pending() {
        trip.negotiation.status = NegotiationStatus::Rejected;
        trip.negotiation.updated_at = Some(Utc::now());
    }
}

impl Dispatcher {
    /// Open a top-up proposal on a trip
    #[instrument(skip(self, notes))]
    pub async fn propose_negotiation(
        &self,
        trip_id: TripId,
        actor: ActorId,
        top_up: Decimal,
        notes: Option<String>,
    ) -> Result<TripRequest> {
        let policy = &self.config().negotiation;
        let (_, trip) = self
            .update_trip(trip_id, |current| {
                let role = party_role(current, &actor)?;
                propose(current, role, top_up, notes.clone(), policy)
            })
            .await?;

        let proposer = trip.negotiation.proposer.unwrap_or(PartyRole::Requester);
        info!(trip = %trip_id, %proposer, %top_up, "Negotiation proposed");
        self.metrics()
            .negotiations
            .with_label_values(&["proposed"])
            .inc();
        self.events().publish(
            trip.clone(),
            TripChange::NegotiationProposed { proposer, top_up },
        );
        Ok(trip)
    }

    /// Accept the pending proposal as the counterparty
    pub async fn accept_negotiation(&self, trip_id: TripId, actor: ActorId) -> Result<TripRequest> {
        self.resolve_negotiation(trip_id, actor, true).await
    }

    /// Reject the pending proposal as the counterparty
    pub async fn reject_negotiation(&self, trip_id: TripId, actor: ActorId) -> Result<TripRequest> {
        self.resolve_negotiation(trip_id, actor, false).await
    }

    #[instrument(skip(self))]
    async fn resolve_negotiation(
        &self,
        trip_id: TripId,
        actor: ActorId,
        accept: bool,
    ) -> Result<TripRequest> {
        let policy = &self.config().negotiation;
        let (_, trip) = self
            .update_trip(trip_id, |current| {
                let role = party_role(current, &actor)?;
                resolve(current, role, accept, policy)
            })
            .await?;

        let status = trip.negotiation.status;
        info!(
            trip = %trip_id,
            %status,
            total_fare = %trip.total_fare,
            "Negotiation resolved"
        );
        self.metrics()
            .negotiations
            .with_label_values(&[status.as_str()])
            .inc();
        self.events()
            .publish(trip.clone(), TripChange::NegotiationResolved { status });
        Ok(trip)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ruta_common::{Location, RequesterId, Route, TripKind, TripStatus, WorkerId};
    use rust_decimal_macros::dec;

    fn assigned_trip() -> TripRequest {
        let mut trip = TripRequest::new(
            RequesterId::new(),
            TripKind::Ride,
            Route::new(Location::new(14.6, 121.0), Location::new(14.5, 121.1)),
            dec!(150),
        );
        trip.status = TripStatus::Accepted;
        trip.worker_id = Some(WorkerId::new());
        trip
    }

    #[test]
    fn test_propose_then_accept_merges_top_up() {
        let policy = NegotiationPolicy::default();
        let trip = assigned_trip();

        let pending = propose(&trip, PartyRole::Worker, dec!(30), Some("traffic".into()), &policy)
            .unwrap();
        assert_eq!(pending.negotiation.status, NegotiationStatus::Pending);
        assert_eq!(pending.total_fare, dec!(150));

        let accepted = resolve(&pending, PartyRole::Requester, true, &policy).unwrap();
        assert_eq!(accepted.negotiation.status, NegotiationStatus::Accepted);
        assert_eq!(accepted.top_up_fare, dec!(30));
        assert_eq!(accepted.total_fare, dec!(180));
        assert_eq!(accepted.status, TripStatus::Accepted);
    }

    #[test]
    fn test_propose_then_reject_keeps_fare() {
        let policy = NegotiationPolicy::default();
        let trip = assigned_trip();

        let pending = propose(&trip, PartyRole::Requester, dec!(20), None, &policy).unwrap();
        let rejected = resolve(&pending, PartyRole::Worker, false, &policy).unwrap();

        assert_eq!(rejected.negotiation.status, NegotiationStatus::Rejected);
        assert_eq!(rejected.total_fare, dec!(150));
        assert_eq!(rejected.top_up_fare, Decimal::ZERO);
    }

    #[test]
    fn test_second_proposal_while_pending_fails() {
        let policy = NegotiationPolicy::default();
        let pending = propose(&assigned_trip(), PartyRole::Worker, dec!(10), None, &policy)
            .unwrap();

        let result = propose(&pending, PartyRole::Requester, dec!(5), None, &policy);
        assert!(matches!(result, Err(RutaError::InvalidNegotiationState(_))));
    }

    #[test]
    fn test_proposer_cannot_resolve_own_proposal() {
        let policy = NegotiationPolicy::default();
        let pending = propose(&assigned_trip(), PartyRole::Worker, dec!(10), None, &policy)
            .unwrap();

        assert!(matches!(
            resolve(&pending, PartyRole::Worker, true, &policy),
            Err(RutaError::InvalidNegotiationState(_))
        ));
    }

    #[test]
    fn test_resolve_without_pending_fails() {
        let policy = NegotiationPolicy::default();
        assert!(matches!(
            resolve(&assigned_trip(), PartyRole::Requester, false, &policy),
            Err(RutaError::InvalidNegotiationState(_))
        ));
    }

    #[test]
    fn test_reproposal_after_resolution_replaces_by_default() {
        let policy = NegotiationPolicy::default();
        let trip = assigned_trip();
        let first = propose(&trip, PartyRole::Worker, dec!(30), None, &policy).unwrap();
        let first = resolve(&first, PartyRole::Requester, true, &policy).unwrap();

        let second = propose(&first, PartyRole::Worker, dec!(10), None, &policy).unwrap();
        let second = resolve(&second, PartyRole::Requester, true, &policy).unwrap();
        assert_eq!(second.top_up_fare, dec!(10));
        assert_eq!(second.total_fare, dec!(160));
    }

    #[test]
    fn test_stacking_policy_adds_top_ups() {
        let policy = NegotiationPolicy {
            stack_top_ups: true,
            ..Default::default()
        };
        let trip = assigned_trip();
        let first = propose(&trip, PartyRole::Worker, dec!(30), None, &policy).unwrap();
        let first = resolve(&first, PartyRole::Requester, true, &policy).unwrap();
        let second = propose(&first, PartyRole::Worker, dec!(10), None, &policy).unwrap();
        let second = resolve(&second, PartyRole::Requester, true, &policy).unwrap();

        assert_eq!(second.top_up_fare, dec!(40));
        assert_eq!(second.total_fare, dec!(190));
    }

    #[test]
    fn test_discount_policy() {
        let trip = assigned_trip();
        let strict = NegotiationPolicy::default();
        assert!(matches!(
            propose(&trip, PartyRole::Requester, dec!(-20), None, &strict),
            Err(RutaError::Validation(_))
        ));

        let lenient = NegotiationPolicy {
            allow_discount: true,
            ..Default::default()
        };
        let pending = propose(&trip, PartyRole::Requester, dec!(-20), None, &lenient).unwrap();
        let accepted = resolve(&pending, PartyRole::Worker, true, &lenient).unwrap();
        assert_eq!(accepted.total_fare, dec!(130));

        assert!(matches!(
            propose(&trip, PartyRole::Requester, dec!(-150), None, &lenient),
            Err(RutaError::Validation(_))
        ));
    }

    #[test]
    fn test_max_top_up() {
        let policy = NegotiationPolicy {
            max_top_up: Some(dec!(50)),
            ..Default::default()
        };
        assert!(propose(&assigned_trip(), PartyRole::Worker, dec!(50), None, &policy).is_ok());
        assert!(matches!(
            propose(&assigned_trip(), PartyRole::Worker, dec!(50.01), None, &policy),
            Err(RutaError::Validation(_))
        ));
    }

    #[test]
    fn test_worker_cannot_propose_before_assignment() {
        let mut trip = assigned_trip();
        trip.status = TripStatus::Requested;
        trip.worker_id = None;
        let policy = NegotiationPolicy::default();

        assert!(matches!(
            propose(&trip, PartyRole::Worker, dec!(10), None, &policy),
            Err(RutaError::InvalidNegotiationState(_))
        ));
        assert!(propose(&trip, PartyRole::Requester, dec!(10), None, &policy).is_ok());
    }

    #[test]
    fn test_no_negotiation_on_terminal_trip() {
        let mut trip = assigned_trip();
        trip.status = TripStatus::Completed;
        assert!(matches!(
            propose(&trip, PartyRole::Worker, dec!(10), None, &NegotiationPolicy::default()),
            Err(RutaError::InvalidNegotiationState(_))
        ));
    }

    #[test]
    fn test_party_role_matches_ids() {
        let trip = assigned_trip();
        let worker = trip.worker_id.unwrap();

        assert_eq!(
            party_role(&trip, &ActorId::Requester(trip.requester_id)).unwrap(),
            PartyRole::Requester
        );
        assert_eq!(party_role(&trip, &ActorId::Worker(worker)).unwrap(), PartyRole::Worker);
        assert!(party_role(&trip, &ActorId::Worker(WorkerId::new())).is_err());
        assert!(party_role(&trip, &ActorId::Admin("ops".into())).is_err());
    }

    #[test]
    fn test_discard_pending() {
        let policy = NegotiationPolicy::default();
        let mut pending =
            propose(&assigned_trip(), PartyRole::Worker, dec!(10), None, &policy).unwrap();
        discard_pending(&mut pending);
        assert_eq!(pending.negotiation.status, NegotiationStatus::Rejected);
        assert_eq!(pending.total_fare, dec!(150));
    }
}
