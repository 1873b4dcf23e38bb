//! Trip request types
//!
//! Rides and deliveries share one record shape, discriminated by [`TripKind`].
//! Fare fields are kept consistent by [`TripRequest::set_top_up`]; lifecycle fields
//! are only ever changed by the dispatcher through a version-conditioned write.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::ids::{ActorId, RequesterId, TripId, WorkerId};
use super::lifecycle::{TripKind, TripStatus};

/// Geographic point with an optional human-readable address
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub lat: f64,
    pub lng: f64,
    #[serde(default)]
    pub address: Option<String>,
}

impl Location {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self {
            lat,
            lng,
            address: None,
        }
    }

    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    pub fn is_valid(&self) -> bool {
        (-90.0..=90.0).contains(&self.lat) && (-180.0..=180.0).contains(&self.lng)
    }
}

/// Pickup and drop-off
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    pub pickup: Location,
    pub dropoff: Location,
}

impl Route {
    pub fn new(pickup: Location, dropoff: Location) -> Self {
        Self { pickup, dropoff }
    }
}

/// What a courier carries on a delivery
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parcel {
    pub description: String,
    #[serde(default)]
    pub weight_kg: Option<Decimal>,
    #[serde(default)]
    pub recipient_name: Option<String>,
    #[serde(default)]
    pub recipient_phone: Option<String>,
}

/// Side of a trip
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartyRole {
    Requester,
    Worker,
}

impl PartyRole {
    pub fn counterparty(&self) -> PartyRole {
        match self {
            PartyRole::Requester => PartyRole::Worker,
            PartyRole::Worker => PartyRole::Requester,
        }
    }
}

impl fmt::Display for PartyRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PartyRole::Requester => f.write_str("requester"),
            PartyRole::Worker => f.write_str("worker"),
        }
    }
}

/// Negotiation progress
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NegotiationStatus {
    #[default]
    None,
    Pending,
    Accepted,
    Rejected,
}

impl NegotiationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NegotiationStatus::None => "none",
            NegotiationStatus::Pending => "pending",
            NegotiationStatus::Accepted => "accepted",
            NegotiationStatus::Rejected => "rejected",
        }
    }
}

impl fmt::Display for NegotiationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Top-up counter-offer embedded in a trip
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NegotiationState {
    pub status: NegotiationStatus,
    /// Who opened the current (or last) proposal
    pub proposer: Option<PartyRole>,
    pub proposed_top_up: Option<Decimal>,
    pub notes: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl NegotiationState {
    #[inline]
    pub fn is_pending(&self) -> bool {
        self.status == NegotiationStatus::Pending
    }
}

/// Why a trip was cancelled
///
/// The `timed_out_*_no_show` codes are recognized and may carry a ledger penalty;
/// anything else is kept verbatim as free text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum CancellationReason {
    DriverNoShow,
    CourierNoShow,
    PassengerNoShow,
    SenderNoShow,
    Other(String),
}

impl CancellationReason {
    pub fn parse(reason: &str) -> Self {
        match reason.trim() {
            "timed_out_driver_no_show" => CancellationReason::DriverNoShow,
            "timed_out_courier_no_show" => CancellationReason::CourierNoShow,
            "timed_out_passenger_no_show" => CancellationReason::PassengerNoShow,
            "timed_out_sender_no_show" => CancellationReason::SenderNoShow,
            other => CancellationReason::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            CancellationReason::DriverNoShow => "timed_out_driver_no_show",
            CancellationReason::CourierNoShow => "timed_out_courier_no_show",
            CancellationReason::PassengerNoShow => "timed_out_passenger_no_show",
            CancellationReason::SenderNoShow => "timed_out_sender_no_show",
            CancellationReason::Other(text) => text,
        }
    }

    /// Party at fault for a recognized no-show, `None` for free text
    pub fn at_fault(&self) -> Option<PartyRole> {
        match self {
            CancellationReason::DriverNoShow | CancellationReason::CourierNoShow => {
                Some(PartyRole::Worker)
            }
            CancellationReason::PassengerNoShow | CancellationReason::SenderNoShow => {
                Some(PartyRole::Requester)
            }
            CancellationReason::Other(_) => None,
        }
    }

    pub fn is_no_show(&self) -> bool {
        self.at_fault().is_some()
    }
}

impl From<String> for CancellationReason {
    fn from(reason: String) -> Self {
        CancellationReason::parse(&reason)
    }
}

impl From<CancellationReason> for String {
    fn from(reason: CancellationReason) -> Self {
        reason.as_str().to_string()
    }
}

impl fmt::Display for CancellationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A ride or delivery request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TripRequest {
    pub id: TripId,
    pub requester_id: RequesterId,
    /// Set iff `status` is past `requested`
    pub worker_id: Option<WorkerId>,
    pub kind: TripKind,
    pub status: TripStatus,
    pub route: Route,
    pub parcel: Option<Parcel>,

    pub base_fare: Decimal,
    pub top_up_fare: Decimal,
    /// Always `base_fare + top_up_fare`
    pub total_fare: Decimal,
    pub platform_fee_charged: bool,

    pub negotiation: NegotiationState,

    pub cancellation_reason: Option<CancellationReason>,
    pub cancelled_by: Option<ActorId>,

    pub created_at: DateTime<Utc>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,

    /// Optimistic lock, bumped by the store on every committed write
    pub version: u64,
}

impl TripRequest {
    /// Create a new unassigned request
    pub fn new(requester_id: RequesterId, kind: TripKind, route: Route, base_fare: Decimal) -> Self {
        let now = Utc::now();
        Self {
            id: TripId::new(),
            requester_id,
            worker_id: None,
            kind,
            status: TripStatus::Requested,
            route,
            parcel: None,
            base_fare,
            top_up_fare: Decimal::ZERO,
            total_fare: base_fare,
            platform_fee_charged: false,
            negotiation: NegotiationState::default(),
            cancellation_reason: None,
            cancelled_by: None,
            created_at: now,
            accepted_at: None,
            completed_at: None,
            cancelled_at: None,
            updated_at: now,
            version: 0,
        }
    }

    pub fn with_parcel(mut self, parcel: Parcel) -> Self {
        self.parcel = Some(parcel);
        self
    }

    /// Still waiting for a worker
    #[inline]
    pub fn is_open(&self) -> bool {
        self.status == TripStatus::Requested && self.worker_id.is_none()
    }

    #[inline]
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Replace the top-up and keep `total_fare` in step
    pub fn set_top_up(&mut self, top_up: Decimal) {
        self.top_up_fare = top_up;
        self.total_fare = self.base_fare + self.top_up_fare;
    }

    /// `worker_id` is set exactly when the status is past `requested`. A trip
    /// cancelled before anyone accepted it stays unassigned.
    pub fn assignment_consistent(&self) -> bool {
        self.worker_id.is_some() == self.status.requires_worker()
            || (self.status == TripStatus::Cancelled && self.worker_id.is_none())
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn route() -> Route {
        Route::new(
            Location::new(14.5995, 120.9842).with_address("Ermita, Manila"),
            Location::new(14.5547, 121.0244),
        )
    }

    #[test]
    fn test_new_trip_is_open() {
        let trip = TripRequest::new(RequesterId::new(), TripKind::Ride, route(), dec!(120));
        assert!(trip.is_open());
        assert_eq!(trip.total_fare, dec!(120));
        assert_eq!(trip.negotiation.status, NegotiationStatus::None);
        assert_eq!(trip.version, 0);
        assert!(trip.assignment_consistent());
    }

    #[test]
    fn test_set_top_up_recomputes_total() {
        let mut trip = TripRequest::new(RequesterId::new(), TripKind::Delivery, route(), dec!(80));
        trip.set_top_up(dec!(25.50));
        assert_eq!(trip.total_fare, dec!(105.50));
        trip.set_top_up(Decimal::ZERO);
        assert_eq!(trip.total_fare, dec!(80));
    }

    #[test]
    fn test_cancellation_reason_codes() {
        let reason = CancellationReason::parse("timed_out_driver_no_show");
        assert_eq!(reason, CancellationReason::DriverNoShow);
        assert_eq!(reason.at_fault(), Some(PartyRole::Worker));

        let reason = CancellationReason::parse("timed_out_sender_no_show");
        assert_eq!(reason.at_fault(), Some(PartyRole::Requester));

        let reason = CancellationReason::parse("changed my mind");
        assert!(!reason.is_no_show());
        assert_eq!(reason.as_str(), "changed my mind");
    }

    #[test]
    fn test_cancellation_reason_serializes_as_code() {
        let json = serde_json::to_string(&CancellationReason::CourierNoShow).unwrap();
        assert_eq!(json, "\"timed_out_courier_no_show\"");
        let back: CancellationReason = serde_json::from_str(&json).unwrap();
        assert_eq!(back, CancellationReason::CourierNoShow);
    }

    #[test]
    fn test_location_bounds() {
        assert!(Location::new(14.6, 121.0).is_valid());
        assert!(!Location::new(91.0, 0.0).is_valid());
        assert!(!Location::new(0.0, -181.0).is_valid());
    }

    #[test]
    fn test_counterparty() {
        assert_eq!(PartyRole::Requester.counterparty(), PartyRole::Worker);
        assert_eq!(PartyRole::Worker.counterparty(), PartyRole::Requester);
    }
}
