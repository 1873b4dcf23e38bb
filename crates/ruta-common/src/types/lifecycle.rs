//! Trip lifecycle
//!
//! The transition table below is the only place that decides whether a status change
//! is legal. Rides and deliveries share the entry (`requested -> accepted`) and exit
//! (`cancelled`) edges and differ in the middle:
//!
//! ```text
//! ride:      requested -> accepted -> arrived   -> in_progress -> completed
//! delivery:  requested -> accepted -> picked_up -> in_transit  -> delivered
//!            (any non-terminal status) -> cancelled
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Ride or delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TripKind {
    Ride,
    Delivery,
}

impl TripKind {
    pub const ALL: [TripKind; 2] = [TripKind::Ride, TripKind::Delivery];

    pub fn as_str(&self) -> &'static str {
        match self {
            TripKind::Ride => "ride",
            TripKind::Delivery => "delivery",
        }
    }

    /// Status that closes a trip successfully
    pub fn completion_status(&self) -> TripStatus {
        match self {
            TripKind::Ride => TripStatus::Completed,
            TripKind::Delivery => TripStatus::Delivered,
        }
    }
}

impl fmt::Display for TripKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TripKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ride" => Ok(TripKind::Ride),
            "delivery" => Ok(TripKind::Delivery),
            other => Err(format!("unknown trip kind: {}", other)),
        }
    }
}

/// Lifecycle status shared by rides and deliveries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TripStatus {
    Requested,
    #[serde(alias = "assigned")]
    Accepted,
    // Ride only
    Arrived,
    InProgress,
    Completed,
    // Delivery only
    PickedUp,
    InTransit,
    Delivered,
    Cancelled,
}

impl TripStatus {
    pub const ALL: [TripStatus; 9] = [
        TripStatus::Requested,
        TripStatus::Accepted,
        TripStatus::Arrived,
        TripStatus::InProgress,
        TripStatus::Completed,
        TripStatus::PickedUp,
        TripStatus::InTransit,
        TripStatus::Delivered,
        TripStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TripStatus::Requested => "requested",
            TripStatus::Accepted => "accepted",
            TripStatus::Arrived => "arrived",
            TripStatus::InProgress => "in_progress",
            TripStatus::Completed => "completed",
            TripStatus::PickedUp => "picked_up",
            TripStatus::InTransit => "in_transit",
            TripStatus::Delivered => "delivered",
            TripStatus::Cancelled => "cancelled",
        }
    }

    /// No outgoing edges
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TripStatus::Completed | TripStatus::Delivered | TripStatus::Cancelled
        )
    }

    /// Past `requested`, so a worker must be attached
    #[inline]
    pub fn requires_worker(&self) -> bool {
        !matches!(self, TripStatus::Requested)
    }
}

impl fmt::Display for TripStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TripStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "assigned" {
            return Ok(TripStatus::Accepted);
        }
        TripStatus::ALL
            .iter()
            .find(|status| status.as_str() == s)
            .copied()
            .ok_or_else(|| format!("unknown trip status: {}", s))
    }
}

/// Statuses reachable in one step from `from` for a trip of `kind`
pub fn next_statuses(kind: TripKind, from: TripStatus) -> &'static [TripStatus] {
    use TripStatus::*;

    match (kind, from) {
        (_, Requested) => &[Accepted, Cancelled],

        (TripKind::Ride, Accepted) => &[Arrived, Cancelled],
        (TripKind::Ride, Arrived) => &[InProgress, Cancelled],
        (TripKind::Ride, InProgress) => &[Completed, Cancelled],

        (TripKind::Delivery, Accepted) => &[PickedUp, Cancelled],
        (TripKind::Delivery, PickedUp) => &[InTransit, Cancelled],
        (TripKind::Delivery, InTransit) => &[Delivered, Cancelled],

        // Terminal, or a status that belongs to the other kind
        _ => &[],
    }
}

/// Pure lookup against the transition table
#[inline]
pub fn can_transition(kind: TripKind, from: TripStatus, to: TripStatus) -> bool {
    next_statuses(kind, from).contains(&to)
}
