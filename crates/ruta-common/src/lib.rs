//! # Ruta Common
//!
//! Shared types, errors, and the trip lifecycle table for the Ruta dispatch core.
//!
//! ## Core Types
//!
//! - [`TripRequest`]: a ride or delivery, discriminated by [`TripKind`]
//! - [`TripStatus`]: closed lifecycle enum, guarded by [`can_transition`]
//! - [`NegotiationState`]: embedded top-up counter-offer
//! - [`WalletAccount`]/[`WalletTransaction`]: prepaid worker balance and its history
//!
//! ## Identifiers
//!
//! [`TripId`], [`WorkerId`], [`RequesterId`] and [`TransactionId`] are UUIDv7 newtypes.

pub mod error;
pub mod types;

// Re-export commonly used types at crate root
pub use error::{Result, RutaError};
pub use types::{
    ids::{ActorId, RequesterId, TransactionId, TripId, WorkerId},
    lifecycle::{can_transition, next_statuses, TripKind, TripStatus},
    trip::{
        CancellationReason, Location, NegotiationState, NegotiationStatus, Parcel, PartyRole,
        Route, TripRequest,
    },
    wallet::{TransactionType, WalletAccount, WalletTransaction},
};

/// Ruta version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Currency code for every amount handled by the core
pub const CURRENCY: &str = "PHP";
