//! # Ruta Dispatch
//!
//! Trip lifecycle, assignment, and fare negotiation for rides and deliveries.
//!
//! ## Lifecycle
//!
//! ```text
//! ride:      requested ─► accepted ─► arrived   ─► in_progress ─► completed
//! delivery:  requested ─► accepted ─► picked_up ─► in_transit  ─► delivered
//!                 └───────────┴───────────┴──────────────┴──────► cancelled
//! ```
//!
//! Accepting a trip charges the worker's wallet the platform fee. Several workers may
//! race for the same trip; exactly one wins, and only the winner is charged.
//!
//! Workers must be KYC-approved for the trip kind and able to pay at least one fee
//! before they can see or accept requests.

pub mod config;
pub mod dispatcher;
pub mod events;
pub mod kyc;
pub mod metrics;
pub mod negotiation;
pub mod store;

pub use config::{DispatchConfig, FeeSchedule, KycRequirements};
pub use dispatcher::{
    Dispatcher, NewTrip, WorkerAvailability, NO_SHOW_PENALTY_REFERENCE, PLATFORM_FEE_REFERENCE,
};
pub use events::{EventBus, TripChange, TripEvent};
pub use kyc::{DocumentStatus, DocumentType, InMemoryKycRegistry, KycGate};
pub use metrics::DispatchMetrics;
pub use negotiation::NegotiationPolicy;
pub use store::{CasOutcome, InMemoryTripStore, TripStore};
