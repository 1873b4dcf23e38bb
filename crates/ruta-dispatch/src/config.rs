//! Dispatch configuration

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use ruta_common::TripKind;
use ruta_ledger::LedgerConfig;

use crate::events::DEFAULT_EVENT_CAPACITY;
use crate::kyc::DocumentType;
use crate::negotiation::NegotiationPolicy;

/// Default platform fee per assigned trip
pub const DEFAULT_PLATFORM_FEE: Decimal = Decimal::from_parts(5, 0, 0, false, 0);

/// Default penalty for a worker no-show
pub const DEFAULT_NO_SHOW_PENALTY: Decimal = Decimal::from_parts(20, 0, 0, false, 0);

/// Default bound on optimistic-lock retries per command
pub const DEFAULT_MAX_CONFLICT_RETRIES: u32 = 16;

/// Amounts charged against worker wallets
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeeSchedule {
    pub ride_platform_fee: Decimal,
    pub delivery_platform_fee: Decimal,
    pub no_show_penalty: Decimal,
}

impl FeeSchedule {
    pub fn platform_fee(&self, kind: TripKind) -> Decimal {
        match kind {
            TripKind::Ride => self.ride_platform_fee,
            TripKind::Delivery => self.delivery_platform_fee,
        }
    }
}

impl Default for FeeSchedule {
    fn default() -> Self {
        Self {
            ride_platform_fee: DEFAULT_PLATFORM_FEE,
            delivery_platform_fee: DEFAULT_PLATFORM_FEE,
            no_show_penalty: DEFAULT_NO_SHOW_PENALTY,
        }
    }
}

/// Documents a worker needs approved per trip kind
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KycRequirements {
    pub ride: Vec<DocumentType>,
    pub delivery: Vec<DocumentType>,
}

impl KycRequirements {
    pub fn required_for(&self, kind: TripKind) -> &[DocumentType] {
        match kind {
            TripKind::Ride => &self.ride,
            TripKind::Delivery => &self.delivery,
        }
    }
}

impl Default for KycRequirements {
    fn default() -> Self {
        Self {
            ride: vec![
                DocumentType::DriversLicense,
                DocumentType::GovernmentId,
                DocumentType::VehicleRegistration,
            ],
            delivery: vec![DocumentType::DriversLicense, DocumentType::GovernmentId],
        }
    }
}

/// Dispatch configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    pub fees: FeeSchedule,
    pub kyc: KycRequirements,
    pub negotiation: NegotiationPolicy,
    pub ledger: LedgerConfig,
    /// Broadcast buffer of the live-update channel
    pub event_capacity: usize,
    /// Optimistic-lock retries before a command gives up with `Conflict`
    pub max_conflict_retries: u32,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            fees: FeeSchedule::default(),
            kyc: KycRequirements::default(),
            negotiation: NegotiationPolicy::default(),
            ledger: LedgerConfig::default(),
            event_capacity: DEFAULT_EVENT_CAPACITY,
            max_conflict_retries: DEFAULT_MAX_CONFLICT_RETRIES,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_default_fees() {
        let fees = FeeSchedule::default();
        assert_eq!(fees.platform_fee(TripKind::Ride), dec!(5));
        assert_eq!(fees.platform_fee(TripKind::Delivery), dec!(5));
        assert_eq!(fees.no_show_penalty, dec!(20));
    }

    #[test]
    fn test_rides_need_vehicle_registration() {
        let kyc = KycRequirements::default();
        assert!(kyc
            .required_for(TripKind::Ride)
            .contains(&DocumentType::VehicleRegistration));
        assert!(!kyc
            .required_for(TripKind::Delivery)
            .contains(&DocumentType::VehicleRegistration));
    }
}
