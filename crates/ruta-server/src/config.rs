//! Server configuration

use std::str::FromStr;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use ruta_dispatch::DispatchConfig;

/// Ruta server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Service host
    pub host: String,
    /// Service port
    pub port: u16,
    /// Fees, KYC requirements and negotiation limits
    pub dispatch: DispatchConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            dispatch: DispatchConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from `.env` and the environment
    pub fn load() -> Result<Self> {
        let _ = dotenvy::dotenv();
        Ok(Self::from_lookup(|key| std::env::var(key).ok()))
    }

    /// Overlay defaults with whatever `lookup` returns. Unparseable values are ignored.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();

        if let Some(host) = lookup("RUTA_HOST") {
            cfg.host = host;
        }
        if let Some(port) = get(&lookup, "RUTA_PORT") {
            cfg.port = port;
        }
        // Platform-assigned PORT wins over RUTA_PORT
        if let Some(port) = get(&lookup, "PORT") {
            cfg.port = port;
        }

        // Fees
        let fees = &mut cfg.dispatch.fees;
        if let Some(fee) = get(&lookup, "RUTA_PLATFORM_FEE") {
            fees.ride_platform_fee = fee;
            fees.delivery_platform_fee = fee;
        }
        if let Some(fee) = get(&lookup, "RUTA_RIDE_PLATFORM_FEE") {
            fees.ride_platform_fee = fee;
        }
        if let Some(fee) = get(&lookup, "RUTA_DELIVERY_PLATFORM_FEE") {
            fees.delivery_platform_fee = fee;
        }
        if let Some(penalty) = get(&lookup, "RUTA_NO_SHOW_PENALTY") {
            fees.no_show_penalty = penalty;
        }

        // Ledger
        if let Some(trips) = get(&lookup, "RUTA_LOW_BALANCE_TRIPS") {
            cfg.dispatch.ledger.low_balance_trips = trips;
        }

        // Negotiation
        let negotiation = &mut cfg.dispatch.negotiation;
        if let Some(allow) = get(&lookup, "RUTA_ALLOW_DISCOUNT") {
            negotiation.allow_discount = allow;
        }
        if let Some(max) = get(&lookup, "RUTA_MAX_TOP_UP") {
            negotiation.max_top_up = Some(max);
        }
        if let Some(stack) = get(&lookup, "RUTA_STACK_TOP_UPS") {
            negotiation.stack_top_ups = stack;
        }

        // Dispatch internals
        if let Some(capacity) = get(&lookup, "RUTA_EVENT_CAPACITY") {
            cfg.dispatch.event_capacity = capacity;
        }
        if let Some(retries) = get(&lookup, "RUTA_MAX_CONFLICT_RETRIES") {
            cfg.dispatch.max_conflict_retries = retries;
        }

        cfg
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn get<T, F>(lookup: &F, key: &str) -> Option<T>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    lookup(key).and_then(|raw| raw.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ruta_common::TripKind;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> ServerConfig {
        let env: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServerConfig::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let cfg = load(&[]);
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.dispatch.fees.platform_fee(TripKind::Ride), dec!(5));
        assert_eq!(cfg.dispatch.fees.no_show_penalty, dec!(20));
    }

    #[test]
    fn test_port_takes_priority() {
        let cfg = load(&[("RUTA_PORT", "9000"), ("PORT", "3000")]);
        assert_eq!(cfg.port, 3000);

        let cfg = load(&[("RUTA_PORT", "9000")]);
        assert_eq!(cfg.port, 9000);
    }

    #[test]
    fn test_fee_overrides() {
        let cfg = load(&[
            ("RUTA_PLATFORM_FEE", "7.50"),
            ("RUTA_DELIVERY_PLATFORM_FEE", "4"),
            ("RUTA_NO_SHOW_PENALTY", "25"),
        ]);
        assert_eq!(cfg.dispatch.fees.platform_fee(TripKind::Ride), dec!(7.50));
        assert_eq!(cfg.dispatch.fees.platform_fee(TripKind::Delivery), dec!(4));
        assert_eq!(cfg.dispatch.fees.no_show_penalty, dec!(25));
    }

    #[test]
    fn test_negotiation_overrides() {
        let cfg = load(&[
            ("RUTA_ALLOW_DISCOUNT", "true"),
            ("RUTA_MAX_TOP_UP", "100"),
            ("RUTA_STACK_TOP_UPS", "true"),
        ]);
        assert!(cfg.dispatch.negotiation.allow_discount);
        assert_eq!(cfg.dispatch.negotiation.max_top_up, Some(dec!(100)));
        assert!(cfg.dispatch.negotiation.stack_top_ups);
    }

    #[test]
    fn test_invalid_values_keep_defaults() {
        let cfg = load(&[("PORT", "not-a-port"), ("RUTA_PLATFORM_FEE", "five")]);
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.dispatch.fees.platform_fee(TripKind::Ride), dec!(5));
    }
}
