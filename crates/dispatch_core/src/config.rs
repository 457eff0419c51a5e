//! Dispatch configuration: the `DispatchConfig` singleton from the data model, plus
//! every other enumerated tunable, read from the environment with typed defaults.
//!
//! Values are parsed once at process startup into an immutable `DispatchConfig`; nothing
//! in the domain layer reads the environment directly.

use std::env;
use std::fmt;
use std::str::FromStr;

/// Errors produced while loading configuration from the environment.
#[derive(Debug)]
pub struct ConfigError {
    pub key: &'static str,
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid config for {}: {}", self.key, self.message)
    }
}

impl std::error::Error for ConfigError {}

fn env_or<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError>
where
    T::Err: fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw.parse::<T>().map_err(|e| ConfigError {
            key,
            message: e.to_string(),
        }),
        Err(_) => Ok(default),
    }
}

/// The `DispatchConfig` singleton (§3) plus the anomaly/routing/OTP tunables that
/// §6 enumerates alongside it. Everything here has a documented default so the
/// platform runs sanely with an empty environment.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct DispatchConfig {
    pub weight_eta: f64,
    pub weight_rating: f64,
    pub weight_acceptance: f64,
    pub service_match_bonus: f64,
    pub offer_timeout_sec: u64,
    pub max_offers: u32,
    pub search_radius_km: f64,
    pub max_eta_min: f64,

    pub geohash_precision: usize,

    pub max_jump_km: f64,
    pub max_speed_kmh: f64,
    pub max_deviation_m: f64,
    pub max_deviation_strikes: u32,
    pub auto_arrival_radius_m: f64,

    pub otp_max_per_hour: u32,
    pub otp_lock_threshold: u32,
    pub otp_lock_minutes: i64,
    pub otp_ttl_min: i64,

    pub routing_timeout_ms: u64,
    pub routing_circuit_threshold: u32,
    pub routing_circuit_reset_sec: u64,
    pub routing_cache_ttl_sec: u64,
    pub routing_cache_capacity: usize,

    pub commission_rate: f64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            weight_eta: 0.4,
            weight_rating: 0.25,
            weight_acceptance: 0.25,
            service_match_bonus: 0.1,
            offer_timeout_sec: 30,
            max_offers: 3,
            search_radius_km: 10.0,
            max_eta_min: 20.0,

            geohash_precision: 6,

            max_jump_km: 2.0,
            max_speed_kmh: 180.0,
            max_deviation_m: 500.0,
            max_deviation_strikes: 3,
            auto_arrival_radius_m: 50.0,

            otp_max_per_hour: 3,
            otp_lock_threshold: 5,
            otp_lock_minutes: 60,
            otp_ttl_min: 5,

            routing_timeout_ms: 5_000,
            routing_circuit_threshold: 5,
            routing_circuit_reset_sec: 60,
            routing_cache_ttl_sec: 30,
            routing_cache_capacity: 1_000,

            commission_rate: 0.20,
        }
    }
}

impl DispatchConfig {
    /// Load configuration from environment variables, falling back to the defaults
    /// above for anything unset. Matches §6's enumerated configuration list.
    pub fn from_env() -> Result<Self, ConfigError> {
        let d = Self::default();
        Ok(Self {
            weight_eta: env_or("DISPATCH_WEIGHT_ETA", d.weight_eta)?,
            weight_rating: env_or("DISPATCH_WEIGHT_RATING", d.weight_rating)?,
            weight_acceptance: env_or("DISPATCH_WEIGHT_ACCEPTANCE", d.weight_acceptance)?,
            service_match_bonus: env_or("DISPATCH_SERVICE_MATCH_BONUS", d.service_match_bonus)?,
            offer_timeout_sec: env_or("OFFER_TIMEOUT_SEC", d.offer_timeout_sec)?,
            max_offers: env_or("MAX_OFFERS", d.max_offers)?,
            search_radius_km: env_or("SEARCH_RADIUS_KM", d.search_radius_km)?,
            max_eta_min: env_or("DISPATCH_MAX_ETA_MIN", d.max_eta_min)?,

            geohash_precision: env_or("GEOHASH_PRECISION", d.geohash_precision)?,

            max_jump_km: env_or("MAX_JUMP_KM", d.max_jump_km)?,
            max_speed_kmh: env_or("MAX_SPEED_KMH", d.max_speed_kmh)?,
            max_deviation_m: env_or("MAX_DEVIATION_M", d.max_deviation_m)?,
            max_deviation_strikes: env_or("MAX_DEVIATION_STRIKES", d.max_deviation_strikes)?,
            auto_arrival_radius_m: env_or("AUTO_ARRIVAL_RADIUS_M", d.auto_arrival_radius_m)?,

            otp_max_per_hour: env_or("OTP_MAX_PER_HOUR", d.otp_max_per_hour)?,
            otp_lock_threshold: env_or("OTP_LOCK_THRESHOLD", d.otp_lock_threshold)?,
            otp_lock_minutes: env_or("OTP_LOCK_MINUTES", d.otp_lock_minutes)?,
            otp_ttl_min: env_or("OTP_TTL_MIN", d.otp_ttl_min)?,

            routing_timeout_ms: env_or("ROUTING_TIMEOUT_MS", d.routing_timeout_ms)?,
            routing_circuit_threshold: env_or(
                "ROUTING_CIRCUIT_THRESHOLD",
                d.routing_circuit_threshold,
            )?,
            routing_circuit_reset_sec: env_or(
                "ROUTING_CIRCUIT_RESET_SEC",
                d.routing_circuit_reset_sec,
            )?,
            routing_cache_ttl_sec: env_or("ROUTING_CACHE_TTL_SEC", d.routing_cache_ttl_sec)?,
            routing_cache_capacity: env_or(
                "ROUTING_CACHE_CAPACITY",
                d.routing_cache_capacity,
            )?,

            commission_rate: env_or("COMMISSION_RATE", d.commission_rate)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let c = DispatchConfig::default();
        assert_eq!(c.offer_timeout_sec, 30);
        assert_eq!(c.max_offers, 3);
        assert_eq!(c.search_radius_km, 10.0);
        assert_eq!(c.geohash_precision, 6);
        assert_eq!(c.otp_max_per_hour, 3);
        assert_eq!(c.otp_lock_threshold, 5);
        assert_eq!(c.otp_lock_minutes, 60);
        assert_eq!(c.routing_circuit_threshold, 5);
        assert_eq!(c.routing_circuit_reset_sec, 60);
        assert_eq!(c.commission_rate, 0.20);
    }

    #[test]
    fn from_env_overrides_default() {
        env::set_var("MAX_OFFERS", "7");
        let c = DispatchConfig::from_env().expect("config loads");
        assert_eq!(c.max_offers, 7);
        env::remove_var("MAX_OFFERS");
    }
}
