use std::env;
use std::time::Duration;

use crate::error::DispatchError;
use crate::models::address::GeoPoint;
use crate::regions::RegionTable;

#[derive(Debug, Clone, Copy)]
pub struct DistanceThresholds {
    pub local_km: f64,
    pub regional_km: f64,
    pub national_km: f64,
}

#[derive(Debug, Clone, Copy)]
pub struct DeliveryHours {
    pub local: u32,
    pub regional: u32,
    pub national: u32,
    pub international: u32,
}

#[derive(Debug, Clone)]
pub struct DispatchConfig {
    pub origin: GeoPoint,
    pub home_province: String,
    pub home_district_fallback: String,
    // Whether an unrecognized home-region district falls back to the
    // store's own district instead of failing the parse.
    pub fallback_to_home_district: bool,
    pub thresholds: DistanceThresholds,
    pub delivery_hours: DeliveryHours,
    // Assumed km when coordinates are missing.
    pub same_region_fallback_km: f64,
    pub cross_region_fallback_km: f64,
    pub express_priority_min: u8,
    pub assignment_retry_limit: usize,
    pub batch_size: usize,
    pub max_zones_per_shipper: usize,
    pub lock_wait: Duration,
    pub sweep_interval: Duration,
    // Store-local midnight as a UTC offset, for the daily counter reset.
    pub day_boundary_offset_hours: i32,
    pub regions: RegionTable,
    pub log_level: String,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            origin: GeoPoint {
                lat: 21.0278,
                lng: 105.8342,
            },
            home_province: "Hà Nội".to_string(),
            home_district_fallback: "Cầu Giấy".to_string(),
            fallback_to_home_district: true,
            thresholds: DistanceThresholds {
                local_km: 50.0,
                regional_km: 200.0,
                national_km: 1000.0,
            },
            delivery_hours: DeliveryHours {
                local: 2,
                regional: 6,
                national: 24,
                international: 72,
            },
            same_region_fallback_km: 200.0,
            cross_region_fallback_km: 1500.0,
            express_priority_min: 5,
            assignment_retry_limit: 3,
            batch_size: 5,
            max_zones_per_shipper: 25,
            lock_wait: Duration::from_secs(10),
            sweep_interval: Duration::from_secs(30 * 60),
            day_boundary_offset_hours: 7,
            regions: RegionTable::vietnam(),
            log_level: "info".to_string(),
        }
    }
}

impl DispatchConfig {
    pub fn from_env() -> Result<Self, DispatchError> {
        let _ = dotenvy::dotenv();
        let base = Self::default();

        Ok(Self {
            origin: GeoPoint {
                lat: parse_or_default("DISPATCH_ORIGIN_LAT", base.origin.lat)?,
                lng: parse_or_default("DISPATCH_ORIGIN_LNG", base.origin.lng)?,
            },
            fallback_to_home_district: parse_or_default(
                "DISPATCH_DISTRICT_FALLBACK",
                base.fallback_to_home_district,
            )?,
            express_priority_min: parse_or_default(
                "DISPATCH_EXPRESS_MIN_PRIORITY",
                base.express_priority_min,
            )?,
            assignment_retry_limit: parse_or_default(
                "DISPATCH_RETRY_LIMIT",
                base.assignment_retry_limit,
            )?,
            batch_size: parse_or_default("DISPATCH_BATCH_SIZE", base.batch_size)?,
            lock_wait: Duration::from_secs(parse_or_default("DISPATCH_LOCK_WAIT_SECS", 10)?),
            sweep_interval: Duration::from_secs(parse_or_default(
                "DISPATCH_SWEEP_INTERVAL_SECS",
                30 * 60,
            )?),
            day_boundary_offset_hours: parse_or_default(
                "DISPATCH_DAY_OFFSET_HOURS",
                base.day_boundary_offset_hours,
            )?,
            log_level: env::var("DISPATCH_LOG_LEVEL").unwrap_or_else(|_| base.log_level.clone()),
            ..base
        })
    }
}

fn parse_or_default<T>(key: &str, default: T) -> Result<T, DispatchError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|err| DispatchError::Config(format!("invalid {key}: {err}"))),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::DispatchConfig;

    #[test]
    fn default_carries_the_deployed_store() {
        let config = DispatchConfig::default();

        assert_eq!(config.home_province, "Hà Nội");
        assert_eq!(config.thresholds.local_km, 50.0);
        assert_eq!(config.delivery_hours.international, 72);
        assert_eq!(config.assignment_retry_limit, 3);
        assert_eq!(config.max_zones_per_shipper, 25);
        assert!(config.regions.is_home_district("dong da"));
    }
}
