use crate::address::normalize;
use crate::config::DispatchConfig;
use crate::models::address::{GeoPoint, StructuredAddress};
use crate::models::assignment::{DeliveryMethod, DistanceProfile, DistanceType};

const EARTH_RADIUS_KM: f64 = 6_371.0;

pub fn haversine_km(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let delta_lat = (b.lat - a.lat).to_radians();
    let delta_lng = (b.lng - a.lng).to_radians();

    let sin_lat = (delta_lat / 2.0).sin();
    let sin_lng = (delta_lng / 2.0).sin();

    let haversine = sin_lat * sin_lat + lat1.cos() * lat2.cos() * sin_lng * sin_lng;
    let central_angle = 2.0 * haversine.sqrt().asin();

    EARTH_RADIUS_KM * central_angle
}

// Great-circle distance when the customer pinned coordinates; otherwise
// the administrative heuristic in `administrative_distance_km`.
pub fn classify(config: &DispatchConfig, address: &StructuredAddress) -> DistanceProfile {
    let distance_km = match address.location {
        Some(destination) => haversine_km(&config.origin, &destination),
        None => administrative_distance_km(config, address),
    };

    let thresholds = config.thresholds;
    let hours = config.delivery_hours;
    let (distance_type, delivery_method, estimated_hours) = if distance_km <= thresholds.local_km {
        (DistanceType::Local, DeliveryMethod::LocalShipper, hours.local)
    } else if distance_km <= thresholds.regional_km {
        (
            DistanceType::Regional,
            DeliveryMethod::LocalShipper,
            hours.regional,
        )
    } else if distance_km <= thresholds.national_km {
        (
            DistanceType::National,
            DeliveryMethod::ExpressShipping,
            hours.national,
        )
    } else {
        (
            DistanceType::International,
            DeliveryMethod::ThirdParty,
            hours.international,
        )
    };

    DistanceProfile {
        distance_type,
        delivery_method,
        estimated_hours,
        distance_km,
    }
}

fn administrative_distance_km(config: &DispatchConfig, address: &StructuredAddress) -> f64 {
    let province_norm = normalize(&address.province);
    let home_norm = normalize(&config.home_province);
    if province_norm == home_norm {
        return 0.0;
    }

    let regions = &config.regions;
    match (
        regions.macro_region(&home_norm),
        regions.macro_region(&province_norm),
    ) {
        (Some(home), Some(other)) if home == other => config.same_region_fallback_km,
        _ => config.cross_region_fallback_km,
    }
}
