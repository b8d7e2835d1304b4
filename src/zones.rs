use crate::address::normalize;
use crate::config::DispatchConfig;
use crate::error::DispatchError;
use crate::models::address::StructuredAddress;
use crate::models::zone::ServiceZone;

pub const NO_COVERAGE_RANK: u32 = 999;

pub fn zone_covers(config: &DispatchConfig, zone: &ServiceZone, address: &StructuredAddress) -> bool {
    let zone_province = normalize(&zone.province);
    let addr_province = normalize(&address.province);
    if zone_province.is_empty() || zone_province != addr_province {
        return false;
    }

    let zone_district = normalize(&zone.district);
    let addr_district = normalize(&address.district);

    // Operator shorthand pairs outrank every other rule.
    if !zone_district.is_empty()
        && !addr_district.is_empty()
        && config.regions.is_alias_pair(&zone_district, &addr_district)
    {
        return true;
    }

    let home = normalize(&config.home_province);
    if zone_province == home {
        // An empty district means the whole home region; the abbreviation
        // table joins equality and containment.
        if zone_district.is_empty() {
            return true;
        }
        districts_match(config, &zone_district, &addr_district)
    } else {
        if zone_district.is_empty() {
            return true;
        }
        !addr_district.is_empty()
            && (zone_district == addr_district
                || zone_district.contains(&addr_district)
                || addr_district.contains(&zone_district))
    }
}

fn districts_match(config: &DispatchConfig, zone_district: &str, addr_district: &str) -> bool {
    if addr_district.is_empty() {
        return false;
    }
    if zone_district == addr_district
        || zone_district.contains(addr_district)
        || addr_district.contains(zone_district)
    {
        return true;
    }

    let regions = &config.regions;
    let zone_full = regions.expand_abbreviation(zone_district).unwrap_or(zone_district);
    let addr_full = regions.expand_abbreviation(addr_district).unwrap_or(addr_district);
    zone_full == addr_full
}

// 0 ward+district+province, 1 district+province, 2 province-only; best
// rank across the zone set wins.
pub fn distance_rank(
    config: &DispatchConfig,
    zones: &[ServiceZone],
    address: &StructuredAddress,
) -> u32 {
    let addr_ward = normalize(&address.ward);

    zones
        .iter()
        .filter(|zone| zone_covers(config, zone, address))
        .map(|zone| {
            if normalize(&zone.district).is_empty() {
                return 2;
            }
            let zone_ward = normalize(&zone.ward);
            if !zone_ward.is_empty() && !addr_ward.is_empty() && zone_ward == addr_ward {
                0
            } else {
                1
            }
        })
        .min()
        .unwrap_or(NO_COVERAGE_RANK)
}

pub fn validate_zones(config: &DispatchConfig, zones: &[ServiceZone]) -> Result<(), DispatchError> {
    if zones.len() > config.max_zones_per_shipper {
        return Err(DispatchError::InvalidZones(format!(
            "{} zones exceed the limit of {}",
            zones.len(),
            config.max_zones_per_shipper
        )));
    }

    let regions = &config.regions;
    let home = normalize(&config.home_province);
    for zone in zones {
        let province = normalize(&zone.province);
        if province.is_empty() {
            return Err(DispatchError::InvalidZones(
                "zone with empty province".to_string(),
            ));
        }
        if regions.canonical_province(&province).is_none() {
            return Err(DispatchError::InvalidZones(format!(
                "unrecognized province \"{}\"",
                zone.province
            )));
        }

        let district = normalize(&zone.district);
        if province == home && !district.is_empty() && !resolves_to_home_district(config, &district)
        {
            return Err(DispatchError::InvalidZones(format!(
                "unrecognized district \"{}\" in {}",
                zone.district, zone.province
            )));
        }
    }

    Ok(())
}

fn resolves_to_home_district(config: &DispatchConfig, normalized: &str) -> bool {
    let regions = &config.regions;
    if regions.is_home_district(normalized) {
        return true;
    }
    if let Some(full) = regions.expand_abbreviation(normalized) {
        if regions.is_home_district(full) {
            return true;
        }
    }
    matches!(regions.alias_partner(normalized), Some(partner) if regions.is_home_district(partner))
}
