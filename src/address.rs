use tracing::{debug, warn};

use crate::config::DispatchConfig;
use crate::models::address::{GeoPoint, StructuredAddress};

const MIN_RAW_LEN: usize = 10;

// đ/Đ are distinct letters, not combining forms, so plain NFD stripping
// would miss them; the set is closed and a fixed table covers it.
const DIACRITIC_GROUPS: &[(&str, char)] = &[
    ("àáạảãâầấậẩẫăằắặẳẵ", 'a'),
    ("èéẹẻẽêềếệểễ", 'e'),
    ("ìíịỉĩ", 'i'),
    ("òóọỏõôồốộổỗơờớợởỡ", 'o'),
    ("ùúụủũưừứựửữ", 'u'),
    ("ỳýỵỷỹ", 'y'),
    ("đ", 'd'),
];

// Longest match first, already folded and lowercased.
const ADMIN_PREFIXES: &[&[&str]] = &[
    &["thanh", "pho"],
    &["thi", "xa"],
    &["thi", "tran"],
    &["tinh"],
    &["quan"],
    &["huyen"],
    &["phuong"],
    &["xa"],
    &["tp"],
    &["tx"],
    &["tt"],
    &["q"],
    &["h"],
    &["p"],
    &["x"],
];

const WARD_PREFIXES: &[&[&str]] = &[&["thi", "tran"], &["phuong"], &["xa"], &["p"], &["x"], &["tt"]];

pub fn normalize(input: &str) -> String {
    let folded = fold(input);
    let mut tokens: Vec<&str> = folded.split_whitespace().collect();

    while let Some(len) = leading_prefix_len(&tokens, ADMIN_PREFIXES) {
        tokens.drain(..len);
    }

    tokens.join(" ")
}

// Only matches when tokens remain after the prefix, so a segment that is
// nothing but a prefix (a zone entered as "TX") survives.
fn leading_prefix_len(tokens: &[&str], prefixes: &[&[&str]]) -> Option<usize> {
    prefixes
        .iter()
        .find(|prefix| tokens.len() > prefix.len() && tokens[..prefix.len()] == ***prefix)
        .map(|prefix| prefix.len())
}

fn fold(input: &str) -> String {
    input
        .to_lowercase()
        .chars()
        .map(|c| {
            if c == '.' || c == '-' || c == '/' {
                return ' ';
            }
            DIACRITIC_GROUPS
                .iter()
                .find_map(|(group, base)| group.contains(c).then_some(*base))
                .unwrap_or(c)
        })
        .collect()
}

fn has_ward_prefix(raw_segment: &str) -> bool {
    let folded = fold(raw_segment);
    let tokens: Vec<&str> = folded.split_whitespace().collect();
    leading_prefix_len(&tokens, WARD_PREFIXES).is_some()
}

// Soft contract: anything unparseable returns None rather than erroring.
pub fn parse_shipping_address(
    config: &DispatchConfig,
    raw: &str,
    location: Option<GeoPoint>,
) -> Option<StructuredAddress> {
    if raw.trim().chars().count() < MIN_RAW_LEN {
        debug!(raw = %raw, "address too short to parse");
        return None;
    }

    let segments: Vec<&str> = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();
    if segments.len() < 2 {
        debug!(raw = %raw, "address has too few segments");
        return None;
    }

    let (rest, province_raw) = segments.split_at(segments.len() - 1);
    let province_norm = normalize(province_raw[0]);
    if province_norm.is_empty() {
        debug!(raw = %raw, "province empty after normalization");
        return None;
    }

    if province_norm == normalize(&config.home_province) {
        parse_home_region(config, raw, rest, location)
    } else {
        Some(parse_other_province(config, rest, &province_norm, location))
    }
}

fn parse_home_region(
    config: &DispatchConfig,
    raw: &str,
    rest: &[&str],
    location: Option<GeoPoint>,
) -> Option<StructuredAddress> {
    let regions = &config.regions;

    // First pass walks backward over the administrative segments, leaving
    // the street segment alone; second pass widens to everything and
    // accepts substring containment.
    let mut found: Option<(usize, String)> = None;
    for i in (1..rest.len()).rev() {
        let seg = normalize(rest[i]);
        if let Some(canonical) = match_home_district(config, &seg) {
            found = Some((i, canonical));
            break;
        }
    }
    if found.is_none() {
        for (i, segment) in rest.iter().enumerate() {
            let seg = normalize(segment);
            if let Some(canonical) = match_home_district(config, &seg).or_else(|| {
                regions
                    .home_districts()
                    .iter()
                    .find(|d| {
                        let d_norm = normalize(d);
                        seg.contains(&d_norm) || (!seg.is_empty() && d_norm.contains(&seg))
                    })
                    .cloned()
            }) {
                found = Some((i, canonical));
                break;
            }
        }
    }

    let (district, ward) = match found {
        Some((index, canonical)) => {
            // The preceding segment is a ward only when its raw text
            // announces itself as one.
            let ward = if index >= 1 && has_ward_prefix(rest[index - 1]) {
                normalize(rest[index - 1])
            } else {
                String::new()
            };
            (canonical, ward)
        }
        None if config.fallback_to_home_district => {
            // Unrecognized home-region districts are routed to the store's
            // own district. Logged for audit.
            warn!(
                raw = %raw,
                fallback = %config.home_district_fallback,
                "district not recognized in home-region address, defaulting to store district"
            );
            (config.home_district_fallback.clone(), String::new())
        }
        None => {
            debug!(raw = %raw, "district not recognized and fallback disabled");
            return None;
        }
    };

    Some(StructuredAddress {
        province: config.home_province.clone(),
        district,
        ward,
        location,
    })
}

fn match_home_district(config: &DispatchConfig, normalized_segment: &str) -> Option<String> {
    let regions = &config.regions;
    if let Some(canonical) = regions.canonical_home_district(normalized_segment) {
        return Some(canonical.to_string());
    }
    regions
        .expand_abbreviation(normalized_segment)
        .and_then(|full| regions.canonical_home_district(full))
        .map(str::to_string)
}

// Outside the home region the layout is positional: second-to-last is the
// district, third-to-last the ward.
fn parse_other_province(
    config: &DispatchConfig,
    rest: &[&str],
    province_norm: &str,
    location: Option<GeoPoint>,
) -> StructuredAddress {
    let province = config
        .regions
        .canonical_province(province_norm)
        .map(str::to_string)
        .unwrap_or_else(|| province_norm.to_string());

    let district = rest.last().map(|s| normalize(s)).unwrap_or_default();
    let ward = if rest.len() >= 2 {
        normalize(rest[rest.len() - 2])
    } else {
        String::new()
    };

    StructuredAddress {
        province,
        district,
        ward,
        location,
    }
}
