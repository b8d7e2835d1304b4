use std::collections::HashMap;

use crate::address::normalize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MacroRegion {
    Northern,
    Central,
    Southern,
}

// All lookup keys are normalized names; values keep the canonical display
// form so the parser can restore diacritics.
#[derive(Debug, Clone)]
pub struct RegionTable {
    home_districts: Vec<String>,
    district_lookup: HashMap<String, String>,
    district_abbreviations: HashMap<String, String>,
    district_aliases: Vec<(String, String)>,
    province_lookup: HashMap<String, (String, MacroRegion)>,
}

impl RegionTable {
    pub fn new(
        home_districts: &[&str],
        district_abbreviations: &[(&str, &str)],
        district_aliases: &[(&str, &str)],
        northern: &[&str],
        central: &[&str],
        southern: &[&str],
    ) -> Self {
        let mut district_lookup = HashMap::new();
        for district in home_districts {
            district_lookup.insert(normalize(district), (*district).to_string());
        }

        let mut province_lookup = HashMap::new();
        for (provinces, region) in [
            (northern, MacroRegion::Northern),
            (central, MacroRegion::Central),
            (southern, MacroRegion::Southern),
        ] {
            for province in provinces {
                province_lookup.insert(normalize(province), ((*province).to_string(), region));
            }
        }

        Self {
            home_districts: home_districts.iter().map(|d| (*d).to_string()).collect(),
            district_lookup,
            district_abbreviations: district_abbreviations
                .iter()
                .map(|(abbr, full)| (normalize(abbr), normalize(full)))
                .collect(),
            district_aliases: district_aliases
                .iter()
                .map(|(a, b)| (normalize(a), normalize(b)))
                .collect(),
            province_lookup,
        }
    }

    pub fn canonical_province(&self, normalized: &str) -> Option<&str> {
        self.province_lookup
            .get(normalized)
            .map(|(canonical, _)| canonical.as_str())
    }

    pub fn macro_region(&self, normalized: &str) -> Option<MacroRegion> {
        self.province_lookup
            .get(normalized)
            .map(|(_, region)| *region)
    }

    pub fn canonical_home_district(&self, normalized: &str) -> Option<&str> {
        self.district_lookup.get(normalized).map(String::as_str)
    }

    pub fn is_home_district(&self, normalized: &str) -> bool {
        self.district_lookup.contains_key(normalized)
    }

    pub fn expand_abbreviation(&self, normalized: &str) -> Option<&str> {
        self.district_abbreviations
            .get(normalized)
            .map(String::as_str)
    }

    pub fn is_alias_pair(&self, a: &str, b: &str) -> bool {
        self.district_aliases
            .iter()
            .any(|(x, y)| (x == a && y == b) || (x == b && y == a))
    }

    pub fn alias_partner(&self, normalized: &str) -> Option<&str> {
        self.district_aliases.iter().find_map(|(a, b)| {
            if a == normalized {
                Some(b.as_str())
            } else if b == normalized {
                Some(a.as_str())
            } else {
                None
            }
        })
    }

    pub fn home_districts(&self) -> &[String] {
        &self.home_districts
    }

    pub fn vietnam() -> Self {
        Self::new(
            HANOI_DISTRICTS,
            DISTRICT_ABBREVIATIONS,
            DISTRICT_ALIASES,
            NORTHERN_PROVINCES,
            CENTRAL_PROVINCES,
            SOUTHERN_PROVINCES,
        )
    }
}

const HANOI_DISTRICTS: &[&str] = &[
    "Ba Đình",
    "Hoàn Kiếm",
    "Tây Hồ",
    "Long Biên",
    "Cầu Giấy",
    "Đống Đa",
    "Hai Bà Trưng",
    "Hoàng Mai",
    "Thanh Xuân",
    "Nam Từ Liêm",
    "Bắc Từ Liêm",
    "Hà Đông",
    "Sơn Tây",
    "Ba Vì",
    "Chương Mỹ",
    "Đan Phượng",
    "Đông Anh",
    "Gia Lâm",
    "Hoài Đức",
    "Mê Linh",
    "Mỹ Đức",
    "Phú Xuyên",
    "Phúc Thọ",
    "Quốc Oai",
    "Sóc Sơn",
    "Thạch Thất",
    "Thanh Oai",
    "Thanh Trì",
    "Thường Tín",
    "Ứng Hòa",
];

const DISTRICT_ABBREVIATIONS: &[(&str, &str)] = &[
    ("hbt", "Hai Bà Trưng"),
    ("hk", "Hoàn Kiếm"),
    ("cg", "Cầu Giấy"),
    ("dd", "Đống Đa"),
    ("hm", "Hoàng Mai"),
    ("ntl", "Nam Từ Liêm"),
    ("btl", "Bắc Từ Liêm"),
];

// "tx" is how dispatchers abbreviate the lone provincial town, Sơn Tây.
const DISTRICT_ALIASES: &[(&str, &str)] = &[("tx", "Sơn Tây")];

const NORTHERN_PROVINCES: &[&str] = &[
    "Hà Nội",
    "Hải Phòng",
    "Quảng Ninh",
    "Bắc Ninh",
    "Hà Nam",
    "Hải Dương",
    "Hưng Yên",
    "Nam Định",
    "Ninh Bình",
    "Thái Bình",
    "Vĩnh Phúc",
    "Hà Giang",
    "Cao Bằng",
    "Bắc Kạn",
    "Lạng Sơn",
    "Tuyên Quang",
    "Thái Nguyên",
    "Phú Thọ",
    "Bắc Giang",
    "Lào Cai",
    "Yên Bái",
    "Điện Biên",
    "Hòa Bình",
    "Lai Châu",
    "Sơn La",
];

const CENTRAL_PROVINCES: &[&str] = &[
    "Thanh Hóa",
    "Nghệ An",
    "Hà Tĩnh",
    "Quảng Bình",
    "Quảng Trị",
    "Thừa Thiên Huế",
    "Đà Nẵng",
    "Quảng Nam",
    "Quảng Ngãi",
    "Bình Định",
    "Phú Yên",
    "Khánh Hòa",
    "Ninh Thuận",
    "Bình Thuận",
    "Kon Tum",
    "Gia Lai",
    "Đắk Lắk",
    "Đắk Nông",
    "Lâm Đồng",
];

const SOUTHERN_PROVINCES: &[&str] = &[
    "Hồ Chí Minh",
    "Bà Rịa - Vũng Tàu",
    "Bình Dương",
    "Bình Phước",
    "Đồng Nai",
    "Tây Ninh",
    "An Giang",
    "Bạc Liêu",
    "Bến Tre",
    "Cà Mau",
    "Cần Thơ",
    "Đồng Tháp",
    "Hậu Giang",
    "Kiên Giang",
    "Long An",
    "Sóc Trăng",
    "Tiền Giang",
    "Trà Vinh",
    "Vĩnh Long",
];
