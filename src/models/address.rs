use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

// Derived per dispatch attempt and never persisted. The fields hold
// canonical display forms when recognized; comparisons always go through
// normalization, never through these strings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredAddress {
    pub province: String,
    pub district: String,
    pub ward: String,
    pub location: Option<GeoPoint>,
}

impl StructuredAddress {
    pub fn display(&self) -> String {
        let mut parts = Vec::with_capacity(3);
        if !self.ward.is_empty() {
            parts.push(self.ward.as_str());
        }
        if !self.district.is_empty() {
            parts.push(self.district.as_str());
        }
        parts.push(self.province.as_str());
        parts.join(", ")
    }
}
