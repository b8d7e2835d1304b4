use serde::{Deserialize, Serialize};
use uuid::Uuid;

// An empty district means the whole province; an empty ward the whole
// district. Zone sets are bulk-replaced, never edited entry by entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceZone {
    pub id: Uuid,
    pub shipper_id: Uuid,
    pub province: String,
    pub district: String,
    pub ward: String,
}

impl ServiceZone {
    pub fn new(
        shipper_id: Uuid,
        province: impl Into<String>,
        district: impl Into<String>,
        ward: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            shipper_id,
            province: province.into(),
            district: district.into(),
            ward: ward.into(),
        }
    }
}
