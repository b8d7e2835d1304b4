use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ErrorCode;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum DistanceType {
    Local,
    Regional,
    National,
    International,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum DeliveryMethod {
    LocalShipper,
    ExpressShipping,
    ThirdParty,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DistanceProfile {
    pub distance_type: DistanceType,
    pub delivery_method: DeliveryMethod,
    pub estimated_hours: u32,
    pub distance_km: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub distance_rank: u32,
    pub distance_penalty: i32,
    pub load_penalty: i32,
    pub priority_bonus: i32,
    pub availability_penalty: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignmentResult {
    pub success: bool,
    pub shipper_id: Option<Uuid>,
    pub shipper_name: Option<String>,
    pub score: Option<i32>,
    pub distance_rank: Option<u32>,
    pub delivery_method: Option<DeliveryMethod>,
    pub estimated_hours: Option<u32>,
    pub distance_km: Option<f64>,
    pub error_code: Option<ErrorCode>,
    pub message: String,
}

impl AssignmentResult {
    pub fn failed(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            success: false,
            shipper_id: None,
            shipper_name: None,
            score: None,
            distance_rank: None,
            delivery_method: None,
            estimated_hours: None,
            distance_km: None,
            error_code: Some(code),
            message: message.into(),
        }
    }

    // Attaches the classification so even failed outcomes report the leg
    // the order would have travelled.
    pub fn with_profile(mut self, profile: &DistanceProfile) -> Self {
        self.delivery_method = Some(profile.delivery_method);
        self.estimated_hours = Some(profile.estimated_hours);
        self.distance_km = Some(profile.distance_km);
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShipmentPayload {
    pub order_id: Uuid,
    pub destination: String,
    pub estimated_hours: u32,
    pub customer_contact: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::AssignmentResult;
    use crate::error::ErrorCode;

    #[test]
    fn failed_result_serializes_stable_error_code() {
        let result = AssignmentResult::failed(ErrorCode::QuotaExceeded, "quota full");

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["error_code"], "QUOTA_EXCEEDED");
        assert!(json["shipper_id"].is_null());
    }
}
