use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Shipper {
    pub id: Uuid,
    pub name: String,
    pub available: bool,
    pub priority: u8,
    // Cap on concurrently open orders; 0 means unlimited.
    pub max_orders_per_day: u32,
    // Cached open-order count, healed from actual open orders at every
    // bind and at the midnight reset.
    pub orders_today: u32,
    pub last_assigned_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl Shipper {
    pub fn new(name: impl Into<String>, priority: u8, max_orders_per_day: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            available: true,
            priority: priority.clamp(1, 10),
            max_orders_per_day,
            orders_today: 0,
            last_assigned_at: None,
            updated_at: Utc::now(),
        }
    }

    pub fn effective_quota(&self) -> u32 {
        if self.max_orders_per_day == 0 {
            u32::MAX
        } else {
            self.max_orders_per_day
        }
    }
}
