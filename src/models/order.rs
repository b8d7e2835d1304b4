use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::address::GeoPoint;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum OrderStatus {
    Pending,
    Shipping,
    Delivered,
    Cancelled,
    PendingExternal,
}

impl OrderStatus {
    // Open orders count against a shipper's quota; delivered and cancelled
    // free it, and externally routed orders never held it.
    pub fn is_open(self) -> bool {
        matches!(self, OrderStatus::Pending | OrderStatus::Shipping)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub shipping_address: String,
    pub customer_contact: Option<String>,
    // Set when the customer pinned coordinates at checkout; the engine
    // never geocodes.
    pub location: Option<GeoPoint>,
    pub status: OrderStatus,
    pub shipper_id: Option<Uuid>,
    pub dispatch_note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub assigned_at: Option<DateTime<Utc>>,
}

impl Order {
    pub fn new(shipping_address: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            shipping_address: shipping_address.into(),
            customer_contact: None,
            location: None,
            status: OrderStatus::Pending,
            shipper_id: None,
            dispatch_note: None,
            created_at: Utc::now(),
            assigned_at: None,
        }
    }

    // Still pending and never bound; externally routed orders are out of
    // the internal pool.
    pub fn is_unassigned(&self) -> bool {
        self.status == OrderStatus::Pending && self.shipper_id.is_none()
    }

    pub fn append_note(&mut self, note: &str) {
        match &mut self.dispatch_note {
            Some(existing) => {
                existing.push_str("; ");
                existing.push_str(note);
            }
            None => self.dispatch_note = Some(note.to_string()),
        }
    }
}
