mod memory;

pub use memory::MemoryStore;

use async_trait::async_trait;
use tracing::info;
use uuid::Uuid;

use crate::error::{NotifyError, StoreError};
use crate::models::assignment::ShipmentPayload;
use crate::models::order::Order;
use crate::models::shipper::Shipper;
use crate::models::zone::ServiceZone;

// One trait covers orders, shippers and zones: the assignment transaction
// spans an order row and a shipper row atomically, so splitting the port
// per entity would push the transaction boundary somewhere it cannot be
// enforced.
#[async_trait]
pub trait DispatchStore: Send + Sync {
    async fn order_by_id(&self, id: Uuid) -> Result<Option<Order>, StoreError>;

    // Pending orders with no bound shipper, oldest first.
    async fn unassigned_orders(&self) -> Result<Vec<Order>, StoreError>;

    async fn insert_order(&self, order: Order) -> Result<(), StoreError>;

    async fn save_order(&self, order: &Order) -> Result<(), StoreError>;

    async fn shipper_by_id(&self, id: Uuid) -> Result<Option<Shipper>, StoreError>;

    async fn all_shippers(&self) -> Result<Vec<Shipper>, StoreError>;

    // Available shippers sorted priority descending, then open-order count
    // ascending.
    async fn eligible_shippers(&self) -> Result<Vec<Shipper>, StoreError>;

    async fn insert_shipper(&self, shipper: Shipper) -> Result<(), StoreError>;

    // Open (non-terminal) bound orders; delivered and cancelled free quota.
    async fn count_open_orders(&self, shipper_id: Uuid) -> Result<u32, StoreError>;

    async fn zones_for_shipper(&self, shipper_id: Uuid) -> Result<Vec<ServiceZone>, StoreError>;

    // Delete-all + insert-new, returning the set as read back.
    async fn replace_zones(
        &self,
        shipper_id: Uuid,
        zones: Vec<ServiceZone>,
    ) -> Result<Vec<ServiceZone>, StoreError>;

    async fn begin(&self) -> Result<Box<dyn AssignmentTx>, StoreError>;
}

// Row locks are exclusive with a bounded wait and re-read the row fresh;
// writes are staged and only become visible on commit. Callers acquire
// shipper-then-order, in that fixed global order. Dropping without commit
// rolls back.
#[async_trait]
pub trait AssignmentTx: Send {
    async fn lock_shipper(&mut self, id: Uuid) -> Result<Shipper, StoreError>;

    async fn lock_order(&mut self, id: Uuid) -> Result<Order, StoreError>;

    async fn count_open_orders(&self, shipper_id: Uuid) -> Result<u32, StoreError>;

    fn stage_shipper(&mut self, shipper: Shipper);

    fn stage_order(&mut self, order: Order);

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
}

#[async_trait]
pub trait CarrierNotifier: Send + Sync {
    async fn send(&self, payload: &ShipmentPayload) -> Result<(), NotifyError>;
}

// For deployments without a carrier integration: accepts every shipment
// and leaves a log line behind.
pub struct NoopCarrierNotifier;

#[async_trait]
impl CarrierNotifier for NoopCarrierNotifier {
    async fn send(&self, payload: &ShipmentPayload) -> Result<(), NotifyError> {
        let body = serde_json::to_string(payload)
            .map_err(|err| NotifyError::Rejected(format!("unserializable payload: {err}")))?;
        info!(
            order_id = %payload.order_id,
            body = %body,
            "carrier hand-off accepted (noop notifier)"
        );
        Ok(())
    }
}
