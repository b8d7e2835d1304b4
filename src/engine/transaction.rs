use chrono::{DateTime, Utc};
use tracing::warn;
use uuid::Uuid;

use crate::error::{ErrorCode, StoreError};
use crate::models::order::{Order, OrderStatus};
use crate::models::shipper::Shipper;
use crate::store::DispatchStore;

#[derive(Debug)]
pub struct BindOutcome {
    pub shipper: Shipper,
    pub order: Order,
}

// Guard rejections carry the code the caller surfaces when candidates run
// out; a lock timeout is a failed attempt without a code of its own.
#[derive(Debug)]
pub enum AttemptError {
    Unavailable,
    AlreadyAssigned,
    QuotaExceeded { open: u32, quota: u32 },
    LockTimeout(StoreError),
    Store(StoreError),
}

impl AttemptError {
    pub fn guard_code(&self) -> Option<ErrorCode> {
        match self {
            AttemptError::Unavailable => Some(ErrorCode::WorkerUnavailable),
            AttemptError::AlreadyAssigned => Some(ErrorCode::OrderAlreadyAssigned),
            AttemptError::QuotaExceeded { .. } => Some(ErrorCode::QuotaExceeded),
            AttemptError::LockTimeout(_) => None,
            AttemptError::Store(_) => Some(ErrorCode::AssignmentError),
        }
    }
}

fn classify(err: StoreError, shipper_id: Uuid) -> AttemptError {
    match err {
        err @ StoreError::LockTimeout { .. } => {
            warn!(shipper_id = %shipper_id, error = %err, "row lock wait exceeded, attempt abandoned");
            AttemptError::LockTimeout(err)
        }
        // A shipper deleted mid-flight cannot take the order.
        StoreError::NotFound { entity: "shipper", .. } => AttemptError::Unavailable,
        err => AttemptError::Store(err),
    }
}

// Locks are taken shipper first, order second, the same everywhere, which
// rules out lock cycles between concurrent attempts. Guards re-check fresh
// rows in a fixed sequence: availability, then order-still-open, then quota
// with the open count recomputed under the shipper lock. Any early return
// drops the transaction, which rolls it back.
pub async fn attempt_assignment(
    store: &dyn DispatchStore,
    shipper_id: Uuid,
    order_id: Uuid,
    now: DateTime<Utc>,
) -> Result<BindOutcome, AttemptError> {
    let mut tx = store.begin().await.map_err(AttemptError::Store)?;

    let mut shipper = tx
        .lock_shipper(shipper_id)
        .await
        .map_err(|err| classify(err, shipper_id))?;
    if !shipper.available {
        warn!(shipper_id = %shipper_id, order_id = %order_id, "shipper went unavailable before bind");
        return Err(AttemptError::Unavailable);
    }

    let mut order = tx
        .lock_order(order_id)
        .await
        .map_err(|err| classify(err, shipper_id))?;
    // Bound, routed external, or otherwise closed: the order is taken and
    // that commit stands.
    if !order.is_unassigned() {
        return Err(AttemptError::AlreadyAssigned);
    }

    let open = tx
        .count_open_orders(shipper_id)
        .await
        .map_err(|err| classify(err, shipper_id))?;
    let quota = shipper.effective_quota();
    if open >= quota {
        warn!(
            shipper_id = %shipper_id,
            order_id = %order_id,
            open,
            quota = shipper.max_orders_per_day,
            "quota exhausted under lock"
        );
        return Err(AttemptError::QuotaExceeded {
            open,
            quota: shipper.max_orders_per_day,
        });
    }

    order.shipper_id = Some(shipper.id);
    order.status = OrderStatus::Shipping;
    order.assigned_at = Some(now);
    // Recomputed count plus this order, so a drifted counter self-heals on
    // the next bind.
    shipper.orders_today = open + 1;
    shipper.last_assigned_at = Some(now);
    shipper.updated_at = now;

    tx.stage_order(order.clone());
    tx.stage_shipper(shipper.clone());
    tx.commit().await.map_err(AttemptError::Store)?;

    Ok(BindOutcome { shipper, order })
}
