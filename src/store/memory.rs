use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::time::timeout;
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::order::Order;
use crate::models::shipper::Shipper;
use crate::models::zone::ServiceZone;
use crate::store::{AssignmentTx, DispatchStore};

pub struct MemoryStore {
    inner: Arc<Inner>,
}

struct Inner {
    orders: DashMap<Uuid, Order>,
    shippers: DashMap<Uuid, Shipper>,
    zones: DashMap<Uuid, Vec<ServiceZone>>,
    order_locks: DashMap<Uuid, Arc<Mutex<()>>>,
    shipper_locks: DashMap<Uuid, Arc<Mutex<()>>>,
    lock_wait: Duration,
}

impl MemoryStore {
    pub fn new(lock_wait: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                orders: DashMap::new(),
                shippers: DashMap::new(),
                zones: DashMap::new(),
                order_locks: DashMap::new(),
                shipper_locks: DashMap::new(),
                lock_wait,
            }),
        }
    }
}

impl Inner {
    fn row_lock(locks: &DashMap<Uuid, Arc<Mutex<()>>>, id: Uuid) -> Arc<Mutex<()>> {
        locks
            .entry(id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    async fn acquire(
        &self,
        locks: &DashMap<Uuid, Arc<Mutex<()>>>,
        entity: &'static str,
        id: Uuid,
    ) -> Result<OwnedMutexGuard<()>, StoreError> {
        let lock = Self::row_lock(locks, id);
        timeout(self.lock_wait, lock.lock_owned())
            .await
            .map_err(|_| StoreError::LockTimeout {
                entity,
                id,
                waited_ms: self.lock_wait.as_millis() as u64,
            })
    }

    fn open_order_count(&self, shipper_id: Uuid) -> u32 {
        self.orders
            .iter()
            .filter(|entry| {
                entry.value().shipper_id == Some(shipper_id) && entry.value().status.is_open()
            })
            .count() as u32
    }
}

#[async_trait]
impl DispatchStore for MemoryStore {
    async fn order_by_id(&self, id: Uuid) -> Result<Option<Order>, StoreError> {
        Ok(self.inner.orders.get(&id).map(|entry| entry.value().clone()))
    }

    async fn unassigned_orders(&self) -> Result<Vec<Order>, StoreError> {
        let mut orders: Vec<Order> = self
            .inner
            .orders
            .iter()
            .filter(|entry| entry.value().is_unassigned())
            .map(|entry| entry.value().clone())
            .collect();
        orders.sort_by_key(|order| order.created_at);
        Ok(orders)
    }

    async fn insert_order(&self, order: Order) -> Result<(), StoreError> {
        self.inner.orders.insert(order.id, order);
        Ok(())
    }

    async fn save_order(&self, order: &Order) -> Result<(), StoreError> {
        self.inner.orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn shipper_by_id(&self, id: Uuid) -> Result<Option<Shipper>, StoreError> {
        Ok(self
            .inner
            .shippers
            .get(&id)
            .map(|entry| entry.value().clone()))
    }

    async fn all_shippers(&self) -> Result<Vec<Shipper>, StoreError> {
        Ok(self
            .inner
            .shippers
            .iter()
            .map(|entry| entry.value().clone())
            .collect())
    }

    async fn eligible_shippers(&self) -> Result<Vec<Shipper>, StoreError> {
        let mut shippers: Vec<Shipper> = self
            .inner
            .shippers
            .iter()
            .filter(|entry| entry.value().available)
            .map(|entry| entry.value().clone())
            .collect();
        shippers.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then(a.orders_today.cmp(&b.orders_today))
        });
        Ok(shippers)
    }

    async fn insert_shipper(&self, shipper: Shipper) -> Result<(), StoreError> {
        self.inner.shippers.insert(shipper.id, shipper);
        Ok(())
    }

    async fn count_open_orders(&self, shipper_id: Uuid) -> Result<u32, StoreError> {
        Ok(self.inner.open_order_count(shipper_id))
    }

    async fn zones_for_shipper(&self, shipper_id: Uuid) -> Result<Vec<ServiceZone>, StoreError> {
        Ok(self
            .inner
            .zones
            .get(&shipper_id)
            .map(|entry| entry.value().clone())
            .unwrap_or_default())
    }

    async fn replace_zones(
        &self,
        shipper_id: Uuid,
        zones: Vec<ServiceZone>,
    ) -> Result<Vec<ServiceZone>, StoreError> {
        // Serialized with assignments touching the same shipper.
        let _guard = self
            .inner
            .acquire(&self.inner.shipper_locks, "shipper", shipper_id)
            .await?;
        if !self.inner.shippers.contains_key(&shipper_id) {
            return Err(StoreError::NotFound {
                entity: "shipper",
                id: shipper_id,
            });
        }
        self.inner.zones.insert(shipper_id, zones.clone());
        let stored = self
            .inner
            .zones
            .get(&shipper_id)
            .map(|entry| entry.value().clone())
            .unwrap_or_default();
        if stored.len() != zones.len() {
            return Err(StoreError::Backend(format!(
                "zone replacement read-back mismatch: wrote {}, found {}",
                zones.len(),
                stored.len()
            )));
        }
        Ok(stored)
    }

    async fn begin(&self) -> Result<Box<dyn AssignmentTx>, StoreError> {
        Ok(Box::new(MemoryTx {
            inner: self.inner.clone(),
            shipper_guard: None,
            order_guard: None,
            staged_shipper: None,
            staged_order: None,
        }))
    }
}

// Dropping without commit releases the row guards with the staged rows
// unapplied, which is the rollback.
struct MemoryTx {
    inner: Arc<Inner>,
    shipper_guard: Option<OwnedMutexGuard<()>>,
    order_guard: Option<OwnedMutexGuard<()>>,
    staged_shipper: Option<Shipper>,
    staged_order: Option<Order>,
}

#[async_trait]
impl AssignmentTx for MemoryTx {
    async fn lock_shipper(&mut self, id: Uuid) -> Result<Shipper, StoreError> {
        let guard = self
            .inner
            .acquire(&self.inner.shipper_locks, "shipper", id)
            .await?;
        self.shipper_guard = Some(guard);
        self.inner
            .shippers
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or(StoreError::NotFound {
                entity: "shipper",
                id,
            })
    }

    async fn lock_order(&mut self, id: Uuid) -> Result<Order, StoreError> {
        let guard = self
            .inner
            .acquire(&self.inner.order_locks, "order", id)
            .await?;
        self.order_guard = Some(guard);
        self.inner
            .orders
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or(StoreError::NotFound { entity: "order", id })
    }

    async fn count_open_orders(&self, shipper_id: Uuid) -> Result<u32, StoreError> {
        Ok(self.inner.open_order_count(shipper_id))
    }

    fn stage_shipper(&mut self, shipper: Shipper) {
        self.staged_shipper = Some(shipper);
    }

    fn stage_order(&mut self, order: Order) {
        self.staged_order = Some(order);
    }

    async fn commit(mut self: Box<Self>) -> Result<(), StoreError> {
        if let Some(shipper) = self.staged_shipper.take() {
            self.inner.shippers.insert(shipper.id, shipper);
        }
        if let Some(order) = self.staged_order.take() {
            self.inner.orders.insert(order.id, order);
        }
        // Guards release when the transaction drops here, after the staged
        // rows are visible.
        Ok(())
    }
}
