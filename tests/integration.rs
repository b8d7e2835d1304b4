use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use dispatch_engine::config::DispatchConfig;
use dispatch_engine::engine::sweep::SweepScheduler;
use dispatch_engine::engine::transaction::{attempt_assignment, AttemptError};
use dispatch_engine::engine::DispatchEngine;
use dispatch_engine::error::{DispatchError, ErrorCode, NotifyError};
use dispatch_engine::models::address::GeoPoint;
use dispatch_engine::models::assignment::{DeliveryMethod, ShipmentPayload};
use dispatch_engine::models::order::{Order, OrderStatus};
use dispatch_engine::models::shipper::Shipper;
use dispatch_engine::models::zone::ServiceZone;
use dispatch_engine::store::{CarrierNotifier, DispatchStore, MemoryStore};

#[derive(Default)]
struct RecordingNotifier {
    fail: bool,
    sent: Mutex<Vec<ShipmentPayload>>,
}

#[async_trait]
impl CarrierNotifier for RecordingNotifier {
    async fn send(&self, payload: &ShipmentPayload) -> Result<(), NotifyError> {
        if self.fail {
            return Err(NotifyError::Unreachable("carrier endpoint down".to_string()));
        }
        self.sent.lock().await.push(payload.clone());
        Ok(())
    }
}

struct Harness {
    engine: DispatchEngine,
    store: Arc<MemoryStore>,
    notifier: Arc<RecordingNotifier>,
}

fn test_config() -> DispatchConfig {
    DispatchConfig {
        lock_wait: Duration::from_millis(200),
        ..DispatchConfig::default()
    }
}

fn harness_with(notifier: RecordingNotifier) -> Harness {
    dispatch_engine::observability::init_tracing("warn");
    let config = test_config();
    let store = Arc::new(MemoryStore::new(config.lock_wait));
    let notifier = Arc::new(notifier);
    let engine = DispatchEngine::new(store.clone(), notifier.clone(), config);
    Harness {
        engine,
        store,
        notifier,
    }
}

fn harness() -> Harness {
    harness_with(RecordingNotifier::default())
}

async fn add_shipper(
    store: &MemoryStore,
    name: &str,
    priority: u8,
    quota: u32,
    zones: &[(&str, &str, &str)],
) -> Shipper {
    let shipper = Shipper::new(name.to_string(), priority, quota);
    store.insert_shipper(shipper.clone()).await.unwrap();
    if !zones.is_empty() {
        let rows: Vec<ServiceZone> = zones
            .iter()
            .map(|(province, district, ward)| {
                ServiceZone::new(
                    shipper.id,
                    province.to_string(),
                    district.to_string(),
                    ward.to_string(),
                )
            })
            .collect();
        store.replace_zones(shipper.id, rows).await.unwrap();
    }
    shipper
}

async fn add_order(store: &MemoryStore, raw: &str) -> Order {
    let order = Order::new(raw.to_string());
    store.insert_order(order.clone()).await.unwrap();
    order
}

#[tokio::test]
async fn local_order_assigned_to_covering_shipper() {
    let h = harness();
    let shipper = add_shipper(&h.store, "Tuan", 5, 10, &[("Hà Nội", "Cầu Giấy", "")]).await;
    let order = add_order(&h.store, "So 8 Pham Van Bach, Cau Giay, Ha Noi").await;

    let result = h.engine.assign(&order).await;

    assert!(result.success, "unexpected failure: {}", result.message);
    assert_eq!(result.shipper_id, Some(shipper.id));
    assert_eq!(result.shipper_name.as_deref(), Some("Tuan"));
    assert_eq!(result.delivery_method, Some(DeliveryMethod::LocalShipper));
    assert_eq!(result.estimated_hours, Some(2));
    assert_eq!(result.distance_rank, Some(1));
    // 100 - 15 - 0 + 50.
    assert_eq!(result.score, Some(135));

    let stored = h.store.order_by_id(order.id).await.unwrap().unwrap();
    assert_eq!(stored.status, OrderStatus::Shipping);
    assert_eq!(stored.shipper_id, Some(shipper.id));
    assert!(stored.assigned_at.is_some());

    let stored = h.store.shipper_by_id(shipper.id).await.unwrap().unwrap();
    assert_eq!(stored.orders_today, 1);
    assert!(stored.last_assigned_at.is_some());
}

#[tokio::test]
async fn metrics_expose_dispatch_outcomes() {
    let h = harness();
    add_shipper(&h.store, "Mai", 5, 10, &[("Hà Nội", "", "")]).await;
    let order = add_order(&h.store, "22 Lang Ha, Dong Da, Ha Noi").await;

    let result = h.engine.assign(&order).await;
    assert!(result.success);

    let body = h.engine.metrics().encode().unwrap();
    assert!(body.contains("dispatch_total"));
    assert!(body.contains("dispatch_latency_seconds"));
}

#[tokio::test]
async fn reassignment_refused_at_both_checkpoints() {
    let h = harness();
    let shipper = add_shipper(&h.store, "Hanh", 5, 10, &[("Hà Nội", "", "")]).await;
    let order = add_order(&h.store, "5 Tran Duy Hung, Cau Giay, Ha Noi").await;

    let first = h.engine.assign(&order).await;
    assert!(first.success);

    // A caller holding the bound row trips the optimistic pre-check.
    let bound = h.store.order_by_id(order.id).await.unwrap().unwrap();
    let second = h.engine.assign(&bound).await;
    assert!(!second.success);
    assert_eq!(second.error_code, Some(ErrorCode::OrderAlreadyAssigned));

    // A caller holding a stale unbound copy gets caught under the row lock.
    let third = h.engine.assign(&order).await;
    assert!(!third.success);
    assert_eq!(third.error_code, Some(ErrorCode::OrderAlreadyAssigned));

    let stored = h.store.order_by_id(order.id).await.unwrap().unwrap();
    assert_eq!(stored.shipper_id, Some(shipper.id));
}

#[tokio::test]
async fn quota_race_admits_exactly_one_order() {
    let h = harness();
    let shipper = add_shipper(&h.store, "Ngoc", 5, 1, &[("Hà Nội", "", "")]).await;
    let first = add_order(&h.store, "1 Hang Bac, Hoan Kiem, Ha Noi").await;
    let second = add_order(&h.store, "2 Hang Gai, Hoan Kiem, Ha Noi").await;

    let (a, b) = tokio::join!(h.engine.assign(&first), h.engine.assign(&second));

    let successes = [&a, &b].iter().filter(|r| r.success).count();
    assert_eq!(successes, 1);
    let loser = if a.success { &b } else { &a };
    assert_eq!(loser.error_code, Some(ErrorCode::QuotaExceeded));

    let stored = h.store.shipper_by_id(shipper.id).await.unwrap().unwrap();
    assert_eq!(stored.orders_today, 1);
    let open = h.store.count_open_orders(shipper.id).await.unwrap();
    assert_eq!(open, 1);
}

#[tokio::test]
async fn no_eligible_worker_without_coverage() {
    let h = harness();
    add_shipper(&h.store, "HaiPhongOnly", 5, 10, &[("Hải Phòng", "", "")]).await;
    let order = add_order(&h.store, "68 Thai Ha, Dong Da, Ha Noi").await;

    let result = h.engine.assign(&order).await;

    assert!(!result.success);
    assert_eq!(result.error_code, Some(ErrorCode::NoEligibleWorker));
    assert_eq!(result.delivery_method, Some(DeliveryMethod::LocalShipper));

    let stored = h.store.order_by_id(order.id).await.unwrap().unwrap();
    assert_eq!(stored.status, OrderStatus::Pending);
    assert_eq!(stored.shipper_id, None);
}

#[tokio::test]
async fn shipper_without_zones_is_never_eligible() {
    let h = harness();
    add_shipper(&h.store, "NoZones", 9, 10, &[]).await;
    let order = add_order(&h.store, "68 Thai Ha, Dong Da, Ha Noi").await;

    let result = h.engine.assign(&order).await;

    assert!(!result.success);
    assert_eq!(result.error_code, Some(ErrorCode::NoEligibleWorker));
}

#[tokio::test]
async fn express_order_skips_low_priority_shippers() {
    let h = harness();
    add_shipper(&h.store, "SlowLane", 2, 10, &[("Đà Nẵng", "", "")]).await;
    let mut order = Order::new("12 Bach Dang, Hai Chau, Da Nang".to_string());
    order.location = Some(GeoPoint {
        lat: 16.0544,
        lng: 108.2022,
    });
    h.store.insert_order(order.clone()).await.unwrap();

    let result = h.engine.assign(&order).await;

    // Nobody clears the express priority floor, so the order falls through
    // to the external carrier.
    assert!(result.success);
    assert_eq!(result.shipper_id, None);
    assert_eq!(result.delivery_method, Some(DeliveryMethod::ExpressShipping));

    let stored = h.store.order_by_id(order.id).await.unwrap().unwrap();
    assert_eq!(stored.status, OrderStatus::PendingExternal);
    assert_eq!(h.notifier.sent.lock().await.len(), 1);
}

#[tokio::test]
async fn express_order_assigned_to_high_priority_shipper() {
    let h = harness();
    add_shipper(&h.store, "SlowLane", 2, 10, &[("Đà Nẵng", "", "")]).await;
    let fast = add_shipper(&h.store, "FastLane", 9, 10, &[("Đà Nẵng", "", "")]).await;
    let mut order = Order::new("12 Bach Dang, Hai Chau, Da Nang".to_string());
    order.location = Some(GeoPoint {
        lat: 16.0544,
        lng: 108.2022,
    });
    h.store.insert_order(order.clone()).await.unwrap();

    let result = h.engine.assign(&order).await;

    assert!(result.success, "unexpected failure: {}", result.message);
    assert_eq!(result.shipper_id, Some(fast.id));
    assert_eq!(result.delivery_method, Some(DeliveryMethod::ExpressShipping));
    assert_eq!(result.estimated_hours, Some(24));
    assert!(h.notifier.sent.lock().await.is_empty());
}

#[tokio::test]
async fn cross_region_order_routed_to_external_carrier() {
    let h = harness();
    add_shipper(&h.store, "HanoiOnly", 9, 10, &[("Hà Nội", "", "")]).await;
    let mut order = add_order(&h.store, "45 Le Loi, Quan 1, Ho Chi Minh").await;
    order.customer_contact = Some("0901 234 567".to_string());
    h.store.save_order(&order).await.unwrap();

    let result = h.engine.assign(&order).await;

    assert!(result.success);
    assert_eq!(result.shipper_id, None);
    assert_eq!(result.delivery_method, Some(DeliveryMethod::ThirdParty));
    assert_eq!(result.estimated_hours, Some(72));
    assert_eq!(result.error_code, None);

    let stored = h.store.order_by_id(order.id).await.unwrap().unwrap();
    assert_eq!(stored.status, OrderStatus::PendingExternal);
    assert!(stored
        .dispatch_note
        .as_deref()
        .unwrap()
        .contains("routed to external carrier"));

    let sent = h.notifier.sent.lock().await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].order_id, order.id);
    assert!(sent[0].destination.contains("Hồ Chí Minh"));
    assert_eq!(sent[0].customer_contact.as_deref(), Some("0901 234 567"));
}

#[tokio::test]
async fn carrier_notification_failure_is_not_fatal() {
    let h = harness_with(RecordingNotifier {
        fail: true,
        ..RecordingNotifier::default()
    });
    let order = add_order(&h.store, "45 Le Loi, Quan 1, Ho Chi Minh").await;

    let result = h.engine.assign(&order).await;

    assert!(result.success);
    assert_eq!(result.error_code, Some(ErrorCode::ThirdPartyNotifyFailed));

    let stored = h.store.order_by_id(order.id).await.unwrap().unwrap();
    assert_eq!(stored.status, OrderStatus::PendingExternal);
    assert!(stored
        .dispatch_note
        .as_deref()
        .unwrap()
        .contains("carrier notification failed"));
}

#[tokio::test]
async fn external_routing_yields_to_a_committed_bind() {
    let h = harness();
    let shipper = add_shipper(&h.store, "Manual", 5, 10, &[("Hà Nội", "", "")]).await;
    let order = add_order(&h.store, "45 Le Loi, Quan 1, Ho Chi Minh").await;

    // The bind commits while the routing caller still holds the unbound copy.
    attempt_assignment(h.store.as_ref(), shipper.id, order.id, Utc::now())
        .await
        .unwrap();

    let result = h.engine.assign(&order).await;
    assert!(!result.success);
    assert_eq!(result.error_code, Some(ErrorCode::OrderAlreadyAssigned));

    let stored = h.store.order_by_id(order.id).await.unwrap().unwrap();
    assert_eq!(stored.status, OrderStatus::Shipping);
    assert_eq!(stored.shipper_id, Some(shipper.id));
    assert!(stored.dispatch_note.is_none());

    let stored = h.store.shipper_by_id(shipper.id).await.unwrap().unwrap();
    assert_eq!(stored.orders_today, 1);
    assert!(h.notifier.sent.lock().await.is_empty());
}

#[tokio::test]
async fn routed_order_cannot_be_bound_internally() {
    let h = harness();
    let shipper = add_shipper(&h.store, "Latecomer", 5, 10, &[("Hà Nội", "", "")]).await;
    let order = add_order(&h.store, "45 Le Loi, Quan 1, Ho Chi Minh").await;

    let result = h.engine.assign(&order).await;
    assert!(result.success);
    assert_eq!(result.delivery_method, Some(DeliveryMethod::ThirdParty));

    let err = attempt_assignment(h.store.as_ref(), shipper.id, order.id, Utc::now())
        .await
        .unwrap_err();
    assert!(matches!(err, AttemptError::AlreadyAssigned));

    let stored = h.store.order_by_id(order.id).await.unwrap().unwrap();
    assert_eq!(stored.status, OrderStatus::PendingExternal);
    assert_eq!(stored.shipper_id, None);
}

#[tokio::test]
async fn unparseable_address_fails_clean() {
    let h = harness();
    add_shipper(&h.store, "Anyone", 5, 10, &[("Hà Nội", "", "")]).await;
    let order = add_order(&h.store, "???").await;

    let result = h.engine.assign(&order).await;

    assert!(!result.success);
    assert_eq!(result.error_code, Some(ErrorCode::AddressExtractionFailed));

    let stored = h.store.order_by_id(order.id).await.unwrap().unwrap();
    assert_eq!(stored.status, OrderStatus::Pending);
    assert_eq!(stored.shipper_id, None);
}

#[tokio::test]
async fn batch_results_line_up_with_inputs() {
    let h = harness();
    add_shipper(&h.store, "BatchGuy", 5, 10, &[("Hà Nội", "", "")]).await;
    let good_one = add_order(&h.store, "1 Thai Ha, Dong Da, Ha Noi").await;
    let junk = add_order(&h.store, "???").await;
    let good_two = add_order(&h.store, "2 Xuan Thuy, Cau Giay, Ha Noi").await;

    let orders = vec![good_one, junk, good_two];
    let results = h.engine.assign_many(&orders).await;

    assert_eq!(results.len(), 3);
    assert!(results[0].success);
    assert_eq!(
        results[1].error_code,
        Some(ErrorCode::AddressExtractionFailed)
    );
    assert!(results[2].success);
}

#[tokio::test]
async fn guards_run_in_fixed_order_under_lock() {
    let h = harness();
    let shipper = add_shipper(&h.store, "Guarded", 5, 1, &[("Hà Nội", "", "")]).await;
    let order = add_order(&h.store, "9 Kim Ma, Ba Dinh, Ha Noi").await;

    // Unavailability wins over everything else.
    let mut off = shipper.clone();
    off.available = false;
    h.store.insert_shipper(off).await.unwrap();
    let err = attempt_assignment(h.store.as_ref(), shipper.id, order.id, Utc::now())
        .await
        .unwrap_err();
    assert!(matches!(err, AttemptError::Unavailable));

    // Back available, but the order is already bound elsewhere.
    h.store.insert_shipper(shipper.clone()).await.unwrap();
    let rival = add_shipper(&h.store, "Rival", 5, 10, &[("Hà Nội", "", "")]).await;
    let mut bound = order.clone();
    bound.shipper_id = Some(rival.id);
    bound.status = OrderStatus::Shipping;
    h.store.save_order(&bound).await.unwrap();
    let err = attempt_assignment(h.store.as_ref(), shipper.id, order.id, Utc::now())
        .await
        .unwrap_err();
    assert!(matches!(err, AttemptError::AlreadyAssigned));

    // Unbound again, but the recomputed open count fills the quota.
    let mut unbound = order.clone();
    unbound.shipper_id = None;
    unbound.status = OrderStatus::Pending;
    h.store.save_order(&unbound).await.unwrap();
    let mut filler = Order::new("3 Lang Ha, Dong Da, Ha Noi".to_string());
    filler.shipper_id = Some(shipper.id);
    filler.status = OrderStatus::Shipping;
    h.store.insert_order(filler).await.unwrap();
    let err = attempt_assignment(h.store.as_ref(), shipper.id, order.id, Utc::now())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AttemptError::QuotaExceeded { open: 1, quota: 1 }
    ));
}

#[tokio::test]
async fn zero_quota_means_unlimited() {
    let h = harness();
    let shipper = add_shipper(&h.store, "Unlimited", 5, 0, &[("Hà Nội", "", "")]).await;

    for n in 0..4 {
        let order = add_order(&h.store, &format!("{n} Thai Ha, Dong Da, Ha Noi")).await;
        let result = h.engine.assign(&order).await;
        assert!(result.success, "order {n} failed: {}", result.message);
    }

    let stored = h.store.shipper_by_id(shipper.id).await.unwrap().unwrap();
    assert_eq!(stored.orders_today, 4);
}

#[tokio::test]
async fn lock_timeout_fails_the_attempt() {
    let store = MemoryStore::new(Duration::from_millis(50));
    let shipper = Shipper::new("Held".to_string(), 5, 10);
    store.insert_shipper(shipper.clone()).await.unwrap();
    let order = Order::new("7 Thai Ha, Dong Da, Ha Noi".to_string());
    store.insert_order(order.clone()).await.unwrap();

    let mut holder = store.begin().await.unwrap();
    holder.lock_shipper(shipper.id).await.unwrap();

    let err = attempt_assignment(&store, shipper.id, order.id, Utc::now())
        .await
        .unwrap_err();
    assert!(matches!(err, AttemptError::LockTimeout(_)));
}

#[tokio::test]
async fn sweep_dispatches_the_backlog() {
    let h = harness();
    add_shipper(&h.store, "Sweeper", 5, 10, &[("Hà Nội", "", "")]).await;
    let local_one = add_order(&h.store, "1 Thai Ha, Dong Da, Ha Noi").await;
    let local_two = add_order(&h.store, "2 Xuan Thuy, Cau Giay, Ha Noi").await;
    let far = add_order(&h.store, "45 Le Loi, Quan 1, Ho Chi Minh").await;

    let report = h.engine.sweep_unassigned().await.unwrap();
    assert_eq!(report.swept, 3);
    assert_eq!(report.assigned, 2);
    assert_eq!(report.routed_external, 1);
    assert_eq!(report.failed, 0);

    for id in [local_one.id, local_two.id] {
        let stored = h.store.order_by_id(id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Shipping);
    }
    let stored = h.store.order_by_id(far.id).await.unwrap().unwrap();
    assert_eq!(stored.status, OrderStatus::PendingExternal);

    // Nothing left for the next pass.
    let report = h.engine.sweep_unassigned().await.unwrap();
    assert_eq!(report.swept, 0);
}

#[tokio::test]
async fn scheduler_sweeps_on_its_interval() {
    dispatch_engine::observability::init_tracing("warn");
    let config = DispatchConfig {
        sweep_interval: Duration::from_millis(50),
        lock_wait: Duration::from_millis(200),
        ..DispatchConfig::default()
    };
    let store = Arc::new(MemoryStore::new(config.lock_wait));
    let notifier = Arc::new(RecordingNotifier::default());
    let engine = Arc::new(DispatchEngine::new(
        store.clone(),
        notifier.clone(),
        config,
    ));
    add_shipper(&store, "Scheduled", 5, 10, &[("Hà Nội", "", "")]).await;
    let order = add_order(&store, "1 Thai Ha, Dong Da, Ha Noi").await;

    let handles = SweepScheduler::new(engine.clone()).spawn();
    tokio::time::sleep(Duration::from_millis(200)).await;
    handles.abort();

    let stored = store.order_by_id(order.id).await.unwrap().unwrap();
    assert_eq!(stored.status, OrderStatus::Shipping);
}

#[tokio::test]
async fn daily_reset_recomputes_from_open_orders() {
    let h = harness();
    let shipper = add_shipper(&h.store, "Drifted", 5, 10, &[("Hà Nội", "", "")]).await;
    let first = add_order(&h.store, "1 Thai Ha, Dong Da, Ha Noi").await;
    let second = add_order(&h.store, "2 Thai Ha, Dong Da, Ha Noi").await;
    assert!(h.engine.assign(&first).await.success);
    assert!(h.engine.assign(&second).await.success);

    // Distort the counter the way a crash mid-write would.
    let mut drifted = h.store.shipper_by_id(shipper.id).await.unwrap().unwrap();
    drifted.orders_today = 9;
    h.store.insert_shipper(drifted).await.unwrap();

    let updated = h.engine.reset_daily_counts().await.unwrap();
    assert_eq!(updated, 1);
    let stored = h.store.shipper_by_id(shipper.id).await.unwrap().unwrap();
    assert_eq!(stored.orders_today, 2);

    // A delivery frees quota at the next reset.
    let mut delivered = h.store.order_by_id(first.id).await.unwrap().unwrap();
    delivered.status = OrderStatus::Delivered;
    h.store.save_order(&delivered).await.unwrap();
    h.engine.reset_daily_counts().await.unwrap();
    let stored = h.store.shipper_by_id(shipper.id).await.unwrap().unwrap();
    assert_eq!(stored.orders_today, 1);
}

#[tokio::test]
async fn zone_replacement_is_validated_and_read_back() {
    let h = harness();
    let shipper = add_shipper(&h.store, "Zoned", 5, 10, &[]).await;

    let oversized: Vec<ServiceZone> = (0..26)
        .map(|_| {
            ServiceZone::new(
                shipper.id,
                "Hà Nội".to_string(),
                "Đống Đa".to_string(),
                String::new(),
            )
        })
        .collect();
    let err = h
        .engine
        .replace_shipper_zones(shipper.id, oversized)
        .await
        .unwrap_err();
    assert!(matches!(err, DispatchError::InvalidZones(_)));

    let unknown = vec![ServiceZone::new(
        shipper.id,
        "Atlantis".to_string(),
        String::new(),
        String::new(),
    )];
    let err = h
        .engine
        .replace_shipper_zones(shipper.id, unknown)
        .await
        .unwrap_err();
    assert!(matches!(err, DispatchError::InvalidZones(_)));

    // Operator shorthand is accepted and stored verbatim.
    let zones = vec![
        ServiceZone::new(shipper.id, "Hà Nội".to_string(), "HBT".to_string(), String::new()),
        ServiceZone::new(shipper.id, "Đà Nẵng".to_string(), String::new(), String::new()),
    ];
    let stored = h.engine.replace_shipper_zones(shipper.id, zones).await.unwrap();
    assert_eq!(stored.len(), 2);

    let order = add_order(&h.store, "37 Le Dai Hanh, Hai Ba Trung, Ha Noi").await;
    let result = h.engine.assign(&order).await;
    assert!(result.success, "unexpected failure: {}", result.message);
    assert_eq!(result.shipper_id, Some(shipper.id));
}

#[tokio::test]
async fn availability_toggle_takes_effect_immediately() {
    let h = harness();
    let shipper = add_shipper(&h.store, "Toggle", 5, 10, &[("Hà Nội", "", "")]).await;
    let first = add_order(&h.store, "1 Thai Ha, Dong Da, Ha Noi").await;
    assert!(h.engine.assign(&first).await.success);

    let updated = h
        .engine
        .set_shipper_availability(shipper.id, false)
        .await
        .unwrap();
    assert!(!updated.available);

    let second = add_order(&h.store, "2 Thai Ha, Dong Da, Ha Noi").await;
    let result = h.engine.assign(&second).await;
    assert!(!result.success);
    assert_eq!(result.error_code, Some(ErrorCode::NoEligibleWorker));
}
