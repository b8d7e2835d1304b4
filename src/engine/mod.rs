pub mod scoring;
pub mod sweep;
pub mod transaction;

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use futures::future::join_all;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::address;
use crate::config::DispatchConfig;
use crate::engine::scoring::{compute_score, rank_candidates, ScoredCandidate};
use crate::engine::transaction::{attempt_assignment, AttemptError};
use crate::error::{DispatchError, ErrorCode};
use crate::geo;
use crate::models::address::StructuredAddress;
use crate::models::assignment::{AssignmentResult, DeliveryMethod, DistanceProfile, ShipmentPayload};
use crate::models::order::{Order, OrderStatus};
use crate::models::shipper::Shipper;
use crate::models::zone::ServiceZone;
use crate::observability::metrics::Metrics;
use crate::store::{CarrierNotifier, DispatchStore};
use crate::zones::{distance_rank, validate_zones, zone_covers};

pub struct DispatchEngine {
    store: Arc<dyn DispatchStore>,
    notifier: Arc<dyn CarrierNotifier>,
    config: DispatchConfig,
    metrics: Metrics,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SweepReport {
    pub swept: usize,
    pub assigned: usize,
    pub routed_external: usize,
    pub failed: usize,
}

enum InternalDispatch {
    Done(AssignmentResult),
    NoCandidates,
}

impl DispatchEngine {
    pub fn new(
        store: Arc<dyn DispatchStore>,
        notifier: Arc<dyn CarrierNotifier>,
        config: DispatchConfig,
    ) -> Self {
        Self {
            store,
            notifier,
            config,
            metrics: Metrics::new(),
        }
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub async fn assign(&self, order: &Order) -> AssignmentResult {
        let start = Instant::now();
        let result = self.dispatch(order).await;

        let outcome = if !result.success {
            "failed"
        } else if result.shipper_id.is_some() {
            "assigned"
        } else {
            "external"
        };
        let elapsed = start.elapsed().as_secs_f64();
        self.metrics
            .dispatch_latency_seconds
            .with_label_values(&[outcome])
            .observe(elapsed);
        self.metrics
            .dispatch_total
            .with_label_values(&[outcome])
            .inc();

        result
    }

    async fn dispatch(&self, order: &Order) -> AssignmentResult {
        // Optimistic pre-check; the binding guard re-checks under lock.
        if order.shipper_id.is_some() {
            return AssignmentResult::failed(
                ErrorCode::OrderAlreadyAssigned,
                format!("order {} already has a shipper bound", order.id),
            );
        }

        let Some(address) =
            address::parse_shipping_address(&self.config, &order.shipping_address, order.location)
        else {
            warn!(
                order_id = %order.id,
                raw = %order.shipping_address,
                "address extraction failed"
            );
            return AssignmentResult::failed(
                ErrorCode::AddressExtractionFailed,
                "no usable province and district in the shipping address",
            );
        };

        let profile = geo::classify(&self.config, &address);
        info!(
            order_id = %order.id,
            province = %address.province,
            district = %address.district,
            distance_km = profile.distance_km,
            method = ?profile.delivery_method,
            "order classified"
        );

        match profile.delivery_method {
            DeliveryMethod::LocalShipper => {
                match self.assign_internal(order, &address, &profile, None).await {
                    InternalDispatch::Done(result) => result,
                    InternalDispatch::NoCandidates => {
                        warn!(order_id = %order.id, destination = %address.display(), "no shipper covers the destination");
                        AssignmentResult::failed(
                            ErrorCode::NoEligibleWorker,
                            format!("no available shipper covers {}", address.display()),
                        )
                        .with_profile(&profile)
                    }
                }
            }
            DeliveryMethod::ExpressShipping => {
                let min_priority = Some(self.config.express_priority_min);
                match self
                    .assign_internal(order, &address, &profile, min_priority)
                    .await
                {
                    InternalDispatch::Done(result) => result,
                    InternalDispatch::NoCandidates => {
                        info!(
                            order_id = %order.id,
                            "no express-capable shipper, handing to external carrier"
                        );
                        self.route_external(order, &address, &profile).await
                    }
                }
            }
            DeliveryMethod::ThirdParty => self.route_external(order, &address, &profile).await,
        }
    }

    async fn assign_internal(
        &self,
        order: &Order,
        address: &StructuredAddress,
        profile: &DistanceProfile,
        min_priority: Option<u8>,
    ) -> InternalDispatch {
        let shippers = match self.store.eligible_shippers().await {
            Ok(shippers) => shippers,
            Err(err) => {
                error!(order_id = %order.id, error = %err, "eligibility query failed");
                return InternalDispatch::Done(
                    AssignmentResult::failed(
                        ErrorCode::AssignmentError,
                        format!("storage failure while listing shippers: {err}"),
                    )
                    .with_profile(profile),
                );
            }
        };

        let mut candidates = Vec::new();
        for shipper in shippers {
            if let Some(min) = min_priority {
                if shipper.priority < min {
                    continue;
                }
            }
            let zones = match self.store.zones_for_shipper(shipper.id).await {
                Ok(zones) => zones,
                Err(err) => {
                    error!(order_id = %order.id, shipper_id = %shipper.id, error = %err, "zone lookup failed");
                    return InternalDispatch::Done(
                        AssignmentResult::failed(
                            ErrorCode::AssignmentError,
                            format!("storage failure while loading zones: {err}"),
                        )
                        .with_profile(profile),
                    );
                }
            };
            // A shipper with no zones serves nowhere and falls out here.
            if !zones.iter().any(|zone| zone_covers(&self.config, zone, address)) {
                continue;
            }
            let rank = distance_rank(&self.config, &zones, address);
            let open = match self.store.count_open_orders(shipper.id).await {
                Ok(open) => open,
                Err(err) => {
                    error!(order_id = %order.id, shipper_id = %shipper.id, error = %err, "open order count failed");
                    return InternalDispatch::Done(
                        AssignmentResult::failed(
                            ErrorCode::AssignmentError,
                            format!("storage failure while counting open orders: {err}"),
                        )
                        .with_profile(profile),
                    );
                }
            };
            let (score, breakdown) = compute_score(&shipper, rank, open);
            candidates.push(ScoredCandidate {
                shipper,
                distance_rank: rank,
                open_orders: open,
                score,
                breakdown,
            });
        }

        if candidates.is_empty() {
            return InternalDispatch::NoCandidates;
        }

        let ranked = rank_candidates(candidates);
        let attempts = self.config.assignment_retry_limit.max(1);
        let mut last_guard: Option<ErrorCode> = None;

        for candidate in ranked.iter().take(attempts) {
            match attempt_assignment(self.store.as_ref(), candidate.shipper.id, order.id, Utc::now())
                .await
            {
                Ok(outcome) => {
                    self.metrics
                        .shipper_open_orders
                        .with_label_values(&[&outcome.shipper.id.to_string()])
                        .set(outcome.shipper.orders_today as f64);
                    info!(
                        order_id = %order.id,
                        shipper_id = %outcome.shipper.id,
                        shipper = %outcome.shipper.name,
                        score = candidate.score,
                        distance_rank = candidate.distance_rank,
                        "order assigned"
                    );
                    return InternalDispatch::Done(AssignmentResult {
                        success: true,
                        shipper_id: Some(outcome.shipper.id),
                        shipper_name: Some(outcome.shipper.name.clone()),
                        score: Some(candidate.score),
                        distance_rank: Some(candidate.distance_rank),
                        delivery_method: Some(profile.delivery_method),
                        estimated_hours: Some(profile.estimated_hours),
                        distance_km: Some(profile.distance_km),
                        error_code: None,
                        message: format!("assigned to {}", outcome.shipper.name),
                    });
                }
                // Another run won the order; other candidates would only
                // re-discover that.
                Err(AttemptError::AlreadyAssigned) => {
                    return InternalDispatch::Done(
                        AssignmentResult::failed(
                            ErrorCode::OrderAlreadyAssigned,
                            format!("order {} was assigned concurrently", order.id),
                        )
                        .with_profile(profile),
                    );
                }
                Err(AttemptError::Store(err)) => {
                    error!(order_id = %order.id, error = %err, "assignment transaction failed");
                    return InternalDispatch::Done(
                        AssignmentResult::failed(
                            ErrorCode::AssignmentError,
                            format!("storage failure during assignment: {err}"),
                        )
                        .with_profile(profile),
                    );
                }
                Err(err) => {
                    warn!(
                        order_id = %order.id,
                        shipper_id = %candidate.shipper.id,
                        reason = ?err,
                        "candidate rejected under lock, trying next"
                    );
                    last_guard = err.guard_code().or(last_guard);
                }
            }
        }

        let code = last_guard.unwrap_or(ErrorCode::NoEligibleWorker);
        InternalDispatch::Done(
            AssignmentResult::failed(code, "every ranked candidate was rejected under lock")
                .with_profile(profile),
        )
    }

    async fn route_external(
        &self,
        order: &Order,
        address: &StructuredAddress,
        profile: &DistanceProfile,
    ) -> AssignmentResult {
        let note = format!(
            "routed to external carrier: {:.0} km, eta {} h",
            profile.distance_km, profile.estimated_hours
        );
        let routed = match self.mark_pending_external(order.id, &note).await {
            Ok(Some(routed)) => routed,
            // A concurrent bind won the order; its commit stands.
            Ok(None) => {
                info!(order_id = %order.id, "external routing dropped, order was taken concurrently");
                return AssignmentResult::failed(
                    ErrorCode::OrderAlreadyAssigned,
                    format!("order {} was assigned concurrently", order.id),
                )
                .with_profile(profile);
            }
            Err(err) => {
                error!(order_id = %order.id, error = %err, "failed to persist external routing");
                return AssignmentResult::failed(
                    ErrorCode::AssignmentError,
                    format!("storage failure during external routing: {err}"),
                )
                .with_profile(profile);
            }
        };

        let payload = ShipmentPayload {
            order_id: routed.id,
            destination: address.display(),
            estimated_hours: profile.estimated_hours,
            customer_contact: routed.customer_contact.clone(),
        };

        match self.notifier.send(&payload).await {
            Ok(()) => {
                info!(
                    order_id = %order.id,
                    destination = %payload.destination,
                    "order routed to external carrier"
                );
                AssignmentResult {
                    success: true,
                    shipper_id: None,
                    shipper_name: None,
                    score: None,
                    distance_rank: None,
                    delivery_method: Some(profile.delivery_method),
                    estimated_hours: Some(profile.estimated_hours),
                    distance_km: Some(profile.distance_km),
                    error_code: None,
                    message: "routed to external carrier".to_string(),
                }
            }
            Err(err) => {
                warn!(
                    order_id = %order.id,
                    error = %err,
                    "carrier notification failed; order stays routed"
                );
                if let Err(save_err) = self
                    .append_order_note(order.id, &format!("carrier notification failed: {err}"))
                    .await
                {
                    error!(order_id = %order.id, error = %save_err, "failed to record notification failure");
                }
                AssignmentResult {
                    success: true,
                    shipper_id: None,
                    shipper_name: None,
                    score: None,
                    distance_rank: None,
                    delivery_method: Some(profile.delivery_method),
                    estimated_hours: Some(profile.estimated_hours),
                    distance_km: Some(profile.distance_km),
                    error_code: Some(ErrorCode::ThirdPartyNotifyFailed),
                    message: format!("routed to external carrier, notification failed: {err}"),
                }
            }
        }
    }

    // The third-party transition takes the same order row lock as the
    // assignment transaction, so a committed bind is never overwritten.
    async fn mark_pending_external(
        &self,
        order_id: Uuid,
        note: &str,
    ) -> Result<Option<Order>, DispatchError> {
        let mut tx = self.store.begin().await?;
        let mut order = tx.lock_order(order_id).await?;
        if !order.is_unassigned() {
            return Ok(None);
        }
        order.status = OrderStatus::PendingExternal;
        order.append_note(note);
        tx.stage_order(order.clone());
        tx.commit().await?;
        Ok(Some(order))
    }

    async fn append_order_note(&self, order_id: Uuid, note: &str) -> Result<(), DispatchError> {
        let mut tx = self.store.begin().await?;
        let mut order = tx.lock_order(order_id).await?;
        order.append_note(note);
        tx.stage_order(order);
        tx.commit().await?;
        Ok(())
    }

    pub async fn assign_many(&self, orders: &[Order]) -> Vec<AssignmentResult> {
        let mut results = Vec::with_capacity(orders.len());
        for chunk in orders.chunks(self.config.batch_size.max(1)) {
            results.extend(join_all(chunk.iter().map(|order| self.assign(order))).await);
        }
        results
    }

    pub async fn set_shipper_availability(
        &self,
        shipper_id: Uuid,
        available: bool,
    ) -> Result<Shipper, DispatchError> {
        self.update_shipper(shipper_id, |shipper| shipper.available = available)
            .await
    }

    pub async fn set_shipper_priority(
        &self,
        shipper_id: Uuid,
        priority: u8,
    ) -> Result<Shipper, DispatchError> {
        self.update_shipper(shipper_id, |shipper| {
            shipper.priority = priority.clamp(1, 10)
        })
        .await
    }

    // Zero means unlimited.
    pub async fn set_shipper_quota(
        &self,
        shipper_id: Uuid,
        max_orders_per_day: u32,
    ) -> Result<Shipper, DispatchError> {
        self.update_shipper(shipper_id, |shipper| {
            shipper.max_orders_per_day = max_orders_per_day
        })
        .await
    }

    // Profile edits share the assignment row lock, so a toggle never
    // interleaves with a half-committed bind.
    async fn update_shipper(
        &self,
        shipper_id: Uuid,
        apply: impl FnOnce(&mut Shipper),
    ) -> Result<Shipper, DispatchError> {
        let mut tx = self.store.begin().await?;
        let mut shipper = tx.lock_shipper(shipper_id).await?;
        apply(&mut shipper);
        shipper.updated_at = Utc::now();
        tx.stage_shipper(shipper.clone());
        tx.commit().await?;
        info!(shipper_id = %shipper.id, "shipper profile updated");
        Ok(shipper)
    }

    pub async fn replace_shipper_zones(
        &self,
        shipper_id: Uuid,
        mut zones: Vec<ServiceZone>,
    ) -> Result<Vec<ServiceZone>, DispatchError> {
        for zone in &mut zones {
            zone.shipper_id = shipper_id;
        }
        validate_zones(&self.config, &zones)?;
        let stored = self.store.replace_zones(shipper_id, zones).await?;
        info!(shipper_id = %shipper_id, zones = stored.len(), "service zones replaced");
        Ok(stored)
    }

    pub async fn sweep_unassigned(&self) -> Result<SweepReport, DispatchError> {
        let orders = self.store.unassigned_orders().await?;
        if orders.is_empty() {
            self.metrics.unassigned_orders.set(0);
            return Ok(SweepReport::default());
        }

        info!(orders = orders.len(), "sweeping unassigned orders");
        let results = self.assign_many(&orders).await;

        let mut report = SweepReport {
            swept: orders.len(),
            ..SweepReport::default()
        };
        for result in &results {
            if !result.success {
                report.failed += 1;
            } else if result.shipper_id.is_some() {
                report.assigned += 1;
            } else {
                report.routed_external += 1;
            }
        }
        self.metrics.unassigned_orders.set(report.failed as i64);
        info!(
            swept = report.swept,
            assigned = report.assigned,
            external = report.routed_external,
            failed = report.failed,
            "sweep finished"
        );
        Ok(report)
    }

    // Counters are recomputed from the orders that actually exist, not
    // zeroed, so drift from crashes or manual edits heals here.
    pub async fn reset_daily_counts(&self) -> Result<usize, DispatchError> {
        let shippers = self.store.all_shippers().await?;
        let mut updated = 0;
        for shipper in shippers {
            match self.reset_shipper_count(shipper.id).await {
                Ok(open) => {
                    updated += 1;
                    self.metrics
                        .shipper_open_orders
                        .with_label_values(&[&shipper.id.to_string()])
                        .set(open as f64);
                }
                Err(err) => {
                    warn!(shipper_id = %shipper.id, error = %err, "daily reset skipped for shipper");
                }
            }
        }
        info!(updated, "daily order counters recomputed");
        Ok(updated)
    }

    async fn reset_shipper_count(&self, shipper_id: Uuid) -> Result<u32, DispatchError> {
        let mut tx = self.store.begin().await?;
        let mut shipper = tx.lock_shipper(shipper_id).await?;
        let open = tx.count_open_orders(shipper_id).await?;
        shipper.orders_today = open;
        shipper.updated_at = Utc::now();
        tx.stage_shipper(shipper);
        tx.commit().await?;
        Ok(open)
    }
}
