use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, FixedOffset, TimeZone, Utc};
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, MissedTickBehavior};
use tracing::{error, info};

use crate::engine::DispatchEngine;

pub struct SweepScheduler {
    engine: Arc<DispatchEngine>,
}

pub struct SweepHandles {
    pub sweep: JoinHandle<()>,
    pub reset: JoinHandle<()>,
}

impl SweepHandles {
    pub fn abort(&self) {
        self.sweep.abort();
        self.reset.abort();
    }
}

impl SweepScheduler {
    pub fn new(engine: Arc<DispatchEngine>) -> Self {
        Self { engine }
    }

    pub fn spawn(self) -> SweepHandles {
        let sweep = tokio::spawn(run_sweep_loop(self.engine.clone()));
        let reset = tokio::spawn(run_reset_loop(self.engine));
        SweepHandles { sweep, reset }
    }
}

async fn run_sweep_loop(engine: Arc<DispatchEngine>) {
    let period = engine.config().sweep_interval;
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // An interval fires immediately; consume that so the first sweep
    // waits one full period after startup.
    ticker.tick().await;
    info!(period_secs = period.as_secs(), "sweep loop started");

    loop {
        ticker.tick().await;
        match engine.sweep_unassigned().await {
            Ok(_) => {
                engine
                    .metrics()
                    .maintenance_runs_total
                    .with_label_values(&["sweep", "ok"])
                    .inc();
            }
            Err(err) => {
                engine
                    .metrics()
                    .maintenance_runs_total
                    .with_label_values(&["sweep", "error"])
                    .inc();
                error!(error = %err, "sweep run failed");
            }
        }
    }
}

async fn run_reset_loop(engine: Arc<DispatchEngine>) {
    let offset_hours = engine.config().day_boundary_offset_hours;
    info!(offset_hours, "daily reset loop started");

    loop {
        let wait = until_next_midnight(offset_hours, Utc::now());
        sleep(wait).await;
        match engine.reset_daily_counts().await {
            Ok(_) => {
                engine
                    .metrics()
                    .maintenance_runs_total
                    .with_label_values(&["reset", "ok"])
                    .inc();
            }
            Err(err) => {
                engine
                    .metrics()
                    .maintenance_runs_total
                    .with_label_values(&["reset", "error"])
                    .inc();
                error!(error = %err, "daily reset failed");
            }
        }
    }
}

// Arithmetic edge cases fall back to an hourly retry rather than panicking
// inside a long-lived loop.
fn until_next_midnight(offset_hours: i32, now: DateTime<Utc>) -> Duration {
    const FALLBACK: Duration = Duration::from_secs(60 * 60);

    let Some(offset) = FixedOffset::east_opt(offset_hours.saturating_mul(3600)) else {
        return FALLBACK;
    };
    let local = now.with_timezone(&offset);
    let Some(next_day) = local.date_naive().succ_opt() else {
        return FALLBACK;
    };
    let Some(midnight) = next_day.and_hms_opt(0, 0, 0) else {
        return FALLBACK;
    };
    match offset.from_local_datetime(&midnight).single() {
        Some(target) => (target - local).to_std().unwrap_or(FALLBACK),
        None => FALLBACK,
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::{TimeZone, Utc};

    use super::until_next_midnight;

    #[test]
    fn half_an_hour_before_plus_seven_midnight() {
        // 16:30 UTC is 23:30 in UTC+7.
        let now = Utc.with_ymd_and_hms(2024, 3, 10, 16, 30, 0).unwrap();
        assert_eq!(until_next_midnight(7, now), Duration::from_secs(30 * 60));
    }

    #[test]
    fn full_day_exactly_at_midnight() {
        // 17:00 UTC is 00:00 in UTC+7; the next boundary is a day out.
        let now = Utc.with_ymd_and_hms(2024, 3, 10, 17, 0, 0).unwrap();
        assert_eq!(
            until_next_midnight(7, now),
            Duration::from_secs(24 * 60 * 60)
        );
    }

    #[test]
    fn out_of_range_offset_falls_back() {
        let now = Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap();
        assert_eq!(until_next_midnight(400, now), Duration::from_secs(60 * 60));
    }

    #[test]
    fn extreme_offset_saturates_instead_of_overflowing() {
        let now = Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap();
        assert_eq!(
            until_next_midnight(i32::MAX, now),
            Duration::from_secs(60 * 60)
        );
        assert_eq!(
            until_next_midnight(i32::MIN, now),
            Duration::from_secs(60 * 60)
        );
    }
}
