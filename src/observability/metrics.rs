use prometheus::{
    Encoder, GaugeVec, HistogramVec, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub dispatch_total: IntCounterVec,
    pub dispatch_latency_seconds: HistogramVec,
    pub unassigned_orders: IntGauge,
    pub shipper_open_orders: GaugeVec,
    pub maintenance_runs_total: IntCounterVec,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let dispatch_total = IntCounterVec::new(
            Opts::new("dispatch_total", "Dispatch outcomes by class"),
            &["outcome"],
        )
        .expect("valid dispatch_total metric");

        let dispatch_latency_seconds = HistogramVec::new(
            prometheus::HistogramOpts::new(
                "dispatch_latency_seconds",
                "End-to-end dispatch latency in seconds",
            ),
            &["outcome"],
        )
        .expect("valid dispatch_latency_seconds metric");

        let unassigned_orders = IntGauge::new(
            "unassigned_orders",
            "Orders still unassigned after the last sweep",
        )
        .expect("valid unassigned_orders metric");

        let shipper_open_orders = GaugeVec::new(
            Opts::new("shipper_open_orders", "Open orders currently bound per shipper"),
            &["shipper_id"],
        )
        .expect("valid shipper_open_orders metric");

        let maintenance_runs_total = IntCounterVec::new(
            Opts::new("maintenance_runs_total", "Background job runs by outcome"),
            &["job", "outcome"],
        )
        .expect("valid maintenance_runs_total metric");

        registry
            .register(Box::new(dispatch_total.clone()))
            .expect("register dispatch_total");
        registry
            .register(Box::new(dispatch_latency_seconds.clone()))
            .expect("register dispatch_latency_seconds");
        registry
            .register(Box::new(unassigned_orders.clone()))
            .expect("register unassigned_orders");
        registry
            .register(Box::new(shipper_open_orders.clone()))
            .expect("register shipper_open_orders");
        registry
            .register(Box::new(maintenance_runs_total.clone()))
            .expect("register maintenance_runs_total");

        Self {
            registry,
            dispatch_total,
            dispatch_latency_seconds,
            unassigned_orders,
            shipper_open_orders,
            maintenance_runs_total,
        }
    }

    pub fn encode(&self) -> Result<String, String> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        TextEncoder::new()
            .encode(&metric_families, &mut buffer)
            .map_err(|err| format!("failed to encode metrics: {err}"))?;

        String::from_utf8(buffer).map_err(|err| format!("metrics are not valid utf8: {err}"))
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
