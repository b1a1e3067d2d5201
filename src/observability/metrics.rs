use prometheus::{Encoder, HistogramVec, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub dispatches_total: IntCounterVec,
    pub race_accepts_total: IntCounterVec,
    pub settlements_total: IntCounterVec,
    pub bookings_in_queue: IntGauge,
    pub connected_sessions: IntGauge,
    pub online_barbers: IntGauge,
    pub dispatch_latency_seconds: HistogramVec,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let dispatches_total = IntCounterVec::new(
            Opts::new("dispatches_total", "Dispatched bookings by outcome"),
            &["outcome"],
        )
        .expect("valid dispatches_total metric");

        let race_accepts_total = IntCounterVec::new(
            Opts::new("race_accepts_total", "Accept calls by race outcome"),
            &["outcome"],
        )
        .expect("valid race_accepts_total metric");

        let settlements_total = IntCounterVec::new(
            Opts::new("settlements_total", "Settlement events by kind"),
            &["kind"],
        )
        .expect("valid settlements_total metric");

        let bookings_in_queue =
            IntGauge::new("bookings_in_queue", "Bookings waiting for dispatch")
                .expect("valid bookings_in_queue metric");

        let connected_sessions =
            IntGauge::new("connected_sessions", "Live websocket sessions")
                .expect("valid connected_sessions metric");

        let online_barbers = IntGauge::new("online_barbers", "Barbers currently online")
            .expect("valid online_barbers metric");

        let dispatch_latency_seconds = HistogramVec::new(
            prometheus::HistogramOpts::new(
                "dispatch_latency_seconds",
                "Latency of dispatch processing in seconds",
            ),
            &["outcome"],
        )
        .expect("valid dispatch_latency_seconds metric");

        registry
            .register(Box::new(dispatches_total.clone()))
            .expect("register dispatches_total");
        registry
            .register(Box::new(race_accepts_total.clone()))
            .expect("register race_accepts_total");
        registry
            .register(Box::new(settlements_total.clone()))
            .expect("register settlements_total");
        registry
            .register(Box::new(bookings_in_queue.clone()))
            .expect("register bookings_in_queue");
        registry
            .register(Box::new(connected_sessions.clone()))
            .expect("register connected_sessions");
        registry
            .register(Box::new(online_barbers.clone()))
            .expect("register online_barbers");
        registry
            .register(Box::new(dispatch_latency_seconds.clone()))
            .expect("register dispatch_latency_seconds");

        Self {
            registry,
            dispatches_total,
            race_accepts_total,
            settlements_total,
            bookings_in_queue,
            connected_sessions,
            online_barbers,
            dispatch_latency_seconds,
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
