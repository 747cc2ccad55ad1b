use anyhow::{Context, Result};
use axum::{routing::get, Router};
use metrics::{describe_counter, describe_gauge, describe_histogram, Unit};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the Prometheus recorder and describe the polling metrics.
    pub fn init() -> Result<Self> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .context("prometheus: install recorder")?;
        describe_all();
        Ok(Self { handle })
    }

    /// Returns a router exposing `/metrics` with the Prometheus exposition format.
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }
}

pub fn describe_all() {
    describe_counter!("poll_cycles_total", "Polling cycles started");
    describe_counter!("poll_items_fetched_total", "Items returned by source adapters");
    describe_counter!("poll_items_processed_total", "Fresh items classified and handed to delivery");
    describe_counter!("poll_source_errors_total", "Source fetches that failed");
    describe_counter!("poll_store_errors_total", "Cursor store reads or writes that failed");
    describe_counter!("poll_parse_rejects_total", "Upstream records dropped at the parse boundary");
    describe_counter!("poll_deliveries_total", "Webhook deliveries accepted");
    describe_counter!("poll_delivery_failures_total", "Webhook deliveries that failed after retries");
    describe_gauge!("poll_last_cycle_ts", Unit::Seconds, "Unix time the last cycle finished");
    describe_counter!("ingest_records_accepted_total", "Upstream records accepted per platform");
    describe_histogram!("ingest_parse_ms", Unit::Milliseconds, "Time spent parsing a news page");
}
