//! Prometheus metrics HTTP endpoint
//!
//! Exposes station metrics in Prometheus text format at /metrics.
//! Uses hyper for the HTTP server.

use crate::infra::metrics::{Metrics, MetricsSnapshot, METRICS_BUCKET_BOUNDS, METRICS_NUM_BUCKETS};
use bytes::Bytes;
use http_body_util::Full;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::fmt::Write;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info};

enum MetricType {
    Counter,
    Gauge,
}

impl MetricType {
    fn as_str(&self) -> &'static str {
        match self {
            MetricType::Counter => "counter",
            MetricType::Gauge => "gauge",
        }
    }
}

/// Write a simple metric (counter or gauge) with station label
fn write_metric(
    output: &mut String,
    name: &str,
    help: &str,
    typ: MetricType,
    station: &str,
    val: u64,
) {
    let _ = writeln!(output, "# HELP {name} {help}");
    let _ = writeln!(output, "# TYPE {name} {}", typ.as_str());
    let _ = writeln!(output, "{name}{{station=\"{station}\"}} {val}");
}

/// Write a histogram metric with cumulative buckets, sum, and count
fn write_histogram(
    output: &mut String,
    name: &str,
    help: &str,
    station: &str,
    buckets: &[u64; METRICS_NUM_BUCKETS],
    sum: u64,
) {
    let _ = writeln!(output, "# HELP {name} {help}");
    let _ = writeln!(output, "# TYPE {name} histogram");

    let mut cumulative = 0u64;
    for (i, &bound) in METRICS_BUCKET_BOUNDS.iter().enumerate() {
        cumulative += buckets[i];
        let _ =
            writeln!(output, "{name}_bucket{{station=\"{station}\",le=\"{bound}\"}} {cumulative}");
    }
    cumulative += buckets[METRICS_NUM_BUCKETS - 1];
    let _ = writeln!(output, "{name}_bucket{{station=\"{station}\",le=\"+Inf\"}} {cumulative}");
    let _ = writeln!(output, "{name}_sum{{station=\"{station}\"}} {sum}");
    let _ = writeln!(output, "{name}_count{{station=\"{station}\"}} {cumulative}");
}

/// Format metrics in Prometheus text exposition format
fn format_prometheus_metrics(metrics: &Metrics, station_id: &str) -> String {
    let snapshot = metrics.snapshot();
    let mut output = String::with_capacity(4096);

    write_scan_metrics(&mut output, station_id, &snapshot);
    write_error_metrics(&mut output, station_id, &snapshot);
    write_conveyor_metrics(&mut output, station_id, &snapshot);
    write_histogram(
        &mut output,
        "station_pipeline_latency_ms",
        "Scan pipeline duration in milliseconds",
        station_id,
        &snapshot.latency_buckets,
        snapshot.latency_sum_ms,
    );

    output
}

fn write_scan_metrics(output: &mut String, station: &str, snapshot: &MetricsSnapshot) {
    write_metric(
        output,
        "station_scans_total",
        "Scans that entered the pipeline",
        MetricType::Counter,
        station,
        snapshot.scans_total,
    );
    write_metric(
        output,
        "station_garments_accepted_total",
        "Garments accepted into a reserved slot",
        MetricType::Counter,
        station,
        snapshot.accepted_total,
    );
    write_metric(
        output,
        "station_tickets_completed_total",
        "Ticket families completed",
        MetricType::Counter,
        station,
        snapshot.tickets_completed_total,
    );
    write_metric(
        output,
        "station_garments_on_conveyor_total",
        "Garments confirmed by the hanger sensor",
        MetricType::Counter,
        station,
        snapshot.garments_on_conveyor_total,
    );
    write_metric(
        output,
        "station_rejected_busy_total",
        "Submissions rejected with a full command queue",
        MetricType::Counter,
        station,
        snapshot.rejected_busy_total,
    );
    write_metric(
        output,
        "station_rejected_disconnected_total",
        "Scans refused while the conveyor link was down",
        MetricType::Counter,
        station,
        snapshot.rejected_disconnected_total,
    );
}

fn write_error_metrics(output: &mut String, station: &str, snapshot: &MetricsSnapshot) {
    let name = "station_scan_errors_total";
    let _ = writeln!(output, "# HELP {name} Scan errors by kind");
    let _ = writeln!(output, "# TYPE {name} counter");
    for (kind, count) in &snapshot.errors_total {
        let _ = writeln!(
            output,
            "{name}{{station=\"{station}\",kind=\"{}\"}} {count}",
            kind.as_str()
        );
    }
}

fn write_conveyor_metrics(output: &mut String, station: &str, snapshot: &MetricsSnapshot) {
    write_metric(
        output,
        "station_link_connected",
        "Conveyor link state (1=connected)",
        MetricType::Gauge,
        station,
        u64::from(snapshot.link_connected),
    );
    write_metric(
        output,
        "station_link_drops_total",
        "Conveyor link disconnections",
        MetricType::Counter,
        station,
        snapshot.link_drops_total,
    );
    write_metric(
        output,
        "station_clear_conveyor_total",
        "Confirmed clear-conveyor gestures",
        MetricType::Counter,
        station,
        snapshot.clear_conveyor_total,
    );
    write_metric(
        output,
        "station_slots_total",
        "Slots on the conveyor",
        MetricType::Gauge,
        station,
        snapshot.slots_total,
    );
    write_metric(
        output,
        "station_slots_used",
        "Occupied slots at last refresh",
        MetricType::Gauge,
        station,
        snapshot.slots_used,
    );
}

async fn handle_request(
    req: Request<hyper::body::Incoming>,
    metrics: Arc<Metrics>,
    station_id: Arc<String>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    match (req.method(), req.uri().path()) {
        (&Method::GET, "/metrics") => {
            let body = format_prometheus_metrics(&metrics, &station_id);
            Ok(Response::builder()
                .status(StatusCode::OK)
                .header("Content-Type", "text/plain; version=0.0.4; charset=utf-8")
                .body(Full::new(Bytes::from(body)))
                .expect("static response should not fail"))
        }
        (&Method::GET, "/health") => Ok(Response::builder()
            .status(StatusCode::OK)
            .body(Full::new(Bytes::from("ok")))
            .expect("static response should not fail")),
        _ => Ok(Response::builder()
            .status(StatusCode::NOT_FOUND)
            .body(Full::new(Bytes::from("Not Found")))
            .expect("static response should not fail")),
    }
}

/// Start the Prometheus metrics HTTP server
pub async fn start_metrics_server(
    port: u16,
    metrics: Arc<Metrics>,
    station_id: String,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    let station_id = Arc::new(station_id);

    info!(port = %port, station = %station_id, "prometheus_metrics_server_started");

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, _addr)) => {
                        let io = TokioIo::new(stream);
                        let metrics = metrics.clone();
                        let station_id = station_id.clone();

                        tokio::spawn(async move {
                            let service = service_fn(move |req| {
                                let metrics = metrics.clone();
                                let station_id = station_id.clone();
                                async move { handle_request(req, metrics, station_id).await }
                            });

                            if let Err(e) = http1::Builder::new()
                                .serve_connection(io, service)
                                .await
                            {
                                error!(error = %e, "prometheus_http_error");
                            }
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "prometheus_accept_error");
                    }
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("prometheus_metrics_server_shutdown");
                    return Ok(());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ErrorKind;

    #[test]
    fn test_format_prometheus_metrics() {
        let metrics = Metrics::new();

        metrics.record_scan();
        metrics.record_accepted();
        metrics.record_error(ErrorKind::NotFound);
        metrics.record_pipeline_latency(120);
        metrics.set_slot_occupancy(200, 37);

        let output = format_prometheus_metrics(&metrics, "press-1");

        assert!(output.contains("station_scans_total{station=\"press-1\"} 1"));
        assert!(output.contains("station_garments_accepted_total{station=\"press-1\"} 1"));
        assert!(output
            .contains("station_scan_errors_total{station=\"press-1\",kind=\"not_found\"} 1"));
        assert!(output.contains("station_slots_used{station=\"press-1\"} 37"));
        assert!(output.contains("station_link_connected{station=\"press-1\"} 1"));
        assert!(output
            .contains("station_pipeline_latency_ms_bucket{station=\"press-1\",le=\"+Inf\"} 1"));
        assert!(output.contains("station_pipeline_latency_ms_sum{station=\"press-1\"} 120"));
    }
}
