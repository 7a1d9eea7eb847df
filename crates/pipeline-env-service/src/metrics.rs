use ::metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use log::warn;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use std::time::Duration;

pub(crate) const HTTP_REQUESTS: &str = "pipeline_env.http.requests";
pub(crate) const HTTP_REQUEST_LATENCY: &str = "pipeline_env.http.request_latency";

/// Initialize metrics.
pub fn init() -> PrometheusHandle {
    describe_counter!(
        HTTP_REQUESTS,
        Unit::Count,
        "Number of HTTP requests by method, route and status"
    );
    describe_histogram!(
        HTTP_REQUEST_LATENCY,
        Unit::Seconds,
        "HTTP request latency by method and route"
    );

    install_metrics_recorder()
}

/// Install a Prometheus recorder.
fn install_metrics_recorder() -> PrometheusHandle {
    static METRIC_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();
    METRIC_HANDLE
        .get_or_init(|| {
            let recorder = PrometheusBuilder::new().build_recorder();
            let handle = recorder.handle();
            if let Err(e) = ::metrics::set_global_recorder(recorder) {
                warn!("Unable to install metrics recorder: {e}");
            }
            handle
        })
        .clone()
}

/// Records one served request.
///
/// `route` is the matched route pattern, so that path parameters do not blow
/// up the label cardinality.
pub(crate) fn record_request(method: &str, route: &str, status: u16, latency: Duration) {
    counter!(
        HTTP_REQUESTS,
        "method" => method.to_string(),
        "route" => route.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!(
        HTTP_REQUEST_LATENCY,
        "method" => method.to_string(),
        "route" => route.to_string()
    )
    .record(latency.as_secs_f64());
}
