pub(crate) mod healthz;
pub(crate) mod metrics;
pub(crate) mod pipeline_environments;
pub(crate) mod status;
