pub mod error;
pub mod pipeline_environment;
pub mod status;
