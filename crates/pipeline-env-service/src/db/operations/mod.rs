pub mod connectivity;
pub mod pipeline_environment;
pub mod utils;
