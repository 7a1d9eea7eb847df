pub mod pipeline_environment;
