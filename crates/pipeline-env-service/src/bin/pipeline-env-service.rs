/// The pipeline environments service: the REST API backed by Postgres, with
/// spaces looked up in the work item tracker.
use clap::Parser;
use colored::Colorize;
use log::info;
use pipeline_env_service::api::main::ApiDoc;
use pipeline_env_service::config::{ServiceArgs, ServiceConfig};
use pipeline_env_service::db::storage_postgres::StoragePostgres;
use pipeline_env_service::space::wit::WitClient;
use std::sync::Arc;
use utoipa::OpenApi;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = ServiceArgs::parse();
    if args.dump_openapi {
        let openapi_json = ApiDoc::openapi().to_pretty_json()?;
        tokio::fs::write("openapi.json", openapi_json.as_bytes()).await?;
        return Ok(());
    }
    let config = ServiceConfig::load(args)?;

    let name = "[pipeline-env]".cyan();
    pipeline_env_service::logging::init_logging(name, config.log_level, config.log_json());
    info!(
        "Starting in environment '{}'{}",
        config.environment,
        if config.developer_mode_enabled {
            " with developer mode enabled"
        } else {
            ""
        }
    );

    let db = StoragePostgres::connect(&config.postgres).await?;
    let space = WitClient::new(&config.wit_url, config.wit_timeout)?;
    info!("Looking up spaces at {}", config.wit_url);

    // The api-server blocks until shut down
    pipeline_env_service::api::main::run(config, Arc::new(db), Arc::new(space)).await
}
