use crate::api::main::ServerState;
use actix_web::{get, web::Data as WebData, HttpResponse};
use chrono::{DateTime, Utc};
use pipeline_env_types::status::Status;

/// Commit the service was built from, `"0"` when unknown.
pub(crate) const BUILD_COMMIT: &str = env!("BUILD_COMMIT");
/// Build time of the service, `"0"` when unknown.
pub(crate) const BUILD_TIME: &str = env!("BUILD_TIME");

pub(crate) fn service_status(started_at: DateTime<Utc>) -> Status {
    Status {
        commit: BUILD_COMMIT.to_string(),
        build_time: BUILD_TIME.to_string(),
        start_time: started_at.format("%Y-%m-%dT%H:%M:%SZ").to_string(),
    }
}

/// Build and runtime information of the service.
#[utoipa::path(
    responses(
        (status = OK, description = "Service status", body = Status),
    ),
    tag = "Status"
)]
#[get("/status")]
pub(crate) async fn get_status(state: WebData<ServerState>) -> HttpResponse {
    HttpResponse::Ok().json(service_status(state.started_at))
}
