use crate::api::main::ServerState;
use crate::error::ServiceError;
use actix_web::{get, web::Data as WebData, HttpResponse};

/// Reachability of the database, as of the last background check.
///
/// This is an internal endpoint and as such is not exposed via OpenAPI.
#[get("/healthz")]
pub(crate) async fn healthz(state: WebData<ServerState>) -> Result<HttpResponse, ServiceError> {
    let health = state.health.lock().await;
    Ok(health.to_http_response())
}
