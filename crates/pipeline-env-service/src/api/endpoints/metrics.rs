use crate::api::main::ServerState;
use actix_web::{get, http::header::ContentType, web::Data as WebData, HttpResponse};

/// A prometheus-compatible metrics scrape endpoint.
#[get("/metrics")]
pub(crate) async fn get_metrics(state: WebData<ServerState>) -> HttpResponse {
    HttpResponse::Ok()
        .content_type(ContentType::plaintext())
        .body(state.metrics.render())
}
