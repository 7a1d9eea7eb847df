use crate::api::endpoints;
use crate::api::error::ApiError;
use crate::auth::{authenticate, AuthError, TokenVerifier};
use crate::config::ServiceConfig;
use crate::db::health::DbHealth;
use crate::db::storage::Storage;
use crate::error::ServiceError;
use crate::space::SpaceLookup;
use actix_web::body::{BoxBody, MessageBody};
use actix_web::dev::{
    Server, ServerHandle, Service, ServiceFactory, ServiceRequest, ServiceResponse,
};
use actix_web::http::{Method, StatusCode};
use actix_web::{
    get,
    web::{self, Data as WebData},
    App, HttpResponse, HttpServer,
};
use anyhow::{Context, Result as AnyResult};
use chrono::{DateTime, Utc};
use futures_util::FutureExt;
use log::{error, info, log, trace, Level};
use metrics_exporter_prometheus::PrometheusHandle;
use std::net::TcpListener;
use std::sync::Arc;
use std::time::Instant;
use tokio::signal;
use tokio::sync::Mutex;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

#[derive(OpenApi)]
#[openapi(
    modifiers(&SecurityAddon),
    info(
        title = "Pipeline environments API",
        description = r"
A pipeline environment is a named, ordered set of deployment environments
that belongs to a space of the work item tracker.

* The name of a pipeline environment is unique within its space.
* A space must be known to the work item tracker before pipeline
  environments can be created in it.
* Pipeline environments are immutable once created.

Errors are reported as JSON-API error documents. The `Location` header of an
error response names the error, which is logged under the same identifier."
    ),
    paths(
        endpoints::pipeline_environments::post_pipeline_environment,
        endpoints::pipeline_environments::get_pipeline_environment,
        endpoints::status::get_status,
    ),
    components(schemas(
        pipeline_env_types::pipeline_environment::PipelineEnvironmentSingle,
        pipeline_env_types::pipeline_environment::PipelineEnvironmentData,
        pipeline_env_types::pipeline_environment::PipelineEnvironmentAttributes,
        pipeline_env_types::pipeline_environment::EnvironmentAttributes,
        pipeline_env_types::pipeline_environment::GenericLinks,
        pipeline_env_types::status::Status,
        pipeline_env_types::error::ErrorResponse,
        pipeline_env_types::error::ErrorObject,
    )),
    tags(
        (name = "Pipeline environments", description = "Create and show pipeline environments."),
        (name = "Status", description = "Build and runtime information."),
    ),
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "JSON web token (JWT)",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .description(Some("RS256 signed token of the calling identity."))
                        .build(),
                ),
            )
        }
    }
}

pub(crate) struct ServerState {
    pub db: Arc<dyn Storage>,
    pub space: Arc<dyn SpaceLookup>,
    pub verifier: TokenVerifier,
    pub metrics: PrometheusHandle,
    pub started_at: DateTime<Utc>,
    pub health: Arc<Mutex<DbHealth>>,
}

impl ServerState {
    pub async fn new(
        config: &ServiceConfig,
        db: Arc<dyn Storage>,
        space: Arc<dyn SpaceLookup>,
        metrics: PrometheusHandle,
    ) -> Result<Self, AuthError> {
        let verifier = TokenVerifier::new(config.auth_public_key.as_deref())?;
        let health = DbHealth::watch(db.clone());
        Ok(Self {
            db,
            space,
            verifier,
            metrics,
            started_at: Utc::now(),
            health,
        })
    }

    #[cfg(test)]
    pub(crate) async fn test_state(
        config: ServiceConfig,
        db: Arc<dyn Storage>,
        space: Arc<dyn SpaceLookup>,
    ) -> Self {
        Self::new(&config, db, space, crate::metrics::init())
            .await
            .unwrap()
    }
}

/// Request bodies that fail to decode are reported as [`ApiError::InvalidPayload`].
fn json_config() -> web::JsonConfig {
    web::JsonConfig::default()
        .content_type_required(false)
        .error_handler(|err, _req| {
            ServiceError::from(ApiError::InvalidPayload {
                reason: err.to_string(),
            })
            .into()
        })
}

/// Logs the responses of the HTTP server and records them in the metrics.
pub fn log_response(
    res: Result<ServiceResponse<BoxBody>, actix_web::Error>,
    start: Instant,
) -> Result<ServiceResponse<BoxBody>, actix_web::Error> {
    match &res {
        Ok(response) => {
            let req = response.request();
            let status = response.status();
            let level = if status.is_success()
                || status.is_informational()
                || status.is_redirection()
            {
                if req.method() == Method::GET && req.path() == "/healthz" {
                    Level::Trace
                } else {
                    Level::Debug
                }
            } else if status.is_client_error() || status == StatusCode::SERVICE_UNAVAILABLE {
                Level::Info
            } else {
                Level::Error
            };
            log!(
                level,
                "Response: {} (size: {:?}) to request {} {}",
                status,
                response.response().body().size(),
                req.method(),
                req.path()
            );
            let route = req
                .match_pattern()
                .unwrap_or_else(|| "unmatched".to_string());
            crate::metrics::record_request(
                req.method().as_str(),
                &route,
                status.as_u16(),
                start.elapsed(),
            );
        }
        Err(e) => {
            error!("Service response error: {e}");
        }
    }
    res
}

/// The application serving the API, with `/metrics` mounted when
/// `with_metrics` is set.
pub(crate) fn build_app(
    state: WebData<ServerState>,
    with_metrics: bool,
) -> App<
    impl ServiceFactory<
        ServiceRequest,
        Config = (),
        Response = ServiceResponse<BoxBody>,
        Error = actix_web::Error,
        InitError = (),
    >,
> {
    App::new()
        .app_data(state)
        .app_data(json_config())
        .wrap_fn(|req, srv| {
            if let Some(state) = req.app_data::<WebData<ServerState>>() {
                authenticate(&req, &state.verifier);
            }
            srv.call(req)
        })
        .wrap_fn(|req, srv| {
            trace!("Request: {} {}", req.method(), req.path());
            let start = Instant::now();
            srv.call(req).map(move |res| log_response(res, start))
        })
        .configure(move |cfg| {
            if with_metrics {
                cfg.service(endpoints::metrics::get_metrics);
            }
        })
        .service(endpoints::pipeline_environments::post_pipeline_environment)
        .service(endpoints::pipeline_environments::get_pipeline_environment)
        .service(endpoints::status::get_status)
        .service(endpoints::healthz::healthz)
        .service(openapi_json)
}

/// The OpenAPI document of this API.
#[get("/api/openapi.json")]
async fn openapi_json() -> HttpResponse {
    HttpResponse::Ok().json(ApiDoc::openapi())
}

fn bind(address: &str, server: &str) -> AnyResult<TcpListener> {
    TcpListener::bind(address).with_context(|| {
        format!("{server} server unable to bind listener to {address} -- is the port occupied?")
    })
}

/// Serves `/metrics` on its own address.
fn metrics_server(address: &str, state: WebData<ServerState>) -> AnyResult<Server> {
    let listener = bind(address, "Metrics")?;
    info!("Metrics HTTP server: ready on {}", listener.local_addr()?);
    Ok(HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .service(endpoints::metrics::get_metrics)
    })
    .workers(1)
    .listen(listener)?
    .run())
}

/// Serves `/status` and `/healthz` on the diagnostics address.
fn diagnose_server(address: &str, state: WebData<ServerState>) -> AnyResult<Server> {
    let listener = bind(address, "Diagnostics")?;
    info!(
        "Diagnostics HTTP server: ready on {}",
        listener.local_addr()?
    );
    Ok(HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .service(endpoints::status::get_status)
            .service(endpoints::healthz::healthz)
    })
    .workers(1)
    .listen(listener)?
    .run())
}

async fn stop_all(handles: &[ServerHandle]) {
    for handle in handles {
        handle.stop(true).await;
    }
}

/// Runs the API server, and the metrics and diagnostics servers when they
/// have addresses of their own, until Ctrl+C or SIGTERM.
pub async fn run(
    config: ServiceConfig,
    db: Arc<dyn Storage>,
    space: Arc<dyn SpaceLookup>,
) -> AnyResult<()> {
    let listener = bind(&config.http_address, "API")?;
    let metrics = crate::metrics::init();
    let state = WebData::new(ServerState::new(&config, db, space, metrics).await?);

    let with_metrics = config.metrics_on_http_address();
    let app_state = state.clone();
    let server = HttpServer::new(move || build_app(app_state.clone(), with_metrics))
        .listen(listener)?
        .run();
    info!(
        "API HTTP server: ready on {} (environment: {})",
        config.http_address, config.environment
    );

    let mut handles = vec![server.handle()];
    if !with_metrics {
        let metrics_server = metrics_server(&config.metrics_http_address, state.clone())?;
        handles.push(metrics_server.handle());
        tokio::spawn(metrics_server);
    }
    if let Some(address) = config.diagnose_http_address() {
        let diagnose_server = diagnose_server(&address, state.clone())?;
        handles.push(diagnose_server.handle());
        tokio::spawn(diagnose_server);
    }

    // Arrange for graceful shutdown on Ctrl+C and SIGTERM
    let handles_ctrlc = handles.clone();
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            info!("Ctrl+C received, stopping HTTP servers...");
            stop_all(&handles_ctrlc).await;
        }
    });
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal as unix_signal, SignalKind};
        let mut term_stream = unix_signal(SignalKind::terminate())?;
        tokio::spawn(async move {
            term_stream.recv().await;
            info!("SIGTERM received, stopping HTTP servers...");
            stop_all(&handles).await;
        });
    }

    server.await?;
    Ok(())
}

#[cfg(test)]
pub(crate) mod test {
    use super::{build_app, ApiDoc, ServerState};
    use crate::config::ServiceConfig;
    use crate::db::test::DbModel;
    use crate::space::wit::test::wit_client;
    use actix_web::web::Data as WebData;
    use std::sync::Arc;
    use tokio::sync::Mutex;
    use utoipa::OpenApi;
    use wiremock::MockServer;

    /// State backed by the in-memory storage model and a space lookup
    /// against `wit`.
    pub(crate) async fn model_state(
        config: ServiceConfig,
        wit: &MockServer,
    ) -> WebData<ServerState> {
        let db = Arc::new(Mutex::new(DbModel::default()));
        let space = Arc::new(wit_client(&wit.uri()));
        WebData::new(ServerState::test_state(config, db, space).await)
    }

    #[actix_web::test]
    async fn openapi_document_is_served() {
        let wit = MockServer::start().await;
        let state = model_state(ServiceConfig::test_config(), &wit).await;
        let app = actix_web::test::init_service(build_app(state, false)).await;

        let req = actix_web::test::TestRequest::get()
            .uri("/api/openapi.json")
            .to_request();
        let document: serde_json::Value =
            actix_web::test::call_and_read_body_json(&app, req).await;
        let create = &document["paths"]["/api/spaces/{space_id}/pipeline-environments"]["post"];
        let show = &document["paths"]["/pipeline/environments/{space_id}"]["get"];
        assert!(create.is_object());
        assert!(show.is_object());
        assert_eq!(document, serde_json::to_value(ApiDoc::openapi()).unwrap());
    }

    #[actix_web::test]
    async fn metrics_mounted_only_when_requested() {
        let wit = MockServer::start().await;
        let state = model_state(ServiceConfig::test_config(), &wit).await;

        let app = actix_web::test::init_service(build_app(state.clone(), true)).await;
        let req = actix_web::test::TestRequest::get()
            .uri("/metrics")
            .to_request();
        let response = actix_web::test::call_service(&app, req).await;
        assert!(response.status().is_success());

        let app = actix_web::test::init_service(build_app(state, false)).await;
        let req = actix_web::test::TestRequest::get()
            .uri("/metrics")
            .to_request();
        assert_eq!(
            actix_web::test::call_service(&app, req).await.status(),
            actix_web::http::StatusCode::NOT_FOUND
        );
    }
}
