use crate::api::error::ApiError;
use crate::api::main::ServerState;
use crate::auth::Identity;
use crate::db::types::pipeline_environment::{
    ExtendedPipelineEnvironment, PipelineEnvironmentDescr, SpaceId,
};
use crate::error::ServiceError;
use actix_web::{
    get,
    http::header,
    post,
    web::{self, Data as WebData, ReqData},
    HttpResponse,
};
use log::info;
use pipeline_env_types::error::JSONAPI_MEDIA_TYPE;
use pipeline_env_types::pipeline_environment::{
    pipeline_environment_link, EnvironmentAttributes, GenericLinks, PipelineEnvironmentAttributes,
    PipelineEnvironmentData, PipelineEnvironmentSingle, PIPELINE_ENVIRONMENTS_TYPE,
};
use uuid::Uuid;

fn parse_space_id(value: &str) -> Result<SpaceId, ApiError> {
    Uuid::parse_str(value)
        .map(SpaceId)
        .map_err(|e| ApiError::InvalidUuidParam {
            value: value.to_string(),
            error: e.to_string(),
        })
}

/// Extracts the creation attributes from a request document.
fn descr_from_request(
    document: PipelineEnvironmentSingle,
) -> Result<PipelineEnvironmentDescr, ApiError> {
    let attributes = document.data.attributes;
    if attributes.name.trim().is_empty() {
        return Err(ApiError::InvalidPayload {
            reason: "data.attributes.name must not be empty".to_string(),
        });
    }
    if attributes.name.contains('\0') {
        return Err(ApiError::InvalidPayload {
            reason: "data.attributes.name must not contain NUL characters".to_string(),
        });
    }
    if attributes.environments.is_empty() {
        return Err(ApiError::InvalidPayload {
            reason: "data.attributes.environments must list at least one environment".to_string(),
        });
    }
    Ok(PipelineEnvironmentDescr {
        name: attributes.name,
        environments: attributes
            .environments
            .into_iter()
            .map(|environment| environment.env_uuid)
            .collect(),
    })
}

impl From<ExtendedPipelineEnvironment> for PipelineEnvironmentSingle {
    fn from(pipeline_environment: ExtendedPipelineEnvironment) -> Self {
        let space_id = pipeline_environment.space_id.0;
        PipelineEnvironmentSingle {
            data: PipelineEnvironmentData {
                id: Some(pipeline_environment.id.0),
                kind: PIPELINE_ENVIRONMENTS_TYPE.to_string(),
                attributes: PipelineEnvironmentAttributes {
                    name: pipeline_environment.name,
                    environments: pipeline_environment
                        .environments
                        .into_iter()
                        .map(|env_uuid| EnvironmentAttributes { env_uuid })
                        .collect(),
                    space_id: Some(space_id),
                    created_at: Some(pipeline_environment.created_at),
                    updated_at: Some(pipeline_environment.updated_at),
                },
                links: Some(GenericLinks {
                    self_link: Some(pipeline_environment_link(space_id)),
                }),
            },
        }
    }
}

/// Create a pipeline environment in a space.
///
/// The space must be known to the work item tracker, which is asked on
/// behalf of the caller. The name must not be in use in the space yet.
#[utoipa::path(
    security(("JSON web token (JWT)" = [])),
    params(
        ("space_id" = Uuid, Path, description = "Identifier of the space"),
    ),
    request_body(
        content = PipelineEnvironmentSingle,
        content_type = "application/vnd.api+json",
        description = "Name and environments of the pipeline environment"
    ),
    responses(
        (status = CREATED
            , description = "Pipeline environment created"
            , body = PipelineEnvironmentSingle
            , content_type = "application/vnd.api+json"),
        (status = BAD_REQUEST
            , description = "Invalid space identifier or request document"
            , body = ErrorResponse),
        (status = UNAUTHORIZED
            , description = "Missing or invalid bearer token"
            , body = ErrorResponse),
        (status = NOT_FOUND
            , description = "Space is unknown to the work item tracker"
            , body = ErrorResponse),
        (status = CONFLICT
            , description = "Space already has a pipeline environment with this name"
            , body = ErrorResponse),
        (status = INTERNAL_SERVER_ERROR, body = ErrorResponse),
    ),
    tag = "Pipeline environments"
)]
#[post("/api/spaces/{space_id}/pipeline-environments")]
pub(crate) async fn post_pipeline_environment(
    state: WebData<ServerState>,
    path: web::Path<String>,
    identity: Option<ReqData<Identity>>,
    body: web::Json<PipelineEnvironmentSingle>,
) -> Result<HttpResponse, ServiceError> {
    let space_id = parse_space_id(&path.into_inner())?;
    let descr = descr_from_request(body.into_inner())?;
    let Some(identity) = identity else {
        return Err(ApiError::Unauthorized {
            reason: "missing or invalid bearer token".to_string(),
        }
        .into());
    };

    let space = state.space.lookup(space_id, Some(&identity.token)).await?;
    let pipeline_environment = state
        .db
        .new_pipeline_environment(Uuid::now_v7(), space_id, descr)
        .await?;
    info!(
        "Created pipeline environment {} ('{}') in space {} ('{}') for {}",
        pipeline_environment.id, pipeline_environment.name, space_id, space.name, identity.id
    );

    Ok(HttpResponse::Created()
        .content_type(JSONAPI_MEDIA_TYPE)
        .insert_header((header::LOCATION, pipeline_environment_link(space_id.0)))
        .json(PipelineEnvironmentSingle::from(pipeline_environment)))
}

/// Retrieve the pipeline environment of a space.
///
/// When the space has several, the most recently created one is returned.
#[utoipa::path(
    params(
        ("space_id" = Uuid, Path, description = "Identifier of the space"),
    ),
    responses(
        (status = OK
            , description = "Pipeline environment retrieved"
            , body = PipelineEnvironmentSingle
            , content_type = "application/vnd.api+json"),
        (status = BAD_REQUEST
            , description = "Invalid space identifier"
            , body = ErrorResponse),
        (status = NOT_FOUND
            , description = "Space has no pipeline environment"
            , body = ErrorResponse),
        (status = INTERNAL_SERVER_ERROR, body = ErrorResponse),
    ),
    tag = "Pipeline environments"
)]
#[get("/pipeline/environments/{space_id}")]
pub(crate) async fn get_pipeline_environment(
    state: WebData<ServerState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ServiceError> {
    let space_id = parse_space_id(&path.into_inner())?;
    let pipeline_environment = state.db.get_pipeline_environment_by_space(space_id).await?;
    Ok(HttpResponse::Ok()
        .content_type(JSONAPI_MEDIA_TYPE)
        .json(PipelineEnvironmentSingle::from(pipeline_environment)))
}

#[cfg(test)]
mod test {
    use crate::api::main::build_app;
    use crate::api::main::test::model_state;
    use crate::auth::test::TestKeys;
    use crate::config::ServiceConfig;
    use crate::db::types::pipeline_environment::SpaceId;
    use crate::space::wit::test::mock_space;
    use actix_web::body::{to_bytes, BoxBody};
    use actix_web::dev::ServiceResponse;
    use actix_web::http::{header, StatusCode};
    use actix_web::test::{self, TestRequest};
    use pipeline_env_types::error::{ErrorResponse, JSONAPI_MEDIA_TYPE};
    use pipeline_env_types::pipeline_environment::PipelineEnvironmentSingle;
    use pretty_assertions::assert_eq;
    use uuid::Uuid;
    use wiremock::MockServer;

    /// Sets up an application whose space lookup is served by `wit` and
    /// whose tokens are signed by `keys`.
    macro_rules! test_app {
        ($wit:expr, $keys:expr) => {{
            let mut config = ServiceConfig::test_config();
            config.auth_public_key = Some($keys.public_pem.clone());
            test::init_service(build_app(model_state(config, $wit).await, false)).await
        }};
    }

    fn create_request(space_id: SpaceId, token: Option<&str>, body: String) -> actix_http::Request {
        let mut req = TestRequest::post()
            .uri(&format!("/api/spaces/{space_id}/pipeline-environments"))
            .insert_header((header::CONTENT_TYPE, JSONAPI_MEDIA_TYPE))
            .set_payload(body);
        if let Some(token) = token {
            req = req.insert_header((header::AUTHORIZATION, format!("Bearer {token}")));
        }
        req.to_request()
    }

    fn document(name: &str, environments: &[Uuid]) -> String {
        serde_json::to_string(&PipelineEnvironmentSingle::new_request(
            name,
            environments.to_vec(),
        ))
        .unwrap()
    }

    async fn error_code(response: ServiceResponse<BoxBody>) -> String {
        assert!(response.headers().get(header::LOCATION).is_some());
        let body = to_bytes(response.into_body()).await.unwrap();
        let errors: ErrorResponse = serde_json::from_slice(&body).unwrap();
        errors.errors[0].code.to_string()
    }

    #[actix_web::test]
    async fn create_and_show() {
        let wit = MockServer::start().await;
        let keys = TestKeys::generate();
        let app = test_app!(&wit, keys);
        let token = keys.token("some-user", 3600);
        let space_id = SpaceId(Uuid::now_v7());
        mock_space(&wit, space_id, 200).await;
        let environments = [Uuid::now_v7(), Uuid::now_v7()];

        let response = test::call_service(
            &app,
            create_request(
                space_id,
                Some(&token),
                document("osio-stage", &environments),
            ),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(
            response.headers().get(header::LOCATION).unwrap(),
            &format!("/pipeline/environments/{space_id}")
        );
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            JSONAPI_MEDIA_TYPE
        );
        let created: PipelineEnvironmentSingle = test::read_body_json(response).await;
        assert!(created.data.id.is_some());
        assert_eq!(created.data.attributes.name, "osio-stage");
        assert_eq!(created.data.attributes.space_id, Some(space_id.0));
        assert_eq!(
            created
                .data
                .attributes
                .environments
                .iter()
                .map(|environment| environment.env_uuid)
                .collect::<Vec<_>>(),
            environments.to_vec()
        );

        let req = TestRequest::get()
            .uri(&format!("/pipeline/environments/{space_id}"))
            .to_request();
        let response = test::call_service(&app, req).await;
        assert_eq!(response.status(), StatusCode::OK);
        let shown: PipelineEnvironmentSingle = test::read_body_json(response).await;
        assert_eq!(shown, created);
    }

    #[actix_web::test]
    async fn name_is_unique_within_space() {
        let wit = MockServer::start().await;
        let keys = TestKeys::generate();
        let app = test_app!(&wit, keys);
        let token = keys.token("some-user", 3600);
        let space_a = SpaceId(Uuid::now_v7());
        let space_b = SpaceId(Uuid::now_v7());
        mock_space(&wit, space_a, 200).await;
        mock_space(&wit, space_b, 200).await;
        let environments = [Uuid::now_v7()];

        let response = test::call_service(
            &app,
            create_request(space_a, Some(&token), document("osio-stage", &environments)),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CREATED);

        let response = test::call_service(
            &app,
            create_request(space_a, Some(&token), document("osio-stage", &environments)),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert_eq!(error_code(response).await, "data_conflict_error");

        let response = test::call_service(
            &app,
            create_request(space_b, Some(&token), document("osio-stage", &environments)),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    #[actix_web::test]
    async fn invalid_payload_is_rejected_before_authentication() {
        let wit = MockServer::start().await;
        let keys = TestKeys::generate();
        let app = test_app!(&wit, keys);
        let token = keys.token("some-user", 3600);
        let space_id = SpaceId(Uuid::now_v7());
        mock_space(&wit, space_id, 200).await;

        for body in [
            String::new(),
            "{}".to_string(),
            "not json".to_string(),
            document("", &[Uuid::now_v7()]),
            document("osio\0stage", &[Uuid::now_v7()]),
            document("osio-stage", &[]),
        ] {
            for token in [None, Some(token.as_str())] {
                let response =
                    test::call_service(&app, create_request(space_id, token, body.clone())).await;
                assert_eq!(response.status(), StatusCode::BAD_REQUEST, "body: {body:?}");
                assert_eq!(error_code(response).await, "bad_parameter");
            }
        }
    }

    #[actix_web::test]
    async fn invalid_space_id() {
        let wit = MockServer::start().await;
        let keys = TestKeys::generate();
        let app = test_app!(&wit, keys);

        let req = TestRequest::get()
            .uri("/pipeline/environments/not-a-uuid")
            .to_request();
        let response = test::call_service(&app, req).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(error_code(response).await, "bad_parameter");
    }

    #[actix_web::test]
    async fn create_requires_identity() {
        let wit = MockServer::start().await;
        let keys = TestKeys::generate();
        let app = test_app!(&wit, keys);
        let space_id = SpaceId(Uuid::now_v7());
        mock_space(&wit, space_id, 200).await;
        let body = document("osio-stage", &[Uuid::now_v7()]);

        let expired = keys.token("some-user", -3600);
        let foreign = TestKeys::generate().token("some-user", 3600);
        for token in [None, Some(expired.as_str()), Some(foreign.as_str())] {
            let response =
                test::call_service(&app, create_request(space_id, token, body.clone())).await;
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
            assert_eq!(error_code(response).await, "jwt_security_error");
        }
    }

    #[actix_web::test]
    async fn create_in_unknown_space() {
        let wit = MockServer::start().await;
        let keys = TestKeys::generate();
        let app = test_app!(&wit, keys);
        let token = keys.token("some-user", 3600);
        let space_id = SpaceId(Uuid::now_v7());
        mock_space(&wit, space_id, 404).await;

        let response = test::call_service(
            &app,
            create_request(
                space_id,
                Some(&token),
                document("osio-stage", &[Uuid::now_v7()]),
            ),
        )
        .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(error_code(response).await, "not_found");

        let req = TestRequest::get()
            .uri(&format!("/pipeline/environments/{space_id}"))
            .to_request();
        assert_eq!(
            test::call_service(&app, req).await.status(),
            StatusCode::NOT_FOUND
        );
    }

    #[actix_web::test]
    async fn create_when_space_lookup_fails() {
        let wit = MockServer::start().await;
        let keys = TestKeys::generate();
        let app = test_app!(&wit, keys);
        let token = keys.token("some-user", 3600);
        let space_id = SpaceId(Uuid::now_v7());
        mock_space(&wit, space_id, 422).await;

        let response = test::call_service(
            &app,
            create_request(
                space_id,
                Some(&token),
                document("osio-stage", &[Uuid::now_v7()]),
            ),
        )
        .await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(error_code(response).await, "unknown_error");
    }

    #[actix_web::test]
    async fn show_never_created() {
        let wit = MockServer::start().await;
        let keys = TestKeys::generate();
        let app = test_app!(&wit, keys);

        let req = TestRequest::get()
            .uri(&format!("/pipeline/environments/{}", Uuid::now_v7()))
            .to_request();
        let response = test::call_service(&app, req).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(error_code(response).await, "not_found");
    }
}
