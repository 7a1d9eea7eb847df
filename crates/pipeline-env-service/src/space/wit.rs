use crate::db::types::pipeline_environment::SpaceId;
use crate::space::{SpaceError, SpaceInfo, SpaceLookup};
use async_trait::async_trait;
use log::debug;
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;

/// `GET /api/spaces/{id}` response document of the work item tracker.
#[derive(Debug, Deserialize)]
struct SpaceSingle {
    data: SpaceData,
}

#[derive(Debug, Deserialize)]
struct SpaceData {
    id: SpaceId,
    #[serde(default)]
    attributes: SpaceAttributes,
    #[serde(default)]
    relationships: SpaceRelationships,
}

#[derive(Debug, Default, Deserialize)]
struct SpaceAttributes {
    #[serde(default)]
    name: String,
    description: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct SpaceRelationships {
    #[serde(rename = "owned-by")]
    owned_by: Option<RelationGeneric>,
}

#[derive(Debug, Deserialize)]
struct RelationGeneric {
    data: Option<GenericData>,
}

#[derive(Debug, Deserialize)]
struct GenericData {
    id: Option<String>,
}

impl From<SpaceSingle> for SpaceInfo {
    fn from(space: SpaceSingle) -> Self {
        let SpaceData {
            id,
            attributes,
            relationships,
        } = space.data;
        SpaceInfo {
            id,
            name: attributes.name,
            description: attributes.description,
            owner: relationships
                .owned_by
                .and_then(|relation| relation.data)
                .and_then(|data| data.id),
        }
    }
}

/// Looks spaces up in the work item tracker (WIT) over HTTP.
pub struct WitClient {
    base_url: String,
    client: reqwest::Client,
}

impl WitClient {
    /// A client whose lookups fail once they take longer than `timeout`.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn space_url(&self, space_id: SpaceId) -> String {
        format!("{}/api/spaces/{space_id}", self.base_url)
    }
}

#[async_trait]
impl SpaceLookup for WitClient {
    async fn lookup(
        &self,
        space_id: SpaceId,
        token: Option<&str>,
    ) -> Result<SpaceInfo, SpaceError> {
        let url = self.space_url(space_id);
        let mut request = self.client.get(&url);
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                return Err(SpaceError::UnknownError {
                    space_id,
                    status: None,
                    reason: e.to_string(),
                });
            }
        };

        let status = response.status();
        debug!("Space lookup GET {url} returned {status}");
        match status {
            StatusCode::OK => match response.json::<SpaceSingle>().await {
                Ok(space) => Ok(space.into()),
                Err(e) => Err(SpaceError::UnknownError {
                    space_id,
                    status: Some(status.as_u16()),
                    reason: format!("invalid space document: {e}"),
                }),
            },
            StatusCode::NOT_FOUND => Err(SpaceError::NotFound { space_id }),
            _ => {
                let reason = response.text().await.unwrap_or_default();
                Err(SpaceError::UnknownError {
                    space_id,
                    status: Some(status.as_u16()),
                    reason,
                })
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod test {
    use super::WitClient;
    use crate::db::types::pipeline_environment::SpaceId;
    use crate::space::{SpaceError, SpaceLookup};
    use serde_json::json;
    use std::time::Duration;
    use uuid::Uuid;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Client for the work item tracker at `base_url`.
    pub(crate) fn wit_client(base_url: &str) -> WitClient {
        WitClient::new(base_url, Duration::from_secs(5)).unwrap()
    }

    /// Document the work item tracker returns for an existing space.
    pub(crate) fn space_single(space_id: SpaceId) -> serde_json::Value {
        json!({
            "data": {
                "id": space_id,
                "type": "spaces",
                "attributes": {
                    "name": "test-space",
                    "description": "A space for testing",
                    "created-at": "2018-03-21T09:14:59Z",
                    "updated-at": "2018-03-21T09:14:59Z",
                    "version": 0
                },
                "relationships": {
                    "owned-by": {
                        "data": { "id": "f27a4f5e-2c66-4c2b-8e20-5ee0a6b4a1a5", "type": "identities" }
                    }
                },
                "links": { "self": format!("http://witservice/api/spaces/{space_id}") }
            }
        })
    }

    /// Mounts a space lookup responding with the given status.
    pub(crate) async fn mock_space(server: &MockServer, space_id: SpaceId, status: u16) {
        let template = if status == 200 {
            ResponseTemplate::new(200).set_body_json(space_single(space_id))
        } else {
            ResponseTemplate::new(status)
        };
        Mock::given(method("GET"))
            .and(path(format!("/api/spaces/{space_id}")))
            .respond_with(template)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn lookup_found() {
        let server = MockServer::start().await;
        let space_id = SpaceId(Uuid::new_v4());
        mock_space(&server, space_id, 200).await;

        let client = wit_client(&format!("{}/", server.uri()));
        let space = client.lookup(space_id, None).await.unwrap();
        assert_eq!(space.id, space_id);
        assert_eq!(space.name, "test-space");
        assert_eq!(space.description.as_deref(), Some("A space for testing"));
        assert_eq!(
            space.owner.as_deref(),
            Some("f27a4f5e-2c66-4c2b-8e20-5ee0a6b4a1a5")
        );
    }

    #[tokio::test]
    async fn lookup_forwards_token() {
        let server = MockServer::start().await;
        let space_id = SpaceId(Uuid::new_v4());
        Mock::given(method("GET"))
            .and(path(format!("/api/spaces/{space_id}")))
            .and(header("Authorization", "Bearer secret-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(space_single(space_id)))
            .expect(1)
            .mount(&server)
            .await;

        let client = wit_client(&server.uri());
        client.lookup(space_id, Some("secret-token")).await.unwrap();
    }

    #[tokio::test]
    async fn lookup_not_found() {
        let server = MockServer::start().await;
        let space_id = SpaceId(Uuid::new_v4());
        mock_space(&server, space_id, 404).await;

        let client = wit_client(&server.uri());
        assert!(matches!(
            client.lookup(space_id, None).await,
            Err(SpaceError::NotFound { space_id: id }) if id == space_id
        ));
    }

    #[tokio::test]
    async fn lookup_unexpected_status() {
        let server = MockServer::start().await;
        let space_id = SpaceId(Uuid::new_v4());
        mock_space(&server, space_id, 422).await;

        let client = wit_client(&server.uri());
        assert!(matches!(
            client.lookup(space_id, None).await,
            Err(SpaceError::UnknownError {
                status: Some(422),
                ..
            })
        ));
    }

    #[tokio::test]
    async fn lookup_invalid_document() {
        let server = MockServer::start().await;
        let space_id = SpaceId(Uuid::new_v4());
        Mock::given(method("GET"))
            .and(path(format!("/api/spaces/{space_id}")))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let client = wit_client(&server.uri());
        assert!(matches!(
            client.lookup(space_id, None).await,
            Err(SpaceError::UnknownError {
                status: Some(200),
                ..
            })
        ));
    }

    #[tokio::test]
    async fn lookup_times_out() {
        let server = MockServer::start().await;
        let space_id = SpaceId(Uuid::new_v4());
        Mock::given(method("GET"))
            .and(path(format!("/api/spaces/{space_id}")))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(space_single(space_id))
                    .set_delay(Duration::from_secs(10)),
            )
            .mount(&server)
            .await;

        let client = WitClient::new(&server.uri(), Duration::from_millis(100)).unwrap();
        assert!(matches!(
            client.lookup(space_id, None).await,
            Err(SpaceError::UnknownError { status: None, .. })
        ));
    }

    #[tokio::test]
    async fn lookup_unreachable() {
        // Nothing listens on a port whose listener was dropped
        let port = std::net::TcpListener::bind(("127.0.0.1", 0))
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let client = wit_client(&format!("http://127.0.0.1:{port}"));
        assert!(matches!(
            client.lookup(SpaceId(Uuid::new_v4()), None).await,
            Err(SpaceError::UnknownError { status: None, .. })
        ));
    }
}
