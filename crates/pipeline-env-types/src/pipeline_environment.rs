//! JSON-API documents of the pipeline environments resource.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// JSON-API `type` of pipeline environment resources.
pub const PIPELINE_ENVIRONMENTS_TYPE: &str = "pipelineenvironments";

fn pipeline_environments_type() -> String {
    PIPELINE_ENVIRONMENTS_TYPE.to_string()
}

/// A single deployment environment.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct EnvironmentAttributes {
    /// Identifier of the deployment target.
    #[serde(rename = "envUUID")]
    pub env_uuid: Uuid,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct GenericLinks {
    #[serde(rename = "self", default, skip_serializing_if = "Option::is_none")]
    pub self_link: Option<String>,
}

/// Attributes of a pipeline environment.
///
/// On creation only `name` and `environments` are read, the other fields are
/// filled in by the service.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PipelineEnvironmentAttributes {
    /// Name of the pipeline environment, unique within its space.
    #[schema(example = "osio-stage")]
    pub name: String,
    /// Environments, in the order given at creation.
    pub environments: Vec<EnvironmentAttributes>,
    /// Space the pipeline environment belongs to.
    #[serde(rename = "spaceID", default, skip_serializing_if = "Option::is_none")]
    pub space_id: Option<Uuid>,
    #[serde(
        rename = "created-at",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(
        rename = "updated-at",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PipelineEnvironmentData {
    /// Generated identifier, absent in create requests.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    #[serde(rename = "type", default = "pipeline_environments_type")]
    #[schema(example = "pipelineenvironments")]
    pub kind: String,
    pub attributes: PipelineEnvironmentAttributes,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub links: Option<GenericLinks>,
}

/// Single pipeline environment document, used both as create request body
/// and as create/show response body.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PipelineEnvironmentSingle {
    pub data: PipelineEnvironmentData,
}

impl PipelineEnvironmentSingle {
    /// Request document carrying only the creation attributes.
    pub fn new_request(name: &str, environments: Vec<Uuid>) -> Self {
        Self {
            data: PipelineEnvironmentData {
                id: None,
                kind: pipeline_environments_type(),
                attributes: PipelineEnvironmentAttributes {
                    name: name.to_string(),
                    environments: environments
                        .into_iter()
                        .map(|env_uuid| EnvironmentAttributes { env_uuid })
                        .collect(),
                    space_id: None,
                    created_at: None,
                    updated_at: None,
                },
                links: None,
            },
        }
    }
}

/// Path of the show endpoint for a space.
pub fn pipeline_environment_link(space_id: Uuid) -> String {
    format!("/pipeline/environments/{space_id}")
}
