use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Build and runtime information of the running service.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Status {
    /// Git commit the service was built from.
    pub commit: String,
    /// Time at which the service was built.
    pub build_time: String,
    /// Time at which the service process was started, in UTC.
    #[schema(example = "2018-03-21T09:14:59Z")]
    pub start_time: String,
}
