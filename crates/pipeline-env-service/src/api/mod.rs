//! HTTP API of the pipeline environments service.
//!
//! The service keeps, for each space of the work item tracker, named sets of
//! deployment environments (pipeline environments). They are created under
//! `/api/spaces/{space_id}/pipeline-environments` and read back under
//! `/pipeline/environments/{space_id}`. Both documents are JSON-API.
pub(crate) mod endpoints;
pub mod error;
pub mod main;
