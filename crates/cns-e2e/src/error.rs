//! Error types for the management API and the vSphere helpers.

use crate::model::EntityType;

/// Failure talking to the management plane.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Transport(String),

    #[error("management API returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("failed to decode response: {0}")]
    Decode(String),

    #[error("invalid client configuration: {0}")]
    InvalidConfig(String),
}

/// Failure of a vSphere helper.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VSphereError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("node VM with UUID {uuid} is not found")]
    VmNotFound { uuid: String },

    #[error("node {node} has no vSphere provider ID")]
    NodeUuidMissing { node: String },

    #[error("failed to query cns volume {volume_id}")]
    VolumeQuery { volume_id: String },

    #[error("cns volume {volume_id} has no metadata")]
    MissingMetadata { volume_id: String },

    #[error("entity {entity_type} with name {name} not found in namespace {namespace} for volume {volume_id}")]
    EntityNotFound {
        entity_type: EntityType,
        name: String,
        namespace: String,
        volume_id: String,
    },

    #[error("labels are not updated to {labels} for {entity_type} {name:?} for volume {volume_id}")]
    LabelsNotUpdated {
        labels: String,
        entity_type: EntityType,
        name: String,
        volume_id: String,
    },

    #[error("entityName {name} of entityType {entity_type} is not deleted for volume {volume_id}")]
    MetadataNotDeleted {
        entity_type: EntityType,
        name: String,
        volume_id: String,
    },

    #[error("unable to find associated disks for storage policy {profile_id}")]
    NoAssociatedDisks { profile_id: String },

    #[error("task {task} failed: {message}")]
    TaskFailed { task: String, message: String },

    #[error("{operation} did not complete within the deadline")]
    Timeout { operation: String },

    #[error("{operation} was cancelled")]
    Cancelled { operation: String },
}

pub type Result<T> = std::result::Result<T, VSphereError>;
