//! CNS and inventory types exchanged with the management plane.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Default page size for CNS volume queries.
pub const DEFAULT_QUERY_LIMIT: i64 = 100;

/// Associated-entity type used for virtual disks in storage policy queries.
pub const VIRTUAL_DISK_UUID: &str = "virtualDiskUUID";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CnsVolumeId {
    pub id: String,
}

impl CnsVolumeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor {
    pub offset: i64,
    pub limit: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_records: Option<i64>,
}

impl Default for Cursor {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: DEFAULT_QUERY_LIMIT,
            total_records: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryFilter {
    pub volume_ids: Vec<CnsVolumeId>,
    pub cursor: Cursor,
}

impl QueryFilter {
    /// Filter for a single volume with the given page size.
    pub fn for_volume(id: &str, limit: i64) -> Self {
        Self {
            volume_ids: vec![CnsVolumeId::new(id)],
            cursor: Cursor {
                limit,
                ..Cursor::default()
            },
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryResult {
    #[serde(default)]
    pub volumes: Vec<CnsVolume>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor: Option<Cursor>,
}

impl QueryResult {
    /// The only volume in the result, if it is exactly `id`.
    pub fn single(&self, id: &str) -> Option<&CnsVolume> {
        match self.volumes.as_slice() {
            [volume] if volume.volume_id.id == id => Some(volume),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CnsVolume {
    pub volume_id: CnsVolumeId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub volume_type: String,
    #[serde(default)]
    pub datastore_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<CnsVolumeMetadata>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CnsVolumeMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_cluster: Option<ContainerCluster>,
    #[serde(default)]
    pub entity_metadata: Vec<EntityMetadata>,
}

impl CnsVolumeMetadata {
    /// Kubernetes entries matching `entity`. Other kinds are skipped.
    pub fn kubernetes_entries<'a>(
        &'a self,
        entity: &'a EntityRef,
    ) -> impl Iterator<Item = &'a KubernetesEntityMetadata> + 'a {
        self.entity_metadata.iter().filter_map(move |m| match m {
            EntityMetadata::Kubernetes(k) if entity.matches(k) => Some(k),
            EntityMetadata::Kubernetes(_) => None,
            EntityMetadata::Unknown => {
                tracing::debug!("Skipping entity metadata of unknown kind");
                None
            }
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerCluster {
    pub cluster_type: String,
    pub cluster_id: String,
    #[serde(default)]
    pub vsphere_user: String,
}

/// Entity metadata attached to a volume, tagged by kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum EntityMetadata {
    Kubernetes(KubernetesEntityMetadata),
    /// Any metadata kind this crate does not model.
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KubernetesEntityMetadata {
    pub entity_type: EntityType,
    pub entity_name: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub labels: Vec<KeyValue>,
    #[serde(default)]
    pub delete: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityType {
    PersistentVolume,
    PersistentVolumeClaim,
    Pod,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PersistentVolume => "PERSISTENT_VOLUME",
            Self::PersistentVolumeClaim => "PERSISTENT_VOLUME_CLAIM",
            Self::Pod => "POD",
        }
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EntityType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PERSISTENT_VOLUME" | "pv" => Ok(Self::PersistentVolume),
            "PERSISTENT_VOLUME_CLAIM" | "pvc" => Ok(Self::PersistentVolumeClaim),
            "POD" | "pod" => Ok(Self::Pod),
            other => Err(format!("unknown entity type '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyValue {
    pub key: String,
    pub value: String,
}

impl KeyValue {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Collapse a label list into a map. Later duplicates win.
pub fn labels_map(labels: &[KeyValue]) -> HashMap<String, String> {
    labels
        .iter()
        .map(|kv| (kv.key.clone(), kv.value.clone()))
        .collect()
}

/// Selects one orchestrator entity in a volume's metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityRef {
    pub entity_type: EntityType,
    pub name: String,
    pub namespace: String,
}

impl EntityRef {
    pub fn new(
        entity_type: EntityType,
        name: impl Into<String>,
        namespace: impl Into<String>,
    ) -> Self {
        Self {
            entity_type,
            name: name.into(),
            namespace: namespace.into(),
        }
    }

    pub fn matches(&self, metadata: &KubernetesEntityMetadata) -> bool {
        metadata.entity_type == self.entity_type
            && metadata.entity_name == self.name
            && metadata.namespace == self.namespace
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatacenterRef {
    pub datacenter: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmRef {
    pub vm: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatastoreRef {
    pub datastore: String,
}

impl DatastoreRef {
    pub fn new(datastore: impl Into<String>) -> Self {
        Self {
            datastore: datastore.into(),
        }
    }
}

/// Virtual disk device on a VM. `disk_id` is the FCD id of its backing, if any.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VirtualDisk {
    pub key: i32,
    #[serde(default)]
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disk_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProfileId {
    pub unique_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerObjectRef {
    pub key: String,
    pub object_type: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ProvisioningType {
    #[default]
    Thin,
    Thick,
    EagerZeroedThick,
}

/// Request to create a first class disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FcdCreateSpec {
    pub name: String,
    pub capacity_mb: i64,
    pub datastore: DatastoreRef,
    pub keep_after_delete_vm: bool,
    pub provisioning_type: ProvisioningType,
}

impl FcdCreateSpec {
    pub fn new(name: impl Into<String>, capacity_mb: i64, datastore: DatastoreRef) -> Self {
        Self {
            name: name.into(),
            capacity_mb,
            datastore,
            keep_after_delete_vm: false,
            provisioning_type: ProvisioningType::Thin,
        }
    }

    pub fn with_provisioning_type(mut self, provisioning_type: ProvisioningType) -> Self {
        self.provisioning_type = provisioning_type;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRef {
    pub task: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    Queued,
    Running,
    Success,
    Error,
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Error)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskInfo {
    pub state: TaskState,
    /// Task result. For disk creation this is the created disk's id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
