//! vSphere helpers for CSI e2e suites.
//!
//! [`VSphere`] wraps a caller-owned [`ManagementApi`] handle. Every wait is a
//! [`poll`] over fresh CNS queries, sharing the handle's [`PollSpec`] and
//! cancellation token.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::api::ManagementApi;
use crate::config::E2eConfig;
use crate::error::{ApiError, Result, VSphereError};
use crate::gateway::GatewayClient;
use crate::model::{
    CnsVolumeMetadata, DEFAULT_QUERY_LIMIT, DatacenterRef, DatastoreRef, EntityRef,
    FcdCreateSpec, QueryFilter, QueryResult, TaskInfo, TaskRef, TaskState, VIRTUAL_DISK_UUID,
    VmRef, labels_map,
};
use crate::node::{NodeDirectory, vm_uuid_from_provider_id};
use crate::poll::{CancellationToken, PollOutcome, PollSpec, poll};

/// Result of waiting for a volume to detach.
///
/// Carries both the answer and, when the volume did not detach, why: the
/// wait timed out, was cancelled, or a lookup failed.
#[derive(Debug)]
pub struct DetachOutcome {
    pub detached: bool,
    pub cause: Option<VSphereError>,
}

impl DetachOutcome {
    pub fn into_result(self) -> Result<()> {
        match self.cause {
            Some(cause) => Err(cause),
            None => Ok(()),
        }
    }
}

/// Connection handle plus wait settings.
pub struct VSphere<A> {
    api: A,
    poll: PollSpec,
    query_limit: i64,
    cancel: CancellationToken,
}

impl VSphere<GatewayClient> {
    /// Open a gateway session using `config`.
    pub async fn connect(config: &E2eConfig) -> Result<Self> {
        let api = GatewayClient::connect(&config.vsphere).await?;
        Ok(Self::new(api)
            .with_poll_spec(config.poll)
            .with_query_limit(config.query_limit))
    }
}

impl<A: ManagementApi> VSphere<A> {
    pub fn new(api: A) -> Self {
        Self {
            api,
            poll: PollSpec::default(),
            query_limit: DEFAULT_QUERY_LIMIT,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_poll_spec(mut self, spec: PollSpec) -> Self {
        self.poll = spec;
        self
    }

    pub fn with_query_limit(mut self, limit: i64) -> Self {
        self.query_limit = limit;
        self
    }

    /// Use `token` to cancel every wait started from this handle.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    pub fn poll_spec(&self) -> PollSpec {
        self.poll
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// End the session.
    pub async fn close(self) -> Result<()> {
        self.api.logout().await?;
        Ok(())
    }

    /// Query CNS for a single volume.
    pub async fn query_volume(&self, volume_id: &str) -> Result<QueryResult> {
        let filter = QueryFilter::for_volume(volume_id, self.query_limit);
        let result = self.api.query_volumes(&filter).await?;
        tracing::debug!(volume_id, result = ?result, "CNS query result");
        Ok(result)
    }

    pub async fn datacenters(&self) -> Result<Vec<DatacenterRef>> {
        Ok(self.api.datacenters().await?)
    }

    /// Find a VM by instance UUID across all datacenters.
    ///
    /// A datacenter whose lookup fails is skipped.
    pub async fn vm_by_uuid(&self, vm_uuid: &str) -> Result<VmRef> {
        let uuid = vm_uuid.trim().to_lowercase();
        for dc in self.datacenters().await? {
            match self.api.find_vm_by_uuid(&dc, &uuid).await {
                Ok(Some(vm)) => return Ok(vm),
                Ok(None) => {}
                Err(e) => {
                    tracing::debug!(
                        datacenter = %dc.datacenter,
                        error = %e,
                        "VM lookup failed, trying next datacenter"
                    );
                }
            }
        }
        Err(VSphereError::VmNotFound { uuid })
    }

    /// Whether `volume_id` backs one of the VM's virtual disks.
    pub async fn is_volume_attached_to_vm(&self, vm_uuid: &str, volume_id: &str) -> Result<bool> {
        let vm = self.vm_by_uuid(vm_uuid).await?;
        tracing::debug!(vm = %vm.vm, vm_uuid, "Resolved VM");
        let disks = self.api.vm_disks(&vm).await?;
        let attached = disks
            .iter()
            .any(|disk| disk.disk_id.as_deref() == Some(volume_id));
        if attached {
            tracing::info!(volume_id, vm = %vm.vm, "Disk is attached to VM");
        }
        Ok(attached)
    }

    /// Whether `volume_id` is attached to the VM backing `node`.
    pub async fn is_volume_attached_to_node(
        &self,
        nodes: &dyn NodeDirectory,
        volume_id: &str,
        node: &str,
    ) -> Result<bool> {
        let vm_uuid = nodes
            .provider_id(node)
            .await?
            .as_deref()
            .and_then(vm_uuid_from_provider_id)
            .ok_or_else(|| VSphereError::NodeUuidMissing {
                node: node.to_string(),
            })?;
        tracing::debug!(node, vm_uuid = %vm_uuid, "Resolved node VM UUID");
        self.is_volume_attached_to_vm(&vm_uuid, volume_id).await
    }

    /// Wait until `volume_id` is no longer attached to `node`.
    pub async fn wait_for_volume_detached_from_node(
        &self,
        nodes: &dyn NodeDirectory,
        volume_id: &str,
        node: &str,
    ) -> DetachOutcome {
        let outcome = poll::<_, _, VSphereError>(&self.poll, &self.cancel, move || async move {
            let attached = self.is_volume_attached_to_node(nodes, volume_id, node).await?;
            if attached {
                tracing::debug!(volume_id, node, "Waiting for disk to be detached");
            } else {
                tracing::info!(volume_id, node, "Disk successfully detached");
            }
            Ok(!attached)
        })
        .await;

        let operation = format!("detach of volume {} from node {}", volume_id, node);
        match finish(outcome, &operation, || VSphereError::Timeout {
            operation: operation.clone(),
        }) {
            Ok(()) => DetachOutcome {
                detached: true,
                cause: None,
            },
            Err(cause) => DetachOutcome {
                detached: false,
                cause: Some(cause),
            },
        }
    }

    /// Whether `volume_id` is associated with the storage policy `policy_name`.
    pub async fn verify_spbm_policy_of_volume(
        &self,
        volume_id: &str,
        policy_name: &str,
    ) -> Result<bool> {
        tracing::info!(volume_id, policy = policy_name, "Verifying storage policy of volume");
        let profile = self.api.profile_id_by_name(policy_name).await?;
        tracing::debug!(
            profile_id = %profile.unique_id,
            policy = policy_name,
            "Resolved storage policy"
        );

        let associated = self.api.associated_entities(&profile, VIRTUAL_DISK_UUID).await?;
        if associated.is_empty() {
            return Err(VSphereError::NoAssociatedDisks {
                profile_id: profile.unique_id,
            });
        }

        let found = associated.iter().any(|entity| entity.key == volume_id);
        if found {
            tracing::info!(
                volume_id,
                profile_id = %profile.unique_id,
                "Volume is associated with storage policy"
            );
        } else {
            tracing::info!(
                volume_id,
                profile_id = %profile.unique_id,
                "Volume is NOT associated with storage policy"
            );
        }
        Ok(found)
    }

    /// Labels CNS holds for `entity` on `volume_id`.
    pub async fn labels_for_volume(
        &self,
        volume_id: &str,
        entity: &EntityRef,
    ) -> Result<HashMap<String, String>> {
        let metadata = self.volume_metadata(volume_id).await?;
        metadata
            .kubernetes_entries(entity)
            .next()
            .map(|k| labels_map(&k.labels))
            .ok_or_else(|| VSphereError::EntityNotFound {
                entity_type: entity.entity_type,
                name: entity.name.clone(),
                namespace: entity.namespace.clone(),
                volume_id: volume_id.to_string(),
            })
    }

    /// Wait until CNS holds `match_labels` for `entity`.
    ///
    /// With `None`, waits only for the entity to appear.
    pub async fn wait_for_labels_to_be_updated(
        &self,
        volume_id: &str,
        match_labels: Option<&HashMap<String, String>>,
        entity: &EntityRef,
    ) -> Result<()> {
        let outcome = poll::<_, _, VSphereError>(&self.poll, &self.cancel, move || async move {
            let metadata = self.volume_metadata(volume_id).await?;
            let updated = metadata.kubernetes_entries(entity).any(|k| match match_labels {
                None => true,
                Some(expected) => labels_map(&k.labels) == *expected,
            });
            if !updated {
                tracing::debug!(
                    volume_id,
                    entity = %entity.name,
                    "Waiting for labels to be updated"
                );
            }
            Ok(updated)
        })
        .await;

        finish(outcome, "label update", || VSphereError::LabelsNotUpdated {
            labels: format!("{:?}", match_labels),
            entity_type: entity.entity_type,
            name: entity.name.clone(),
            volume_id: volume_id.to_string(),
        })
    }

    /// Wait until CNS no longer holds metadata for `entity`.
    pub async fn wait_for_metadata_to_be_deleted(
        &self,
        volume_id: &str,
        entity: &EntityRef,
    ) -> Result<()> {
        let outcome = poll::<_, _, VSphereError>(&self.poll, &self.cancel, move || async move {
            let metadata = self.volume_metadata(volume_id).await?;
            let present = metadata.kubernetes_entries(entity).next().is_some();
            if present {
                tracing::debug!(
                    volume_id,
                    entity = %entity.name,
                    "Waiting for metadata to be deleted"
                );
            }
            Ok(!present)
        })
        .await;

        finish(outcome, "metadata deletion", || VSphereError::MetadataNotDeleted {
            entity_type: entity.entity_type,
            name: entity.name.clone(),
            volume_id: volume_id.to_string(),
        })
    }

    /// Wait until CNS returns no entry for `volume_id`.
    pub async fn wait_for_volume_to_be_deleted(&self, volume_id: &str) -> Result<()> {
        let outcome = poll::<_, _, VSphereError>(&self.poll, &self.cancel, move || async move {
            let result = self.query_volume(volume_id).await?;
            if result.volumes.is_empty() {
                tracing::info!(volume_id, "Volume successfully deleted");
                return Ok(true);
            }
            tracing::debug!(volume_id, "Waiting for volume to be deleted");
            Ok(false)
        })
        .await;

        let operation = format!("deletion of volume {}", volume_id);
        finish(outcome, &operation, || VSphereError::Timeout {
            operation: operation.clone(),
        })
    }

    /// Wait until CNS returns exactly `volume_id`.
    pub async fn wait_for_volume_to_be_created(&self, volume_id: &str) -> Result<()> {
        let outcome = poll::<_, _, VSphereError>(&self.poll, &self.cancel, move || async move {
            let result = self.query_volume(volume_id).await?;
            if result.single(volume_id).is_some() {
                tracing::info!(volume_id, "Volume successfully created");
                return Ok(true);
            }
            tracing::debug!(volume_id, "Waiting for volume to be created");
            Ok(false)
        })
        .await;

        let operation = format!("creation of volume {}", volume_id);
        finish(outcome, &operation, || VSphereError::Timeout {
            operation: operation.clone(),
        })
    }

    /// Create a thin-provisioned first class disk and return its id.
    pub async fn create_fcd(
        &self,
        name: &str,
        capacity_mb: i64,
        datastore: &DatastoreRef,
    ) -> Result<String> {
        let spec = FcdCreateSpec::new(name, capacity_mb, datastore.clone());
        self.create_fcd_from_spec(&spec).await
    }

    /// Create a first class disk from a full spec and return its id.
    pub async fn create_fcd_from_spec(&self, spec: &FcdCreateSpec) -> Result<String> {
        let task = self.api.create_disk(spec).await?;
        let info = self.wait_for_task(&task).await?;

        let id = info
            .result
            .as_ref()
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| {
                ApiError::Decode(format!("task {} returned no disk id", task.task))
            })?;
        tracing::info!(
            fcd_id = %id,
            name = %spec.name,
            capacity_mb = spec.capacity_mb,
            provisioning = ?spec.provisioning_type,
            "Created FCD"
        );
        Ok(id)
    }

    /// Delete a first class disk.
    pub async fn delete_fcd(&self, id: &str, datastore: &DatastoreRef) -> Result<()> {
        let task = self.api.delete_disk(id, datastore).await?;
        self.wait_for_task(&task).await?;
        tracing::info!(fcd_id = id, "Deleted FCD");
        Ok(())
    }

    async fn wait_for_task(&self, task: &TaskRef) -> Result<TaskInfo> {
        let last: Mutex<Option<TaskInfo>> = Mutex::new(None);
        let last_ref = &last;

        let outcome = poll::<_, _, VSphereError>(&self.poll, &self.cancel, move || async move {
            let info = self.api.task_info(task).await?;
            if !info.state.is_terminal() {
                tracing::debug!(task = %task.task, state = ?info.state, "Waiting for task");
                return Ok(false);
            }
            if info.state == TaskState::Error {
                return Err(VSphereError::TaskFailed {
                    task: task.task.clone(),
                    message: info.error.unwrap_or_else(|| "unknown error".to_string()),
                });
            }
            *lock(last_ref) = Some(info);
            Ok(true)
        })
        .await;

        let operation = format!("task {}", task.task);
        finish(outcome, &operation, || VSphereError::Timeout {
            operation: operation.clone(),
        })?;

        lock(&last).take().ok_or_else(|| VSphereError::TaskFailed {
            task: task.task.clone(),
            message: "task finished without a result".to_string(),
        })
    }

    /// Metadata of `volume_id`, requiring exactly that one volume in the query.
    async fn volume_metadata(&self, volume_id: &str) -> Result<CnsVolumeMetadata> {
        let result = self.query_volume(volume_id).await?;
        let volume = result
            .single(volume_id)
            .ok_or_else(|| VSphereError::VolumeQuery {
                volume_id: volume_id.to_string(),
            })?;
        volume
            .metadata
            .clone()
            .ok_or_else(|| VSphereError::MissingMetadata {
                volume_id: volume_id.to_string(),
            })
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn finish<F>(outcome: PollOutcome<VSphereError>, operation: &str, on_timeout: F) -> Result<()>
where
    F: FnOnce() -> VSphereError,
{
    match outcome {
        PollOutcome::Success => Ok(()),
        PollOutcome::TimedOut => Err(on_timeout()),
        PollOutcome::Failed(e) => Err(e),
        PollOutcome::Cancelled => Err(VSphereError::Cancelled {
            operation: operation.to_string(),
        }),
    }
}
