//! Remote state reader for the management plane.

use async_trait::async_trait;

use crate::error::ApiError;
use crate::model::{
    DatacenterRef, DatastoreRef, FcdCreateSpec, ProfileId, QueryFilter, QueryResult,
    ServerObjectRef, TaskInfo, TaskRef, VirtualDisk, VmRef,
};

/// Operations the e2e helpers need from vCenter.
///
/// Every call is a fresh read. Implementations must not cache results
/// between calls; the pollers rely on that to observe convergence.
#[async_trait]
pub trait ManagementApi: Send + Sync {
    /// Query CNS volumes matching `filter`.
    async fn query_volumes(&self, filter: &QueryFilter) -> Result<QueryResult, ApiError>;

    /// All datacenters in the inventory.
    async fn datacenters(&self) -> Result<Vec<DatacenterRef>, ApiError>;

    /// Look up a VM by instance UUID within one datacenter.
    async fn find_vm_by_uuid(
        &self,
        datacenter: &DatacenterRef,
        uuid: &str,
    ) -> Result<Option<VmRef>, ApiError>;

    /// Virtual disks currently attached to `vm`.
    async fn vm_disks(&self, vm: &VmRef) -> Result<Vec<VirtualDisk>, ApiError>;

    /// Resolve a storage policy name to its profile id.
    async fn profile_id_by_name(&self, name: &str) -> Result<ProfileId, ApiError>;

    /// Objects of `object_type` associated with a storage policy.
    async fn associated_entities(
        &self,
        profile: &ProfileId,
        object_type: &str,
    ) -> Result<Vec<ServerObjectRef>, ApiError>;

    /// Submit a first class disk creation.
    async fn create_disk(&self, spec: &FcdCreateSpec) -> Result<TaskRef, ApiError>;

    /// Submit a first class disk deletion.
    async fn delete_disk(&self, id: &str, datastore: &DatastoreRef) -> Result<TaskRef, ApiError>;

    /// Current state of a submitted task.
    async fn task_info(&self, task: &TaskRef) -> Result<TaskInfo, ApiError>;

    /// End the session. The handle must not be used afterwards.
    async fn logout(&self) -> Result<(), ApiError>;
}

#[async_trait]
impl<T: ManagementApi + ?Sized> ManagementApi for std::sync::Arc<T> {
    async fn query_volumes(&self, filter: &QueryFilter) -> Result<QueryResult, ApiError> {
        (**self).query_volumes(filter).await
    }

    async fn datacenters(&self) -> Result<Vec<DatacenterRef>, ApiError> {
        (**self).datacenters().await
    }

    async fn find_vm_by_uuid(
        &self,
        datacenter: &DatacenterRef,
        uuid: &str,
    ) -> Result<Option<VmRef>, ApiError> {
        (**self).find_vm_by_uuid(datacenter, uuid).await
    }

    async fn vm_disks(&self, vm: &VmRef) -> Result<Vec<VirtualDisk>, ApiError> {
        (**self).vm_disks(vm).await
    }

    async fn profile_id_by_name(&self, name: &str) -> Result<ProfileId, ApiError> {
        (**self).profile_id_by_name(name).await
    }

    async fn associated_entities(
        &self,
        profile: &ProfileId,
        object_type: &str,
    ) -> Result<Vec<ServerObjectRef>, ApiError> {
        (**self).associated_entities(profile, object_type).await
    }

    async fn create_disk(&self, spec: &FcdCreateSpec) -> Result<TaskRef, ApiError> {
        (**self).create_disk(spec).await
    }

    async fn delete_disk(&self, id: &str, datastore: &DatastoreRef) -> Result<TaskRef, ApiError> {
        (**self).delete_disk(id, datastore).await
    }

    async fn task_info(&self, task: &TaskRef) -> Result<TaskInfo, ApiError> {
        (**self).task_info(task).await
    }

    async fn logout(&self) -> Result<(), ApiError> {
        (**self).logout().await
    }
}
