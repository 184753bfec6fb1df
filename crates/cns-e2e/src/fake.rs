//! Scripted in-memory management API for unit tests.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;

use crate::api::ManagementApi;
use crate::error::ApiError;
use crate::model::{
    DatacenterRef, DatastoreRef, FcdCreateSpec, ProfileId, QueryFilter, QueryResult,
    ServerObjectRef, TaskInfo, TaskRef, TaskState, VirtualDisk, VmRef,
};

/// Replays queued values in order, then repeats the last one.
pub(crate) struct Script<T> {
    steps: Mutex<VecDeque<T>>,
}

impl<T: Clone> Script<T> {
    fn new() -> Self {
        Self {
            steps: Mutex::new(VecDeque::new()),
        }
    }

    fn push(&self, step: T) {
        self.steps.lock().unwrap().push_back(step);
    }

    fn next(&self) -> Option<T> {
        let mut steps = self.steps.lock().unwrap();
        if steps.len() > 1 {
            steps.pop_front()
        } else {
            steps.front().cloned()
        }
    }
}

pub(crate) struct FakeApi {
    queries: Script<Result<QueryResult, ApiError>>,
    pub query_calls: AtomicUsize,
    datacenters: Vec<DatacenterRef>,
    failing_datacenters: HashSet<String>,
    vms: HashMap<(String, String), VmRef>,
    disks: Script<Vec<VirtualDisk>>,
    pub disk_calls: AtomicUsize,
    profiles: HashMap<String, ProfileId>,
    associations: HashMap<String, Vec<ServerObjectRef>>,
    tasks: DashMap<String, Script<TaskInfo>>,
    task_steps: Mutex<Vec<TaskInfo>>,
    pub created: Mutex<Vec<FcdCreateSpec>>,
    pub deleted: Mutex<Vec<(String, DatastoreRef)>>,
    pub logged_out: AtomicBool,
}

impl FakeApi {
    pub fn new() -> Self {
        Self {
            queries: Script::new(),
            query_calls: AtomicUsize::new(0),
            datacenters: Vec::new(),
            failing_datacenters: HashSet::new(),
            vms: HashMap::new(),
            disks: Script::new(),
            disk_calls: AtomicUsize::new(0),
            profiles: HashMap::new(),
            associations: HashMap::new(),
            tasks: DashMap::new(),
            task_steps: Mutex::new(Vec::new()),
            created: Mutex::new(Vec::new()),
            deleted: Mutex::new(Vec::new()),
            logged_out: AtomicBool::new(false),
        }
    }

    pub fn query(self, step: Result<QueryResult, ApiError>) -> Self {
        self.queries.push(step);
        self
    }

    pub fn datacenter(mut self, id: &str) -> Self {
        self.datacenters.push(DatacenterRef {
            datacenter: id.to_string(),
            name: id.to_uppercase(),
        });
        self
    }

    pub fn failing_datacenter(mut self, id: &str) -> Self {
        self = self.datacenter(id);
        self.failing_datacenters.insert(id.to_string());
        self
    }

    pub fn vm(mut self, datacenter: &str, uuid: &str, vm: &str) -> Self {
        self.vms.insert(
            (datacenter.to_string(), uuid.to_string()),
            VmRef {
                vm: vm.to_string(),
                name: vm.to_string(),
            },
        );
        self
    }

    pub fn disks(self, disk_ids: &[&str]) -> Self {
        let disks = disk_ids
            .iter()
            .enumerate()
            .map(|(i, id)| VirtualDisk {
                key: 2000 + i as i32,
                label: format!("Hard disk {}", i + 1),
                disk_id: Some(id.to_string()),
            })
            .collect();
        self.disks.push(disks);
        self
    }

    pub fn profile(mut self, name: &str, unique_id: &str, disks: &[&str]) -> Self {
        self.profiles.insert(
            name.to_string(),
            ProfileId {
                unique_id: unique_id.to_string(),
            },
        );
        self.associations.insert(
            unique_id.to_string(),
            disks
                .iter()
                .map(|key| ServerObjectRef {
                    key: key.to_string(),
                    object_type: crate::model::VIRTUAL_DISK_UUID.to_string(),
                })
                .collect(),
        );
        self
    }

    /// States every submitted task goes through.
    pub fn task_states(self, steps: Vec<TaskInfo>) -> Self {
        *self.task_steps.lock().unwrap() = steps;
        self
    }

    fn submit(&self) -> TaskRef {
        let id = format!("task-{}", uuid::Uuid::new_v4());
        let script = Script::new();
        for step in self.task_steps.lock().unwrap().iter() {
            script.push(step.clone());
        }
        self.tasks.insert(id.clone(), script);
        TaskRef { task: id }
    }
}

#[async_trait]
impl ManagementApi for FakeApi {
    async fn query_volumes(&self, _filter: &QueryFilter) -> Result<QueryResult, ApiError> {
        self.query_calls.fetch_add(1, Ordering::SeqCst);
        self.queries.next().unwrap_or_else(|| Ok(QueryResult::default()))
    }

    async fn datacenters(&self) -> Result<Vec<DatacenterRef>, ApiError> {
        Ok(self.datacenters.clone())
    }

    async fn find_vm_by_uuid(
        &self,
        datacenter: &DatacenterRef,
        uuid: &str,
    ) -> Result<Option<VmRef>, ApiError> {
        if self.failing_datacenters.contains(&datacenter.datacenter) {
            return Err(ApiError::Transport("connection reset".to_string()));
        }
        Ok(self
            .vms
            .get(&(datacenter.datacenter.clone(), uuid.to_string()))
            .cloned())
    }

    async fn vm_disks(&self, _vm: &VmRef) -> Result<Vec<VirtualDisk>, ApiError> {
        self.disk_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.disks.next().unwrap_or_default())
    }

    async fn profile_id_by_name(&self, name: &str) -> Result<ProfileId, ApiError> {
        self.profiles
            .get(name)
            .cloned()
            .ok_or_else(|| ApiError::NotFound(format!("storage policy {}", name)))
    }

    async fn associated_entities(
        &self,
        profile: &ProfileId,
        _object_type: &str,
    ) -> Result<Vec<ServerObjectRef>, ApiError> {
        Ok(self
            .associations
            .get(&profile.unique_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn create_disk(&self, spec: &FcdCreateSpec) -> Result<TaskRef, ApiError> {
        self.created.lock().unwrap().push(spec.clone());
        Ok(self.submit())
    }

    async fn delete_disk(&self, id: &str, datastore: &DatastoreRef) -> Result<TaskRef, ApiError> {
        self.deleted
            .lock()
            .unwrap()
            .push((id.to_string(), datastore.clone()));
        Ok(self.submit())
    }

    async fn task_info(&self, task: &TaskRef) -> Result<TaskInfo, ApiError> {
        self.tasks
            .get(&task.task)
            .and_then(|script| script.next())
            .ok_or_else(|| ApiError::NotFound(task.task.clone()))
    }

    async fn logout(&self) -> Result<(), ApiError> {
        self.logged_out.store(true, Ordering::SeqCst);
        Ok(())
    }
}

pub(crate) fn task(state: TaskState, result: Option<&str>, error: Option<&str>) -> TaskInfo {
    TaskInfo {
        state,
        result: result.map(|r| serde_json::Value::String(r.to_string())),
        error: error.map(str::to_string),
    }
}
