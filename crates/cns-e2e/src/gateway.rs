//! JSON management gateway client.
//!
//! Session lifecycle:
//! - `connect` logs in with basic auth (`POST /api/session`) and keeps the token
//! - every request carries the token in `vmware-api-session-id`
//! - `logout` ends the session (`DELETE /api/session`)

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Response, StatusCode, Url};
use serde::de::DeserializeOwned;

use crate::VERSION;
use crate::api::ManagementApi;
use crate::config::VSphereConfig;
use crate::error::ApiError;
use crate::model::{
    DatacenterRef, DatastoreRef, FcdCreateSpec, ProfileId, QueryFilter, QueryResult,
    ServerObjectRef, TaskInfo, TaskRef, VirtualDisk, VmRef,
};

const SESSION_HEADER: &str = "vmware-api-session-id";

/// Caller-owned connection to a management gateway.
pub struct GatewayClient {
    base_url: String,
    base: Url,
    client: Client,
}

impl GatewayClient {
    /// Log in and return a connected client.
    pub async fn connect(config: &VSphereConfig) -> Result<Self, ApiError> {
        let base_url = config.url.trim_end_matches('/').to_string();
        let base = Url::parse(&base_url).map_err(|e| {
            ApiError::InvalidConfig(format!("invalid gateway URL {}: {}", base_url, e))
        })?;
        let user_agent = format!("cns-e2e/{}", VERSION);

        let login = Client::builder()
            .user_agent(&user_agent)
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ApiError::InvalidConfig(format!("failed to create HTTP client: {}", e)))?;

        tracing::debug!(url = %base_url, user = %config.user, "Creating management session");
        let response = login
            .post(endpoint(&base, &["api", "session"])?)
            .basic_auth(&config.user, Some(&config.password))
            .send()
            .await
            .map_err(transport_error)?;
        let token: String = decode(response).await?;

        let mut session = HeaderValue::from_str(&token)
            .map_err(|e| ApiError::Decode(format!("invalid session token: {}", e)))?;
        session.set_sensitive(true);
        let mut headers = HeaderMap::new();
        headers.insert(HeaderName::from_static(SESSION_HEADER), session);

        let client = Client::builder()
            .default_headers(headers)
            .user_agent(&user_agent)
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ApiError::InvalidConfig(format!("failed to create HTTP client: {}", e)))?;

        tracing::info!(url = %base_url, "Connected to management gateway");
        Ok(Self {
            base_url,
            base,
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, segments: &[&str]) -> Result<Url, ApiError> {
        endpoint(&self.base, segments)
    }
}

/// Append `segments` to `base`, percent-encoding each one.
fn endpoint(base: &Url, segments: &[&str]) -> Result<Url, ApiError> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| ApiError::InvalidConfig(format!("gateway URL {} cannot be a base", base)))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

fn transport_error(e: reqwest::Error) -> ApiError {
    ApiError::Transport(e.to_string())
}

async fn check(response: Response) -> Result<Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let path = response.url().path().to_string();
    let message = response.text().await.unwrap_or_default();
    if status == StatusCode::NOT_FOUND {
        return Err(ApiError::NotFound(path));
    }
    Err(ApiError::Status {
        status: status.as_u16(),
        message,
    })
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
    check(response)
        .await?
        .json::<T>()
        .await
        .map_err(|e| ApiError::Decode(e.to_string()))
}

#[async_trait]
impl ManagementApi for GatewayClient {
    async fn query_volumes(&self, filter: &QueryFilter) -> Result<QueryResult, ApiError> {
        let response = self
            .client
            .post(self.url(&["api", "cns", "volumes", "query"])?)
            .json(filter)
            .send()
            .await
            .map_err(transport_error)?;
        decode(response).await
    }

    async fn datacenters(&self) -> Result<Vec<DatacenterRef>, ApiError> {
        let response = self
            .client
            .get(self.url(&["api", "vcenter", "datacenter"])?)
            .send()
            .await
            .map_err(transport_error)?;
        decode(response).await
    }

    async fn find_vm_by_uuid(
        &self,
        datacenter: &DatacenterRef,
        uuid: &str,
    ) -> Result<Option<VmRef>, ApiError> {
        let response = self
            .client
            .get(self.url(&["api", "vcenter", "vm"])?)
            .query(&[
                ("datacenters", datacenter.datacenter.as_str()),
                ("instance_uuids", uuid),
            ])
            .send()
            .await
            .map_err(transport_error)?;
        let vms: Vec<VmRef> = decode(response).await?;
        Ok(vms.into_iter().next())
    }

    async fn vm_disks(&self, vm: &VmRef) -> Result<Vec<VirtualDisk>, ApiError> {
        let response = self
            .client
            .get(self.url(&["api", "vcenter", "vm", vm.vm.as_str(), "disks"])?)
            .send()
            .await
            .map_err(transport_error)?;
        decode(response).await
    }

    async fn profile_id_by_name(&self, name: &str) -> Result<ProfileId, ApiError> {
        let response = self
            .client
            .get(self.url(&["api", "pbm", "profiles"])?)
            .query(&[("name", name)])
            .send()
            .await
            .map_err(transport_error)?;
        let profiles: Vec<ProfileId> = decode(response).await?;
        profiles
            .into_iter()
            .next()
            .ok_or_else(|| ApiError::NotFound(format!("storage policy {}", name)))
    }

    async fn associated_entities(
        &self,
        profile: &ProfileId,
        object_type: &str,
    ) -> Result<Vec<ServerObjectRef>, ApiError> {
        let response = self
            .client
            .get(self.url(&[
                "api",
                "pbm",
                "profiles",
                profile.unique_id.as_str(),
                "associated-entities",
            ])?)
            .query(&[("type", object_type)])
            .send()
            .await
            .map_err(transport_error)?;
        decode(response).await
    }

    async fn create_disk(&self, spec: &FcdCreateSpec) -> Result<TaskRef, ApiError> {
        let response = self
            .client
            .post(self.url(&["api", "vslm", "disks"])?)
            .json(spec)
            .send()
            .await
            .map_err(transport_error)?;
        decode(response).await
    }

    async fn delete_disk(&self, id: &str, datastore: &DatastoreRef) -> Result<TaskRef, ApiError> {
        let response = self
            .client
            .delete(self.url(&["api", "vslm", "disks", id])?)
            .query(&[("datastore", datastore.datastore.as_str())])
            .send()
            .await
            .map_err(transport_error)?;
        decode(response).await
    }

    async fn task_info(&self, task: &TaskRef) -> Result<TaskInfo, ApiError> {
        let response = self
            .client
            .get(self.url(&["api", "tasks", task.task.as_str()])?)
            .send()
            .await
            .map_err(transport_error)?;
        decode(response).await
    }

    async fn logout(&self) -> Result<(), ApiError> {
        let response = self
            .client
            .delete(self.url(&["api", "session"])?)
            .send()
            .await
            .map_err(transport_error)?;
        check(response).await?;
        tracing::debug!(url = %self.base_url, "Management session closed");
        Ok(())
    }
}
