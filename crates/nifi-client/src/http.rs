//! HTTP client for the NiFi REST API

use crate::api::FlowApi;
use crate::error::{ClientError, Result};
use async_trait::async_trait;
use nifi_types::*;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;
use tracing::{debug, error};

/// Client id sent with revisions so the server can attribute writes
const CLIENT_ID: &str = "nifi-deploy";

/// HTTP implementation of [`FlowApi`]
pub struct NifiClient {
    client: Client,
    base_url: String,
}

impl NifiClient {
    /// Create a client for an API root such as `http://localhost:8080/nifi-api`
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self> {
        if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
            return Err(ClientError::InvalidEndpoint(endpoint.to_string()));
        }

        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: endpoint.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    // ========== Internal HTTP helpers ==========

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let request = self.client.get(self.url(path));
        self.send_json(request, path).await
    }

    async fn put<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        let request = self.client.put(self.url(path)).json(body);
        self.send_json(request, path).await
    }

    async fn post<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        let request = self.client.post(self.url(path)).json(body);
        self.send_json(request, path).await
    }

    async fn post_empty<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let request = self.client.post(self.url(path));
        self.send_json(request, path).await
    }

    async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let request = self.client.delete(self.url(path));
        self.send_json(request, path).await
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder, path: &str) -> Result<T> {
        let response = request.header("Accept", "application/json").send().await?;
        let response = self.check(response, path).await?;
        Ok(response.json().await?)
    }

    async fn check(&self, response: reqwest::Response, path: &str) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let message = response.text().await.unwrap_or_default();
        if status == StatusCode::NOT_FOUND {
            debug!(path, %status, "Resource not found");
            return Err(ClientError::NotFound(path.to_string()));
        }

        error!(path, status = status.as_u16(), body = %message, "Remote call failed");

        // Stale revisions arrive as 400 or 409 depending on the endpoint;
        // only the body tells them apart from other rejections
        if is_stale_revision(status, &message) {
            return Err(ClientError::RevisionConflict {
                resource: path.to_string(),
                status: status.as_u16(),
                message,
            });
        }
        if status == StatusCode::CONFLICT {
            return Err(ClientError::Conflict {
                resource: path.to_string(),
                message,
            });
        }

        Err(ClientError::Api {
            resource: path.to_string(),
            status: status.as_u16(),
            message,
        })
    }
}

fn is_stale_revision(status: StatusCode, body: &str) -> bool {
    (status == StatusCode::BAD_REQUEST || status == StatusCode::CONFLICT)
        && body.to_ascii_lowercase().contains("revision")
}

fn stamped(revision: &Revision) -> Revision {
    revision.clone().with_client_id(CLIENT_ID)
}

#[async_trait]
impl FlowApi for NifiClient {
    async fn group_flow(&self, id: &GroupId) -> Result<ProcessGroupFlow> {
        let entity: ProcessGroupFlowEntity =
            self.get(&format!("/flow/process-groups/{}", id)).await?;
        Ok(entity.process_group_flow)
    }

    async fn process_group(&self, id: &GroupId) -> Result<ProcessGroupEntity> {
        self.get(&format!("/process-groups/{}", id)).await
    }

    async fn delete_process_group(&self, id: &GroupId, revision: &Revision) -> Result<()> {
        let path = format!(
            "/process-groups/{}?version={}&clientId={}",
            id, revision.version, CLIENT_ID
        );
        let _: serde_json::Value = self.delete(&path).await?;
        Ok(())
    }

    async fn search_process_groups(&self, query: &str) -> Result<Vec<SearchHit>> {
        let path = "/flow/search-results";
        let request = self.client.get(self.url(path)).query(&[("q", query)]);
        let entity: SearchResultsEntity = self.send_json(request, path).await?;
        Ok(entity.search_results.process_group_results)
    }

    async fn processors(&self, group: &GroupId) -> Result<Vec<ProcessorEntity>> {
        let entity: ProcessorsEntity = self
            .get(&format!("/process-groups/{}/processors", group))
            .await?;
        Ok(entity.processors)
    }

    async fn processor(&self, id: &ProcessorId) -> Result<ProcessorEntity> {
        self.get(&format!("/processors/{}", id)).await
    }

    async fn update_processor(&self, update: &ProcessorUpdate) -> Result<ProcessorEntity> {
        let mut body = update.clone();
        body.revision = stamped(&update.revision);
        self.put(&format!("/processors/{}", update.id), &body).await
    }

    async fn port(&self, kind: PortKind, id: &PortId) -> Result<PortEntity> {
        self.get(&format!("/{}/{}", kind.path_segment(), id)).await
    }

    async fn update_port(&self, kind: PortKind, update: &PortUpdate) -> Result<PortEntity> {
        let mut body = update.clone();
        body.revision = stamped(&update.revision);
        let path = format!("/{}/{}", kind.path_segment(), update.component.id);
        self.put(&path, &body).await
    }

    async fn create_drop_request(&self, connection: &ConnectionId) -> Result<DropRequest> {
        let entity: DropRequestEntity = self
            .post_empty(&format!("/flowfile-queues/{}/drop-requests", connection))
            .await?;
        Ok(entity.drop_request)
    }

    async fn drop_request(
        &self,
        connection: &ConnectionId,
        request: &DropRequestId,
    ) -> Result<DropRequest> {
        let entity: DropRequestEntity = self
            .get(&format!(
                "/flowfile-queues/{}/drop-requests/{}",
                connection, request
            ))
            .await?;
        Ok(entity.drop_request)
    }

    async fn delete_drop_request(
        &self,
        connection: &ConnectionId,
        request: &DropRequestId,
    ) -> Result<DropRequest> {
        let entity: DropRequestEntity = self
            .delete(&format!(
                "/flowfile-queues/{}/drop-requests/{}",
                connection, request
            ))
            .await?;
        Ok(entity.drop_request)
    }

    async fn controller_service(
        &self,
        id: &ControllerServiceId,
    ) -> Result<ControllerServiceEntity> {
        self.get(&format!("/controller-services/{}", id)).await
    }

    async fn group_controller_services(
        &self,
        group: &GroupId,
    ) -> Result<Vec<ControllerServiceEntity>> {
        let entity: ControllerServicesEntity = self
            .get(&format!("/flow/process-groups/{}/controller-services", group))
            .await?;
        Ok(entity.controller_services)
    }

    async fn global_controller_services(&self) -> Result<Vec<ControllerServiceEntity>> {
        let entity: ControllerServicesEntity =
            self.get("/flow/controller/controller-services").await?;
        Ok(entity.controller_services)
    }

    async fn update_controller_service(
        &self,
        update: &ControllerServiceUpdate,
    ) -> Result<ControllerServiceEntity> {
        let mut body = update.clone();
        body.revision = stamped(&update.revision);
        self.put(&format!("/controller-services/{}", update.component.id), &body)
            .await
    }

    async fn create_controller_service(
        &self,
        scope: &ControllerScope,
        service: &NewControllerService,
    ) -> Result<ControllerServiceEntity> {
        let path = match scope {
            ControllerScope::Global => "/controller/controller-services".to_string(),
            ControllerScope::Group(group) => {
                format!("/process-groups/{}/controller-services", group)
            }
        };
        let mut body = service.clone();
        body.revision = stamped(&service.revision);
        self.post(&path, &body).await
    }

    async fn templates(&self) -> Result<Vec<TemplateSummary>> {
        let entity: TemplatesEntity = self.get("/flow/templates").await?;
        Ok(entity.templates.into_iter().map(|t| t.template).collect())
    }

    async fn delete_template(&self, id: &TemplateId) -> Result<()> {
        let _: serde_json::Value = self.delete(&format!("/templates/{}", id)).await?;
        Ok(())
    }

    async fn upload_template(
        &self,
        group: &GroupId,
        artifact: &TemplateArtifact,
    ) -> Result<TemplateSummary> {
        let path = format!("/process-groups/{}/templates/upload", group);
        let part = Part::bytes(artifact.bytes.clone())
            .file_name(artifact.file_name.clone())
            .mime_str("application/xml")?;
        let form = Form::new().part("template", part);

        let response = self
            .client
            .post(self.url(&path))
            .header("Accept", "application/xml")
            .multipart(form)
            .send()
            .await?;
        let response = self.check(response, &path).await?;

        // The upload endpoint answers in XML only
        let body = response.text().await?;
        Ok(TemplateSummary::from_upload_xml(&body)?)
    }

    async fn instantiate_template(
        &self,
        group: &GroupId,
        request: &InstantiateTemplateRequest,
    ) -> Result<FlowEntity> {
        self.post(&format!("/process-groups/{}/template-instance", group), request)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = NifiClient::new("http://localhost:8080/nifi-api", Duration::from_secs(5)).unwrap();
        assert_eq!(client.base_url(), "http://localhost:8080/nifi-api");
    }

    #[test]
    fn test_client_endpoint_normalization() {
        let client = NifiClient::new("http://localhost:8080/nifi-api/", Duration::from_secs(5)).unwrap();
        assert_eq!(client.base_url(), "http://localhost:8080/nifi-api");
    }

    #[test]
    fn test_stale_revision_detection() {
        let body = "[3, null, p-1] is not the most up-to-date revision";
        assert!(is_stale_revision(StatusCode::BAD_REQUEST, body));
        assert!(is_stale_revision(StatusCode::CONFLICT, body));
        assert!(!is_stale_revision(StatusCode::BAD_REQUEST, "Scheduling Period is invalid"));
        assert!(!is_stale_revision(StatusCode::INTERNAL_SERVER_ERROR, body));
    }

    #[test]
    fn test_client_rejects_bare_host() {
        let err = NifiClient::new("localhost:8080", Duration::from_secs(5)).err().unwrap();
        assert!(matches!(err, ClientError::InvalidEndpoint(_)));
    }
}
