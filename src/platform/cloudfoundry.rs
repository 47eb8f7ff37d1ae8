//! Cloud Foundry v2 implementation of [`PlatformApi`]

use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use super::{
    Application, ApplicationStats, InstanceDeletion, InstanceState, InstancesReport,
    NewServiceBroker, NewServiceInstance, Organization, Page, Parameters, PlatformApi, Resource,
    ServiceBinding, ServiceBroker, ServiceInstance, ServiceOffering, ServicePlan, Space,
};
use crate::config::ClientConfig;
use crate::error::RemoteError;
use crate::Error;

/// OAuth client the platform CLI uses for password grants
const CF_CLIENT_ID: &str = "cf";

type Query<'a> = [(&'a str, String)];

#[derive(Debug, Deserialize)]
struct Info {
    token_endpoint: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error_code: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

/// Platform client speaking the Cloud Foundry v2 REST API
///
/// Authenticates with a UAA password grant on first use and logs in again once
/// if the platform rejects the token.
pub struct CloudFoundryClient {
    http: reqwest::Client,
    endpoint: String,
    username: String,
    password: String,
    token: RwLock<Option<String>>,
}

impl CloudFoundryClient {
    /// Create a client from the connection settings
    pub fn new(config: &ClientConfig) -> Result<Self, Error> {
        let mut builder = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .connect_timeout(Duration::from_secs(10))
            .danger_accept_invalid_certs(config.skip_ssl_validation);

        if let Some(proxy) = &config.proxy {
            let proxy = reqwest::Proxy::all(proxy)
                .map_err(|e| Error::config(format!("invalid proxy {}: {}", proxy, e)))?;
            builder = builder.proxy(proxy);
        }

        let http = builder
            .build()
            .map_err(|e| Error::transport("build HTTP client", e))?;

        Ok(Self {
            http,
            endpoint: config.target_endpoint.trim_end_matches('/').to_string(),
            username: config.username.clone(),
            password: config.password.clone(),
            token: RwLock::new(None),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.endpoint, path)
    }

    async fn login(&self) -> Result<String, Error> {
        let response = self
            .http
            .get(self.url("/v2/info"))
            .send()
            .await
            .map_err(|e| Error::transport("get platform info", e))?;
        let response = checked("get platform info", response).await?;
        let info: Info = decode("get platform info", response).await?;

        let token_url = format!("{}/oauth/token", info.token_endpoint.trim_end_matches('/'));
        let response = self
            .http
            .post(token_url)
            .basic_auth(CF_CLIENT_ID, Some(""))
            .form(&[
                ("grant_type", "password"),
                ("username", self.username.as_str()),
                ("password", self.password.as_str()),
            ])
            .send()
            .await
            .map_err(|e| Error::transport("login", e))?;
        let token: TokenResponse = decode("login", checked("login", response).await?).await?;

        debug!(user = %self.username, "Acquired platform access token");
        *self.token.write() = Some(token.access_token.clone());
        Ok(token.access_token)
    }

    async fn access_token(&self) -> Result<String, Error> {
        let cached = self.token.read().clone();
        match cached {
            Some(token) => Ok(token),
            None => self.login().await,
        }
    }

    async fn send(
        &self,
        operation: &str,
        method: Method,
        url: &str,
        query: &Query<'_>,
        body: Option<&serde_json::Value>,
    ) -> Result<reqwest::Response, Error> {
        let mut relogged = false;
        loop {
            let token = self.access_token().await?;
            let mut request = self
                .http
                .request(method.clone(), url)
                .bearer_auth(&token)
                .query(query);
            if let Some(body) = body {
                request = request.json(body);
            }

            let response = request
                .send()
                .await
                .map_err(|e| Error::transport(operation, e))?;

            if response.status() == StatusCode::UNAUTHORIZED && !relogged {
                debug!(operation = %operation, "Access token rejected, logging in again");
                *self.token.write() = None;
                relogged = true;
                continue;
            }

            return checked(operation, response).await;
        }
    }

    async fn call(
        &self,
        operation: &str,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<reqwest::Response, Error> {
        self.send(operation, method, &self.url(path), &[], body.as_ref())
            .await
    }

    async fn list<E>(
        &self,
        operation: &str,
        path: &str,
        query: &Query<'_>,
    ) -> Result<Vec<Resource<E>>, Error>
    where
        E: DeserializeOwned + Send,
    {
        let response = self
            .send(operation, Method::GET, &self.url(path), query, None)
            .await?;
        let mut page: Page<E> = decode(operation, response).await?;
        let mut resources = Vec::new();

        loop {
            resources.append(&mut page.resources);
            match page.next_url.take() {
                Some(next) => {
                    let response = self
                        .send(operation, Method::GET, &self.url(&next), &[], None)
                        .await?;
                    page = decode(operation, response).await?;
                }
                None => return Ok(resources),
            }
        }
    }

    async fn first<E>(
        &self,
        operation: &str,
        path: &str,
        query: &Query<'_>,
    ) -> Result<Option<Resource<E>>, Error>
    where
        E: DeserializeOwned + Send,
    {
        Ok(self.list(operation, path, query).await?.into_iter().next())
    }
}

fn filter(field: &str, value: &str) -> (&'static str, String) {
    ("q", format!("{}:{}", field, value))
}

fn to_body<T: serde::Serialize>(operation: &str, value: &T) -> Result<serde_json::Value, Error> {
    serde_json::to_value(value)
        .map_err(|e| Error::validation(format!("cannot encode {} body: {}", operation, e)))
}

/// Pass 2xx responses through, turn anything else into a [`RemoteError`]
async fn checked(operation: &str, response: reqwest::Response) -> Result<reqwest::Response, Error> {
    if response.status().is_success() {
        return Ok(response);
    }

    let status = response.status().as_u16();
    let text = response.text().await.unwrap_or_default();
    let mut error = RemoteError::new(operation, status);
    match serde_json::from_str::<ErrorBody>(&text) {
        Ok(body) => {
            error.error_code = body.error_code;
            error.description = body.description;
        }
        Err(_) if !text.trim().is_empty() => error.description = Some(text),
        Err(_) => {}
    }
    Err(error.into())
}

async fn decode<T: DeserializeOwned>(
    operation: &str,
    response: reqwest::Response,
) -> Result<T, Error> {
    let text = response
        .text()
        .await
        .map_err(|e| Error::transport(operation, e))?;
    serde_json::from_str(&text).map_err(|e| Error::malformed(operation, e.to_string()))
}

#[async_trait]
impl PlatformApi for CloudFoundryClient {
    async fn find_organization(&self, name: &str) -> Result<Option<Organization>, Error> {
        self.first("find organization", "/v2/organizations", &[filter("name", name)])
            .await
    }

    async fn find_space(
        &self,
        organization_guid: &str,
        name: &str,
    ) -> Result<Option<Space>, Error> {
        self.first(
            "find space",
            "/v2/spaces",
            &[
                filter("name", name),
                filter("organization_guid", organization_guid),
            ],
        )
        .await
    }

    async fn find_application(
        &self,
        space_guid: &str,
        name: &str,
    ) -> Result<Option<Application>, Error> {
        self.first(
            "find application",
            "/v2/apps",
            &[filter("name", name), filter("space_guid", space_guid)],
        )
        .await
    }

    async fn find_service_offering(&self, label: &str) -> Result<Option<ServiceOffering>, Error> {
        self.first("find service", "/v2/services", &[filter("label", label)])
            .await
    }

    async fn list_broker_offerings(
        &self,
        broker_guid: &str,
    ) -> Result<Vec<ServiceOffering>, Error> {
        self.list(
            "list broker services",
            "/v2/services",
            &[filter("service_broker_guid", broker_guid)],
        )
        .await
    }

    async fn list_service_plans(&self, service_guid: &str) -> Result<Vec<ServicePlan>, Error> {
        self.list(
            "list service plans",
            "/v2/service_plans",
            &[filter("service_guid", service_guid)],
        )
        .await
    }

    async fn find_service_broker(
        &self,
        space_guid: &str,
        name: &str,
        broker_url: &str,
    ) -> Result<Option<ServiceBroker>, Error> {
        let brokers: Vec<ServiceBroker> = self
            .list(
                "find service broker",
                "/v2/service_brokers",
                &[filter("name", name), filter("space_guid", space_guid)],
            )
            .await?;
        let wanted = broker_url.trim_end_matches('/');
        Ok(brokers
            .into_iter()
            .find(|b| b.entity.broker_url.trim_end_matches('/') == wanted))
    }

    async fn create_service_broker(
        &self,
        request: &NewServiceBroker,
    ) -> Result<ServiceBroker, Error> {
        let operation = "create service broker";
        let body = to_body(operation, request)?;
        let response = self
            .call(operation, Method::POST, "/v2/service_brokers", Some(body))
            .await?;
        decode(operation, response).await
    }

    async fn delete_service_broker(&self, broker_guid: &str) -> Result<(), Error> {
        self.call(
            "delete service broker",
            Method::DELETE,
            &format!("/v2/service_brokers/{}", broker_guid),
            None,
        )
        .await?;
        Ok(())
    }

    async fn find_service_instance(
        &self,
        space_guid: &str,
        name: &str,
    ) -> Result<Option<ServiceInstance>, Error> {
        self.first(
            "find service instance",
            "/v2/service_instances",
            &[filter("name", name), filter("space_guid", space_guid)],
        )
        .await
    }

    async fn create_service_instance(
        &self,
        request: &NewServiceInstance,
    ) -> Result<ServiceInstance, Error> {
        let operation = "create service instance";
        let body = to_body(operation, request)?;
        let response = self
            .call(operation, Method::POST, "/v2/service_instances", Some(body))
            .await?;
        decode(operation, response).await
    }

    async fn update_service_instance(
        &self,
        instance_guid: &str,
        parameters: &Parameters,
    ) -> Result<(), Error> {
        self.call(
            "update service instance",
            Method::PUT,
            &format!("/v2/service_instances/{}", instance_guid),
            Some(json!({ "parameters": parameters })),
        )
        .await?;
        Ok(())
    }

    async fn delete_service_instance(
        &self,
        instance_guid: &str,
    ) -> Result<InstanceDeletion, Error> {
        let result = self
            .call(
                "delete service instance",
                Method::DELETE,
                &format!("/v2/service_instances/{}", instance_guid),
                None,
            )
            .await;

        match result {
            Ok(_) => Ok(InstanceDeletion::Deleted),
            Err(Error::Remote(error)) => match error.conflict() {
                Some(conflict) => Ok(InstanceDeletion::Blocked { conflict, error }),
                None => Err(Error::Remote(error)),
            },
            Err(e) => Err(e),
        }
    }

    async fn list_bindings(&self, instance_guid: &str) -> Result<Vec<ServiceBinding>, Error> {
        self.list(
            "list service bindings",
            "/v2/service_bindings",
            &[filter("service_instance_guid", instance_guid)],
        )
        .await
    }

    async fn find_binding(
        &self,
        instance_guid: &str,
        app_guid: &str,
    ) -> Result<Option<ServiceBinding>, Error> {
        self.first(
            "find service binding",
            "/v2/service_bindings",
            &[
                filter("service_instance_guid", instance_guid),
                filter("app_guid", app_guid),
            ],
        )
        .await
    }

    async fn create_binding(
        &self,
        app_guid: &str,
        instance_guid: &str,
    ) -> Result<ServiceBinding, Error> {
        let operation = "create service binding";
        let body = json!({
            "app_guid": app_guid,
            "service_instance_guid": instance_guid,
        });
        let response = self
            .call(operation, Method::POST, "/v2/service_bindings", Some(body))
            .await?;
        decode(operation, response).await
    }

    async fn delete_binding(&self, binding_guid: &str) -> Result<(), Error> {
        self.call(
            "delete service binding",
            Method::DELETE,
            &format!("/v2/service_bindings/{}", binding_guid),
            None,
        )
        .await?;
        Ok(())
    }

    async fn application_instances(&self, app_guid: &str) -> Result<InstancesReport, Error> {
        let operation = "list application instances";
        let result = self
            .call(
                operation,
                Method::GET,
                &format!("/v2/apps/{}/instances", app_guid),
                None,
            )
            .await;

        match result {
            Ok(response) => Ok(InstancesReport::Reported(
                decode::<std::collections::BTreeMap<String, InstanceState>>(operation, response)
                    .await?,
            )),
            // the platform answers 400 when a stopped application has no instance to report
            Err(Error::Remote(error)) if error.is_bad_request() => {
                debug!(app = %app_guid, error = %error, "Application reports no instances");
                Ok(InstancesReport::NoInstances)
            }
            Err(e) => Err(e),
        }
    }

    async fn application_stats(&self, app_guid: &str) -> Result<ApplicationStats, Error> {
        let operation = "get application stats";
        let response = self
            .call(
                operation,
                Method::GET,
                &format!("/v2/apps/{}/stats", app_guid),
                None,
            )
            .await?;
        decode(operation, response).await
    }

    async fn start_application(&self, app_guid: &str) -> Result<(), Error> {
        self.call(
            "start application",
            Method::PUT,
            &format!("/v2/apps/{}", app_guid),
            Some(json!({ "state": "STARTED" })),
        )
        .await?;
        Ok(())
    }

    async fn stop_application(&self, app_guid: &str) -> Result<(), Error> {
        self.call(
            "stop application",
            Method::PUT,
            &format!("/v2/apps/{}", app_guid),
            Some(json!({ "state": "STOPPED" })),
        )
        .await?;
        Ok(())
    }
}
