//! Argo CD REST Client
//!
//! [`ProjectService`] and [`ApplicationService`] over the Argo CD API server's
//! REST gateway.

use super::argocd::{
    AppProject, Application, ApplicationService, DeleteOptions, ProjectService,
};
use super::types::{OperatorError, Result};
use crate::config::ArgoCdClientOptions;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone)]
pub struct ArgoCdClient {
    http: Client,
    base: Url,
    token: Option<String>,
}

#[derive(Serialize)]
struct ProjectCreateRequest<'a> {
    project: &'a AppProject,
    upsert: bool,
}

#[derive(Serialize)]
struct ProjectUpdateRequest<'a> {
    project: &'a AppProject,
}

#[derive(Deserialize, Default)]
struct ApiErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    error: String,
}

impl ArgoCdClient {
    pub fn new(options: &ArgoCdClientOptions) -> Result<Self> {
        if options.server_addr.is_empty() {
            return Err(OperatorError::Config("Argo CD server address is empty".into()));
        }
        if options.grpc_web || options.port_forward {
            warn!("grpc-web and port-forward client options are ignored by the REST client");
        }

        let mut builder = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .danger_accept_invalid_certs(options.insecure);

        if let Some(path) = &options.server_cert_file {
            let pem = std::fs::read(path)
                .map_err(|e| OperatorError::Config(format!("reading {}: {}", path, e)))?;
            builder = builder.add_root_certificate(reqwest::Certificate::from_pem(&pem)?);
        }
        if let (Some(cert), Some(key)) = (&options.client_cert_file, &options.client_cert_key_file) {
            let mut pem = std::fs::read(cert)
                .map_err(|e| OperatorError::Config(format!("reading {}: {}", cert, e)))?;
            pem.extend(
                std::fs::read(key)
                    .map_err(|e| OperatorError::Config(format!("reading {}: {}", key, e)))?,
            );
            builder = builder.identity(reqwest::Identity::from_pem(&pem)?);
        }

        Ok(Self {
            http: builder.build()?,
            base: base_url(options)?,
            token: options.auth_token.clone().filter(|t| !t.is_empty()),
        })
    }

    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| OperatorError::Config(format!("{} cannot be a base URL", self.base)))?
            .pop_if_empty()
            .extend(["api", "v1"])
            .extend(segments);
        Ok(url)
    }

    fn authorized(&self, req: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    /// `Ok(None)` on 404
    async fn get_opt<T: DeserializeOwned>(&self, url: Url) -> Result<Option<T>> {
        debug!(%url, "GET");
        let resp = self.authorized(self.http.get(url)).send().await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Ok(Some(checked(resp).await?.json().await?))
    }
}

fn base_url(options: &ArgoCdClientOptions) -> Result<Url> {
    let addr = options.server_addr.trim_end_matches('/');
    let raw = if addr.contains("://") {
        addr.to_string()
    } else if options.plaintext {
        format!("http://{}", addr)
    } else {
        format!("https://{}", addr)
    };
    let mut url = Url::parse(&raw)
        .map_err(|e| OperatorError::Config(format!("invalid Argo CD address '{}': {}", raw, e)))?;
    if let Some(root) = options.grpc_web_root_path.as_deref().filter(|p| !p.is_empty()) {
        url.set_path(root);
    }
    Ok(url)
}

async fn checked(resp: Response) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let text = resp.text().await.unwrap_or_default();
    let body: ApiErrorBody = serde_json::from_str(&text).unwrap_or_default();
    let message = [body.message, body.error]
        .into_iter()
        .find(|m| !m.is_empty())
        .unwrap_or(text);

    Err(match status {
        StatusCode::NOT_FOUND => OperatorError::NotFound(message),
        StatusCode::CONFLICT => OperatorError::Conflict(message),
        _ => OperatorError::Remote {
            status: status.as_u16(),
            message,
        },
    })
}

#[async_trait]
impl ProjectService for ArgoCdClient {
    async fn get(&self, name: &str) -> Result<Option<AppProject>> {
        self.get_opt(self.url(&["projects", name])?).await
    }

    async fn create(&self, project: &AppProject, upsert: bool) -> Result<AppProject> {
        let req = self
            .http
            .post(self.url(&["projects"])?)
            .json(&ProjectCreateRequest { project, upsert });
        let resp = self.authorized(req).send().await?;
        Ok(checked(resp).await?.json().await?)
    }

    async fn update(&self, project: &AppProject) -> Result<AppProject> {
        let req = self
            .http
            .put(self.url(&["projects", project.name()])?)
            .json(&ProjectUpdateRequest { project });
        let resp = self.authorized(req).send().await?;
        Ok(checked(resp).await?.json().await?)
    }
}

#[async_trait]
impl ApplicationService for ArgoCdClient {
    async fn get(&self, name: &str) -> Result<Option<Application>> {
        self.get_opt(self.url(&["applications", name])?).await
    }

    async fn create(&self, application: &Application) -> Result<Application> {
        let mut url = self.url(&["applications"])?;
        url.query_pairs_mut().append_pair("upsert", "false");
        let req = self.http.post(url).json(application);
        let resp = self.authorized(req).send().await?;
        Ok(checked(resp).await?.json().await?)
    }

    async fn delete(&self, name: &str, options: &DeleteOptions) -> Result<()> {
        let mut url = self.url(&["applications", name])?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("cascade", if options.cascade { "true" } else { "false" });
            if let Some(policy) = options.propagation_policy {
                query.append_pair("propagationPolicy", policy.as_str());
            }
        }
        let resp = self.authorized(self.http.delete(url)).send().await?;
        if resp.status() == StatusCode::NOT_FOUND {
            debug!(application = name, "application already deleted");
            return Ok(());
        }
        checked(resp).await?;
        Ok(())
    }
}
