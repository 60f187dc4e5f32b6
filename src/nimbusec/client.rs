use std::time::Duration;

use reqwest::{Client, Method, RequestBuilder, Response};
use serde::Serialize;
use serde::de::DeserializeOwned;
use url::Url;

use super::NimbusecApi;
use super::error::ApiError;
use super::oauth::OAuthSigner;
use super::types::{Domain, ScanResult};

pub const DEFAULT_API: &str = "https://api.nimbusec.com/";

/// Filter that matches everything; no `q` parameter is sent.
pub const EMPTY_FILTER: &str = "";

const ERROR_HEADER: &str = "x-nimbusec-error";

pub struct NimbusecClient {
    client: Client,
    base_url: Url,
    signer: OAuthSigner,
}

impl NimbusecClient {
    #[cfg(test)]
    pub fn new(base_url: &str, key: &str, secret: &str) -> Result<Self, ApiError> {
        Self::with_timeout(base_url, key, secret, Duration::from_secs(60))
    }

    /// Create a client whose requests give up after `timeout`.
    pub fn with_timeout(
        base_url: &str,
        key: &str,
        secret: &str,
        timeout: Duration,
    ) -> Result<Self, ApiError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            base_url: Url::parse(base_url)?,
            signer: OAuthSigner::new(key, secret),
        })
    }

    /// Resolves `path` against the base URL and appends the query parameters.
    pub fn build_url(&self, path: &str, params: &[(&str, &str)]) -> Result<Url, ApiError> {
        let mut url = self.base_url.join(path)?;
        if !params.is_empty() {
            url.query_pairs_mut().extend_pairs(params);
        }
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> Result<RequestBuilder, ApiError> {
        let authorization = self.signer.authorization(method.as_str(), &url)?;
        Ok(self
            .client
            .request(method, url)
            .header(reqwest::header::AUTHORIZATION, authorization))
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, ApiError> {
        tracing::debug!(%url, "GET");
        let response = check(self.request(Method::GET, url)?.send().await?).await?;
        Ok(response.json::<T>().await?)
    }

    async fn send_json<B, T>(&self, method: Method, url: Url, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        tracing::debug!(%method, %url, "sending JSON body");
        let response = check(self.request(method, url)?.json(body).send().await?).await?;
        Ok(response.json::<T>().await?)
    }

    async fn upsert(&self, domain: &Domain, upsert: &str) -> Result<Domain, ApiError> {
        let url = self.build_url("/v2/domain", &[("upsert", upsert)])?;
        self.send_json(Method::POST, url, domain).await
    }

    fn filtered_url(&self, path: &str, filter: &str) -> Result<Url, ApiError> {
        if filter == EMPTY_FILTER {
            self.build_url(path, &[])
        } else {
            self.build_url(path, &[("q", filter)])
        }
    }
}

/// Turns a non-2xx response into [`ApiError::Api`].
async fn check(response: Response) -> Result<Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let header = response
        .headers()
        .get(ERROR_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string);

    let message = match header {
        Some(message) => message,
        None => response
            .text()
            .await
            .unwrap_or_else(|_| "unknown error".to_string()),
    };

    Err(ApiError::Api {
        status: status.as_u16(),
        message,
    })
}

impl NimbusecApi for NimbusecClient {
    async fn find_domains(&self, filter: &str) -> Result<Vec<Domain>, ApiError> {
        let url = self.filtered_url("/v2/domain", filter)?;
        self.get_json(url).await
    }

    async fn get_domain_by_name(&self, name: &str) -> Result<Domain, ApiError> {
        let mut domains = self.find_domains(&format!("name eq \"{name}\"")).await?;
        match domains.len() {
            0 => Err(ApiError::NotFound(name.to_string())),
            1 => Ok(domains.remove(0)),
            _ => Err(ApiError::Ambiguous(name.to_string())),
        }
    }

    async fn create_or_update_domain(&self, domain: &Domain) -> Result<Domain, ApiError> {
        self.upsert(domain, "true").await
    }

    async fn create_or_get_domain(&self, domain: &Domain) -> Result<Domain, ApiError> {
        self.upsert(domain, "false").await
    }

    async fn delete_domain(&self, domain: &Domain, clean: bool) -> Result<(), ApiError> {
        let id = domain.id.ok_or_else(|| ApiError::NotFound(domain.name.clone()))?;
        let clean = clean.to_string();
        let url = self.build_url(
            &format!("/v2/domain/{id}"),
            &[("pleaseremovealldata", clean.as_str())],
        )?;
        tracing::debug!(%url, "DELETE");
        check(self.request(Method::DELETE, url)?.send().await?).await?;
        Ok(())
    }

    async fn find_infected(&self, filter: &str) -> Result<Vec<Domain>, ApiError> {
        let url = self.filtered_url("/v2/infected", filter)?;
        self.get_json(url).await
    }

    async fn find_results(&self, domain: i64, filter: &str) -> Result<Vec<ScanResult>, ApiError> {
        let url = self.filtered_url(&format!("/v2/domain/{domain}/result"), filter)?;
        self.get_json(url).await
    }
}
