//! Resource client abstraction and its HTTP implementation.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, HeaderMap, HeaderName, HeaderValue};
use serde::de::DeserializeOwned;

use cseview_core::{FetchError, SyncConfig};

use crate::wire::{BaseDescriptor, BaseResponse, Listing};

/// Discovery modifier asking for every descendant rather than direct
/// children metadata only.
pub const DISCOVERY_QUERY: &str = "rcn=4";

const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-m2m-ri");
const ORIGIN_HEADER: HeaderName = HeaderName::from_static("x-m2m-origin");

/// Read-only access to the remote resource hierarchy.
#[async_trait]
pub trait ResourceClient: Send + Sync {
    /// Retrieve the base container descriptor at `address`.
    async fn retrieve_base(&self, address: &str) -> Result<BaseDescriptor, FetchError>;

    /// Retrieve the flat descendant listing of the container at `address`.
    async fn retrieve_listing(&self, address: &str) -> Result<Listing, FetchError>;
}

#[async_trait]
impl<T: ResourceClient + ?Sized> ResourceClient for Arc<T> {
    async fn retrieve_base(&self, address: &str) -> Result<BaseDescriptor, FetchError> {
        (**self).retrieve_base(address).await
    }

    async fn retrieve_listing(&self, address: &str) -> Result<Listing, FetchError> {
        (**self).retrieve_listing(address).await
    }
}

/// [`ResourceClient`] speaking JSON over HTTP.
#[derive(Debug, Clone)]
pub struct HttpResourceClient {
    client: reqwest::Client,
}

impl HttpResourceClient {
    /// Build a client sending the session's originator and request id with
    /// every request.
    pub fn new(config: &SyncConfig) -> Result<Self, FetchError> {
        let header = |value: &str| {
            HeaderValue::from_str(value).map_err(|e| FetchError::transport(config.base(), e))
        };

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(REQUEST_ID_HEADER, header(&config.request_id)?);
        headers.insert(ORIGIN_HEADER, header(&config.originator)?);

        let mut builder = reqwest::Client::builder().default_headers(headers);
        if let Some(timeout) = config.request_timeout() {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| FetchError::transport(config.base(), e))?;

        Ok(Self { client })
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str, address: &str) -> Result<T, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::transport(address, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                address: address.into(),
                status: status.as_u16(),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| FetchError::transport(address, e))?;
        serde_json::from_slice(&body).map_err(|e| FetchError::decode(address, e))
    }
}

#[async_trait]
impl ResourceClient for HttpResourceClient {
    async fn retrieve_base(&self, address: &str) -> Result<BaseDescriptor, FetchError> {
        let response: BaseResponse = self.get_json(address, address).await?;
        response.base.ok_or_else(|| FetchError::MissingBase {
            address: address.into(),
        })
    }

    async fn retrieve_listing(&self, address: &str) -> Result<Listing, FetchError> {
        self.get_json(&discovery_url(address), address).await
    }
}

/// Listing request URL for a container address.
pub fn discovery_url(address: &str) -> String {
    let separator = if address.contains('?') { '&' } else { '?' };
    format!("{address}{separator}{DISCOVERY_QUERY}")
}
