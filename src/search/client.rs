use std::{fmt, time::Duration};

use async_trait::async_trait;
use reqwest::{header::CONTENT_TYPE, Client};
use thiserror::Error;

use super::{
    normalize::normalize_payload,
    signing::{Resolution, SearchRequest, SignatureResolver, SigningAttempt},
};
use crate::{config::SearchConfig, domain::SearchPage};

#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request failed: {0}")]
    Request(String),
}

/// One form-encoded POST. Implementations must honour `timeout`.
#[async_trait]
pub trait FormTransport: Send + Sync {
    async fn post_form(
        &self,
        url: &str,
        fields: &[(String, String)],
        timeout: Duration,
    ) -> Result<TransportResponse, TransportError>;
}

#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl FormTransport for HttpTransport {
    async fn post_form(
        &self,
        url: &str,
        fields: &[(String, String)],
        timeout: Duration,
    ) -> Result<TransportResponse, TransportError> {
        let response = self
            .client
            .post(url)
            .header(
                CONTENT_TYPE,
                "application/x-www-form-urlencoded; charset=UTF-8",
            )
            .form(fields)
            .timeout(timeout)
            .send()
            .await
            .map_err(|err| TransportError::Request(err.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|err| TransportError::Request(err.to_string()))?;
        Ok(TransportResponse { status, body })
    }
}

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("search rejected for every signing candidate: {}", AttemptList(.attempts))]
    SearchFailed { attempts: Vec<SigningAttempt> },
    #[error("search credentials are not configured (BAITEN_APP_KEY / BAITEN_APP_SECRET)")]
    MissingCredentials,
}

struct AttemptList<'a>(&'a [SigningAttempt]);

impl fmt::Display for AttemptList<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, attempt) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "[{}] {attempt}", i + 1)?;
        }
        Ok(())
    }
}

pub struct SearchClient<T> {
    resolver: SignatureResolver<T>,
    config: SearchConfig,
}

impl SearchClient<HttpTransport> {
    pub fn from_config(http: Client, config: SearchConfig) -> Self {
        Self::new(HttpTransport::new(http), config)
    }
}

impl<T: FormTransport> SearchClient<T> {
    pub fn new(transport: T, config: SearchConfig) -> Self {
        let resolver = SignatureResolver::new(transport, config.url.clone(), config.timeout);
        Self { resolver, config }
    }

    pub fn request(&self, query: &str, page_index: i64, page_size: i64) -> SearchRequest {
        SearchRequest {
            app_key: self.config.app_key.clone(),
            query: query.to_string(),
            sort_field: self.config.sort_field.clone(),
            level: self.config.level.clone(),
            sort: self.config.sort.clone(),
            source: self.config.source,
            page_index,
            page_size,
            extra: Vec::new(),
        }
    }

    pub async fn resolve(&self, request: &SearchRequest) -> Resolution {
        self.resolver.resolve(request, &self.config.app_secret).await
    }

    pub async fn search(
        &self,
        query: &str,
        page_index: i64,
        page_size: i64,
    ) -> Result<SearchPage, SearchError> {
        if self.config.app_key.is_empty() || self.config.app_secret.is_empty() {
            return Err(SearchError::MissingCredentials);
        }
        let request = self.request(query, page_index, page_size);
        let resolution = self.resolve(&request).await;
        match resolution.response() {
            Some(body) => {
                let page = normalize_payload(body);
                tracing::info!(
                    target: "search",
                    query,
                    records = page.records.len(),
                    total = page.total_count,
                    "search completed"
                );
                Ok(page)
            }
            None => Err(SearchError::SearchFailed {
                attempts: resolution.attempts,
            }),
        }
    }
}
