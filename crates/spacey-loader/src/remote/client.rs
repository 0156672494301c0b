// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! HTTP transport used by the remote fetcher

use crate::config::HttpModuleConfig;
use crate::error::{ModuleError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use reqwest::Client;
use tracing::{debug, instrument};

/// A completed GET
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// Status code
    pub status: u16,
    /// `Content-Type` header, if any
    pub content_type: Option<String>,
    /// Response body
    pub body: Bytes,
}

impl HttpResponse {
    /// Whether the status is 2xx
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Performs one HTTP GET. Transport failures are reported as network errors;
/// non-2xx statuses are returned as responses.
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// GET `url`
    async fn get(&self, url: &str) -> Result<HttpResponse>;

    /// Apply new transport settings (timeout, user agent). Requests already
    /// sent are unaffected.
    fn configure(&self, _config: &HttpModuleConfig) -> Result<()> {
        Ok(())
    }
}

/// `reqwest`-backed client
pub struct ReqwestClient {
    client: RwLock<Client>,
}

impl ReqwestClient {
    /// Build a client with the configured timeout and user agent
    pub fn new(config: &HttpModuleConfig) -> Result<Self> {
        Ok(Self {
            client: RwLock::new(build_client(config)?),
        })
    }
}

fn build_client(config: &HttpModuleConfig) -> Result<Client> {
    Client::builder()
        .timeout(config.timeout())
        .connect_timeout(config.timeout())
        .user_agent(config.user_agent.clone())
        .build()
        .map_err(|e| ModuleError::network("<client>", e))
}

#[async_trait]
impl HttpClient for ReqwestClient {
    #[instrument(skip(self))]
    async fn get(&self, url: &str) -> Result<HttpResponse> {
        debug!("GET {}", url);

        let client = self.client.read().clone();
        let response = client
            .get(url)
            .header(
                "Accept",
                "application/javascript, text/javascript, application/json, */*;q=0.1",
            )
            .send()
            .await
            .map_err(|e| ModuleError::network(url, e))?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response
            .bytes()
            .await
            .map_err(|e| ModuleError::network(url, e))?;

        Ok(HttpResponse {
            status,
            content_type,
            body,
        })
    }

    fn configure(&self, config: &HttpModuleConfig) -> Result<()> {
        *self.client.write() = build_client(config)?;
        debug!("Rebuilt HTTP client (timeout {:?})", config.timeout());
        Ok(())
    }
}
