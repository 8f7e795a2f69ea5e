//! HTTP transport to the Datadog series API.
//!
//! Each request is one POST of the JSON batch to `/api/v1/series`. The API
//! key rides along as a query parameter and is otherwise opaque to us.

use super::{Error, Request, Transport};
use crate::series::{Batch, Series};
use reqwest::blocking::Client;
use reqwest::header::CONTENT_TYPE;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Configuration for `HttpTransport`.
#[derive(Clone, Debug, PartialEq)]
pub struct HttpConfig {
    /// The API key sent with every request.
    pub api_key: String,
    /// Scheme, host and optional port of the API. The series path is added
    /// by the transport.
    pub endpoint: String,
    /// Upper bound on one POST, connect included.
    pub timeout: Duration,
}

impl Default for HttpConfig {
    fn default() -> HttpConfig {
        HttpConfig {
            api_key: String::new(),
            endpoint: "https://app.datadoghq.com".to_string(),
            timeout: Duration::from_secs(10),
        }
    }
}

/// Posts batches over HTTP(S).
pub struct HttpTransport {
    client: Client,
    url: String,
    api_key: String,
    closed: AtomicBool,
}

impl HttpTransport {
    /// Build the transport and its underlying client.
    pub fn new(config: HttpConfig) -> Result<HttpTransport, Error> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(HttpTransport {
            client,
            url: series_url(&config.endpoint),
            api_key: config.api_key,
            closed: AtomicBool::new(false),
        })
    }

    /// The URL batches are posted to, without the key.
    pub fn url(&self) -> &str {
        &self.url
    }
}

fn series_url(endpoint: &str) -> String {
    format!("{}/api/v1/series", endpoint.trim_end_matches('/'))
}

impl Transport for HttpTransport {
    fn prepare(&self) -> Result<Box<dyn Request>, Error> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::Closed);
        }
        Ok(Box::new(HttpRequest {
            client: self.client.clone(),
            url: self.url.clone(),
            api_key: self.api_key.clone(),
            batch: Batch::new(),
        }))
    }

    fn close(&self) -> Result<(), Error> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}

struct HttpRequest {
    client: Client,
    url: String,
    api_key: String,
    batch: Batch,
}

impl HttpRequest {
    fn body(&self) -> Result<Vec<u8>, Error> {
        Ok(serde_json::to_vec(&self.batch)?)
    }
}

impl Request for HttpRequest {
    fn add_counter(&mut self, counter: Series) -> Result<(), Error> {
        self.batch.push(counter);
        Ok(())
    }

    fn add_gauge(&mut self, gauge: Series) -> Result<(), Error> {
        self.batch.push(gauge);
        Ok(())
    }

    fn send(self: Box<Self>) -> Result<(), Error> {
        let body = self.body()?;
        trace!("posting {} series ({} bytes) to {}", self.batch.len(), body.len(), self.url);
        let response = self
            .client
            .post(&self.url)
            .query(&[("api_key", self.api_key.as_str())])
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(Error::Status(status.as_u16()))
        }
    }
}
