//! Cloudflare DNS API client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use super::provider::{DnsError, DnsProvider, DomainRecord, NewRecord, Result};
use crate::config::DnsConfig;
use crate::resilience::timeouts::with_deadline;

const PER_PAGE: u32 = 100;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Deserialize)]
struct ApiMessage {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct ResultInfo {
    #[serde(default)]
    page: u32,
    #[serde(default)]
    total_pages: u32,
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    success: bool,
    #[serde(default)]
    errors: Vec<ApiMessage>,
    result: Option<T>,
    result_info: Option<ResultInfo>,
}

/// Zone-scoped Cloudflare client.
#[derive(Debug, Clone)]
pub struct CloudflareProvider {
    client: Client,
    api_url: String,
    zone_id: String,
    token: String,
}

impl CloudflareProvider {
    pub fn new(config: &DnsConfig) -> Self {
        Self {
            client: Client::new(),
            api_url: config.api_url.trim_end_matches('/').to_string(),
            zone_id: config.zone_id.clone(),
            token: config.api_token.clone(),
        }
    }

    fn records_url(&self) -> String {
        format!("{}/zones/{}/dns_records", self.api_url, self.zone_id)
    }

    async fn call<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<ApiResponse<T>> {
        let request = request
            .bearer_auth(&self.token)
            .timeout(REQUEST_TIMEOUT)
            .send();
        let response = with_deadline(REQUEST_TIMEOUT, request).await??;
        let status = response.status();
        let body = with_deadline(REQUEST_TIMEOUT, response.text()).await??;
        if !status.is_success() {
            return Err(DnsError::Status { status: status.as_u16(), body });
        }

        let parsed: ApiResponse<T> = serde_json::from_str(&body)?;
        if !parsed.success {
            let reason = parsed
                .errors
                .iter()
                .map(|e| format!("{}: {}", e.code, e.message))
                .collect::<Vec<_>>()
                .join("; ");
            return Err(DnsError::Api(reason));
        }
        Ok(parsed)
    }
}

#[async_trait]
impl DnsProvider for CloudflareProvider {
    fn name(&self) -> &'static str {
        "cloudflare"
    }

    async fn list_records(&self, name: &str) -> Result<Vec<DomainRecord>> {
        let mut records = Vec::new();
        let mut page = 1u32;
        loop {
            let request = self.client.get(self.records_url()).query(&[
                ("name", name.to_string()),
                ("page", page.to_string()),
                ("per_page", PER_PAGE.to_string()),
            ]);
            let response: ApiResponse<Vec<DomainRecord>> = self.call(request).await?;
            records.extend(response.result.unwrap_or_default());

            let total_pages = response.result_info.map(|i| i.total_pages.max(i.page)).unwrap_or(page);
            if page >= total_pages {
                break;
            }
            page += 1;
        }
        Ok(records)
    }

    async fn create_record(&self, record: &NewRecord) -> Result<DomainRecord> {
        let body = serde_json::json!({
            "type": record.record_type,
            "name": record.name,
            "content": record.content,
            "proxied": record.proxied,
            "ttl": 1,
        });
        let request = self.client.post(self.records_url()).json(&body);
        let response: ApiResponse<DomainRecord> = self.call(request).await?;
        response
            .result
            .ok_or_else(|| DnsError::Api("create returned no record".to_string()))
    }

    async fn delete_record(&self, record: &DomainRecord) -> Result<()> {
        let url = format!("{}/{}", self.records_url(), record.id);
        let _: ApiResponse<serde_json::Value> = self.call(self.client.delete(url)).await?;
        Ok(())
    }
}
