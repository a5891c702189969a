//! Generic website check.

use async_trait::async_trait;

use super::ProbeStrategy;
use crate::discovery::NodeEndpoint;
use crate::health::probe::{looks_like_html, ProbeContext, ProbeError};

/// Healthy when the instance root serves an HTML document.
#[derive(Debug, Default, Clone, Copy)]
pub struct WebsiteProbe;

#[async_trait]
impl ProbeStrategy for WebsiteProbe {
    fn name(&self) -> &'static str {
        "website"
    }

    async fn probe(&self, ctx: &ProbeContext, endpoint: &NodeEndpoint) -> Result<bool, ProbeError> {
        let url = format!("{}/", endpoint.url("http"));
        let body = ctx.client.get_text(&url, ctx.default_timeout()).await?;
        Ok(looks_like_html(&body))
    }
}
