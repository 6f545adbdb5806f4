use std::time::Duration;

use anyhow::{Context, Result};

/// Build the shared outbound HTTP client. When `proxy_url` is non-empty all
/// traffic through this client is routed via the proxy (socks5:// or http://).
pub fn build_client(proxy_url: &str, timeout: Duration) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder().timeout(timeout);
    if !proxy_url.is_empty() {
        let proxy = reqwest::Proxy::all(proxy_url)
            .with_context(|| format!("invalid proxy url {proxy_url:?}"))?;
        builder = builder.proxy(proxy);
    }
    builder.build().context("failed to build HTTP client")
}
