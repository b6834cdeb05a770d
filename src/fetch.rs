use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use reqwest::{Client, StatusCode};
use scraper::{Html, Selector};
use tracing::{info, warn};

use crate::config::Settings;
use crate::parser::normalize::INVISIBLE_SPACES;

const BASE_BACKOFF_MS: u64 = 2000;
const TIMEOUT_SECS: u64 = 30;

pub fn client(settings: &Settings) -> Result<Client> {
    Client::builder()
        .user_agent(&settings.user_agent)
        .timeout(Duration::from_secs(TIMEOUT_SECS))
        .build()
        .context("Failed to build HTTP client")
}

/// GET a page, retrying rate limits and server errors with exponential backoff.
pub async fn fetch_document(client: &Client, url: &str, max_retries: u32) -> Result<String> {
    let mut attempt = 0;
    loop {
        let start = Instant::now();
        let result = client.get(url).send().await;

        let retry_reason = match result {
            Ok(resp) if resp.status().is_success() => {
                let body = resp
                    .text()
                    .await
                    .with_context(|| format!("Failed to read body of {}", url))?;
                info!(
                    url,
                    bytes = body.len(),
                    latency_ms = start.elapsed().as_millis() as u64,
                    "fetched page"
                );
                return Ok(body);
            }
            Ok(resp) if should_retry(resp.status()) => format!("HTTP {}", resp.status()),
            Ok(resp) => return Err(anyhow!("GET {} returned HTTP {}", url, resp.status())),
            Err(e) if e.is_timeout() || e.is_connect() => e.to_string(),
            Err(e) => return Err(e).with_context(|| format!("GET {} failed", url)),
        };

        if attempt == max_retries {
            return Err(anyhow!(
                "GET {} failed after {} attempts: {}",
                url,
                attempt + 1,
                retry_reason
            ));
        }

        let backoff = Duration::from_millis(BASE_BACKOFF_MS * 2u64.pow(attempt));
        warn!(
            "{} on {} (attempt {}/{}), backing off {:.1}s",
            retry_reason,
            url,
            attempt + 1,
            max_retries,
            backoff.as_secs_f64()
        );
        tokio::time::sleep(backoff).await;
        attempt += 1;
    }
}

fn should_retry(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

pub fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| anyhow!("Invalid CSS selector {:?}: {:?}", css, e))
}

/// Outer HTML of the first element matching `css`, with NBSP and zero-width
/// characters turned into plain spaces.
pub fn isolate(html: &str, css: &str) -> Result<String> {
    let sel = selector(css)?;
    let doc = Html::parse_document(&html.replace(INVISIBLE_SPACES, " "));
    let element = doc
        .select(&sel)
        .next()
        .ok_or_else(|| anyhow!("No element matches {:?}", css))?;
    Ok(element.html())
}

/// DinarGuru front page, cut down to the posts column.
pub async fn fetch_guru(client: &Client, settings: &Settings) -> Result<String> {
    let page = fetch_document(client, &settings.guru.url, settings.max_retries).await?;
    isolate(&page, &settings.guru.selector)
        .with_context(|| format!("Posts column not found on {}", settings.guru.url))
}
