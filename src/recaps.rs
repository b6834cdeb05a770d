use std::sync::Arc;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::{Client, Url};
use scraper::{Html, Selector};
use tokio::sync::Semaphore;
use tracing::{info, warn};

use crate::config::{RecapsSettings, Settings};
use crate::fetch::{fetch_document, selector};
use crate::parser::{Record, Segmenter};

/// One post as listed on the blog index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecapEntry {
    pub number: usize,
    pub date: String,
    pub title: String,
    pub link: String,
}

/// Reads the blog index. Items without a title link are skipped; relative
/// links are resolved against `base`.
pub fn parse_index(html: &str, cfg: &RecapsSettings, base: &Url) -> Result<Vec<RecapEntry>> {
    let item_sel = selector(&cfg.item_selector)?;
    let title_sel = selector(&cfg.title_selector)?;
    let link_sel = selector(&cfg.link_selector)?;
    let date_sel = selector(&cfg.date_selector)?;

    let doc = Html::parse_document(html);
    let mut entries = Vec::new();

    for item in doc.select(&item_sel) {
        let Some(href) = item
            .select(&link_sel)
            .next()
            .and_then(|a| a.value().attr("href"))
        else {
            continue;
        };
        let link = match base.join(href.trim()) {
            Ok(url) => url.to_string(),
            Err(e) => {
                warn!("Skipping post with bad link {:?}: {}", href, e);
                continue;
            }
        };
        let text_of = |sel: &Selector| -> String {
            item.select(sel)
                .next()
                .map(|el| Segmenter::clean_field(&el.text().collect::<String>()))
                .unwrap_or_default()
        };

        entries.push(RecapEntry {
            number: entries.len() + 1,
            date: text_of(&date_sel),
            title: text_of(&title_sel),
            link,
        });
    }

    Ok(entries)
}

/// Inner HTML of every content block except the trailing one (a share/footer
/// block), or of the only block when there is just one. Newlines are dropped.
pub fn merge_content_blocks(html: &str, content_selector: &str) -> Result<String> {
    let sel = selector(content_selector)?;
    let doc = Html::parse_document(html);
    let blocks: Vec<_> = doc.select(&sel).collect();

    let keep = match blocks.len() {
        0 | 1 => &blocks[..],
        n => &blocks[..n - 1],
    };
    Ok(keep
        .iter()
        .map(|b| b.inner_html())
        .collect::<String>()
        .replace('\n', ""))
}

/// Entries matching `date` exactly, or all of them, renumbered from 1.
pub fn filter_by_date(entries: Vec<RecapEntry>, date: Option<&str>) -> Vec<RecapEntry> {
    entries
        .into_iter()
        .filter(|e| date.map_or(true, |d| e.date == d.trim()))
        .enumerate()
        .map(|(i, e)| RecapEntry { number: i + 1, ..e })
        .collect()
}

/// Fetches the index, then each selected post concurrently.
///
/// Record numbers count the returned posts from 1, not positions on the blog
/// index: they restart after the date filter and again after failed fetches.
pub async fn fetch_records(
    client: &Client,
    settings: &Settings,
    segmenter: &Segmenter,
    date: Option<&str>,
) -> Result<Vec<Record>> {
    let cfg = &settings.recaps;
    let base = Url::parse(&cfg.blog_url).with_context(|| format!("Bad blog url {}", cfg.blog_url))?;

    let index = fetch_document(client, &cfg.blog_url, settings.max_retries).await?;
    let entries = parse_index(&index, cfg, &base)?;
    info!("Found {} posts on {}", entries.len(), cfg.blog_url);
    let entries = filter_by_date(entries, date);
    if entries.is_empty() {
        return Ok(Vec::new());
    }

    let semaphore = Arc::new(Semaphore::new(settings.concurrency.max(1)));
    let pb = ProgressBar::new(entries.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec}, eta {eta})")?
            .progress_chars("=> "),
    );

    let (tx, mut rx) = tokio::sync::mpsc::channel::<(RecapEntry, Result<String>)>(entries.len());

    for entry in entries {
        let client = client.clone();
        let sem = Arc::clone(&semaphore);
        let tx = tx.clone();
        let content_selector = cfg.content_selector.clone();
        let max_retries = settings.max_retries;

        tokio::spawn(async move {
            let result = match sem.acquire().await {
                Ok(_permit) => fetch_document(&client, &entry.link, max_retries)
                    .await
                    .and_then(|page| merge_content_blocks(&page, &content_selector)),
                Err(e) => Err(e.into()),
            };
            let _ = tx.send((entry, result)).await;
        });
    }
    drop(tx);

    let mut records = Vec::new();
    let mut errors = 0usize;
    while let Some((entry, result)) = rx.recv().await {
        match result {
            Ok(markup) => records.push(Record {
                number: entry.number,
                date: entry.date,
                title: entry.title,
                content: segmenter.normalize(&markup),
            }),
            Err(e) => {
                errors += 1;
                warn!("Failed to fetch {}: {:#}", entry.link, e);
            }
        }
        pb.inc(1);
    }
    pb.finish_and_clear();

    records.sort_by_key(|r| r.number);
    for (i, r) in records.iter_mut().enumerate() {
        r.number = i + 1;
    }
    info!("Fetched {} posts ({} errors)", records.len(), errors);
    Ok(records)
}
