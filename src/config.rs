use anyhow::{Context, Result};
use config::Config;
use serde::Deserialize;

const CONFIG_FILE: &str = "dinar_posts";
const ENV_PREFIX: &str = "DINAR";

/// What to do with a header candidate whose title span is blank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmptyTitlePolicy {
    /// Drop the candidate and keep scanning; its markup stays in the
    /// preceding record's body.
    #[default]
    Skip,
    /// Treat the candidate as the end of the document.
    StopAtAnchor,
}

/// Knobs that identify the header convention of a source site.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SegmentConfig {
    /// Value of the `color` attribute on the `<font>` holding the title.
    pub title_color: String,
    /// Leading word of the bracketed editorial note stripped from bodies,
    /// e.g. `Post` for `[Post edited 3 times]`.
    pub boilerplate_tag: String,
    /// Closing block elements allowed after the final `<br><br>` separator.
    pub closing_block_tags: Vec<String>,
    pub empty_title_policy: EmptyTitlePolicy,
}

impl Default for SegmentConfig {
    fn default() -> Self {
        SegmentConfig {
            title_color: "#c23b3b".to_string(),
            boilerplate_tag: "Post".to_string(),
            closing_block_tags: ["div", "p", "td", "section", "article"]
                .iter()
                .map(|t| t.to_string())
                .collect(),
            empty_title_policy: EmptyTitlePolicy::Skip,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GuruSettings {
    pub url: String,
    /// Selects the element wrapping the daily post column.
    pub selector: String,
}

impl Default for GuruSettings {
    fn default() -> Self {
        GuruSettings {
            url: "https://www.dinarguru.com/".to_string(),
            selector: "#wsite-content > div:nth-child(5) > div > div > table > tbody > tr > td:nth-child(2) > div:nth-child(4)".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RecapsSettings {
    pub blog_url: String,
    pub item_selector: String,
    pub title_selector: String,
    pub link_selector: String,
    pub date_selector: String,
    pub content_selector: String,
}

impl Default for RecapsSettings {
    fn default() -> Self {
        RecapsSettings {
            blog_url: "https://dinarrecaps.com/our-blog".to_string(),
            item_selector: "article.blog-single-column--container.entry.blog-item".to_string(),
            title_selector: ".blog-title".to_string(),
            link_selector: ".blog-title a".to_string(),
            date_selector: ".blog-date".to_string(),
            content_selector: ".sqs-block.html-block.sqs-block-html".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub db_path: String,
    pub export_dir: String,
    pub user_agent: String,
    pub concurrency: usize,
    pub max_retries: u32,
    pub guru: GuruSettings,
    pub recaps: RecapsSettings,
    pub segment: SegmentConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            db_path: "data/posts.sqlite".to_string(),
            export_dir: "data/exports".to_string(),
            user_agent: concat!("dinar_posts/", env!("CARGO_PKG_VERSION")).to_string(),
            concurrency: 4,
            max_retries: 3,
            guru: GuruSettings::default(),
            recaps: RecapsSettings::default(),
            segment: SegmentConfig::default(),
        }
    }
}

impl Settings {
    /// Defaults, then `dinar_posts.{toml,yaml,json}` if present, then
    /// `DINAR_*` environment variables (`__` separates nested keys).
    pub fn load() -> Result<Settings> {
        Config::builder()
            .add_source(config::File::with_name(CONFIG_FILE).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to read configuration")?
            .try_deserialize()
            .context("Invalid configuration")
    }
}
