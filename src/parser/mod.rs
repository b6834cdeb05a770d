pub mod anchors;
pub mod normalize;
pub mod spans;

use scraper::Html;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::SegmentConfig;
use crate::error::{Result, SegmentError};
use anchors::{Anchor, AnchorLocator};
use normalize::{collapse_whitespace, Normalizer};
use spans::SpanResolver;

/// Whitespace between markup tokens, including entity-encoded NBSP.
const GAP: &str = r"(?:\s|&nbsp;|&#160;|&#x0*a0;)*";

/// One extracted post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub number: usize,
    pub date: String,
    pub title: String,
    pub content: String,
}

/// Something to segment: raw markup or an already parsed document.
#[derive(Clone, Copy)]
pub enum Source<'a> {
    Markup(&'a str),
    Tree(&'a Html),
}

/// Three-stage pipeline: headers → body spans → plain text.
///
/// Holds only compiled patterns, so one instance can be shared freely
/// between threads.
pub struct Segmenter {
    locator: AnchorLocator,
    resolver: SpanResolver,
    normalizer: Normalizer,
}

impl Segmenter {
    pub fn new(config: &SegmentConfig) -> Result<Self> {
        Ok(Segmenter {
            locator: AnchorLocator::new(config)?,
            resolver: SpanResolver::new(config)?,
            normalizer: Normalizer::new(config)?,
        })
    }

    pub fn segment(&self, document: &str) -> Vec<Record> {
        let located = self.locator.locate(document);
        let spans = self.resolver.resolve(document, &located);
        debug!(records = spans.len(), bytes = document.len(), "segmented document");

        located
            .anchors
            .iter()
            .zip(&spans)
            .map(|(anchor, span)| Record {
                number: anchor.sequence_index,
                date: anchor.date_text.clone(),
                title: anchor.title_text.clone(),
                content: self.normalizer.normalize(span.markup(document)),
            })
            .collect()
    }

    /// Like [`Segmenter::segment`], but fails when no input was supplied.
    pub fn segment_source(&self, source: Option<Source<'_>>) -> Result<Vec<Record>> {
        match source.ok_or(SegmentError::InputMissing)? {
            Source::Markup(markup) => Ok(self.segment(markup)),
            Source::Tree(tree) => Ok(self.segment(&tree.html())),
        }
    }

    pub fn anchors(&self, document: &str) -> Vec<Anchor> {
        self.locator.locate(document).anchors
    }

    /// Body normalization on its own, for content that arrives already split.
    pub fn normalize(&self, markup: &str) -> String {
        self.normalizer.normalize(markup)
    }

    /// Title/date cleanup for values scraped from elsewhere on a page.
    pub fn clean_field(value: &str) -> String {
        collapse_whitespace(value)
    }
}
