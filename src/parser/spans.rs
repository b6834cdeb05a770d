use std::ops::Range;

use regex::{Regex, RegexBuilder};
use tracing::debug;

use super::anchors::Located;
use super::GAP;
use crate::config::SegmentConfig;
use crate::error::{Result, SegmentError};

/// Body markup of one post, as a byte range into the source document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentSpan {
    pub range: Range<usize>,
}

impl ContentSpan {
    pub fn markup<'d>(&self, document: &'d str) -> &'d str {
        &document[self.range.clone()]
    }
}

pub struct SpanResolver {
    /// `<br><br>` closing a post that is followed by another header.
    separator_re: Regex,
    /// `<br><br>` optionally followed by a closing block tag at end of input.
    final_separator_re: Regex,
}

impl SpanResolver {
    pub fn new(config: &SegmentConfig) -> Result<Self> {
        let separator = [GAP, r"<br\s*/?>", GAP, r"<br\s*/?>", GAP].concat();
        let closing = config
            .closing_block_tags
            .iter()
            .map(|t| regex::escape(t.trim()))
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join("|");
        let final_pattern = if closing.is_empty() {
            format!("{}$", separator)
        } else {
            format!(r"{}(?:</(?:{})\s*>\s*)?$", separator, closing)
        };

        Ok(SpanResolver {
            separator_re: build(&format!("{}$", separator))?,
            final_separator_re: build(&final_pattern)?,
        })
    }

    /// One span per anchor: from the end of its header to the start of the
    /// next one (or `located.end`), minus the trailing post separator.
    pub fn resolve(&self, document: &str, located: &Located) -> Vec<ContentSpan> {
        let anchors = &located.anchors;
        let doc_end = located.end.min(document.len());

        anchors
            .iter()
            .enumerate()
            .map(|(i, anchor)| {
                let start = anchor.span_end;
                let end = anchors.get(i + 1).map_or(doc_end, |next| next.span_start);
                if end < start {
                    debug!(
                        anchor = anchor.sequence_index,
                        start, end, "inverted content span, treating as empty"
                    );
                    return ContentSpan { range: start..start };
                }
                let at_document_end = end == document.len();
                let trimmed = self.trim_trailing_noise(&document[start..end], at_document_end);
                ContentSpan {
                    range: start..start + trimmed.len(),
                }
            })
            .collect()
    }

    /// Drops one trailing `<br><br>` separator. At the end of the input the
    /// separator may be followed by one closing block tag, removed with it.
    pub fn trim_trailing_noise<'s>(&self, slice: &'s str, at_document_end: bool) -> &'s str {
        let re = if at_document_end {
            &self.final_separator_re
        } else {
            &self.separator_re
        };
        match re.find(slice) {
            Some(m) => &slice[..m.start()],
            None => slice,
        }
    }
}

fn build(pattern: &str) -> Result<Regex> {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .map_err(|source| SegmentError::InvalidPattern {
            what: "closing block tag",
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::anchors::{Anchor, AnchorLocator};
    use crate::parser::normalize::Normalizer;

    fn resolver() -> SpanResolver {
        SpanResolver::new(&SegmentConfig::default()).unwrap()
    }

    fn anchor(index: usize, start: usize, end: usize) -> Anchor {
        Anchor {
            sequence_index: index,
            date_text: "1-1-2024".to_string(),
            title_text: "T".to_string(),
            span_start: start,
            span_end: end,
        }
    }

    #[test]
    fn trims_separator_between_posts() {
        let r = resolver();
        assert_eq!(r.trim_trailing_noise("Body one.<br/><br/>", false), "Body one.");
        assert_eq!(r.trim_trailing_noise("Body one. \n<BR>\n <br /> \n", false), "Body one.");
    }

    #[test]
    fn entity_spaces_count_as_gaps() {
        assert_eq!(
            resolver().trim_trailing_noise("text&nbsp;<br>&nbsp;<br/>&#160;", false),
            "text"
        );
    }

    #[test]
    fn only_one_separator_is_removed() {
        assert_eq!(
            resolver().trim_trailing_noise("a<br><br><br><br>", false),
            "a<br><br>"
        );
    }

    #[test]
    fn single_break_is_kept() {
        assert_eq!(resolver().trim_trailing_noise("a<br/>", false), "a<br/>");
    }

    #[test]
    fn closing_div_only_at_document_end() {
        let r = resolver();
        assert_eq!(r.trim_trailing_noise("Body two.<br/><br/></div>", true), "Body two.");
        assert_eq!(r.trim_trailing_noise("Body two.<br/><br/>\n</DIV>\n", true), "Body two.");
        assert_eq!(r.trim_trailing_noise("Body two.<br/><br/>", true), "Body two.");
        assert_eq!(
            r.trim_trailing_noise("Body two.<br/><br/></div>", false),
            "Body two.<br/><br/></div>"
        );
    }

    #[test]
    fn interior_breaks_survive() {
        assert_eq!(
            resolver().trim_trailing_noise("para<br><br>para two", true),
            "para<br><br>para two"
        );
    }

    #[test]
    fn trimming_does_not_change_text() {
        let r = resolver();
        let n = Normalizer::new(&SegmentConfig::default()).unwrap();
        for (slice, last) in [
            ("Body <b>one</b>.<br/><br/>", false),
            ("x<br>y<br><br>\n", false),
            ("tail<br/><br/></div>", true),
            ("<br><br>", false),
        ] {
            assert_eq!(n.normalize(r.trim_trailing_noise(slice, last)), n.normalize(slice));
        }
    }

    #[test]
    fn inverted_span_becomes_empty() {
        let doc = "0123456789";
        let located = Located {
            anchors: vec![anchor(1, 0, 6), anchor(2, 4, 8)],
            end: doc.len(),
        };
        let spans = resolver().resolve(doc, &located);
        assert_eq!(spans[0].range, 6..6);
        assert_eq!(spans[1].range, 8..10);
    }

    #[test]
    fn spans_tile_the_document() {
        let doc = r##"<div><strong>1-2-2024<font color="#c23b3b">A</font></strong>one<br/><br/><strong>1-3-2024<font color="#c23b3b">B</font></strong>two<br/><br/></div>"##;
        let located = AnchorLocator::new(&SegmentConfig::default()).unwrap().locate(doc);
        let spans = resolver().resolve(doc, &located);
        assert_eq!(spans.len(), 2);
        assert_eq!(spans[0].markup(doc), "one");
        assert_eq!(spans[1].markup(doc), "two");

        let a = &located.anchors;
        assert_eq!(spans[0].range.start, a[0].span_end);
        assert!(spans[0].range.end <= a[1].span_start);
        assert_eq!(spans[1].range.start, a[1].span_end);
    }

    #[test]
    fn no_closing_tags_configured() {
        let config = SegmentConfig {
            closing_block_tags: Vec::new(),
            ..SegmentConfig::default()
        };
        let r = SpanResolver::new(&config).unwrap();
        assert_eq!(r.trim_trailing_noise("a<br><br></div>", true), "a<br><br></div>");
        assert_eq!(r.trim_trailing_noise("a<br><br>", true), "a");
    }
}
