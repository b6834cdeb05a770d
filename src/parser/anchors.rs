use regex::{Regex, RegexBuilder};
use tracing::debug;

use super::normalize::{collapse_whitespace, visible_text};
use super::GAP;
use crate::config::{EmptyTitlePolicy, SegmentConfig};
use crate::error::{Result, SegmentError};

/// A post header: `<strong>[<br>]{0,2} D-M-YYYY <font color=…>Title</font></strong>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Anchor {
    /// 1-based, counting accepted headers only.
    pub sequence_index: usize,
    pub date_text: String,
    pub title_text: String,
    /// Byte offset of `<strong`.
    pub span_start: usize,
    /// Byte offset just past the header markup.
    pub span_end: usize,
}

/// Anchors plus the offset where body text stops for the last of them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Located {
    pub anchors: Vec<Anchor>,
    pub end: usize,
}

/// Raw header match before the title is checked.
#[derive(Debug, Clone)]
pub struct Candidate<'d> {
    pub date: &'d str,
    pub title_markup: &'d str,
    pub start: usize,
    pub end: usize,
}

/// Scanner position between candidates.
#[derive(Debug, Clone)]
enum ScanState<'d> {
    /// No header accepted yet; markup seen so far is preamble.
    SeekingHeader,
    /// A header matched; its title decides whether it opens a record.
    InHeader(Candidate<'d>),
    /// Inside the body of the last accepted header.
    InBody,
    Stopped,
}

pub struct AnchorLocator {
    header_re: Regex,
    policy: EmptyTitlePolicy,
}

impl AnchorLocator {
    pub fn new(config: &SegmentConfig) -> Result<Self> {
        Ok(AnchorLocator {
            header_re: header_regex(&config.title_color)?,
            policy: config.empty_title_policy,
        })
    }

    /// Every header-shaped match, leftmost-first and non-overlapping.
    pub fn candidates<'a, 'd>(&'a self, document: &'d str) -> impl Iterator<Item = Candidate<'d>> + 'a
    where
        'd: 'a,
    {
        self.header_re.captures_iter(document).filter_map(|caps| {
            let whole = caps.get(0)?;
            Some(Candidate {
                date: caps.get(1)?.as_str().trim(),
                title_markup: caps.get(2).map(|m| m.as_str()).unwrap_or(""),
                start: whole.start(),
                end: whole.end(),
            })
        })
    }

    pub fn locate(&self, document: &str) -> Located {
        let mut anchors: Vec<Anchor> = Vec::new();
        let mut end = document.len();
        let mut candidates = self.candidates(document);
        let mut state = ScanState::SeekingHeader;

        loop {
            state = match state {
                ScanState::SeekingHeader => match candidates.next() {
                    Some(cand) => {
                        if cand.start > 0 {
                            debug!(bytes = cand.start, "markup before header is not a post");
                        }
                        ScanState::InHeader(cand)
                    }
                    None => break,
                },
                ScanState::InBody => match candidates.next() {
                    Some(cand) => ScanState::InHeader(cand),
                    None => break,
                },
                ScanState::InHeader(cand) => {
                    let title = title_text(cand.title_markup);
                    if !title.is_empty() {
                        anchors.push(Anchor {
                            sequence_index: anchors.len() + 1,
                            date_text: cand.date.to_string(),
                            title_text: title,
                            span_start: cand.start,
                            span_end: cand.end,
                        });
                        ScanState::InBody
                    } else {
                        match self.policy {
                            EmptyTitlePolicy::Skip if anchors.is_empty() => {
                                debug!(offset = cand.start, date = cand.date, "skipping header with blank title");
                                ScanState::SeekingHeader
                            }
                            EmptyTitlePolicy::Skip => {
                                debug!(offset = cand.start, date = cand.date, "skipping header with blank title");
                                ScanState::InBody
                            }
                            EmptyTitlePolicy::StopAtAnchor => {
                                debug!(offset = cand.start, "blank title ends the document");
                                end = cand.start;
                                ScanState::Stopped
                            }
                        }
                    }
                }
                ScanState::Stopped => break,
            };
        }

        debug!(anchors = anchors.len(), end, "located headers");
        Located { anchors, end }
    }
}

/// Builds the header pattern for a given title color.
///
/// Tag and attribute names match case-insensitively, the color may be quoted
/// either way or bare, and `.` spans newlines so multi-line titles are kept.
/// The title is captured lazily up to the first `</font>`.
fn header_regex(color: &str) -> Result<Regex> {
    let pattern = [
        r"<strong\b[^>]*>",
        GAP,
        r"(?:<br\s*/?>",
        GAP,
        r"){0,2}(\d{1,2}-\d{1,2}-\d{4})",
        GAP,
        r#"<font\b[^>]*?\scolor\s*=\s*["']?"#,
        &regex::escape(color.trim()),
        r#"["']?(?:\s[^>]*)?>(.*?)</font\s*>(?:\s*</strong\s*>)?"#,
    ]
    .concat();
    RegexBuilder::new(&pattern)
        .case_insensitive(true)
        .dot_matches_new_line(true)
        .build()
        .map_err(|source| SegmentError::InvalidPattern {
            what: "title color",
            source,
        })
}

fn title_text(markup: &str) -> String {
    collapse_whitespace(&visible_text(markup))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn locator() -> AnchorLocator {
        AnchorLocator::new(&SegmentConfig::default()).unwrap()
    }

    fn header(date: &str, title: &str) -> String {
        format!(r##"<strong>{}<font color="#c23b3b">{}</font></strong>"##, date, title)
    }

    #[test]
    fn finds_headers_in_order() {
        let doc = format!("{}one<br/><br/>{}two", header("1-2-2024", "A"), header("12-31-2023", "B"));
        let located = locator().locate(&doc);
        assert_eq!(located.anchors.len(), 2);
        assert_eq!(located.anchors[0].date_text, "1-2-2024");
        assert_eq!(located.anchors[0].title_text, "A");
        assert_eq!(located.anchors[1].date_text, "12-31-2023");
        assert_eq!(located.anchors[1].sequence_index, 2);
        assert!(located.anchors[0].span_end <= located.anchors[1].span_start);
        assert_eq!(located.end, doc.len());
    }

    #[test]
    fn span_covers_closing_strong() {
        let doc = header("1-2-2024", "A");
        let located = locator().locate(&doc);
        assert_eq!(located.anchors[0].span_start, 0);
        assert_eq!(located.anchors[0].span_end, doc.len());
    }

    #[test]
    fn tolerates_line_breaks_case_and_whitespace() {
        let doc = "<STRONG>\n<br>\n<BR />  3-4-2025 \n <FONT size=\"2\" COLOR='#C23B3B'>\n  Multi\n  line title\n</FONT>\n</STRONG>body";
        let located = locator().locate(doc);
        assert_eq!(located.anchors.len(), 1);
        assert_eq!(located.anchors[0].date_text, "3-4-2025");
        assert_eq!(located.anchors[0].title_text, "Multi line title");
    }

    #[test]
    fn entity_spaces_between_tokens() {
        let doc = r##"<strong><br>&nbsp;12-3-2025&nbsp;&#160;<font color="#c23b3b">Frank26</font></strong>"##;
        let located = locator().locate(doc);
        assert_eq!(located.anchors.len(), 1);
        assert_eq!(located.anchors[0].date_text, "12-3-2025");
    }

    #[test]
    fn three_line_breaks_do_not_match() {
        let doc = r##"<strong><br><br><br>1-2-2024<font color="#c23b3b">A</font></strong>"##;
        assert!(locator().locate(doc).anchors.is_empty());
    }

    #[test]
    fn title_stops_at_first_closing_font() {
        let doc = format!(
            r##"{}<font color="#000">not a title</font> text"##,
            header("1-2-2024", "Short")
        );
        let located = locator().locate(&doc);
        assert_eq!(located.anchors[0].title_text, "Short");
    }

    #[test]
    fn nested_tags_in_title_are_stripped() {
        let doc = header("1-2-2024", "<b>Bold</b> &amp; plain");
        assert_eq!(locator().locate(&doc).anchors[0].title_text, "Bold & plain");
    }

    #[test]
    fn other_colors_are_not_headers() {
        let doc = r##"<strong>1-2-2024<font color="#000000">Black</font></strong>"##;
        assert!(locator().locate(doc).anchors.is_empty());
    }

    #[test]
    fn color_must_match_exactly() {
        let doc = r##"<strong>1-2-2024<font color="#c23b3bff">Near miss</font></strong>"##;
        assert!(locator().locate(doc).anchors.is_empty());
    }

    #[test]
    fn malformed_date_is_not_a_header() {
        let doc = header("2024-01-02", "A");
        assert!(locator().locate(&doc).anchors.is_empty());
    }

    #[test]
    fn blank_title_is_skipped_by_default() {
        let doc = format!(
            "{}x{}y{}z",
            header("1-1-2024", "A"),
            header("1-2-2024", "  \n "),
            header("1-3-2024", "C")
        );
        let located = locator().locate(&doc);
        let titles: Vec<_> = located.anchors.iter().map(|a| a.title_text.as_str()).collect();
        assert_eq!(titles, ["A", "C"]);
        assert_eq!(located.anchors[1].sequence_index, 2);
    }

    #[test]
    fn empty_title_does_not_swallow_next_header() {
        let doc = format!("{}x{}y", header("1-1-2024", ""), header("1-2-2024", "B"));
        let located = locator().locate(&doc);
        assert_eq!(located.anchors.len(), 1);
        assert_eq!(located.anchors[0].title_text, "B");
    }

    #[test]
    fn blank_title_can_stop_the_scan() {
        let config = SegmentConfig {
            empty_title_policy: EmptyTitlePolicy::StopAtAnchor,
            ..SegmentConfig::default()
        };
        let blank = header("1-2-2024", " ");
        let doc = format!("{}x{}y{}z", header("1-1-2024", "A"), blank, header("1-3-2024", "C"));
        let located = AnchorLocator::new(&config).unwrap().locate(&doc);
        assert_eq!(located.anchors.len(), 1);
        assert_eq!(located.end, doc.find(&blank).unwrap());
    }

    #[test]
    fn leading_blank_title_keeps_seeking() {
        let doc = format!("pre{}x{}y", header("1-1-2024", ""), header("1-2-2024", "B"));
        let located = locator().locate(&doc);
        assert_eq!(located.anchors.len(), 1);
        assert_eq!(located.anchors[0].sequence_index, 1);
        assert_eq!(located.anchors[0].span_start, doc.find("<strong>1-2-2024").unwrap());
        assert_eq!(located.end, doc.len());
    }

    #[test]
    fn leading_blank_title_stops_before_any_post() {
        let config = SegmentConfig {
            empty_title_policy: EmptyTitlePolicy::StopAtAnchor,
            ..SegmentConfig::default()
        };
        let doc = format!("pre{}x{}y", header("1-1-2024", ""), header("1-2-2024", "B"));
        let located = AnchorLocator::new(&config).unwrap().locate(&doc);
        assert!(located.anchors.is_empty());
        assert_eq!(located.end, 3);
    }

    #[test]
    fn custom_color() {
        let config = SegmentConfig {
            title_color: "navy".to_string(),
            ..SegmentConfig::default()
        };
        let doc = r#"<strong>1-2-2024<font color=navy>Blue</font></strong>"#;
        let located = AnchorLocator::new(&config).unwrap().locate(doc);
        assert_eq!(located.anchors[0].title_text, "Blue");
    }

    #[test]
    fn no_headers() {
        let located = locator().locate("<p>nothing to see</p>");
        assert!(located.anchors.is_empty());
        assert_eq!(located.end, "<p>nothing to see</p>".len());
    }
}
