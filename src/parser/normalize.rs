use regex::Regex;
use scraper::{ElementRef, Html, Node};

use crate::config::SegmentConfig;
use crate::error::{Result, SegmentError};

/// Code points the source pages sprinkle between words; all read as a space.
pub const INVISIBLE_SPACES: &[char] = &['\u{00A0}', '\u{200B}', '\u{200C}', '\u{200D}', '\u{FEFF}'];

/// Elements whose boundaries separate words in rendered text.
const BREAKING_TAGS: &[&str] = &[
    "address", "article", "aside", "blockquote", "br", "dd", "div", "dl", "dt", "figcaption",
    "figure", "footer", "h1", "h2", "h3", "h4", "h5", "h6", "header", "hr", "li", "main", "nav",
    "ol", "p", "pre", "section", "table", "tbody", "td", "tfoot", "th", "thead", "tr", "ul",
];

const SKIPPED_TAGS: &[&str] = &["script", "style", "noscript", "template"];

/// Turns a body fragment into display text.
#[derive(Debug, Clone)]
pub struct Normalizer {
    boilerplate_re: Regex,
}

impl Normalizer {
    pub fn new(config: &SegmentConfig) -> Result<Self> {
        let pattern = format!(r" \[{} [^\]]*\]", regex::escape(config.boilerplate_tag.trim()));
        let boilerplate_re = Regex::new(&pattern).map_err(|source| SegmentError::InvalidPattern {
            what: "boilerplate",
            source,
        })?;
        Ok(Normalizer { boilerplate_re })
    }

    /// Visible text, single-spaced, trimmed, with editorial notes removed.
    pub fn normalize(&self, markup: &str) -> String {
        let text = collapse_whitespace(&visible_text(markup));
        collapse_whitespace(&self.strip_notes(text))
    }

    /// Removing one note can join its neighbours into another, so repeat
    /// until nothing matches.
    fn strip_notes(&self, mut text: String) -> String {
        while self.boilerplate_re.is_match(&text) {
            text = self.boilerplate_re.replace_all(&text, "").into_owned();
        }
        text
    }
}

/// Text nodes in document order. Block boundaries and `<br>` become a space.
pub fn visible_text(markup: &str) -> String {
    if !markup.contains('<') && !markup.contains('&') {
        return markup.to_string();
    }
    let fragment = Html::parse_fragment(markup);
    let mut out = String::with_capacity(markup.len());
    push_text(fragment.root_element(), &mut out);
    out
}

fn push_text(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => out.push_str(text),
            Node::Element(el) => {
                let name = el.name();
                if SKIPPED_TAGS.contains(&name) {
                    continue;
                }
                let breaking = BREAKING_TAGS.contains(&name);
                if breaking {
                    out.push(' ');
                }
                if let Some(inner) = ElementRef::wrap(child) {
                    push_text(inner, out);
                }
                if breaking {
                    out.push(' ');
                }
            }
            _ => {}
        }
    }
}

/// Every run of whitespace (NBSP and zero-width marks included) becomes one
/// ASCII space; ends are trimmed.
pub fn collapse_whitespace(text: &str) -> String {
    text.replace(INVISIBLE_SPACES, " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn normalizer() -> Normalizer {
        Normalizer::new(&SegmentConfig::default()).unwrap()
    }

    #[test]
    fn strips_boilerplate_note() {
        assert_eq!(normalizer().normalize("Hello [Post edited 3 times] world"), "Hello world");
    }

    #[test]
    fn strips_every_note() {
        let n = normalizer();
        assert_eq!(
            n.normalize("a [Post edited] b <i>[Post moved by admin]</i> c"),
            "a b c"
        );
        assert_eq!(n.normalize("end of body [Post edited 1 time]"), "end of body");
    }

    #[test]
    fn keeps_other_brackets() {
        assert_eq!(normalizer().normalize("see [Poster] and [note]"), "see [Poster] and [note]");
    }

    #[test]
    fn collapses_unicode_whitespace() {
        assert_eq!(normalizer().normalize("a\u{00A0}\u{00A0}b\n\nc"), "a b c");
        assert_eq!(collapse_whitespace("x\u{200B}y\u{FEFF}\tz "), "x y z");
    }

    #[test]
    fn block_boundaries_separate_words() {
        let n = normalizer();
        assert_eq!(n.normalize("<p>one</p><p>two</p>"), "one two");
        assert_eq!(n.normalize("line<br>next<br/>last"), "line next last");
        assert_eq!(n.normalize("<div>a<div>b</div>c</div>"), "a b c");
    }

    #[test]
    fn inline_tags_do_not_add_space() {
        assert_eq!(normalizer().normalize("un<b>bold</b>ed <a href='#'>link</a>."), "unbolded link.");
    }

    #[test]
    fn drops_scripts_and_decodes_entities() {
        assert_eq!(
            normalizer().normalize("<script>var x = 1;</script>Q&amp;A&nbsp;time"),
            "Q&A time"
        );
    }

    #[test]
    fn stray_closing_tags_are_ignored() {
        assert_eq!(normalizer().normalize("</strong> body text </font></div>"), "body text");
    }

    #[test]
    fn empty_and_blank_input() {
        let n = normalizer();
        assert_eq!(n.normalize(""), "");
        assert_eq!(n.normalize("  <br/> <br>\n"), "");
    }

    #[test]
    fn idempotent() {
        let n = normalizer();
        let inputs = [
            "<p>Hello&nbsp;&nbsp;there</p>\n<p>General  Kenobi [Post edited 2 times]</p>",
            "Plain text with   gaps",
            "<ul><li>one</li><li>two [Post by mod] three</li></ul>",
            "x [Pos [Post a]t b]",
            "",
        ];
        for input in inputs {
            let once = n.normalize(input);
            assert_eq!(n.normalize(&once), once, "input: {:?}", input);
        }
    }

    #[test]
    fn notes_joined_by_removal_are_stripped_too() {
        let n = normalizer();
        assert_eq!(n.normalize("x [Pos [Post a]t b]"), "x");
        assert_eq!(n.normalize("keep [Po [Post 1]st [Post 2] edited] this"), "keep this");
    }

    #[test]
    fn configurable_boilerplate_tag() {
        let config = SegmentConfig {
            boilerplate_tag: "Edit".to_string(),
            ..SegmentConfig::default()
        };
        let n = Normalizer::new(&config).unwrap();
        assert_eq!(n.normalize("a [Edit 2] b [Post x]"), "a b [Post x]");
    }
}
