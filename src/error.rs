use thiserror::Error;

/// Errors surfaced by the segmentation engine itself.
///
/// Documents without any post header are not an error: they segment to an
/// empty list.
#[derive(Debug, Error)]
pub enum SegmentError {
    /// Neither markup nor a parsed tree was handed to the segmenter.
    #[error("no input supplied: expected a markup string or a parsed document")]
    InputMissing,

    /// A configured pattern (title color, boilerplate) did not compile.
    #[error("invalid {what} pattern: {source}")]
    InvalidPattern {
        what: &'static str,
        #[source]
        source: regex::Error,
    },
}

pub type Result<T> = std::result::Result<T, SegmentError>;
