//! Query parsing.
//!
//! A query is a "V|T" pipeline: the part before the first unescaped `|`
//! seeds the vector search, the part after it is a shell-style text
//! filter. Either side may be empty, but not both.
//!
//! - `pipeline`: splits the two halves, honoring `\|`
//! - `terms`: parses the text half into include/exclude terms

mod pipeline;
mod terms;

pub use pipeline::split_pipeline;
pub use terms::{parse_terms, Terms};

use crate::errors::SearchError;

/// A parsed search query.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    /// Seed text for similarity ranking, if any
    pub vector: Option<String>,
    /// Parsed text filter, if any
    pub text: Option<Terms>,
}

impl Query {
    pub fn parse(raw: &str) -> Result<Self, SearchError> {
        let (vector_part, text_part) = split_pipeline(raw);

        let vector = (!vector_part.is_empty()).then_some(vector_part);
        let text = if text_part.is_empty() {
            None
        } else {
            let terms = parse_terms(&text_part);
            (!terms.is_empty()).then_some(terms)
        };

        if vector.is_none() && text.is_none() {
            return Err(SearchError::Validation(
                "empty query: both vector and text parts are empty".into(),
            ));
        }

        Ok(Self { vector, text })
    }

    pub fn is_text_only(&self) -> bool {
        self.vector.is_none()
    }
}
