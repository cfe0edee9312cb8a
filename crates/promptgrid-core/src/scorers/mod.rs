//! One [`Scorer`] per assertion type.

use anyhow::Result;

use crate::providers::ProviderSpec;
use crate::scorer::Scorer;
use crate::types::{Assertion, AssertionKind};

pub mod contains;
pub mod exact;
pub mod json;
pub mod levenshtein;
pub mod regex;
pub mod rubric;

pub use contains::ContainsScorer;
pub use exact::EqualsScorer;
pub use json::JsonScorer;
pub use levenshtein::{LevenshteinScorer, DEFAULT_SIMILARITY_THRESHOLD};
pub use self::regex::RegexScorer;
pub use rubric::RubricScorer;

pub fn scorer_for(assertion: &Assertion) -> Result<Box<dyn Scorer>> {
    Ok(match assertion.kind {
        AssertionKind::Equals => Box::new(EqualsScorer),
        AssertionKind::Contains => Box::new(ContainsScorer::new()),
        AssertionKind::Icontains => Box::new(ContainsScorer::case_insensitive()),
        AssertionKind::Regex => Box::new(RegexScorer),
        AssertionKind::IsJson => Box::new(JsonScorer),
        AssertionKind::Similar => Box::new(LevenshteinScorer::new(
            assertion.threshold.unwrap_or(DEFAULT_SIMILARITY_THRESHOLD),
        )),
        AssertionKind::LlmRubric => {
            let grader = match &assertion.provider {
                Some(ProviderSpec::Resolved(provider)) => Some(provider.clone()),
                Some(other) => anyhow::bail!("grading provider {:?} was not resolved", other),
                None => None,
            };
            Box::new(RubricScorer::new(grader))
        }
    })
}
