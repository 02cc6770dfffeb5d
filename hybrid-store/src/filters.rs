//! Conversion of document scopes to Qdrant `Filter`s.
//!
//! Every filter targets the keyword field `metadata.source`.

use crate::record::{DocumentScope, SOURCE_FILTER_KEY};
use qdrant_client::qdrant::{
    Condition, FieldCondition, Filter, Match, RepeatedStrings, condition::ConditionOneOf,
    r#match::MatchValue,
};
use tracing::debug;

/// Converts a [`DocumentScope`] into an optional Qdrant [`Filter`].
///
/// - `All` → no filter
/// - `Only(docs)` → `metadata.source` matches any of `docs`
pub fn scope_filter(scope: &DocumentScope) -> Option<Filter> {
    match scope {
        DocumentScope::All => None,
        DocumentScope::Only(docs) => {
            debug!("filters::scope_filter documents={}", docs.len());
            Some(must(source_condition(MatchValue::Keywords(RepeatedStrings {
                strings: docs.clone(),
            }))))
        }
    }
}

/// Filter selecting every point of one document.
pub fn source_equals(filename: &str) -> Filter {
    must(source_condition(MatchValue::Keyword(filename.to_string())))
}

fn source_condition(value: MatchValue) -> Condition {
    Condition {
        condition_one_of: Some(ConditionOneOf::Field(FieldCondition {
            key: SOURCE_FILTER_KEY.to_string(),
            r#match: Some(Match {
                match_value: Some(value),
            }),
            ..Default::default()
        })),
    }
}

fn must(condition: Condition) -> Filter {
    Filter {
        must: vec![condition],
        ..Default::default()
    }
}
