//! Regular-expression rule with optional negation.
//!
//! Used for resource IDs and tag values. A pattern written as `NOT(<regex>)`
//! in the filter file is compiled as `<regex>` with the negation flag set.

use anyhow::{Result, anyhow};
use fancy_regex::Regex;
use tracing::warn;

use crate::types::error::CloudrmError;

const NOT_PREFIX: &str = "NOT(";
const NOT_SUFFIX: &str = ")";

/// A compiled pattern plus a negation flag.
///
/// Matching uses search semantics: the pattern may match anywhere in the
/// input unless it is anchored with `^` / `$`.
#[derive(Debug, Clone)]
pub struct PatternRule {
    regex: Regex,
    negate: bool,
}

impl PatternRule {
    /// Compile `pattern` as-is.
    pub fn new(pattern: &str, negate: bool) -> Result<Self> {
        let regex = Regex::new(pattern)
            .map_err(|e| anyhow!(CloudrmError::InvalidRegex(format!("{pattern}: {e}"))))?;
        Ok(Self { regex, negate })
    }

    /// Compile a filter-file expression, honouring the `NOT(...)` wrapper.
    pub fn parse(expression: &str) -> Result<Self> {
        match strip_not_wrapper(expression) {
            Some(inner) => Self::new(inner, true),
            None => Self::new(expression, false),
        }
    }

    /// Returns `negate XOR regex-search(value)`.
    ///
    /// A regex runtime failure (e.g. backtrack limit) never selects a resource,
    /// whatever the negation flag says.
    pub fn is_match(&self, value: &str) -> bool {
        match self.regex.is_match(value) {
            Ok(found) => found != self.negate,
            Err(e) => {
                warn!(
                    pattern = self.regex.as_str(),
                    value = value,
                    error = %e,
                    "regex evaluation failed, treating as no match."
                );
                false
            }
        }
    }

    pub fn as_str(&self) -> &str {
        self.regex.as_str()
    }

    pub fn is_negated(&self) -> bool {
        self.negate
    }
}

/// `NOT(x)` -> `Some("x")`, anything else -> `None`.
pub(crate) fn strip_not_wrapper(expression: &str) -> Option<&str> {
    expression
        .strip_prefix(NOT_PREFIX)
        .and_then(|rest| rest.strip_suffix(NOT_SUFFIX))
}
