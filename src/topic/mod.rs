//! Subscription filter compilation and topic matching
//!
//! Converts MQTT-style wildcard patterns into compiled predicates:
//! - `/` separates topic levels
//! - `+` matches exactly one level
//! - `#` matches the remaining levels (including zero) and must be terminal
//!
//! Filters are compiled once at SUBSCRIBE time and tested against concrete
//! topics during republish fan-out.

use std::fmt;

/// A single level of a compiled filter
#[derive(Debug, Clone, PartialEq, Eq)]
enum FilterLevel {
    /// Literal level, matched byte-for-byte
    Literal(String),
    /// Single-level wildcard (+)
    Single,
    /// Multi-level wildcard (#)
    Multi,
}

/// Errors rejecting a subscription pattern at compile time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterError {
    /// Pattern is the empty string
    Empty,
    /// Pattern contains a null character
    NullCharacter,
    /// `#` used anywhere but the final level
    MultiWildcardNotLast,
    /// `+` or `#` mixed with other characters inside one level
    WildcardInLevel,
}

impl fmt::Display for FilterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterError::Empty => write!(f, "filter cannot be empty"),
            FilterError::NullCharacter => write!(f, "filter cannot contain null character"),
            FilterError::MultiWildcardNotLast => {
                write!(f, "multi-level wildcard must be the last level")
            }
            FilterError::WildcardInLevel => {
                write!(f, "wildcard must occupy an entire level")
            }
        }
    }
}

impl std::error::Error for FilterError {}

/// A compiled subscription predicate
///
/// Owned by exactly one client session; discarded together with it.
#[derive(Debug, Clone)]
pub struct TopicFilter {
    pattern: String,
    levels: Vec<FilterLevel>,
}

impl TopicFilter {
    /// Compile a wildcard pattern into a matchable predicate
    pub fn compile(pattern: &str) -> Result<Self, FilterError> {
        if pattern.is_empty() {
            return Err(FilterError::Empty);
        }
        if pattern.contains('\0') {
            return Err(FilterError::NullCharacter);
        }

        let raw: Vec<&str> = pattern.split('/').collect();
        let mut levels = Vec::with_capacity(raw.len());

        for (i, level) in raw.iter().enumerate() {
            match *level {
                "#" => {
                    if i != raw.len() - 1 {
                        return Err(FilterError::MultiWildcardNotLast);
                    }
                    levels.push(FilterLevel::Multi);
                }
                "+" => levels.push(FilterLevel::Single),
                s => {
                    if s.contains('#') || s.contains('+') {
                        return Err(FilterError::WildcardInLevel);
                    }
                    levels.push(FilterLevel::Literal(s.to_string()));
                }
            }
        }

        Ok(Self {
            pattern: pattern.to_string(),
            levels,
        })
    }

    /// Test a concrete topic against the compiled predicate
    ///
    /// Pure function; `$`-prefixed topics never match a filter whose first
    /// level is a wildcard.
    pub fn matches(&self, topic: &str) -> bool {
        if topic.starts_with('$')
            && matches!(
                self.levels.first(),
                Some(FilterLevel::Single) | Some(FilterLevel::Multi)
            )
        {
            return false;
        }

        let topic_levels: Vec<&str> = topic.split('/').collect();
        let mut ti = 0;

        for level in &self.levels {
            match level {
                FilterLevel::Multi => {
                    // Matches everything remaining, including nothing
                    return true;
                }
                FilterLevel::Single => {
                    if ti >= topic_levels.len() {
                        return false;
                    }
                    ti += 1;
                }
                FilterLevel::Literal(s) => {
                    if ti >= topic_levels.len() || topic_levels[ti] != s.as_str() {
                        return false;
                    }
                    ti += 1;
                }
            }
        }

        // Both sides must be exhausted
        ti == topic_levels.len()
    }

    /// The source pattern this filter was compiled from
    pub fn pattern(&self) -> &str {
        &self.pattern
    }
}
