//! Payload extraction
//!
//! Applies a channel's stored pattern to the raw payload and yields a
//! structured (timestamp, value) pair. Patterns arrive as delimited
//! expression strings with optional trailing flags (`/…/gm`); the
//! delimiters are stripped and the flags with a Rust equivalent (`i`, `m`,
//! `s`) are honored. Capture group 1 is the timestamp, group 2 the value,
//! group 3 optionally a unit.
//!
//! Compiled patterns are cached per channel; a cache hit is only taken when
//! the stored pattern string is unchanged, so administrative edits take
//! effect on the next publish.

use std::fmt;
use std::sync::Arc;

use ahash::RandomState;
use dashmap::DashMap;
use regex::{Regex, RegexBuilder};
use tracing::trace;

use crate::store::ChannelId;


/// Pattern applied when a channel has none configured: a bracketed,
/// comma-separated `[timestamp,value,...]` list.
pub const DEFAULT_PATTERN: &str = r"/\[([0-9]*),([^,]*),(.*)\]/m";

/// Errors aborting payload extraction
#[derive(Debug)]
pub enum ExtractionError {
    /// The stored pattern failed to compile
    BadPattern { pattern: String, reason: String },
    /// The pattern has fewer than two capture groups
    MissingGroups { pattern: String, groups: usize },
    /// Payload is not valid UTF-8
    PayloadNotUtf8,
    /// The pattern did not match the payload
    NoMatch,
    /// Capture group 1 is not an integer timestamp
    BadTimestamp { raw: String },
    /// Capture group 2 is not a decimal value
    BadValue { raw: String },
}

impl fmt::Display for ExtractionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadPattern { pattern, reason } => {
                write!(f, "pattern {} failed to compile: {}", pattern, reason)
            }
            Self::MissingGroups { pattern, groups } => {
                write!(
                    f,
                    "pattern {} has {} capture groups, need at least 2",
                    pattern, groups
                )
            }
            Self::PayloadNotUtf8 => write!(f, "payload is not valid UTF-8"),
            Self::NoMatch => write!(f, "pattern did not match payload"),
            Self::BadTimestamp { raw } => write!(f, "timestamp group {:?} is not an integer", raw),
            Self::BadValue { raw } => write!(f, "value group {:?} is not a number", raw),
        }
    }
}

impl std::error::Error for ExtractionError {}

/// A structured pair pulled out of a payload
#[derive(Debug, Clone, PartialEq)]
pub struct Extracted {
    /// Measurement timestamp, unix seconds
    pub timestamp: i64,
    /// Scalar value
    pub value: f64,
    /// Optional unit from capture group 3, verbatim
    pub unit: Option<String>,
}

struct CompiledPattern {
    source: String,
    regex: Regex,
}

/// Compiles and applies per-channel extraction patterns
pub struct PayloadExtractor {
    cache: DashMap<ChannelId, Arc<CompiledPattern>, RandomState>,
    default_pattern: String,
}

impl PayloadExtractor {
    pub fn new() -> Self {
        Self::with_default_pattern(DEFAULT_PATTERN)
    }

    /// Override the fallback pattern (configuration)
    pub fn with_default_pattern(pattern: &str) -> Self {
        Self {
            cache: DashMap::with_hasher(RandomState::new()),
            default_pattern: pattern.to_string(),
        }
    }

    /// Apply the channel's pattern (or the default) to a payload.
    pub fn extract(
        &self,
        channel_id: ChannelId,
        pattern: Option<&str>,
        payload: &[u8],
    ) -> Result<Extracted, ExtractionError> {
        let payload = std::str::from_utf8(payload).map_err(|_| ExtractionError::PayloadNotUtf8)?;
        let pattern = pattern
            .filter(|p| !p.is_empty())
            .unwrap_or(&self.default_pattern);
        let compiled = self.compiled(channel_id, pattern)?;

        let captures = compiled
            .regex
            .captures(payload)
            .ok_or(ExtractionError::NoMatch)?;

        let raw_timestamp = captures.get(1).map(|m| m.as_str()).unwrap_or_default();
        let timestamp: i64 = raw_timestamp
            .parse()
            .map_err(|_| ExtractionError::BadTimestamp {
                raw: raw_timestamp.to_string(),
            })?;

        let raw_value = captures.get(2).map(|m| m.as_str()).unwrap_or_default();
        let value: f64 = raw_value.parse().map_err(|_| ExtractionError::BadValue {
            raw: raw_value.to_string(),
        })?;

        let unit = captures
            .get(3)
            .map(|m| m.as_str().to_string())
            .filter(|s| !s.is_empty());

        trace!(channel_id, timestamp, value, "payload extracted");
        Ok(Extracted {
            timestamp,
            value,
            unit,
        })
    }

    /// Drop the cached pattern for a channel (administrative eviction)
    pub fn invalidate(&self, channel_id: ChannelId) {
        self.cache.remove(&channel_id);
    }

    fn compiled(
        &self,
        channel_id: ChannelId,
        pattern: &str,
    ) -> Result<Arc<CompiledPattern>, ExtractionError> {
        if let Some(entry) = self.cache.get(&channel_id) {
            // Stale entries (pattern edited) fall through and recompile
            if entry.source == pattern {
                return Ok(entry.clone());
            }
        }

        let regex = compile_delimited(pattern)?;
        if regex.captures_len() < 3 {
            return Err(ExtractionError::MissingGroups {
                pattern: pattern.to_string(),
                groups: regex.captures_len() - 1,
            });
        }

        let compiled = Arc::new(CompiledPattern {
            source: pattern.to_string(),
            regex,
        });
        self.cache.insert(channel_id, compiled.clone());
        Ok(compiled)
    }
}

impl Default for PayloadExtractor {
    fn default() -> Self {
        Self::new()
    }
}

/// Strip `/expr/flags` delimiters and map the flags onto the builder.
/// Undelimited patterns are compiled verbatim with no flags.
fn compile_delimited(pattern: &str) -> Result<Regex, ExtractionError> {
    let (inner, flags) = split_delimited(pattern);

    let mut builder = RegexBuilder::new(inner);
    for flag in flags.chars() {
        match flag {
            'i' => builder.case_insensitive(true),
            'm' => builder.multi_line(true),
            's' => builder.dot_matches_new_line(true),
            // g, u, y have no equivalent here
            _ => &mut builder,
        };
    }

    builder.build().map_err(|e| ExtractionError::BadPattern {
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })
}

fn split_delimited(pattern: &str) -> (&str, &str) {
    if let Some(rest) = pattern.strip_prefix('/') {
        if let Some(idx) = rest.rfind('/') {
            return (&rest[..idx], &rest[idx + 1..]);
        }
    }
    (pattern, "")
}
