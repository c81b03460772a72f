//! Metric name listing with glob filtering and pagination

use std::borrow::Cow;

use chrono::{Duration, Utc};
use glob::Pattern;
use serde::Serialize;
use tracing::{debug, warn};

use crate::prometheus::{METRIC_NAME_LABEL, PrometheusClient};
use crate::{Error, Result};

/// Page size used when the caller gives none (or a non-positive one)
pub const DEFAULT_LIMIT: usize = 100;

/// Window of recent data the listing looks at
pub const LOOKBACK: Duration = Duration::hours(1);

/// One page of metric names
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricsPage {
    /// Names matching the pattern, before pagination
    pub total_metrics: usize,
    /// Names on this page
    pub returned: usize,
    /// Effective offset
    pub offset: usize,
    /// Effective limit
    pub limit: usize,
    /// Whether names remain past this page
    pub has_more: bool,
    /// The names, in backend order
    pub metrics: Vec<String>,
}

/// Compile a glob; empty input means "match everything"
///
/// Character classes may be negated with `[!...]` or `[^...]`.
///
/// # Errors
///
/// Returns [`Error::InvalidPattern`] for malformed globs.
pub fn compile_pattern(pattern: &str) -> Result<Option<Pattern>> {
    if pattern.is_empty() {
        return Ok(None);
    }
    Pattern::new(&caret_negation(pattern))
        .map(Some)
        .map_err(|e| Error::InvalidPattern {
            pattern: pattern.to_string(),
            reason: e.msg.to_string(),
        })
}

// `glob` only knows `[!...]`; rewrite a leading `^` in each class
fn caret_negation(pattern: &str) -> Cow<'_, str> {
    if !pattern.contains("[^") {
        return Cow::Borrowed(pattern);
    }

    let mut out = String::with_capacity(pattern.len());
    let mut in_class = false;
    let mut chars = pattern.chars().peekable();
    while let Some(c) = chars.next() {
        out.push(c);
        match c {
            '[' if !in_class => {
                in_class = true;
                if chars.next_if_eq(&'^').is_some() {
                    out.push('!');
                }
            }
            ']' if in_class => in_class = false,
            _ => {}
        }
    }
    Cow::Owned(out)
}

/// Normalize caller-supplied limit and offset
#[must_use]
pub fn normalize_window(limit: Option<i64>, offset: Option<i64>) -> (usize, usize) {
    let limit = limit
        .filter(|l| *l > 0)
        .and_then(|l| usize::try_from(l).ok())
        .unwrap_or(DEFAULT_LIMIT);
    let offset = offset
        .filter(|o| *o > 0)
        .and_then(|o| usize::try_from(o).ok())
        .unwrap_or(0);
    (limit, offset)
}

/// Filter `names` by `pattern` and cut the `[offset, offset + limit)` window
#[must_use]
pub fn paginate(names: Vec<String>, pattern: Option<&Pattern>, limit: usize, offset: usize) -> MetricsPage {
    let filtered: Vec<String> = match pattern {
        Some(pattern) => names.into_iter().filter(|n| pattern.matches(n)).collect(),
        None => names,
    };

    let total = filtered.len();
    let start = offset.min(total);
    let end = offset.saturating_add(limit).min(total);
    let metrics: Vec<String> = filtered.into_iter().skip(start).take(end - start).collect();

    MetricsPage {
        total_metrics: total,
        returned: metrics.len(),
        offset,
        limit,
        has_more: offset.saturating_add(limit) < total,
        metrics,
    }
}

/// List metric names known to `client` over the last hour
///
/// The pattern is checked before the backend is contacted.
///
/// # Errors
///
/// Returns [`Error::InvalidPattern`] for a malformed glob, or
/// [`Error::QueryExecution`] when the backend call fails.
pub async fn list(
    client: &PrometheusClient,
    pattern: &str,
    limit: Option<i64>,
    offset: Option<i64>,
    tenant: Option<&str>,
) -> Result<MetricsPage> {
    let compiled = compile_pattern(pattern)?;
    let (limit, offset) = normalize_window(limit, offset);

    let end = Utc::now();
    let fetched = client
        .label_values(METRIC_NAME_LABEL, end - LOOKBACK, end, tenant)
        .await?;
    if !fetched.warnings.is_empty() {
        warn!(backend = %client.name(), warnings = ?fetched.warnings, "Backend returned warnings");
    }
    debug!(
        backend = %client.name(),
        names = fetched.data.len(),
        pattern = %pattern,
        "Fetched metric names"
    );

    Ok(paginate(fetched.data, compiled.as_ref(), limit, offset))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn names() -> Vec<String> {
        ["cpu", "memory", "disk_cpu"].iter().map(ToString::to_string).collect()
    }

    #[test]
    fn pattern_filters_and_limits() {
        let pattern = compile_pattern("*cpu*").unwrap();
        let page = paginate(names(), pattern.as_ref(), 1, 0);
        assert_eq!(page.total_metrics, 2);
        assert_eq!(page.returned, 1);
        assert!(page.has_more);
        assert_eq!(page.metrics, vec!["cpu"]);
    }

    #[test]
    fn filtering_keeps_backend_order() {
        let pattern = compile_pattern("*cpu").unwrap();
        let page = paginate(names(), pattern.as_ref(), 10, 0);
        assert_eq!(page.metrics, vec!["cpu", "disk_cpu"]);
        assert!(!page.has_more);
    }

    #[test]
    fn offset_past_end_is_empty() {
        let page = paginate(names(), None, 10, 3);
        assert_eq!(page.total_metrics, 3);
        assert_eq!(page.returned, 0);
        assert!(!page.has_more);

        let page = paginate(names(), None, 10, 50);
        assert_eq!(page.returned, 0);
        assert!(page.metrics.is_empty());
    }

    #[test]
    fn second_page() {
        let page = paginate(names(), None, 2, 2);
        assert_eq!(page.metrics, vec!["disk_cpu"]);
        assert_eq!(page.returned, 1);
        assert!(!page.has_more);
    }

    #[test]
    fn repeated_calls_agree() {
        let pattern = compile_pattern("*").unwrap();
        let first = paginate(names(), pattern.as_ref(), 2, 1);
        let second = paginate(names(), pattern.as_ref(), 2, 1);
        assert_eq!(first, second);
    }

    #[test]
    fn window_defaults() {
        assert_eq!(normalize_window(None, None), (DEFAULT_LIMIT, 0));
        assert_eq!(normalize_window(Some(0), Some(-5)), (DEFAULT_LIMIT, 0));
        assert_eq!(normalize_window(Some(-1), Some(7)), (DEFAULT_LIMIT, 7));
        assert_eq!(normalize_window(Some(25), Some(0)), (25, 0));
    }

    #[test]
    fn malformed_pattern_is_rejected() {
        let err = compile_pattern("[").unwrap_err();
        assert!(matches!(err, Error::InvalidPattern { ref pattern, .. } if pattern == "["));
        assert!(compile_pattern("").unwrap().is_none());
    }

    #[test]
    fn caret_negates_a_class() {
        let words: Vec<String> = ["apple", "banana", "cherry", "x^y"]
            .iter()
            .map(ToString::to_string)
            .collect();

        let caret = compile_pattern("[^a]*").unwrap();
        let bang = compile_pattern("[!a]*").unwrap();
        let with_caret = paginate(words.clone(), caret.as_ref(), 10, 0);
        assert_eq!(with_caret.metrics, vec!["banana", "cherry", "x^y"]);
        assert_eq!(with_caret, paginate(words.clone(), bang.as_ref(), 10, 0));

        // Outside a class `^` is literal
        let literal = compile_pattern("x^*").unwrap();
        assert_eq!(paginate(words, literal.as_ref(), 10, 0).metrics, vec!["x^y"]);
    }

    #[test]
    fn question_mark_and_classes() {
        let pattern = compile_pattern("dis?_[a-c]pu").unwrap();
        let page = paginate(names(), pattern.as_ref(), 10, 0);
        assert_eq!(page.metrics, vec!["disk_cpu"]);
    }
}
