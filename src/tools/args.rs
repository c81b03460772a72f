//! Tool argument parsing

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::{Error, Result};

/// `prometheus_query` arguments
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct QueryArgs {
    #[serde(deserialize_with = "string")]
    pub backend: String,
    #[serde(deserialize_with = "string")]
    pub query: String,
    #[serde(deserialize_with = "string")]
    pub time: String,
    #[serde(deserialize_with = "string")]
    pub org_id: String,
}

/// `prometheus_range_query` arguments
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct RangeQueryArgs {
    #[serde(deserialize_with = "string")]
    pub backend: String,
    #[serde(deserialize_with = "string")]
    pub query: String,
    #[serde(deserialize_with = "string")]
    pub start: String,
    #[serde(deserialize_with = "string")]
    pub end: String,
    #[serde(deserialize_with = "string")]
    pub step: String,
    #[serde(deserialize_with = "string")]
    pub org_id: String,
}

/// `prometheus_list_metrics` arguments
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct ListMetricsArgs {
    #[serde(deserialize_with = "string")]
    pub backend: String,
    #[serde(deserialize_with = "string")]
    pub query: String,
    #[serde(deserialize_with = "string")]
    pub org_id: String,
    #[serde(deserialize_with = "integer")]
    pub limit: Option<i64>,
    #[serde(deserialize_with = "integer")]
    pub offset: Option<i64>,
}

/// Deserialize tool arguments; absent or `null` arguments mean all defaults
pub(crate) fn parse_args<T: DeserializeOwned + Default>(arguments: Value) -> Result<T> {
    if arguments.is_null() {
        return Ok(T::default());
    }
    serde_json::from_value(arguments)
        .map_err(|e| Error::InvalidArgument(format!("failed to parse arguments: {e}")))
}

// `null` for an optional string means "not given"
fn string<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Option::unwrap_or_default)
}

// JSON clients often send `10.0` for a number-typed field
#[allow(clippy::cast_possible_truncation)]
fn integer<'de, D>(deserializer: D) -> std::result::Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64))
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid integer {n}"))),
        Some(other) => Err(serde::de::Error::custom(format!(
            "expected a number, got {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn numbers_accept_floats() {
        let args: ListMetricsArgs = parse_args(json!({"limit": 10.0, "offset": 5})).unwrap();
        assert_eq!(args.limit, Some(10));
        assert_eq!(args.offset, Some(5));

        let args: ListMetricsArgs = parse_args(json!({"limit": null})).unwrap();
        assert_eq!(args.limit, None);
        assert_eq!(args.offset, None);
    }

    #[test]
    fn strings_are_not_numbers() {
        let err = parse_args::<ListMetricsArgs>(json!({"limit": "ten"})).unwrap_err();
        assert!(err.to_string().starts_with("failed to parse arguments"));
    }

    #[test]
    fn null_arguments_default() {
        let args: RangeQueryArgs = parse_args(Value::Null).unwrap();
        assert!(args.query.is_empty());
        assert!(args.step.is_empty());
    }

    #[test]
    fn null_strings_are_empty() {
        let args: QueryArgs =
            parse_args(json!({"query": "up", "backend": null, "org_id": null, "time": null}))
                .unwrap();
        assert_eq!(args.query, "up");
        assert!(args.backend.is_empty());
        assert!(args.org_id.is_empty());
        assert!(args.time.is_empty());

        let args: RangeQueryArgs = parse_args(json!({"step": null})).unwrap();
        assert!(args.step.is_empty());

        let args: ListMetricsArgs = parse_args(json!({"query": null})).unwrap();
        assert!(args.query.is_empty());

        let err = parse_args::<QueryArgs>(json!({"query": 42})).unwrap_err();
        assert!(err.to_string().starts_with("failed to parse arguments"));
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let args: QueryArgs = parse_args(json!({"query": "up", "extra": true})).unwrap();
        assert_eq!(args.query, "up");
    }
}
