//! Document list filters.
//!
//! Serialized in the JSON query format Appwrite accepts in `queries[]`
//! (`{"method":"equal","attribute":"user_id","values":["u1"]}`), and
//! evaluated locally by the in-memory backend.

use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use std::cmp::Ordering;

/// Page size Appwrite applies when a list request carries no `limit`.
pub const DEFAULT_LIMIT: u32 = 25;

#[derive(Debug, Clone, PartialEq)]
pub enum Query {
    Equal { attribute: String, values: Vec<Value> },
    GreaterThanEqual { attribute: String, value: Value },
    LessThan { attribute: String, value: Value },
    OrderAsc(String),
    OrderDesc(String),
    Limit(u32),
    Offset(u32),
}

impl Query {
    pub fn equal(attribute: impl Into<String>, value: impl Into<Value>) -> Self {
        Query::Equal {
            attribute: attribute.into(),
            values: vec![value.into()],
        }
    }

    pub fn greater_than_equal(attribute: impl Into<String>, value: impl Into<Value>) -> Self {
        Query::GreaterThanEqual {
            attribute: attribute.into(),
            value: value.into(),
        }
    }

    pub fn less_than(attribute: impl Into<String>, value: impl Into<Value>) -> Self {
        Query::LessThan {
            attribute: attribute.into(),
            value: value.into(),
        }
    }

    /// Threshold on a timestamp attribute.
    pub fn since(attribute: impl Into<String>, instant: DateTime<Utc>) -> Self {
        Self::greater_than_equal(attribute, instant.to_rfc3339())
    }

    pub fn before(attribute: impl Into<String>, instant: DateTime<Utc>) -> Self {
        Self::less_than(attribute, instant.to_rfc3339())
    }

    pub fn order_asc(attribute: impl Into<String>) -> Self {
        Query::OrderAsc(attribute.into())
    }

    pub fn order_desc(attribute: impl Into<String>) -> Self {
        Query::OrderDesc(attribute.into())
    }

    pub fn limit(limit: u32) -> Self {
        Query::Limit(limit)
    }

    pub fn offset(offset: u32) -> Self {
        Query::Offset(offset)
    }

    pub fn to_json(&self) -> Value {
        match self {
            Query::Equal { attribute, values } => {
                json!({"method": "equal", "attribute": attribute, "values": values})
            }
            Query::GreaterThanEqual { attribute, value } => {
                json!({"method": "greaterThanEqual", "attribute": attribute, "values": [value]})
            }
            Query::LessThan { attribute, value } => {
                json!({"method": "lessThan", "attribute": attribute, "values": [value]})
            }
            Query::OrderAsc(attribute) => json!({"method": "orderAsc", "attribute": attribute}),
            Query::OrderDesc(attribute) => json!({"method": "orderDesc", "attribute": attribute}),
            Query::Limit(limit) => json!({"method": "limit", "values": [limit]}),
            Query::Offset(offset) => json!({"method": "offset", "values": [offset]}),
        }
    }

    /// Whether `doc` passes this filter. Ordering and paging always pass.
    pub fn matches(&self, doc: &Value) -> bool {
        match self {
            Query::Equal { attribute, values } => doc
                .get(attribute)
                .is_some_and(|v| values.iter().any(|want| want == v)),
            Query::GreaterThanEqual { attribute, value } => doc
                .get(attribute)
                .and_then(|v| compare_values(v, value))
                .is_some_and(|ord| ord != Ordering::Less),
            Query::LessThan { attribute, value } => doc
                .get(attribute)
                .and_then(|v| compare_values(v, value))
                .is_some_and(|ord| ord == Ordering::Less),
            Query::OrderAsc(_) | Query::OrderDesc(_) | Query::Limit(_) | Query::Offset(_) => {
                true
            }
        }
    }
}

/// Filter, order and page `docs` the way the backend would, including the
/// default page size when no limit is given.
pub fn apply_queries(docs: impl IntoIterator<Item = Value>, queries: &[Query]) -> Vec<Value> {
    let mut out: Vec<Value> = docs
        .into_iter()
        .filter(|doc| queries.iter().all(|q| q.matches(doc)))
        .collect();

    for query in queries.iter().rev() {
        match query {
            Query::OrderAsc(attribute) => {
                out.sort_by(|a, b| compare_attr(a, b, attribute));
            }
            Query::OrderDesc(attribute) => {
                out.sort_by(|a, b| compare_attr(b, a, attribute));
            }
            _ => {}
        }
    }

    let offset = queries
        .iter()
        .find_map(|q| match q {
            Query::Offset(n) => Some(*n as usize),
            _ => None,
        })
        .unwrap_or(0);
    let limit = queries
        .iter()
        .find_map(|q| match q {
            Query::Limit(n) => Some(*n),
            _ => None,
        })
        .unwrap_or(DEFAULT_LIMIT);

    out.into_iter().skip(offset).take(limit as usize).collect()
}

fn compare_attr(a: &Value, b: &Value, attribute: &str) -> Ordering {
    match (a.get(attribute), b.get(attribute)) {
        (Some(x), Some(y)) => compare_values(x, y).unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Greater,
        (None, Some(_)) => Ordering::Less,
        (None, None) => Ordering::Equal,
    }
}

/// Timestamps compare as instants, numbers numerically, other strings
/// lexically. Mixed types do not compare.
fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => {
            match (
                DateTime::parse_from_rfc3339(x),
                DateTime::parse_from_rfc3339(y),
            ) {
                (Ok(dx), Ok(dy)) => Some(dx.cmp(&dy)),
                _ => Some(x.cmp(y)),
            }
        }
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_json_format() {
        assert_eq!(
            Query::equal("user_id", "u1").to_json(),
            json!({"method": "equal", "attribute": "user_id", "values": ["u1"]})
        );
        assert_eq!(
            Query::Limit(5).to_json(),
            json!({"method": "limit", "values": [5]})
        );
    }

    #[test]
    fn test_timestamp_threshold_ignores_offset_notation() {
        let since = Utc.with_ymd_and_hms(2026, 10, 16, 0, 0, 0).unwrap();
        let q = Query::since("completed_at", since);
        assert!(q.matches(&json!({"completed_at": "2026-10-16T02:00:00.000+02:00"})));
        assert!(!q.matches(&json!({"completed_at": "2026-10-16T01:59:59.000+02:00"})));
        assert!(!q.matches(&json!({})));
    }

    #[test]
    fn test_apply_orders_and_limits() {
        let docs = vec![
            json!({"n": 2, "user_id": "a"}),
            json!({"n": 3, "user_id": "a"}),
            json!({"n": 1, "user_id": "b"}),
            json!({"n": 5, "user_id": "a"}),
        ];
        let out = apply_queries(
            docs,
            &[Query::equal("user_id", "a"), Query::order_desc("n"), Query::Limit(2)],
        );
        assert_eq!(out, vec![json!({"n": 5, "user_id": "a"}), json!({"n": 3, "user_id": "a"})]);
    }

    #[test]
    fn test_apply_pages_with_default_limit() {
        let docs: Vec<Value> = (0..40).map(|n| json!({"n": n})).collect();
        let first = apply_queries(docs.clone(), &[Query::order_asc("n")]);
        assert_eq!(first.len(), DEFAULT_LIMIT as usize);

        let rest = apply_queries(
            docs,
            &[Query::order_asc("n"), Query::limit(100), Query::offset(30)],
        );
        assert_eq!(rest.len(), 10);
        assert_eq!(rest[0]["n"], 30);
    }
}
