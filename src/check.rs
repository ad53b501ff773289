use std::collections::BTreeMap;

use serde_json::Value;

/// A named pass/fail predicate over a response.
///
/// Checks are pure functions of the response: evaluating them has no side
/// effects, and a predicate that cannot be evaluated (for example a JSON path
/// over a body that is not JSON) is recorded as failed rather than raised.
#[derive(Debug, Clone, PartialEq)]
pub struct Check {
    pub name: String,
    pub predicate: Predicate,
}

impl Check {
    pub fn new(name: impl Into<String>, predicate: Predicate) -> Self {
        Self {
            name: name.into(),
            predicate,
        }
    }
}

/// The supported comparison operations.
///
/// Predicates are a closed set of tagged variants instead of an expression
/// language; each variant is total over any (status, body) input.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// The response status equals the given code.
    StatusIs(u16),
    /// The JSON body has a value at the given dot-separated path.
    JsonPathExists(String),
    /// The JSON body has an array at the given dot-separated path.
    JsonPathIsArray(String),
}

/// Evaluate every check against a response, returning name → pass.
pub fn evaluate(checks: &[Check], status: u16, body: &[u8]) -> BTreeMap<String, bool> {
    // A malformed body simply fails the body-dependent checks.
    let json: Option<Value> = serde_json::from_slice(body).ok();
    checks
        .iter()
        .map(|check| {
            let pass = match &check.predicate {
                Predicate::StatusIs(expected) => status == *expected,
                Predicate::JsonPathExists(path) => lookup(json.as_ref(), path).is_some(),
                Predicate::JsonPathIsArray(path) => {
                    matches!(lookup(json.as_ref(), path), Some(Value::Array(_)))
                }
            };
            (check.name.clone(), pass)
        })
        .collect()
}

/// Mark every check failed, for requests that never produced a response.
pub(crate) fn all_failed(checks: &[Check]) -> BTreeMap<String, bool> {
    checks
        .iter()
        .map(|check| (check.name.clone(), false))
        .collect()
}

fn lookup<'a>(json: Option<&'a Value>, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(json?, |value, key| value.get(key))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checks() -> Vec<Check> {
        vec![
            Check::new("status is 201", Predicate::StatusIs(201)),
            Check::new("has id", Predicate::JsonPathExists("data.id".into())),
            Check::new("data is array", Predicate::JsonPathIsArray("data".into())),
        ]
    }

    #[test]
    fn status_and_nested_path() {
        let body = br#"{"data":{"id":"x"}}"#;
        let results = evaluate(&checks(), 201, body);
        assert_eq!(results["status is 201"], true);
        assert_eq!(results["has id"], true);
        assert_eq!(results["data is array"], false);
    }

    #[test]
    fn array_path() {
        let body = br#"{"data":[{"id":"x"}]}"#;
        let results = evaluate(&checks(), 200, body);
        assert_eq!(results["status is 201"], false);
        assert_eq!(results["data is array"], true);
    }

    #[test]
    fn malformed_body_fails_body_checks_only() {
        let results = evaluate(&checks(), 201, b"not json at all");
        assert_eq!(results["status is 201"], true);
        assert_eq!(results["has id"], false);
        assert_eq!(results["data is array"], false);
    }

    #[test]
    fn all_failed_names_every_check() {
        let failed = all_failed(&checks());
        assert_eq!(failed.len(), 3);
        assert!(failed.values().all(|pass| !pass));
    }
}
