//! Schema gateway — one operation, `validate`, over a pluggable
//! validator ecosystem.
//!
//! Concrete validators implement [`SchemaValidator`] and are stored as
//! `Arc<dyn SchemaValidator>` on a [`crate::router::Procedure`]. Validation
//! may be sync or async internally — callers must not assume either, so the
//! trait returns a boxed future regardless.

use std::future::Future;
use std::pin::Pin;

use serde::de::DeserializeOwned;
use serde_json::Value;

/// A single field-level validation problem.
///
/// A path, a message, and a machine-readable code.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ValidationIssue {
    pub path: String,
    pub message: String,
    pub code: String,
}

/// Outcome of validating one raw value against one schema.
pub enum ValidationOutcome {
    /// The value was accepted, possibly coerced (e.g. defaults filled in,
    /// numeric strings parsed).
    Valid(Value),
    /// The value was rejected; never fatal to the server process.
    Invalid(Vec<ValidationIssue>),
}

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Adapter trait wrapping a concrete schema/validator behind one uniform
/// operation: validate(input) -> value | issues.
pub trait SchemaValidator: Send + Sync + 'static {
    /// Validate (and optionally coerce) `raw`.
    fn validate<'a>(&'a self, raw: &'a Value) -> BoxFuture<'a, ValidationOutcome>;
}

/// A validator built from a [`garde::Validate`] type: deserialize `raw` into
/// `T`, run `T::validate`, and report `garde`'s field-path errors as
/// [`ValidationIssue`]s. On success the value is re-serialized, which is the
/// "coerce" half of the contract (defaults applied by `serde`'s
/// `#[serde(default)]` show up here).
pub struct TypedValidator<T> {
    _marker: std::marker::PhantomData<fn() -> T>,
}

impl<T> Default for TypedValidator<T> {
    fn default() -> Self {
        Self { _marker: std::marker::PhantomData }
    }
}

impl<T> TypedValidator<T> {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<T> SchemaValidator for TypedValidator<T>
where
    T: DeserializeOwned + serde::Serialize + garde::Validate + Send + Sync + 'static,
    T::Context: Default,
{
    fn validate<'a>(&'a self, raw: &'a Value) -> BoxFuture<'a, ValidationOutcome> {
        Box::pin(async move {
            let parsed: T = match serde_json::from_value(raw.clone()) {
                Ok(v) => v,
                Err(e) => {
                    return ValidationOutcome::Invalid(vec![ValidationIssue {
                        path: "$".to_string(),
                        message: e.to_string(),
                        code: "deserialize".to_string(),
                    }]);
                }
            };
            if let Err(report) = parsed.validate() {
                let issues = report
                    .iter()
                    .map(|(path, err)| {
                        let p = path.to_string();
                        ValidationIssue {
                            path: if p.is_empty() { "$".to_string() } else { p },
                            message: err.message().to_string(),
                            code: "validation".to_string(),
                        }
                    })
                    .collect();
                return ValidationOutcome::Invalid(issues);
            }
            match serde_json::to_value(&parsed) {
                Ok(v) => ValidationOutcome::Valid(v),
                Err(e) => ValidationOutcome::Invalid(vec![ValidationIssue {
                    path: "$".to_string(),
                    message: e.to_string(),
                    code: "serialize".to_string(),
                }]),
            }
        })
    }
}

/// A validator built from a plain closure, for schemas that don't need a
/// `garde`-derived struct (ad-hoc shape checks, third-party validator
/// libraries wrapped by the caller).
pub struct FnValidator<F> {
    f: F,
}

impl<F> FnValidator<F>
where
    F: Fn(&Value) -> Result<Value, Vec<ValidationIssue>> + Send + Sync + 'static,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F> SchemaValidator for FnValidator<F>
where
    F: Fn(&Value) -> Result<Value, Vec<ValidationIssue>> + Send + Sync + 'static,
{
    fn validate<'a>(&'a self, raw: &'a Value) -> BoxFuture<'a, ValidationOutcome> {
        Box::pin(async move {
            match (self.f)(raw) {
                Ok(v) => ValidationOutcome::Valid(v),
                Err(issues) => ValidationOutcome::Invalid(issues),
            }
        })
    }
}

/// The always-valid validator: passes the raw value through unchanged. Used
/// for procedures declared without a payload schema.
pub struct NoopValidator;

impl SchemaValidator for NoopValidator {
    fn validate<'a>(&'a self, raw: &'a Value) -> BoxFuture<'a, ValidationOutcome> {
        Box::pin(async move { ValidationOutcome::Valid(raw.clone()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use garde::Validate;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Deserialize, Serialize, Validate)]
    struct Ping {
        #[garde(length(min = 1, max = 64))]
        message: String,
    }

    #[tokio::test]
    async fn typed_validator_accepts_valid_input() {
        let v = TypedValidator::<Ping>::new();
        let raw = serde_json::json!({ "message": "hi" });
        match v.validate(&raw).await {
            ValidationOutcome::Valid(value) => assert_eq!(value["message"], "hi"),
            ValidationOutcome::Invalid(issues) => panic!("unexpected issues: {issues:?}"),
        }
    }

    #[tokio::test]
    async fn typed_validator_rejects_invalid_input() {
        let v = TypedValidator::<Ping>::new();
        let raw = serde_json::json!({ "message": "" });
        match v.validate(&raw).await {
            ValidationOutcome::Valid(_) => panic!("expected validation to fail"),
            ValidationOutcome::Invalid(issues) => assert!(!issues.is_empty()),
        }
    }

    #[tokio::test]
    async fn noop_validator_passes_through() {
        let raw = serde_json::json!({ "anything": 1 });
        match NoopValidator.validate(&raw).await {
            ValidationOutcome::Valid(value) => assert_eq!(value, raw),
            ValidationOutcome::Invalid(_) => panic!("noop must never reject"),
        }
    }
}
