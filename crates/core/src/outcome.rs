//! The value every request handler returns.

use serde::{Deserialize, Serialize};

use crate::error::{ErrorKind, FieldError, Failure};

/// Tagged success/failure value.
///
/// A `Failure` never carries a payload and a `Success` never carries error
/// data. Callers outside the pipeline should only rely on `is_success`,
/// `value`, `status_category`, `error_message` and `field_errors`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "data", rename_all = "snake_case")]
pub enum Outcome<T> {
    Success(T),
    Failure(Failure),
}

impl<T> Outcome<T> {
    pub fn success(value: T) -> Self {
        Outcome::Success(value)
    }

    pub fn failure(failure: Failure) -> Self {
        Outcome::Failure(failure)
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            Outcome::Success(v) => Some(v),
            Outcome::Failure(_) => None,
        }
    }

    pub fn into_value(self) -> Option<T> {
        match self {
            Outcome::Success(v) => Some(v),
            Outcome::Failure(_) => None,
        }
    }

    pub fn failure_ref(&self) -> Option<&Failure> {
        match self {
            Outcome::Success(_) => None,
            Outcome::Failure(f) => Some(f),
        }
    }

    /// Machine-readable category; `None` for a success.
    pub fn status_category(&self) -> Option<ErrorKind> {
        self.failure_ref().map(|f| f.kind)
    }

    pub fn error_message(&self) -> Option<&str> {
        self.failure_ref().map(|f| f.message.as_str())
    }

    pub fn field_errors(&self) -> &[FieldError] {
        self.failure_ref()
            .map(|f| f.field_errors.as_slice())
            .unwrap_or(&[])
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        match self {
            Outcome::Success(v) => Outcome::Success(f(v)),
            Outcome::Failure(e) => Outcome::Failure(e),
        }
    }

    pub fn into_result(self) -> Result<T, Failure> {
        self.into()
    }
}

impl<T> From<Failure> for Outcome<T> {
    fn from(value: Failure) -> Self {
        Outcome::Failure(value)
    }
}

impl<T> From<Result<T, Failure>> for Outcome<T> {
    fn from(value: Result<T, Failure>) -> Self {
        match value {
            Ok(v) => Outcome::Success(v),
            Err(e) => Outcome::Failure(e),
        }
    }
}

impl<T> From<Outcome<T>> for Result<T, Failure> {
    fn from(value: Outcome<T>) -> Self {
        match value {
            Outcome::Success(v) => Ok(v),
            Outcome::Failure(e) => Err(e),
        }
    }
}
