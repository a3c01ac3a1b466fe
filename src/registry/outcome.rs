use crate::errors::PullError;

/// Result of asking the registry for something
///
/// Network failures are not raised as errors by the registry client. Each
/// request ends in one of these, and the caller decides whether a missing
/// piece aborts the pull or is skipped.
#[derive(Debug)]
#[must_use]
pub enum Outcome<T> {
    /// The request succeeded with usable data
    Data(T),
    /// The request succeeded but there was nothing usable in the response
    Empty,
    /// The request failed, possibly after retrying
    Failed(PullError),
}

impl<T> Outcome<T> {
    /// Did the request produce data?
    pub fn is_data(&self) -> bool {
        matches!(self, Outcome::Data(_))
    }

    /// Transform the data, leaving `Empty` and `Failed` alone
    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> Outcome<U> {
        match self {
            Outcome::Data(data) => Outcome::Data(f(data)),
            Outcome::Empty => Outcome::Empty,
            Outcome::Failed(err) => Outcome::Failed(err),
        }
    }

    /// Chain another step that can itself come up empty or fail
    pub fn and_then<U, F: FnOnce(T) -> Outcome<U>>(self, f: F) -> Outcome<U> {
        match self {
            Outcome::Data(data) => f(data),
            Outcome::Empty => Outcome::Empty,
            Outcome::Failed(err) => Outcome::Failed(err),
        }
    }

    /// Discard the reason for a failure
    pub fn data(self) -> Option<T> {
        match self {
            Outcome::Data(data) => Some(data),
            _ => None,
        }
    }

    /// Treat anything but data as an error, naming what an empty response
    /// means to the caller
    pub fn into_result<F: FnOnce() -> PullError>(self, on_empty: F) -> Result<T, PullError> {
        match self {
            Outcome::Data(data) => Ok(data),
            Outcome::Empty => Err(on_empty()),
            Outcome::Failed(err) => Err(err),
        }
    }
}

impl<T> From<Result<T, PullError>> for Outcome<T> {
    fn from(result: Result<T, PullError>) -> Self {
        match result {
            Ok(data) => Outcome::Data(data),
            Err(err) => Outcome::Failed(err),
        }
    }
}
