//! Best-effort boundaries: a failed optional feature is logged and replaced.
use std::fmt::Display;

use tracing::warn;

pub trait Degrade<T> {
    /// Returns the success value, or logs the error at `warn` under `feature`
    /// and returns `fallback`.
    fn or_degrade(self, feature: &str, fallback: T) -> T;

    /// Like `or_degrade`, building the fallback only on failure.
    fn or_degrade_with(self, feature: &str, fallback: impl FnOnce() -> T) -> T;
}

impl<T, E: Display> Degrade<T> for Result<T, E> {
    fn or_degrade(self, feature: &str, fallback: T) -> T {
        self.or_degrade_with(feature, || fallback)
    }

    fn or_degrade_with(self, feature: &str, fallback: impl FnOnce() -> T) -> T {
        match self {
            Ok(value) => value,
            Err(err) => {
                warn!(feature, error = %err, "feature degraded");
                fallback()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passes_success_through() {
        let result: Result<u8, String> = Ok(3);
        assert_eq!(result.or_degrade("count", 0), 3);
    }

    #[test]
    fn substitutes_fallback_on_error() {
        let result: Result<&str, String> = Err("boom".into());
        assert_eq!(result.or_degrade("label", "raw"), "raw");
        let lazy: Result<Vec<u8>, String> = Err("boom".into());
        assert!(lazy.or_degrade_with("bytes", Vec::new).is_empty());
    }
}
