//! Warning accumulation.
//!
//! Every remote call returns its diagnostics next to its result, and every
//! step concatenates the diagnostics of the calls it makes. [`Warnings`] keeps
//! them in call order and never deduplicates; [`Warned`] is the
//! `(value-or-error, warnings)` pair that flows through the whole crate.

use derive_more::{Deref, From};

use crate::PushError;

/// Ordered, non-fatal diagnostics returned by the control plane.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deref, From)]
pub struct Warnings(Vec<String>);

impl Warnings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, warning: impl Into<String>) {
        self.0.push(warning.into());
    }

    /// Append `other` after the warnings already collected.
    pub fn append(&mut self, other: Warnings) {
        self.0.extend(other.0);
    }

    /// Take the warnings out of `warned` and hand back its result.
    pub fn absorb<T>(&mut self, warned: Warned<T>) -> Result<T, PushError> {
        self.append(warned.warnings);
        warned.value
    }

    /// Pair the collected warnings with a final result.
    pub fn finish<T>(self, value: Result<T, PushError>) -> Warned<T> {
        Warned {
            value,
            warnings: self,
        }
    }

    pub fn into_vec(self) -> Vec<String> {
        self.0
    }
}

impl<S: Into<String>> FromIterator<S> for Warnings {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

impl IntoIterator for Warnings {
    type Item = String;
    type IntoIter = std::vec::IntoIter<String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// A result together with the warnings gathered while producing it.
///
/// Warnings are carried on both the success and the failure path.
#[must_use]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Warned<T> {
    pub value: Result<T, PushError>,
    pub warnings: Warnings,
}

impl<T> Warned<T> {
    pub fn ok(value: T, warnings: impl Into<Warnings>) -> Self {
        Self {
            value: Ok(value),
            warnings: warnings.into(),
        }
    }

    pub fn err(error: PushError, warnings: impl Into<Warnings>) -> Self {
        Self {
            value: Err(error),
            warnings: warnings.into(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.value.is_ok()
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Warned<U> {
        Warned {
            value: self.value.map(f),
            warnings: self.warnings,
        }
    }

    pub fn into_parts(self) -> (Result<T, PushError>, Warnings) {
        (self.value, self.warnings)
    }
}
