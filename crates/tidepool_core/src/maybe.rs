//! # Optional Values
//!
//! `Maybe<T>` is the carrier every lookup in TIDEPOOL returns when it may find
//! nothing. It behaves like `Option<T>` with a few extra unwraps that never panic,
//! and it can be built from "nullable" host values (destroyed handles, sentinel
//! ids) so that a null-equivalent never ends up being treated as a value.

/// Values with a null-equivalent state.
///
/// Host handles often stay constructible after the object they point at is gone.
/// Implementing this trait lets `Maybe::from_nullable` treat such handles as absent.
pub trait Nullable {
    /// Returns true when the value must be treated as "no value".
    fn is_null_value(&self) -> bool;
}

impl<T: ?Sized> Nullable for *const T {
    #[inline]
    fn is_null_value(&self) -> bool {
        self.is_null()
    }
}

impl Nullable for &str {
    #[inline]
    fn is_null_value(&self) -> bool {
        self.is_empty()
    }
}

impl Nullable for String {
    #[inline]
    fn is_null_value(&self) -> bool {
        self.is_empty()
    }
}

/// A value that may be absent.
///
/// Unlike `Option::unwrap`, none of the unwrapping accessors panic:
/// `get` falls back to `T::default()`, `get_or` to a caller-provided value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Maybe<T> {
    value: Option<T>,
}

impl<T> Maybe<T> {
    /// Creates an empty value.
    #[inline]
    #[must_use]
    pub const fn none() -> Self {
        Self { value: None }
    }

    /// Wraps a value without checking it for a null-equivalent state.
    #[inline]
    #[must_use]
    pub const fn some(value: T) -> Self {
        Self { value: Some(value) }
    }

    /// Wraps a possibly-null value, detecting emptiness.
    #[inline]
    #[must_use]
    pub fn from_nullable(value: T) -> Self
    where
        T: Nullable,
    {
        if value.is_null_value() {
            Self::none()
        } else {
            Self::some(value)
        }
    }

    /// Wraps `value`, substituting `fallback` when `value` is null-equivalent.
    ///
    /// The result always has a value.
    #[inline]
    #[must_use]
    pub fn or_fallback(value: T, fallback: T) -> Self
    where
        T: Nullable,
    {
        if value.is_null_value() {
            Self::some(fallback)
        } else {
            Self::some(value)
        }
    }

    /// Returns true if a value is held.
    #[inline]
    #[must_use]
    pub const fn has_value(&self) -> bool {
        self.value.is_some()
    }

    /// Returns true if no value is held.
    #[inline]
    #[must_use]
    pub const fn is_null(&self) -> bool {
        self.value.is_none()
    }

    /// Unwraps the value, returning `T::default()` when empty.
    #[inline]
    #[must_use]
    pub fn get(self) -> T
    where
        T: Default,
    {
        self.value.unwrap_or_default()
    }

    /// Unwraps the value, returning `default` when empty.
    #[inline]
    #[must_use]
    pub fn get_or(self, default: T) -> T {
        self.value.unwrap_or(default)
    }

    /// Unwraps the value, computing the fallback lazily when empty.
    #[inline]
    pub fn get_or_else(self, fallback: impl FnOnce() -> T) -> T {
        self.value.unwrap_or_else(fallback)
    }

    /// Unwraps through `map`. When empty, `T::default()` is returned untouched.
    #[inline]
    pub fn get_mapped(self, map: impl FnOnce(T) -> T) -> T
    where
        T: Default,
    {
        match self.value {
            Some(value) => map(value),
            None => T::default(),
        }
    }

    /// Unwraps through `map`. When empty, `map` is applied to `default` instead.
    #[inline]
    pub fn get_mapped_or(self, map: impl FnOnce(T) -> T, default: T) -> T {
        map(self.value.unwrap_or(default))
    }

    /// Transforms the held value.
    #[inline]
    pub fn map<U>(self, map: impl FnOnce(T) -> U) -> Maybe<U> {
        Maybe {
            value: self.value.map(map),
        }
    }

    /// Mutates the held value in place. Does nothing when empty.
    #[inline]
    pub fn map_in_place(&mut self, map: impl FnOnce(&mut T)) {
        if let Some(value) = self.value.as_mut() {
            map(value);
        }
    }

    /// Runs a side effect on the held value, if any.
    #[inline]
    pub fn iterate(&self, action: impl FnOnce(&T)) {
        if let Some(value) = self.value.as_ref() {
            action(value);
        }
    }

    /// Stores `value`, returning what was held before.
    #[inline]
    pub fn replace(&mut self, value: T) -> Maybe<T> {
        Maybe {
            value: self.value.replace(value),
        }
    }

    /// Takes the held value, leaving the carrier empty.
    #[inline]
    pub fn take(&mut self) -> Maybe<T> {
        Maybe {
            value: self.value.take(),
        }
    }

    /// Borrows the held value.
    #[inline]
    #[must_use]
    pub const fn as_ref(&self) -> Maybe<&T> {
        Maybe {
            value: self.value.as_ref(),
        }
    }

    /// Borrows the held value as a standard option.
    #[inline]
    #[must_use]
    pub const fn as_option(&self) -> Option<&T> {
        self.value.as_ref()
    }

    /// Converts into a standard option.
    #[inline]
    #[must_use]
    pub fn into_option(self) -> Option<T> {
        self.value
    }
}

impl<T> Default for Maybe<T> {
    fn default() -> Self {
        Self::none()
    }
}

impl<T> From<Option<T>> for Maybe<T> {
    fn from(value: Option<T>) -> Self {
        Self { value }
    }
}

impl<T> From<Maybe<T>> for Option<T> {
    fn from(value: Maybe<T>) -> Self {
        value.value
    }
}

impl<T> IntoIterator for Maybe<T> {
    type Item = T;
    type IntoIter = std::option::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.value.into_iter()
    }
}
