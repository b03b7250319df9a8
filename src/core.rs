//! # Core
//!
//! Serde helpers for the shapes DID documents allow a property to take.

use serde::{Deserialize, Serialize};

/// `Kind` allows serde to serialize/deserialize a string reference or an
/// embedded object.
///
/// Verification relationships use this: an entry is either the id of a
/// verification method declared elsewhere in the document or the method
/// itself.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum Kind<T> {
    /// Simple string value
    String(String),

    /// Complex object value
    Object(T),
}

impl<T: Default> Default for Kind<T> {
    fn default() -> Self {
        Self::String(String::new())
    }
}

impl<T> Kind<T> {
    /// Returns `true` if the value is a string reference.
    pub const fn is_string(&self) -> bool {
        matches!(self, Self::String(_))
    }

    /// Returns the string value, if any.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            Self::Object(_) => None,
        }
    }
}

impl<T> From<String> for Kind<T> {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl<T> From<&str> for Kind<T> {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

/// `OneMany` allows serde to serialize/deserialize a single object or a set of
/// objects.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum OneMany<T> {
    /// Single object
    One(T),

    /// Set of objects
    Many(Vec<T>),
}

impl<T: PartialEq> OneMany<T> {
    /// Returns `true` if the `OneMany` holds `item`.
    pub fn contains(&self, item: &T) -> bool {
        match self {
            Self::One(one) => one == item,
            Self::Many(many) => many.contains(item),
        }
    }

    /// Adds an object to the `OneMany`. If the `OneMany` is a single object, it
    /// is converted to a set of objects. Objects already present are not
    /// added again.
    pub fn add(self, item: T) -> Self {
        if self.contains(&item) {
            return self;
        }
        match self {
            Self::One(one) => Self::Many(vec![one, item]),
            Self::Many(mut many) => {
                many.push(item);
                Self::Many(many)
            }
        }
    }

    /// Returns the length of the `OneMany`.
    pub const fn len(&self) -> usize {
        match self {
            Self::One(_) => 1,
            Self::Many(many) => many.len(),
        }
    }

    /// Returns `true` if the `OneMany` is an empty `Many`.
    pub const fn is_empty(&self) -> bool {
        match self {
            Self::One(_) => false,
            Self::Many(many) => many.is_empty(),
        }
    }
}
