// ABOUTME: Phantom-typed identifiers for compile-time type safety.
// ABOUTME: Keeps container ids and image ids from being swapped by accident.

use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

/// Marker types for phantom type parameters.
/// Using empty enums prevents instantiation and requires no trait bounds.
pub enum ContainerMarker {}
pub enum ImageMarker {}

/// An opaque identifier handed out by the container runtime.
///
/// The phantom parameter makes a `ContainerId` and an `ImageId` distinct
/// types even though both are plain strings on the wire.
#[must_use = "IDs reference resources and should not be ignored"]
pub struct Id<T> {
    value: String,
    _marker: PhantomData<T>,
}

impl<T> Id<T> {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            _marker: PhantomData,
        }
    }

    /// Parse an id from command output, ignoring surrounding whitespace.
    ///
    /// Returns `None` when nothing but whitespace was printed.
    pub fn from_output(output: &str) -> Option<Self> {
        let trimmed = output.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self::new(trimmed))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }

    pub fn into_inner(self) -> String {
        self.value
    }
}

// Manual trait implementations that don't require T to implement the trait.
// This is necessary because T is only used as a phantom type marker.

impl<T> std::fmt::Debug for Id<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Id").field(&self.value).finish()
    }
}

impl<T> Clone for Id<T> {
    fn clone(&self) -> Self {
        Self::new(self.value.clone())
    }
}

impl<T> PartialEq for Id<T> {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl<T> Eq for Id<T> {}

impl<T> Hash for Id<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.value.hash(state);
    }
}

impl<T> std::fmt::Display for Id<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.value)
    }
}

pub type ContainerId = Id<ContainerMarker>;
pub type ImageId = Id<ImageMarker>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_output_trims_trailing_newline() {
        let id = ContainerId::from_output("3f2a9c\n").unwrap();
        assert_eq!(id.as_str(), "3f2a9c");
    }

    #[test]
    fn from_output_rejects_blank() {
        assert!(ContainerId::from_output("  \n").is_none());
    }
}
