//! Freeze discipline for shared model objects.
//!
//! A [`FreezeState`] is a nested counter: every `freeze` must be matched by an
//! `unfreeze`, and the object is frozen while the count is positive. The
//! count is atomic so other threads can observe the frozen state; mutation
//! itself is never shared.

use std::fmt;
use std::ops::Deref;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::dex::error::{DexError, ErrorKind};

#[derive(Debug, Default)]
pub struct FreezeState {
    count: AtomicUsize,
}

impl FreezeState {
    pub fn new() -> Self {
        FreezeState::default()
    }

    /// Starts out frozen once.
    pub fn frozen() -> Self {
        FreezeState { count: AtomicUsize::new(1) }
    }

    /// Returns true when this call moved the object from mutable to frozen.
    pub fn freeze(&self) -> bool {
        self.count.fetch_add(1, Ordering::AcqRel) == 0
    }

    /// Returns true when this call made the object mutable again.
    pub fn unfreeze(&self) -> Result<bool, DexError> {
        let previous = self
            .count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |c| c.checked_sub(1))
            .map_err(|_| DexError::of(ErrorKind::Frozen, "unfreeze without matching freeze"))?;
        Ok(previous == 1)
    }

    pub fn is_frozen(&self) -> bool {
        self.count.load(Ordering::Acquire) > 0
    }

    pub fn ensure_mutable(&self, what: impl fmt::Display) -> Result<(), DexError> {
        if self.is_frozen() {
            return Err(DexError::frozen(what));
        }
        Ok(())
    }
}

impl Clone for FreezeState {
    fn clone(&self) -> Self {
        FreezeState { count: AtomicUsize::new(self.count.load(Ordering::Acquire)) }
    }
}

pub trait Freezable {
    fn freeze_state(&self) -> &FreezeState;

    fn freeze(&self) -> bool {
        self.freeze_state().freeze()
    }

    fn unfreeze(&self) -> Result<bool, DexError> {
        self.freeze_state().unfreeze()
    }

    fn is_frozen(&self) -> bool {
        self.freeze_state().is_frozen()
    }
}

/// Sealed phase of a freezable object: shared access only.
///
/// Dropping back to the builder phase is explicit through [`Frozen::thaw`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Frozen<T: Freezable>(T);

impl<T: Freezable> Frozen<T> {
    pub fn new(value: T) -> Self {
        value.freeze();
        Frozen(value)
    }

    pub fn thaw(self) -> Result<T, DexError> {
        self.0.unfreeze()?;
        Ok(self.0)
    }
}

impl<T: Freezable> Deref for Frozen<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.0
    }
}

impl<T: Freezable> AsRef<T> for Frozen<T> {
    fn as_ref(&self) -> &T {
        &self.0
    }
}

impl<T: Freezable + fmt::Display> fmt::Display for Frozen<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_freeze() {
        let state = FreezeState::new();
        assert!(!state.is_frozen());
        assert!(state.freeze());
        assert!(!state.freeze());
        assert!(!state.unfreeze().unwrap());
        assert!(state.is_frozen());
        assert!(state.unfreeze().unwrap());
        assert!(!state.is_frozen());
    }

    #[test]
    fn unbalanced_unfreeze_is_an_error() {
        let state = FreezeState::new();
        let e = state.unfreeze().unwrap_err();
        assert_eq!(e.kind(), ErrorKind::Frozen);
        assert!(!state.is_frozen());
    }

    #[test]
    fn ensure_mutable_names_the_object() {
        let state = FreezeState::frozen();
        let e = state.ensure_mutable("Lfoo/Bar;").unwrap_err();
        assert_eq!(e.kind(), ErrorKind::Frozen);
        assert!(e.to_string().contains("Lfoo/Bar;"));
        state.unfreeze().unwrap();
        assert!(state.ensure_mutable("Lfoo/Bar;").is_ok());
    }
}
