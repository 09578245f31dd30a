//! The two-call protocol deferred-dispatch utilities use to skip work aimed at destroyed objects.
//!
//! When scheduling a callback, a dispatcher turns whatever reference-like value it was given into a
//! guard with [`create`] and stores it next to the callback. Immediately before running the
//! callback, it calls [`check`]; if that returns `false`, the callback is dropped without being
//! called. This is the expected outcome for objects which were destroyed in the meantime and is
//! not an error.

use std::{
    fmt, hash,
    rc::{self, Rc},
    sync::{self, Arc},
};

use crate::{LivenessToken, Tracked, WeakHandle};

// === Traits === //

/// A stored liveness check.
pub trait Guard {
    /// Whether the guarded object is still alive. Never blocks.
    fn check(&self) -> bool;
}

/// A reference-like value which can be turned into a [`Guard`].
pub trait IntoGuard {
    type Guard: Guard;

    fn into_guard(self) -> Self::Guard;
}

pub fn create<S: IntoGuard>(source: S) -> S::Guard {
    source.into_guard()
}

pub fn check<G: ?Sized + Guard>(guard: &G) -> bool {
    guard.check()
}

// === LivenessGuard === //

/// The guard produced from a [`WeakHandle`]: a type-erased reference to its target's token.
///
/// Two `LivenessGuard`s compare equal iff they reference the same object, which makes them usable
/// as keys identifying an object independently of the handle type it was reached through.
#[derive(Clone, Default)]
pub struct LivenessGuard {
    token: Option<Arc<LivenessToken>>,
}

impl LivenessGuard {
    pub(crate) fn new(token: Option<Arc<LivenessToken>>) -> Self {
        Self { token }
    }

    pub fn is_null(&self) -> bool {
        self.token.is_none()
    }

    fn addr(&self) -> usize {
        self.token
            .as_ref()
            .map_or(0, |token| Arc::as_ptr(token).addr())
    }
}

impl fmt::Debug for LivenessGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.token {
            Some(token) => f
                .debug_tuple("LivenessGuard")
                .field(&format_args!("{:#x}", self.addr()))
                .field(&token.is_alive())
                .finish(),
            None => f.write_str("LivenessGuard(null)"),
        }
    }
}

impl Eq for LivenessGuard {}

impl PartialEq for LivenessGuard {
    fn eq(&self, other: &Self) -> bool {
        self.addr() == other.addr()
    }
}

impl hash::Hash for LivenessGuard {
    fn hash<H: hash::Hasher>(&self, state: &mut H) {
        self.addr().hash(state);
    }
}

impl Guard for LivenessGuard {
    fn check(&self) -> bool {
        self.token.as_ref().is_some_and(|token| token.is_alive())
    }
}

impl IntoGuard for LivenessGuard {
    type Guard = Self;

    fn into_guard(self) -> Self::Guard {
        self
    }
}

impl IntoGuard for &'_ LivenessGuard {
    type Guard = LivenessGuard;

    fn into_guard(self) -> Self::Guard {
        self.clone()
    }
}

impl<T: ?Sized> IntoGuard for WeakHandle<T> {
    type Guard = LivenessGuard;

    fn into_guard(self) -> Self::Guard {
        LivenessGuard::new(self.into_token())
    }
}

impl<T: ?Sized> IntoGuard for &'_ WeakHandle<T> {
    type Guard = LivenessGuard;

    fn into_guard(self) -> Self::Guard {
        LivenessGuard::new(self.token().cloned())
    }
}

impl<T> IntoGuard for &'_ Tracked<T> {
    type Guard = LivenessGuard;

    fn into_guard(self) -> Self::Guard {
        LivenessGuard::new(Some(self.lifeline().token().clone()))
    }
}

// === Shared ownership === //

impl<T: ?Sized> Guard for rc::Weak<T> {
    fn check(&self) -> bool {
        self.strong_count() > 0
    }
}

impl<T: ?Sized> Guard for sync::Weak<T> {
    fn check(&self) -> bool {
        self.strong_count() > 0
    }
}

impl<T: ?Sized> IntoGuard for rc::Weak<T> {
    type Guard = Self;

    fn into_guard(self) -> Self::Guard {
        self
    }
}

impl<T: ?Sized> IntoGuard for sync::Weak<T> {
    type Guard = Self;

    fn into_guard(self) -> Self::Guard {
        self
    }
}

impl<T: ?Sized> IntoGuard for &'_ Rc<T> {
    type Guard = rc::Weak<T>;

    fn into_guard(self) -> Self::Guard {
        Rc::downgrade(self)
    }
}

impl<T: ?Sized> IntoGuard for &'_ Arc<T> {
    type Guard = sync::Weak<T>;

    fn into_guard(self) -> Self::Guard {
        Arc::downgrade(self)
    }
}

// === Guarded === //

/// A callback paired with a guard. Calling it runs the callback only if the guard still passes.
pub struct Guarded<G, F> {
    guard: G,
    f: F,
}

impl<G: fmt::Debug, F> fmt::Debug for Guarded<G, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Guarded")
            .field("guard", &self.guard)
            .finish_non_exhaustive()
    }
}

/// Wraps `f` so that it only runs while `source`'s target is alive.
pub fn guard<S: IntoGuard, F>(source: S, f: F) -> Guarded<S::Guard, F> {
    Guarded {
        guard: source.into_guard(),
        f,
    }
}

impl<G: Guard, F> Guarded<G, F> {
    pub fn is_valid(&self) -> bool {
        self.guard.check()
    }

    /// Runs the callback if the guard passes. Otherwise, the callback is dropped and `None` is
    /// returned.
    pub fn call<R>(self) -> Option<R>
    where
        F: FnOnce() -> R,
    {
        self.guard.check().then(self.f)
    }

    pub fn call_with<A, R>(self, arg: A) -> Option<R>
    where
        F: FnOnce(A) -> R,
    {
        let Self { guard, f } = self;

        guard.check().then(|| f(arg))
    }

    pub fn call_mut<R>(&mut self) -> Option<R>
    where
        F: FnMut() -> R,
    {
        self.guard.check().then(|| (self.f)())
    }

    pub fn into_parts(self) -> (G, F) {
        (self.guard, self.f)
    }
}
