use std::{
    fmt,
    marker::PhantomPinned,
    mem::ManuallyDrop,
    ops::{Deref, DerefMut},
    ptr::{self, NonNull},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering::*},
    },
};

use crate::WeakHandle;

// === LivenessToken === //

/// The flag cell shared between a [`Lifeline`] and every handle or guard pointing at its object.
///
/// A token starts out alive and is flipped to dead exactly once, by its owning `Lifeline`. There is
/// no way to flip it back.
pub struct LivenessToken {
    alive: AtomicBool,
}

impl fmt::Debug for LivenessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LivenessToken")
            .field("alive", &self.is_alive())
            .finish()
    }
}

impl LivenessToken {
    fn new() -> Self {
        Self {
            alive: AtomicBool::new(true),
        }
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Acquire)
    }
}

// === Lifeline === //

/// The owning side of a [`LivenessToken`].
///
/// Exactly one `Lifeline` exists per token. Dropping it, or calling [`Lifeline::kill`], marks the
/// token dead for every handle and guard referencing it.
///
/// A `Lifeline` is `!Unpin`. Structures embedding one are therefore `!Unpin` themselves, which is
/// what lets [`WeakHandle::from_pinned`] rely on the object staying put until it is dropped.
pub struct Lifeline {
    token: Arc<LivenessToken>,
    _pinned: PhantomPinned,
}

impl fmt::Debug for Lifeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Lifeline").field(&self.is_alive()).finish()
    }
}

impl Default for Lifeline {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifeline {
    pub fn new() -> Self {
        Self {
            token: Arc::new(LivenessToken::new()),
            _pinned: PhantomPinned,
        }
    }

    pub fn is_alive(&self) -> bool {
        self.token.is_alive()
    }

    /// Marks the token dead.
    ///
    /// [`SelfTracked`] objects whose lifeline is not their first field must call this first thing
    /// in their destructor so that no handle observes the object mid-teardown. Calling it more than
    /// once is harmless.
    pub fn kill(&self) {
        self.token.alive.store(false, Release);
    }

    pub fn token(&self) -> &Arc<LivenessToken> {
        &self.token
    }
}

impl Drop for Lifeline {
    fn drop(&mut self) {
        self.kill();
    }
}

// === Object === //

mod sealed {
    pub trait Sealed {}
}

/// How an [`Object`] keeps track of its own liveness. Either [`External`] or [`Intrusive`].
pub trait Tracking: sealed::Sealed {}

/// The object is tracked from the outside by a [`Tracked`] wrapper.
pub enum External {}

/// The object embeds its own [`Lifeline`] and implements [`SelfTracked`].
pub enum Intrusive {}

impl sealed::Sealed for External {}
impl sealed::Sealed for Intrusive {}

impl Tracking for External {}
impl Tracking for Intrusive {}

/// A type which weak handles may point to.
///
/// Implement this with the [`object!`](crate::object) macro. Types whose `Tracking` is
/// [`Intrusive`] cannot be wrapped in a [`Tracked`] since they already carry a lifeline.
pub trait Object {
    type Tracking: Tracking;
}

/// An [`Object`] which owns its own [`Lifeline`].
///
/// ## Safety
///
/// `lifeline` must return a `Lifeline` stored by value inside `self`, not behind a pointer and not
/// shared with any other object. This is what makes the type `!Unpin` and ties the lifeline's
/// address to the object's.
///
/// The lifeline must be killed before any other part of the object is torn down. Either declare
/// the lifeline as the first field, so it is dropped before its siblings, or call
/// [`Lifeline::kill`] first thing in the type's `Drop` implementation.
///
pub unsafe trait SelfTracked: Object<Tracking = Intrusive> {
    fn lifeline(&self) -> &Lifeline;
}

#[doc(hidden)]
pub mod object_internals {
    pub use crate::{External, Object};

    pub type TrackingOrDefault<Kind = External> = Kind;
}

#[macro_export]
macro_rules! object {
    ( $( $ty:ident $([$kind:ty])? ),*$(,)? ) => {$(
        impl $crate::object_internals::Object for $ty {
            type Tracking = $crate::object_internals::TrackingOrDefault<$($kind)?>;
        }
    )*};
}

// === Tracked === //

/// An owning, heap-allocated box which gives its value an identity that [`WeakHandle`]s can track.
///
/// The value's lifeline is killed before the value itself is dropped.
pub struct Tracked<T> {
    lifeline: Lifeline,
    value: NonNull<T>,
}

// Safety: `Tracked` owns its value exactly like a `Box` does.
unsafe impl<T: Send> Send for Tracked<T> {}
unsafe impl<T: Sync> Sync for Tracked<T> {}

impl<T: fmt::Debug> fmt::Debug for Tracked<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Tracked").field(&**self).finish()
    }
}

impl<T: Default + Object<Tracking = External>> Default for Tracked<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: Object<Tracking = External>> Tracked<T> {
    pub fn new(value: T) -> Self {
        Self {
            lifeline: Lifeline::new(),
            value: NonNull::from(Box::leak(Box::new(value))),
        }
    }
}

impl<T> Tracked<T> {
    pub fn weak(&self) -> WeakHandle<T> {
        WeakHandle::from(self)
    }

    pub fn lifeline(&self) -> &Lifeline {
        &self.lifeline
    }

    /// The address handles to this value resolve to.
    pub fn as_ptr(&self) -> NonNull<T> {
        self.value
    }

    /// Ends the tracked identity and moves the value out. Every handle to it observes it as dead.
    pub fn into_inner(me: Self) -> T {
        let me = ManuallyDrop::new(me);
        me.lifeline.kill();

        // Safety: `me` is never dropped so both the lifeline and the box are read out exactly once.
        let lifeline = unsafe { ptr::read(&me.lifeline) };
        let value = unsafe { Box::from_raw(me.value.as_ptr()) };
        drop(lifeline);

        *value
    }
}

impl<T> Deref for Tracked<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        // Safety: `value` comes from a leaked `Box` which we release only on drop.
        unsafe { self.value.as_ref() }
    }
}

impl<T> DerefMut for Tracked<T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        // Safety: see `deref`. The borrow of `self` makes this reference unique within safe code.
        unsafe { self.value.as_mut() }
    }
}

impl<T> Drop for Tracked<T> {
    fn drop(&mut self) {
        self.lifeline.kill();

        // Safety: `value` came from `Box::leak` and is released exactly once, here.
        drop(unsafe { Box::from_raw(self.value.as_ptr()) });
    }
}
