use std::{
    any::type_name,
    cmp::Ordering,
    fmt, hash, mem,
    pin::Pin,
    ptr::NonNull,
    rc::{self, Rc},
    sync::{self, Arc},
};

use derive_where::derive_where;

use crate::{Lifeline, LivenessGuard, LivenessToken, SelfTracked, Tracked};

// === Upcast === //

/// Conversion of a pointer to `Self` into a pointer to one of its "bases".
///
/// A base is either a trait object `Self` coerces to (e.g. `dyn Shape`) or a field `Self` embeds.
/// Every type is trivially its own base. Implement this with the [`upcast!`](crate::upcast) macro
/// rather than by hand.
///
/// ## Safety
///
/// `upcast_ptr` must not dereference `ptr`, which may dangle, and the returned pointer must address
/// memory living inside the allocation `ptr` points to, valid for as long as the `Self` value is.
///
pub unsafe trait Upcast<U: ?Sized> {
    fn upcast_ptr(ptr: NonNull<Self>) -> NonNull<U>;
}

unsafe impl<T: ?Sized> Upcast<T> for T {
    fn upcast_ptr(ptr: NonNull<Self>) -> NonNull<T> {
        ptr
    }
}

/// Declares that handles to one type may be converted into handles to another.
///
/// ```
/// use vigil::{object, upcast};
///
/// pub trait Shape {
///     fn area(&self) -> f32;
/// }
///
/// pub struct Square(f32);
///
/// impl Shape for Square {
///     fn area(&self) -> f32 {
///         self.0 * self.0
///     }
/// }
///
/// pub struct Labeled {
///     label: &'static str,
///     square: Square,
/// }
///
/// object!(Square, Labeled);
///
/// // Unsizing coercions...
/// upcast!(Square => dyn Shape);
///
/// // ...and embedded fields.
/// upcast!(Labeled.square => Square);
/// ```
#[macro_export]
macro_rules! upcast {
    ($derived:ident . $field:ident => $base:ty) => {
        unsafe impl $crate::Upcast<$base> for $derived {
            fn upcast_ptr(ptr: ::core::ptr::NonNull<Self>) -> ::core::ptr::NonNull<$base> {
                let _: fn(&$derived) -> &$base = |derived| &derived.$field;

                let field = ptr
                    .as_ptr()
                    .cast::<u8>()
                    .wrapping_add(::core::mem::offset_of!($derived, $field))
                    .cast::<$base>();

                // Safety: `ptr` is non-null and the offset stays inside its allocation.
                unsafe { ::core::ptr::NonNull::new_unchecked(field) }
            }
        }
    };
    ($derived:ty => $base:ty) => {
        unsafe impl $crate::Upcast<$base> for $derived {
            fn upcast_ptr(ptr: ::core::ptr::NonNull<Self>) -> ::core::ptr::NonNull<$base> {
                ptr
            }
        }
    };
}

// === Null === //

/// The null literal for [`WeakHandle`] comparisons.
///
/// `handle == Null` holds whenever `handle` does not reference a live object, regardless of
/// whether it was ever bound.
#[derive(Debug, Copy, Clone, Default, Hash, Eq, PartialEq)]
pub struct Null;

// === WeakHandle === //

/// A weak reference to a value of type `T` whose lifetime is tracked by a [`Lifeline`].
///
/// Handles never keep their target alive. They are either *null* (never bound to anything) or
/// *bound* to a [`LivenessToken`], in which case they report [`alive`](WeakHandle::alive) until the
/// target begins its destruction, and dead forever afterwards.
#[derive_where(Clone, Default)]
pub struct WeakHandle<T: ?Sized> {
    binding: Option<Binding<T>>,
}

#[derive_where(Clone)]
struct Binding<T: ?Sized> {
    token: Arc<LivenessToken>,
    ptr: NonNull<T>,
}

// Safety: a handle only ever hands out shared access to its target, and only through `unsafe`
// accessors, so it is as thread-safe as a `&T` would be.
unsafe impl<T: ?Sized + Sync> Send for WeakHandle<T> {}
unsafe impl<T: ?Sized + Sync> Sync for WeakHandle<T> {}

impl<T: ?Sized> WeakHandle<T> {
    pub const fn null() -> Self {
        Self { binding: None }
    }

    /// Binds a handle to `ptr`, tracked by `lifeline`.
    ///
    /// ## Safety
    ///
    /// `ptr` must point to a valid `T` for as long as `lifeline` is alive and the `T` must not be
    /// torn down before `lifeline` is killed.
    ///
    pub unsafe fn from_raw(lifeline: &Lifeline, ptr: NonNull<T>) -> Self {
        Self {
            binding: Some(Binding {
                token: lifeline.token().clone(),
                ptr,
            }),
        }
    }

    /// Binds a handle to an object which embeds its own [`Lifeline`].
    ///
    /// The pin guarantees the object will not move before it is dropped, and dropping it drops
    /// its lifeline.
    ///
    /// ## Panics
    ///
    /// Panics if the object's lifeline is not stored inside the object itself.
    ///
    pub fn from_pinned(target: Pin<&T>) -> Self
    where
        T: SelfTracked,
    {
        let target = target.get_ref();
        let lifeline = target.lifeline();

        let start = (target as *const T).cast::<u8>().addr();
        let end = start + mem::size_of_val(target);
        let at = (lifeline as *const Lifeline).addr();

        assert!(
            (start..end).contains(&at),
            "the lifeline of a `{}` must be stored inside the object",
            type_name::<T>(),
        );

        // Safety: the lifeline lives inside the object, making it `!Unpin`, so the pin guarantees
        // the address stays valid until the object is dropped. `SelfTracked` guarantees the
        // lifeline is killed before the object is torn down.
        unsafe { Self::from_raw(lifeline, NonNull::from(target)) }
    }

    /// Whether the handle was never bound to an object.
    pub fn is_null(&self) -> bool {
        self.binding.is_none()
    }

    /// Whether the handle is bound to an object that has not yet begun its destruction.
    pub fn alive(&self) -> bool {
        self.binding
            .as_ref()
            .is_some_and(|binding| binding.token.is_alive())
    }

    /// Fetches the target's address if it is still alive.
    ///
    /// The pointer is only guaranteed valid until the target is destroyed. On the thread owning
    /// the target, that means until control returns to code which could drop it.
    pub fn get(&self) -> Option<NonNull<T>> {
        self.binding
            .as_ref()
            .filter(|binding| binding.token.is_alive())
            .map(|binding| binding.ptr)
    }

    /// Borrows the target if it is still alive.
    ///
    /// ## Safety
    ///
    /// The target must not be destroyed or mutably borrowed for the duration of `'a`. This is
    /// typically only provable on the thread which owns the target.
    ///
    pub unsafe fn get_ref<'a>(&self) -> Option<&'a T> {
        // Safety: provided by caller
        self.get().map(|ptr| unsafe { ptr.as_ref() })
    }

    /// Converts this handle into a handle to one of `T`'s bases, preserving its identity.
    pub fn upcast<U: ?Sized>(self) -> WeakHandle<U>
    where
        T: Upcast<U>,
    {
        WeakHandle {
            binding: self.binding.map(|binding| Binding {
                token: binding.token,
                ptr: T::upcast_ptr(binding.ptr),
            }),
        }
    }

    /// Produces the type-erased identity of this handle's target.
    ///
    /// Identities of handles to the same object compare equal even when the handles' types differ.
    pub fn identity(&self) -> LivenessGuard {
        LivenessGuard::new(self.binding.as_ref().map(|binding| binding.token.clone()))
    }

    pub(crate) fn token(&self) -> Option<&Arc<LivenessToken>> {
        self.binding.as_ref().map(|binding| &binding.token)
    }

    pub(crate) fn into_token(self) -> Option<Arc<LivenessToken>> {
        self.binding.map(|binding| binding.token)
    }

    fn identity_addr(&self) -> usize {
        self.token().map_or(0, |token| Arc::as_ptr(token).addr())
    }

    /// Clears the handle.
    pub fn reset_null(&mut self) {
        self.binding = None;
    }
}

impl<T> WeakHandle<T> {
    /// Rebinds the handle to `target` or clears it if `target` is `None`.
    pub fn reset(&mut self, target: Option<&Tracked<T>>) {
        *self = Self::from(target);
    }
}

/// Creates a handle tracking `target`.
pub fn make_weak<T>(target: &Tracked<T>) -> WeakHandle<T> {
    WeakHandle::from(target)
}

impl<T> From<&Tracked<T>> for WeakHandle<T> {
    fn from(target: &Tracked<T>) -> Self {
        // Safety: `Tracked` kills its lifeline before releasing its value.
        unsafe { Self::from_raw(target.lifeline(), target.as_ptr()) }
    }
}

impl<T> From<Option<&Tracked<T>>> for WeakHandle<T> {
    fn from(target: Option<&Tracked<T>>) -> Self {
        target.map_or_else(Self::null, Self::from)
    }
}

impl<T> From<&Box<Tracked<T>>> for WeakHandle<T> {
    fn from(target: &Box<Tracked<T>>) -> Self {
        Self::from(&**target)
    }
}

impl<T> From<&Rc<Tracked<T>>> for WeakHandle<T> {
    fn from(target: &Rc<Tracked<T>>) -> Self {
        Self::from(&**target)
    }
}

impl<T> From<&Arc<Tracked<T>>> for WeakHandle<T> {
    fn from(target: &Arc<Tracked<T>>) -> Self {
        Self::from(&**target)
    }
}

impl<T> From<&rc::Weak<Tracked<T>>> for WeakHandle<T> {
    fn from(target: &rc::Weak<Tracked<T>>) -> Self {
        target
            .upgrade()
            .map_or_else(Self::null, |target| Self::from(&target))
    }
}

impl<T> From<&sync::Weak<Tracked<T>>> for WeakHandle<T> {
    fn from(target: &sync::Weak<Tracked<T>>) -> Self {
        target
            .upgrade()
            .map_or_else(Self::null, |target| Self::from(&target))
    }
}

impl<T: ?Sized> fmt::Debug for WeakHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &self.binding {
            None => "null",
            Some(binding) if binding.token.is_alive() => "alive",
            Some(_) => "dead",
        };

        write!(f, "WeakHandle<{}>({state})", type_name::<T>())
    }
}

impl<T: ?Sized, U: ?Sized> PartialEq<WeakHandle<U>> for WeakHandle<T> {
    fn eq(&self, other: &WeakHandle<U>) -> bool {
        self.identity_addr() == other.identity_addr()
    }
}

impl<T: ?Sized> Eq for WeakHandle<T> {}

impl<T: ?Sized> PartialEq<Null> for WeakHandle<T> {
    fn eq(&self, _other: &Null) -> bool {
        !self.alive()
    }
}

impl<T: ?Sized> PartialEq<WeakHandle<T>> for Null {
    fn eq(&self, other: &WeakHandle<T>) -> bool {
        other == self
    }
}

impl<T: ?Sized> hash::Hash for WeakHandle<T> {
    fn hash<H: hash::Hasher>(&self, state: &mut H) {
        self.identity_addr().hash(state);
    }
}

impl<T: ?Sized> PartialOrd for WeakHandle<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T: ?Sized> Ord for WeakHandle<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.identity_addr().cmp(&other.identity_addr())
    }
}
