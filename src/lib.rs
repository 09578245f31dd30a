//! Weak handles and liveness guards for deferred callbacks.
//!
//! Callbacks are often scheduled against an object whose remaining lifetime is unknown: a timer
//! firing later, a reply arriving from another thread, a task queued for the next turn of the event
//! loop. `vigil` lets such callbacks check, right before they run, whether their target has been
//! destroyed in the meantime and skip themselves if so.
//!
//! ```
//! use vigil::{Tracked, TaskQueue, object};
//!
//! #[derive(Debug, Default)]
//! pub struct Counter {
//!     count: u32,
//! }
//!
//! object!(Counter);
//!
//! let queue = TaskQueue::new();
//! let counter = Tracked::new(Counter::default());
//! let weak = counter.weak();
//!
//! queue.post(&weak, || println!("still here!"));
//! assert_eq!(queue.run_pending().executed, 1);
//!
//! queue.post(&weak, || unreachable!());
//! drop(counter);
//! assert_eq!(queue.run_pending().skipped, 1);
//! ```
//!
//! # Lifelines
//!
//! Every trackable object has exactly one [`Lifeline`], which owns a small shared
//! [`LivenessToken`]. The token starts out alive and is flipped to dead, once and for all, at the
//! start of the object's destruction. [`WeakHandle`]s and guards reference the token rather than
//! the object, so asking whether the object is alive never touches freed memory.
//!
//! Most objects get their lifeline from the [`Tracked`] wrapper, which boxes the value and kills
//! the lifeline before dropping it. Types can also embed their own lifeline by implementing
//! [`SelfTracked`]. Such types are declared [`Intrusive`] and cannot additionally be wrapped in a
//! `Tracked`:
//!
//! ```compile_fail
//! use vigil::{Intrusive, Lifeline, SelfTracked, Tracked, object};
//!
//! pub struct Window {
//!     lifeline: Lifeline,
//! }
//!
//! object!(Window[Intrusive]);
//!
//! unsafe impl SelfTracked for Window {
//!     fn lifeline(&self) -> &Lifeline {
//!         &self.lifeline
//!     }
//! }
//!
//! let window = Tracked::new(Window { lifeline: Lifeline::new() });
//! ```
//!
//! Implementing `SelfTracked` is `unsafe`: the lifeline must be stored by value inside the object
//! and must be killed before any of the object's other fields are dropped. Declaring it as the
//! first field takes care of both.
//!
//! ```compile_fail
//! use vigil::{Intrusive, Lifeline, SelfTracked, object};
//!
//! pub struct Window {
//!     lifeline: Lifeline,
//! }
//!
//! object!(Window[Intrusive]);
//!
//! impl SelfTracked for Window {
//!     fn lifeline(&self) -> &Lifeline {
//!         &self.lifeline
//!     }
//! }
//! ```
//!
//! Handles to self-tracked objects are created from a pinned reference, which guarantees the
//! object will not move before it is dropped:
//!
//! ```
//! use vigil::{Intrusive, Lifeline, SelfTracked, WeakHandle, object};
//!
//! pub struct Window {
//!     lifeline: Lifeline,
//!     title: String,
//! }
//!
//! object!(Window[Intrusive]);
//!
//! unsafe impl SelfTracked for Window {
//!     fn lifeline(&self) -> &Lifeline {
//!         &self.lifeline
//!     }
//! }
//!
//! let window = Box::pin(Window {
//!     lifeline: Lifeline::new(),
//!     title: "main".to_string(),
//! });
//!
//! let weak = WeakHandle::from_pinned(window.as_ref());
//! assert!(weak.alive());
//!
//! drop(window);
//! assert!(!weak.alive());
//! ```
//!
//! # Upcasting
//!
//! Handles convert from a type to any of its bases declared with the [`upcast!`] macro, without
//! losing track of their target. There is no way back down.
//!
//! ```
//! use vigil::{Tracked, WeakHandle, object, upcast};
//!
//! pub trait Shape {
//!     fn area(&self) -> f32;
//! }
//!
//! pub struct Circle {
//!     radius: f32,
//! }
//!
//! impl Shape for Circle {
//!     fn area(&self) -> f32 {
//!         std::f32::consts::PI * self.radius * self.radius
//!     }
//! }
//!
//! object!(Circle);
//! upcast!(Circle => dyn Shape);
//!
//! let circle = Tracked::new(Circle { radius: 1.0 });
//! let shape: WeakHandle<dyn Shape> = circle.weak().upcast();
//!
//! assert!(shape.alive());
//! assert_eq!(shape, circle.weak());
//!
//! drop(circle);
//! assert!(!shape.alive());
//! ```
//!
//! ```compile_fail
//! use vigil::{Tracked, WeakHandle, object};
//!
//! pub struct Circle;
//! pub struct Square;
//!
//! object!(Circle);
//!
//! let circle = Tracked::new(Circle);
//! let square: WeakHandle<Square> = circle.weak().upcast();
//! ```
//!
//! # Guards
//!
//! Deferred-dispatch utilities do not need to know about handles. They accept anything which
//! implements [`IntoGuard`], turn it into a [`Guard`] with [`guard::create`] when scheduling and
//! call [`guard::check`] right before invoking the callback. [`TaskQueue`] is one such utility.
//!
//! # Threads
//!
//! Checking liveness is a single atomic load and may happen from any thread. However, a passing
//! check only says the target was alive at that instant. The discipline this crate is built for is
//! same-thread reentrancy: work queued on the thread owning an object and later run on that same
//! thread, possibly after the object destroyed itself. Callers racing destruction on another thread
//! need their own synchronization.

mod dispatch;
pub use self::dispatch::*;

pub mod guard;
pub use self::guard::{Guard, Guarded, IntoGuard, LivenessGuard};

mod handle;
pub use self::handle::*;

mod lifeline;
pub use self::lifeline::*;
