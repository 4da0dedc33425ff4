//! Settle-once values that components can suspend on.
//!
//! A [`Thenable`] starts pending and is fulfilled or rejected exactly once,
//! usually from another thread or an async task. Reading a pending thenable
//! from a component suspends the component; the renderer subscribes a ping
//! that re-queues the task when the value settles.

use crate::error::RenderError;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

type Listener = Box<dyn FnOnce() + Send>;

/// Settlement state of a [`Thenable`].
#[derive(Debug, Clone, PartialEq)]
pub enum ThenableStatus<T> {
	/// Not settled yet.
	Pending,
	/// Settled with a value.
	Fulfilled(T),
	/// Settled with an error.
	Rejected(RenderError),
}

struct Inner<T> {
	status: ThenableStatus<T>,
	listeners: Vec<Listener>,
}

/// A shared, settle-once value.
///
/// Cloning is cheap and every clone observes the same settlement.
///
/// # Examples
///
/// ```
/// use reinhardt_ssr_renderer::thenable::Thenable;
///
/// let user = Thenable::<String>::pending();
/// assert!(user.is_pending());
/// assert!(user.resolve("ferris".to_string()));
/// assert!(!user.resolve("again".to_string()));
/// assert_eq!(user.get(), Some(Ok("ferris".to_string())));
/// ```
pub struct Thenable<T> {
	inner: Arc<Mutex<Inner<T>>>,
}

impl<T> Clone for Thenable<T> {
	fn clone(&self) -> Self {
		Self {
			inner: Arc::clone(&self.inner),
		}
	}
}

impl<T: Send + 'static> Thenable<T> {
	fn with_status(status: ThenableStatus<T>) -> Self {
		Self {
			inner: Arc::new(Mutex::new(Inner {
				status,
				listeners: Vec::new(),
			})),
		}
	}

	/// Creates an unsettled thenable.
	pub fn pending() -> Self {
		Self::with_status(ThenableStatus::Pending)
	}

	/// Creates an already fulfilled thenable.
	pub fn resolved(value: T) -> Self {
		Self::with_status(ThenableStatus::Fulfilled(value))
	}

	/// Creates an already rejected thenable.
	pub fn rejected(error: RenderError) -> Self {
		Self::with_status(ThenableStatus::Rejected(error))
	}

	/// Fulfills the thenable. Returns `false` if it was already settled.
	pub fn resolve(&self, value: T) -> bool {
		self.settle(ThenableStatus::Fulfilled(value))
	}

	/// Rejects the thenable. Returns `false` if it was already settled.
	pub fn reject(&self, error: RenderError) -> bool {
		self.settle(ThenableStatus::Rejected(error))
	}

	fn settle(&self, status: ThenableStatus<T>) -> bool {
		let listeners = {
			let mut inner = self.inner.lock();
			if !matches!(inner.status, ThenableStatus::Pending) {
				return false;
			}
			inner.status = status;
			std::mem::take(&mut inner.listeners)
		};
		// Listeners run outside the lock so they may read the value.
		for listener in listeners {
			listener();
		}
		true
	}

	/// Returns `true` until the thenable settles.
	pub fn is_pending(&self) -> bool {
		matches!(self.inner.lock().status, ThenableStatus::Pending)
	}

	/// Type-erased handle used to subscribe to settlement.
	pub fn wakeable(&self) -> Wakeable {
		Wakeable(self.inner.clone())
	}
}

impl<T: Clone + Send + 'static> Thenable<T> {
	/// Snapshot of the current state.
	pub fn status(&self) -> ThenableStatus<T> {
		self.inner.lock().status.clone()
	}

	/// The settled result, or `None` while pending.
	pub fn get(&self) -> Option<Result<T, RenderError>> {
		match &self.inner.lock().status {
			ThenableStatus::Pending => None,
			ThenableStatus::Fulfilled(v) => Some(Ok(v.clone())),
			ThenableStatus::Rejected(e) => Some(Err(e.clone())),
		}
	}
}

impl<T> fmt::Debug for Thenable<T> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let state = match self.inner.lock().status {
			ThenableStatus::Pending => "pending",
			ThenableStatus::Fulfilled(_) => "fulfilled",
			ThenableStatus::Rejected(_) => "rejected",
		};
		f.debug_struct("Thenable").field("status", &state).finish()
	}
}

trait Subscribe: Send + Sync {
	fn subscribe(&self, listener: Listener);
}

impl<T: Send> Subscribe for Mutex<Inner<T>> {
	fn subscribe(&self, listener: Listener) {
		let mut inner = self.lock();
		if matches!(inner.status, ThenableStatus::Pending) {
			inner.listeners.push(listener);
		} else {
			drop(inner);
			listener();
		}
	}
}

/// Something a suspended task waits on.
///
/// The listener passed to [`Wakeable::subscribe`] runs once, on the thread
/// that settles the value, or immediately if it already settled.
#[derive(Clone)]
pub struct Wakeable(Arc<dyn Subscribe>);

impl Wakeable {
	/// Registers `listener` to run on settlement.
	pub fn subscribe(&self, listener: impl FnOnce() + Send + 'static) {
		self.0.subscribe(Box::new(listener));
	}
}

impl fmt::Debug for Wakeable {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str("Wakeable")
	}
}
