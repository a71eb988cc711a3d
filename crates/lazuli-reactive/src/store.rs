//! Stores
//!
//! A [`Container`] is a plain mapping from property name to JSON value. Once
//! handed to a [`Runtime`], it lives behind a [`Store`]: the only way to reach
//! its properties afterwards. Every read through a store inside a running
//! computation records a subscription, and every write invalidates the
//! subscribers of the written key.
//!
//! ## Example
//!
//! ```
//! use std::rc::Rc;
//! use lazuli_loader::StaticFetcher;
//! use lazuli_reactive::{Container, Runtime};
//!
//! let runtime = Runtime::builder(Rc::new(StaticFetcher::new())).build();
//! let store = runtime.create_store(Container::new().with("count", 0));
//!
//! // Reads outside a computation are plain peeks.
//! assert_eq!(store.get("count"), Some(serde_json::json!(0)));
//!
//! store.set("count", 1).unwrap();
//! assert_eq!(store.get_as::<i64>("count").unwrap(), Some(1));
//! ```

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fmt;
use std::rc::{Rc, Weak};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ReactiveError, ReactiveResult};
use crate::ids::ContainerId;
use crate::runtime::{Runtime, RuntimeInner};

/// Plain property data, before it is wrapped in a [`Store`] or after it has
/// been snapshotted out of one.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Container {
	props: BTreeMap<String, Value>,
}

impl Container {
	/// Creates an empty container.
	pub fn new() -> Self {
		Self::default()
	}

	/// Creates a container from existing properties.
	pub fn from_props(props: BTreeMap<String, Value>) -> Self {
		Self { props }
	}

	/// Creates a container from any value that serializes to a JSON object.
	///
	/// # Errors
	///
	/// Returns [`ReactiveError::Serialization`] if `value` does not serialize
	/// to an object.
	pub fn from_serializable<T: Serialize>(value: &T) -> ReactiveResult<Self> {
		match serde_json::to_value(value)? {
			Value::Object(map) => Ok(Self {
				props: map.into_iter().collect(),
			}),
			other => Err(ReactiveError::Serialization(format!(
				"expected an object, found {other}"
			))),
		}
	}

	/// Builder-style property insert.
	pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
		self.insert(key, value);
		self
	}

	pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
		self.props.insert(key.into(), value.into())
	}

	pub fn get(&self, key: &str) -> Option<&Value> {
		self.props.get(key)
	}

	pub fn len(&self) -> usize {
		self.props.len()
	}

	pub fn is_empty(&self) -> bool {
		self.props.is_empty()
	}

	pub fn props(&self) -> &BTreeMap<String, Value> {
		&self.props
	}

	pub fn into_props(self) -> BTreeMap<String, Value> {
		self.props
	}
}

pub(crate) struct StoreInner {
	id: ContainerId,
	props: RefCell<BTreeMap<String, Value>>,
	runtime: Weak<RuntimeInner>,
	disposed: Cell<bool>,
}

impl StoreInner {
	pub(crate) fn is_disposed(&self) -> bool {
		self.disposed.get()
	}

	pub(crate) fn mark_disposed(&self) {
		self.disposed.set(true);
	}

	pub(crate) fn snapshot(&self) -> Container {
		Container::from_props(self.props.borrow().clone())
	}
}

/// Handle to a container registered with a [`Runtime`].
///
/// Cloning a store is cheap; clones share the same properties. The runtime
/// only holds a weak reference, so a container becomes unreachable once the
/// last handle is dropped, and the computations it owns are purged on the
/// next flush or [`Runtime::collect_garbage`].
#[derive(Clone)]
pub struct Store {
	inner: Rc<StoreInner>,
}

impl Store {
	pub(crate) fn new(id: ContainerId, container: Container, runtime: Weak<RuntimeInner>) -> Self {
		Self {
			inner: Rc::new(StoreInner {
				id,
				props: RefCell::new(container.into_props()),
				runtime,
				disposed: Cell::new(false),
			}),
		}
	}

	pub(crate) fn from_inner(inner: Rc<StoreInner>) -> Self {
		Self { inner }
	}

	pub(crate) fn downgrade(&self) -> Weak<StoreInner> {
		Rc::downgrade(&self.inner)
	}

	pub fn id(&self) -> &ContainerId {
		&self.inner.id
	}

	/// Returns the runtime this store belongs to, if it is still alive.
	pub fn runtime(&self) -> Option<Runtime> {
		self.inner.runtime.upgrade().map(Runtime::from_inner)
	}

	/// Reads a property, subscribing the running computation to it.
	///
	/// Reading a missing key subscribes too, so a later write that creates
	/// the key re-runs the reader.
	pub fn get(&self, key: &str) -> Option<Value> {
		self.track(key);
		self.inner.props.borrow().get(key).cloned()
	}

	/// Reads a property by reference, subscribing the running computation.
	///
	/// # Panics
	///
	/// Panics if `f` writes to this same store.
	pub fn with_value<R>(&self, key: &str, f: impl FnOnce(Option<&Value>) -> R) -> R {
		self.track(key);
		f(self.inner.props.borrow().get(key))
	}

	/// Reads and deserializes a property, subscribing the running computation.
	///
	/// # Errors
	///
	/// Returns [`ReactiveError::Serialization`] if the value is not a `T`.
	pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> ReactiveResult<Option<T>> {
		self.get(key)
			.map(serde_json::from_value)
			.transpose()
			.map_err(Into::into)
	}

	/// Returns `true` if the key is present, subscribing the running computation.
	pub fn contains_key(&self, key: &str) -> bool {
		self.track(key);
		self.inner.props.borrow().contains_key(key)
	}

	/// Reads a property without subscribing, even inside a computation.
	pub fn peek(&self, key: &str) -> Option<Value> {
		self.inner.props.borrow().get(key).cloned()
	}

	/// Serializes and writes a property.
	///
	/// # Errors
	///
	/// Returns [`ReactiveError::Serialization`] if `value` cannot be
	/// serialized. Nothing is written in that case.
	pub fn set<T: Serialize>(&self, key: &str, value: T) -> ReactiveResult<()> {
		let value = serde_json::to_value(value)?;
		self.set_value(key, value);
		Ok(())
	}

	/// Writes a property and invalidates its subscribers.
	///
	/// Subscribers are invalidated even when the new value equals the old one.
	pub fn set_value(&self, key: &str, value: impl Into<Value>) {
		self.inner
			.props
			.borrow_mut()
			.insert(key.to_string(), value.into());
		self.notify(key);
	}

	/// Mutates a property in place. A missing key starts out as `null`.
	pub fn update(&self, key: &str, f: impl FnOnce(&mut Value)) {
		{
			let mut props = self.inner.props.borrow_mut();
			f(props.entry(key.to_string()).or_insert(Value::Null));
		}
		self.notify(key);
	}

	/// Removes a property and invalidates its subscribers.
	pub fn remove(&self, key: &str) -> Option<Value> {
		let removed = self.inner.props.borrow_mut().remove(key);
		self.notify(key);
		removed
	}

	/// Property names, without subscribing.
	pub fn keys(&self) -> Vec<String> {
		self.inner.props.borrow().keys().cloned().collect()
	}

	/// Copies the current properties out, without subscribing.
	pub fn snapshot(&self) -> Container {
		self.inner.snapshot()
	}

	/// Detaches the container from its runtime.
	///
	/// Its subscriptions and the computations it owns are removed right away.
	/// The handle keeps working as a plain, untracked container.
	pub fn dispose(&self) {
		if self.inner.is_disposed() {
			return;
		}
		if let Some(runtime) = self.runtime() {
			runtime.release_container(&self.inner.id);
		}
		self.inner.mark_disposed();
	}

	pub fn is_disposed(&self) -> bool {
		self.inner.is_disposed()
	}

	fn track(&self, key: &str) {
		if self.inner.is_disposed() {
			return;
		}
		if let Some(runtime) = self.runtime() {
			runtime.track_read(&self.inner.id, key);
		}
	}

	fn notify(&self, key: &str) {
		if self.inner.is_disposed() {
			return;
		}
		if let Some(runtime) = self.runtime() {
			runtime.notify_write(&self.inner.id, key);
		}
	}
}

impl fmt::Debug for Store {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Store")
			.field("id", &self.inner.id)
			.field("props", &self.inner.props.borrow())
			.field("disposed", &self.inner.is_disposed())
			.finish()
	}
}
