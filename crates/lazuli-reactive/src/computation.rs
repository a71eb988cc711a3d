//! Computations
//!
//! A computation is a re-invocable unit of work addressed by a
//! [`DeferredRef`]. Its code is a [`Render`] exported from a chunk; the
//! runtime only holds the reference and the captured inputs, and loads the
//! code when the computation actually has to run.

use std::fmt;
use std::rc::Rc;

use lazuli_loader::DeferredRef;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ComputationError;
use crate::ids::{ComputationId, ContainerId};
use crate::runtime::Runtime;
use crate::store::Store;

/// Lifecycle state of a computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComputationState {
	/// Up to date with everything it read.
	#[default]
	Clean,
	/// Invalidated and waiting for a flush.
	Dirty,
	/// Resolving its code or executing.
	Running,
	/// Its last run failed.
	Error,
}

impl ComputationState {
	pub fn is_clean(&self) -> bool {
		matches!(self, Self::Clean)
	}

	/// Whether an invalidation may move this state to [`Dirty`](Self::Dirty).
	pub(crate) fn accepts_invalidation(&self) -> bool {
		matches!(self, Self::Clean | Self::Error)
	}
}

type RenderFn = dyn Fn(&Scope) -> Result<Value, ComputationError>;

/// Code of a computation, as exported by a chunk.
///
/// # Examples
///
/// ```
/// use lazuli_loader::{Chunk, ChunkLocation};
/// use lazuli_reactive::Render;
///
/// let chunk = Chunk::builder(ChunkLocation::new("q-counter.js"))
///     .symbol(
///         "Counter_render",
///         Render::new(|scope| {
///             let store = scope.input_store("store")?;
///             Ok(serde_json::json!({ "text": store.get("count") }))
///         }),
///     )
///     .build();
/// assert!(chunk.contains("Counter_render"));
/// ```
#[derive(Clone)]
pub struct Render(Rc<RenderFn>);

impl Render {
	pub fn new<F>(f: F) -> Self
	where
		F: Fn(&Scope) -> Result<Value, ComputationError> + 'static,
	{
		Self(Rc::new(f))
	}

	pub(crate) fn call(&self, scope: &Scope) -> Result<Value, ComputationError> {
		(self.0)(scope)
	}
}

impl fmt::Debug for Render {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str("Render(..)")
	}
}

/// Parameters for [`Runtime::mount`].
#[derive(Debug, Clone)]
pub struct ComputationSpec {
	pub(crate) code: DeferredRef,
	pub(crate) id: Option<ComputationId>,
	pub(crate) inputs: Value,
	pub(crate) owner: Option<ContainerId>,
}

impl ComputationSpec {
	/// A computation running `code`, with no inputs and no owner.
	pub fn new(code: DeferredRef) -> Self {
		Self {
			code,
			id: None,
			inputs: Value::Null,
			owner: None,
		}
	}

	/// Uses a fixed id instead of a generated one.
	pub fn id(mut self, id: impl Into<ComputationId>) -> Self {
		self.id = Some(id.into());
		self
	}

	/// Captured inputs, handed to the code on every run and serialized with
	/// the graph.
	pub fn inputs(mut self, inputs: Value) -> Self {
		self.inputs = inputs;
		self
	}

	/// Ties the computation's lifetime to a container.
	pub fn owner(mut self, owner: impl Into<ContainerId>) -> Self {
		self.owner = Some(owner.into());
		self
	}
}

/// Bookkeeping for one registered computation.
#[derive(Debug, Clone)]
pub(crate) struct ComputationRecord {
	pub(crate) code: DeferredRef,
	pub(crate) inputs: Value,
	pub(crate) owner: Option<ContainerId>,
	pub(crate) state: ComputationState,
	pub(crate) last_output: Option<Value>,
	pub(crate) last_error: Option<ComputationError>,
}

impl ComputationRecord {
	pub(crate) fn new(
		code: DeferredRef,
		inputs: Value,
		owner: Option<ContainerId>,
		state: ComputationState,
	) -> Self {
		Self {
			code,
			inputs,
			owner,
			state,
			last_output: None,
			last_error: None,
		}
	}
}

/// What a computation sees while it runs.
pub struct Scope {
	runtime: Runtime,
	id: ComputationId,
	inputs: Value,
}

impl Scope {
	pub(crate) fn new(runtime: Runtime, id: ComputationId, inputs: Value) -> Self {
		Self {
			runtime,
			id,
			inputs,
		}
	}

	/// Id of the running computation.
	pub fn id(&self) -> &ComputationId {
		&self.id
	}

	/// All captured inputs.
	pub fn inputs(&self) -> &Value {
		&self.inputs
	}

	/// Deserializes the named input.
	pub fn input<T: DeserializeOwned>(&self, name: &str) -> Result<T, ComputationError> {
		let value = self
			.inputs
			.get(name)
			.ok_or_else(|| ComputationError::new(format!("missing input '{name}'")))?;
		Ok(T::deserialize(value)?)
	}

	/// Looks up a live store by id.
	pub fn store(&self, id: &ContainerId) -> Result<Store, ComputationError> {
		self.runtime
			.store(id)
			.ok_or_else(|| ComputationError::new(format!("unknown container: {id}")))
	}

	/// Looks up the store whose id is held in the named input.
	pub fn input_store(&self, name: &str) -> Result<Store, ComputationError> {
		let id: ContainerId = self.input(name)?;
		self.store(&id)
	}

	pub fn runtime(&self) -> &Runtime {
		&self.runtime
	}

	/// Runs another, already loaded computation synchronously.
	///
	/// Reads made by the child are attributed to the child, not to this one.
	pub fn run_child(&self, id: &ComputationId) -> Result<Value, ComputationError> {
		Ok(self.runtime.run_now(id)?)
	}
}

impl fmt::Debug for Scope {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Scope")
			.field("id", &self.id)
			.field("inputs", &self.inputs)
			.finish()
	}
}
