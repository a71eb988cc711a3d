//! Shared harness for lazuli-reactive integration tests.
//!
//! Every test runtime loads its code from a single static chunk, `q-app.js`,
//! whose renders append their computation id to a shared run log.

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use lazuli_loader::{Chunk, ChunkFetcher, ChunkLocation, DeferredRef, StaticFetcher, async_trait};
use lazuli_reactive::{
	ComputationDescriptor, ComputationError, ComputationId, ComputationSpec, ComputationState,
	Container, ContainerDescriptor, ContainerId, ManualScheduler, Render, RenderSink, Runtime,
	RuntimeConfig, Scheduler, SerializedGraph, Subscription,
};
use serde_json::{Map, Value, json};
use tokio::sync::Notify;

pub const APP_CHUNK: &str = "q-app.js";
pub const BROKEN_CHUNK: &str = "q-broken.js";
pub const GATED_CHUNK: &str = "q-gated.js";

pub type RunLog = Rc<RefCell<Vec<String>>>;

/// Builds the application chunk.
///
/// Symbols:
/// - `read_keys`: reads every key in input `keys` from input `store`; fails
///   when a read value equals input `fail_when`.
/// - `read_dynamic`: reads the list stored under `keys`, then each listed key.
/// - `increment`: reads `count` and writes `count + 1` to the same store.
/// - `copy`: reads input `from` and writes the value to input `to`.
/// - `parent`: reads `a`, then runs input `child` synchronously.
/// - `peeker`: peeks `hidden`, reads `shown`, reads `untracked` untracked.
pub fn app_chunk(location: &ChunkLocation, runs: &RunLog) -> Chunk {
	let log = |runs: &RunLog, scope: &lazuli_reactive::Scope| {
		runs.borrow_mut().push(scope.id().to_string());
	};

	let read_keys = {
		let runs = Rc::clone(runs);
		Render::new(move |scope| {
			log(&runs, scope);
			let store = scope.input_store("store")?;
			let keys: Vec<String> = scope.input("keys")?;
			let fail_when = scope.inputs().get("fail_when").cloned();
			let mut output = Map::new();
			for key in keys {
				let value = store.get(&key).unwrap_or(Value::Null);
				if fail_when.as_ref() == Some(&value) {
					return Err(ComputationError::new(format!("{key} reached {value}")));
				}
				output.insert(key, value);
			}
			Ok(Value::Object(output))
		})
	};

	let read_dynamic = {
		let runs = Rc::clone(runs);
		Render::new(move |scope| {
			log(&runs, scope);
			let store = scope.input_store("store")?;
			let keys: Vec<String> = store.get_as("keys")?.unwrap_or_default();
			let values: Vec<Value> = keys
				.iter()
				.map(|key| store.get(key).unwrap_or(Value::Null))
				.collect();
			Ok(Value::Array(values))
		})
	};

	let increment = {
		let runs = Rc::clone(runs);
		Render::new(move |scope| {
			log(&runs, scope);
			let store = scope.input_store("store")?;
			let count: i64 = store.get_as("count")?.unwrap_or(0);
			store.set("count", count + 1)?;
			Ok(json!(count + 1))
		})
	};

	let copy = {
		let runs = Rc::clone(runs);
		Render::new(move |scope| {
			log(&runs, scope);
			let store = scope.input_store("store")?;
			let from: String = scope.input("from")?;
			let to: String = scope.input("to")?;
			let value = store.get(&from).unwrap_or(Value::Null);
			store.set_value(&to, value.clone());
			Ok(value)
		})
	};

	let parent = {
		let runs = Rc::clone(runs);
		Render::new(move |scope| {
			log(&runs, scope);
			let store = scope.input_store("store")?;
			let a = store.get("a");
			let child: ComputationId = scope.input("child")?;
			let child_output = scope.run_child(&child)?;
			Ok(json!({ "a": a, "child": child_output }))
		})
	};

	let peeker = {
		let runs = Rc::clone(runs);
		Render::new(move |scope| {
			log(&runs, scope);
			let store = scope.input_store("store")?;
			let hidden = store.peek("hidden");
			let shown = store.get("shown");
			let untracked = scope.runtime().untrack(|| store.get("untracked"));
			Ok(json!([hidden, shown, untracked]))
		})
	};

	Chunk::builder(location.clone())
		.symbol("read_keys", read_keys)
		.symbol("read_dynamic", read_dynamic)
		.symbol("increment", increment)
		.symbol("copy", copy)
		.symbol("parent", parent)
		.symbol("peeker", peeker)
		.build()
}

/// A fetcher serving the application chunk and a chunk that always fails.
pub fn app_fetcher(runs: &RunLog) -> Rc<StaticFetcher> {
	let runs = Rc::clone(runs);
	Rc::new(
		StaticFetcher::new()
			.with_chunk(APP_CHUNK, move |location| Ok(app_chunk(location, &runs)))
			.with_chunk(BROKEN_CHUNK, |location| {
				anyhow::bail!("top-level evaluation of {location} threw")
			}),
	)
}

/// Fetcher serving the application chunk once [`GatedFetcher::release`] is
/// called, so a flush can be held in the middle of a code load.
pub struct GatedFetcher {
	gate: Notify,
	fetches: Cell<usize>,
	pub runs: RunLog,
}

impl GatedFetcher {
	pub fn new() -> Self {
		Self {
			gate: Notify::new(),
			fetches: Cell::new(0),
			runs: Rc::new(RefCell::new(Vec::new())),
		}
	}

	pub fn release(&self) {
		self.gate.notify_waiters();
	}

	pub fn fetches(&self) -> usize {
		self.fetches.get()
	}

	/// Runtime that loads its code through `fetcher`.
	pub fn runtime(fetcher: &Rc<Self>) -> Runtime {
		Runtime::builder(fetcher.clone())
			.scheduler(Rc::new(ManualScheduler::new()) as Rc<dyn Scheduler>)
			.build()
	}
}

#[async_trait(?Send)]
impl ChunkFetcher for GatedFetcher {
	async fn fetch(&self, location: &ChunkLocation) -> anyhow::Result<Chunk> {
		self.fetches.set(self.fetches.get() + 1);
		self.gate.notified().await;
		Ok(app_chunk(location, &self.runs))
	}
}

/// A dirty `read_keys` computation `c0` on `s0.count`, served from
/// [`GATED_CHUNK`], optionally owned by the empty container `s1`.
pub fn gated_graph(owned: bool) -> SerializedGraph {
	let mut containers = vec![ContainerDescriptor {
		id: ContainerId::new("s0"),
		props: Container::new().with("count", 0),
	}];
	if owned {
		containers.push(ContainerDescriptor {
			id: ContainerId::new("s1"),
			props: Container::new(),
		});
	}
	SerializedGraph {
		containers,
		subscriptions: vec![Subscription {
			container: ContainerId::new("s0"),
			key: "count".to_string(),
			computation: ComputationId::new("c0"),
		}],
		computations: vec![ComputationDescriptor {
			id: ComputationId::new("c0"),
			chunk: ChunkLocation::new(GATED_CHUNK),
			symbol: "read_keys".to_string(),
			inputs: json!({ "store": "s0", "keys": ["count"] }),
			owner: owned.then(|| ContainerId::new("s1")),
			state: ComputationState::Dirty,
		}],
	}
}

/// Reference to a symbol of the application chunk.
pub fn app_ref(symbol: &str) -> DeferredRef {
	DeferredRef::new(APP_CHUNK, symbol)
}

/// Runtime wired to a manual scheduler and the application chunk.
pub struct Harness {
	pub runtime: Runtime,
	pub scheduler: Rc<ManualScheduler>,
	pub fetcher: Rc<StaticFetcher>,
	pub runs: RunLog,
}

impl Harness {
	pub fn new(config: RuntimeConfig) -> Self {
		Self::with_sink(config, None)
	}

	pub fn with_sink(config: RuntimeConfig, sink: Option<Rc<dyn RenderSink>>) -> Self {
		let runs: RunLog = Rc::new(RefCell::new(Vec::new()));
		let fetcher = app_fetcher(&runs);
		let scheduler = Rc::new(ManualScheduler::new());
		let mut builder = Runtime::builder(fetcher.clone())
			.config(config)
			.scheduler(scheduler.clone() as Rc<dyn Scheduler>);
		if let Some(sink) = sink {
			builder = builder.sink(sink);
		}
		Self {
			runtime: builder.build(),
			scheduler,
			fetcher,
			runs,
		}
	}

	/// Mounts `symbol` from the application chunk.
	pub async fn mount(&self, symbol: &str, inputs: Value) -> ComputationId {
		self.runtime
			.mount(ComputationSpec::new(app_ref(symbol)).inputs(inputs))
			.await
			.unwrap_or_else(|err| panic!("mounting {symbol} failed: {err}"))
	}

	/// Number of times `id` has run.
	pub fn runs_of(&self, id: &ComputationId) -> usize {
		self.runs
			.borrow()
			.iter()
			.filter(|run| run.as_str() == id.as_str())
			.count()
	}

	/// Forgets every recorded run.
	pub fn reset_runs(&self) {
		self.runs.borrow_mut().clear();
	}

	/// Chunk evaluations so far.
	pub fn app_evaluations(&self) -> usize {
		self.fetcher.evaluations(&ChunkLocation::new(APP_CHUNK))
	}
}
