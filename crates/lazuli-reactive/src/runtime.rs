//! Reactive Runtime
//!
//! The runtime ties the pieces together: it owns the subscription graph, the
//! invalidation queue, the computation table and the chunk loader, and it is
//! the only thing stores talk to when they are read or written.
//!
//! ## Architecture
//!
//! 1. **Observer stack**: the innermost running computation receives every
//!    subscription recorded by a store read. Nested runs push and pop, so reads
//!    are always attributed to the innermost computation.
//! 2. **Invalidation**: a write looks up the subscribers of the written key and
//!    marks them dirty. Dirty ids wait in an insertion-ordered set.
//! 3. **Coalesced flush**: the first invalidation after a flush hands one task
//!    to the injected [`Scheduler`]. Further writes before that task runs only
//!    grow the queue.
//! 4. **Lazy execution**: a flush resolves each dirty computation's code
//!    through the [`ChunkLoader`], clears its old subscriptions and runs it.
//!    Failures are reported per computation to the [`RenderSink`].
//!
//! The runtime is single-threaded. [`Runtime`] is a cheap handle; clones share
//! the same state.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::rc::{Rc, Weak};

use futures::FutureExt;
use lazuli_loader::{ChunkFetcher, ChunkLoader, DeferredRef};
use serde_json::Value;
use tracing::Instrument;

use crate::computation::{ComputationRecord, ComputationSpec, ComputationState, Render, Scope};
use crate::config::RuntimeConfig;
use crate::error::{ComputationError, ReactiveError, ReactiveResult};
use crate::graph::{PropertyKey, SubscriptionGraph};
use crate::ids::{ComputationId, ContainerId, IdGenerator};
use crate::queue::InvalidationQueue;
use crate::scheduler::{ManualScheduler, Scheduler};
use crate::sink::{LogSink, RenderSink};
use crate::store::{Container, Store, StoreInner};

/// Entry of the observer stack.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Observer {
	/// Reads are recorded against this computation.
	Computation(ComputationId),
	/// Reads are not recorded.
	Untracked,
}

/// Pops the observer it pushed when dropped, so a panicking computation does
/// not leave a stale entry behind.
struct ObserverGuard<'a> {
	inner: &'a RuntimeInner,
}

impl<'a> ObserverGuard<'a> {
	fn push(inner: &'a RuntimeInner, observer: Observer) -> Self {
		inner.observers.borrow_mut().push(observer);
		Self { inner }
	}
}

impl Drop for ObserverGuard<'_> {
	fn drop(&mut self) {
		self.inner.observers.borrow_mut().pop();
	}
}

pub(crate) struct RuntimeInner {
	pub(crate) config: RuntimeConfig,
	pub(crate) loader: ChunkLoader,
	scheduler: Rc<dyn Scheduler>,
	sink: Rc<dyn RenderSink>,
	observers: RefCell<Vec<Observer>>,
	pub(crate) graph: RefCell<SubscriptionGraph>,
	pub(crate) computations: RefCell<BTreeMap<ComputationId, ComputationRecord>>,
	pub(crate) containers: RefCell<BTreeMap<ContainerId, Weak<StoreInner>>>,
	pub(crate) queue: RefCell<InvalidationQueue>,
	flush_scheduled: Cell<bool>,
	flush_depth: Cell<usize>,
	chained_flushes: Cell<usize>,
	flush_passes: Cell<u64>,
	batch_depth: Cell<usize>,
	batch_pending: Cell<bool>,
	container_ids: IdGenerator,
	computation_ids: IdGenerator,
}

/// Builder for [`Runtime`].
pub struct RuntimeBuilder {
	fetcher: Rc<dyn ChunkFetcher>,
	config: RuntimeConfig,
	scheduler: Option<Rc<dyn Scheduler>>,
	sink: Option<Rc<dyn RenderSink>>,
}

impl RuntimeBuilder {
	pub fn config(mut self, config: RuntimeConfig) -> Self {
		self.config = config;
		self
	}

	/// Sets the scheduling primitive. Defaults to a private
	/// [`ManualScheduler`] that is never ticked, leaving the host to call
	/// [`Runtime::flush`] itself.
	pub fn scheduler(mut self, scheduler: Rc<dyn Scheduler>) -> Self {
		self.scheduler = Some(scheduler);
		self
	}

	/// Sets the render sink. Defaults to [`LogSink`].
	pub fn sink(mut self, sink: Rc<dyn RenderSink>) -> Self {
		self.sink = Some(sink);
		self
	}

	pub fn build(self) -> Runtime {
		let container_ids = IdGenerator::new(self.config.container_id_prefix());
		let computation_ids = IdGenerator::new(self.config.computation_id_prefix());
		Runtime {
			inner: Rc::new(RuntimeInner {
				config: self.config,
				loader: ChunkLoader::new(self.fetcher),
				scheduler: self
					.scheduler
					.unwrap_or_else(|| Rc::new(ManualScheduler::new())),
				sink: self.sink.unwrap_or_else(|| Rc::new(LogSink)),
				observers: RefCell::new(Vec::new()),
				graph: RefCell::new(SubscriptionGraph::new()),
				computations: RefCell::new(BTreeMap::new()),
				containers: RefCell::new(BTreeMap::new()),
				queue: RefCell::new(InvalidationQueue::new()),
				flush_scheduled: Cell::new(false),
				flush_depth: Cell::new(0),
				chained_flushes: Cell::new(0),
				flush_passes: Cell::new(0),
				batch_depth: Cell::new(0),
				batch_pending: Cell::new(false),
				container_ids,
				computation_ids,
			}),
		}
	}
}

/// Outcome of one flush, in queue order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlushReport {
	/// Queued computations that re-ran successfully, including those a parent
	/// already re-ran through [`Scope::run_child`] earlier in the flush.
	pub ran: Vec<ComputationId>,
	/// Queued computations whose code failed to load or whose run failed.
	pub failed: Vec<(ComputationId, ComputationError)>,
	/// Queued computations that did not run: disposed, owned by an
	/// unreachable container, or mid-run in another task.
	pub skipped: Vec<ComputationId>,
}

impl FlushReport {
	/// Returns `true` if nothing was queued.
	pub fn is_empty(&self) -> bool {
		self.ran.is_empty() && self.failed.is_empty() && self.skipped.is_empty()
	}

	pub fn failed_ids(&self) -> Vec<ComputationId> {
		self.failed.iter().map(|(id, _)| id.clone()).collect()
	}
}

/// What a flush found for a queued id.
enum Claim {
	/// The computation is ours to run.
	Run(DeferredRef),
	/// The computation already ran after it was queued.
	Settled(Result<(), ComputationError>),
	/// Nothing to run.
	Skip,
}

/// Handle to a reactive runtime.
#[derive(Clone)]
pub struct Runtime {
	pub(crate) inner: Rc<RuntimeInner>,
}

impl Runtime {
	/// Starts building a runtime that loads code through `fetcher`.
	pub fn builder(fetcher: Rc<dyn ChunkFetcher>) -> RuntimeBuilder {
		RuntimeBuilder {
			fetcher,
			config: RuntimeConfig::default(),
			scheduler: None,
			sink: None,
		}
	}

	pub(crate) fn from_inner(inner: Rc<RuntimeInner>) -> Self {
		Self { inner }
	}

	pub fn config(&self) -> &RuntimeConfig {
		&self.inner.config
	}

	/// The loader computations are resolved through.
	pub fn loader(&self) -> &ChunkLoader {
		&self.inner.loader
	}

	// ========================================================================
	// Stores
	// ========================================================================

	/// Wraps `container` in a store with a generated id.
	pub fn create_store(&self, container: Container) -> Store {
		let id = self
			.inner
			.container_ids
			.next(|candidate| self.inner.containers.borrow().contains_key(candidate));
		self.register_store(ContainerId::new(id), container)
	}

	/// Wraps `container` in a store with a fixed id.
	///
	/// # Errors
	///
	/// Returns [`ReactiveError::DuplicateContainer`] if a live store already
	/// uses `id`.
	pub fn create_store_with_id(
		&self,
		id: impl Into<ContainerId>,
		container: Container,
	) -> ReactiveResult<Store> {
		let id = id.into();
		if self.is_container_live(&id) {
			return Err(ReactiveError::DuplicateContainer(id));
		}
		if self.inner.containers.borrow().contains_key(&id) {
			self.release_container(&id);
		}
		Ok(self.register_store(id, container))
	}

	/// Returns the live store registered under `id`.
	pub fn store(&self, id: &ContainerId) -> Option<Store> {
		self.inner
			.containers
			.borrow()
			.get(id)
			.and_then(Weak::upgrade)
			.filter(|inner| !inner.is_disposed())
			.map(Store::from_inner)
	}

	/// Returns `true` if a live store is registered under `id`.
	pub fn is_container_live(&self, id: &ContainerId) -> bool {
		self.inner
			.containers
			.borrow()
			.get(id)
			.and_then(Weak::upgrade)
			.is_some_and(|inner| !inner.is_disposed())
	}

	pub(crate) fn register_store(&self, id: ContainerId, container: Container) -> Store {
		let store = Store::new(id.clone(), container, Rc::downgrade(&self.inner));
		self.inner
			.containers
			.borrow_mut()
			.insert(id.clone(), store.downgrade());
		tracing::debug!(container = %id, "store registered");
		store
	}

	/// Forgets a container together with its subscriptions and the
	/// computations it owns. Returns the disposed computations.
	pub(crate) fn release_container(&self, id: &ContainerId) -> Vec<ComputationId> {
		self.inner.containers.borrow_mut().remove(id);
		let edges = self.inner.graph.borrow_mut().remove_container(id);
		let owned: Vec<ComputationId> = self
			.inner
			.computations
			.borrow()
			.iter()
			.filter(|(_, record)| record.owner.as_ref() == Some(id))
			.map(|(computation, _)| computation.clone())
			.collect();
		for computation in &owned {
			self.dispose_computation(computation);
		}
		tracing::debug!(
			container = %id,
			edges,
			computations = owned.len(),
			"container released"
		);
		owned
	}

	// ========================================================================
	// Computations
	// ========================================================================

	/// Registers a computation, loads its code and runs it once.
	///
	/// # Errors
	///
	/// - [`ReactiveError::UnknownContainer`] if the owner is not a live store.
	/// - [`ReactiveError::DuplicateComputation`] if the id is taken.
	/// - [`ReactiveError::Load`] if the code cannot be resolved.
	/// - [`ReactiveError::Computation`] if the first run fails.
	///
	/// In the last two cases the computation stays registered in the
	/// [`Error`](ComputationState::Error) state.
	pub async fn mount(&self, spec: ComputationSpec) -> ReactiveResult<ComputationId> {
		let ComputationSpec {
			code,
			id,
			inputs,
			owner,
		} = spec;

		if let Some(owner) = &owner {
			if !self.is_container_live(owner) {
				return Err(ReactiveError::UnknownContainer(owner.clone()));
			}
		}

		let id = match id {
			Some(id) if self.inner.computations.borrow().contains_key(&id) => {
				return Err(ReactiveError::DuplicateComputation(id));
			}
			Some(id) => id,
			None => ComputationId::new(
				self.inner
					.computation_ids
					.next(|candidate| self.inner.computations.borrow().contains_key(candidate)),
			),
		};

		tracing::debug!(computation = %id, code = %code, "mounting computation");
		self.inner.computations.borrow_mut().insert(
			id.clone(),
			ComputationRecord::new(code.clone(), inputs, owner, ComputationState::Running),
		);

		let render = match self.inner.loader.resolve_as::<Render>(&code).await {
			Ok(render) => render,
			Err(err) => {
				self.record_failure(&id, ComputationError::from(err.clone()));
				return Err(err.into());
			}
		};

		if !self.inner.computations.borrow().contains_key(&id) {
			return Err(ReactiveError::UnknownComputation(id));
		}

		self.execute(&id, &render)
			.map_err(|source| ReactiveError::Computation {
				id: id.clone(),
				source,
			})?;
		Ok(id)
	}

	/// Runs a computation synchronously.
	///
	/// # Errors
	///
	/// Returns [`ReactiveError::NotResolved`] if the computation's chunk has
	/// not been loaded yet; use [`flush`](Self::flush) or
	/// [`mount`](Self::mount) for code that may still need loading.
	pub fn run_now(&self, id: &ComputationId) -> ReactiveResult<Value> {
		let code = self.code_of(id)?;
		let render = match self.inner.loader.try_resolve_as::<Render>(&code) {
			None => return Err(ReactiveError::NotResolved(id.clone())),
			Some(Ok(render)) => render,
			Some(Err(err)) => {
				self.record_failure(id, ComputationError::from(err.clone()));
				return Err(err.into());
			}
		};

		match self.execute(id, &render) {
			Ok(output) => {
				self.inner.sink.on_render(id, &output);
				Ok(output)
			}
			Err(source) => {
				self.inner.sink.on_error(id, &source);
				Err(ReactiveError::Computation {
					id: id.clone(),
					source,
				})
			}
		}
	}

	/// Marks a computation dirty and schedules a flush.
	///
	/// Returns `false` if the computation is unknown, already dirty or running.
	pub fn invalidate(&self, id: &ComputationId) -> bool {
		let dirtied = self.mark_dirty(id);
		if dirtied {
			self.schedule_flush();
		}
		dirtied
	}

	/// Removes a computation and all of its subscriptions.
	pub fn dispose_computation(&self, id: &ComputationId) -> bool {
		let removed = self.inner.computations.borrow_mut().remove(id).is_some();
		if removed {
			let edges = self.inner.graph.borrow_mut().clear(id);
			self.inner.queue.borrow_mut().remove(id);
			tracing::debug!(computation = %id, edges, "computation disposed");
		}
		removed
	}

	/// Purges unreachable containers and every computation owned by one.
	///
	/// Returns the purged computations.
	pub fn collect_garbage(&self) -> Vec<ComputationId> {
		let dead: Vec<ContainerId> = self
			.inner
			.containers
			.borrow()
			.iter()
			.filter(|(_, store)| store.upgrade().is_none_or(|inner| inner.is_disposed()))
			.map(|(id, _)| id.clone())
			.collect();

		let mut purged = Vec::new();
		for id in &dead {
			purged.extend(self.release_container(id));
		}

		let orphans: Vec<ComputationId> = self
			.inner
			.computations
			.borrow()
			.iter()
			.filter(|(_, record)| {
				record
					.owner
					.as_ref()
					.is_some_and(|owner| !self.is_container_live(owner))
			})
			.map(|(id, _)| id.clone())
			.collect();
		for id in orphans {
			self.dispose_computation(&id);
			purged.push(id);
		}

		if !purged.is_empty() || !dead.is_empty() {
			tracing::debug!(
				containers = dead.len(),
				computations = purged.len(),
				"garbage collected"
			);
		}
		purged
	}

	fn code_of(&self, id: &ComputationId) -> ReactiveResult<DeferredRef> {
		self.inner
			.computations
			.borrow()
			.get(id)
			.map(|record| record.code.clone())
			.ok_or_else(|| ReactiveError::UnknownComputation(id.clone()))
	}

	fn record_failure(&self, id: &ComputationId, error: ComputationError) {
		if let Some(record) = self.inner.computations.borrow_mut().get_mut(id) {
			record.state = ComputationState::Error;
			record.last_error = Some(error);
		}
	}

	/// Clears the computation's subscriptions and runs it under its own
	/// observer entry.
	fn execute(&self, id: &ComputationId, render: &Render) -> Result<Value, ComputationError> {
		if self
			.inner
			.observers
			.borrow()
			.contains(&Observer::Computation(id.clone()))
		{
			return Err(ComputationError::new(format!(
				"computation '{id}' is already running"
			)));
		}

		let inputs = {
			let mut computations = self.inner.computations.borrow_mut();
			let record = computations
				.get_mut(id)
				.ok_or_else(|| ReactiveError::UnknownComputation(id.clone()))?;
			record.state = ComputationState::Running;
			record.inputs.clone()
		};
		self.inner.queue.borrow_mut().remove(id);
		let cleared = self.inner.graph.borrow_mut().clear(id);
		tracing::debug!(computation = %id, cleared, "running computation");

		let scope = Scope::new(self.clone(), id.clone(), inputs);
		let result = {
			let _observer = ObserverGuard::push(&self.inner, Observer::Computation(id.clone()));
			render.call(&scope)
		};

		if let Some(record) = self.inner.computations.borrow_mut().get_mut(id) {
			match &result {
				Ok(output) => {
					record.state = ComputationState::Clean;
					record.last_output = Some(output.clone());
					record.last_error = None;
				}
				Err(err) => {
					record.state = ComputationState::Error;
					record.last_error = Some(err.clone());
				}
			}
		}
		result
	}

	// ========================================================================
	// Tracking
	// ========================================================================

	/// Runs `f` without recording any subscriptions.
	pub fn untrack<R>(&self, f: impl FnOnce() -> R) -> R {
		let _observer = ObserverGuard::push(&self.inner, Observer::Untracked);
		f()
	}

	/// Returns the innermost running computation, if reads are being tracked.
	pub fn current_computation(&self) -> Option<ComputationId> {
		match self.inner.observers.borrow().last() {
			Some(Observer::Computation(id)) => Some(id.clone()),
			_ => None,
		}
	}

	pub(crate) fn track_read(&self, container: &ContainerId, key: &str) {
		let Some(current) = self.current_computation() else {
			return;
		};
		if !self.inner.computations.borrow().contains_key(&current) {
			return;
		}
		if self
			.inner
			.graph
			.borrow_mut()
			.record(container, key, &current)
		{
			tracing::debug!(
				computation = %current,
				container = %container,
				key,
				"subscription recorded"
			);
		}
	}

	pub(crate) fn notify_write(&self, container: &ContainerId, key: &str) {
		let subscribers = self.inner.graph.borrow().subscribers_of(container, key);
		let mut dirtied = 0;
		for id in &subscribers {
			if self.mark_dirty(id) {
				dirtied += 1;
			}
		}
		if dirtied > 0 {
			self.schedule_flush();
		}
	}

	fn mark_dirty(&self, id: &ComputationId) -> bool {
		{
			let mut computations = self.inner.computations.borrow_mut();
			let Some(record) = computations.get_mut(id) else {
				return false;
			};
			if !record.state.accepts_invalidation() {
				return false;
			}
			record.state = ComputationState::Dirty;
		}
		self.inner.queue.borrow_mut().insert(id.clone());
		tracing::debug!(computation = %id, "marked dirty");
		true
	}

	// ========================================================================
	// Scheduling
	// ========================================================================

	/// Runs `f` and schedules at most one flush once it returns.
	pub fn batch<R>(&self, f: impl FnOnce() -> R) -> R {
		let inner = &self.inner;
		inner.batch_depth.set(inner.batch_depth.get() + 1);
		let result = f();
		let depth = inner.batch_depth.get() - 1;
		inner.batch_depth.set(depth);
		if depth == 0 && inner.batch_pending.replace(false) {
			self.schedule_flush();
		}
		result
	}

	/// Returns `true` if a flush has been handed to the scheduler and has not
	/// started yet.
	pub fn is_flush_scheduled(&self) -> bool {
		self.inner.flush_scheduled.get()
	}

	pub(crate) fn schedule_flush(&self) {
		let inner = &self.inner;
		if inner.batch_depth.get() > 0 {
			inner.batch_pending.set(true);
			return;
		}
		if inner.flush_scheduled.get() {
			return;
		}

		if inner.flush_depth.get() > 0 {
			let chained = inner.chained_flushes.get();
			if inner
				.config
				.max_flush_passes()
				.is_some_and(|max| chained >= max)
			{
				tracing::warn!(
					passes = chained,
					queued = inner.queue.borrow().len(),
					"flush pass limit reached, dirty computations stay queued"
				);
				return;
			}
			inner.chained_flushes.set(chained + 1);
		} else {
			inner.chained_flushes.set(0);
		}

		inner.flush_scheduled.set(true);
		let weak = Rc::downgrade(inner);
		inner.scheduler.schedule(
			async move {
				let Some(inner) = weak.upgrade() else {
					return;
				};
				let runtime = Runtime::from_inner(inner);
				runtime.inner.flush_scheduled.set(false);
				runtime.flush_pass().await;
			}
			.boxed_local(),
		);
	}

	/// Runs every computation that is dirty right now.
	///
	/// Computations invalidated while this flush runs wait for the next one.
	/// A failing computation is reported and left in the error state; the
	/// others still run.
	pub async fn flush(&self) -> FlushReport {
		self.inner.chained_flushes.set(0);
		self.flush_pass().await
	}

	async fn flush_pass(&self) -> FlushReport {
		let pass = self.inner.flush_passes.get() + 1;
		self.inner.flush_passes.set(pass);
		let queued = self.inner.queue.borrow_mut().drain();
		let span = tracing::debug_span!("flush", pass, queued = queued.len());
		self.run_queued(queued).instrument(span).await
	}

	async fn run_queued(&self, queued: Vec<ComputationId>) -> FlushReport {
		tracing::debug!("flush started");
		self.inner.flush_depth.set(self.inner.flush_depth.get() + 1);

		let mut report = FlushReport::default();
		for id in queued {
			self.flush_one(id, &mut report).await;
		}

		self.inner.flush_depth.set(self.inner.flush_depth.get() - 1);
		tracing::debug!(
			ran = report.ran.len(),
			failed = report.failed.len(),
			skipped = report.skipped.len(),
			"flush finished"
		);
		report
	}

	async fn flush_one(&self, id: ComputationId, report: &mut FlushReport) {
		let code = match self.claim(&id) {
			Claim::Run(code) => code,
			settled => return Self::report_unclaimed(id, settled, report),
		};

		let render = match self.inner.loader.resolve_as::<Render>(&code).await {
			Ok(render) => render,
			Err(err) => {
				let error = ComputationError::from(err);
				self.record_failure(&id, error.clone());
				self.inner.sink.on_error(&id, &error);
				report.failed.push((id, error));
				return;
			}
		};

		// The load may have suspended; the computation or its owner can be
		// gone by now, or someone else ran it.
		match self.claim_running(&id) {
			Claim::Run(_) => {}
			settled => return Self::report_unclaimed(id, settled, report),
		}

		match self.execute(&id, &render) {
			Ok(output) => {
				self.inner.sink.on_render(&id, &output);
				report.ran.push(id);
			}
			Err(error) => {
				self.inner.sink.on_error(&id, &error);
				report.failed.push((id, error));
			}
		}
	}

	fn report_unclaimed(id: ComputationId, claim: Claim, report: &mut FlushReport) {
		match claim {
			Claim::Settled(Ok(())) => report.ran.push(id),
			Claim::Settled(Err(error)) => report.failed.push((id, error)),
			Claim::Run(_) | Claim::Skip => report.skipped.push(id),
		}
	}

	/// Moves a dirty computation to running, purging it instead if its owner
	/// is unreachable.
	fn claim(&self, id: &ComputationId) -> Claim {
		let owner = match self.claim_state(id, ComputationState::Dirty) {
			Ok(owner) => owner,
			Err(claim) => return claim,
		};
		if !self.owner_is_live(id, owner.as_ref()) {
			return Claim::Skip;
		}

		let mut computations = self.inner.computations.borrow_mut();
		match computations.get_mut(id) {
			Some(record) => {
				record.state = ComputationState::Running;
				Claim::Run(record.code.clone())
			}
			None => Claim::Skip,
		}
	}

	/// Re-checks a claimed computation after its code load.
	fn claim_running(&self, id: &ComputationId) -> Claim {
		let owner = match self.claim_state(id, ComputationState::Running) {
			Ok(owner) => owner,
			Err(claim) => return claim,
		};
		if !self.owner_is_live(id, owner.as_ref()) {
			return Claim::Skip;
		}
		match self.code_of(id) {
			Ok(code) => Claim::Run(code),
			Err(_) => Claim::Skip,
		}
	}

	/// Returns the owner if the computation is in `expected` state.
	///
	/// A `Clean` or `Error` computation settled in a run the flush did not
	/// start, such as a parent's [`Scope::run_child`].
	fn claim_state(
		&self,
		id: &ComputationId,
		expected: ComputationState,
	) -> Result<Option<ContainerId>, Claim> {
		let computations = self.inner.computations.borrow();
		let Some(record) = computations.get(id) else {
			tracing::debug!(computation = %id, "queued computation no longer exists");
			return Err(Claim::Skip);
		};
		match record.state {
			state if state == expected => Ok(record.owner.clone()),
			ComputationState::Clean => Err(Claim::Settled(Ok(()))),
			ComputationState::Error => Err(Claim::Settled(Err(record
				.last_error
				.clone()
				.unwrap_or_else(|| ComputationError::new("computation failed"))))),
			_ => Err(Claim::Skip),
		}
	}

	fn owner_is_live(&self, id: &ComputationId, owner: Option<&ContainerId>) -> bool {
		let Some(owner) = owner else {
			return true;
		};
		if self.is_container_live(owner) {
			return true;
		}
		tracing::warn!(
			computation = %id,
			owner = %owner,
			"skipping computation owned by an unreachable container"
		);
		self.release_container(owner);
		self.dispose_computation(id);
		false
	}

	// ========================================================================
	// Introspection
	// ========================================================================

	pub fn computation_state(&self, id: &ComputationId) -> Option<ComputationState> {
		self.inner
			.computations
			.borrow()
			.get(id)
			.map(|record| record.state)
	}

	/// Output of the computation's last successful run.
	pub fn last_output(&self, id: &ComputationId) -> Option<Value> {
		self.inner
			.computations
			.borrow()
			.get(id)
			.and_then(|record| record.last_output.clone())
	}

	/// Failure of the computation's last run, if it failed.
	pub fn last_error(&self, id: &ComputationId) -> Option<ComputationError> {
		self.inner
			.computations
			.borrow()
			.get(id)
			.and_then(|record| record.last_error.clone())
	}

	/// Ids waiting for the next flush, in the order they will run.
	pub fn dirty_ids(&self) -> Vec<ComputationId> {
		self.inner.queue.borrow().iter().cloned().collect()
	}

	pub fn computation_ids(&self) -> Vec<ComputationId> {
		self.inner.computations.borrow().keys().cloned().collect()
	}

	/// Properties the computation is currently subscribed to.
	pub fn subscriptions_of(&self, id: &ComputationId) -> BTreeSet<PropertyKey> {
		self.inner.graph.borrow().dependencies_of(id)
	}

	/// Computations currently subscribed to `key` on `container`.
	pub fn subscribers_of(&self, container: &ContainerId, key: &str) -> BTreeSet<ComputationId> {
		self.inner.graph.borrow().subscribers_of(container, key)
	}

	pub fn subscription_count(&self) -> usize {
		self.inner.graph.borrow().len()
	}
}

impl fmt::Debug for Runtime {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Runtime")
			.field("config", &self.inner.config)
			.field("containers", &self.inner.containers.borrow().len())
			.field("computations", &self.inner.computations.borrow().len())
			.field("subscriptions", &self.inner.graph.borrow().len())
			.field("queued", &self.inner.queue.borrow().len())
			.finish()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use lazuli_loader::{Chunk, StaticFetcher};
	use rstest::{fixture, rstest};
	use serde_json::json;

	fn fetcher() -> Rc<StaticFetcher> {
		Rc::new(StaticFetcher::new().with_chunk("q-app.js", |location| {
			Ok(Chunk::builder(location.clone())
				.symbol(
					"count_text",
					Render::new(|scope| {
						let store = scope.input_store("store")?;
						Ok(json!(format!("count={}", store.get("count").unwrap_or_default())))
					}),
				)
				.symbol(
					"fails",
					Render::new(|_| Err(ComputationError::new("render blew up"))),
				)
				.build())
		}))
	}

	#[fixture]
	fn runtime() -> Runtime {
		Runtime::builder(fetcher()).build()
	}

	fn count_text(store: &Store) -> ComputationSpec {
		ComputationSpec::new(DeferredRef::new("q-app.js", "count_text"))
			.inputs(json!({ "store": store.id() }))
	}

	#[rstest]
	#[tokio::test]
	async fn test_mount_runs_and_subscribes(runtime: Runtime) {
		// Arrange
		let store = runtime.create_store(Container::new().with("count", 0));

		// Act
		let id = runtime.mount(count_text(&store)).await.unwrap();

		// Assert
		assert_eq!(runtime.last_output(&id), Some(json!("count=0")));
		assert_eq!(runtime.computation_state(&id), Some(ComputationState::Clean));
		let subscribers = runtime.subscribers_of(store.id(), "count");
		assert!(subscribers.contains(&id));
	}

	#[rstest]
	#[tokio::test]
	async fn test_mount_failure_leaves_error_state(runtime: Runtime) {
		let spec = ComputationSpec::new(DeferredRef::new("q-app.js", "fails")).id("broken");

		let result = runtime.mount(spec).await;

		assert!(matches!(result, Err(ReactiveError::Computation { ref id, .. }) if id.as_str() == "broken"));
		let id = ComputationId::new("broken");
		assert_eq!(runtime.computation_state(&id), Some(ComputationState::Error));
		assert_eq!(
			runtime.last_error(&id).map(|err| err.message().to_string()),
			Some("render blew up".to_string())
		);
	}

	#[rstest]
	#[tokio::test]
	async fn test_mount_unknown_symbol(runtime: Runtime) {
		let spec = ComputationSpec::new(DeferredRef::new("q-app.js", "missing"));

		let result = runtime.mount(spec).await;

		assert!(matches!(result, Err(ReactiveError::Load(_))));
	}

	#[rstest]
	#[tokio::test]
	async fn test_mount_rejects_dead_owner_and_duplicate_id(runtime: Runtime) {
		let owner = runtime.create_store(Container::new());
		let owner_id = owner.id().clone();
		let store = runtime.create_store(Container::new().with("count", 0));
		runtime.mount(count_text(&store).id("dup")).await.unwrap();
		drop(owner);

		let dead = runtime.mount(count_text(&store).owner(owner_id)).await;
		let duplicate = runtime.mount(count_text(&store).id("dup")).await;

		assert!(matches!(dead, Err(ReactiveError::UnknownContainer(_))));
		assert!(matches!(duplicate, Err(ReactiveError::DuplicateComputation(_))));
	}

	#[rstest]
	fn test_run_now_requires_loaded_code(runtime: Runtime) {
		let store = runtime.create_store(Container::new().with("count", 0));
		let id = ComputationId::new("c-lazy");
		runtime.inner.computations.borrow_mut().insert(
			id.clone(),
			ComputationRecord::new(
				DeferredRef::new("q-app.js", "count_text"),
				json!({ "store": store.id() }),
				None,
				ComputationState::Dirty,
			),
		);

		let result = runtime.run_now(&id);

		assert!(matches!(result, Err(ReactiveError::NotResolved(_))));
	}

	#[rstest]
	#[tokio::test]
	async fn test_write_marks_dirty_and_flush_reruns(runtime: Runtime) {
		// Arrange
		let store = runtime.create_store(Container::new().with("count", 0));
		let id = runtime.mount(count_text(&store)).await.unwrap();

		// Act
		store.set("count", 1).unwrap();
		let dirty = runtime.dirty_ids();
		let report = runtime.flush().await;

		// Assert
		assert_eq!(dirty, vec![id.clone()]);
		assert_eq!(report.ran, vec![id.clone()]);
		assert_eq!(runtime.last_output(&id), Some(json!("count=1")));
		assert!(runtime.subscribers_of(store.id(), "count").contains(&id));
	}

	#[rstest]
	#[tokio::test]
	async fn test_write_without_subscribers_schedules_nothing(runtime: Runtime) {
		let store = runtime.create_store(Container::new().with("count", 0));

		store.set("count", 1).unwrap();

		assert!(!runtime.is_flush_scheduled());
		assert!(runtime.flush().await.is_empty());
	}

	#[rstest]
	#[tokio::test]
	async fn test_dispose_store_removes_owned_computations(runtime: Runtime) {
		let store = runtime.create_store(Container::new().with("count", 0));
		let id = runtime
			.mount(count_text(&store).owner(store.id().clone()))
			.await
			.unwrap();

		store.dispose();

		assert_eq!(runtime.computation_state(&id), None);
		assert_eq!(runtime.subscription_count(), 0);
	}

	#[rstest]
	#[tokio::test]
	async fn test_collect_garbage_purges_unreachable(runtime: Runtime) {
		let store = runtime.create_store(Container::new().with("count", 0));
		let id = runtime
			.mount(count_text(&store).owner(store.id().clone()))
			.await
			.unwrap();
		drop(store);

		let purged = runtime.collect_garbage();

		assert_eq!(purged, vec![id]);
		assert_eq!(runtime.subscription_count(), 0);
	}

	#[rstest]
	fn test_untrack_hides_current_computation(runtime: Runtime) {
		let _observer = ObserverGuard::push(
			&runtime.inner,
			Observer::Computation(ComputationId::new("c0")),
		);

		let inside = runtime.untrack(|| runtime.current_computation());

		assert_eq!(inside, None);
		assert_eq!(runtime.current_computation(), Some(ComputationId::new("c0")));
	}

	#[rstest]
	fn test_generated_ids_skip_existing(runtime: Runtime) {
		let first = runtime.create_store_with_id("s0", Container::new()).unwrap();

		let next = runtime.create_store(Container::new());

		assert_eq!(first.id().as_str(), "s0");
		assert_eq!(next.id().as_str(), "s1");
		assert!(matches!(
			runtime.create_store_with_id("s0", Container::new()),
			Err(ReactiveError::DuplicateContainer(_))
		));
	}
}
