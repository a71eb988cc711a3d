//! Chunk Loader
//!
//! Resolves [`DeferredRef`]s to live values by loading the chunk that exports
//! them. Loading is memoized per [`ChunkLocation`]:
//!
//! 1. The first resolve against a chunk starts exactly one fetch and stores
//!    the in-flight load in the cache.
//! 2. Concurrent resolves against the same chunk await that same load.
//! 3. Once the load completes, every waiter does its own symbol lookup.
//! 4. A failed load stays failed; it is never retried by the loader.
//!
//! The loader runs on a single-threaded, cooperative executor. The only
//! suspension point is the fetch itself.

use core::any::{Any, type_name};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use async_trait::async_trait;
use futures::FutureExt;
use futures::future::{LocalBoxFuture, Shared};
use tracing::Instrument;

use crate::chunk::{Chunk, ChunkLocation, Symbol};
use crate::deferred::DeferredRef;
use crate::error::{LoadError, LoadResult};

/// Fetches and evaluates chunks.
///
/// This is the seam to the host environment: a browser host would perform a
/// dynamic import, a native host would look the chunk up in a table of
/// statically linked code. Returning an error means the chunk's top-level
/// evaluation failed.
#[async_trait(?Send)]
pub trait ChunkFetcher {
	/// Fetches and evaluates the chunk at `location`.
	async fn fetch(&self, location: &ChunkLocation) -> anyhow::Result<Chunk>;
}

type ChunkFactory = Box<dyn Fn(&ChunkLocation) -> anyhow::Result<Chunk>>;

/// A [`ChunkFetcher`] backed by chunks linked into the binary.
///
/// Each registered factory plays the role of the chunk's top-level
/// evaluation and is run once per successful fetch.
#[derive(Default)]
pub struct StaticFetcher {
	factories: HashMap<ChunkLocation, ChunkFactory>,
	evaluations: RefCell<HashMap<ChunkLocation, usize>>,
}

impl StaticFetcher {
	/// Creates an empty fetcher.
	pub fn new() -> Self {
		Self::default()
	}

	/// Registers a chunk factory.
	pub fn with_chunk<F>(mut self, location: impl Into<ChunkLocation>, factory: F) -> Self
	where
		F: Fn(&ChunkLocation) -> anyhow::Result<Chunk> + 'static,
	{
		self.factories.insert(location.into(), Box::new(factory));
		self
	}

	/// Returns how many times the chunk at `location` has been evaluated.
	pub fn evaluations(&self, location: &ChunkLocation) -> usize {
		self.evaluations
			.borrow()
			.get(location)
			.copied()
			.unwrap_or(0)
	}
}

#[async_trait(?Send)]
impl ChunkFetcher for StaticFetcher {
	async fn fetch(&self, location: &ChunkLocation) -> anyhow::Result<Chunk> {
		let factory = self
			.factories
			.get(location)
			.ok_or_else(|| anyhow::anyhow!("no chunk registered at '{}'", location))?;

		*self
			.evaluations
			.borrow_mut()
			.entry(location.clone())
			.or_default() += 1;

		factory(location)
	}
}

type ChunkLoad = Shared<LocalBoxFuture<'static, LoadResult<Rc<Chunk>>>>;

/// Memoizing resolver for deferred references.
pub struct ChunkLoader {
	fetcher: Rc<dyn ChunkFetcher>,
	cache: RefCell<HashMap<ChunkLocation, ChunkLoad>>,
	loads_started: Cell<usize>,
}

impl ChunkLoader {
	/// Creates a loader on top of `fetcher`.
	pub fn new(fetcher: Rc<dyn ChunkFetcher>) -> Self {
		Self {
			fetcher,
			cache: RefCell::new(HashMap::new()),
			loads_started: Cell::new(0),
		}
	}

	/// Loads the chunk at `location`, starting a fetch only if none has been
	/// started before.
	///
	/// # Errors
	///
	/// Returns [`LoadError::ChunkFailed`] if the fetch or evaluation failed,
	/// now or in an earlier attempt.
	pub async fn load(&self, location: &ChunkLocation) -> LoadResult<Rc<Chunk>> {
		let load = self.load_handle(location);
		load.await
	}

	/// Starts loading `location` ahead of any resolve and waits for it.
	pub async fn preload(&self, location: &ChunkLocation) -> LoadResult<()> {
		self.load(location).await.map(|_| ())
	}

	/// Resolves a deferred reference.
	///
	/// A reference that is already resolved completes without suspending.
	///
	/// # Errors
	///
	/// Returns [`LoadError::ChunkFailed`] if the chunk is unloadable and
	/// [`LoadError::SymbolNotFound`] if it does not export the symbol.
	pub async fn resolve(&self, reference: &DeferredRef) -> LoadResult<Symbol> {
		if let Some(value) = reference.resolved() {
			return Ok(value);
		}

		let chunk = self.load(reference.chunk()).await?;
		Self::lookup(&chunk, reference)
	}

	/// Resolves a deferred reference and downcasts the symbol to `T`.
	///
	/// # Errors
	///
	/// As [`resolve`](Self::resolve), plus [`LoadError::TypeMismatch`] if the
	/// symbol is not a `T`.
	pub async fn resolve_as<T: Any>(&self, reference: &DeferredRef) -> LoadResult<Rc<T>> {
		let value = self.resolve(reference).await?;
		Self::downcast(value, reference)
	}

	/// Resolves without suspending, if that is possible.
	///
	/// Returns `None` when the chunk has not finished loading yet.
	pub fn try_resolve(&self, reference: &DeferredRef) -> Option<LoadResult<Symbol>> {
		if let Some(value) = reference.resolved() {
			return Some(Ok(value));
		}

		let cache = self.cache.borrow();
		let outcome = cache.get(reference.chunk())?.peek()?;
		Some(match outcome {
			Ok(chunk) => Self::lookup(chunk, reference),
			Err(err) => Err(err.clone()),
		})
	}

	/// Synchronous, typed variant of [`try_resolve`](Self::try_resolve).
	pub fn try_resolve_as<T: Any>(&self, reference: &DeferredRef) -> Option<LoadResult<Rc<T>>> {
		self.try_resolve(reference)
			.map(|result| result.and_then(|value| Self::downcast(value, reference)))
	}

	/// Returns `true` if the chunk has loaded successfully.
	pub fn is_loaded(&self, location: &ChunkLocation) -> bool {
		matches!(
			self.cache.borrow().get(location).and_then(|load| load.peek()),
			Some(Ok(_))
		)
	}

	/// Returns `true` if the chunk failed to load.
	pub fn is_failed(&self, location: &ChunkLocation) -> bool {
		matches!(
			self.cache.borrow().get(location).and_then(|load| load.peek()),
			Some(Err(_))
		)
	}

	/// Returns the locations of all successfully loaded chunks, sorted.
	pub fn loaded_chunks(&self) -> Vec<ChunkLocation> {
		self.settled(true)
	}

	/// Returns the locations of all chunks whose load failed, sorted.
	pub fn failed_chunks(&self) -> Vec<ChunkLocation> {
		self.settled(false)
	}

	/// Returns the number of fetches started so far.
	pub fn loads_started(&self) -> usize {
		self.loads_started.get()
	}

	fn load_handle(&self, location: &ChunkLocation) -> ChunkLoad {
		let mut cache = self.cache.borrow_mut();
		if let Some(load) = cache.get(location) {
			tracing::debug!(chunk = %location, "chunk cache hit");
			return load.clone();
		}

		self.loads_started.set(self.loads_started.get() + 1);
		let fetcher = Rc::clone(&self.fetcher);
		let owned = location.clone();
		let span = tracing::info_span!("chunk_load", chunk = %location);
		let load = async move {
			tracing::info!("loading chunk");
			match fetcher.fetch(&owned).await {
				Ok(chunk) => {
					tracing::info!(symbols = chunk.len(), "chunk loaded");
					Ok(Rc::new(chunk))
				}
				Err(err) => {
					tracing::error!(error = %err, "chunk evaluation failed");
					Err(LoadError::chunk_failed(&owned, format!("{err:#}")))
				}
			}
		}
		.instrument(span)
		.boxed_local()
		.shared();

		cache.insert(location.clone(), load.clone());
		load
	}

	fn settled(&self, ok: bool) -> Vec<ChunkLocation> {
		let mut locations: Vec<_> = self
			.cache
			.borrow()
			.iter()
			.filter(|(_, load)| load.peek().is_some_and(|outcome| outcome.is_ok() == ok))
			.map(|(location, _)| location.clone())
			.collect();
		locations.sort();
		locations
	}

	fn lookup(chunk: &Chunk, reference: &DeferredRef) -> LoadResult<Symbol> {
		let value = chunk
			.get(reference.symbol())
			.ok_or_else(|| LoadError::SymbolNotFound {
				chunk: reference.chunk().clone(),
				symbol: reference.symbol().to_string(),
			})?;
		reference.set_resolved(Rc::clone(&value));
		Ok(value)
	}

	fn downcast<T: Any>(value: Symbol, reference: &DeferredRef) -> LoadResult<Rc<T>> {
		value.downcast::<T>().map_err(|_| LoadError::TypeMismatch {
			chunk: reference.chunk().clone(),
			symbol: reference.symbol().to_string(),
			expected: type_name::<T>(),
		})
	}
}
