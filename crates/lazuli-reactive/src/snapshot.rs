//! Graph Serialization and Resume
//!
//! A [`SerializedGraph`] is the transport form of a runtime: container
//! snapshots, subscription edges and, for every computation, the deferred
//! reference to its code plus its captured inputs. Resuming rebuilds the graph
//! verbatim. No computation runs and no chunk is loaded; code is fetched later,
//! the first time a resumed computation is flushed.
//!
//! Entries that cannot be reattached (an edge naming a container that was not
//! restored, for instance) are skipped and reported as
//! [`StaleReference`]s. With
//! [`RuntimeConfig::with_strict_resume`](crate::RuntimeConfig::with_strict_resume)
//! the first stale entry fails the whole resume instead.

use std::collections::{BTreeMap, BTreeSet};

use lazuli_loader::{ChunkLocation, DeferredRef};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::computation::{ComputationRecord, ComputationState};
use crate::error::{ReactiveError, ReactiveResult, StaleReference};
use crate::graph::Subscription;
use crate::ids::{ComputationId, ContainerId};
use crate::runtime::Runtime;
use crate::store::{Container, Store};

/// Element id of the script tag produced by [`SerializedGraph::to_script_tag`].
pub const STATE_SCRIPT_ID: &str = "lazuli-state";

/// A container's identity and property snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerDescriptor {
	pub id: ContainerId,
	pub props: Container,
}

/// Everything needed to re-invoke a computation elsewhere.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComputationDescriptor {
	pub id: ComputationId,
	pub chunk: ChunkLocation,
	pub symbol: String,
	#[serde(default)]
	pub inputs: Value,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub owner: Option<ContainerId>,
	#[serde(default, skip_serializing_if = "ComputationState::is_clean")]
	pub state: ComputationState,
}

impl ComputationDescriptor {
	/// The computation's code as an unresolved reference.
	pub fn deferred(&self) -> DeferredRef {
		DeferredRef::new(self.chunk.clone(), &self.symbol)
	}
}

/// Transport form of a runtime's subscription graph.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SerializedGraph {
	#[serde(default)]
	pub containers: Vec<ContainerDescriptor>,
	#[serde(default)]
	pub subscriptions: Vec<Subscription>,
	#[serde(default)]
	pub computations: Vec<ComputationDescriptor>,
}

impl SerializedGraph {
	pub fn is_empty(&self) -> bool {
		self.containers.is_empty() && self.subscriptions.is_empty() && self.computations.is_empty()
	}

	pub fn to_json(&self) -> ReactiveResult<String> {
		Ok(serde_json::to_string(self)?)
	}

	pub fn from_json(json: &str) -> ReactiveResult<Self> {
		Ok(serde_json::from_str(json)?)
	}

	/// Embeds the graph in a `<script type="application/json">` element.
	///
	/// Every `</` is written as `<\/` so property values cannot close the tag.
	pub fn to_script_tag(&self) -> ReactiveResult<String> {
		let json = self.to_json()?.replace("</", "<\\/");
		Ok(format!(
			r#"<script id="{STATE_SCRIPT_ID}" type="application/json">{json}</script>"#
		))
	}

	/// Extracts a graph embedded by [`to_script_tag`](Self::to_script_tag)
	/// from surrounding markup.
	pub fn from_script_tag(markup: &str) -> ReactiveResult<Self> {
		let open = format!(r#"<script id="{STATE_SCRIPT_ID}" type="application/json">"#);
		let start = markup
			.find(&open)
			.map(|index| index + open.len())
			.ok_or_else(|| ReactiveError::Serialization("state script tag not found".to_string()))?;
		let end = markup[start..]
			.find("</script>")
			.map(|index| start + index)
			.ok_or_else(|| ReactiveError::Serialization("state script tag is not closed".to_string()))?;
		Self::from_json(&markup[start..end])
	}
}

/// Summary of a resume.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResumeReport {
	/// Containers restored.
	pub containers: usize,
	/// Computations restored.
	pub computations: usize,
	/// Subscription edges restored.
	pub subscriptions: usize,
	/// Restored computations queued for the next flush.
	pub queued: usize,
	/// Entries that could not be reattached.
	pub stale: Vec<StaleReference>,
}

impl ResumeReport {
	/// Returns `true` if every entry was reattached.
	pub fn is_complete(&self) -> bool {
		self.stale.is_empty()
	}
}

/// Result of a successful resume.
///
/// The runtime only holds weak references to stores, so the host must keep
/// the restored handles alive for as long as their computations should run.
#[derive(Debug)]
pub struct Resumed {
	pub stores: BTreeMap<ContainerId, Store>,
	pub report: ResumeReport,
}

impl Resumed {
	pub fn store(&self, id: &str) -> Option<&Store> {
		self.stores.get(id)
	}
}

impl Runtime {
	/// Exports live containers, the computations that are not owned by an
	/// unreachable container, and the subscriptions between the two.
	///
	/// A computation caught mid-run is exported as dirty.
	pub fn serialize(&self) -> SerializedGraph {
		let containers: Vec<ContainerDescriptor> = self
			.inner
			.containers
			.borrow()
			.iter()
			.filter_map(|(id, store)| {
				let store = store.upgrade()?;
				(!store.is_disposed()).then(|| ContainerDescriptor {
					id: id.clone(),
					props: store.snapshot(),
				})
			})
			.collect();

		let live: BTreeSet<&ContainerId> =
			containers.iter().map(|container| &container.id).collect();
		let computations: Vec<ComputationDescriptor> = self
			.inner
			.computations
			.borrow()
			.iter()
			.filter(|(_, record)| {
				record
					.owner
					.as_ref()
					.is_none_or(|owner| live.contains(owner))
			})
			.map(|(id, record)| ComputationDescriptor {
				id: id.clone(),
				chunk: record.code.chunk().clone(),
				symbol: record.code.symbol().to_string(),
				inputs: record.inputs.clone(),
				owner: record.owner.clone(),
				state: match record.state {
					ComputationState::Running => ComputationState::Dirty,
					state => state,
				},
			})
			.collect();

		let exported: BTreeSet<&ComputationId> =
			computations.iter().map(|computation| &computation.id).collect();
		let subscriptions: Vec<Subscription> = self
			.inner
			.graph
			.borrow()
			.edges()
			.filter(|edge| live.contains(&edge.container) && exported.contains(&edge.computation))
			.collect();

		tracing::debug!(
			containers = containers.len(),
			subscriptions = subscriptions.len(),
			computations = computations.len(),
			"graph serialized"
		);
		SerializedGraph {
			containers,
			subscriptions,
			computations,
		}
	}

	/// Resumes `graph`, restoring containers from its own snapshots.
	///
	/// # Errors
	///
	/// See [`resume_with`](Self::resume_with).
	pub fn resume(&self, graph: &SerializedGraph) -> ReactiveResult<Resumed> {
		self.resume_with(
			graph,
			graph
				.containers
				.iter()
				.map(|container| (container.id.clone(), container.props.clone())),
		)
	}

	/// Resumes `graph` over containers restored by the host.
	///
	/// The container snapshots inside `graph` are ignored. Edges and owners
	/// may name any container in `containers` or one already live in this
	/// runtime.
	///
	/// # Errors
	///
	/// - [`ReactiveError::DuplicateContainer`] or
	///   [`ReactiveError::DuplicateComputation`] if an id is already in use.
	/// - [`ReactiveError::StaleReference`] in strict mode, for the first
	///   stale entry.
	///
	/// The runtime is left untouched when an error is returned.
	pub fn resume_with(
		&self,
		graph: &SerializedGraph,
		containers: impl IntoIterator<Item = (ContainerId, Container)>,
	) -> ReactiveResult<Resumed> {
		let restored: BTreeMap<ContainerId, Container> = containers.into_iter().collect();

		if let Some(id) = restored.keys().find(|id| self.is_container_live(id)) {
			return Err(ReactiveError::DuplicateContainer(id.clone()));
		}
		if let Some(computation) = graph
			.computations
			.iter()
			.find(|computation| self.inner.computations.borrow().contains_key(&computation.id))
		{
			return Err(ReactiveError::DuplicateComputation(computation.id.clone()));
		}

		let known_container = |id: &ContainerId| restored.contains_key(id) || self.is_container_live(id);
		let mut stale = Vec::new();

		let accepted: Vec<&ComputationDescriptor> = graph
			.computations
			.iter()
			.filter(|computation| match &computation.owner {
				Some(owner) if !known_container(owner) => {
					stale.push(StaleReference::ComputationOwner {
						computation: computation.id.clone(),
						owner: owner.clone(),
					});
					false
				}
				_ => true,
			})
			.collect();
		let accepted_ids: BTreeSet<&ComputationId> =
			accepted.iter().map(|computation| &computation.id).collect();

		let edges: Vec<&Subscription> = graph
			.subscriptions
			.iter()
			.filter(|edge| {
				if !known_container(&edge.container) {
					stale.push(StaleReference::SubscriptionContainer {
						container: edge.container.clone(),
						key: edge.key.clone(),
						computation: edge.computation.clone(),
					});
					return false;
				}
				if !accepted_ids.contains(&edge.computation)
					&& !self.inner.computations.borrow().contains_key(&edge.computation)
				{
					stale.push(StaleReference::SubscriptionComputation {
						container: edge.container.clone(),
						key: edge.key.clone(),
						computation: edge.computation.clone(),
					});
					return false;
				}
				true
			})
			.collect();

		for entry in &stale {
			tracing::warn!(stale = %entry, "skipping stale reference during resume");
		}
		if self.inner.config.strict_resume() {
			if let Some(first) = stale.first() {
				return Err(ReactiveError::StaleReference(first.clone()));
			}
		}

		let mut stores = BTreeMap::new();
		for (id, container) in restored {
			if self.inner.containers.borrow().contains_key(&id) {
				self.release_container(&id);
			}
			let store = self.register_store(id.clone(), container);
			stores.insert(id, store);
		}

		let mut queued = 0;
		{
			let mut computations = self.inner.computations.borrow_mut();
			let mut queue = self.inner.queue.borrow_mut();
			for computation in &accepted {
				let state = match computation.state {
					ComputationState::Running => ComputationState::Dirty,
					state => state,
				};
				computations.insert(
					computation.id.clone(),
					ComputationRecord::new(
						computation.deferred(),
						computation.inputs.clone(),
						computation.owner.clone(),
						state,
					),
				);
				if state == ComputationState::Dirty && queue.insert(computation.id.clone()) {
					queued += 1;
				}
			}
		}

		{
			let mut subscriptions = self.inner.graph.borrow_mut();
			for edge in &edges {
				subscriptions.record(&edge.container, &edge.key, &edge.computation);
			}
		}

		let report = ResumeReport {
			containers: stores.len(),
			computations: accepted.len(),
			subscriptions: edges.len(),
			queued,
			stale,
		};
		tracing::info!(
			containers = report.containers,
			computations = report.computations,
			subscriptions = report.subscriptions,
			queued = report.queued,
			stale = report.stale.len(),
			"graph resumed"
		);

		if queued > 0 {
			self.schedule_flush();
		}
		Ok(Resumed { stores, report })
	}
}
