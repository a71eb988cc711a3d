//! Subscription Graph
//!
//! Records which computations depend on which `(container, key)` pairs. The
//! graph is indexed both ways so that a write can find its subscribers and a
//! re-executing computation can drop all of its edges in one call.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::ids::{ComputationId, ContainerId};

/// A `(container, key)` pair.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PropertyKey {
	/// Container that owns the property.
	pub container: ContainerId,
	/// Property name.
	pub key: String,
}

impl PropertyKey {
	/// Creates a property key.
	pub fn new(container: ContainerId, key: impl Into<String>) -> Self {
		Self {
			container,
			key: key.into(),
		}
	}
}

/// A dependency edge `(container, key) -> computation`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Subscription {
	/// Container that owns the property.
	pub container: ContainerId,
	/// Property name.
	pub key: String,
	/// Dependent computation.
	pub computation: ComputationId,
}

/// Two-way index of subscriptions.
#[derive(Debug, Default)]
pub struct SubscriptionGraph {
	by_property: BTreeMap<PropertyKey, BTreeSet<ComputationId>>,
	by_computation: BTreeMap<ComputationId, BTreeSet<PropertyKey>>,
}

impl SubscriptionGraph {
	/// Creates an empty graph.
	pub fn new() -> Self {
		Self::default()
	}

	/// Records that `computation` read `key` on `container`.
	///
	/// Returns `false` if the edge already existed.
	pub fn record(
		&mut self,
		container: &ContainerId,
		key: &str,
		computation: &ComputationId,
	) -> bool {
		let property = PropertyKey::new(container.clone(), key);
		let added = self
			.by_property
			.entry(property.clone())
			.or_default()
			.insert(computation.clone());
		if added {
			self.by_computation
				.entry(computation.clone())
				.or_default()
				.insert(property);
		}
		added
	}

	/// Removes every edge originating from `computation`.
	///
	/// Returns the number of edges removed.
	pub fn clear(&mut self, computation: &ComputationId) -> usize {
		let Some(properties) = self.by_computation.remove(computation) else {
			return 0;
		};

		for property in &properties {
			if let Some(subscribers) = self.by_property.get_mut(property) {
				subscribers.remove(computation);
				if subscribers.is_empty() {
					self.by_property.remove(property);
				}
			}
		}
		properties.len()
	}

	/// Removes every edge on any key of `container`.
	pub fn remove_container(&mut self, container: &ContainerId) -> usize {
		let properties: Vec<PropertyKey> = self
			.by_property
			.keys()
			.filter(|property| &property.container == container)
			.cloned()
			.collect();

		let mut removed = 0;
		for property in properties {
			let Some(subscribers) = self.by_property.remove(&property) else {
				continue;
			};
			removed += subscribers.len();
			for computation in subscribers {
				if let Some(deps) = self.by_computation.get_mut(&computation) {
					deps.remove(&property);
					if deps.is_empty() {
						self.by_computation.remove(&computation);
					}
				}
			}
		}
		removed
	}

	/// Returns the computations subscribed to `key` on `container`.
	pub fn subscribers_of(&self, container: &ContainerId, key: &str) -> BTreeSet<ComputationId> {
		self.by_property
			.get(&PropertyKey::new(container.clone(), key))
			.cloned()
			.unwrap_or_default()
	}

	/// Returns the properties `computation` currently depends on.
	pub fn dependencies_of(&self, computation: &ComputationId) -> BTreeSet<PropertyKey> {
		self.by_computation
			.get(computation)
			.cloned()
			.unwrap_or_default()
	}

	/// Iterates over every edge in `(container, key, computation)` order.
	pub fn edges(&self) -> impl Iterator<Item = Subscription> + '_ {
		self.by_property.iter().flat_map(|(property, subscribers)| {
			subscribers.iter().map(move |computation| Subscription {
				container: property.container.clone(),
				key: property.key.clone(),
				computation: computation.clone(),
			})
		})
	}

	/// Returns the number of edges.
	pub fn len(&self) -> usize {
		self.by_property.values().map(BTreeSet::len).sum()
	}

	/// Returns `true` if the graph has no edges.
	pub fn is_empty(&self) -> bool {
		self.by_property.is_empty()
	}
}
