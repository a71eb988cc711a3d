//! Invalidation queue.

use indexmap::IndexSet;

use crate::ids::ComputationId;

/// Set of dirty computations awaiting a flush, kept in insertion order.
///
/// Inserting an id that is already queued is a no-op, so any number of
/// invalidations before a flush collapse into one entry.
#[derive(Debug, Default)]
pub struct InvalidationQueue {
	queued: IndexSet<ComputationId>,
}

impl InvalidationQueue {
	/// Creates an empty queue.
	pub fn new() -> Self {
		Self::default()
	}

	/// Queues `id`. Returns `false` if it was already queued.
	pub fn insert(&mut self, id: ComputationId) -> bool {
		self.queued.insert(id)
	}

	/// Removes `id`, keeping the remaining ids in order.
	pub fn remove(&mut self, id: &ComputationId) -> bool {
		self.queued.shift_remove(id)
	}

	/// Takes every queued id, oldest first, leaving the queue empty.
	pub fn drain(&mut self) -> Vec<ComputationId> {
		self.queued.drain(..).collect()
	}

	pub fn contains(&self, id: &ComputationId) -> bool {
		self.queued.contains(id)
	}

	pub fn len(&self) -> usize {
		self.queued.len()
	}

	pub fn is_empty(&self) -> bool {
		self.queued.is_empty()
	}

	/// Iterates over queued ids in flush order.
	pub fn iter(&self) -> impl Iterator<Item = &ComputationId> {
		self.queued.iter()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;

	#[rstest]
	fn test_double_insert_collapses() {
		let mut queue = InvalidationQueue::new();

		assert!(queue.insert(ComputationId::new("a")));
		assert!(!queue.insert(ComputationId::new("a")));

		assert_eq!(queue.len(), 1);
	}

	#[rstest]
	fn test_drain_keeps_insertion_order() {
		let mut queue = InvalidationQueue::new();
		for id in ["c2", "c0", "c1", "c0"] {
			queue.insert(ComputationId::new(id));
		}

		let drained = queue.drain();

		let ids: Vec<_> = drained.iter().map(ComputationId::as_str).collect();
		assert_eq!(ids, vec!["c2", "c0", "c1"]);
		assert!(queue.is_empty());
		assert!(queue.insert(ComputationId::new("c0")));
	}

	#[rstest]
	fn test_remove() {
		let mut queue = InvalidationQueue::new();
		queue.insert(ComputationId::new("a"));
		queue.insert(ComputationId::new("b"));

		assert!(queue.remove(&ComputationId::new("a")));
		assert!(!queue.remove(&ComputationId::new("a")));

		assert!(!queue.contains(&ComputationId::new("a")));
		assert_eq!(queue.iter().count(), 1);
	}

	#[rstest]
	fn test_remove_keeps_remaining_order() {
		let mut queue = InvalidationQueue::new();
		for id in ["c0", "c1", "c2", "c3"] {
			queue.insert(ComputationId::new(id));
		}

		queue.remove(&ComputationId::new("c1"));
		queue.insert(ComputationId::new("c1"));

		let ids: Vec<_> = queue.iter().map(ComputationId::as_str).collect();
		assert_eq!(ids, vec!["c0", "c2", "c3", "c1"]);
	}
}
