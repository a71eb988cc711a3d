//! Renderer-facing notifications.
//!
//! After each re-execution the runtime tells a [`RenderSink`] what the
//! computation produced, or why it failed. What happens to the output from
//! there (diffing, painting, streaming) is the sink's business.

use futures::channel::mpsc;
use serde_json::Value;

use crate::error::ComputationError;
use crate::ids::ComputationId;

/// Receives the outcome of every computation run by a flush.
pub trait RenderSink {
	/// A computation re-ran and produced `output`.
	fn on_render(&self, id: &ComputationId, output: &Value);

	/// A computation failed. It stays in the error state until it runs again.
	fn on_error(&self, id: &ComputationId, error: &ComputationError);
}

/// Default sink: logs outcomes through `tracing` and discards them.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl RenderSink for LogSink {
	fn on_render(&self, id: &ComputationId, _output: &Value) {
		tracing::debug!(computation = %id, "computation rendered");
	}

	fn on_error(&self, id: &ComputationId, error: &ComputationError) {
		tracing::error!(computation = %id, error = %error, "computation failed");
	}
}

/// An outcome delivered by [`ChannelSink`].
#[derive(Debug, Clone, PartialEq)]
pub enum RenderEvent {
	/// A computation produced output.
	Rendered {
		/// The computation.
		id: ComputationId,
		/// Its output.
		output: Value,
	},
	/// A computation failed.
	Failed {
		/// The computation.
		id: ComputationId,
		/// The reported failure.
		error: ComputationError,
	},
}

impl RenderEvent {
	/// The computation this event is about.
	pub fn id(&self) -> &ComputationId {
		match self {
			Self::Rendered { id, .. } | Self::Failed { id, .. } => id,
		}
	}
}

/// Sink that forwards outcomes over an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
	sender: mpsc::UnboundedSender<RenderEvent>,
}

impl ChannelSink {
	/// Creates a sink and the receiving half of its channel.
	pub fn new() -> (Self, mpsc::UnboundedReceiver<RenderEvent>) {
		let (sender, receiver) = mpsc::unbounded();
		(Self { sender }, receiver)
	}

	fn send(&self, event: RenderEvent) {
		if self.sender.unbounded_send(event).is_err() {
			tracing::debug!("render event dropped, receiver is closed");
		}
	}
}

impl RenderSink for ChannelSink {
	fn on_render(&self, id: &ComputationId, output: &Value) {
		self.send(RenderEvent::Rendered {
			id: id.clone(),
			output: output.clone(),
		});
	}

	fn on_error(&self, id: &ComputationId, error: &ComputationError) {
		self.send(RenderEvent::Failed {
			id: id.clone(),
			error: error.clone(),
		});
	}
}
