//! Event bus port — publish/subscribe for audit events.

use std::future::Future;

use taskflow_domain::error::TaskflowError;
use taskflow_domain::event::Event;

/// Publishes audit events to interested subscribers.
pub trait EventPublisher {
    /// Publish an event to all current subscribers.
    fn publish(&self, event: Event) -> impl Future<Output = Result<(), TaskflowError>> + Send;
}

impl<T: EventPublisher + Send + Sync> EventPublisher for std::sync::Arc<T> {
    fn publish(&self, event: Event) -> impl Future<Output = Result<(), TaskflowError>> + Send {
        (**self).publish(event)
    }
}
