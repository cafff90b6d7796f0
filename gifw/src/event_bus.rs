//! Typed events exchanged between the engine, the controllers and the UI.
//!
//! Events are queued by [`EventBus::publish`] and handed out by the engine one by one, so a
//! handler publishing new events never re-enters another handler. Work that must wait until the
//! queue is empty is scheduled with [`EventBus::defer`].

use std::collections::VecDeque;

use maybe_sync::MaybeSend;

use crate::interaction::ModeKind;
use crate::layer::FeatureId;

/// Event published on the map.
#[derive(Debug, Clone, PartialEq)]
pub enum MapEvent {
    /// A layer was added to a group.
    LayerAdded {
        /// Id of the layer.
        layer_id: String,
    },
    /// A layer was removed.
    LayerRemoved {
        /// Id of the layer.
        layer_id: String,
    },
    /// A layer was shown or hidden.
    LayerVisibilityChanged {
        /// Id of the layer.
        layer_id: String,
        /// New visibility.
        visible: bool,
    },
    /// The user filter of a layer was applied or cleared.
    LayerFilterChanged {
        /// Id of the layer.
        layer_id: String,
    },
    /// State included in the permalink changed. The permalink is regenerated after a quiet period.
    PermalinkRequested,
    /// The permalink was regenerated.
    PermalinkUpdated(String),
    /// All interaction modes must deactivate.
    DeactivateInteractions,
    /// Interactions return to their default state.
    ResetInteractions,
    /// A controller became active.
    ModeActivated(ModeKind),
    /// A controller was deactivated.
    ModeDeactivated(ModeKind),
    /// The view started to move because of the user.
    MoveStart,
    /// Drawing of a feature was finished.
    DrawEnd {
        /// Layer of the feature.
        layer_id: String,
        /// Id of the feature.
        feature_id: FeatureId,
    },
    /// Editing of a feature geometry was finished.
    ModifyEnd {
        /// Layer of the feature.
        layer_id: String,
        /// Id of the feature.
        feature_id: FeatureId,
    },
    /// A feature was selected.
    FeatureSelected {
        /// Layer of the feature.
        layer_id: String,
        /// Id of the feature.
        feature_id: FeatureId,
        /// True if the selection was found by coordinates rather than by rendered pixels.
        synthetic: bool,
    },
}

/// Work carried out after all queued events are handled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeferredTask {
    /// Removes the feature from the layer.
    RemoveFeature {
        /// Layer of the feature.
        layer_id: String,
        /// Id of the feature.
        feature_id: FeatureId,
    },
    /// Removes the text annotation if its label is still empty.
    RemoveEmptyText {
        /// Layer of the feature.
        layer_id: String,
        /// Id of the feature.
        feature_id: FeatureId,
    },
}

/// Id of a subscription returned by [`EventBus::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Subscriber = Box<dyn FnMut(&MapEvent) + MaybeSend>;

/// Queue of map events with external subscribers.
#[derive(Default)]
pub struct EventBus {
    queue: VecDeque<MapEvent>,
    deferred: VecDeque<DeferredTask>,
    subscribers: Vec<(SubscriptionId, Subscriber)>,
    next_id: u64,
    subscribed: usize,
    unsubscribed: usize,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("queue", &self.queue)
            .field("deferred", &self.deferred)
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}

impl EventBus {
    /// Queues the event.
    pub fn publish(&mut self, event: MapEvent) {
        self.queue.push_back(event);
    }

    /// Schedules a task to run after the queue is drained.
    pub fn defer(&mut self, task: DeferredTask) {
        self.deferred.push_back(task);
    }

    /// Adds a subscriber called for every dispatched event.
    pub fn subscribe(
        &mut self,
        subscriber: impl FnMut(&MapEvent) + MaybeSend + 'static,
    ) -> SubscriptionId {
        self.next_id += 1;
        let id = SubscriptionId(self.next_id);
        self.subscribers.push((id, Box::new(subscriber)));
        self.subscribed += 1;
        id
    }

    /// Removes the subscriber. Returns false if it was already removed.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(sid, _)| *sid != id);
        let removed = self.subscribers.len() != before;
        if removed {
            self.unsubscribed += 1;
        }
        removed
    }

    /// Number of current subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Total number of subscriptions and unsubscriptions made.
    pub fn subscription_counters(&self) -> (usize, usize) {
        (self.subscribed, self.unsubscribed)
    }

    /// Returns true if events are waiting for dispatch.
    pub fn has_pending(&self) -> bool {
        !self.queue.is_empty()
    }

    /// Takes the next queued event.
    pub fn next_event(&mut self) -> Option<MapEvent> {
        self.queue.pop_front()
    }

    /// Takes the next deferred task.
    pub fn next_deferred(&mut self) -> Option<DeferredTask> {
        self.deferred.pop_front()
    }

    /// Calls every subscriber with the event.
    pub fn notify(&mut self, event: &MapEvent) {
        for (_, subscriber) in &mut self.subscribers {
            subscriber(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use parking_lot::Mutex;

    use super::*;

    #[test]
    fn subscribers_see_events_in_order() {
        let mut bus = EventBus::default();
        let seen = Arc::new(Mutex::new(vec![]));
        let sink = seen.clone();
        let id = bus.subscribe(move |event| sink.lock().push(event.clone()));

        bus.publish(MapEvent::MoveStart);
        bus.publish(MapEvent::PermalinkRequested);
        while let Some(event) = bus.next_event() {
            bus.notify(&event);
        }

        assert_eq!(
            *seen.lock(),
            vec![MapEvent::MoveStart, MapEvent::PermalinkRequested]
        );

        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        assert_eq!(bus.subscription_counters(), (1, 1));
        assert_eq!(bus.subscriber_count(), 0);
    }
}
