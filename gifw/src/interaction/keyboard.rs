use futures::future::AbortHandle;

use crate::interaction::ModeKind;

/// Keyboard listeners of the interaction modes.
///
/// A listener lives until the [`AbortHandle`] returned by [`KeyboardListeners::register`] is
/// aborted. Aborted listeners never receive keys and are dropped on the next
/// [`KeyboardListeners::purge`].
#[derive(Debug, Default)]
pub struct KeyboardListeners {
    listeners: Vec<(ModeKind, AbortHandle)>,
    registered: usize,
    released: usize,
}

impl KeyboardListeners {
    /// Registers a listener for the mode.
    pub fn register(&mut self, owner: ModeKind) -> AbortHandle {
        let (handle, _registration) = AbortHandle::new_pair();
        self.listeners.push((owner, handle.clone()));
        self.registered += 1;
        handle
    }

    /// Drops aborted listeners.
    pub fn purge(&mut self) {
        let before = self.listeners.len();
        self.listeners.retain(|(_, handle)| !handle.is_aborted());
        self.released += before - self.listeners.len();
    }

    /// Modes with a live listener, in registration order.
    pub fn live_owners(&self) -> Vec<ModeKind> {
        self.listeners
            .iter()
            .filter(|(_, handle)| !handle.is_aborted())
            .map(|(owner, _)| *owner)
            .collect()
    }

    /// Number of live listeners.
    pub fn live_count(&self) -> usize {
        self.listeners
            .iter()
            .filter(|(_, handle)| !handle.is_aborted())
            .count()
    }

    /// Total number of registered and purged listeners.
    pub fn counters(&self) -> (usize, usize) {
        (self.registered, self.released)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aborted_listeners_are_dead() {
        let mut listeners = KeyboardListeners::default();
        let annotate = listeners.register(ModeKind::Annotate);
        let _measure = listeners.register(ModeKind::Measure);

        annotate.abort();
        assert_eq!(listeners.live_owners(), vec![ModeKind::Measure]);

        listeners.purge();
        assert_eq!(listeners.counters(), (2, 1));
        assert_eq!(listeners.live_count(), 1);
    }
}
