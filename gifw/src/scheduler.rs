//! Timers owned by interaction controllers.

use std::time::Duration;

use web_time::Instant;

use crate::interaction::ModeKind;

/// Id of a scheduled timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

#[derive(Debug, Clone)]
struct Timer {
    id: TimerId,
    owner: ModeKind,
    due: Instant,
    interval: Option<Duration>,
}

/// Timer that has become due.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FiredTimer {
    /// Id of the timer.
    pub id: TimerId,
    /// Controller that scheduled the timer.
    pub owner: ModeKind,
}

/// List of one-shot and recurring timers.
#[derive(Debug, Default)]
pub struct Scheduler {
    timers: Vec<Timer>,
    next_id: u64,
}

impl Scheduler {
    /// Schedules a timer firing once after `delay`.
    pub fn schedule_once(&mut self, owner: ModeKind, now: Instant, delay: Duration) -> TimerId {
        self.insert(owner, now + delay, None)
    }

    /// Schedules a timer firing every `interval`, the first time after one interval.
    pub fn schedule_recurring(
        &mut self,
        owner: ModeKind,
        now: Instant,
        interval: Duration,
    ) -> TimerId {
        self.insert(owner, now + interval, Some(interval))
    }

    fn insert(&mut self, owner: ModeKind, due: Instant, interval: Option<Duration>) -> TimerId {
        self.next_id += 1;
        let id = TimerId(self.next_id);
        self.timers.push(Timer {
            id,
            owner,
            due,
            interval,
        });

        id
    }

    /// Cancels the timer. Returns false if the timer has already fired or was cancelled.
    pub fn cancel(&mut self, id: TimerId) -> bool {
        let count = self.timers.len();
        self.timers.retain(|t| t.id != id);
        count != self.timers.len()
    }

    /// Cancels all timers of the owner.
    pub fn cancel_owned_by(&mut self, owner: ModeKind) {
        self.timers.retain(|t| t.owner != owner);
    }

    /// Returns true if the timer is still scheduled.
    pub fn is_scheduled(&self, id: TimerId) -> bool {
        self.timers.iter().any(|t| t.id == id)
    }

    /// Number of scheduled timers.
    pub fn len(&self) -> usize {
        self.timers.len()
    }

    /// Returns true if no timers are scheduled.
    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }

    /// Returns timers that are due at `now` in the order of their due time. One-shot timers are
    /// removed, recurring ones are moved to their next due time. A recurring timer fires at most
    /// once per call.
    pub fn take_due(&mut self, now: Instant) -> Vec<FiredTimer> {
        let mut due: Vec<(Instant, FiredTimer)> = self
            .timers
            .iter()
            .filter(|t| t.due <= now)
            .map(|t| {
                (
                    t.due,
                    FiredTimer {
                        id: t.id,
                        owner: t.owner,
                    },
                )
            })
            .collect();
        due.sort_by_key(|(at, fired)| (*at, fired.id));

        self.timers.retain_mut(|t| {
            if t.due > now {
                return true;
            }

            match t.interval {
                Some(interval) => {
                    while t.due <= now {
                        t.due += interval;
                    }
                    true
                }
                None => false,
            }
        });

        due.into_iter().map(|(_, fired)| fired).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_shot_fires_once() {
        let start = Instant::now();
        let mut scheduler = Scheduler::default();
        let id = scheduler.schedule_once(ModeKind::Annotate, start, Duration::from_secs(1));

        assert!(scheduler.take_due(start).is_empty());
        let fired = scheduler.take_due(start + Duration::from_secs(1));
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].id, id);
        assert!(scheduler.is_empty());
    }

    #[test]
    fn recurring_timer_keeps_firing() {
        let start = Instant::now();
        let mut scheduler = Scheduler::default();
        let id =
            scheduler.schedule_recurring(ModeKind::Geolocation, start, Duration::from_secs(10));

        assert!(scheduler.take_due(start + Duration::from_secs(9)).is_empty());
        assert_eq!(scheduler.take_due(start + Duration::from_secs(10)).len(), 1);
        assert!(scheduler.take_due(start + Duration::from_secs(15)).is_empty());
        assert_eq!(scheduler.take_due(start + Duration::from_secs(20)).len(), 1);

        assert!(scheduler.cancel(id));
        assert!(!scheduler.cancel(id));
        assert!(scheduler.take_due(start + Duration::from_secs(60)).is_empty());
    }
}
