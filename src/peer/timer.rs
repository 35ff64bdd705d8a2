use std::{
    collections::{BTreeMap, HashMap},
    time::{Duration, Instant},
};

/// What a timer entry fires against: a dialog in the peer's table, or a
/// registrar-side registration record awaiting expiry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum TimerTarget {
    Dialog(u16),
    Registration(String),
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct TimerKey {
    execute_at: Instant,
    id: u64,
}

/// Timer queue for the protocol task.
///
/// Entries are kept in an ordered map keyed by (fire time, id) with a
/// side index from id to fire time, so insertion, cancellation by id and
/// popping the earliest entry are all logarithmic. Ids start at 1; 0 is
/// reserved to mean "no timer pending" on a dialog.
///
/// The queue is owned by the protocol task and needs no locking.
pub(crate) struct TimerQueue {
    entries: BTreeMap<TimerKey, TimerTarget>,
    id_index: HashMap<u64, Instant>,
    next_id: u64,
}

impl TimerQueue {
    pub fn new() -> Self {
        TimerQueue {
            entries: BTreeMap::new(),
            id_index: HashMap::new(),
            next_id: 1,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn schedule(&mut self, after: Duration, target: TimerTarget) -> u64 {
        self.schedule_at(Instant::now() + after, target)
    }

    pub fn schedule_at(&mut self, execute_at: Instant, target: TimerTarget) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.entries.insert(TimerKey { execute_at, id }, target);
        self.id_index.insert(id, execute_at);
        id
    }

    pub fn cancel(&mut self, id: u64) -> Option<TimerTarget> {
        let execute_at = self.id_index.remove(&id)?;
        self.entries.remove(&TimerKey { execute_at, id })
    }

    pub fn contains(&self, id: u64) -> bool {
        self.id_index.contains_key(&id)
    }

    /// Fire time of the earliest entry, if any.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.entries.keys().next().map(|k| k.execute_at)
    }

    /// Remove and return the earliest entry that is due at `now`. Called
    /// in a loop so that entries becoming due while earlier ones are
    /// processed also run in the same pass.
    pub fn pop_due(&mut self, now: Instant) -> Option<(u64, TimerTarget)> {
        let key = self.entries.keys().next()?.clone();
        if key.execute_at > now {
            return None;
        }
        let target = self.entries.remove(&key)?;
        self.id_index.remove(&key.id);
        Some((key.id, target))
    }
}

#[test]
fn test_timer_queue() {
    let mut timers = TimerQueue::new();
    let now = Instant::now();

    let id = timers.schedule_at(now, TimerTarget::Dialog(7));
    assert_eq!(id, 1);
    assert!(timers.contains(id));
    assert_eq!(timers.cancel(id), Some(TimerTarget::Dialog(7)));
    assert_eq!(timers.cancel(id), None);
    assert!(!timers.contains(id));

    let late = timers.schedule_at(now + Duration::from_millis(500), TimerTarget::Dialog(2));
    let early = timers.schedule_at(now, TimerTarget::Dialog(1));
    assert_eq!(timers.next_deadline(), Some(now));

    // earliest first, regardless of insertion order
    assert_eq!(timers.pop_due(now), Some((early, TimerTarget::Dialog(1))));
    assert_eq!(timers.pop_due(now), None);
    assert_eq!(timers.len(), 1);
    assert_eq!(
        timers.pop_due(now + Duration::from_secs(1)),
        Some((late, TimerTarget::Dialog(2)))
    );
    assert_eq!(timers.len(), 0);
    assert_eq!(timers.next_deadline(), None);
}

#[test]
fn test_timer_queue_registration_target() {
    let mut timers = TimerQueue::new();
    let now = Instant::now();
    let id = timers.schedule_at(now, TimerTarget::Registration("alice".to_string()));
    assert_eq!(
        timers.pop_due(now),
        Some((id, TimerTarget::Registration("alice".to_string())))
    );
}
