//! Cooperative scheduler: timers raise due flags, the run loop takes and services them.
//!
//! Each concern has a depth-1 single-producer/single-consumer channel. Raising a flag is the
//! only thing a timer may do; all network work happens after `take_due` on the run loop.

use std::sync::mpsc::{self, Receiver, SyncSender, TryRecvError, TrySendError};
use std::time::Duration;

use serde::Deserialize;

/// Periodic concerns, in the order they are serviced within one loop iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Concern {
    Availability,
    KeepAlive,
    Attributes,
}

impl Concern {
    pub const ALL: [Concern; 3] = [Concern::Availability, Concern::KeepAlive, Concern::Attributes];
}

/// Timer-side handle for one concern. Cloneable; raising is idempotent and never blocks.
#[derive(Debug, Clone)]
pub struct DueFlag {
    concern: Concern,
    tx: SyncSender<()>,
}

impl DueFlag {
    pub fn concern(&self) -> Concern {
        self.concern
    }

    /// Mark the concern due. Returns false once the run loop side has been dropped.
    pub fn raise(&self) -> bool {
        match self.tx.try_send(()) {
            Ok(()) | Err(TrySendError::Full(())) => true,
            Err(TrySendError::Disconnected(())) => false,
        }
    }
}

/// Timer-side handles, one per concern.
#[derive(Debug, Clone)]
pub struct Triggers {
    pub availability: DueFlag,
    pub keep_alive: DueFlag,
    pub attributes: DueFlag,
}

impl Triggers {
    pub fn get(&self, concern: Concern) -> &DueFlag {
        match concern {
            Concern::Availability => &self.availability,
            Concern::KeepAlive => &self.keep_alive,
            Concern::Attributes => &self.attributes,
        }
    }
}

/// Run-loop side: observes and clears due flags.
#[derive(Debug)]
pub struct Scheduler {
    availability: Receiver<()>,
    keep_alive: Receiver<()>,
    attributes: Receiver<()>,
}

fn flag(concern: Concern) -> (DueFlag, Receiver<()>) {
    let (tx, rx) = mpsc::sync_channel(1);
    (DueFlag { concern, tx }, rx)
}

impl Scheduler {
    /// Create the scheduler and its triggers. Availability and keep-alive start raised so the
    /// first loop iteration connects and announces.
    pub fn new() -> (Scheduler, Triggers) {
        let (availability, availability_rx) = flag(Concern::Availability);
        let (keep_alive, keep_alive_rx) = flag(Concern::KeepAlive);
        let (attributes, attributes_rx) = flag(Concern::Attributes);
        availability.raise();
        keep_alive.raise();
        (
            Scheduler {
                availability: availability_rx,
                keep_alive: keep_alive_rx,
                attributes: attributes_rx,
            },
            Triggers {
                availability,
                keep_alive,
                attributes,
            },
        )
    }

    fn take(rx: &Receiver<()>) -> bool {
        match rx.try_recv() {
            Ok(()) => true,
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => false,
        }
    }

    /// Clear and return every due concern, in `Concern::ALL` order.
    pub fn take_due(&self) -> Vec<Concern> {
        Concern::ALL
            .into_iter()
            .filter(|c| {
                Self::take(match c {
                    Concern::Availability => &self.availability,
                    Concern::KeepAlive => &self.keep_alive,
                    Concern::Attributes => &self.attributes,
                })
            })
            .collect()
    }
}

/// Trigger periods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Intervals {
    #[serde(default = "default_availability_secs")]
    pub availability_secs: u64,
    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_secs: u64,
    #[serde(default = "default_attributes_secs")]
    pub attributes_secs: u64,
}

fn default_availability_secs() -> u64 {
    5
}

fn default_keep_alive_secs() -> u64 {
    10
}

fn default_attributes_secs() -> u64 {
    60
}

impl Default for Intervals {
    fn default() -> Self {
        Self {
            availability_secs: default_availability_secs(),
            keep_alive_secs: default_keep_alive_secs(),
            attributes_secs: default_attributes_secs(),
        }
    }
}

impl Intervals {
    pub fn period(&self, concern: Concern) -> Duration {
        Duration::from_secs(match concern {
            Concern::Availability => self.availability_secs,
            Concern::KeepAlive => self.keep_alive_secs,
            Concern::Attributes => self.attributes_secs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_with_availability_and_keep_alive_due() {
        let (s, _t) = Scheduler::new();
        assert_eq!(s.take_due(), vec![Concern::Availability, Concern::KeepAlive]);
        assert!(s.take_due().is_empty());
    }

    #[test]
    fn raise_is_idempotent_until_taken() {
        let (s, t) = Scheduler::new();
        s.take_due();
        assert!(t.attributes.raise());
        assert!(t.attributes.raise());
        assert!(t.attributes.raise());
        assert_eq!(s.take_due(), vec![Concern::Attributes]);
        assert!(s.take_due().is_empty());
    }

    #[test]
    fn due_order_is_fixed() {
        let (s, t) = Scheduler::new();
        s.take_due();
        t.attributes.raise();
        t.keep_alive.raise();
        t.availability.raise();
        assert_eq!(s.take_due(), Concern::ALL.to_vec());
    }

    #[test]
    fn raise_from_another_thread() {
        let (s, t) = Scheduler::new();
        s.take_due();
        let flag = t.get(Concern::KeepAlive).clone();
        std::thread::spawn(move || flag.raise()).join().unwrap();
        assert_eq!(s.take_due(), vec![Concern::KeepAlive]);
    }

    #[test]
    fn raise_reports_dropped_scheduler() {
        let (s, t) = Scheduler::new();
        drop(s);
        assert!(!t.keep_alive.raise());
    }

    #[test]
    fn interval_defaults() {
        let i = Intervals::default();
        assert_eq!(i.period(Concern::Availability), Duration::from_secs(5));
        assert_eq!(i.period(Concern::KeepAlive), Duration::from_secs(10));
        assert_eq!(i.period(Concern::Attributes), Duration::from_secs(60));
        let partial: Intervals = serde_json::from_str(r#"{"keep_alive_secs":3}"#).unwrap();
        assert_eq!(partial.keep_alive_secs, 3);
        assert_eq!(partial.attributes_secs, 60);
    }
}
