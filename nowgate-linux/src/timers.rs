//! Periodic trigger tasks. Each one only raises its due flag; the run loop does the work.

use nowgate_core::{Concern, Intervals, Triggers};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::debug;

/// Running trigger tasks; aborted on drop so a finished session stops re-arming.
pub struct Timers {
    handles: Vec<JoinHandle<()>>,
}

impl Timers {
    pub fn spawn(triggers: &Triggers, intervals: &Intervals) -> Self {
        let handles = Concern::ALL
            .into_iter()
            .map(|concern| {
                let flag = triggers.get(concern).clone();
                let period = intervals.period(concern);
                tokio::spawn(async move {
                    let mut tick = time::interval_at(Instant::now() + period, period);
                    tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
                    loop {
                        tick.tick().await;
                        if !flag.raise() {
                            debug!(concern = ?flag.concern(), "run loop gone; timer stopped");
                            break;
                        }
                    }
                })
            })
            .collect();
        Self { handles }
    }
}

impl Drop for Timers {
    fn drop(&mut self) {
        for h in &self.handles {
            h.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nowgate_core::Scheduler;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn raises_on_period() {
        let (scheduler, triggers) = Scheduler::new();
        scheduler.take_due();
        let intervals = Intervals {
            availability_secs: 5,
            keep_alive_secs: 10,
            attributes_secs: 60,
        };
        let _timers = Timers::spawn(&triggers, &intervals);

        time::sleep(Duration::from_millis(5_100)).await;
        assert_eq!(scheduler.take_due(), vec![Concern::Availability]);

        time::sleep(Duration::from_secs(5)).await;
        assert_eq!(
            scheduler.take_due(),
            vec![Concern::Availability, Concern::KeepAlive]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_timers_stop() {
        let (scheduler, triggers) = Scheduler::new();
        scheduler.take_due();
        let timers = Timers::spawn(&triggers, &Intervals::default());
        drop(timers);
        time::sleep(Duration::from_secs(120)).await;
        assert!(scheduler.take_due().is_empty());
    }
}
