use crate::turret::AlarmAction;
use heapless::Vec;
use serde::{Deserialize, Serialize};
use thiserror::Error;

const MAX_SCHEDULED_ACTUATIONS: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SchedulerError {
    #[error("actuation queue full")]
    QueueFull,
    #[error("deadline {deadline} ms is before now ({now} ms)")]
    DeadlineInPast { deadline: u64, now: u64 },
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CadenceStats {
    pub ticks: u64,
    /// Polls that arrived one or more whole periods late.
    pub overruns: u32,
    /// Periods dropped by overruns. They are never replayed.
    pub skipped_periods: u64,
}

/// Fixed-period tick timer driven by an external millisecond clock.
///
/// A late poll fires once and the next deadline moves to the next period
/// boundary after `now`, so a stall never turns into a burst of ticks.
#[derive(Debug)]
pub struct TickCadence {
    period_ms: u64,
    next_deadline: Option<u64>,
    stats: CadenceStats,
}

impl TickCadence {
    pub fn new(period_ms: u32) -> Self {
        debug_assert!(period_ms > 0, "tick period must be non-zero");

        Self {
            period_ms: u64::from(period_ms.max(1)),
            next_deadline: None,
            stats: CadenceStats::default(),
        }
    }

    /// Returns true when a tick is due at `now`. The first poll always fires.
    pub fn poll(&mut self, now: u64) -> bool {
        let deadline = match self.next_deadline {
            None => {
                self.next_deadline = Some(now + self.period_ms);
                self.stats.ticks += 1;
                return true;
            }
            Some(deadline) => deadline,
        };

        if now < deadline {
            return false;
        }

        let missed = (now - deadline) / self.period_ms;
        if missed > 0 {
            self.stats.overruns = self.stats.overruns.saturating_add(1);
            self.stats.skipped_periods += missed;
        }
        self.next_deadline = Some(deadline + (missed + 1) * self.period_ms);
        self.stats.ticks += 1;
        true
    }

    pub fn period_ms(&self) -> u64 {
        self.period_ms
    }

    pub fn next_deadline(&self) -> Option<u64> {
        self.next_deadline
    }

    /// Forgets the phase; the next poll fires immediately.
    pub fn reset(&mut self) {
        self.next_deadline = None;
    }

    pub fn get_stats(&self) -> &CadenceStats {
        &self.stats
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledActuation {
    pub deadline: u64,
    pub action: AlarmAction,
    pub scheduled_at: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SchedulerStats {
    pub total_scheduled: u32,
    pub total_executed: u32,
    pub total_cancelled: u32,
    pub currently_scheduled: u8,
}

/// Deadline-ordered queue of pending buzzer actions.
#[derive(Debug, Default)]
pub struct ActuationScheduler {
    pending: Vec<ScheduledActuation, MAX_SCHEDULED_ACTUATIONS>,
    stats: SchedulerStats,
}

impl ActuationScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, action: AlarmAction, deadline: u64, now: u64) -> Result<(), SchedulerError> {
        if deadline < now {
            return Err(SchedulerError::DeadlineInPast { deadline, now });
        }

        let entry = ScheduledActuation {
            deadline,
            action,
            scheduled_at: now,
        };

        // Equal deadlines keep insertion order.
        let position = self
            .pending
            .iter()
            .position(|pending| pending.deadline > deadline)
            .unwrap_or(self.pending.len());

        self.pending
            .insert(position, entry)
            .map_err(|_| SchedulerError::QueueFull)?;

        self.stats.total_scheduled += 1;
        self.stats.currently_scheduled = self.pending.len() as u8;
        Ok(())
    }

    /// Removes and returns every action due at `now`, earliest first.
    pub fn take_due(&mut self, now: u64) -> Vec<ScheduledActuation, MAX_SCHEDULED_ACTUATIONS> {
        let due_count = self
            .pending
            .iter()
            .take_while(|pending| pending.deadline <= now)
            .count();

        let mut due = Vec::new();
        for _ in 0..due_count {
            let entry = self.pending.remove(0);
            // Capacities match, so this cannot overflow.
            let _ = due.push(entry);
        }

        self.stats.total_executed += due_count as u32;
        self.stats.currently_scheduled = self.pending.len() as u8;
        due
    }

    pub fn next_deadline(&self) -> Option<u64> {
        self.pending.first().map(|pending| pending.deadline)
    }

    pub fn cancel_all(&mut self) {
        self.stats.total_cancelled += self.pending.len() as u32;
        self.pending.clear();
        self.stats.currently_scheduled = 0;
    }

    pub fn pending(&self) -> &[ScheduledActuation] {
        &self.pending
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn get_stats(&self) -> &SchedulerStats {
        &self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sound(frequency_hz: u16) -> AlarmAction {
        AlarmAction::Sound {
            frequency_hz,
            duration_ms: 5,
        }
    }

    #[test]
    fn test_first_poll_fires() {
        let mut cadence = TickCadence::new(30);
        assert!(cadence.poll(500));
        assert_eq!(cadence.next_deadline(), Some(530));
    }

    #[test]
    fn test_cadence_waits_for_period() {
        let mut cadence = TickCadence::new(30);
        assert!(cadence.poll(0));
        assert!(!cadence.poll(10));
        assert!(!cadence.poll(29));
        assert!(cadence.poll(30));
        assert!(!cadence.poll(31));
        assert!(cadence.poll(61));
        assert_eq!(cadence.next_deadline(), Some(90));
    }

    #[test]
    fn test_late_poll_skips_instead_of_bursting() {
        let mut cadence = TickCadence::new(30);
        assert!(cadence.poll(0));

        // Stalled for a little over three periods.
        assert!(cadence.poll(100));
        assert!(!cadence.poll(100));
        assert!(!cadence.poll(119));
        assert!(cadence.poll(120));

        let stats = cadence.get_stats();
        assert_eq!(stats.ticks, 3);
        assert_eq!(stats.overruns, 1);
        assert_eq!(stats.skipped_periods, 2);
    }

    #[test]
    fn test_actuations_come_out_in_deadline_order() {
        let mut scheduler = ActuationScheduler::new();
        scheduler.schedule(AlarmAction::Silence, 25, 0).unwrap();
        scheduler.schedule(sound(2000), 0, 0).unwrap();
        scheduler.schedule(sound(1000), 10, 0).unwrap();

        let due = scheduler.take_due(10);
        assert_eq!(due.len(), 2);
        assert_eq!(due[0].action, sound(2000));
        assert_eq!(due[1].action, sound(1000));

        assert!(scheduler.take_due(24).is_empty());
        let due = scheduler.take_due(25);
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].action, AlarmAction::Silence);
        assert!(scheduler.is_empty());
        assert_eq!(scheduler.get_stats().total_executed, 3);
    }

    #[test]
    fn test_equal_deadlines_keep_insertion_order() {
        let mut scheduler = ActuationScheduler::new();
        scheduler.schedule(sound(1000), 5, 0).unwrap();
        scheduler.schedule(AlarmAction::Silence, 5, 0).unwrap();

        let due = scheduler.take_due(5);
        assert_eq!(due[0].action, sound(1000));
        assert_eq!(due[1].action, AlarmAction::Silence);
    }

    #[test]
    fn test_past_deadline_rejected() {
        let mut scheduler = ActuationScheduler::new();
        let result = scheduler.schedule(AlarmAction::Silence, 10, 20);
        assert_eq!(result, Err(SchedulerError::DeadlineInPast { deadline: 10, now: 20 }));
    }

    #[test]
    fn test_queue_full() {
        let mut scheduler = ActuationScheduler::new();
        for i in 0..MAX_SCHEDULED_ACTUATIONS as u64 {
            scheduler.schedule(AlarmAction::Silence, i, 0).unwrap();
        }
        assert_eq!(
            scheduler.schedule(AlarmAction::Silence, 100, 0),
            Err(SchedulerError::QueueFull)
        );
    }

    #[test]
    fn test_cancel_all() {
        let mut scheduler = ActuationScheduler::new();
        scheduler.schedule(sound(1000), 5, 0).unwrap();
        scheduler.schedule(AlarmAction::Silence, 15, 0).unwrap();
        scheduler.cancel_all();

        assert!(scheduler.take_due(100).is_empty());
        assert_eq!(scheduler.get_stats().total_cancelled, 2);
        assert_eq!(scheduler.next_deadline(), None);
    }
}
