//! Andon escalation/resolution timer wheel (spec §4.6, §5).
//!
//! Grounded on the teacher's `optimization/rate_limiter.rs` per-key
//! bookkeeping in a `HashMap` keyed by the thing being timed, generalized
//! from a single cooldown instant to an independent acknowledgment and
//! resolution deadline per event, and on `fleet/queue.rs`'s
//! durable-retry posture for surviving a restart: deadlines are
//! recomputed from `reported_at`/`escalated_at` rather than from an
//! in-memory `Instant`, so a missed deadline fires immediately instead of
//! being silently lost (spec §4.6 "Reliability").

use super::types::AndonPriority;
use crate::config::AndonThresholds;
use crate::ids::{AndonEventId, UserId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;

fn to_chrono(d: std::time::Duration) -> chrono::Duration {
    chrono::Duration::from_std(d).unwrap_or(chrono::Duration::zero())
}

#[derive(Debug, Clone, Copy)]
struct TimerEntry {
    priority: AndonPriority,
    ack_deadline: Option<DateTime<Utc>>,
    resolution_deadline: Option<DateTime<Utc>>,
}

/// Escalation recipients for a given priority. Population is left to the
/// external user-management system (spec §9 Open Question (c)); the
/// engine only needs to know *who to notify*, not how the directory is
/// built.
#[async_trait]
pub trait RecipientDirectory: Send + Sync {
    async fn on_call_for(&self, priority: AndonPriority) -> Vec<UserId>;
}

/// Default directory used in tests and default wiring: nobody is
/// notified. A real deployment injects its own implementation.
#[derive(Debug, Default)]
pub struct NullDirectory;

#[async_trait]
impl RecipientDirectory for NullDirectory {
    async fn on_call_for(&self, _priority: AndonPriority) -> Vec<UserId> {
        Vec::new()
    }
}

/// A single firing of an escalation or resolution timer, appended to the
/// `andon_escalations` table (spec §6 "one row per timer firing").
#[derive(Debug, Clone)]
pub struct EscalationRecord {
    pub event_id: AndonEventId,
    pub kind: EscalationKind,
    pub from_priority: AndonPriority,
    pub to_priority: AndonPriority,
    pub escalation_level: u32,
    pub fired_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscalationKind {
    Acknowledgment,
    Resolution,
}

/// Per-event timer state. One entry per non-terminal `AndonEvent`.
#[derive(Debug, Default)]
pub struct TimerWheel {
    entries: DashMap<AndonEventId, TimerEntry>,
}

impl TimerWheel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arms both timers on event creation (spec §4.6 "On creation, the
    /// engine arms two timers").
    pub fn arm(&self, event_id: AndonEventId, priority: AndonPriority, reference: DateTime<Utc>) {
        self.entries.insert(
            event_id,
            TimerEntry {
                priority,
                ack_deadline: Some(reference + to_chrono(AndonThresholds::ack_timeout(priority))),
                resolution_deadline: Some(reference + to_chrono(AndonThresholds::resolution_timeout(priority))),
            },
        );
    }

    /// Re-arms the acknowledgment timer after an escalation, at the
    /// escalated (next-higher, clamped) priority, from the escalation
    /// instant (spec §4.6 "re-armed with the next-higher priority's
    /// timeouts (critical clamps)").
    pub fn rearm_after_escalation(&self, event_id: AndonEventId, new_priority: AndonPriority, reference: DateTime<Utc>) {
        self.entries.insert(
            event_id,
            TimerEntry {
                priority: new_priority,
                ack_deadline: Some(reference + to_chrono(AndonThresholds::ack_timeout(new_priority))),
                resolution_deadline: Some(reference + to_chrono(AndonThresholds::resolution_timeout(new_priority))),
            },
        );
    }

    /// Acknowledging cancels the acknowledgment timer; the resolution
    /// timer continues (spec §4.6 "acknowledge: ... cancels
    /// acknowledgment timer; resolution timer continues").
    pub fn cancel_acknowledgment(&self, event_id: AndonEventId) {
        if let Some(mut entry) = self.entries.get_mut(&event_id) {
            entry.ack_deadline = None;
        }
    }

    /// Resolving cancels all remaining timers for the event (spec §4.6).
    pub fn cancel_all(&self, event_id: AndonEventId) {
        self.entries.remove(&event_id);
    }

    /// Rehydrates a non-terminal event's timers on restart from its
    /// `reported_at`/`escalated_at` reference instant, so a deadline
    /// already in the past fires on the very next scan instead of being
    /// lost (spec §4.6 "Reliability").
    pub fn rehydrate(&self, event_id: AndonEventId, priority: AndonPriority, reference: DateTime<Utc>, ack_already_fired: bool) {
        self.entries.insert(
            event_id,
            TimerEntry {
                priority,
                ack_deadline: if ack_already_fired {
                    None
                } else {
                    Some(reference + to_chrono(AndonThresholds::ack_timeout(priority)))
                },
                resolution_deadline: Some(reference + to_chrono(AndonThresholds::resolution_timeout(priority))),
            },
        );
    }

    /// Acknowledgment deadlines that have passed as of `now`. Clears the
    /// deadline so it doesn't refire; the caller is responsible for
    /// re-arming via `rearm_after_escalation` once the escalation is
    /// applied.
    pub fn due_acknowledgment(&self, now: DateTime<Utc>) -> Vec<(AndonEventId, AndonPriority)> {
        let mut due = Vec::new();
        for mut entry in self.entries.iter_mut() {
            if let Some(deadline) = entry.ack_deadline {
                if deadline <= now {
                    due.push((*entry.key(), entry.priority));
                    entry.ack_deadline = None;
                }
            }
        }
        due
    }

    /// Resolution deadlines that have passed as of `now`. Fires once per
    /// arm/rearm cycle.
    pub fn due_resolution(&self, now: DateTime<Utc>) -> Vec<(AndonEventId, AndonPriority)> {
        let mut due = Vec::new();
        for mut entry in self.entries.iter_mut() {
            if let Some(deadline) = entry.resolution_deadline {
                if deadline <= now {
                    due.push((*entry.key(), entry.priority));
                    entry.resolution_deadline = None;
                }
            }
        }
        due
    }

    pub fn is_armed(&self, event_id: AndonEventId) -> bool {
        self.entries.contains_key(&event_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn arming_sets_both_deadlines() {
        let wheel = TimerWheel::new();
        let id = AndonEventId::new();
        let now = Utc::now();
        wheel.arm(id, AndonPriority::Medium, now);
        assert!(wheel.is_armed(id));
    }

    #[test]
    fn acknowledgment_cancel_leaves_resolution_armed() {
        let wheel = TimerWheel::new();
        let id = AndonEventId::new();
        let now = Utc::now();
        wheel.arm(id, AndonPriority::Medium, now);
        wheel.cancel_acknowledgment(id);
        let due = wheel.due_resolution(now + Duration::minutes(46));
        assert_eq!(due.len(), 1);
    }

    #[test]
    fn resolve_cancels_everything() {
        let wheel = TimerWheel::new();
        let id = AndonEventId::new();
        let now = Utc::now();
        wheel.arm(id, AndonPriority::Medium, now);
        wheel.cancel_all(id);
        assert!(!wheel.is_armed(id));
        assert!(wheel.due_acknowledgment(now + Duration::hours(1)).is_empty());
    }

    #[test]
    fn acknowledgment_deadline_fires_at_exact_boundary() {
        let wheel = TimerWheel::new();
        let id = AndonEventId::new();
        let now = Utc::now();
        wheel.arm(id, AndonPriority::Medium, now);
        let deadline = now + to_chrono(AndonThresholds::ack_timeout(AndonPriority::Medium));
        let due = wheel.due_acknowledgment(deadline);
        assert_eq!(due.len(), 1);
    }

    #[test]
    fn rehydrate_with_already_fired_ack_skips_it() {
        let wheel = TimerWheel::new();
        let id = AndonEventId::new();
        let now = Utc::now();
        wheel.rehydrate(id, AndonPriority::High, now, true);
        assert!(wheel.due_acknowledgment(now + Duration::hours(1)).is_empty());
    }
}
