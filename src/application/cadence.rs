use crate::config::ScheduleSettings;
use std::time::Duration;

/// What a failed poll should trigger, given the attempt count it just reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CadenceAction {
    None,
    Remind,
    Escalate,
}

/// Converts wall-clock reminder spacing into attempt counts at the polling interval.
///
/// With a 5 minute interval the first reminder is due at attempt 6 (30 minutes), then
/// every 12 attempts (18, 30, 42, ...), and the order fails at `max_attempts`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReminderCadence {
    pub first_reminder_attempt: u32,
    pub reminder_every_attempts: u32,
    pub max_attempts: u32,
    pub interval: Duration,
}

impl ReminderCadence {
    /// Creates a new cadence from the `[schedule]` settings.
    pub fn from_settings(settings: &ScheduleSettings) -> Self {
        let interval = settings.interval_secs.max(1);
        let attempts = |secs: u64| -> u32 {
            u32::try_from((secs / interval).max(1)).unwrap_or(u32::MAX)
        };
        Self {
            first_reminder_attempt: attempts(settings.first_reminder_after_secs),
            reminder_every_attempts: attempts(settings.reminder_every_secs),
            max_attempts: settings.max_attempts.max(1),
            interval: Duration::from_secs(interval),
        }
    }

    pub fn reminder_due(&self, attempts: u32) -> bool {
        attempts >= self.first_reminder_attempt
            && (attempts - self.first_reminder_attempt) % self.reminder_every_attempts == 0
    }

    pub fn action_for(&self, attempts: u32) -> CadenceAction {
        if attempts >= self.max_attempts {
            CadenceAction::Escalate
        } else if self.reminder_due(attempts) {
            CadenceAction::Remind
        } else {
            CadenceAction::None
        }
    }
}

impl Default for ReminderCadence {
    fn default() -> Self {
        Self::from_settings(&ScheduleSettings::default())
    }
}
