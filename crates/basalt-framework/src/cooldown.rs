//! Per-command, per-user cooldowns.

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

use basalt_core::UserId;

/// Longest cooldown that is tracked; longer ones are clamped to it.
pub const MAX_COOLDOWN: Duration = Duration::from_secs(30 * 365 * 24 * 60 * 60);

/// Tracks when each user may next run each command.
///
/// An entry only means something while `now < expiry`; stale entries are
/// dropped when checked and by [`sweep`](Self::sweep).
#[derive(Debug, Default)]
pub struct CooldownTracker {
    table: Mutex<HashMap<String, HashMap<UserId, Instant>>>,
}

impl CooldownTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the whole seconds left on `user`'s cooldown for `command`,
    /// rounded up, or `None` if there is no active cooldown.
    pub fn check(&self, command: &str, user: UserId) -> Option<u64> {
        let now = Instant::now();
        let mut table = self.table.lock();
        let users = table.get_mut(command)?;
        let expiry = *users.get(&user)?;

        if now < expiry {
            return Some(ceil_secs(expiry - now));
        }

        users.remove(&user);
        if users.is_empty() {
            table.remove(command);
        }
        None
    }

    /// Puts `user` on cooldown for `command` for `seconds`.
    ///
    /// Zero seconds leaves the table untouched. Durations above
    /// [`MAX_COOLDOWN`] are clamped.
    pub fn start(&self, command: &str, user: UserId, seconds: u64) {
        if seconds == 0 {
            return;
        }
        let expiry = Instant::now() + Duration::from_secs(seconds).min(MAX_COOLDOWN);
        self.table
            .lock()
            .entry(command.to_string())
            .or_default()
            .insert(user, expiry);
    }

    /// Clears `user`'s cooldown for `command`.
    pub fn reset(&self, command: &str, user: UserId) {
        let mut table = self.table.lock();
        if let Some(users) = table.get_mut(command) {
            users.remove(&user);
            if users.is_empty() {
                table.remove(command);
            }
        }
    }

    /// Clears every cooldown for `command`.
    pub fn clear_command(&self, command: &str) {
        self.table.lock().remove(command);
    }

    /// Drops every expired entry and returns how many were removed.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut removed = 0;
        let mut table = self.table.lock();
        table.retain(|_, users| {
            let before = users.len();
            users.retain(|_, expiry| now < *expiry);
            removed += before - users.len();
            !users.is_empty()
        });
        removed
    }

    /// Number of (command, user) entries currently stored, expired or not.
    pub fn len(&self) -> usize {
        self.table.lock().values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn ceil_secs(d: Duration) -> u64 {
    let secs = d.as_secs();
    if d.subsec_nanos() > 0 { secs + 1 } else { secs }
}

#[cfg(test)]
mod tests {
    use super::*;

    const U1: UserId = UserId::new(1);
    const U2: UserId = UserId::new(2);

    #[tokio::test(start_paused = true)]
    async fn test_ping_scenario() {
        let tracker = CooldownTracker::new();
        assert_eq!(tracker.check("ping", U1), None);
        tracker.start("ping", U1, 5);

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(tracker.check("ping", U1), Some(3));
        assert_eq!(tracker.check("ping", U2), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rounds_up() {
        let tracker = CooldownTracker::new();
        tracker.start("ping", U1, 5);
        assert_eq!(tracker.check("ping", U1), Some(5));

        tokio::time::advance(Duration::from_millis(4_100)).await;
        assert_eq!(tracker.check("ping", U1), Some(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_expiry_evicts() {
        let tracker = CooldownTracker::new();
        tracker.start("ping", U1, 5);

        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(tracker.check("ping", U1), None);
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_zero_never_creates_entry() {
        let tracker = CooldownTracker::new();
        tracker.start("info", U1, 0);
        assert!(tracker.is_empty());
        assert_eq!(tracker.check("info", U1), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep() {
        let tracker = CooldownTracker::new();
        tracker.start("ping", U1, 1);
        tracker.start("ping", U2, 10);
        tracker.start("echo", U1, 2);

        tokio::time::advance(Duration::from_secs(3)).await;
        assert_eq!(tracker.sweep(), 2);
        assert_eq!(tracker.len(), 1);
        assert_eq!(tracker.check("ping", U2), Some(7));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_and_clear() {
        let tracker = CooldownTracker::new();
        tracker.start("ping", U1, 10);
        tracker.start("ping", U2, 10);

        tracker.reset("ping", U1);
        assert_eq!(tracker.check("ping", U1), None);
        assert!(tracker.check("ping", U2).is_some());

        tracker.clear_command("ping");
        assert!(tracker.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_huge_cooldown_is_clamped() {
        let tracker = CooldownTracker::new();
        tracker.start("slow", U1, u64::MAX);
        assert_eq!(tracker.check("slow", U1), Some(MAX_COOLDOWN.as_secs()));

        tokio::time::advance(Duration::from_secs(60)).await;
        assert_eq!(tracker.check("slow", U1), Some(MAX_COOLDOWN.as_secs() - 60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_overwrites() {
        let tracker = CooldownTracker::new();
        tracker.start("ping", U1, 10);
        tracker.start("ping", U1, 3);
        assert_eq!(tracker.check("ping", U1), Some(3));
    }
}
