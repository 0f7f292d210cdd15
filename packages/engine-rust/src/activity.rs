//! Call-mediator activity counter.
//!
//! Counts outstanding asynchronous call-and-resume operations plus artifact
//! references that are currently unavailable. Continuation tracking is enabled
//! exactly while the count is non-zero.

use parking_lot::Mutex;
use tracing::{info, warn};

#[derive(Debug, Default)]
struct ActivityState {
    count: u64,
    unavailable_artifacts: Vec<String>,
}

/// Point-in-time view of the counter, taken under the lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActivitySnapshot {
    pub count: u64,
    pub continuation_enabled: bool,
}

/// Lock-guarded activity counter shared by every worker and transport thread.
#[derive(Debug, Default)]
pub struct CallActivity {
    state: Mutex<ActivityState>,
}

impl CallActivity {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment(&self) {
        let mut state = self.state.lock();
        Self::increment_locked(&mut state);
    }

    /// Decrement the count. Returns `false`, leaving the count at zero, if
    /// there was nothing to decrement.
    pub fn decrement(&self) -> bool {
        let mut state = self.state.lock();
        Self::decrement_locked(&mut state)
    }

    #[must_use]
    pub fn count(&self) -> u64 {
        self.state.lock().count
    }

    #[must_use]
    pub fn is_continuation_enabled(&self) -> bool {
        self.state.lock().count > 0
    }

    #[must_use]
    pub fn snapshot(&self) -> ActivitySnapshot {
        let state = self.state.lock();
        ActivitySnapshot {
            count: state.count,
            continuation_enabled: state.count > 0,
        }
    }

    /// Record an artifact reference that cannot be resolved yet. It counts as
    /// pending activity until removed.
    pub fn add_unavailable_artifact(&self, key: impl Into<String>) {
        let mut state = self.state.lock();
        state.unavailable_artifacts.push(key.into());
        Self::increment_locked(&mut state);
    }

    /// Remove one occurrence of `key`. Returns whether it was recorded.
    pub fn remove_unavailable_artifact(&self, key: &str) -> bool {
        let mut state = self.state.lock();
        let Some(index) = state.unavailable_artifacts.iter().position(|k| k == key) else {
            return false;
        };
        state.unavailable_artifacts.remove(index);
        Self::decrement_locked(&mut state);
        true
    }

    /// The artifact became available: remove every occurrence of `key`.
    /// Returns how many were removed.
    pub fn clear_unavailability(&self, key: &str) -> usize {
        let mut state = self.state.lock();
        let before = state.unavailable_artifacts.len();
        state.unavailable_artifacts.retain(|k| k != key);
        let removed = before - state.unavailable_artifacts.len();
        for _ in 0..removed {
            Self::decrement_locked(&mut state);
        }
        removed
    }

    #[must_use]
    pub fn unavailable_artifacts(&self) -> Vec<String> {
        self.state.lock().unavailable_artifacts.clone()
    }

    fn increment_locked(state: &mut ActivityState) {
        if state.count == 0 {
            info!("continuation enabled");
        }
        state.count += 1;
    }

    fn decrement_locked(state: &mut ActivityState) -> bool {
        if state.count == 0 {
            warn!("call activity decremented below zero, ignoring");
            return false;
        }
        state.count -= 1;
        if state.count == 0 {
            info!("continuation disabled");
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use proptest::prelude::*;

    use super::*;

    #[test]
    fn increment_enables_and_decrement_disables() {
        let activity = CallActivity::new();
        assert!(!activity.is_continuation_enabled());

        activity.increment();
        activity.increment();
        assert!(activity.is_continuation_enabled());

        assert!(activity.decrement());
        assert!(activity.is_continuation_enabled());
        assert!(activity.decrement());
        assert!(!activity.is_continuation_enabled());
    }

    #[test]
    fn decrement_at_zero_is_ignored() {
        let activity = CallActivity::new();
        assert!(!activity.decrement());
        assert_eq!(activity.count(), 0);
        activity.increment();
        assert_eq!(activity.count(), 1);
    }

    #[test]
    fn unavailable_artifacts_count_as_activity() {
        let activity = CallActivity::new();
        activity.add_unavailable_artifact("seq:billing");
        activity.add_unavailable_artifact("seq:billing");
        activity.add_unavailable_artifact("ep:stock");
        assert_eq!(activity.count(), 3);

        assert!(activity.remove_unavailable_artifact("ep:stock"));
        assert!(!activity.remove_unavailable_artifact("ep:stock"));
        assert_eq!(activity.count(), 2);

        assert_eq!(activity.clear_unavailability("seq:billing"), 2);
        assert_eq!(activity.count(), 0);
        assert!(activity.unavailable_artifacts().is_empty());
        assert!(!activity.is_continuation_enabled());
    }

    #[test]
    fn concurrent_balanced_updates_return_to_zero() {
        let activity = Arc::new(CallActivity::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let activity = Arc::clone(&activity);
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        activity.increment();
                        let snap = activity.snapshot();
                        assert!(snap.continuation_enabled);
                        assert!(activity.decrement());
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(
            activity.snapshot(),
            ActivitySnapshot { count: 0, continuation_enabled: false }
        );
    }

    proptest! {
        #[test]
        fn count_never_negative_and_flag_matches(ops in proptest::collection::vec(any::<bool>(), 0..200)) {
            let activity = CallActivity::new();
            let mut expected: u64 = 0;
            for increment in ops {
                if increment {
                    activity.increment();
                    expected += 1;
                } else {
                    let decremented = activity.decrement();
                    prop_assert_eq!(decremented, expected > 0);
                    expected = expected.saturating_sub(1);
                }
                let snap = activity.snapshot();
                prop_assert_eq!(snap.count, expected);
                prop_assert_eq!(snap.continuation_enabled, expected > 0);
            }
        }
    }
}
