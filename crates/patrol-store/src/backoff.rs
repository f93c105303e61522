//! Backoff schedules: per-list (§4.4, update path) and per-prefix (§4.6,
//! resolver path).

use rand::Rng;

use crate::scratch::PrefixErrorState;

/// Wait, in seconds, before the next update attempt for a list after
/// `consecutive_errors` consecutive failures. Matches §4.4's table exactly
/// at the deterministic endpoints (1 and ≥6); the interior rows are
/// uniformly random within their stated minute range.
pub fn list_backoff_wait_secs(consecutive_errors: u32) -> u64 {
    const MINUTE: u64 = 60;
    match consecutive_errors {
        0 => 0,
        1 => 60,
        2 => rand::thread_rng().gen_range(30 * MINUTE..=60 * MINUTE),
        3 => rand::thread_rng().gen_range(60 * MINUTE..=120 * MINUTE),
        4 => rand::thread_rng().gen_range(120 * MINUTE..=240 * MINUTE),
        5 => rand::thread_rng().gen_range(240 * MINUTE..=480 * MINUTE),
        _ => 480 * MINUTE,
    }
}

/// Unix time until which a prefix should be omitted from outgoing full-hash
/// batches, or `None` if it may be retried immediately. Per the resolved
/// Open Question (DESIGN.md): the error counter increments on every failed
/// attempt regardless of elapsed time; row 1's 5-minute figure gates the
/// next attempt, row 2 imposes no gate, and rows 3+ are real suppression
/// windows measured from the last error.
pub fn prefix_suppressed_until(state: &PrefixErrorState) -> Option<u64> {
    const MINUTE: u64 = 60;
    match state.errors {
        0 => None,
        1 => Some(state.timestamp + 5 * MINUTE),
        2 => None,
        3 => Some(state.timestamp + 30 * MINUTE),
        4 => Some(state.timestamp + 60 * MINUTE),
        _ => Some(state.timestamp + 120 * MINUTE),
    }
}

/// Whether a prefix is currently suppressed at `now_unix`.
pub fn is_prefix_suppressed(state: &PrefixErrorState, now_unix: u64) -> bool {
    match prefix_suppressed_until(state) {
        Some(until) => now_unix < until,
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_backoff_deterministic_endpoints() {
        assert_eq!(list_backoff_wait_secs(1), 60);
        assert_eq!(list_backoff_wait_secs(6), 480 * 60);
        assert_eq!(list_backoff_wait_secs(50), 480 * 60);
    }

    #[test]
    fn list_backoff_interior_rows_stay_in_range() {
        for _ in 0..50 {
            assert!((30 * 60..=60 * 60).contains(&list_backoff_wait_secs(2)));
            assert!((60 * 60..=120 * 60).contains(&list_backoff_wait_secs(3)));
            assert!((120 * 60..=240 * 60).contains(&list_backoff_wait_secs(4)));
            assert!((240 * 60..=480 * 60).contains(&list_backoff_wait_secs(5)));
        }
    }

    #[test]
    fn prefix_backoff_first_error_gates_five_minutes() {
        let state = PrefixErrorState { timestamp: 1000, errors: 1 };
        assert!(is_prefix_suppressed(&state, 1000 + 60));
        assert!(!is_prefix_suppressed(&state, 1000 + 5 * 60 + 1));
    }

    #[test]
    fn prefix_backoff_second_error_has_no_gate() {
        let state = PrefixErrorState { timestamp: 1000, errors: 2 };
        assert!(!is_prefix_suppressed(&state, 1000));
    }

    #[test]
    fn prefix_backoff_suppression_windows() {
        let state = PrefixErrorState { timestamp: 1000, errors: 3 };
        assert!(is_prefix_suppressed(&state, 1000 + 29 * 60));
        assert!(!is_prefix_suppressed(&state, 1000 + 30 * 60 + 1));

        let state = PrefixErrorState { timestamp: 1000, errors: 5 };
        assert!(is_prefix_suppressed(&state, 1000 + 119 * 60));
        assert!(!is_prefix_suppressed(&state, 1000 + 120 * 60 + 1));
    }
}
