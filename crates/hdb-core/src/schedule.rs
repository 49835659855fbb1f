//! Wall-clock waiting for background loops.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

/// Sleep until `target`, waking at most every `poll` to re-read the clock.
///
/// A clock jump or a suspended host is therefore noticed within one poll
/// interval. Returns `false` when cancelled before reaching the target.
pub async fn wait_until(
    target: DateTime<Utc>,
    poll: Duration,
    cancel: &CancellationToken,
) -> bool {
    let poll = poll.max(Duration::from_millis(1));
    loop {
        let remaining = match (target - Utc::now()).to_std() {
            Ok(d) if !d.is_zero() => d,
            _ => return true,
        };
        tokio::select! {
          _ = cancel.cancelled() => return false,
          _ = sleep(remaining.min(poll)) => {}
        }
    }
}

/// `now + every`, saturating on overflow.
pub fn next_run_after(now: DateTime<Utc>, every: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(every)
        .ok()
        .and_then(|d| now.checked_add_signed(d))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn past_target_returns_immediately() {
        let cancel = CancellationToken::new();
        let past = Utc::now() - chrono::Duration::seconds(5);
        assert!(wait_until(past, Duration::from_secs(60), &cancel).await);
    }

    #[tokio::test]
    async fn short_target_is_reached_in_poll_steps() {
        let cancel = CancellationToken::new();
        let target = Utc::now() + chrono::Duration::milliseconds(30);
        assert!(wait_until(target, Duration::from_millis(10), &cancel).await);
        assert!(Utc::now() >= target);
    }

    #[tokio::test]
    async fn cancellation_stops_waiting() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let far = Utc::now() + chrono::Duration::days(3);
        assert!(!wait_until(far, Duration::from_secs(60), &cancel).await);
    }

    #[test]
    fn next_run_saturates() {
        let now = Utc::now();
        assert_eq!(
            next_run_after(now, Duration::from_secs(60)),
            now + chrono::Duration::seconds(60)
        );
        assert_eq!(next_run_after(now, Duration::MAX), DateTime::<Utc>::MAX_UTC);
    }
}
