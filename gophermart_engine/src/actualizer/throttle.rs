use std::sync::Arc;

use log::debug;
use tokio::{
    sync::Mutex,
    time::{sleep_until, Duration, Instant},
};

/// A shared back-off gate for the fetch workers.
///
/// When the accrual service answers 429 with `Retry-After`, one worker pushes the deadline
/// forward and every worker waits it out before issuing another request. The deadline only ever
/// moves forward, so overlapping 429s cannot shorten an earlier back-off.
#[derive(Clone, Default)]
pub struct Throttle {
    deadline: Arc<Mutex<Option<Instant>>>,
}

impl Throttle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until the current back-off (if any) has elapsed.
    pub async fn wait_ready(&self) {
        loop {
            let deadline = *self.deadline.lock().await;
            match deadline {
                Some(until) if until > Instant::now() => sleep_until(until).await,
                _ => return,
            }
        }
    }

    /// Hold off all requests for at least `delay` from now.
    pub async fn back_off(&self, delay: Duration) {
        let until = Instant::now() + delay;
        let mut deadline = self.deadline.lock().await;
        if deadline.map_or(true, |existing| until > existing) {
            debug!("⏳️ Backing off accrual requests for {}s", delay.as_secs());
            *deadline = Some(until);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn waits_out_the_full_backoff() {
        let throttle = Throttle::new();
        throttle.back_off(Duration::from_secs(2)).await;
        let before = Instant::now();
        throttle.wait_ready().await;
        assert!(before.elapsed() >= Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn ready_immediately_without_backoff() {
        let throttle = Throttle::new();
        let before = Instant::now();
        throttle.wait_ready().await;
        assert!(before.elapsed() < Duration::from_millis(1));
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_only_moves_forward() {
        let throttle = Throttle::new();
        throttle.back_off(Duration::from_secs(5)).await;
        throttle.back_off(Duration::from_secs(1)).await;
        let before = Instant::now();
        throttle.wait_ready().await;
        assert!(before.elapsed() >= Duration::from_secs(5));
    }
}
