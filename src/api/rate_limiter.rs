use log::debug;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

#[derive(Debug)]
struct Window {
    count: u32,
    started: Instant,
}

/// Fixed request budget per window for one upstream source.
///
/// The window resets lazily on the next acquisition. Callers that arrive
/// while the budget is exhausted sleep until the window ends and are all
/// admitted together when it rolls over.
#[derive(Debug)]
pub struct RateLimiter {
    name: String,
    max_requests: u32,
    window: Duration,
    state: Mutex<Window>,
}

impl RateLimiter {
    pub fn new(name: impl Into<String>, max_requests: u32, window: Duration) -> Self {
        Self {
            name: name.into(),
            max_requests: max_requests.max(1),
            window,
            state: Mutex::new(Window {
                count: 0,
                started: Instant::now(),
            }),
        }
    }

    pub async fn acquire(&self) {
        let wait = {
            let mut state = self.state.lock().await;
            let now = Instant::now();
            if now.duration_since(state.started) >= self.window {
                state.count = 0;
                state.started = now;
            }
            if state.count < self.max_requests {
                state.count += 1;
                return;
            }
            self.window.saturating_sub(now.duration_since(state.started))
        };

        debug!(
            "Rate limit for {} reached, waiting {}ms",
            self.name,
            wait.as_millis()
        );
        tokio::time::sleep(wait).await;

        let mut state = self.state.lock().await;
        state.count = 1;
        state.started = Instant::now();
    }

    #[cfg(test)]
    async fn remaining(&self) -> u32 {
        let state = self.state.lock().await;
        if state.started.elapsed() >= self.window {
            self.max_requests
        } else {
            self.max_requests.saturating_sub(state.count)
        }
    }
}
