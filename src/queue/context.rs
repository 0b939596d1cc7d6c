use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::error::BrokerError;

/// Cancellation scope for a blocking get.
///
/// Carries an explicit cancel signal and an optional deadline. The two
/// fire independently and are reported as different errors.
#[derive(Debug, Clone, Default)]
pub struct WaitContext {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl WaitContext {
    /// No deadline, cancelable only through [`WaitContext::cancel`].
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self::new().timeout(timeout)
    }

    /// Wraps an existing token, e.g. a child of a connection's token.
    pub fn from_token(token: CancellationToken) -> Self {
        Self {
            token,
            deadline: None,
        }
    }

    /// Sets the deadline to `timeout` from now. Saturates instead of
    /// overflowing for very large timeouts.
    pub fn timeout(self, timeout: Duration) -> Self {
        let now = Instant::now();
        let deadline = now.checked_add(timeout);
        Self {
            deadline: Some(deadline.unwrap_or_else(|| far_future(now))),
            ..self
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves when either the token fires or the deadline passes,
    /// yielding the matching error. Never resolves for a context that
    /// has neither.
    pub async fn done(&self) -> BrokerError {
        let expired = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            biased;
            _ = self.token.cancelled() => BrokerError::Canceled,
            _ = expired => BrokerError::DeadlineExceeded,
        }
    }
}

// About thirty years; far enough that nobody waits on it.
fn far_future(now: Instant) -> Instant {
    now + Duration::from_secs(86400 * 365 * 30)
}
