//! Notification channel: one visible message at a time.
//!
//! Pushing replaces whatever is showing and restarts the single expiry
//! timer. There is no queue; of two pushes in the same tick only the second
//! is ever seen.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::AbortHandle;

use crate::core::notification::{Notification, Severity};
use crate::error::ClientError;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

struct Inner {
    slot: watch::Sender<Option<Notification>>,
    timer: Mutex<Option<AbortHandle>>,
    generation: AtomicU64,
    timeout: Duration,
}

impl Inner {
    fn cancel_timer(&self) {
        if let Some(handle) = self
            .timer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            handle.abort();
        }
    }
}

#[derive(Clone)]
pub struct NotificationChannel {
    inner: Arc<Inner>,
}

impl Default for NotificationChannel {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT)
    }
}

impl NotificationChannel {
    pub fn new(timeout: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                slot: watch::Sender::new(None),
                timer: Mutex::new(None),
                generation: AtomicU64::new(0),
                timeout,
            }),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.inner.timeout
    }

    pub fn current(&self) -> Option<Notification> {
        self.inner.slot.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<Notification>> {
        self.inner.slot.subscribe()
    }

    /// Shows `message`, replacing any visible notification.
    ///
    /// Must be called from within a tokio runtime; the expiry timer is a task.
    pub fn push(&self, message: impl Into<String>, severity: Severity) {
        let notification = Notification::new(message, severity);
        log::debug!("notify [{}] {}", severity.as_str(), notification.message);

        self.inner.cancel_timer();
        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner.slot.send_replace(Some(notification));

        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let timeout = self.inner.timeout;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            if let Some(inner) = weak.upgrade() {
                // A newer push may have landed between abort and wake-up.
                if inner.generation.load(Ordering::SeqCst) == generation {
                    inner.slot.send_replace(None);
                }
            }
        });
        *self
            .inner
            .timer
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(handle.abort_handle());
    }

    pub fn success(&self, message: impl Into<String>) {
        self.push(message, Severity::Success);
    }

    pub fn info(&self, message: impl Into<String>) {
        self.push(message, Severity::Info);
    }

    /// Shows an error with a severity matching its kind.
    pub fn push_error(&self, err: &ClientError) {
        let severity = match err {
            ClientError::Validation(_)
            | ClientError::NotAuthenticated
            | ClientError::SessionExpired { .. } => Severity::Warning,
            _ => Severity::Danger,
        };
        self.push(err.to_string(), severity);
    }

    /// Clears the slot now and cancels the timer.
    pub fn dismiss(&self) {
        self.inner.cancel_timer();
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        self.inner.slot.send_replace(None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::sleep;

    #[tokio::test(start_paused = true)]
    async fn expires_after_timeout() {
        let channel = NotificationChannel::default();
        channel.success("List created");

        sleep(Duration::from_millis(4900)).await;
        assert_eq!(
            channel.current(),
            Some(Notification::new("List created", Severity::Success))
        );

        sleep(Duration::from_millis(200)).await;
        assert_eq!(channel.current(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn push_replaces_and_restarts_timer() {
        let channel = NotificationChannel::new(Duration::from_secs(5));
        channel.push("first", Severity::Info);
        sleep(Duration::from_secs(3)).await;

        channel.push("second", Severity::Danger);
        sleep(Duration::from_secs(3)).await;
        assert_eq!(
            channel.current(),
            Some(Notification::new("second", Severity::Danger))
        );

        sleep(Duration::from_secs(3)).await;
        assert_eq!(channel.current(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn same_tick_pushes_keep_only_the_last() {
        let channel = NotificationChannel::default();
        let mut rx = channel.subscribe();
        channel.info("one");
        channel.info("two");

        assert_eq!(rx.borrow_and_update().as_ref().map(|n| n.message.as_str()), Some("two"));
    }

    #[tokio::test(start_paused = true)]
    async fn dismiss_clears_immediately_and_cancels_timer() {
        let channel = NotificationChannel::default();
        channel.info("hello");
        channel.dismiss();
        assert_eq!(channel.current(), None);

        // A later push is not cut short by the cancelled timer.
        sleep(Duration::from_secs(2)).await;
        channel.info("again");
        sleep(Duration::from_secs(4)).await;
        assert!(channel.current().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn errors_map_to_severity() {
        let channel = NotificationChannel::default();

        channel.push_error(&ClientError::SessionExpired { status: 401 });
        assert_eq!(channel.current().unwrap().severity, Severity::Warning);

        channel.push_error(&ClientError::Api {
            status: 500,
            message: "boom".into(),
        });
        let shown = channel.current().unwrap();
        assert_eq!(shown.severity, Severity::Danger);
        assert_eq!(shown.message, "boom");
    }
}
