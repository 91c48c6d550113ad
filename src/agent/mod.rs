//! Client-side notification agent.
//!
//! Owns the notification permission state of one client, polls a
//! [`ReminderFeed`] while permission is granted and a session is attached,
//! shows each due reminder and then marks it sent. Display happens before
//! marking, so a failed mark means the reminder is shown again on the next
//! poll rather than lost.

mod display;
mod feed;
mod state;

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::db::DeliveryChannel;

pub use display::{
    DisplayError, Notification, NotificationBackend, Permission, Toast, ToastKind, ToastSink,
};
pub use feed::{FeedError, HttpReminderFeed, ReminderFeed};
pub use state::{Activity, AgentError, PermissionState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgentSettings {
    pub poll_interval: Duration,
    pub auto_dismiss: Duration,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(30),
            auto_dismiss: Duration::from_secs(10),
        }
    }
}

/// Counts for one poll, mostly for logging.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PollReport {
    pub displayed: usize,
    pub toasted: usize,
    pub marked: usize,
    pub mark_failures: usize,
}

#[derive(Clone)]
struct PollContext {
    feed: Arc<dyn ReminderFeed>,
    backend: Arc<dyn NotificationBackend>,
    toasts: Arc<dyn ToastSink>,
    settings: AgentSettings,
}

struct PollSession {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

pub struct NotificationAgent {
    backend: Arc<dyn NotificationBackend>,
    toasts: Arc<dyn ToastSink>,
    settings: AgentSettings,
    state: PermissionState,
    denial_toast_shown: bool,
    session: Option<PollSession>,
}

impl NotificationAgent {
    pub fn new(
        backend: Arc<dyn NotificationBackend>,
        toasts: Arc<dyn ToastSink>,
        settings: AgentSettings,
    ) -> Self {
        let supported = backend.is_supported();
        let reported = if supported {
            backend.permission()
        } else {
            Permission::Default
        };
        let state = PermissionState::initial(supported, reported);
        tracing::debug!(?state, "Notification agent created");

        Self {
            backend,
            toasts,
            settings,
            state,
            denial_toast_shown: false,
            session: None,
        }
    }

    pub fn state(&self) -> PermissionState {
        self.state
    }

    pub fn is_polling(&self) -> bool {
        self.state.is_polling()
    }

    /// Ask the user for notification permission.
    ///
    /// Only valid from `Unrequested`; a denied permission is never asked for
    /// again automatically.
    pub async fn request_permission(&mut self) -> Result<PermissionState, AgentError> {
        if let Err(e) = self.state.begin_request() {
            if e == AgentError::PermissionDenied {
                self.notify_denied();
            }
            return Err(e);
        }

        let outcome = match self.backend.request_permission().await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!("Permission prompt failed: {}", e);
                self.state.resolve_request(Permission::Default)?;
                return Err(AgentError::Prompt(e.to_string()));
            }
        };

        self.state.resolve_request(outcome)?;
        tracing::info!(state = ?self.state, "Notification permission resolved");
        if self.state == PermissionState::Denied {
            self.notify_denied();
        }
        Ok(self.state)
    }

    /// Attach a user session and start polling it.
    pub fn start_polling(&mut self, feed: Arc<dyn ReminderFeed>) -> Result<(), AgentError> {
        if self.settings.poll_interval.is_zero() {
            return Err(AgentError::ZeroPollInterval);
        }
        match self.state.attach_session() {
            Ok(true) => {}
            Ok(false) => return Ok(()),
            Err(e) => {
                if e == AgentError::PermissionDenied {
                    self.notify_denied();
                }
                return Err(e);
            }
        }

        let ctx = PollContext {
            feed,
            backend: self.backend.clone(),
            toasts: self.toasts.clone(),
            settings: self.settings,
        };
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(poll_loop(ctx, cancel.clone()));
        self.session = Some(PollSession { cancel, handle });

        tracing::info!(
            interval_secs = self.settings.poll_interval.as_secs(),
            "Started polling for reminders"
        );
        Ok(())
    }

    /// Stop polling. Returns once the poll task has exited; nothing it had in
    /// flight is processed afterwards.
    pub async fn stop(&mut self) {
        self.state.detach_session();
        self.cancel_session().await;
    }

    /// The user logged out.
    pub async fn logout(&mut self) {
        self.stop().await;
        tracing::info!("Notification agent detached from session");
    }

    /// The runtime reported that notification permission was withdrawn.
    pub async fn permission_revoked(&mut self) {
        self.cancel_session().await;
        if self.state.revoke() {
            tracing::info!("Notification permission revoked");
            self.notify_denied();
        }
    }

    async fn cancel_session(&mut self) {
        if let Some(session) = self.session.take() {
            session.cancel.cancel();
            if let Err(e) = session.handle.await {
                tracing::warn!("Poll task ended abnormally: {}", e);
            }
            tracing::debug!("Stopped polling for reminders");
        }
    }

    fn notify_denied(&mut self) {
        if !self.denial_toast_shown {
            self.denial_toast_shown = true;
            self.toasts.toast(Toast::permission_denied());
        }
    }
}

impl Drop for NotificationAgent {
    fn drop(&mut self) {
        if let Some(session) = self.session.take() {
            session.cancel.cancel();
        }
    }
}

/// One poll per tick. The batch runs inline, so ticks that fall due while it
/// is in flight are skipped rather than queued.
async fn poll_loop(ctx: PollContext, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(ctx.settings.poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            report = poll_once(&ctx, &cancel) => {
                if report != PollReport::default() {
                    tracing::debug!(?report, "Processed reminder poll");
                }
            }
        }
    }
}

async fn poll_once(ctx: &PollContext, cancel: &CancellationToken) -> PollReport {
    let mut report = PollReport::default();

    let pending = match ctx.feed.pending().await {
        Ok(pending) => pending,
        Err(FeedError::Unauthorized) => {
            tracing::warn!("Reminder poll rejected: session is no longer valid");
            return report;
        }
        Err(e) => {
            tracing::debug!("Reminder poll failed: {}", e);
            return report;
        }
    };

    for reminder in pending {
        if cancel.is_cancelled() {
            break;
        }
        if !reminder.reminder_type.includes(DeliveryChannel::Popup) {
            continue;
        }

        let notification = Notification::for_reminder(&reminder);
        match ctx
            .backend
            .show(&notification, ctx.settings.auto_dismiss)
            .await
        {
            Ok(()) => report.displayed += 1,
            Err(e) => {
                tracing::debug!(
                    reminder_id = reminder.reminder_id,
                    "Native notification failed, showing toast: {}",
                    e
                );
                ctx.toasts.toast(Toast::reminder(&notification));
                report.toasted += 1;
            }
        }

        match ctx.feed.mark_sent(reminder.reminder_id).await {
            Ok(()) => report.marked += 1,
            Err(e) => {
                tracing::warn!(
                    reminder_id = reminder.reminder_id,
                    "Failed to mark reminder as sent; it may be shown again: {}",
                    e
                );
                report.mark_failures += 1;
            }
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use tokio::sync::Notify;

    use super::*;
    use crate::db::test_support::utc;
    use crate::db::{PendingReminder, ReminderType};

    type Log = Arc<Mutex<Vec<String>>>;

    struct MockBackend {
        supported: bool,
        permission: Permission,
        prompt: Permission,
        fail_show: AtomicBool,
        log: Log,
    }

    impl MockBackend {
        fn granted(log: &Log) -> Arc<Self> {
            Arc::new(Self {
                supported: true,
                permission: Permission::Granted,
                prompt: Permission::Granted,
                fail_show: AtomicBool::new(false),
                log: log.clone(),
            })
        }

        fn asking(prompt: Permission, log: &Log) -> Arc<Self> {
            Arc::new(Self {
                supported: true,
                permission: Permission::Default,
                prompt,
                fail_show: AtomicBool::new(false),
                log: log.clone(),
            })
        }
    }

    #[async_trait]
    impl NotificationBackend for MockBackend {
        fn is_supported(&self) -> bool {
            self.supported
        }

        fn permission(&self) -> Permission {
            self.permission
        }

        async fn request_permission(&self) -> Result<Permission, DisplayError> {
            self.log.lock().unwrap().push("prompt".to_string());
            Ok(self.prompt)
        }

        async fn show(
            &self,
            notification: &Notification,
            auto_dismiss: Duration,
        ) -> Result<(), DisplayError> {
            assert_eq!(auto_dismiss, Duration::from_secs(10));
            if self.fail_show.load(Ordering::SeqCst) {
                return Err(DisplayError::Failed("no display server".to_string()));
            }
            self.log
                .lock()
                .unwrap()
                .push(format!("show:{}", notification.reminder_id));
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingToasts {
        toasts: Mutex<Vec<Toast>>,
    }

    impl RecordingToasts {
        fn kinds(&self) -> Vec<ToastKind> {
            self.toasts.lock().unwrap().iter().map(|t| t.kind).collect()
        }
    }

    impl ToastSink for RecordingToasts {
        fn toast(&self, toast: Toast) {
            self.toasts.lock().unwrap().push(toast);
        }
    }

    /// In-memory feed: a reminder stays pending until it is marked.
    #[derive(Default)]
    struct MockFeed {
        pending: Mutex<Vec<PendingReminder>>,
        failing_marks: AtomicUsize,
        calls: AtomicUsize,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        delay: Option<Duration>,
        gate: Option<Arc<Notify>>,
        log: Log,
    }

    impl MockFeed {
        fn with(reminders: Vec<PendingReminder>, log: &Log) -> Self {
            Self {
                pending: Mutex::new(reminders),
                log: log.clone(),
                ..Default::default()
            }
        }
    }

    #[async_trait]
    impl ReminderFeed for MockFeed {
        async fn pending(&self) -> Result<Vec<PendingReminder>, FeedError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);

            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }

            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(self.pending.lock().unwrap().clone())
        }

        async fn mark_sent(&self, reminder_id: i64) -> Result<(), FeedError> {
            let failing = self.failing_marks.load(Ordering::SeqCst);
            if failing > 0 {
                self.failing_marks.store(failing - 1, Ordering::SeqCst);
                return Err(FeedError::Status {
                    status: 503,
                    message: "unavailable".to_string(),
                });
            }
            self.log.lock().unwrap().push(format!("mark:{}", reminder_id));
            self.pending
                .lock()
                .unwrap()
                .retain(|r| r.reminder_id != reminder_id);
            Ok(())
        }
    }

    fn reminder(id: i64, kind: ReminderType) -> PendingReminder {
        PendingReminder {
            reminder_id: id,
            event_id: 1,
            title: format!("Event {}", id),
            start_time: utc(2025, 1, 10, 10, 0),
            minutes_before: 15,
            reminder_type: kind,
            due_time: utc(2025, 1, 10, 9, 45),
            sent_at: None,
        }
    }

    fn agent(backend: Arc<MockBackend>, toasts: &Arc<RecordingToasts>) -> NotificationAgent {
        NotificationAgent::new(backend, toasts.clone(), AgentSettings::default())
    }

    /// Let spawned tasks run; with paused time this also fires due timers.
    async fn settle() {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn displays_then_marks_in_order() {
        let log = Log::default();
        let toasts = Arc::new(RecordingToasts::default());
        let feed = Arc::new(MockFeed::with(
            vec![
                reminder(1, ReminderType::Popup),
                reminder(2, ReminderType::Email),
                reminder(3, ReminderType::Both),
            ],
            &log,
        ));
        let mut agent = agent(MockBackend::granted(&log), &toasts);

        agent.start_polling(feed.clone()).unwrap();
        assert_eq!(agent.state(), PermissionState::Granted(Activity::Polling));
        settle().await;

        assert_eq!(
            *log.lock().unwrap(),
            vec!["show:1", "mark:1", "show:3", "mark:3"]
        );

        // Nothing left to show on the next tick.
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(log.lock().unwrap().len(), 4);
        assert_eq!(feed.calls.load(Ordering::SeqCst), 2);
        assert!(toasts.kinds().is_empty());

        agent.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn display_failure_falls_back_to_toast() {
        let log = Log::default();
        let toasts = Arc::new(RecordingToasts::default());
        let backend = MockBackend::granted(&log);
        backend.fail_show.store(true, Ordering::SeqCst);
        let feed = Arc::new(MockFeed::with(vec![reminder(5, ReminderType::Popup)], &log));
        let mut agent = agent(backend, &toasts);

        agent.start_polling(feed).unwrap();
        settle().await;

        assert_eq!(toasts.kinds(), vec![ToastKind::Reminder]);
        assert_eq!(toasts.toasts.lock().unwrap()[0].title, "Event 5");
        assert_eq!(*log.lock().unwrap(), vec!["mark:5"]);

        agent.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn failed_mark_shows_reminder_again_next_poll() {
        let log = Log::default();
        let toasts = Arc::new(RecordingToasts::default());
        let feed = Arc::new(MockFeed::with(vec![reminder(9, ReminderType::Popup)], &log));
        feed.failing_marks.store(1, Ordering::SeqCst);
        let mut agent = agent(MockBackend::granted(&log), &toasts);

        agent.start_polling(feed.clone()).unwrap();
        settle().await;
        assert_eq!(*log.lock().unwrap(), vec!["show:9"]);

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(*log.lock().unwrap(), vec!["show:9", "show:9", "mark:9"]);
        assert!(feed.pending.lock().unwrap().is_empty());
        // Poll failures never reach the user.
        assert!(toasts.kinds().is_empty());

        agent.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn nothing_is_processed_after_stop() {
        let log = Log::default();
        let toasts = Arc::new(RecordingToasts::default());
        let gate = Arc::new(Notify::new());
        let feed = Arc::new(MockFeed {
            gate: Some(gate.clone()),
            ..MockFeed::with(vec![reminder(4, ReminderType::Popup)], &log)
        });
        let mut agent = agent(MockBackend::granted(&log), &toasts);

        agent.start_polling(feed.clone()).unwrap();
        settle().await;
        assert_eq!(feed.calls.load(Ordering::SeqCst), 1);

        agent.stop().await;
        assert_eq!(agent.state(), PermissionState::Granted(Activity::Idle));

        gate.notify_waiters();
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert!(log.lock().unwrap().is_empty());
        assert_eq!(feed.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn overlapping_ticks_are_skipped() {
        let log = Log::default();
        let toasts = Arc::new(RecordingToasts::default());
        let feed = Arc::new(MockFeed {
            delay: Some(Duration::from_secs(95)),
            ..MockFeed::with(Vec::new(), &log)
        });
        let mut agent = agent(MockBackend::granted(&log), &toasts);

        agent.start_polling(feed.clone()).unwrap();
        tokio::time::sleep(Duration::from_secs(100)).await;

        // Ticks at 30, 60 and 90 fell inside the first poll and were dropped.
        assert!(feed.calls.load(Ordering::SeqCst) <= 2);
        assert_eq!(feed.max_in_flight.load(Ordering::SeqCst), 1);

        agent.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn denied_prompt_toasts_once_and_blocks_polling() {
        let log = Log::default();
        let toasts = Arc::new(RecordingToasts::default());
        let mut agent = agent(MockBackend::asking(Permission::Denied, &log), &toasts);
        assert_eq!(agent.state(), PermissionState::Unrequested);

        assert_eq!(
            agent.request_permission().await,
            Ok(PermissionState::Denied)
        );
        assert_eq!(
            agent.request_permission().await,
            Err(AgentError::PermissionDenied)
        );
        let feed = Arc::new(MockFeed::with(vec![reminder(1, ReminderType::Popup)], &log));
        assert_eq!(
            agent.start_polling(feed),
            Err(AgentError::PermissionDenied)
        );

        assert_eq!(toasts.kinds(), vec![ToastKind::PermissionDenied]);
        // The prompt was shown exactly once.
        assert_eq!(*log.lock().unwrap(), vec!["prompt"]);
    }

    #[tokio::test(start_paused = true)]
    async fn granted_prompt_then_logout_and_revoke() {
        let log = Log::default();
        let toasts = Arc::new(RecordingToasts::default());
        let mut agent = agent(MockBackend::asking(Permission::Granted, &log), &toasts);

        let feed = Arc::new(MockFeed::with(Vec::new(), &log));
        assert_eq!(agent.start_polling(feed.clone()), Err(AgentError::NotGranted));

        assert_eq!(
            agent.request_permission().await,
            Ok(PermissionState::Granted(Activity::Idle))
        );
        agent.start_polling(feed.clone()).unwrap();
        agent.logout().await;
        assert_eq!(agent.state(), PermissionState::Granted(Activity::Idle));

        agent.start_polling(feed.clone()).unwrap();
        settle().await;
        agent.permission_revoked().await;
        assert_eq!(agent.state(), PermissionState::Denied);
        assert!(!agent.is_polling());
        assert_eq!(toasts.kinds(), vec![ToastKind::PermissionDenied]);

        let calls = feed.calls.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(90)).await;
        assert_eq!(feed.calls.load(Ordering::SeqCst), calls);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_poll_interval_is_rejected() {
        let log = Log::default();
        let toasts = Arc::new(RecordingToasts::default());
        let settings = AgentSettings {
            poll_interval: Duration::ZERO,
            ..AgentSettings::default()
        };
        let mut agent =
            NotificationAgent::new(MockBackend::granted(&log), toasts.clone(), settings);

        let feed = Arc::new(MockFeed::with(vec![reminder(1, ReminderType::Popup)], &log));
        assert_eq!(
            agent.start_polling(feed.clone()),
            Err(AgentError::ZeroPollInterval)
        );
        assert_eq!(agent.state(), PermissionState::Granted(Activity::Idle));
        settle().await;
        assert_eq!(feed.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unsupported_runtime_is_terminal() {
        let log = Log::default();
        let toasts = Arc::new(RecordingToasts::default());
        let backend = Arc::new(MockBackend {
            supported: false,
            permission: Permission::Granted,
            prompt: Permission::Granted,
            fail_show: AtomicBool::new(false),
            log: log.clone(),
        });
        let mut agent = agent(backend, &toasts);

        assert_eq!(agent.state(), PermissionState::Unsupported);
        assert_eq!(
            agent.request_permission().await,
            Err(AgentError::Unsupported)
        );
        let feed = Arc::new(MockFeed::with(Vec::new(), &log));
        assert_eq!(agent.start_polling(feed), Err(AgentError::Unsupported));
        assert!(toasts.kinds().is_empty());
    }
}
