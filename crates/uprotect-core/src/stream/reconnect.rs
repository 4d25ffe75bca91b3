// ── Update-stream reconnector ──
//
// Keeps one update-stream session alive. Frames are forwarded to an
// `mpsc` channel; lifecycle changes are published as a `watch` state and
// a `broadcast` of events. After an unintended disconnect the loop
// retries with exponential backoff, and gives up after the policy's
// attempt limit. A successful connect resets the attempt counter.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{Mutex, broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uprotect_api::{RawFrame, SessionEvent};

use crate::backend::{StreamConnector, StreamSession};
use crate::config::ReconnectPolicy;

const EVENT_CAPACITY: usize = 64;

/// Close code reported when a session ends without saying why.
const ABNORMAL_CLOSURE: u16 = 1006;

/// Connection lifecycle as seen by consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    /// Attempt `attempt` is underway (`0` for the first connect).
    Connecting { attempt: u32 },
    Connected,
    /// Reconnect attempts exhausted; only an explicit `connect` restarts.
    GivenUp,
}

/// Lifecycle notifications.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// A session opened. `resumed` is `true` for every open after the first.
    Opened { resumed: bool },
    Closed { code: u16, reason: String },
    Error(String),
    GivenUp { attempts: u32 },
}

struct RunHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

struct ReconnectorInner {
    connector: Arc<dyn StreamConnector>,
    policy: ReconnectPolicy,
    state: watch::Sender<ConnectionState>,
    events: broadcast::Sender<ConnectionEvent>,
    should_reconnect: AtomicBool,
    run: Mutex<Option<RunHandle>>,
}

/// Drives a [`StreamConnector`] with backoff.
///
/// Cheaply cloneable; clones share state.
#[derive(Clone)]
pub struct Reconnector {
    inner: Arc<ReconnectorInner>,
}

impl Reconnector {
    pub fn new(connector: Arc<dyn StreamConnector>, policy: ReconnectPolicy) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(ReconnectorInner {
                connector,
                policy,
                state,
                events,
                should_reconnect: AtomicBool::new(false),
                run: Mutex::new(None),
            }),
        }
    }

    /// Start the connect loop, forwarding frames to `frames`.
    ///
    /// A no-op while a loop is already running. After `GivenUp` this
    /// starts over with a fresh attempt counter.
    pub async fn connect(&self, frames: mpsc::Sender<RawFrame>) {
        let mut run = self.inner.run.lock().await;
        if run.as_ref().is_some_and(|r| !r.task.is_finished()) {
            debug!("update stream already running, connect ignored");
            return;
        }

        self.inner.should_reconnect.store(true, Ordering::SeqCst);
        self.inner.set_state(ConnectionState::Connecting { attempt: 0 });
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_loop(Arc::clone(&self.inner), frames, cancel.clone()));
        *run = Some(RunHandle { cancel, task });
    }

    /// Stop the loop and close the live session. Safe to call repeatedly.
    pub async fn disconnect(&self) {
        self.inner.should_reconnect.store(false, Ordering::SeqCst);
        let handle = self.inner.run.lock().await.take();
        if let Some(RunHandle { cancel, task }) = handle {
            cancel.cancel();
            if let Err(e) = task.await {
                warn!(error = %e, "update stream task ended abnormally");
            }
        }
        self.inner.state.send_replace(ConnectionState::Disconnected);
    }

    pub fn state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    /// Watch the connection state.
    pub fn state_receiver(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    /// Subscribe to lifecycle events.
    pub fn events(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.inner.events.subscribe()
    }
}

impl ReconnectorInner {
    fn set_state(&self, state: ConnectionState) {
        self.state.send_replace(state);
    }

    fn emit(&self, event: ConnectionEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

/// How a session ended.
enum SessionEnd {
    Cancelled,
    Closed { code: u16, reason: String },
    Failed(String),
}

async fn run_loop(inner: Arc<ReconnectorInner>, frames: mpsc::Sender<RawFrame>, cancel: CancellationToken) {
    let mut attempt: u32 = 0;
    let mut opened_before = false;

    loop {
        inner.set_state(ConnectionState::Connecting { attempt });

        let connected = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            result = inner.connector.connect() => result,
        };

        match connected {
            Ok(mut session) => {
                attempt = 0;
                inner.set_state(ConnectionState::Connected);
                inner.emit(ConnectionEvent::Opened {
                    resumed: opened_before,
                });
                opened_before = true;
                info!("update stream connected");

                let end = pump(session.as_mut(), &frames, &cancel).await;
                session.close().await;
                match end {
                    SessionEnd::Cancelled => break,
                    SessionEnd::Closed { code, reason } => {
                        info!(code, reason = %reason, "update stream closed");
                        inner.emit(ConnectionEvent::Closed { code, reason });
                    }
                    SessionEnd::Failed(e) => {
                        warn!(error = %e, "update stream failed");
                        inner.emit(ConnectionEvent::Error(e));
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, attempt, "update stream connect failed");
                inner.emit(ConnectionEvent::Error(e.to_string()));
            }
        }

        inner.set_state(ConnectionState::Disconnected);
        if !inner.should_reconnect.load(Ordering::SeqCst) {
            break;
        }

        attempt += 1;
        if attempt > inner.policy.max_attempts {
            warn!(attempts = inner.policy.max_attempts, "update stream reconnect attempts exhausted");
            inner.set_state(ConnectionState::GivenUp);
            inner.emit(ConnectionEvent::GivenUp {
                attempts: inner.policy.max_attempts,
            });
            return;
        }

        let delay = inner.policy.delay_for(attempt);
        info!(attempt, delay_ms = delay.as_millis(), "scheduling update stream reconnect");
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(delay) => {}
        }
        if !inner.should_reconnect.load(Ordering::SeqCst) {
            break;
        }
    }

    inner.set_state(ConnectionState::Disconnected);
    debug!("update stream loop stopped");
}

/// Forward frames until the session ends or `cancel` fires.
async fn pump(
    session: &mut dyn StreamSession,
    frames: &mpsc::Sender<RawFrame>,
    cancel: &CancellationToken,
) -> SessionEnd {
    loop {
        let event = tokio::select! {
            biased;
            () = cancel.cancelled() => return SessionEnd::Cancelled,
            event = session.next_event() => event,
        };

        match event {
            Some(SessionEvent::Message(frame)) => {
                if frames.send(frame).await.is_err() {
                    debug!("frame consumer dropped, stopping update stream");
                    return SessionEnd::Cancelled;
                }
            }
            Some(SessionEvent::Closed { code, reason }) => return SessionEnd::Closed { code, reason },
            Some(SessionEvent::Error(e)) => return SessionEnd::Failed(e),
            None => {
                return SessionEnd::Closed {
                    code: ABNORMAL_CLOSURE,
                    reason: "session ended".into(),
                };
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use bytes::Bytes;
    use futures_util::FutureExt;
    use futures_util::future::BoxFuture;
    use tokio::time::Instant;

    use super::*;
    use crate::error::CoreError;

    /// Scripted session: yields its events, then stays open until closed.
    struct FakeSession {
        events: VecDeque<SessionEvent>,
        hold_open: bool,
        closes: Arc<AtomicUsize>,
    }

    impl StreamSession for FakeSession {
        fn next_event(&mut self) -> BoxFuture<'_, Option<SessionEvent>> {
            async move {
                if let Some(event) = self.events.pop_front() {
                    return Some(event);
                }
                if self.hold_open {
                    std::future::pending::<()>().await;
                }
                None
            }
            .boxed()
        }

        fn close(&mut self) -> BoxFuture<'_, ()> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            async {}.boxed()
        }
    }

    enum Step {
        Fail,
        Open(Vec<SessionEvent>, bool),
    }

    /// Plays `script` in order, then fails every further connect.
    struct FakeConnector {
        script: std::sync::Mutex<VecDeque<Step>>,
        calls: std::sync::Mutex<Vec<Instant>>,
        closes: Arc<AtomicUsize>,
    }

    impl FakeConnector {
        fn new(script: Vec<Step>) -> Arc<Self> {
            Arc::new(Self {
                script: std::sync::Mutex::new(script.into()),
                calls: std::sync::Mutex::new(Vec::new()),
                closes: Arc::new(AtomicUsize::new(0)),
            })
        }

        fn calls(&self) -> Vec<Instant> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl StreamConnector for FakeConnector {
        fn connect(&self) -> BoxFuture<'_, Result<Box<dyn StreamSession>, CoreError>> {
            self.calls.lock().unwrap().push(Instant::now());
            let step = self.script.lock().unwrap().pop_front().unwrap_or(Step::Fail);
            let result: Result<Box<dyn StreamSession>, CoreError> = match step {
                Step::Fail => Err(CoreError::ConnectionFailed {
                    reason: "refused".into(),
                }),
                Step::Open(events, hold_open) => Ok(Box::new(FakeSession {
                    events: events.into(),
                    hold_open,
                    closes: Arc::clone(&self.closes),
                })),
            };
            async move { result }.boxed()
        }
    }

    fn gaps(calls: &[Instant]) -> Vec<u64> {
        calls.windows(2).map(|w| (w[1] - w[0]).as_secs()).collect()
    }

    fn closed() -> SessionEvent {
        SessionEvent::Closed {
            code: 1001,
            reason: "going away".into(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn backoff_schedule_then_gives_up() {
        let connector = FakeConnector::new(vec![]);
        let reconnector = Reconnector::new(connector.clone(), ReconnectPolicy::default());
        let mut state = reconnector.state_receiver();
        let mut events = reconnector.events();
        let (tx, _rx) = mpsc::channel(8);

        reconnector.connect(tx).await;
        state.wait_for(|s| *s == ConnectionState::GivenUp).await.unwrap();

        let calls = connector.calls();
        assert_eq!(calls.len(), 11, "initial attempt plus ten reconnects");
        assert_eq!(gaps(&calls), vec![1, 2, 4, 8, 16, 32, 60, 60, 60, 60]);

        let mut last = None;
        while let Ok(event) = events.try_recv() {
            last = Some(event);
        }
        assert_eq!(last, Some(ConnectionEvent::GivenUp { attempts: 10 }));

        // No further attempts once given up.
        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(connector.calls().len(), 11);
    }

    #[tokio::test(start_paused = true)]
    async fn successful_connect_resets_backoff() {
        let connector = FakeConnector::new(vec![
            Step::Fail,
            Step::Fail,
            Step::Open(vec![closed()], false),
            Step::Fail,
            Step::Open(vec![], true),
        ]);
        let reconnector = Reconnector::new(connector.clone(), ReconnectPolicy::default());
        let mut state = reconnector.state_receiver();
        let (tx, _rx) = mpsc::channel(8);

        reconnector.connect(tx).await;
        tokio::time::sleep(Duration::from_secs(30)).await;
        state.wait_for(|s| *s == ConnectionState::Connected).await.unwrap();

        // fail, +1s fail, +2s open→closed, +1s fail, +2s open
        assert_eq!(gaps(&connector.calls()), vec![1, 2, 1, 2]);
        reconnector.disconnect().await;
    }

    #[tokio::test(start_paused = true)]
    async fn frames_are_forwarded_and_reopen_is_flagged_resumed() {
        let frame = RawFrame::Binary(Bytes::from_static(b"\x01\x01\x00\x00"));
        let connector = FakeConnector::new(vec![
            Step::Open(vec![SessionEvent::Message(frame.clone()), closed()], false),
            Step::Open(vec![], true),
        ]);
        let reconnector = Reconnector::new(connector.clone(), ReconnectPolicy::default());
        let mut events = reconnector.events();
        let (tx, mut rx) = mpsc::channel(8);

        reconnector.connect(tx).await;

        assert_eq!(rx.recv().await.unwrap(), frame);
        assert_eq!(events.recv().await.unwrap(), ConnectionEvent::Opened { resumed: false });
        assert_eq!(
            events.recv().await.unwrap(),
            ConnectionEvent::Closed {
                code: 1001,
                reason: "going away".into()
            }
        );
        assert_eq!(events.recv().await.unwrap(), ConnectionEvent::Opened { resumed: true });

        reconnector.disconnect().await;
        assert_eq!(connector.closes.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_suppresses_reconnect() {
        let connector = FakeConnector::new(vec![Step::Open(vec![], true)]);
        let reconnector = Reconnector::new(connector.clone(), ReconnectPolicy::default());
        let mut state = reconnector.state_receiver();
        let (tx, _rx) = mpsc::channel(8);

        reconnector.connect(tx).await;
        state.wait_for(|s| *s == ConnectionState::Connected).await.unwrap();

        reconnector.disconnect().await;
        reconnector.disconnect().await;
        assert_eq!(reconnector.state(), ConnectionState::Disconnected);

        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(connector.calls().len(), 1);
        assert_eq!(connector.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn connect_while_running_is_noop() {
        let connector = FakeConnector::new(vec![Step::Open(vec![], true)]);
        let reconnector = Reconnector::new(connector.clone(), ReconnectPolicy::default());
        let mut state = reconnector.state_receiver();
        let (tx, _rx) = mpsc::channel(8);

        reconnector.connect(tx.clone()).await;
        state.wait_for(|s| *s == ConnectionState::Connected).await.unwrap();
        reconnector.connect(tx).await;

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(connector.calls().len(), 1);
        reconnector.disconnect().await;
    }

    #[tokio::test(start_paused = true)]
    async fn explicit_connect_after_giving_up_starts_over() {
        let policy = ReconnectPolicy {
            max_attempts: 2,
            ..ReconnectPolicy::default()
        };
        let connector = FakeConnector::new(vec![]);
        let reconnector = Reconnector::new(connector.clone(), policy);
        let mut state = reconnector.state_receiver();
        let (tx, _rx) = mpsc::channel(8);

        reconnector.connect(tx.clone()).await;
        state.wait_for(|s| *s == ConnectionState::GivenUp).await.unwrap();
        assert_eq!(connector.calls().len(), 3);

        reconnector.connect(tx).await;
        state.wait_for(|s| *s == ConnectionState::GivenUp).await.unwrap();
        assert_eq!(connector.calls().len(), 6);
    }
}
