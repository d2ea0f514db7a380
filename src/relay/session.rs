//! Relay lifecycle: connect, clean up, then run both directions.
//!
//! ```text
//! Idle -> Connecting -> Running -> Terminated
//!            |             |
//!            +--> Failed <-+
//! ```

use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};

use crate::common::error::{RconResult, RelayError, RelayResult};
use crate::config::Config;
use crate::protocol::rcon::RemoteConsole;
use crate::relay::classifier::Classifier;
use crate::relay::dispatcher::Dispatcher;
use crate::relay::registry::CommandRegistry;
use crate::relay::sink::ReplySink;
use crate::relay::tailer::{forward_events, LogTailer};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Connecting,
    Running,
    Terminated,
    Failed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::Connecting => "connecting",
            SessionState::Running => "running",
            SessionState::Terminated => "terminated",
            SessionState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Values the session needs from the configuration.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub log_file: PathBuf,
    pub avatar_tag: String,
}

impl SessionSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            log_file: PathBuf::from(&config.minecraft.log_file),
            avatar_tag: config.relay.avatar_tag.clone(),
        }
    }
}

/// Inbound half of a running relay.
pub struct RunningRelay {
    pub dispatcher: Dispatcher,
    pub sink: Arc<dyn ReplySink>,
}

pub struct RelaySession {
    settings: SessionSettings,
    console: Arc<dyn RemoteConsole>,
    state: watch::Sender<SessionState>,
    started: AtomicBool,
    running: OnceLock<Arc<RunningRelay>>,
    failures: mpsc::UnboundedSender<RelayError>,
}

impl RelaySession {
    /// Establish the remote-control connection and clear stale avatars.
    ///
    /// The returned receiver yields errors that end a running session.
    pub async fn connect<C, F>(
        settings: SessionSettings,
        connect: F,
    ) -> RelayResult<(Self, mpsc::UnboundedReceiver<RelayError>)>
    where
        C: RemoteConsole + 'static,
        F: Future<Output = RconResult<C>>,
    {
        let (state, _) = watch::channel(SessionState::Idle);
        set_state(&state, SessionState::Connecting);

        let console: Arc<dyn RemoteConsole> = match connect.await {
            Ok(console) => Arc::new(console),
            Err(e) => {
                set_state(&state, SessionState::Failed);
                return Err(e.into());
            }
        };

        let cleanup = format!("kill @e[tag={}]", settings.avatar_tag);
        match console.command(&cleanup).await {
            Ok(response) => info!("Cleared old avatars: {}", response),
            Err(e) => warn!("Could not clear old avatars: {}", e),
        }

        let (failures, failures_rx) = mpsc::unbounded_channel();
        let session = Self {
            settings,
            console,
            state,
            started: AtomicBool::new(false),
            running: OnceLock::new(),
            failures,
        };
        Ok((session, failures_rx))
    }

    pub fn console(&self) -> Arc<dyn RemoteConsole> {
        self.console.clone()
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Start the log forwarder and accept inbound messages.
    ///
    /// Messages are accepted from `channel_id` only, the channel `sink`
    /// posts into. Returns `Ok(false)` when the session was already
    /// started. The chat layer may announce readiness more than once.
    pub async fn enter_running(
        &self,
        registry: Arc<CommandRegistry>,
        sink: Arc<dyn ReplySink>,
        channel_id: u64,
        relay_id: u64,
    ) -> RelayResult<bool> {
        if self
            .started
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            info!("Relay already running, ignoring repeated ready signal");
            return Ok(false);
        }

        let tailer = match LogTailer::open(&self.settings.log_file).await {
            Ok(tailer) => tailer,
            Err(e) => {
                error!("{}", e);
                self.fail();
                let _ = self.failures.send(RelayError::LogSource {
                    path: self.settings.log_file.display().to_string(),
                    source: std::io::Error::other(e.to_string()),
                });
                return Err(e);
            }
        };

        let dispatcher = Dispatcher::new(registry, channel_id, relay_id);
        let _ = self.running.set(Arc::new(RunningRelay {
            dispatcher,
            sink: sink.clone(),
        }));

        let failures = self.failures.clone();
        tokio::spawn(async move {
            forward_events(tailer, &Classifier::default(), sink.as_ref()).await;
            let _ = failures.send(RelayError::TailerStopped);
        });

        set_state(&self.state, SessionState::Running);
        Ok(true)
    }

    /// The inbound half, once running.
    pub fn running(&self) -> Option<Arc<RunningRelay>> {
        self.running.get().cloned()
    }

    pub fn terminate(&self) {
        set_state(&self.state, SessionState::Terminated);
    }

    pub fn fail(&self) {
        set_state(&self.state, SessionState::Failed);
    }
}

fn set_state(state: &watch::Sender<SessionState>, next: SessionState) {
    let previous = state.send_replace(next);
    if previous != next {
        info!("Relay session: {} -> {}", previous, next);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::time::Duration;

    use crate::common::error::RconError;
    use crate::common::InboundMessage;
    use crate::relay::handlers::build_registry;
    use crate::relay::testing::{author, FakeConsole, RecordingSink};

    fn settings(log_file: PathBuf) -> SessionSettings {
        SessionSettings {
            log_file,
            avatar_tag: "discord".to_string(),
        }
    }

    async fn connected(log_file: PathBuf) -> (RelaySession, mpsc::UnboundedReceiver<RelayError>) {
        RelaySession::connect(settings(log_file), async { Ok(FakeConsole::default()) })
            .await
            .unwrap()
    }

    const CHANNEL_ID: u64 = 42;

    fn registry(session: &RelaySession) -> Arc<CommandRegistry> {
        Arc::new(build_registry(session.console(), "mc cmds", "unknown", "discord").unwrap())
    }

    #[tokio::test]
    async fn test_connect_failure_is_fatal() {
        let result = RelaySession::connect(settings(PathBuf::from("unused")), async {
            Err::<FakeConsole, _>(RconError::AuthFailed)
        })
        .await;
        assert!(matches!(result, Err(RelayError::Rcon(RconError::AuthFailed))));
    }

    #[tokio::test]
    async fn test_connect_clears_old_avatars() {
        let console = Arc::new(FakeConsole::default());
        let shared = console.clone();
        let (session, _failures) =
            RelaySession::connect(settings(PathBuf::from("unused")), async move { Ok(SharedConsole(shared)) })
                .await
                .unwrap();

        assert_eq!(session.state(), SessionState::Connecting);
        assert_eq!(console.commands(), vec!["kill @e[tag=discord]"]);
    }

    #[tokio::test]
    async fn test_failed_cleanup_is_not_fatal() {
        let (session, _failures) =
            RelaySession::connect(settings(PathBuf::from("unused")), async { Ok(FakeConsole::failing()) })
                .await
                .unwrap();
        assert_eq!(session.state(), SessionState::Connecting);
    }

    #[tokio::test]
    async fn test_enter_running_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("latest.log");
        std::fs::write(&path, "").unwrap();

        let (session, _failures) = connected(path.clone()).await;
        let sink = Arc::new(RecordingSink::default());

        assert!(session.enter_running(registry(&session), sink.clone(), CHANNEL_ID, 1).await.unwrap());
        assert!(!session.enter_running(registry(&session), sink.clone(), CHANNEL_ID, 1).await.unwrap());
        assert_eq!(session.state(), SessionState::Running);

        let mut file = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(b"[12:00:00] [Server thread/INFO]: Steve joined the game\n").unwrap();

        tokio::time::timeout(Duration::from_secs(5), async {
            while sink.messages().is_empty() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        // A second tailer would have forwarded the line twice.
        assert_eq!(sink.messages(), vec!["JOINED: Steve joined the game"]);
    }

    #[tokio::test]
    async fn test_missing_log_fails_session() {
        let dir = tempfile::tempdir().unwrap();
        let (session, mut failures) = connected(dir.path().join("absent.log")).await;

        let result = session
            .enter_running(registry(&session), Arc::new(RecordingSink::default()), CHANNEL_ID, 1)
            .await;

        assert!(matches!(result, Err(RelayError::LogSource { .. })));
        assert_eq!(session.state(), SessionState::Failed);
        assert!(session.running().is_none());
        assert!(matches!(failures.try_recv(), Ok(RelayError::LogSource { .. })));
    }

    #[tokio::test]
    async fn test_running_relay_dispatches() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("latest.log");
        std::fs::write(&path, "").unwrap();

        let (session, _failures) = connected(path).await;
        let sink = Arc::new(RecordingSink::default());
        session.enter_running(registry(&session), sink.clone(), CHANNEL_ID, 1).await.unwrap();

        let relay = session.running().unwrap();
        let message = InboundMessage {
            channel_id: CHANNEL_ID,
            channel_name: "mcchat".to_string(),
            author: author("Steve", &[]),
            content: "<ip>".to_string(),
        };
        relay.dispatcher.dispatch(&message, relay.sink.as_ref()).await;

        assert_eq!(sink.messages(), vec!["Server public IP address is: unknown"]);
    }

    #[tokio::test]
    async fn test_terminate_and_fail_are_recorded() {
        let (session, _failures) = connected(PathBuf::from("unused")).await;

        session.terminate();
        assert_eq!(session.state(), SessionState::Terminated);
        session.fail();
        assert_eq!(session.state(), SessionState::Failed);
    }

    struct SharedConsole(Arc<FakeConsole>);

    #[async_trait::async_trait]
    impl RemoteConsole for SharedConsole {
        async fn command(&self, text: &str) -> RconResult<String> {
            self.0.command(text).await
        }
    }
}
