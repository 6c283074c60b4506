use crate::config::ClientConfig;
use crate::connection::{ConnectionEvent, ConnectionManager};
use crewlens_core::ClientMessage;
use crewlens_session::{ApplyOutcome, Session, SessionConfig, SessionSnapshot};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Commands accepted by the session actor.
#[derive(Debug)]
enum Command {
    Submit {
        text: String,
        reply: oneshot::Sender<bool>,
    },
    RequestAgentStatus {
        reply: oneshot::Sender<bool>,
    },
    Shutdown,
}

/// Owns the [`Session`] and the connection; the only writer of session
/// state.
///
/// Connection events and host commands are processed one at a time, in
/// channel order. After every change a fresh [`SessionSnapshot`] is
/// published on a `watch` channel.
pub struct SessionRuntime {
    session: Session,
    connection: ConnectionManager,
    events: mpsc::UnboundedReceiver<ConnectionEvent>,
    commands: mpsc::Receiver<Command>,
    snapshots: watch::Sender<SessionSnapshot>,
}

/// Host-side handle to a running [`SessionRuntime`].
pub struct SessionHandle {
    commands: mpsc::Sender<Command>,
    snapshots: watch::Receiver<SessionSnapshot>,
    task: JoinHandle<()>,
}

impl SessionRuntime {
    /// Connect to the configured server and spawn the actor.
    pub fn spawn(config: ClientConfig) -> SessionHandle {
        let (connection, events) = ConnectionManager::connect(config.server);
        Self::spawn_with(config.session, connection, events)
    }

    /// Spawn the actor over an existing connection.
    pub fn spawn_with(
        config: SessionConfig,
        connection: ConnectionManager,
        events: mpsc::UnboundedReceiver<ConnectionEvent>,
    ) -> SessionHandle {
        let session = Session::new(config);
        let (snapshots, snapshot_rx) = watch::channel(session.snapshot());
        let (commands_tx, commands) = mpsc::channel(64);

        let runtime = Self {
            session,
            connection,
            events,
            commands,
            snapshots,
        };
        let task = tokio::spawn(runtime.run());

        SessionHandle {
            commands: commands_tx,
            snapshots: snapshot_rx,
            task,
        }
    }

    async fn run(mut self) {
        loop {
            tokio::select! {
                Some(event) = self.events.recv() => self.on_event(event),
                command = self.commands.recv() => match command {
                    Some(Command::Submit { text, reply }) => {
                        let delivered = self.submit(&text);
                        self.publish();
                        let _ = reply.send(delivered);
                        continue;
                    }
                    Some(Command::RequestAgentStatus { reply }) => {
                        let _ = reply.send(self.connection.send(&ClientMessage::GetAgentStatus));
                        continue;
                    }
                    Some(Command::Shutdown) | None => break,
                },
            }
            self.publish();
        }

        self.connection.shutdown().await;
        info!("Session runtime stopped");
    }

    fn on_event(&mut self, event: ConnectionEvent) {
        match event {
            ConnectionEvent::Connected { connection_id } => {
                debug!(connection_id = %connection_id, "Session attached to connection");
                self.session.on_connected();
            }
            ConnectionEvent::Message(value) => match self.session.apply_value(value) {
                ApplyOutcome::Stale(request_id) => {
                    debug!(request_id = %request_id, "Stale event dropped");
                }
                ApplyOutcome::Rejected(reason) => {
                    warn!(reason = %reason, "Event rejected");
                }
                ApplyOutcome::Applied | ApplyOutcome::Unknown(_) | ApplyOutcome::Ignored => {}
            },
            ConnectionEvent::Disconnected => self.session.on_disconnected(),
            ConnectionEvent::Error(error) => self.session.on_transport_error(&error),
        }
    }

    fn submit(&mut self, text: &str) -> bool {
        let delivered = self.session.can_send()
            && self.connection.send(&ClientMessage::request(
                text,
                Some(Uuid::new_v4().to_string()),
            ));
        self.session.record_submission(text, delivered)
    }

    fn publish(&self) {
        self.snapshots.send_replace(self.session.snapshot());
    }
}

impl SessionHandle {
    /// Submit a user request. Returns whether it was sent; a refusal is
    /// also recorded in the transcript.
    pub async fn submit(&self, text: impl Into<String>) -> bool {
        let (reply, rx) = oneshot::channel();
        let command = Command::Submit {
            text: text.into(),
            reply,
        };
        if self.commands.send(command).await.is_err() {
            return false;
        }
        rx.await.unwrap_or(false)
    }

    /// Ask the server to resend every agent's status.
    pub async fn request_agent_status(&self) -> bool {
        let (reply, rx) = oneshot::channel();
        if self
            .commands
            .send(Command::RequestAgentStatus { reply })
            .await
            .is_err()
        {
            return false;
        }
        rx.await.unwrap_or(false)
    }

    /// Latest published snapshot.
    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshots.borrow().clone()
    }

    /// A receiver that observes every published snapshot.
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshots.clone()
    }

    /// Stop the actor and its connection, waiting for both.
    pub async fn shutdown(self) {
        let _ = self.commands.send(Command::Shutdown).await;
        if let Err(e) = self.task.await {
            warn!(error = %e, "Session runtime ended abnormally");
        }
    }
}
