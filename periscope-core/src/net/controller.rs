//! Connection lifecycle.
//!
//! [`ConnectionState`] models the session's connection phase with
//! validated transitions that return `Result` instead of panicking.
//! [`ConnectionController`] drives it: it dials with a per-attempt
//! deadline and a fixed attempt budget, and publishes every state
//! change on a watch channel for the UI.
//!
//! ```text
//!  Disconnected ──► Connecting ──► Connected ──► Reconnecting
//!                      │  ▲                           │
//!                      │  └───────────────────────────┘
//!                      ▼
//!                    Failed (terminal)
//! ```
//!
//! The attempt budget is per episode: a session that connected and
//! later lost the link starts the next episode with a full budget
//! again. Only an episode that never connects ends in `Failed`.

use std::time::Instant;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::config::DEFAULT_PORT;
use crate::error::ScreenError;

// ── ConnectionState ──────────────────────────────────────────────

/// The current phase of the stream connection.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No connection and none in progress. Initial state.
    #[default]
    Disconnected,

    /// Dial attempt `attempt` of `max` is in flight.
    Connecting { attempt: u32, max: u32 },

    /// Stream established and flowing.
    Connected {
        /// When the connection entered the `Connected` state.
        since: Instant,
    },

    /// A previously connected stream was lost; a new episode is
    /// about to begin.
    Reconnecting,

    /// Every attempt of an episode failed. Terminal.
    Failed { attempts: u32 },
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Connecting { attempt, max } => {
                write!(f, "Connecting... attempt {attempt}/{max}")
            }
            Self::Connected { .. } => write!(f, "Connected"),
            Self::Reconnecting => write!(f, "Lost connection, reconnecting..."),
            Self::Failed { attempts } => {
                write!(f, "Could not connect after {attempts} attempts")
            }
        }
    }
}

impl ConnectionState {
    /// Returns `true` when the stream is established.
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected { .. })
    }

    /// Returns `true` once the session has given up for good.
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    /// How long the connection has been established, if it is.
    pub fn connected_duration(&self) -> Option<std::time::Duration> {
        match self {
            Self::Connected { since } => Some(since.elapsed()),
            _ => None,
        }
    }

    // ── Transitions ──────────────────────────────────────────────

    /// Start attempt 1 of a fresh episode.
    ///
    /// Valid from: `Disconnected`, `Reconnecting`.
    pub fn begin_connect(&mut self, max: u32) -> Result<(), ScreenError> {
        match self {
            Self::Disconnected | Self::Reconnecting => {
                *self = Self::Connecting { attempt: 1, max };
                Ok(())
            }
            _ => Err(ScreenError::StateViolation(
                "cannot connect: episode already active",
            )),
        }
    }

    /// Move on to the next attempt of the current episode.
    ///
    /// Valid from: `Connecting` with budget remaining.
    pub fn next_attempt(&mut self) -> Result<(), ScreenError> {
        match self {
            Self::Connecting { attempt, max } if *attempt < *max => {
                *attempt += 1;
                Ok(())
            }
            Self::Connecting { .. } => Err(ScreenError::StateViolation(
                "cannot retry: attempt budget exhausted",
            )),
            _ => Err(ScreenError::StateViolation(
                "cannot retry: not currently connecting",
            )),
        }
    }

    /// An attempt succeeded.
    ///
    /// Valid from: `Connecting`.
    pub fn established(&mut self) -> Result<(), ScreenError> {
        match self {
            Self::Connecting { .. } => {
                *self = Self::Connected {
                    since: Instant::now(),
                };
                Ok(())
            }
            _ => Err(ScreenError::StateViolation(
                "cannot establish: no attempt in flight",
            )),
        }
    }

    /// The established stream broke.
    ///
    /// Valid from: `Connected`.
    pub fn lost(&mut self) -> Result<(), ScreenError> {
        match self {
            Self::Connected { .. } => {
                *self = Self::Reconnecting;
                Ok(())
            }
            _ => Err(ScreenError::StateViolation(
                "cannot mark lost: not connected",
            )),
        }
    }

    /// The episode's whole attempt budget failed.
    ///
    /// Valid from: `Connecting`.
    pub fn exhausted(&mut self) -> Result<(), ScreenError> {
        match self {
            Self::Connecting { max, .. } => {
                *self = Self::Failed { attempts: *max };
                Ok(())
            }
            _ => Err(ScreenError::StateViolation(
                "cannot fail: not currently connecting",
            )),
        }
    }

    /// Orderly shutdown, from any state.
    pub fn shut_down(&mut self) {
        *self = Self::Disconnected;
    }
}

// ── Dialer ───────────────────────────────────────────────────────

/// Connector seam. Production code uses [`TcpDialer`]; tests inject
/// dialers that hang, refuse, or count calls.
#[async_trait]
pub trait Dialer: Send + Sync {
    async fn dial(&self, host: &str) -> std::io::Result<TcpStream>;
}

/// Plain `TcpStream::connect`.
pub struct TcpDialer;

#[async_trait]
impl Dialer for TcpDialer {
    async fn dial(&self, host: &str) -> std::io::Result<TcpStream> {
        TcpStream::connect(host).await
    }
}

/// Append the default stream port when the host string has none.
pub fn with_default_port(host: &str) -> String {
    if host.contains(':') {
        host.to_string()
    } else {
        format!("{host}:{DEFAULT_PORT}")
    }
}

// ── ConnectionController ─────────────────────────────────────────

/// Drives the state machine through dial episodes.
pub struct ConnectionController {
    dialer: Box<dyn Dialer>,
    host: String,
    max_attempts: u32,
    attempt_timeout: std::time::Duration,
    state: ConnectionState,
    state_tx: watch::Sender<ConnectionState>,
    state_rx: watch::Receiver<ConnectionState>,
}

impl ConnectionController {
    pub fn new(
        dialer: Box<dyn Dialer>,
        host: String,
        max_attempts: u32,
        attempt_timeout: std::time::Duration,
    ) -> Self {
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        Self {
            dialer,
            host,
            max_attempts,
            attempt_timeout,
            state: ConnectionState::Disconnected,
            state_tx,
            state_rx,
        }
    }

    /// Watch the connection phase. The UI renders
    /// `state.to_string()` directly.
    pub fn state_receiver(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    /// The host this controller dials.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Run one connect episode: up to the configured number of
    /// attempts, each bounded by the attempt deadline.
    ///
    /// On success the state is `Connected` and the stream is
    /// returned. On exhaustion the state is `Failed` and the session
    /// must not call this again.
    pub async fn connect_episode(&mut self) -> Result<TcpStream, ScreenError> {
        self.transition(|s, max| s.begin_connect(max))?;

        loop {
            let attempt = match &self.state {
                ConnectionState::Connecting { attempt, .. } => *attempt,
                _ => 0,
            };
            info!(host = %self.host, attempt, max = self.max_attempts, "dialing");

            match tokio::time::timeout(self.attempt_timeout, self.dialer.dial(&self.host)).await {
                Ok(Ok(stream)) => {
                    self.transition(|s, _| s.established())?;
                    info!(host = %self.host, "connected");
                    return Ok(stream);
                }
                Ok(Err(e)) => {
                    warn!(host = %self.host, attempt, error = %e, "connect attempt failed");
                }
                Err(_) => {
                    warn!(
                        host = %self.host,
                        attempt,
                        timeout = ?self.attempt_timeout,
                        "connect attempt timed out"
                    );
                }
            }

            if attempt >= self.max_attempts {
                self.transition(|s, _| s.exhausted())?;
                return Err(ScreenError::ConnectFailed {
                    host: self.host.clone(),
                    attempts: self.max_attempts,
                });
            }
            self.transition(|s, _| s.next_attempt())?;
        }
    }

    /// The established stream broke; the next
    /// [`connect_episode`](Self::connect_episode) gets a full attempt
    /// budget again.
    pub fn mark_lost(&mut self) -> Result<(), ScreenError> {
        self.transition(|s, _| s.lost())
    }

    /// Orderly shutdown.
    pub fn shut_down(&mut self) {
        self.state.shut_down();
        let _ = self.state_tx.send(self.state.clone());
    }

    /// Current phase.
    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    fn transition(
        &mut self,
        apply: impl FnOnce(&mut ConnectionState, u32) -> Result<(), ScreenError>,
    ) -> Result<(), ScreenError> {
        apply(&mut self.state, self.max_attempts)?;
        let _ = self.state_tx.send(self.state.clone());
        Ok(())
    }
}

// ── Tests ────────────────────────────────────────────────────────
