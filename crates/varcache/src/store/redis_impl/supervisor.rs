//! Connection supervisor.
//!
//! Owns the write side of the connection slot. Requests report transport
//! failures as [`ConnectionEvent`]s; the supervisor decides through
//! [`ConnectionState::on_event`] whether they concern the live connection and,
//! if so, swaps it out for a fresh one.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use tokio::sync::{broadcast, mpsc, watch};

use varcache_core::cache::{CacheError, Result};
use varcache_core::connection::{
    parse_readiness, BackoffPolicy, ConnectionEvent, ConnectionState, Readiness, Transition,
};

use super::error::map_redis_error;

/// The connection slot published to requests.
#[derive(Clone)]
pub(crate) struct Link<C = MultiplexedConnection> {
    pub state: ConnectionState,
    pub conn: Option<C>,
}

impl<C> Link<C> {
    pub fn offline() -> Self {
        Self {
            state: ConnectionState::initial(),
            conn: None,
        }
    }
}

/// Opens a fresh connection for the supervisor.
#[async_trait]
pub(crate) trait Connect: Send + Sync + 'static {
    type Conn: Clone + Send + Sync + 'static;

    async fn connect(&self) -> Result<Self::Conn>;
}

/// Opens connections and checks that the server is ready to serve them.
#[derive(Clone)]
pub(crate) struct Connector {
    pub client: redis::Client,
    pub connect_timeout: Duration,
    pub response_timeout: Duration,
    pub ready_check: bool,
}

#[async_trait]
impl Connect for Connector {
    type Conn = MultiplexedConnection;

    async fn connect(&self) -> Result<MultiplexedConnection> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection_with_timeouts(
                self.response_timeout,
                self.connect_timeout,
            )
            .await
            .map_err(map_redis_error)?;

        if self.ready_check {
            check_ready(&mut conn).await?;
        }

        Ok(conn)
    }
}

async fn check_ready(conn: &mut MultiplexedConnection) -> Result<()> {
    let info: String = redis::cmd("INFO")
        .arg("persistence")
        .query_async(conn)
        .await
        .map_err(map_redis_error)?;

    match parse_readiness(&info) {
        Readiness::Ready => Ok(()),
        Readiness::Loading {
            eta_seconds: Some(eta),
        } => Err(CacheError::NotReady(format!(
            "loading dataset, eta {}s",
            eta
        ))),
        Readiness::Loading { eta_seconds: None } => {
            Err(CacheError::NotReady("loading dataset".to_string()))
        }
    }
}

pub(crate) struct Supervisor<C: Connect> {
    pub connector: C,
    pub backoff: BackoffPolicy,
    pub link: watch::Sender<Link<C::Conn>>,
    pub events: mpsc::UnboundedReceiver<ConnectionEvent>,
    pub shutdown: broadcast::Receiver<()>,
}

impl<C: Connect> Supervisor<C> {
    /// Runs until shutdown is signalled or the store is dropped.
    pub async fn run(mut self) {
        let connected = self.link.borrow().state.is_connected();
        let mut running = connected || self.reconnect().await;

        while running {
            tokio::select! {
                _ = self.shutdown.recv() => running = false,
                event = self.events.recv() => match event {
                    Some(event) => running = self.handle(event).await,
                    None => running = false,
                },
            }
        }

        self.link.send_modify(|link| {
            link.state = link.state.disconnected();
            link.conn = None;
        });
        tracing::info!("Cache connection supervisor stopped");
    }

    /// Reacts to one connection event. Returns false if shutdown was
    /// requested while reconnecting.
    async fn handle(&mut self, event: ConnectionEvent) -> bool {
        let state = self.link.borrow().state;

        if state.on_event(&event) == Transition::Ignore {
            tracing::debug!(
                event_generation = event.generation(),
                current_generation = state.generation(),
                "Ignoring event for a replaced connection"
            );
            return true;
        }

        match &event {
            ConnectionEvent::Error { generation, reason } => {
                tracing::warn!(generation, error = %reason, "Cache connection error, reconnecting");
            }
            ConnectionEvent::End { generation } => {
                tracing::warn!(generation, "Cache connection closed, reconnecting");
            }
        }

        self.link.send_modify(|link| {
            link.state = link.state.disconnected();
            link.conn = None;
        });

        self.reconnect().await
    }

    /// Reconnects with backoff until it succeeds. Returns false if shutdown
    /// was requested first.
    async fn reconnect(&mut self) -> bool {
        let mut attempt: u32 = 0;

        loop {
            let delay = self.backoff.delay(attempt, rand::random::<f64>());
            if !delay.is_zero() {
                tokio::select! {
                    _ = self.shutdown.recv() => return false,
                    _ = tokio::time::sleep(delay) => {}
                }
            }

            let result = tokio::select! {
                _ = self.shutdown.recv() => return false,
                result = self.connector.connect() => result,
            };

            match result {
                Ok(conn) => {
                    let state = self.link.borrow().state.reconnected();
                    self.link.send_replace(Link {
                        state,
                        conn: Some(conn),
                    });
                    tracing::info!(
                        generation = state.generation(),
                        attempts = attempt + 1,
                        "Connected to cache service"
                    );
                    return true;
                }
                Err(e) => {
                    attempt = attempt.saturating_add(1);
                    tracing::warn!(
                        attempt,
                        next_delay_ms = self.backoff.ceiling(attempt).as_millis() as u64,
                        error = %e,
                        "Cache reconnect attempt failed"
                    );
                }
            }
        }
    }
}
