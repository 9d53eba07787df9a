//! Redis store implementation.
//!
//! # Offline behaviour
//!
//! Requests never wait for a connection. If the supervisor is between
//! connections, the request fails with `CacheError::Offline` right away.
//!
//! # Non-atomicity
//!
//! Each trait method is a single command, except `delete_if_equals`, which
//! runs as a Lua script so the compare and the delete cannot interleave with
//! another client. Anything composed from several methods (set then expire)
//! can be interrupted halfway; callers own that gap.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, ConnectionAddr, ConnectionInfo, RedisConnectionInfo};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;

use varcache_core::cache::{CacheError, HashStore, KeyValueStore, ListStore, Result, StoreLifecycle};
use varcache_core::connection::{BackoffPolicy, ConnectionEvent, ConnectionState};

use super::error::{connection_event, map_redis_error};
use super::supervisor::{Connect, Connector, Link, Supervisor};
use crate::config::Config;

/// Deletes `KEYS[1]` only while it still holds `ARGV[1]`.
const COMPARE_AND_DELETE: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
end
return 0
"#;

/// Redis store backed by one supervised multiplexed connection.
pub struct RedisStore {
    link: watch::Receiver<Link>,
    events: mpsc::UnboundedSender<ConnectionEvent>,
    shutdown_tx: broadcast::Sender<()>,
    supervisor: Mutex<Option<JoinHandle<()>>>,
    release_script: redis::Script,
}

impl RedisStore {
    /// Connects to Redis and starts the connection supervisor.
    ///
    /// # Errors
    ///
    /// Returns `CacheError::ConnectionFailed` if the first connection cannot
    /// be established, or `CacheError::NotReady` if the server is still
    /// loading its dataset.
    pub async fn connect(config: &Config) -> Result<Self> {
        let connector = connector(config)?;
        let conn = connector.connect().await?;

        tracing::info!(
            host = %config.redis_host,
            port = config.redis_port,
            db = config.redis_db,
            "Connected to cache service"
        );

        let link = Link {
            state: ConnectionState::initial().reconnected(),
            conn: Some(conn),
        };
        Ok(Self::spawn(connector, config.backoff(), link))
    }

    /// Creates the store without waiting for a connection.
    ///
    /// The supervisor connects in the background; until it succeeds every
    /// request fails with `CacheError::Offline`. Must be called from within a
    /// Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns `CacheError::OperationFailed` if the connection parameters are
    /// invalid.
    pub fn connect_lazy(config: &Config) -> Result<Self> {
        let connector = connector(config)?;
        Ok(Self::spawn(connector, config.backoff(), Link::offline()))
    }

    fn spawn(connector: Connector, backoff: BackoffPolicy, link: Link) -> Self {
        let (link_tx, link_rx) = watch::channel(link);
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let supervisor = Supervisor {
            connector,
            backoff,
            link: link_tx,
            events: events_rx,
            shutdown: shutdown_rx,
        };
        let handle = tokio::spawn(supervisor.run());

        Self {
            link: link_rx,
            events: events_tx,
            shutdown_tx,
            supervisor: Mutex::new(Some(handle)),
            release_script: redis::Script::new(COMPARE_AND_DELETE),
        }
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.link.borrow().state
    }

    /// Waits until a connection is available.
    pub async fn wait_until_connected(&self, timeout: Duration) -> Result<ConnectionState> {
        self.wait_for(timeout, ConnectionState::is_connected).await
    }

    async fn wait_for<F>(&self, timeout: Duration, mut predicate: F) -> Result<ConnectionState>
    where
        F: FnMut(&ConnectionState) -> bool,
    {
        let mut link = self.link.clone();
        let waited = tokio::time::timeout(timeout, link.wait_for(|l| predicate(&l.state))).await;
        match waited {
            Ok(Ok(current)) => Ok(current.state),
            Ok(Err(_)) => Err(CacheError::Offline),
            Err(_) => Err(CacheError::ConnectionFailed(format!(
                "no connection after {}ms",
                timeout.as_millis()
            ))),
        }
    }

    /// Returns a handle on the live connection, or fails fast.
    fn connection(&self) -> Result<(MultiplexedConnection, u64)> {
        let link = self.link.borrow();
        match (&link.conn, link.state) {
            (Some(conn), ConnectionState::Connected { generation }) => {
                Ok((conn.clone(), generation))
            }
            _ => Err(CacheError::Offline),
        }
    }

    /// Maps a request error, telling the supervisor if the connection broke.
    fn report(&self, generation: u64) -> impl Fn(redis::RedisError) -> CacheError + '_ {
        move |err| {
            if let Some(event) = connection_event(&err, generation) {
                // The supervisor only goes away on shutdown.
                let _ = self.events.send(event);
            }
            map_redis_error(err)
        }
    }
}

fn connector(config: &Config) -> Result<Connector> {
    let info = ConnectionInfo {
        addr: ConnectionAddr::Tcp(config.redis_host.clone(), config.redis_port),
        redis: RedisConnectionInfo {
            db: config.redis_db,
            password: config.redis_password().map(str::to_string),
            ..Default::default()
        },
    };
    let client = redis::Client::open(info).map_err(map_redis_error)?;

    Ok(Connector {
        client,
        connect_timeout: config.connect_timeout(),
        response_timeout: config.response_timeout(),
        ready_check: config.ready_check,
    })
}

#[async_trait]
impl KeyValueStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let (mut conn, generation) = self.connection()?;
        conn.get(key).await.map_err(self.report(generation))
    }

    async fn exists(&self, key: &str) -> Result<u64> {
        let (mut conn, generation) = self.connection()?;
        conn.exists(key).await.map_err(self.report(generation))
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let (mut conn, generation) = self.connection()?;
        conn.set(key, value).await.map_err(self.report(generation))
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool> {
        let (mut conn, generation) = self.connection()?;
        redis::cmd("EXPIRE")
            .arg(key)
            .arg(ttl.as_secs().max(1))
            .query_async(&mut conn)
            .await
            .map_err(self.report(generation))
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let (mut conn, generation) = self.connection()?;
        let removed: u64 = conn.del(key).await.map_err(self.report(generation))?;
        Ok(removed > 0)
    }

    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        let (mut conn, generation) = self.connection()?;
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("EX")
            .arg(ttl.as_secs().max(1))
            .query_async(&mut conn)
            .await
            .map_err(self.report(generation))?;
        Ok(reply.is_some())
    }

    async fn delete_if_equals(&self, key: &str, expected: &str) -> Result<bool> {
        let (mut conn, generation) = self.connection()?;
        let removed: u64 = self
            .release_script
            .key(key)
            .arg(expected)
            .invoke_async(&mut conn)
            .await
            .map_err(self.report(generation))?;
        Ok(removed > 0)
    }
}

#[async_trait]
impl HashStore for RedisStore {
    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>> {
        let (mut conn, generation) = self.connection()?;
        conn.hget(key, field).await.map_err(self.report(generation))
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<bool> {
        let (mut conn, generation) = self.connection()?;
        let created: u64 = conn
            .hset(key, field, value)
            .await
            .map_err(self.report(generation))?;
        Ok(created > 0)
    }

    async fn hdel(&self, key: &str, field: &str) -> Result<bool> {
        let (mut conn, generation) = self.connection()?;
        let removed: u64 = conn
            .hdel(key, field)
            .await
            .map_err(self.report(generation))?;
        Ok(removed > 0)
    }
}

#[async_trait]
impl ListStore for RedisStore {
    async fn lpush(&self, key: &str, value: &str) -> Result<u64> {
        let (mut conn, generation) = self.connection()?;
        conn.lpush(key, value).await.map_err(self.report(generation))
    }

    async fn rpush(&self, key: &str, value: &str) -> Result<u64> {
        let (mut conn, generation) = self.connection()?;
        conn.rpush(key, value).await.map_err(self.report(generation))
    }

    async fn lpop(&self, key: &str) -> Result<Option<String>> {
        let (mut conn, generation) = self.connection()?;
        conn.lpop(key, None).await.map_err(self.report(generation))
    }

    async fn rpop(&self, key: &str) -> Result<Option<String>> {
        let (mut conn, generation) = self.connection()?;
        conn.rpop(key, None).await.map_err(self.report(generation))
    }
}

#[async_trait]
impl StoreLifecycle for RedisStore {
    fn connection_state(&self) -> ConnectionState {
        self.state()
    }

    async fn close(&self) {
        // No receiver left means the supervisor already stopped.
        let _ = self.shutdown_tx.send(());

        let handle = self.supervisor.lock().ok().and_then(|mut guard| guard.take());
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Cache connection supervisor panicked");
            }
        }
    }
}
