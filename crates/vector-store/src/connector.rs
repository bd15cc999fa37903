use crate::backend::{Endpoint, StoreBackend, StoreSession};
use crate::error::ConnectionError;
use std::future::Future;
use std::ops::Deref;
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 19530;
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    pub host: String,
    pub port: u16,
    /// Total number of connect attempts; at least one is always made.
    pub max_retries: u32,
    pub retry_delay: Duration,
    /// Per-request timeout handed to the backend.
    pub timeout: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: DEFAULT_RETRY_DELAY,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl ConnectionConfig {
    pub fn endpoint(&self) -> Endpoint {
        Endpoint {
            host: self.host.clone(),
            port: self.port,
            timeout: self.timeout,
        }
    }
}

/// Opens named connections with bounded retry.
///
/// Every successful [`Connector::open`] yields a [`Connection`] guard that
/// disconnects when dropped, so a session never outlives its scope. There is no
/// pooling: each call opens a fresh session.
#[derive(Clone)]
pub struct Connector {
    backend: Arc<dyn StoreBackend>,
    config: ConnectionConfig,
}

impl Connector {
    pub fn new(backend: Arc<dyn StoreBackend>, config: ConnectionConfig) -> Self {
        Self { backend, config }
    }

    pub const fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Connect under `alias`, retrying up to `max_retries` attempts in total.
    pub async fn open(&self, alias: &str) -> Result<Connection, ConnectionError> {
        let attempts = self.config.max_retries.max(1);
        let endpoint = self.config.endpoint();
        let mut attempt = 0;

        loop {
            attempt += 1;
            match self.backend.connect(alias, &endpoint).await {
                Ok(session) => {
                    log::debug!("Connected to {endpoint} as {alias} (attempt {attempt})");
                    return Ok(Connection {
                        session,
                        alias: alias.to_string(),
                    });
                }
                Err(err) if attempt < attempts => {
                    log::warn!(
                        "Connection attempt {attempt}/{attempts} for {alias} failed: {err}; retrying in {:?}",
                        self.config.retry_delay
                    );
                    tokio::time::sleep(self.config.retry_delay).await;
                }
                Err(err) => {
                    log::error!("Giving up on {endpoint} as {alias} after {attempt} attempts");
                    return Err(ConnectionError {
                        alias: alias.to_string(),
                        attempts: attempt,
                        source: err,
                    });
                }
            }
        }
    }

    /// Run `body` exactly once with a live connection.
    ///
    /// The connection is moved into the body's future and released when that
    /// future completes, fails, panics or is dropped. Errors returned by the
    /// body are passed through untouched.
    pub async fn with_connection<F, Fut, T, E>(&self, alias: &str, body: F) -> Result<T, E>
    where
        F: FnOnce(Connection) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<ConnectionError>,
    {
        let connection = self.open(alias).await?;
        body(connection).await
    }
}

/// Live session guard. Dereferences to the store RPC surface.
pub struct Connection {
    session: Box<dyn StoreSession>,
    alias: String,
}

impl Connection {
    pub fn alias(&self) -> &str {
        &self.alias
    }
}

impl Deref for Connection {
    type Target = dyn StoreSession;

    fn deref(&self) -> &Self::Target {
        self.session.as_ref()
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        match self.session.disconnect() {
            Ok(()) => log::debug!("Disconnected {}", self.alias),
            Err(err) => log::warn!("Failed to disconnect {}: {err}", self.alias),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::memory::{MemoryStore, StoreOp};
    use pretty_assertions::assert_eq;

    fn connector(store: &MemoryStore, max_retries: u32) -> Connector {
        let config = ConnectionConfig {
            max_retries,
            retry_delay: Duration::from_millis(250),
            ..ConnectionConfig::default()
        };
        Connector::new(Arc::new(store.clone()), config)
    }

    #[tokio::test(start_paused = true)]
    async fn retries_exactly_max_retries_times_then_fails() {
        let store = MemoryStore::new();
        store.fail_next_connects(10);
        let connector = connector(&store, 3);

        let err = match connector.open("default").await {
            Ok(_) => panic!("connect should fail"),
            Err(err) => err,
        };
        assert_eq!(err.attempts, 3);
        assert_eq!(err.alias, "default");
        assert!(matches!(err.source, StoreError::Unavailable(_)));
        assert_eq!(store.connect_attempts(), 3);
        assert_eq!(store.open_connections(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn recovers_after_transient_failures() {
        let store = MemoryStore::new();
        store.fail_next_connects(2);
        let connector = connector(&store, 3);

        let started = tokio::time::Instant::now();
        let conn = connector.open("default").await.expect("third attempt succeeds");
        assert_eq!(conn.alias(), "default");
        assert_eq!(store.connect_attempts(), 3);
        assert_eq!(store.open_connections(), 1);
        assert!(started.elapsed() >= Duration::from_millis(500));

        drop(conn);
        assert_eq!(store.open_connections(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_retries_still_makes_one_attempt() {
        let store = MemoryStore::new();
        let connector = connector(&store, 0);
        let conn = connector.open("solo").await.expect("connect");
        drop(conn);
        assert_eq!(store.connect_attempts(), 1);
    }

    #[tokio::test]
    async fn body_runs_once_and_connection_is_released() {
        let store = MemoryStore::new();
        let connector = connector(&store, 3);
        let mut runs = 0;

        let value: Result<u32, ConnectionError> = connector
            .with_connection("scoped", |conn| {
                runs += 1;
                let open = store.open_connections();
                async move {
                    assert_eq!(conn.alias(), "scoped");
                    assert_eq!(open, 1);
                    Ok(7)
                }
            })
            .await;

        assert_eq!(value.unwrap(), 7);
        assert_eq!(runs, 1);
        assert_eq!(store.open_connections(), 0);
        assert_eq!(store.disconnects(), 1);
    }

    #[derive(Debug)]
    enum BodyError {
        Connect,
        Work(&'static str),
    }

    impl From<ConnectionError> for BodyError {
        fn from(_: ConnectionError) -> Self {
            Self::Connect
        }
    }

    #[tokio::test]
    async fn body_error_is_returned_unchanged_and_connection_released() {
        let store = MemoryStore::new();
        let connector = connector(&store, 3);

        let result: Result<(), BodyError> = connector
            .with_connection("failing", |_conn| async move { Err(BodyError::Work("boom")) })
            .await;

        assert!(matches!(result, Err(BodyError::Work("boom"))));
        assert_eq!(store.open_connections(), 0);
    }

    #[tokio::test]
    async fn connection_error_converts_into_body_error() {
        let store = MemoryStore::new();
        store.fail_next_connects(1);
        let connector = connector(&store, 1);

        let result: Result<(), BodyError> = connector
            .with_connection("never", |_conn| async move { Ok(()) })
            .await;
        assert!(matches!(result, Err(BodyError::Connect)));
    }

    #[tokio::test]
    async fn panicking_body_still_releases_connection() {
        let store = MemoryStore::new();
        let connector = connector(&store, 3);

        let task = tokio::spawn(async move {
            let _: Result<(), ConnectionError> = connector
                .with_connection("panics", |_conn| async move { panic!("worker crashed") })
                .await;
        });

        assert!(task.await.is_err());
        assert_eq!(store.open_connections(), 0);
    }

    #[tokio::test]
    async fn disconnect_failure_is_swallowed() {
        let store = MemoryStore::new();
        store.fail_next(StoreOp::Disconnect);
        let connector = connector(&store, 1);

        let result: Result<bool, ConnectionError> = connector
            .with_connection("teardown", |conn| async move {
                Ok(conn.has_collection("missing").await.unwrap_or(true))
            })
            .await;
        assert_eq!(result.unwrap(), false);
        assert_eq!(store.open_connections(), 0);
        assert_eq!(store.disconnects(), 1);
    }
}
