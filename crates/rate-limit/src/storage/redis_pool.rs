//! Redis connection pool on top of deadpool.

use std::sync::atomic::{AtomicUsize, Ordering};

use config::{RedisConfig, RedisTlsConfig};
use deadpool::managed::{self, Metrics};
use redis::{Client, RedisError, RedisResult, aio::MultiplexedConnection};

pub(crate) type Pool = managed::Pool<RedisManager>;
pub(crate) type Connection = managed::Object<RedisManager>;

/// Opens multiplexed connections and checks them with an echoing `PING` before reuse.
#[derive(Debug)]
pub(crate) struct RedisManager {
    client: Client,
    probes: AtomicUsize,
}

impl RedisManager {
    fn new(config: &RedisConfig) -> RedisResult<Self> {
        let client = match &config.tls {
            Some(tls_config) => Client::build_with_tls(config.url.as_str(), build_tls_certificates(tls_config)?)?,
            None => Client::open(config.url.as_str())?,
        };

        Ok(Self {
            client,
            probes: AtomicUsize::new(0),
        })
    }
}

impl managed::Manager for RedisManager {
    type Type = MultiplexedConnection;
    type Error = RedisError;

    async fn create(&self) -> Result<MultiplexedConnection, Self::Error> {
        self.client.get_multiplexed_async_connection().await
    }

    async fn recycle(&self, conn: &mut MultiplexedConnection, _: &Metrics) -> managed::RecycleResult<Self::Error> {
        let probe = self.probes.fetch_add(1, Ordering::Relaxed).to_string();
        let echoed: String = redis::cmd("PING").arg(&probe).query_async(conn).await?;

        if echoed != probe {
            return Err(managed::RecycleError::message("Connection answered PING out of order"));
        }

        Ok(())
    }
}

fn build_tls_certificates(config: &RedisTlsConfig) -> RedisResult<redis::TlsCertificates> {
    let read = |path: &str, what: &'static str| {
        std::fs::read(path).map_err(|e| RedisError::from((redis::ErrorKind::IoError, what, e.to_string())))
    };

    let client_tls = match (&config.client_cert_path, &config.client_key_path) {
        (Some(cert_path), Some(key_path)) => Some(redis::ClientTlsConfig {
            client_cert: read(cert_path, "Failed to read client certificate")?,
            client_key: read(key_path, "Failed to read client key")?,
        }),
        _ => None,
    };

    let root_cert = config
        .ca_cert_path
        .as_deref()
        .map(|path| read(path, "Failed to read CA certificate"))
        .transpose()?;

    Ok(redis::TlsCertificates { client_tls, root_cert })
}

/// Builds the pool. No connection is opened until the first checkout.
pub(crate) fn create_pool(config: &RedisConfig) -> RedisResult<Pool> {
    let manager = RedisManager::new(config)?;

    let mut pool_config = managed::PoolConfig::default();

    if let Some(max_size) = config.pool.max_size {
        pool_config.max_size = max_size;
    }

    pool_config.timeouts.create = config.pool.timeout_create;
    pool_config.timeouts.wait = config.pool.timeout_wait;
    pool_config.timeouts.recycle = config.pool.timeout_recycle;

    Pool::builder(manager)
        .config(pool_config)
        .runtime(deadpool::Runtime::Tokio1)
        .build()
        .map_err(|e| RedisError::from((redis::ErrorKind::IoError, "Failed to create pool", e.to_string())))
}
