//! Redis-backed queue client.
//!
//! Items are pushed with `LPUSH` and taken with `BRPOP`, so each Redis list
//! behaves as a FIFO queue. A `BRPOP` occupies the connection it runs on until
//! it returns, so every consumer should hold its own [`RedisQueue`] (see
//! [`QueueClient::detach`]).

use crate::config::BrokerConfig;
use crate::queue::QueueClient;
use ::redis::aio::MultiplexedConnection;
use ::redis::{RedisError, RedisResult};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};
use task_queue_core::{Result, TaskError};
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Longest single BRPOP issued by [`RedisQueue::blocking_pop`].
const MAX_BLOCK: Duration = Duration::from_millis(250);

pub struct RedisQueue {
    client: ::redis::Client,
    conn: Mutex<Option<MultiplexedConnection>>,
}

impl RedisQueue {
    /// Create a client for `url` without connecting yet.
    pub fn open(url: &str) -> Result<Self> {
        let client = ::redis::Client::open(url).map_err(|e| {
            TaskError::Connection(format!("failed to create Redis client: {e}"))
        })?;

        Ok(RedisQueue {
            client,
            conn: Mutex::new(None),
        })
    }

    /// Create a client and establish the connection up front.
    pub async fn connect(url: &str) -> Result<Self> {
        let queue = Self::open(url)?;
        queue.connection().await?;
        Ok(queue)
    }

    pub async fn from_config(config: &BrokerConfig) -> Result<Self> {
        Self::connect(&config.url()).await
    }

    async fn connection(&self) -> Result<MultiplexedConnection> {
        let mut guard = self.conn.lock().await;
        if let Some(conn) = guard.as_ref() {
            return Ok(conn.clone());
        }

        let conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(map_redis_error)?;
        debug!("Connected to Redis");
        *guard = Some(conn.clone());
        Ok(conn)
    }

    /// Map the reply; a connection-level failure drops the cached connection
    /// so the next call reconnects.
    async fn check<T>(&self, reply: RedisResult<T>) -> Result<T> {
        match reply {
            Ok(value) => Ok(value),
            Err(e) => {
                let err = map_redis_error(e);
                if err.is_connection() {
                    warn!("Dropping Redis connection: {}", err);
                    *self.conn.lock().await = None;
                }
                Err(err)
            }
        }
    }
}

fn map_redis_error(err: RedisError) -> TaskError {
    if err.is_io_error() || err.is_connection_dropped() {
        TaskError::Connection(err.to_string())
    } else {
        TaskError::Broker(err.to_string())
    }
}

#[async_trait]
impl QueueClient for RedisQueue {
    async fn push(&self, queue: &str, item: Vec<u8>) -> Result<()> {
        let mut conn = self.connection().await?;
        let reply: RedisResult<i64> = ::redis::cmd("LPUSH")
            .arg(queue)
            .arg(item)
            .query_async(&mut conn)
            .await;
        self.check(reply).await?;
        Ok(())
    }

    async fn blocking_pop(&self, queue: &str, timeout: Duration) -> Result<Option<Vec<u8>>> {
        let mut conn = self.connection().await?;

        // BRPOP treats 0 as "wait forever".
        if timeout.is_zero() {
            let reply: RedisResult<Option<Vec<u8>>> = ::redis::cmd("RPOP")
                .arg(queue)
                .query_async(&mut conn)
                .await;
            return self.check(reply).await;
        }

        // Each BRPOP is kept short so its reply lands well inside the client's
        // response timeout; a reply dropped by the client would lose the item.
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            // Sub-millisecond timeouts round to 0, which means forever.
            if remaining < Duration::from_millis(1) {
                return Ok(None);
            }

            let reply: RedisResult<Option<(String, Vec<u8>)>> = ::redis::cmd("BRPOP")
                .arg(queue)
                .arg(remaining.min(MAX_BLOCK).as_secs_f64())
                .query_async(&mut conn)
                .await;
            if let Some((_, item)) = self.check(reply).await? {
                return Ok(Some(item));
            }
        }
    }

    fn detach(&self) -> Arc<dyn QueueClient> {
        Arc::new(RedisQueue {
            client: self.client.clone(),
            conn: Mutex::new(None),
        })
    }
}
