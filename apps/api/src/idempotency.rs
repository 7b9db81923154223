//! Per-(user, idempotency key) run locks, so a retried request cannot start a
//! second pipeline while the first is still running.
//!
//! Each holder stores its own token as the lock value and only deletes the
//! key while it still carries that token, so a run that outlived its TTL
//! cannot free a lock another run has since taken.

use async_trait::async_trait;
use redis::{Client as RedisClient, RedisResult, Script};
use uuid::Uuid;

/// Header a client may send to scope the lock to one logical request.
pub const IDEMPOTENCY_HEADER: &str = "idempotency-key";

pub fn lock_key(user_id: Uuid, idempotency_key: Option<&str>) -> String {
    format!(
        "skillpath:assessment-lock:{user_id}:{}",
        idempotency_key.unwrap_or("_")
    )
}

/// Deletes KEYS[1] only if its value is ARGV[1].
const RELEASE_IF_OWNER: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
end
return 0
"#;

#[async_trait]
pub trait RunLocks: Send + Sync {
    /// `true` if the lock was free and is now held under `token` for at most
    /// `ttl_secs`.
    async fn try_acquire(&self, key: &str, token: &str, ttl_secs: u64) -> RedisResult<bool>;

    /// `false` if the key expired or now belongs to another token.
    async fn release(&self, key: &str, token: &str) -> RedisResult<bool>;
}

pub struct RedisRunLocks {
    client: RedisClient,
}

impl RedisRunLocks {
    pub fn new(client: RedisClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl RunLocks for RedisRunLocks {
    async fn try_acquire(&self, key: &str, token: &str, ttl_secs: u64) -> RedisResult<bool> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        // SET NX replies nil when the key already exists.
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(token)
            .arg("NX")
            .arg("EX")
            .arg(ttl_secs)
            .query_async(&mut conn)
            .await?;
        Ok(reply.is_some())
    }

    async fn release(&self, key: &str, token: &str) -> RedisResult<bool> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let script = Script::new(RELEASE_IF_OWNER);
        let deleted: i64 = script.key(key).arg(token).invoke_async(&mut conn).await?;
        Ok(deleted == 1)
    }
}


#[cfg(test)]
mod tests {
    use super::memory::MemoryRunLocks;
    use super::*;

    #[test]
    fn test_lock_key_defaults_to_user_scope() {
        let user = Uuid::nil();
        assert_eq!(
            lock_key(user, None),
            format!("skillpath:assessment-lock:{user}:_")
        );
        assert_eq!(
            lock_key(user, Some("retry-7")),
            format!("skillpath:assessment-lock:{user}:retry-7")
        );
    }

    #[tokio::test]
    async fn test_second_acquire_blocked_until_release() {
        let locks = MemoryRunLocks::default();
        assert!(locks.try_acquire("k", "run-1", 60).await.unwrap());
        assert!(!locks.try_acquire("k", "run-2", 60).await.unwrap());
        assert!(locks.release("k", "run-1").await.unwrap());
        assert!(locks.try_acquire("k", "run-2", 60).await.unwrap());
    }

    #[tokio::test]
    async fn test_expired_holder_cannot_release_successor() {
        let locks = MemoryRunLocks::default();
        assert!(locks.try_acquire("k", "slow-run", 60).await.unwrap());
        locks.expire("k").await;
        assert!(locks.try_acquire("k", "next-run", 60).await.unwrap());

        assert!(!locks.release("k", "slow-run").await.unwrap());
        assert!(!locks.try_acquire("k", "third-run", 60).await.unwrap());
        assert_eq!(
            locks.held.lock().await.get("k").map(String::as_str),
            Some("next-run")
        );
    }
}
