use std::future::Future;

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;

use crate::errors::AppError;

/// Result of a cache consultation.
#[derive(Debug, Clone)]
pub struct CacheOutcome {
    pub content: String,
    pub was_hit: bool,
}

/// Content-addressed dedup for expensive generation calls.
///
/// Hit path: one atomic UPDATE increments `hit_count` and stamps
/// `last_hit_at`; `content` is immutable after insert, so the follow-up read
/// cannot observe torn state. Miss path: generate, then insert with
/// first-insert-wins semantics. A caller whose insert loses a concurrent
/// race still returns its own freshly generated content, and only the cache
/// storage is deduplicated. Duplicate concurrent misses cost duplicate
/// generation work but never corrupt the cache.
pub async fn get_or_generate<F, Fut>(
    pool: &SqlitePool,
    key: &str,
    generate: F,
) -> Result<CacheOutcome, AppError>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<String, AppError>>,
{
    let now = Utc::now();
    let updated = sqlx::query(
        "UPDATE prompt_cache SET hit_count = hit_count + 1, last_hit_at = $1 WHERE key = $2",
    )
    .bind(now)
    .bind(key)
    .execute(pool)
    .await?;

    if updated.rows_affected() > 0 {
        let content: String = sqlx::query_scalar("SELECT content FROM prompt_cache WHERE key = $1")
            .bind(key)
            .fetch_one(pool)
            .await?;
        debug!("Prompt cache hit for {key}");
        return Ok(CacheOutcome { content, was_hit: true });
    }

    let content = generate().await?;

    let inserted = sqlx::query(
        r#"
        INSERT INTO prompt_cache (key, content, hit_count, created_at, last_hit_at)
        VALUES ($1, $2, 0, $3, $3)
        ON CONFLICT(key) DO NOTHING
        "#,
    )
    .bind(key)
    .bind(&content)
    .bind(now)
    .execute(pool)
    .await?;

    if inserted.rows_affected() == 0 {
        // Lost a concurrent first-insert race; the existing row wins but the
        // caller keeps what it generated.
        debug!("Prompt cache insert lost the race for {key}");
    } else {
        debug!("Prompt cache miss stored for {key}");
    }

    Ok(CacheOutcome { content, was_hit: false })
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use super::*;
    use crate::db::test_pool;

    async fn hit_count(pool: &SqlitePool, key: &str) -> i64 {
        sqlx::query_scalar("SELECT hit_count FROM prompt_cache WHERE key = $1")
            .bind(key)
            .fetch_one(pool)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_miss_then_hit_is_deterministic() {
        let pool = test_pool().await;
        let calls = Arc::new(AtomicU32::new(0));

        let c = calls.clone();
        let first = get_or_generate(&pool, "k1", || async move {
            c.fetch_add(1, Ordering::SeqCst);
            Ok("generated once".to_string())
        })
        .await
        .unwrap();
        assert!(!first.was_hit);
        assert_eq!(first.content, "generated once");
        assert_eq!(hit_count(&pool, "k1").await, 0);

        // The second call must not generate, and must return byte-identical
        // content with the hit counter advanced by exactly one.
        let c = calls.clone();
        let second = get_or_generate(&pool, "k1", || async move {
            c.fetch_add(1, Ordering::SeqCst);
            Ok("generated twice".to_string())
        })
        .await
        .unwrap();
        assert!(second.was_hit);
        assert_eq!(second.content, first.content);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(hit_count(&pool, "k1").await, 1);
    }

    #[tokio::test]
    async fn test_lost_insert_race_keeps_caller_content() {
        let pool = test_pool().await;

        // The generate closure itself lands a competing row for the same key,
        // simulating another worker winning the first-insert race mid-miss.
        let race_pool = pool.clone();
        let outcome = get_or_generate(&pool, "k1", || async move {
            sqlx::query(
                "INSERT INTO prompt_cache (key, content, hit_count, created_at, last_hit_at)
                 VALUES ($1, $2, 0, $3, $3)",
            )
            .bind("k1")
            .bind("winner content")
            .bind(Utc::now())
            .execute(&race_pool)
            .await
            .unwrap();
            Ok("loser content".to_string())
        })
        .await
        .unwrap();

        // The losing caller still gets what it generated.
        assert!(!outcome.was_hit);
        assert_eq!(outcome.content, "loser content");

        // But the cache kept the winner's row.
        let stored: String = sqlx::query_scalar("SELECT content FROM prompt_cache WHERE key = $1")
            .bind("k1")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(stored, "winner content");

        let next = get_or_generate(&pool, "k1", || async { Ok("unused".to_string()) })
            .await
            .unwrap();
        assert!(next.was_hit);
        assert_eq!(next.content, "winner content");
    }

    #[tokio::test]
    async fn test_distinct_keys_are_independent() {
        let pool = test_pool().await;
        let a = get_or_generate(&pool, "ka", || async { Ok("content a".to_string()) })
            .await
            .unwrap();
        let b = get_or_generate(&pool, "kb", || async { Ok("content b".to_string()) })
            .await
            .unwrap();
        assert!(!a.was_hit);
        assert!(!b.was_hit);
        assert_ne!(a.content, b.content);
    }

    #[tokio::test]
    async fn test_generation_failure_caches_nothing() {
        let pool = test_pool().await;
        let err = get_or_generate(&pool, "k1", || async {
            Err(AppError::Llm("model unavailable".to_string()))
        })
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::Llm(_)));

        let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM prompt_cache")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(rows, 0);
    }
}
