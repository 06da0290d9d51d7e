use anyhow::{Context, Result};
use serde_json::{Map, Value};
use sqlx::{Column, Row, SqlitePool, TypeInfo, ValueRef};

use super::models::{Actor, Comment, Post, StoreCounts};

// ========== Batch writes ==========
//
// Each batch commits as one transaction. Rows whose key already exists are
// ignored, never overwritten. The return value is the number of rows that
// were actually inserted.

/// Insert actors, keeping the first observation of each id.
pub async fn put_actors(pool: &SqlitePool, actors: &[Actor]) -> Result<u64> {
    let mut tx = pool.begin().await.context("Failed to begin actor batch")?;
    let mut inserted = 0;

    for actor in actors {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO actors (id, display_name, avatar_url) VALUES (?, ?, ?)",
        )
        .bind(&actor.id)
        .bind(&actor.display_name)
        .bind(&actor.avatar_url)
        .execute(&mut *tx)
        .await
        .with_context(|| format!("Failed to insert actor {}", actor.id))?;
        inserted += result.rows_affected();
    }

    tx.commit().await.context("Failed to commit actor batch")?;
    Ok(inserted)
}

/// Insert posts, keeping the first observation of each id.
pub async fn put_posts(pool: &SqlitePool, posts: &[Post]) -> Result<u64> {
    let mut tx = pool.begin().await.context("Failed to begin post batch")?;
    let mut inserted = 0;

    for post in posts {
        let result = sqlx::query(
            r"
            INSERT OR IGNORE INTO posts
                (id, author_id, top_label, source_client, timestamp, content)
            VALUES (?, ?, ?, ?, ?, ?)
            ",
        )
        .bind(&post.id)
        .bind(&post.author_id)
        .bind(&post.top_label)
        .bind(&post.source_client)
        .bind(&post.timestamp)
        .bind(&post.content)
        .execute(&mut *tx)
        .await
        .with_context(|| format!("Failed to insert post {}", post.id))?;
        inserted += result.rows_affected();
    }

    tx.commit().await.context("Failed to commit post batch")?;
    Ok(inserted)
}

/// Insert comments, dropping rows identical to one already stored.
pub async fn put_comments(pool: &SqlitePool, comments: &[Comment]) -> Result<u64> {
    let mut tx = pool.begin().await.context("Failed to begin comment batch")?;
    let mut inserted = 0;

    for comment in comments {
        let result = sqlx::query(
            r"
            INSERT OR IGNORE INTO comments (post_id, author_id, timestamp, content)
            VALUES (?, ?, ?, ?)
            ",
        )
        .bind(&comment.post_id)
        .bind(&comment.author_id)
        .bind(&comment.timestamp)
        .bind(&comment.content)
        .execute(&mut *tx)
        .await
        .with_context(|| format!("Failed to insert comment on post {}", comment.post_id))?;
        inserted += result.rows_affected();
    }

    tx.commit().await.context("Failed to commit comment batch")?;
    Ok(inserted)
}

// ========== Reads ==========

/// Get an actor by id.
pub async fn get_actor(pool: &SqlitePool, id: &str) -> Result<Option<Actor>> {
    sqlx::query_as("SELECT id, display_name, avatar_url FROM actors WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to fetch actor")
}

/// Get a post by id.
pub async fn get_post(pool: &SqlitePool, id: &str) -> Result<Option<Post>> {
    sqlx::query_as(
        "SELECT id, author_id, top_label, source_client, timestamp, content FROM posts WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await
    .context("Failed to fetch post")
}

/// Get all comments on a post in insertion order.
pub async fn get_comments_for_post(pool: &SqlitePool, post_id: &str) -> Result<Vec<Comment>> {
    sqlx::query_as(
        r"
        SELECT post_id, author_id, timestamp, content
        FROM comments
        WHERE post_id = ?
        ORDER BY rowid
        ",
    )
    .bind(post_id)
    .fetch_all(pool)
    .await
    .context("Failed to fetch comments for post")
}

/// Every post body followed by every comment body.
pub async fn select_contents(pool: &SqlitePool) -> Result<Vec<String>> {
    let mut contents: Vec<String> = sqlx::query_scalar("SELECT content FROM posts ORDER BY rowid")
        .fetch_all(pool)
        .await
        .context("Failed to fetch post contents")?;

    let comments: Vec<String> = sqlx::query_scalar("SELECT content FROM comments ORDER BY rowid")
        .fetch_all(pool)
        .await
        .context("Failed to fetch comment contents")?;

    contents.extend(comments);
    Ok(contents)
}

/// Row counts per table.
pub async fn store_counts(pool: &SqlitePool) -> Result<StoreCounts> {
    let (actors, posts, comments): (i64, i64, i64) = sqlx::query_as(
        r"
        SELECT
            (SELECT COUNT(*) FROM actors),
            (SELECT COUNT(*) FROM posts),
            (SELECT COUNT(*) FROM comments)
        ",
    )
    .fetch_one(pool)
    .await
    .context("Failed to count stored rows")?;

    Ok(StoreCounts {
        actors,
        posts,
        comments,
    })
}

/// Run an arbitrary read statement and return each row as a JSON object
/// keyed by column name. Blobs are hex encoded.
pub async fn query(pool: &SqlitePool, sql: &str) -> Result<Vec<Map<String, Value>>> {
    let rows = sqlx::query(sql)
        .fetch_all(pool)
        .await
        .with_context(|| format!("Failed to run query: {sql}"))?;

    rows.iter()
        .map(|row| -> Result<Map<String, Value>> {
            row.columns()
                .iter()
                .map(|column| -> Result<(String, Value)> {
                    let value = column_value(row, column.ordinal())
                        .with_context(|| format!("Failed to decode column {}", column.name()))?;
                    Ok((column.name().to_string(), value))
                })
                .collect()
        })
        .collect()
}

fn column_value(row: &sqlx::sqlite::SqliteRow, index: usize) -> Result<Value> {
    let raw = row.try_get_raw(index)?;
    if raw.is_null() {
        return Ok(Value::Null);
    }

    let value = match raw.type_info().name() {
        "INTEGER" | "BOOLEAN" => Value::from(row.try_get::<i64, _>(index)?),
        "REAL" => Value::from(row.try_get::<f64, _>(index)?),
        "BLOB" => Value::from(hex::encode(row.try_get::<Vec<u8>, _>(index)?)),
        _ => Value::from(row.try_get_unchecked::<String, _>(index)?),
    };
    Ok(value)
}
