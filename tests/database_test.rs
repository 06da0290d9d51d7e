//! Integration tests for the results store.

use feed_harvester::db::{
    get_actor, get_comments_for_post, get_post, put_actors, put_comments, put_posts, query,
    select_contents, store_counts, Actor, Comment, Database, Post, StoreCounts,
};
use serde_json::json;
use tempfile::TempDir;

async fn setup_db() -> (Database, TempDir) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let db_path = temp_dir.path().join("test.sqlite");
    let db = Database::open(&db_path)
        .await
        .expect("Failed to create database");
    (db, temp_dir)
}

fn actor(id: &str, name: &str) -> Actor {
    Actor {
        id: id.to_string(),
        display_name: name.to_string(),
        avatar_url: format!("https://tvax1.sinaimg.cn/{id}.jpg"),
    }
}

fn post(id: &str, content: &str) -> Post {
    Post {
        id: id.to_string(),
        author_id: "1001".to_string(),
        top_label: String::new(),
        source_client: "微博网页版".to_string(),
        timestamp: "2023-11-05 14:07".to_string(),
        content: content.to_string(),
    }
}

fn comment(post_id: &str, author_id: &str, content: &str) -> Comment {
    Comment {
        post_id: post_id.to_string(),
        author_id: author_id.to_string(),
        timestamp: "2023-11-05 15:00".to_string(),
        content: content.to_string(),
    }
}

#[tokio::test]
async fn test_put_actors_twice_is_one_call() {
    let (db, _temp_dir) = setup_db().await;
    let batch = vec![actor("1001", "poster"), actor("2002", "alice")];

    let first = put_actors(db.pool(), &batch)
        .await
        .expect("Failed to insert actors");
    let second = put_actors(db.pool(), &batch)
        .await
        .expect("Replaying actors should not fail");

    assert_eq!(first, 2);
    assert_eq!(second, 0);
    assert_eq!(store_counts(db.pool()).await.unwrap().actors, 2);
}

#[tokio::test]
async fn test_first_write_wins() {
    let (db, _temp_dir) = setup_db().await;

    put_actors(db.pool(), &[actor("1001", "original name")])
        .await
        .expect("Failed to insert actor");
    put_actors(db.pool(), &[actor("1001", "renamed")])
        .await
        .expect("Failed to replay actor");

    let stored = get_actor(db.pool(), "1001")
        .await
        .expect("Failed to get actor")
        .expect("Actor not found");
    assert_eq!(stored.display_name, "original name");

    put_posts(db.pool(), &[post("5001", "first body")])
        .await
        .expect("Failed to insert post");
    put_posts(db.pool(), &[post("5001", "edited body")])
        .await
        .expect("Failed to replay post");

    let stored = get_post(db.pool(), "5001")
        .await
        .expect("Failed to get post")
        .expect("Post not found");
    assert_eq!(stored.content, "first body");
}

#[tokio::test]
async fn test_duplicate_comment_rows_are_ignored() {
    let (db, _temp_dir) = setup_db().await;
    put_posts(db.pool(), &[post("5001", "body")])
        .await
        .expect("Failed to insert post");

    let batch = vec![
        comment("5001", "2002", "same words"),
        comment("5001", "2002", "same words"),
        comment("5001", "3003", "same words"),
        comment("5001", "", "anonymous"),
    ];
    let inserted = put_comments(db.pool(), &batch)
        .await
        .expect("Failed to insert comments");
    assert_eq!(inserted, 3);

    let replayed = put_comments(db.pool(), &batch)
        .await
        .expect("Replaying comments should not fail");
    assert_eq!(replayed, 0);

    let stored = get_comments_for_post(db.pool(), "5001")
        .await
        .expect("Failed to get comments");
    let authors: Vec<&str> = stored.iter().map(|c| c.author_id.as_str()).collect();
    assert_eq!(authors, vec!["2002", "3003", ""]);
}

#[tokio::test]
async fn test_reopen_keeps_rows_and_schema() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let db_path = temp_dir.path().join("test.sqlite");

    {
        let db = Database::open(&db_path)
            .await
            .expect("Failed to create database");
        put_posts(db.pool(), &[post("5001", "body")])
            .await
            .expect("Failed to insert post");
        let totals = db.close().await.expect("Failed to close database");
        assert_eq!(totals.posts, 1);
    }

    let db = Database::open(&db_path)
        .await
        .expect("Failed to reopen database");
    assert_eq!(
        store_counts(db.pool()).await.unwrap(),
        StoreCounts {
            actors: 0,
            posts: 1,
            comments: 0,
        }
    );
}

#[tokio::test]
async fn test_select_contents_and_query() {
    let (db, _temp_dir) = setup_db().await;
    put_posts(db.pool(), &[post("5001", "post one"), post("5002", "post two")])
        .await
        .expect("Failed to insert posts");
    put_comments(db.pool(), &[comment("5001", "2002", "a reply")])
        .await
        .expect("Failed to insert comments");

    let contents = select_contents(db.pool())
        .await
        .expect("Failed to select contents");
    assert_eq!(contents, vec!["post one", "post two", "a reply"]);

    let rows = query(
        db.pool(),
        "SELECT id, length(content) AS len, NULL AS nothing FROM posts ORDER BY id",
    )
    .await
    .expect("Failed to run query");
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["id"], json!("5001"));
    assert_eq!(rows[0]["len"], json!(8));
    assert_eq!(rows[0]["nothing"], json!(null));

    assert!(query(db.pool(), "SELECT * FROM missing_table").await.is_err());
}

#[tokio::test]
async fn test_open_creates_missing_directories() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let db_path = temp_dir.path().join("runs").join("rust").join("rust.db");

    let db = Database::open(&db_path)
        .await
        .expect("Failed to create database");
    assert_eq!(db.path(), db_path.as_path());
    assert!(db_path.exists());
    assert_eq!(db.counts().await.unwrap(), StoreCounts::default());
}

#[tokio::test]
async fn test_comment_without_post_is_rejected() {
    let (db, _temp_dir) = setup_db().await;

    let result = put_comments(db.pool(), &[comment("9999", "2002", "orphan")]).await;
    assert!(result.is_err());
    assert_eq!(store_counts(db.pool()).await.unwrap().comments, 0);
}

#[tokio::test]
async fn test_closed_store_refuses_writes() {
    let (db, _temp_dir) = setup_db().await;
    let handle = db.clone();

    db.close().await.expect("Failed to close database");
    assert!(put_posts(handle.pool(), &[post("5001", "late")]).await.is_err());
}
