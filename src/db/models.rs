use serde::{Deserialize, Serialize};

/// A user seen as a post or comment author.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Actor {
    pub id: String,
    pub display_name: String,
    pub avatar_url: String,
}

/// A feed post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Post {
    /// The card's `mid`.
    pub id: String,
    /// Empty when the author could not be resolved.
    pub author_id: String,
    /// Pinned/top label, empty if none.
    pub top_label: String,
    pub source_client: String,
    /// `YYYY-MM-DD HH:MM`, or the raw rendered text if it could not be normalized.
    pub timestamp: String,
    pub content: String,
}

/// A comment on a post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Comment {
    pub post_id: String,
    pub author_id: String,
    pub timestamp: String,
    pub content: String,
}

/// Row counts per table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StoreCounts {
    pub actors: i64,
    pub posts: i64,
    pub comments: i64,
}
