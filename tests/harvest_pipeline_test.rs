//! End-to-end tests: search, results page, detail sessions and the store,
//! driven through the scripted renderer.

use std::time::Duration;

use feed_harvester::browser::scripted::{
    EnterAction, Frame, ScriptContext, ScriptNode, ScriptedRenderer,
};
use feed_harvester::constants::Selectors;
use feed_harvester::db::{
    get_actor, get_comments_for_post, get_post, store_counts, Database, StoreCounts,
};
use feed_harvester::error::HarvestError;
use feed_harvester::harvest::{CrawlSummary, HarvestConfig, Harvester};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

const SEARCH_URL: &str = "https://s.weibo.com/weibo?q=";
const KEYWORD: &str = "rust";

async fn setup_db() -> (Database, TempDir) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let db_path = temp_dir.path().join("test.sqlite");
    let db = Database::open(&db_path)
        .await
        .expect("Failed to create database");
    (db, temp_dir)
}

fn fast_config() -> HarvestConfig {
    HarvestConfig {
        poll_interval: Duration::from_millis(10),
        retry_delay: Duration::from_millis(10),
        refresh_cooldown: Duration::from_millis(10),
        context_settle: Duration::from_millis(10),
        detail_timeout: Duration::from_secs(2),
        search_timeout: Duration::from_secs(2),
        page_timeout: Duration::from_millis(200),
        ..HarvestConfig::default()
    }
}

fn comment_row(s: &Selectors, slot: u32, uid: &str, text: &str) -> ScriptNode {
    ScriptNode::new()
        .text(text)
        .child(
            &s.scroller_item,
            ScriptNode::new()
                .attr(&s.slot_index_attr, &slot.to_string())
                .child(
                    &s.link,
                    ScriptNode::new().attr("href", &format!("https://weibo.com/u/{uid}")),
                ),
        )
        .child(
            &s.comment_avatar,
            ScriptNode::new().attr("src", &format!("https://tvax1.sinaimg.cn/{uid}.jpg")),
        )
}

fn detail_header(s: &Selectors, post_link: &str, body: &str) -> Frame {
    Frame::new()
        .with(
            &s.detail_time,
            ScriptNode::new()
                .attr("href", post_link)
                .text("23-11-05 14:07"),
        )
        .with(&s.detail_text, ScriptNode::new().text(body))
}

/// Card A: two comments over two polls, the first re-rendered, then the end marker.
fn detail_a(s: &Selectors) -> ScriptContext {
    let link = "https://weibo.com/1001/PostA";
    ScriptContext::new(vec![
        detail_header(s, link, "post A body").with(
            &s.list_item,
            comment_row(s, 0, "2002", "alice: first! 23-11-05 15:00"),
        ),
        detail_header(s, link, "post A body")
            .with(
                &s.list_item,
                comment_row(s, 0, "2002", "alice: first! 23-11-05 15:00"),
            )
            .with(
                &s.list_item,
                comment_row(s, 1, "2003", "bob: second 23-11-05 15:01"),
            )
            .with(&s.list_bottom, ScriptNode::new().text("没有更多内容了")),
    ])
}

/// Card B: no comments, only the composer prompt.
fn detail_b(s: &Selectors) -> ScriptContext {
    ScriptContext::new(vec![detail_header(
        s,
        "https://weibo.com/1002/PostB",
        "post B body",
    )
    .with(
        &s.tip_text,
        ScriptNode::new().text("还没有人评论哦~快来发表你的评论或转发吧"),
    )])
}

fn feed_card(s: &Selectors, mid: &str, uid: &str, post_link: &str, detail: ScriptContext) -> ScriptNode {
    let card_feed = ScriptNode::new()
        .child(
            &s.avatar,
            ScriptNode::new()
                .child(
                    &s.link,
                    ScriptNode::new().attr("href", &format!("//weibo.com/{uid}?refer_flag=1001030103_")),
                )
                .child(
                    &s.image,
                    ScriptNode::new().attr("src", &format!("https://tvax1.sinaimg.cn/{uid}.jpg")),
                ),
        )
        .child(
            &s.name,
            ScriptNode::new().attr(&s.nick_name_attr, &format!("user{uid}")),
        )
        .child(
            &s.source,
            ScriptNode::new()
                .child(
                    &s.link,
                    ScriptNode::new()
                        .attr("href", &format!("{post_link}?refer_flag=1001030103_"))
                        .text("11月5日 14:07")
                        .on_enter(EnterAction::OpenContext(detail)),
                )
                .child(&s.link, ScriptNode::new().text("iPhone客户端")),
        )
        .child(
            &s.feed_content,
            ScriptNode::new().text(&format!("learning {KEYWORD} today")),
        );

    ScriptNode::new()
        .attr(&s.post_id_attr, mid)
        .child(&s.card, ScriptNode::new().child(&s.card_feed, card_feed))
}

fn results_renderer(s: &Selectors) -> ScriptedRenderer {
    let page = Frame::new()
        .with(
            &s.feed_item,
            feed_card(s, "A1", "1001", "https://weibo.com/1001/PostA", detail_a(s)),
        )
        .with(
            &s.feed_item,
            feed_card(s, "B1", "1002", "https://weibo.com/1002/PostB", detail_b(s)),
        )
        // An advert slot without a post id
        .with(&s.feed_item, ScriptNode::new().text("推荐"));
    ScriptedRenderer::new(ScriptContext::new(vec![page]))
}

async fn crawl_once(db: &Database) -> (CrawlSummary, ScriptedRenderer) {
    let selectors = Selectors::default();
    let config = fast_config();
    let cancel = CancellationToken::new();
    let renderer = results_renderer(&selectors);
    let harvester = Harvester::new(&renderer, &selectors, &config, &cancel);

    let summary = harvester
        .search_and_crawl(db, SEARCH_URL, KEYWORD)
        .await
        .expect("Crawl should start");
    (summary, renderer)
}

#[tokio::test]
async fn test_end_to_end_two_cards() {
    let (db, _temp_dir) = setup_db().await;

    let (summary, renderer) = crawl_once(&db).await;
    assert_eq!(
        summary,
        CrawlSummary {
            pages: 1,
            cards_seen: 2,
            cards_persisted: 2,
            cards_failed: 0,
            comments_captured: 2,
        }
    );
    assert_eq!(renderer.open_context_count(), 1);
    assert_eq!(renderer.navigations(), vec![format!("{SEARCH_URL}{KEYWORD}")]);

    let post_a = get_post(db.pool(), "A1")
        .await
        .expect("Failed to get post")
        .expect("Post A not stored");
    assert_eq!(post_a.author_id, "1001");
    assert_eq!(post_a.source_client, "iPhone客户端");
    assert_eq!(post_a.timestamp, "2023-11-05 14:07");
    assert_eq!(post_a.content, "post A body");

    let comments_a = get_comments_for_post(db.pool(), "A1")
        .await
        .expect("Failed to get comments");
    let contents: Vec<&str> = comments_a.iter().map(|c| c.content.as_str()).collect();
    assert_eq!(contents, vec!["first!", "second"]);
    assert_eq!(comments_a[1].author_id, "2003");
    assert_eq!(comments_a[1].timestamp, "2023-11-05 15:01");

    let comments_b = get_comments_for_post(db.pool(), "B1")
        .await
        .expect("Failed to get comments");
    assert!(comments_b.is_empty());

    let alice = get_actor(db.pool(), "2002")
        .await
        .expect("Failed to get actor")
        .expect("Comment author not stored");
    assert_eq!(alice.display_name, "alice");
    assert_eq!(alice.avatar_url, "https://tvax1.sinaimg.cn/2002.jpg");

    assert_eq!(
        store_counts(db.pool()).await.unwrap(),
        StoreCounts {
            actors: 4,
            posts: 2,
            comments: 2,
        }
    );
}

#[tokio::test]
async fn test_second_crawl_changes_nothing() {
    let (db, _temp_dir) = setup_db().await;

    crawl_once(&db).await;
    let first = store_counts(db.pool()).await.unwrap();
    crawl_once(&db).await;
    let second = store_counts(db.pool()).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(second.posts, 2);
    assert_eq!(second.comments, 2);
}

#[tokio::test]
async fn test_store_failure_does_not_stop_later_cards() {
    let (db, _temp_dir) = setup_db().await;
    db.close().await.expect("Failed to close database");

    let (summary, renderer) = crawl_once(&db).await;
    assert_eq!(summary.cards_seen, 2);
    assert_eq!(summary.cards_persisted, 0);
    assert_eq!(summary.cards_failed, 2);
    // Both detail sessions still ran and were torn down.
    assert_eq!(summary.comments_captured, 2);
    assert_eq!(renderer.open_context_count(), 1);
}

#[tokio::test]
async fn test_search_without_results_fails() {
    let (db, _temp_dir) = setup_db().await;
    let selectors = Selectors::default();
    let config = fast_config();
    let cancel = CancellationToken::new();
    let renderer = results_renderer(&selectors);
    let harvester = Harvester::new(&renderer, &selectors, &config, &cancel);

    let err = harvester
        .search_and_crawl(&db, SEARCH_URL, "unrelated words")
        .await
        .unwrap_err();
    assert!(matches!(err, HarvestError::Timeout { .. }));
    assert_eq!(store_counts(db.pool()).await.unwrap().posts, 0);
}

#[tokio::test]
async fn test_cancelled_crawl_stops_before_reading() {
    let (db, _temp_dir) = setup_db().await;
    let selectors = Selectors::default();
    let config = fast_config();
    let cancel = CancellationToken::new();
    cancel.cancel();
    let renderer = results_renderer(&selectors);
    let harvester = Harvester::new(&renderer, &selectors, &config, &cancel);

    let summary = harvester.crawl(&db, KEYWORD).await;
    assert_eq!(summary, CrawlSummary::default());
    assert_eq!(store_counts(db.pool()).await.unwrap().posts, 0);
}
