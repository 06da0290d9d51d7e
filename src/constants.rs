//! Shared constants: page selectors and marker texts for the target site.

/// Default DevTools endpoint of a Chromium started with `--remote-debugging-port=9222`.
pub const DEFAULT_BROWSER_DEBUG_URL: &str = "http://127.0.0.1:9222";

/// Results page prefix; the url-encoded keyword is appended.
pub const DEFAULT_SEARCH_BASE_URL: &str = "https://s.weibo.com/weibo?q=";

/// CSS selectors and marker texts used to read the rendered page.
///
/// All lookups inside a card or comment row are relative to that node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selectors {
    // Results page
    pub feed_item: String,
    pub feed_content: String,
    pub next_page: String,

    // Feed card (relative to the feed item)
    pub card_top: String,
    pub card: String,
    pub card_feed: String,
    pub avatar: String,
    pub link: String,
    pub image: String,
    pub name: String,
    pub source: String,

    // Detail context
    pub detail_time: String,
    pub detail_text: String,

    // Virtualized comment list
    pub list_item: String,
    pub scroller_item: String,
    pub comment_avatar: String,
    pub list_bottom: String,
    pub tip_text: String,

    // Attributes
    pub post_id_attr: String,
    pub nick_name_attr: String,
    pub slot_index_attr: String,

    // Tip texts below the comment list
    pub load_failed_text: String,
    pub composer_prompt_text: String,
}

impl Default for Selectors {
    fn default() -> Self {
        Self {
            feed_item: r#"div[action-type="feed_list_item"]"#.to_string(),
            feed_content: r#"p[node-type="feed_list_content"]"#.to_string(),
            next_page: ".next".to_string(),

            card_top: ".card-top".to_string(),
            card: ".card".to_string(),
            card_feed: ".card-feed".to_string(),
            avatar: ".avator".to_string(),
            link: "a".to_string(),
            image: "img".to_string(),
            name: ".name".to_string(),
            source: ".from".to_string(),

            detail_time: r#"a[class*="head-info_time"]"#.to_string(),
            detail_text: r#"div[class^="detail_wbtext_"]"#.to_string(),

            list_item: ".vue-recycle-scroller__item-view".to_string(),
            scroller_item: ".wbpro-scroller-item".to_string(),
            comment_avatar: ".woo-avatar-img".to_string(),
            list_bottom: r#"div[class^="Bottom_text_"]"#.to_string(),
            tip_text: "span.woo-tip-text".to_string(),

            post_id_attr: "mid".to_string(),
            nick_name_attr: "nick-name".to_string(),
            slot_index_attr: "data-index".to_string(),

            load_failed_text: "加载失败".to_string(),
            composer_prompt_text: "发表你的评论或".to_string(),
        }
    }
}
