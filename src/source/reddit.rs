use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use super::{FetchError, SourceFetcher, SourcePost};

pub const DEFAULT_BASE_URL: &str = "https://old.reddit.com";

// Reddit rejects requests from default library user agents.
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Reads a subreddit's hot listing through the public JSON API. No
/// authentication is involved.
pub struct RedditClient {
    client: Client,
    base_url: String,
}

impl RedditClient {
    pub fn new(base_url: &str) -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

impl SourceFetcher for RedditClient {
    async fn fetch(&self, source: &str, limit: usize) -> Result<Vec<SourcePost>, FetchError> {
        let url = format!("{}/r/{source}/hot.json", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[("limit", limit)])
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
            });
        }

        let listing = response.json::<Listing>().await?;
        let fallback_label = format!("r/{source}");
        let posts: Vec<SourcePost> = listing
            .data
            .children
            .into_iter()
            .take(limit)
            .map(|child| child.data.into_post(&fallback_label))
            .collect();

        debug!(source, posts = posts.len(), "fetched listing");
        Ok(posts)
    }
}

#[derive(Debug, Deserialize)]
struct Listing {
    data: ListingData,
}

#[derive(Debug, Deserialize)]
struct ListingData {
    #[serde(default)]
    children: Vec<ListingChild>,
}

#[derive(Debug, Deserialize)]
struct ListingChild {
    data: RawPost,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawPost {
    subreddit_name_prefixed: Option<String>,
    title: Option<String>,
    selftext: Option<String>,
    url: Option<String>,
    author: Option<String>,
    score: Option<i64>,
    num_comments: Option<u64>,
}

impl RawPost {
    fn into_post(self, fallback_label: &str) -> SourcePost {
        SourcePost {
            source: self
                .subreddit_name_prefixed
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| fallback_label.to_string()),
            title: self.title.unwrap_or_default(),
            body: self.selftext.unwrap_or_default(),
            url: self.url.unwrap_or_default(),
            author: self
                .author
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| "unknown".to_string()),
            score: self.score.unwrap_or(0),
            num_comments: self.num_comments.unwrap_or(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn listing() -> serde_json::Value {
        serde_json::json!({
            "kind": "Listing",
            "data": {
                "children": [
                    {"kind": "t3", "data": {
                        "subreddit_name_prefixed": "r/aviation",
                        "title": "Nice view from the cockpit",
                        "selftext": "",
                        "url": "https://example.com/1",
                        "author": "pilot",
                        "score": 42,
                        "num_comments": 7
                    }},
                    {"kind": "t3", "data": {
                        "title": "Question about landing gear",
                        "selftext": "How does it retract?",
                        "author": null,
                        "score": null
                    }}
                ]
            }
        })
    }

    #[tokio::test]
    async fn fetches_and_maps_listing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/r/aviation/hot.json"))
            .and(query_param("limit", "10"))
            .and(header("accept", "application/json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(listing()))
            .expect(1)
            .mount(&server)
            .await;

        let client = RedditClient::new(&server.uri()).unwrap();
        let posts = client.fetch("aviation", 10).await.unwrap();

        assert_eq!(posts.len(), 2);
        assert_eq!(posts[0].source, "r/aviation");
        assert_eq!(posts[0].title, "Nice view from the cockpit");
        assert_eq!(posts[0].score, 42);
        assert_eq!(posts[0].num_comments, 7);

        // Missing fields fall back to defaults.
        assert_eq!(posts[1].source, "r/aviation");
        assert_eq!(posts[1].body, "How does it retract?");
        assert_eq!(posts[1].author, "unknown");
        assert_eq!(posts[1].score, 0);
    }

    #[tokio::test]
    async fn truncates_to_limit() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(listing()))
            .mount(&server)
            .await;

        let client = RedditClient::new(&server.uri()).unwrap();
        let posts = client.fetch("aviation", 1).await.unwrap();
        assert_eq!(posts.len(), 1);
    }

    #[tokio::test]
    async fn error_status_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let client = RedditClient::new(&server.uri()).unwrap();
        let err = client.fetch("hoggit", 10).await.unwrap_err();
        assert!(matches!(err, FetchError::Status { status: 503 }));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn malformed_body_is_not_retryable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>blocked</html>"))
            .mount(&server)
            .await;

        let client = RedditClient::new(&server.uri()).unwrap();
        let err = client.fetch("hoggit", 10).await.unwrap_err();
        assert!(matches!(err, FetchError::Network(_)));
        assert!(!err.is_retryable());
    }
}
