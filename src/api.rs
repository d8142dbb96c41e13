use std::path::Path;
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Utc};
use crossbeam_channel::unbounded;
use rand::distributions::Alphanumeric;
use rand::Rng;
use reqwest::blocking::{Client as HttpClient, Response};
use reqwest::header::{CONTENT_TYPE, USER_AGENT};
use reqwest::Method;
use serde::Deserialize;
use url::Url;

use crate::tags::{self, Category};

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8000";

#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    pub base_url: Option<String>,
    pub asset_base_url: Option<String>,
    pub user_agent: String,
    pub http_client: Option<HttpClient>,
}

/// A normalized feed post. Category and image URLs are resolved
/// client-side; the wire shapes vary across backend revisions.
#[derive(Debug, Clone, PartialEq)]
pub struct Post {
    pub id: String,
    pub title: Option<String>,
    pub content: String,
    pub category: Category,
    pub created_at: DateTime<Utc>,
    pub server_votes: i64,
    pub comment_count: i64,
    pub images: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Comment {
    pub post_id: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct PostDraft {
    pub title: Option<String>,
    pub content: String,
    pub images: Vec<ImageAttachment>,
}

#[derive(Debug, Clone)]
pub struct ImageAttachment {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl ImageAttachment {
    pub fn from_path(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("read image {}", path.display()))?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| "image".to_string());
        let content_type = content_type_for(&file_name).to_string();
        Ok(Self {
            file_name,
            content_type,
            bytes,
        })
    }
}

fn content_type_for(file_name: &str) -> &'static str {
    let ext = file_name
        .rsplit('.')
        .next()
        .map(|ext| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        _ => "application/octet-stream",
    }
}

/// Failures the caller distinguishes from plain transport errors.
#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error("a post needs text or at least one image")]
    EmptyPost,
    #[error("comment text is required")]
    EmptyComment,
    #[error("image upload failed: {0}")]
    Upload(String),
}

pub struct Client {
    http: HttpClient,
    user_agent: String,
    base_url: Url,
    asset_base_url: String,
}

impl Client {
    pub fn new(config: ClientConfig) -> Result<Self> {
        if config.user_agent.trim().is_empty() {
            bail!("feed client user agent required");
        }
        let base = config
            .base_url
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let base_url = Url::parse(&base)?;
        let asset_base_url = config
            .asset_base_url
            .unwrap_or_else(|| format!("{}/assets", base.trim_end_matches('/')));
        let http = match config.http_client {
            Some(client) => client,
            None => HttpClient::builder()
                .timeout(Duration::from_secs(20))
                .build()?,
        };

        Ok(Client {
            http,
            user_agent: config.user_agent,
            base_url,
            asset_base_url,
        })
    }

    /// Full post collection, one request, whole-list replace on the caller's
    /// side. Wire records from any backend revision normalize to `Post`.
    pub fn list_posts(&self) -> Result<Vec<Post>> {
        let resp = self.request(Method::GET, "/posts", None)?;
        let records: Vec<PostRecord> = resp.json().context("feed: decode post listing")?;
        Ok(records
            .into_iter()
            .map(|record| record.into_post(&self.asset_base_url))
            .collect())
    }

    /// Submit a new post. Image uploads fan out in parallel and all must
    /// succeed before the post body is sent; nothing is created server-side
    /// on a partial batch.
    pub fn submit_post(&self, draft: PostDraft) -> Result<()> {
        if draft.content.trim().is_empty() && draft.images.is_empty() {
            bail!(SubmitError::EmptyPost);
        }

        let mut keys: Vec<String> = Vec::new();
        if !draft.images.is_empty() {
            let slots = self.upload_slots(draft.images.len())?;
            keys = slots.iter().map(|slot| slot.key.clone()).collect();
            self.upload_all(slots, draft.images)?;
        }

        let body = serde_json::json!({
            "title": draft.title,
            "content": draft.content,
            "deletion_password": deletion_password(),
            "images": keys,
        });
        self.request(Method::POST, "/posts", Some(&body))?;
        Ok(())
    }

    /// Comments for one post, fetched fresh on every thread open.
    pub fn comments_for(&self, post_id: &str) -> Result<Vec<Comment>> {
        let path = format!("/comments/post/{post_id}");
        let resp = self.request(Method::GET, &path, None)?;
        let records: Vec<CommentRecord> = resp.json().context("feed: decode comments")?;
        Ok(records
            .into_iter()
            .map(|record| Comment {
                post_id: post_id.to_string(),
                content: record.content,
                created_at: record.created_at.unwrap_or_else(Utc::now),
            })
            .collect())
    }

    pub fn submit_comment(&self, post_id: &str, content: &str) -> Result<()> {
        if content.trim().is_empty() {
            bail!(SubmitError::EmptyComment);
        }
        let body = serde_json::json!({
            "content": content,
            "post_id": post_id,
        });
        self.request(Method::POST, "/comments", Some(&body))?;
        Ok(())
    }

    fn upload_slots(&self, count: usize) -> Result<Vec<UploadSlot>> {
        let path = format!("/posts/upload/{count}");
        let resp = self.request(Method::GET, &path, None)?;
        let slots: Vec<UploadSlot> = resp.json().context("feed: decode upload slots")?;
        if slots.len() != count {
            bail!(
                "feed: requested {} upload slots, backend returned {}",
                count,
                slots.len()
            );
        }
        Ok(slots)
    }

    fn upload_all(&self, slots: Vec<UploadSlot>, images: Vec<ImageAttachment>) -> Result<()> {
        let (tx, rx) = unbounded();
        for (slot, image) in slots.into_iter().zip(images) {
            let tx = tx.clone();
            let http = self.http.clone();
            thread::spawn(move || {
                let result = upload_one(&http, &slot.url, image);
                let _ = tx.send(result);
            });
        }
        drop(tx);

        let mut first_failure: Option<anyhow::Error> = None;
        for result in rx.iter() {
            if let Err(err) = result {
                first_failure.get_or_insert(err);
            }
        }
        if let Some(err) = first_failure {
            bail!(SubmitError::Upload(format!("{err:#}")));
        }
        Ok(())
    }

    fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<Response> {
        let url = self.base_url.join(path)?;
        let mut req = self.http.request(method, url);
        req = req.header(USER_AGENT, self.user_agent.clone());
        if let Some(body) = body {
            req = req.json(body);
        }

        let resp = req.send()?;
        if resp.status().is_success() {
            Ok(resp)
        } else {
            let status = resp.status();
            let body = resp.text().unwrap_or_default();
            match status.as_u16() {
                404 => Err(anyhow!("feed: not found: {}", path)),
                429 => Err(anyhow!("feed: rate limited: {}", body)),
                _ => Err(anyhow!("feed: api error {}: {}", status, body)),
            }
        }
    }
}

fn upload_one(http: &HttpClient, url: &str, image: ImageAttachment) -> Result<()> {
    let resp = http
        .put(url)
        .header(CONTENT_TYPE, image.content_type.clone())
        .body(image.bytes)
        .send()
        .with_context(|| format!("upload {}", image.file_name))?;
    if !resp.status().is_success() {
        bail!("upload {} failed with status {}", image.file_name, resp.status());
    }
    Ok(())
}

/// Throwaway credential stored with the post so its author can delete it
/// later. Generated fresh per submission, never reused.
fn deletion_password() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(24)
        .map(char::from)
        .collect()
}

#[derive(Debug, Clone, Deserialize)]
struct UploadSlot {
    key: String,
    url: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum IdRepr {
    Num(i64),
    Text(String),
}

impl IdRepr {
    fn into_string(self) -> String {
        match self {
            IdRepr::Num(n) => n.to_string(),
            IdRepr::Text(s) => s,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct PostRecord {
    id: IdRepr,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    content: String,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    votes: Option<i64>,
    #[serde(default)]
    post_images: Option<Vec<PostImageRecord>>,
    #[serde(default)]
    images: Option<Vec<String>>,
    #[serde(default)]
    comments: Option<Vec<CommentAggregate>>,
    #[serde(default)]
    comment_count: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
struct PostImageRecord {
    #[serde(alias = "key")]
    image_key: String,
}

#[derive(Debug, Clone, Deserialize)]
struct CommentAggregate {
    count: i64,
}

#[derive(Debug, Clone, Deserialize)]
struct CommentRecord {
    #[serde(default)]
    content: String,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
}

impl PostRecord {
    fn into_post(self, asset_base_url: &str) -> Post {
        let category = tags::classify(&self.content, self.title.as_deref());

        // A structured attachment list wins over a flat URL list.
        let images = match self.post_images {
            Some(entries) => entries
                .into_iter()
                .map(|entry| resolve_asset(asset_base_url, &entry.image_key))
                .collect(),
            None => self.images.unwrap_or_default(),
        };

        let comment_count = self
            .comments
            .as_ref()
            .and_then(|aggregate| aggregate.first())
            .map(|aggregate| aggregate.count)
            .or(self.comment_count)
            .unwrap_or(0);

        Post {
            id: self.id.into_string(),
            title: self.title,
            content: self.content,
            category,
            created_at: self.created_at.unwrap_or_else(Utc::now),
            server_votes: self.votes.unwrap_or(0),
            comment_count,
            images,
        }
    }
}

fn resolve_asset(asset_base_url: &str, key: &str) -> String {
    format!(
        "{}/{}",
        asset_base_url.trim_end_matches('/'),
        key.trim_start_matches('/')
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: serde_json::Value) -> PostRecord {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn normalizes_numeric_and_string_ids() {
        let from_num = record(json!({"id": 1712345678901i64, "content": "x"}));
        assert_eq!(
            from_num.into_post("http://h/assets").id,
            "1712345678901"
        );
        let from_text = record(json!({"id": "abc-123", "content": "x"}));
        assert_eq!(from_text.into_post("http://h/assets").id, "abc-123");
    }

    #[test]
    fn prefers_structured_attachments_over_flat_urls() {
        let post = record(json!({
            "id": 1,
            "content": "pic day",
            "post_images": [{"image_key": "a.png"}, {"key": "b.png"}],
            "images": ["http://elsewhere/c.png"],
        }))
        .into_post("http://host/assets/");
        assert_eq!(
            post.images,
            vec!["http://host/assets/a.png", "http://host/assets/b.png"]
        );
    }

    #[test]
    fn falls_back_to_flat_url_list() {
        let post = record(json!({
            "id": 1,
            "content": "pic day",
            "images": ["http://host/assets/c.png"],
        }))
        .into_post("http://host/assets");
        assert_eq!(post.images, vec!["http://host/assets/c.png"]);
    }

    #[test]
    fn comment_count_from_aggregate_or_counter() {
        let aggregated = record(json!({
            "id": 1,
            "content": "x",
            "comments": [{"count": 7}],
        }))
        .into_post("http://h/a");
        assert_eq!(aggregated.comment_count, 7);

        let counted = record(json!({"id": 2, "content": "x", "comment_count": 3}))
            .into_post("http://h/a");
        assert_eq!(counted.comment_count, 3);

        let neither = record(json!({"id": 3, "content": "x"})).into_post("http://h/a");
        assert_eq!(neither.comment_count, 0);
    }

    #[test]
    fn category_is_rederived_from_content() {
        let post = record(json!({
            "id": 1,
            "content": "piano guy again #Crush",
        }))
        .into_post("http://h/a");
        assert_eq!(post.category, Category::Crush);

        let fallback = record(json!({
            "id": 2,
            "title": "#Event open mic",
            "content": "friday at the quad",
        }))
        .into_post("http://h/a");
        assert_eq!(fallback.category, Category::Event);
    }

    #[test]
    fn missing_votes_default_to_zero() {
        let post = record(json!({"id": 1, "content": "x"})).into_post("http://h/a");
        assert_eq!(post.server_votes, 0);
    }

    #[test]
    fn empty_draft_is_rejected_before_any_request() {
        // Port 9 (discard) is never listened on; a network attempt would
        // surface as a transport error, not a SubmitError.
        let client = Client::new(ClientConfig {
            base_url: Some("http://127.0.0.1:9".into()),
            user_agent: "test/0".into(),
            ..Default::default()
        })
        .unwrap();
        let err = client
            .submit_post(PostDraft {
                title: None,
                content: "   ".into(),
                images: Vec::new(),
            })
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<SubmitError>(),
            Some(SubmitError::EmptyPost)
        ));
    }

    #[test]
    fn empty_comment_is_rejected_before_any_request() {
        let client = Client::new(ClientConfig {
            base_url: Some("http://127.0.0.1:9".into()),
            user_agent: "test/0".into(),
            ..Default::default()
        })
        .unwrap();
        let err = client.submit_comment("1", "  \n").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<SubmitError>(),
            Some(SubmitError::EmptyComment)
        ));
    }

    #[test]
    fn content_types_follow_extension() {
        assert_eq!(content_type_for("a.JPG"), "image/jpeg");
        assert_eq!(content_type_for("b.png"), "image/png");
        assert_eq!(content_type_for("weird.bin"), "application/octet-stream");
        assert_eq!(content_type_for("noext"), "application/octet-stream");
    }
}
