use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{Duration, Utc};

use crate::api::{self, Comment, Post, PostDraft};
use crate::tags::Category;

pub trait FeedService: Send + Sync {
    fn fetch_posts(&self) -> Result<Vec<Post>>;
}

pub trait CommentService: Send + Sync {
    fn load_comments(&self, post_id: &str) -> Result<Vec<Comment>>;
    fn submit_comment(&self, post_id: &str, content: &str) -> Result<()>;
}

pub trait SubmitService: Send + Sync {
    fn submit_post(&self, draft: PostDraft) -> Result<()>;
}

pub struct BackendFeedService {
    client: Arc<api::Client>,
}

impl BackendFeedService {
    pub fn new(client: Arc<api::Client>) -> Self {
        Self { client }
    }
}

impl FeedService for BackendFeedService {
    fn fetch_posts(&self) -> Result<Vec<Post>> {
        self.client.list_posts().context("fetch post collection")
    }
}

pub struct BackendCommentService {
    client: Arc<api::Client>,
}

impl BackendCommentService {
    pub fn new(client: Arc<api::Client>) -> Self {
        Self { client }
    }
}

impl CommentService for BackendCommentService {
    fn load_comments(&self, post_id: &str) -> Result<Vec<Comment>> {
        self.client
            .comments_for(post_id)
            .context("fetch comment thread")
    }

    fn submit_comment(&self, post_id: &str, content: &str) -> Result<()> {
        self.client.submit_comment(post_id, content)
    }
}

pub struct BackendSubmitService {
    client: Arc<api::Client>,
}

impl BackendSubmitService {
    pub fn new(client: Arc<api::Client>) -> Self {
        Self { client }
    }
}

impl SubmitService for BackendSubmitService {
    fn submit_post(&self, draft: PostDraft) -> Result<()> {
        self.client.submit_post(draft)
    }
}

#[derive(Default)]
pub struct MockFeedService;

impl FeedService for MockFeedService {
    fn fetch_posts(&self) -> Result<Vec<Post>> {
        Ok(vec![
            Post {
                id: "welcome".into(),
                title: Some("Welcome to Campus Echo".into()),
                content: "Offline sample feed. #General".into(),
                category: Category::General,
                created_at: Utc::now() - Duration::minutes(15),
                server_votes: 42,
                comment_count: 5,
                images: Vec::new(),
            },
            Post {
                id: "shortcuts".into(),
                title: None,
                content: "j/k to move, u/d to vote, Enter opens comments. #Question".into(),
                category: Category::Question,
                created_at: Utc::now() - Duration::hours(2),
                server_votes: 15,
                comment_count: 0,
                images: Vec::new(),
            },
        ])
    }
}

#[derive(Default)]
pub struct MockCommentService;

impl CommentService for MockCommentService {
    fn load_comments(&self, post_id: &str) -> Result<Vec<Comment>> {
        Ok(vec![Comment {
            post_id: post_id.to_string(),
            content: "Comments are unavailable in this mock response.".into(),
            created_at: Utc::now(),
        }])
    }

    fn submit_comment(&self, _post_id: &str, _content: &str) -> Result<()> {
        Ok(())
    }
}

#[derive(Default)]
pub struct MockSubmitService;

impl SubmitService for MockSubmitService {
    fn submit_post(&self, _draft: PostDraft) -> Result<()> {
        Ok(())
    }
}
