use std::collections::HashMap;

use crate::api::Post;
use crate::tags::Category;
use crate::votes;

/// Active feed filter. Parsed from the sidebar label or a trending tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    All,
    /// Case-insensitive substring match against post content.
    Hashtag(String),
    /// A category label or one of its sidebar aliases.
    Named(String),
}

impl Default for Filter {
    fn default() -> Self {
        Filter::All
    }
}

impl Filter {
    pub fn parse(label: &str) -> Filter {
        let label = label.trim();
        if label == "All" {
            Filter::All
        } else if label.starts_with('#') {
            Filter::Hashtag(label.to_string())
        } else {
            Filter::Named(label.to_string())
        }
    }

    pub fn matches(&self, post: &Post) -> bool {
        match self {
            Filter::All => true,
            Filter::Hashtag(tag) => post
                .content
                .to_lowercase()
                .contains(&tag.to_lowercase()),
            Filter::Named(name) => match name.as_str() {
                "Rants" => post.category == Category::Complaint,
                "Confessions" => {
                    matches!(post.category, Category::Confession | Category::Crush)
                }
                "Events" => post.category == Category::Event,
                other => post.category.as_str() == other,
            },
        }
    }

    pub fn label(&self) -> &str {
        match self {
            Filter::All => "All",
            Filter::Hashtag(tag) => tag,
            Filter::Named(name) => name,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Sort {
    #[default]
    Newest,
    Top,
}

impl Sort {
    pub fn display_name(&self) -> &'static str {
        match self {
            Sort::Newest => "Newest",
            Sort::Top => "Top",
        }
    }

    pub fn toggled(self) -> Sort {
        match self {
            Sort::Newest => Sort::Top,
            Sort::Top => Sort::Newest,
        }
    }
}

/// One feed row as projected for display: the post plus the
/// overlay-adjusted count and the user's own vote.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewPost {
    pub post: Post,
    pub votes: i64,
    pub my_vote: Option<i8>,
}

/// In-memory feed state. The collection is replaced wholesale on every
/// sync; filter and sort changes are pure recomputations over it.
#[derive(Debug, Default)]
pub struct FeedState {
    posts: Option<Vec<Post>>,
    filter: Filter,
    sort: Sort,
}

impl FeedState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn loaded(&self) -> bool {
        self.posts.is_some()
    }

    pub fn posts(&self) -> Option<&[Post]> {
        self.posts.as_deref()
    }

    /// Whole-list replacement; concurrent refreshes are last-write-wins.
    pub fn replace_posts(&mut self, posts: Vec<Post>) {
        self.posts = Some(posts);
    }

    pub fn filter(&self) -> &Filter {
        &self.filter
    }

    pub fn set_filter(&mut self, filter: Filter) {
        self.filter = filter;
    }

    pub fn sort(&self) -> Sort {
        self.sort
    }

    pub fn set_sort(&mut self, sort: Sort) {
        self.sort = sort;
    }

    /// Re-derive one post's comment counter from a freshly loaded thread.
    pub fn set_comment_count(&mut self, post_id: &str, count: i64) {
        if let Some(posts) = self.posts.as_mut() {
            if let Some(post) = posts.iter_mut().find(|post| post.id == post_id) {
                post.comment_count = count;
            }
        }
    }

    /// The filtered, sorted display list. `None` means not yet loaded;
    /// `Some` but empty means the filter genuinely matched nothing. Ties
    /// keep last-sync insertion order.
    pub fn view(&self, overlay: &HashMap<String, i8>) -> Option<Vec<ViewPost>> {
        let posts = self.posts.as_ref()?;
        let mut rows: Vec<ViewPost> = posts
            .iter()
            .filter(|post| self.filter.matches(post))
            .map(|post| {
                let my_vote = overlay.get(&post.id).copied();
                ViewPost {
                    votes: votes::adjusted(post.server_votes, my_vote),
                    my_vote,
                    post: post.clone(),
                }
            })
            .collect();

        match self.sort {
            Sort::Newest => {
                rows.sort_by(|a, b| b.post.created_at.cmp(&a.post.created_at));
            }
            Sort::Top => {
                rows.sort_by(|a, b| b.votes.cmp(&a.votes));
            }
        }
        Some(rows)
    }
}
