use std::collections::HashMap;

use once_cell::sync::Lazy;
use ratatui::style::Color;
use regex::Regex;
use serde::{Deserialize, Serialize};

static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"#(\w+)").expect("hashtag regex"));

/// How many tags the trending panel shows.
pub const TRENDING_LIMIT: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Hash, Default)]
pub enum Category {
    Complaint,
    Crush,
    Event,
    Question,
    Confession,
    #[default]
    General,
}

impl Category {
    pub const ALL: [Category; 6] = [
        Category::Complaint,
        Category::Crush,
        Category::Event,
        Category::Question,
        Category::Confession,
        Category::General,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Complaint => "Complaint",
            Category::Crush => "Crush",
            Category::Event => "Event",
            Category::Question => "Question",
            Category::Confession => "Confession",
            Category::General => "General",
        }
    }

    pub fn from_label(label: &str) -> Option<Category> {
        let label = label.trim();
        Category::ALL
            .into_iter()
            .find(|category| category.as_str().eq_ignore_ascii_case(label))
    }

    pub fn color(&self) -> Color {
        match self {
            Category::Complaint => Color::Rgb(239, 68, 68),
            Category::Crush => Color::Rgb(236, 72, 153),
            Category::Event => Color::Rgb(16, 185, 129),
            Category::Question => Color::Rgb(245, 158, 11),
            Category::Confession => Color::Rgb(139, 92, 246),
            Category::General => Color::Rgb(99, 102, 241),
        }
    }
}

/// Word characters of the first `#token` in `text`, without the `#`.
pub fn first_tag(text: &str) -> Option<String> {
    TAG_RE
        .captures(text)
        .map(|caps| caps[1].to_string())
}

/// Every literal `#token` in `text`, `#` included, in order of appearance.
pub fn all_tags(text: &str) -> Vec<String> {
    TAG_RE
        .find_iter(text)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Derive a category from the first hashtag naming one, content before
/// title. The server's own category field is never trusted.
pub fn classify(content: &str, title: Option<&str>) -> Category {
    first_tag(content)
        .and_then(|tag| Category::from_label(&tag))
        .or_else(|| {
            title
                .and_then(first_tag)
                .and_then(|tag| Category::from_label(&tag))
        })
        .unwrap_or_default()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrendingTag {
    pub tag: String,
    pub count: usize,
}

/// Count every hashtag occurrence across the loaded posts. Case-sensitive
/// exact tokens, ranked by count, discovery order on ties, top five.
pub fn trending<'a, I>(contents: I) -> Vec<TrendingTag>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut order: Vec<TrendingTag> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for content in contents {
        for tag in all_tags(content) {
            match index.get(&tag) {
                Some(&at) => order[at].count += 1,
                None => {
                    index.insert(tag.clone(), order.len());
                    order.push(TrendingTag { tag, count: 1 });
                }
            }
        }
    }

    order.sort_by(|a, b| b.count.cmp(&a.count));
    order.truncate(TRENDING_LIMIT);
    order
}
