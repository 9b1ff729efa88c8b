//! Post and category field rules.

use crate::domain::error::ValidationErrors;

pub const TITLE_MIN_LEN: usize = 5;
pub const TITLE_MAX_LEN: usize = 200;
pub const CONTENT_MIN_LEN: usize = 10;
pub const EXCERPT_MAX_LEN: usize = 500;
pub const MAX_TAGS: usize = 10;
pub const TAG_MAX_LEN: usize = 50;
pub const CATEGORY_NAME_MIN_LEN: usize = 2;
pub const CATEGORY_NAME_MAX_LEN: usize = 50;

/// Fields of a post write. `None` means the field is not being changed.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostFields<'a> {
    pub title: Option<&'a str>,
    pub content: Option<&'a str>,
    pub excerpt: Option<&'a str>,
    pub tags: Option<&'a [String]>,
}

pub fn validate_post_fields(fields: &PostFields<'_>) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::new();

    if let Some(title) = fields.title {
        let len = title.trim().chars().count();
        errors.ensure(
            (TITLE_MIN_LEN..=TITLE_MAX_LEN).contains(&len),
            "title",
            "length",
            "Title must be between 5 and 200 characters",
        );
    }
    if let Some(content) = fields.content {
        errors.ensure(
            content.trim().chars().count() >= CONTENT_MIN_LEN,
            "content",
            "length",
            "Content must be at least 10 characters",
        );
    }
    if let Some(excerpt) = fields.excerpt {
        errors.ensure(
            excerpt.chars().count() <= EXCERPT_MAX_LEN,
            "excerpt",
            "length",
            "Excerpt must be at most 500 characters",
        );
    }
    if let Some(tags) = fields.tags {
        errors.ensure(
            tags.len() <= MAX_TAGS,
            "tags",
            "range",
            "At most 10 tags are allowed",
        );
        errors.ensure(
            tags.iter().all(|tag| tag.chars().count() <= TAG_MAX_LEN),
            "tags",
            "length",
            "Tags must be at most 50 characters",
        );
    }

    errors.into_result()
}

/// Trim tags, drop empties and keep the first occurrence of duplicates.
pub fn normalize_tags(tags: Vec<String>) -> Vec<String> {
    let mut normalized: Vec<String> = Vec::with_capacity(tags.len());
    for tag in tags {
        let tag = tag.trim();
        if !tag.is_empty() && !normalized.iter().any(|existing| existing == tag) {
            normalized.push(tag.to_string());
        }
    }
    normalized
}

pub fn validate_category_name(name: &str) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::new();
    let len = name.trim().chars().count();
    errors.ensure(
        (CATEGORY_NAME_MIN_LEN..=CATEGORY_NAME_MAX_LEN).contains(&len),
        "name",
        "length",
        "Name must be between 2 and 50 characters",
    );
    errors.into_result()
}
