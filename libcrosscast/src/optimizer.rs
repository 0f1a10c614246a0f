//! Per-platform content optimization
//!
//! Pure transformation from one authored payload to per-platform variants:
//! hashtag placement and character-limit truncation. No network, no state.

use std::collections::HashMap;

use crate::types::{Platform, PostContent};

/// Produces a platform-tailored variant of a post for each target
pub trait ContentOptimizer: Send + Sync {
    fn optimize_for_platforms(
        &self,
        content: &PostContent,
        platforms: &[Platform],
    ) -> HashMap<Platform, PostContent>;
}

/// Built-in optimizer
///
/// - Hashtags are normalized to `#tag` form and appended: inline for the
///   short-form platforms, as a trailing block for Instagram.
/// - Text exceeding the platform character limit is truncated on a char
///   boundary with a trailing ellipsis.
/// - Media references pass through untouched.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultOptimizer;

impl ContentOptimizer for DefaultOptimizer {
    fn optimize_for_platforms(
        &self,
        content: &PostContent,
        platforms: &[Platform],
    ) -> HashMap<Platform, PostContent> {
        platforms
            .iter()
            .map(|&platform| (platform, optimize_for(platform, content)))
            .collect()
    }
}

fn optimize_for(platform: Platform, content: &PostContent) -> PostContent {
    let mut text = content.text.clone();

    let tags = format_hashtags(&content.hashtags);
    if !tags.is_empty() {
        match platform {
            // Instagram convention puts the tag block below the caption
            Platform::Instagram => {
                text = format!("{}\n\n{}", text.trim_end(), tags);
            }
            _ => {
                if text.is_empty() {
                    text = tags;
                } else {
                    text = format!("{} {}", text.trim_end(), tags);
                }
            }
        }
    }

    if let Some(limit) = platform.character_limit() {
        text = truncate_chars(&text, limit);
    }

    PostContent {
        text,
        media: content.media.clone(),
        // Hashtags are folded into the text; downstream payloads only
        // carry text and media
        hashtags: Vec::new(),
    }
}

fn format_hashtags(hashtags: &[String]) -> String {
    hashtags
        .iter()
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .map(|t| {
            if t.starts_with('#') {
                t.to_string()
            } else {
                format!("#{}", t)
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Truncate to `limit` characters, with the ellipsis counted in the limit
fn truncate_chars(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    let mut out: String = text.chars().take(limit.saturating_sub(1)).collect();
    out.push('…');
    out
}
