//! Hashtag extraction and tag-filter parsing

use std::sync::OnceLock;

use regex::Regex;

/// Longest tag name accepted
pub const MAX_TAG_LEN: usize = 50;

fn hashtag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"#([\w-]{1,50})").expect("hashtag pattern is valid"))
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Extract hashtags from post content
///
/// A tag is `#` followed by 1-50 word characters or hyphens, where the `#`
/// is not directly preceded by a word character. Names are lower-cased and
/// deduplicated in first-seen order.
///
/// ```
/// assert_eq!(agora::tags::extract_hashtags("hello #World #world #test-1"), vec!["world", "test-1"]);
/// ```
pub fn extract_hashtags(content: &str) -> Vec<String> {
    let mut tags: Vec<String> = Vec::new();

    for caps in hashtag_re().captures_iter(content) {
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
            continue;
        };

        // regex has no lookbehind
        if content[..whole.start()].chars().next_back().is_some_and(is_word_char) {
            continue;
        }

        let name = name.as_str().to_lowercase();
        if !tags.contains(&name) {
            tags.push(name);
        }
    }

    tags
}

/// Parse a comma/whitespace separated tag list: lower-cased, deduplicated
pub fn parse_tag_filter(raw: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for part in raw.split(|c: char| c == ',' || c.is_whitespace()) {
        let name = part.trim().trim_start_matches('#').to_lowercase();
        if !name.is_empty() && !names.contains(&name) {
            names.push(name);
        }
    }
    names
}

/// How a multi-tag filter combines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TagMode {
    #[default]
    All,
    Any,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_lowercases_and_dedupes_in_order() {
        assert_eq!(
            extract_hashtags("hello #World #world #test-1"),
            vec!["world".to_string(), "test-1".to_string()]
        );
    }

    #[test]
    fn test_hash_after_word_char_is_ignored() {
        assert!(extract_hashtags("email me at a#b or c#d").is_empty());
        assert_eq!(extract_hashtags("(#rust) #go"), vec!["rust", "go"]);
    }

    #[test]
    fn test_name_longer_than_limit_is_truncated_to_first_fifty() {
        let long = "a".repeat(60);
        let tags = extract_hashtags(&format!("#{}", long));
        assert_eq!(tags, vec!["a".repeat(MAX_TAG_LEN)]);
    }

    #[test]
    fn test_no_tags() {
        assert!(extract_hashtags("plain text # not a tag").is_empty());
        assert!(extract_hashtags("").is_empty());
    }

    #[test]
    fn test_parse_tag_filter() {
        assert_eq!(parse_tag_filter("Rust, go  rust,,#Web"), vec!["rust", "go", "web"]);
        assert!(parse_tag_filter(" , ").is_empty());
    }
}
