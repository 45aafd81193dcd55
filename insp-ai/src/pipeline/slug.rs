// Slug Rules
//
// Shape: lowercase ASCII alphanumeric tokens joined by '-', at most 4 tokens
// and 60 characters. Suggestions are sanitized first, then screened against a
// generic blacklist. SlugRegistry hands out run-unique slugs and always
// terminates.

use crate::pipeline::types::PhotoId;
use std::collections::HashSet;

pub const MAX_SLUG_LEN: usize = 60;
pub const MAX_SLUG_TOKENS: usize = 4;

/// Whole-slug names that say nothing about the subject
const BLACKLIST: &[&str] = &[
    "photo",
    "image",
    "picture",
    "observation",
    "positive-observation",
    "negative-observation",
    "safety-observation",
    "safety-issue",
    "site-photo",
    "general",
    "good-practice",
    "issue",
    "problem",
    "hazard",
    "untitled",
    "unknown",
    "img",
    "pic",
];

/// Tokens that never carry the subject on their own
const GENERIC_TOKENS: &[&str] = &[
    "photo", "photos", "image", "picture", "pic", "img", "dsc", "observation", "positive",
    "negative", "safety", "issue", "problem", "hazard", "general", "good", "practice", "site",
    "untitled", "unknown", "note", "copy", "edited", "final",
];

/// Filler words dropped when deriving a slug from prose
const FILLER: &[&str] = &[
    "a", "an", "the", "and", "or", "of", "in", "on", "at", "to", "for", "with", "by", "from",
    "is", "are", "was", "were", "be", "been", "has", "have", "had", "this", "that", "there",
    "it", "its", "as", "into", "near", "very", "some", "all", "not", "no",
];

/// Lowercase, hyphenate, collapse, and cap tokens and length
pub fn sanitize(raw: &str) -> String {
    let tokens: Vec<String> = tokens(raw);
    fit(&tokens, MAX_SLUG_TOKENS)
}

fn tokens(raw: &str) -> Vec<String> {
    raw.to_lowercase()
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Join up to `max_tokens` tokens within MAX_SLUG_LEN, cutting at a token boundary
fn fit(tokens: &[String], max_tokens: usize) -> String {
    let mut out = String::new();
    for token in tokens.iter().take(max_tokens) {
        let extra = if out.is_empty() { token.len() } else { token.len() + 1 };
        if out.len() + extra > MAX_SLUG_LEN {
            break;
        }
        if !out.is_empty() {
            out.push('-');
        }
        out.push_str(token);
    }
    if out.is_empty() {
        // A single token longer than the limit
        if let Some(first) = tokens.first() {
            out = first.chars().take(MAX_SLUG_LEN).collect();
        }
    }
    out
}

/// Join `base` tokens and `suffix`, dropping trailing base tokens until it fits
///
/// At least one base token is kept (shortened if need be). None when the
/// suffix leaves no room for a base token.
fn with_suffix(base: &[String], suffix: &str) -> Option<String> {
    let first = base.first()?;
    let room = MAX_SLUG_LEN
        .checked_sub(suffix.len() + 1)
        .filter(|room| *room > 0)?;

    for count in (1..=base.len()).rev() {
        let head = base[..count].join("-");
        if head.len() <= room {
            return Some(format!("{}-{}", head, suffix));
        }
    }
    let head: String = first.chars().take(room).collect();
    Some(format!("{}-{}", head, suffix))
}

/// Why a sanitized slug is unacceptable, or None when it is fine
pub fn rejection_reason(slug: &str) -> Option<String> {
    if slug.is_empty() {
        return Some("name is empty".to_string());
    }
    if BLACKLIST.contains(&slug) {
        return Some(format!("\"{}\" is too generic", slug));
    }

    let parts: Vec<&str> = slug.split('-').collect();
    if parts.len() < 2 {
        return Some(format!("\"{}\" has fewer than 2 words", slug));
    }

    let descriptive = parts.iter().any(|token| {
        token.chars().any(|c| c.is_ascii_alphabetic()) && !GENERIC_TOKENS.contains(token)
    });
    if !descriptive {
        return Some(format!("\"{}\" does not describe the photo's subject", slug));
    }

    None
}

/// Slug from free text (note description, metadata), if one passes screening
pub fn slug_from_text(text: &str) -> Option<String> {
    let meaningful: Vec<String> = tokens(text)
        .into_iter()
        .filter(|t| !FILLER.contains(&t.as_str()) && !GENERIC_TOKENS.contains(&t.as_str()))
        .collect();
    let slug = fit(&meaningful, MAX_SLUG_TOKENS);
    rejection_reason(&slug).is_none().then_some(slug)
}

/// Slug from an original filename (extension dropped), if one passes screening
pub fn slug_from_filename(filename: &str) -> Option<String> {
    let stem = match filename.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => filename,
    };
    let meaningful: Vec<String> = tokens(stem)
        .into_iter()
        .filter(|t| !GENERIC_TOKENS.contains(&t.as_str()))
        .collect();
    let slug = fit(&meaningful, MAX_SLUG_TOKENS);
    rejection_reason(&slug).is_none().then_some(slug)
}

/// Distinct descriptive tokens from fallback candidates, in order
pub fn keyword_tokens<'a>(candidates: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for candidate in candidates {
        for token in tokens(candidate) {
            if token.chars().any(|c| c.is_ascii_alphabetic())
                && !GENERIC_TOKENS.contains(&token.as_str())
                && !FILLER.contains(&token.as_str())
                && !out.contains(&token)
            {
                out.push(token);
            }
        }
    }
    out
}

/// Run-scoped set of issued slugs
#[derive(Debug, Default)]
pub struct SlugRegistry {
    used: HashSet<String>,
}

impl SlugRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_used(&self, slug: &str) -> bool {
        self.used.contains(slug)
    }

    /// Issue a unique slug for `candidate`
    ///
    /// On collision, in order: first 3 tokens + an unused keyword, first 3
    /// tokens + "-2".."-99", first 2 tokens + "-photo-<id>", "photo-<id>",
    /// "photo-<id>-<n>".
    pub fn claim(&mut self, candidate: &str, photo_id: PhotoId, keywords: &[String]) -> String {
        let slug = self.resolve(candidate, photo_id, keywords);
        self.used.insert(slug.clone());
        slug
    }

    fn resolve(&self, candidate: &str, photo_id: PhotoId, keywords: &[String]) -> String {
        let candidate = sanitize(candidate);
        if !candidate.is_empty() && !self.is_used(&candidate) {
            return candidate;
        }

        let parts = tokens(&candidate);
        let base: Vec<String> = parts.iter().take(3).cloned().collect();

        if !base.is_empty() {
            for keyword in keywords.iter().filter(|k| !parts.contains(k)) {
                if let Some(slug) = with_suffix(&base, keyword) {
                    if !self.is_used(&slug) {
                        return slug;
                    }
                }
            }

            for n in 2..=99 {
                if let Some(slug) = with_suffix(&base, &n.to_string()) {
                    if !self.is_used(&slug) {
                        return slug;
                    }
                }
            }

            let first_two: Vec<String> = parts.iter().take(2).cloned().collect();
            if let Some(slug) = with_suffix(&first_two, &format!("photo-{}", photo_id)) {
                if !self.is_used(&slug) {
                    return slug;
                }
            }
        }

        let slug = format!("photo-{}", photo_id);
        if !self.is_used(&slug) {
            return slug;
        }
        (2u32..)
            .map(|n| format!("photo-{}-{}", photo_id, n))
            .find(|slug| !self.is_used(slug))
            .unwrap_or_else(|| format!("photo-{}-{}", photo_id, self.used.len() + 2))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize() {
        assert_eq!(sanitize("Missing Guardrail (Level 3)!"), "missing-guardrail-level-3");
        assert_eq!(sanitize("--blocked__fire   exit--"), "blocked-fire-exit");
        assert_eq!(sanitize("one two three four five"), "one-two-three-four");
        assert_eq!(sanitize("Échafaudage"), "chafaudage");
    }

    #[test]
    fn test_sanitize_caps_length_at_token_boundary() {
        let long = "a".repeat(30) + " " + &"b".repeat(30) + " c";
        let slug = sanitize(&long);
        assert_eq!(slug, "a".repeat(30));
        assert!(sanitize(&"x".repeat(80)).len() <= MAX_SLUG_LEN);
    }

    #[test]
    fn test_rejection_rules() {
        assert!(rejection_reason("positive-observation").unwrap().contains("too generic"));
        assert!(rejection_reason("photo").is_some());
        assert!(rejection_reason("scaffold").unwrap().contains("fewer than 2 words"));
        assert!(rejection_reason("site-photo-2").is_some());
        assert!(rejection_reason("safety-issue-photo").is_some());
        assert_eq!(rejection_reason("missing-guardrail-level3"), None);
    }

    #[test]
    fn test_slug_from_text() {
        assert_eq!(
            slug_from_text("Good housekeeping in the stores area, walkways kept clear"),
            Some("housekeeping-stores-area-walkways".to_string())
        );
        assert_eq!(slug_from_text("Good practice"), None);
    }

    #[test]
    fn test_slug_from_filename() {
        assert_eq!(slug_from_filename("IMG_0001.jpg"), None);
        assert_eq!(
            slug_from_filename("north_stair_handrail.JPG"),
            Some("north-stair-handrail".to_string())
        );
    }

    #[test]
    fn test_registry_collision_sequence() {
        let mut registry = SlugRegistry::new();
        let keywords = vec!["stairwell".to_string()];

        assert_eq!(registry.claim("blocked-fire-exit", 1, &keywords), "blocked-fire-exit");
        assert_eq!(registry.claim("blocked-fire-exit", 2, &keywords), "blocked-fire-exit-stairwell");
        assert_eq!(registry.claim("blocked-fire-exit", 3, &keywords), "blocked-fire-exit-2");
        assert_eq!(registry.claim("blocked-fire-exit", 4, &keywords), "blocked-fire-exit-3");
    }

    #[test]
    fn test_registry_exhausts_to_photo_id() {
        let mut registry = SlugRegistry::new();
        registry.claim("cable-run", 1, &[]);
        for n in 2..=99 {
            registry.used.insert(format!("cable-run-{}", n));
        }
        assert_eq!(registry.claim("cable-run", 7, &[]), "cable-run-photo-7");
        assert_eq!(registry.claim("", 8, &[]), "photo-8");
        assert_eq!(registry.claim("photo-8", 8, &[]), "photo-8-2");
    }

    #[test]
    fn test_registry_long_keyword_keeps_base_token() {
        let mut registry = SlugRegistry::new();
        let candidate = "scaffolding-unsecured-northwestern-elevation";
        let keywords = vec![
            "interconnectedmechanicalventilationductworkassembly".to_string(),
            "a".repeat(MAX_SLUG_LEN),
        ];

        assert_eq!(registry.claim(candidate, 1, &keywords), candidate);
        let mut seen = HashSet::from([candidate.to_string()]);
        for id in 2..=4 {
            let slug = registry.claim(candidate, id, &keywords);
            assert!(slug.len() <= MAX_SLUG_LEN, "{} too long", slug);
            assert!(slug.split('-').count() >= 2, "{} has fewer than 2 tokens", slug);
            assert!(slug.starts_with("scaffold"), "{}", slug);
            assert!(seen.insert(slug));
        }
    }

    #[test]
    fn test_with_suffix_shortens_single_token() {
        let base = vec!["x".repeat(50)];
        let slug = with_suffix(&base, "ventilation").unwrap();
        assert_eq!(slug.len(), MAX_SLUG_LEN);
        assert!(slug.ends_with("-ventilation"));
        assert_eq!(with_suffix(&base, &"v".repeat(MAX_SLUG_LEN - 1)), None);
        assert_eq!(with_suffix(&[], "2"), None);
    }

    #[test]
    fn test_registry_always_unique() {
        let mut registry = SlugRegistry::new();
        let mut seen = HashSet::new();
        for id in 1..=300 {
            let slug = registry.claim("wet-floor", id, &["kitchen".to_string()]);
            assert!(slug.len() <= MAX_SLUG_LEN);
            assert!(seen.insert(slug));
        }
    }
}
