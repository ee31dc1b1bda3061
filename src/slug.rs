//! Slug derivation.
//!
//! Both functions are pure and deterministic; the store calls them while
//! holding its write lock so the uniqueness check and the insert that depends
//! on it happen in one critical section.

/// Base used when a title contains nothing slug-worthy.
pub const FALLBACK_SLUG: &str = "post";

/// slugify
///
/// Lowercases `title`, turns spaces into hyphens, drops everything outside
/// `[a-z0-9-]`, collapses hyphen runs and trims hyphens from both ends.
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    for c in title.chars().flat_map(char::to_lowercase) {
        let c = if c == ' ' { '-' } else { c };
        if c == '-' {
            if !slug.is_empty() && !slug.ends_with('-') {
                slug.push('-');
            }
        } else if c.is_ascii_lowercase() || c.is_ascii_digit() {
            slug.push(c);
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }

    if slug.is_empty() {
        FALLBACK_SLUG.to_string()
    } else {
        slug
    }
}

/// unique_slug
///
/// Tries `base`, `base-1`, `base-2`, ... and returns the first candidate for
/// which `is_taken` is false.
pub fn unique_slug(base: &str, is_taken: impl Fn(&str) -> bool) -> String {
    if !is_taken(base) {
        return base.to_string();
    }
    (1u64..)
        .map(|n| format!("{base}-{n}"))
        .find(|candidate| !is_taken(candidate))
        .unwrap_or_else(|| unreachable!("slug suffix space exhausted"))
}
