/// URL slug of a name: lower-case ASCII letters and digits joined by single
/// hyphens.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_dash = false;
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }
    slug
}

/// The explicit slug when one was given, otherwise one derived from `name`.
pub fn slug_or_derive(slug: Option<&str>, name: &str) -> String {
    slug.map(str::trim)
        .filter(|s| !s.is_empty())
        .map(slugify)
        .unwrap_or_else(|| slugify(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugs() {
        assert_eq!(slugify("Oil & Gas Events"), "oil-gas-events");
        assert_eq!(slugify("  Upstream--News  "), "upstream-news");
        assert_eq!(slug_or_derive(Some(" "), "Mid Stream"), "mid-stream");
        assert_eq!(slug_or_derive(Some("Custom Slug"), "x"), "custom-slug");
    }
}
