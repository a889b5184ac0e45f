/// Used when a name has no slug-able characters at all.
const FALLBACK_SLUG: &str = "untitled";

/// Lowercases `name`, keeps only `[a-z0-9]`, whitespace, `_` and `-`, then
/// turns runs of whitespace/underscores/dashes into a single `-`.
///
/// Unlike the plain algorithm, which yields `""` for a name like `"!!!"`,
/// this never returns an empty id: such names map to `"untitled"`.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_dash = false;

    for c in name.to_lowercase().chars() {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c);
        } else if c.is_whitespace() || c == '_' || c == '-' {
            pending_dash = true;
        }
    }

    if slug.is_empty() {
        FALLBACK_SLUG.to_string()
    } else {
        slug
    }
}

/// Returns `candidate` if unused, else the first free `candidate-N` (N >= 1).
pub fn uniquify<'a, I>(candidate: &str, existing: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let taken: std::collections::HashSet<&str> = existing.into_iter().collect();
    if !taken.contains(candidate) {
        return candidate.to_string();
    }
    (1..)
        .map(|n| format!("{}-{}", candidate, n))
        .find(|id| !taken.contains(id.as_str()))
        .unwrap_or_else(|| candidate.to_string())
}
