//! # Titles - Candidate Identity
//!
//! A resource's identity is its normalized title. Oracle output refers to
//! papers by free-text title, so every recommendation is matched back to a
//! real candidate here before anything is fetched.

/// Minimum word-overlap ratio accepted as a fuzzy match
pub const MIN_OVERLAP_SCORE: f64 = 0.45;

/// Lowercase, drop punctuation, collapse whitespace.
pub fn normalize_title(title: &str) -> String {
    title
        .chars()
        .map(|c| {
            if c.is_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                ' '
            }
        })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Significant words of a title (longer than three characters)
fn significant_words(normalized: &str) -> Vec<&str> {
    let words: Vec<&str> = normalized.split(' ').filter(|w| w.len() > 3).collect();
    if words.is_empty() {
        normalized.split(' ').filter(|w| !w.is_empty()).collect()
    } else {
        words
    }
}

/// Fraction of `wanted`'s significant words that occur in `candidate`.
pub fn overlap_score(wanted: &str, candidate: &str) -> f64 {
    let wanted = normalize_title(wanted);
    let candidate = normalize_title(candidate);
    let words = significant_words(&wanted);
    if words.is_empty() || candidate.is_empty() {
        return 0.0;
    }
    let padded = format!(" {} ", candidate);
    let hits = words
        .iter()
        .filter(|w| padded.contains(&format!(" {} ", w)))
        .count();
    hits as f64 / words.len() as f64
}

/// Resolve a free-text title to one of `candidates`.
///
/// Exact normalized match wins, then containment in either direction, then
/// the best word overlap at or above [`MIN_OVERLAP_SCORE`].
pub fn match_title<'a, T, F>(wanted: &str, candidates: &'a [T], title_of: F) -> Option<&'a T>
where
    F: Fn(&T) -> &str,
{
    let key = normalize_title(wanted);
    if key.is_empty() {
        return None;
    }

    if let Some(exact) = candidates
        .iter()
        .find(|c| normalize_title(title_of(c)) == key)
    {
        return Some(exact);
    }

    if let Some(contained) = candidates.iter().find(|c| {
        let other = normalize_title(title_of(c));
        !other.is_empty() && (other.contains(&key) || key.contains(&other))
    }) {
        return Some(contained);
    }

    let mut best: Option<(&T, f64)> = None;
    for candidate in candidates {
        let score = overlap_score(wanted, title_of(candidate));
        if score > best.map(|(_, s)| s).unwrap_or(0.0) {
            best = Some((candidate, score));
        }
    }
    best.filter(|(_, score)| *score >= MIN_OVERLAP_SCORE)
        .map(|(candidate, _)| candidate)
}
