use lazy_static::lazy_static;
use regex::Regex;
use std::collections::BTreeSet;

use crate::modules::storage::store::{EntityKind, SlugSource};

lazy_static! {
    // `\w` is letters, digits and underscore
    static ref NON_WORD: Regex = Regex::new(r"[^\w]+").expect("NON_WORD: invalid regex pattern");
}

/// Canonical slugify transform: every run of non-word characters becomes a
/// single hyphen, then the whole string is lower-cased.
pub fn slugify(raw: &str) -> String {
    NON_WORD.replace_all(raw, "-").to_lowercase()
}

/// Numeric suffix of `slug` relative to `base`.
///
/// `base` itself counts as suffix 0, `base-N` as N. Anything else sharing
/// the prefix (`base-x`, `basement`) is not part of the sequence.
fn sequence_index(slug: &str, base: &str) -> Option<u64> {
    let rest = slug.strip_prefix(base)?;
    if rest.is_empty() {
        return Some(0);
    }
    let digits = rest.strip_prefix('-')?;
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Derive a unique slug for an entity of `kind` from `raw_name`.
///
/// Returns `None` when the entity kind carries no slug column. Existing slugs
/// are compared by their numeric suffix, so `base-10` correctly wins over
/// `base-9`.
pub fn generate_slug<S: SlugSource + ?Sized>(
    source: &S,
    kind: EntityKind,
    raw_name: &str,
) -> Option<String> {
    let base = slugify(raw_name);
    let existing = source.slugs_with_prefix(kind, &base)?;

    let taken: BTreeSet<u64> = existing
        .iter()
        .filter_map(|slug| sequence_index(slug, &base))
        .collect();

    let next = match taken.iter().next_back() {
        None => return Some(base),
        // At the top of the range, reuse the lowest free suffix instead
        Some(last) => match last.checked_add(1) {
            Some(next) => next,
            None => (1..=u64::MAX).find(|index| !taken.contains(index))?,
        },
    };
    Some(format!("{}-{}", base, next))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedSlugs(Vec<&'static str>);

    impl SlugSource for FixedSlugs {
        fn slugs_with_prefix(&self, kind: EntityKind, prefix: &str) -> Option<Vec<String>> {
            match kind {
                EntityKind::User => Some(
                    self.0
                        .iter()
                        .filter(|s| s.starts_with(prefix))
                        .map(|s| s.to_string())
                        .collect(),
                ),
                EntityKind::OutgoingMail => None,
            }
        }
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Cak Juice"), "cak-juice");
        assert_eq!(slugify("Hello,   World!!"), "hello-world-");
        assert_eq!(slugify("snake_case stays"), "snake_case-stays");
        assert_eq!(slugify("A"), "a");
    }

    #[test]
    fn test_slug_sequence() {
        let none = FixedSlugs(vec![]);
        assert_eq!(
            generate_slug(&none, EntityKind::User, "Cak Juice").as_deref(),
            Some("cak-juice")
        );

        let one = FixedSlugs(vec!["cak-juice"]);
        assert_eq!(
            generate_slug(&one, EntityKind::User, "Cak Juice").as_deref(),
            Some("cak-juice-1")
        );

        let two = FixedSlugs(vec!["cak-juice", "cak-juice-1"]);
        assert_eq!(
            generate_slug(&two, EntityKind::User, "Cak Juice").as_deref(),
            Some("cak-juice-2")
        );
    }

    #[test]
    fn test_slug_suffix_is_numeric_not_lexicographic() {
        let source = FixedSlugs(vec!["cak-juice", "cak-juice-9", "cak-juice-10"]);
        assert_eq!(
            generate_slug(&source, EntityKind::User, "Cak Juice").as_deref(),
            Some("cak-juice-11")
        );
    }

    #[test]
    fn test_unrelated_prefix_matches_are_ignored() {
        let source = FixedSlugs(vec!["cak-juicer", "cak-juice-x"]);
        assert_eq!(
            generate_slug(&source, EntityKind::User, "Cak Juice").as_deref(),
            Some("cak-juice")
        );
    }

    #[test]
    fn test_suffix_at_integer_limit() {
        let source = FixedSlugs(vec!["a-18446744073709551615"]);
        assert_eq!(
            generate_slug(&source, EntityKind::User, "A").as_deref(),
            Some("a-1")
        );

        let crowded = FixedSlugs(vec!["a", "a-1", "a-2", "a-18446744073709551615"]);
        assert_eq!(
            generate_slug(&crowded, EntityKind::User, "A").as_deref(),
            Some("a-3")
        );

        // Too long for u64: not part of the sequence
        let overflow = FixedSlugs(vec!["a-99999999999999999999"]);
        assert_eq!(
            generate_slug(&overflow, EntityKind::User, "A").as_deref(),
            Some("a")
        );
    }

    #[test]
    fn test_kind_without_slug() {
        let source = FixedSlugs(vec![]);
        assert!(generate_slug(&source, EntityKind::OutgoingMail, "anything").is_none());
    }
}
