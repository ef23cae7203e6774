use serde::{Deserialize, Deserializer};

/// Normalizes a title by stripping any surrounding whitespace and
/// composing it into Unicode Normalization Form C, so that titles that
/// look the same compare equal.
///
/// ```
/// use locations::normalization::normalize_title;
/// assert_eq!(normalize_title(" Cafe\u{301} "), "Caf\u{e9}");
/// ```
pub fn normalize_title(title: impl AsRef<str>) -> String {
    use unicode_normalization::UnicodeNormalization;

    title.as_ref().trim().nfc().to_string()
}

/// Maps the empty string to `None`. Optional text that was supplied
/// empty is stored as absent.
pub fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.is_empty())
}

/// Deserializes an optional `String` after running it through
/// `normalize_title`.
pub fn deserialize_title<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where D: Deserializer<'de> {
    let o: Option<String> = Deserialize::deserialize(deserializer)?;
    Ok(o.map(normalize_title))
}
