//! Field validators for location documents.
//!
//! The format checks for `url`, `email` and `cover.src` only run on
//! non-empty values; an empty or absent value always passes.

use std::borrow::Cow;

use lazy_static::lazy_static;
use regex::Regex;
use url::{Host, Url};

use crate::errors::ValidationError;
use crate::location::{Coordinates, LocationFields};

const URL_SCHEMES: &[&str] = &["http", "https", "ftp"];
const MAX_URL_LENGTH: usize = 2083;
const MAX_EMAIL_LENGTH: usize = 254;
const MAX_EMAIL_LOCAL_PART_LENGTH: usize = 64;

lazy_static! {
    static ref EMAIL: Regex = Regex::new(
        r"^[A-Za-z0-9!#$%&'*+/=?^_`{|}~-]+(\.[A-Za-z0-9!#$%&'*+/=?^_`{|}~-]+)*@([A-Za-z0-9]([A-Za-z0-9-]{0,61}[A-Za-z0-9])?\.)+([A-Za-z]{2,63}|(?i:xn--)[A-Za-z0-9-]{1,59})$"
    )
    .expect("compile email pattern");
    static ref SCHEME: Regex =
        Regex::new(r"^[A-Za-z][A-Za-z0-9+.-]*://").expect("compile scheme pattern");
    static ref HTTPS_URL: Regex =
        Regex::new(r"^(?i:https)://[^\s./]+\.\S{2,}$").expect("compile https url pattern");
}

/// Validates a complete set of fields, stopping at the first failure.
pub fn validate(fields: &LocationFields) -> Result<(), ValidationError> {
    title(&fields.title)?;
    url(fields.url.as_deref())?;
    email(fields.email.as_deref())?;
    cover_src(fields.cover.as_ref().and_then(|c| c.src.as_deref()))?;
    coordinates(&fields.geometry.location.coordinates)?;

    Ok(())
}

/// The title is required. Uniqueness is left to the store.
pub fn title(value: &str) -> Result<(), ValidationError> {
    if value.is_empty() {
        Err(ValidationError::TitleRequired)
    } else {
        Ok(())
    }
}

pub fn url(value: Option<&str>) -> Result<(), ValidationError> {
    pass_if_empty(value, is_url, ValidationError::InvalidUrl)
}

pub fn email(value: Option<&str>) -> Result<(), ValidationError> {
    pass_if_empty(value, is_email, ValidationError::InvalidEmail)
}

pub fn cover_src(value: Option<&str>) -> Result<(), ValidationError> {
    pass_if_empty(value, is_https_url, ValidationError::InvalidCoverSrc)
}

pub fn coordinates(value: &Coordinates) -> Result<(), ValidationError> {
    if value.is_in_range() {
        Ok(())
    } else {
        Err(ValidationError::InvalidCoordinates)
    }
}

fn pass_if_empty(
    value: Option<&str>,
    check: impl Fn(&str) -> bool,
    error: ValidationError,
) -> Result<(), ValidationError> {
    match value {
        None => Ok(()),
        Some(v) if v.is_empty() => Ok(()),
        Some(v) if check(v) => Ok(()),
        Some(_) => Err(error),
    }
}

/// Checks for an `http`, `https` or `ftp` URL whose host is an IP
/// address or a fully qualified domain name. The scheme may be left out.
///
/// ```
/// use locations::validation::is_url;
/// assert!(is_url("example.com/menu"));
/// assert!(!is_url("not-a-url"));
/// ```
pub fn is_url(value: &str) -> bool {
    if value.len() > MAX_URL_LENGTH || value.chars().any(char::is_whitespace) {
        return false;
    }

    let candidate = if SCHEME.is_match(value) {
        Cow::Borrowed(value)
    } else {
        Cow::Owned(format!("http://{}", value))
    };

    let parsed = match Url::parse(&candidate) {
        Ok(parsed) => parsed,
        Err(_) => return false,
    };

    if !URL_SCHEMES.contains(&parsed.scheme()) {
        return false;
    }

    match parsed.host() {
        Some(Host::Domain(domain)) => is_qualified_domain(domain),
        Some(Host::Ipv4(_)) | Some(Host::Ipv6(_)) => true,
        None => false,
    }
}

fn is_qualified_domain(domain: &str) -> bool {
    let domain = domain.strip_suffix('.').unwrap_or(domain);
    let labels: Vec<&str> = domain.split('.').collect();

    if labels.len() < 2 {
        return false;
    }

    let valid_label = |label: &&str| {
        !label.is_empty()
            && label.len() <= 63
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
    };

    if !labels.iter().all(valid_label) {
        return false;
    }

    // IDNs arrive punycoded, so their TLD starts with "xn--"
    let tld = labels[labels.len() - 1];
    tld.starts_with("xn--") || (tld.len() >= 2 && tld.chars().all(|c| c.is_ascii_alphabetic()))
}

/// ```
/// use locations::validation::is_email;
/// assert!(is_email("hello@example.com"));
/// assert!(!is_email("hello@localhost"));
/// ```
pub fn is_email(value: &str) -> bool {
    if value.len() > MAX_EMAIL_LENGTH {
        return false;
    }

    match value.rfind('@') {
        Some(at) if at <= MAX_EMAIL_LOCAL_PART_LENGTH => EMAIL.is_match(value),
        _ => false,
    }
}

/// ```
/// use locations::validation::is_https_url;
/// assert!(is_https_url("https://example.com/x.png"));
/// assert!(!is_https_url("http://example.com/x.png"));
/// ```
pub fn is_https_url(value: &str) -> bool {
    HTTPS_URL.is_match(value)
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn urls() {
        for valid in &[
            "http://example.com",
            "https://www.example.com/path?query=1#fragment",
            "ftp://files.example.org/pub",
            "example.com",
            "sub.example.co.uk/menu.pdf",
            "http://127.0.0.1:8080/",
            "http://[::1]/",
            "https://xn--caf-dma.xn--p1ai/",
            "example.com/?next=http://elsewhere.example.org",
            "example.com/redirect?to=https://example.org/menu",
        ] {
            assert!(is_url(valid), "{} should be a valid url", valid);
        }

        for invalid in &[
            "not-a-url",
            "http://localhost",
            "mailto:someone",
            "javascript:alert(1)",
            "gopher://example.com",
            "http://exa mple.com",
            "http://example.c",
            "http://-example.com",
            "http://example.123",
            "://example.com",
        ] {
            assert!(!is_url(invalid), "{} should not be a valid url", invalid);
        }
    }

    #[test]
    fn emails() {
        for valid in &[
            "someone@example.com",
            "first.last+tag@mail.example.org",
            "o'brien@example.ie",
            "hello@xn--caf-dma.xn--p1ai",
            "hello@example.XN--P1AI",
        ] {
            assert!(is_email(valid), "{} should be a valid email", valid);
        }

        for invalid in &[
            "someone",
            "someone@",
            "@example.com",
            "some one@example.com",
            "someone@example",
            "first..last@example.com",
            ".someone@example.com",
            "someone@-example.com",
            "someone@example.xn--",
            "someone@example.c0m",
        ] {
            assert!(!is_email(invalid), "{} should not be a valid email", invalid);
        }
    }

    #[test]
    fn long_local_part_is_rejected() {
        let address = format!("{}@example.com", "a".repeat(65));

        assert!(!is_email(&address));
    }

    #[test]
    fn https_urls() {
        assert!(is_https_url("https://example.com/x.png"));
        assert!(is_https_url("HTTPS://images.example.com/covers/1.jpg"));
        assert!(!is_https_url("http://example.com/x.png"));
        assert!(!is_https_url("https://localhost/x.png"));
        assert!(!is_https_url("example.com/x.png"));
        assert!(!is_https_url("https://example.com/x y.png"));
    }

    #[test]
    fn empty_or_absent_values_pass() {
        assert!(url(None).is_ok());
        assert!(url(Some("")).is_ok());
        assert!(email(Some("")).is_ok());
        assert!(cover_src(Some("")).is_ok());
    }

    #[test]
    fn invalid_values_name_their_field() {
        let error = url(Some("not-a-url")).expect_err("reject url");
        assert_eq!(error.field(), Some("url"));
        assert_eq!(error.to_string(), "Please provide a valid url");

        let error = email(Some("nope")).expect_err("reject email");
        assert_eq!(error.field(), Some("email"));
        assert_eq!(error.to_string(), "Please provide a valid email");

        let error = cover_src(Some("http://example.com/x.png")).expect_err("reject cover");
        assert_eq!(error.field(), Some("cover.src"));
        assert_eq!(error.to_string(), "Please provide a valid https url");
    }

    #[test]
    fn empty_title_is_rejected() {
        let error = title("").expect_err("reject title");

        assert_eq!(error.to_string(), "Title is required");
    }

    proptest! {
        #[test]
        fn single_labels_are_never_urls(value in "[a-z][a-z0-9-]{0,39}") {
            prop_assert!(url(Some(&value)).is_err());
        }

        #[test]
        fn validators_accept_what_they_check(value in "\\PC{0,40}") {
            prop_assert_eq!(url(Some(&value)).is_ok(), value.is_empty() || is_url(&value));
            prop_assert_eq!(email(Some(&value)).is_ok(), value.is_empty() || is_email(&value));
            prop_assert_eq!(cover_src(Some(&value)).is_ok(), value.is_empty() || is_https_url(&value));
        }
    }
}
