use url::Url;
use uuid::Uuid;

/// Convenience wrapper for URL generation functions.
#[derive(Clone)]
pub struct Urls {
    /// Top-level URL, including trailing slash.
    base: Url,

    /// Path for all locations-related actions.
    pub(crate) locations_path: String,

    /// Prefix for all locations-related actions.
    locations_prefix: String,
}

impl Urls {
    /// Create a new instance. `locations_prefix` should *not* include a
    /// trailing slash. Panics if `base` isn't a URL.
    pub fn new(base: impl AsRef<str>, locations_prefix: impl Into<String>) -> Self {
        let base =
            Url::parse(base.as_ref()).unwrap_or_else(|_| panic!("parse {} as URL", base.as_ref()));
        let locations_path = locations_prefix.into();
        let locations_prefix = format!("{}/", locations_path);

        Urls {
            base,
            locations_path,
            locations_prefix,
        }
    }

    pub fn locations(&self) -> Url {
        self.base
            .join(&self.locations_prefix)
            .expect("get locations URL")
    }

    pub fn location(&self, id: &Uuid) -> Url {
        let id = format!("id/{}", id);
        self.locations()
            .join(&id)
            .unwrap_or_else(|_| panic!("get URL for location {}", id))
    }
}
