use std::sync::Arc;

use log::Logger;

use crate::locations::Locations;
use crate::urls::Urls;

/// The number of results a nearest-neighbour query returns when the
/// caller doesn't ask for fewer.
pub const DEFAULT_NEAR_LIMIT: u32 = 20;

#[derive(Clone)]
pub struct Environment {
    pub logger: Arc<Logger>,
    pub locations: Locations,
    pub urls: Arc<Urls>,
    pub config: Config,
}

impl Environment {
    pub fn new(logger: Arc<Logger>, locations: Locations, urls: Arc<Urls>, config: Config) -> Self {
        Self {
            logger,
            locations,
            urls,
            config,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct Config {
    /// The most results a nearest-neighbour query may return.
    pub(crate) near_limit: u32,
}

impl Config {
    pub fn new(near_limit: u32) -> Self {
        Self { near_limit }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(DEFAULT_NEAR_LIMIT)
    }
}
