use serde::Serialize;

use crate::location::NearbyLocation;

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum SuccessResponse<'a> {
    Healthz {
        entity: &'a str,
        index: &'a str,
        revision: Option<&'a str>,
        timestamp: Option<&'a str>,
        version: &'a str,
    },
    Locations {
        locations: Vec<NearbyLocation>,
    },
}
