//! The location schema: the table, its constraints and the spherical
//! index over `geometry.location`.
//!
//! A `LocationSchema` is built once at startup and handed to whatever
//! needs it. Registering it starts the index build in the background
//! and reports the outcome exactly once.

use std::sync::Arc;

use log::{error, info, Logger};
use tokio::task::JoinHandle;

use crate::db::Db;
use crate::errors::IndexBuildError;

/// Every field path a location document may contain.
pub const FIELDS: &[&str] = &[
    "title",
    "slug",
    "permalink",
    "openingDate",
    "url",
    "email",
    "tags",
    "address.streetName",
    "address.streetNumber",
    "address.zip",
    "address.country",
    "address.countryCode",
    "address.region",
    "address.city",
    "address.location.lat",
    "address.location.lng",
    "formatted_address",
    "geometry.location.type",
    "geometry.location.coordinates",
    "kind",
    "cover.width",
    "cover.height",
    "cover.src",
    "featured",
    "updatedAt",
    "createdAt",
];

#[derive(Clone, Debug)]
pub struct LocationSchema {
    /// The entity name used in log messages.
    pub name: &'static str,

    pub table: &'static str,

    /// The storage constraint that keeps titles unique.
    pub title_constraint: &'static str,

    /// The spherical index over `geometry.location`.
    pub geo_index: GeoIndex,
}

impl LocationSchema {
    pub fn new() -> Self {
        LocationSchema {
            name: "Location",
            table: "locations",
            title_constraint: "locations_title",
            geo_index: GeoIndex::sphere(
                "locations_geometry_location",
                "locations",
                "geometry_location",
            ),
        }
    }

    pub fn fields(&self) -> &'static [&'static str] {
        FIELDS
    }
}

impl Default for LocationSchema {
    fn default() -> Self {
        Self::new()
    }
}

/// A 2D-sphere index declaration, supporting nearest-neighbour and
/// within-radius queries.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct GeoIndex {
    pub name: &'static str,
    pub table: &'static str,
    pub column: &'static str,
}

impl GeoIndex {
    pub fn sphere(name: &'static str, table: &'static str, column: &'static str) -> Self {
        GeoIndex {
            name,
            table,
            column,
        }
    }

    /// The DDL that builds the index. Idempotent.
    pub fn create_statement(&self) -> String {
        format!(
            "CREATE INDEX IF NOT EXISTS {} ON {} USING GIST ({})",
            self.name, self.table, self.column
        )
    }
}

/// Starts building the schema's geospatial index and logs the outcome
/// once it's known. Returns immediately.
pub fn register(
    schema: &LocationSchema,
    db: Arc<dyn Db + Send + Sync>,
    logger: Arc<Logger>,
) -> JoinHandle<()> {
    register_with(schema, db, move |result| on_index(&logger, result))
}

/// Starts building the schema's geospatial index on a background task
/// and hands the outcome to `on_complete`.
pub fn register_with<F>(
    schema: &LocationSchema,
    db: Arc<dyn Db + Send + Sync>,
    on_complete: F,
) -> JoinHandle<()>
where
    F: FnOnce(Result<(), IndexBuildError>) + Send + 'static,
{
    let index = schema.geo_index.clone();

    tokio::spawn(async move {
        let result = db
            .build_index(&index)
            .await
            .map_err(|source| IndexBuildError {
                index: index.name.to_string(),
                source,
            });

        on_complete(result);
    })
}

/// Logs the outcome of an index build. Failures are not retried.
pub fn on_index(logger: &Logger, result: Result<(), IndexBuildError>) {
    match result {
        Ok(()) => info!(logger, "Location indexing complete"),
        Err(e) => error!(logger, "Location index error: {}", e.source; "index" => %e.index),
    }
}
