use std::sync::Arc;

use log::{debug, o, Logger};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::db::Db;
use crate::errors::BackendError;
use crate::location::{Coordinates, Location, LocationPatch, NearbyLocation, NewLocation};
use crate::schema::LocationSchema;
use crate::validation;

/// The entry point for the rest of the application: validates every
/// write against the schema, then hands it to the store.
#[derive(Clone)]
pub struct Locations {
    schema: Arc<LocationSchema>,
    db: Arc<dyn Db + Send + Sync>,
    logger: Arc<Logger>,
}

impl Locations {
    pub fn new(
        schema: Arc<LocationSchema>,
        db: Arc<dyn Db + Send + Sync>,
        logger: Arc<Logger>,
    ) -> Self {
        let logger = Arc::new(logger.new(o!("entity" => schema.name)));

        Locations { schema, db, logger }
    }

    pub fn schema(&self) -> &LocationSchema {
        &self.schema
    }

    /// Validates `new`, fills in the defaults and stores it.
    pub async fn create(&self, new: NewLocation) -> Result<Location, BackendError> {
        let fields = new.into_fields(OffsetDateTime::now_utc());
        validation::validate(&fields)?;

        debug!(self.logger, "Creating location..."; "title" => &fields.title);
        let location = self.db.insert(fields).await?;
        debug!(self.logger, "Created location"; "id" => %location.id);

        Ok(location)
    }

    pub async fn retrieve(&self, id: &Uuid) -> Result<Option<Location>, BackendError> {
        self.db.retrieve(id).await
    }

    /// Validates the changed fields and has the store merge them into the
    /// stored location.
    pub async fn update(&self, id: &Uuid, patch: LocationPatch) -> Result<Location, BackendError> {
        validate_patch(&patch)?;

        debug!(self.logger, "Updating location..."; "id" => %id);
        self.db.update(id, patch, OffsetDateTime::now_utc()).await
    }

    pub async fn delete(&self, id: &Uuid) -> Result<(), BackendError> {
        debug!(self.logger, "Deleting location..."; "id" => %id);
        self.db.delete(id).await
    }

    /// Returns up to `limit` locations nearest to `point`.
    pub async fn nearest(
        &self,
        point: Coordinates,
        limit: u32,
    ) -> Result<Vec<NearbyLocation>, BackendError> {
        validation::coordinates(&point)?;

        if limit == 0 {
            return Err(BackendError::InvalidQuery {
                reason: "limit must be positive",
            });
        }

        self.db.nearest(&point, limit).await
    }

    /// Returns every location within `radius` metres of `point`.
    pub async fn within(
        &self,
        point: Coordinates,
        radius: f64,
    ) -> Result<Vec<NearbyLocation>, BackendError> {
        validation::coordinates(&point)?;

        if !radius.is_finite() || radius < 0.0 {
            return Err(BackendError::InvalidQuery {
                reason: "radius must be a non-negative number of metres",
            });
        }

        self.db.within(&point, radius).await
    }
}

fn validate_patch(patch: &LocationPatch) -> Result<(), BackendError> {
    if let Some(title) = &patch.title {
        validation::title(title)?;
    }

    validation::url(patch.url.as_deref())?;
    validation::email(patch.email.as_deref())?;
    validation::cover_src(patch.cover.as_ref().and_then(|c| c.src.as_deref()))?;

    if let Some(geometry) = &patch.geometry {
        validation::coordinates(&geometry.location.coordinates)?;
    }

    Ok(())
}
