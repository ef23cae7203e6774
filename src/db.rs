use futures::future::BoxFuture;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::errors::BackendError;
use crate::location::{Coordinates, Location, LocationFields, LocationPatch, NearbyLocation};
use crate::schema::GeoIndex;

pub mod memory;

/// The storage collaborator. Implementations own uniqueness of titles,
/// write serialization and geospatial query execution; callers validate
/// before writing.
pub trait Db {
    /// Builds the given spherical index if it doesn't already exist.
    fn build_index(&self, index: &GeoIndex) -> BoxFuture<Result<(), BackendError>>;

    fn delete(&self, id: &Uuid) -> BoxFuture<Result<(), BackendError>>;

    fn insert(&self, fields: LocationFields) -> BoxFuture<Result<Location, BackendError>>;

    /// Returns up to `limit` locations ordered by distance from `point`.
    fn nearest(
        &self,
        point: &Coordinates,
        limit: u32,
    ) -> BoxFuture<Result<Vec<NearbyLocation>, BackendError>>;

    fn retrieve(&self, id: &Uuid) -> BoxFuture<Result<Option<Location>, BackendError>>;

    /// Applies `patch` to an existing location. Reading the stored fields
    /// and writing the merged ones must be atomic, so concurrent patches
    /// to different fields all survive.
    fn update(
        &self,
        id: &Uuid,
        patch: LocationPatch,
        now: OffsetDateTime,
    ) -> BoxFuture<Result<Location, BackendError>>;

    /// Returns every location within `radius` metres of `point`, nearest
    /// first.
    fn within(
        &self,
        point: &Coordinates,
        radius: f64,
    ) -> BoxFuture<Result<Vec<NearbyLocation>, BackendError>>;
}

pub use self::postgres::*;

mod postgres {
    use std::sync::Arc;

    use futures::future::BoxFuture;
    use futures::FutureExt;
    use serde_json::Value;
    use sqlx::{
        self,
        postgres::{PgPool, PgRow},
        types::Json,
    };
    use time::OffsetDateTime;
    use uuid::Uuid;

    use crate::errors::{BackendError, ValidationError};
    use crate::location::{
        Address, Coordinates, Cover, GeoPoint, Geometry, Location, LocationFields,
        LocationPatch, NearbyLocation, Times,
    };
    use crate::schema::{GeoIndex, LocationSchema};

    /// Stores locations in PostgreSQL, with the geometry in a PostGIS
    /// `geography` column.
    pub struct PgDb {
        pool: PgPool,
        schema: Arc<LocationSchema>,
    }

    impl PgDb {
        pub fn new(pool: PgPool, schema: Arc<LocationSchema>) -> Self {
            PgDb { pool, schema }
        }

        fn map_sqlx_error(&self, error: sqlx::Error) -> BackendError {
            use sqlx::Error;

            match error {
                Error::Database(ref e) if e.constraint() == Some(self.schema.title_constraint) => {
                    ValidationError::TitleAlreadyExists.into()
                }
                _ => BackendError::Sqlx { source: error },
            }
        }
    }

    // these can be simplified once async functions in traits are stabilized
    impl super::Db for PgDb {
        fn build_index(&self, index: &GeoIndex) -> BoxFuture<Result<(), BackendError>> {
            let statement = index.create_statement();

            async move {
                sqlx::query(&statement)
                    .execute(&self.pool)
                    .await
                    .map_err(|e| self.map_sqlx_error(e))?;

                Ok(())
            }
            .boxed()
        }

        fn delete(&self, id: &Uuid) -> BoxFuture<Result<(), BackendError>> {
            let id = *id;

            async move {
                let query = sqlx::query(include_str!("queries/delete.sql"));

                let count = query
                    .bind(id)
                    .execute(&self.pool)
                    .await
                    .map_err(|e| self.map_sqlx_error(e))?
                    .rows_affected();

                if count == 0 {
                    Err(BackendError::NonExistentId(id))
                } else {
                    Ok(())
                }
            }
            .boxed()
        }

        fn insert(&self, fields: LocationFields) -> BoxFuture<Result<Location, BackendError>> {
            async move {
                let query = sqlx::query_as(include_str!("queries/create.sql"));
                let coordinates = fields.geometry.location.coordinates;

                let (id,): (Uuid,) = query
                    .bind(&fields.title)
                    .bind(&fields.slug)
                    .bind(&fields.permalink)
                    .bind(fields.opening_date)
                    .bind(&fields.url)
                    .bind(&fields.email)
                    .bind(Json(&fields.tags))
                    .bind(fields.address.as_ref().map(Json))
                    .bind(&fields.formatted_address)
                    .bind(coordinates.longitude())
                    .bind(coordinates.latitude())
                    .bind(&fields.kind)
                    .bind(fields.cover.as_ref().map(Json))
                    .bind(fields.featured)
                    .bind(fields.times.created_at)
                    .bind(fields.times.updated_at)
                    .fetch_one(&self.pool)
                    .await
                    .map_err(|e| self.map_sqlx_error(e))?;

                Ok(Location::new(id, fields))
            }
            .boxed()
        }

        fn nearest(
            &self,
            point: &Coordinates,
            limit: u32,
        ) -> BoxFuture<Result<Vec<NearbyLocation>, BackendError>> {
            let point = *point;

            async move {
                let query = sqlx::query(include_str!("queries/retrieve_nearest.sql"));

                let results = query
                    .bind(point.longitude())
                    .bind(point.latitude())
                    .bind(i64::from(limit))
                    .try_map(|row: PgRow| new_nearby_location(&row))
                    .fetch_all(&self.pool)
                    .await
                    .map_err(|e| self.map_sqlx_error(e))?;

                Ok(results)
            }
            .boxed()
        }

        fn retrieve(&self, id: &Uuid) -> BoxFuture<Result<Option<Location>, BackendError>> {
            let id = *id;

            async move {
                let query = sqlx::query(include_str!("queries/retrieve.sql"));

                let location: Option<Location> = query
                    .bind(id)
                    .try_map(|row: PgRow| new_location(&row))
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(|e| self.map_sqlx_error(e))?;

                Ok(location)
            }
            .boxed()
        }

        fn update(
            &self,
            id: &Uuid,
            patch: LocationPatch,
            now: OffsetDateTime,
        ) -> BoxFuture<Result<Location, BackendError>> {
            let id = *id;

            async move {
                let mut transaction = self
                    .pool
                    .begin()
                    .await
                    .map_err(|e| self.map_sqlx_error(e))?;

                // the row stays locked until the transaction ends
                let existing: Option<Location> =
                    sqlx::query(include_str!("queries/retrieve_for_update.sql"))
                        .bind(id)
                        .try_map(|row: PgRow| new_location(&row))
                        .fetch_optional(&mut transaction)
                        .await
                        .map_err(|e| self.map_sqlx_error(e))?;

                let mut fields = existing.ok_or(BackendError::NonExistentId(id))?.fields;
                patch.apply(&mut fields, now);

                let query = sqlx::query(include_str!("queries/update.sql"));
                let coordinates = fields.geometry.location.coordinates;

                query
                    .bind(id)
                    .bind(&fields.title)
                    .bind(&fields.slug)
                    .bind(&fields.permalink)
                    .bind(fields.opening_date)
                    .bind(&fields.url)
                    .bind(&fields.email)
                    .bind(Json(&fields.tags))
                    .bind(fields.address.as_ref().map(Json))
                    .bind(&fields.formatted_address)
                    .bind(coordinates.longitude())
                    .bind(coordinates.latitude())
                    .bind(&fields.kind)
                    .bind(fields.cover.as_ref().map(Json))
                    .bind(fields.featured)
                    .bind(fields.times.created_at)
                    .bind(fields.times.updated_at)
                    .execute(&mut transaction)
                    .await
                    .map_err(|e| self.map_sqlx_error(e))?;

                transaction
                    .commit()
                    .await
                    .map_err(|e| self.map_sqlx_error(e))?;

                Ok(Location::new(id, fields))
            }
            .boxed()
        }

        fn within(
            &self,
            point: &Coordinates,
            radius: f64,
        ) -> BoxFuture<Result<Vec<NearbyLocation>, BackendError>> {
            let point = *point;

            async move {
                let query = sqlx::query(include_str!("queries/retrieve_within.sql"));

                let results = query
                    .bind(point.longitude())
                    .bind(point.latitude())
                    .bind(radius)
                    .try_map(|row: PgRow| new_nearby_location(&row))
                    .fetch_all(&self.pool)
                    .await
                    .map_err(|e| self.map_sqlx_error(e))?;

                Ok(results)
            }
            .boxed()
        }
    }

    fn new_location(row: &PgRow) -> Result<Location, sqlx::Error> {
        let id: Uuid = try_get(row, "id")?;
        let Json(tags): Json<Vec<Value>> = try_get(row, "tags")?;
        let address: Option<Json<Address>> = try_get(row, "address")?;
        let cover: Option<Json<Cover>> = try_get(row, "cover")?;
        let coordinates = Coordinates::new(try_get(row, "longitude")?, try_get(row, "latitude")?);

        let fields = LocationFields {
            title: try_get(row, "title")?,
            slug: try_get(row, "slug")?,
            permalink: try_get(row, "permalink")?,
            opening_date: try_get(row, "opening_date")?,
            url: try_get(row, "url")?,
            email: try_get(row, "email")?,
            tags,
            address: address.map(|Json(address)| address),
            formatted_address: try_get(row, "formatted_address")?,
            geometry: Geometry {
                location: GeoPoint::new(coordinates),
            },
            kind: try_get(row, "kind")?,
            cover: cover.map(|Json(cover)| cover),
            featured: try_get(row, "featured")?,
            times: Times {
                created_at: try_get(row, "created_at")?,
                updated_at: try_get(row, "updated_at")?,
            },
        };

        Ok(Location::new(id, fields))
    }

    fn new_nearby_location(row: &PgRow) -> Result<NearbyLocation, sqlx::Error> {
        Ok(NearbyLocation {
            location: new_location(row)?,
            distance: try_get(row, "distance")?,
        })
    }

    fn try_get<'a, T: sqlx::Type<sqlx::Postgres> + sqlx::decode::Decode<'a, sqlx::Postgres>>(
        row: &'a PgRow,
        column: &str,
    ) -> Result<T, sqlx::Error> {
        use sqlx::prelude::*;

        row.try_get(column)
    }
}
