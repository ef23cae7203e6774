use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use futures::future::{self, BoxFuture, FutureExt};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::errors::{BackendError, ValidationError};
use crate::location::{Coordinates, Location, LocationFields, LocationPatch, NearbyLocation};
use crate::schema::GeoIndex;

/// Mean radius of the Earth in metres, as used for spherical distances.
pub const EARTH_RADIUS: f64 = 6_371_008.8;

/// Keeps locations in memory. Titles are unique under a single write
/// lock, so of two concurrent inserts with the same title exactly one
/// wins. Geospatial queries scan every location.
#[derive(Default)]
pub struct MemoryDb {
    locations: RwLock<Vec<Location>>,
    index_failure: Option<String>,
}

impl MemoryDb {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store whose index build always fails with `reason`.
    pub fn with_failing_index(reason: impl Into<String>) -> Self {
        MemoryDb {
            index_failure: Some(reason.into()),
            ..Default::default()
        }
    }

    pub fn len(&self) -> Result<usize, BackendError> {
        Ok(self.read()?.len())
    }

    pub fn is_empty(&self) -> Result<bool, BackendError> {
        Ok(self.len()? == 0)
    }

    fn read(&self) -> Result<RwLockReadGuard<Vec<Location>>, BackendError> {
        self.locations.read().map_err(|_| poisoned())
    }

    fn write(&self) -> Result<RwLockWriteGuard<Vec<Location>>, BackendError> {
        self.locations.write().map_err(|_| poisoned())
    }

    fn insert_now(&self, fields: LocationFields) -> Result<Location, BackendError> {
        let mut locations = self.write()?;

        if locations.iter().any(|l| l.fields.title == fields.title) {
            return Err(ValidationError::TitleAlreadyExists.into());
        }

        let location = Location::new(Uuid::new_v4(), fields);
        locations.push(location.clone());

        Ok(location)
    }

    fn update_now(
        &self,
        id: Uuid,
        patch: LocationPatch,
        now: OffsetDateTime,
    ) -> Result<Location, BackendError> {
        let mut locations = self.write()?;

        let position = locations
            .iter()
            .position(|l| l.id == id)
            .ok_or(BackendError::NonExistentId(id))?;

        let mut fields = locations[position].fields.clone();
        patch.apply(&mut fields, now);

        if locations
            .iter()
            .any(|l| l.id != id && l.fields.title == fields.title)
        {
            return Err(ValidationError::TitleAlreadyExists.into());
        }

        locations[position].fields = fields;

        Ok(locations[position].clone())
    }

    fn delete_now(&self, id: Uuid) -> Result<(), BackendError> {
        let mut locations = self.write()?;
        let before = locations.len();

        locations.retain(|l| l.id != id);

        if locations.len() == before {
            Err(BackendError::NonExistentId(id))
        } else {
            Ok(())
        }
    }

    fn by_distance(
        &self,
        point: &Coordinates,
        keep: impl Fn(f64) -> bool,
    ) -> Result<Vec<NearbyLocation>, BackendError> {
        let locations = self.read()?;

        let mut results: Vec<NearbyLocation> = locations
            .iter()
            .map(|location| NearbyLocation {
                distance: great_circle_distance(point, &location.coordinates()),
                location: location.clone(),
            })
            .filter(|nearby| keep(nearby.distance))
            .collect();

        results.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        Ok(results)
    }
}

impl super::Db for MemoryDb {
    fn build_index(&self, _index: &GeoIndex) -> BoxFuture<Result<(), BackendError>> {
        let result = match &self.index_failure {
            Some(reason) => Err(BackendError::Storage {
                message: reason.clone(),
            }),
            None => Ok(()),
        };

        future::ready(result).boxed()
    }

    fn delete(&self, id: &Uuid) -> BoxFuture<Result<(), BackendError>> {
        future::ready(self.delete_now(*id)).boxed()
    }

    fn insert(&self, fields: LocationFields) -> BoxFuture<Result<Location, BackendError>> {
        future::ready(self.insert_now(fields)).boxed()
    }

    fn nearest(
        &self,
        point: &Coordinates,
        limit: u32,
    ) -> BoxFuture<Result<Vec<NearbyLocation>, BackendError>> {
        let result = self.by_distance(point, |_| true).map(|mut results| {
            results.truncate(limit as usize);
            results
        });

        future::ready(result).boxed()
    }

    fn retrieve(&self, id: &Uuid) -> BoxFuture<Result<Option<Location>, BackendError>> {
        let result = self
            .read()
            .map(|locations| locations.iter().find(|l| l.id == *id).cloned());

        future::ready(result).boxed()
    }

    fn update(
        &self,
        id: &Uuid,
        patch: LocationPatch,
        now: OffsetDateTime,
    ) -> BoxFuture<Result<Location, BackendError>> {
        future::ready(self.update_now(*id, patch, now)).boxed()
    }

    fn within(
        &self,
        point: &Coordinates,
        radius: f64,
    ) -> BoxFuture<Result<Vec<NearbyLocation>, BackendError>> {
        future::ready(self.by_distance(point, |distance| distance <= radius)).boxed()
    }
}

/// Haversine distance in metres between two points on a sphere the size
/// of the Earth.
pub fn great_circle_distance(a: &Coordinates, b: &Coordinates) -> f64 {
    let (lat_a, lat_b) = (a.latitude().to_radians(), b.latitude().to_radians());
    let delta_lat = lat_b - lat_a;
    let delta_lng = (b.longitude() - a.longitude()).to_radians();

    let h = (delta_lat / 2.0).sin().powi(2)
        + lat_a.cos() * lat_b.cos() * (delta_lng / 2.0).sin().powi(2);

    2.0 * EARTH_RADIUS * h.sqrt().min(1.0).asin()
}

fn poisoned() -> BackendError {
    BackendError::Storage {
        message: String::from("in-memory store lock poisoned"),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use time::OffsetDateTime;

    use super::*;
    use crate::db::Db;
    use crate::location::{GeoPoint, Geometry, NewLocation};

    fn fields(title: &str, longitude: f64, latitude: f64) -> LocationFields {
        let mut fields = NewLocation::from_json(json!({ "title": title }))
            .expect("parse document")
            .into_fields(OffsetDateTime::from_unix_timestamp(0));
        fields.geometry = Geometry {
            location: GeoPoint::new(Coordinates::new(longitude, latitude)),
        };
        fields
    }

    #[test]
    fn distances() {
        let paris = Coordinates::new(2.3522, 48.8566);
        let london = Coordinates::new(-0.1278, 51.5074);

        let distance = great_circle_distance(&paris, &london);

        assert!((distance - 343_500.0).abs() < 1_500.0, "{}", distance);
        assert_eq!(great_circle_distance(&paris, &paris), 0.0);
    }

    #[test]
    fn antipodes_are_half_the_circumference_apart() {
        let distance =
            great_circle_distance(&Coordinates::new(0.0, 0.0), &Coordinates::new(180.0, 0.0));

        assert!((distance - std::f64::consts::PI * EARTH_RADIUS).abs() < 1.0);
    }

    #[test]
    fn poisoned_lock_is_reported() {
        let db = std::sync::Arc::new(MemoryDb::new());
        let poisoner = db.clone();

        let _ = std::thread::spawn(move || {
            let _guard = poisoner.locations.write().unwrap();
            panic!("poison the lock");
        })
        .join();

        assert!(matches!(db.len(), Err(BackendError::Storage { .. })));
        assert!(db.is_empty().is_err());
    }

    #[tokio::test]
    async fn duplicate_titles_are_rejected() {
        let db = MemoryDb::new();

        db.insert(fields("Cafe", 0.0, 0.0)).await.expect("insert first");
        let result = db.insert(fields("Cafe", 1.0, 1.0)).await;

        assert!(matches!(
            result,
            Err(BackendError::Validation(ValidationError::TitleAlreadyExists))
        ));
        assert_eq!(db.len().expect("count locations"), 1);
    }

    fn patch(document: serde_json::Value) -> LocationPatch {
        LocationPatch::from_json(document).expect("parse patch")
    }

    fn later() -> OffsetDateTime {
        OffsetDateTime::from_unix_timestamp(1_000)
    }

    #[tokio::test]
    async fn updating_keeps_own_title() {
        let db = MemoryDb::new();
        let location = db.insert(fields("Cafe", 0.0, 0.0)).await.expect("insert");

        let updated = db
            .update(&location.id, patch(json!({ "title": "Cafe", "featured": true })), later())
            .await
            .expect("update");

        assert!(updated.fields.featured);
        assert_eq!(updated.fields.times.updated_at, later());
    }

    #[tokio::test]
    async fn patches_to_different_fields_both_survive() {
        let db = MemoryDb::new();
        let location = db.insert(fields("Cafe", 0.0, 0.0)).await.expect("insert");

        let featuring = db.update(&location.id, patch(json!({ "featured": true })), later());
        let rekinding = db.update(&location.id, patch(json!({ "kind": "bar" })), later());
        let (featured, rekinded) = futures::join!(featuring, rekinding);
        featured.expect("feature location");
        rekinded.expect("change kind");

        let stored = db
            .retrieve(&location.id)
            .await
            .expect("retrieve")
            .expect("location exists");

        assert!(stored.fields.featured);
        assert_eq!(stored.fields.kind.as_deref(), Some("bar"));
    }

    #[tokio::test]
    async fn update_cannot_take_another_title() {
        let db = MemoryDb::new();
        db.insert(fields("Cafe A", 0.0, 0.0)).await.expect("insert");
        let second = db.insert(fields("Cafe B", 0.0, 0.0)).await.expect("insert");

        let result = db
            .update(&second.id, patch(json!({ "title": "Cafe A", "kind": "bar" })), later())
            .await;

        assert!(matches!(
            result,
            Err(BackendError::Validation(ValidationError::TitleAlreadyExists))
        ));

        let stored = db.retrieve(&second.id).await.expect("retrieve").expect("location exists");
        assert_eq!(stored.fields.title, "Cafe B");
        assert_eq!(stored.fields.kind, None);
    }

    #[tokio::test]
    async fn unknown_ids() {
        let db = MemoryDb::new();
        let id = Uuid::new_v4();

        assert!(matches!(db.delete(&id).await, Err(BackendError::NonExistentId(_))));
        assert!(matches!(
            db.update(&id, LocationPatch::default(), later()).await,
            Err(BackendError::NonExistentId(_))
        ));
        assert_eq!(db.retrieve(&id).await.expect("retrieve"), None);
    }

    #[tokio::test]
    async fn nearest_orders_by_distance() {
        let db = MemoryDb::new();
        db.insert(fields("Far", 10.0, 10.0)).await.expect("insert");
        db.insert(fields("Near", 0.1, 0.1)).await.expect("insert");
        db.insert(fields("Middle", 1.0, 1.0)).await.expect("insert");

        let results = db
            .nearest(&Coordinates::new(0.0, 0.0), 2)
            .await
            .expect("query nearest");

        let titles: Vec<&str> = results
            .iter()
            .map(|r| r.location.fields.title.as_str())
            .collect();
        assert_eq!(titles, vec!["Near", "Middle"]);
        assert!(results[0].distance < results[1].distance);
    }

    #[tokio::test]
    async fn within_filters_by_radius() {
        let db = MemoryDb::new();
        db.insert(fields("Far", 10.0, 10.0)).await.expect("insert");
        db.insert(fields("Near", 0.1, 0.1)).await.expect("insert");

        let results = db
            .within(&Coordinates::new(0.0, 0.0), 50_000.0)
            .await
            .expect("query within");

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].location.fields.title, "Near");
    }

    #[tokio::test]
    async fn failing_index() {
        let db = MemoryDb::with_failing_index("no spatial support");
        let index = GeoIndex::sphere("locations_geometry_location", "locations", "geometry_location");

        let result = db.build_index(&index).await;

        assert!(matches!(result, Err(BackendError::Storage { .. })));
    }
}
