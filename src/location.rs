use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::errors::ValidationError;
use crate::normalization::{self, non_empty};

/// A single location in the database.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Location {
    /// The ID of the location, assigned by the store.
    pub id: Uuid,

    #[serde(flatten)]
    pub fields: LocationFields,
}

impl Location {
    pub fn new(id: Uuid, fields: LocationFields) -> Self {
        Location { id, fields }
    }

    pub fn coordinates(&self) -> Coordinates {
        self.fields.geometry.location.coordinates
    }
}

/// A location together with its distance from the point a geospatial
/// query was made against.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct NearbyLocation {
    #[serde(flatten)]
    pub location: Location,

    /// Great-circle distance in metres.
    pub distance: f64,
}

/// Every stored field of a location, validated and with defaults
/// applied.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationFields {
    /// Normalized and unique among all locations.
    pub title: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub permalink: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(with = "timestamp_option")]
    pub opening_date: Option<OffsetDateTime>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    pub tags: Vec<Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<Address>,

    #[serde(rename = "formatted_address")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub formatted_address: Option<String>,

    pub geometry: Geometry,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub cover: Option<Cover>,

    pub featured: bool,

    #[serde(flatten)]
    pub times: Times,
}

/// The times a location was created and last updated.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Times {
    #[serde(rename = "createdAt", with = "time::serde::timestamp")]
    pub created_at: OffsetDateTime,

    #[serde(rename = "updatedAt", with = "time::serde::timestamp")]
    pub updated_at: OffsetDateTime,
}

/// A postal address. Every part is optional.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct Address {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub street_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub street_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<LatLng>,
}

impl Address {
    fn normalized(self) -> Self {
        Address {
            street_name: non_empty(self.street_name),
            street_number: non_empty(self.street_number),
            zip: non_empty(self.zip),
            country: non_empty(self.country),
            country_code: non_empty(self.country_code),
            region: non_empty(self.region),
            city: non_empty(self.city),
            location: self.location,
        }
    }
}

/// The geocoder's latitude and longitude for an address. Not indexed.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LatLng {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lat: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lng: Option<f64>,
}

/// A cover image.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Cover {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<String>,
    /// Must be an HTTPS URL when present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub src: Option<String>,
}

impl Cover {
    fn normalized(self) -> Self {
        Cover {
            width: non_empty(self.width),
            height: non_empty(self.height),
            src: non_empty(self.src),
        }
    }
}

/// The indexed geometry of a location.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Geometry {
    #[serde(default)]
    pub location: GeoPoint,
}

/// A GeoJSON point.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(deny_unknown_fields)]
pub struct GeoPoint {
    #[serde(rename = "type", default)]
    pub kind: GeoType,

    #[serde(default)]
    pub coordinates: Coordinates,
}

impl GeoPoint {
    pub fn new(coordinates: Coordinates) -> Self {
        GeoPoint {
            kind: GeoType::Point,
            coordinates,
        }
    }
}

/// The only geometry type a location may have.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum GeoType {
    Point,
}

impl Default for GeoType {
    fn default() -> Self {
        GeoType::Point
    }
}

/// A `[longitude, latitude]` pair in degrees, in GeoJSON order.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct Coordinates(pub f64, pub f64);

impl Coordinates {
    pub fn new(longitude: f64, latitude: f64) -> Self {
        Coordinates(longitude, latitude)
    }

    pub fn longitude(&self) -> f64 {
        self.0
    }

    pub fn latitude(&self) -> f64 {
        self.1
    }

    /// Whether the pair can be placed on the sphere.
    pub fn is_in_range(&self) -> bool {
        self.0.is_finite()
            && self.1.is_finite()
            && (-180.0..=180.0).contains(&self.0)
            && (-90.0..=90.0).contains(&self.1)
    }
}

/// A location document as submitted for creation. Unknown fields are
/// rejected at every level.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct NewLocation {
    #[serde(default, deserialize_with = "normalization::deserialize_title")]
    pub title: Option<String>,

    pub slug: Option<String>,

    pub permalink: Option<String>,

    #[serde(default, with = "timestamp_option")]
    pub opening_date: Option<OffsetDateTime>,

    pub url: Option<String>,

    pub email: Option<String>,

    pub tags: Option<Vec<Value>>,

    pub address: Option<Address>,

    #[serde(rename = "formatted_address")]
    pub formatted_address: Option<String>,

    pub geometry: Option<Geometry>,

    pub kind: Option<String>,

    pub cover: Option<Cover>,

    pub featured: Option<bool>,

    #[serde(default, with = "timestamp_option")]
    pub created_at: Option<OffsetDateTime>,

    #[serde(default, with = "timestamp_option")]
    pub updated_at: Option<OffsetDateTime>,
}

impl NewLocation {
    /// Parses a creation document.
    pub fn from_json(document: Value) -> Result<Self, ValidationError> {
        Ok(serde_json::from_value(document)?)
    }

    /// Parses a creation document from raw bytes.
    pub fn from_slice(raw: &[u8]) -> Result<Self, ValidationError> {
        Ok(serde_json::from_slice(raw)?)
    }

    /// Fills in the defaults for everything that wasn't supplied. Does
    /// not validate.
    pub(crate) fn into_fields(self, now: OffsetDateTime) -> LocationFields {
        LocationFields {
            title: self.title.unwrap_or_default(),
            slug: non_empty(self.slug),
            permalink: non_empty(self.permalink),
            opening_date: self.opening_date,
            url: non_empty(self.url),
            email: non_empty(self.email),
            tags: self.tags.unwrap_or_default(),
            address: self.address.map(Address::normalized),
            formatted_address: non_empty(self.formatted_address),
            geometry: self.geometry.unwrap_or_default(),
            kind: non_empty(self.kind),
            cover: self.cover.map(Cover::normalized),
            featured: self.featured.unwrap_or(false),
            times: Times {
                created_at: self.created_at.unwrap_or(now),
                updated_at: self.updated_at.unwrap_or(now),
            },
        }
    }
}

/// The changed subset of a location. Nested objects replace the stored
/// ones as a whole; empty text clears the stored value.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct LocationPatch {
    #[serde(default, deserialize_with = "normalization::deserialize_title")]
    pub title: Option<String>,

    pub slug: Option<String>,

    pub permalink: Option<String>,

    #[serde(default, with = "timestamp_option")]
    pub opening_date: Option<OffsetDateTime>,

    pub url: Option<String>,

    pub email: Option<String>,

    pub tags: Option<Vec<Value>>,

    pub address: Option<Address>,

    #[serde(rename = "formatted_address")]
    pub formatted_address: Option<String>,

    pub geometry: Option<Geometry>,

    pub kind: Option<String>,

    pub cover: Option<Cover>,

    pub featured: Option<bool>,

    #[serde(default, with = "timestamp_option")]
    pub created_at: Option<OffsetDateTime>,

    #[serde(default, with = "timestamp_option")]
    pub updated_at: Option<OffsetDateTime>,
}

impl LocationPatch {
    /// Parses an update document.
    pub fn from_json(document: Value) -> Result<Self, ValidationError> {
        Ok(serde_json::from_value(document)?)
    }

    /// Parses an update document from raw bytes.
    pub fn from_slice(raw: &[u8]) -> Result<Self, ValidationError> {
        Ok(serde_json::from_slice(raw)?)
    }

    /// Writes the supplied fields over `fields`. `updatedAt` becomes
    /// `now` unless the patch sets it. Does not validate.
    pub(crate) fn apply(self, fields: &mut LocationFields, now: OffsetDateTime) {
        fn replace(target: &mut Option<String>, value: Option<String>) {
            if let Some(value) = value {
                *target = non_empty(Some(value));
            }
        }

        if let Some(title) = self.title {
            fields.title = title;
        }

        replace(&mut fields.slug, self.slug);
        replace(&mut fields.permalink, self.permalink);
        replace(&mut fields.url, self.url);
        replace(&mut fields.email, self.email);
        replace(&mut fields.formatted_address, self.formatted_address);
        replace(&mut fields.kind, self.kind);

        if let Some(opening_date) = self.opening_date {
            fields.opening_date = Some(opening_date);
        }

        if let Some(tags) = self.tags {
            fields.tags = tags;
        }

        if let Some(address) = self.address {
            fields.address = Some(address.normalized());
        }

        if let Some(geometry) = self.geometry {
            fields.geometry = geometry;
        }

        if let Some(cover) = self.cover {
            fields.cover = Some(cover.normalized());
        }

        if let Some(featured) = self.featured {
            fields.featured = featured;
        }

        if let Some(created_at) = self.created_at {
            fields.times.created_at = created_at;
        }

        fields.times.updated_at = self.updated_at.unwrap_or(now);
    }
}

/// (De)serializes an optional date and time as a Unix timestamp.
/// Timestamps outside the years -9999 to 9999 are rejected.
mod timestamp_option {
    use serde::{de::Error, Deserialize, Deserializer, Serialize, Serializer};
    use time::OffsetDateTime;

    /// -9999-01-01T00:00:00Z
    const MIN_TIMESTAMP: i64 = -377_705_116_800;

    /// 9999-12-31T23:59:59Z
    const MAX_TIMESTAMP: i64 = 253_402_300_799;

    pub fn serialize<S>(value: &Option<OffsetDateTime>, serializer: S) -> Result<S::Ok, S::Error>
    where S: Serializer {
        value.map(|t| t.unix_timestamp()).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<OffsetDateTime>, D::Error>
    where D: Deserializer<'de> {
        match Option::<i64>::deserialize(deserializer)? {
            None => Ok(None),
            Some(timestamp) if (MIN_TIMESTAMP..=MAX_TIMESTAMP).contains(&timestamp) => {
                Ok(Some(OffsetDateTime::from_unix_timestamp(timestamp)))
            }
            Some(timestamp) => Err(D::Error::custom(format!(
                "timestamp {} is out of range",
                timestamp
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use time::OffsetDateTime;

    use super::*;

    fn now() -> OffsetDateTime {
        OffsetDateTime::from_unix_timestamp(1_600_000_000)
    }

    #[test]
    fn defaults_are_applied() {
        let new = NewLocation::from_json(json!({ "title": "Cafe C" })).expect("parse document");
        let fields = new.into_fields(now());

        assert_eq!(fields.title, "Cafe C");
        assert!(!fields.featured);
        assert_eq!(fields.geometry.location.kind, GeoType::Point);
        assert_eq!(fields.geometry.location.coordinates, Coordinates(0.0, 0.0));
        assert_eq!(fields.times.created_at, now());
        assert_eq!(fields.times.updated_at, now());
        assert!(fields.tags.is_empty());
    }

    #[test]
    fn partial_geometry_gets_default_type() {
        let new = NewLocation::from_json(json!({
            "title": "Somewhere",
            "geometry": { "location": { "coordinates": [2.35, 48.85] } }
        }))
        .expect("parse document");
        let fields = new.into_fields(now());

        assert_eq!(fields.geometry.location.kind, GeoType::Point);
        assert_eq!(fields.geometry.location.coordinates.longitude(), 2.35);
        assert_eq!(fields.geometry.location.coordinates.latitude(), 48.85);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        for document in vec![
            json!({ "title": "Cafe", "foo": "bar" }),
            json!({ "title": "Cafe", "address": { "planet": "Earth" } }),
            json!({ "title": "Cafe", "cover": { "alt": "a cup" } }),
            json!({ "title": "Cafe", "geometry": { "location": { "radius": 3 } } }),
            json!({ "title": "Cafe", "id": "1a5a1b9e-5f54-4a8e-9d57-0a7c3b6c3c54" }),
        ] {
            let result = NewLocation::from_json(document.clone());

            assert!(
                matches!(result, Err(ValidationError::InvalidDocument { .. })),
                "{} was accepted",
                document
            );
        }
    }

    #[test]
    fn unknown_field_is_named_in_message() {
        let error = NewLocation::from_json(json!({ "title": "Cafe", "foo": "bar" }))
            .expect_err("reject unknown field");

        assert!(error.to_string().contains("foo"), "{}", error);
    }

    #[test]
    fn only_points_are_accepted() {
        let result = NewLocation::from_json(json!({
            "title": "Cafe",
            "geometry": { "location": { "type": "Polygon", "coordinates": [0, 0] } }
        }));

        assert!(matches!(result, Err(ValidationError::InvalidDocument { .. })));
    }

    #[test]
    fn coordinates_must_be_a_pair() {
        let result = NewLocation::from_json(json!({
            "title": "Cafe",
            "geometry": { "location": { "coordinates": [1, 2, 3] } }
        }));

        assert!(result.is_err());
    }

    #[test]
    fn far_future_timestamps_are_rejected() {
        for field in &["openingDate", "createdAt", "updatedAt"] {
            let result = NewLocation::from_json(json!({
                "title": "Cafe",
                (*field): 9_000_000_000_000_000_i64
            }));

            assert!(
                matches!(result, Err(ValidationError::InvalidDocument { .. })),
                "{} should be rejected",
                field
            );
        }

        let result = LocationPatch::from_json(json!({ "openingDate": -9_000_000_000_000_000_i64 }));
        assert!(matches!(result, Err(ValidationError::InvalidDocument { .. })));
    }

    #[test]
    fn timestamps_at_the_edges_of_the_calendar() {
        let new = NewLocation::from_json(json!({
            "title": "Cafe",
            "openingDate": 253_402_300_799_i64,
            "createdAt": -377_705_116_800_i64
        }))
        .expect("parse document");

        assert_eq!(new.opening_date.map(|t| t.year()), Some(9999));
        assert_eq!(new.created_at.map(|t| t.year()), Some(-9999));
    }

    #[test]
    fn title_is_normalized_on_parse() {
        let new = NewLocation::from_json(json!({ "title": "  Cafe A \n" })).expect("parse document");

        assert_eq!(new.title.as_deref(), Some("Cafe A"));
    }

    #[test]
    fn empty_text_is_stored_as_absent() {
        let new = NewLocation::from_json(json!({
            "title": "Cafe",
            "url": "",
            "email": "",
            "cover": { "src": "", "width": "640" }
        }))
        .expect("parse document");
        let fields = new.into_fields(now());

        assert_eq!(fields.url, None);
        assert_eq!(fields.email, None);
        assert_eq!(
            fields.cover,
            Some(Cover {
                width: Some("640".to_string()),
                height: None,
                src: None,
            })
        );
    }

    #[test]
    fn serialized_names_match_documents() {
        let new = NewLocation::from_json(json!({
            "title": "Cafe",
            "formatted_address": "1 Rue de Rivoli, Paris",
            "openingDate": 1_500_000_000,
            "address": { "streetName": "Rue de Rivoli", "countryCode": "FR" }
        }))
        .expect("parse document");
        let location = Location::new(Uuid::nil(), new.into_fields(now()));

        let value = serde_json::to_value(&location).expect("serialize location");

        assert_eq!(value["formatted_address"], "1 Rue de Rivoli, Paris");
        assert_eq!(value["openingDate"], 1_500_000_000);
        assert_eq!(value["address"]["streetName"], "Rue de Rivoli");
        assert_eq!(value["address"]["countryCode"], "FR");
        assert_eq!(value["geometry"]["location"]["type"], "Point");
        assert_eq!(value["geometry"]["location"]["coordinates"], json!([0.0, 0.0]));
        assert_eq!(value["createdAt"], 1_600_000_000);
        assert_eq!(value["updatedAt"], 1_600_000_000);
        assert_eq!(value["featured"], false);
        assert!(value.get("url").is_none());
    }

    #[test]
    fn patch_replaces_and_clears() {
        let mut fields = NewLocation::from_json(json!({
            "title": "Cafe",
            "url": "https://example.com",
            "kind": "cafe",
            "featured": true
        }))
        .expect("parse document")
        .into_fields(now());

        let later = OffsetDateTime::from_unix_timestamp(1_700_000_000);
        let patch = LocationPatch::from_json(json!({ "url": "", "kind": "bar" })).expect("parse patch");
        patch.apply(&mut fields, later);

        assert_eq!(fields.url, None);
        assert_eq!(fields.kind.as_deref(), Some("bar"));
        assert!(fields.featured);
        assert_eq!(fields.times.created_at, now());
        assert_eq!(fields.times.updated_at, later);
    }

    #[test]
    fn patch_rejects_unknown_fields() {
        let result = LocationPatch::from_json(json!({ "foo": "bar" }));

        assert!(matches!(result, Err(ValidationError::InvalidDocument { .. })));
    }

    #[test]
    fn coordinate_ranges() {
        assert!(Coordinates::new(-180.0, 90.0).is_in_range());
        assert!(Coordinates::new(180.0, -90.0).is_in_range());
        assert!(!Coordinates::new(180.5, 0.0).is_in_range());
        assert!(!Coordinates::new(0.0, -90.5).is_in_range());
        assert!(!Coordinates::new(f64::NAN, 0.0).is_in_range());
    }
}
