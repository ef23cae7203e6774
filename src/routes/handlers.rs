use std::time::{Duration, Instant};

use bytes::Bytes;
use log::debug;
use uuid::Uuid;
use warp::{
    http::StatusCode,
    reject,
    reply::{json, with_header, with_status, Reply},
};

use crate::environment::Environment;
use crate::errors::BackendError;
use crate::location::{Coordinates, LocationPatch, NewLocation};
use crate::routes::{
    query::{NearQuery, WithinQuery},
    rejection::{Context, Rejection},
    response::SuccessResponse,
};

const SERVER_TIMING_HEADER: &str = "server-timing";
type RouteResult = Result<Box<dyn Reply>, reject::Rejection>;

macro_rules! timed {
    ($($expression:stmt);+) => {
        let start = Instant::now();

        let result = { $($expression)+ };

        Ok(Box::new(with_header(
            result,
            SERVER_TIMING_HEADER,
            format_server_timing(start.elapsed()),
        )) as Box<dyn Reply>)
    };
}

pub async fn create(environment: Environment, content: Bytes) -> RouteResult {
    timed! {
        let error_handler = |e: BackendError| reject::custom(Rejection::new(Context::create(), e));

        debug!(environment.logger, "Parsing location...");
        let new = NewLocation::from_slice(&content).map_err(|e| error_handler(e.into()))?;

        let location = environment
            .locations
            .create(new)
            .await
            .map_err(error_handler)?;

        with_header(
            with_status(json(&location), StatusCode::CREATED),
            "location",
            environment.urls.location(&location.id).as_str(),
        )
    }
}

pub async fn retrieve(environment: Environment, id: String) -> RouteResult {
    timed! {
        let error_handler = |e: BackendError| reject::custom(Rejection::new(Context::retrieve(id.clone()), e));

        let id = parse_id(&id).map_err(error_handler)?;
        debug!(environment.logger, "Retrieving location..."; "id" => %id);

        let option = environment
            .locations
            .retrieve(&id)
            .await
            .map_err(error_handler)?;

        match option {
            Some(location) => with_status(json(&location), StatusCode::OK),
            None => with_status(json(&()), StatusCode::NOT_FOUND),
        }
    }
}

pub async fn update(environment: Environment, id: String, content: Bytes) -> RouteResult {
    timed! {
        let error_handler = |e: BackendError| reject::custom(Rejection::new(Context::update(id.clone()), e));

        let id = parse_id(&id).map_err(error_handler)?;
        let patch = LocationPatch::from_slice(&content).map_err(|e| error_handler(e.into()))?;

        let location = environment
            .locations
            .update(&id, patch)
            .await
            .map_err(error_handler)?;

        with_status(json(&location), StatusCode::OK)
    }
}

pub async fn delete(environment: Environment, id: String) -> RouteResult {
    timed! {
        let error_handler = |e: BackendError| reject::custom(Rejection::new(Context::delete(id.clone()), e));

        let id = parse_id(&id).map_err(error_handler)?;

        environment
            .locations
            .delete(&id)
            .await
            .map_err(error_handler)?;

        StatusCode::NO_CONTENT
    }
}

pub async fn near(environment: Environment, query: NearQuery) -> RouteResult {
    timed! {
        let NearQuery { lng, lat, limit } = query;
        let error_handler = |e: BackendError| reject::custom(Rejection::new(Context::near(lng, lat), e));

        // callers may ask for fewer results than the configured maximum, never more
        let maximum = environment.config.near_limit;
        let limit = limit.map_or(maximum, |limit| limit.min(maximum));

        let locations = environment
            .locations
            .nearest(Coordinates::new(lng, lat), limit)
            .await
            .map_err(error_handler)?;

        json(&SuccessResponse::Locations { locations })
    }
}

pub async fn within(environment: Environment, query: WithinQuery) -> RouteResult {
    timed! {
        let WithinQuery { lng, lat, radius } = query;
        let error_handler = |e: BackendError| reject::custom(Rejection::new(Context::within(lng, lat, radius), e));

        let locations = environment
            .locations
            .within(Coordinates::new(lng, lat), radius)
            .await
            .map_err(error_handler)?;

        json(&SuccessResponse::Locations { locations })
    }
}

fn parse_id(id: &str) -> Result<Uuid, BackendError> {
    Uuid::parse_str(id).map_err(|_| BackendError::InvalidId(id.to_string()))
}

fn format_server_timing(seconds: Duration) -> String {
    format!("handler;dur={}", seconds.as_secs_f64() * 1000.0)
}
