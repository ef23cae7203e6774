use std::sync::Arc;

use log::{debug, error, Logger};
use warp::http::StatusCode;
use warp::reject;
use warp::reply::{json, with_status, Json, WithStatus};

use crate::errors::{BackendError, ValidationError};

pub mod admin;
mod handlers;
mod query;
mod rejection;
mod response;

pub use internal::*;

/// The largest location document to accept. Documents are small, so
/// anything bigger is a mistake.
const MAX_CONTENT_LENGTH: u64 = 64 * 1024;

pub async fn format_rejection(
    logger: Arc<Logger>,
    rej: reject::Rejection,
) -> Result<WithStatus<Json>, reject::Rejection> {
    if let Some(r) = rej.find::<rejection::Rejection>() {
        let status = status_code_for(&r.error);

        if status.is_server_error() {
            error!(logger, "Backend error"; "context" => ?r.context, "error" => ?r.error, "status" => %status, "message" => %r.error);
        } else {
            debug!(logger, "Rejected request"; "context" => ?r.context, "status" => %status, "message" => %r.error);
        }

        return Ok(with_status(json(&r.flatten()), status));
    }

    Err(rej)
}

fn status_code_for(e: &BackendError) -> StatusCode {
    use BackendError::*;

    match e {
        Validation(ValidationError::TitleAlreadyExists) => StatusCode::CONFLICT,
        Validation(_) | InvalidId(..) | InvalidQuery { .. } => StatusCode::BAD_REQUEST,
        NonExistentId(..) => StatusCode::NOT_FOUND,
        Storage { .. } | Sqlx { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

mod internal {
    use warp::body::{bytes, content_length_limit};
    use warp::filters::BoxedFilter;
    use warp::path::end;
    use warp::Filter;
    use warp::Reply;
    use warp::{delete, get as g, patch, path as p, path::param as par, post, query};

    use super::{handlers, query as q, MAX_CONTENT_LENGTH};
    use crate::environment::Environment;

    type Route = BoxedFilter<(Box<dyn Reply>,)>;

    macro_rules! route_filter {
        ($route_variable:ident; $first:expr) => (let $route_variable = $route_variable.and($first););
        ($route_variable:ident; $first:expr, $($rest:expr),+) => (
            let $route_variable = $route_variable.and($first);
            route_filter!($route_variable; $($rest),+);
        )
    }

    macro_rules! route {
        ($name:ident => $handler:ident, $route_variable:ident; $($filters:expr),+) => (
            pub fn $name(environment: Environment) -> Route {
                let r = environment.urls.locations_path.clone();

                let $route_variable = warp::any()
                    .map(move || environment.clone())
                    .and(p(r));

                route_filter!($route_variable; $($filters),+);

                $route_variable.and_then(handlers::$handler)
                    .boxed()
            }
        );
    }

    route!(make_create_route => create, rt; end(), post(), content_length_limit(MAX_CONTENT_LENGTH), bytes());
    route!(make_retrieve_route => retrieve, rt; p("id"), par::<String>(), end(), g());
    route!(make_update_route => update, rt; p("id"), par::<String>(), end(), patch(), content_length_limit(MAX_CONTENT_LENGTH), bytes());
    route!(make_delete_route => delete, rt; p("id"), par::<String>(), end(), delete());
    route!(make_near_route => near, rt; p("near"), end(), g(), query::<q::NearQuery>());
    route!(make_within_route => within, rt; p("within"), end(), g(), query::<q::WithinQuery>());
}
