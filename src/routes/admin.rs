use std::convert::Infallible;
use std::sync::Arc;

use futures::future::BoxFuture;
use log::info;
use warp::filters::BoxedFilter;
use warp::http::StatusCode;
use warp::path::end;
use warp::reply::{json, Reply};
use warp::Filter;

use super::response::SuccessResponse;
use crate::environment::Environment;

/// Asks the servers to shut down gracefully.
pub type Terminate = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

type AdminRoute = BoxedFilter<(Box<dyn Reply>,)>;

/// Reports the build and the schema being served.
pub fn make_healthz_route(environment: Environment) -> AdminRoute {
    let schema = environment.locations.schema().clone();

    warp::path("healthz")
        .and(end())
        .and(warp::get())
        .map(move || {
            Box::new(json(&SuccessResponse::Healthz {
                entity: schema.name,
                index: schema.geo_index.name,
                revision: info::REVISION,
                timestamp: info::BUILD_TIMESTAMP,
                version: info::VERSION,
            })) as Box<dyn Reply>
        })
        .boxed()
}

pub fn make_termination_route(environment: Environment, terminate: Terminate) -> AdminRoute {
    warp::path("terminate")
        .and(end())
        .and(warp::post())
        .and_then(move || {
            let logger = environment.logger.clone();
            let terminate = terminate.clone();

            async move {
                info!(logger, "Termination requested");
                terminate().await;

                Ok::<_, Infallible>(Box::new(StatusCode::NO_CONTENT) as Box<dyn Reply>)
            }
        })
        .boxed()
}
