use std::error::Error;
use std::sync::Arc;

use futures::future::FutureExt;
use log::{info, initialize_logger, warn};
use tokio::sync::mpsc;
use warp::Filter;

use locations::config::{get_variable, get_variable_or};
use locations::db::PgDb;
use locations::environment::{Config, Environment, DEFAULT_NEAR_LIMIT};
use locations::locations::Locations;
use locations::routes;
use locations::routes::admin::Terminate;
use locations::schema::{self, LocationSchema};
use locations::urls::Urls;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenv::dotenv().ok();

    let logger = initialize_logger();

    let main_port: u16 = get_variable("LOCATIONS_PORT")
        .parse()
        .expect("parse LOCATIONS_PORT as u16");
    let admin_port: u16 = get_variable("LOCATIONS_ADMIN_PORT")
        .parse()
        .expect("parse LOCATIONS_ADMIN_PORT as u16");

    info!(logger, "Starting..."; "main_port" => main_port, "admin_port" => admin_port);
    let logger = Arc::new(logger);

    info!(logger, "Creating database pool...");
    let connection_string = get_variable("LOCATIONS_DB_CONNECTION_STRING");
    let pool = sqlx::Pool::connect(&connection_string)
        .await
        .expect("create database pool from LOCATIONS_DB_CONNECTION_STRING");

    let location_schema = Arc::new(LocationSchema::new());
    let db = Arc::new(PgDb::new(pool, location_schema.clone()));

    // the index builds in the background; requests are served meanwhile
    schema::register(&location_schema, db.clone(), logger.clone());

    let locations = Locations::new(location_schema, db, logger.clone());

    let urls = Arc::new(Urls::new(
        get_variable("LOCATIONS_BASE_URL"),
        get_variable("LOCATIONS_PATH"),
    ));

    let config = Config::new(get_variable_or("LOCATIONS_NEAR_LIMIT", DEFAULT_NEAR_LIMIT));
    let environment = Environment::new(logger.clone(), locations, urls, config);

    let (termination_sender, mut termination_receiver) = mpsc::channel::<()>(1);

    let terminate: Terminate = {
        let logger = logger.clone();

        Arc::new(move || {
            let termination_sender = termination_sender.clone();
            let logger = logger.clone();

            async move {
                if termination_sender.send(()).await.is_err() {
                    warn!(logger, "Already terminating");
                }
            }
            .boxed()
        })
    };

    let should_terminate = async move {
        termination_receiver.recv().await;
    }
    .shared();

    let ctrlc = {
        let should_terminate = should_terminate.clone();
        let terminate = terminate.clone();

        let signal = tokio::signal::ctrl_c();

        async move {
            tokio::select! {
                _ = should_terminate => {},
                _ = signal => {
                    terminate().await;
                }
            }
        }
    };

    let main_server = {
        let should_terminate = should_terminate.clone();

        let logger2 = logger.clone();

        let create_route = routes::make_create_route(environment.clone());
        let near_route = routes::make_near_route(environment.clone());
        let within_route = routes::make_within_route(environment.clone());
        let retrieve_route = routes::make_retrieve_route(environment.clone());
        let update_route = routes::make_update_route(environment.clone());
        let delete_route = routes::make_delete_route(environment.clone());

        let routes = create_route
            .or(near_route)
            .or(within_route)
            .or(retrieve_route)
            .or(update_route)
            .or(delete_route)
            .recover(move |r| routes::format_rejection(logger2.clone(), r));

        let (_, main_server) =
            warp::serve(routes).bind_with_graceful_shutdown(([0, 0, 0, 0], main_port), async {
                should_terminate.await;
            });

        main_server
    };

    let admin_server = {
        let should_terminate = should_terminate.clone();
        let terminate = terminate.clone();

        let routes = routes::admin::make_healthz_route(environment.clone()).or(
            routes::admin::make_termination_route(environment.clone(), terminate),
        );

        let (_, admin_server) =
            warp::serve(routes).bind_with_graceful_shutdown(([0, 0, 0, 0], admin_port), async {
                should_terminate.await;
            });

        admin_server
    };

    tokio::join!(ctrlc, main_server, admin_server);

    info!(logger, "Exiting gracefully...");

    Ok(())
}
