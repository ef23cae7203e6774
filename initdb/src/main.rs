//! A helper program to create the locations table and enable PostGIS
//! before running the service or its tests.
//!
//! Connects to `LOCATIONS_DB_CONNECTION_STRING` and applies the
//! migrations in `LOCATIONS_MIGRATION_DIR`, which defaults to
//! `./migrations` relative to the working directory.

use std::env;

use movine::Movine;
use postgres::{Client, NoTls};

use log::{debug, initialize_logger};

fn main() {
    dotenv::dotenv().ok();

    let logger = initialize_logger();
    let connection_string = env::var("LOCATIONS_DB_CONNECTION_STRING")
        .expect("could not read LOCATIONS_DB_CONNECTION_STRING");
    let migration_dir =
        env::var("LOCATIONS_MIGRATION_DIR").unwrap_or_else(|_| String::from("./migrations"));

    debug!(logger, "Connecting to database...");

    let client = Client::connect(&connection_string, NoTls).expect("could not connect to database");

    let mut movine = Movine::new(client);
    movine.set_migration_dir(&migration_dir);

    if movine.status().is_err() {
        debug!(logger, "Initializing movine...");
        movine.initialize().expect("failed to initialize movine")
    }

    debug!(logger, "Running migrations..."; "directory" => &migration_dir);
    movine.up().expect("failed to run migrations");

    debug!(logger, "Completed initialization.");
}
