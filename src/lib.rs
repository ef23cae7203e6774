pub mod config;
pub mod db;
pub mod environment;
pub mod errors;
pub mod location;
pub mod locations;
pub mod normalization;
pub mod routes;
pub mod schema;
pub mod urls;
pub mod validation;
