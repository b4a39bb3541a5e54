#[macro_use]
extern crate rocket;

#[macro_use]
extern crate log;

#[cfg(test)]
#[macro_use]
extern crate backend_test;

use rocket::{Build, Rocket};

pub mod api;
pub mod config;
pub mod error;
pub mod logging;
pub mod model;

pub use config::Config;

/// Assemble the server: all routes plus the logging, config and database
/// fairings. The returned rocket still needs to be ignited and launched.
pub fn build() -> Rocket<Build> {
    rocket::build()
        .mount("/", api::routes())
        .attach(logging::LoggerFairing)
        .attach(config::ConfigFairing)
        .attach(config::DatabaseFairing)
}

/// Connect to the database given by `db_uri`, for tests that bypass the
/// database fairing.
#[cfg(test)]
pub(crate) async fn db_client() -> mongodb::Client {
    let db_uri = rocket::build()
        .figment()
        .extract_inner::<String>("db_uri")
        .expect("`db_uri` not set");
    mongodb::Client::with_uri_str(&db_uri)
        .await
        .unwrap_or_else(|_| panic!("could not connect to database at \"{db_uri}\""))
}

/// A fresh database name, so concurrent tests cannot collide.
#[cfg(test)]
pub(crate) fn database() -> String {
    let random: u32 = rand::random();
    format!("test{random}")
}

/// Build a rocket against an existing database connection. Used by the
/// `#[backend_test]` macro to point each test at its own throwaway database.
#[cfg(test)]
pub(crate) async fn rocket_for_db(client: mongodb::Client, db_name: &str) -> Rocket<Build> {
    let db = client.database(db_name);
    model::mongodb::ensure_indexes_exist(&db)
        .await
        .expect("failed to create database indexes");
    rocket::build()
        .mount("/", api::routes())
        .attach(config::ConfigFairing)
        .manage(client)
        .manage(db)
}
