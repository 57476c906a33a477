#[macro_use]
extern crate rocket;
#[macro_use]
extern crate log;

#[cfg(test)]
#[macro_use]
extern crate backend_test;

use rocket::{Build, Rocket};

use crate::ballot_box::BallotBox;
use crate::config::{ConfigFairing, StorageFairing};
use crate::logging::LoggerFairing;

pub mod api;
pub mod ballot_box;
pub mod config;
pub mod error;
pub mod logging;
pub mod model;
pub mod store;

pub use config::Config;

/// Build the server from `Rocket.toml` and the environment.
pub fn build() -> Rocket<Build> {
    rocket::build()
        .mount("/", api::routes())
        .register("/", api::catchers())
        .attach(ConfigFairing)
        .attach(StorageFairing)
        .attach(LoggerFairing)
}

/// Build the server around an existing ballot box, skipping config and
/// storage setup.
pub fn rocket_for_ballot_box(ballot_box: BallotBox) -> Rocket<Build> {
    rocket::build()
        .mount("/", api::routes())
        .register("/", api::catchers())
        .manage(ballot_box)
        .attach(LoggerFairing)
}

#[cfg(test)]
pub(crate) const ADMIN_EXAMPLE: &str = "0xAdminWallet";

#[cfg(test)]
pub(crate) const NOT_ADMIN_EXAMPLE: &str = "0xSomeoneElse";

#[cfg(test)]
const TEST_SECRET: &str = "test identity secret";

#[cfg(test)]
const TEST_DB_URI_VAR: &str = "EVOTING_TEST_DB_URI";

#[cfg(test)]
pub(crate) fn init_test_logging() {
    log4rs_test_utils::test_logging::init_logging_once_for(
        ["evoting_backend"],
        None,
        None,
    );
}

#[cfg(test)]
pub(crate) fn test_ballot_box(store: std::sync::Arc<dyn store::ElectionStore>) -> BallotBox {
    let config = Config::new(ADMIN_EXAMPLE, TEST_SECRET, Default::default());
    BallotBox::from_config(store, &config).unwrap()
}

/// A ballot box over fresh in-memory storage.
#[cfg(test)]
pub(crate) fn memory_ballot_box() -> BallotBox {
    test_ballot_box(std::sync::Arc::new(store::MemoryStore::new()))
}

/// A ballot box over a freshly named MongoDB database, which the caller is
/// responsible for dropping.
#[cfg(test)]
pub(crate) async fn mongo_ballot_box() -> (BallotBox, mongodb::Database) {
    use rand::Rng;

    let db_uri = std::env::var(TEST_DB_URI_VAR)
        .unwrap_or_else(|_| panic!("`{TEST_DB_URI_VAR}` must be set for MongoDB tests"));
    let db_name = format!("test{}", rand::thread_rng().gen::<u32>());
    let store = config::connect_mongo(&db_uri, &db_name, 5).await.unwrap();
    let db = store.database().clone();
    (test_ballot_box(std::sync::Arc::new(store)), db)
}
