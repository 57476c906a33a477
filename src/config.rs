use std::sync::Arc;
use std::time::Duration;

use mongodb::{options::ClientOptions, Client as MongoClient};
use rocket::{
    fairing::{Fairing, Info, Kind},
    Build, Rocket,
};
use serde::Deserialize;

use crate::ballot_box::BallotBox;
use crate::model::window::WindowPolicy;
use crate::store::{ElectionStore, MemoryStore, MongoStore};

/// Application configuration, derived from `Rocket.toml` and `ROCKET_*`
/// environment variables. This struct becomes managed state and can be
/// inspected by any endpoint.
#[derive(Deserialize)]
pub struct Config {
    // non-secrets
    admin_identity: String,
    #[serde(default)]
    window_policy: WindowPolicy,
    // secrets
    identity_secret: String,
}

impl Config {
    pub fn new(admin_identity: &str, identity_secret: &str, window_policy: WindowPolicy) -> Self {
        Self {
            admin_identity: admin_identity.to_string(),
            window_policy,
            identity_secret: identity_secret.to_string(),
        }
    }

    /// The single identity allowed to manage candidates, the voting window,
    /// and integrity snapshots.
    pub fn admin_identity(&self) -> &str {
        &self.admin_identity
    }

    /// How votes treat the election window.
    pub fn window_policy(&self) -> WindowPolicy {
        self.window_policy
    }

    /// Secret key used to derive voter keys from identity tokens.
    pub fn identity_secret(&self) -> &[u8] {
        self.identity_secret.as_bytes()
    }
}

/// A fairing that loads the application config and puts it in managed state.
/// This could easily be achieved using `AdHoc::config`, but is written out
/// explicitly for symmetry with the storage fairing and control over error
/// messages.
pub struct ConfigFairing;

#[rocket::async_trait]
impl Fairing for ConfigFairing {
    fn info(&self) -> Info {
        Info {
            name: "Config",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, mut rocket: Rocket<Build>) -> rocket::fairing::Result {
        // Load the config.
        let config = match rocket.figment().extract::<Config>() {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load application config");
                rocket::config::pretty_print_error(e);
                return Err(rocket);
            }
        };
        info!("Window policy: {:?}", config.window_policy());

        // Manage the state.
        rocket = rocket.manage(config);
        Ok(rocket)
    }
}

/// Which storage backend to run against.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    /// Process memory; nothing survives a restart.
    Memory,
    #[default]
    Mongodb,
}

/// Configuration for the storage backend.
#[derive(Deserialize)]
struct StorageConfig {
    #[serde(default)]
    storage: StorageKind,
    #[serde(default = "default_db_name")]
    db_name: String,
    /// Seconds to wait for the database before failing a request.
    #[serde(default = "default_db_timeout")]
    db_timeout: u64,
    // secrets
    db_uri: Option<String>,
}

fn default_db_name() -> String {
    "evoting".to_string()
}

fn default_db_timeout() -> u64 {
    5
}

/// A fairing that loads the storage config, connects to the configured
/// backend, performs any setup necessary, and places the resulting
/// `BallotBox` into managed state.
///
/// Must be attached after [`ConfigFairing`].
pub struct StorageFairing;

#[rocket::async_trait]
impl Fairing for StorageFairing {
    fn info(&self) -> Info {
        Info {
            name: "Storage",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, mut rocket: Rocket<Build>) -> rocket::fairing::Result {
        // Load the config.
        let config = match rocket.figment().extract::<StorageConfig>() {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load storage config");
                rocket::config::pretty_print_error(e);
                return Err(rocket);
            }
        };

        // Construct the store.
        let store: Arc<dyn ElectionStore> = match config.storage {
            StorageKind::Memory => {
                warn!("Using in-memory storage; nothing will persist across restarts");
                Arc::new(MemoryStore::new())
            }
            StorageKind::Mongodb => {
                let db_uri = match config.db_uri {
                    Some(uri) => uri,
                    None => {
                        error!("`db_uri` must be set when using MongoDB storage");
                        return Err(rocket);
                    }
                };
                info!("Loaded database config, connecting...");
                let store =
                    match connect_mongo(&db_uri, &config.db_name, config.db_timeout).await {
                        Ok(store) => store,
                        Err(e) => {
                            error!("Failed to connect to database: {e}");
                            return Err(rocket);
                        }
                    };
                info!("...database connection online!");
                Arc::new(store)
            }
        };

        // Combine with the application config.
        let ballot_box = match rocket.state::<Config>() {
            Some(app_config) => match BallotBox::from_config(store, app_config) {
                Ok(ballot_box) => ballot_box,
                Err(e) => {
                    error!("Invalid application config: {e}");
                    return Err(rocket);
                }
            },
            None => {
                error!("Application config must be loaded before storage");
                return Err(rocket);
            }
        };

        // Manage the state.
        rocket = rocket.manage(ballot_box);
        Ok(rocket)
    }
}

/// Connect to MongoDB with the given timeout applied to server selection,
/// connection establishment, and retries of conflicting transactions.
pub async fn connect_mongo(
    db_uri: &str,
    db_name: &str,
    timeout_secs: u64,
) -> crate::error::Result<MongoStore> {
    let mut options = ClientOptions::parse(db_uri).await?;
    let timeout = Duration::from_secs(timeout_secs);
    options.server_selection_timeout = Some(timeout);
    options.connect_timeout = Some(timeout);
    let client = MongoClient::with_options(options)?;
    MongoStore::connect(client, db_name, timeout).await
}
