//! Application-level configuration loading: game content, store selection
//! and the device state path.

use std::{collections::BTreeSet, env, fs, io::ErrorKind, path::PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::state::{
    allocator::DRAW_SIZE,
    catalog::{Catalog, FinalClue, Reward, RewardFact, Station, TeamInfo, TriviaQuestion},
};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "STATION_QUEST_CONFIG_PATH";
/// Default location of the persisted device session.
const DEFAULT_STATE_PATH: &str = "data/session.json";
/// Environment variable that overrides [`DEFAULT_STATE_PATH`].
const STATE_PATH_ENV: &str = "STATION_QUEST_STATE_PATH";
/// Environment variable selecting the shared store backend.
const STORE_BACKEND_ENV: &str = "STORE_BACKEND";

#[derive(Debug, Clone)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    catalog: Catalog,
    store: StoreSection,
}

/// Optional `store` section of the configuration file. Environment variables
/// take precedence over it.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StoreSection {
    #[serde(default)]
    pub backend: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub database: Option<String>,
}

/// Shared store the device syncs through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreBackend {
    /// CouchDB reached over HTTP.
    Couch {
        base_url: String,
        database: Option<String>,
    },
    /// In-process store; only shares state within this process.
    Memory,
    /// No shared store: the device plays locally.
    Offline,
}

/// Reasons a configured catalog is rejected in favour of the built-in one.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CatalogError {
    #[error("catalog has no teams")]
    NoTeams,
    #[error("catalog has {stations} stations for {teams} teams")]
    TooFewStations { teams: usize, stations: usize },
    #[error("duplicate {kind} id `{id}`")]
    DuplicateId { kind: &'static str, id: String },
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to the
    /// built-in game content.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => match validate_catalog(&raw.catalog) {
                    Ok(()) => {
                        info!(
                            path = %path.display(),
                            teams = raw.catalog.teams.len(),
                            stations = raw.catalog.stations.len(),
                            "loaded game content from config"
                        );
                        raw.into()
                    }
                    Err(err) => {
                        warn!(
                            path = %path.display(),
                            error = %err,
                            "config catalog is unusable; falling back to defaults"
                        );
                        Self {
                            store: raw.store.unwrap_or_default(),
                            ..Self::default()
                        }
                    }
                },
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }

    pub fn into_catalog(self) -> Catalog {
        self.catalog
    }

    /// Resolve the shared store from `STORE_BACKEND` and the `COUCH_*`
    /// variables, falling back to the file's `store` section.
    pub fn store_backend(&self) -> StoreBackend {
        let backend = env::var(STORE_BACKEND_ENV)
            .ok()
            .or_else(|| self.store.backend.clone());
        let base_url = non_empty_env("COUCH_BASE_URL").or_else(|| self.store.base_url.clone());
        let database = non_empty_env("COUCH_DB").or_else(|| self.store.database.clone());
        select_backend(backend.as_deref(), base_url, database)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            catalog: default_catalog(),
            store: StoreSection::default(),
        }
    }
}

/// Path of the persisted device session.
pub fn state_path() -> PathBuf {
    env::var_os(STATE_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_STATE_PATH))
}

#[derive(Debug, Deserialize)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    #[serde(flatten)]
    catalog: Catalog,
    #[serde(default)]
    store: Option<StoreSection>,
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        Self {
            catalog: value.catalog,
            store: value.store.unwrap_or_default(),
        }
    }
}

fn select_backend(
    backend: Option<&str>,
    base_url: Option<String>,
    database: Option<String>,
) -> StoreBackend {
    match backend.map(str::trim).filter(|name| !name.is_empty()) {
        Some("memory") => StoreBackend::Memory,
        Some("couch") | None => match base_url {
            Some(base_url) => StoreBackend::Couch { base_url, database },
            None => StoreBackend::Offline,
        },
        Some(other) => {
            warn!(backend = other, "unknown store backend; playing locally");
            StoreBackend::Offline
        }
    }
}

/// The opening draw needs enough stations and ids must be unique.
fn validate_catalog(catalog: &Catalog) -> Result<(), CatalogError> {
    if catalog.teams.is_empty() {
        return Err(CatalogError::NoTeams);
    }
    if catalog.stations.len() < catalog.teams.len().max(DRAW_SIZE) {
        return Err(CatalogError::TooFewStations {
            teams: catalog.teams.len(),
            stations: catalog.stations.len(),
        });
    }
    check_unique("team", catalog.team_ids())?;
    check_unique("station", catalog.station_ids())?;
    check_unique("trivia", catalog.trivia.iter().map(|q| q.id.as_str()))?;
    check_unique("reward", catalog.rewards.iter().map(|r| r.id.as_str()))?;
    Ok(())
}

fn check_unique<'a>(
    kind: &'static str,
    ids: impl Iterator<Item = &'a str>,
) -> Result<(), CatalogError> {
    let mut seen = BTreeSet::new();
    for id in ids {
        if !seen.insert(id) {
            return Err(CatalogError::DuplicateId {
                kind,
                id: id.to_owned(),
            });
        }
    }
    Ok(())
}

fn non_empty_env(var: &str) -> Option<String> {
    env::var(var).ok().filter(|value| !value.trim().is_empty())
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

/// Built-in game content shipped with the binary.
fn default_catalog() -> Catalog {
    let teams = [
        ("red", "Red"),
        ("blue", "Blue"),
        ("green", "Green"),
        ("yellow", "Yellow"),
    ]
    .into_iter()
    .map(|(id, name)| TeamInfo {
        id: id.into(),
        name: name.into(),
    })
    .collect();

    let stations = [
        (
            "garden",
            "Garden",
            "Where the roses lean to hear the bees, look low beneath the leaves.",
            "BLOOM",
        ),
        (
            "library",
            "Library",
            "A thousand voices, none aloud. Find the shelf that faces the crowd.",
            "PAGES",
        ),
        (
            "kitchen",
            "Kitchen",
            "Warmth and crumbs and a ticking clock. Check behind the cookie crock.",
            "CRUMB",
        ),
        (
            "porch",
            "Porch",
            "Boots come off and coats hang high. Look where umbrellas go to dry.",
            "STEPS",
        ),
        (
            "attic",
            "Attic",
            "Dust and trunks and a slanted roof. The box with the bow holds the proof.",
            "DUSTY",
        ),
    ]
    .into_iter()
    .map(|(id, name, riddle, code)| Station {
        id: id.into(),
        name: name.into(),
        riddle: riddle.into(),
        code: code.into(),
        how_to_play: vec![
            "Read the riddle together.".into(),
            "Find the card hidden at the station.".into(),
            "Type the code printed on the card.".into(),
        ],
        find_code_poem: None,
        find_code_hint: Some("The code is five letters long.".into()),
    })
    .collect();

    let trivia = vec![
        TriviaQuestion {
            id: "planets".into(),
            prompt: "Which planet is known as the red planet?".into(),
            options: vec!["Venus".into(), "Mars".into(), "Jupiter".into()],
            answer: "Mars".into(),
            image: None,
        },
        TriviaQuestion {
            id: "spiders".into(),
            prompt: "How many legs does a spider have?".into(),
            options: vec!["Six".into(), "Eight".into(), "Ten".into()],
            answer: "Eight".into(),
            image: None,
        },
        TriviaQuestion {
            id: "rainbow".into(),
            prompt: "How many colours are in a rainbow?".into(),
            options: vec!["Five".into(), "Seven".into(), "Nine".into()],
            answer: "Seven".into(),
            image: None,
        },
    ];

    let rewards = [
        ("owl", "Night Owl", "What does an owl eat?", "Mice and insects"),
        ("fox", "Red Fox", "Where does a fox sleep?", "In a den"),
        ("otter", "River Otter", "How does an otter keep warm?", "Very thick fur"),
        ("hedgehog", "Hedgehog", "What covers a hedgehog?", "Spines"),
        ("badger", "Badger", "When is a badger awake?", "At night"),
    ]
    .into_iter()
    .map(|(id, name, question, answer)| Reward {
        id: id.into(),
        name: name.into(),
        image: None,
        facts: vec![RewardFact {
            question: question.into(),
            answer: answer.into(),
        }],
    })
    .collect();

    Catalog {
        title: "Station Quest".into(),
        teams,
        stations,
        trivia,
        rewards,
        final_clue: FinalClue {
            title: "The Final Clue".into(),
            riddle: "Every team has a piece. Put them together under the oldest tree.".into(),
            hint: Some("Bring everyone along.".into()),
            image: None,
        },
    }
}
