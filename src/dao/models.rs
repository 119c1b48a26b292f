use std::{
    collections::BTreeMap,
    fmt,
    time::{SystemTime, UNIX_EPOCH},
};

use serde::{Deserialize, Serialize};

/// Fixed key of the single initial-draw row.
pub const INITIAL_ASSIGNMENT_KEY: &str = "1";
/// Fixed key of the single name/team roster row.
pub const ROSTER_KEY: &str = "roster";
/// Status value written to completion rows.
pub const PROGRESS_COMPLETED: &str = "completed";
/// Occupancy state value for a held station.
pub const OCCUPANCY_OCCUPIED: &str = "occupied";
/// Occupancy state value for a free station.
pub const OCCUPANCY_OPEN: &str = "open";

/// Collections of the shared document store. Every row is keyed by a natural key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    /// Progress summary per team (`team_id`).
    TeamStatuses,
    /// Occupancy per station (`station_id`).
    StationOccupancy,
    /// Current station pointer per team (`team_id`).
    TeamCurrentAssignment,
    /// Completion log keyed by `{team_id}-{station_id}`.
    TeamStationProgress,
    /// Single row holding the opening station draw.
    InitialStationAssignment,
    /// Single row holding the name/team roster.
    GameAssignments,
}

impl Collection {
    /// Every collection known to the store, in a stable order.
    pub const ALL: [Collection; 6] = [
        Collection::TeamStatuses,
        Collection::StationOccupancy,
        Collection::TeamCurrentAssignment,
        Collection::TeamStationProgress,
        Collection::InitialStationAssignment,
        Collection::GameAssignments,
    ];

    /// Wire name of the collection.
    pub const fn name(self) -> &'static str {
        match self {
            Collection::TeamStatuses => "team_statuses",
            Collection::StationOccupancy => "station_occupancy",
            Collection::TeamCurrentAssignment => "team_current_assignment",
            Collection::TeamStationProgress => "team_station_progress",
            Collection::InitialStationAssignment => "initial_station_assignment",
            Collection::GameAssignments => "game_assignments",
        }
    }

    /// Parse a wire name back into a collection.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.name() == name)
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Key of a completion row for the given team and station.
pub fn progress_key(team_id: &str, station_id: &str) -> String {
    format!("{team_id}-{station_id}")
}

/// Milliseconds since the Unix epoch, used for every `*_at` field.
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as i64)
        .unwrap_or_default()
}

// Rows are decoded leniently: every payload field is optional so that a
// partially written row still yields what it has.

/// Denormalized progress summary used by the lightweight subscription.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TeamStatusEntity {
    pub team_id: String,
    #[serde(default)]
    pub step_index: Option<usize>,
    #[serde(default)]
    pub completed: Option<bool>,
    #[serde(default)]
    pub updated_at: Option<i64>,
}

/// Occupancy row of one station.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StationOccupancyEntity {
    pub station_id: String,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub occupied_by_team_id: Option<String>,
    #[serde(default)]
    pub occupied_at: Option<i64>,
    #[serde(default)]
    pub updated_at: Option<i64>,
}

impl StationOccupancyEntity {
    /// Row for a station held by `team_id`.
    pub fn occupied(station_id: &str, team_id: &str, at: i64) -> Self {
        Self {
            station_id: station_id.to_owned(),
            state: Some(OCCUPANCY_OCCUPIED.to_owned()),
            occupied_by_team_id: Some(team_id.to_owned()),
            occupied_at: Some(at),
            updated_at: Some(at),
        }
    }

    /// Row for a free station.
    pub fn open(station_id: &str, at: i64) -> Self {
        Self {
            station_id: station_id.to_owned(),
            state: Some(OCCUPANCY_OPEN.to_owned()),
            occupied_by_team_id: None,
            occupied_at: None,
            updated_at: Some(at),
        }
    }
}

/// Current-station pointer of one team.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TeamAssignmentEntity {
    pub team_id: String,
    #[serde(default)]
    pub current_station_id: Option<String>,
    #[serde(default)]
    pub assigned_at: Option<i64>,
    #[serde(default)]
    pub updated_at: Option<i64>,
}

/// Append-only completion record for a `(team, station)` pair.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StationProgressEntity {
    #[serde(default)]
    pub team_id: Option<String>,
    #[serde(default)]
    pub station_id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub completed_at: Option<i64>,
    #[serde(default)]
    pub updated_at: Option<i64>,
}

/// The one-row opening station draw.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InitialDrawEntity {
    #[serde(default)]
    pub station_order: Option<Vec<String>>,
    #[serde(default)]
    pub updated_at: Option<i64>,
}

/// The one-row name/team roster.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RosterEntity {
    #[serde(default)]
    pub names: Option<Vec<String>>,
    #[serde(default)]
    pub teams: Option<BTreeMap<String, Vec<String>>>,
    #[serde(default)]
    pub updated_at: Option<i64>,
}
