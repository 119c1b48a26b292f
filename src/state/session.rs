//! The device's single source of truth and its persisted shape.

use std::collections::BTreeMap;

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};
use utoipa::ToSchema;

use crate::state::{allocator::is_well_formed_draw, catalog::Catalog, catalog::TeamInfo};

/// Version written by this build.
pub const SCHEMA_VERSION: u32 = 2;
/// Anything older is discarded and rebuilt.
pub const MIN_SUPPORTED_SCHEMA_VERSION: u32 = 2;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum OccupancyState {
    #[default]
    Open,
    Occupied,
}

/// Local mirror of one station's shared occupancy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StationOccupancy {
    #[serde(default)]
    pub state: OccupancyState,
    #[serde(default)]
    pub occupied_by_team_id: Option<String>,
    #[serde(default)]
    pub occupied_at: Option<i64>,
}

impl StationOccupancy {
    pub fn open() -> Self {
        Self::default()
    }

    pub fn occupied(team_id: &str, at: i64) -> Self {
        Self {
            state: OccupancyState::Occupied,
            occupied_by_team_id: Some(team_id.to_owned()),
            occupied_at: Some(at),
        }
    }

    pub fn is_open(&self) -> bool {
        self.state == OccupancyState::Open
    }

    /// Team holding the station, if any.
    pub fn holder(&self) -> Option<&str> {
        match self.state {
            OccupancyState::Occupied => self.occupied_by_team_id.as_deref(),
            OccupancyState::Open => None,
        }
    }
}

/// Per-team progress record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamProgress {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// Insertion-ordered, duplicate-free.
    #[serde(default)]
    pub completed_station_ids: IndexSet<String>,
    #[serde(default)]
    pub current_station_id: Option<String>,
    /// Always `completed_station_ids.len() >= max_stations`.
    #[serde(default)]
    pub completed: bool,
    /// Sticky encounter choice per station.
    #[serde(default)]
    pub sticky_choices: BTreeMap<String, String>,
}

impl TeamProgress {
    pub fn new(info: &TeamInfo) -> Self {
        Self {
            id: info.id.clone(),
            name: info.name.clone(),
            ..Self::default()
        }
    }

    pub fn completed_count(&self) -> usize {
        self.completed_station_ids.len()
    }

    pub fn has_completed(&self, station_id: &str) -> bool {
        self.completed_station_ids.contains(station_id)
    }

    /// Add a completion; recording the same station twice is a no-op.
    pub fn record_completion(&mut self, station_id: &str, max_stations: usize) -> bool {
        let inserted = self.completed_station_ids.insert(station_id.to_owned());
        self.refresh_completed(max_stations);
        inserted
    }

    /// Replace the whole completed set.
    pub fn replace_completed<I>(&mut self, station_ids: I, max_stations: usize)
    where
        I: IntoIterator<Item = String>,
    {
        self.completed_station_ids = station_ids.into_iter().collect();
        self.refresh_completed(max_stations);
    }

    /// Back to zero: no progress, no station, no encounter choices.
    pub fn reset(&mut self) {
        self.completed_station_ids.clear();
        self.current_station_id = None;
        self.completed = false;
        self.sticky_choices.clear();
    }

    pub fn refresh_completed(&mut self, max_stations: usize) {
        self.completed = self.completed_count() >= max_stations;
    }
}

/// Position of the trivia interlude.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriviaCursor {
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub current_question_id: Option<String>,
    #[serde(default)]
    pub used_question_ids: Vec<String>,
}

/// Participant names and their team assignment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Roster {
    #[serde(default)]
    pub names: Vec<String>,
    #[serde(default)]
    pub teams: BTreeMap<String, Vec<String>>,
}

impl Roster {
    /// No names, an empty list for every team.
    pub fn empty(catalog: &Catalog) -> Self {
        let mut roster = Self::default();
        roster.normalize(catalog);
        roster
    }

    /// Make sure every catalog team has a list.
    pub fn normalize(&mut self, catalog: &Catalog) {
        for team_id in catalog.team_ids() {
            self.teams.entry(team_id.to_owned()).or_default();
        }
    }
}

/// Schema-versioned session record persisted after every turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalSession {
    pub schema_version: u32,
    #[serde(default)]
    pub teams: Vec<TeamProgress>,
    #[serde(default)]
    pub station_occupancy: IndexMap<String, StationOccupancy>,
    #[serde(default)]
    pub initial_station_order: Option<Vec<String>>,
    #[serde(default)]
    pub active_team_id: Option<String>,
    #[serde(default)]
    pub final_unlocked: bool,
    #[serde(default)]
    pub trivia: TriviaCursor,
    #[serde(default)]
    pub assignments: Roster,
}

impl LocalSession {
    /// Fresh session for the given content.
    pub fn new(catalog: &Catalog) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            teams: catalog.teams.iter().map(TeamProgress::new).collect(),
            station_occupancy: catalog
                .station_ids()
                .map(|id| (id.to_owned(), StationOccupancy::open()))
                .collect(),
            initial_station_order: None,
            active_team_id: None,
            final_unlocked: false,
            trivia: TriviaCursor::default(),
            assignments: Roster::empty(catalog),
        }
    }

    /// Rebuild a session from its persisted form.
    ///
    /// Unparseable or too-old records are discarded; missing parts are filled
    /// with defaults and teams are re-keyed to the catalog.
    pub fn restore(raw: Option<&str>, catalog: &Catalog) -> Self {
        let Some(raw) = raw else {
            return Self::new(catalog);
        };

        let value: Value = match serde_json::from_str(raw) {
            Ok(value) => value,
            Err(err) => {
                warn!(error = %err, "stored session is not valid JSON; starting fresh");
                return Self::new(catalog);
            }
        };

        let version = value
            .get("schema_version")
            .and_then(Value::as_u64)
            .unwrap_or(1);
        if version < u64::from(MIN_SUPPORTED_SCHEMA_VERSION) {
            info!(version, "stored session predates supported schema; rebuilding");
            return Self::new(catalog);
        }

        match serde_json::from_value::<Self>(value) {
            Ok(session) => session.normalized(catalog),
            Err(err) => {
                warn!(error = %err, "stored session has an unexpected shape; starting fresh");
                Self::new(catalog)
            }
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    fn normalized(mut self, catalog: &Catalog) -> Self {
        let max_stations = catalog.max_stations();
        self.schema_version = SCHEMA_VERSION;

        for station_id in catalog.station_ids() {
            self.station_occupancy
                .entry(station_id.to_owned())
                .or_default();
        }

        let previous = std::mem::take(&mut self.teams);
        self.teams = catalog
            .teams
            .iter()
            .enumerate()
            .map(|(index, info)| {
                let mut team = TeamProgress::new(info);
                let existing = previous
                    .iter()
                    .find(|stored| stored.id == info.id)
                    .or_else(|| previous.get(index));
                if let Some(existing) = existing {
                    team.completed_station_ids = existing
                        .completed_station_ids
                        .iter()
                        .filter(|id| catalog.is_station(id))
                        .cloned()
                        .collect();
                    team.current_station_id = existing
                        .current_station_id
                        .clone()
                        .filter(|id| catalog.is_station(id));
                    team.sticky_choices = existing.sticky_choices.clone();
                }
                team.refresh_completed(max_stations);
                team
            })
            .collect();

        if self
            .initial_station_order
            .as_ref()
            .is_some_and(|order| !is_well_formed_draw(order, catalog))
        {
            self.initial_station_order = None;
        }
        if self
            .active_team_id
            .as_deref()
            .is_some_and(|id| !catalog.is_team(id))
        {
            self.active_team_id = None;
        }
        self.assignments.normalize(catalog);
        self
    }

    pub fn team(&self, team_id: &str) -> Option<&TeamProgress> {
        self.teams.iter().find(|team| team.id == team_id)
    }

    pub fn team_mut(&mut self, team_id: &str) -> Option<&mut TeamProgress> {
        self.teams.iter_mut().find(|team| team.id == team_id)
    }

    pub fn active_team(&self) -> Option<&TeamProgress> {
        self.active_team_id.as_deref().and_then(|id| self.team(id))
    }

    /// Whether the station is open in the local mirror. Unknown stations are not.
    pub fn is_open(&self, station_id: &str) -> bool {
        self.station_occupancy
            .get(station_id)
            .is_some_and(StationOccupancy::is_open)
    }

    pub fn set_occupancy(&mut self, station_id: &str, occupancy: StationOccupancy) {
        self.station_occupancy
            .insert(station_id.to_owned(), occupancy);
    }

    /// True when there is at least one team and every team is done.
    pub fn all_teams_completed(&self, max_stations: usize) -> bool {
        !self.teams.is_empty()
            && self
                .teams
                .iter()
                .all(|team| team.completed_count() >= max_stations)
    }

    /// Latch the convergence flag. Returns `true` only on the false to true
    /// flip, which also ends any running trivia interlude.
    pub fn recompute_final_unlocked(&mut self, max_stations: usize) -> bool {
        if self.final_unlocked || !self.all_teams_completed(max_stations) {
            return false;
        }
        self.final_unlocked = true;
        self.trivia.active = false;
        self.trivia.current_question_id = None;
        true
    }
}
