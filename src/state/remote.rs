//! Messages exchanged between the session and the shared store.
//!
//! Transitions never talk to the store directly: they return
//! [`RemoteWrite`]s for the sync adapter to issue, and the adapter hands
//! parsed deliveries back as [`RemoteSnapshot`]s.

use std::collections::BTreeMap;

use crate::state::session::{Roster, StationOccupancy, TeamProgress};

/// Denormalized progress summary of one team.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeamStatus {
    pub team_id: String,
    pub step_index: usize,
    pub completed: bool,
}

impl From<&TeamProgress> for TeamStatus {
    fn from(team: &TeamProgress) -> Self {
        Self {
            team_id: team.id.clone(),
            step_index: team.completed_count(),
            completed: team.completed,
        }
    }
}

/// A best-effort write for the shared store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteWrite {
    OccupyStation {
        station_id: String,
        team_id: String,
    },
    ReleaseStation {
        station_id: String,
    },
    AssignTeamToStation {
        team_id: String,
        station_id: String,
    },
    /// Writes an explicit empty pointer rather than deleting the row.
    ClearTeamAssignment {
        team_id: String,
    },
    CompleteStationForTeam {
        team_id: String,
        station_id: String,
    },
    PersistTeamStatus(TeamStatus),
    PersistAllTeamStatuses(Vec<TeamStatus>),
    /// The draw plus the matching occupancy and pointers, in one transaction.
    /// The draw row is create-only.
    WriteInitialStationAssignment {
        team_ids: Vec<String>,
        order: Vec<String>,
    },
    ClearAllStationData,
    ClearTeamProgress {
        team_id: String,
    },
    ClearInitialStationAssignment,
    WriteRoster(Roster),
    ClearRoster,
}

impl RemoteWrite {
    /// Operation name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            RemoteWrite::OccupyStation { .. } => "occupy_station",
            RemoteWrite::ReleaseStation { .. } => "release_station",
            RemoteWrite::AssignTeamToStation { .. } => "assign_team_to_station",
            RemoteWrite::ClearTeamAssignment { .. } => "clear_team_assignment",
            RemoteWrite::CompleteStationForTeam { .. } => "complete_station_for_team",
            RemoteWrite::PersistTeamStatus(_) => "persist_team_status",
            RemoteWrite::PersistAllTeamStatuses(_) => "persist_all_team_statuses",
            RemoteWrite::WriteInitialStationAssignment { .. } => {
                "write_initial_station_assignment"
            }
            RemoteWrite::ClearAllStationData => "clear_all_station_data",
            RemoteWrite::ClearTeamProgress { .. } => "clear_team_progress",
            RemoteWrite::ClearInitialStationAssignment => "clear_initial_station_assignment",
            RemoteWrite::WriteRoster(_) => "write_roster",
            RemoteWrite::ClearRoster => "clear_roster",
        }
    }
}

/// Partial view of the shared store delivered by a subscription.
///
/// `None` means "not part of this delivery" and leaves local state alone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteSnapshot {
    pub occupancy: Option<BTreeMap<String, StationOccupancy>>,
    /// Team id to current station; an explicit `None` clears the pointer.
    pub assignments: Option<BTreeMap<String, Option<String>>>,
    /// Completed station ids per team, oldest first.
    pub progress: Option<BTreeMap<String, Vec<String>>>,
    pub initial_draw: Option<Vec<String>>,
    pub roster: Option<Roster>,
}

/// One row of the progress-summary subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteTeamStatus {
    pub team_id: String,
    pub step_index: Option<usize>,
}
