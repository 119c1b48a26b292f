use std::collections::BTreeMap;

use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    dto::format_epoch_millis,
    services::sync_service::SyncStatus,
    state::{
        catalog::{Catalog, Reward, Station},
        device::{DeviceSession, Feedback, FeedbackKind, Screen},
        session::{OccupancyState, TeamProgress},
    },
};

/// Everything a screen needs to render the device's current state.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct DeviceView {
    pub title: String,
    pub screen: Screen,
    pub sync_status: SyncStatus,
    /// Short text for the connectivity indicator.
    pub status_label: String,
    pub max_stations: usize,
    pub final_unlocked: bool,
    pub teams: Vec<TeamSummary>,
    pub stations: Vec<StationSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_team: Option<ActiveTeamView>,
    /// Present while the trivia interlude runs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trivia: Option<TriviaView>,
    /// Present once every team finished (or the final was forced).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_clue: Option<FinalClueView>,
    pub roster: RosterView,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code_feedback: Option<FeedbackView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clue_feedback: Option<FeedbackView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trivia_feedback: Option<FeedbackView>,
}

/// Progress line of one team on the picker.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TeamSummary {
    pub id: String,
    pub name: String,
    pub completed_count: usize,
    pub completed: bool,
    pub current_station_id: Option<String>,
}

/// Occupancy of one station as this device sees it.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct StationSummary {
    pub id: String,
    pub name: String,
    pub state: OccupancyState,
    pub occupied_by_team_id: Option<String>,
    /// RFC 3339 timestamp of the claim.
    pub occupied_since: Option<String>,
}

/// Which page of the team screen applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TeamPage {
    /// Standing on a station.
    Station,
    /// Nothing open right now.
    Waiting,
    Completed,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ActiveTeamView {
    pub id: String,
    pub name: String,
    pub completed_count: usize,
    pub completed: bool,
    pub page: TeamPage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub station: Option<StationView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encounter: Option<EncounterView>,
    /// Name of the station handed out after the last accepted code.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_station_notice: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct StationView {
    pub id: String,
    pub name: String,
    pub riddle: String,
    pub how_to_play: Vec<String>,
    pub find_code_poem: Option<String>,
    pub find_code_hint: Option<String>,
    /// Unlock code, only once the clue was revealed.
    pub code: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct EncounterView {
    pub id: String,
    pub name: String,
    pub image: Option<String>,
    pub facts: Vec<FactView>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct FactView {
    pub question: String,
    pub answer: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TriviaView {
    pub question_id: String,
    pub prompt: String,
    pub options: Vec<String>,
    pub image: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct FinalClueView {
    pub title: String,
    pub riddle: String,
    pub hint: Option<String>,
    pub image: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RosterView {
    pub names: Vec<String>,
    pub teams: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct FeedbackView {
    pub id: Uuid,
    pub kind: FeedbackKind,
    pub text: String,
}

impl From<&Feedback> for FeedbackView {
    fn from(feedback: &Feedback) -> Self {
        Self {
            id: feedback.id,
            kind: feedback.kind,
            text: feedback.text.clone(),
        }
    }
}

/// Label of the connectivity indicator.
pub fn status_label(status: SyncStatus) -> &'static str {
    match status {
        SyncStatus::Connecting => "connecting",
        SyncStatus::Connected => "live",
        SyncStatus::Error => "sync error",
        SyncStatus::Offline => "local only",
    }
}

impl DeviceView {
    pub fn build(device: &DeviceSession, catalog: &Catalog, status: SyncStatus) -> Self {
        let session = &device.session;

        let stations = catalog
            .stations
            .iter()
            .map(|station| {
                let occupancy = session.station_occupancy.get(&station.id);
                StationSummary {
                    id: station.id.clone(),
                    name: station.name.clone(),
                    state: occupancy.map(|o| o.state).unwrap_or_default(),
                    occupied_by_team_id: occupancy
                        .and_then(|o| o.holder())
                        .map(str::to_owned),
                    occupied_since: occupancy
                        .filter(|o| !o.is_open())
                        .and_then(|o| o.occupied_at)
                        .and_then(format_epoch_millis),
                }
            })
            .collect();

        let trivia = session
            .trivia
            .active
            .then(|| session.trivia.current_question_id.as_deref())
            .flatten()
            .and_then(|id| catalog.question(id))
            .map(|question| TriviaView {
                question_id: question.id.clone(),
                prompt: question.prompt.clone(),
                options: question.options.clone(),
                image: question.image.clone(),
            });

        let final_clue = session.final_unlocked.then(|| FinalClueView {
            title: catalog.final_clue.title.clone(),
            riddle: catalog.final_clue.riddle.clone(),
            hint: catalog.final_clue.hint.clone(),
            image: catalog.final_clue.image.clone(),
        });

        Self {
            title: catalog.title.clone(),
            screen: device.screen,
            sync_status: status,
            status_label: status_label(status).to_owned(),
            max_stations: catalog.max_stations(),
            final_unlocked: session.final_unlocked,
            teams: session.teams.iter().map(TeamSummary::from).collect(),
            stations,
            active_team: session
                .active_team()
                .map(|team| ActiveTeamView::build(team, device, catalog)),
            trivia,
            final_clue,
            roster: RosterView {
                names: session.assignments.names.clone(),
                teams: session.assignments.teams.clone(),
            },
            code_feedback: device.code_feedback.as_ref().map(FeedbackView::from),
            clue_feedback: device.clue_feedback.as_ref().map(FeedbackView::from),
            trivia_feedback: device.trivia_feedback.as_ref().map(FeedbackView::from),
        }
    }
}

impl From<&TeamProgress> for TeamSummary {
    fn from(team: &TeamProgress) -> Self {
        Self {
            id: team.id.clone(),
            name: team.name.clone(),
            completed_count: team.completed_count(),
            completed: team.completed,
            current_station_id: team.current_station_id.clone(),
        }
    }
}

impl ActiveTeamView {
    fn build(team: &TeamProgress, device: &DeviceSession, catalog: &Catalog) -> Self {
        let station = team
            .current_station_id
            .as_deref()
            .and_then(|id| catalog.station(id));
        let page = match (team.completed, station) {
            (true, _) => TeamPage::Completed,
            (false, Some(_)) => TeamPage::Station,
            (false, None) => TeamPage::Waiting,
        };
        let encounter = station
            .and_then(|station| team.sticky_choices.get(&station.id))
            .and_then(|id| catalog.reward(id))
            .map(EncounterView::from);

        Self {
            id: team.id.clone(),
            name: team.name.clone(),
            completed_count: team.completed_count(),
            completed: team.completed,
            page,
            station: station.map(|station| StationView::build(station, device.code_revealed())),
            encounter,
            next_station_notice: device
                .next_station_notice
                .as_deref()
                .and_then(|id| catalog.station(id))
                .map(|station| station.name.clone()),
        }
    }
}

impl StationView {
    fn build(station: &Station, revealed: bool) -> Self {
        Self {
            id: station.id.clone(),
            name: station.name.clone(),
            riddle: station.riddle.clone(),
            how_to_play: station.how_to_play.clone(),
            find_code_poem: station.find_code_poem.clone(),
            find_code_hint: station.find_code_hint.clone(),
            code: revealed.then(|| station.code.clone()),
        }
    }
}

impl From<&Reward> for EncounterView {
    fn from(reward: &Reward) -> Self {
        Self {
            id: reward.id.clone(),
            name: reward.name.clone(),
            image: reward.image.clone(),
            facts: reward
                .facts
                .iter()
                .map(|fact| FactView {
                    question: fact.question.clone(),
                    answer: fact.answer.clone(),
                })
                .collect(),
        }
    }
}
