//! Per-device presentation state wrapped around the persisted session.

use rand::Rng;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::state::{
    allocator::assign_next_station,
    catalog::Catalog,
    remote::{RemoteWrite, TeamStatus},
    session::LocalSession,
    trivia::{encounter_for, pick_question},
};

/// Screen currently shown on the device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Screen {
    #[default]
    Home,
    TeamPicker,
    AssignTeams,
    /// The active team's station, waiting or completed page.
    Team,
    Final,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackKind {
    Ok,
    Warn,
}

/// Transient inline message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Feedback {
    pub id: Uuid,
    pub kind: FeedbackKind,
    pub text: String,
}

impl Feedback {
    pub fn new(kind: FeedbackKind, text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            text: text.into(),
        }
    }
}

/// Where a feedback message is shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedbackSlot {
    /// Result of a code submission.
    Code,
    /// Code clue reveal and copy.
    Clue,
    /// Trivia answer result.
    Trivia,
}

/// One device's full state: the persisted session plus what is on screen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceSession {
    pub session: LocalSession,
    pub screen: Screen,
    pub code_feedback: Option<Feedback>,
    pub clue_feedback: Option<Feedback>,
    pub trivia_feedback: Option<Feedback>,
    /// Step key (`{team}-{station}`) whose code clue is revealed.
    pub code_revealed_for: Option<String>,
    /// Station handed out right after a successful code, until acknowledged.
    pub next_station_notice: Option<String>,
}

impl DeviceSession {
    pub fn new(session: LocalSession) -> Self {
        let screen = if session.final_unlocked {
            Screen::Final
        } else {
            Screen::Home
        };
        Self {
            session,
            screen,
            code_feedback: None,
            clue_feedback: None,
            trivia_feedback: None,
            code_revealed_for: None,
            next_station_notice: None,
        }
    }

    pub fn feedback(&self, slot: FeedbackSlot) -> Option<&Feedback> {
        match slot {
            FeedbackSlot::Code => self.code_feedback.as_ref(),
            FeedbackSlot::Clue => self.clue_feedback.as_ref(),
            FeedbackSlot::Trivia => self.trivia_feedback.as_ref(),
        }
    }

    /// Show a message, replacing whatever the slot held. Returns its id.
    pub fn set_feedback(&mut self, slot: FeedbackSlot, feedback: Feedback) -> Uuid {
        let id = feedback.id;
        *self.feedback_slot(slot) = Some(feedback);
        id
    }

    /// Clear the slot only if it still shows message `id`.
    pub fn dismiss_feedback(&mut self, slot: FeedbackSlot, id: Uuid) -> bool {
        let current = self.feedback_slot(slot);
        if current.as_ref().is_some_and(|feedback| feedback.id == id) {
            *current = None;
            true
        } else {
            false
        }
    }

    pub fn clear_all_feedback(&mut self) {
        self.code_feedback = None;
        self.clue_feedback = None;
        self.trivia_feedback = None;
        self.code_revealed_for = None;
        self.next_station_notice = None;
    }

    fn feedback_slot(&mut self, slot: FeedbackSlot) -> &mut Option<Feedback> {
        match slot {
            FeedbackSlot::Code => &mut self.code_feedback,
            FeedbackSlot::Clue => &mut self.clue_feedback,
            FeedbackSlot::Trivia => &mut self.trivia_feedback,
        }
    }

    /// Whether the code clue of the active team's current station is revealed.
    pub fn code_revealed(&self) -> bool {
        self.current_step_key()
            .is_some_and(|key| self.code_revealed_for.as_deref() == Some(key.as_str()))
    }

    /// `{team}-{station}` of the active team's current station.
    pub fn current_step_key(&self) -> Option<String> {
        let team = self.session.active_team()?;
        let station_id = team.current_station_id.as_deref()?;
        Some(crate::dao::models::progress_key(&team.id, station_id))
    }

    /// Bring derived presentation state in line with the session after a turn.
    ///
    /// Switches to the final screen on convergence, keeps a question under an
    /// active trivia cursor, places an active team that is waiting and rolls
    /// the encounter of its current station.
    pub fn settle<R: Rng + ?Sized>(
        &mut self,
        catalog: &Catalog,
        rng: &mut R,
        now: i64,
        writes: &mut Vec<RemoteWrite>,
    ) {
        if self.session.recompute_final_unlocked(catalog.max_stations()) {
            self.screen = Screen::Final;
        }

        let trivia = &mut self.session.trivia;
        if trivia.active
            && trivia
                .current_question_id
                .as_deref()
                .is_none_or(|id| catalog.question(id).is_none())
        {
            pick_question(catalog, trivia, rng);
        }

        if self.screen == Screen::Team {
            self.place_active_team(catalog, rng, now, writes);
        }
    }

    /// Hand the active team a station if it is waiting for one, then roll the
    /// encounter of whatever station it holds.
    pub fn place_active_team<R: Rng + ?Sized>(
        &mut self,
        catalog: &Catalog,
        rng: &mut R,
        now: i64,
        writes: &mut Vec<RemoteWrite>,
    ) {
        let Some(team_id) = self.session.active_team_id.clone() else {
            return;
        };
        if assign_next_station(&mut self.session, catalog, &team_id, rng, now, writes).is_some() {
            if let Some(team) = self.session.team(&team_id) {
                writes.push(RemoteWrite::PersistTeamStatus(TeamStatus::from(team)));
            }
        }
        if let Some(team) = self.session.team_mut(&team_id) {
            if let Some(station_id) = team.current_station_id.clone() {
                encounter_for(team, &station_id, &catalog.rewards, rng);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;
    use crate::state::catalog::fixtures;

    #[test]
    fn dismiss_only_clears_the_same_message() {
        let catalog = fixtures::catalog();
        let mut device = DeviceSession::new(LocalSession::new(&catalog));
        let first = device.set_feedback(FeedbackSlot::Code, Feedback::new(FeedbackKind::Ok, "one"));
        let second =
            device.set_feedback(FeedbackSlot::Code, Feedback::new(FeedbackKind::Warn, "two"));

        assert!(!device.dismiss_feedback(FeedbackSlot::Code, first));
        assert_eq!(device.feedback(FeedbackSlot::Code).unwrap().text, "two");
        assert!(device.dismiss_feedback(FeedbackSlot::Code, second));
        assert!(device.feedback(FeedbackSlot::Code).is_none());
    }

    #[test]
    fn restored_unlocked_session_opens_on_final_screen() {
        let catalog = fixtures::catalog();
        let mut session = LocalSession::new(&catalog);
        session.final_unlocked = true;
        assert_eq!(DeviceSession::new(session).screen, Screen::Final);
    }

    #[test]
    fn settle_places_waiting_active_team_and_rolls_encounter() {
        let catalog = fixtures::catalog();
        let mut device = DeviceSession::new(LocalSession::new(&catalog));
        device.session.active_team_id = Some("red".into());
        device.screen = Screen::Team;

        let mut writes = Vec::new();
        device.settle(&catalog, &mut StdRng::seed_from_u64(2), 10, &mut writes);

        let red = device.session.team("red").unwrap();
        let station_id = red.current_station_id.clone().unwrap();
        assert!(red.sticky_choices.contains_key(&station_id));
        assert_eq!(writes.len(), 3);
        assert!(matches!(writes[2], RemoteWrite::PersistTeamStatus(_)));
    }

    #[test]
    fn settle_keeps_a_question_under_active_trivia() {
        let catalog = fixtures::catalog();
        let mut device = DeviceSession::new(LocalSession::new(&catalog));
        device.session.trivia.active = true;
        device.session.trivia.current_question_id = Some("gone".into());

        device.settle(&catalog, &mut StdRng::seed_from_u64(2), 10, &mut Vec::new());
        let current = device.session.trivia.current_question_id.as_deref().unwrap();
        assert!(catalog.question(current).is_some());
    }
}
