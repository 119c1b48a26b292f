//! Player actions and the local transition they drive.

use rand::{Rng, seq::SliceRandom};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::state::{
    allocator::{assign_next_station, draw_initial_stations},
    catalog::Catalog,
    device::{DeviceSession, Feedback, FeedbackKind, FeedbackSlot, Screen},
    remote::{RemoteWrite, TeamStatus},
    session::{LocalSession, Roster, StationOccupancy},
    trivia::{is_correct, pick_question},
};

pub const CODE_ACCEPTED: &str = "Code accepted! Station cleared.";
pub const CODE_REJECTED: &str = "Not quite. Check the code again!";
pub const CODE_COPIED: &str = "Code copied!";
pub const COPY_FAILED: &str = "Copy failed. Please select it manually.";
pub const TRIVIA_CORRECT: &str = "Correct!";

/// Everything a player can do on a device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    /// Open the team picker and make sure the opening draw exists.
    StartGame,
    /// Same as [`Action::StartGame`], offered when progress already exists.
    ResumeGame,
    OpenAssignTeams,
    PickTeam { team_id: String },
    BackToTeams,
    GoHome,
    /// Manual override that unlocks the final clue.
    ShowFinal,
    RetryAssignStation,
    GoToNextStation,
    SubmitCode { code: String },
    RevealCode,
    /// Outcome of a clipboard copy performed by the client.
    ReportCopyResult { ok: bool },
    StartTrivia,
    AnswerTrivia { answer: String },
    NextTrivia,
    ResetGame {
        #[serde(default)]
        confirmed: bool,
    },
    ResetTeamProgress {
        team_id: String,
        #[serde(default)]
        confirmed: bool,
    },
    AddNameSlot,
    UpdateName { index: usize, value: String },
    RandomizeTeams,
    ClearAssignments {
        #[serde(default)]
        confirmed: bool,
    },
}

/// Why an action was refused. The session is left untouched.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ActionError {
    #[error("this action is destructive and must be confirmed")]
    ConfirmationRequired,
    #[error("unknown team `{0}`")]
    UnknownTeam(String),
    #[error("no team is active on this device")]
    NoActiveTeam,
    #[error("the active team has no current station")]
    NoCurrentStation,
    #[error("no trivia question is available")]
    NoTrivia,
    #[error("name slot {0} does not exist")]
    UnknownNameSlot(usize),
}

/// Side effects of one turn.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Transition {
    /// Writes to issue to the shared store, in order.
    pub writes: Vec<RemoteWrite>,
    /// Feedback messages to dismiss after the usual delay.
    pub timed_feedback: Vec<(FeedbackSlot, Uuid)>,
    /// The convergence flag flipped during this turn.
    pub unlocked: bool,
    /// Something the device shows or persists changed.
    pub changed: bool,
}

/// Normalize a typed code: trimmed, upper-cased, without any whitespace.
pub fn normalize_code(value: &str) -> String {
    value
        .trim()
        .to_uppercase()
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect()
}

/// Apply a player action to the device and return the writes it implies.
///
/// The caller must already have merged any draw fetched from the shared store
/// before passing [`Action::StartGame`].
pub fn apply_local_action<R: Rng + ?Sized>(
    device: &mut DeviceSession,
    action: Action,
    catalog: &Catalog,
    rng: &mut R,
    now: i64,
) -> Result<Transition, ActionError> {
    let was_unlocked = device.session.final_unlocked;
    let mut transition = Transition::default();
    let writes = &mut transition.writes;

    match action {
        Action::StartGame | Action::ResumeGame => {
            device.screen = Screen::TeamPicker;
            draw_initial_stations(&mut device.session, catalog, rng, now, writes);
        }
        Action::OpenAssignTeams => device.screen = Screen::AssignTeams,
        Action::PickTeam { team_id } => {
            if !catalog.is_team(&team_id) {
                return Err(ActionError::UnknownTeam(team_id));
            }
            device.session.active_team_id = Some(team_id);
            device.next_station_notice = None;
            device.screen = Screen::Team;
        }
        Action::BackToTeams => {
            device.session.active_team_id = None;
            device.session.trivia.active = false;
            device.screen = Screen::TeamPicker;
        }
        Action::GoHome => {
            device.session.active_team_id = None;
            device.session.trivia.active = false;
            device.screen = Screen::Home;
        }
        Action::ShowFinal => {
            device.session.final_unlocked = true;
            device.session.trivia.active = false;
            device.screen = Screen::Final;
        }
        Action::RetryAssignStation => {
            let team_id = active_team_id(device)?;
            if assign_next_station(&mut device.session, catalog, &team_id, rng, now, writes)
                .is_some()
            {
                push_team_status(&device.session, &team_id, writes);
            }
        }
        Action::GoToNextStation => device.next_station_notice = None,
        Action::SubmitCode { code } => {
            submit_code(device, catalog, &code, rng, now, &mut transition)?;
        }
        Action::RevealCode => {
            let key = device
                .current_step_key()
                .ok_or(ActionError::NoCurrentStation)?;
            device.code_revealed_for = Some(key);
            device.clue_feedback = None;
        }
        Action::ReportCopyResult { ok } => {
            let feedback = if ok {
                Feedback::new(FeedbackKind::Ok, CODE_COPIED)
            } else {
                Feedback::new(FeedbackKind::Warn, COPY_FAILED)
            };
            let id = device.set_feedback(FeedbackSlot::Clue, feedback);
            transition.timed_feedback.push((FeedbackSlot::Clue, id));
        }
        Action::StartTrivia | Action::NextTrivia => {
            if catalog.trivia.is_empty() {
                return Err(ActionError::NoTrivia);
            }
            device.session.trivia.active = true;
            device.trivia_feedback = None;
            pick_question(catalog, &mut device.session.trivia, rng);
        }
        Action::AnswerTrivia { answer } => {
            let question = device
                .session
                .trivia
                .current_question_id
                .as_deref()
                .and_then(|id| catalog.question(id))
                .ok_or(ActionError::NoTrivia)?;
            let feedback = if is_correct(question, &answer) {
                Feedback::new(FeedbackKind::Ok, TRIVIA_CORRECT)
            } else {
                Feedback::new(FeedbackKind::Warn, format!("Oops! It was {}.", question.answer))
            };
            device.set_feedback(FeedbackSlot::Trivia, feedback);
        }
        Action::ResetGame { confirmed } => {
            if !confirmed {
                return Err(ActionError::ConfirmationRequired);
            }
            reset_game(device, catalog, writes);
        }
        Action::ResetTeamProgress { team_id, confirmed } => {
            if !confirmed {
                return Err(ActionError::ConfirmationRequired);
            }
            reset_team_progress(device, catalog, &team_id, writes)?;
        }
        Action::AddNameSlot => {
            device.session.assignments.names.push(String::new());
            writes.push(RemoteWrite::WriteRoster(device.session.assignments.clone()));
        }
        Action::UpdateName { index, value } => {
            let slot = device
                .session
                .assignments
                .names
                .get_mut(index)
                .ok_or(ActionError::UnknownNameSlot(index))?;
            *slot = value;
            writes.push(RemoteWrite::WriteRoster(device.session.assignments.clone()));
        }
        Action::RandomizeTeams => {
            device.session.assignments = randomize_roster(&device.session.assignments, catalog, rng);
            writes.push(RemoteWrite::WriteRoster(device.session.assignments.clone()));
        }
        Action::ClearAssignments { confirmed } => {
            if !confirmed {
                return Err(ActionError::ConfirmationRequired);
            }
            device.session.assignments = Roster::empty(catalog);
            writes.push(RemoteWrite::ClearRoster);
        }
    }

    device.settle(catalog, rng, now, &mut transition.writes);
    transition.unlocked = !was_unlocked && device.session.final_unlocked;
    transition.changed = true;
    Ok(transition)
}

fn active_team_id(device: &DeviceSession) -> Result<String, ActionError> {
    device
        .session
        .active_team()
        .map(|team| team.id.clone())
        .ok_or(ActionError::NoActiveTeam)
}

fn push_team_status(session: &LocalSession, team_id: &str, writes: &mut Vec<RemoteWrite>) {
    if let Some(team) = session.team(team_id) {
        writes.push(RemoteWrite::PersistTeamStatus(TeamStatus::from(team)));
    }
}

fn all_team_statuses(session: &LocalSession) -> Vec<TeamStatus> {
    session.teams.iter().map(TeamStatus::from).collect()
}

fn submit_code<R: Rng + ?Sized>(
    device: &mut DeviceSession,
    catalog: &Catalog,
    code: &str,
    rng: &mut R,
    now: i64,
    transition: &mut Transition,
) -> Result<(), ActionError> {
    let team_id = active_team_id(device)?;
    let station = device
        .session
        .team(&team_id)
        .and_then(|team| team.current_station_id.as_deref())
        .and_then(|id| catalog.station(id))
        .ok_or(ActionError::NoCurrentStation)?;

    let entered = normalize_code(code);
    if entered.is_empty() || entered != normalize_code(&station.code) {
        let id = device.set_feedback(
            FeedbackSlot::Code,
            Feedback::new(FeedbackKind::Warn, CODE_REJECTED),
        );
        transition.timed_feedback.push((FeedbackSlot::Code, id));
        return Ok(());
    }

    let station_id = station.id.clone();
    let max_stations = catalog.max_stations();
    let writes = &mut transition.writes;
    let finished = match device.session.team_mut(&team_id) {
        Some(team) => {
            team.record_completion(&station_id, max_stations);
            team.current_station_id = None;
            team.completed
        }
        None => return Err(ActionError::NoActiveTeam),
    };
    device
        .session
        .set_occupancy(&station_id, StationOccupancy::open());
    writes.push(RemoteWrite::ReleaseStation {
        station_id: station_id.clone(),
    });
    writes.push(RemoteWrite::CompleteStationForTeam {
        team_id: team_id.clone(),
        station_id: station_id.clone(),
    });
    writes.push(RemoteWrite::ClearTeamAssignment {
        team_id: team_id.clone(),
    });

    device.next_station_notice = None;
    if finished {
        push_team_status(&device.session, &team_id, writes);
        writes.push(RemoteWrite::PersistAllTeamStatuses(all_team_statuses(
            &device.session,
        )));
    } else {
        device.next_station_notice =
            assign_next_station(&mut device.session, catalog, &team_id, rng, now, writes);
        push_team_status(&device.session, &team_id, writes);
    }

    let id = device.set_feedback(
        FeedbackSlot::Code,
        Feedback::new(FeedbackKind::Ok, CODE_ACCEPTED),
    );
    transition.timed_feedback.push((FeedbackSlot::Code, id));
    Ok(())
}

/// Wipe the game everywhere. The roster survives.
fn reset_game(device: &mut DeviceSession, catalog: &Catalog, writes: &mut Vec<RemoteWrite>) {
    writes.push(RemoteWrite::ClearAllStationData);
    for team_id in catalog.team_ids() {
        writes.push(RemoteWrite::ClearTeamAssignment {
            team_id: team_id.to_owned(),
        });
        writes.push(RemoteWrite::ClearTeamProgress {
            team_id: team_id.to_owned(),
        });
    }
    writes.push(RemoteWrite::ClearInitialStationAssignment);

    let roster = std::mem::take(&mut device.session.assignments);
    device.session = LocalSession::new(catalog);
    device.session.assignments = roster;
    device.session.assignments.normalize(catalog);
    writes.push(RemoteWrite::PersistAllTeamStatuses(all_team_statuses(
        &device.session,
    )));

    device.clear_all_feedback();
    device.screen = Screen::Home;
}

fn reset_team_progress(
    device: &mut DeviceSession,
    catalog: &Catalog,
    team_id: &str,
    writes: &mut Vec<RemoteWrite>,
) -> Result<(), ActionError> {
    let team = device
        .session
        .team_mut(team_id)
        .ok_or_else(|| ActionError::UnknownTeam(team_id.to_owned()))?;
    let held = team.current_station_id.take();
    team.reset();

    if let Some(station_id) = held {
        device
            .session
            .set_occupancy(&station_id, StationOccupancy::open());
        writes.push(RemoteWrite::ReleaseStation { station_id });
    }
    writes.push(RemoteWrite::ClearTeamAssignment {
        team_id: team_id.to_owned(),
    });
    writes.push(RemoteWrite::ClearTeamProgress {
        team_id: team_id.to_owned(),
    });
    push_team_status(&device.session, team_id, writes);

    if device.session.active_team_id.as_deref() == Some(team_id) {
        device.session.active_team_id = None;
    }
    // Unlike merges, an explicit reset recomputes the flag exactly.
    device.session.final_unlocked = device
        .session
        .all_teams_completed(catalog.max_stations());
    device.clear_all_feedback();
    device.screen = Screen::TeamPicker;
    Ok(())
}

/// Shuffle the trimmed, non-empty names and deal them round-robin over the teams.
fn randomize_roster<R: Rng + ?Sized>(roster: &Roster, catalog: &Catalog, rng: &mut R) -> Roster {
    let mut names: Vec<String> = roster
        .names
        .iter()
        .map(|name| name.trim().to_owned())
        .filter(|name| !name.is_empty())
        .collect();
    names.shuffle(rng);

    let mut dealt = Roster {
        names: roster.names.clone(),
        ..Roster::empty(catalog)
    };
    if catalog.teams.is_empty() {
        return dealt;
    }
    for (index, name) in names.into_iter().enumerate() {
        let team = &catalog.teams[index % catalog.teams.len()];
        dealt.teams.entry(team.id.clone()).or_default().push(name);
    }
    dealt
}

#[cfg(test)]
mod tests {
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;
    use crate::state::catalog::fixtures;

    fn device(catalog: &Catalog) -> DeviceSession {
        DeviceSession::new(LocalSession::new(catalog))
    }

    fn apply(
        device: &mut DeviceSession,
        catalog: &Catalog,
        rng: &mut StdRng,
        action: Action,
    ) -> Result<Transition, ActionError> {
        apply_local_action(device, action, catalog, rng, 1_000)
    }

    fn assert_flags_derived(device: &DeviceSession, catalog: &Catalog) {
        for team in &device.session.teams {
            assert_eq!(
                team.completed,
                team.completed_count() >= catalog.max_stations(),
                "flag drifted for {}",
                team.id
            );
        }
    }

    #[test]
    fn actions_deserialize_from_tagged_json() {
        let action: Action =
            serde_json::from_str(r#"{"type": "pick_team", "team_id": "red"}"#).unwrap();
        assert_eq!(
            action,
            Action::PickTeam {
                team_id: "red".into()
            }
        );
        let action: Action = serde_json::from_str(r#"{"type": "reset_game"}"#).unwrap();
        assert_eq!(action, Action::ResetGame { confirmed: false });
    }

    #[test]
    fn codes_are_normalized_before_comparison() {
        assert_eq!(normalize_code("  co de a \t"), "CODEA");
        assert_eq!(normalize_code(""), "");
    }

    #[test]
    fn start_game_seats_every_team_on_a_distinct_station() {
        let catalog = fixtures::catalog();
        let mut device = device(&catalog);
        let mut rng = StdRng::seed_from_u64(42);

        let transition = apply(&mut device, &catalog, &mut rng, Action::StartGame).unwrap();

        assert_eq!(device.screen, Screen::TeamPicker);
        let order = device.session.initial_station_order.clone().unwrap();
        let mut held: Vec<_> = device
            .session
            .teams
            .iter()
            .map(|team| team.current_station_id.clone().unwrap())
            .collect();
        held.sort();
        held.dedup();
        assert_eq!(held.len(), 4);
        assert!(matches!(
            transition.writes.as_slice(),
            [RemoteWrite::WriteInitialStationAssignment { order: written, .. }] if *written == order
        ));

        // Pressing again never redraws.
        let again = apply(&mut device, &catalog, &mut rng, Action::ResumeGame).unwrap();
        assert_eq!(device.session.initial_station_order, Some(order));
        assert!(again.writes.is_empty());
    }

    #[test]
    fn correct_code_completes_frees_and_moves_on() {
        let catalog = fixtures::catalog();
        let mut device = device(&catalog);
        let mut rng = StdRng::seed_from_u64(9);
        apply(&mut device, &catalog, &mut rng, Action::StartGame).unwrap();
        apply(
            &mut device,
            &catalog,
            &mut rng,
            Action::PickTeam {
                team_id: "red".into(),
            },
        )
        .unwrap();

        let first = device.session.teams[0].current_station_id.clone().unwrap();
        let code = format!(" {} ", catalog.station(&first).unwrap().code.to_lowercase());
        let transition =
            apply(&mut device, &catalog, &mut rng, Action::SubmitCode { code }).unwrap();

        let red = &device.session.teams[0];
        assert_eq!(red.completed_count(), 1);
        assert!(red.has_completed(&first));
        let next = red.current_station_id.clone().unwrap();
        assert_ne!(next, first);
        assert!(device.session.station_occupancy[&first].is_open());
        assert_eq!(device.session.station_occupancy[&next].holder(), Some("red"));
        for other in &device.session.teams[1..] {
            assert_ne!(other.current_station_id.as_ref(), Some(&next));
        }
        assert_eq!(device.next_station_notice.as_ref(), Some(&next));
        assert_eq!(device.code_feedback.as_ref().unwrap().text, CODE_ACCEPTED);
        assert_eq!(transition.timed_feedback.len(), 1);
        assert!(transition.writes.contains(&RemoteWrite::CompleteStationForTeam {
            team_id: "red".into(),
            station_id: first.clone(),
        }));
        assert!(transition.writes.contains(&RemoteWrite::PersistTeamStatus(TeamStatus {
            team_id: "red".into(),
            step_index: 1,
            completed: false,
        })));
        assert_flags_derived(&device, &catalog);
    }

    #[test]
    fn wrong_code_changes_nothing_but_feedback() {
        let catalog = fixtures::catalog();
        let mut device = device(&catalog);
        let mut rng = StdRng::seed_from_u64(9);
        apply(&mut device, &catalog, &mut rng, Action::StartGame).unwrap();
        apply(
            &mut device,
            &catalog,
            &mut rng,
            Action::PickTeam {
                team_id: "red".into(),
            },
        )
        .unwrap();
        let before = device.session.clone();

        let transition = apply(
            &mut device,
            &catalog,
            &mut rng,
            Action::SubmitCode {
                code: "nope".into(),
            },
        )
        .unwrap();

        assert_eq!(device.session, before);
        assert!(transition.writes.is_empty());
        assert_eq!(device.code_feedback.as_ref().unwrap().kind, FeedbackKind::Warn);
    }

    #[test]
    fn last_station_of_last_team_unlocks_final() {
        let catalog = fixtures::catalog();
        let mut device = device(&catalog);
        let mut rng = StdRng::seed_from_u64(1);
        for team in &mut device.session.teams {
            for id in ["A", "B", "C", "D", "E"] {
                team.record_completion(id, 5);
            }
        }
        let red = &mut device.session.teams[0];
        red.completed_station_ids.shift_remove("E");
        red.refresh_completed(5);
        red.current_station_id = Some("E".into());
        device.session.set_occupancy("E", StationOccupancy::occupied("red", 1));
        device.session.active_team_id = Some("red".into());
        device.session.trivia.active = true;
        device.screen = Screen::Team;

        let transition = apply(
            &mut device,
            &catalog,
            &mut rng,
            Action::SubmitCode {
                code: "codee".into(),
            },
        )
        .unwrap();

        assert!(transition.unlocked);
        assert!(device.session.final_unlocked);
        assert_eq!(device.screen, Screen::Final);
        assert!(!device.session.trivia.active);
        assert!(
            transition
                .writes
                .iter()
                .any(|w| matches!(w, RemoteWrite::PersistAllTeamStatuses(s) if s.len() == 4))
        );
        assert_flags_derived(&device, &catalog);
    }

    #[test]
    fn team_reset_releases_station_and_recomputes_final() {
        let catalog = fixtures::catalog();
        let mut device = device(&catalog);
        let mut rng = StdRng::seed_from_u64(1);
        for team in &mut device.session.teams {
            for id in ["A", "B", "C", "D", "E"] {
                team.record_completion(id, 5);
            }
        }
        device.session.final_unlocked = true;
        let blue = &mut device.session.teams[1];
        blue.current_station_id = Some("C".into());
        blue.sticky_choices.insert("C".into(), "r1".into());
        device.session.set_occupancy("C", StationOccupancy::occupied("blue", 1));
        device.session.active_team_id = Some("blue".into());

        let refused = apply(
            &mut device,
            &catalog,
            &mut rng,
            Action::ResetTeamProgress {
                team_id: "blue".into(),
                confirmed: false,
            },
        );
        assert_eq!(refused, Err(ActionError::ConfirmationRequired));
        assert_eq!(device.session.teams[1].completed_count(), 5);

        let transition = apply(
            &mut device,
            &catalog,
            &mut rng,
            Action::ResetTeamProgress {
                team_id: "blue".into(),
                confirmed: true,
            },
        )
        .unwrap();

        let blue = &device.session.teams[1];
        assert_eq!(blue.completed_count(), 0);
        assert!(!blue.completed);
        assert_eq!(blue.current_station_id, None);
        assert!(blue.sticky_choices.is_empty());
        assert!(device.session.station_occupancy["C"].is_open());
        assert!(!device.session.final_unlocked);
        assert_eq!(device.session.active_team_id, None);
        assert_eq!(device.screen, Screen::TeamPicker);
        assert!(transition.writes.contains(&RemoteWrite::ReleaseStation {
            station_id: "C".into()
        }));
        assert!(transition.writes.contains(&RemoteWrite::ClearTeamProgress {
            team_id: "blue".into()
        }));
        assert_flags_derived(&device, &catalog);
    }

    #[test]
    fn full_reset_clears_everything_but_the_roster() {
        let catalog = fixtures::catalog();
        let mut device = device(&catalog);
        let mut rng = StdRng::seed_from_u64(4);
        device.session.assignments.names = vec!["Ada".into()];
        apply(&mut device, &catalog, &mut rng, Action::StartGame).unwrap();
        device.session.teams[2].record_completion("A", 5);

        assert_eq!(
            apply(&mut device, &catalog, &mut rng, Action::ResetGame { confirmed: false }),
            Err(ActionError::ConfirmationRequired)
        );
        let transition =
            apply(&mut device, &catalog, &mut rng, Action::ResetGame { confirmed: true }).unwrap();

        let mut expected = LocalSession::new(&catalog);
        expected.assignments.names = vec!["Ada".into()];
        assert_eq!(device.session, expected);
        assert_eq!(device.screen, Screen::Home);
        assert_eq!(transition.writes.first(), Some(&RemoteWrite::ClearAllStationData));
        assert!(
            transition
                .writes
                .contains(&RemoteWrite::ClearInitialStationAssignment)
        );
    }

    #[test]
    fn trivia_flow_reports_answers() {
        let catalog = fixtures::catalog();
        let mut device = device(&catalog);
        let mut rng = StdRng::seed_from_u64(4);

        apply(&mut device, &catalog, &mut rng, Action::StartTrivia).unwrap();
        assert!(device.session.trivia.active);
        apply(
            &mut device,
            &catalog,
            &mut rng,
            Action::AnswerTrivia {
                answer: "no".into(),
            },
        )
        .unwrap();
        assert_eq!(
            device.trivia_feedback.as_ref().unwrap().text,
            "Oops! It was yes."
        );
        apply(
            &mut device,
            &catalog,
            &mut rng,
            Action::AnswerTrivia {
                answer: "yes".into(),
            },
        )
        .unwrap();
        assert_eq!(device.trivia_feedback.as_ref().unwrap().text, TRIVIA_CORRECT);

        apply(&mut device, &catalog, &mut rng, Action::NextTrivia).unwrap();
        assert!(device.trivia_feedback.is_none());
        assert_eq!(device.session.trivia.used_question_ids.len(), 2);
    }

    #[test]
    fn randomize_deals_trimmed_names_round_robin() {
        let catalog = fixtures::catalog();
        let mut device = device(&catalog);
        let mut rng = StdRng::seed_from_u64(8);
        for _ in 0..6 {
            apply(&mut device, &catalog, &mut rng, Action::AddNameSlot).unwrap();
        }
        for (index, name) in [" Ada ", "", "Bo", "Cy", "  ", "Di"].into_iter().enumerate() {
            apply(
                &mut device,
                &catalog,
                &mut rng,
                Action::UpdateName {
                    index,
                    value: name.into(),
                },
            )
            .unwrap();
        }
        assert_eq!(
            apply(
                &mut device,
                &catalog,
                &mut rng,
                Action::UpdateName {
                    index: 9,
                    value: "Ed".into()
                }
            ),
            Err(ActionError::UnknownNameSlot(9))
        );

        let transition = apply(&mut device, &catalog, &mut rng, Action::RandomizeTeams).unwrap();
        let roster = &device.session.assignments;
        let mut dealt: Vec<_> = roster.teams.values().flatten().cloned().collect();
        dealt.sort();
        assert_eq!(dealt, ["Ada", "Bo", "Cy", "Di"]);
        assert!(roster.teams.values().all(|names| names.len() == 1));
        assert_eq!(roster.names.len(), 6);
        assert_eq!(
            transition.writes,
            vec![RemoteWrite::WriteRoster(roster.clone())]
        );

        apply(
            &mut device,
            &catalog,
            &mut rng,
            Action::ClearAssignments { confirmed: true },
        )
        .unwrap();
        assert_eq!(device.session.assignments, Roster::empty(&catalog));
    }

    #[test]
    fn code_clue_reveal_and_copy_feedback() {
        let catalog = fixtures::catalog();
        let mut device = device(&catalog);
        let mut rng = StdRng::seed_from_u64(4);
        assert_eq!(
            apply(&mut device, &catalog, &mut rng, Action::RevealCode),
            Err(ActionError::NoCurrentStation)
        );

        apply(
            &mut device,
            &catalog,
            &mut rng,
            Action::PickTeam {
                team_id: "green".into(),
            },
        )
        .unwrap();
        apply(&mut device, &catalog, &mut rng, Action::RevealCode).unwrap();
        assert!(device.code_revealed());

        let transition = apply(
            &mut device,
            &catalog,
            &mut rng,
            Action::ReportCopyResult { ok: false },
        )
        .unwrap();
        assert_eq!(device.clue_feedback.as_ref().unwrap().text, COPY_FAILED);
        assert_eq!(transition.timed_feedback[0].0, FeedbackSlot::Clue);
    }
}
