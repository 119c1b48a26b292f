//! Station allocation: the next open station for a team and the one-time
//! opening draw.

use std::collections::BTreeSet;

use rand::{
    Rng,
    seq::{IndexedRandom, SliceRandom},
};

use crate::state::{
    catalog::Catalog,
    remote::RemoteWrite,
    session::{LocalSession, StationOccupancy},
};

/// Number of teams (and opening stations) covered by the draw.
pub const DRAW_SIZE: usize = 4;

/// Result of [`draw_initial_stations`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrawOutcome {
    /// A new draw was made; holds the station order.
    Drawn(Vec<String>),
    /// A draw already existed; holds the teams put back on their drawn station.
    Reseated(Vec<String>),
    /// The content does not fit a draw (team or station count).
    Skipped,
}

/// A draw is exactly [`DRAW_SIZE`] distinct, known station ids.
pub fn is_well_formed_draw(order: &[String], catalog: &Catalog) -> bool {
    let distinct: BTreeSet<&str> = order.iter().map(String::as_str).collect();
    order.len() == DRAW_SIZE
        && distinct.len() == DRAW_SIZE
        && order.iter().all(|id| catalog.is_station(id))
}

/// Pick a random open station the team has not completed yet, mark it held
/// by the team locally and queue the matching writes.
///
/// Returns `None` when the team is unknown, done, already placed, or nothing
/// is open; the caller shows the waiting state.
pub fn assign_next_station<R: Rng + ?Sized>(
    session: &mut LocalSession,
    catalog: &Catalog,
    team_id: &str,
    rng: &mut R,
    now: i64,
    writes: &mut Vec<RemoteWrite>,
) -> Option<String> {
    let team = session.team(team_id)?;
    if team.completed || team.current_station_id.is_some() {
        return None;
    }

    let available: Vec<&str> = catalog
        .station_ids()
        .filter(|id| !team.has_completed(id) && session.is_open(id))
        .collect();
    let chosen = available.choose(rng)?.to_string();

    session.set_occupancy(&chosen, StationOccupancy::occupied(team_id, now));
    if let Some(team) = session.team_mut(team_id) {
        team.current_station_id = Some(chosen.clone());
    }
    writes.push(RemoteWrite::OccupyStation {
        station_id: chosen.clone(),
        team_id: team_id.to_owned(),
    });
    writes.push(RemoteWrite::AssignTeamToStation {
        team_id: team_id.to_owned(),
        station_id: chosen.clone(),
    });
    Some(chosen)
}

/// Give each of the first [`DRAW_SIZE`] teams a distinct opening station.
///
/// The draw is made at most once: when the session already knows one, teams
/// without a station are re-seated on their drawn station instead, as long as
/// it is still free for them and not already completed.
pub fn draw_initial_stations<R: Rng + ?Sized>(
    session: &mut LocalSession,
    catalog: &Catalog,
    rng: &mut R,
    now: i64,
    writes: &mut Vec<RemoteWrite>,
) -> DrawOutcome {
    if session.teams.len() != DRAW_SIZE || catalog.max_stations() < DRAW_SIZE {
        return DrawOutcome::Skipped;
    }

    if let Some(order) = session.initial_station_order.clone() {
        let mut reseated = Vec::new();
        for (index, station_id) in order.iter().enumerate() {
            let team = &session.teams[index];
            let free_for_team = session
                .station_occupancy
                .get(station_id)
                .is_some_and(|occupancy| occupancy.holder().is_none_or(|holder| holder == team.id));
            if team.current_station_id.is_some()
                || team.completed
                || team.has_completed(station_id)
                || !free_for_team
            {
                continue;
            }

            let team_id = team.id.clone();
            session.set_occupancy(station_id, StationOccupancy::occupied(&team_id, now));
            session.teams[index].current_station_id = Some(station_id.clone());
            writes.push(RemoteWrite::OccupyStation {
                station_id: station_id.clone(),
                team_id: team_id.clone(),
            });
            writes.push(RemoteWrite::AssignTeamToStation {
                team_id: team_id.clone(),
                station_id: station_id.clone(),
            });
            reseated.push(team_id);
        }
        return DrawOutcome::Reseated(reseated);
    }

    let mut order: Vec<String> = catalog.station_ids().map(str::to_owned).collect();
    order.shuffle(rng);
    order.truncate(DRAW_SIZE);
    let team_ids: Vec<String> = session.teams.iter().map(|team| team.id.clone()).collect();

    for (team_id, station_id) in team_ids.iter().zip(&order) {
        session.set_occupancy(station_id, StationOccupancy::occupied(team_id, now));
        if let Some(team) = session.team_mut(team_id) {
            team.current_station_id = Some(station_id.clone());
        }
    }
    session.initial_station_order = Some(order.clone());
    writes.push(RemoteWrite::WriteInitialStationAssignment {
        team_ids,
        order: order.clone(),
    });
    DrawOutcome::Drawn(order)
}

#[cfg(test)]
mod tests {
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;
    use crate::state::catalog::fixtures;

    #[test]
    fn draw_gives_four_distinct_valid_stations() {
        let catalog = fixtures::catalog();
        for seed in 0..32 {
            let mut session = LocalSession::new(&catalog);
            let mut writes = Vec::new();
            let outcome = draw_initial_stations(
                &mut session,
                &catalog,
                &mut StdRng::seed_from_u64(seed),
                1,
                &mut writes,
            );

            let DrawOutcome::Drawn(order) = outcome else {
                panic!("expected a fresh draw");
            };
            assert!(is_well_formed_draw(&order, &catalog));
            assert_eq!(session.initial_station_order.as_ref(), Some(&order));
            for (team, station_id) in session.teams.iter().zip(&order) {
                assert_eq!(team.current_station_id.as_ref(), Some(station_id));
                assert_eq!(session.station_occupancy[station_id].holder(), Some(team.id.as_str()));
            }
            assert_eq!(writes.len(), 1);
        }
    }

    #[test]
    fn existing_draw_is_never_replaced() {
        let catalog = fixtures::catalog();
        let mut session = LocalSession::new(&catalog);
        let order: Vec<String> = ["E", "D", "C", "B"].map(String::from).to_vec();
        session.initial_station_order = Some(order.clone());
        // Blue already moved on, yellow's drawn station is taken.
        session.teams[1].current_station_id = Some("A".into());
        session.set_occupancy("A", StationOccupancy::occupied("blue", 1));
        session.set_occupancy("B", StationOccupancy::occupied("green", 1));

        let mut writes = Vec::new();
        let outcome = draw_initial_stations(
            &mut session,
            &catalog,
            &mut StdRng::seed_from_u64(7),
            2,
            &mut writes,
        );

        assert_eq!(
            outcome,
            DrawOutcome::Reseated(vec!["red".into(), "green".into()])
        );
        assert_eq!(session.initial_station_order, Some(order));
        assert_eq!(session.teams[0].current_station_id.as_deref(), Some("E"));
        assert_eq!(session.teams[1].current_station_id.as_deref(), Some("A"));
        assert_eq!(session.teams[3].current_station_id, None);
        assert!(
            !writes
                .iter()
                .any(|w| matches!(w, RemoteWrite::WriteInitialStationAssignment { .. }))
        );
    }

    #[test]
    fn draw_is_skipped_without_four_teams() {
        let mut catalog = fixtures::catalog();
        catalog.teams.pop();
        let mut session = LocalSession::new(&catalog);
        let mut writes = Vec::new();
        let outcome = draw_initial_stations(
            &mut session,
            &catalog,
            &mut StdRng::seed_from_u64(1),
            1,
            &mut writes,
        );
        assert_eq!(outcome, DrawOutcome::Skipped);
        assert!(writes.is_empty());
    }

    #[test]
    fn malformed_draws_are_rejected() {
        let catalog = fixtures::catalog();
        let draw = |ids: &[&str]| ids.iter().map(|id| id.to_string()).collect::<Vec<_>>();
        assert!(is_well_formed_draw(&draw(&["A", "B", "C", "D"]), &catalog));
        assert!(!is_well_formed_draw(&draw(&["A", "B", "C"]), &catalog));
        assert!(!is_well_formed_draw(&draw(&["A", "B", "C", "C"]), &catalog));
        assert!(!is_well_formed_draw(&draw(&["A", "B", "C", "Z"]), &catalog));
    }

    #[test]
    fn next_station_is_open_and_not_completed() {
        let catalog = fixtures::catalog();
        for seed in 0..32 {
            let mut session = LocalSession::new(&catalog);
            session.teams[0].record_completion("A", 5);
            session.set_occupancy("B", StationOccupancy::occupied("blue", 1));
            session.set_occupancy("C", StationOccupancy::occupied("green", 1));

            let mut writes = Vec::new();
            let chosen = assign_next_station(
                &mut session,
                &catalog,
                "red",
                &mut StdRng::seed_from_u64(seed),
                5,
                &mut writes,
            )
            .unwrap();

            assert!(chosen == "D" || chosen == "E");
            assert_eq!(session.teams[0].current_station_id.as_ref(), Some(&chosen));
            assert_eq!(session.station_occupancy[&chosen].holder(), Some("red"));
            assert_eq!(
                writes,
                vec![
                    RemoteWrite::OccupyStation {
                        station_id: chosen.clone(),
                        team_id: "red".into()
                    },
                    RemoteWrite::AssignTeamToStation {
                        team_id: "red".into(),
                        station_id: chosen.clone()
                    },
                ]
            );
        }
    }

    #[test]
    fn nothing_open_means_waiting() {
        let catalog = fixtures::catalog();
        let mut session = LocalSession::new(&catalog);
        for id in ["B", "C", "D", "E"] {
            session.set_occupancy(id, StationOccupancy::occupied("blue", 1));
        }
        session.teams[0].record_completion("A", 5);

        let mut writes = Vec::new();
        let mut rng = StdRng::seed_from_u64(3);
        assert_eq!(
            assign_next_station(&mut session, &catalog, "red", &mut rng, 1, &mut writes),
            None
        );
        assert!(writes.is_empty());

        // A finished team is never placed.
        for id in ["B", "C", "D", "E"] {
            session.teams[1].record_completion(id, 5);
        }
        session.teams[1].record_completion("A", 5);
        session.set_occupancy("E", StationOccupancy::open());
        assert_eq!(
            assign_next_station(&mut session, &catalog, "blue", &mut rng, 1, &mut writes),
            None
        );
    }
}
