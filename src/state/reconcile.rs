//! Merging shared-store deliveries into the local session.
//!
//! Occupancy, pointers and the roster follow the store. Completed sets never
//! shrink. Whatever the store says, a merge ends with the session healed: no
//! team keeps a pointer to a station another team holds and the active team
//! does not hold stations it is not standing on.

use rand::Rng;
use tracing::debug;

use crate::state::{
    actions::Transition,
    allocator::is_well_formed_draw,
    catalog::Catalog,
    device::{DeviceSession, Screen},
    remote::{RemoteSnapshot, RemoteTeamStatus, RemoteWrite},
    session::StationOccupancy,
};

/// Merge a (partial) snapshot of the station data and roster collections.
pub fn merge_remote<R: Rng + ?Sized>(
    device: &mut DeviceSession,
    snapshot: RemoteSnapshot,
    catalog: &Catalog,
    rng: &mut R,
    now: i64,
) -> Transition {
    let before = device.clone();
    let max_stations = catalog.max_stations();
    let session = &mut device.session;

    if let Some(occupancy) = snapshot.occupancy {
        for (station_id, remote) in occupancy {
            if !catalog.is_station(&station_id) {
                continue;
            }
            if session.station_occupancy.get(&station_id) != Some(&remote) {
                session.set_occupancy(&station_id, remote);
            }
        }
    }

    if let Some(assignments) = snapshot.assignments {
        for (team_id, pointer) in assignments {
            if pointer.as_deref().is_some_and(|id| !catalog.is_station(id)) {
                continue;
            }
            if let Some(team) = session.team_mut(&team_id) {
                team.current_station_id = pointer;
            }
        }
    }

    if let Some(progress) = snapshot.progress {
        for (team_id, station_ids) in progress {
            let Some(team) = session.team_mut(&team_id) else {
                continue;
            };
            let mut remote: Vec<String> = Vec::with_capacity(station_ids.len());
            for id in station_ids {
                if catalog.is_station(&id) && !remote.contains(&id) {
                    remote.push(id);
                }
            }
            if remote.len() >= team.completed_count() {
                team.replace_completed(remote, max_stations);
            } else {
                debug!(team = %team_id, remote = remote.len(), local = team.completed_count(), "ignoring stale progress");
            }
        }
    }

    if let Some(order) = snapshot.initial_draw {
        if is_well_formed_draw(&order, catalog)
            && session.initial_station_order.as_ref() != Some(&order)
        {
            session.initial_station_order = Some(order);
        }
    }

    if let Some(mut roster) = snapshot.roster {
        roster.normalize(catalog);
        if session.assignments != roster {
            session.assignments = roster;
        }
    }

    finish_merge(device, before, catalog, rng, now)
}

/// Merge progress summaries. A remote count above the local one pads the
/// completed set with catalog stations in catalog order; nothing is removed.
pub fn merge_team_statuses<R: Rng + ?Sized>(
    device: &mut DeviceSession,
    statuses: Vec<RemoteTeamStatus>,
    catalog: &Catalog,
    rng: &mut R,
    now: i64,
) -> Transition {
    let before = device.clone();
    let max_stations = catalog.max_stations();

    for status in statuses {
        let Some(step_index) = status.step_index else {
            continue;
        };
        let Some(team) = device.session.team_mut(&status.team_id) else {
            continue;
        };
        let target = step_index.min(max_stations);
        if target <= team.completed_count() {
            continue;
        }
        for station_id in catalog.station_ids() {
            if team.completed_count() >= target {
                break;
            }
            team.completed_station_ids.insert(station_id.to_owned());
        }
        team.refresh_completed(max_stations);
    }

    finish_merge(device, before, catalog, rng, now)
}

fn finish_merge<R: Rng + ?Sized>(
    device: &mut DeviceSession,
    before: DeviceSession,
    catalog: &Catalog,
    rng: &mut R,
    now: i64,
) -> Transition {
    let mut transition = Transition::default();
    if *device == before {
        return transition;
    }

    // Pointers lose to occupancy held by another team.
    let session = &mut device.session;
    let mut displaced = Vec::new();
    for index in 0..session.teams.len() {
        let team = &session.teams[index];
        let Some(station_id) = team.current_station_id.as_deref() else {
            continue;
        };
        let held_by_other = session
            .station_occupancy
            .get(station_id)
            .and_then(StationOccupancy::holder)
            .is_some_and(|holder| holder != team.id);
        if held_by_other {
            displaced.push(team.id.clone());
            session.teams[index].current_station_id = None;
        }
    }

    if device.session.active_team_id.is_none() && device.screen == Screen::Team {
        device.screen = Screen::TeamPicker;
    }
    device.settle(catalog, rng, now, &mut transition.writes);
    // Remote frees reach the active team on any screen.
    if device.screen != Screen::Team {
        device.place_active_team(catalog, rng, now, &mut transition.writes);
    }

    if let Some(team) = device.session.active_team() {
        let team_id = team.id.clone();
        if team.current_station_id.is_none() && displaced.contains(&team_id) {
            transition
                .writes
                .push(RemoteWrite::ClearTeamAssignment { team_id: team_id.clone() });
        }
        release_orphans(device, &team_id, &mut transition.writes);
    }

    transition.unlocked = !before.session.final_unlocked && device.session.final_unlocked;
    transition.changed = *device != before;
    transition
}

/// Free stations the team holds besides its current one.
fn release_orphans(device: &mut DeviceSession, team_id: &str, writes: &mut Vec<RemoteWrite>) {
    let current = device
        .session
        .team(team_id)
        .and_then(|team| team.current_station_id.clone());
    let orphans: Vec<String> = device
        .session
        .station_occupancy
        .iter()
        .filter(|(station_id, occupancy)| {
            occupancy.holder() == Some(team_id) && current.as_ref() != Some(*station_id)
        })
        .map(|(station_id, _)| station_id.clone())
        .collect();
    for station_id in orphans {
        debug!(team = %team_id, station = %station_id, "releasing orphaned station");
        device
            .session
            .set_occupancy(&station_id, StationOccupancy::open());
        writes.push(RemoteWrite::ReleaseStation { station_id });
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use proptest::prelude::*;
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;
    use crate::state::{catalog::fixtures, session::LocalSession};

    fn device() -> (Catalog, DeviceSession) {
        let catalog = fixtures::catalog();
        let device = DeviceSession::new(LocalSession::new(&catalog));
        (catalog, device)
    }

    fn ids(values: &[&str]) -> Vec<String> {
        values.iter().map(|id| id.to_string()).collect()
    }

    fn progress(team_id: &str, values: &[&str]) -> RemoteSnapshot {
        RemoteSnapshot {
            progress: Some(BTreeMap::from([(team_id.to_owned(), ids(values))])),
            ..RemoteSnapshot::default()
        }
    }

    #[test]
    fn stale_remote_count_never_regresses() {
        let (catalog, mut device) = device();
        let mut rng = StdRng::seed_from_u64(1);
        for id in ["A", "B", "C"] {
            device.session.teams[0].record_completion(id, 5);
        }

        let transition = merge_remote(&mut device, progress("red", &["A", "B"]), &catalog, &mut rng, 1);
        assert!(!transition.changed);
        assert_eq!(device.session.teams[0].completed_count(), 3);

        merge_remote(&mut device, progress("red", &["A", "B", "C", "D"]), &catalog, &mut rng, 1);
        assert_eq!(device.session.teams[0].completed_count(), 4);
        assert!(!device.session.teams[0].completed);
    }

    #[test]
    fn remote_progress_is_deduplicated_and_filtered() {
        let (catalog, mut device) = device();
        let mut rng = StdRng::seed_from_u64(1);
        merge_remote(&mut device, progress("blue", &["A", "A", "Z", "B"]), &catalog, &mut rng, 1);
        let blue = device.session.team("blue").unwrap();
        assert_eq!(blue.completed_station_ids.iter().collect::<Vec<_>>(), ["A", "B"]);
    }

    #[test]
    fn remote_completion_of_every_team_unlocks_final() {
        let (catalog, mut device) = device();
        let mut rng = StdRng::seed_from_u64(1);
        device.session.trivia.active = true;
        device.screen = Screen::TeamPicker;

        let all = ["A", "B", "C", "D", "E"];
        let snapshot = RemoteSnapshot {
            progress: Some(
                catalog
                    .team_ids()
                    .map(|id| (id.to_owned(), ids(&all)))
                    .collect(),
            ),
            ..RemoteSnapshot::default()
        };
        let transition = merge_remote(&mut device, snapshot.clone(), &catalog, &mut rng, 1);
        assert!(transition.unlocked);
        assert!(device.session.final_unlocked);
        assert!(!device.session.trivia.active);
        assert_eq!(device.screen, Screen::Final);

        // Duplicate delivery is a no-op.
        let again = merge_remote(&mut device, snapshot, &catalog, &mut rng, 1);
        assert!(!again.unlocked);
        assert!(!again.changed);
    }

    #[test]
    fn explicit_null_pointer_clears_and_absent_row_keeps() {
        let (catalog, mut device) = device();
        let mut rng = StdRng::seed_from_u64(1);
        device.session.teams[0].current_station_id = Some("A".into());
        device.session.teams[1].current_station_id = Some("B".into());

        let snapshot = RemoteSnapshot {
            assignments: Some(BTreeMap::from([("red".to_owned(), None)])),
            ..RemoteSnapshot::default()
        };
        merge_remote(&mut device, snapshot, &catalog, &mut rng, 1);
        assert_eq!(device.session.teams[0].current_station_id, None);
        assert_eq!(device.session.teams[1].current_station_id.as_deref(), Some("B"));
    }

    #[test]
    fn displaced_active_team_moves_and_releases_its_old_claim() {
        let (catalog, mut device) = device();
        let mut rng = StdRng::seed_from_u64(3);
        // Red believes it holds A; the store says blue won A.
        device.session.active_team_id = Some("red".into());
        device.screen = Screen::Team;
        device.session.teams[0].current_station_id = Some("A".into());
        device.session.set_occupancy("A", StationOccupancy::occupied("red", 1));

        let snapshot = RemoteSnapshot {
            occupancy: Some(BTreeMap::from([(
                "A".to_owned(),
                StationOccupancy::occupied("blue", 2),
            )])),
            assignments: Some(BTreeMap::from([
                ("red".to_owned(), Some("A".to_owned())),
                ("blue".to_owned(), Some("A".to_owned())),
            ])),
            ..RemoteSnapshot::default()
        };
        let transition = merge_remote(&mut device, snapshot, &catalog, &mut rng, 5);

        let red = device.session.team("red").unwrap();
        let next = red.current_station_id.clone().unwrap();
        assert_ne!(next, "A");
        assert_eq!(device.session.station_occupancy[&next].holder(), Some("red"));
        assert_eq!(device.session.station_occupancy["A"].holder(), Some("blue"));
        assert!(transition.writes.contains(&RemoteWrite::AssignTeamToStation {
            team_id: "red".into(),
            station_id: next,
        }));
    }

    #[test]
    fn displaced_team_without_room_clears_its_remote_pointer() {
        let (catalog, mut device) = device();
        let mut rng = StdRng::seed_from_u64(3);
        device.session.active_team_id = Some("red".into());
        device.screen = Screen::Team;
        device.session.teams[0].current_station_id = Some("A".into());

        let occupancy = ["A", "B", "C", "D", "E"]
            .into_iter()
            .map(|id| (id.to_owned(), StationOccupancy::occupied("blue", 2)))
            .collect();
        let snapshot = RemoteSnapshot {
            occupancy: Some(occupancy),
            ..RemoteSnapshot::default()
        };
        let transition = merge_remote(&mut device, snapshot, &catalog, &mut rng, 5);

        assert_eq!(device.session.teams[0].current_station_id, None);
        assert_eq!(
            transition.writes,
            vec![RemoteWrite::ClearTeamAssignment {
                team_id: "red".into()
            }]
        );
    }

    #[test]
    fn active_team_freed_by_remote_is_placed_again() {
        let (catalog, mut device) = device();
        let mut rng = StdRng::seed_from_u64(8);
        device.session.active_team_id = Some("green".into());
        device.screen = Screen::Team;
        for id in ["A", "B", "C", "D", "E"] {
            device.session.set_occupancy(id, StationOccupancy::occupied("red", 1));
        }

        let snapshot = RemoteSnapshot {
            occupancy: Some(BTreeMap::from([("D".to_owned(), StationOccupancy::open())])),
            ..RemoteSnapshot::default()
        };
        let transition = merge_remote(&mut device, snapshot, &catalog, &mut rng, 9);

        assert_eq!(
            device.session.team("green").unwrap().current_station_id.as_deref(),
            Some("D")
        );
        assert_eq!(transition.writes.len(), 3);
    }

    #[test]
    fn reloaded_active_team_is_placed_off_the_team_screen() {
        let (catalog, mut played) = device();
        played.session.active_team_id = Some("green".into());
        for id in ["A", "B", "C", "D", "E"] {
            played.session.set_occupancy(id, StationOccupancy::occupied("red", 1));
        }
        let raw = played.session.to_json().unwrap();
        let mut device = DeviceSession::new(LocalSession::restore(Some(&raw), &catalog));
        assert_eq!(device.screen, Screen::Home);
        assert_eq!(device.session.active_team_id.as_deref(), Some("green"));

        let snapshot = RemoteSnapshot {
            occupancy: Some(BTreeMap::from([("D".to_owned(), StationOccupancy::open())])),
            ..RemoteSnapshot::default()
        };
        let mut rng = StdRng::seed_from_u64(8);
        let transition = merge_remote(&mut device, snapshot, &catalog, &mut rng, 9);

        let green = device.session.team("green").unwrap();
        assert_eq!(green.current_station_id.as_deref(), Some("D"));
        assert!(green.sticky_choices.contains_key("D"));
        assert_eq!(device.session.station_occupancy["D"].holder(), Some("green"));
        assert!(transition.writes.contains(&RemoteWrite::OccupyStation {
            station_id: "D".into(),
            team_id: "green".into(),
        }));
        assert_eq!(device.screen, Screen::Home);
    }

    #[test]
    fn stray_claims_of_the_active_team_are_released() {
        let (catalog, mut device) = device();
        let mut rng = StdRng::seed_from_u64(8);
        device.session.active_team_id = Some("red".into());
        device.screen = Screen::Team;
        device.session.teams[0].current_station_id = Some("B".into());
        device.session.set_occupancy("B", StationOccupancy::occupied("red", 1));

        let snapshot = RemoteSnapshot {
            occupancy: Some(BTreeMap::from([(
                "E".to_owned(),
                StationOccupancy::occupied("red", 3),
            )])),
            ..RemoteSnapshot::default()
        };
        let transition = merge_remote(&mut device, snapshot, &catalog, &mut rng, 9);

        assert!(device.session.station_occupancy["E"].is_open());
        assert_eq!(device.session.station_occupancy["B"].holder(), Some("red"));
        assert_eq!(
            transition.writes,
            vec![RemoteWrite::ReleaseStation {
                station_id: "E".into()
            }]
        );
    }

    #[test]
    fn draw_is_adopted_only_when_well_formed() {
        let (catalog, mut device) = device();
        let mut rng = StdRng::seed_from_u64(1);
        let bad = RemoteSnapshot {
            initial_draw: Some(ids(&["A", "A", "B", "C"])),
            ..RemoteSnapshot::default()
        };
        merge_remote(&mut device, bad, &catalog, &mut rng, 1);
        assert_eq!(device.session.initial_station_order, None);

        let good = RemoteSnapshot {
            initial_draw: Some(ids(&["C", "A", "E", "B"])),
            ..RemoteSnapshot::default()
        };
        merge_remote(&mut device, good, &catalog, &mut rng, 1);
        assert_eq!(
            device.session.initial_station_order,
            Some(ids(&["C", "A", "E", "B"]))
        );
    }

    #[test]
    fn status_rows_pad_but_never_shrink() {
        let (catalog, mut device) = device();
        let mut rng = StdRng::seed_from_u64(1);
        device.session.teams[1].record_completion("D", 5);

        let statuses = vec![
            RemoteTeamStatus {
                team_id: "blue".into(),
                step_index: Some(3),
            },
            RemoteTeamStatus {
                team_id: "red".into(),
                step_index: None,
            },
            RemoteTeamStatus {
                team_id: "ghost".into(),
                step_index: Some(5),
            },
        ];
        merge_team_statuses(&mut device, statuses, &catalog, &mut rng, 1);
        let blue = device.session.team("blue").unwrap();
        assert_eq!(
            blue.completed_station_ids.iter().collect::<Vec<_>>(),
            ["D", "A", "B"]
        );

        let shrink = vec![RemoteTeamStatus {
            team_id: "blue".into(),
            step_index: Some(1),
        }];
        let transition = merge_team_statuses(&mut device, shrink, &catalog, &mut rng, 1);
        assert!(!transition.changed);
        assert_eq!(device.session.team("blue").unwrap().completed_count(), 3);
    }

    fn progress_snapshot() -> impl Strategy<Value = RemoteSnapshot> {
        let stations = vec!["A", "B", "C", "D", "E"];
        prop::collection::vec(prop::sample::subsequence(stations, 0..=5), 4).prop_map(|sets| {
            let teams = ["red", "blue", "green", "yellow"];
            RemoteSnapshot {
                progress: Some(
                    teams
                        .iter()
                        .zip(sets)
                        .map(|(team, set)| (team.to_string(), ids(&set)))
                        .collect(),
                ),
                ..RemoteSnapshot::default()
            }
        })
    }

    proptest! {
        #[test]
        fn merges_are_monotonic_and_converge(
            snapshots in prop::collection::vec(progress_snapshot(), 1..12),
            seed in any::<u64>(),
        ) {
            let (catalog, mut device) = device();
            let mut rng = StdRng::seed_from_u64(seed);
            let mut counts = vec![0usize; 4];

            for snapshot in snapshots {
                merge_remote(&mut device, snapshot, &catalog, &mut rng, 1);
                for (index, team) in device.session.teams.iter().enumerate() {
                    prop_assert!(team.completed_count() >= counts[index]);
                    prop_assert_eq!(team.completed, team.completed_count() >= 5);
                    counts[index] = team.completed_count();
                }
                prop_assert_eq!(
                    device.session.final_unlocked,
                    device.session.all_teams_completed(catalog.max_stations())
                );
            }
        }
    }
}
