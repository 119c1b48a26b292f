//! Remote sync adapter: the only component that talks to the shared store.
//!
//! Writes are queued and issued by a single writer task, one store
//! transaction per turn, so other devices observe either all or none of a
//! turn. Three live subscriptions turn store deliveries into [`RemoteEvent`]s
//! for the reconciliation loop.

use std::{
    collections::BTreeMap,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use futures::StreamExt;
use serde::Serialize;
use tokio::{
    sync::{Mutex, RwLock, mpsc, oneshot, watch},
    task::JoinHandle,
};
use tracing::{debug, info, warn};
use utoipa::ToSchema;

use crate::{
    dao::{
        doc_store::{DocumentStore, QueryData, WriteOp},
        models::{
            Collection, INITIAL_ASSIGNMENT_KEY, InitialDrawEntity, OCCUPANCY_OCCUPIED,
            PROGRESS_COMPLETED, ROSTER_KEY, RosterEntity, StationOccupancyEntity,
            StationProgressEntity, TeamAssignmentEntity, TeamStatusEntity, now_millis,
            progress_key,
        },
    },
    state::{
        catalog::Catalog,
        remote::{RemoteSnapshot, RemoteTeamStatus, RemoteWrite, TeamStatus},
        session::{OccupancyState, Roster, StationOccupancy},
    },
};

/// Connectivity of the adapter, shown to players as a status indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Connecting,
    Connected,
    Error,
    /// No store configured or reachable; the device plays locally.
    Offline,
}

/// Parsed delivery handed to the reconciliation loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteEvent {
    TeamStatuses(Vec<RemoteTeamStatus>),
    Snapshot(RemoteSnapshot),
}

/// Receiving end of the adapter's deliveries.
pub type RemoteEvents = mpsc::UnboundedReceiver<RemoteEvent>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Feed {
    TeamStatuses,
    StationData,
    Roster,
}

impl Feed {
    const ALL: [Feed; 3] = [Feed::TeamStatuses, Feed::StationData, Feed::Roster];

    fn name(self) -> &'static str {
        match self {
            Feed::TeamStatuses => "team_statuses",
            Feed::StationData => "station_data",
            Feed::Roster => "roster",
        }
    }

    fn collections(self) -> Vec<Collection> {
        match self {
            Feed::TeamStatuses => vec![Collection::TeamStatuses],
            Feed::StationData => vec![
                Collection::StationOccupancy,
                Collection::TeamCurrentAssignment,
                Collection::TeamStationProgress,
                Collection::InitialStationAssignment,
            ],
            Feed::Roster => vec![Collection::GameAssignments],
        }
    }

    /// Collection that receives default rows when found empty.
    fn seeded_collection(self) -> Collection {
        match self {
            Feed::TeamStatuses => Collection::TeamStatuses,
            Feed::StationData => Collection::StationOccupancy,
            Feed::Roster => Collection::GameAssignments,
        }
    }
}

enum WriterCommand {
    Submit(Vec<RemoteWrite>),
    Flush(oneshot::Sender<()>),
}

#[derive(Default)]
struct SeedLatches {
    team_statuses: AtomicBool,
    station_data: AtomicBool,
    roster: AtomicBool,
}

impl SeedLatches {
    /// Returns `true` the first time it is called for `feed`.
    fn claim(&self, feed: Feed) -> bool {
        let latch = match feed {
            Feed::TeamStatuses => &self.team_statuses,
            Feed::StationData => &self.station_data,
            Feed::Roster => &self.roster,
        };
        !latch.swap(true, Ordering::SeqCst)
    }
}

struct Shared {
    catalog: Arc<Catalog>,
    store: RwLock<Option<Arc<dyn DocumentStore>>>,
    feeds: Mutex<Vec<JoinHandle<()>>>,
    status: watch::Sender<SyncStatus>,
    seeded: SeedLatches,
    cached_draw: RwLock<Option<Vec<String>>>,
    events: mpsc::UnboundedSender<RemoteEvent>,
}

/// Owns the store handle, the seeding latches and the draw cache.
pub struct SyncAdapter {
    shared: Arc<Shared>,
    writer: mpsc::UnboundedSender<WriterCommand>,
}

impl SyncAdapter {
    /// Create an offline adapter and spawn its writer task.
    pub fn new(catalog: Arc<Catalog>) -> (Self, RemoteEvents) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (status, _rx) = watch::channel(SyncStatus::Offline);
        let shared = Arc::new(Shared {
            catalog,
            store: RwLock::new(None),
            feeds: Mutex::new(Vec::new()),
            status,
            seeded: SeedLatches::default(),
            cached_draw: RwLock::new(None),
            events: events_tx,
        });

        let (writer, commands) = mpsc::unbounded_channel();
        tokio::spawn(run_writer(shared.clone(), commands));
        (Self { shared, writer }, events_rx)
    }

    pub fn status(&self) -> SyncStatus {
        *self.shared.status.borrow()
    }

    /// Subscribe to connectivity changes.
    pub fn status_watcher(&self) -> watch::Receiver<SyncStatus> {
        self.shared.status.subscribe()
    }

    pub fn set_status(&self, status: SyncStatus) {
        self.shared.set_status(status);
    }

    /// Currently installed store, if any.
    pub async fn store(&self) -> Option<Arc<dyn DocumentStore>> {
        self.shared.current_store().await
    }

    /// Use `store` from now on and (re)start the three subscriptions.
    pub async fn install_store(&self, store: Arc<dyn DocumentStore>) {
        self.stop_feeds().await;
        {
            let mut guard = self.shared.store.write().await;
            *guard = Some(store.clone());
        }
        self.shared.set_status(SyncStatus::Connecting);

        let mut feeds = self.shared.feeds.lock().await;
        for feed in Feed::ALL {
            feeds.push(tokio::spawn(run_feed(
                self.shared.clone(),
                store.clone(),
                feed,
            )));
        }
    }

    /// Drop the store and go offline. Local play continues.
    pub async fn clear_store(&self) {
        self.stop_feeds().await;
        {
            let mut guard = self.shared.store.write().await;
            guard.take();
        }
        self.shared.set_status(SyncStatus::Offline);
    }

    async fn stop_feeds(&self) {
        let mut feeds = self.shared.feeds.lock().await;
        for handle in feeds.drain(..) {
            handle.abort();
        }
    }

    /// Queue the writes of one turn. Best effort: failures are logged by the
    /// writer and dropped.
    pub fn submit(&self, writes: Vec<RemoteWrite>) {
        if writes.is_empty() {
            return;
        }
        if self.writer.send(WriterCommand::Submit(writes)).is_err() {
            warn!("sync writer stopped; dropping writes");
        }
    }

    /// Wait until every write queued so far has been issued.
    pub async fn flush(&self) {
        let (done, wait) = oneshot::channel();
        if self.writer.send(WriterCommand::Flush(done)).is_ok() {
            let _ = wait.await;
        }
    }

    /// Last draw seen, fetched once from the store when nothing is cached.
    pub async fn initial_draw(&self) -> Option<Vec<String>> {
        if let Some(order) = self.shared.cached_draw.read().await.clone() {
            return Some(order);
        }
        let store = self.shared.current_store().await?;
        match store.query(vec![Collection::InitialStationAssignment]).await {
            Ok(data) => {
                let order = parse_initial_draw(&data);
                *self.shared.cached_draw.write().await = order.clone();
                order
            }
            Err(err) => {
                warn!(error = %err, "failed to fetch the opening draw");
                None
            }
        }
    }
}

impl Shared {
    fn set_status(&self, status: SyncStatus) {
        self.status.send_if_modified(|current| {
            if *current == status {
                false
            } else {
                debug!(?status, "sync status changed");
                *current = status;
                true
            }
        });
    }

    async fn current_store(&self) -> Option<Arc<dyn DocumentStore>> {
        self.store.read().await.clone()
    }

    async fn write_batch(&self, writes: Vec<RemoteWrite>) {
        let names: Vec<&'static str> = writes.iter().map(RemoteWrite::name).collect();
        let Some(store) = self.current_store().await else {
            debug!(ops = ?names, "offline; dropping writes");
            return;
        };

        let now = now_millis();
        let mut ops = Vec::new();
        for write in &writes {
            match write_ops(write, &self.catalog, now) {
                Ok(mut encoded) => ops.append(&mut encoded),
                Err(err) => warn!(op = write.name(), error = %err, "failed to encode write"),
            }
        }
        if ops.is_empty() {
            return;
        }

        match store.transact(ops).await {
            Ok(()) => {
                debug!(ops = ?names, "store write applied");
                for write in &writes {
                    match write {
                        RemoteWrite::WriteInitialStationAssignment { order, .. } => {
                            *self.cached_draw.write().await = Some(order.clone());
                        }
                        RemoteWrite::ClearInitialStationAssignment => {
                            *self.cached_draw.write().await = None;
                        }
                        _ => {}
                    }
                }
            }
            Err(err) if err.is_conflict() => {
                info!(ops = ?names, "opening draw already written by another device; adopting it");
                self.refresh_draw(store.as_ref()).await;
            }
            Err(err) => warn!(ops = ?names, error = %err, "store write failed; dropping it"),
        }
    }

    async fn refresh_draw(&self, store: &dyn DocumentStore) {
        match store.query(vec![Collection::InitialStationAssignment]).await {
            Ok(data) => {
                let order = parse_initial_draw(&data);
                *self.cached_draw.write().await = order.clone();
                if order.is_some() {
                    let _ = self.events.send(RemoteEvent::Snapshot(RemoteSnapshot {
                        initial_draw: order,
                        ..RemoteSnapshot::default()
                    }));
                }
            }
            Err(err) => warn!(error = %err, "failed to refetch the opening draw"),
        }
    }

    /// Write default rows on the first delivery of an empty collection.
    /// Returns `true` when the delivery should be skipped.
    async fn seed_if_needed(&self, store: &dyn DocumentStore, feed: Feed, data: &QueryData) -> bool {
        if !data.is_empty(feed.seeded_collection()) || !self.seeded.claim(feed) {
            return false;
        }

        let now = now_millis();
        let ops = match seed_ops(feed, &self.catalog, now) {
            Ok(ops) => ops,
            Err(err) => {
                warn!(feed = feed.name(), error = %err, "failed to encode seed rows");
                return false;
            }
        };
        match store.transact(ops).await {
            Ok(()) => {
                info!(feed = feed.name(), "seeded empty collection with default rows");
                true
            }
            Err(err) => {
                warn!(feed = feed.name(), error = %err, "failed to seed collection");
                false
            }
        }
    }
}

async fn run_writer(shared: Arc<Shared>, mut commands: mpsc::UnboundedReceiver<WriterCommand>) {
    while let Some(command) = commands.recv().await {
        match command {
            WriterCommand::Submit(writes) => shared.write_batch(writes).await,
            WriterCommand::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
}

async fn run_feed(shared: Arc<Shared>, store: Arc<dyn DocumentStore>, feed: Feed) {
    let mut stream = store.subscribe(feed.collections());
    while let Some(delivery) = stream.next().await {
        let data = match delivery {
            Ok(data) => data,
            Err(err) => {
                warn!(feed = feed.name(), error = %err, "subscription error; keeping local state");
                shared.set_status(SyncStatus::Error);
                continue;
            }
        };
        shared.set_status(SyncStatus::Connected);

        if shared.seed_if_needed(store.as_ref(), feed, &data).await {
            continue;
        }

        let event = match feed {
            Feed::TeamStatuses => RemoteEvent::TeamStatuses(parse_team_statuses(&data)),
            Feed::StationData => {
                let snapshot = parse_station_data(&data, &shared.catalog);
                *shared.cached_draw.write().await = snapshot.initial_draw.clone();
                RemoteEvent::Snapshot(snapshot)
            }
            Feed::Roster => match parse_roster(&data) {
                Some(roster) => RemoteEvent::Snapshot(RemoteSnapshot {
                    roster: Some(roster),
                    ..RemoteSnapshot::default()
                }),
                None => continue,
            },
        };
        if shared.events.send(event).is_err() {
            debug!(feed = feed.name(), "no reconciliation loop listening; stopping feed");
            break;
        }
    }
}

/// Translate one write into store operations.
pub fn write_ops(
    write: &RemoteWrite,
    catalog: &Catalog,
    now: i64,
) -> serde_json::Result<Vec<WriteOp>> {
    let ops = match write {
        RemoteWrite::OccupyStation {
            station_id,
            team_id,
        } => vec![occupancy_op(StationOccupancyEntity::occupied(
            station_id, team_id, now,
        ))?],
        RemoteWrite::ReleaseStation { station_id } => {
            vec![occupancy_op(StationOccupancyEntity::open(station_id, now))?]
        }
        RemoteWrite::AssignTeamToStation {
            team_id,
            station_id,
        } => vec![assignment_op(team_id, Some(station_id), now)?],
        RemoteWrite::ClearTeamAssignment { team_id } => vec![assignment_op(team_id, None, now)?],
        RemoteWrite::CompleteStationForTeam {
            team_id,
            station_id,
        } => vec![WriteOp::put(
            Collection::TeamStationProgress,
            progress_key(team_id, station_id),
            &StationProgressEntity {
                team_id: Some(team_id.clone()),
                station_id: Some(station_id.clone()),
                status: Some(PROGRESS_COMPLETED.to_owned()),
                completed_at: Some(now),
                updated_at: Some(now),
            },
        )?],
        RemoteWrite::PersistTeamStatus(status) => vec![status_op(status, now)?],
        RemoteWrite::PersistAllTeamStatuses(statuses) => statuses
            .iter()
            .map(|status| status_op(status, now))
            .collect::<serde_json::Result<_>>()?,
        RemoteWrite::WriteInitialStationAssignment { team_ids, order } => {
            let mut ops = vec![WriteOp::create(
                Collection::InitialStationAssignment,
                INITIAL_ASSIGNMENT_KEY,
                &InitialDrawEntity {
                    station_order: Some(order.clone()),
                    updated_at: Some(now),
                },
            )?];
            for (team_id, station_id) in team_ids.iter().zip(order) {
                ops.push(occupancy_op(StationOccupancyEntity::occupied(
                    station_id, team_id, now,
                ))?);
                ops.push(assignment_op(team_id, Some(station_id), now)?);
            }
            ops
        }
        RemoteWrite::ClearAllStationData => catalog
            .station_ids()
            .map(|id| occupancy_op(StationOccupancyEntity::open(id, now)))
            .collect::<serde_json::Result<_>>()?,
        RemoteWrite::ClearTeamProgress { team_id } => catalog
            .station_ids()
            .map(|id| WriteOp::delete(Collection::TeamStationProgress, progress_key(team_id, id)))
            .collect(),
        RemoteWrite::ClearInitialStationAssignment => vec![WriteOp::delete(
            Collection::InitialStationAssignment,
            INITIAL_ASSIGNMENT_KEY,
        )],
        RemoteWrite::WriteRoster(roster) => vec![roster_op(roster, now)?],
        RemoteWrite::ClearRoster => vec![roster_op(&Roster::empty(catalog), now)?],
    };
    Ok(ops)
}

fn occupancy_op(row: StationOccupancyEntity) -> serde_json::Result<WriteOp> {
    WriteOp::put(Collection::StationOccupancy, row.station_id.clone(), &row)
}

fn assignment_op(team_id: &str, station_id: Option<&String>, now: i64) -> serde_json::Result<WriteOp> {
    WriteOp::put(
        Collection::TeamCurrentAssignment,
        team_id,
        &TeamAssignmentEntity {
            team_id: team_id.to_owned(),
            current_station_id: station_id.cloned(),
            assigned_at: station_id.map(|_| now),
            updated_at: Some(now),
        },
    )
}

fn status_op(status: &TeamStatus, now: i64) -> serde_json::Result<WriteOp> {
    WriteOp::put(
        Collection::TeamStatuses,
        status.team_id.clone(),
        &TeamStatusEntity {
            team_id: status.team_id.clone(),
            step_index: Some(status.step_index),
            completed: Some(status.completed),
            updated_at: Some(now),
        },
    )
}

fn roster_op(roster: &Roster, now: i64) -> serde_json::Result<WriteOp> {
    WriteOp::put(
        Collection::GameAssignments,
        ROSTER_KEY,
        &RosterEntity {
            names: Some(roster.names.clone()),
            teams: Some(roster.teams.clone()),
            updated_at: Some(now),
        },
    )
}

fn seed_ops(feed: Feed, catalog: &Catalog, now: i64) -> serde_json::Result<Vec<WriteOp>> {
    match feed {
        Feed::TeamStatuses => catalog
            .team_ids()
            .map(|team_id| {
                status_op(
                    &TeamStatus {
                        team_id: team_id.to_owned(),
                        step_index: 0,
                        completed: false,
                    },
                    now,
                )
            })
            .collect(),
        Feed::StationData => write_ops(&RemoteWrite::ClearAllStationData, catalog, now),
        Feed::Roster => write_ops(&RemoteWrite::ClearRoster, catalog, now),
    }
}

/// Progress summaries; rows without a team id are dropped by decoding.
pub fn parse_team_statuses(data: &QueryData) -> Vec<RemoteTeamStatus> {
    data.decode::<TeamStatusEntity>(Collection::TeamStatuses)
        .into_iter()
        .map(|(_, row)| RemoteTeamStatus {
            team_id: row.team_id,
            step_index: row.step_index,
        })
        .collect()
}

/// Parse the combined station delivery. Each collection part of the query
/// yields its field; stations without a row count as open, teams without
/// completion rows as having none.
pub fn parse_station_data(data: &QueryData, catalog: &Catalog) -> RemoteSnapshot {
    let mut snapshot = RemoteSnapshot::default();

    if data.contains(Collection::StationOccupancy) {
        // Stations without a row keep whatever the device already mirrors.
        let mut occupancy = BTreeMap::new();
        for (_, row) in data.decode::<StationOccupancyEntity>(Collection::StationOccupancy) {
            if catalog.station(&row.station_id).is_none() {
                continue;
            }
            let entry = match (row.state.as_deref(), row.occupied_by_team_id) {
                (Some(OCCUPANCY_OCCUPIED), Some(team_id)) => StationOccupancy {
                    state: OccupancyState::Occupied,
                    occupied_by_team_id: Some(team_id),
                    occupied_at: row.occupied_at,
                },
                _ => StationOccupancy::open(),
            };
            occupancy.insert(row.station_id, entry);
        }
        snapshot.occupancy = Some(occupancy);
    }

    if data.contains(Collection::TeamCurrentAssignment) {
        snapshot.assignments = Some(
            data.decode::<TeamAssignmentEntity>(Collection::TeamCurrentAssignment)
                .into_iter()
                .map(|(_, row)| (row.team_id, row.current_station_id))
                .collect(),
        );
    }

    if data.contains(Collection::TeamStationProgress) {
        let mut completions: Vec<(i64, String, String)> = data
            .decode::<StationProgressEntity>(Collection::TeamStationProgress)
            .into_iter()
            .filter(|(_, row)| row.status.as_deref() == Some(PROGRESS_COMPLETED))
            .filter_map(|(_, row)| {
                Some((row.completed_at.unwrap_or_default(), row.team_id?, row.station_id?))
            })
            .collect();
        completions.sort();

        let mut progress: BTreeMap<String, Vec<String>> = catalog
            .team_ids()
            .map(|id| (id.to_owned(), Vec::new()))
            .collect();
        for (_, team_id, station_id) in completions {
            progress.entry(team_id).or_default().push(station_id);
        }
        snapshot.progress = Some(progress);
    }

    if data.contains(Collection::InitialStationAssignment) {
        snapshot.initial_draw = parse_initial_draw(data);
    }
    snapshot
}

/// The stored draw, if its row exists and carries an order.
pub fn parse_initial_draw(data: &QueryData) -> Option<Vec<String>> {
    data.decode::<InitialDrawEntity>(Collection::InitialStationAssignment)
        .into_iter()
        .find(|(key, _)| key == INITIAL_ASSIGNMENT_KEY)
        .and_then(|(_, row)| row.station_order)
}

pub fn parse_roster(data: &QueryData) -> Option<Roster> {
    data.decode::<RosterEntity>(Collection::GameAssignments)
        .into_iter()
        .find(|(key, _)| key == ROSTER_KEY)
        .map(|(_, row)| Roster {
            names: row.names.unwrap_or_default(),
            teams: row.teams.unwrap_or_default(),
        })
}
