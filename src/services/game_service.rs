//! Turn handling: player actions and store deliveries against the device.

use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    dao::models::now_millis,
    dto::view::DeviceView,
    error::ServiceError,
    services::{
        sse_events,
        sync_service::{RemoteEvent, RemoteEvents},
    },
    state::{
        DeviceRuntime, SharedState,
        actions::{Action, Transition, apply_local_action},
        device::FeedbackSlot,
        reconcile::{merge_remote, merge_team_statuses},
        remote::RemoteSnapshot,
    },
};

/// How long timed feedback stays on screen.
pub const FEEDBACK_DISMISS_DELAY: Duration = Duration::from_millis(1_200);

/// Current view of the device.
pub async fn current_view(state: &SharedState) -> DeviceView {
    let runtime = state.lock_device().await;
    build_view(state, &runtime)
}

/// Run one player action as a turn and return the resulting view.
///
/// Starting or resuming a game first makes sure the device knows the stored
/// draw, so it never draws over another device's.
pub async fn dispatch(state: &SharedState, action: Action) -> Result<DeviceView, ServiceError> {
    let draw = match action {
        Action::StartGame | Action::ResumeGame => state.sync().initial_draw().await,
        _ => None,
    };

    let mut guard = state.lock_device().await;
    let runtime = &mut *guard;
    let now = now_millis();
    let mut writes = Vec::new();

    if let Some(order) = draw {
        let merged = merge_remote(
            &mut runtime.device,
            RemoteSnapshot {
                initial_draw: Some(order),
                ..RemoteSnapshot::default()
            },
            state.catalog(),
            &mut runtime.rng,
            now,
        );
        writes.extend(merged.writes);
    }

    debug!(?action, "applying action");
    let transition = match apply_local_action(
        &mut runtime.device,
        action,
        state.catalog(),
        &mut runtime.rng,
        now,
    ) {
        Ok(transition) => transition,
        Err(err) => {
            info!(error = %err, "action refused");
            return Err(err.into());
        }
    };
    writes.extend(transition.writes);

    let view = finish_turn(
        state,
        runtime,
        Transition {
            writes,
            ..transition
        },
    )
    .await;
    Ok(view)
}

/// Merge one store delivery as a turn. Returns whether anything changed.
pub async fn apply_remote_event(state: &SharedState, event: RemoteEvent) -> bool {
    let mut guard = state.lock_device().await;
    let runtime = &mut *guard;
    let now = now_millis();

    let transition = match event {
        RemoteEvent::TeamStatuses(statuses) => merge_team_statuses(
            &mut runtime.device,
            statuses,
            state.catalog(),
            &mut runtime.rng,
            now,
        ),
        RemoteEvent::Snapshot(snapshot) => merge_remote(
            &mut runtime.device,
            snapshot,
            state.catalog(),
            &mut runtime.rng,
            now,
        ),
    };
    if !transition.changed {
        return false;
    }
    finish_turn(state, runtime, transition).await;
    true
}

/// Reconciliation loop: applies deliveries until the adapter goes away.
pub async fn run_remote_events(state: SharedState, mut events: RemoteEvents) {
    while let Some(event) = events.recv().await {
        apply_remote_event(&state, event).await;
    }
    warn!("remote event channel closed; reconciliation stopped");
}

/// Forward connectivity changes to the view stream.
pub async fn run_status_updates(state: SharedState) {
    let mut watcher = state.sync().status_watcher();
    loop {
        let status = *watcher.borrow_and_update();
        sse_events::broadcast_status(&state, status);
        sse_events::broadcast_view(&state, &current_view(&state).await);
        if watcher.changed().await.is_err() {
            break;
        }
    }
}

/// Persist, send the writes, arm feedback timers and publish the view.
async fn finish_turn(
    state: &SharedState,
    runtime: &mut DeviceRuntime,
    transition: Transition,
) -> DeviceView {
    state.persist(&runtime.device.session).await;
    if !transition.writes.is_empty() {
        debug!(count = transition.writes.len(), "queueing store writes");
    }
    state.sync().submit(transition.writes);
    if transition.unlocked {
        info!("every team finished; final clue unlocked");
    }
    for (slot, id) in transition.timed_feedback {
        schedule_dismiss(state.clone(), slot, id);
    }

    let view = build_view(state, runtime);
    sse_events::broadcast_view(state, &view);
    view
}

fn schedule_dismiss(state: SharedState, slot: FeedbackSlot, id: Uuid) {
    tokio::spawn(async move {
        sleep(FEEDBACK_DISMISS_DELAY).await;
        let mut runtime = state.lock_device().await;
        if runtime.device.dismiss_feedback(slot, id) {
            let view = build_view(&state, &runtime);
            sse_events::broadcast_view(&state, &view);
        }
    });
}

fn build_view(state: &SharedState, runtime: &DeviceRuntime) -> DeviceView {
    DeviceView::build(&runtime.device, state.catalog(), state.sync().status())
}
