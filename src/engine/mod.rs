//! Run lifecycle: the engine task, its control channel, and the
//! stopped / active / paused state machine.

mod executor;

use crate::model::{
    ActionEvent, BotConfig, BotEvent, ConfigPatch, Coord, EventKind, GridSize, RunSnapshot,
    RunState, RunStatus, SessionStats, TierTiming,
};
use crate::sequencer;
use crate::game::GameClient;
use anyhow::Result;
use rand::RngCore;
use serde_json::json;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;

const STATS_TICK: Duration = Duration::from_secs(1);

/// Commands accepted by the engine task. Calls that do not match a legal
/// state transition are no-ops, not errors.
#[derive(Debug, Clone)]
pub enum EngineControl {
    Start,
    Pause,
    Resume,
    Stop,
    /// Merged into the configuration; ignored unless the engine is stopped.
    UpdateConfig(ConfigPatch),
    /// Zero the session counters. Only honored while stopped, so the host
    /// always has a window to persist them after `Stop`.
    ResetStats,
    /// Tear the engine down. An active or paused session is stopped first so
    /// its final statistics are still emitted.
    Shutdown,
}

/// Outcome of an interruptible wait while active.
enum WaitOutcome {
    Elapsed,
    Interrupted,
    Shutdown,
}

pub struct BotEngine<C> {
    cfg: BotConfig,
    grid: GridSize,
    actor: String,
    session_id: String,
    client: C,
    state: RunState,
    stats: SessionStats,
    timing: TierTiming,
    /// Sweep cursor. Deliberately separate from `state.position`: a failed
    /// move leaves the actor where it was, but the sweep still advances.
    cursor: Coord,
    state_tx: watch::Sender<RunSnapshot>,
    stats_tx: watch::Sender<SessionStats>,
    /// Next due time of the once-per-second statistics tick. Carried across
    /// tiles so the cadence holds for the whole active period, including
    /// tiles that spend seconds in harvest polling or cooldown waits.
    next_stats_at: Instant,
}

fn gen_session_id() -> String {
    let mut b = [0u8; 8];
    rand::thread_rng().fill_bytes(&mut b);
    u64::from_le_bytes(b).to_string()
}

impl<C: GameClient> BotEngine<C> {
    pub fn new(cfg: BotConfig, grid: GridSize, actor: impl Into<String>, start: Coord, client: C) -> Self {
        let state = RunState::new(start);
        let timing = cfg.tier.timing();
        let (state_tx, _) = watch::channel(state.snapshot(Instant::now(), cfg));
        let (stats_tx, _) = watch::channel(SessionStats::default());
        Self {
            cfg,
            grid,
            actor: actor.into(),
            session_id: gen_session_id(),
            client,
            state,
            stats: SessionStats::default(),
            timing,
            cursor: start,
            state_tx,
            stats_tx,
            next_stats_at: Instant::now() + STATS_TICK,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Live run-state snapshots (`getState` surface).
    pub fn watch_state(&self) -> watch::Receiver<RunSnapshot> {
        self.state_tx.subscribe()
    }

    /// Live statistics (`getStats` surface), refreshed per tile and once per
    /// second while active.
    pub fn watch_stats(&self) -> watch::Receiver<SessionStats> {
        self.stats_tx.subscribe()
    }

    /// Drive the engine until shutdown. Exactly one tile is in flight at any
    /// time; control messages are only observed between tiles, so an action
    /// sequence that has started always runs to its natural completion.
    pub async fn run(
        mut self,
        events: mpsc::UnboundedSender<BotEvent>,
        mut control: mpsc::UnboundedReceiver<EngineControl>,
    ) -> Result<SessionStats> {
        loop {
            match self.state.status {
                RunStatus::Stopped => match control.recv().await {
                    None | Some(EngineControl::Shutdown) => break,
                    Some(EngineControl::Start) => self.begin_session(&events),
                    Some(EngineControl::UpdateConfig(patch)) => {
                        self.cfg.merge(patch);
                        tracing::debug!(config = ?self.cfg, "configuration updated");
                        self.publish_state();
                    }
                    Some(EngineControl::ResetStats) => {
                        self.stats = SessionStats::default();
                        self.publish_stats();
                    }
                    Some(EngineControl::Pause)
                    | Some(EngineControl::Resume)
                    | Some(EngineControl::Stop) => {}
                },
                RunStatus::Paused => match control.recv().await {
                    None | Some(EngineControl::Shutdown) => {
                        self.finish_session(&events);
                        break;
                    }
                    Some(EngineControl::Resume) => self.resume_session(&events),
                    Some(EngineControl::Stop) => self.finish_session(&events),
                    Some(EngineControl::UpdateConfig(_)) => {
                        tracing::warn!("configuration update rejected while paused");
                    }
                    Some(EngineControl::ResetStats) => {
                        tracing::warn!("stats reset rejected while paused");
                    }
                    Some(EngineControl::Start) | Some(EngineControl::Pause) => {}
                },
                RunStatus::Active => {
                    let step = match sequencer::advance(
                        self.cursor,
                        self.state.row,
                        self.state.direction,
                        self.grid,
                    ) {
                        Some(step) => step,
                        None => {
                            tracing::info!(session = %self.session_id, "grid sweep complete");
                            self.finish_session(&events);
                            continue;
                        }
                    };
                    self.cursor = step.position;
                    self.state.row = step.row;
                    self.state.direction = step.direction;

                    let baseline = self.stats.clone();
                    let outcome = {
                        let tile = executor::process_tile(executor::TileParams {
                            client: &self.client,
                            cfg: &self.cfg,
                            timing: &self.timing,
                            actor: &self.actor,
                            from: self.state.position,
                            target: step.position,
                            stats: &mut self.stats,
                            events: &events,
                        });
                        tokio::pin!(tile);
                        // A tile can spend seconds in harvest polling and cooldown
                        // waits; keep the elapsed figure live while it runs. The
                        // counters published here are the pre-tile baseline, the
                        // tile's own update lands right after it completes.
                        loop {
                            tokio::select! {
                                outcome = &mut tile => break outcome,
                                _ = tokio::time::sleep_until(self.next_stats_at) => {
                                    self.next_stats_at += STATS_TICK;
                                    let mut live = baseline.clone();
                                    live.elapsed_ms =
                                        self.state.elapsed(Instant::now()).as_millis() as u64;
                                    self.stats_tx.send_replace(live);
                                }
                            }
                        }
                    };

                    if outcome.moved {
                        self.state.position = step.position;
                        self.state.tiles_done += 1;
                    }
                    if outcome.harvested {
                        self.state.last_harvest_at = Some(Instant::now());
                    }
                    self.publish_stats();
                    self.publish_state();

                    if let WaitOutcome::Shutdown = self
                        .active_wait(self.timing.tile_delay, &mut control, &events)
                        .await
                    {
                        break;
                    }
                }
            }
        }

        self.publish_stats();
        Ok(self.stats)
    }

    /// Sleep out the inter-tile delay while staying responsive to control
    /// messages and the periodic statistics tick.
    async fn active_wait(
        &mut self,
        delay: Duration,
        control: &mut mpsc::UnboundedReceiver<EngineControl>,
        events: &mpsc::UnboundedSender<BotEvent>,
    ) -> WaitOutcome {
        let deadline = Instant::now() + delay;
        loop {
            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => return WaitOutcome::Elapsed,
                _ = tokio::time::sleep_until(self.next_stats_at) => {
                    self.next_stats_at += STATS_TICK;
                    self.publish_stats();
                }
                msg = control.recv() => match msg {
                    None | Some(EngineControl::Shutdown) => {
                        self.finish_session(events);
                        return WaitOutcome::Shutdown;
                    }
                    Some(EngineControl::Pause) => {
                        self.pause_session(events);
                        return WaitOutcome::Interrupted;
                    }
                    Some(EngineControl::Stop) => {
                        self.finish_session(events);
                        return WaitOutcome::Interrupted;
                    }
                    Some(EngineControl::UpdateConfig(_)) => {
                        tracing::warn!("configuration update rejected while active");
                    }
                    Some(EngineControl::ResetStats) => {
                        tracing::warn!("stats reset rejected while active");
                    }
                    Some(EngineControl::Start) | Some(EngineControl::Resume) => {}
                },
            }
        }
    }

    fn begin_session(&mut self, events: &mpsc::UnboundedSender<BotEvent>) {
        self.timing = self.cfg.tier.timing();
        self.state.begin(Instant::now());
        self.cursor = self.state.position;
        self.next_stats_at = Instant::now() + STATS_TICK;
        tracing::info!(
            session = %self.session_id,
            actor = %self.actor,
            start = %self.state.position,
            tier = ?self.cfg.tier,
            "run started"
        );
        let _ = events.send(BotEvent::Action(ActionEvent::new(
            EventKind::Move,
            self.state.position,
            format!("Run started at {}", self.state.position),
        )));
        self.publish_state();
        self.publish_stats();
    }

    fn pause_session(&mut self, events: &mpsc::UnboundedSender<BotEvent>) {
        self.state.pause(Instant::now());
        tracing::info!(session = %self.session_id, "run paused");
        let _ = events.send(BotEvent::Action(ActionEvent::new(
            EventKind::Move,
            self.state.position,
            "Run paused",
        )));
        self.publish_state();
    }

    fn resume_session(&mut self, events: &mpsc::UnboundedSender<BotEvent>) {
        self.state.resume(Instant::now());
        self.next_stats_at = Instant::now() + STATS_TICK;
        tracing::info!(session = %self.session_id, "run resumed");
        let _ = events.send(BotEvent::Action(ActionEvent::new(
            EventKind::Move,
            self.state.position,
            "Run resumed",
        )));
        self.publish_state();
        self.publish_stats();
    }

    /// End the session: capture final statistics for the host, emit the
    /// completion events, and reset the transient run state. The statistics
    /// themselves survive until an explicit reset.
    fn finish_session(&mut self, events: &mpsc::UnboundedSender<BotEvent>) {
        if self.state.status == RunStatus::Stopped {
            return;
        }
        self.stats.elapsed_ms = self.state.elapsed(Instant::now()).as_millis() as u64;
        let snapshot = self.stats.clone();
        tracing::info!(
            session = %self.session_id,
            tiles = snapshot.tiles_visited,
            errors = snapshot.errors,
            "session complete"
        );
        let _ = events.send(BotEvent::Action(
            ActionEvent::new(
                EventKind::Complete,
                self.state.position,
                format!("Session complete: {} tiles visited", snapshot.tiles_visited),
            )
            .with_payload(json!(snapshot)),
        ));
        let _ = events.send(BotEvent::SessionComplete { stats: snapshot });
        self.state.halt();
        self.publish_state();
        self.publish_stats();
    }

    fn publish_state(&self) {
        self.state_tx
            .send_replace(self.state.snapshot(Instant::now(), self.cfg));
    }

    fn publish_stats(&mut self) {
        // After a session ends the final elapsed value stays frozen.
        if self.state.started_at.is_some() {
            self.stats.elapsed_ms = self.state.elapsed(Instant::now()).as_millis() as u64;
        }
        self.stats_tx.send_replace(self.stats.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::fake::FakeGame;
    use crate::game::Terrain;
    use crate::model::Tier;

    fn spawn_engine(
        game: FakeGame,
        cfg: BotConfig,
        grid: GridSize,
        start: Coord,
    ) -> (
        tokio::task::JoinHandle<Result<SessionStats>>,
        mpsc::UnboundedSender<EngineControl>,
        mpsc::UnboundedReceiver<BotEvent>,
        watch::Receiver<RunSnapshot>,
        watch::Receiver<SessionStats>,
    ) {
        let engine = BotEngine::new(cfg, grid, "hero", start, game);
        let state_rx = engine.watch_state();
        let stats_rx = engine.watch_stats();
        let (evt_tx, evt_rx) = mpsc::unbounded_channel();
        let (ctrl_tx, ctrl_rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(engine.run(evt_tx, ctrl_rx));
        (handle, ctrl_tx, evt_rx, state_rx, stats_rx)
    }

    async fn wait_complete(evt_rx: &mut mpsc::UnboundedReceiver<BotEvent>) -> SessionStats {
        while let Some(ev) = evt_rx.recv().await {
            if let BotEvent::SessionComplete { stats } = ev {
                return stats;
            }
        }
        panic!("event channel closed before session completion");
    }

    #[tokio::test(start_paused = true)]
    async fn full_sweep_completes_and_reports_stats() {
        let grid = GridSize {
            width: 3,
            height: 3,
        };
        let game = FakeGame::new(Coord::new(1, 1));
        game.set_tile(Coord::new(3, 2), Terrain::MetalDeposit, None);
        game.world().harvest_delay_polls = 1;

        let (handle, ctrl_tx, mut evt_rx, _, _) =
            spawn_engine(game, BotConfig::default(), grid, Coord::new(1, 1));
        ctrl_tx.send(EngineControl::Start).unwrap();

        let stats = wait_complete(&mut evt_rx).await;
        // 8 steps after the start tile, all confirmed.
        assert_eq!(stats.tiles_visited, 8);
        assert_eq!(stats.metal_gained, 25);
        assert_eq!(stats.errors, 0);

        ctrl_tx.send(EngineControl::Shutdown).unwrap();
        let final_stats = handle.await.unwrap().unwrap();
        assert_eq!(final_stats.tiles_visited, stats.tiles_visited);
    }

    #[tokio::test(start_paused = true)]
    async fn move_failure_skips_forward_without_halting() {
        let grid = GridSize {
            width: 3,
            height: 3,
        };
        let game = FakeGame::new(Coord::new(1, 1));
        game.world().fail_move_once = Some(Coord::new(2, 1));

        let (handle, ctrl_tx, mut evt_rx, _, _) =
            spawn_engine(game, BotConfig::default(), grid, Coord::new(1, 1));
        ctrl_tx.send(EngineControl::Start).unwrap();

        let stats = wait_complete(&mut evt_rx).await;
        // The failed tile and the catch-up step are not counted as visits;
        // the cursor re-converges with the actor at (3, 2) and the sweep
        // still reaches the end of the grid.
        assert_eq!(stats.tiles_visited, 6);
        assert_eq!(stats.errors, 0);

        ctrl_tx.send(EngineControl::Shutdown).unwrap();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn pause_excludes_time_from_elapsed() {
        let grid = GridSize {
            width: 50,
            height: 50,
        };
        let game = FakeGame::new(Coord::new(1, 1));
        let (handle, ctrl_tx, _evt_rx, mut state_rx, _) =
            spawn_engine(game, BotConfig::default(), grid, Coord::new(1, 1));
        ctrl_tx.send(EngineControl::Start).unwrap();

        // Let a few tiles go through, then pause.
        state_rx
            .wait_for(|s| s.tiles_done >= 3)
            .await
            .unwrap();
        ctrl_tx.send(EngineControl::Pause).unwrap();
        let at_pause = state_rx
            .wait_for(|s| s.status == RunStatus::Paused)
            .await
            .unwrap()
            .clone();

        // A long idle while paused must not show up in elapsed time.
        tokio::time::advance(Duration::from_secs(600)).await;
        ctrl_tx.send(EngineControl::Resume).unwrap();
        let at_resume = state_rx
            .wait_for(|s| s.status == RunStatus::Active)
            .await
            .unwrap()
            .clone();
        assert_eq!(at_resume.elapsed_ms, at_pause.elapsed_ms);

        ctrl_tx.send(EngineControl::Stop).unwrap();
        ctrl_tx.send(EngineControl::Shutdown).unwrap();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn stats_tick_keeps_elapsed_live_during_long_tile() {
        let grid = GridSize {
            width: 50,
            height: 50,
        };
        let game = FakeGame::new(Coord::new(1, 1));
        game.set_tile(Coord::new(2, 1), Terrain::MetalDeposit, None);
        game.world().harvest_delay_polls = 5;

        let (handle, ctrl_tx, mut evt_rx, _, mut stats_rx) =
            spawn_engine(game, BotConfig::default(), grid, Coord::new(1, 1));
        ctrl_tx.send(EngineControl::Start).unwrap();

        // The first tile spends seconds polling the harvest and waiting out
        // the cooldown. The once-per-second tick must publish live elapsed
        // values well before the tile's own stats update lands.
        let mid = stats_rx
            .wait_for(|s| s.elapsed_ms >= 2000)
            .await
            .unwrap()
            .clone();
        assert_eq!(mid.tiles_visited, 0);
        assert_eq!(mid.metal_gained, 0);

        ctrl_tx.send(EngineControl::Stop).unwrap();
        let stats = wait_complete(&mut evt_rx).await;
        assert_eq!(stats.metal_gained, 25);
        ctrl_tx.send(EngineControl::Shutdown).unwrap();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn stop_preserves_stats_until_explicit_reset() {
        let grid = GridSize {
            width: 2,
            height: 2,
        };
        let game = FakeGame::new(Coord::new(1, 1));
        let (handle, ctrl_tx, mut evt_rx, _, mut stats_rx) =
            spawn_engine(game, BotConfig::default(), grid, Coord::new(1, 1));
        ctrl_tx.send(EngineControl::Start).unwrap();

        let stats = wait_complete(&mut evt_rx).await;
        assert_eq!(stats.tiles_visited, 3);

        // Counters survive the stop until the host explicitly resets them.
        assert_eq!(stats_rx.borrow().tiles_visited, 3);
        ctrl_tx.send(EngineControl::ResetStats).unwrap();
        stats_rx
            .wait_for(|s| s.tiles_visited == 0)
            .await
            .unwrap();

        ctrl_tx.send(EngineControl::Shutdown).unwrap();
        let final_stats = handle.await.unwrap().unwrap();
        assert_eq!(final_stats, SessionStats::default());
    }

    #[tokio::test(start_paused = true)]
    async fn mid_run_stop_emits_completion_with_partial_stats() {
        let grid = GridSize {
            width: 50,
            height: 50,
        };
        let game = FakeGame::new(Coord::new(1, 1));
        let (handle, ctrl_tx, mut evt_rx, mut state_rx, _) =
            spawn_engine(game, BotConfig::default(), grid, Coord::new(1, 1));
        ctrl_tx.send(EngineControl::Start).unwrap();

        state_rx.wait_for(|s| s.tiles_done >= 2).await.unwrap();
        ctrl_tx.send(EngineControl::Stop).unwrap();

        let stats = wait_complete(&mut evt_rx).await;
        assert!(stats.tiles_visited >= 2);
        let stopped = state_rx
            .wait_for(|s| s.status == RunStatus::Stopped)
            .await
            .unwrap()
            .clone();
        assert_eq!(stopped.tiles_done, 0);

        ctrl_tx.send(EngineControl::Shutdown).unwrap();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn config_updates_only_apply_while_stopped() {
        let grid = GridSize {
            width: 50,
            height: 50,
        };
        let game = FakeGame::new(Coord::new(1, 1));
        let (handle, ctrl_tx, _evt_rx, mut state_rx, _) =
            spawn_engine(game, BotConfig::default(), grid, Coord::new(1, 1));

        // While stopped: applied.
        ctrl_tx
            .send(EngineControl::UpdateConfig(ConfigPatch {
                tier: Some(Tier::Premium),
                ..Default::default()
            }))
            .unwrap();
        state_rx
            .wait_for(|s| s.config.tier == Tier::Premium)
            .await
            .unwrap();

        // While active: rejected without mutation.
        ctrl_tx.send(EngineControl::Start).unwrap();
        state_rx.wait_for(|s| s.tiles_done >= 1).await.unwrap();
        ctrl_tx
            .send(EngineControl::UpdateConfig(ConfigPatch {
                attack_enabled: Some(true),
                ..Default::default()
            }))
            .unwrap();
        ctrl_tx.send(EngineControl::Stop).unwrap();
        let stopped = state_rx
            .wait_for(|s| s.status == RunStatus::Stopped)
            .await
            .unwrap()
            .clone();
        assert!(!stopped.config.attack_enabled);
        assert_eq!(stopped.config.tier, Tier::Premium);

        ctrl_tx.send(EngineControl::Shutdown).unwrap();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn lifecycle_noops_are_ignored() {
        let grid = GridSize {
            width: 2,
            height: 2,
        };
        let game = FakeGame::new(Coord::new(1, 1));
        let (handle, ctrl_tx, mut evt_rx, _, _) =
            spawn_engine(game, BotConfig::default(), grid, Coord::new(1, 1));

        // Pause/resume/stop while stopped are all no-ops; the engine still
        // starts and completes normally afterwards.
        ctrl_tx.send(EngineControl::Pause).unwrap();
        ctrl_tx.send(EngineControl::Resume).unwrap();
        ctrl_tx.send(EngineControl::Stop).unwrap();
        ctrl_tx.send(EngineControl::Start).unwrap();

        let stats = wait_complete(&mut evt_rx).await;
        assert_eq!(stats.tiles_visited, 3);

        ctrl_tx.send(EngineControl::Shutdown).unwrap();
        handle.await.unwrap().unwrap();
    }
}
