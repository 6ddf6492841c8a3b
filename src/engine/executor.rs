//! Per-tile action sequence: move, inspect, then combat or harvest.
//!
//! Every collaborator failure is converted into a structured [`TileOutcome`]
//! here; the lifecycle loop never sees an error from tile processing.

use crate::game::{CombatUnit, GameClient, GameError, TileInfo};
use crate::model::{
    ActionEvent, BotConfig, BotEvent, Coord, EventKind, MoveDirection, SessionStats, TierTiming,
};
use serde_json::json;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;

pub(crate) const HARVEST_POLL_INTERVAL: Duration = Duration::from_millis(500);
pub(crate) const HARVEST_POLL_ATTEMPTS: u32 = 6;
pub(crate) const MAX_UNITS_PER_ATTACK: usize = 12;

/// What happened at one tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TileAction {
    /// Move confirmation did not match the target; tile abandoned.
    MoveFailed,
    /// Arrived but tile metadata was unavailable; nothing further attempted.
    MovedOnly,
    /// Arrived; nothing to harvest or fight.
    Visited,
    Harvested,
    /// Harvest triggered but no resource increase observed, or the trigger
    /// was rejected (cooldown). Neutral outcome, not an error.
    HarvestSkipped,
    Attacked {
        won: bool,
    },
    /// The service rejected the attack request. An action failure: the
    /// recorded position does not advance even though the move confirmed.
    AttackRejected,
    /// Defender failed the rank filter or no units were available.
    CombatSkipped,
    /// Unexpected collaborator fault; counted in the error statistics.
    Faulted,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct TileOutcome {
    pub action: TileAction,
    /// Whether the recorded position advances to the target. Failed tiles
    /// never advance it, even when the move itself was confirmed.
    pub moved: bool,
    pub harvested: bool,
}

impl TileOutcome {
    fn failed_in_place(action: TileAction) -> Self {
        Self {
            action,
            moved: false,
            harvested: false,
        }
    }

    fn at_target(action: TileAction) -> Self {
        Self {
            action,
            moved: true,
            harvested: matches!(action, TileAction::Harvested),
        }
    }
}

/// Parameters for processing a single target tile.
pub(crate) struct TileParams<'a, C> {
    pub client: &'a C,
    pub cfg: &'a BotConfig,
    pub timing: &'a TierTiming,
    pub actor: &'a str,
    pub from: Coord,
    pub target: Coord,
    pub stats: &'a mut SessionStats,
    pub events: &'a UnboundedSender<BotEvent>,
}

/// Run the full action sequence for one tile. Never returns an error: every
/// fault is folded into the outcome and the session statistics.
pub(crate) async fn process_tile<C: GameClient>(p: TileParams<'_, C>) -> TileOutcome {
    let TileParams {
        client,
        cfg,
        timing,
        actor,
        from,
        target,
        stats,
        events,
    } = p;

    // Move. The confirmation from the service is authoritative; an immediate
    // success response is not trusted without it.
    let dx = target.x as i64 - from.x as i64;
    let dy = target.y as i64 - from.y as i64;
    let confirmed = match MoveDirection::from_delta(dx, dy) {
        None => from,
        Some(dir) => match client.move_actor(actor, dir).await {
            Ok(pos) => pos,
            Err(e) => {
                return fault(stats, events, target, "move failed", &e);
            }
        },
    };
    if confirmed != target {
        tracing::debug!(%target, %confirmed, "move confirmation mismatch, abandoning tile");
        emit(
            events,
            ActionEvent::new(
                EventKind::Move,
                target,
                format!("Move to {target} not confirmed (actor at {confirmed})"),
            ),
        );
        return TileOutcome::failed_in_place(TileAction::MoveFailed);
    }
    stats.tiles_visited += 1;
    emit(
        events,
        ActionEvent::new(EventKind::Move, target, format!("Moved to {target}")),
    );

    // Inspect. Missing tile metadata is not a failure, just the end of the
    // line for this tile.
    let tile = match client.inspect_tile(target).await {
        Ok(tile) => tile,
        Err(e) => {
            tracing::debug!(%target, error = %e, "tile inspection unavailable");
            emit(
                events,
                ActionEvent::new(EventKind::Move, target, "Tile data unavailable"),
            );
            return TileOutcome::at_target(TileAction::MovedOnly);
        }
    };

    // Combat, when an enemy base sits on the tile and configuration allows it.
    let mut combat_skipped = false;
    if let Some(occupant) = enemy_base(&tile, actor) {
        if cfg.attack_enabled {
            let profile = match client.actor_profile(actor).await {
                Ok(p) => p,
                Err(e) => return fault(stats, events, target, "profile lookup failed", &e),
            };
            if !cfg.rank_filter.allows(profile.rank, occupant.rank) {
                // Expected and frequent; observable but never an error.
                emit(
                    events,
                    ActionEvent::new(
                        EventKind::Combat,
                        target,
                        format!(
                            "Skipping {} (rank {} outside filter)",
                            occupant.actor_id, occupant.rank
                        ),
                    ),
                );
                combat_skipped = true;
            } else {
                let units = select_units(&profile.units);
                if units.is_empty() {
                    emit(
                        events,
                        ActionEvent::new(EventKind::Combat, target, "No units available to attack"),
                    );
                    combat_skipped = true;
                } else {
                    let focus = cfg.resource_preference.focus(profile.resources);
                    match client.attack(actor, &occupant.actor_id, &units).await {
                        Ok(report) => {
                            stats.attacks_launched += 1;
                            if report.won {
                                stats.attacks_won += 1;
                                stats.metal_gained += report.metal_looted;
                                stats.energy_gained += report.energy_looted;
                                for item in &report.items {
                                    stats.record_item(item);
                                }
                            } else {
                                stats.attacks_lost += 1;
                            }
                            emit(
                                events,
                                ActionEvent::new(
                                    EventKind::Combat,
                                    target,
                                    format!(
                                        "Attacked {}: {}",
                                        occupant.actor_id,
                                        if report.won { "won" } else { "lost" }
                                    ),
                                )
                                .with_payload(json!({
                                    "defender": occupant.actor_id,
                                    "won": report.won,
                                    "metal_looted": report.metal_looted,
                                    "energy_looted": report.energy_looted,
                                    "experience_gained": report.experience_gained,
                                    "units_lost": report.units_lost,
                                    "units_committed": units.len(),
                                    "focus": focus,
                                })),
                            );
                            return TileOutcome::at_target(TileAction::Attacked {
                                won: report.won,
                            });
                        }
                        Err(e) if e.is_rejection() => {
                            emit(
                                events,
                                ActionEvent::new(
                                    EventKind::Combat,
                                    target,
                                    format!("Attack rejected: {e}"),
                                ),
                            );
                            return TileOutcome::failed_in_place(TileAction::AttackRejected);
                        }
                        Err(e) => return fault(stats, events, target, "attack failed", &e),
                    }
                }
            }
        }
    }

    // Harvest, only when combat was not performed.
    if tile.terrain.is_harvestable() {
        return harvest(client, timing, actor, target, stats, events).await;
    }

    if combat_skipped {
        TileOutcome::at_target(TileAction::CombatSkipped)
    } else {
        TileOutcome::at_target(TileAction::Visited)
    }
}

/// Trigger a harvest and verify it completed by polling the actor's resource
/// totals. Exhausting the poll budget is a neutral outcome: the tile may be
/// depleted or on cooldown, and the service owns that decision.
async fn harvest<C: GameClient>(
    client: &C,
    timing: &TierTiming,
    actor: &str,
    target: Coord,
    stats: &mut SessionStats,
    events: &UnboundedSender<BotEvent>,
) -> TileOutcome {
    let before = match client.actor_resources(actor).await {
        Ok(r) => r,
        Err(e) => return fault(stats, events, target, "resource snapshot failed", &e),
    };

    match client.trigger_harvest(actor, target).await {
        Ok(()) => {}
        Err(e) if e.is_rejection() => {
            emit(
                events,
                ActionEvent::new(EventKind::Harvest, target, format!("Harvest rejected: {e}")),
            );
            return TileOutcome::at_target(TileAction::HarvestSkipped);
        }
        Err(e) => return fault(stats, events, target, "harvest trigger failed", &e),
    }

    for attempt in 1..=HARVEST_POLL_ATTEMPTS {
        tokio::time::sleep(HARVEST_POLL_INTERVAL).await;
        let now = match client.actor_resources(actor).await {
            Ok(r) => r,
            Err(e) => return fault(stats, events, target, "harvest verification failed", &e),
        };
        if now.metal > before.metal || now.energy > before.energy {
            let metal = now.metal.saturating_sub(before.metal);
            let energy = now.energy.saturating_sub(before.energy);
            stats.metal_gained += metal;
            stats.energy_gained += energy;
            emit(
                events,
                ActionEvent::new(
                    EventKind::Harvest,
                    target,
                    format!("Harvested +{metal} metal, +{energy} energy"),
                )
                .with_payload(json!({
                    "metal": metal,
                    "energy": energy,
                    "polls": attempt,
                })),
            );
            let _ = events.send(BotEvent::RefreshRequested);
            tokio::time::sleep(timing.harvest_delay).await;
            return TileOutcome::at_target(TileAction::Harvested);
        }
    }

    tracing::debug!(%target, "no resource increase within the poll budget");
    emit(
        events,
        ActionEvent::new(EventKind::Harvest, target, "Harvest produced no yield"),
    );
    // The cooldown window may still have been consumed server-side.
    tokio::time::sleep(timing.harvest_delay).await;
    TileOutcome::at_target(TileAction::HarvestSkipped)
}

/// Pick units for an attack: strongest first, capped per request. The
/// resource preference only sets the declared focus, not the selection.
pub(crate) fn select_units(units: &[CombatUnit]) -> Vec<u64> {
    let mut sorted: Vec<&CombatUnit> = units.iter().collect();
    sorted.sort_by(|a, b| b.strength.cmp(&a.strength));
    sorted
        .into_iter()
        .take(MAX_UNITS_PER_ATTACK)
        .map(|u| u.id)
        .collect()
}

fn enemy_base<'a>(tile: &'a TileInfo, actor: &str) -> Option<&'a crate::game::Occupant> {
    tile.occupant
        .as_ref()
        .filter(|o| o.has_base && o.actor_id != actor)
}

fn emit(events: &UnboundedSender<BotEvent>, event: ActionEvent) {
    let _ = events.send(BotEvent::Action(event));
}

fn fault(
    stats: &mut SessionStats,
    events: &UnboundedSender<BotEvent>,
    target: Coord,
    context: &str,
    err: &GameError,
) -> TileOutcome {
    stats.errors += 1;
    tracing::warn!(%target, error = %err, "{context}");
    emit(
        events,
        ActionEvent::new(EventKind::Error, target, format!("{context}: {err}")),
    );
    TileOutcome::failed_in_place(TileAction::Faulted)
}
