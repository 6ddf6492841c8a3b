//! Scripted in-memory game world for engine and executor tests.

use super::{
    ActorProfile, AttackReport, CombatUnit, GameClient, GameError, Occupant, Resources, Terrain,
    TileInfo,
};
use crate::model::{Coord, MoveDirection};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

pub(crate) struct FakeWorld {
    pub position: Coord,
    pub resources: Resources,
    pub tiles: HashMap<Coord, TileInfo>,
    pub profile: ActorProfile,

    /// Resources granted once the poll countdown reaches zero.
    pub harvest_yield: Resources,
    /// Number of resource polls to absorb before the yield lands.
    pub harvest_delay_polls: u32,
    /// Tile never yields (depleted / on cooldown).
    pub harvest_yields_nothing: bool,
    pub reject_harvest: bool,

    /// The next move that would land on this cell reports the stale position
    /// instead (consumed on first trigger).
    pub fail_move_once: Option<Coord>,
    pub reject_attacks: bool,
    pub attack_won: bool,
    pub inspect_fails: HashSet<Coord>,
    pub fail_profile: bool,

    pending_polls: Option<u32>,
    pub moves: u32,
    pub harvest_triggers: u32,
    pub attacks: u32,
    pub resource_polls: u32,
}

impl FakeWorld {
    fn new(start: Coord) -> Self {
        Self {
            position: start,
            resources: Resources {
                metal: 100,
                energy: 100,
            },
            tiles: HashMap::new(),
            profile: ActorProfile {
                rank: 10,
                units: vec![
                    CombatUnit { id: 1, strength: 8 },
                    CombatUnit { id: 2, strength: 3 },
                ],
                resources: Resources {
                    metal: 100,
                    energy: 100,
                },
            },
            harvest_yield: Resources {
                metal: 25,
                energy: 0,
            },
            harvest_delay_polls: 0,
            harvest_yields_nothing: false,
            reject_harvest: false,
            fail_move_once: None,
            reject_attacks: false,
            attack_won: true,
            inspect_fails: HashSet::new(),
            fail_profile: false,
            pending_polls: None,
            moves: 0,
            harvest_triggers: 0,
            attacks: 0,
            resource_polls: 0,
        }
    }
}

/// Cheap clone; all clones share the same world.
#[derive(Clone)]
pub(crate) struct FakeGame {
    world: Arc<Mutex<FakeWorld>>,
}

impl FakeGame {
    pub fn new(start: Coord) -> Self {
        Self {
            world: Arc::new(Mutex::new(FakeWorld::new(start))),
        }
    }

    pub fn world(&self) -> MutexGuard<'_, FakeWorld> {
        self.world.lock().unwrap()
    }

    pub fn set_tile(&self, at: Coord, terrain: Terrain, occupant: Option<Occupant>) {
        self.world()
            .tiles
            .insert(at, TileInfo { terrain, occupant });
    }

    pub fn enemy_base(actor_id: &str, rank: u32) -> Occupant {
        Occupant {
            actor_id: actor_id.to_string(),
            rank,
            has_base: true,
        }
    }
}

impl GameClient for FakeGame {
    async fn move_actor(&self, _actor: &str, dir: MoveDirection) -> Result<Coord, GameError> {
        let mut w = self.world();
        let (dx, dy) = dir.delta();
        let dest = Coord::new(
            (w.position.x as i64 + dx).max(1) as u32,
            (w.position.y as i64 + dy).max(1) as u32,
        );
        if w.fail_move_once == Some(dest) {
            w.fail_move_once = None;
            return Ok(w.position);
        }
        w.position = dest;
        w.moves += 1;
        Ok(dest)
    }

    async fn inspect_tile(&self, at: Coord) -> Result<TileInfo, GameError> {
        let w = self.world();
        if w.inspect_fails.contains(&at) {
            return Err(GameError::Protocol("tile data unavailable".into()));
        }
        Ok(w.tiles.get(&at).cloned().unwrap_or(TileInfo {
            terrain: Terrain::Plains,
            occupant: None,
        }))
    }

    async fn trigger_harvest(&self, _actor: &str, _at: Coord) -> Result<(), GameError> {
        let mut w = self.world();
        w.harvest_triggers += 1;
        if w.reject_harvest {
            return Err(GameError::Rejected("harvest on cooldown".into()));
        }
        if !w.harvest_yields_nothing {
            w.pending_polls = Some(w.harvest_delay_polls);
        }
        Ok(())
    }

    async fn actor_resources(&self, _actor: &str) -> Result<Resources, GameError> {
        let mut w = self.world();
        w.resource_polls += 1;
        match w.pending_polls {
            Some(0) => {
                w.resources.metal += w.harvest_yield.metal;
                w.resources.energy += w.harvest_yield.energy;
                w.pending_polls = None;
            }
            Some(n) => w.pending_polls = Some(n - 1),
            None => {}
        }
        Ok(w.resources)
    }

    async fn attack(
        &self,
        _actor: &str,
        _defender: &str,
        units: &[u64],
    ) -> Result<AttackReport, GameError> {
        let mut w = self.world();
        if w.reject_attacks {
            return Err(GameError::Rejected("defender under protection".into()));
        }
        w.attacks += 1;
        let won = w.attack_won;
        Ok(AttackReport {
            won,
            metal_looted: if won { 40 } else { 0 },
            energy_looted: if won { 15 } else { 0 },
            experience_gained: 5,
            units_lost: if won { 0 } else { units.len() as u32 },
            items: if won { vec!["relic".into()] } else { Vec::new() },
        })
    }

    async fn actor_profile(&self, _actor: &str) -> Result<ActorProfile, GameError> {
        let w = self.world();
        if w.fail_profile {
            return Err(GameError::Protocol("profile service unavailable".into()));
        }
        Ok(w.profile.clone())
    }
}
