//! Contracts for the external game service.
//!
//! The engine only ever talks to the game through [`GameClient`]; the HTTP
//! implementation lives in [`http`], and tests script an in-memory world.

mod http;

#[cfg(test)]
pub(crate) mod fake;

pub use http::HttpGameClient;

use crate::model::{Coord, MoveDirection};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failures surfaced by a game collaborator call.
///
/// `Rejected` is the service saying "no" to a well-formed request (cooldown,
/// ineligible target); everything else is an unexpected fault and counts
/// against the session's error counter.
#[derive(Debug, Error)]
pub enum GameError {
    #[error("rejected by the game service: {0}")]
    Rejected(String),

    #[error("unexpected response from the game service: {0}")]
    Protocol(String),

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

impl GameError {
    pub fn is_rejection(&self) -> bool {
        matches!(self, GameError::Rejected(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Terrain {
    Plains,
    Rock,
    MetalDeposit,
    EnergyField,
}

impl Terrain {
    pub fn is_harvestable(self) -> bool {
        matches!(self, Terrain::MetalDeposit | Terrain::EnergyField)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Occupant {
    pub actor_id: String,
    pub rank: u32,
    pub has_base: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileInfo {
    pub terrain: Terrain,
    #[serde(default)]
    pub occupant: Option<Occupant>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resources {
    pub metal: u64,
    pub energy: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CombatUnit {
    pub id: u64,
    pub strength: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActorProfile {
    pub rank: u32,
    pub units: Vec<CombatUnit>,
    pub resources: Resources,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttackReport {
    pub won: bool,
    pub metal_looted: u64,
    pub energy_looted: u64,
    pub experience_gained: u64,
    pub units_lost: u32,
    /// Item categories recovered from the defender's base, if any.
    #[serde(default)]
    pub items: Vec<String>,
}

/// Abstract game-service contract consumed by the engine.
///
/// The session context (actor id) is always an explicit parameter; the client
/// carries no ambient identity.
pub trait GameClient: Send + Sync {
    /// Issue a one-step move and return the actor's authoritative position
    /// afterwards, which the caller must compare against its target.
    fn move_actor(
        &self,
        actor: &str,
        dir: MoveDirection,
    ) -> impl std::future::Future<Output = Result<Coord, GameError>> + Send;

    fn inspect_tile(
        &self,
        at: Coord,
    ) -> impl std::future::Future<Output = Result<TileInfo, GameError>> + Send;

    /// Fire-and-forget harvest request; completion is observed by polling
    /// [`GameClient::actor_resources`].
    fn trigger_harvest(
        &self,
        actor: &str,
        at: Coord,
    ) -> impl std::future::Future<Output = Result<(), GameError>> + Send;

    fn actor_resources(
        &self,
        actor: &str,
    ) -> impl std::future::Future<Output = Result<Resources, GameError>> + Send;

    fn attack(
        &self,
        actor: &str,
        defender: &str,
        units: &[u64],
    ) -> impl std::future::Future<Output = Result<AttackReport, GameError>> + Send;

    fn actor_profile(
        &self,
        actor: &str,
    ) -> impl std::future::Future<Output = Result<ActorProfile, GameError>> + Send;
}
