use crate::game::Resources;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::time::Instant;

/// One cell of the game grid. Coordinates are 1-based, `y` grows downward
/// (row 1 is the top sweep row).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Coord {
    pub x: u32,
    pub y: u32,
}

impl Coord {
    pub fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }
}

impl std::fmt::Display for Coord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridSize {
    pub width: u32,
    pub height: u32,
}

impl GridSize {
    pub fn contains(&self, c: Coord) -> bool {
        c.x >= 1 && c.x <= self.width && c.y >= 1 && c.y <= self.height
    }
}

/// Column sweep direction of the current traversal row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SweepDirection {
    Forward,
    Backward,
}

/// The eight directional move primitives the game service accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MoveDirection {
    North,
    NorthEast,
    East,
    SouthEast,
    South,
    SouthWest,
    West,
    NorthWest,
}

impl MoveDirection {
    /// Map a coordinate delta onto a single one-step primitive. Deltas larger
    /// than one cell are reduced per-axis, so a stale position still yields a
    /// legal move command aimed at the target.
    pub fn from_delta(dx: i64, dy: i64) -> Option<Self> {
        match (dx.signum(), dy.signum()) {
            (0, -1) => Some(Self::North),
            (1, -1) => Some(Self::NorthEast),
            (1, 0) => Some(Self::East),
            (1, 1) => Some(Self::SouthEast),
            (0, 1) => Some(Self::South),
            (-1, 1) => Some(Self::SouthWest),
            (-1, 0) => Some(Self::West),
            (-1, -1) => Some(Self::NorthWest),
            _ => None,
        }
    }

    pub fn delta(self) -> (i64, i64) {
        match self {
            Self::North => (0, -1),
            Self::NorthEast => (1, -1),
            Self::East => (1, 0),
            Self::SouthEast => (1, 1),
            Self::South => (0, 1),
            Self::SouthWest => (-1, 1),
            Self::West => (-1, 0),
            Self::NorthWest => (-1, -1),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::North => "north",
            Self::NorthEast => "northeast",
            Self::East => "east",
            Self::SouthEast => "southeast",
            Self::South => "south",
            Self::SouthWest => "southwest",
            Self::West => "west",
            Self::NorthWest => "northwest",
        }
    }
}

/// Pacing profile, fixed for the lifetime of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Premium,
    Basic,
}

impl Tier {
    /// Premium accounts rely on the service to reject premature harvests, so
    /// they only pay the short inter-tile delay. Basic accounts additionally
    /// wait out the full harvest cooldown window client-side.
    pub fn timing(self) -> TierTiming {
        match self {
            Tier::Premium => TierTiming {
                tile_delay: Duration::from_millis(250),
                harvest_delay: Duration::ZERO,
            },
            Tier::Basic => TierTiming {
                tile_delay: Duration::from_millis(500),
                harvest_delay: Duration::from_millis(2000),
            },
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TierTiming {
    pub tile_delay: Duration,
    pub harvest_delay: Duration,
}

/// Restricts which defenders are eligible for an attack, relative to the
/// acting player's rank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RankFilter {
    Lower,
    Higher,
    Any,
}

impl RankFilter {
    pub fn allows(self, own_rank: u32, target_rank: u32) -> bool {
        match self {
            RankFilter::Lower => target_rank < own_rank,
            RankFilter::Higher => target_rank > own_rank,
            RankFilter::Any => true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourcePreference {
    Metal,
    Energy,
    Lowest,
}

impl ResourcePreference {
    /// The resource this strategy declares as its focus. `Lowest` picks
    /// whichever the actor currently holds less of.
    pub fn focus(self, holdings: Resources) -> &'static str {
        match self {
            ResourcePreference::Metal => "metal",
            ResourcePreference::Energy => "energy",
            ResourcePreference::Lowest => {
                if holdings.metal <= holdings.energy {
                    "metal"
                } else {
                    "energy"
                }
            }
        }
    }
}

/// Immutable-while-active engine configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BotConfig {
    pub tier: Tier,
    pub attack_enabled: bool,
    pub rank_filter: RankFilter,
    pub resource_preference: ResourcePreference,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            tier: Tier::Basic,
            attack_enabled: false,
            rank_filter: RankFilter::Any,
            resource_preference: ResourcePreference::Lowest,
        }
    }
}

/// Partial configuration update; only set fields are merged.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ConfigPatch {
    pub tier: Option<Tier>,
    pub attack_enabled: Option<bool>,
    pub rank_filter: Option<RankFilter>,
    pub resource_preference: Option<ResourcePreference>,
}

impl BotConfig {
    pub fn merge(&mut self, patch: ConfigPatch) {
        if let Some(tier) = patch.tier {
            self.tier = tier;
        }
        if let Some(attack) = patch.attack_enabled {
            self.attack_enabled = attack;
        }
        if let Some(filter) = patch.rank_filter {
            self.rank_filter = filter;
        }
        if let Some(pref) = patch.resource_preference {
            self.resource_preference = pref;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Stopped,
    Active,
    Paused,
}

/// Mutable run state owned by the engine task.
///
/// Invariant: `Active` implies `started_at` is set and `paused_at` is not;
/// `Paused` implies `paused_at` is set. On resume the pause gap is added back
/// into `started_at` so elapsed time never counts paused intervals.
#[derive(Debug, Clone)]
pub struct RunState {
    pub status: RunStatus,
    pub position: Coord,
    pub start_position: Coord,
    pub row: u32,
    pub direction: SweepDirection,
    pub tiles_done: u64,
    pub started_at: Option<Instant>,
    pub paused_at: Option<Instant>,
    pub last_harvest_at: Option<Instant>,
}

impl RunState {
    pub fn new(start: Coord) -> Self {
        Self {
            status: RunStatus::Stopped,
            position: start,
            start_position: start,
            row: start.y,
            direction: SweepDirection::Forward,
            tiles_done: 0,
            started_at: None,
            paused_at: None,
            last_harvest_at: None,
        }
    }

    pub fn begin(&mut self, now: Instant) {
        self.status = RunStatus::Active;
        self.start_position = self.position;
        self.row = self.position.y;
        self.direction = SweepDirection::Forward;
        self.tiles_done = 0;
        self.started_at = Some(now);
        self.paused_at = None;
    }

    pub fn pause(&mut self, now: Instant) {
        self.status = RunStatus::Paused;
        self.paused_at = Some(now);
    }

    pub fn resume(&mut self, now: Instant) {
        if let Some(paused_at) = self.paused_at.take() {
            if let Some(started_at) = &mut self.started_at {
                *started_at += now.saturating_duration_since(paused_at);
            }
        }
        self.status = RunStatus::Active;
    }

    /// Reset the transient session fields. Position and sweep state carry over
    /// so a later start continues from where the actor stands.
    pub fn halt(&mut self) {
        self.status = RunStatus::Stopped;
        self.tiles_done = 0;
        self.started_at = None;
        self.paused_at = None;
    }

    pub fn elapsed(&self, now: Instant) -> Duration {
        match (self.started_at, self.paused_at) {
            (Some(started), Some(paused)) => paused.saturating_duration_since(started),
            (Some(started), None) => now.saturating_duration_since(started),
            (None, _) => Duration::ZERO,
        }
    }

    pub fn snapshot(&self, now: Instant, config: BotConfig) -> RunSnapshot {
        RunSnapshot {
            status: self.status,
            position: self.position,
            start_position: self.start_position,
            row: self.row,
            direction: self.direction,
            tiles_done: self.tiles_done,
            elapsed_ms: self.elapsed(now).as_millis() as u64,
            config,
        }
    }
}

/// Host-visible view of the run state, published on a watch channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSnapshot {
    pub status: RunStatus,
    pub position: Coord,
    pub start_position: Coord,
    pub row: u32,
    pub direction: SweepDirection,
    pub tiles_done: u64,
    pub elapsed_ms: u64,
    pub config: BotConfig,
}

/// Per-session counters. Monotone while a session runs; cleared only by an
/// explicit reset after the host has persisted them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionStats {
    pub tiles_visited: u64,
    pub metal_gained: u64,
    pub energy_gained: u64,
    pub items_found: BTreeMap<String, u64>,
    pub attacks_launched: u64,
    pub attacks_won: u64,
    pub attacks_lost: u64,
    pub errors: u64,
    pub elapsed_ms: u64,
}

impl SessionStats {
    pub fn record_item(&mut self, category: &str) {
        *self.items_found.entry(category.to_string()).or_insert(0) += 1;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Move,
    Harvest,
    Combat,
    Error,
    Complete,
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EventKind::Move => "move",
            EventKind::Harvest => "harvest",
            EventKind::Combat => "combat",
            EventKind::Error => "error",
            EventKind::Complete => "complete",
        };
        f.write_str(s)
    }
}

/// A single structured notification. Fire-and-forget; the engine keeps no log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionEvent {
    pub kind: EventKind,
    pub timestamp_utc: String,
    pub position: Coord,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
}

impl ActionEvent {
    pub fn new(kind: EventKind, position: Coord, message: impl Into<String>) -> Self {
        Self {
            kind,
            timestamp_utc: now_rfc3339(),
            position,
            message: message.into(),
            payload: None,
        }
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = Some(payload);
        self
    }
}

/// Everything the engine emits to its host over the event channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum BotEvent {
    Action(ActionEvent),
    /// The host should re-render any resource display (sent after a
    /// verified harvest).
    RefreshRequested,
    SessionComplete {
        stats: SessionStats,
    },
}

pub fn now_rfc3339() -> String {
    time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| "now".into())
}
