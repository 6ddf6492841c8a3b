//! reqwest implementation of the game-service contract.

use super::{ActorProfile, AttackReport, GameClient, GameError, Resources, TileInfo};
use crate::model::{Coord, MoveDirection};
use reqwest::StatusCode;
use serde::Serialize;
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Clone)]
pub struct HttpGameClient {
    http: reqwest::Client,
    base_url: String,
}

#[derive(Serialize)]
struct MoveRequest<'a> {
    direction: &'a str,
}

#[derive(Serialize)]
struct HarvestRequest {
    x: u32,
    y: u32,
}

#[derive(Serialize)]
struct AttackRequest<'a> {
    defender: &'a str,
    units: &'a [u64],
}

impl HttpGameClient {
    pub fn new(base_url: &str) -> Result<Self, GameError> {
        let http = reqwest::Client::builder()
            .user_agent(format!("gridpilot/{}", env!("CARGO_PKG_VERSION")))
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Map non-success statuses onto the error taxonomy: 409/422 are the
    /// service rejecting a well-formed request, everything else is a fault.
    async fn check(resp: reqwest::Response) -> Result<reqwest::Response, GameError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        tracing::debug!(%status, %body, "game service returned non-success");
        if status == StatusCode::CONFLICT || status == StatusCode::UNPROCESSABLE_ENTITY {
            Err(GameError::Rejected(if body.is_empty() {
                status.to_string()
            } else {
                body
            }))
        } else {
            Err(GameError::Protocol(format!("{status}: {body}")))
        }
    }
}

impl GameClient for HttpGameClient {
    async fn move_actor(&self, actor: &str, dir: MoveDirection) -> Result<Coord, GameError> {
        tracing::debug!(actor, direction = dir.as_str(), "move");
        let resp = self
            .http
            .post(self.url(&format!("/api/actors/{actor}/move")))
            .json(&MoveRequest {
                direction: dir.as_str(),
            })
            .send()
            .await?;
        let resp = Self::check(resp).await?;
        Ok(resp.json::<Coord>().await?)
    }

    async fn inspect_tile(&self, at: Coord) -> Result<TileInfo, GameError> {
        let resp = self
            .http
            .get(self.url(&format!("/api/tiles/{}/{}", at.x, at.y)))
            .send()
            .await?;
        let resp = Self::check(resp).await?;
        Ok(resp.json::<TileInfo>().await?)
    }

    async fn trigger_harvest(&self, actor: &str, at: Coord) -> Result<(), GameError> {
        tracing::debug!(actor, %at, "harvest trigger");
        let resp = self
            .http
            .post(self.url(&format!("/api/actors/{actor}/harvest")))
            .json(&HarvestRequest { x: at.x, y: at.y })
            .send()
            .await?;
        Self::check(resp).await?;
        Ok(())
    }

    async fn actor_resources(&self, actor: &str) -> Result<Resources, GameError> {
        let resp = self
            .http
            .get(self.url(&format!("/api/actors/{actor}/resources")))
            .send()
            .await?;
        let resp = Self::check(resp).await?;
        Ok(resp.json::<Resources>().await?)
    }

    async fn attack(
        &self,
        actor: &str,
        defender: &str,
        units: &[u64],
    ) -> Result<AttackReport, GameError> {
        tracing::debug!(actor, defender, committed = units.len(), "attack");
        let resp = self
            .http
            .post(self.url(&format!("/api/actors/{actor}/attack")))
            .json(&AttackRequest { defender, units })
            .send()
            .await?;
        let resp = Self::check(resp).await?;
        Ok(resp.json::<AttackReport>().await?)
    }

    async fn actor_profile(&self, actor: &str) -> Result<ActorProfile, GameError> {
        let resp = self
            .http
            .get(self.url(&format!("/api/actors/{actor}/profile")))
            .send()
            .await?;
        let resp = Self::check(resp).await?;
        Ok(resp.json::<ActorProfile>().await?)
    }
}
