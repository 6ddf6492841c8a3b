use crate::engine::{BotEngine, EngineControl};
use crate::game::HttpGameClient;
use crate::model::{
    BotConfig, BotEvent, Coord, GridSize, RankFilter, ResourcePreference, Tier,
};
use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::io::Write;
use std::time::Duration;
use tokio::sync::mpsc;

/// Output line routing for stdout/stderr writer.
enum OutputLine {
    Stdout(String),
    Stderr(String),
}

/// Spawn a blocking writer for stdout/stderr to avoid blocking async tasks.
fn spawn_output_writer() -> (
    mpsc::UnboundedSender<OutputLine>,
    tokio::task::JoinHandle<()>,
) {
    let (tx, mut rx) = mpsc::unbounded_channel::<OutputLine>();
    let handle = tokio::task::spawn_blocking(move || {
        let stdout = std::io::stdout();
        let stderr = std::io::stderr();
        let mut out = std::io::LineWriter::new(stdout.lock());
        let mut err = std::io::LineWriter::new(stderr.lock());

        while let Some(line) = rx.blocking_recv() {
            match line {
                OutputLine::Stdout(msg) => {
                    let _ = writeln!(out, "{}", msg);
                }
                OutputLine::Stderr(msg) => {
                    let _ = writeln!(err, "{}", msg);
                }
            }
        }

        let _ = out.flush();
        let _ = err.flush();
    });
    (tx, handle)
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum TierArg {
    Premium,
    Basic,
}

impl From<TierArg> for Tier {
    fn from(v: TierArg) -> Self {
        match v {
            TierArg::Premium => Tier::Premium,
            TierArg::Basic => Tier::Basic,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum RankFilterArg {
    Lower,
    Higher,
    Any,
}

impl From<RankFilterArg> for RankFilter {
    fn from(v: RankFilterArg) -> Self {
        match v {
            RankFilterArg::Lower => RankFilter::Lower,
            RankFilterArg::Higher => RankFilter::Higher,
            RankFilterArg::Any => RankFilter::Any,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum PreferenceArg {
    Metal,
    Energy,
    Lowest,
}

impl From<PreferenceArg> for ResourcePreference {
    fn from(v: PreferenceArg) -> Self {
        match v {
            PreferenceArg::Metal => ResourcePreference::Metal,
            PreferenceArg::Energy => ResourcePreference::Energy,
            PreferenceArg::Lowest => ResourcePreference::Lowest,
        }
    }
}

#[derive(Debug, Parser, Clone)]
#[command(
    name = "gridpilot",
    version,
    about = "Automated grid sweep bot for the game service"
)]
pub struct Cli {
    /// Base URL of the game service
    #[arg(long)]
    pub base_url: String,

    /// Actor id to drive
    #[arg(long)]
    pub actor: String,

    /// Grid width in tiles
    #[arg(long, default_value_t = 150)]
    pub grid_width: u32,

    /// Grid height in tiles
    #[arg(long, default_value_t = 150)]
    pub grid_height: u32,

    /// Starting column (1-based)
    #[arg(long, default_value_t = 1)]
    pub start_x: u32,

    /// Starting row (1-based)
    #[arg(long, default_value_t = 1)]
    pub start_y: u32,

    /// Account pacing tier
    #[arg(long, value_enum, default_value_t = TierArg::Basic)]
    pub tier: TierArg,

    /// Attack eligible occupied bases encountered during the sweep
    #[arg(long)]
    pub attack: bool,

    /// Restrict attack targets by rank relative to the actor
    #[arg(long, value_enum, default_value_t = RankFilterArg::Any)]
    pub rank_filter: RankFilterArg,

    /// Resource to focus when harvesting and looting
    #[arg(long, value_enum, default_value_t = PreferenceArg::Lowest)]
    pub prefer: PreferenceArg,

    /// Use --auto-save true or --auto-save false to override
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    pub auto_save: bool,

    /// Export final session statistics as JSON
    #[arg(long)]
    pub export_json: Option<std::path::PathBuf>,

    /// Print final statistics as JSON instead of the text summary
    #[arg(long)]
    pub json: bool,

    /// Stop the session after this much wall-clock time (e.g. "30m")
    #[arg(long)]
    pub max_runtime: Option<humantime::Duration>,
}

/// Build the engine configuration from CLI arguments.
pub fn build_config(args: &Cli) -> (BotConfig, GridSize, Coord) {
    let cfg = BotConfig {
        tier: args.tier.into(),
        attack_enabled: args.attack,
        rank_filter: args.rank_filter.into(),
        resource_preference: args.prefer.into(),
    };
    let grid = GridSize {
        width: args.grid_width,
        height: args.grid_height,
    };
    let start = Coord::new(args.start_x, args.start_y);
    (cfg, grid, start)
}

pub async fn run(args: Cli) -> Result<()> {
    let (cfg, grid, start) = build_config(&args);
    if grid.width < 1 || grid.height < 1 {
        anyhow::bail!("grid dimensions must be at least 1x1");
    }
    if !grid.contains(start) {
        anyhow::bail!(
            "start position {} is outside the {}x{} grid",
            start,
            grid.width,
            grid.height
        );
    }

    let client = HttpGameClient::new(&args.base_url).context("build game service client")?;
    let engine = BotEngine::new(cfg, grid, args.actor.clone(), start, client);
    let session_id = engine.session_id().to_string();

    let (out_tx, out_handle) = spawn_output_writer();
    let (evt_tx, mut evt_rx) = mpsc::unbounded_channel::<BotEvent>();
    let (ctrl_tx, ctrl_rx) = mpsc::unbounded_channel::<EngineControl>();

    let handle = tokio::spawn(engine.run(evt_tx, ctrl_rx));
    ctrl_tx
        .send(EngineControl::Start)
        .context("engine task exited before start")?;

    // Ctrl-C stops the session cleanly so the final statistics still land.
    {
        let ctrl = ctrl_tx.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                let _ = ctrl.send(EngineControl::Stop);
                let _ = ctrl.send(EngineControl::Shutdown);
            }
        });
    }

    let max_runtime = args.max_runtime.map(Duration::from);
    let mut limit = std::pin::pin!(async {
        match max_runtime {
            Some(d) => tokio::time::sleep(d).await,
            None => std::future::pending::<()>().await,
        }
    });
    let mut limit_fired = false;

    let mut session_completed = false;
    loop {
        tokio::select! {
            _ = &mut limit, if !limit_fired => {
                limit_fired = true;
                let _ = out_tx.send(OutputLine::Stderr("Max runtime reached, stopping".into()));
                let _ = ctrl_tx.send(EngineControl::Stop);
            }
            ev = evt_rx.recv() => match ev {
                None => break,
                Some(BotEvent::Action(ev)) => {
                    if !args.json {
                        let _ = out_tx.send(OutputLine::Stderr(format!(
                            "[{}] {} {}",
                            ev.kind, ev.position, ev.message
                        )));
                    }
                }
                Some(BotEvent::RefreshRequested) => {}
                Some(BotEvent::SessionComplete { .. }) => {
                    session_completed = true;
                    let _ = ctrl_tx.send(EngineControl::Shutdown);
                }
            },
        }
    }

    let stats = handle
        .await
        .context("engine task failed")?
        .context("session failed")?;
    if !session_completed {
        tracing::warn!("engine exited without a completion event");
    }

    if let Some(p) = args.export_json.as_deref() {
        crate::storage::export_json(p, &session_id, &args.actor, &stats)
            .context("export session statistics")?;
    }
    if args.auto_save {
        match crate::storage::save_session(&session_id, &args.actor, &stats) {
            Ok(p) => {
                let _ = out_tx.send(OutputLine::Stderr(format!("Saved: {}", p.display())));
            }
            Err(e) => {
                let _ = out_tx.send(OutputLine::Stderr(format!("Save failed: {e:#}")));
            }
        }
    }

    if args.json {
        let out = serde_json::to_string_pretty(&stats)?;
        let _ = out_tx.send(OutputLine::Stdout(out));
    } else {
        for line in crate::summary::session_summary_lines(&stats) {
            let _ = out_tx.send(OutputLine::Stdout(line));
        }
    }

    drop(out_tx);
    let _ = out_handle.await;
    Ok(())
}
