mod api;
mod server;

use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use reel_engine::config::EngineConfig;
use reel_engine::engagement::EngagementService;
use reel_engine::game::fairness::{encrypt_values, join_values, parse_values};
use reel_engine::game::{FairnessKey, GameFairnessEngine, GameLifecycleManager, GameStore};
use reel_engine::notify::LogNotifier;
use reel_engine::random::{RandomSource, ScriptedRandom, SeededRandom};
use reel_engine::scoring::{BadgeTier, ReachInput};
use reel_engine::store::SocialStore;
use reel_engine::{
    build_scorers, format_float, format_number, EngagementSnapshot, EngineError, EngineResult,
};

#[derive(Parser)]
#[command(name = "reel-engine", about = "Engagement scoring, feed ranking and fair guessing games")]
struct Cli {
    /// Configuration file (defaults to ENGINE_CONFIG_PATH or config/engine.toml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Estimate an item's reach.
    Reach(ReachArgs),
    /// Points awarded for sharing an item.
    SharePoints(SharePointsArgs),
    /// Badge tier for a share-point total.
    Badge(BadgeArgs),
    /// Draw and commit winning values for a guessing game.
    Commit(CommitArgs),
    /// Check revealed values against a published commitment.
    Verify(VerifyArgs),
    /// Generate a fresh fairness key.
    Keygen,
    /// Write the effective configuration to a TOML file.
    InitConfig(InitConfigArgs),
    /// Close every due auto-close game and select winners.
    CloseExpired(DataArgs),
    Serve(ServeArgs),
}

#[derive(Args, Debug, Clone)]
struct EngagementArgs {
    #[arg(long, default_value_t = 0)]
    likes: u64,
    #[arg(long, default_value_t = 0)]
    comments: u64,
    #[arg(long, default_value_t = 0)]
    replies: u64,
    #[arg(long, default_value_t = 0)]
    shares: u64,
    #[arg(long, default_value_t = 0)]
    saves: u64,
    #[arg(long, default_value_t = 0)]
    views: u64,
    #[arg(long, default_value_t = 1.0)]
    watch_ratio: f64,
}

impl EngagementArgs {
    fn snapshot(&self) -> EngagementSnapshot {
        EngagementSnapshot {
            likes: self.likes,
            top_level_comments: self.comments,
            replies: self.replies,
            shares: self.shares,
            saves: self.saves,
            views: self.views,
            watch_ratio: self.watch_ratio.max(0.0),
        }
    }
}

#[derive(Args, Debug, Clone)]
struct ReachArgs {
    #[command(flatten)]
    engagement: EngagementArgs,
    #[arg(long, default_value_t = 1000)]
    followers: u64,
    #[arg(long, default_value_t = 50_000)]
    total_users: u64,
    /// Badge tier whose reach floor applies (silver, gold, platinum, cientium).
    #[arg(long)]
    badge: Option<String>,
    /// Seed for repeatable draws.
    #[arg(long)]
    seed: Option<u64>,
    /// Pin every draw to its minimum and disable the viral roll.
    #[arg(long, conflicts_with = "seed")]
    floor: bool,
}

#[derive(Args, Debug, Clone)]
struct SharePointsArgs {
    #[command(flatten)]
    engagement: EngagementArgs,
    /// Current reach of the shared item.
    #[arg(long)]
    reach: Option<u64>,
    /// Shares the sharer already made today.
    #[arg(long, default_value_t = 0)]
    shares_today: u64,
}

#[derive(Args, Debug, Clone)]
struct BadgeArgs {
    #[arg(long)]
    points: u64,
}

#[derive(Args, Debug, Clone)]
struct CommitArgs {
    #[arg(long, default_value_t = 1)]
    min: u32,
    #[arg(long, default_value_t = 100)]
    max: u32,
    #[arg(long, default_value_t = 1)]
    winners: usize,
}

#[derive(Args, Debug, Clone)]
struct VerifyArgs {
    /// Values joined with '-', e.g. 4-17-92.
    #[arg(long)]
    values: String,
    #[arg(long)]
    salt: String,
    #[arg(long)]
    hash: String,
}

#[derive(Args, Debug, Clone)]
struct InitConfigArgs {
    #[arg(long, default_value = "config/engine.toml")]
    out: PathBuf,
    /// Overwrite an existing file.
    #[arg(long)]
    force: bool,
}

#[derive(Args, Debug, Clone)]
struct DataArgs {
    #[arg(long, default_value = "data")]
    data_dir: PathBuf,
}

#[derive(Args, Debug, Clone)]
struct ServeArgs {
    #[arg(long, default_value = "127.0.0.1")]
    host: String,
    #[arg(long, default_value_t = 8787)]
    port: u16,
    #[command(flatten)]
    data: DataArgs,
    /// Seconds between expired-game sweeps; 0 disables the sweep.
    #[arg(long, default_value_t = 60)]
    sweep_secs: u64,
}

#[tokio::main]
async fn main() {
    load_dotenv();
    init_tracing();
    if let Err(err) = run().await {
        eprintln!("Error: {}", err);
        std::process::exit(1);
    }
}

async fn run() -> EngineResult<()> {
    let cli = Cli::parse();
    let (config, config_path) = EngineConfig::load(cli.config)?;
    if let Some(path) = config_path.as_ref().filter(|path| path.exists()) {
        info!(path = %path.display(), "configuration loaded");
    }

    match cli.command {
        Command::Reach(args) => run_reach(&config, args),
        Command::SharePoints(args) => run_share_points(&config, args),
        Command::Badge(args) => run_badge(&config, args),
        Command::Commit(args) => run_commit(&config, args),
        Command::Verify(args) => run_verify(args),
        Command::Keygen => {
            println!("{}", FairnessKey::generate().to_hex());
            Ok(())
        }
        Command::InitConfig(args) => run_init_config(&config, args),
        Command::CloseExpired(args) => run_close_expired(&config, args).await,
        Command::Serve(args) => run_serve(config, args).await,
    }
}

fn run_reach(config: &EngineConfig, args: ReachArgs) -> EngineResult<()> {
    let scorers = build_scorers(config);
    let badge_min_reach = match args.badge.as_deref() {
        Some(label) => BadgeTier::from_str(label)
            .ok_or_else(|| EngineError::Validation(format!("invalid badge tier: {}", label)))?
            .min_reach(),
        None => None,
    };
    let input = ReachInput {
        snapshot: args.engagement.snapshot(),
        followers_count: args.followers,
        total_user_count: args.total_users,
        badge_min_reach,
    };

    let mut rng: Box<dyn RandomSource> = if args.floor {
        Box::new(ScriptedRandom::floor())
    } else if let Some(seed) = args.seed {
        Box::new(SeededRandom::from_seed(seed))
    } else {
        Box::new(SeededRandom::from_entropy())
    };
    let breakdown = scorers.reach.estimate_detailed(&input, rng.as_mut());

    println!("Reach: {}", format_number(breakdown.reach as f64));
    println!(
        "Initial reach: {} | engagement reach: {} | random boost: {}",
        format_number(breakdown.initial_reach),
        format_float(breakdown.engagement_reach, 1),
        format_float(breakdown.random_boost, 1)
    );
    println!(
        "Cap: {} | viral roll: {}",
        format_number(breakdown.max_reach),
        if breakdown.viral { "hit" } else { "miss" }
    );
    Ok(())
}

fn run_share_points(config: &EngineConfig, args: SharePointsArgs) -> EngineResult<()> {
    let scorers = build_scorers(config);
    let calculator = &scorers.share_points;
    let base = calculator.points(&args.engagement.snapshot(), args.reach);
    let awarded = calculator.apply_daily_bonus(base, args.shares_today);

    println!("Share points: {}", format_number(awarded as f64));
    println!(
        "Base points: {} | viral factor: {}",
        format_number(base as f64),
        format_float(calculator.viral_factor(args.reach), 2)
    );
    Ok(())
}

fn run_badge(config: &EngineConfig, args: BadgeArgs) -> EngineResult<()> {
    let scorers = build_scorers(config);
    let accrual = scorers.badges.resolve(args.points);
    println!("Badge tier: {}", accrual.tier.label());
    println!(
        "Stored total: {}",
        format_number(accrual.total_share_points as f64)
    );
    if let Some(floor) = accrual.tier.min_reach() {
        println!("Reach floor: {}", format_number(floor as f64));
    }
    Ok(())
}

fn run_commit(config: &EngineConfig, args: CommitArgs) -> EngineResult<()> {
    let key = match config.game.fairness_key() {
        Ok(key) => key,
        Err(_) => {
            warn!("GAME_FAIRNESS_KEY is not set, sealing with a one-off key");
            let key = FairnessKey::generate();
            println!("Key: {}", key.to_hex());
            key
        }
    };
    let engine = GameFairnessEngine::new(key.clone());
    let commitment = engine.commit(args.min, args.max, args.winners)?;

    println!("Winning values: {}", join_values(&commitment.winning_values));
    println!("Salt: {}", commitment.salt);
    println!("Hash commit: {}", commitment.hash_commit);
    println!(
        "Ciphertext: {}",
        encrypt_values(&commitment.winning_values, &key)?
    );
    Ok(())
}

fn run_verify(args: VerifyArgs) -> EngineResult<()> {
    let values = parse_values(args.values.trim())
        .ok_or_else(|| EngineError::Validation(format!("invalid values: {}", args.values)))?;
    let valid = GameFairnessEngine::verify(&values, args.salt.trim(), &args.hash);
    println!("{}", if valid { "valid" } else { "INVALID" });
    if !valid {
        std::process::exit(2);
    }
    Ok(())
}

fn run_init_config(config: &EngineConfig, args: InitConfigArgs) -> EngineResult<()> {
    if args.out.exists() && !args.force {
        return Err(EngineError::Config(format!(
            "{} already exists, pass --force to overwrite",
            args.out.display()
        )));
    }
    let mut written = config.clone();
    written.game.fairness_key = None;
    written.write(&args.out)?;
    println!("Wrote {}", args.out.display());
    Ok(())
}

async fn run_close_expired(config: &EngineConfig, args: DataArgs) -> EngineResult<()> {
    let games = open_games(config, &args.data_dir).await?;
    let report = games.close_expired(Utc::now()).await;
    println!(
        "Closed: {} | skipped: {} | failed: {}",
        report.closed.len(),
        report.skipped.len(),
        report.failed.len()
    );
    for (game_id, reason) in &report.failed {
        println!("- game {}: {}", game_id, reason);
    }
    Ok(())
}

async fn run_serve(config: EngineConfig, args: ServeArgs) -> EngineResult<()> {
    let social = SocialStore::load(args.data.data_dir.join("social.json")).await?;
    let engagement = EngagementService::new(Arc::new(social), build_scorers(&config));
    let games = open_games(&config, &args.data.data_dir).await?;

    let addr: SocketAddr = format!("{}:{}", args.host, args.port)
        .parse()
        .map_err(|err| EngineError::Config(format!("invalid bind address: {}", err)))?;
    let sweep = (args.sweep_secs > 0).then(|| Duration::from_secs(args.sweep_secs));

    let state = server::AppState {
        engagement: Arc::new(engagement),
        games: Arc::new(games),
    };
    server::serve(state, addr, sweep).await
}

async fn open_games(config: &EngineConfig, data_dir: &Path) -> EngineResult<GameLifecycleManager> {
    let key = config.game.fairness_key()?;
    let store = GameStore::load(data_dir.join("games.json")).await?;
    Ok(GameLifecycleManager::new(
        Arc::new(store),
        GameFairnessEngine::new(key),
        Arc::new(LogNotifier),
        config.game.clone(),
    ))
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn load_dotenv() {
    let _ = dotenvy::dotenv();
    let manifest_dir = env!("CARGO_MANIFEST_DIR");
    let manifest_path = Path::new(manifest_dir).join(".env");
    let _ = dotenvy::from_path(manifest_path);
}
