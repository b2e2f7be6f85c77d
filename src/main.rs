use std::env;
use std::rc::Rc;

use dotenv::dotenv;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use arenabot::actions::ActionVector;
use arenabot::arena::Arena;
use arenabot::controller::{BotController, ClassicLogic, DecisionTicker, HarassLogic};
use arenabot::inference::model::ModelHandle;
use arenabot::inference::runner::EpisodeId;
use arenabot::inference::scripted::ScriptedModel;
use arenabot::modes::{ChaseAgent, CollectAgent, ComponentAgent, ModeRegistry, NeuralCollectorAgent};
use arenabot::steering::ShootConfig;

fn get_env_var_u64(key: &str) -> Option<u64> {
    env::var(key).ok().and_then(|val| val.parse::<u64>().ok())
}

fn init_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("arenabot=debug,info"));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");
}

/// A classic-logic bot whose neural collector runs a scripted stand-in
/// model until a trained asset is wired in.
fn build_classic_bot(seed: u64, period: u64) -> Result<BotController, Box<dyn std::error::Error>> {
    let mut neural = NeuralCollectorAgent::new(EpisodeId(0), seed, false);
    neural.on_enable();
    let obs_size = neural.observation_size();
    let model: ModelHandle = Rc::new(ScriptedModel::preferring(
        obs_size,
        ActionVector { go_to_target: true, ..ActionVector::NOOP },
    ));
    neural.set_model(model)?;

    let registry = ModeRegistry::new(vec![
        Box::new(CollectAgent::new()),
        Box::new(ChaseAgent::new()),
        Box::new(neural),
    ]);
    Ok(BotController::new(
        registry,
        Box::new(ClassicLogic),
        DecisionTicker::new(period, true),
        ShootConfig::default(),
    ))
}

fn build_harass_bot(period: u64) -> BotController {
    // Second generation logic ships without its harass mode; the
    // controller logs the gap and holds still on those ticks.
    let registry = ModeRegistry::new(vec![Box::new(CollectAgent::new())]);
    BotController::new(
        registry,
        Box::new(HarassLogic),
        DecisionTicker::new(period, true),
        ShootConfig::default(),
    )
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    init_logging();

    let seed = get_env_var_u64("ARENA_SEED").unwrap_or(7);
    let period = get_env_var_u64("ARENA_DECISION_PERIOD").unwrap_or(5);
    let max_ticks = get_env_var_u64("ARENA_TICKS").unwrap_or(u64::MAX);

    tracing::info!(seed, period, "starting match");

    let mut arena = Arena::new(seed);
    let mut bots = [build_classic_bot(seed, period)?, build_harass_bot(period)];

    while !arena.is_over() && arena.tick() < max_ticks {
        let commands = [
            bots[0].step(&arena.snapshot_for(0))?,
            bots[1].step(&arena.snapshot_for(1))?,
        ];
        arena.step(commands);
    }

    for bot in bots.iter_mut() {
        bot.teardown();
    }

    let score = arena.score();
    tracing::info!(
        classic = score.captured[0],
        harass = score.captured[1],
        "match over"
    );
    Ok(())
}
