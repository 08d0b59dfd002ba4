//! Train the goal-guy network and print the epoch log.
//!
//! ```text
//! cargo run --release --example train_goal_guy -- [epochs] [patterns.json]
//! ```
//!
//! Without a path, a fresh 25-row pattern table is generated. The run
//! summary is logged at info level.

use anyhow::{Context, Result};
use goalseek::{Network, NetworkConfig, PatternGen, PatternStore, Sim, SimConfig, TimeScale};
use rand::rngs::StdRng;
use rand::SeedableRng;

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let mut args = std::env::args().skip(1);
    let epochs: usize = match args.next() {
        Some(arg) => arg.parse().context("epochs must be a number")?,
        None => 50,
    };

    let mut config = SimConfig {
        max_epochs: epochs,
        train_update: TimeScale::Epoch,
        ..SimConfig::default()
    };
    config.new_random_seed();

    let store = match args.next() {
        Some(path) => PatternStore::open_or_empty(path, [5, 5]),
        None => {
            let mut rng = StdRng::seed_from_u64(config.seed);
            PatternStore::generate(25, [5, 5], &PatternGen::goal_guy(), &mut rng)
        }
    };

    let net = Network::from_config(&NetworkConfig::goal_guy().with_seed(config.seed))
        .context("building goal-guy network")?;
    let mut sim = Sim::new(config, net, store).context("configuring simulation")?;
    sim.set_observer(Box::new(|time: &goalseek::SimTime| {
        tracing::debug!(settles = time.settles, cycles = time.total_cycles, "view update");
    }));

    let summary = sim.train()?;
    println!(
        "{} epochs in {:.2?} ({:.2?} per epoch)",
        summary.epochs,
        summary.elapsed,
        summary.per_epoch()
    );

    println!("Epoch\tOutSSE\tMotSSE\tOutPredPctCor\tOutGoalPctCor\tOutCosDiff");
    for row in sim.log().rows() {
        println!(
            "{}\t{:.3}\t{:.3}\t{:.2}\t{:.2}\t{:.3}",
            row.epoch,
            row.out_sse,
            row.mot_sse,
            row.out_pred_pct_cor,
            row.out_goal_pct_cor,
            row.out_cos_diff
        );
    }
    Ok(())
}
