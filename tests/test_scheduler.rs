//! Integration tests for the trial/epoch scheduler.
//!
//! Tests Sim end to end:
//! - Presentation order is a permutation (or identity when sequential)
//! - Runs are reproducible from the seed
//! - Epoch rows are normalized sums of per-trial metrics
//! - Stop requests never split a trial
//! - Relay state never leaks across trials
//! - Degenerate stores and unresolved roles

mod common;

use approx::assert_relative_eq;
use common::ScriptedEngine;
use goalseek::utils::is_permutation;
use goalseek::{
    EpochRow, Network, NetworkConfig, PatternGen, PatternStore, Result, Role, Sim, SimConfig,
    SimError, SimTime, TimeScale, TrialState, ViewObserver,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

/// Collects every epoch log row handed to the observer.
struct RowCollector(Arc<Mutex<Vec<EpochRow>>>);

impl ViewObserver for RowCollector {
    fn update(&mut self, _time: &SimTime) {}

    fn epoch_logged(&mut self, row: &EpochRow) {
        self.0.lock().unwrap().push(*row);
    }
}

fn quick_config() -> SimConfig {
    SimConfig {
        cycles_per_quarter: 2,
        view_on: false,
        ..SimConfig::default()
    }
}

fn goal_guy_store(rows: usize, seed: u64) -> PatternStore {
    PatternStore::generate(
        rows,
        [5, 5],
        &PatternGen::goal_guy(),
        &mut StdRng::seed_from_u64(seed),
    )
}

fn network_sim(seed: u64) -> Result<Sim<Network>> {
    let net = Network::from_config(&NetworkConfig::goal_guy().with_seed(seed))?;
    let config = SimConfig {
        seed,
        cycles_per_quarter: 5,
        view_on: false,
        ..SimConfig::default()
    };
    Sim::new(config, net, goal_guy_store(6, 11))
}

#[test]
fn test_each_row_once_per_epoch() -> Result<()> {
    let mut sim = Sim::new(quick_config(), ScriptedEngine::goal_guy(25), goal_guy_store(7, 0))?;

    for epoch in 0..3 {
        assert!(is_permutation(sim.presentation_order()));
        let mut seen = BTreeSet::new();
        loop {
            let report = sim.step_trial()?;
            assert_eq!(report.epoch, epoch);
            assert!(seen.insert(report.row.unwrap()));
            if report.closed_epoch.is_some() {
                break;
            }
        }
        assert_eq!(seen, (0..7).collect());
        assert_eq!(sim.epoch(), epoch + 1);
        assert_eq!(sim.trial(), 0);
    }
    Ok(())
}

#[test]
fn test_sequential_order_is_identity() -> Result<()> {
    let config = SimConfig {
        sequential: true,
        ..quick_config()
    };
    let mut sim = Sim::new(config, ScriptedEngine::goal_guy(25), goal_guy_store(5, 0))?;

    for _ in 0..2 {
        assert_eq!(sim.presentation_order(), &[0, 1, 2, 3, 4]);
        for trial in 0..5 {
            assert_eq!(sim.step_trial()?.row, Some(trial));
        }
    }
    Ok(())
}

#[test]
fn test_same_seed_same_log() -> Result<()> {
    let mut a = network_sim(3)?;
    let mut b = network_sim(3)?;

    let mut orders_a = Vec::new();
    let mut orders_b = Vec::new();
    for _ in 0..3 {
        orders_a.push(a.presentation_order().to_vec());
        orders_b.push(b.presentation_order().to_vec());
        a.step_epoch()?;
        b.step_epoch()?;
    }

    assert_eq!(orders_a, orders_b);
    assert_eq!(a.log().to_json()?, b.log().to_json()?);
    Ok(())
}

#[test]
fn test_init_restarts_the_run() -> Result<()> {
    let mut sim = network_sim(5)?;
    let first_order = sim.presentation_order().to_vec();
    sim.step_epoch()?;
    let first_row = *sim.log().last().unwrap();

    sim.init();
    assert!(sim.log().is_empty());
    assert_eq!(sim.epoch(), 0);
    assert_eq!(sim.presentation_order(), first_order.as_slice());

    sim.step_epoch()?;
    assert_eq!(*sim.log().last().unwrap(), first_row);
    Ok(())
}

#[test]
fn test_epoch_row_is_mean_of_trials() -> Result<()> {
    let mut sim = network_sim(9)?;
    let n = sim.store().num_rows();

    let mut out_sse = 0.0;
    let mut mot_sse = 0.0;
    let mut out_cos = 0.0;
    let mut pred_errs = 0;
    loop {
        let report = sim.step_trial()?;
        out_sse += report.outcome_driven.out_sse;
        out_cos += report.outcome_driven.out_cos_diff;
        mot_sse += report.goal_driven.mot_sse;
        pred_errs += usize::from(report.outcome_driven.outcome_error());
        if report.closed_epoch.is_some() {
            break;
        }
    }

    let row = sim.log().last().unwrap();
    assert_relative_eq!(row.out_sse, out_sse / n as f32, epsilon = 1e-5);
    assert_relative_eq!(row.mot_sse, mot_sse / n as f32, epsilon = 1e-5);
    assert_relative_eq!(row.out_cos_diff, out_cos / n as f32, epsilon = 1e-5);
    assert_eq!(row.out_pred_cnt_err, pred_errs);
    assert_relative_eq!(row.out_pred_pct_err + row.out_pred_pct_cor, 1.0);
    assert_relative_eq!(row.out_goal_pct_err + row.out_goal_pct_cor, 1.0);
    assert!(sim.accumulators().is_zero());
    Ok(())
}

#[test]
fn test_all_zero_store() -> Result<()> {
    let mut sim = Sim::new(
        quick_config(),
        ScriptedEngine::goal_guy(25),
        PatternStore::zeros(4, [5, 5]),
    )?;
    sim.step_epoch()?;

    let row = sim.log().rows()[0];
    assert_eq!(row.out_sse, 0.0);
    assert_eq!(row.mot_sse, 0.0);
    assert_eq!(row.out_pred_pct_err, 0.0);
    assert_eq!(row.out_pred_pct_cor, 1.0);
    assert_eq!(row.out_pred_cnt_err, 0);
    assert_eq!(row.out_goal_pct_err, 0.0);
    assert_eq!(row.out_goal_pct_cor, 1.0);
    assert_eq!(row.out_goal_cnt_err, 0);
    assert_eq!(row.out_cos_diff, 1.0);
    assert_eq!(row.mot_cos_diff, 1.0);
    assert_eq!(row.out_act_avg, 0.0);
    Ok(())
}

#[test]
fn test_single_row_full_misprediction() -> Result<()> {
    let mut store = PatternStore::zeros(1, [5, 5]);
    store.set_cell(Role::Outcome, 0, &[1.0; 25])?;
    let mut sim = Sim::new(quick_config(), ScriptedEngine::goal_guy(25), store)?;

    let report = sim.step_trial()?;
    assert_eq!(report.closed_epoch, Some(0));

    let row = sim.log().rows()[0];
    assert_eq!(row.out_sse, 25.0);
    assert_eq!(row.out_avg_sse, 1.0);
    assert_eq!(row.out_pred_pct_err, 1.0);
    assert_eq!(row.out_pred_pct_cor, 0.0);
    assert_eq!(row.out_pred_cnt_err, 1);
    assert_eq!(row.out_goal_cnt_err, 0);
    Ok(())
}

#[test]
fn test_goal_mismatch_counted_per_trial() -> Result<()> {
    let mut engine = ScriptedEngine::goal_guy(25);
    engine.set_produced("Goal", vec![1.0; 25]);
    let mut sim = Sim::new(quick_config(), engine, PatternStore::zeros(4, [5, 5]))?;
    sim.step_epoch()?;

    let row = sim.log().rows()[0];
    assert_eq!(row.out_goal_cnt_err, 4);
    assert_eq!(row.out_goal_pct_err, 1.0);
    assert_eq!(row.out_goal_pct_cor, 0.0);
    Ok(())
}

#[test]
fn test_empty_store_runs_degenerate_epochs() -> Result<()> {
    let config = SimConfig {
        max_epochs: 3,
        ..quick_config()
    };
    let mut sim = Sim::new(config, ScriptedEngine::goal_guy(25), PatternStore::new([5, 5]))?;

    let report = sim.step_trial()?;
    assert_eq!(report.row, None);
    assert_eq!(report.closed_epoch, Some(0));

    let summary = sim.train()?;
    assert_eq!(summary.epochs, 2);
    assert_eq!(sim.log().len(), 3);
    for row in sim.log().rows() {
        assert_eq!(row.out_sse, 0.0);
        assert_eq!(row.out_pred_pct_cor, 1.0);
    }
    assert_eq!(sim.engine().settles, 0);
    Ok(())
}

#[test]
fn test_unresolved_role_is_fatal() {
    let engine = ScriptedEngine::with_layers(&[("Context", 25), ("Goal", 25), ("Outcome", 25)]);
    let err = Sim::new(quick_config(), engine, goal_guy_store(3, 0))
        .err()
        .unwrap();

    assert!(matches!(err, SimError::UnresolvedRole { role: Role::Motor }));
    assert!(err.is_fatal());
}

#[test]
fn test_stop_never_splits_a_trial() -> Result<()> {
    // Settle 3 is sub-phase 0 of the second trial; settle 4 is its sub-phase 1
    for stop_at in [3, 4] {
        let mut sim =
            Sim::new(quick_config(), ScriptedEngine::goal_guy(25), goal_guy_store(4, 0))?;
        let token = sim.stop_token();
        sim.engine_mut().stop_at_settle = Some((stop_at, token));

        let summary = sim.train()?;

        assert_eq!(summary.epochs, 0);
        assert_eq!(sim.engine().settles, 4);
        assert_eq!(sim.trial(), 2);
        assert_eq!(sim.state(), TrialState::AwaitingSubPhase0);
        assert!(sim.relay().is_clear());
    }
    Ok(())
}

#[test]
fn test_train_resumes_after_stop() -> Result<()> {
    let config = SimConfig {
        max_epochs: 2,
        ..quick_config()
    };
    let mut sim = Sim::new(config, ScriptedEngine::goal_guy(25), goal_guy_store(3, 0))?;
    let token = sim.stop_token();
    sim.engine_mut().stop_at_settle = Some((3, token));

    let first = sim.train()?;
    assert_eq!(first.epochs, 0);
    assert_eq!(sim.trial(), 2);

    let second = sim.train()?;
    assert_eq!(second.epochs, 2);
    assert_eq!(sim.epoch(), 2);
    assert_eq!(sim.engine().settles, 2 * 3 * 2);
    assert_eq!(sim.log().len(), 2);
    Ok(())
}

#[test]
fn test_stale_stop_does_not_block_train() -> Result<()> {
    let config = SimConfig {
        max_epochs: 2,
        ..quick_config()
    };
    let mut sim = Sim::new(config, ScriptedEngine::goal_guy(25), goal_guy_store(3, 0))?;
    sim.stop();

    let summary = sim.train()?;
    assert_eq!(summary.epochs, 2);
    assert_eq!(sim.engine().settles, 12);
    Ok(())
}

#[test]
fn test_epoch_boundary_state() -> Result<()> {
    let mut sim = Sim::new(quick_config(), ScriptedEngine::goal_guy(25), goal_guy_store(2, 0))?;

    sim.step_trial()?;
    assert_eq!(sim.state(), TrialState::AwaitingSubPhase0);
    let report = sim.step_trial()?;
    assert_eq!(report.closed_epoch, Some(0));
    assert_eq!(sim.state(), TrialState::EpochBoundary);

    sim.step_trial()?;
    assert_eq!(sim.state(), TrialState::AwaitingSubPhase0);
    Ok(())
}

#[test]
fn test_observer_sees_each_epoch_row() -> Result<()> {
    let config = SimConfig {
        max_epochs: 3,
        ..quick_config()
    };
    let rows = Arc::new(Mutex::new(Vec::new()));
    let mut sim = Sim::new(config, ScriptedEngine::goal_guy(25), goal_guy_store(3, 0))?;
    sim.set_observer(Box::new(RowCollector(Arc::clone(&rows))));

    let (sim, summary) = sim.spawn_train().join()?;

    assert_eq!(summary.epochs, 3);
    assert_eq!(rows.lock().unwrap().as_slice(), sim.log().rows());
    Ok(())
}

#[test]
fn test_outcome_driven_inputs_repeat_across_epochs() -> Result<()> {
    let mut engine = ScriptedEngine::goal_guy(25);
    engine.set_produced("Outcome", vec![0.7; 25]);
    engine.set_produced("Motor", vec![0.3; 25]);
    let config = SimConfig {
        sequential: true,
        ..quick_config()
    };
    let store = goal_guy_store(3, 8);
    let mut sim = Sim::new(config, engine, store.clone())?;

    sim.step_epoch()?;
    sim.step_epoch()?;

    for role in [Role::Context, Role::Outcome] {
        let applied = sim.engine().applied_to(role.name());
        assert_eq!(applied.len(), 6);
        assert_eq!(applied[..3], applied[3..]);
        for (row, values) in applied[..3].iter().enumerate() {
            assert_eq!(values.as_slice(), store.cell(role, row));
        }
    }
    Ok(())
}

#[test]
fn test_step_epoch_stops_early() -> Result<()> {
    let mut sim = Sim::new(quick_config(), ScriptedEngine::goal_guy(25), goal_guy_store(5, 0))?;
    let token = sim.stop_token();
    sim.engine_mut().stop_at_settle = Some((1, token));

    sim.step_epoch()?;
    assert_eq!(sim.trial(), 1);
    assert_eq!(sim.epoch(), 0);
    assert!(sim.log().is_empty());
    Ok(())
}

#[test]
fn test_relay_never_leaks() -> Result<()> {
    let mut engine = ScriptedEngine::goal_guy(25);
    engine.set_produced("Outcome", vec![0.7; 25]);
    engine.set_produced("Motor", vec![0.3; 25]);
    let store = goal_guy_store(3, 4);
    let authored = store.clone();
    let mut sim = Sim::new(quick_config(), engine, store)?;

    for _ in 0..9 {
        sim.step_trial()?;
        assert!(sim.relay().is_clear());
    }
    assert_eq!(sim.store(), &authored);

    // Every sub-phase 1 clamps the Goal to this trial's produced Outcome
    let goals = sim.engine().applied_to("Goal");
    assert_eq!(goals.len(), 9);
    assert!(goals.iter().all(|g| g == &vec![0.7; 25]));
    Ok(())
}

#[test]
fn test_test_mode_never_learns() -> Result<()> {
    let config = SimConfig {
        learn: false,
        test_update: TimeScale::Epoch,
        ..quick_config()
    };
    let mut sim = Sim::new(config, ScriptedEngine::goal_guy(25), goal_guy_store(3, 0))?;
    sim.step_epoch()?;

    assert_eq!(sim.engine().settles, 6);
    assert_eq!(sim.engine().dwt_calls, 0);
    assert_eq!(sim.log().len(), 1);
    Ok(())
}

#[test]
fn test_background_training() -> Result<()> {
    let config = SimConfig {
        max_epochs: 4,
        ..quick_config()
    };
    let sim = Sim::new(config, ScriptedEngine::goal_guy(25), goal_guy_store(3, 0))?;

    let handle = sim.spawn_train();
    let (sim, summary) = handle.join()?;

    assert_eq!(summary.epochs, 4);
    assert_eq!(sim.log().len(), 4);
    assert_eq!(sim.engine().settles, 4 * 3 * 2);
    Ok(())
}

#[test]
fn test_background_stop() -> Result<()> {
    let config = SimConfig {
        max_epochs: 1000,
        ..quick_config()
    };
    let sim = Sim::new(config, ScriptedEngine::goal_guy(25), goal_guy_store(3, 0))?;

    let handle = sim.spawn_train();
    handle.stop();
    let (sim, summary) = handle.join()?;

    assert!(summary.epochs < 1000);
    assert_eq!(sim.log().len(), summary.epochs);
    assert_eq!(sim.engine().settles % 2, 0);
    Ok(())
}

#[test]
fn test_open_patterns_fallback() -> Result<()> {
    let mut sim = Sim::new(quick_config(), ScriptedEngine::goal_guy(25), goal_guy_store(3, 0))?;
    sim.open_patterns(std::env::temp_dir().join("goalseek_no_such_patterns.json"));

    assert!(sim.store().is_empty());
    assert_eq!(sim.store().shape(), [5, 5]);
    sim.step_trial()?;
    assert_eq!(sim.log().len(), 1);
    Ok(())
}
