//! colonykeep Headless Simulation Harness
//!
//! Drives settlements through scripted ticks against the in-memory cell store
//! and checks the bookkeeping stays consistent. No host world, no networking.
//!
//! Usage:
//!   cargo run -p colonykeep-simtest
//!   cargo run -p colonykeep-simtest -- --verbose --seed 9 --ticks 4000
//!   cargo run -p colonykeep-simtest -- --config colony.json

use std::collections::BTreeSet;
use std::path::PathBuf;

use clap::Parser;
use colonykeep_core::happiness::{self, HappinessThresholds, UnitHappinessInput};
use colonykeep_core::persistence;
use colonykeep_core::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

#[derive(Parser, Debug)]
#[command(author, version, about = "Headless simulation harness for colonykeep", long_about = None)]
struct Args {
    /// Print every check, not only failures
    #[arg(long)]
    verbose: bool,

    /// Seed for the randomised scenarios
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Colony config JSON (defaults when omitted)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Ticks to run in the schedule sweep
    #[arg(long, default_value_t = 2400)]
    ticks: u64,
}

// ── Test harness ────────────────────────────────────────────────────────

struct TestResult {
    name: String,
    passed: bool,
    detail: String,
}

impl TestResult {
    fn new(name: &str, passed: bool, detail: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            passed,
            detail: detail.into(),
        }
    }
}

fn main() {
    env_logger::init();
    let args = Args::parse();
    println!("=== colonykeep Simulation Harness ===\n");

    let mut results = Vec::new();

    // 1. Config
    let config = match load_config(&args, &mut results) {
        Some(config) => config,
        None => ColonyConfig::default(),
    };

    // 2. Population id reuse
    results.extend(validate_population_ids(args.seed));

    // 3. Happiness sweep
    results.extend(validate_happiness(&config, args.seed));

    // 4. Territory claims and backlog
    results.extend(validate_territory(&config));

    // 5. Tick schedule
    results.extend(validate_tick_schedule(&config, args.ticks));

    // 6. Observer updates
    results.extend(validate_observers(&config, args.verbose));

    // 7. Save / load
    results.extend(validate_persistence(&config, args.seed));

    // ── Summary ──
    println!();
    let passed = results.iter().filter(|r| r.passed).count();
    let failed = results.iter().filter(|r| !r.passed).count();
    let total = results.len();

    for r in &results {
        let icon = if r.passed { "✓" } else { "✗" };
        if !r.passed || args.verbose {
            println!("  {} {}: {}", icon, r.name, r.detail);
        }
    }

    println!(
        "\n=== RESULT: {}/{} passed, {} failed ===",
        passed, total, failed
    );

    if failed > 0 {
        std::process::exit(1);
    }
}

// ── Helpers ─────────────────────────────────────────────────────────────

fn resident_store(radius: i32) -> MemoryCellStore {
    let mut store = MemoryCellStore::new();
    store.load_box(CellPos::ORIGIN, radius);
    store
}

fn setup_failed(name: &str, error: ConfigError) -> Vec<TestResult> {
    vec![TestResult::new(name, false, format!("coordinator setup: {}", error))]
}

/// One settlement at the origin with an anchor and a single home.
fn founded(
    config: &ColonyConfig,
    beds: u32,
) -> Result<(TickCoordinator<MemoryCellStore>, SettlementId), ConfigError> {
    let radius = config.working_radius * 2 + config.padding + 1;
    let mut coordinator = TickCoordinator::new(config.clone(), resident_store(radius), 0)?;
    let id = coordinator.found_settlement("Harness", CellPos::ORIGIN);
    if let Some(settlement) = coordinator.settlement_mut(id) {
        settlement
            .buildings
            .insert(Building::new(1, BuildingKind::Anchor, 0, CellPos::ORIGIN));
        settlement
            .buildings
            .insert(Building::new(2, BuildingKind::Home, 1, CellPos::new(1, 0)).with_inhabitants(beds));
        settlement.recalculate_capacity();
    }
    Ok((coordinator, id))
}

// ── 1. Config ───────────────────────────────────────────────────────────

fn load_config(args: &Args, results: &mut Vec<TestResult>) -> Option<ColonyConfig> {
    println!("--- Config ---");
    let config = match &args.config {
        Some(path) => match ColonyConfig::from_json_file(path) {
            Ok(config) => config,
            Err(e) => {
                results.push(TestResult::new(
                    "config_load",
                    false,
                    format!("{}: {}", path.display(), e),
                ));
                return None;
            }
        },
        None => ColonyConfig::default(),
    };

    let valid = config.validate();
    results.push(TestResult::new(
        "config_valid",
        valid.is_ok(),
        match &valid {
            Ok(()) => format!(
                "respawn every {} ticks at anchor level 0",
                config.respawn_interval(0)
            ),
            Err(e) => e.to_string(),
        },
    ));

    valid.ok().map(|_| config)
}

// ── 2. Population ids ───────────────────────────────────────────────────

fn validate_population_ids(seed: u64) -> Vec<TestResult> {
    println!("--- Population Ids ---");
    let mut rng = StdRng::seed_from_u64(seed);
    let mut registry = PopulationRegistry::new();
    let mut live: BTreeSet<UnitId> = BTreeSet::new();
    let mut not_lowest = 0;
    let mut reused = 0;

    for _ in 0..5000 {
        if live.is_empty() || rng.gen_bool(0.55) {
            let expected = (1..).find(|id| !live.contains(id)).unwrap_or(0);
            let id = registry.create_unit();
            if id != expected {
                not_lowest += 1;
            }
            if (id as usize) <= live.len() {
                reused += 1;
            }
            live.insert(id);
        } else {
            let pick = rng.gen_range(0..live.len());
            if let Some(id) = live.iter().nth(pick).copied() {
                registry.remove(id, &mut ());
                live.remove(&id);
            }
        }
    }

    vec![
        TestResult::new(
            "ids_lowest_free",
            not_lowest == 0,
            format!("{} creations skipped a lower free id", not_lowest),
        ),
        TestResult::new(
            "ids_match_registry",
            registry.ids() == live.iter().copied().collect::<Vec<_>>(),
            format!("{} live units, {} ids reused", live.len(), reused),
        ),
    ]
}

// ── 3. Happiness ────────────────────────────────────────────────────────

fn validate_happiness(config: &ColonyConfig, seed: u64) -> Vec<TestResult> {
    println!("--- Happiness ---");
    let mut results = Vec::new();
    let thresholds = HappinessThresholds::from(config);

    let empty = happiness::evaluate(&[], &thresholds);
    results.push(TestResult::new(
        "happiness_empty_stable",
        empty == HappinessTrend::stable(),
        format!("{:?}", empty),
    ));

    // Random colonies: a modifier only ever comes with a falling guard trend.
    let mut rng = StdRng::seed_from_u64(seed);
    let mut bad_modifier = 0;
    for _ in 0..500 {
        let size = rng.gen_range(1..40);
        let units: Vec<UnitHappinessInput> = (0..size)
            .map(|_| UnitHappinessInput {
                work: rng
                    .gen_bool(0.7)
                    .then(|| (rng.gen_range(1..=5), rng.gen_bool(0.2))),
                home_level: rng.gen_bool(0.8).then(|| rng.gen_range(0..=5)),
                saturation: rng.gen_range(0.0..20.0),
            })
            .collect();
        let trend = happiness::evaluate(&units, &thresholds);
        let expects_modifier = trend.guards == Trend::Decreasing;
        if expects_modifier != (trend.guard_modifier > 0.0) {
            bad_modifier += 1;
        }
    }
    results.push(TestResult::new(
        "happiness_guard_modifier",
        bad_modifier == 0,
        format!("{} colonies with a mismatched guard modifier", bad_modifier),
    ));

    results
}

// ── 4. Territory ────────────────────────────────────────────────────────

fn validate_territory(config: &ColonyConfig) -> Vec<TestResult> {
    println!("--- Territory ---");
    let mut results = Vec::new();
    let max_range = config.working_radius * 2 + config.padding;

    // Nothing resident: the whole claim lands in the backlog.
    let mut coordinator = match TickCoordinator::new(config.clone(), MemoryCellStore::new(), 0) {
        Ok(coordinator) => coordinator,
        Err(e) => return setup_failed("territory_setup", e),
    };
    let id = coordinator.found_settlement("Backlog", CellPos::ORIGIN);
    let side = (max_range * 2 + 1) as u32;
    results.push(TestResult::new(
        "territory_backlog_size",
        coordinator.territory().missing_cells() == side * side,
        format!("{} cells waiting", coordinator.territory().missing_cells()),
    ));

    coordinator
        .territory_mut()
        .store_mut()
        .load_box(CellPos::ORIGIN, max_range);
    let report = coordinator.step();
    results.push(TestResult::new(
        "territory_backlog_drained",
        report.drained_cells as u32 == side * side && coordinator.territory().missing_cells() == 0,
        format!("{} cells applied on tick {}", report.drained_cells, report.tick),
    ));

    let mut wrong = 0;
    for pos in cells_in_box(CellPos::ORIGIN, max_range) {
        let expected = if pos.within_box(&CellPos::ORIGIN, config.working_radius) {
            id
        } else {
            0
        };
        if coordinator.territory().owner_of(pos) != expected
            || !coordinator.territory().is_interested(pos, id)
        {
            wrong += 1;
        }
    }
    results.push(TestResult::new(
        "territory_owned_vs_interested",
        wrong == 0,
        format!("{} cells with the wrong owner or interest", wrong),
    ));

    let blocked = !coordinator
        .territory()
        .can_claim_in_range(CellPos::new(config.working_radius, 0), 1);
    results.push(TestResult::new(
        "territory_overlap_blocked",
        blocked,
        "claim overlapping the working box refused",
    ));

    coordinator.abandon_settlement(id);
    coordinator.step();
    let leftover = cells_in_box(CellPos::ORIGIN, max_range)
        .filter(|pos| {
            coordinator
                .territory()
                .cell(*pos)
                .map_or(false, |c| c != &TerritoryCell::default())
        })
        .count();
    results.push(TestResult::new(
        "territory_abandon_clears",
        leftover == 0,
        format!("{} cells still mention the settlement", leftover),
    ));

    results
}

// ── 5. Tick schedule ────────────────────────────────────────────────────

fn validate_tick_schedule(config: &ColonyConfig, ticks: u64) -> Vec<TestResult> {
    println!("--- Tick Schedule ---");
    let mut results = Vec::new();
    let (mut coordinator, id) = match founded(config, config.initial_unit_amount) {
        Ok(setup) => setup,
        Err(e) => return setup_failed("schedule_setup", e),
    };
    let interval = config.respawn_interval(0);

    let mut spawn_ticks = Vec::new();
    let mut happiness_checks = 0;
    let mut errors = 0;
    for tick in 1..=ticks {
        let report = coordinator.advance(tick);
        spawn_ticks.extend(report.spawned.iter().map(|_| tick));
        if report.happiness_evaluated.contains(&id) {
            happiness_checks += 1;
        }
        errors += report.errors.len();
    }

    let misplaced = spawn_ticks
        .iter()
        .filter(|tick| interval < 0 || **tick % (interval as u64 + 1) != 0)
        .count();
    results.push(TestResult::new(
        "schedule_respawn_interval",
        misplaced == 0 && errors == 0,
        format!("spawns at ticks {:?}", spawn_ticks),
    ));

    let population = coordinator
        .settlement(id)
        .map_or(0, |s| s.population.count());
    results.push(TestResult::new(
        "schedule_respawn_cap",
        population as u64 <= config.initial_unit_amount as u64,
        format!(
            "{} units after {} ticks, {} happiness checks",
            population, ticks, happiness_checks
        ),
    ));

    let stale = coordinator.advance(1);
    results.push(TestResult::new(
        "schedule_stale_tick_ignored",
        stale.spawned.is_empty() && stale.happiness_evaluated.is_empty(),
        format!("last tick stays {}", coordinator.last_tick()),
    ));

    results
}

// ── 6. Observers ────────────────────────────────────────────────────────

fn validate_observers(config: &ColonyConfig, verbose: bool) -> Vec<TestResult> {
    println!("--- Observers ---");
    let mut results = Vec::new();
    let (mut coordinator, id) = match founded(config, 4) {
        Ok(setup) => setup,
        Err(e) => return setup_failed("observer_setup", e),
    };
    coordinator.spawn(id, None, false);
    coordinator.spawn(id, None, false);
    coordinator.flush_updates();

    coordinator.subscribe(id, 7);
    let updates = coordinator.flush_updates();
    let views = updates
        .iter()
        .filter(|e| e.to == Recipient::Observer(7) && matches!(e.update, Update::UnitView { .. }))
        .count();
    results.push(TestResult::new(
        "observer_initial_sync",
        views == 2,
        format!("{} unit views for the new observer", views),
    ));

    if verbose {
        for envelope in &updates {
            match serde_json::to_string(envelope) {
                Ok(json) => println!("    {}", json),
                Err(e) => log::warn!("Could not encode update: {}", e),
            }
        }
    }

    let quiet = coordinator.flush_updates().is_empty();
    results.push(TestResult::new(
        "observer_no_repeat",
        quiet,
        "second flush sends nothing",
    ));

    if let Some(unit) = coordinator.settlement(id).and_then(|s| s.population.ids().first().copied()) {
        coordinator.remove_unit(id, unit);
    }
    let removed = coordinator
        .flush_updates()
        .iter()
        .filter(|e| matches!(e.update, Update::UnitRemoved { .. }))
        .count();
    results.push(TestResult::new(
        "observer_unit_removed",
        removed == 1,
        format!("{} removal notices", removed),
    ));

    results
}

// ── 7. Persistence ──────────────────────────────────────────────────────

fn validate_persistence(config: &ColonyConfig, seed: u64) -> Vec<TestResult> {
    println!("--- Persistence ---");
    let mut results = Vec::new();
    let mut rng = StdRng::seed_from_u64(seed);
    let (mut coordinator, id) = match founded(config, 10) {
        Ok(setup) => setup,
        Err(e) => return setup_failed("persistence_setup", e),
    };

    for _ in 0..8 {
        coordinator.spawn(id, None, true);
    }
    for _ in 0..3 {
        let unit = rng.gen_range(1..=8);
        coordinator.remove_unit(id, unit);
    }
    coordinator.advance(rng.gen_range(1..500));

    let expected = coordinator
        .settlement(id)
        .map(|s| s.population.ids())
        .unwrap_or_default();

    let mut buffer = Vec::new();
    let saved = coordinator.save(&mut buffer);
    let mut restored = match TickCoordinator::new(config.clone(), MemoryCellStore::new(), 0) {
        Ok(coordinator) => coordinator,
        Err(e) => return setup_failed("persistence_setup", e),
    };
    let loaded = saved.and_then(|_| restored.load(&buffer[..]));

    let ids = restored
        .settlement(id)
        .map(|s| s.population.ids())
        .unwrap_or_default();
    results.push(TestResult::new(
        "persistence_bincode_roundtrip",
        loaded.is_ok() && ids == expected && restored.last_tick() == coordinator.last_tick(),
        match loaded {
            Ok(()) => format!("{} bytes, units {:?}", buffer.len(), ids),
            Err(e) => e.to_string(),
        },
    ));

    let json = persistence::to_json(&coordinator.snapshot());
    let reloaded = json.as_deref().map_err(|e| e.to_string()).and_then(|text| {
        persistence::from_json(text).map_err(|e| e.to_string())
    });
    results.push(TestResult::new(
        "persistence_json_roundtrip",
        reloaded
            .as_ref()
            .map_or(false, |state| state.settlements.contains_key(&id)),
        match &reloaded {
            Ok(state) => format!("{} settlements", state.settlements.len()),
            Err(e) => e.clone(),
        },
    ));

    results
}
