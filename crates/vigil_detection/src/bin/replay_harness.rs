//! # Replay Harness
//!
//! Runs built-in or TOML scenarios through a fresh detection engine and
//! prints what it flagged.

use vigil_detection::replay::scenarios::BUILTIN_NAMES;
use vigil_detection::{DetectionConfig, ReplayHarness, ReplayOutcome, Scenario};

fn main() {
    // RUST_LOG wins; otherwise info.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    println!("╔══════════════════════════════════════════════════════════════════╗");
    println!("║         VIGIL REPLAY HARNESS                                     ║");
    println!("║         SAME EVENTS IN, SAME VIOLATIONS OUT                      ║");
    println!("╚══════════════════════════════════════════════════════════════════╝");
    println!();

    let args: Vec<String> = std::env::args().skip(1).collect();

    if args.is_empty() || args.iter().any(|a| a == "--help") {
        println!("Usage: replay_harness <scenario.toml | builtin name | --all> [options]");
        println!();
        println!("Options:");
        println!("  --seed <n>       Jitter seed for built-in scenarios (default 1)");
        println!("  --config <file>  Detection config TOML");
        println!();
        println!("Built-in scenarios: {}", BUILTIN_NAMES.join(", "));
        return;
    }

    let seed: u64 = args
        .iter()
        .position(|a| a == "--seed")
        .and_then(|i| args.get(i + 1))
        .and_then(|s| s.parse().ok())
        .unwrap_or(1);

    let config = match args.iter().position(|a| a == "--config").and_then(|i| args.get(i + 1)) {
        Some(path) => {
            let loaded = std::fs::read_to_string(path)
                .map_err(vigil_detection::DetectionError::from)
                .and_then(|text| DetectionConfig::from_toml_str(&text));
            match loaded {
                Ok(config) => config,
                Err(e) => {
                    println!("Error: could not load config {}: {}", path, e);
                    return;
                }
            }
        }
        None => DetectionConfig::default(),
    };

    let scenarios: Vec<Scenario> = if args[0] == "--all" {
        let mut built = Vec::with_capacity(BUILTIN_NAMES.len());
        for name in BUILTIN_NAMES {
            match Scenario::builtin(name, seed) {
                Ok(s) => built.push(s),
                Err(e) => println!("Error: {}", e),
            }
        }
        built
    } else if BUILTIN_NAMES.contains(&args[0].as_str()) {
        match Scenario::builtin(&args[0], seed) {
            Ok(s) => vec![s],
            Err(e) => {
                println!("Error: {}", e);
                return;
            }
        }
    } else {
        match Scenario::from_file(&args[0]) {
            Ok(s) => vec![s],
            Err(e) => {
                println!("Error: could not load scenario {}: {}", args[0], e);
                return;
            }
        }
    };

    let harness = ReplayHarness::new(config);
    let mut total = 0;

    for scenario in &scenarios {
        match harness.run(scenario) {
            Ok(outcome) => {
                print_outcome(&outcome, &scenario.description);
                total += outcome.violations.len();
            }
            Err(e) => println!("Error: scenario {} failed: {}", scenario.name, e),
        }
    }

    if total == 0 {
        println!("✓ No violations emitted");
    } else {
        println!("⚠ {} violations emitted across {} scenario(s)", total, scenarios.len());
    }
}

fn print_outcome(outcome: &ReplayOutcome, description: &str) {
    println!("┌─ {} ", outcome.scenario);
    if !description.is_empty() {
        println!("│ {}", description);
    }
    println!("│ Events:      {}", outcome.events);
    println!("│ Ticks:       {}", outcome.ticks);
    println!("│ Violations:  {}", outcome.violations.len());

    for violation in &outcome.violations {
        println!("│  - {}", violation);
    }

    if !outcome.summaries.is_empty() {
        println!("│");
        println!("│ FINAL LEVELS:");
        for summary in &outcome.summaries {
            let levels: Vec<String> = summary
                .levels
                .iter()
                .filter(|(_, level)| *level > 0)
                .map(|(check, level)| format!("{:?}={}", check, level))
                .collect();
            println!(
                "│  {} ({}): {}",
                summary.id,
                summary.display_name,
                if levels.is_empty() { "clean".to_owned() } else { levels.join(" ") }
            );
        }
    }
    println!("└──────────────────────────────────────────────────────────────────┘");
    println!();
}
