//! CK-017: CLI subcommands (init, validate, recipes, plan, run).

use crate::core::cookbook::{self, CookbookConfig};
use crate::core::engine::Engine;
use crate::core::executor;
use crate::core::fieldset::FieldSet;
use crate::core::planner::Resolution;
use crate::core::registry::Registry;
use crate::core::state;
use crate::core::types::{ExecutionReport, Mode};
use crate::provenance::{eventlog, hasher};
use clap::Subcommand;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Write a starter cookbook
    Init {
        /// Directory to initialize (default: current)
        #[arg(default_value = ".")]
        path: PathBuf,
    },

    /// Validate a cookbook against the built-in recipe catalogue
    Validate {
        /// Path to the cookbook (default: built-in cookbook)
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// List the built-in recipes
    Recipes,

    /// Show the plan for the requested outputs
    Plan {
        /// Path to the cookbook (default: built-in cookbook)
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Variables already present, comma separated
        #[arg(short, long, value_delimiter = ',')]
        available: Vec<String>,

        /// Variables to produce, comma separated
        #[arg(short, long, value_delimiter = ',', required = true)]
        want: Vec<String>,
    },

    /// Plan the requested outputs and run the plan over a field set file
    Run {
        /// Path to the cookbook (default: built-in cookbook)
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Field set to read (YAML)
        #[arg(long)]
        fields: PathBuf,

        /// Variables to produce, comma separated
        #[arg(short, long, value_delimiter = ',', required = true)]
        want: Vec<String>,

        /// Execution mode: nl, tl or ad
        #[arg(long, default_value = "nl")]
        mode: Mode,

        /// Increments (tl) or sensitivities (ad) to propagate
        #[arg(long)]
        perturbation: Option<PathBuf>,

        /// Where to write the resulting field set
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Append execution events to this JSONL file
        #[arg(long)]
        events: Option<PathBuf>,
    },
}

/// Install the fmt subscriber. Filter comes from `COCINA_LOG`, default `warn`.
/// Fails if a global subscriber is already installed.
pub fn init_tracing() -> Result<(), String> {
    let filter = EnvFilter::try_from_env("COCINA_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| format!("cannot install log subscriber: {}", e))
}

/// Dispatch a CLI command.
pub fn dispatch(cmd: Commands) -> Result<(), String> {
    match cmd {
        Commands::Init { path } => cmd_init(&path),
        Commands::Validate { file } => cmd_validate(file.as_deref()),
        Commands::Recipes => cmd_recipes(),
        Commands::Plan {
            file,
            available,
            want,
        } => cmd_plan(file.as_deref(), &available, &want),
        Commands::Run {
            file,
            fields,
            want,
            mode,
            perturbation,
            output,
            events,
        } => cmd_run(&RunArgs {
            file: file.as_deref(),
            fields: &fields,
            want: &want,
            mode,
            perturbation: perturbation.as_deref(),
            output: output.as_deref(),
            events: events.as_deref(),
        }),
    }
}

fn cmd_init(path: &Path) -> Result<(), String> {
    let config_path = path.join("cookbook.yaml");
    if config_path.exists() {
        return Err(format!("{} already exists", config_path.display()));
    }
    std::fs::create_dir_all(path)
        .map_err(|e| format!("cannot create {}: {}", path.display(), e))?;
    std::fs::write(&config_path, cookbook::DEFAULT_COOKBOOK_YAML)
        .map_err(|e| format!("cannot write {}: {}", config_path.display(), e))?;

    println!("Initialized cocina cookbook at {}", path.display());
    println!("  Created: {}", config_path.display());
    Ok(())
}

fn load_config(file: Option<&Path>) -> Result<CookbookConfig, String> {
    match file {
        Some(path) => cookbook::parse_config_file(path),
        None => Ok(cookbook::default_config()),
    }
}

/// Parse and validate a cookbook, printing every problem found.
fn load_engine(file: Option<&Path>) -> Result<Engine, String> {
    let config = load_config(file)?;
    let registry = Arc::new(Registry::builtin());
    let errors = cookbook::validate_config(&config, &registry);
    if !errors.is_empty() {
        for e in &errors {
            eprintln!("  ERROR: {}", e);
        }
        return Err("validation failed".to_string());
    }
    Engine::new(registry, &config).map_err(|e| e.to_string())
}

fn cmd_validate(file: Option<&Path>) -> Result<(), String> {
    let config = load_config(file)?;
    let errors = cookbook::validate_config(&config, &Registry::builtin());
    let source = file.map_or_else(|| "built-in cookbook".to_string(), |p| p.display().to_string());

    if errors.is_empty() {
        println!(
            "OK: {} ({} products, {} parameter blocks)",
            source,
            config.cookbook.len(),
            config.recipe_params.len()
        );
        Ok(())
    } else {
        for e in &errors {
            eprintln!("  ERROR: {}", e);
        }
        Err(format!("{} validation error(s)", errors.len()))
    }
}

fn cmd_recipes() -> Result<(), String> {
    let registry = Registry::builtin();
    for name in registry.names() {
        let d = registry.describe(name).map_err(|e| e.to_string())?;
        println!(
            "{:<22} -> {:<24} [{}] from {}",
            d.name,
            d.product,
            d.capabilities,
            d.ingredients.join(", ")
        );
    }
    Ok(())
}

/// Print the plan and any per-output failures. Returns the failure count.
fn print_resolution(resolution: &Resolution) -> usize {
    println!("Plan: {} step(s)", resolution.plan.len());
    for step in resolution.plan.steps() {
        println!(
            "  + {} -> {} ({})",
            step.name(),
            step.product(),
            step.recipe().ingredients().join(", ")
        );
    }
    if !resolution.plan.is_empty() {
        println!("Fingerprint: {}", resolution.plan.fingerprint());
    }

    for (variable, err) in &resolution.failures {
        println!("  ! {}: {}", variable, err);
        let leaves = err.missing_leaves();
        if !leaves.is_empty() {
            println!("    missing: {}", leaves.join(", "));
        }
    }
    resolution.failures.len()
}

fn cmd_plan(file: Option<&Path>, available: &[String], want: &[String]) -> Result<(), String> {
    let engine = load_engine(file)?;
    let resolution = engine.resolve_with(want, available.iter().map(String::as_str));
    match print_resolution(&resolution) {
        0 => Ok(()),
        n => Err(format!("{} output(s) cannot be resolved", n)),
    }
}

struct RunArgs<'a> {
    file: Option<&'a Path>,
    fields: &'a Path,
    want: &'a [String],
    mode: Mode,
    perturbation: Option<&'a Path>,
    output: Option<&'a Path>,
    events: Option<&'a Path>,
}

fn print_report<S: AsRef<str>>(report: &ExecutionReport, fields: &FieldSet, products: &[S]) {
    println!(
        "{} run {}: {} recipe(s) executed ({:.3}s)",
        report.mode,
        report.run_id,
        report.executed.len(),
        report.total_duration.as_secs_f64()
    );
    for product in products.iter().map(AsRef::as_ref) {
        if let Ok(hash) = hasher::hash_field(fields, product) {
            println!("  {} {}", product, hash);
        }
    }
    if let Some(err) = &report.failure {
        println!("  FAILED: {}", err);
    }
}

fn cmd_run(args: &RunArgs<'_>) -> Result<(), String> {
    let engine = load_engine(args.file)?;
    let mut fields = state::load_fields(args.fields)?;
    let mut resolution = engine.resolve(args.want, &fields);
    let unresolved = print_resolution(&resolution);

    let mut report = executor::execute_nl(&mut resolution.plan, &mut fields);
    let products: Vec<String> = resolution.plan.products().into_iter().map(String::from).collect();
    let mut result = fields;

    if args.mode != Mode::Forward && report.is_success() {
        let path = args
            .perturbation
            .ok_or_else(|| format!("--perturbation is required for {} runs", args.mode))?;
        let mut perturbation = state::load_fields(path)?;
        let linear = if args.mode == Mode::TangentLinear {
            executor::execute_tl(&mut resolution.plan, &mut perturbation, &result)
        } else {
            executor::execute_ad(&mut resolution.plan, &mut perturbation, &result)
        };
        report.events.extend(linear.events.iter().cloned());
        print_report(&report, &result, &products);
        report = ExecutionReport {
            events: report.events,
            ..linear
        };
        result = perturbation;
    }

    let shown: Vec<String> = if args.mode == Mode::Adjoint {
        result.names().map(String::from).collect()
    } else {
        products
    };
    print_report(&report, &result, &shown);

    if let Some(events) = args.events {
        eventlog::append_events(events, &report.events)?;
    }
    if let Some(output) = args.output {
        state::save_fields(output, &result)?;
        println!("Wrote {}", output.display());
    }

    if let Some(err) = report.failure {
        return Err(err.to_string());
    }
    if unresolved > 0 {
        return Err(format!("{} output(s) cannot be resolved", unresolved));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::fieldset::FunctionSpace;
    use crate::core::types::ExecutionEvent;

    const COOKBOOK: &str = r#"
cookbook:
  air_temperature: [AirTemperature_A]
  virtual_temperature: [TempToVTemp]
  specific_humidity: [SpecificHumidity_A]
  m_t: [TotalMassMoistAir]
"#;

    fn write_cookbook(dir: &Path) -> PathBuf {
        let path = dir.join("cookbook.yaml");
        std::fs::write(&path, COOKBOOK).unwrap();
        path
    }

    fn write_fields(dir: &Path) -> PathBuf {
        let path = dir.join("fields.yaml");
        let fields = FieldSet::from_columns(
            &FunctionSpace::new("nodes", 2),
            &[("potential_temperature", 1, vec![300.0, 310.0]), ("exner", 1, vec![0.5, 1.0])],
        );
        state::save_fields(&path, &fields).unwrap();
        path
    }

    fn want(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn run_args<'a>(
        file: &'a Path,
        fields: &'a Path,
        want: &'a [String],
        mode: Mode,
    ) -> RunArgs<'a> {
        RunArgs {
            file: Some(file),
            fields,
            want,
            mode,
            perturbation: None,
            output: None,
            events: None,
        }
    }

    #[test]
    fn test_ck017_init() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("project");
        cmd_init(&sub).unwrap();
        let written = sub.join("cookbook.yaml");
        assert!(written.exists());
        cmd_validate(Some(&written)).unwrap();
    }

    #[test]
    fn test_ck017_init_already_exists() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("cookbook.yaml"), "exists").unwrap();
        assert!(cmd_init(dir.path()).is_err());
    }

    #[test]
    fn test_ck017_validate() {
        let dir = tempfile::tempdir().unwrap();
        cmd_validate(Some(&write_cookbook(dir.path()))).unwrap();
        cmd_validate(None).unwrap();

        let bad = dir.path().join("bad.yaml");
        std::fs::write(&bad, "cookbook:\n  exner: [AirTemperature_A, Nope]\n").unwrap();
        assert_eq!(cmd_validate(Some(&bad)).unwrap_err(), "2 validation error(s)");
    }

    #[test]
    fn test_ck017_init_tracing_reports_second_install() {
        let _ = init_tracing();
        let err = init_tracing().unwrap_err();
        assert!(err.contains("cannot install log subscriber"));
    }

    #[test]
    fn test_ck017_recipes() {
        cmd_recipes().unwrap();
    }

    #[test]
    fn test_ck017_plan() {
        let dir = tempfile::tempdir().unwrap();
        let file = write_cookbook(dir.path());
        let available = want(&["potential_temperature", "exner"]);
        cmd_plan(Some(&file), &available, &want(&["air_temperature"])).unwrap();

        let err = cmd_plan(Some(&file), &available, &want(&["virtual_temperature"])).unwrap_err();
        assert!(err.contains("1 output(s)"));
    }

    #[test]
    fn test_ck017_run_nl_writes_output_and_events() {
        let dir = tempfile::tempdir().unwrap();
        let file = write_cookbook(dir.path());
        let fields = write_fields(dir.path());
        let wanted = want(&["air_temperature"]);
        let output = dir.path().join("out.yaml");
        let events = dir.path().join("events.jsonl");
        let mut args = run_args(&file, &fields, &wanted, Mode::Forward);
        args.output = Some(&output);
        args.events = Some(&events);
        cmd_run(&args).unwrap();

        let result = state::load_fields(&output).unwrap();
        assert_eq!(result.values("air_temperature").unwrap(), &[150.0, 310.0]);
        let logged = eventlog::read_events(&events).unwrap();
        assert_eq!(logged.len(), 4);
        assert!(matches!(logged[0].event, ExecutionEvent::RunStarted { .. }));
    }

    #[test]
    fn test_ck017_run_ad() {
        let dir = tempfile::tempdir().unwrap();
        let file = write_cookbook(dir.path());
        let fields = write_fields(dir.path());
        let sens = dir.path().join("sens.yaml");
        state::save_fields(
            &sens,
            &FieldSet::from_columns(&FunctionSpace::new("nodes", 2), &[("air_temperature", 1, vec![1.0, 1.0])]),
        )
        .unwrap();
        let wanted = want(&["air_temperature"]);
        let output = dir.path().join("grad.yaml");
        let mut args = run_args(&file, &fields, &wanted, Mode::Adjoint);
        args.perturbation = Some(&sens);
        args.output = Some(&output);
        cmd_run(&args).unwrap();

        let grad = state::load_fields(&output).unwrap();
        assert_eq!(grad.values("potential_temperature").unwrap(), &[0.5, 1.0]);
        assert_eq!(grad.values("exner").unwrap(), &[300.0, 310.0]);
    }

    #[test]
    fn test_ck017_run_tl_needs_perturbation() {
        let dir = tempfile::tempdir().unwrap();
        let file = write_cookbook(dir.path());
        let fields = write_fields(dir.path());
        let wanted = want(&["air_temperature"]);
        let err = cmd_run(&run_args(&file, &fields, &wanted, Mode::TangentLinear)).unwrap_err();
        assert!(err.contains("--perturbation"));
    }

    #[test]
    fn test_ck017_run_unresolved_still_writes() {
        let dir = tempfile::tempdir().unwrap();
        let file = write_cookbook(dir.path());
        let fields = write_fields(dir.path());
        let wanted = want(&["virtual_temperature", "air_temperature"]);
        let output = dir.path().join("out.yaml");
        let mut args = run_args(&file, &fields, &wanted, Mode::Forward);
        args.output = Some(&output);
        let err = cmd_run(&args).unwrap_err();
        assert!(err.contains("cannot be resolved"));
        assert!(state::load_fields(&output).unwrap().has("air_temperature"));
    }
}
