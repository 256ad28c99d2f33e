use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::{value_parser, Arg, ArgAction, ArgGroup, ArgMatches, Command};
use serde_json::json;
use tfm_core::{Catalog, MigrateConfig, MigrationEngine, MigrationReport, MigratorRegistry, Outcome};
use tracing::{debug, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn cli() -> Command {
    Command::new("tfm")
        .version(tfm_core::VERSION)
        .about("Migrate infrastructure configuration and state to a new provider schema")
        .subcommand_required(true)
        .arg(
            Arg::new("log-json")
                .long("log-json")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Emit logs as JSON on stderr"),
        )
        .subcommand(
            Command::new("migrate")
                .about("Migrate a configuration file and/or a state file in one session")
                .arg(catalog_arg())
                .arg(
                    Arg::new("settings")
                        .long("settings")
                        .value_parser(value_parser!(PathBuf))
                        .help("TOML file with migration settings"),
                )
                .arg(
                    Arg::new("config")
                        .long("config")
                        .value_parser(value_parser!(PathBuf))
                        .help("Configuration file to migrate"),
                )
                .arg(
                    Arg::new("state")
                        .long("state")
                        .value_parser(value_parser!(PathBuf))
                        .help("State document to migrate (full state, resource or instance)"),
                )
                .group(
                    ArgGroup::new("input")
                        .args(["config", "state"])
                        .multiple(true)
                        .required(true),
                )
                .arg(
                    Arg::new("resource-type")
                        .long("resource-type")
                        .requires("resource-name")
                        .requires("state")
                        .help("Type of a bare instance passed with --state"),
                )
                .arg(
                    Arg::new("resource-name")
                        .long("resource-name")
                        .requires("resource-type")
                        .help("Name of a bare instance passed with --state"),
                )
                .arg(
                    Arg::new("in-place")
                        .long("in-place")
                        .action(ArgAction::SetTrue)
                        .help("Rewrite the input files instead of printing to stdout"),
                )
                .arg(
                    Arg::new("report")
                        .long("report")
                        .value_parser(value_parser!(PathBuf))
                        .help("Write the per-resource report as JSON to this file"),
                )
                .arg(
                    Arg::new("fail-on-manual")
                        .long("fail-on-manual")
                        .action(ArgAction::SetTrue)
                        .help("Exit with status 2 when a resource needs manual action"),
                ),
        )
        .subcommand(
            Command::new("catalog")
                .about("Validate a catalog and list its entries")
                .arg(catalog_arg())
                .arg(
                    Arg::new("json")
                        .long("json")
                        .action(ArgAction::SetTrue)
                        .help("Output as JSON"),
                ),
        )
}

fn catalog_arg() -> Arg {
    Arg::new("catalog")
        .long("catalog")
        .required(true)
        .value_parser(value_parser!(PathBuf))
        .help("Catalog file (TOML, or YAML with a .yaml/.yml extension)")
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| fmt::layer().json().with_writer(std::io::stderr)))
        .with((!json).then(|| fmt::layer().with_writer(std::io::stderr)))
        .init();
}

fn main() -> ExitCode {
    let matches = cli().get_matches();
    init_tracing(matches.get_flag("log-json"));

    let result = match matches.subcommand() {
        Some(("migrate", args)) => run_migrate(args),
        Some(("catalog", args)) => run_catalog(args),
        _ => Ok(ExitCode::SUCCESS),
    };
    match result {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn required_path<'a>(args: &'a ArgMatches, id: &str) -> Result<&'a PathBuf> {
    args.get_one::<PathBuf>(id)
        .ok_or_else(|| anyhow!("missing --{id}"))
}

fn read(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))
}

fn load_catalog(path: &Path) -> Result<Catalog> {
    let text = read(path)?;
    let catalog = match path.extension().and_then(|ext| ext.to_str()) {
        Some("yaml" | "yml") => Catalog::from_yaml_str(&text),
        _ => Catalog::from_toml_str(&text),
    }
    .with_context(|| format!("invalid catalog {}", path.display()))?;
    debug!(path = %path.display(), entries = catalog.len(), "catalog loaded");
    Ok(catalog)
}

fn load_settings(path: Option<&PathBuf>) -> Result<MigrateConfig> {
    match path {
        Some(path) => MigrateConfig::from_toml_str(&read(path)?)
            .with_context(|| format!("invalid settings {}", path.display())),
        None => Ok(MigrateConfig::default()),
    }
}

/// Write a migrated document back or print it
fn emit(path: &Path, original: &str, migrated: &str, in_place: bool) -> Result<()> {
    if !in_place {
        print!("{migrated}");
        return Ok(());
    }
    if migrated == original {
        debug!(path = %path.display(), "unchanged, not rewritten");
        return Ok(());
    }
    fs::write(path, migrated).with_context(|| format!("writing {}", path.display()))?;
    info!(path = %path.display(), "rewritten");
    Ok(())
}

fn run_migrate(args: &ArgMatches) -> Result<ExitCode> {
    let catalog = load_catalog(required_path(args, "catalog")?)?;
    let settings = load_settings(args.get_one::<PathBuf>("settings"))?;
    let registry = MigratorRegistry::from_catalog(&catalog).context("building migrators")?;
    let engine = MigrationEngine::new(Arc::new(registry), settings);
    let mut session = engine.session();
    let in_place = args.get_flag("in-place");

    // Config first so the state phase sees its decisions
    if let Some(path) = args.get_one::<PathBuf>("config") {
        let text = read(path)?;
        let migrated = session
            .migrate_config(&text)
            .with_context(|| format!("migrating {}", path.display()))?;
        emit(path, &text, &migrated, in_place)?;
    }

    if let Some(path) = args.get_one::<PathBuf>("state") {
        let text = read(path)?;
        let migrated = match (
            args.get_one::<String>("resource-type"),
            args.get_one::<String>("resource-name"),
        ) {
            (Some(resource_type), Some(name)) => session.migrate_instance(&text, resource_type, name),
            _ => session.migrate_state(&text),
        }
        .with_context(|| format!("migrating {}", path.display()))?;
        match migrated {
            Some(migrated) => emit(path, &text, &migrated, in_place)?,
            None => warn!(path = %path.display(), "document deleted by migration, file left as is"),
        }
    }

    let report = session.finish();
    print_report(&report);
    if let Some(path) = args.get_one::<PathBuf>("report") {
        let body = json!({"summary": report.summary(), "resources": report.resources()});
        fs::write(path, serde_json::to_string_pretty(&body)?)
            .with_context(|| format!("writing {}", path.display()))?;
    }

    if args.get_flag("fail-on-manual") && report.summary().manual_action > 0 {
        return Ok(ExitCode::from(2));
    }
    Ok(ExitCode::SUCCESS)
}

fn print_report(report: &MigrationReport) {
    eprintln!("{}", report.summary());
    for entry in report.manual_actions() {
        if let Outcome::ManualAction(reason) = &entry.outcome {
            eprintln!("  {} ({}): {reason}", entry.address, entry.phase);
        }
    }
}

fn run_catalog(args: &ArgMatches) -> Result<ExitCode> {
    let catalog = load_catalog(required_path(args, "catalog")?)?;
    // Registration catches what parsing alone does not, e.g. bad patterns
    MigratorRegistry::from_catalog(&catalog).context("building migrators")?;

    if args.get_flag("json") {
        println!("{}", serde_json::to_string_pretty(&catalog)?);
        return Ok(ExitCode::SUCCESS);
    }

    for entry in &catalog.resources {
        let mut line = format!("resource {} -> {}", entry.source, entry.target_type());
        if !entry.aliases.is_empty() {
            line.push_str(&format!(" (aliases: {})", entry.aliases.join(", ")));
        }
        if entry.data_source {
            line.push_str(" [data]");
        }
        if entry.state.delete {
            line.push_str(" [state deleted]");
        }
        println!("{line}");
    }
    for split in &catalog.splits {
        let targets: Vec<&str> = split
            .coordinator
            .targets
            .iter()
            .map(|t| t.target_type.as_str())
            .collect();
        println!("split {} -> {}", split.source, targets.join(", "));
    }
    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        cli().debug_assert();
    }

    #[test]
    fn instance_flags_require_each_other() {
        let err = cli()
            .try_get_matches_from([
                "tfm", "migrate", "--catalog", "c.toml", "--state", "s.json", "--resource-type", "x",
            ])
            .unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn migrate_needs_an_input() {
        assert!(cli()
            .try_get_matches_from(["tfm", "migrate", "--catalog", "c.toml"])
            .is_err());
    }
}
