use std::path::{Path, PathBuf};

use bibcomplete::{
    ConfigDb, DataDir, Diagnostics, Error, ResolverConfig, Result,
    Settings, SourceResolver,
    cli::{BibAction, Cli, Command, ResolveArgs, SettingAction, SourcesArgs, SuggestArgs},
    settings::{BIB_EXTENSIONS_KEY, KEYS, MATCH_FIELDS, SOURCES},
    suggest,
};
use clap::Parser;
use serde_json::json;
use tracing_subscriber::EnvFilter;

fn init_tracing(verbose: u8, quiet: bool) {
    let filter = if let Ok(env) = std::env::var("BIBCOMPLETE_LOG") {
        EnvFilter::new(env)
    } else if quiet {
        EnvFilter::new("warn")
    } else {
        match verbose {
            0 => EnvFilter::new("info"),
            1 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    if let Command::Completions(args) = &cli.command {
        args.generate();
        return Ok(());
    }

    let data_dir = DataDir::resolve(cli.data_dir.as_deref())?;
    let config_db = ConfigDb::open(&data_dir.config_db())?;

    match cli.command {
        Command::Suggest(args) => cmd_suggest(&config_db, &args)?,
        Command::Sources(args) => cmd_sources(&config_db, &args)?,
        Command::Bib { action } => match action {
            BibAction::Add { path } => bib_add(&config_db, &path)?,
            BibAction::Remove { path } => bib_remove(&config_db, &path)?,
            BibAction::List { json } => bib_list(&config_db, json)?,
        },
        Command::Setting { action } => match action {
            SettingAction::Show { key, json } => {
                setting_show(&config_db, key.as_deref(), json)?;
            }
            SettingAction::Set { key, value } => {
                setting_set(&config_db, &key, &value)?;
            }
            SettingAction::Clear { key } => setting_clear(&config_db, &key)?,
        },
        Command::Completions(_) => {}
    }

    Ok(())
}

/// Apply command-line overrides on top of the stored settings.
fn effective_settings(config_db: &ConfigDb, args: &ResolveArgs) -> Result<Settings> {
    let mut settings = Settings::load(config_db)?;
    if !args.sources.is_empty() {
        settings.apply(SOURCES, &args.sources.join(","))?;
    }
    if !args.extensions.is_empty() {
        settings.apply(BIB_EXTENSIONS_KEY, &args.extensions.join(","))?;
    }
    Ok(settings)
}

/// Build the resolver input from settings, the configured bibliographies and
/// the process environment.
fn host_config(
    settings: &Settings,
    config_db: &ConfigDb,
    document: Option<&Path>,
) -> Result<ResolverConfig> {
    let configured = config_db
        .list_bibliographies()?
        .into_iter()
        .map(PathBuf::from)
        .collect();
    let mut config = settings.resolver_config(configured);

    config.current_document = document.map(Path::to_path_buf);
    config.working_dir = std::env::current_dir()?;
    config.home_dir = std::env::var_os("HOME")
        .filter(|v| !v.is_empty())
        .map(PathBuf::from);
    config.appdata_dir = std::env::var_os("APPDATA")
        .filter(|v| !v.is_empty())
        .map(PathBuf::from);

    Ok(config)
}

fn log_skipped(diagnostics: &Diagnostics) {
    if !diagnostics.is_empty() {
        tracing::debug!(
            count = diagnostics.len(),
            "some sources contributed nothing"
        );
    }
}

fn cmd_suggest(config_db: &ConfigDb, args: &SuggestArgs) -> Result<()> {
    let mut settings = effective_settings(config_db, &args.resolve)?;
    if !args.fields.is_empty() {
        settings.apply(MATCH_FIELDS, &args.fields.join(","))?;
    }
    let engine = settings.engine()?;

    let config =
        host_config(&settings, config_db, args.resolve.document.as_deref())?;
    let mut diagnostics = Diagnostics::new();
    let suggestions =
        engine.complete(&config, &args.bibliographies, &args.query, &mut diagnostics);
    log_skipped(&diagnostics);

    if args.json {
        println!("{}", suggest::to_json(&suggestions)?);
    } else {
        suggest::format_human(&suggestions);
    }
    Ok(())
}

fn cmd_sources(config_db: &ConfigDb, args: &SourcesArgs) -> Result<()> {
    let settings = effective_settings(config_db, &args.resolve)?;
    let config =
        host_config(&settings, config_db, args.resolve.document.as_deref())?;
    let mut diagnostics = Diagnostics::new();
    let resolved = SourceResolver::new(settings.kpsewhich())
        .resolve(&config, &mut diagnostics);
    log_skipped(&diagnostics);

    if args.json {
        let items: Vec<_> = resolved
            .iter()
            .map(|r| {
                json!({
                    "path": r.path.display().to_string(),
                    "source": r.source.name(),
                })
            })
            .collect();
        println!("{}", serde_json::to_string(&items)?);
    } else if resolved.is_empty() {
        eprintln!("No bibliographies found.");
    } else {
        for r in &resolved {
            println!("{}\t{}", r.source, r.path.display());
        }
    }
    Ok(())
}

fn bib_add(config_db: &ConfigDb, path: &Path) -> Result<()> {
    if !path.is_file() {
        return Err(Error::Config(format!(
            "not a bibliography file: {}",
            path.display()
        )));
    }

    let abs_path = path.canonicalize().map_err(|e| {
        Error::Config(format!("cannot resolve path {}: {e}", path.display()))
    })?;
    let stored = abs_path.to_string_lossy();

    if config_db.add_bibliography(&stored)? {
        println!("Added bibliography {stored}");
    } else {
        println!("Bibliography {stored} is already configured");
    }
    Ok(())
}

fn bib_remove(config_db: &ConfigDb, path: &Path) -> Result<()> {
    let mut candidates = vec![path.to_string_lossy().into_owned()];
    if let Ok(abs_path) = path.canonicalize() {
        candidates.push(abs_path.to_string_lossy().into_owned());
    }

    for candidate in &candidates {
        if config_db.remove_bibliography(candidate)? {
            println!("Removed bibliography {candidate}");
            return Ok(());
        }
    }

    Err(Error::NotFound {
        kind: "bibliography",
        name: path.display().to_string(),
    })
}

fn bib_list(config_db: &ConfigDb, json: bool) -> Result<()> {
    let bibliographies = config_db.list_bibliographies()?;

    if json {
        println!("{}", serde_json::to_string(&bibliographies)?);
    } else if bibliographies.is_empty() {
        println!("No bibliographies configured.");
    } else {
        for path in &bibliographies {
            println!("{path}");
        }
    }
    Ok(())
}

fn setting_show(config_db: &ConfigDb, key: Option<&str>, json: bool) -> Result<()> {
    let effective = Settings::load(config_db)?;
    let keys: Vec<&str> = match key {
        Some(key) => vec![key],
        None => KEYS.to_vec(),
    };

    let mut rows = Vec::with_capacity(keys.len());
    for key in keys {
        let value = effective.get(key)?;
        let stored = config_db.get_setting(key)?.is_some();
        rows.push((key, value, stored));
    }

    if json {
        let map: serde_json::Map<String, serde_json::Value> = rows
            .into_iter()
            .map(|(key, value, _)| (key.to_string(), value.into()))
            .collect();
        println!("{}", serde_json::Value::Object(map));
    } else {
        for (key, value, stored) in rows {
            if stored {
                println!("{key}\t{value}");
            } else {
                println!("{key}\t{value}\t(default)");
            }
        }
    }
    Ok(())
}

fn setting_set(config_db: &ConfigDb, key: &str, value: &str) -> Result<()> {
    Settings::validate(key, value)?;
    config_db.set_setting(key, value)?;
    println!("Set {key} = {value}");
    Ok(())
}

fn setting_clear(config_db: &ConfigDb, key: &str) -> Result<()> {
    // Rejects unknown keys.
    Settings::default().get(key)?;

    if config_db.remove_setting(key)? {
        println!("Cleared {key}");
    } else {
        println!("{key} was not set");
    }
    Ok(())
}
