use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{anyhow, bail, Context};
use clap::{ArgAction, Args, Parser, Subcommand};
use console::style;
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};
use tpg_core::{
    apply_suggestions, byte_to_location, config::DEFAULT_CONFIG_FILE, load_config, Config,
    CreateRuleRequest, Direction, ImportSummary, Location, RuleService, RuleSet, StoreError,
    TypographyRuleRecord, TypographySuggestion, UpdateRuleRequest, YamlStore,
};
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

/// Typography suggestion CLI entry point.
#[derive(Debug, Parser)]
#[command(name = "tpg", about = "Suggest typographic fixes for markdown and manage rules.")]
struct Cli {
    /// Path to config file (YAML). Defaults to typography.yml if present.
    #[arg(long, default_value = DEFAULT_CONFIG_FILE, global = true)]
    config: PathBuf,

    /// Set config overrides (repeatable as key=value). Example: --set disabled_rules=en_dash
    #[arg(long = "set", value_name = "KEY=VALUE", global = true)]
    sets: Vec<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Scan files for typography suggestions.
    Scan(ScanArgs),
    /// Manage the rule store.
    Rules {
        #[command(subcommand)]
        command: RulesCommand,
    },
}

#[derive(Debug, Args)]
struct ScanArgs {
    /// Files or directories to scan.
    #[arg(value_name = "PATH", default_value = ".", num_args = 0..)]
    paths: Vec<PathBuf>,

    /// Emit JSON output for automation.
    #[arg(long, action = ArgAction::SetTrue)]
    json: bool,

    /// Apply every suggestion in place.
    #[arg(long, action = ArgAction::SetTrue)]
    fix: bool,

    /// Exit non-zero when suggestions remain.
    #[arg(long, action = ArgAction::SetTrue)]
    check: bool,

    /// Only print the summary line.
    #[arg(long, action = ArgAction::SetTrue)]
    quiet: bool,

    /// Run only these rule ids (comma-separated).
    #[arg(long, value_delimiter = ',', value_name = "RULE[,RULE]")]
    only: Vec<String>,

    /// Skip these rule ids (comma-separated).
    #[arg(long, value_delimiter = ',', value_name = "RULE[,RULE]")]
    disable: Vec<String>,
}

#[derive(Debug, Subcommand)]
enum RulesCommand {
    /// List enabled rules (or every rule with --all).
    List {
        #[arg(long, action = ArgAction::SetTrue)]
        all: bool,
        #[arg(long, action = ArgAction::SetTrue)]
        json: bool,
    },
    /// Show one rule by id or rule id.
    Show {
        id: String,
        #[arg(long, action = ArgAction::SetTrue)]
        json: bool,
    },
    /// Create a rule.
    Add {
        rule_id: String,
        #[arg(long)]
        description: String,
        /// Regular expression; use --pattern=<P> when it starts with hyphens.
        #[arg(long, allow_hyphen_values = true)]
        pattern: String,
        /// Replacement text; `$1`..`$9` insert capture groups.
        #[arg(long, allow_hyphen_values = true, default_value = "")]
        replacement: String,
        #[arg(long)]
        sort_order: Option<i64>,
    },
    /// Update fields of a rule.
    Update {
        id: String,
        #[arg(long)]
        rule_id: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long, allow_hyphen_values = true)]
        pattern: Option<String>,
        #[arg(long, allow_hyphen_values = true)]
        replacement: Option<String>,
        #[arg(long)]
        sort_order: Option<i64>,
    },
    /// Delete a rule.
    Remove { id: String },
    /// Move a rule one step up or down.
    Move { id: String, direction: String },
    Enable { id: String },
    Disable { id: String },
    /// Import rules from a YAML or JSON file (`rules: [...]` or a bare list).
    Import {
        file: PathBuf,
        #[arg(long, action = ArgAction::SetTrue)]
        json: bool,
    },
    /// Print the built-in rule set.
    Defaults,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LocatedSuggestion {
    #[serde(flatten)]
    suggestion: TypographySuggestion,
    location: Location,
}

#[derive(Debug, Serialize)]
struct FileResult {
    path: String,
    suggestions: Vec<LocatedSuggestion>,
    fixed: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct OutputReport {
    files: Vec<FileResult>,
    total_suggestions: usize,
    warnings: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ImportFile {
    Wrapped { rules: Vec<CreateRuleRequest> },
    List(Vec<CreateRuleRequest>),
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let (mut cfg, config_root) = load_config(&cli.config)?;
    apply_overrides(&mut cfg, &cli.sets)?;

    match cli.command {
        Command::Scan(args) => run_scan(&cfg, &config_root, args),
        Command::Rules { command } => run_rules(&cfg, &config_root, command),
    }
}

fn run_scan(cfg: &Config, config_root: &Path, args: ScanArgs) -> anyhow::Result<()> {
    let rules = load_rule_set(cfg, config_root)
        .without(&cfg.disabled_rules)
        .without(&args.disable)
        .only(&args.only);
    let warnings = rules.warnings().to_vec();
    if !args.json {
        for warning in &warnings {
            eprintln!("{} {}", style("warning:").yellow().bold(), warning);
        }
    }

    let ignore = build_ignore_set(&cfg.ignore_globs)?;
    let mut files = collect_files(cfg, &args.paths, ignore.as_ref())?;
    files.sort();

    let mut results = Vec::new();
    let mut total = 0usize;
    let mut remaining = 0usize;

    for path in files {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let suggestions = rules.scan(&content);
        debug!(path = %path.display(), suggestions = suggestions.len(), "scanned file");
        total += suggestions.len();

        let fixed = args.fix && !suggestions.is_empty();
        if fixed {
            let updated = apply_suggestions(&content, &suggestions);
            fs::write(&path, updated)
                .with_context(|| format!("Failed to write {}", path.display()))?;
        } else {
            remaining += suggestions.len();
        }

        if !args.quiet && !args.json {
            print_human_file(&path, &content, &suggestions, fixed);
        }

        results.push(FileResult {
            path: path.to_string_lossy().to_string(),
            suggestions: suggestions
                .into_iter()
                .map(|s| LocatedSuggestion {
                    location: byte_to_location(&content, s.start),
                    suggestion: s,
                })
                .collect(),
            fixed,
        });
    }

    if args.json {
        let output = OutputReport {
            files: results,
            total_suggestions: total,
            warnings,
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        let verb = if args.fix { "applied" } else { "found" };
        println!(
            "\n{} suggestions {} in {} files",
            total,
            verb,
            results.len()
        );
    }

    if args.check && remaining > 0 {
        std::process::exit(1);
    }
    Ok(())
}

/// A rule store that cannot be read is not fatal for scanning.
fn load_rule_set(cfg: &Config, config_root: &Path) -> RuleSet {
    let path = cfg.rules_path(config_root);
    match YamlStore::open(&path) {
        Ok(store) => RuleSet::load(&store),
        Err(err) => {
            warn!(path = %path.display(), error = %err, "rule store unavailable");
            RuleSet::defaults().with_warning(format!("Failed to load typography rules: {err}"))
        }
    }
}

fn print_human_file(path: &Path, content: &str, suggestions: &[TypographySuggestion], fixed: bool) {
    if suggestions.is_empty() {
        return;
    }
    let header = if fixed {
        format!("{} ({} fixed)", path.display(), suggestions.len())
    } else {
        path.display().to_string()
    };
    println!("{}", style(header).bold());
    for s in suggestions {
        let loc = byte_to_location(content, s.start);
        println!(
            "  {}:{} {} {}: {:?} → {:?}",
            loc.line,
            loc.column,
            style(format!("[{}]", s.rule_id)).cyan(),
            s.description,
            s.original,
            s.replacement
        );
    }
}

fn run_rules(cfg: &Config, config_root: &Path, command: RulesCommand) -> anyhow::Result<()> {
    if let RulesCommand::Defaults = command {
        for rule in tpg_core::default_rules() {
            println!(
                "{} {:?} → {:?}  {}",
                style(&rule.id).cyan(),
                rule.pattern().as_str(),
                rule.replacement.as_str(),
                style(&rule.description).dim()
            );
        }
        return Ok(());
    }

    let path = cfg.rules_path(config_root);
    let store = YamlStore::open(&path)
        .with_context(|| format!("Failed to open rule store {}", path.display()))?;
    let mut service = RuleService::new(store);

    match command {
        RulesCommand::List { all, json } => {
            let rules = if all {
                service.all_rules()?
            } else {
                service.enabled_rules()?
            };
            if json {
                println!("{}", serde_json::to_string_pretty(&Envelope { data: &rules })?);
            } else if rules.is_empty() {
                println!("No rules in {} (built-in defaults apply)", path.display());
            } else {
                for rule in &rules {
                    print_rule(rule);
                }
            }
        }
        RulesCommand::Show { id, json } => {
            let id = resolve_id(&service, &id)?;
            let rule = service.get(&id)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&Envelope { data: &rule })?);
            } else {
                print_rule(&rule);
            }
        }
        RulesCommand::Add {
            rule_id,
            description,
            pattern,
            replacement,
            sort_order,
        } => {
            let request = CreateRuleRequest {
                rule_id,
                description,
                pattern,
                replacement,
                sort_order,
            };
            let rule = service.create(&request).map_err(report)?;
            println!("{} {}", style("created").green(), rule.rule_id);
        }
        RulesCommand::Update {
            id,
            rule_id,
            description,
            pattern,
            replacement,
            sort_order,
        } => {
            let id = resolve_id(&service, &id)?;
            let request = UpdateRuleRequest {
                rule_id,
                description,
                pattern,
                replacement,
                sort_order,
                enabled: None,
            };
            let rule = service.update(&id, &request).map_err(report)?;
            println!("{} {}", style("updated").green(), rule.rule_id);
        }
        RulesCommand::Remove { id } => {
            let id = resolve_id(&service, &id)?;
            service.delete(&id).map_err(report)?;
            println!("{}", style("deleted").green());
        }
        RulesCommand::Move { id, direction } => {
            let direction: Direction = direction.parse().map_err(|e| anyhow!("{e}"))?;
            let id = resolve_id(&service, &id)?;
            for rule in service.reorder(&id, direction).map_err(report)? {
                print_rule(&rule);
            }
        }
        RulesCommand::Enable { id } => set_enabled(&mut service, &id, true)?,
        RulesCommand::Disable { id } => set_enabled(&mut service, &id, false)?,
        RulesCommand::Import { file, json } => {
            let text = fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let parsed: ImportFile = serde_yaml::from_str(&text)
                .with_context(|| format!("Invalid import file {}", file.display()))?;
            let requests = match parsed {
                ImportFile::Wrapped { rules } | ImportFile::List(rules) => rules,
            };
            let summary = service.bulk_import(&requests).map_err(report)?;
            print_import_summary(&summary, json)?;
            if summary.created == 0 && summary.failed > 0 {
                std::process::exit(1);
            }
        }
        RulesCommand::Defaults => {}
    }
    Ok(())
}

#[derive(Serialize)]
struct Envelope<T: Serialize> {
    data: T,
}

fn set_enabled(
    service: &mut RuleService<YamlStore>,
    id: &str,
    enabled: bool,
) -> anyhow::Result<()> {
    let id = resolve_id(service, id)?;
    let request = UpdateRuleRequest {
        enabled: Some(enabled),
        ..Default::default()
    };
    let rule = service.update(&id, &request).map_err(report)?;
    let state = if rule.enabled { "enabled" } else { "disabled" };
    println!("{} {}", style(state).green(), rule.rule_id);
    Ok(())
}

/// Accepts either the opaque record id or the rule id.
fn resolve_id(service: &RuleService<YamlStore>, key: &str) -> anyhow::Result<String> {
    service
        .all_rules()?
        .into_iter()
        .find(|r| r.id == key || r.rule_id == key)
        .map(|r| r.id)
        .ok_or_else(|| anyhow!("Typography rule not found: {key}"))
}

fn report(err: StoreError) -> anyhow::Error {
    match err {
        StoreError::Validation(inner) => anyhow!("validation failed: {inner}"),
        other => anyhow::Error::new(other),
    }
}

fn print_rule(rule: &TypographyRuleRecord) {
    let status = if rule.enabled {
        style("on ").green()
    } else {
        style("off").red()
    };
    println!(
        "{:>4} {} {} {:?} → {:?}  {} {}",
        rule.sort_order,
        status,
        style(&rule.rule_id).cyan(),
        rule.pattern,
        rule.replacement,
        rule.description,
        style(&rule.id).dim()
    );
}

fn print_import_summary(summary: &ImportSummary, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(&Envelope { data: summary })?);
        return Ok(());
    }
    println!(
        "{} created, {} failed",
        style(summary.created).green(),
        style(summary.failed).red()
    );
    for err in &summary.errors {
        println!("  - {}: {}", style(&err.rule_id).cyan(), err.message);
    }
    Ok(())
}

fn build_ignore_set(patterns: &[String]) -> anyhow::Result<Option<GlobSet>> {
    if patterns.is_empty() {
        return Ok(None);
    }
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern).with_context(|| format!("invalid glob `{pattern}`"))?);
    }
    Ok(Some(builder.build()?))
}

fn collect_files(
    cfg: &Config,
    paths: &[PathBuf],
    ignore: Option<&GlobSet>,
) -> anyhow::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            let mut walker = WalkDir::new(path).into_iter();
            while let Some(entry_res) = walker.next() {
                let entry = entry_res?;
                let entry_path = entry.path();
                if let Some(set) = ignore {
                    if set.is_match(entry_path) {
                        if entry.file_type().is_dir() {
                            walker.skip_current_dir();
                        }
                        continue;
                    }
                }
                if entry.file_type().is_file() && cfg.is_supported(entry_path) {
                    files.push(entry_path.to_path_buf());
                }
            }
        } else if path.is_file() {
            // Explicitly named files are scanned whatever their extension.
            if ignore.is_some_and(|set| set.is_match(path)) {
                continue;
            }
            files.push(path.clone());
        } else {
            bail!("No such file or directory: {}", path.display());
        }
    }
    Ok(files)
}

fn apply_overrides(cfg: &mut Config, sets: &[String]) -> anyhow::Result<()> {
    for kv in sets {
        let (key, val) = kv
            .split_once('=')
            .ok_or_else(|| anyhow!("override `{kv}` must look like key=value"))?;
        let (key, val) = (key.trim(), val.trim());
        let list = || -> Vec<String> {
            val.split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        };
        match key {
            "rules_file" => cfg.rules_file = PathBuf::from(val),
            "extensions" => cfg.extensions = list(),
            "ignore_globs" => cfg.ignore_globs = list(),
            "disabled_rules" => cfg.disabled_rules = list(),
            _ => warn!(key, "ignoring unknown config override"),
        }
    }
    Ok(())
}
