//! `rulekeeper` - CLI and server for rulekeeper
//!
//! This binary runs the REST API and offers command-line access to rule
//! files, scan paths, the stored API key and postmortems.

#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Parser;
use tokio::net::TcpListener;

use rulekeeper::cli::{
    AddPostmortemArgs, CheckCommand, Cli, Command, ConfigCommand, GlobalCommand, KeyCommand,
    PostmortemCommand, RulesCommand, ScanPathsCommand, ServeCommand,
};
use rulekeeper::llm::{SanityReport, Suggestion};
use rulekeeper::logging::{init_logging_with_style, LogStyle};
use rulekeeper::postmortem::PostmortemDraft;
use rulekeeper::rules::{self, RuleSet, RuleSpec};
use rulekeeper::secrets::CredentialStore;
use rulekeeper::{projects, AppState, Config, Postmortem, Workspace};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let style = if matches!(cli.command, Command::Serve(_)) {
        LogStyle::Server
    } else {
        LogStyle::Cli
    };
    init_logging_with_style(cli.verbosity(), style);

    // `config validate` must run even when the default file is broken
    let load = || Config::load_from(cli.config.clone());

    match cli.command {
        Command::Serve(cmd) => handle_serve(load()?, cmd).await,
        Command::Projects(cmd) => handle_projects(&load()?, cmd.json),
        Command::Rules(cmd) => handle_rules(&load()?, cmd),
        Command::Global(cmd) => handle_global(&load()?, &cmd),
        Command::ScanPaths(cmd) => handle_scan_paths(&load()?, cmd),
        Command::Key(cmd) => handle_key(&load()?, cmd),
        Command::Postmortem(cmd) => handle_postmortem(load()?, cmd).await,
        Command::Check(cmd) => handle_check(load()?, cmd).await,
        Command::Config(cmd) => handle_config(cli.config.clone(), cmd),
    }
}

fn absolute(path: &Path) -> anyhow::Result<PathBuf> {
    std::path::absolute(path).with_context(|| format!("cannot resolve {}", path.display()))
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn handle_serve(mut config: Config, cmd: ServeCommand) -> anyhow::Result<()> {
    if let Some(host) = cmd.host {
        config.server.host = host;
    }
    if let Some(port) = cmd.port {
        config.server.port = port;
    }

    let addr = config.bind_addr()?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("cannot bind {addr}"))?;
    let state = AppState::open(config)?;
    rulekeeper::server::serve(listener, state).await?;
    Ok(())
}

fn handle_projects(config: &Config, json: bool) -> anyhow::Result<()> {
    let workspace = Workspace::open(config)?;
    let found = projects::scan(
        &workspace.scan_paths()?,
        &config.scan.project_markers,
        &config.scan.rules_dir,
    );

    if json {
        return print_json(&found);
    }

    if found.is_empty() {
        println!("No projects found. Add a scan path with `rulekeeper scan-paths add <DIR>`.");
        return Ok(());
    }
    for project in &found {
        let marker = if project.has_cursor_rules { "*" } else { " " };
        println!(
            "{marker} {:<30} {}",
            project.name,
            project.path.display()
        );
    }
    println!();
    println!("{} projects (* has rules)", found.len());
    Ok(())
}

fn handle_rules(config: &Config, cmd: RulesCommand) -> anyhow::Result<()> {
    match cmd {
        RulesCommand::List { project, json } => {
            let project = absolute(&project)?;
            let set = RuleSet::new(&project, &config.scan.rules_dir, &config.scan.rule_extensions);
            let rules = set.list()?;

            if json {
                return print_json(&rules);
            }
            if rules.is_empty() {
                println!("No rules in {}", set.dir().display());
            }
            for rule in &rules {
                let description = rule
                    .frontmatter
                    .get("description")
                    .and_then(|d| d.as_str())
                    .unwrap_or_default();
                println!("{:<30} {description}", rule.filename);
            }
        }
        RulesCommand::Generate(args) => {
            let generated = rules::generate(&RuleSpec::from(&args));
            match args.write {
                Some(project) => {
                    let project = absolute(&project)?;
                    let set =
                        RuleSet::new(&project, &config.scan.rules_dir, &config.scan.rule_extensions);
                    let path = set.save(&generated.filename, &generated.content)?;
                    println!("Wrote {}", path.display());
                }
                None => print!("{}", generated.content),
            }
        }
    }
    Ok(())
}

fn handle_global(config: &Config, cmd: &GlobalCommand) -> anyhow::Result<()> {
    let workspace = Workspace::open(config)?;
    match cmd {
        GlobalCommand::Show => print!("{}", workspace.global_rules()?),
        GlobalCommand::Path => println!("{}", workspace.global_rules_path().display()),
    }
    Ok(())
}

fn handle_scan_paths(config: &Config, cmd: ScanPathsCommand) -> anyhow::Result<()> {
    let workspace = Workspace::open(config)?;
    let mut paths = workspace.scan_paths()?;

    match cmd {
        ScanPathsCommand::List => {
            for path in &paths {
                let note = if path.is_dir() { "" } else { "  (missing)" };
                println!("{}{note}", path.display());
            }
        }
        ScanPathsCommand::Add { dir } => {
            let dir = absolute(&dir)?;
            if paths.contains(&dir) {
                println!("Already scanning {}", dir.display());
            } else {
                paths.push(dir.clone());
                workspace.set_scan_paths(&paths)?;
                println!("Added {}", dir.display());
            }
        }
        ScanPathsCommand::Remove { dir } => {
            let dir = absolute(&dir)?;
            let before = paths.len();
            paths.retain(|p| p != &dir);
            if paths.len() == before {
                println!("Not a scan path: {}", dir.display());
            } else {
                workspace.set_scan_paths(&paths)?;
                println!("Removed {}", dir.display());
            }
        }
    }
    Ok(())
}

fn handle_key(config: &Config, cmd: KeyCommand) -> anyhow::Result<()> {
    // Opening the workspace creates the data directory.
    Workspace::open(config)?;
    let store = CredentialStore::new(config.credentials_path());

    match cmd {
        KeyCommand::Set { key } => {
            store.store(&key)?;
            println!("API key stored in {}", store.path().display());
        }
        KeyCommand::Clear => {
            if store.clear()? {
                println!("API key removed.");
            } else {
                println!("No API key was stored.");
            }
        }
        KeyCommand::Status { json } => {
            let status = store.status()?;
            if json {
                return print_json(&status);
            }
            match (&status.masked, status.updated_at) {
                (Some(masked), Some(at)) => println!("Stored key {masked} (updated {at})"),
                (Some(masked), None) => println!("Stored key {masked}"),
                _ => println!(
                    "No key stored; falling back to ${}",
                    config.llm.api_key_env
                ),
            }
        }
    }
    Ok(())
}

async fn handle_postmortem(config: Config, cmd: PostmortemCommand) -> anyhow::Result<()> {
    let state = AppState::open(config)?;
    let store = state.postmortems();

    match cmd {
        PostmortemCommand::Add(args) => add_postmortem(&state, args)?,
        PostmortemCommand::List {
            project,
            limit,
            json,
        } => {
            let project = absolute(&project)?;
            let list = store.with(|s| s.list_for_project(&project, limit))?;
            if json {
                return print_json(&list);
            }
            if list.is_empty() {
                println!("No postmortems for {}", project.display());
            }
            for pm in &list {
                print_summary_line(pm);
            }
        }
        PostmortemCommand::Show { id } => {
            let pm = store.with(|s| s.get(id))?;
            print_json(&pm)?;
        }
        PostmortemCommand::Delete { id } => {
            store.with(|s| s.delete(id))?;
            println!("Deleted postmortem {id}");
        }
        PostmortemCommand::Analyze { id, json } => {
            let suggestions = state.analyzer().analyze_postmortem(id).await?;
            print_suggestions(&suggestions, json)?;
        }
        PostmortemCommand::Patterns { project, json } => {
            let project = absolute(&project)?;
            let suggestions = state.analyzer().analyze_project(&project).await?;
            print_suggestions(&suggestions, json)?;
        }
        PostmortemCommand::Stats => {
            let stats = store.with(rulekeeper::PostmortemStore::stats)?;
            print_json(&stats)?;
        }
    }
    Ok(())
}

fn add_postmortem(state: &AppState, args: AddPostmortemArgs) -> anyhow::Result<()> {
    let project = absolute(&args.project)?;
    let draft = PostmortemDraft {
        title: args.title,
        notes: args.notes,
        what_happened: args.what_happened,
        expected: args.expected,
        severity: args.severity.map(Into::into),
        files: args.files,
    };

    let postmortem = Postmortem::new(&project, draft)?;
    let id = state.postmortems().with(|s| s.insert(&postmortem))?;
    println!("Recorded postmortem {id} for {}", project.display());
    Ok(())
}

fn print_summary_line(pm: &Postmortem) {
    let analyzed = if pm.is_analyzed() { "analyzed" } else { "" };
    println!(
        "{:>5}  {}  {:<6}  {:<40}  {analyzed}",
        pm.id.unwrap_or_default(),
        pm.created_at.format("%Y-%m-%d %H:%M"),
        pm.severity,
        pm.display_title(),
    );
}

fn print_suggestions(suggestions: &[Suggestion], json: bool) -> anyhow::Result<()> {
    if json {
        return print_json(&suggestions);
    }
    if suggestions.is_empty() {
        println!("The model did not suggest any rules.");
        return Ok(());
    }
    for suggestion in suggestions {
        println!("== {} ==", suggestion.filename);
        if !suggestion.rationale.is_empty() {
            println!("Why: {}", suggestion.rationale);
        }
        println!();
        println!("{}", suggestion.content);
    }
    Ok(())
}

async fn handle_check(config: Config, cmd: CheckCommand) -> anyhow::Result<()> {
    let content = std::fs::read_to_string(&cmd.file)
        .with_context(|| format!("cannot read {}", cmd.file.display()))?;
    let project = cmd.project.as_deref().map(absolute).transpose()?;

    let state = AppState::open(config)?;
    let report = state
        .analyzer()
        .sanity_check(&content, project.as_deref())
        .await?;

    if cmd.json {
        return print_json(&report);
    }
    print_report(&report);
    Ok(())
}

fn print_report(report: &SanityReport) {
    println!("{}", report.summary);
    if !report.findings.is_empty() {
        println!();
    }
    for finding in &report.findings {
        println!("[{}] {}", finding.severity, finding.message);
    }
}

/// Load `path` and report why it is unusable.
fn validate_config_file(path: &Path) -> anyhow::Result<Config> {
    Config::load_from(Some(path.to_path_buf()))
        .with_context(|| format!("invalid configuration in {}", path.display()))
}

fn handle_config(config_path: Option<PathBuf>, cmd: ConfigCommand) -> anyhow::Result<()> {
    match cmd {
        ConfigCommand::Show { json } => {
            let config = Config::load_from(config_path)?;
            if json {
                return print_json(&config);
            }
            println!("Current Configuration");
            println!("=====================");
            println!();
            println!("[Server]");
            println!("  Bind:               {}:{}", config.server.host, config.server.port);
            match &config.server.static_dir {
                Some(dir) => println!("  Static dir:         {}", dir.display()),
                None => println!("  Static dir:         (none)"),
            }
            println!(
                "  CORS origins:       {}",
                config.server.cors_allowed_origins.join(", ")
            );
            println!();
            println!("[Storage]");
            println!("  Data dir:           {}", config.data_dir().display());
            println!(
                "  Postmortem db:      {}",
                config.postmortem_db_path().display()
            );
            println!();
            println!("[Scan]");
            println!("  Rules dir:          {}", config.scan.rules_dir.display());
            println!(
                "  Rule extensions:    {}",
                config.scan.rule_extensions.join(", ")
            );
            println!(
                "  Project markers:    {}",
                config.scan.project_markers.join(", ")
            );
            println!();
            println!("[LLM]");
            println!("  Base URL:           {}", config.llm.base_url);
            println!("  Model:              {}", config.llm.model);
            println!("  Timeout (secs):     {}", config.llm.timeout_secs);
            println!("  Key env var:        {}", config.llm.api_key_env);
            println!("  Redact secrets:     {}", config.llm.redact_secrets);
        }
        ConfigCommand::Path => {
            println!("{}", Config::default_config_path().display());
        }
        ConfigCommand::Validate { file } => {
            let path = file
                .or(config_path)
                .unwrap_or_else(Config::default_config_path);
            println!("Validating configuration: {}", path.display());
            validate_config_file(&path)?;
            println!("Configuration is valid.");
        }
    }
    Ok(())
}
