use anyhow::{anyhow, Context, Result};
use caseflow::cli::{Command, DemoArgs, InitArgs, RootArgs, RunArgs};
use caseflow::config::{self, AgentConfig};
use caseflow::dispatch::Dispatcher;
use caseflow::engine::Engine;
use caseflow::provider::build_http_clients;
use caseflow::registry::AbilityRegistry;
use caseflow::state::SupportState;
use caseflow::summary;
use clap::Parser;
use std::path::Path;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = RootArgs::parse();
    match args.command {
        Command::Init(args) => cmd_init(args),
        Command::Run(args) => cmd_run(args),
        Command::Demo(args) => cmd_demo(args),
    }
}

fn cmd_init(args: InitArgs) -> Result<()> {
    let path = config::resolve_config_path(args.config.as_deref())?;
    if path.exists() && !args.force {
        return Err(anyhow!(
            "config already exists at {}; pass --force to overwrite",
            path.display()
        ));
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create config dir {}", parent.display()))?;
    }
    std::fs::write(&path, config::config_stub())
        .with_context(|| format!("write {}", path.display()))?;
    println!("Wrote starter config to {}", path.display());
    Ok(())
}

fn cmd_run(args: RunArgs) -> Result<()> {
    let config_path = config::resolve_config_path(args.config.as_deref())?;
    let config = config::load_required(&config_path)?;
    let input = parse_input(args.input.as_deref(), args.input_file.as_deref())?;
    let engine = build_engine(&config, args.call_timeout)?;

    if args.verbose {
        eprintln!("config: {}", config_path.display());
        eprintln!("providers: {}", provider_line(&config));
    }
    let start = Instant::now();
    let final_state = engine.run(input);
    if args.verbose {
        eprintln!("elapsed: {} ms", start.elapsed().as_millis());
    }
    print_final_state(&final_state, args.json)
}

fn cmd_demo(args: DemoArgs) -> Result<()> {
    let config_path = config::resolve_config_path(args.config.as_deref())?;
    let config = config::load_or_default(&config_path)?;
    let engine = build_engine(&config, None)?;

    if args.verbose {
        if config_path.exists() {
            eprintln!("config: {}", config_path.display());
        } else {
            eprintln!("config: built-in default");
        }
        eprintln!("providers: {}", provider_line(&config));
    }
    let start = Instant::now();
    let final_state = engine.run(demo_request());
    if args.verbose {
        eprintln!("elapsed: {} ms", start.elapsed().as_millis());
    }
    print_final_state(&final_state, args.json)
}

fn build_engine(config: &AgentConfig, call_timeout: Option<u64>) -> Result<Engine> {
    let registry = AbilityRegistry::from_config(config)?;
    let timeout = config::resolve_call_timeout(call_timeout, config);
    let clients = build_http_clients(config, timeout);
    let dispatcher = Dispatcher::new(registry, clients)?;
    Ok(Engine::new(dispatcher))
}

fn parse_input(inline: Option<&str>, file: Option<&Path>) -> Result<SupportState> {
    if let Some(raw) = inline {
        let state = serde_json::from_str(raw).context("parse --input JSON")?;
        return Ok(state);
    }
    if let Some(path) = file {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("read input file {}", path.display()))?;
        let state = serde_json::from_str(&raw)
            .with_context(|| format!("parse input JSON from {}", path.display()))?;
        return Ok(state);
    }
    Err(anyhow!("one of --input or --input-file is required"))
}

/// The canned demonstration request: a damaged order with the clarification
/// answer pre-supplied so the Wait stage has something to extract. The
/// email's trailing space is normalize_fields demo material.
fn demo_request() -> SupportState {
    SupportState {
        customer_name: Some("Aisha Jain".to_string()),
        email: Some("AISHA@EXAMPLE.COM ".to_string()),
        query: Some("My order #A123 arrived damaged. Need a replacement ASAP.".to_string()),
        priority: Some("High".to_string()),
        ticket_id: Some("TCK-1001".to_string()),
        clarification_answer: Some("Ship replacement to: 221B Baker Street, London.".to_string()),
        ..SupportState::default()
    }
}

fn print_final_state(state: &SupportState, json: bool) -> Result<()> {
    if json {
        println!("{}", summary::render_json(state)?);
    } else {
        print!("{}", summary::render_text(state)?);
    }
    Ok(())
}

fn provider_line(config: &AgentConfig) -> String {
    config
        .providers
        .keys()
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}
