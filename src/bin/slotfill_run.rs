use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::{ArgAction, Parser};
use serde_json::json;

use slotfill_kernel_rs::collaborators::{register_lookup_impl, RegistryCollaborators};
use slotfill_kernel_rs::core::register_core;
use slotfill_kernel_rs::impls::demo::register_demo_impls;
use slotfill_kernel_rs::navigation::MemoryLocation;
use slotfill_kernel_rs::registry::Registry;
use slotfill_kernel_rs::resolution::cache::{CachedLookup, TokenCache};
use slotfill_kernel_rs::resolution::http::HttpTokenLookup;
use slotfill_kernel_rs::script::{load_script, run_script, ScriptTarget};
use slotfill_kernel_rs::selection::{MemeFlow, SingleTokenFlow, StepperFlow};
use slotfill_kernel_rs::tooling::{init_logging, FlowConfig, FlowKind};

const HTTP_LOOKUP_IMPL: &str = "slotfill://impl/http/tokens/lookup@1";
const DEFAULT_URL: &str = "https://app.local/create";

#[derive(Parser, Debug)]
#[command(name = "slotfill-run")]
#[command(about = "Mount a slot selection flow against a URL and replay a scripted session")]
struct CliOptions {
    /// Flow configuration (TOML, JSON or YAML). Defaults to the user config dir.
    #[arg(long = "config", short = 'c')]
    config: Option<PathBuf>,

    /// Location the flow is mounted on, including query and hash
    #[arg(long = "url", short = 'u', default_value = DEFAULT_URL)]
    url: String,

    /// Script of UI events to replay after mounting (YAML/JSON)
    #[arg(long = "script", short = 's')]
    script: Option<PathBuf>,

    /// Serve lookups from the configured catalog even when a base_url is set
    #[arg(long = "demo", action = ArgAction::SetTrue)]
    demo: bool,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long = "log-level")]
    log_level: Option<String>,
}

fn main() {
    if let Err(err) = run() {
        eprintln!("Error: {err:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let opts = CliOptions::parse();

    let config = load_config(opts.config.as_deref())?;
    init_logging(opts.log_level.as_deref().or(config.log_level.as_deref()))?;

    let registry = setup_registry(&config, opts.demo)?;
    let collaborators = RegistryCollaborators::new(registry).into_collaborators();
    let location = MemoryLocation::parse(&opts.url)?;

    let mut target: Box<dyn ScriptTarget> = match config.kind {
        FlowKind::Single => Box::new(SingleTokenFlow::mount(
            location,
            config.attribution(),
            config.default_collection.clone(),
            collaborators,
        )?),
        FlowKind::Stepper => Box::new(StepperFlow::mount(
            location,
            config.flow_options(),
            collaborators,
        )?),
        FlowKind::Meme => Box::new(MemeFlow::mount(
            location,
            config.flow_options(),
            collaborators,
        )?),
    };
    let mounted_url = target.flow().location().href();

    let steps = match &opts.script {
        Some(path) => load_script(path)?,
        None => Vec::new(),
    };
    let records = run_script(target.as_mut(), &steps)?;

    let flow = target.flow();
    let report = json!({
        "kind": config.kind,
        "mountedUrl": mounted_url,
        "steps": records,
        "url": flow.location().href(),
        "texts": target.texts(),
        "flow": flow.snapshot(),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn load_config(explicit: Option<&Path>) -> Result<FlowConfig> {
    if let Some(path) = explicit {
        return FlowConfig::load(path);
    }
    match FlowConfig::default_path() {
        Some(path) if path.is_file() => FlowConfig::load(&path),
        _ => {
            let mut config = FlowConfig::default();
            config.apply_env();
            config.validate()?;
            Ok(config)
        }
    }
}

fn setup_registry(config: &FlowConfig, demo: bool) -> Result<Registry> {
    let registry = Registry::new();
    register_core(&registry);
    register_demo_impls(&registry, config.demo_catalog());

    if demo {
        return Ok(registry);
    }
    if let Some(base_url) = &config.lookup.base_url {
        let http = HttpTokenLookup::new(base_url, config.timeout()?)
            .with_context(|| format!("unable to configure token lookup for {base_url}"))?;
        let ttl = config.cache_ttl()?;
        if ttl.is_zero() {
            return Err(anyhow!("cache_ttl must be greater than zero"));
        }
        let cached = CachedLookup::new(http, TokenCache::new(ttl));
        register_lookup_impl(&registry, HTTP_LOOKUP_IMPL, Arc::new(cached));
        log::info!("token lookups served by {base_url}");
    }
    Ok(registry)
}
