//! Command line interface for publishing and resolving name claims.

use std::{fs, sync::Arc, time::Duration};

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use nns::{
    cache::ClaimCache,
    config::Settings,
    identity::{Identity, Signer},
    publish::PublishSummary,
    relay::parse_relay_url,
    resolve::Resolution,
    ClaimEvent, Event, NameService, RelayContext, WsConnector,
};

/// Command line interface entry point.
#[derive(Parser)]
#[command(
    name = "nns",
    author,
    version,
    about = "Name claims published to and resolved from Nostr relays"
)]
struct Cli {
    /// Path to the `.env` configuration file.
    #[arg(long, default_value = ".env")]
    env: String,
    /// Subcommand to execute.
    #[command(subcommand)]
    command: Commands,
}

/// Supported CLI subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Sign a claim for NAME and publish it to the relays.
    Publish {
        name: String,
        /// Endpoint the name should resolve to.
        #[arg(long, default_value = "127.0.0.1:8080")]
        ip: String,
        /// Hex secret key; falls back to SECRET_KEY, then a fresh key.
        #[arg(long)]
        key: Option<String>,
        /// Relay URL, repeatable. Replaces RELAYS.
        #[arg(long = "relay", value_name = "URL")]
        relays: Vec<String>,
        #[arg(long)]
        quorum: Option<usize>,
        #[arg(long)]
        timeout_ms: Option<u64>,
        /// Free-form note attached to the claim.
        #[arg(long)]
        note: Option<String>,
    },
    /// Look NAME up and print the selected endpoint.
    Resolve {
        name: String,
        /// Relay URL, repeatable. Replaces RELAYS.
        #[arg(long = "relay", value_name = "URL")]
        relays: Vec<String>,
        #[arg(long)]
        timeout_ms: Option<u64>,
        /// Always query relays, ignoring CACHE_ROOT.
        #[arg(long)]
        no_cache: bool,
    },
    /// Prefer PUBKEY's claims for NAME in future lookups.
    Select { name: String, pubkey: String },
    /// Print a fresh keypair.
    Keygen,
    /// Validate claim event files.
    Verify {
        /// Paths to JSON event files.
        #[arg(required = true)]
        files: Vec<String>,
    },
}

/// Relay and cache overrides taken from flags.
#[derive(Default)]
struct Overrides {
    relays: Vec<String>,
    timeout_ms: Option<u64>,
    quorum: Option<usize>,
    no_cache: bool,
}

/// Execute the selected CLI subcommand.
async fn run(cli: Cli) -> anyhow::Result<()> {
    let cfg = Settings::from_env(&cli.env)?;
    match cli.command {
        Commands::Publish {
            name,
            ip,
            key,
            relays,
            quorum,
            timeout_ms,
            note,
        } => {
            let identity = match key.or_else(|| cfg.secret_key.clone()) {
                Some(secret) => Identity::from_secret_hex(&secret)?,
                None => {
                    let identity = Identity::generate();
                    println!("generated secret key: {}", identity.secret_key_hex());
                    identity
                }
            };
            let overrides = Overrides {
                relays,
                timeout_ms,
                quorum,
                no_cache: true,
            };
            let service = build_service(&cfg, overrides)?;
            let (claim, result) = service
                .publish(&identity, &name, &ip, note.as_deref())
                .await?;
            println!("{}", serde_json::to_string_pretty(claim.as_event())?);
            for outcome in &result.outcomes {
                println!("  {}: {}", outcome.relay, outcome.status);
            }
            let verdict = match result.summary() {
                PublishSummary::Success => "published",
                PublishSummary::Partial => "published (partial)",
                PublishSummary::Failure => "not published",
            };
            println!(
                "{verdict}: {}/{} relays acknowledged, quorum {}",
                result.acknowledged(),
                result.outcomes.len(),
                result.quorum
            );
            if !result.success {
                bail!("quorum of {} not reached", result.quorum);
            }
        }
        Commands::Resolve {
            name,
            relays,
            timeout_ms,
            no_cache,
        } => {
            let overrides = Overrides {
                relays,
                timeout_ms,
                no_cache,
                ..Overrides::default()
            };
            let service = build_service(&cfg, overrides)?;
            let lookup = service.lookup(&name).await?;
            let (Resolution::Resolved(resolved), Some(preferred)) =
                (&lookup.resolution, lookup.preferred())
            else {
                bail!("no claim found for {}", name.trim());
            };
            println!("{} -> {}", resolved.name(), preferred.endpoint());
            print_claim("selected", preferred);
            if preferred.id() != resolved.winner().id() {
                print_claim("newest", resolved.winner());
            }
            for alt in resolved.alternatives() {
                if alt.id() != preferred.id() {
                    print_claim("alternative", alt);
                }
            }
            if resolved.is_conflicted() {
                println!(
                    "warning: {} claimants disagree on this name",
                    resolved.contenders().len()
                );
            }
            if lookup.from_cache {
                println!("(from cache)");
            }
            if lookup.malformed > 0 {
                println!("ignored {} malformed events", lookup.malformed);
            }
        }
        Commands::Select { name, pubkey } => {
            let service = build_service(&cfg, Overrides::default())?;
            let record = service.select(&name, &pubkey)?;
            println!("{} now prefers {}", record.name, record.pubkey);
        }
        Commands::Keygen => {
            let identity = Identity::generate();
            println!("secret: {}", identity.secret_key_hex());
            println!("pubkey: {}", identity.public_key_hex());
        }
        Commands::Verify { files } => {
            let mut invalid = 0;
            for f in &files {
                match verify_file(f) {
                    Ok(claim) => println!("ok {f}: {} -> {}", claim.name(), claim.endpoint()),
                    Err(e) => {
                        invalid += 1;
                        println!("invalid {f}: {e:#}");
                    }
                }
            }
            if invalid > 0 {
                bail!("{invalid} of {} files invalid", files.len());
            }
        }
    }
    Ok(())
}

fn build_service(cfg: &Settings, overrides: Overrides) -> anyhow::Result<NameService> {
    let relays = if overrides.relays.is_empty() {
        cfg.relay_urls()?
    } else {
        overrides
            .relays
            .iter()
            .map(|r| parse_relay_url(r))
            .collect::<Result<Vec<_>, _>>()?
    };
    let ctx = RelayContext {
        relays,
        timeout: overrides
            .timeout_ms
            .map(Duration::from_millis)
            .unwrap_or(cfg.timeout),
        quorum: overrides.quorum.unwrap_or(cfg.quorum),
    };
    let service = NameService::new(ctx, Arc::new(WsConnector::new(cfg.tor_socks.clone())));
    Ok(match &cfg.cache_root {
        Some(root) if !overrides.no_cache => {
            let cache = ClaimCache::new(root.clone());
            cache.init()?;
            service.with_cache(cache, cfg.cache_ttl)
        }
        _ => service,
    })
}

fn print_claim(label: &str, claim: &ClaimEvent) {
    print!(
        "  {label}: {} by {} at {}",
        claim.endpoint(),
        claim.pubkey(),
        claim.created_at()
    );
    match claim.note() {
        Some(note) => println!(" ({note})"),
        None => println!(),
    }
}

fn verify_file(path: &str) -> anyhow::Result<ClaimEvent> {
    let data = fs::read_to_string(path).with_context(|| format!("reading {path}"))?;
    let event: Event = serde_json::from_str(&data).context("decoding event")?;
    Ok(ClaimEvent::from_event(event)?)
}

#[cfg(not(test))]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    use tracing_subscriber::EnvFilter;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();
    let cli = Cli::parse();
    run(cli).await
}
