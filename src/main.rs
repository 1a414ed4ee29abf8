//! shardwire - erasure-coded transaction envelopes
//!
//! Usage:
//!   shardwire geometry <len>          - Show how a payload is sharded
//!   shardwire seal <input> <output>   - Seal a JSON transaction
//!   shardwire open <input>            - Open an envelope and print it
//!   shardwire simulate                - Scatter shards over simulated servers

use clap::{Parser, Subcommand};
use rand::RngCore;
use shardwire::{
    config::{Config, ResponseEncoding},
    crypto::KeySet,
    envelope::{
        decode_response, decrypt_share, seal, split_for_servers, verify_server_tag, Transaction,
    },
    erasure::{shards_per_server, strip_padding, CollectorRegistry, ShardGeometry},
    Error, Result,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;
use zeroize::Zeroizing;

#[derive(Parser)]
#[command(name = "shardwire")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Erasure-coded, per-server encrypted transaction envelopes")]
struct Cli {
    /// Configuration file path (defaults to the user config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of servers (overrides the config file)
    #[arg(short, long)]
    servers: Option<usize>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the shard layout for a payload length
    Geometry {
        /// Payload length in bytes
        payload_len: usize,
    },

    /// Seal a JSON transaction into an envelope
    Seal {
        /// JSON file holding one object
        input: PathBuf,

        /// Where to write the envelope
        output: PathBuf,

        /// Also write the per-server attestation here
        #[arg(long)]
        attestation: Option<PathBuf>,

        /// Read the shared secret from file
        #[arg(long)]
        secret_file: Option<PathBuf>,
    },

    /// Open an envelope and print its transaction as JSON
    Open {
        /// Envelope file
        input: PathBuf,

        /// Read the shared secret from file
        #[arg(long)]
        secret_file: Option<PathBuf>,
    },

    /// Seal a random payload, drop servers, and rebuild from the rest
    Simulate {
        /// Payload size in bytes
        #[arg(long, default_value_t = 300)]
        payload_len: usize,

        /// Servers (1-based) whose shares never arrive
        #[arg(long, value_delimiter = ',')]
        drop: Vec<usize>,
    },
}

fn main() {
    let cli = Cli::parse();

    let config_path = cli
        .config
        .as_ref()
        .map(expand_tilde)
        .unwrap_or_else(Config::default_path);
    let config = Config::load_or_default(&config_path);

    let level = if cli.verbose {
        "debug".to_string()
    } else {
        config
            .as_ref()
            .map(|c| c.logging.level.clone())
            .unwrap_or_else(|_| "info".to_string())
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&level));
    if let Err(e) = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
    {
        eprintln!("Failed to set up logging: {}", e);
    }

    let result = config.and_then(|mut config| {
        if let Some(servers) = cli.servers {
            config.servers = servers;
            config.validate()?;
        }
        debug!(path = ?config_path, servers = config.servers, "Loaded configuration");
        run_command(cli.command, &config)
    });

    if let Err(e) = result {
        error!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run_command(command: Commands, config: &Config) -> Result<()> {
    match command {
        Commands::Geometry { payload_len } => cmd_geometry(config, payload_len),

        Commands::Seal {
            input,
            output,
            attestation,
            secret_file,
        } => cmd_seal(config, &input, &output, attestation, secret_file),

        Commands::Open { input, secret_file } => cmd_open(config, &input, secret_file),

        Commands::Simulate { payload_len, drop } => cmd_simulate(config, payload_len, drop),
    }
}

fn cmd_geometry(config: &Config, payload_len: usize) -> Result<()> {
    let geometry = ShardGeometry::for_payload(payload_len, config.servers)?;
    let per_server = shards_per_server(geometry.total_shards, config.servers);

    println!("Payload:            {} bytes", payload_len);
    println!("Servers:            {}", config.servers);
    println!("Total shards:       {}", geometry.total_shards);
    println!("Data shards:        {}", geometry.data_shards);
    println!("Parity shards:      {}", geometry.parity_shards);
    println!("Shard length:       {} bytes", geometry.shard_len);
    println!("Shards per server:  {}", per_server);
    println!(
        "Servers that may fail: {}",
        geometry.tolerated_server_losses(config.servers)
    );
    Ok(())
}

fn cmd_seal(
    config: &Config,
    input: &Path,
    output: &Path,
    attestation: Option<PathBuf>,
    secret_file: Option<PathBuf>,
) -> Result<()> {
    let content = std::fs::read_to_string(input)
        .map_err(|e| Error::Config(format!("Failed to read transaction file: {}", e)))?;
    let json: serde_json::Value = serde_json::from_str(&content)?;
    let transaction = Transaction::from_json(json)?;

    let secret = read_secret(secret_file)?;
    let keys = KeySet::derive(secret.as_bytes(), config.servers)?;
    let sealed = seal(&transaction, &keys)?;

    let body = match config.envelope.response_encoding {
        ResponseEncoding::Raw => sealed.envelope,
        ResponseEncoding::Base64 => {
            use base64::Engine;
            base64::engine::general_purpose::STANDARD
                .encode(&sealed.envelope)
                .into_bytes()
        }
    };
    std::fs::write(output, &body)?;
    if let Some(path) = attestation {
        std::fs::write(&path, &sealed.attestation)?;
        info!(path = ?path, "Wrote attestation");
    }

    info!(
        output = ?output,
        endpoint = %config.endpoint,
        shards = sealed.geometry.total_shards,
        shard_len = sealed.geometry.shard_len,
        "Envelope written"
    );
    Ok(())
}

fn cmd_open(config: &Config, input: &Path, secret_file: Option<PathBuf>) -> Result<()> {
    let body = std::fs::read(input)?;
    let envelope = decode_response(&body, config.envelope.response_encoding)?;

    let secret = read_secret(secret_file)?;
    let keys = KeySet::derive(secret.as_bytes(), config.servers)?;
    let transaction = shardwire::envelope::open(&envelope, &keys)?;

    let json = serde_json::to_string_pretty(&transaction.to_json())?;
    println!("{}", json);
    Ok(())
}

fn cmd_simulate(config: &Config, payload_len: usize, mut dropped: Vec<usize>) -> Result<()> {
    let servers = config.servers;
    dropped.sort_unstable();
    dropped.dedup();
    if let Some(bad) = dropped.iter().find(|&&s| s == 0 || s > servers) {
        return Err(Error::InvalidConfig(format!(
            "cannot drop server {}: servers are numbered 1..={}",
            bad, servers
        )));
    }

    let mut blob = vec![0u8; payload_len];
    rand::thread_rng().fill_bytes(&mut blob);
    let transaction = Transaction::new().with("blob", blob);

    let keys = KeySet::generate(servers)?;
    let sealed = seal(&transaction, &keys)?;
    let shares = split_for_servers(&sealed.envelope, &keys)?;
    let geometry = sealed.geometry;

    let rt = tokio::runtime::Runtime::new().map_err(|e| Error::Internal(e.to_string()))?;
    rt.block_on(async {
        let registry: Arc<CollectorRegistry<u64>> = Arc::new(CollectorRegistry::new());
        let (tx, mut rx) = mpsc::channel::<Vec<u8>>(1);

        let mut handles = Vec::new();
        for share in shares {
            if dropped.contains(&share.server) {
                warn!(server = share.server, "Server share dropped");
                continue;
            }
            let key = keys.encryption_key(share.server)?.clone();
            let signing_key = keys.signing_key(share.server)?.clone();
            let attestation = sealed.attestation.clone();
            let registry = registry.clone();
            let tx = tx.clone();

            handles.push(tokio::spawn(async move {
                verify_server_tag(&attestation, share.server, &signing_key)?;
                for (index, shard) in decrypt_share(&share, &key)? {
                    if let Some(data) = registry.submit(0, index, &shard, geometry)? {
                        let _ = tx.send(data).await;
                    }
                }
                debug!(server = share.server, "Server delivered its shards");
                Ok::<(), Error>(())
            }));
        }
        drop(tx);

        for handle in handles {
            handle.await.map_err(|e| Error::Internal(e.to_string()))??;
        }

        let evicted = registry.evict_stale(config.collector.abandon_after());
        debug!(evicted, "Collector registry swept");

        let data = rx.recv().await.ok_or(Error::InsufficientShards {
            present: (servers - dropped.len()) * shards_per_server(geometry.total_shards, servers),
            required: geometry.data_shards,
        })?;
        let rebuilt = Transaction::from_bytes(strip_padding(&data)?)?;
        if rebuilt != transaction {
            return Err(Error::Internal("rebuilt transaction differs".to_string()));
        }

        println!(
            "Rebuilt {} byte payload from {} of {} servers ({} shards, {} needed)",
            payload_len,
            servers - dropped.len(),
            servers,
            geometry.total_shards,
            geometry.data_shards
        );
        Ok::<(), Error>(())
    })
}

/// Shared secret from file, or prompt for it
fn read_secret(secret_file: Option<PathBuf>) -> Result<Zeroizing<String>> {
    let secret = if let Some(path) = secret_file {
        std::fs::read_to_string(expand_tilde(&path))
            .map_err(|e| Error::Internal(format!("Failed to read secret file: {}", e)))?
            .trim()
            .to_string()
    } else {
        rpassword::prompt_password("Enter shared secret: ")
            .map_err(|e| Error::Internal(e.to_string()))?
    };
    if secret.is_empty() {
        return Err(Error::KeyDerivation("shared secret is empty".to_string()));
    }
    Ok(Zeroizing::new(secret))
}

fn expand_tilde(path: &PathBuf) -> PathBuf {
    if let Ok(rest) = path.strip_prefix("~") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    path.clone()
}
