//! `cardid`, the card-identity command line.
//!
//! Registers, rotates and unregisters an identity's cards, finds and
//! filters other identities' cards, and keeps a password-protected backup
//! of the local private key.

use std::collections::BTreeMap;
use std::io::{BufRead, Write};
use std::path::PathBuf;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Parser, Subcommand};

use card_identity::time::secs_to_rfc3339;
use card_identity::{
    Card, CardClient, CardFilter, CardId, ClientConfig, ACCOUNT_CARD_FIELD, IDENTITY_ID_FIELD,
};

// ── CLI structure ─────────────────────────────────────────────────────────────

/// card-identity CLI: manage identity cards and filter them by account
/// or device.
#[derive(Parser, Debug)]
#[command(
    name = "cardid",
    about = "card-identity CLI",
    version,
    long_about = "cardid: card-identity CLI\n\nRegister, rotate and unregister identity cards, and find\nother identities' cards filtered by account or device."
)]
struct Cli {
    /// Root directory for cards and keys (default: $CARDID_HOME or ~/.cardid)
    #[arg(long, global = true)]
    home: Option<PathBuf>,

    /// Identity to act as
    #[arg(long, global = true, default_value = "default")]
    identity: String,

    /// Prefix for local key entries (one prefix per device)
    #[arg(long, global = true)]
    key_prefix: Option<String>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Publish a first card for the identity
    Register {
        #[command(flatten)]
        card: CardOptions,
    },

    /// Replace a card with one for a fresh key (local key must be cleaned up first)
    Rotate {
        #[command(flatten)]
        card: CardOptions,
    },

    /// Revoke a card and delete the local key
    Unregister {
        /// Which card to revoke: all, account, or device:<id>
        #[arg(long, default_value = "all")]
        filter: CardFilter,
    },

    /// Delete the local private key, keeping published cards
    Cleanup,

    /// Show the identity, its local key and its cards
    Whoami,

    /// Find one card per identity
    Find {
        /// Identities to look up
        #[arg(required = true)]
        identities: Vec<String>,

        /// Card filter: all, account, or device:<id>
        #[arg(long, default_value = "all")]
        filter: CardFilter,

        /// Report identities without a card instead of failing
        #[arg(long)]
        allow_missing: bool,

        /// Print JSON
        #[arg(long)]
        json: bool,
    },

    /// List an identity's cards with history and filter verdicts
    Cards {
        /// Identity whose cards to list (default: --identity)
        #[arg(value_name = "IDENTITY")]
        target: Option<String>,

        /// Card filter to evaluate: all, account, or device:<id>
        #[arg(long, default_value = "all")]
        filter: CardFilter,
    },

    /// Revoke a card by ID together with its history
    Revoke {
        /// Card ID (64 lowercase hex characters)
        #[arg(value_parser = parse_card_id)]
        card_id: CardId,
    },

    /// Back up the local private key under a password (read from stdin)
    Backup,

    /// Restore the local private key from its backup (password from stdin)
    Restore,

    /// Change the password of the private key backup
    ChangePassword,

    /// Delete the private key backup without its password
    ResetBackup,
}

/// Card contents shared by `register` and `rotate`.
#[derive(Args, Debug)]
struct CardOptions {
    /// Mark the card as the identity's account card
    #[arg(long, conflicts_with = "device_id")]
    account: bool,

    /// Mark the card as belonging to one device
    #[arg(long)]
    device_id: Option<String>,

    /// Extra signature field, KEY=VALUE (repeatable)
    #[arg(long = "field", value_parser = parse_field)]
    fields: Vec<(String, String)>,

    /// Which existing cards count (default: device:<id>, account, or all)
    #[arg(long)]
    filter: Option<CardFilter>,
}

impl CardOptions {
    /// Extra fields for the self signature.
    ///
    /// A `--field` may not set a marker that `--account` or `--device-id`
    /// also sets, and each key may be given once.
    fn additional_data(&self) -> Result<BTreeMap<String, String>> {
        let mut data = BTreeMap::new();
        for (key, value) in &self.fields {
            if data.insert(key.clone(), value.clone()).is_some() {
                bail!("--field {key} given more than once");
            }
        }

        let mut markers = Vec::new();
        if self.account {
            markers.push(("--account", ACCOUNT_CARD_FIELD, "true".to_string()));
        }
        if let Some(device_id) = &self.device_id {
            markers.push(("--device-id", ACCOUNT_CARD_FIELD, "false".to_string()));
            markers.push(("--device-id", IDENTITY_ID_FIELD, device_id.clone()));
        }
        for (flag, key, value) in markers {
            if data.contains_key(key) {
                bail!("--field {key} conflicts with {flag}, which sets {key} itself");
            }
            data.insert(key.to_string(), value);
        }
        Ok(data)
    }

    /// Filter deciding which existing cards count.
    fn filter(&self) -> CardFilter {
        if let Some(filter) = &self.filter {
            return filter.clone();
        }
        match &self.device_id {
            Some(id) => CardFilter::device_id(id.clone()),
            None if self.account => CardFilter::Account,
            None => CardFilter::All,
        }
    }
}

fn parse_field(s: &str) -> std::result::Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got '{s}'")),
    }
}

fn parse_card_id(s: &str) -> std::result::Result<CardId, String> {
    CardId::parse(s).map_err(|e| e.to_string())
}

// ── Main entry point ──────────────────────────────────────────────────────────

fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    let result = run(cli);
    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = resolve_config(cli.home, cli.key_prefix)?;
    let verbose = cli.verbose;
    let identity = cli.identity;

    match cli.command {
        Commands::Register { card } => cmd_register(&config, &identity, &card, verbose),
        Commands::Rotate { card } => cmd_rotate(&config, &identity, &card, verbose),
        Commands::Unregister { filter } => cmd_unregister(&config, &identity, &filter),
        Commands::Cleanup => cmd_cleanup(&config, &identity),
        Commands::Whoami => cmd_whoami(&config, &identity, verbose),
        Commands::Find {
            identities,
            filter,
            allow_missing,
            json,
        } => cmd_find(&config, &identity, &identities, &filter, allow_missing, json),
        Commands::Cards { target, filter } => {
            let target = target.unwrap_or_else(|| identity.clone());
            cmd_cards(&config, &identity, &target, &filter, verbose)
        }
        Commands::Revoke { card_id } => cmd_revoke(&config, &identity, &card_id),
        Commands::Backup => cmd_backup(&config, &identity),
        Commands::Restore => cmd_restore(&config, &identity),
        Commands::ChangePassword => cmd_change_password(&config, &identity),
        Commands::ResetBackup => cmd_reset_backup(&config, &identity),
    }
}

fn resolve_config(home: Option<PathBuf>, key_prefix: Option<String>) -> Result<ClientConfig> {
    let config = match home {
        Some(dir) => ClientConfig::new(dir),
        None => ClientConfig::from_env().context("failed to resolve card home directory")?,
    };
    let config = match key_prefix {
        Some(prefix) => config.with_key_prefix(prefix),
        None => config,
    };
    log::debug!(
        "card home {} (key prefix '{}')",
        config.root_dir.display(),
        config.key_prefix
    );
    Ok(config)
}

fn open_client(config: &ClientConfig, identity: &str) -> Result<CardClient> {
    CardClient::open(config, identity)
        .with_context(|| format!("failed to open card client for '{identity}'"))
}

// ── Command implementations ───────────────────────────────────────────────────

/// `cardid register [--account | --device-id ID] [--field K=V]... [--filter F]`
fn cmd_register(
    config: &ClientConfig,
    identity: &str,
    opts: &CardOptions,
    verbose: bool,
) -> Result<()> {
    let additional_data = opts.additional_data()?;
    let mut client = open_client(config, identity)?;
    let filter = opts.filter();
    let card = client
        .register(None, &filter, additional_data)
        .with_context(|| format!("failed to register '{identity}' (filter {filter})"))?;

    println!("Registered '{identity}'");
    print_card(&card, verbose);
    Ok(())
}

/// `cardid rotate [--account | --device-id ID] [--field K=V]... [--filter F]`
fn cmd_rotate(
    config: &ClientConfig,
    identity: &str,
    opts: &CardOptions,
    verbose: bool,
) -> Result<()> {
    let additional_data = opts.additional_data()?;
    let mut client = open_client(config, identity)?;
    if client.has_local_private_key() {
        return Err(anyhow!(
            "a local private key for '{identity}' still exists; run `cardid cleanup` first"
        ));
    }
    let filter = opts.filter();
    let card = client
        .rotate_private_key(additional_data, &filter)
        .with_context(|| format!("failed to rotate '{identity}' (filter {filter})"))?;

    println!("Rotated '{identity}'");
    print_card(&card, verbose);
    Ok(())
}

/// `cardid unregister [--filter F]`
fn cmd_unregister(config: &ClientConfig, identity: &str, filter: &CardFilter) -> Result<()> {
    let mut client = open_client(config, identity)?;
    let revoked = client
        .unregister(filter)
        .with_context(|| format!("failed to unregister '{identity}'"))?;

    println!("Unregistered '{identity}' ({} card(s) revoked)", revoked.len());
    for id in revoked {
        println!("  {id}");
    }
    Ok(())
}

/// `cardid cleanup`
fn cmd_cleanup(config: &ClientConfig, identity: &str) -> Result<()> {
    let mut client = open_client(config, identity)?;
    client
        .cleanup()
        .with_context(|| format!("failed to delete local key of '{identity}'"))?;
    println!("Deleted local private key of '{identity}'");
    Ok(())
}

/// `cardid whoami`
fn cmd_whoami(config: &ClientConfig, identity: &str, verbose: bool) -> Result<()> {
    let client = open_client(config, identity)?;

    println!("Identity: {identity}");
    println!("  Home:      {}", config.root_dir.display());
    println!("  Key entry: {}", client.local_keys().key_name());
    if client.has_local_private_key() {
        let key_pair = client.local_key_pair().context("failed to load local key")?;
        println!("  Key ID:    {}", key_pair.key_id());
    } else {
        println!("  Key ID:    (no local private key)");
    }

    let cards = client.own_cards().context("failed to search cards")?;
    println!("  Cards:     {}", cards.len());
    for card in &cards {
        print_card(card, verbose);
    }
    Ok(())
}

/// `cardid find IDENTITY... [--filter F] [--allow-missing] [--json]`
fn cmd_find(
    config: &ClientConfig,
    identity: &str,
    identities: &[String],
    filter: &CardFilter,
    allow_missing: bool,
    json: bool,
) -> Result<()> {
    let mut client = open_client(config, identity)?;
    let found = client
        .find_users(identities, true, !allow_missing, filter)
        .context("lookup failed")?;

    if json {
        let out = serde_json::to_string_pretty(&found).context("failed to serialize cards")?;
        println!("{out}");
        return Ok(());
    }

    for name in identities {
        match found.get(name) {
            Some(card) => {
                println!("{name}: {}", card.id);
                println!("  Public Key: {}", card.public_key);
            }
            None => println!("{name}: (no card accepted by {filter})"),
        }
    }
    Ok(())
}

/// `cardid cards [IDENTITY] [--filter F]`
fn cmd_cards(
    config: &ClientConfig,
    identity: &str,
    target: &str,
    filter: &CardFilter,
    verbose: bool,
) -> Result<()> {
    let client = open_client(config, identity)?;
    let cards = client
        .card_manager()
        .search_cards(target)
        .with_context(|| format!("failed to search cards of '{target}'"))?;

    if cards.is_empty() {
        println!("No cards for '{target}'");
        return Ok(());
    }

    println!("Cards of '{target}' (filter {filter}):");
    for card in &cards {
        for (depth, entry) in card.history().enumerate() {
            let verdict = if filter.accepts(entry) { "accept" } else { "reject" };
            let state = if entry.is_outdated { "outdated" } else { "current" };
            let indent = "  ".repeat(depth + 1);
            println!("{indent}{} [{state}] {verdict}", entry.id);
            if verbose {
                print_extra_fields(entry, &indent);
            }
        }
    }
    Ok(())
}

/// `cardid revoke CARD_ID`
fn cmd_revoke(config: &ClientConfig, identity: &str, card_id: &CardId) -> Result<()> {
    let client = open_client(config, identity)?;
    let revoked = client
        .card_manager()
        .revoke_card(card_id)
        .with_context(|| format!("failed to revoke card {card_id}"))?;

    println!("Revoked {} card(s)", revoked.len());
    for id in revoked {
        println!("  {id}");
    }
    Ok(())
}

/// `cardid backup`
fn cmd_backup(config: &ClientConfig, identity: &str) -> Result<()> {
    let client = open_client(config, identity)?;
    if !client.has_local_private_key() {
        bail!("no local private key for '{identity}' to back up");
    }
    let password = read_new_password("Backup password: ")?;
    client
        .backup_private_key(&password)
        .with_context(|| format!("failed to back up the private key of '{identity}'"))?;
    println!("Backed up private key of '{identity}'");
    println!("  Backup: {}", client.key_backups().name());
    Ok(())
}

/// `cardid restore`
fn cmd_restore(config: &ClientConfig, identity: &str) -> Result<()> {
    let mut client = open_client(config, identity)?;
    if !client.has_private_key_backup() {
        bail!("no private key backup for '{identity}'");
    }
    let password = read_password("Backup password: ")?;
    let key_pair = client
        .restore_private_key(&password)
        .with_context(|| format!("failed to restore the private key of '{identity}'"))?;
    println!("Restored private key of '{identity}'");
    println!("  Key ID: {}", key_pair.key_id());
    Ok(())
}

/// `cardid change-password`
fn cmd_change_password(config: &ClientConfig, identity: &str) -> Result<()> {
    let client = open_client(config, identity)?;
    if !client.has_private_key_backup() {
        bail!("no private key backup for '{identity}'");
    }
    let old_password = read_password("Current backup password: ")?;
    let new_password = read_new_password("New backup password: ")?;
    client
        .change_password(&old_password, &new_password)
        .context("failed to change the backup password")?;
    println!("Changed backup password of '{identity}'");
    Ok(())
}

/// `cardid reset-backup`
fn cmd_reset_backup(config: &ClientConfig, identity: &str) -> Result<()> {
    let client = open_client(config, identity)?;
    client
        .reset_private_key_backup()
        .with_context(|| format!("failed to delete the private key backup of '{identity}'"))?;
    println!("Deleted private key backup of '{identity}'");
    Ok(())
}

// ── Password helpers ──────────────────────────────────────────────────────────

/// Prompt on stderr and read one line from stdin.
fn read_password(prompt: &str) -> Result<String> {
    eprint!("{prompt}");
    std::io::stderr().flush().ok();
    let mut line = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut line)
        .context("failed to read password")?;
    let password = line.trim_end_matches(['\r', '\n']).to_string();
    if password.is_empty() {
        bail!("password cannot be empty");
    }
    Ok(password)
}

/// Read a password twice and require both to match.
fn read_new_password(prompt: &str) -> Result<String> {
    let password = read_password(prompt)?;
    let confirm = read_password("Confirm password: ")?;
    if password != confirm {
        bail!("passwords do not match");
    }
    Ok(password)
}

// ── Output helpers ────────────────────────────────────────────────────────────

fn print_card(card: &Card, verbose: bool) {
    println!("  Card:       {}", card.id);
    println!("  Created:    {}", secs_to_rfc3339(card.created_at));
    if let Some(previous) = &card.previous_card_id {
        println!("  Replaces:   {previous}");
    }
    if verbose {
        println!("  Public Key: {}", card.public_key);
        print_extra_fields(card, "  ");
    }
}

fn print_extra_fields(card: &Card, indent: &str) {
    for sig in &card.signatures {
        for (key, value) in &sig.extra_fields {
            println!("{indent}  {}.{key} = {value}", sig.signer);
        }
    }
}
