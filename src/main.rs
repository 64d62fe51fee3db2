//! Binary entrypoint for the playerdb admin CLI.
//!
//! Commands:
//! - `init` - write a starter `config.toml`
//! - `status` - print player and ban counts
//! - `who` / `list [--like <pattern>]` / `whois <name>` - inspect the roster
//! - `ban <key> [--reason <text>]` / `unban <key>` / `bans` - manage bans
//! - `set-level <name> <level>` - change a player's access level (number or rank name)
//! - `delete <name>` - permanently remove a player
//!
//! See the library crate docs for module‑level details: `playerdb::`.
use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use log::info;

use playerdb::access::roles;
use playerdb::config::Config;
use playerdb::logutil::LogSinks;
use playerdb::storage::{PlayerHandle, PlayerStore};

#[derive(Parser)]
#[command(name = "playerdb")]
#[command(about = "Player identity, session and ban store for a game server proxy")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path (can be used before or after subcommand)
    #[arg(short, long, default_value = "config.toml", global = true)]
    config: String,

    /// Verbose logging (-v, -vv for more; may appear before or after subcommand)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file
    Init,
    /// Show store statistics
    Status,
    /// List players currently logged in
    Who,
    /// List known players
    List {
        /// Only names matching this pattern (% and _ wildcards)
        #[arg(short, long)]
        like: Option<String>,
    },
    /// Show everything stored about one player
    Whois { name: String },
    /// Ban an IP address or org name
    Ban {
        key: String,
        #[arg(short, long)]
        reason: Option<String>,
    },
    /// Lift a ban
    Unban { key: String },
    /// List bans
    Bans,
    /// Set a player's access level
    SetLevel { name: String, level: String },
    /// Permanently delete a player
    Delete { name: String },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Commands::Init = cli.command {
        init_logging(&None, cli.verbose);
        Config::create_default(&cli.config)?;
        info!("Configuration file created at {}", cli.config);
        return Ok(());
    }

    let config = Config::load(&cli.config)?;
    init_logging(&Some(config.clone()), cli.verbose);
    let store = PlayerStore::new(&config)?;

    match cli.command {
        Commands::Init => {}
        Commands::Status => {
            println!("players: {}", store.player_count());
            println!("online:  {}", store.who()?.len());
            println!("bans:    {}", store.ban_count());
        }
        Commands::Who => {
            for player in store.who()? {
                print_row(&player)?;
            }
        }
        Commands::List { like } => {
            let players = match like {
                Some(pattern) => store.all_like(&pattern)?,
                None => store.all()?,
            };
            for player in players {
                print_row(&player)?;
            }
        }
        Commands::Whois { name } => match store.whois(&name)? {
            Some(player) => {
                println!("{}", serde_json::to_string_pretty(&player)?);
                if let Some(handle) = store.get_by_uuid(&player.uuid)? {
                    let ips: Vec<String> = handle.ips()?.into_iter().map(|row| row.ip).collect();
                    println!("ips: {}", ips.join(", "));
                }
            }
            None => println!("No player named {}", name),
        },
        Commands::Ban { key, reason } => {
            store.ban(&key, reason.as_deref())?;
            println!("Banned {}", key);
        }
        Commands::Unban { key } => {
            if store.unban(&key)? {
                println!("Unbanned {}", key);
            } else {
                println!("{} was not banned", key);
            }
        }
        Commands::Bans => {
            for ban in store.list_bans()? {
                println!(
                    "{:>6}  {:<40} {}",
                    ban.id,
                    ban.key,
                    ban.reason.unwrap_or_default()
                );
            }
        }
        Commands::SetLevel { name, level } => {
            let level = roles::parse_level(&level)
                .ok_or_else(|| anyhow!("unknown access level '{}'", level))?;
            let player = store
                .get_by_name(&name)?
                .ok_or_else(|| anyhow!("no player named {}", name))?;
            player.set_access_level(level)?;
            info!(target: "security", "Access level of {} set to {}", player.uuid(), level);
            println!("{} is now {} ({})", name, roles::rank_name(level), level);
        }
        Commands::Delete { name } => {
            let player = store
                .get_by_name(&name)?
                .ok_or_else(|| anyhow!("no player named {}", name))?;
            store.delete(&player)?;
            println!("Deleted {}", name);
        }
    }

    Ok(())
}

fn print_row(player: &PlayerHandle) -> Result<()> {
    let p = player.snapshot()?;
    println!(
        "{:<32} {:<24} {:<10} {:<15} {}",
        p.uuid,
        p.name,
        p.rank(),
        p.ip,
        p.last_seen.format("%Y-%m-%d %H:%M")
    );
    Ok(())
}

fn init_logging(config: &Option<Config>, verbosity: u8) {
    use std::io::Write;
    let mut builder = env_logger::Builder::new();
    // Base level from CLI verbosity overrides config
    let base_level = match verbosity {
        0 => config
            .as_ref()
            .and_then(|cfg| cfg.logging.level.parse().ok())
            .unwrap_or(log::LevelFilter::Info),
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    builder.filter_level(base_level);

    let sinks = config
        .as_ref()
        .map(|cfg| LogSinks::from_config(&cfg.logging))
        .unwrap_or_default();
    // Console echo is on without a log file, otherwise only when someone is watching
    let echo = !sinks.has_main_file() || atty::is(atty::Stream::Stdout);
    builder.format(move |fmt, record| {
        let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
        let line = format!("{} [{}] {}", ts, record.level(), record.args());
        sinks.record(record.target(), &line);
        if echo {
            writeln!(fmt, "{}", line)
        } else {
            Ok(())
        }
    });
    let _ = builder.try_init();
}

