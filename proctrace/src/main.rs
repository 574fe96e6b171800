use clap::Parser;
use proctrace::channel::{NetlinkTransport, Transport};
use proctrace::config::{AppConfig, OutputFormat};
use proctrace::core_logic;
use proctrace::daemon_handler::run_as_daemon;
use proctrace::logger;
use proctrace::report::{LineReporter, LogReporter};
use std::env;
use std::path::PathBuf;

/// Command line options for proctrace
#[derive(Debug, Parser)]
#[command(author, version, about = "Reports every process exec on this host", long_about = None)]
struct Cli {
    /// Path to configuration file (YAML). If not provided, search order applies.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Detach from the terminal and log events to the configured log directory
    #[arg(long)]
    daemon: bool,

    /// Output format for event lines, overrides the config file
    #[arg(long, value_enum)]
    format: Option<OutputFormat>,

    /// Also report process exits
    #[arg(long)]
    exits: bool,

    /// Append the resolved executable path to each exec line
    #[arg(long)]
    show_exe: bool,

    /// Print the path that was selected for configuration and exit
    #[arg(long)]
    print_config_path: bool,
}

fn candidate_config_paths() -> Vec<PathBuf> {
    let mut cands = Vec::new();
    cands.push(PathBuf::from("./proctrace.yaml"));
    cands.push(PathBuf::from("/etc/proctrace/config.yaml"));
    if let Ok(home) = env::var("XDG_CONFIG_HOME") {
        cands.push(PathBuf::from(home).join("proctrace/config.yaml"));
    }
    if let Some(home_dir) = dirs_next::home_dir() {
        cands.push(home_dir.join(".config/proctrace/config.yaml"));
    }
    cands
}

fn resolve_config_path(cli: &Cli) -> PathBuf {
    if let Some(explicit) = &cli.config {
        return explicit.clone();
    }
    if let Ok(env_path) = env::var("PROCTRACE_CONFIG") {
        return PathBuf::from(env_path);
    }
    for cand in candidate_config_paths() {
        if cand.exists() {
            return cand;
        }
    }
    // nothing found: defaults apply, this path only shows up in messages
    PathBuf::from("/etc/proctrace/config.yaml")
}

fn apply_overrides(cli: &Cli, config: &mut AppConfig) {
    if let Some(format) = cli.format {
        config.output.format = format;
    }
    if cli.exits {
        config.output.report_exits = true;
    }
    if cli.show_exe {
        config.output.show_exe = true;
    }
}

fn main() {
    let cli = Cli::parse();

    let config_path = resolve_config_path(&cli);
    if cli.print_config_path {
        println!("{}", config_path.display());
        return;
    }

    let mut config = match AppConfig::load_or_default(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };
    apply_overrides(&cli, &mut config);

    if cli.daemon {
        // fail before detaching, nobody would see the error afterwards
        if !NetlinkTransport::default().has_privilege() {
            eprintln!("Error: You must be root.");
            std::process::exit(1);
        }
        let daemon_config = config.to_daemonize_config();
        let outcome = run_as_daemon(&daemon_config, config.log_level.as_deref(), || {
            core_logic::run_monitor(&config, LogReporter)
        });
        match outcome {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => {
                tracing::error!("Core logic error: {:#}", e);
                std::process::exit(1);
            }
            Err(e) => {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
        }
        return;
    }

    if let Err(e) = logger::init_foreground_logging(config.log_level.as_deref()) {
        eprintln!("Warning: {}", e);
    }
    tracing::debug!("Config resolution: using {:?}", config_path);

    let reporter = LineReporter::new(
        std::io::stdout(),
        config.output.format,
        config.output.show_exe,
    );
    if let Err(e) = core_logic::run_monitor(&config, reporter) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
