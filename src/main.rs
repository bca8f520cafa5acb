//! CLI entry point for `mailpoll`.

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{CommandFactory, Parser, Subcommand};

use mailpoll::config::{self, Config, GeneralConfig};
use mailpoll::parser::decoder::{DecodeOptions, MailDecoder};
use mailpoll::parser::eml;
use mailpoll::poller::sink::JsonLinesSink;
use mailpoll::poller::{PollLoop, StopSignal};

#[derive(Parser)]
#[command(name = "mailpoll", version, about = "Poll an IMAP mailbox and emit messages as JSON events")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (defaults to $MAILPOLL_CONFIG, then the user config dir)
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Verbose logging (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll the configured mailbox until interrupted
    Run,
    /// Decode a local .eml file and print its event
    Decode {
        path: PathBuf,
        /// Content type of the body part
        #[arg(long, default_value = "text/plain")]
        content_type: String,
        /// Include attachment contents
        #[arg(long)]
        save_attachments: bool,
        /// Keep header names as written
        #[arg(long)]
        keep_header_case: bool,
        /// Pretty-print the JSON
        #[arg(long)]
        pretty: bool,
    },
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Only polling needs a config file
    let config = match cli.command {
        Commands::Run => {
            let path = config::resolve_config_path(cli.config.as_deref())?;
            Some((config::load_config(Some(&path))?, path))
        }
        _ => None,
    };

    let general = config
        .as_ref()
        .map(|(c, _)| c.general.clone())
        .unwrap_or_default();
    let log_level = match cli.verbose {
        0 => general.log_level.as_str(),
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    setup_logging(log_level, &general);
    if let Some((_, path)) = &config {
        tracing::info!(path = %path.display(), "Loaded config");
    }

    match cli.command {
        Commands::Run => match config {
            Some((cfg, _)) => cmd_run(&cfg),
            None => anyhow::bail!("no configuration loaded"),
        },
        Commands::Decode {
            path,
            content_type,
            save_attachments,
            keep_header_case,
            pretty,
        } => {
            let options = DecodeOptions {
                content_type,
                save_attachments,
                lowercase_headers: !keep_header_case,
            };
            cmd_decode(&path, options, pretty)
        }
        Commands::Completions { shell } => cmd_completions(shell),
    }
}

/// Set up tracing with stderr output and optional file logging.
///
/// Stdout is reserved for events.
fn setup_logging(level: &str, general: &GeneralConfig) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    let file_target = general.log_file.as_deref().and_then(|path| {
        let dir = path.parent().filter(|d| !d.as_os_str().is_empty()).unwrap_or(Path::new("."));
        let name = path.file_name()?;
        std::fs::create_dir_all(dir).ok()?;
        Some((dir.to_path_buf(), name.to_os_string()))
    });

    if let Some((dir, name)) = file_target {
        let file_appender = tracing_appender::rolling::never(dir, name);
        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(file_appender);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .with(file_layer)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .init();
    }
}

/// Poll until Ctrl-C or SIGTERM.
fn cmd_run(cfg: &Config) -> anyhow::Result<()> {
    let connector = cfg.connector();
    let addr = connector.preflight()?;
    tracing::debug!(%addr, "Resolved server address");

    let stop = StopSignal::new();
    let handler_stop = stop.clone();
    ctrlc::set_handler(move || {
        tracing::info!("Stop requested");
        handler_stop.stop();
    })
    .context("installing signal handler")?;

    let sink = JsonLinesSink::new(std::io::stdout());
    let decoder = MailDecoder::new(cfg.decode_options());
    let mut poller = PollLoop::new(connector, decoder, sink, cfg.poll_options(), stop);
    let summary = poller.run();

    tracing::info!(
        cycles = summary.cycles,
        emitted = summary.emitted,
        skipped = summary.skipped,
        flag_failures = summary.flag_failures,
        "Finished"
    );
    Ok(())
}

/// Decode one file and print the event to stdout.
fn cmd_decode(path: &Path, options: DecodeOptions, pretty: bool) -> anyhow::Result<()> {
    let decoder = MailDecoder::new(options);
    let event = eml::decode_eml(path, &decoder)?;
    let json = if pretty {
        serde_json::to_string_pretty(&event)?
    } else {
        event.to_json()?
    };
    println!("{json}");
    Ok(())
}

/// Generate shell completions and print to stdout.
fn cmd_completions(shell: clap_complete::Shell) -> anyhow::Result<()> {
    let mut cmd = Cli::command();
    clap_complete::generate(shell, &mut cmd, "mailpoll", &mut std::io::stdout());
    Ok(())
}
