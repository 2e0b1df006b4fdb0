mod cli;

use std::io;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use clap_complete::{generate, shells::Bash};
use log::{error, warn};

use lynx_lib::config::DeviceConfig;
use lynx_lib::i2c::{I2cSession, MpsseSession};
use lynx_lib::poller::{self, CycleReport, PollError, PollSchedule, StatusSink};
use lynx_lib::transport::{self, FtdiTransport};

use cli::{Cli, Commands};

enum OutputFormat {
    Plain,
    Json,
}

fn render_cycle(report: &CycleReport, fmt: &OutputFormat) -> Result<String> {
    match fmt {
        OutputFormat::Json => Ok(serde_json::to_string(report)?),
        OutputFormat::Plain => {
            let lines = report
                .distributors
                .iter()
                .map(|entry| {
                    let fuses = entry
                        .report
                        .fuses
                        .iter()
                        .map(|fuse| fuse.status.to_string())
                        .collect::<Vec<String>>()
                        .join(", ");
                    format!(
                        "{}: {} (connection {}) fuses: {}",
                        entry.id, entry.report.status, entry.report.connection_lost_alarm, fuses
                    )
                })
                .collect::<Vec<String>>();
            Ok(lines.join("\n"))
        }
    }
}

fn cmd_scan(fmt: &OutputFormat) -> Result<String> {
    let bridges = transport::list_bridges().context("Failed to enumerate usb bridges")?;
    Ok(match fmt {
        OutputFormat::Json => serde_json::to_string(&bridges)?,
        OutputFormat::Plain => bridges
            .iter()
            .map(|bridge| bridge.to_string())
            .collect::<Vec<String>>()
            .join("\n"),
    })
}

fn open_session(cli: &Cli) -> Result<MpsseSession<FtdiTransport>> {
    let bridge = FtdiTransport::open(&cli.serial).context("Failed to open usb bridge")?;
    let mut session = MpsseSession::new(bridge, cli.frequency);
    session
        .init()
        .context("Bus initialization failed, replug the bridge")?;
    Ok(session)
}

fn load_config(cli: &Cli) -> Result<DeviceConfig> {
    match &cli.config {
        Some(path) => DeviceConfig::load(path),
        None => DeviceConfig::load(Path::new("lynx.json")),
    }
}

fn cmd_poll(session: &mut dyn I2cSession, config: &DeviceConfig, fmt: &OutputFormat) -> Result<String> {
    let report = poller::poll_cycle(session, config).context("Poll cycle failed")?;
    render_cycle(&report, fmt)
}

struct PrintSink {
    fmt: OutputFormat,
}

impl StatusSink for PrintSink {
    fn cycle_complete(&mut self, report: &CycleReport) {
        match render_cycle(report, &self.fmt) {
            Ok(s) => println!("{}", s),
            Err(e) => error!("{:#}", e),
        }
    }

    fn cycle_failed(&mut self, error: &PollError, consecutive_failures: u32) {
        warn!("{:#} ({} consecutive)", error, consecutive_failures);
    }
}

fn cmd_monitor(
    session: &mut dyn I2cSession,
    config: &DeviceConfig,
    fmt: OutputFormat,
    interval: u64,
    min_delay: u64,
) -> Result<String> {
    let schedule = PollSchedule {
        interval: Duration::from_millis(interval),
        min_cycle_delay: Duration::from_millis(min_delay),
    };
    let mut sink = PrintSink { fmt };
    poller::run(session, config, &mut sink, &schedule);
    Ok(String::new())
}

fn do_main() -> Result<String> {
    if std::env::var("GENERATE_COMPLETION").is_ok() {
        generate(Bash, &mut Cli::command(), "lynx-tool", &mut io::stdout());
        return Ok(String::default());
    }

    let cli = Cli::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(if cli.debug {
        "debug"
    } else {
        "info"
    }))
    .format_timestamp(None)
    .format_target(false)
    .init();

    let fmt = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Plain
    };

    match cli.command {
        Commands::Scan => cmd_scan(&fmt),
        Commands::Poll => {
            let config = load_config(&cli)?;
            let mut session = open_session(&cli)?;
            cmd_poll(&mut session, &config, &fmt)
        }
        Commands::Monitor {
            interval,
            min_delay,
        } => {
            let config = load_config(&cli)?;
            let mut session = open_session(&cli)?;
            cmd_monitor(&mut session, &config, fmt, interval, min_delay)
        }
    }
}

fn main() {
    match do_main() {
        Ok(s) => println!("{}", s),
        Err(e) => error!("{:#}", e),
    }
}
