use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
pub struct Cli {
    /// enable debug output
    #[clap(long, short)]
    pub debug: bool,

    /// Use json-formatted output
    #[clap(long, short)]
    pub json: bool,

    /// Bridge serial number or 'auto'
    #[clap(long, short, default_value = "auto")]
    pub serial: String,

    /// I2C bus frequency, Hz
    #[clap(long, short = 'F', default_value_t = 100_000)]
    pub frequency: u32,

    /// Device configuration file (json)
    #[clap(long, short)]
    pub config: Option<PathBuf>,

    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List attached usb bridges
    Scan,

    /// Run a single poll cycle
    Poll,

    /// Poll continuously at a fixed cadence
    Monitor {
        /// Poll interval, milliseconds
        #[clap(long, short, default_value_t = 1000)]
        interval: u64,

        /// Minimum pause between cycles, milliseconds
        #[clap(long, short = 'm', default_value_t = 0)]
        min_delay: u64,
    },
}
