//! CLI argument parsing for the probestation

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "probestation")]
#[command(author, version, about = "Automated wafer probing", long_about = None)]
pub struct Cli {
    /// Path to config file (default: ./probestation.toml when present)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Scan the wafer with the simulated stage and source meters
    Scan {
        /// Override the wafer name
        #[arg(short, long)]
        wafer: Option<String>,

        /// Override the directory receiving scan results
        #[arg(short, long)]
        save_root: Option<PathBuf>,
    },

    /// Validate a config file
    CheckConfig {
        #[arg(required = true)]
        path: PathBuf,
    },

    /// Print the stage coordinates of one device
    Target {
        chip_col: u16,
        chip_row: u16,
        dev_col: u16,
        dev_row: u16,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_overrides() {
        let cli = Cli::parse_from(["probestation", "scan", "--wafer", "W7", "--config", "p.toml"]);
        assert_eq!(cli.config, Some(PathBuf::from("p.toml")));
        match cli.command {
            Command::Scan { wafer, save_root } => {
                assert_eq!(wafer.as_deref(), Some("W7"));
                assert!(save_root.is_none());
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_target_indices() {
        let cli = Cli::parse_from(["probestation", "target", "1", "0", "3", "2"]);
        assert!(matches!(
            cli.command,
            Command::Target {
                chip_col: 1,
                chip_row: 0,
                dev_col: 3,
                dev_row: 2
            }
        ));
    }

    #[test]
    fn test_check_config_requires_path() {
        assert!(Cli::try_parse_from(["probestation", "check-config"]).is_err());
    }
}
