use std::path::{Path, PathBuf};

use clap::Parser;
use eyre::{Context, Result};
use futures::executor::block_on;
use log::{info, warn};

use probestation_core::scheduler::DeviceIndex;
use probestation_scan::cli::{Cli, Command};
use probestation_scan::{MotionEngine, ScanConfig, Scanner};

/// Config file picked up from the working directory
const DEFAULT_CONFIG: &str = "probestation.toml";

fn setup_logging() -> Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();
    Ok(())
}

fn load_config(path: Option<&PathBuf>) -> Result<ScanConfig> {
    match path {
        Some(path) => ScanConfig::load(path).context("Failed to load configuration"),
        None if Path::new(DEFAULT_CONFIG).exists() => {
            ScanConfig::load(Path::new(DEFAULT_CONFIG)).context("Failed to load configuration")
        }
        None => {
            info!("No {} found, using defaults", DEFAULT_CONFIG);
            Ok(ScanConfig::default())
        }
    }
}

fn main() -> Result<()> {
    setup_logging().context("Failed to setup logging")?;

    let cli = Cli::parse();

    match cli.command {
        Command::Scan { wafer, save_root } => {
            let mut config = load_config(cli.config.as_ref())?;
            if let Some(wafer) = wafer {
                config.wafer.name = wafer;
            }
            if let Some(save_root) = save_root {
                config.wafer.save_root = save_root;
            }

            let scanner = Scanner::simulated(config);
            let handle = scanner.start_simulated().context("Failed to start scan")?;

            // Ctrl-C stops the stage and drains the scan instead of killing it
            let abort = handle.abort_coordinator();
            ctrlc::set_handler(move || {
                warn!("Interrupted, aborting scan");
                block_on(abort.abort_all());
            })
            .context("Failed to install Ctrl-C handler")?;

            let summary = handle.join().context("Scan failed")?;

            let report = &summary.report;
            println!("Scan directory: {}", summary.producer.scan_root.display());
            println!(
                "{} devices: {} passed, {} failed{}",
                report.devices.len(),
                report.passed(),
                report.failed(),
                if report.aborted { " (aborted)" } else { "" }
            );
            for record in &report.devices {
                println!("  {:<12} {}", record.name, record.outcome.label());
            }
        }
        Command::CheckConfig { path } => {
            let config = ScanConfig::load(&path).context("Invalid configuration")?;
            println!(
                "{}: ok (wafer {}, {} devices)",
                path.display(),
                config.wafer.name,
                config.wafer.dims().device_count()
            );
        }
        Command::Target {
            chip_col,
            chip_row,
            dev_col,
            dev_row,
        } => {
            let config = load_config(cli.config.as_ref())?;
            let dims = config.wafer.dims();
            let index = DeviceIndex::new(chip_col, chip_row, dev_col, dev_row);
            if !dims.contains(&index) {
                eyre::bail!("device {} is outside the {:?} grid", index.name(), dims);
            }

            let engine = MotionEngine::simulated(&config.stage, config.timing.motion());
            block_on(engine.compute_axis_delta(&dims));
            let target = block_on(engine.compute_target_coordinates(index))
                .context("Failed to compute target")?;
            println!(
                "{}: x {}/{} y {}/{} z {}/{}",
                index.name(),
                target.x.coarse,
                target.x.fine,
                target.y.coarse,
                target.y.fine,
                target.z.coarse,
                target.z.fine
            );
        }
    }

    Ok(())
}
