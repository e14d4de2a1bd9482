// Version information constants
const VERSION: &str = env!("CARGO_PKG_VERSION");

use std::error::Error;
use std::io::{BufWriter, Write};

use clap::{Parser, Subcommand};

mod aggregate;
mod error;
mod plot;
mod progress;
mod record;
mod stats;

/// Logger writing timestamped lines to a per-command log file
pub struct Logger {
    writer: BufWriter<std::fs::File>,
}

impl Logger {
    pub fn new(file: std::fs::File) -> Self {
        Self {
            writer: BufWriter::new(file),
        }
    }

    /// Record detailed log information
    pub fn log(&mut self, message: &str) -> std::io::Result<()> {
        let timestamp = chrono::Utc::now().format("%Y-%m-%d %H:%M:%S");
        writeln!(self.writer, "[{}] {}", timestamp, message)?;
        self.writer.flush()?;
        Ok(())
    }
}

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Aggregate per-cohort mutation TSVs into cohort and global statistics
    Aggregate(aggregate::AggregateArgs),
    /// Render distribution charts from aggregated statistics
    Plot(plot::PlotArgs),
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Aggregate(args) => {
            // Set up log file
            let log_file = if let Some(log_path) = &args.log {
                std::fs::File::create(log_path)?
            } else {
                std::fs::File::create("aggregate.log")?
            };
            let mut logger = Logger::new(log_file);

            let result = aggregate::aggregate_cohorts(&args, &mut logger);

            match &result {
                Ok(_) => logger.log("Cohort aggregation completed")?,
                Err(e) => logger.log(&format!("Cohort aggregation failed: {}", e))?,
            }

            result
        }
        Commands::Plot(args) => {
            let log_file = if let Some(log_path) = &args.log {
                std::fs::File::create(log_path)?
            } else {
                std::fs::File::create("plot.log")?
            };
            let mut logger = Logger::new(log_file);

            let result = plot::plot_charts(&args, &mut logger);

            match &result {
                Ok(_) => logger.log("Chart rendering completed")?,
                Err(e) => logger.log(&format!("Chart rendering failed: {}", e))?,
            }

            result
        }
    }
}
