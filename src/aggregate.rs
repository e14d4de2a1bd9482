use clap::Args;
use rayon::prelude::*;
use std::error::Error;
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Instant;

use crate::progress::{format_time_used, DescriptiveProgress};
use crate::record::{parse_record, REQUIRED_COLUMNS};
use crate::stats::{merge_all, CohortStatistics};

/// Recognized cohort sources end in this fixed suffix; the file name minus
/// the suffix is the cohort's cancer-type label.
const SOURCE_SUFFIX: &str = ".tsv";

/// Label of the synthesized global cohort.
pub const AGGREGATE_LABEL: &str = "aggregate";

#[derive(Args, Debug)]
pub struct AggregateArgs {
    /// Input directory containing one TSV file per cohort
    #[arg(short = 'i', long = "input")]
    pub input: String,
    /// Output directory for per-cohort statistics CSVs
    #[arg(short = 'o', long = "output")]
    pub output: String,
    /// Number of parallel threads
    #[arg(short = 't', long = "threads")]
    pub threads: Option<usize>,
    /// Log file path (optional)
    #[arg(short = 'l', long = "log")]
    pub log: Option<String>,
}

/// Validate aggregate command arguments
fn validate_aggregate_args(args: &AggregateArgs) -> Result<(), Box<dyn Error>> {
    if args.input.trim().is_empty() {
        return Err("Error: Input directory cannot be empty".into());
    }
    let input = Path::new(&args.input);
    if !input.exists() {
        return Err(format!("Error: Input directory does not exist: {}", args.input).into());
    }
    if !input.is_dir() {
        return Err(format!("Error: Input path is not a directory: {}", args.input).into());
    }
    if args.output.trim().is_empty() {
        return Err("Error: Output directory cannot be empty".into());
    }
    Ok(())
}

/// One cohort input source discovered in the input directory.
#[derive(Debug, Clone)]
struct CohortSource {
    label: String,
    path: PathBuf,
}

/// Enumerate cohort sources. Entries that are not regular files ending in
/// the source suffix are skipped without error. Failure to read the
/// directory itself is fatal for the batch.
fn discover_sources(dir: &Path) -> io::Result<Vec<CohortSource>> {
    let mut sources = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if let Some(label) = name.strip_suffix(SOURCE_SUFFIX) {
            if !label.is_empty() {
                sources.push(CohortSource {
                    label: label.to_string(),
                    path,
                });
            }
        }
    }
    sources.sort_by(|a, b| a.label.cmp(&b.label));
    Ok(sources)
}

/// Column indices of the four required fields within a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ColumnLayout {
    protein: usize,
    dna: usize,
    consequence: usize,
    cases: usize,
}

impl ColumnLayout {
    /// Fallback for headerless sources: the required fields occupy the
    /// first four columns in their canonical order.
    fn default_order() -> Self {
        Self {
            protein: 0,
            dna: 1,
            consequence: 2,
            cases: 3,
        }
    }

    fn max_index(&self) -> usize {
        self.protein
            .max(self.dna)
            .max(self.consequence)
            .max(self.cases)
    }
}

/// Resolve the column layout from a header row. Returns None unless all
/// four required column names are present, in which case the line was not
/// a header and must be treated as data.
fn resolve_columns(header: &str) -> Option<ColumnLayout> {
    let fields: Vec<&str> = header.split('\t').map(str::trim).collect();
    let position = |name: &str| fields.iter().position(|field| *field == name);
    Some(ColumnLayout {
        protein: position(REQUIRED_COLUMNS[0])?,
        dna: position(REQUIRED_COLUMNS[1])?,
        consequence: position(REQUIRED_COLUMNS[2])?,
        cases: position(REQUIRED_COLUMNS[3])?,
    })
}

/// Per-cohort row accounting. Skipped rows are the documented non-error
/// filter (missing protein/DNA change, short rows); rejected rows failed
/// validation or the chromosome lookup and are reported in the log.
#[derive(Debug, Default)]
struct RowTally {
    read: usize,
    skipped: usize,
    rejected: usize,
    rejects: Vec<String>,
}

impl RowTally {
    fn tallied(&self) -> usize {
        self.read - self.skipped - self.rejected
    }
}

/// Parse and aggregate one cohort source into a fresh statistics value.
fn process_cohort(
    path: &Path,
) -> Result<(CohortStatistics, RowTally), Box<dyn Error + Send + Sync>> {
    let file =
        File::open(path).map_err(|e| format!("cannot open {}: {}", path.display(), e))?;
    let reader = BufReader::new(file);

    let mut stats = CohortStatistics::new();
    let mut tally = RowTally::default();
    let mut layout = ColumnLayout::default_order();
    let mut first_line = true;

    for (line_index, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| format!("read error in {}: {}", path.display(), e))?;
        let line = line.trim_end_matches('\r');

        if first_line {
            first_line = false;
            if let Some(resolved) = resolve_columns(line) {
                layout = resolved;
                continue;
            }
        }
        if line.is_empty() {
            continue;
        }

        tally.read += 1;
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() <= layout.max_index() {
            // Short row: same data-quality filter as a missing field.
            tally.skipped += 1;
            continue;
        }

        let parsed = parse_record(
            fields[layout.protein],
            fields[layout.dna],
            fields[layout.consequence],
            fields[layout.cases],
        );
        match parsed {
            Ok(None) => tally.skipped += 1,
            Ok(Some(record)) => {
                if let Err(e) = stats.add_record(&record) {
                    tally.rejected += 1;
                    tally.rejects.push(format!("row {}: {}", line_index + 1, e));
                }
            }
            Err(e) => {
                tally.rejected += 1;
                tally.rejects.push(format!("row {}: {}", line_index + 1, e));
            }
        }
    }

    Ok((stats, tally))
}

/// Write one statistics export in the section,key,count format consumed by
/// the plot command. Chromosomes are written in karyotype order, the other
/// sections by descending count.
pub fn write_statistics(path: &Path, stats: &CohortStatistics) -> io::Result<()> {
    let mut out = BufWriter::new(File::create(path)?);
    writeln!(out, "section,key,count")?;
    writeln!(out, "summary,total_cases,{}", stats.total_cases)?;
    writeln!(out, "summary,total_substitutions,{}", stats.total_substitutions)?;
    writeln!(out, "summary,transitions,{}", stats.transitions)?;
    writeln!(out, "summary,transversions,{}", stats.transversions)?;
    for (chromosome, count) in stats.chromosome_counts.iter_ordered() {
        writeln!(out, "chromosome,{},{}", chromosome, count)?;
    }
    for (key, count) in stats.protein_counts.sorted_desc() {
        writeln!(out, "protein,{},{}", key, count)?;
    }
    for (key, count) in stats.consequence_counts.sorted_desc() {
        writeln!(out, "consequence,{},{}", key, count)?;
    }
    for (key, count) in stats.substitution_counts.sorted_desc() {
        writeln!(out, "substitution,{},{}", key, count)?;
    }
    out.flush()
}

pub fn aggregate_cohorts(
    args: &AggregateArgs,
    logger: &mut crate::Logger,
) -> Result<(), Box<dyn Error>> {
    validate_aggregate_args(args)?;

    let start_time = Instant::now();

    logger.log("=== MutaScope Aggregate Function Log ===")?;
    logger.log(&format!("Software Version: v{}", crate::VERSION))?;
    logger.log(&format!(
        "Runtime: {}",
        chrono::Utc::now().format("%Y-%m-%d %H:%M:%S")
    ))?;
    logger.log(&format!("Input Directory: {}", args.input))?;
    logger.log(&format!("Output Directory: {}", args.output))?;

    let input_dir = Path::new(&args.input);
    let sources = discover_sources(input_dir)
        .map_err(|e| format!("cannot enumerate input directory {}: {}", args.input, e))?;
    if sources.is_empty() {
        return Err(format!("no {} cohort sources found in {}", SOURCE_SUFFIX, args.input).into());
    }

    println!("[Loading data]");
    println!("    Input directory: {}", args.input);
    println!("    Cohort sources: {}", sources.len());
    println!();

    let num_threads = args.threads.unwrap_or_else(|| {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4)
    });
    logger.log(&format!("Threads: {}", num_threads))?;
    logger.log(&format!("Cohort sources: {}", sources.len()))?;
    logger.log("Starting cohort aggregation...")?;

    println!("[Params]");
    println!("    Threads: {}.", num_threads);
    println!("    Output directory: {}", args.output);
    println!();

    let output_dir = Path::new(&args.output);
    fs::create_dir_all(output_dir)?;

    // Map: each cohort folds its own fresh statistics on a worker. Only the
    // progress display is shared, never the tallies.
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(num_threads)
        .build()?;
    let progress = Mutex::new(DescriptiveProgress::new(
        sources.len(),
        "[Progressing] Aggregating cohorts",
    ));
    let completed = AtomicUsize::new(0);

    let outcomes: Vec<(String, Result<(CohortStatistics, RowTally), String>)> =
        pool.install(|| {
            sources
                .par_iter()
                .map(|source| {
                    let outcome = process_cohort(&source.path).map_err(|e| e.to_string());
                    let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                    if let Ok(mut progress) = progress.lock() {
                        let _ = progress.update(done);
                    }
                    (source.label.clone(), outcome)
                })
                .collect()
        });
    if let Ok(mut progress) = progress.lock() {
        let _ = progress.finish();
    }

    let mut cohorts: Vec<(String, CohortStatistics)> = Vec::new();
    let mut failed = 0usize;
    for (label, outcome) in outcomes {
        match outcome {
            Ok((stats, tally)) => {
                logger.log(&format!(
                    "Cohort '{}': {} rows read, {} tallied, {} skipped, {} rejected, {} cases",
                    label,
                    tally.read,
                    tally.tallied(),
                    tally.skipped,
                    tally.rejected,
                    stats.total_cases
                ))?;
                for reject in &tally.rejects {
                    logger.log(&format!("Cohort '{}' rejected {}", label, reject))?;
                }
                cohorts.push((label, stats));
            }
            Err(message) => {
                failed += 1;
                println!("[Warning] cohort '{}' failed: {}", label, message);
                logger.log(&format!("Cohort '{}' failed: {}", label, message))?;
            }
        }
    }

    if cohorts.is_empty() {
        return Err(format!("no cohort could be processed from {}", args.input).into());
    }

    // Reduce: pure fold over the frozen per-cohort results.
    let global = merge_all(cohorts.iter().map(|(_, stats)| stats));

    if cohorts.iter().any(|(label, _)| label == AGGREGATE_LABEL) {
        println!(
            "[Warning] input cohort '{}' collides with the global export and is overwritten",
            AGGREGATE_LABEL
        );
        logger.log(&format!(
            "Input cohort '{}' collides with the global export",
            AGGREGATE_LABEL
        ))?;
    }

    for (label, stats) in &cohorts {
        let path = output_dir.join(format!("{}.stats.csv", label));
        write_statistics(&path, stats)?;
    }
    write_statistics(
        &output_dir.join(format!("{}.stats.csv", AGGREGATE_LABEL)),
        &global,
    )?;

    let elapsed = start_time.elapsed();
    println!("[Output]");
    println!(
        "    Statistics: {} ({} cohorts + {})",
        args.output,
        cohorts.len(),
        AGGREGATE_LABEL
    );
    if failed > 0 {
        println!("    Failed cohorts: {}", failed);
    }
    println!(
        "    Total cases: {} across {} substitution events ({} transitions / {} transversions)",
        global.total_cases, global.total_substitutions, global.transitions, global.transversions
    );
    println!("{}", format_time_used(elapsed));

    logger.log(&format!(
        "Aggregation completed: {} cohorts exported, {} failed, global total cases {}",
        cohorts.len(),
        failed,
        global.total_cases
    ))?;
    logger.log(&format!("Total time: {:.2}s", elapsed.as_secs_f64()))?;

    Ok(())
}
