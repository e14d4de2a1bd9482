use clap::Args;
use plotters::prelude::*;
use std::error::Error;
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::aggregate::AGGREGATE_LABEL;
use crate::progress::{format_time_used, DescriptiveProgress};
use crate::stats::{CohortStatistics, CHROMOSOMES};

/// Statistics exports carry this suffix; the file name minus the suffix is
/// the cohort label.
const STATS_SUFFIX: &str = ".stats.csv";

// Chart theme, carried over from the project's original five-color palette.
const PINK: RGBColor = RGBColor(0xFA, 0xC6, 0xD2);
const NAVY: RGBColor = RGBColor(0x28, 0x2F, 0x44);
const PLUM: RGBColor = RGBColor(0x64, 0x50, 0x70);
const ROSE: RGBColor = RGBColor(0x9E, 0x64, 0x71);
const PERIWINKLE: RGBColor = RGBColor(0x98, 0xA8, 0xD7);

#[derive(Args, Debug)]
pub struct PlotArgs {
    /// Statistics directory, or a single .stats.csv file
    #[arg(short = 'i', long = "input")]
    pub input: String,
    /// Output directory for PNG charts
    #[arg(short = 'o', long = "output")]
    pub output: String,
    /// Number of top proteins to display
    #[arg(short = 'n', long = "top-proteins", default_value_t = 20)]
    pub top_proteins: usize,
    /// Log file path (optional)
    #[arg(short = 'l', long = "log")]
    pub log: Option<String>,
}

/// Validate plot command arguments
fn validate_plot_args(args: &PlotArgs) -> Result<(), Box<dyn Error>> {
    if args.input.trim().is_empty() {
        return Err("Error: Input path cannot be empty".into());
    }
    if !Path::new(&args.input).exists() {
        return Err(format!("Error: Input path does not exist: {}", args.input).into());
    }
    if args.output.trim().is_empty() {
        return Err("Error: Output directory cannot be empty".into());
    }
    if args.top_proteins == 0 {
        return Err("Error: Top-protein count cannot be 0".into());
    }
    Ok(())
}

/// Enumerate statistics exports: a single file, or every *.stats.csv in a
/// directory. Other entries are not statistics and are skipped.
fn discover_statistics(input: &Path) -> io::Result<Vec<(String, PathBuf)>> {
    if input.is_file() {
        let name = input
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let label = match name.strip_suffix(STATS_SUFFIX) {
            Some(label) if !label.is_empty() => label.to_string(),
            _ => input
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "cohort".to_string()),
        };
        return Ok(vec![(label, input.to_path_buf())]);
    }

    let mut targets = Vec::new();
    for entry in fs::read_dir(input)? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if let Some(label) = name.strip_suffix(STATS_SUFFIX) {
            if !label.is_empty() {
                targets.push((label.to_string(), path));
            }
        }
    }
    targets.sort();
    Ok(targets)
}

/// Parse one statistics export back into a CohortStatistics.
fn read_statistics(path: &Path) -> Result<CohortStatistics, Box<dyn Error>> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let mut stats = CohortStatistics::new();

    for (line_index, line) in reader.lines().enumerate() {
        let line = line?;
        let line = line.trim_end_matches('\r');
        if line.is_empty() || line == "section,key,count" {
            continue;
        }
        let malformed = || {
            format!(
                "malformed statistics line {} in {}",
                line_index + 1,
                path.display()
            )
        };
        let (section, rest) = line.split_once(',').ok_or_else(malformed)?;
        let (key, count) = rest.rsplit_once(',').ok_or_else(malformed)?;
        let count: u64 = count.trim().parse().map_err(|_| {
            format!(
                "invalid count '{}' on line {} in {}",
                count,
                line_index + 1,
                path.display()
            )
        })?;

        match section {
            "summary" => match key {
                "total_cases" => stats.total_cases = count,
                "total_substitutions" => stats.total_substitutions = count,
                "transitions" => stats.transitions = count,
                "transversions" => stats.transversions = count,
                other => {
                    return Err(
                        format!("unknown summary key '{}' in {}", other, path.display()).into(),
                    )
                }
            },
            "chromosome" => stats
                .chromosome_counts
                .add(key, count)
                .map_err(|e| format!("{} in {}", e, path.display()))?,
            "protein" => stats.protein_counts.add(key, count),
            "consequence" => stats.consequence_counts.add(key, count),
            "substitution" => stats.substitution_counts.add(key, count),
            other => {
                return Err(format!("unknown section '{}' in {}", other, path.display()).into())
            }
        }
    }

    Ok(stats)
}

/// Binomial standard error of a percentage, in percentage points.
fn standard_error(percentage: f64, total: u64) -> f64 {
    (percentage * (100.0 - percentage) / total as f64).sqrt()
}

fn plot_chromosome_distribution(
    label: &str,
    stats: &CohortStatistics,
    output_dir: &Path,
) -> Result<(), Box<dyn Error>> {
    let filename = output_dir.join(format!("{}_chromosome_plot.png", label));
    let root = BitMapBackend::new(&filename, (1200, 800)).into_drawing_area();
    root.fill(&NAVY)?;
    let root = root.margin(10, 10, 10, 10);

    let total = stats.total_cases;
    let bars: Vec<(usize, f64, f64)> = stats
        .chromosome_counts
        .iter_ordered()
        .enumerate()
        .map(|(i, (_, count))| {
            let pct = count as f64 / total as f64 * 100.0;
            (i, pct, standard_error(pct, total))
        })
        .collect();
    let y_max = bars
        .iter()
        .map(|(_, pct, se)| pct + se)
        .fold(0.0, f64::max)
        .max(1.0)
        * 1.15;

    let caption = format!("Chromosomal Mutation Percentages in {} Cancer", label).to_uppercase();
    let mut chart = ChartBuilder::on(&root)
        .caption(caption, ("sans-serif", 30).into_font().color(&PINK))
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(0f64..24f64, 0f64..y_max)?;

    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_desc("Chromosome")
        .y_desc("Percentage of cases (%)")
        .x_labels(24)
        .x_label_formatter(&|x| {
            CHROMOSOMES
                .get(*x as usize)
                .map(|c| c.to_string())
                .unwrap_or_default()
        })
        .axis_style(&PINK)
        .label_style(("sans-serif", 14).into_font().color(&PINK))
        .axis_desc_style(("sans-serif", 18).into_font().color(&PINK))
        .draw()?;

    chart.draw_series(bars.iter().map(|(i, pct, _)| {
        let x = *i as f64;
        Rectangle::new([(x + 0.15, 0.0), (x + 0.85, *pct)], PLUM.filled())
    }))?;
    chart.draw_series(bars.iter().map(|(i, pct, se)| {
        ErrorBar::new_vertical(
            *i as f64 + 0.5,
            (pct - se).max(0.0),
            *pct,
            pct + se,
            PERIWINKLE.stroke_width(1),
            6,
        )
    }))?;

    root.present()?;
    Ok(())
}

fn plot_substitution_distribution(
    label: &str,
    stats: &CohortStatistics,
    output_dir: &Path,
) -> Result<(), Box<dyn Error>> {
    let filename = output_dir.join(format!("{}_substitution_plot.png", label));
    let root = BitMapBackend::new(&filename, (1200, 800)).into_drawing_area();
    root.fill(&NAVY)?;
    let root = root.margin(10, 10, 10, 10);

    let total = stats.total_cases;
    let mut entries = stats.substitution_counts.sorted_desc();
    entries.sort_by(|a, b| a.0.cmp(b.0));
    let bars: Vec<(usize, &str, f64, f64)> = entries
        .iter()
        .enumerate()
        .map(|(i, (key, count))| {
            let pct = *count as f64 / total as f64 * 100.0;
            (i, *key, pct, standard_error(pct, total))
        })
        .collect();
    let y_max = bars
        .iter()
        .map(|(_, _, pct, se)| pct + se)
        .fold(0.0, f64::max)
        .max(1.0)
        * 1.15;
    let x_max = bars.len() as f64;

    let caption = format!("Substitution Types in {} Cancer", label).to_uppercase();
    let mut chart = ChartBuilder::on(&root)
        .caption(caption, ("sans-serif", 30).into_font().color(&PINK))
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(0f64..x_max, 0f64..y_max)?;

    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_desc("Substitution")
        .y_desc("Percentage of cases (%)")
        .x_labels(bars.len())
        .x_label_formatter(&|x| {
            bars.get(*x as usize)
                .map(|(_, key, _, _)| key.to_string())
                .unwrap_or_default()
        })
        .axis_style(&PINK)
        .label_style(("sans-serif", 14).into_font().color(&PINK))
        .axis_desc_style(("sans-serif", 18).into_font().color(&PINK))
        .draw()?;

    chart.draw_series(bars.iter().map(|(i, _, pct, _)| {
        let x = *i as f64;
        Rectangle::new([(x + 0.15, 0.0), (x + 0.85, *pct)], PLUM.filled())
    }))?;
    chart.draw_series(bars.iter().map(|(i, _, pct, se)| {
        ErrorBar::new_vertical(
            *i as f64 + 0.5,
            (pct - se).max(0.0),
            *pct,
            pct + se,
            PERIWINKLE.stroke_width(1),
            6,
        )
    }))?;

    root.present()?;
    Ok(())
}

fn plot_transition_transversion(
    label: &str,
    stats: &CohortStatistics,
    output_dir: &Path,
) -> Result<(), Box<dyn Error>> {
    let filename = output_dir.join(format!("{}_transition_transversion_plot.png", label));
    let root = BitMapBackend::new(&filename, (900, 700)).into_drawing_area();
    root.fill(&NAVY)?;

    let title = format!("Transition vs Transversion Frequency in {} Cancer", label).to_uppercase();
    let root = root.titled(&title, ("sans-serif", 28).into_font().color(&PINK))?;

    let dims = root.dim_in_pixel();
    let center = (dims.0 as i32 / 2, dims.1 as i32 / 2);
    let radius = dims.0.min(dims.1) as f64 * 0.35;
    let sizes = vec![stats.transitions as f64, stats.transversions as f64];
    let colors = vec![PLUM, ROSE];
    let labels = vec!["Transitions", "Transversions"];

    let mut pie = Pie::new(&center, &radius, &sizes, &colors, &labels);
    pie.label_style(("sans-serif", 24).into_font().color(&PINK));
    pie.percentages(("sans-serif", 20).into_font().color(&PINK));
    root.draw(&pie)?;

    root.present()?;
    Ok(())
}

fn plot_protein_mutations(
    label: &str,
    stats: &CohortStatistics,
    output_dir: &Path,
    top_proteins: usize,
    show_percents: bool,
) -> Result<(), Box<dyn Error>> {
    let filename = output_dir.join(format!("{}_protein_plot.png", label));
    let root = BitMapBackend::new(&filename, (1200, 800)).into_drawing_area();
    root.fill(&NAVY)?;
    let root = root.margin(10, 10, 10, 10);

    let total = stats.total_cases;
    let mut entries = stats.protein_counts.sorted_desc();
    entries.truncate(top_proteins);
    let bars: Vec<(usize, &str, f64)> = entries
        .iter()
        .enumerate()
        .map(|(i, (key, count))| (i, *key, *count as f64 / total as f64 * 100.0))
        .collect();
    let y_max = bars
        .iter()
        .map(|(_, _, pct)| *pct)
        .fold(0.0, f64::max)
        .max(1.0)
        * 1.15;
    let x_max = bars.len() as f64;

    let caption = format!("Protein Mutation Percentages in {} Cancer", label).to_uppercase();
    let mut chart = ChartBuilder::on(&root)
        .caption(caption, ("sans-serif", 30).into_font().color(&PINK))
        .x_label_area_size(60)
        .y_label_area_size(60)
        .build_cartesian_2d(0f64..x_max, 0f64..y_max)?;

    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_desc("Protein")
        .y_desc("Percentage of cases (%)")
        .x_labels(bars.len())
        .x_label_formatter(&|x| {
            bars.get(*x as usize)
                .map(|(_, key, _)| key.to_string())
                .unwrap_or_default()
        })
        .axis_style(&PINK)
        .label_style(("sans-serif", 11).into_font().color(&PINK))
        .axis_desc_style(("sans-serif", 18).into_font().color(&PINK))
        .draw()?;

    chart.draw_series(bars.iter().map(|(i, _, pct)| {
        let x = *i as f64;
        Rectangle::new([(x + 0.15, 0.0), (x + 0.85, *pct)], PLUM.filled())
    }))?;
    if show_percents {
        chart.draw_series(bars.iter().map(|(i, _, pct)| {
            Text::new(
                format!("{:.1}%", pct),
                (*i as f64 + 0.25, pct + y_max * 0.02),
                ("sans-serif", 12).into_font().color(&PINK),
            )
        }))?;
    }

    root.present()?;
    Ok(())
}

fn plot_consequence_types(
    label: &str,
    stats: &CohortStatistics,
    output_dir: &Path,
) -> Result<(), Box<dyn Error>> {
    let filename = output_dir.join(format!("{}_consequence_plot.png", label));
    let root = BitMapBackend::new(&filename, (1200, 800)).into_drawing_area();
    root.fill(&NAVY)?;
    let root = root.margin(10, 10, 10, 10);

    let total = stats.total_cases;
    let mut entries = stats.consequence_counts.sorted_desc();
    entries.truncate(10);
    let bars: Vec<(usize, &str, f64)> = entries
        .iter()
        .enumerate()
        .map(|(i, (key, count))| (i, *key, *count as f64 / total as f64 * 100.0))
        .collect();
    let y_max = bars
        .iter()
        .map(|(_, _, pct)| *pct)
        .fold(0.0, f64::max)
        .max(1.0)
        * 1.15;
    let x_max = bars.len() as f64;

    let caption = format!("Mutation Types in {} Cancer", label).to_uppercase();
    let mut chart = ChartBuilder::on(&root)
        .caption(caption, ("sans-serif", 30).into_font().color(&PINK))
        .x_label_area_size(60)
        .y_label_area_size(60)
        .build_cartesian_2d(0f64..x_max, 0f64..y_max)?;

    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_desc("Mutation Type")
        .y_desc("Percentage of cases (%)")
        .x_labels(bars.len())
        .x_label_formatter(&|x| {
            bars.get(*x as usize)
                .map(|(_, key, _)| key.to_string())
                .unwrap_or_default()
        })
        .axis_style(&PINK)
        .label_style(("sans-serif", 11).into_font().color(&PINK))
        .axis_desc_style(("sans-serif", 18).into_font().color(&PINK))
        .draw()?;

    chart.draw_series(bars.iter().map(|(i, _, pct)| {
        let x = *i as f64;
        Rectangle::new([(x + 0.15, 0.0), (x + 0.85, *pct)], PLUM.filled())
    }))?;

    root.present()?;
    Ok(())
}

/// Render every chart for one cohort. Returns the number of charts written.
fn render_cohort(
    label: &str,
    stats: &CohortStatistics,
    output_dir: &Path,
    top_proteins: usize,
    logger: &mut crate::Logger,
) -> Result<usize, Box<dyn Error>> {
    if stats.total_cases == 0 {
        logger.log(&format!("Cohort '{}' has no cases; charts skipped", label))?;
        return Ok(0);
    }

    let mut rendered = 0;
    plot_chromosome_distribution(label, stats, output_dir)?;
    rendered += 1;
    plot_protein_mutations(
        label,
        stats,
        output_dir,
        top_proteins,
        label == AGGREGATE_LABEL,
    )?;
    rendered += 1;
    plot_consequence_types(label, stats, output_dir)?;
    rendered += 1;
    if stats.substitution_counts.is_empty() {
        logger.log(&format!(
            "Cohort '{}' has no substitutions; substitution charts skipped",
            label
        ))?;
    } else {
        plot_substitution_distribution(label, stats, output_dir)?;
        rendered += 1;
        plot_transition_transversion(label, stats, output_dir)?;
        rendered += 1;
    }
    Ok(rendered)
}

pub fn plot_charts(args: &PlotArgs, logger: &mut crate::Logger) -> Result<(), Box<dyn Error>> {
    validate_plot_args(args)?;

    let start_time = Instant::now();

    logger.log("=== MutaScope Plot Function Log ===")?;
    logger.log(&format!("Software Version: v{}", crate::VERSION))?;
    logger.log(&format!(
        "Runtime: {}",
        chrono::Utc::now().format("%Y-%m-%d %H:%M:%S")
    ))?;
    logger.log(&format!("Input: {}", args.input))?;
    logger.log(&format!("Output Directory: {}", args.output))?;
    logger.log(&format!("Top Proteins: {}", args.top_proteins))?;

    let targets = discover_statistics(Path::new(&args.input))
        .map_err(|e| format!("cannot enumerate statistics in {}: {}", args.input, e))?;
    if targets.is_empty() {
        return Err(format!("no {} statistics files found in {}", STATS_SUFFIX, args.input).into());
    }

    println!("[Loading data]");
    println!("    Statistics: {}", args.input);
    println!("    Cohorts: {}", targets.len());
    println!();
    println!("[Params]");
    println!("    Top proteins: {}.", args.top_proteins);
    println!("    Output directory: {}", args.output);
    println!();

    let output_dir = Path::new(&args.output);
    fs::create_dir_all(output_dir)?;

    let mut progress = DescriptiveProgress::new(targets.len(), "[Progressing] Rendering cohorts");
    let mut rendered = 0usize;
    let mut failed = 0usize;
    for (done, (label, path)) in targets.iter().enumerate() {
        progress.update(done)?;
        match read_statistics(path) {
            Ok(stats) => {
                match render_cohort(label, &stats, output_dir, args.top_proteins, logger) {
                    Ok(count) => {
                        rendered += count;
                        logger.log(&format!("Cohort '{}': {} charts rendered", label, count))?;
                    }
                    Err(e) => {
                        failed += 1;
                        println!("[Warning] cohort '{}' charts failed: {}", label, e);
                        logger.log(&format!("Cohort '{}' charts failed: {}", label, e))?;
                    }
                }
            }
            Err(e) => {
                failed += 1;
                println!("[Warning] cohort '{}' statistics unreadable: {}", label, e);
                logger.log(&format!("Cohort '{}' statistics unreadable: {}", label, e))?;
            }
        }
    }
    progress.finish()?;

    let elapsed = start_time.elapsed();
    println!("[Output]");
    println!("    Charts: {} ({} files)", args.output, rendered);
    if failed > 0 {
        println!("    Failed cohorts: {}", failed);
    }
    println!("{}", format_time_used(elapsed));

    logger.log(&format!(
        "Chart rendering completed: {} charts, {} failed cohorts",
        rendered, failed
    ))?;
    logger.log(&format!("Total time: {:.2}s", elapsed.as_secs_f64()))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::write_statistics;
    use crate::record::parse_record;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    #[test]
    fn statistics_survive_a_write_read_round_trip() {
        let mut stats = CohortStatistics::new();
        for (protein, dna, consequence, cases) in [
            ("p.V600E", "chr7:g.140453136A>T", "missense_variant", 5u64),
            ("p.R175H", "chr17:g.7674220C>T", "missense_variant", 8),
            ("p.T910Mfs*47", "chr5:g.112839521delC", "frameshift_variant", 3),
        ] {
            let record = parse_record(protein, dna, consequence, &cases.to_string())
                .unwrap()
                .unwrap();
            stats.add_record(&record).unwrap();
        }

        let dir = tempdir().unwrap();
        let path = dir.path().join("skin.stats.csv");
        write_statistics(&path, &stats).unwrap();
        let restored = read_statistics(&path).unwrap();
        assert_eq!(restored, stats);
    }

    #[test]
    fn rejects_statistics_with_unknown_section() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.stats.csv");
        fs::write(&path, "section,key,count\nvoodoo,p.V600E,5\n").unwrap();
        assert!(read_statistics(&path).is_err());
    }

    #[test]
    fn discovers_statistics_files_in_a_directory() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("skin.stats.csv"), "section,key,count\n").unwrap();
        fs::write(dir.path().join("lung.stats.csv"), "section,key,count\n").unwrap();
        fs::write(dir.path().join("notes.txt"), "").unwrap();

        let targets = discover_statistics(dir.path()).unwrap();
        let labels: Vec<&str> = targets.iter().map(|(label, _)| label.as_str()).collect();
        assert_eq!(labels, vec!["lung", "skin"]);
    }

    #[test]
    fn single_statistics_file_keeps_its_cohort_label() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pancreatic.stats.csv");
        fs::write(&path, "section,key,count\n").unwrap();

        let targets = discover_statistics(&path).unwrap();
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].0, "pancreatic");
    }

    #[test]
    fn standard_error_matches_binomial_formula() {
        assert_eq!(standard_error(50.0, 100), 5.0);
        assert_eq!(standard_error(0.0, 25), 0.0);
    }
}
