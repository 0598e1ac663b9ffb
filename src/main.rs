mod classify;
mod content;
mod courses;
mod error;
mod graph;
mod merge;
mod outline;
mod output;
mod parser;
mod text;

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::{Parser, Subcommand};
use tracing::warn;

use crate::error::ParseError;
use crate::graph::{FailedSource, GraphFragment};
use crate::parser::{detect_parser, parse_document, ParserKind};

#[derive(Parser)]
#[command(name = "xplore_kg", about = "Academic program pages to knowledge graph")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse HTML files into a merged knowledge graph
    Parse {
        /// Program overview page (program-structure parser)
        #[arg(long)]
        academics: Option<PathBuf>,
        /// Course detail pages (single-course parser)
        #[arg(long = "course-files", num_args = 1..)]
        course_files: Vec<PathBuf>,
        /// Pages for the generic structural parser
        #[arg(long, num_args = 1..)]
        generic: Vec<PathBuf>,
        /// Files routed to a parser by their path shape
        inputs: Vec<PathBuf>,
        /// Base URL for resolving relative hrefs
        #[arg(long = "url-base")]
        url_base: Option<String>,
        /// Output file (bare filename lands under --out-dir; stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Directory for bare output filenames
        #[arg(long = "out-dir", default_value = "output")]
        out_dir: PathBuf,
        /// Pretty-print the JSON output
        #[arg(long)]
        pretty: bool,
    },
    /// Print the heading outline of one HTML file
    Outline {
        file: PathBuf,
    },
    /// Re-merge previously saved graph files
    Merge {
        graphs: Vec<PathBuf>,
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(long = "out-dir", default_value = "output")]
        out_dir: PathBuf,
        #[arg(long)]
        pretty: bool,
    },
    /// Node/edge counts and failure report for a saved graph
    Stats {
        graph: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Parse {
            academics,
            course_files,
            generic,
            inputs,
            url_base,
            output,
            out_dir,
            pretty,
        } => {
            let mut jobs: Vec<(PathBuf, ParserKind)> = Vec::new();
            if let Some(path) = academics {
                jobs.push((path, ParserKind::Program));
            }
            jobs.extend(course_files.into_iter().map(|p| (p, ParserKind::Course)));
            jobs.extend(generic.into_iter().map(|p| (p, ParserKind::Generic)));
            jobs.extend(inputs.into_iter().map(|p| {
                let kind = detect_parser(&p.to_string_lossy());
                (p, kind)
            }));
            if jobs.is_empty() {
                anyhow::bail!("no input files given");
            }

            let (fragments, failed) = parse_files(&jobs, url_base.as_deref());
            if fragments.is_empty() {
                anyhow::bail!("no documents parsed ({} failed)", failed.len());
            }
            println!(
                "Parsed {} of {} documents.",
                fragments.len(),
                fragments.len() + failed.len()
            );

            let mut kg = merge::merge_with_failures(fragments, failed);
            output::write_graph(&mut kg, output.as_deref(), &out_dir, pretty)?;
            Ok(())
        }
        Commands::Outline { file } => {
            let html = read_html(&file)?;
            output::print_outline_summary(&html);
            Ok(())
        }
        Commands::Merge {
            graphs,
            output,
            out_dir,
            pretty,
        } => {
            if graphs.is_empty() {
                anyhow::bail!("no graph files given");
            }
            let mut fragments = Vec::with_capacity(graphs.len());
            for path in &graphs {
                fragments.push(output::read_graph(path)?.into_fragment());
            }
            let mut kg = merge::merge(fragments);
            output::write_graph(&mut kg, output.as_deref(), &out_dir, pretty)?;
            Ok(())
        }
        Commands::Stats { graph } => {
            let kg = output::read_graph(&graph)?;
            output::print_stats(&kg);
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {:.1}s", elapsed.as_secs_f64());
    }

    result
}

/// Parse each file with its assigned parser, in parallel, collecting results
/// in input order so the merge stays deterministic. A file that fails to read
/// or parse is recorded and skipped; it never aborts the run.
fn parse_files(
    jobs: &[(PathBuf, ParserKind)],
    url_base: Option<&str>,
) -> (Vec<GraphFragment>, Vec<FailedSource>) {
    use indicatif::{ProgressBar, ProgressStyle};
    use rayon::prelude::*;

    let pb = if jobs.len() > 1 {
        let pb = ProgressBar::new(jobs.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len}")
                .unwrap()
                .progress_chars("#>-"),
        );
        Some(pb)
    } else {
        None
    };

    let results: Vec<Result<GraphFragment, FailedSource>> = jobs
        .par_iter()
        .map(|(path, kind)| {
            let source = path.to_string_lossy().to_string();
            let outcome = read_html(path)
                .and_then(|html| parse_document(&html, *kind, Some(&source), url_base));
            if let Some(pb) = &pb {
                pb.inc(1);
            }
            outcome.map_err(|e| {
                warn!(source = %source, error = %e, "document failed");
                FailedSource {
                    source,
                    error: e.to_string(),
                }
            })
        })
        .collect();
    if let Some(pb) = pb {
        pb.finish_and_clear();
    }

    let mut fragments = Vec::new();
    let mut failed = Vec::new();
    for r in results {
        match r {
            Ok(f) => fragments.push(f),
            Err(e) => failed.push(e),
        }
    }
    (fragments, failed)
}

fn read_html(path: &Path) -> Result<String, ParseError> {
    fs::read_to_string(path).map_err(|source| ParseError::Io {
        path: path.display().to_string(),
        source,
    })
}
