use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use rayon::prelude::*;
use tracing::{info, warn};

use dinar_posts::db::{self, DbPublisher};
use dinar_posts::export::{write_records, ExportFormat, FileExporter, Publisher};
use dinar_posts::{fetch, recaps, Record, Segmenter, Settings};

const STDIN_SOURCE: &str = "stdin";

#[derive(Parser)]
#[command(name = "dinar_posts", about = "Split forum-style HTML columns into dated posts")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Segment local HTML files (stdin when none or "-")
    Segment {
        files: Vec<PathBuf>,
        /// Print records as json, jsonl or csv instead of a summary
        #[arg(short, long, value_enum)]
        format: Option<ExportFormat>,
        /// Store records in the database
        #[arg(long)]
        save: bool,
    },
    /// Fetch the DinarGuru front page and segment its posts column
    Guru {
        #[arg(long)]
        save: bool,
        /// Write records to the export directory
        #[arg(long, value_enum)]
        export: Option<ExportFormat>,
    },
    /// Fetch DinarRecaps blog posts
    Recaps {
        /// Only posts whose listed date matches exactly (e.g. "12/4/25")
        #[arg(short, long)]
        date: Option<String>,
        #[arg(long)]
        save: bool,
        #[arg(long, value_enum)]
        export: Option<ExportFormat>,
    },
    /// Show stored posts, newest run first
    List {
        /// Filter by source (guru, recaps, file name)
        #[arg(short, long)]
        source: Option<String>,
        #[arg(short = 'n', long, default_value = "20")]
        limit: usize,
    },
    /// Show database statistics
    Stats,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(io::stderr)
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let settings = Settings::load()?;
    let segmenter = Segmenter::new(&settings.segment).context("Invalid segment configuration")?;

    let result = match cli.command {
        Commands::Segment { files, format, save } => {
            let batches = segment_inputs(&segmenter, &files, io::stdin().lock())?;
            for (source, records) in &batches {
                match format {
                    Some(fmt) => write_records(io::stdout().lock(), fmt, records)?,
                    None => print_records(source, records),
                }
            }
            if save {
                let conn = open_db(&settings)?;
                let mut publisher = DbPublisher::new(&conn);
                for (source, records) in &batches {
                    let n = publisher.publish(source, records)?;
                    eprintln!("{}: saved {} new of {} records", source, n, records.len());
                }
            }
            Ok(())
        }
        Commands::Guru { save, export } => {
            let client = fetch::client(&settings)?;
            let column = fetch::fetch_guru(&client, &settings).await?;
            let records = segmenter.segment(&column);
            if records.is_empty() {
                warn!("No posts found in the DinarGuru column");
            }
            print_records("guru", &records);
            publish(&settings, "guru", &records, save, export)
        }
        Commands::Recaps { date, save, export } => {
            let client = fetch::client(&settings)?;
            let records =
                recaps::fetch_records(&client, &settings, &segmenter, date.as_deref()).await?;
            if records.is_empty() {
                println!("No matching posts.");
                return Ok(());
            }
            print_records("recaps", &records);
            publish(&settings, "recaps", &records, save, export)
        }
        Commands::List { source, limit } => {
            let conn = open_db(&settings)?;
            let posts = db::fetch_posts(&conn, source.as_deref(), limit)?;
            if posts.is_empty() {
                println!("No posts stored.");
                return Ok(());
            }

            println!(
                "{:>3} | {:<10} | {:<10} | {:<24} | {:<40}",
                "#", "Source", "Date", "Title", "Content"
            );
            println!("{}", "-".repeat(100));
            for p in &posts {
                println!(
                    "{:>3} | {:<10} | {:<10} | {:<24} | {:<40}",
                    p.number,
                    truncate(&p.source, 10),
                    truncate(&p.date, 10),
                    truncate(&p.title, 24),
                    truncate(&p.content, 40)
                );
            }
            println!("\n{} posts | latest run {}", posts.len(), posts[0].created_at);
            Ok(())
        }
        Commands::Stats => {
            let conn = open_db(&settings)?;
            let s = db::get_stats(&conn)?;
            println!("Runs:  {}", s.runs);
            println!("Posts: {}", s.posts);
            for (source, n) in &s.by_source {
                println!("  {:<12} {}", source, n);
            }
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        eprintln!("\nDone in {}", format_duration(elapsed));
    }

    result
}

fn open_db(settings: &Settings) -> Result<rusqlite::Connection> {
    let conn = db::connect(&settings.db_path)?;
    db::init_schema(&conn)?;
    Ok(conn)
}

/// Reads and segments every input in parallel; results keep input order.
/// `-` stands for stdin and may appear once, alongside regular files.
fn segment_inputs<R: Read>(
    segmenter: &Segmenter,
    files: &[PathBuf],
    mut stdin: R,
) -> Result<Vec<(String, Vec<Record>)>> {
    let mut read_stdin = || -> Result<String> {
        let mut doc = String::new();
        stdin
            .read_to_string(&mut doc)
            .context("Failed to read stdin")?;
        Ok(doc)
    };

    if files.is_empty() {
        let doc = read_stdin()?;
        return Ok(vec![(STDIN_SOURCE.to_string(), segmenter.segment(&doc))]);
    }
    let stdin_doc = match files.iter().filter(|f| is_stdin(f)).count() {
        0 => None,
        1 => Some(read_stdin()?),
        _ => bail!("stdin (\"-\") can be given only once"),
    };

    files
        .par_iter()
        .map(|path| -> Result<(String, Vec<Record>)> {
            let (source, records) = match stdin_doc.as_deref() {
                Some(doc) if is_stdin(path) => (STDIN_SOURCE.to_string(), segmenter.segment(doc)),
                _ => {
                    let doc = std::fs::read_to_string(path)
                        .with_context(|| format!("Failed to read {}", path.display()))?;
                    let source = path
                        .file_stem()
                        .map(|s| s.to_string_lossy().into_owned())
                        .unwrap_or_else(|| path.display().to_string());
                    (source, segmenter.segment(&doc))
                }
            };
            info!(input = %path.display(), records = records.len(), "segmented");
            Ok((source, records))
        })
        .collect()
}

fn is_stdin(path: &Path) -> bool {
    path.as_os_str() == "-"
}

fn publish(
    settings: &Settings,
    source: &str,
    records: &[Record],
    save: bool,
    export: Option<ExportFormat>,
) -> Result<()> {
    if save {
        let conn = open_db(settings)?;
        let n = DbPublisher::new(&conn).publish(source, records)?;
        println!("Saved {} new of {} posts.", n, records.len());
    }
    if let Some(format) = export {
        let mut exporter = FileExporter::new(&settings.export_dir, format);
        exporter.publish(source, records)?;
        for path in exporter.written() {
            println!("Exported to {}", path.display());
        }
    }
    Ok(())
}

fn print_records(source: &str, records: &[Record]) {
    println!("{}: {} posts", source, records.len());
    for r in records {
        println!("  #{:<3} [{}] {}", r.number, r.date, r.title);
        println!("        {}", truncate(&r.content, 100));
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max).collect();
        format!("{}...", truncated)
    }
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
