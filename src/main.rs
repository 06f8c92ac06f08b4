use clap::{Parser, Subcommand};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use storyboard_sync::batch::{self, BatchReport};
use storyboard_sync::config::{CONFIG_FILE, SyncConfig};
use storyboard_sync::pipeline::{self, GenerationReport};
use storyboard_sync::probe::{DurationProbe, ProbeChain};
use storyboard_sync::synth::EdgeTts;
use storyboard_sync::timeline::{Manifest, Timeline};
use storyboard_sync::validator::{self, ValidationReport};
use storyboard_sync::voice::Voice;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "storyboard-sync", about = "Storyboard narration synthesis and duration sync")]
struct Cli {
    /// Config file (defaults to ./storyboard_sync.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Log filter, e.g. "debug" (RUST_LOG takes precedence)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Synthesize narration for every scene and write the manifest and timeline
    Generate {
        /// Storyboard markdown file
        storyboard: PathBuf,
        /// Output directory (defaults to `audio/` next to the storyboard)
        audio_dir: Option<PathBuf>,
        /// Voice: xiaoxiao, xiaoyi, yunjian, yunxi, yunxia or yunyang
        #[arg(short, long)]
        voice: Option<String>,
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
    /// Synthesize every row of a `filename,text` CSV list
    Batch {
        /// CSV list with a header row
        list: PathBuf,
        /// Output directory
        #[arg(default_value = "audio")]
        audio_dir: PathBuf,
        /// Voice: xiaoxiao, xiaoyi, yunjian, yunxi, yunxia or yunyang
        #[arg(short, long)]
        voice: Option<String>,
    },
    /// Measure listed audio, report problems and update the duration column
    Validate {
        /// Storyboard markdown file with a results table
        storyboard: PathBuf,
        /// Audio directory (defaults to `audio/` next to the storyboard)
        audio_dir: Option<PathBuf>,
    },
    /// Print the measured duration of audio files
    Probe {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Show the timeline and manifest in an audio directory
    Timeline { audio_dir: PathBuf },
    /// Configuration
    Config {
        #[command(subcommand)]
        action: ConfigCmd,
    },
}

#[derive(Subcommand)]
enum ConfigCmd {
    /// Show the effective configuration
    Show,
    /// Write the default configuration file
    Init,
}

fn main() {
    let cli = Cli::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let config_path = cli.config.clone().unwrap_or_else(|| PathBuf::from(CONFIG_FILE));
    let mut config = SyncConfig::load(Some(&config_path));

    match cli.command {
        Commands::Generate {
            storyboard,
            audio_dir,
            voice,
            yes,
        } => {
            if let Some(v) = voice {
                config.voice = Voice::from_str_loose(&v).unwrap_or_else(|e| fail(e));
            }
            let audio_dir = audio_dir.unwrap_or_else(|| default_audio_dir(&storyboard));
            let board =
                pipeline::load_storyboard(&storyboard, &config).unwrap_or_else(|e| fail(e));
            if board.is_empty() {
                fail("no scenes with narration found in storyboard");
            }

            println!("Found {} scene(s):", board.scenes.len());
            for line in pipeline::scene_listing(&board.scenes, 50) {
                println!("{line}");
            }
            println!("Voice: {} ({})", config.voice, config.voice.backend_id());
            println!("Output: {}", audio_dir.display());
            if !yes && !confirm("Generate audio? [y/N] ") {
                println!("Cancelled.");
                return;
            }

            let tts = EdgeTts::from_config(&config);
            let prober = ProbeChain::standard(&config);
            let report = pipeline::generate(&board, &audio_dir, &tts, &prober, &config)
                .unwrap_or_else(|e| fail(e));
            print_generation(&report);
            // Artifacts are already on disk; a partial run still fails.
            if !report.is_complete() {
                std::process::exit(1);
            }
        }
        Commands::Batch {
            list,
            audio_dir,
            voice,
        } => {
            if let Some(v) = voice {
                config.voice = Voice::from_str_loose(&v).unwrap_or_else(|e| fail(e));
            }
            let entries = batch::load_batch_list(&list, &config).unwrap_or_else(|e| fail(e));
            println!("Found {} row(s), voice {}", entries.len(), config.voice);
            let tts = EdgeTts::from_config(&config);
            let prober = ProbeChain::standard(&config);
            let report = batch::generate_batch(&entries, &audio_dir, &tts, &prober, &config)
                .unwrap_or_else(|e| fail(e));
            print_batch(&report);
            if !report.is_complete() {
                std::process::exit(1);
            }
        }
        Commands::Validate {
            storyboard,
            audio_dir,
        } => {
            let audio_dir = audio_dir.unwrap_or_else(|| default_audio_dir(&storyboard));
            let prober = ProbeChain::standard(&config);
            let report = validator::run_validation(&storyboard, &audio_dir, &prober, &config)
                .unwrap_or_else(|e| fail(e));
            print_validation(&report);
            if !report.passed() {
                std::process::exit(1);
            }
        }
        Commands::Probe { files } => {
            let prober = ProbeChain::standard(&config);
            let mut unknown = 0;
            for file in &files {
                match prober.probe(file) {
                    Some(secs) => println!("{:>8.2}s  {}", secs, file.display()),
                    None => {
                        unknown += 1;
                        println!("{:>9}  {}", "unknown", file.display());
                    }
                }
            }
            if unknown > 0 {
                std::process::exit(1);
            }
        }
        Commands::Timeline { audio_dir } => {
            let timeline = Timeline::load(&audio_dir.join(&config.timeline_file))
                .unwrap_or_else(|e| fail(e));
            println!(
                "Timeline: {} scene(s), {:.2}s ({:.1} min)",
                timeline.scenes.len(),
                timeline.total_duration,
                timeline.total_duration / 60.0
            );
            for entry in &timeline.scenes {
                println!(
                    "{:>3}. [scene {}] {} {:.2}s  {}",
                    entry.index, entry.scene_num, entry.title, entry.duration, entry.audio_file
                );
            }
            match Manifest::load(&audio_dir.join(&config.manifest_file)) {
                Ok(manifest) => {
                    let unmeasured = manifest.unmeasured();
                    println!("Manifest: {} file(s), voice {}", manifest.count, manifest.voice);
                    if !unmeasured.is_empty() {
                        println!("Unmeasured scenes: {unmeasured:?}");
                    }
                }
                Err(e) => eprintln!("Warning: {e}"),
            }
        }
        Commands::Config { action } => match action {
            ConfigCmd::Show => match serde_json::to_string_pretty(&config) {
                Ok(json) => println!("{json}"),
                Err(e) => fail(e),
            },
            ConfigCmd::Init => {
                if config_path.exists() {
                    fail(format!("{} already exists", config_path.display()));
                }
                SyncConfig::default()
                    .save(&config_path)
                    .unwrap_or_else(|e| fail(e));
                println!("Wrote {}", config_path.display());
            }
        },
    }
}

fn fail(msg: impl std::fmt::Display) -> ! {
    eprintln!("Error: {msg}");
    std::process::exit(1);
}

fn default_audio_dir(storyboard: &Path) -> PathBuf {
    storyboard
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join("audio")
}

fn confirm(prompt: &str) -> bool {
    print!("{prompt}");
    if io::stdout().flush().is_err() {
        return false;
    }
    let mut answer = String::new();
    match io::stdin().lock().read_line(&mut answer) {
        Ok(_) => matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"),
        Err(_) => false,
    }
}

fn print_generation(report: &GenerationReport) {
    println!();
    println!("Generated {}/{} scene(s)", report.generated, report.requested);
    for failure in &report.failures {
        println!(
            "  failed: scene {} {}: {}",
            failure.scene, failure.title, failure.reason
        );
    }
    if !report.unmeasured.is_empty() {
        println!("  duration unknown: {:?}", report.unmeasured);
    }
    let total = report.total_duration();
    println!("Total: {:.2}s ({:.1} min)", total, total / 60.0);
    println!("Manifest: {}", report.artifacts.manifest.display());
    println!("Timeline: {}", report.artifacts.timeline.display());
}

fn print_batch(report: &BatchReport) {
    println!();
    println!("Generated {}/{} file(s)", report.generated, report.requested);
    for failure in &report.failures {
        println!("  failed: {}: {}", failure.title, failure.reason);
    }
    if !report.unmeasured.is_empty() {
        println!("  duration unknown: {:?}", report.unmeasured);
    }
    let total = report.manifest.total_duration;
    println!("Total: {:.2}s ({:.1} min)", total, total / 60.0);
    if let Some(path) = &report.manifest_path {
        println!("Manifest: {}", path.display());
    }
}

fn print_validation(report: &ValidationReport) {
    println!();
    for row in &report.rows {
        let duration = row
            .row
            .duration
            .map(|d| format!("{d:.2}s"))
            .unwrap_or_else(|| "?".to_string());
        println!(
            "{:>3}. {} {} {}",
            row.row.scene,
            row.row.file,
            duration,
            if row.measured { "ok" } else { "-" }
        );
    }

    let errors: Vec<_> = report.errors().collect();
    let warnings: Vec<_> = report.warnings().collect();
    if !errors.is_empty() {
        println!("\nErrors ({}):", errors.len());
        for e in &errors {
            println!("  {e}");
        }
    }
    if !warnings.is_empty() {
        println!("\nWarnings ({}):", warnings.len());
        for w in &warnings {
            println!("  {w}");
        }
    }

    let total = report.total_duration();
    println!("\nTotal: {:.2}s ({:.1} min)", total, total / 60.0);
    println!("Manifest: {}", report.manifest_path.display());
    if report.document_updated {
        println!("Storyboard duration column updated.");
    }
    println!("{}", if report.passed() { "PASSED" } else { "FAILED" });
}
