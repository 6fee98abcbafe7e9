use clap::{Parser, Subcommand};
use mono2midi::{validate_input, Config, Transcriber, TuningOverrides};
use std::path::PathBuf;

/// Monophonic Audio-to-MIDI Transcription
#[derive(Parser)]
#[command(name = "mono2midi")]
#[command(about = "Transcribe a monophonic recording into notes, MIDI and re-synthesized audio")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze audio file and generate MIDI output
    Analyze {
        /// Input audio file (WAV)
        input: PathBuf,

        /// Output directory for results
        #[arg(short, long, default_value = "./output")]
        output: PathBuf,

        /// Custom configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Spectral threshold in dB (e.g. -60)
        #[arg(long, allow_hyphen_values = true)]
        threshold: Option<f32>,

        /// Move onsets back to the preceding envelope minimum
        #[arg(long)]
        backtrack: bool,

        /// Magnitude exponent applied before dB conversion
        #[arg(long)]
        mag_exp: Option<f32>,

        /// Peak-picking window in frames on each side
        #[arg(long)]
        pre_post_max: Option<usize>,

        /// Render QA plots
        #[arg(long)]
        plots: bool,

        /// Verbose output
        #[arg(short, long)]
        verbose: bool,

        /// Quiet output
        #[arg(short, long)]
        quiet: bool,
    },
    /// Validate configuration file
    ValidateConfig {
        /// Configuration file to validate
        config: PathBuf,
    },
    /// Show default configuration
    ShowConfig,
}

fn init_logging(verbose: bool, quiet: bool) {
    let level = if verbose {
        "debug"
    } else if quiet {
        "warn"
    } else {
        "info"
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Analyze {
            input,
            output,
            config,
            threshold,
            backtrack,
            mag_exp,
            pre_post_max,
            plots,
            verbose,
            quiet,
        } => {
            if verbose && quiet {
                anyhow::bail!("Cannot specify both --verbose and --quiet");
            }
            init_logging(verbose, quiet);

            let base = if let Some(config_path) = config {
                mono2midi::config::load_config(config_path)?
            } else {
                Config::default()
            };

            let overrides = TuningOverrides {
                threshold_db: threshold,
                backtrack: backtrack.then_some(true),
                pre_post_max,
            };
            let mut config = overrides.apply(&base);
            if let Some(mag_exp) = mag_exp {
                config.cqt.mag_exp = mag_exp;
            }
            if plots {
                config.export.write_plots = true;
            }

            validate_input(&input, &config)?;
            let transcriber = Transcriber::new(config)?;

            log::info!("Processing {}...", input.display());
            let transcription = transcriber.process(&input, &output)?;

            log::info!(
                "{} events at {} BPM ({} voiced segments, {} dropped)",
                transcription.events.len(),
                transcription.tempo.bpm,
                transcription.voiced_count(),
                transcription.dropped.len()
            );
            log::info!("Results saved to {}", output.display());
        }
        Commands::ValidateConfig { config } => {
            let config = mono2midi::config::load_config(config)?;
            mono2midi::config::validate_config(&config)?;
            println!("Configuration is valid");
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        Commands::ShowConfig => {
            let config = Config::default();
            let json = serde_json::to_string_pretty(&config)?;
            println!("{}", json);
        }
    }

    Ok(())
}
