use std::path::PathBuf;

use anyhow::Context;
use clap::{ArgGroup, Args, Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;

use crate::app::AppController;
use crate::domain::{ApiKey, ArtifactKind, DomainError, GenerationEvent, SourceInput, SpeechEvent, SpeechState};

/// Rate step for the `+` and `-` keys.
const RATE_STEP: f32 = 0.25;

/// Turn any text into study notes, a mind map, a quiz and flashcards.
#[derive(Parser, Debug)]
#[command(name = "cogniflow", version, about)]
pub struct Cli {
    /// Directory holding config.toml (defaults to the OS config directory)
    #[arg(long, global = true, value_name = "DIR", env = "COGNIFLOW_CONFIG_DIR")]
    pub config_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Generate all study materials from one source
    Generate(GenerateArgs),
    /// Read a notes file aloud
    Read(ReadArgs),
    /// Show the effective configuration
    Config(ConfigArgs),
}

#[derive(Args, Debug)]
#[command(group(ArgGroup::new("source").required(true).args(["text", "file", "url"])))]
pub struct GenerateArgs {
    /// Source text
    #[arg(long)]
    pub text: Option<String>,

    /// Plain-text file to read the source from
    #[arg(long, value_name = "PATH")]
    pub file: Option<PathBuf>,

    /// Web page to extract the source from
    #[arg(long)]
    pub url: Option<String>,

    /// Directory to write the generated HTML files to
    #[arg(long, value_name = "DIR")]
    pub out: Option<PathBuf>,

    /// Material to show when generation finishes: notes, mindmap, quiz or flashcard
    #[arg(long, value_name = "KIND", value_parser = parse_kind)]
    pub view: Option<ArtifactKind>,

    /// Read the notes aloud when generation finishes
    #[arg(long)]
    pub read: bool,
}

fn parse_kind(s: &str) -> Result<ArtifactKind, String> {
    ArtifactKind::from_id(s)
        .ok_or_else(|| format!("unknown material '{s}' (expected notes, mindmap, quiz or flashcard)"))
}

impl GenerateArgs {
    fn source(&self) -> anyhow::Result<SourceInput> {
        match (&self.text, &self.file, &self.url) {
            (Some(text), None, None) => Ok(SourceInput::Pasted(text.clone())),
            (None, Some(file), None) => Ok(SourceInput::File(file.clone())),
            (None, None, Some(url)) => Ok(SourceInput::Url(url.clone())),
            _ => anyhow::bail!("Provide exactly one of --text, --file or --url"),
        }
    }
}

#[derive(Args, Debug)]
pub struct ReadArgs {
    /// Notes file, e.g. cogni-flow-notes.html
    #[arg(value_name = "NOTES_HTML")]
    pub notes: PathBuf,

    /// Playback rate (1.0 is normal speed)
    #[arg(long)]
    pub rate: Option<f32>,
}

#[derive(Args, Debug)]
pub struct ConfigArgs {
    /// Print only the config file path
    #[arg(long)]
    pub path: bool,
}

/// Errors leave the app through here, carrying the user-facing message.
fn user_error(err: DomainError) -> anyhow::Error {
    anyhow::anyhow!(err.user_message())
}

pub async fn execute(cli: Cli) -> anyhow::Result<()> {
    let controller = AppController::new(cli.config_dir).map_err(user_error)?;

    match cli.command {
        Command::Generate(args) => generate(&controller, args).await,
        Command::Read(args) => read(&controller, args).await,
        Command::Config(args) => show_config(&controller, args),
    }
}

// ==================== Generation ====================

async fn generate(controller: &AppController, args: GenerateArgs) -> anyhow::Result<()> {
    let input = args.source()?;
    let mut events = controller.subscribe_generation().map_err(user_error)?;

    let run = controller.generate(&input);
    tokio::pin!(run);
    let mut events_open = true;
    let result = loop {
        tokio::select! {
            result = &mut run => break result,
            event = events.recv(), if events_open => match event {
                Ok(event) => print_generation_event(&event),
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => events_open = false,
            },
            _ = tokio::signal::ctrl_c() => {
                eprintln!("Cancelling after the current material...");
                controller.cancel_generation();
            }
        }
    };
    while let Ok(event) = events.try_recv() {
        print_generation_event(&event);
    }

    let session = match result {
        Ok(session) => session,
        Err(e) => {
            // Keep whatever was generated before the failure.
            let partial = controller.export_all(args.out.as_deref()).unwrap_or_default();
            for path in partial {
                println!("Saved {}", path.display());
            }
            return Err(user_error(e));
        }
    };

    for path in controller.export_all(args.out.as_deref()).map_err(user_error)? {
        println!("Saved {}", path.display());
    }
    let shown = match args.view {
        Some(kind) => {
            controller.select_view(kind).map_err(user_error)?;
            Some(kind)
        }
        None => session.active_view(),
    };
    if let Some(kind) = shown {
        println!("Ready. Showing {}.", kind);
    }

    if args.read {
        controller.read_notes().map_err(user_error)?;
        interact(controller).await?;
    }
    Ok(())
}

fn print_generation_event(event: &GenerationEvent) {
    match event {
        GenerationEvent::RunStarted { source_chars } => {
            println!("Working from {} characters of source text", source_chars)
        }
        GenerationEvent::KindStarted { message, .. } => println!("{}", message),
        GenerationEvent::EndpointAttempt { attempt, total, endpoint, .. } if *attempt > 1 => {
            println!("  trying {} ({}/{})", endpoint, attempt, total)
        }
        GenerationEvent::EndpointFailed { endpoint, reason, .. } => {
            eprintln!("  {} failed: {}", endpoint, reason)
        }
        GenerationEvent::KindCompleted { kind, chars, .. } => {
            println!("  {} ready ({} characters)", kind, chars)
        }
        GenerationEvent::Cancelled { kind } => println!("Cancelled before {}", kind),
        _ => {}
    }
}

// ==================== Read-aloud ====================

async fn read(controller: &AppController, args: ReadArgs) -> anyhow::Result<()> {
    let markup = tokio::fs::read_to_string(&args.notes)
        .await
        .with_context(|| format!("Could not read {}", args.notes.display()))?;

    if let Some(rate) = args.rate {
        controller.set_speech_rate(rate).map_err(user_error)?;
    }
    controller.read_markup(&markup).map_err(user_error)?;
    interact(controller).await
}

/// Drive playback from stdin keys until it finishes or the user quits.
async fn interact(controller: &AppController) -> anyhow::Result<()> {
    println!("Keys: p pause, r resume, b back, s skip, + faster, - slower, q quit (then Enter)");

    let mut events = controller.subscribe_speech();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(SpeechEvent::Completed) => {
                    println!("Finished reading.");
                    break;
                }
                Ok(SpeechEvent::Error { message }) => {
                    eprintln!("Speech stopped: {}", message);
                    break;
                }
                Ok(SpeechEvent::StateChanged { to: SpeechState::Paused, .. }) => println!("(paused)"),
                Ok(SpeechEvent::RateChanged { rate }) => println!("(rate {:.2}x)", rate),
                Ok(_) | Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => break,
            },
            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(line)) => {
                    if !handle_key(controller, line.trim()) {
                        controller.stop_speech();
                        break;
                    }
                }
                Ok(None) | Err(_) => stdin_open = false,
            },
        }
    }
    Ok(())
}

/// Apply one key. Returns false when the user quits.
fn handle_key(controller: &AppController, key: &str) -> bool {
    let result = match key {
        "p" => controller.pause_speech(),
        "r" => controller.resume_speech(),
        "b" => controller.rewind_speech(),
        "s" => controller.skip_speech(),
        "+" => controller
            .set_speech_rate(controller.speech_rate() + RATE_STEP)
            .map(|_| ()),
        "-" => controller
            .set_speech_rate(controller.speech_rate() - RATE_STEP)
            .map(|_| ()),
        "q" => return false,
        "" => Ok(()),
        other => {
            eprintln!("Unknown key '{}'", other);
            Ok(())
        }
    };
    if let Err(e) = result {
        eprintln!("{}", e.user_message());
        controller.dismiss_error();
    }
    true
}

// ==================== Configuration ====================

fn show_config(controller: &AppController, args: ConfigArgs) -> anyhow::Result<()> {
    if args.path {
        println!("{}", controller.config_path().display());
        return Ok(());
    }

    let mut config = controller.config();
    if config.model.api_key.is_some() {
        config.model.api_key = Some(ApiKey::new("***"));
    }
    let rendered = toml::to_string_pretty(&config).context("Could not render configuration")?;
    println!("# {}", controller.config_path().display());
    print!("{}", rendered);
    Ok(())
}
