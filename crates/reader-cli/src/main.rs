use std::fs;
use std::io::{self, ErrorKind, IsTerminal, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use image::ImageFormat;
use reader_contracts::console::{parse_console_line, ConsoleCommand, CONSOLE_HELP_COMMANDS};
use reader_contracts::models::ModelRegistry;
use reader_contracts::{Language, Reading, SessionPhase, SessionState};
use reader_engine::{build_clients, ImageInput, ReaderConfig, ReadingSession, SubmitOutcome};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "reader-rs",
    version,
    about = "Insight's Reader: read a passage, translate it, paint the scene"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Analyze a text passage and illustrate it.
    Read(ReadArgs),
    /// Transcribe a photographed page (or describe a picture) and illustrate it.
    Scan(ScanArgs),
    /// Interactive session; plain lines are read as passages.
    Console(ConsoleArgs),
    /// List the target languages.
    Languages,
    /// List the known models and their capabilities.
    Models,
}

#[derive(Debug, Args)]
struct SessionArgs {
    #[arg(long, default_value_t = Language::default())]
    lang: Language,
    #[arg(long)]
    events: Option<PathBuf>,
    #[arg(long)]
    analysis_model: Option<String>,
    #[arg(long)]
    image_model: Option<String>,
}

#[derive(Debug, Args)]
struct OutputArgs {
    /// Where to write the illustration (PNG).
    #[arg(long)]
    out: Option<PathBuf>,
    /// Also print the illustration as a data URI.
    #[arg(long)]
    data_uri: bool,
}

#[derive(Debug, Parser)]
struct ReadArgs {
    #[command(flatten)]
    session: SessionArgs,
    #[command(flatten)]
    output: OutputArgs,
    #[arg(long, conflicts_with = "file")]
    text: Option<String>,
    #[arg(long)]
    file: Option<PathBuf>,
}

#[derive(Debug, Parser)]
struct ScanArgs {
    #[command(flatten)]
    session: SessionArgs,
    #[command(flatten)]
    output: OutputArgs,
    #[arg(long)]
    image: PathBuf,
}

#[derive(Debug, Parser)]
struct ConsoleArgs {
    #[command(flatten)]
    session: SessionArgs,
}

const PROGRESS_TICK: Duration = Duration::from_millis(150);
const SPINNER: [char; 4] = ['|', '/', '-', '\\'];
const QUOTE_EVERY_TICKS: usize = 20;
const EXIT_SESSION_FAILED: i32 = 2;

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("reader-rs error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Read(args) => run_read(args),
        Command::Scan(args) => run_scan(args),
        Command::Console(args) => run_console(args),
        Command::Languages => {
            for language in Language::ALL {
                println!("{}\t{}", language.code(), language.label());
            }
            Ok(0)
        }
        Command::Models => {
            let registry = ModelRegistry::new(None);
            for model in registry.list() {
                println!(
                    "{}\t{}\t{}",
                    model.name,
                    model.provider,
                    model.capabilities.join(",")
                );
            }
            Ok(0)
        }
    }
}

fn open_session(args: &SessionArgs) -> Result<ReadingSession> {
    let config = ReaderConfig::from_env()
        .with_analysis_model(args.analysis_model.clone())
        .with_image_model(args.image_model.clone());
    let clients = build_clients(&config)?;
    debug!(
        analysis_model = clients.analysis_model.as_str(),
        image_model = clients.image_model.as_str(),
        "session clients built"
    );
    Ok(match args.events.as_ref() {
        Some(path) => ReadingSession::with_event_log(clients.analysis, clients.images, path),
        None => clients.into_session(),
    })
}

fn run_read(args: ReadArgs) -> Result<i32> {
    let passage = read_passage(args.text.as_deref(), args.file.as_deref())?;
    let language = args.session.lang;
    let mut session = open_session(&args.session)?;
    let updates = session.subscribe();
    match session.submit(&passage, language) {
        SubmitOutcome::Started | SubmitOutcome::Failed => {}
        SubmitOutcome::IgnoredEmpty => {
            eprintln!("Nothing to read: the passage is empty.");
            return Ok(0);
        }
        SubmitOutcome::Busy => bail!("session refused the passage"),
    }
    let state = await_reading(&mut session, &updates, language);
    finish(&state, language, &args.output)
}

fn run_scan(args: ScanArgs) -> Result<i32> {
    let image = read_image_input(&args.image)?;
    let language = args.session.lang;
    let mut session = open_session(&args.session)?;
    let updates = session.subscribe();
    match session.submit_image(image, language) {
        SubmitOutcome::Started | SubmitOutcome::Failed => {}
        SubmitOutcome::IgnoredEmpty => {
            eprintln!("Nothing to read: {} is empty.", args.image.display());
            return Ok(0);
        }
        SubmitOutcome::Busy => bail!("session refused the image"),
    }
    let state = await_reading(&mut session, &updates, language);
    finish(&state, language, &args.output)
}

fn finish(state: &SessionState, language: Language, output: &OutputArgs) -> Result<i32> {
    match state {
        SessionState::Result(reading) => {
            print_reading(reading, language);
            if let Some(path) = output.out.as_deref() {
                save_image(reading, path)?;
                println!("Saved illustration to {}", path.display());
            }
            if output.data_uri {
                println!("{}", reading.image.data_uri());
            }
            Ok(0)
        }
        SessionState::Error(failure) => {
            eprintln!("{}", failure.message);
            Ok(EXIT_SESSION_FAILED)
        }
        other => bail!("session stopped while {}", other.phase().as_str()),
    }
}

fn run_console(args: ConsoleArgs) -> Result<i32> {
    let mut session = open_session(&args.session)?;
    let mut language = args.session.lang;
    let updates = session.subscribe();

    println!("Insight's Reader console. Type /help for commands.");
    println!("Target language: {language}");

    let stdin = io::stdin();
    let mut line = String::new();
    loop {
        print!("> ");
        io::stdout().flush()?;

        line.clear();
        let read = match stdin.read_line(&mut line) {
            Ok(read) => read,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(err.into()),
        };
        if read == 0 {
            break;
        }

        match parse_console_line(line.trim_end_matches(['\n', '\r'])) {
            ConsoleCommand::Noop => continue,
            ConsoleCommand::Help => {
                println!("Commands: {}", CONSOLE_HELP_COMMANDS.join(" "));
                println!("Any other line is read as a passage.");
            }
            ConsoleCommand::Quit => break,
            ConsoleCommand::Reset => {
                session.reset();
                println!("Session reset.");
            }
            ConsoleCommand::Status => {
                println!(
                    "Status: {} (target language {language})",
                    session.phase().as_str()
                );
            }
            ConsoleCommand::SetLanguage(next) => {
                language = next;
                println!("Target language set to {language}");
            }
            ConsoleCommand::Save(path) => match session.state().reading() {
                Some(reading) => match save_image(reading, &path) {
                    Ok(()) => println!("Saved illustration to {}", path.display()),
                    Err(err) => println!("Save failed: {err:#}"),
                },
                None => println!("Nothing to save yet."),
            },
            ConsoleCommand::Scan(path) => {
                let image = match read_image_input(&path) {
                    Ok(image) => image,
                    Err(err) => {
                        println!("Scan failed: {err:#}");
                        continue;
                    }
                };
                drain(&updates);
                let outcome = session.submit_image(image, language);
                console_outcome(&mut session, &updates, outcome, language);
            }
            ConsoleCommand::Submit(text) => {
                drain(&updates);
                let outcome = session.submit(&text, language);
                console_outcome(&mut session, &updates, outcome, language);
            }
            ConsoleCommand::Invalid(message) => println!("{message}"),
        }
    }
    Ok(0)
}

fn console_outcome(
    session: &mut ReadingSession,
    updates: &Receiver<SessionState>,
    outcome: SubmitOutcome,
    language: Language,
) {
    match outcome {
        SubmitOutcome::Started | SubmitOutcome::Failed => {
            match await_reading(session, updates, language) {
                SessionState::Result(reading) => print_reading(&reading, language),
                SessionState::Error(failure) => println!("{}", failure.message),
                other => println!("Status: {}", other.phase().as_str()),
            }
        }
        SubmitOutcome::IgnoredEmpty => {}
        SubmitOutcome::Busy => {
            println!("A reading is already on the table. Use /reset to start over.");
        }
    }
}

fn drain(updates: &Receiver<SessionState>) {
    while updates.try_recv().is_ok() {}
}

/// Follows the subscription until the run settles, animating a progress line
/// on a terminal.
fn await_reading(
    session: &mut ReadingSession,
    updates: &Receiver<SessionState>,
    language: Language,
) -> SessionState {
    let animate = io::stderr().is_terminal();
    let mut phase = session.phase();
    let mut tick = 0usize;
    loop {
        match updates.recv_timeout(PROGRESS_TICK) {
            Ok(state) => {
                phase = state.phase();
                if matches!(phase, SessionPhase::Result | SessionPhase::Error) {
                    break;
                }
                if !animate && phase.is_in_flight() {
                    eprintln!("{}", progress_label(phase, language));
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                if !session.is_busy() {
                    break;
                }
                if animate && phase.is_in_flight() {
                    let quote = progress_quote(language, tick / QUOTE_EVERY_TICKS);
                    eprint!(
                        "\r{} {}  {quote:<48}",
                        SPINNER[tick % SPINNER.len()],
                        progress_label(phase, language)
                    );
                    let _ = io::stderr().flush();
                }
                tick += 1;
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    if animate && tick > 0 {
        eprint!("\r{:<80}\r", "");
    }
    session.wait()
}

fn progress_label(phase: SessionPhase, language: Language) -> &'static str {
    let painting = phase == SessionPhase::Painting;
    match (language, painting) {
        (Language::Spanish, false) => "Descifrando Texto",
        (Language::Spanish, true) => "Renderizando Visión",
        (Language::English, false) => "Deciphering Text",
        (Language::English, true) => "Rendering Vision",
        (Language::French, false) => "Déchiffrer le Texte",
        (Language::French, true) => "Rendu de la Vision",
        (Language::German, false) => "Text entziffern",
        (Language::German, true) => "Vision rendern",
        (Language::Italian, false) => "Decifrare il Testo",
        (Language::Italian, true) => "Rendering della Visione",
    }
}

fn progress_quote(language: Language, index: usize) -> &'static str {
    let quotes: &[&str] = match language {
        Language::Spanish => &[
            "La tinta se está secando en la página...",
            "Traduciendo el alma de las palabras...",
            "Imaginando el escenario...",
            "Pintando con prosa...",
        ],
        Language::English => &[
            "Ink is drying on the page...",
            "Translating the soul of the words...",
            "Imagining the scenery...",
            "Painting with prose...",
        ],
        Language::French => &[
            "L'encre sèche sur la page...",
            "Traduire l'âme des mots...",
            "Imaginer le décor...",
            "Peindre avec la prose...",
        ],
        Language::German => &[
            "Tinte trocknet auf der Seite...",
            "Die Seele der Worte übersetzen...",
            "Die Szenerie vorstellen...",
            "Mit Prosa malen...",
        ],
        Language::Italian => &[
            "L'inchiostro si asciuga sulla pagina...",
            "Tradurre l'anima delle parole...",
            "Immaginare lo scenario...",
            "Dipingere con la prosa...",
        ],
    };
    quotes[index % quotes.len()]
}

fn print_reading(reading: &Reading, language: Language) {
    let analysis = &reading.analysis;
    let details = &analysis.visual_details;
    println!("== Original ({}) ==", analysis.source_language);
    println!("{}", analysis.original_text);
    println!();
    println!("== Translation ({language}) ==");
    println!("{}", analysis.translated_text);
    println!();
    println!("== Scene ==");
    println!("Characters:  {}", details.characters);
    println!("Gestures:    {}", details.gestures);
    println!("Environment: {}", details.environment);
    println!("Lighting:    {}", details.lighting);
    println!("Mood:        {}", details.mood);
    println!();
    println!("== Image prompt ==");
    println!("{}", analysis.image_prompt);
    println!();
    println!("Illustration: {}", describe_image(reading));
}

fn describe_image(reading: &Reading) -> String {
    match image::load_from_memory_with_format(reading.image.bytes(), ImageFormat::Png) {
        Ok(decoded) => format!(
            "{} {}x{}, {} bytes",
            reading.image.mime_type(),
            decoded.width(),
            decoded.height(),
            reading.image.byte_len()
        ),
        Err(_) => format!(
            "{}, {} bytes",
            reading.image.mime_type(),
            reading.image.byte_len()
        ),
    }
}

fn save_image(reading: &Reading, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    fs::write(path, reading.image.bytes())
        .with_context(|| format!("failed to write {}", path.display()))
}

fn read_passage(text: Option<&str>, file: Option<&Path>) -> Result<String> {
    if let Some(text) = text {
        return Ok(text.to_string());
    }
    if let Some(path) = file {
        return fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()));
    }
    let mut buffer = String::new();
    io::stdin()
        .read_to_string(&mut buffer)
        .context("failed to read passage from stdin")?;
    Ok(buffer)
}

fn read_image_input(path: &Path) -> Result<ImageInput> {
    let mime_type = mime_for_path(path)?;
    let bytes = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    Ok(ImageInput {
        bytes,
        mime_type: mime_type.to_string(),
    })
}

fn mime_for_path(path: &Path) -> Result<&'static str> {
    let format = ImageFormat::from_path(path)
        .with_context(|| format!("unrecognised image type: {}", path.display()))?;
    match format {
        ImageFormat::Png | ImageFormat::Jpeg | ImageFormat::WebP => Ok(format.to_mime_type()),
        other => bail!(
            "unsupported image type {other:?} for {} (use PNG, JPEG or WebP)",
            path.display()
        ),
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;
    use std::sync::Arc;

    use clap::Parser;
    use reader_contracts::{AnalysisResult, Language, ReaderError, SessionPhase};
    use reader_engine::{AnalysisClient, DryrunImageClient, ReadingSession, SubmitOutcome};

    use super::{
        await_reading, mime_for_path, progress_label, progress_quote, read_passage, Cli, Command,
    };

    struct CrashingAnalysis;

    impl AnalysisClient for CrashingAnalysis {
        fn name(&self) -> &str {
            "crashing"
        }

        fn analyze_from_image(
            &self,
            _image_bytes: &[u8],
            _mime_type: &str,
            _target_language: Language,
        ) -> Result<AnalysisResult, ReaderError> {
            panic!("analysis crashed");
        }

        fn analyze_from_text(
            &self,
            _raw_text: &str,
            _target_language: Language,
        ) -> Result<AnalysisResult, ReaderError> {
            panic!("analysis crashed");
        }
    }

    #[test]
    fn await_reading_returns_when_the_worker_crashes() {
        let mut session = ReadingSession::new(
            Arc::new(CrashingAnalysis),
            Arc::new(DryrunImageClient::default()),
        );
        let updates = session.subscribe();
        assert_eq!(
            session.submit("Call me Ishmael.", Language::English),
            SubmitOutcome::Started
        );

        let state = await_reading(&mut session, &updates, Language::English);
        assert_eq!(state.phase(), SessionPhase::Error);
        assert_eq!(session.submit("Again", Language::English), SubmitOutcome::Busy);
    }

    #[test]
    fn page_images_map_to_gemini_mime_types() {
        assert_eq!(mime_for_path(Path::new("page.PNG")).unwrap(), "image/png");
        assert_eq!(mime_for_path(Path::new("page.jpg")).unwrap(), "image/jpeg");
        assert_eq!(mime_for_path(Path::new("page.webp")).unwrap(), "image/webp");
        assert!(mime_for_path(Path::new("page.txt")).is_err());
        assert!(mime_for_path(Path::new("page.gif")).is_err());
    }

    #[test]
    fn progress_follows_phase_and_language() {
        assert_eq!(
            progress_label(SessionPhase::Analyzing, Language::English),
            "Deciphering Text"
        );
        assert_eq!(
            progress_label(SessionPhase::Painting, Language::Spanish),
            "Renderizando Visión"
        );
        assert_eq!(progress_quote(Language::German, 5), "Die Seele der Worte übersetzen...");
    }

    #[test]
    fn passage_comes_from_text_or_file() -> anyhow::Result<()> {
        assert_eq!(read_passage(Some("Call me Ishmael."), None)?, "Call me Ishmael.");

        let temp = tempfile::tempdir()?;
        let path = temp.path().join("passage.txt");
        fs::write(&path, "It was a dark and stormy night.\n")?;
        assert_eq!(
            read_passage(None, Some(&path))?,
            "It was a dark and stormy night.\n"
        );
        Ok(())
    }

    #[test]
    fn read_defaults_to_spanish() {
        let cli = Cli::try_parse_from(["reader-rs", "read", "--text", "Hola"]).unwrap();
        let Command::Read(args) = cli.command else {
            panic!("expected read");
        };
        assert_eq!(args.session.lang, Language::Spanish);
        assert_eq!(args.text.as_deref(), Some("Hola"));
    }

    #[test]
    fn lang_flag_accepts_codes_and_labels() {
        for (raw, expected) in [("ENG", Language::English), ("Français", Language::French)] {
            let cli =
                Cli::try_parse_from(["reader-rs", "console", "--lang", raw]).unwrap();
            let Command::Console(args) = cli.command else {
                panic!("expected console");
            };
            assert_eq!(args.session.lang, expected);
        }
        assert!(Cli::try_parse_from(["reader-rs", "read", "--text", "x", "--file", "y"]).is_err());
    }
}
