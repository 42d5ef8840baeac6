use std::fs;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use promptcraft_contracts::events::{EventPayload, EventWriter};
use promptcraft_contracts::hints::PromptTemplate;
use promptcraft_contracts::models::{
    ModelRegistry, ModelSelector, CAPABILITY_EDIT, CAPABILITY_IMAGE, CAPABILITY_TEXT,
    CAPABILITY_VIDEO, CAPABILITY_VISION,
};
use promptcraft_contracts::request::{
    is_known_aspect_ratio, GenerationRequest, ImageAnalyzeRequest, ImageEditRequest,
    ImageGenerateRequest, InlineImage, SuggestionContext, SuggestionRequest, TextEditRequest,
    VideoGenerateRequest, ASPECT_RATIOS, DEFAULT_ASPECT_RATIO, DEFAULT_IMAGE_MIME,
    DEFAULT_TEXT_TEMPERATURE, DEFAULT_VIDEO_RESOLUTION,
};
use promptcraft_contracts::results::{GenerationResult, Invocation};
use promptcraft_contracts::suggestions::SuggestionMode;
use promptcraft_engine::{
    BackendConnector, CancellationToken, CredentialResolver, CredentialSelector, CredentialSlot,
    EngineConfig, GeminiConnector, HintSubject, SuggestionGenerator, SyncInvoker,
    VideoJobOrchestrator,
};
use reqwest::blocking::Client as HttpClient;
use serde_json::{json, Value};
use tracing_subscriber::EnvFilter;

const EXIT_CANCELLED: i32 = 130;

#[derive(Debug, Parser)]
#[command(name = "promptcraft", version, about = "Prompt playground generation CLI")]
struct Cli {
    /// Append JSONL events for this session to the given file.
    #[arg(long, global = true)]
    events: Option<PathBuf>,
    #[arg(long, global = true, env = "PROMPTCRAFT_API_BASE")]
    api_base: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Rewrite one or more texts according to an instruction.
    Text(TextArgs),
    /// Edit images according to an instruction.
    Edit(EditArgs),
    /// Generate an image from a prompt.
    Imagine(ImagineArgs),
    /// Describe or extract information from images.
    Analyze(AnalyzeArgs),
    /// Animate an image into a short video.
    Video(VideoArgs),
    /// Generate a batch of categorized prompt suggestions.
    Suggest(SuggestArgs),
    /// Suggest style keywords for an image prompt.
    Keywords(KeywordsArgs),
    /// Pick the most relevant templates from a catalog.
    Templates(TemplatesArgs),
    /// List known models.
    Models(ModelsArgs),
}

#[derive(Debug, Parser)]
struct TextArgs {
    #[arg(long = "input", required = true)]
    inputs: Vec<String>,
    #[arg(long)]
    instruction: String,
    #[arg(long)]
    model: Option<String>,
    #[arg(long)]
    tone: Option<String>,
    #[arg(long, default_value_t = DEFAULT_TEXT_TEMPERATURE)]
    temperature: f32,
}

#[derive(Debug, Parser)]
struct EditArgs {
    #[arg(long = "image", required = true)]
    images: Vec<PathBuf>,
    #[arg(long)]
    instruction: String,
    #[arg(long)]
    model: Option<String>,
    #[arg(long, default_value = DEFAULT_ASPECT_RATIO)]
    aspect_ratio: String,
    #[arg(long)]
    out: PathBuf,
}

#[derive(Debug, Parser)]
struct ImagineArgs {
    #[arg(long)]
    prompt: String,
    #[arg(long)]
    model: Option<String>,
    #[arg(long, default_value = DEFAULT_ASPECT_RATIO)]
    aspect_ratio: String,
    #[arg(long)]
    negative: Option<String>,
    #[arg(long)]
    seed: Option<i64>,
    #[arg(long)]
    temperature: Option<f32>,
    #[arg(long)]
    out: PathBuf,
}

#[derive(Debug, Parser)]
struct AnalyzeArgs {
    #[arg(long = "image", required = true)]
    images: Vec<PathBuf>,
    #[arg(long)]
    instruction: String,
    #[arg(long)]
    model: Option<String>,
    /// Ask the model for a JSON document.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Parser)]
struct VideoArgs {
    #[arg(long)]
    image: PathBuf,
    #[arg(long)]
    prompt: String,
    #[arg(long)]
    model: Option<String>,
    #[arg(long, default_value = DEFAULT_VIDEO_RESOLUTION)]
    resolution: String,
    /// Seconds between status polls.
    #[arg(long)]
    poll_interval: Option<f64>,
    /// Give up after this many seconds of polling.
    #[arg(long)]
    max_wait: Option<f64>,
    /// Ask for an API key on stdin when none has been selected.
    #[arg(long)]
    select_key: bool,
    /// Download the finished video into this directory.
    #[arg(long)]
    download: Option<PathBuf>,
}

#[derive(Debug, Parser)]
struct SuggestArgs {
    #[arg(long, value_parser = parse_mode)]
    mode: SuggestionMode,
    #[arg(long = "text")]
    texts: Vec<String>,
    #[arg(long = "image")]
    images: Vec<PathBuf>,
    #[arg(long)]
    model: Option<String>,
    /// Print the raw batch as JSON instead of a listing.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Parser)]
struct KeywordsArgs {
    #[arg(long, default_value = "")]
    prompt: String,
}

#[derive(Debug, Parser)]
struct TemplatesArgs {
    /// JSON array of `{id, label, prompt}` objects.
    #[arg(long)]
    catalog: PathBuf,
    #[arg(long, conflicts_with = "image")]
    text: Option<String>,
    #[arg(long)]
    image: Option<PathBuf>,
}

#[derive(Debug, Parser)]
struct ModelsArgs {
    #[arg(long)]
    capability: Option<String>,
}

fn main() {
    init_tracing();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("promptcraft error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .try_init();
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    let mut config = EngineConfig::from_env();
    if let Some(api_base) = cli.api_base.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
        config.api_base = api_base.trim_end_matches('/').to_string();
    }
    let session = Session::new(config, cli.events.as_deref());

    match cli.command {
        Command::Text(args) => run_text(&session, args),
        Command::Edit(args) => run_edit(&session, args),
        Command::Imagine(args) => run_imagine(&session, args),
        Command::Analyze(args) => run_analyze(&session, args),
        Command::Video(args) => run_video(&session, args),
        Command::Suggest(args) => run_suggest(&session, args),
        Command::Keywords(args) => run_keywords(&session, args),
        Command::Templates(args) => run_templates(&session, args),
        Command::Models(args) => run_models(&session, args),
    }
}

/// Shared per-invocation state: config, credential slot, and event log.
struct Session {
    config: EngineConfig,
    slot: CredentialSlot,
    connector: Arc<dyn BackendConnector>,
    selector: ModelSelector,
    events: Option<EventWriter>,
}

impl Session {
    fn new(config: EngineConfig, events_path: Option<&Path>) -> Self {
        let events = events_path
            .map(|path| EventWriter::new(path, uuid::Uuid::new_v4().to_string()));
        Self {
            connector: Arc::new(GeminiConnector::from_config(&config)),
            config,
            slot: CredentialSlot::new(),
            selector: ModelSelector::new(Some(ModelRegistry::default())),
            events,
        }
    }

    fn credentials(&self) -> CredentialResolver {
        CredentialResolver::from_environment(self.slot.clone())
    }

    fn invoker(&self) -> SyncInvoker {
        SyncInvoker::new(self.credentials(), self.connector.clone())
            .with_registry(self.selector.registry.clone())
    }

    fn suggestions(&self) -> SuggestionGenerator {
        SuggestionGenerator::new(self.credentials(), self.connector.clone())
    }

    fn model(&self, requested: Option<&str>, capability: &str) -> Result<String> {
        let selection = self.selector.select(requested, capability, true)?;
        if let (Some(reason), Some(_)) = (selection.fallback_reason.as_deref(), requested) {
            eprintln!("{reason} Using {}.", selection.model.name);
        }
        Ok(selection.model.name)
    }

    fn record(&self, event_type: &str, payload: Value) {
        if let Some(events) = self.events.as_ref() {
            let payload: EventPayload = payload.as_object().cloned().unwrap_or_default();
            events.record(event_type, payload);
        }
    }

    /// Runs one synchronous request, bracketing it with events.
    fn invoke(&self, request: GenerationRequest) -> Result<Invocation> {
        let kind = request.kind().as_str();
        let model = request.model().to_string();
        self.record("generation_started", json!({"kind": kind, "model": model}));
        match self.invoker().invoke(&request) {
            Ok(invocation) => {
                self.record("generation_completed", json!({"kind": kind, "model": model}));
                Ok(invocation)
            }
            Err(err) => {
                self.record(
                    "generation_failed",
                    json!({"kind": kind, "model": model, "error": format!("{err:#}")}),
                );
                Err(err)
            }
        }
    }
}

fn run_text(session: &Session, args: TextArgs) -> Result<i32> {
    let model = session.model(args.model.as_deref(), CAPABILITY_TEXT)?;
    let mut request = TextEditRequest::new(args.inputs, args.instruction).with_model(model);
    request.temperature = args.temperature;
    if let Some(tone) = args.tone {
        request = request.with_tone(tone);
    }
    let invocation = session.invoke(GenerationRequest::TextEdit(request))?;
    print_text(invocation.text());
    Ok(0)
}

fn run_edit(session: &Session, args: EditArgs) -> Result<i32> {
    ensure_aspect_ratio(&args.aspect_ratio)?;
    let model = session.model(args.model.as_deref(), CAPABILITY_EDIT)?;
    let mut request = ImageEditRequest::new(load_images(&args.images)?, args.instruction);
    request.model = model;
    request.aspect_ratio = args.aspect_ratio;
    let invocation = session.invoke(GenerationRequest::ImageEdit(request))?;
    report_media(invocation.into_media().unwrap_or_default(), &args.out, "edit")?;
    Ok(0)
}

fn run_imagine(session: &Session, args: ImagineArgs) -> Result<i32> {
    ensure_aspect_ratio(&args.aspect_ratio)?;
    let model = session.model(args.model.as_deref(), CAPABILITY_IMAGE)?;
    let mut request = ImageGenerateRequest::new(args.prompt);
    request.model = model;
    request.aspect_ratio = args.aspect_ratio;
    request.negative_prompt = args.negative;
    request.seed = args.seed;
    request.temperature = args.temperature;
    let invocation = session.invoke(GenerationRequest::ImageGenerate(request))?;
    report_media(invocation.into_media().unwrap_or_default(), &args.out, "image")?;
    Ok(0)
}

fn run_analyze(session: &Session, args: AnalyzeArgs) -> Result<i32> {
    let model = session.model(args.model.as_deref(), CAPABILITY_VISION)?;
    let mut request = ImageAnalyzeRequest::new(load_images(&args.images)?, args.instruction);
    request.model = model;
    request.json_output = args.json;
    let invocation = session.invoke(GenerationRequest::ImageAnalyze(request))?;
    print_text(invocation.text());
    Ok(0)
}

fn run_video(session: &Session, args: VideoArgs) -> Result<i32> {
    let model = session.model(args.model.as_deref(), CAPABILITY_VIDEO)?;
    let mut request = VideoGenerateRequest::new(load_image(&args.image)?, args.prompt);
    request.model = model;
    request.resolution = args.resolution;

    let mut config = session.config.clone();
    if let Some(seconds) = args.poll_interval {
        config.poll_interval = positive_seconds(seconds, "--poll-interval")?;
    }
    if let Some(seconds) = args.max_wait {
        config.max_wait = Some(positive_seconds(seconds, "--max-wait")?);
    }

    let token = CancellationToken::new();
    let lines = spawn_stdin_listener(token.clone());
    let mut orchestrator =
        VideoJobOrchestrator::from_config(&config, session.credentials(), session.connector.clone());
    if args.select_key {
        orchestrator = orchestrator.with_selector(Arc::new(StdinCredentialSelector {
            slot: session.slot.clone(),
            lines: Mutex::new(lines),
        }));
    }
    if let Some(events) = session.events.clone() {
        orchestrator = orchestrator.with_events(events);
    }

    eprintln!("Submitting video job (type 'c' + Enter to cancel)...");
    let outcome = orchestrator.run(&request, &token, |status| {
        eprintln!("Rendering video... (state: {status})");
    });
    let uri = match outcome {
        Ok(uri) => uri,
        Err(err) if err.is_cancelled() => {
            eprintln!("Video generation cancelled.");
            return Ok(EXIT_CANCELLED);
        }
        Err(err) => return Err(err.into()),
    };

    println!("{uri}");
    if let Some(dir) = args.download.as_deref() {
        let path = download_video(&uri, dir, config.request_timeout)?;
        eprintln!("Saved {}", path.display());
    }
    Ok(0)
}

fn run_suggest(session: &Session, args: SuggestArgs) -> Result<i32> {
    let model = session.model(args.model.as_deref(), CAPABILITY_TEXT)?;
    let context = SuggestionContext {
        texts: args.texts,
        images: load_images(&args.images)?,
    };
    let mut request = SuggestionRequest::new(args.mode, context);
    request.model = model;
    let batch = session.suggestions().generate_suggestions(&request);
    session.record(
        "suggestions_generated",
        json!({"mode": args.mode.as_str(), "categories": batch.len()}),
    );

    if args.json {
        println!("{}", serde_json::to_string_pretty(&batch.categories)?);
        return Ok(0);
    }
    if batch.is_empty() {
        eprintln!("No suggestions available.");
        return Ok(0);
    }
    for category in &batch.categories {
        println!("## {}", category.name);
        for item in &category.items {
            println!("{} {}: {}", item.emoji, item.title, item.prompt);
        }
        println!();
    }
    Ok(0)
}

fn run_keywords(session: &Session, args: KeywordsArgs) -> Result<i32> {
    for keyword in session.suggestions().suggest_image_keywords(&args.prompt) {
        println!("{keyword}");
    }
    Ok(0)
}

fn run_templates(session: &Session, args: TemplatesArgs) -> Result<i32> {
    let templates = load_template_catalog(&args.catalog)?;
    let subject = match (args.text, args.image) {
        (Some(text), None) => HintSubject::Text(text),
        (None, Some(path)) => HintSubject::Image(load_image(&path)?),
        _ => bail!("templates needs either --text or --image"),
    };
    let ids = session
        .suggestions()
        .suggest_relevant_templates(&subject, &templates);
    for id in ids {
        let label = templates
            .iter()
            .find(|template| template.id == id)
            .map(|template| template.label.as_str())
            .unwrap_or_default();
        println!("{id}\t{label}");
    }
    Ok(0)
}

fn run_models(session: &Session, args: ModelsArgs) -> Result<i32> {
    let capability = args.capability.as_deref().map(str::trim);
    for model in session.selector.registry.list() {
        if let Some(capability) = capability {
            if !model.supports(capability) {
                continue;
            }
        }
        println!("{}\t{}\t{}", model.name, model.label, model.capabilities.join(","));
    }
    Ok(0)
}

/// Reads stdin on a background thread. Cancel commands trip the token;
/// any other line is forwarded for the credential prompt.
fn spawn_stdin_listener(token: CancellationToken) -> Receiver<String> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else {
                break;
            };
            if is_cancel_command(&line) {
                token.cancel();
                continue;
            }
            // Nobody may be listening when no credential prompt is active.
            let _ = tx.send(line);
        }
    });
    rx
}

fn is_cancel_command(line: &str) -> bool {
    matches!(line.trim().to_ascii_lowercase().as_str(), "c" | "cancel" | "/cancel")
}

struct StdinCredentialSelector {
    slot: CredentialSlot,
    lines: Mutex<Receiver<String>>,
}

impl CredentialSelector for StdinCredentialSelector {
    fn has_selected_credential(&self) -> bool {
        self.slot.is_set()
    }

    fn prompt_for_credential(&self) -> Result<()> {
        eprint!("Paste an API key for video generation: ");
        io::stderr().flush().ok();
        let lines = self.lines.lock().unwrap_or_else(PoisonError::into_inner);
        let key = lines
            .recv()
            .context("stdin closed before an API key was entered")?;
        if key.trim().is_empty() {
            bail!("no API key entered");
        }
        self.slot.set(key);
        Ok(())
    }
}

fn load_images(paths: &[PathBuf]) -> Result<Vec<InlineImage>> {
    paths.iter().map(|path| load_image(path)).collect()
}

fn load_image(path: &Path) -> Result<InlineImage> {
    let bytes = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    Ok(InlineImage::from_bytes(&bytes, sniff_mime(&bytes, path)))
}

fn sniff_mime(bytes: &[u8], path: &Path) -> String {
    if let Ok(format) = image::guess_format(bytes) {
        return format.to_mime_type().to_string();
    }
    let ext = path
        .extension()
        .and_then(|value| value.to_str())
        .map(|value| value.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        "gif" => "image/gif",
        "heic" => "image/heic",
        _ => DEFAULT_IMAGE_MIME,
    }
    .to_string()
}

fn load_template_catalog(path: &Path) -> Result<Vec<PromptTemplate>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read template catalog {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("template catalog {} is not a JSON array of templates", path.display()))
}

fn ensure_aspect_ratio(value: &str) -> Result<()> {
    if !is_known_aspect_ratio(value) {
        bail!(
            "unsupported aspect ratio '{value}' (expected one of {})",
            ASPECT_RATIOS.join(", ")
        );
    }
    Ok(())
}

fn positive_seconds(value: f64, flag: &str) -> Result<Duration> {
    if !value.is_finite() || value <= 0.0 {
        bail!("{flag} must be a positive number of seconds");
    }
    Ok(Duration::from_secs_f64(value))
}

fn parse_mode(raw: &str) -> std::result::Result<SuggestionMode, String> {
    SuggestionMode::parse(raw).ok_or_else(|| {
        let known = SuggestionMode::ALL
            .iter()
            .map(|mode| mode.as_str())
            .collect::<Vec<&str>>()
            .join(", ");
        format!("unknown mode '{raw}' (expected one of {known})")
    })
}

fn print_text(text: &str) {
    if text.trim().is_empty() {
        eprintln!("No text response generated.");
    } else {
        println!("{text}");
    }
}

fn report_media(result: GenerationResult, out_dir: &Path, stem: &str) -> Result<()> {
    if let Some(text) = result.text.as_deref() {
        println!("{text}");
    }
    match result.image.as_ref() {
        Some(image) => {
            let path = write_image(image, out_dir, stem)?;
            println!("{}", path.display());
        }
        None if result.is_empty() => eprintln!("The model returned neither text nor an image."),
        None => {}
    }
    Ok(())
}

fn write_image(image: &InlineImage, out_dir: &Path, stem: &str) -> Result<PathBuf> {
    let bytes = image.decode()?;
    match image::load_from_memory(&bytes) {
        Ok(decoded) => tracing::debug!(
            width = decoded.width(),
            height = decoded.height(),
            "decoded generated image"
        ),
        Err(err) => tracing::warn!("generated image could not be decoded locally: {err}"),
    }
    fs::create_dir_all(out_dir)
        .with_context(|| format!("failed to create {}", out_dir.display()))?;
    let path = out_dir.join(format!("{stem}-{}.{}", short_id(), image.extension()));
    fs::write(&path, bytes).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(path)
}

fn download_video(uri: &str, out_dir: &Path, timeout: Duration) -> Result<PathBuf> {
    let http = HttpClient::builder()
        .timeout(timeout)
        .build()
        .context("failed to build HTTP client")?;
    let response = http.get(uri).send().context("video download failed")?;
    let status = response.status();
    if !status.is_success() {
        bail!("video download failed ({})", status.as_u16());
    }
    let bytes = response.bytes().context("video download body read failed")?;
    fs::create_dir_all(out_dir)
        .with_context(|| format!("failed to create {}", out_dir.display()))?;
    let path = out_dir.join(format!("video-{}.mp4", short_id()));
    fs::write(&path, &bytes).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(path)
}

fn short_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..8].to_string()
}
