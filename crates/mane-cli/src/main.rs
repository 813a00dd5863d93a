use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use clap::{Parser, Subcommand};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::DynamicImage;
use mane_contracts::events::EventWriter;
use mane_contracts::history::{HistoryStore, NewHistoryEntry};
use mane_contracts::models::ModelRegistry;
use mane_contracts::transform::{ExtractionResult, Gender, ImageRef, TransformIntent};
use mane_engine::{DryrunBackend, EngineConfig, HttpBackend, TransformPipeline};
use reqwest::blocking::Client as HttpClient;

#[derive(Debug, Parser)]
#[command(name = "mane", version, about = "Hairstyle try-on pipeline CLI")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List the generation backend catalog.
    Models,
    /// Analyze the hair in a photo.
    Analyze(AnalyzeArgs),
    /// Rate the feasibility of a style for a photo.
    Assess(AssessArgs),
    /// Run the full transform: optional assessment, then generation.
    Transform(TransformArgs),
    /// List saved transforms.
    History(HistoryArgs),
}

#[derive(Debug, Parser)]
struct AnalyzeArgs {
    #[arg(long)]
    image: PathBuf,
    #[arg(long, default_value_t = 1536)]
    max_dim: u32,
    #[arg(long)]
    dryrun: bool,
}

#[derive(Debug, Parser)]
struct AssessArgs {
    #[arg(long)]
    image: PathBuf,
    #[arg(long)]
    style: String,
    #[arg(long)]
    gender: String,
    #[arg(long, default_value_t = 1536)]
    max_dim: u32,
    #[arg(long)]
    dryrun: bool,
}

#[derive(Debug, Parser)]
struct TransformArgs {
    #[arg(long)]
    image: PathBuf,
    #[arg(long)]
    reference: Option<PathBuf>,
    #[arg(long)]
    style: String,
    #[arg(long)]
    gender: String,
    #[arg(long)]
    model: Option<String>,
    #[arg(long)]
    out: PathBuf,
    #[arg(long)]
    skip_assessment: bool,
    #[arg(long, default_value_t = 1536)]
    max_dim: u32,
    #[arg(long)]
    history_dir: Option<PathBuf>,
    #[arg(long)]
    dryrun: bool,
}

#[derive(Debug, Parser)]
struct HistoryArgs {
    #[arg(long)]
    dir: Option<PathBuf>,
}

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("mane error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Models => run_models(),
        Command::Analyze(args) => run_analyze(args),
        Command::Assess(args) => run_assess(args),
        Command::Transform(args) => run_transform(args),
        Command::History(args) => run_history(args),
    }
}

fn run_models() -> Result<i32> {
    let registry = ModelRegistry::new(None, EngineConfig::dryrun().generation_model);
    for descriptor in registry.list() {
        println!(
            "{:<20} {:?}/{:?}  {}",
            descriptor.id, descriptor.dialect, descriptor.image_field_shape, descriptor.endpoint
        );
    }
    Ok(0)
}

fn run_analyze(args: AnalyzeArgs) -> Result<i32> {
    let pipeline = build_pipeline(args.dryrun, None)?;
    let photo = load_photo(&args.image, args.max_dim)?;
    let analysis = pipeline.analyze_hair(&photo)?;
    println!("{}", serde_json::to_string_pretty(&analysis)?);
    Ok(0)
}

fn run_assess(args: AssessArgs) -> Result<i32> {
    let pipeline = build_pipeline(args.dryrun, None)?;
    let photo = load_photo(&args.image, args.max_dim)?;
    let gender = parse_gender(&args.gender)?;
    let assessment = pipeline.assess_style(&photo, &args.style, gender)?;
    println!("{}", serde_json::to_string_pretty(&assessment)?);
    Ok(0)
}

fn run_transform(args: TransformArgs) -> Result<i32> {
    fs::create_dir_all(&args.out)
        .with_context(|| format!("failed creating {}", args.out.display()))?;
    let transform_id = format!("transform-{}", timestamp_millis());
    let events = EventWriter::new(args.out.join("events.jsonl"), &transform_id);
    let pipeline = build_pipeline(args.dryrun, Some(events))?;

    let gender = parse_gender(&args.gender)?;
    let intent = TransformIntent {
        source_image: load_photo(&args.image, args.max_dim)?,
        reference_image: args
            .reference
            .as_deref()
            .map(|path| load_photo(path, args.max_dim))
            .transpose()?,
        style_text: args.style.clone(),
        subject_gender: gender,
    };

    let outcome = pipeline.transform(&intent, args.model.as_deref(), !args.skip_assessment)?;

    if let Some(assessment) = &outcome.assessment {
        println!(
            "assessment: realistic={} score={}/10 ({})",
            assessment.is_realistic, assessment.feasibility_score, assessment.reasoning
        );
        if let Some(alternatives) = assessment.alternatives.as_deref() {
            if !assessment.is_realistic && !alternatives.is_empty() {
                println!("  alternatives: {}", alternatives.join(", "));
            }
        }
    }
    if let Some(error) = &outcome.assessment_error {
        eprintln!("assessment skipped: {error}");
    }

    let artifact_path = write_artifact(&args.out, &outcome.result)?;
    match (&outcome.result, &artifact_path) {
        (ExtractionResult::Image(_), Some(path)) => println!("image written to {}", path.display()),
        (ExtractionResult::Text(text), _) => {
            println!("no image produced; model said:\n{text}");
        }
        _ => {}
    }

    let store = HistoryStore::new(
        args.history_dir
            .unwrap_or_else(|| args.out.join("history")),
    );
    let record = store.save(NewHistoryEntry {
        style_text: args.style,
        subject_gender: gender,
        model_id: outcome.model_id,
        result: outcome.result,
        artifact_path: artifact_path
            .as_deref()
            .map(|path| path.to_string_lossy().to_string()),
    })?;
    println!("saved history record {}", record.id);
    Ok(0)
}

fn run_history(args: HistoryArgs) -> Result<i32> {
    let dir = args.dir.unwrap_or_else(|| PathBuf::from("history"));
    let store = HistoryStore::new(&dir);
    let records = store.list()?;
    if records.is_empty() {
        println!("no history records in {}", dir.display());
        return Ok(0);
    }
    for record in records {
        println!(
            "{}  {}  {:<18} {:<6} {}",
            record.created_at,
            record.id,
            record.model_id,
            record.result.kind(),
            record.style_text
        );
    }
    Ok(0)
}

fn build_pipeline(dryrun: bool, events: Option<EventWriter>) -> Result<TransformPipeline> {
    let (config, backend): (EngineConfig, Box<dyn mane_engine::Backend>) = if dryrun {
        (EngineConfig::dryrun(), Box::new(DryrunBackend))
    } else {
        let config = EngineConfig::from_env()?;
        let backend = HttpBackend::new(
            &config.chat_api_base,
            config.chat_api_key.clone(),
            config.generation_api_key.clone(),
            config.request_timeout,
        );
        (config, Box::new(backend))
    };
    let registry = ModelRegistry::new(None, config.generation_model.clone());
    let mut pipeline = TransformPipeline::new(config, registry, backend);
    if let Some(events) = events {
        pipeline = pipeline.with_events(events);
    }
    Ok(pipeline)
}

fn parse_gender(raw: &str) -> Result<Gender> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "male" | "m" => Ok(Gender::Male),
        "female" | "f" => Ok(Gender::Female),
        other => bail!("unrecognized gender '{other}' (expected male or female)"),
    }
}

/// Loads a photo as an inline data URI, downscaling oversized captures
/// in-process so backends never see a multi-megapixel upload. Files the
/// image crate cannot decode are sent as-is with a mime guessed from the
/// extension.
fn load_photo(path: &Path, max_dim: u32) -> Result<ImageRef> {
    let dim = max_dim.max(128);
    if let Ok(decoded) = image::open(path) {
        if decoded.width().max(decoded.height()) > dim {
            let resized = decoded.resize(dim, dim, FilterType::Triangle).to_rgb8();
            let mut bytes = Vec::new();
            let mut encoder = JpegEncoder::new_with_quality(&mut bytes, 90);
            encoder
                .encode_image(&DynamicImage::ImageRgb8(resized))
                .with_context(|| format!("failed re-encoding {}", path.display()))?;
            return Ok(ImageRef::data_uri("image/jpeg", BASE64.encode(bytes)));
        }
    }

    let bytes = fs::read(path).with_context(|| format!("failed reading {}", path.display()))?;
    Ok(ImageRef::data_uri(guess_image_mime(path), BASE64.encode(bytes)))
}

fn guess_image_mime(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|value| value.to_str())
        .map(|value| value.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        "gif" => "image/gif",
        "heic" | "heif" => "image/heic",
        _ => "image/png",
    }
}

/// Persists the extraction result next to the events file: inline images are
/// decoded to disk, hosted images are downloaded, and fallback text is kept
/// for the user to read.
fn write_artifact(out_dir: &Path, result: &ExtractionResult) -> Result<Option<PathBuf>> {
    let stamp = timestamp_millis();
    match result {
        ExtractionResult::Image(ImageRef::DataUri { mime_type, base64 }) => {
            let bytes = BASE64
                .decode(base64.as_bytes())
                .context("result base64 decode failed")?;
            let path = out_dir.join(format!("artifact-{stamp}.{}", extension_for_mime(mime_type)));
            fs::write(&path, bytes).with_context(|| format!("failed writing {}", path.display()))?;
            Ok(Some(path))
        }
        ExtractionResult::Image(ImageRef::HostedUrl { url }) => {
            let response = HttpClient::new()
                .get(url)
                .send()
                .with_context(|| format!("failed downloading {url}"))?;
            if !response.status().is_success() {
                bail!("image download failed ({})", response.status().as_u16());
            }
            let extension = extension_for_mime(
                response
                    .headers()
                    .get(reqwest::header::CONTENT_TYPE)
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("image/png"),
            );
            let bytes = response.bytes().context("failed reading image bytes")?;
            let path = out_dir.join(format!("artifact-{stamp}.{extension}"));
            fs::write(&path, bytes).with_context(|| format!("failed writing {}", path.display()))?;
            Ok(Some(path))
        }
        ExtractionResult::Text(text) => {
            let path = out_dir.join(format!("model-reply-{stamp}.txt"));
            fs::write(&path, text).with_context(|| format!("failed writing {}", path.display()))?;
            Ok(Some(path))
        }
        ExtractionResult::NotFound => Ok(None),
    }
}

fn extension_for_mime(mime: &str) -> &'static str {
    match mime.split(';').next().unwrap_or_default().trim() {
        "image/jpeg" => "jpg",
        "image/webp" => "webp",
        "image/gif" => "gif",
        "image/bmp" => "bmp",
        _ => "png",
    }
}

fn timestamp_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_millis())
        .unwrap_or(0)
}
