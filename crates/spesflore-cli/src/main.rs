use std::collections::HashSet;
use std::fs;
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::thread;

use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use clap::{Args, Parser, Subcommand};
use spesflore_contracts::botany::BotanicalRecord;
use spesflore_contracts::query::Query;
use spesflore_contracts::surface::{help_lines, parse_command, SurfaceCommand};
use spesflore_engine::{
    AnalysisPhase, AnalysisSnapshot, AppOptions, BackendConfig, BatchOutcome, GallerySnapshot,
    Spesflore, SurfaceSignal,
};

#[derive(Debug, Parser)]
#[command(name = "spesflore", version, about = "Botanical identification and discovery")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    Identify(IdentifyArgs),
    Discover(DiscoverArgs),
    Image(ImageArgs),
    Explore(ExploreArgs),
}

#[derive(Debug, Args)]
struct BackendArgs {
    #[arg(long)]
    backend: Option<String>,
    #[arg(long)]
    text_model: Option<String>,
    #[arg(long)]
    image_model: Option<String>,
    #[arg(long)]
    events: Option<PathBuf>,
    #[arg(long)]
    timeout: Option<f64>,
}

#[derive(Debug, Parser)]
struct IdentifyArgs {
    #[arg(long, conflicts_with = "photo", required_unless_present = "photo")]
    query: Option<String>,
    #[arg(long)]
    photo: Option<PathBuf>,
    #[arg(long)]
    out: Option<PathBuf>,
    #[command(flatten)]
    backend: BackendArgs,
}

#[derive(Debug, Parser)]
struct DiscoverArgs {
    #[arg(long, default_value_t = 3)]
    count: usize,
    #[arg(long)]
    exclude: Vec<String>,
    #[command(flatten)]
    backend: BackendArgs,
}

#[derive(Debug, Parser)]
struct ImageArgs {
    #[arg(long)]
    subject: String,
    #[arg(long)]
    out: PathBuf,
    #[command(flatten)]
    backend: BackendArgs,
}

#[derive(Debug, Parser)]
struct ExploreArgs {
    #[arg(long)]
    out: PathBuf,
    #[arg(long, default_value_t = 3)]
    batch_size: usize,
    #[arg(long, default_value_t = 60)]
    gallery_limit: usize,
    #[command(flatten)]
    backend: BackendArgs,
}

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("spesflore error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Identify(args) => run_identify(args),
        Command::Discover(args) => run_discover(args),
        Command::Image(args) => run_image(args),
        Command::Explore(args) => {
            run_explore(args)?;
            Ok(0)
        }
    }
}

fn app_options(args: &BackendArgs, default_events: Option<PathBuf>) -> AppOptions {
    let mut config = BackendConfig::from_env();
    if let Some(backend) = non_empty(args.backend.as_deref()) {
        config.backend = backend.to_ascii_lowercase();
    }
    if let Some(model) = non_empty(args.text_model.as_deref()) {
        config.text_model = Some(model.to_string());
    }
    if let Some(model) = non_empty(args.image_model.as_deref()) {
        config.image_model = Some(model.to_string());
    }
    if let Some(timeout) = args.timeout {
        config = config.with_request_timeout(timeout);
    }
    AppOptions {
        config,
        events_path: args.events.clone().or(default_events),
        ..AppOptions::default()
    }
}

fn run_identify(args: IdentifyArgs) -> Result<i32> {
    let query = match (args.query, args.photo) {
        (Some(text), _) => Query::text(text),
        (None, Some(path)) => Query::image_from_path(&path)?,
        (None, None) => bail!("--query or --photo is required"),
    };
    let app = Spesflore::new(app_options(&args.backend, None))?;
    app.search_blocking(query)?;

    match app.analysis_snapshot().phase {
        AnalysisPhase::Success(record) => {
            println!("{}", render_record(&record));
            if let Some(out) = args.out.as_deref() {
                for path in write_diagrams(&record, out)? {
                    println!("wrote {}", path.display());
                }
            }
            Ok(0)
        }
        AnalysisPhase::Error(message) => {
            eprintln!("{message}");
            Ok(2)
        }
        phase => bail!("identification ended in unexpected phase '{}'", phase.as_str()),
    }
}

fn run_discover(args: DiscoverArgs) -> Result<i32> {
    let app = Spesflore::new(app_options(&args.backend, None))?;
    let plants = app.client().discover_plants(args.count, &args.exclude)?;
    println!("{}", serde_json::to_string_pretty(&plants)?);
    Ok(0)
}

fn run_image(args: ImageArgs) -> Result<i32> {
    let app = Spesflore::new(app_options(&args.backend, None))?;
    let data_uri = app.client().generate_image(&args.subject)?;
    let path = write_data_uri(&data_uri, &args.out)?;
    println!("wrote {}", path.display());
    Ok(0)
}

fn run_explore(args: ExploreArgs) -> Result<()> {
    fs::create_dir_all(&args.out)
        .with_context(|| format!("failed to create {}", args.out.display()))?;
    let mut options = app_options(&args.backend, Some(args.out.join("events.jsonl")));
    options.batch_size = args.batch_size;
    options.gallery_limit = args.gallery_limit;

    // The renderer keeps a handle without a sender so the channel closes once
    // the explorer and its workers are done.
    let base = Spesflore::new(options)?;
    let (tx, rx) = mpsc::channel();
    let app = base.clone().with_signals(tx);
    let mut renderer = Renderer::new(base, args.out.clone());
    thread::spawn(move || {
        for signal in rx {
            if let Err(err) = renderer.handle(signal) {
                eprintln!("render failed: {err:#}");
            }
        }
    });

    app.spawn_mount();
    println!("Spesflore explorer. Type /help for commands.");

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

        match parse_command(line.trim_end_matches(['\n', '\r'])) {
            SurfaceCommand::Noop => {}
            SurfaceCommand::Help => {
                for usage in help_lines() {
                    println!("  {usage}");
                }
            }
            SurfaceCommand::Quit => break,
            SurfaceCommand::Search(text) => {
                if let Err(err) = app.search(Query::text(text)) {
                    println!("{}", err.message());
                }
            }
            SurfaceCommand::Photo(path) => match Query::image_from_path(Path::new(&path)) {
                Ok(query) => {
                    if let Err(err) = app.search(query) {
                        println!("{}", err.message());
                    }
                }
                Err(err) => println!("{err:#}"),
            },
            SurfaceCommand::Select(selector) => {
                if let Err(err) = app.select_gallery_plant(&selector) {
                    println!("{}", err.message());
                }
            }
            SurfaceCommand::More => {
                let handle = app.spawn_request_more_gallery();
                thread::spawn(move || {
                    if let Ok(BatchOutcome::Skipped(skip)) = handle.join() {
                        println!("Galerie en attente ({}).", skip.as_str());
                    }
                });
            }
            SurfaceCommand::Reset => {
                if !app.reset() {
                    println!("Rien à réinitialiser.");
                }
            }
            SurfaceCommand::Show => println!("{}", render_analysis(&app.analysis_snapshot())),
            SurfaceCommand::Gallery => println!("{}", render_gallery(&app.gallery_snapshot())),
            SurfaceCommand::Unknown { command, .. } => {
                println!("Unknown command /{command}. Type /help for commands.");
            }
            SurfaceCommand::Invalid { command, reason } => println!("/{command}: {reason}"),
        }
    }
    Ok(())
}

struct Renderer {
    app: Spesflore,
    out: PathBuf,
    written_previews: HashSet<String>,
    shown_plants: usize,
}

impl Renderer {
    fn new(app: Spesflore, out: PathBuf) -> Self {
        Self {
            app,
            out,
            written_previews: HashSet::new(),
            shown_plants: 0,
        }
    }

    fn handle(&mut self, signal: SurfaceSignal) -> Result<()> {
        match signal {
            SurfaceSignal::ScrollToTop => println!(),
            SurfaceSignal::AnalysisChanged => {
                let snapshot = self.app.analysis_snapshot();
                println!("{}", render_analysis(&snapshot));
                if let AnalysisPhase::Success(record) = &snapshot.phase {
                    let dir = self.out.join(format!("analysis-{}", snapshot.token));
                    for path in write_diagrams(record, &dir)? {
                        println!("wrote {}", path.display());
                    }
                }
            }
            SurfaceSignal::GalleryChanged => {
                let snapshot = self.app.gallery_snapshot();
                for (index, plant) in snapshot.plants.iter().enumerate().skip(self.shown_plants) {
                    println!(
                        "{:>3}. {} ({}) · {}",
                        index + 1,
                        plant.name,
                        plant.scientific,
                        plant.family
                    );
                }
                self.shown_plants = snapshot.plants.len();
                let previews = self.out.join("gallery");
                for plant in &snapshot.plants {
                    let Some(image) = plant.image.as_deref() else {
                        continue;
                    };
                    if !self.written_previews.insert(plant.id.clone()) {
                        continue;
                    }
                    write_data_uri(image, &previews.join(&plant.id))?;
                }
            }
            SurfaceSignal::HeroImageReady => {
                if let Some(hero) = self.app.gallery_snapshot().hero_image {
                    let path = write_data_uri(&hero, &self.out.join("hero"))?;
                    println!("hero image: {}", path.display());
                }
            }
        }
        Ok(())
    }
}

fn render_analysis(snapshot: &AnalysisSnapshot) -> String {
    match &snapshot.phase {
        AnalysisPhase::Idle => "Aucune analyse en cours.".to_string(),
        AnalysisPhase::Loading => match snapshot.query.as_deref().and_then(Query::display_text) {
            Some(text) => format!("Analyse de « {text} »…"),
            None => "Analyse de la photo…".to_string(),
        },
        AnalysisPhase::Success(record) => render_record(record),
        AnalysisPhase::Error(message) => message.clone(),
    }
}

fn render_gallery(snapshot: &GallerySnapshot) -> String {
    if snapshot.plants.is_empty() {
        return if snapshot.busy {
            "Galerie en cours de chargement…".to_string()
        } else {
            "Galerie vide. Tapez /more.".to_string()
        };
    }
    let mut lines = snapshot
        .plants
        .iter()
        .enumerate()
        .map(|(index, plant)| {
            let preview = if plant.has_preview() { "" } else { " [sans image]" };
            format!(
                "{:>3}. {} ({}) · {}{preview}",
                index + 1,
                plant.name,
                plant.scientific,
                plant.family
            )
        })
        .collect::<Vec<String>>();
    if snapshot.busy {
        lines.push("     …".to_string());
    }
    lines.join("\n")
}

fn render_record(record: &BotanicalRecord) -> String {
    let vegetative = &record.vegetative_apparatus;
    let reproductive = &record.reproductive_apparatus;
    [
        format!("{} ({})", record.common_name, record.scientific_name),
        format!("Famille : {}", record.family),
        format!("Formule florale : {}", record.floral_formula),
        "Appareil végétatif".to_string(),
        format!("  Racine : {}", vegetative.root),
        format!("  Tige : {}", vegetative.stem),
        format!("  Feuilles : {}", vegetative.leaves),
        "Appareil reproducteur".to_string(),
        format!("  Fleur : {}", reproductive.flower),
        format!("  Fruit : {}", reproductive.fruit),
        format!(
            "  Inflorescence : {} ({})",
            reproductive.inflorescence.description,
            reproductive.inflorescence.parts.join(", ")
        ),
        format!(
            "  Ovaire : {} {}",
            reproductive.ovary.description, reproductive.ovary.section_details
        ),
    ]
    .join("\n")
}

fn write_diagrams(record: &BotanicalRecord, dir: &Path) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
    record
        .diagrams()
        .into_iter()
        .map(|(kind, svg)| {
            let path = dir.join(format!("{kind}.svg"));
            fs::write(&path, svg).with_context(|| format!("failed to write {}", path.display()))?;
            Ok(path)
        })
        .collect()
}

fn decode_data_uri(data_uri: &str) -> Result<(String, Vec<u8>)> {
    let Some(rest) = data_uri.trim().strip_prefix("data:") else {
        bail!("not a data URI");
    };
    let Some((mime, payload)) = rest.split_once(";base64,") else {
        bail!("data URI is not base64 encoded");
    };
    let bytes = BASE64
        .decode(payload.trim())
        .context("data URI payload is not valid base64")?;
    Ok((mime.to_string(), bytes))
}

fn extension_for_mime(mime: &str) -> &'static str {
    match mime.trim().to_ascii_lowercase().as_str() {
        "image/png" => "png",
        "image/jpeg" | "image/jpg" => "jpg",
        "image/webp" => "webp",
        "image/gif" => "gif",
        _ => "bin",
    }
}

fn write_data_uri(data_uri: &str, target: &Path) -> Result<PathBuf> {
    let (mime, bytes) = decode_data_uri(data_uri)?;
    let path = target.with_extension(extension_for_mime(&mime));
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    fs::write(&path, bytes).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(path)
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}
