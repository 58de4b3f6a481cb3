//! hardhat - command line client for the PPE detection service
//!
//! Talks to a running `hardhatd` over HTTP. Results can be kept in a
//! local gallery; CLI settings live in a small TOML file.

use std::io::IsTerminal;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;

use hardhat::api::model::{
    BatchPredictionResponse, ComplianceCheckResponse, PredictionResponse, RecentRecordsResponse,
    VideoProcessingResponse,
};
use hardhat::client::{fetch_camera_frame, ApiClient};
use hardhat::compliance::ComplianceReport;
use hardhat::config::ClientConfig;
use hardhat::gallery::{Gallery, GalleryFilter, GalleryRecord, GallerySort};

#[path = "../ui.rs"]
mod ui;

#[derive(Parser)]
#[command(name = "hardhat")]
#[command(about = "PPE compliance detection client", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Print raw JSON payloads instead of human-readable output
    #[arg(long, global = true)]
    json: bool,

    /// Service URL, overriding the settings file
    #[arg(long, global = true, env = "HARDHAT_API_URL")]
    api_url: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Detect PPE in one image
    Predict {
        /// Image file to analyse
        image: PathBuf,
        /// Confidence threshold (overrides the settings file)
        #[arg(long)]
        conf_threshold: Option<f32>,
        /// Evaluate PPE compliance as well
        #[arg(long)]
        check_compliance: bool,
        /// Keep the result and its annotated image in the local gallery
        #[arg(long)]
        save: bool,
    },
    /// Detect PPE and write the annotated image
    Annotate {
        /// Image file to analyse
        image: PathBuf,
        #[arg(long)]
        conf_threshold: Option<f32>,
        /// Output path (default: `<stem>_annotated.jpg` next to the input)
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Process several images in one request
    Batch {
        /// Image files to analyse
        #[arg(required = true)]
        images: Vec<PathBuf>,
        #[arg(long)]
        conf_threshold: Option<f32>,
        /// Evaluate PPE compliance as well
        #[arg(long)]
        check_compliance: bool,
    },
    /// Check PPE compliance for one image
    Compliance {
        /// Image file to analyse
        image: PathBuf,
        #[arg(long)]
        conf_threshold: Option<f32>,
        /// Keep the result in the local gallery
        #[arg(long)]
        save: bool,
    },
    /// Analyse an MJPEG clip frame by frame
    Video {
        /// Clip file to analyse
        clip: PathBuf,
        #[arg(long)]
        conf_threshold: Option<f32>,
        /// Process every Nth frame
        #[arg(long, default_value_t = 1)]
        sample_rate: u32,
        /// Stop after this many processed frames
        #[arg(long, default_value_t = 300)]
        max_frames: u32,
    },
    /// Poll an HTTP camera and run a prediction on each frame
    Watch {
        /// Camera URL (MJPEG stream or still-JPEG endpoint)
        url: String,
        /// Seconds between frames
        #[arg(long, default_value_t = 2)]
        interval_secs: u64,
        /// Stop after this many frames (0 = run until interrupted)
        #[arg(long, default_value_t = 0)]
        count: u64,
        #[arg(long)]
        conf_threshold: Option<f32>,
        /// Evaluate PPE compliance as well
        #[arg(long)]
        check_compliance: bool,
    },
    /// Detection analytics for a trailing window
    Analytics {
        /// Days to cover
        #[arg(long, default_value_t = 7)]
        days: u32,
        /// Only count records from this endpoint
        #[arg(long)]
        endpoint: Option<String>,
    },
    /// Recent detection records
    Recent {
        #[arg(long, default_value_t = 10)]
        limit: u32,
        /// Only show records from this endpoint
        #[arg(long)]
        endpoint: Option<String>,
    },
    /// Service health
    Health,
    /// Detector backend information
    ModelInfo,
    /// Saved results
    #[command(subcommand)]
    Gallery(GalleryCommands),
    /// CLI settings
    #[command(subcommand)]
    Settings(SettingsCommands),
}

#[derive(Subcommand)]
enum GalleryCommands {
    /// List saved results
    List {
        /// Keep only records from this endpoint
        #[arg(long)]
        endpoint: Option<String>,
        /// Keep only records with this compliance outcome
        #[arg(long)]
        compliant: Option<bool>,
        /// Keep only records with at least this many detections
        #[arg(long)]
        min_detections: Option<u32>,
        /// newest | oldest | detections | filename
        #[arg(long, default_value = "newest")]
        sort: String,
    },
    /// Print one saved result in full
    Show {
        /// Record id (the request id it was saved under)
        id: String,
    },
    /// Delete one saved result
    Remove {
        /// Record id
        id: String,
    },
    /// Delete every saved result
    Clear,
}

#[derive(Subcommand)]
enum SettingsCommands {
    /// Print the active settings and their file location
    Show,
    /// Update one setting and persist it
    Set {
        /// api_url | conf_threshold | gallery_dir | timeout_secs
        key: String,
        value: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = ClientConfig::path();
    let cfg = ClientConfig::load(&config_path)?;
    let is_tty = std::io::stderr().is_terminal();
    let progress = ui::Progress::new(is_tty, cli.json);

    match cli.command {
        Commands::Predict {
            image,
            conf_threshold,
            check_compliance,
            save,
        } => {
            let client = api_client(&cfg, cli.api_url.as_deref())?;
            let conf = conf_threshold.unwrap_or(cfg.conf_threshold);
            let response = {
                let _stage = progress.stage("Upload image");
                client.predict(&image, conf, check_compliance)?
            };
            if cli.json {
                print_json(&response)?;
            } else {
                print_prediction(&response);
            }
            if save {
                let annotated = {
                    let _stage = progress.stage("Fetch annotated image");
                    match client.annotate(&image, conf) {
                        Ok(bytes) => Some(bytes),
                        Err(e) => {
                            eprintln!("annotated image unavailable: {e:#}");
                            None
                        }
                    }
                };
                let gallery = Gallery::open(&cfg.gallery_dir)?;
                let record = GalleryRecord::from_prediction(&response, "predict")?;
                gallery.save(record, annotated.as_deref())?;
                eprintln!("saved to gallery as {}", response.request_id);
            }
            Ok(())
        }
        Commands::Annotate {
            image,
            conf_threshold,
            output,
        } => {
            let client = api_client(&cfg, cli.api_url.as_deref())?;
            let conf = conf_threshold.unwrap_or(cfg.conf_threshold);
            let jpeg = {
                let _stage = progress.stage("Upload image");
                client.annotate(&image, conf)?
            };
            let output = output.unwrap_or_else(|| default_annotated_path(&image));
            std::fs::write(&output, jpeg)
                .with_context(|| format!("write {}", output.display()))?;
            println!("annotated image written to {}", output.display());
            Ok(())
        }
        Commands::Batch {
            images,
            conf_threshold,
            check_compliance,
        } => {
            let client = api_client(&cfg, cli.api_url.as_deref())?;
            let conf = conf_threshold.unwrap_or(cfg.conf_threshold);
            let response = {
                let _stage = progress.stage("Upload batch");
                client.predict_batch(&images, conf, check_compliance)?
            };
            if cli.json {
                print_json(&response)?;
            } else {
                print_batch(&response);
            }
            Ok(())
        }
        Commands::Compliance {
            image,
            conf_threshold,
            save,
        } => {
            let client = api_client(&cfg, cli.api_url.as_deref())?;
            let conf = conf_threshold.unwrap_or(cfg.conf_threshold);
            let response = {
                let _stage = progress.stage("Upload image");
                client.check_compliance(&image, conf)?
            };
            if cli.json {
                print_json(&response)?;
            } else {
                print_compliance_check(&response);
            }
            if save {
                let gallery = Gallery::open(&cfg.gallery_dir)?;
                let record = GalleryRecord::from_compliance(&response)?;
                gallery.save(record, None)?;
                eprintln!("saved to gallery as {}", response.request_id);
            }
            Ok(())
        }
        Commands::Video {
            clip,
            conf_threshold,
            sample_rate,
            max_frames,
        } => {
            let client = api_client(&cfg, cli.api_url.as_deref())?;
            let conf = conf_threshold.unwrap_or(cfg.conf_threshold);
            let response = {
                let _stage = progress.stage("Upload clip");
                client.predict_video(&clip, conf, sample_rate, max_frames)?
            };
            if cli.json {
                print_json(&response)?;
            } else {
                print_video(&response);
            }
            Ok(())
        }
        Commands::Watch {
            url,
            interval_secs,
            count,
            conf_threshold,
            check_compliance,
        } => {
            let client = api_client(&cfg, cli.api_url.as_deref())?;
            let conf = conf_threshold.unwrap_or(cfg.conf_threshold);
            let camera = reqwest::blocking::Client::builder()
                .timeout(Duration::from_secs(cfg.timeout_secs))
                .build()
                .context("build camera client")?;

            let mut attempts = 0u64;
            loop {
                match watch_once(&camera, &client, &url, conf, check_compliance, cli.json) {
                    Ok(()) => {}
                    Err(e) => eprintln!("watch: {e:#}"),
                }
                attempts += 1;
                if count != 0 && attempts >= count {
                    break;
                }
                std::thread::sleep(Duration::from_secs(interval_secs));
            }
            Ok(())
        }
        Commands::Analytics { days, endpoint } => {
            let client = api_client(&cfg, cli.api_url.as_deref())?;
            let report = client.analytics(days, endpoint.as_deref())?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Commands::Recent { limit, endpoint } => {
            let client = api_client(&cfg, cli.api_url.as_deref())?;
            let response = client.recent(limit, endpoint.as_deref())?;
            if cli.json {
                print_json(&response)?;
            } else {
                print_recent(&response);
            }
            Ok(())
        }
        Commands::Health => {
            let client = api_client(&cfg, cli.api_url.as_deref())?;
            let health = client.health()?;
            if cli.json {
                print_json(&health)?;
            } else {
                println!("status:    {}", health.status);
                println!(
                    "model:     {}",
                    if health.model_loaded { "loaded" } else { "not loaded" }
                );
                println!("database:  {}", health.database);
                println!("timestamp: {}", health.timestamp);
            }
            Ok(())
        }
        Commands::ModelInfo => {
            let client = api_client(&cfg, cli.api_url.as_deref())?;
            let info = client.model_info()?;
            if cli.json {
                print_json(&info)?;
            } else {
                println!("backend:  {} ({})", info.backend, info.kind);
                println!("classes:  {}", info.num_classes);
                for (id, name) in &info.classes {
                    println!("  {id}: {name}");
                }
                println!("available: {}", info.available_backends.join(", "));
            }
            Ok(())
        }
        Commands::Gallery(command) => run_gallery(command, &cfg, cli.json),
        Commands::Settings(command) => run_settings(command, cfg, &config_path),
    }
}

fn api_client(cfg: &ClientConfig, api_url: Option<&str>) -> Result<ApiClient> {
    match api_url {
        Some(url) => ApiClient::new(url, Duration::from_secs(cfg.timeout_secs)),
        None => ApiClient::from_config(cfg),
    }
}

fn run_gallery(command: GalleryCommands, cfg: &ClientConfig, json: bool) -> Result<()> {
    let gallery = Gallery::open(&cfg.gallery_dir)?;
    match command {
        GalleryCommands::List {
            endpoint,
            compliant,
            min_detections,
            sort,
        } => {
            let filter = GalleryFilter {
                endpoint: endpoint.as_deref(),
                compliant,
                min_detections,
            };
            let records = gallery.list(&filter, parse_sort(&sort)?)?;
            if json {
                print_json(&records)?;
                return Ok(());
            }
            if records.is_empty() {
                println!("gallery is empty");
                return Ok(());
            }
            for record in &records {
                println!(
                    "{}  {}  {:<16} {:<24} {} detection(s)  {}",
                    record.id,
                    record.saved_at.format("%Y-%m-%d %H:%M:%S"),
                    record.endpoint,
                    record.filename,
                    record.detections_count,
                    compliance_word(record.is_compliant),
                );
            }
            Ok(())
        }
        GalleryCommands::Show { id } => {
            let record = gallery
                .get(&id)?
                .ok_or_else(|| anyhow!("no gallery record {}", id))?;
            if json {
                return print_json(&record);
            }
            println!("id:         {}", record.id);
            println!("saved at:   {}", record.saved_at);
            println!("endpoint:   {}", record.endpoint);
            println!("filename:   {}", record.filename);
            println!("detections: {}", record.detections_count);
            println!("compliant:  {}", compliance_word(record.is_compliant));
            if let Some(image) = &record.annotated_image {
                println!("image:      {}", gallery.root().join(image).display());
            }
            println!("{}", serde_json::to_string_pretty(&record.response)?);
            Ok(())
        }
        GalleryCommands::Remove { id } => {
            if gallery.remove(&id)? {
                println!("removed {id}");
            } else {
                println!("no gallery record {id}");
            }
            Ok(())
        }
        GalleryCommands::Clear => {
            let removed = gallery.clear()?;
            println!("removed {removed} record(s)");
            Ok(())
        }
    }
}

fn run_settings(
    command: SettingsCommands,
    mut cfg: ClientConfig,
    config_path: &std::path::Path,
) -> Result<()> {
    match command {
        SettingsCommands::Show => {
            println!("settings file: {}", config_path.display());
            print!("{}", toml::to_string_pretty(&cfg)?);
            Ok(())
        }
        SettingsCommands::Set { key, value } => {
            cfg.set(&key, &value)?;
            cfg.save(config_path)?;
            println!("{key} = {value}");
            Ok(())
        }
    }
}

fn watch_once(
    camera: &reqwest::blocking::Client,
    client: &ApiClient,
    url: &str,
    conf_threshold: f32,
    check_compliance: bool,
    json: bool,
) -> Result<()> {
    let frame = fetch_camera_frame(camera, url)?;
    let response = client.predict_frame(frame, "camera.jpg", conf_threshold, check_compliance)?;
    if json {
        println!("{}", serde_json::to_string(&response)?);
        return Ok(());
    }
    let verdict = match &response.compliance {
        Some(c) if c.is_compliant => "  COMPLIANT",
        Some(_) => "  NON-COMPLIANT",
        None => "",
    };
    println!(
        "[{}] {} detection(s): {} person, {} helmet, {} safety-vest{}",
        response.metrics.timestamp.format("%H:%M:%S"),
        response.detections_count,
        response.summary.person,
        response.summary.helmet,
        response.summary.safety_vest,
        verdict,
    );
    Ok(())
}

fn default_annotated_path(image: &std::path::Path) -> PathBuf {
    let stem = image
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("annotated");
    image.with_file_name(format!("{stem}_annotated.jpg"))
}

fn parse_sort(value: &str) -> Result<GallerySort> {
    Ok(match value {
        "newest" => GallerySort::Newest,
        "oldest" => GallerySort::Oldest,
        "detections" => GallerySort::MostDetections,
        "filename" => GallerySort::Filename,
        other => {
            return Err(anyhow!(
                "unknown sort '{}', expected newest, oldest, detections or filename",
                other
            ))
        }
    })
}

fn compliance_word(state: Option<bool>) -> &'static str {
    match state {
        Some(true) => "compliant",
        Some(false) => "non-compliant",
        None => "-",
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_prediction(response: &PredictionResponse) {
    println!(
        "{}  {} ({}x{} {}, {} KB)",
        response.request_id,
        response.metadata.filename,
        response.metadata.width,
        response.metadata.height,
        response.metadata.format,
        response.metadata.size_kb,
    );
    println!(
        "  {} detection(s): {} person, {} helmet, {} safety-vest",
        response.detections_count,
        response.summary.person,
        response.summary.helmet,
        response.summary.safety_vest,
    );
    for detection in &response.detections {
        println!(
            "    {:<12} {:.3}  [{:.1}, {:.1}, {:.1}, {:.1}]",
            detection.class_name.name(),
            detection.confidence,
            detection.bounding_box.x1,
            detection.bounding_box.y1,
            detection.bounding_box.x2,
            detection.bounding_box.y2,
        );
    }
    if let Some(compliance) = &response.compliance {
        print_compliance(compliance, "  ");
    }
    println!(
        "  processed in {:.2} ms",
        response.metrics.processing_time_ms
    );
}

fn print_compliance(compliance: &ComplianceReport, indent: &str) {
    let verdict = if compliance.is_compliant {
        "COMPLIANT"
    } else {
        "NON-COMPLIANT"
    };
    println!("{indent}{verdict}: {}", compliance.message);
    for violation in &compliance.violations {
        println!("{indent}  violation: {violation}");
    }
    for warning in &compliance.warnings {
        println!("{indent}  warning: {warning}");
    }
    let details = &compliance.details;
    println!(
        "{indent}  persons {} / with helmet {} / with vest {} / fully equipped {}",
        details.total_persons,
        details.persons_with_helmet,
        details.persons_with_vest,
        details.fully_compliant,
    );
}

fn print_compliance_check(response: &ComplianceCheckResponse) {
    println!("{}  {}", response.request_id, response.filename);
    print_compliance(&response.compliance, "  ");
    println!("  processed in {:.2} ms", response.processing_time_ms);
}

fn print_batch(response: &BatchPredictionResponse) {
    println!(
        "batch {}: {} of {} processed, {} failed",
        response.request_id,
        response.processed_images,
        response.total_images,
        response.failed_images,
    );
    for result in &response.results {
        let verdict = match &result.compliance {
            Some(c) if c.is_compliant => "  compliant",
            Some(_) => "  non-compliant",
            None => "",
        };
        println!(
            "  {}  {:<24} {} detection(s){}",
            result.request_id, result.metadata.filename, result.detections_count, verdict,
        );
    }
    println!(
        "  total {:.2} ms, avg {:.2} ms/image",
        response.total_processing_time_ms, response.average_time_per_image_ms,
    );
}

fn print_video(response: &VideoProcessingResponse) {
    println!("{}  {}", response.request_id, response.filename);
    println!(
        "  frames: {} total, {} processed (every {}th at {} fps, {:.2} s)",
        response.metadata.total_frames,
        response.processed_frames,
        response.metadata.sample_rate,
        response.metadata.fps,
        response.metadata.duration_seconds,
    );
    let summary = &response.overall_summary;
    println!(
        "  detections: {} total, avg {:.2} person / {:.2} helmet / {:.2} safety-vest per frame",
        summary.total_detections,
        summary.avg_person_count,
        summary.avg_helmet_count,
        summary.avg_vest_count,
    );
    println!(
        "  compliance: {}/{} frames compliant ({:.2}%)",
        summary.compliant_frames, response.processed_frames, response.compliance_rate,
    );
    println!(
        "  processed in {:.2} s",
        response.processing_time_seconds
    );
}

fn print_recent(response: &RecentRecordsResponse) {
    if response.records.is_empty() {
        println!("no records");
        return;
    }
    for record in &response.records {
        println!(
            "{}  {}  {:<16} {:<24} {} detection(s)  {}",
            record.request_id,
            record.timestamp.format("%Y-%m-%d %H:%M:%S"),
            record.endpoint,
            record.filename,
            record.detections_count,
            compliance_word(record.is_compliant),
        );
    }
}
