// Recorder CLI
// Operator client for recorder-server: status, watchlist edits, stops, deletes, uploads and settings

use clap::{Parser, Subcommand};
use colored::*;
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "recorder-cli")]
#[command(about = "Live Recorder operator CLI", long_about = None)]
struct Cli {
    /// Server address (default: 127.0.0.1:8501)
    #[arg(short, long, default_value = "127.0.0.1:8501")]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show service state, active recordings and uploads
    Status,

    /// Enable or pause the supervisor's probing
    ServiceToggle,

    /// List watched channels
    Channels,

    /// Add a channel (name or channel URL)
    Add { name: String },

    /// Remove a channel
    Remove { name: String },

    /// Enable or disable a channel
    Toggle { name: String },

    /// Stop the active recording of a channel
    Stop { channel: String },

    /// List recordings on disk
    Recordings,

    /// Delete a recording
    Delete { id: String },

    /// Upload a recording
    Upload {
        /// Recording id
        id: String,

        /// archive or video-platform
        #[arg(short, long, default_value = "archive")]
        target: String,

        #[arg(long)]
        title: Option<String>,

        #[arg(long)]
        description: Option<String>,

        /// private, unlisted or public
        #[arg(long)]
        privacy: Option<String>,
    },

    /// Show settings, or update them when flags are given
    Settings {
        /// Poll interval in seconds
        #[arg(long)]
        poll_interval: Option<u64>,

        /// Capture format (mp4, ts, mkv)
        #[arg(long)]
        format: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let client = Client::new(&cli.server);

    let ok = match &cli.command {
        Commands::Status => show_status(&client).await,
        Commands::ServiceToggle => toggle_service(&client).await,
        Commands::Channels => list_channels(&client).await,
        Commands::Add { name } => add_channel(&client, name).await,
        Commands::Remove { name } => remove_channel(&client, name).await,
        Commands::Toggle { name } => toggle_channel(&client, name).await,
        Commands::Stop { channel } => stop_recording(&client, channel).await,
        Commands::Recordings => list_recordings(&client).await,
        Commands::Delete { id } => delete_recording(&client, id).await,
        Commands::Upload {
            id,
            target,
            title,
            description,
            privacy,
        } => {
            let body = json!({
                "filename": id,
                "title": title,
                "description": description,
                "privacy": privacy,
            });
            upload(&client, target, body).await
        }
        Commands::Settings {
            poll_interval,
            format,
        } => settings(&client, *poll_interval, format.as_deref()).await,
    };

    if !ok {
        std::process::exit(1);
    }
}

struct Client {
    base: String,
    http: reqwest::Client,
}

impl Client {
    fn new(server: &str) -> Self {
        let base = if server.starts_with("http://") || server.starts_with("https://") {
            server.trim_end_matches('/').to_string()
        } else {
            format!("http://{}", server.trim_end_matches('/'))
        };
        Self {
            base,
            http: reqwest::Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    /// Sends the request and prints failures; returns the body on success.
    async fn send(&self, request: reqwest::RequestBuilder) -> Option<Value> {
        match request.send().await {
            Ok(resp) => {
                let status = resp.status();
                let body = resp.json::<Value>().await.unwrap_or(Value::Null);
                if status.is_success() {
                    Some(body)
                } else {
                    let reason = body["error"].as_str().unwrap_or("unknown error");
                    println!("{} {} ({})", "✗".red(), reason, status);
                    None
                }
            }
            Err(e) => {
                println!("{} Cannot connect to server: {}", "✗".red(), e);
                println!("  Make sure recorder-server is running on {}", self.base);
                None
            }
        }
    }

    async fn get(&self, path: &str) -> Option<Value> {
        self.send(self.http.get(self.url(path))).await
    }

    async fn post(&self, path: &str, body: Option<Value>) -> Option<Value> {
        let request = self.http.post(self.url(path));
        let request = match body {
            Some(body) => request.json(&body),
            None => request,
        };
        self.send(request).await
    }

    async fn delete(&self, path: &str) -> Option<Value> {
        self.send(self.http.delete(self.url(path))).await
    }
}

fn text<'a>(value: &'a Value, key: &str) -> &'a str {
    value[key].as_str().unwrap_or("-")
}

async fn show_status(client: &Client) -> bool {
    let Some(status) = client.get("/api/status").await else {
        return false;
    };

    let enabled = status["service_enabled"].as_bool().unwrap_or(false);
    println!(
        "Service: {}",
        if enabled { "enabled".green() } else { "paused".yellow() }
    );

    println!("\n{}", "Channels".bold());
    for source in status["sources"].as_array().into_iter().flatten() {
        let marker = if source["active"].as_bool().unwrap_or(false) {
            "●".green()
        } else {
            "○".dimmed()
        };
        println!("  {} {:<24} {}", marker, text(source, "name"), text(source, "state"));
    }

    println!("\n{}", "Active recordings".bold());
    let recordings = status["active_recordings"].as_array().cloned().unwrap_or_default();
    if recordings.is_empty() {
        println!("  none");
    }
    for rec in &recordings {
        println!(
            "  {} {:<20} pid {:<8} {}",
            "●".red(),
            text(rec, "channel"),
            rec["pid"],
            text(rec, "folder_name")
        );
    }

    println!("\n{}", "Active uploads".bold());
    match status["active_uploads"].as_object() {
        Some(uploads) if !uploads.is_empty() => {
            for (id, job) in uploads {
                println!(
                    "  {} {} → {} {}% ({})",
                    "↑".cyan(),
                    id,
                    text(job, "target"),
                    job["progress"],
                    text(job, "status")
                );
            }
        }
        _ => println!("  none"),
    }
    true
}

async fn toggle_service(client: &Client) -> bool {
    match client.post("/api/service/toggle", None).await {
        Some(state) => {
            let enabled = state["enabled"].as_bool().unwrap_or(false);
            println!(
                "{} Service {}",
                "✓".green(),
                if enabled { "enabled" } else { "paused" }
            );
            true
        }
        None => false,
    }
}

async fn list_channels(client: &Client) -> bool {
    let Some(channels) = client.get("/api/channels").await else {
        return false;
    };
    let channels = channels.as_array().cloned().unwrap_or_default();
    if channels.is_empty() {
        println!("No channels. Add one with `recorder-cli add <name>`.");
    }
    for channel in &channels {
        let active = channel["active"].as_bool().unwrap_or(false);
        println!(
            "  {} {}",
            if active { "●".green() } else { "○".dimmed() },
            text(channel, "name")
        );
    }
    true
}

async fn add_channel(client: &Client, name: &str) -> bool {
    match client.post("/api/channels", Some(json!({ "channel": name }))).await {
        Some(body) => {
            println!("{} Added {}", "✓".green(), text(&body["channel"], "name"));
            true
        }
        None => false,
    }
}

async fn remove_channel(client: &Client, name: &str) -> bool {
    let path = format!("/api/channels/{}", urlencoding::encode(name));
    match client.delete(&path).await {
        Some(body) => {
            if body["removed"].as_bool().unwrap_or(false) {
                println!("{} Removed {}", "✓".green(), name);
            } else {
                println!("{} {} was not in the watchlist", "✓".green(), name);
            }
            true
        }
        None => false,
    }
}

async fn toggle_channel(client: &Client, name: &str) -> bool {
    let path = format!("/api/channels/toggle/{}", urlencoding::encode(name));
    match client.post(&path, None).await {
        Some(source) => {
            let active = source["active"].as_bool().unwrap_or(false);
            println!(
                "{} {} is now {}",
                "✓".green(),
                name,
                if active { "active" } else { "inactive" }
            );
            true
        }
        None => false,
    }
}

async fn stop_recording(client: &Client, channel: &str) -> bool {
    let path = format!("/api/recording/stop/{}", urlencoding::encode(channel));
    match client.post(&path, None).await {
        Some(outcome) => {
            if outcome["terminated"].as_bool().unwrap_or(false) {
                println!("{} Stopped recording of {} (pid {})", "✓".green(), channel, outcome["pid"]);
            } else {
                println!(
                    "{} Stop sent to {} (pid {}), process may still be exiting",
                    "✓".yellow(),
                    channel,
                    outcome["pid"]
                );
            }
            true
        }
        None => false,
    }
}

fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    format!("{:.1} {}", size, UNITS[unit])
}

async fn list_recordings(client: &Client) -> bool {
    let Some(recordings) = client.get("/api/recordings").await else {
        return false;
    };
    let recordings = recordings.as_array().cloned().unwrap_or_default();
    if recordings.is_empty() {
        println!("No recordings yet.");
    }
    for rec in &recordings {
        let marker = if rec["is_recording"].as_bool().unwrap_or(false) {
            "●".red()
        } else if rec["upload"].is_object() {
            "↑".cyan()
        } else {
            " ".normal()
        };
        println!(
            "{} {:<45} {:>10}  {}",
            marker,
            text(rec, "id"),
            human_size(rec["size_bytes"].as_u64().unwrap_or(0)),
            text(rec, "title")
        );
        if let Some(links) = rec["upload_links"].as_object() {
            for (target, link) in links {
                println!("    {} {}: {}", "↳".dimmed(), target, link.as_str().unwrap_or("-"));
            }
        }
    }
    true
}

async fn delete_recording(client: &Client, id: &str) -> bool {
    let path = format!("/api/recording/{}", urlencoding::encode(id));
    match client.delete(&path).await {
        Some(_) => {
            println!("{} Deleted {}", "✓".green(), id);
            true
        }
        None => false,
    }
}

async fn upload(client: &Client, target: &str, body: Value) -> bool {
    println!("{}", format!("Uploading to {} (this may take a while)...", target).cyan());
    let path = format!("/api/upload/{}", urlencoding::encode(target));
    match client.post(&path, Some(body)).await {
        Some(receipt) => {
            println!("{} {}", "✓".green(), text(&receipt, "message"));
            true
        }
        None => false,
    }
}

async fn settings(client: &Client, poll_interval: Option<u64>, format: Option<&str>) -> bool {
    let result = if poll_interval.is_none() && format.is_none() {
        client.get("/api/settings").await
    } else {
        let mut patch = serde_json::Map::new();
        if let Some(interval) = poll_interval {
            patch.insert("poll_interval_seconds".to_string(), json!(interval));
        }
        if let Some(format) = format {
            patch.insert("capture_format".to_string(), json!(format));
        }
        client.post("/api/settings", Some(Value::Object(patch))).await
    };

    match result {
        Some(settings) => {
            println!("{} Settings", "✓".green());
            println!("  Poll interval: {}s", settings["poll_interval_seconds"]);
            println!("  Capture format: {}", text(&settings, "capture_format"));
            let archive = &settings["upload_targets"]["archive"];
            let configured = !text(archive, "access_key").is_empty() && text(archive, "access_key") != "-";
            println!(
                "  Archive credentials: {}",
                if configured { "configured".green() } else { "missing".yellow() }
            );
            let video = settings["upload_targets"]["video_platform"]["enabled"]
                .as_bool()
                .unwrap_or(false);
            println!(
                "  Video platform: {}",
                if video { "enabled".green() } else { "disabled".yellow() }
            );
            true
        }
        None => false,
    }
}
