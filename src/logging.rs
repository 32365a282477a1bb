use std::env;
use tracing_subscriber::EnvFilter;

fn flag_enabled(value: &str) -> bool {
    matches!(value, "1" | "true" | "TRUE" | "yes" | "YES")
}

fn filter() -> EnvFilter {
    let debug_enabled = env::var("RECORDER_DEBUG_LOG")
        .map(|value| flag_enabled(&value))
        .unwrap_or(false);
    if debug_enabled {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

/// Installs the global subscriber. `LOG_FORMAT=json` switches to JSON lines.
pub fn init() {
    let json = env::var("LOG_FORMAT")
        .map(|value| value.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let builder = tracing_subscriber::fmt().with_env_filter(filter());
    let installed = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    if let Err(e) = installed {
        eprintln!("Logging already initialized: {}", e);
    }
}
