//! Tracing subscriber setup.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

const TARGETS: [&str; 2] = ["cns_e2e", "cns_probe"];

/// Map a `CNS_E2E_LOG` value to a level. Unknown values fall back to info.
fn base_level(value: Option<&str>) -> &'static str {
    match value {
        Some("trace") => "trace",
        Some("debug") => "debug",
        Some("warn") | Some("warning") => "warn",
        Some("error") => "error",
        _ => "info",
    }
}

fn filter_directives(level: &str) -> String {
    TARGETS
        .iter()
        .map(|target| format!("{target}={level}"))
        .collect::<Vec<_>>()
        .join(",")
}

/// Install the global subscriber.
///
/// `RUST_LOG` wins when set; otherwise `CNS_E2E_LOG` sets the level for this
/// workspace's crates. `LOG_FORMAT=json` switches to JSON lines. Output goes
/// to stderr. A second call leaves the first subscriber in place.
pub fn init_tracing() {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        let level = base_level(std::env::var("CNS_E2E_LOG").ok().as_deref());
        EnvFilter::new(filter_directives(level))
    };

    let use_json = std::env::var("LOG_FORMAT").as_deref() == Ok("json");

    if use_json {
        let subscriber = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr));
        let _ = subscriber.try_init();
    } else {
        let subscriber = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr));
        let _ = subscriber.try_init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_mapping() {
        assert_eq!(base_level(Some("debug")), "debug");
        assert_eq!(base_level(Some("warning")), "warn");
        assert_eq!(base_level(Some("loud")), "info");
        assert_eq!(base_level(None), "info");
    }

    #[test]
    fn directives_cover_workspace_crates() {
        assert_eq!(filter_directives("debug"), "cns_e2e=debug,cns_probe=debug");
    }

    #[test]
    fn repeated_init_is_noop() {
        init_tracing();
        init_tracing();
    }
}
