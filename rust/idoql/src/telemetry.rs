use once_cell::sync::OnceCell;
use std::env;
use tracing_subscriber::{fmt, EnvFilter};

static INIT: OnceCell<()> = OnceCell::new();

const DEFAULT_DIRECTIVES: &str = "info,tower_http=debug";

/// Installs the global subscriber once. `RUST_LOG` overrides the default
/// directives; `IDOQL_LOG_FORMAT=json` switches to one JSON object per line.
pub fn init_tracing() {
    let _ = INIT.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVES));
        let builder = fmt().with_env_filter(filter).with_target(false);

        if json_requested(env::var("IDOQL_LOG_FORMAT").ok().as_deref()) {
            builder.json().flatten_event(true).init();
        } else {
            builder.init();
        }
    });
}

fn json_requested(format: Option<&str>) -> bool {
    format.is_some_and(|value| value.trim().eq_ignore_ascii_case("json"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_json_switches_the_format() {
        assert!(json_requested(Some("json")));
        assert!(json_requested(Some(" JSON ")));
        assert!(!json_requested(Some("pretty")));
        assert!(!json_requested(None));
    }
}
