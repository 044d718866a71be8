use tracing_subscriber::EnvFilter;

/// Install the global subscriber. `RUST_LOG` refines the filter;
/// `LOG_FORMAT=json` switches to line-delimited JSON for log shippers.
pub fn init() {
    let filter = EnvFilter::from_default_env().add_directive("reefchat=info".parse().unwrap());
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    if json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
