use time::format_description;
use tracing_subscriber::{fmt, EnvFilter, FmtSubscriber};

pub const LOG_ENV_VAR: &str = "CLEARTAX_LOG";

// Sets up tracing to stderr, filtered by CLEARTAX_LOG (default: info).
//
// EnvFilter syntax, for example:
//
// All targets, debug level:             debug
// Only the matcher at debug:            info,cleartax_fill::matcher=debug
pub fn setup_tracing() {
    let time_format = format_description::parse("[hour]:[minute]:[second].[subsecond digits:3]")
        .expect("Time format description is invalid");
    let timer = fmt::time::UtcTime::new(time_format);

    let filter = EnvFilter::try_from_env(LOG_ENV_VAR).unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = FmtSubscriber::builder()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .with_timer(timer)
        .finish();

    let _ = tracing::subscriber::set_global_default(subscriber);
}
