//! env_logger setup shared by the three binaries.

use env_logger::Env;
use std::io::Write;

pub const DEFAULT_LOG_FILTER: &str = "info,nameplane=info";

/// Initializes the process logger. `cli_filter` overrides `RUST_LOG` and
/// the built-in default.
pub fn init_logging(cli_filter: Option<&str>) {
    let env = Env::default().default_filter_or(DEFAULT_LOG_FILTER);
    let mut builder = env_logger::Builder::from_env(env);
    if let Some(filter) = cli_filter {
        builder.parse_filters(filter);
    }
    builder.format(|buf, record| {
        let ts = buf.timestamp();
        writeln!(
            buf,
            "[{} {:<5} {}] {}",
            ts,
            record.level(),
            record.target(),
            record.args()
        )
    });
    builder.init();
}
