use std::io::Write;

use env_logger::Env;

/// Initialize logging to stderr.
///
/// `RUST_LOG` wins when set; otherwise warnings only, or debug detail with `verbose`.
pub fn init_logging(verbose: bool) {
    let default_level = default_filter(verbose);
    let _ = env_logger::Builder::from_env(Env::default().default_filter_or(default_level))
        .format(|buf, record| {
            writeln!(
                buf,
                "{} [{}] {} - {}",
                buf.timestamp_millis(),
                record.level(),
                record.target(),
                record.args()
            )
        })
        .try_init();
}

fn default_filter(verbose: bool) -> &'static str {
    if verbose {
        "debug"
    } else {
        "warn"
    }
}
