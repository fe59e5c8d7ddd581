use chrono::Local;
use env_logger::Builder;
use log::LevelFilter;
use std::io::Write;

/// Crates that log every parsed node or pooled connection at `debug`.
const NOISY_TARGETS: [&str; 4] = ["html5ever", "selectors", "hyper", "reqwest"];

/// Installs the process logger at `info`. `RUST_LOG` overrides it.
pub fn init() {
    init_with(LevelFilter::Info);
}

/// Installs the process logger at `level`. Safe to call more than once; only
/// the first call takes effect.
pub fn init_with(level: LevelFilter) {
    let mut builder = Builder::new();
    builder
        .format(|buf, record| {
            writeln!(
                buf,
                "{} [{}] {} - {}",
                Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.target(),
                record.args()
            )
        })
        .filter(None, level);
    for target in NOISY_TARGETS {
        builder.filter(Some(target), LevelFilter::Warn.min(level));
    }

    if builder.parse_default_env().try_init().is_ok() {
        log::info!("Logger initialized at {}.", level);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_init_is_harmless() {
        init_with(LevelFilter::Debug);
        init();
        log::debug!("still logging");
    }
}
