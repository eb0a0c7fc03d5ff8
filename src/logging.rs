use env_logger::{Builder, Env};
use std::io::Write;

/// Stderr logging; stdout carries the frame replies. `RUST_LOG` overrides the
/// default `info` filter.
pub fn init() {
    Builder::from_env(Env::default().default_filter_or("info"))
        .format(|buf, record| {
            writeln!(
                buf,
                "{} {:<5} [{}] {}",
                buf.timestamp_millis(),
                record.level(),
                record.target(),
                record.args()
            )
        })
        .target(env_logger::Target::Stderr)
        .init();
}
