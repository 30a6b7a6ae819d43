//! Process-wide odds and ends (SPEC_FULL.md §1 "Observability").
//!
//! Mirrors the teacher's `util::init_logger`: timestamped, leveled,
//! one-line-per-event logging via `env_logger`, the only observability
//! surface this server has.

use std::io::Write;

use chrono::Local;

pub fn init_logger() {
    let env = env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, "info");
    env_logger::Builder::from_env(env)
        .format(|buf, record| {
            writeln!(
                buf,
                "{} {} - {}",
                Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
                buf.default_styled_level(record.level()),
                &record.args()
            )
        })
        .init();
    log::info!("env_logger initialized.");
}
