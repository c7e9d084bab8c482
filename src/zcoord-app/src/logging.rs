// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// Parse a config log level, accepting the names tracing understands.
pub fn parse_level(log_level: Option<&str>) -> Option<Level> {
    log_level.and_then(|s| s.trim().parse::<Level>().ok())
}

/// Install the global fmt subscriber.
///
/// Falls back to INFO if the level is missing or invalid. Targets are kept
/// so request/response traces (`zcoord::request`) can be told apart from
/// controller records. Returns false when a subscriber was already set.
pub fn init_logging(log_level: Option<&str>) -> bool {
    let level = parse_level(log_level).unwrap_or(Level::INFO);

    FmtSubscriber::builder()
        .with_target(true)
        .with_max_level(level)
        .try_init()
        .is_ok()
}
