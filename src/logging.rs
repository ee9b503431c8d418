use std::{env, fmt::Display};

use colored::Colorize;
use log::{Level, LevelFilter};

/// Upqueue's own crates, which log at the level chosen with UPQUEUE_LOG
const LOCAL_CRATES: [&str; 4] = ["upqueue", "upqueue_core", "upqueue_collab", "upqueue_server"];
const DEFAULT_LOCAL_LEVEL: LevelFilter = LevelFilter::Info;
/// Dependencies only need to log warnings and errors
const EXTERNAL_LEVEL: LevelFilter = LevelFilter::Warn;

pub fn init_logger() -> Result<(), log::SetLoggerError> {
    let local_level = local_level(env::var("UPQUEUE_LOG").ok().as_deref());

    LOCAL_CRATES
        .iter()
        .fold(fern::Dispatch::new().level(EXTERNAL_LEVEL), |dispatch, name| {
            dispatch.level_for(*name, local_level)
        })
        .format(|out, message, record| {
            out.finish(format_args!(
                "{:^5} {} {:^8} {}",
                level_badge(record.level()),
                chrono::Local::now().format("%H:%M:%S").to_string().bright_black(),
                Target::from_target(record.target()),
                message
            ))
        })
        .chain(std::io::stdout())
        .apply()
}

/// Unknown values fall back to the default, a typo shouldn't keep the server from starting
fn local_level(value: Option<&str>) -> LevelFilter {
    value
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(DEFAULT_LOCAL_LEVEL)
}

#[derive(Debug, PartialEq)]
enum Target<'a> {
    App,
    Core,
    Collab,
    Server,
    External(&'a str),
}

impl<'a> Target<'a> {
    fn from_target(target: &'a str) -> Self {
        match target.split("::").next().unwrap_or_default() {
            "upqueue" => Self::App,
            "upqueue_core" => Self::Core,
            "upqueue_collab" => Self::Collab,
            "upqueue_server" => Self::Server,
            other => Self::External(other),
        }
    }
}

impl Display for Target<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::App => "UPQUEUE".bright_cyan(),
            Self::Core => "CORE".blue(),
            Self::Collab => "COLLAB".bright_purple(),
            Self::Server => "SERVER".bright_green(),
            Self::External(name) => name.dimmed(),
        };

        Display::fmt(&label, f)
    }
}

fn level_badge(level: Level) -> String {
    match level {
        Level::Error => " ERR ".black().on_red().bold().to_string(),
        Level::Warn => " WRN ".black().on_yellow().bold().to_string(),
        Level::Info => " INF ".black().on_blue().bold().to_string(),
        Level::Debug => " DBG ".white().on_black().to_string(),
        Level::Trace => " TRC ".dimmed().to_string(),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_targets_by_crate() {
        assert_eq!(Target::from_target("upqueue"), Target::App);
        assert_eq!(
            Target::from_target("upqueue_core::playback::session"),
            Target::Core
        );
        assert_eq!(Target::from_target("upqueue_collab::streams"), Target::Collab);
        assert_eq!(Target::from_target("upqueue_server"), Target::Server);
        assert_eq!(
            Target::from_target("sqlx::query"),
            Target::External("sqlx")
        );
    }

    #[test]
    fn test_local_level_override() {
        assert_eq!(local_level(None), LevelFilter::Info);
        assert_eq!(local_level(Some("debug")), LevelFilter::Debug);
        assert_eq!(local_level(Some(" TRACE ")), LevelFilter::Trace);
        assert_eq!(local_level(Some("loud")), LevelFilter::Info);
    }
}
