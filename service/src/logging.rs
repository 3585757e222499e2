use crate::config::Config;
use log::LevelFilter;
use simplelog::{ColorChoice, ConfigBuilder, TermLogger, TerminalMode};

/// Log targets owned by this workspace. Below `Trace` only these are
/// printed, so broker, runtime and HTTP stack chatter stays out of the way.
const WORKSPACE_TARGETS: &[&str] = &[
    "chat_core",
    "delivery",
    "domain",
    "events",
    "saga",
    "service",
    "web",
];

pub struct Logger {}

impl Logger {
    pub fn init_logger(config: &Config) {
        TermLogger::init(
            config.log_level_filter,
            Self::log_config(config.log_level_filter),
            TerminalMode::Mixed,
            ColorChoice::Auto,
        )
        .expect("Failed to start simplelog");
        log::debug!(
            "Logger initialised at {} for {} environment, showing {}",
            config.log_level_filter,
            config.runtime_env,
            Self::visible_targets(config.log_level_filter).join(", ")
        );
    }

    /// Targets that pass the filter at `level`; empty means every target.
    fn visible_targets(level: LevelFilter) -> &'static [&'static str] {
        match level {
            LevelFilter::Trace => &[],
            _ => WORKSPACE_TARGETS,
        }
    }

    /// Every line carries its target, e.g. `delivery::router`, so one
    /// component can be followed through interleaved connection logs.
    fn log_config(level: LevelFilter) -> simplelog::Config {
        let mut builder = ConfigBuilder::new();
        builder
            .set_time_format_rfc3339()
            .set_target_level(LevelFilter::Error);

        for target in Self::visible_targets(level) {
            builder.add_filter_allow_str(target);
        }

        builder.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trace_shows_dependencies_too() {
        assert!(Logger::visible_targets(LevelFilter::Trace).is_empty());
    }

    #[test]
    fn lower_levels_keep_to_workspace_crates() {
        for level in [LevelFilter::Error, LevelFilter::Info, LevelFilter::Debug] {
            let visible = Logger::visible_targets(level);
            assert!(visible.contains(&"delivery"));
            assert!(visible.contains(&"chat_core"));
            assert!(!visible.contains(&"hyper"));
        }
    }

    #[test]
    fn every_member_crate_is_visible() {
        let manifest = include_str!("../../Cargo.toml");
        for member in ["events", "delivery", "saga", "domain", "service", "web"] {
            assert!(manifest.contains(&format!("\"{member}\"")));
            assert!(WORKSPACE_TARGETS.contains(&member), "{member} is hidden");
        }
    }

    #[test]
    fn config_builds_for_every_level() {
        let _ = Logger::log_config(LevelFilter::Trace);
        let _ = Logger::log_config(LevelFilter::Warn);
    }
}
