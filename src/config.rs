//! Process configuration (§6.2's config object, expanded with the ambient
//! fields a running daemon needs beyond the library's own `{map_size,
//! ingester_threads, flags, ingest_filter_hook, filter_ctx}`). Loaded the
//! way `dolos`'s `src/bin/dolos/common.rs`/`config.rs` load `dolos.toml`:
//! a file source layered under environment overrides, via the `config`
//! crate.

use std::path::PathBuf;

use serde::Deserialize;

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

fn default_map_size() -> u64 {
    32 * 1024 * 1024 * 1024
}

fn default_ingester_threads() -> u32 {
    std::thread::available_parallelism().map(|n| n.get() as u32).unwrap_or(1)
}

fn default_writer_batch_size() -> usize {
    4096
}

fn default_max_subscriptions() -> usize {
    crate::monitor::MAX_SUBSCRIPTIONS
}

fn default_max_filters_per_subscription() -> usize {
    crate::monitor::MAX_FILTERS
}

/// `{map_size, ingester_threads, flags, subscription caps}` from §6.2, plus
/// `data_dir` and `writer_batch_size` — present in every complete
/// deployment even though §6.2 only names the library-level subset.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory the `redb` file and its WAL live under.
    pub data_dir: PathBuf,
    /// `redb`'s backing-file cache size, in bytes.
    pub map_size: u64,
    pub ingester_threads: u32,
    pub writer_batch_size: usize,
    /// Skip Schnorr signature verification unconditionally (§4.3 step 6,
    /// §7's error table).
    pub skip_verification: bool,
    /// Skip running pending migrations on `open()` (§4.9); an operator
    /// escape hatch for inspecting a database at its current version.
    pub no_migrate: bool,
    pub max_subscriptions: usize,
    pub max_filters_per_subscription: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            data_dir: default_data_dir(),
            map_size: default_map_size(),
            ingester_threads: default_ingester_threads(),
            writer_batch_size: default_writer_batch_size(),
            skip_verification: false,
            no_migrate: false,
            max_subscriptions: default_max_subscriptions(),
            max_filters_per_subscription: default_max_filters_per_subscription(),
        }
    }
}

impl Config {
    /// Loads `{dir}/nostrdb.toml` (if present) layered under
    /// `NOSTRDB_*`-prefixed environment overrides (e.g.
    /// `NOSTRDB_INGESTER_THREADS=4`), falling back to defaults for
    /// anything neither source sets.
    pub fn load(config_dir: Option<&std::path::Path>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(dir) = config_dir {
            builder = builder.add_source(
                config::File::from(dir.join("nostrdb")).required(false),
            );
        }
        builder = builder.add_source(config::Environment::with_prefix("NOSTRDB"));
        builder.build()?.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_self_consistent() {
        let config = Config::default();
        assert!(config.ingester_threads >= 1);
        assert_eq!(config.writer_batch_size, 4096);
        assert!(!config.skip_verification);
    }

    #[test]
    fn load_with_no_sources_falls_back_to_defaults() {
        let config = Config::load(None).unwrap();
        assert_eq!(config.writer_batch_size, 4096);
    }
}
