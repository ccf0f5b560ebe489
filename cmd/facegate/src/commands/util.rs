//! Utility functions for CLI commands.

use std::path::Path;
use std::sync::Arc;

use facegate_audit::CsvLog;
use facegate_embed::HttpEmbedder;
use facegate_embedcache::{CacheConfig, CacheError, EmbeddingCache};
use facegate_gallery::DirStore;
use facegate_gate::{Gate, GateConfig, GateError};
use facegate_kv::RedbStore;

use crate::Cli;
use crate::config::{Config, load_config};

/// Exit code when the gallery has nothing to match against.
pub const EXIT_NO_GALLERY_DATA: u8 = 3;
/// Exit code for an image without a detectable face.
pub const EXIT_NO_FACE: u8 = 4;

/// Gets the configuration.
pub fn get_config(cli: &Cli) -> anyhow::Result<Config> {
    load_config(cli.config.as_deref())
}

/// Opens the gate described by the configuration.
pub fn open_gate(cli: &Cli) -> anyhow::Result<Gate> {
    let cfg = get_config(cli)?;
    print_verbose(cli, &format!("config: {}", cfg.path().display()));

    if let Some(parent) = cfg.cache_db.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let store = RedbStore::open_or_reset(&cfg.cache_db)
        .map_err(|e| GateError::Cache(CacheError::from(e)))?;
    let cache = EmbeddingCache::open(
        Box::new(store),
        CacheConfig {
            concurrency: cfg.concurrency,
            ..Default::default()
        },
    );

    let gate = Gate::new(GateConfig {
        gallery: Arc::new(DirStore::new(&cfg.gallery_dir)),
        cache: Arc::new(cache),
        embedder: Arc::new(HttpEmbedder::with_config(cfg.embed())),
        audit: Arc::new(CsvLog::new(&cfg.audit_log)),
        matcher: cfg.matcher(),
        timeout: cfg.timeout(),
    })?;
    Ok(gate)
}

/// Reads an image file. Unreadable paths are invalid input.
pub fn read_image(path: &Path) -> anyhow::Result<Vec<u8>> {
    let bytes = std::fs::read(path).map_err(|e| {
        GateError::InvalidInput(format!("cannot read {}: {}", path.display(), e))
    })?;
    Ok(bytes)
}

/// Maps an error to the process exit code.
pub fn exit_code_for(err: &anyhow::Error) -> u8 {
    if let Some(e) = err.downcast_ref::<GateError>() {
        return e.exit_code();
    }
    if err.downcast_ref::<std::io::Error>().is_some() {
        return 6;
    }
    2
}

/// Outputs result as JSON or YAML.
pub fn output_result<T: serde::Serialize>(result: &T, as_json: bool) -> anyhow::Result<()> {
    let output = if as_json {
        serde_json::to_string_pretty(result)? + "\n"
    } else {
        serde_yaml::to_string(result)?
    };
    print!("{}", output);
    Ok(())
}

/// Prints verbose output if enabled.
pub fn print_verbose(cli: &Cli, msg: &str) {
    if cli.verbose {
        eprintln!("[verbose] {}", msg);
    }
}

/// Prints success message.
pub fn print_success(msg: &str) {
    eprintln!("\x1b[32m✓\x1b[0m {}", msg);
}

/// Prints error message.
pub fn print_error(msg: &str) {
    eprintln!("\x1b[31m✗\x1b[0m {}", msg);
}

/// Prints info message.
pub fn print_info(msg: &str) {
    eprintln!("\x1b[34mℹ\x1b[0m {}", msg);
}

/// Prints warning message.
pub fn print_warning(msg: &str) {
    eprintln!("\x1b[33m⚠\x1b[0m {}", msg);
}
