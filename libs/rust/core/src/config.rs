//! Layered configuration: defaults set by the caller, then an optional file,
//! then the process environment.

use config::{builder::DefaultState, ConfigBuilder, Environment, File};

/// Env var naming an optional YAML/TOML/JSON config file.
pub const CONFIG_FILE_ENV: &str = "POSTURE_CONFIG_FILE";

/// Returns a builder with the file and environment sources attached.
///
/// Defaults must be applied by the caller with `set_default` before
/// building. Environment keys are matched case-insensitively against field
/// names (`MODEL_URL` -> `model_url`).
pub fn config_builder(service: &str) -> ConfigBuilder<DefaultState> {
    let mut builder = config::Config::builder();
    if let Ok(file) = std::env::var(CONFIG_FILE_ENV) {
        tracing::debug!(service, file = %file, "adding config file source");
        builder = builder.add_source(File::with_name(&file).required(false));
    }
    builder.add_source(Environment::default().try_parsing(true))
}
