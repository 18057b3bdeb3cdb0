use lambdaflow::engine::config::RunConfig;
use std::path::PathBuf;

pub struct AppConfig {
    pub input_path: PathBuf,
    pub seed: Option<u64>,
    pub core_config: RunConfig,
}
