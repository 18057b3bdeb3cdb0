mod builder;
mod defaults;
mod file;
mod models;

pub use builder::build_config;
pub use defaults::DefaultsConfig;
pub use file::{
    FileConfig, FileDynamicsConfig, FileEquilibrationConfig, FileLambdaConfig, FileOutputConfig,
    FileResourceConfig, TimeValue,
};
pub use models::AppConfig;
