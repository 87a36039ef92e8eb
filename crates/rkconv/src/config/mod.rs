pub mod conversion;
pub mod loader;
pub mod schema;

pub use conversion::{ChannelValues, ConversionConfig};
pub use loader::{
    default_config_path, load_config, load_config_from_str, load_or_init_config, validate_config,
    ConfigFormat,
};
pub use schema::{
    default_data_directory, DrainConfig, DrainPolicy, ExecutorConfig, LoggingConfig,
    ServiceConfig,
};
