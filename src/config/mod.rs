pub mod schema;

pub use schema::{
    Config, ConfigError, DatabaseConfig, IdentityDataConfig, OAuthFieldMapping,
    OAuthProviderConfig, ProviderConfig, ServerConfig, SessionConfig, StaticProviderConfig,
    DEFAULT_CONFIG_FILE,
};
