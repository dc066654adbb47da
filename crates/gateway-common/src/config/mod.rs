//! Configuration structs

mod gateway_config;

pub use gateway_config::{
    AppSettings, ClientIdentity, ConfigError, Credential, EndpointConfig, Environment,
    GatewayConfig, Scheme, TimeoutConfig,
};
