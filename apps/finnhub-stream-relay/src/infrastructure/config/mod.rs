//! Configuration loading and settings types.

mod settings;

pub use settings::{
    BridgeSettings, ChannelSettings, FinnhubToken, PoolSettings, RefresherSettings, RelayConfig,
    ServerSettings, SinkSettings, WebSocketSettings,
};
