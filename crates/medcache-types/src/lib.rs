//! Shared types for the medcache caching layer.

pub mod clock;
pub mod config;
pub mod events;

pub use clock::{Clock, ManualClock, SharedClock, SystemClock, expires_after};
pub use config::{
    CacheSettings, ConfigProvider, HasCacheConfig, HasSessionConfig, SessionSettings,
    defaults as config_defaults,
};
pub use events::{
    CacheEvent, Observer, ObserverError, ObserverRegistry, RecordingObserver, SessionEvent,
};
