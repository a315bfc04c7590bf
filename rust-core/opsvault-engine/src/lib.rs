// SPDX-License-Identifier: PMPL-1.0-or-later
//
// OpsVault Engine
//
// The composition crate: environment-driven configuration, explicit
// construction of every component (store, wiper, lifecycle manager, disk
// monitor, video streamer), background loop lifetimes, and ordered
// shutdown. Embedding applications construct an [`Engine`] at startup and
// call [`Engine::shutdown`] on exit; nothing in the stack is a global.
//
// # Example
//
// ```no_run
// use opsvault_engine::{Engine, EngineConfig};
// use opsvault_store::{AttrMap, AttrValue, EntityType};
//
// opsvault_engine::init_tracing();
// let config = EngineConfig::new("/var/lib/opsvault")
//     .with_stream_secret(std::env::var("OPSVAULT_STREAM_SECRET").unwrap());
// let engine = Engine::start(config).unwrap();
//
// let attrs: AttrMap = [("name".to_string(), AttrValue::from("analyst-1"))].into();
// engine.store().create(EntityType::Users, "u1", attrs).unwrap();
//
// engine.shutdown();
// ```

pub mod config;
pub mod engine;
pub mod error;

// Re-export the primary public API for ergonomic imports.
pub use config::{
    EngineConfig, ENV_MONITOR_INTERVAL, ENV_ROOT, ENV_STREAM_SECRET, ENV_SWEEP_INTERVAL,
};
pub use engine::{init_tracing, Engine};
pub use error::{EngineError, EngineResult};
