//! Relaybus engine: message injection, bounded worker pools and
//! continuation resume on top of `relaybus-core`.

pub mod activity;
pub mod config;
pub mod debug;
pub mod environment;
pub mod handlers;
pub mod logging;
pub mod pool;
pub mod registry;
pub mod traits;
pub mod worker;

pub use activity::{ActivitySnapshot, CallActivity};
pub use config::{EnvironmentConfig, PoolConfig};
pub use debug::DebugSession;
pub use environment::{is_transport_switching, EnvironmentBuilder, MediationEnvironment};
pub use handlers::{HandlerChain, MessageHandler, ObserverChain};
pub use logging::{init_tracing, LogFormat};
pub use pool::{Rejected, Runnable, WorkerPool};
pub use registry::InMemoryConfiguration;
pub use traits::{ComponentKind, DebugManager, RestRequestHandler, StatisticsCollector, TransportSender};
pub use worker::{MediatorWorker, StatisticsCloseListener};
