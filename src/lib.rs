pub mod config;
pub mod engine;
pub mod error;
pub mod handlers;
pub mod identifier;
pub mod memory;
pub mod middleware;
pub mod pipeline;
pub mod policy;
pub mod redis;
pub mod response;
pub mod server;
pub mod status;

pub use config::Config;
pub use engine::QuotaEngine;
pub use error::{QuotaError, Result};
pub use identifier::{Identifier, IdentifierResolver, KeyStrategy};
pub use memory::InMemoryEngine;
pub use pipeline::{decorate, RateLimitPipeline};
pub use policy::{FixedPolicy, QuotaPolicy, QuotaPolicyResolver, RoutePolicies};
pub use response::{JsonLimitExceeded, LimitExceededHandler};
pub use self::redis::RedisEngine;
pub use server::create_app;
pub use status::Status;
