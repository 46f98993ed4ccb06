mod actor;
mod annotation;
mod cache;
mod config;
mod driver;
mod listener;

pub use actor::{ActorProvider, ActorResolver, SecurityContext};
pub use annotation::{Blameable, ExpectedValues, TrackedFields, TriggerPhase};
pub use cache::ConfigFileCache;
pub use config::{ChangeRule, ClassConfiguration};
pub use driver::{BlameableDriver, BlameableOptions, ConfigCache};
pub use listener::BlameableListener;
