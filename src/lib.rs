//! # wb-components: runtime component orchestration
//!
//! Two cooperating halves:
//!
//! - A [`registry`] of named UI modules with declared dependencies. Modules
//!   register themselves, wait on their dependencies, can be loaded on demand
//!   through a [`registry::ModuleLoader`], and are swept for health on a
//!   fixed cadence.
//! - A declarative [`factory`] that compiles JSON component definitions
//!   (structure, bindings, conditions, repeats, styles, handlers) into live
//!   instances that can be updated, re-rendered and destroyed.
//!
//! ```text
//!   JSON definition ─▶ ComponentFactory ─▶ Instance ─▶ element tree + scoped css
//!                            │                 │
//!                      DocumentFetcher      EventBus ◀── ComponentRegistry
//!                                                         │
//!                                                    ModuleLoader
//! ```
//!
//! Browser globals are replaced by owner objects constructed explicitly and
//! wired together by [`system::System`]: the [`event::EventBus`] carries
//! notifications, [`registry::ElementRegistry`] plays the custom element
//! registry, [`factory::Document`] tracks attached roots and stylesheets, and
//! [`fetch::DocumentFetcher`] stands in for `fetch`.

pub mod config;
pub mod error;
pub mod event;
pub mod factory;
pub mod fetch;
pub mod registry;
pub mod resolver;
pub mod system;
pub mod value;

// Re-exports
pub use error::*;
pub use event::*;
pub use factory::{ComponentFactory, CreateOptions, Definition, FactoryError, Instance};
pub use registry::{ComponentRegistry, ModuleRecord, ModuleStatus, RegistryError};

#[cfg(test)]
mod tests {
    use tracing_subscriber::{EnvFilter, FmtSubscriber};

    #[ctor::ctor]
    fn init_tests() {
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(EnvFilter::from_default_env())
            .finish();
        tracing::subscriber::set_global_default(subscriber)
            .expect("Failed to set tracing subscriber");
    }
}
