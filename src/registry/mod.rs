//! Protocol Registry
//!
//! Advertises message and health functions to discovery consumers. The
//! registry only grows; an empty registry means plain messaging.

pub mod catalog;

pub use catalog::{
    core_functions, FunctionDescriptor, ProtocolRegistry, RegistryHandle, RegistryManifest, HEALTH_TAG,
    MESSAGING_TAG,
};
