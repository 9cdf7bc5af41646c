//! Tiered symbol/offset resolution with persistent write-back.

pub mod resolver;
pub mod signature;

pub use resolver::{Resolution, Resolver, Strategy, TargetSpec};
pub use signature::ByteSignature;
