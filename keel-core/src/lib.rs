//! Keel Core
//!
//! Core library for a declarative service management tool: the desired state is
//! parsed from `.keel` files, compared with what providers observe, and turned
//! into a plan of effects.

pub mod differ;
pub mod effect;
pub mod interpreter;
pub mod parser;
pub mod plan;
pub mod provider;
pub mod resource;
pub mod schema;
pub mod wait;
