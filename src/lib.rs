pub mod config;
pub mod corpus;
pub mod dictionary;
pub mod error;
pub mod ghkm;
pub mod grammar;
pub mod links;
pub mod model;
pub mod output;
pub mod rule;
pub mod sampler;
pub mod stats;
pub mod tree;
