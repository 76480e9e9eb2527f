//! Output generation for the reconciled playlist and guide

pub mod generator;

pub use generator::{write_channel_fragment, write_programme_fragment, ProxyGenerator, GENERATOR_NAME};
