//! hostwatch agent: configuration and HTTP surface around the detector

pub mod api;
pub mod config;
