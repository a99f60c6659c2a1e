//! # ATS Bridge Library
//!
//! Serial protocol engine for ATS-MINI (SI4732) receivers.
//!
//! This library provides the pieces a network front end needs to drive a
//! receiver over its USB console: device discovery and connection with baud
//! fallback, a command channel that shares the link safely with a background
//! telemetry reader, the telemetry line parser, and hex screen capture.

pub mod bridge;
pub mod commands;
pub mod config;
pub mod error;
pub mod serial;
pub mod telemetry;
