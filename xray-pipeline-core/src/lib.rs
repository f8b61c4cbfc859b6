#![doc = "xray-pipeline-core: core logic library for the x-ray signal ingestion pipeline."]

//! This crate contains the data model, collaborator contracts and pipeline logic:
//! the transformer, the batch producer, the channel consumer and the signal service.
//! Broker, database and HTTP integrations live in the `xray-pipeline` crate.
//!
//! # Usage
//! Construct a [`produce::Producer`] or [`consume::Consumer`] with explicit collaborator handles
//! (`Arc<dyn Publisher>`, `Arc<dyn SignalStore>`) and drive it from the binary.

pub mod consume;
pub mod contract;
pub mod error;
pub mod memory;
pub mod produce;
pub mod service;
pub mod transform;
