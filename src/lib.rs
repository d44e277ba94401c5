//! Trackforge: audio transcode and publish pipeline.
//!
//! This library ingests uploaded audio files, normalizes them to MP3
//! (320 kbit/s, 48 kHz), repackages them into HLS segments, and publishes
//! the rendition to an IPFS-compatible content-addressed store. The progress
//! of each job is checkpointed into a durable status store so callers can
//! poll it and so a crash position can be inferred after a restart.

pub mod config;
pub mod db;
pub mod ingest;
pub mod models;
pub mod pipeline;
pub mod services;
pub mod worker;
