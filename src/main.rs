use std::net::SocketAddr;

use anyhow::{Context, Result};
use clap::Parser;
use log::info;

use notedancer::config::EngineConfig;
use notedancer::params::{NormMode, Parameters};
use notedancer::Engine;

#[derive(Parser)]
#[command(name = "notedancer")]
#[command(about = "Real-time audio feature-extraction engine for electronic music visualization")]
struct Args {
    /// Capture sample rate, Hz.
    #[arg(long, default_value = "48000")]
    sample_rate: u32,

    /// Analysis chunk size, samples.
    #[arg(long, default_value = "1024")]
    chunk_size: usize,

    /// Rolling analysis window length, in chunks.
    #[arg(long, default_value = "6")]
    window_chunks: usize,

    /// STFT size (must be a power of two, >= chunk size).
    #[arg(long, default_value = "2048")]
    fft_size: usize,

    /// Low/mid band boundary, Hz.
    #[arg(long, default_value = "150.0")]
    low_hz: f32,

    /// Mid/high band boundary, Hz.
    #[arg(long, default_value = "4000.0")]
    mid_hz: f32,

    /// Silence gate, linear amplitude.
    #[arg(long, default_value = "0.01")]
    silence_threshold: f32,

    /// Address to send feature frames to.
    #[arg(long, default_value = "127.0.0.1:5005")]
    feature_endpoint: SocketAddr,

    /// Address to listen for parameter updates on.
    #[arg(long, default_value = "127.0.0.1:5006")]
    parameter_endpoint: SocketAddr,

    /// Starting note-normalization mode: fixed, competitive, or statistical.
    #[arg(long, default_value = "competitive")]
    norm_mode: String,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let mut config = EngineConfig {
        sample_rate: args.sample_rate,
        chunk_size: args.chunk_size,
        window_chunks: args.window_chunks,
        fft_size: args.fft_size,
        silence_threshold: args.silence_threshold,
        feature_endpoint: args.feature_endpoint,
        parameter_endpoint: args.parameter_endpoint,
        ..EngineConfig::default()
    };
    config.band_cutoffs.low_hz = args.low_hz;
    config.band_cutoffs.mid_hz = args.mid_hz;

    let mut params = Parameters::default();
    params.norm_mode =
        parse_norm_mode(&args.norm_mode).with_context(|| format!("unrecognized --norm-mode {:?}", args.norm_mode))?;

    info!(
        "note dancer starting: feature frames to {}, parameter updates on {}",
        config.feature_endpoint, config.parameter_endpoint
    );

    let mut engine = Engine::new(config, params).context("failed to start note dancer engine")?;
    engine.run();
    engine.shutdown();

    Ok(())
}

fn parse_norm_mode(s: &str) -> Option<NormMode> {
    match s {
        "fixed" => Some(NormMode::Fixed),
        "competitive" => Some(NormMode::Competitive),
        "statistical" => Some(NormMode::Statistical),
        _ => None,
    }
}
