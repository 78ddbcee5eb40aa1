use anyhow::{Context, bail};
use clap::Parser;
use rayon::prelude::*;
use serde_json::json;
use std::path::PathBuf;
use std::time::Instant;
use strata_worldgen::datapack::Datapack;
use strata_worldgen::proto::NoiseGeneratorSettings;
use strata_worldgen::surface::SurfaceSystem;
use strata_worldgen::surface::biome::Biome;
use strata_worldgen::{Heightmap, NoiseChunk, ProtoChunk, RandomState};
use tracing::{info, info_span};
use tracing_subscriber::EnvFilter;

/// Generates terrain chunks from a worldgen datapack and prints a summary of each one.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// World seed; anything that is not an integer is hashed.
    #[arg(long, default_value = "0")]
    seed: String,
    /// Datapack root containing `data/`.
    #[arg(long, default_value = "assets/demo")]
    datapack: PathBuf,
    /// Noise settings key to generate with.
    #[arg(long, default_value = "strata:overworld")]
    settings: String,
    /// Chunk radius around the origin chunk.
    #[arg(long, default_value_t = 1)]
    chunks: i32,
    /// Biome used for every surface rule lookup.
    #[arg(long, default_value = "minecraft:plains")]
    biome: String,
    /// Skip the spawn search.
    #[arg(long)]
    no_spawn: bool,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    if args.chunks < 0 {
        bail!("--chunks must not be negative, got {}", args.chunks);
    }
    let seed = strata_random::parse_seed(&args.seed);
    let biome = Biome::vanilla(&args.biome).with_context(|| format!("unknown biome {}", args.biome))?;

    let pack = Datapack::new(&args.datapack);
    let loaded = pack
        .load_settings(&args.settings)
        .with_context(|| format!("loading {} from {}", args.settings, args.datapack.display()))?;
    let state = loaded.random_state(seed).context("creating random state")?;
    let surface = SurfaceSystem::new(&state, &loaded.settings).context("compiling surface rules")?;
    info!(seed, settings = %loaded.key, legacy = state.is_legacy(), "random state ready");

    if !args.no_spawn {
        let started = Instant::now();
        let spawn = state.sampler().find_spawn_position();
        info!(x = spawn.x, z = spawn.z, elapsed = ?started.elapsed(), "found spawn");
        println!("{}", json!({ "spawn": { "x": spawn.x, "z": spawn.z } }));
    }

    let positions: Vec<(i32, i32)> = (-args.chunks..=args.chunks)
        .flat_map(|x| (-args.chunks..=args.chunks).map(move |z| (x, z)))
        .collect();
    let started = Instant::now();
    let chunks: Vec<ProtoChunk> = positions
        .par_iter()
        .map(|&(x, z)| {
            let _span = info_span!("chunk", x, z).entered();
            generate(&state, &surface, &loaded.settings, &biome, x, z)
        })
        .collect();
    info!(count = chunks.len(), elapsed = ?started.elapsed(), "generated chunks");

    for chunk in &chunks {
        println!("{}", summary(chunk));
    }
    Ok(())
}

fn generate(
    state: &RandomState,
    surface: &SurfaceSystem,
    settings: &NoiseGeneratorSettings,
    biome: &Biome,
    chunk_x: i32,
    chunk_z: i32,
) -> ProtoChunk {
    let mut chunk = ProtoChunk::new(chunk_x, chunk_z, settings.noise.min_y, settings.noise.height);
    let noise_chunk = NoiseChunk::for_chunk(&chunk, settings.noise);
    noise_chunk.fill(state.router(), settings, &mut chunk);
    surface.build_surface(state, biome, &noise_chunk, &mut chunk);
    chunk
}

fn summary(chunk: &ProtoChunk) -> serde_json::Value {
    let mut heightmaps = serde_json::Map::new();
    for heightmap in Heightmap::ALL {
        let heights: Vec<i32> = (0..16)
            .flat_map(|x| (0..16).map(move |z| (x, z)))
            .map(|(x, z)| chunk.height_at(heightmap, chunk.min_block_x() + x, chunk.min_block_z() + z))
            .collect();
        let min = heights.iter().copied().min().unwrap_or(chunk.min_y());
        let max = heights.iter().copied().max().unwrap_or(chunk.min_y());
        heightmaps.insert(heightmap.name().to_string(), json!({ "min": min, "max": max }));
    }
    let blocks: serde_json::Map<String, serde_json::Value> = chunk
        .histogram()
        .into_iter()
        .map(|(state, count)| (state.to_string(), json!(count)))
        .collect();
    json!({
        "x": chunk.pos().x,
        "z": chunk.pos().y,
        "heightmaps": heightmaps,
        "blocks": blocks,
    })
}
