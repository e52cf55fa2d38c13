//! Asset probe: loads chunks and models through the registry and reports
//! cache behaviour.
//!
//! Usage: cargo run --bin asset_probe -- [OPTIONS]
//!
//! Options:
//!   --config <PATH>   Streaming config JSON (default: built-in defaults)
//!   --chunk <X,Z>     Chunk to load, repeatable (e.g. --chunk 0,0 --chunk 9,-2)
//!   --model <NAME>    Skinned model to load, repeatable
//!
//! Every asset is requested twice; the second pass should be all cache hits.

use std::path::Path;
use std::process;
use std::time::Instant;

use voxstream::core::StreamingConfig;
use voxstream::streaming::{AssetRegistry, ChunkIdentity};

#[tokio::main]
async fn main() {
    voxstream::core::logging::init();

    let args: Vec<String> = std::env::args().collect();

    let config = match parse_str_arg(&args, "--config") {
        Some(path) => StreamingConfig::load_sync(Path::new(&path)).unwrap_or_else(|e| {
            eprintln!("{e}");
            process::exit(1);
        }),
        None => StreamingConfig::default(),
    };

    let chunks: Vec<ChunkIdentity> = parse_all_args(&args, "--chunk")
        .iter()
        .map(|s| {
            parse_chunk(s).unwrap_or_else(|| {
                eprintln!("invalid --chunk {s:?}, expected X,Z");
                process::exit(1);
            })
        })
        .collect();
    let models = parse_all_args(&args, "--model");

    if chunks.is_empty() && models.is_empty() {
        eprintln!("nothing to load; pass --chunk X,Z and/or --model NAME");
        process::exit(2);
    }

    let registry = AssetRegistry::from_config(config).unwrap_or_else(|e| {
        eprintln!("{e}");
        process::exit(1);
    });

    println!("=== Voxstream Asset Probe ===");
    println!("Chunks: {}", registry.config().chunks.base_url);
    println!("Models: {}", registry.config().models.base_url);
    println!("Decode workers: {}", if registry.offloader().is_threaded() { "thread" } else { "inline" });
    println!();

    let mut failures = 0;
    for pass in 1..=2 {
        println!("--- pass {pass} ---");

        for &identity in &chunks {
            let start = Instant::now();
            match registry.chunks().load(identity).await {
                Ok(loaded) => {
                    let chunk = &loaded.item;
                    println!(
                        "chunk {:>10}  cached={:<5} {:>6} tris {:>6} blocks  {:?}  {:?}..{:?}  {:.2}ms",
                        identity.to_string(),
                        loaded.cached,
                        chunk.triangle_count(),
                        chunk.voxel_block_count(),
                        chunk.chunk_type(),
                        chunk.bounds().from,
                        chunk.bounds().to,
                        start.elapsed().as_secs_f64() * 1000.0
                    );
                }
                Err(e) => {
                    failures += 1;
                    println!("chunk {:>10}  FAILED: {e}", identity.to_string());
                }
            }
        }

        for name in &models {
            let start = Instant::now();
            match registry.models().load(name).await {
                Ok(loaded) => {
                    let geometry = loaded.item.geometry();
                    let shape = match loaded.item.skinned_mesh() {
                        Some(mesh) => format!("skinned, {} bones", mesh.skeleton.bone_count()),
                        None => "static".to_string(),
                    };
                    println!(
                        "model {name:>10}  cached={:<5} {:>6} verts {:>6} tris  {shape}  {:.2}ms",
                        loaded.cached,
                        geometry.vertex_count(),
                        geometry.triangle_count(),
                        start.elapsed().as_secs_f64() * 1000.0
                    );
                }
                Err(e) => {
                    failures += 1;
                    println!("model {name:>10}  FAILED: {e}");
                }
            }
        }
        println!();
    }

    let stats = registry.stats();
    println!("=== Cache stats ===");
    for (label, cache, len, capacity) in [
        ("chunks", stats.chunks, registry.chunks().chunks().len(), registry.chunks().chunks().capacity()),
        ("tiles", stats.tiles, registry.chunks().tiles().len(), registry.chunks().tiles().capacity()),
        ("models", stats.models, registry.models().cache().len(), registry.models().cache().capacity()),
    ] {
        println!(
            "{label:<7} {len:>4}/{capacity:<4} hits {:>4}  misses {:>4}  coalesced {:>4}  evicted {:>4}  failed {:>4}",
            cache.hits, cache.misses, cache.coalesced, cache.evictions, cache.failures
        );
    }

    if failures > 0 {
        process::exit(1);
    }
}

/// Accepts `X,Z` or the canonical `X|Z`
fn parse_chunk(s: &str) -> Option<ChunkIdentity> {
    if let Ok(identity) = s.parse() {
        return Some(identity);
    }
    let (x, z) = s.split_once(',')?;
    Some(ChunkIdentity::new(x.trim().parse().ok()?, z.trim().parse().ok()?))
}

fn parse_str_arg(args: &[String], flag: &str) -> Option<String> {
    args.iter().position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .cloned()
}

fn parse_all_args(args: &[String], flag: &str) -> Vec<String> {
    args.windows(2)
        .filter(|pair| pair[0] == flag)
        .map(|pair| pair[1].clone())
        .collect()
}
