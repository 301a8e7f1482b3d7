//! Consumer demo: attach by name, read a segment by id, release it
//!
//! Run `cargo run --example consumer <pool_name> <segment_id>` with the
//! id printed by the producer demo.

use shm_pool::{PoolResult, SegmentPool};

const SEGMENT_SIZE: usize = 921_600;
const NUM_SEGMENTS: usize = 4;

fn main() -> PoolResult<()> {
    shm_pool::init_logging("info");

    let mut args = std::env::args().skip(1);
    let name = args.next().unwrap_or_else(|| "demo".to_string());
    let id: usize = match args.next().map(|s| s.parse()) {
        Some(Ok(id)) => id,
        _ => {
            eprintln!("usage: consumer <pool_name> <segment_id>");
            std::process::exit(2);
        }
    };

    let pool = SegmentPool::create(SEGMENT_SIZE, NUM_SEGMENTS, &name)?;
    let segment = pool.get_segment(id)?;

    let bytes = segment.read();
    let checksum: u64 = bytes.iter().map(|&b| b as u64).sum();
    println!(
        "read {} bytes from segment {}, checksum {}",
        bytes.len(),
        id,
        checksum
    );

    segment.release()?;
    println!("released segment {}, {} free", id, pool.free_segments());

    // Last consumer tears the pool down explicitly
    SegmentPool::unlink(&name)?;
    println!("pool `{}` unlinked", name);
    Ok(())
}
