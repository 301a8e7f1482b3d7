//! Producer demo: claim a segment, fill it, print the id for hand-off
//!
//! Run `cargo run --example producer <pool_name>` and pass the printed
//! id to the consumer demo. The pool stays linked so the consumer can
//! attach; unlink happens on the consumer side once it is done.

use shm_pool::{PoolResult, SegmentPool};
use std::time::Duration;

const SEGMENT_SIZE: usize = 921_600; // one 480x640x3 frame
const NUM_SEGMENTS: usize = 4;

fn main() -> PoolResult<()> {
    shm_pool::init_logging("info");

    let name = std::env::args().nth(1).unwrap_or_else(|| "demo".to_string());
    let pool = SegmentPool::create(SEGMENT_SIZE, NUM_SEGMENTS, &name)?;
    println!(
        "pool `{}`: {} segments of {} bytes, {} free",
        pool.name(),
        pool.num_segments(),
        pool.segment_size(),
        pool.free_segments()
    );

    // Poll with our own backoff; the pool never blocks
    let segment = loop {
        match pool.get_free_segment() {
            Some(segment) => break segment,
            None => {
                println!("no free segments, waiting...");
                std::thread::sleep(Duration::from_millis(50));
            }
        }
    };

    let frame: Vec<u8> = (0..SEGMENT_SIZE).map(|i| (i % 256) as u8).collect();
    segment.write(&frame)?;

    // The printed id is the hand-off channel here
    println!("wrote {} bytes, segment id: {}", frame.len(), segment.id());
    println!("run: cargo run --example consumer -- {} {}", name, segment.id());
    Ok(())
}
