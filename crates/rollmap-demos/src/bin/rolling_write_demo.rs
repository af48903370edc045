//! Rolling single-process write demonstration.
//!
//! Run with: cargo run --bin rolling_write_demo

use std::sync::Arc;

use rollmap_roll::{default_naming, RollingFileOptions, SingleProcessRollingFile};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    println!("=== Rolling Write Demonstration ===\n");

    let dir = tempfile::tempdir()?;
    println!("1. Rolling into {:?} with 64-byte files", dir.path());

    let naming = default_naming(dir.path());
    let options = RollingFileOptions::builder(64).preallocate(true).build();
    let completed = Arc::new(std::sync::Mutex::new(Vec::new()));
    let completed_clone = Arc::clone(&completed);
    let coordinator = SingleProcessRollingFile::new(
        naming,
        options,
        Some(Arc::new(move |path: &std::path::Path| {
            completed_clone.lock().unwrap().push(path.to_path_buf());
        })),
    )?;

    println!("2. Writing 20 records of 12 bytes each");
    for i in 0..20u32 {
        let payload = format!("record-{i:04}");
        let offset = coordinator.write(payload.as_bytes())?;
        println!("   wrote {payload:?} at offset {offset}");
    }

    coordinator.shutdown().await;

    let rolled_files = completed.lock().unwrap().len();
    println!("\n3. Rolled through {rolled_files} completed file(s)");
    println!("   ✓ Demo complete!\n");

    Ok(())
}
