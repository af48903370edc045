//! Length-prefixed framed write demonstration.
//!
//! Run with: cargo run --bin framed_write_demo

use rollmap_roll::framing::decode_all;
use rollmap_roll::{default_naming, FramedWriter, RollingFileOptions, SingleProcessRollingFile};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    println!("=== Framed Write Demonstration ===\n");

    let dir = tempfile::tempdir()?;
    let naming = default_naming(dir.path());
    let options = RollingFileOptions::builder(128).framed(true).build();
    let coordinator = SingleProcessRollingFile::new(naming, options, None)?;
    let framed = FramedWriter::new(&coordinator);

    println!("1. Writing three length-prefixed frames");
    for message in ["hi", "there", "friend"] {
        let offset = framed.write(message.as_bytes())?;
        println!("   wrote {message:?} at offset {offset}");
    }

    coordinator.shutdown().await;

    let path = std::fs::read_dir(dir.path())?.next().unwrap()?.path();
    let data = std::fs::read(&path)?;
    let frames = decode_all(&data);
    println!("\n2. Decoded {} frames from {:?}", frames.len(), path);
    for frame in &frames {
        println!("   {:?}", String::from_utf8_lossy(frame));
    }
    println!("   ✓ Demo complete!\n");

    Ok(())
}
