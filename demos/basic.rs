//! Basic usage example for zipper

use zipper::{
    Archive, ArchiveOptions, CompressionPolicy, Destination, OverwritePolicy, ZipArchiveReader,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== zipper Basic Example ===\n");

    // Create a ZIP file
    println!("Creating test.zip...");
    let options = ArchiveOptions::new().overwrite(OverwritePolicy::Overwrite);
    let mut archive = Archive::open(Destination::file("test.zip"), options)?;

    archive.add_bytes("hello.txt", b"Hello, zipper!", CompressionPolicy::Medium)?;
    archive.add_bytes(
        "folder/nested.txt",
        b"This is a nested file.",
        CompressionPolicy::Better,
    )?;

    // Names escaping the archive root are refused
    if let Err(e) = archive.add_bytes("../escape.txt", b"nope", CompressionPolicy::Medium) {
        println!("Refused: {}", e);
    }

    archive.close();
    if let Some(e) = archive.error() {
        return Err(e.clone().into());
    }
    println!("Created test.zip\n");

    // Append to it
    println!("Appending data.txt...");
    let mut archive = Archive::open(Destination::file("test.zip"), ArchiveOptions::new())?;
    archive.add_bytes("data.txt", b"Line 1\nLine 2\nLine 3\n", CompressionPolicy::Faster)?;
    archive.close();
    println!();

    // Read the ZIP file back
    println!("Reading test.zip...");
    let mut reader = ZipArchiveReader::open("test.zip")?;

    println!("Entries in ZIP:");
    for entry in reader.entries() {
        println!(
            "  - {} ({} bytes, {} compressed)",
            entry.name, entry.uncompressed_size, entry.compressed_size
        );
    }
    println!();

    println!("Reading data.txt:");
    let data = reader.read_entry_by_name("data.txt")?;
    println!("  Content:\n{}", String::from_utf8_lossy(&data));

    println!("All done!");

    Ok(())
}
