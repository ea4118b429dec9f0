//! Building archives in memory and inside an arbitrary stream

use std::io::Cursor;
use zipper::{Archive, ArchiveOptions, CompressionPolicy, Destination, ZipArchiveReader};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Into a caller-owned buffer, password protected
    let mut buffer = Vec::new();
    {
        let options = ArchiveOptions::new().password("demo");
        let mut archive = Archive::open(Destination::Memory(&mut buffer), options)?;
        archive.add_bytes("data.txt", b"In-memory ZIP content", CompressionPolicy::Medium)?;
        archive.add_bytes("report.csv", b"id,value\n1,42\n2,17\n", CompressionPolicy::Better)?;
    }
    println!("Created encrypted ZIP with {} bytes", buffer.len());

    let mut reader = ZipArchiveReader::new(Cursor::new(&buffer[..]))?;
    let data = reader.read_entry_by_name_with_password("data.txt", Some("demo"))?;
    println!("data.txt: {}", String::from_utf8_lossy(&data));

    // Into any Read + Write + Seek stream
    let mut stream = Cursor::new(Vec::new());
    {
        let mut archive = Archive::open(Destination::Stream(&mut stream), ArchiveOptions::new())?;
        let mut source = Cursor::new(b"streamed through a cursor".to_vec());
        archive.add_now("stream.txt", &mut source, CompressionPolicy::Faster)?;
    }

    let reader = ZipArchiveReader::new(Cursor::new(stream.into_inner()))?;
    for entry in reader.entries() {
        println!("{}: {} bytes", entry.name, entry.uncompressed_size);
    }

    Ok(())
}
