use std::io::{Cursor, Read, Seek, SeekFrom, Write};
use tempfile::tempdir;
use zipper::{
    Archive, ArchiveOptions, CompressionPolicy, Destination, ErrorKind, OverwritePolicy, Timestamp,
    ZipArchiveReader,
};

fn names<R: Read + Seek>(reader: &ZipArchiveReader<R>) -> Vec<String> {
    reader.entries().iter().map(|e| e.name.clone()).collect()
}

#[test]
fn memory_destination_round_trip() {
    let mut buffer = Vec::new();
    {
        let mut archive =
            Archive::open(Destination::Memory(&mut buffer), ArchiveOptions::new()).unwrap();
        archive
            .add_bytes("notes.txt", b"hello", CompressionPolicy::Medium)
            .unwrap();
        archive.close();
        assert!(archive.error().is_none());
    }

    // Finalized buffer is exactly the container
    assert_eq!(&buffer[..4], &[0x50, 0x4b, 0x03, 0x04]);

    let mut reader = ZipArchiveReader::new(Cursor::new(buffer)).unwrap();
    let entry = reader.find_entry("notes.txt").unwrap().clone();
    assert_eq!(entry.uncompressed_size, 5);
    assert_eq!(entry.crc32, crc32fast::hash(b"hello"));
    assert_eq!(reader.read_entry(&entry, None).unwrap(), b"hello");
}

#[test]
fn memory_destination_appends_to_existing_container() {
    let mut buffer = Vec::new();
    {
        let mut archive =
            Archive::open(Destination::Memory(&mut buffer), ArchiveOptions::new()).unwrap();
        archive
            .add_bytes("first.txt", b"1", CompressionPolicy::Store)
            .unwrap();
    }
    {
        let mut archive =
            Archive::open(Destination::Memory(&mut buffer), ArchiveOptions::new()).unwrap();
        assert_eq!(archive.entries().len(), 1);
        archive
            .add_bytes("second.txt", b"2", CompressionPolicy::Better)
            .unwrap();
    }

    let mut reader = ZipArchiveReader::new(Cursor::new(buffer)).unwrap();
    assert_eq!(names(&reader), ["first.txt", "second.txt"]);
    assert_eq!(reader.read_entry_by_name("first.txt").unwrap(), b"1");
    assert_eq!(reader.read_entry_by_name("second.txt").unwrap(), b"2");
}

#[test]
fn file_destination_append_and_overwrite() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("out.zip");

    {
        let mut archive = Archive::open(Destination::file(&path), ArchiveOptions::new()).unwrap();
        archive
            .add_bytes("a.txt", b"alpha", CompressionPolicy::Faster)
            .unwrap();
    }
    {
        let options = ArchiveOptions::new().overwrite(OverwritePolicy::Append);
        let mut archive = Archive::open(Destination::file(&path), options).unwrap();
        archive
            .add_bytes("b.txt", b"beta", CompressionPolicy::Faster)
            .unwrap();
    }
    let reader = ZipArchiveReader::open(&path).unwrap();
    assert_eq!(names(&reader), ["a.txt", "b.txt"]);

    {
        let options = ArchiveOptions::new().overwrite(OverwritePolicy::Overwrite);
        let mut archive = Archive::open(Destination::file(&path), options).unwrap();
        archive
            .add_bytes("c.txt", b"gamma", CompressionPolicy::Faster)
            .unwrap();
    }
    let mut reader = ZipArchiveReader::open(&path).unwrap();
    assert_eq!(names(&reader), ["c.txt"]);
    assert_eq!(reader.read_entry_by_name("c.txt").unwrap(), b"gamma");
}

#[test]
fn file_destination_empty_file_is_created() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("empty.zip");
    std::fs::write(&path, b"").unwrap();

    {
        let mut archive = Archive::open(Destination::file(&path), ArchiveOptions::new()).unwrap();
        archive
            .add_bytes("x.txt", b"x", CompressionPolicy::Medium)
            .unwrap();
    }
    let reader = ZipArchiveReader::open(&path).unwrap();
    assert_eq!(names(&reader), ["x.txt"]);
}

#[test]
fn file_destination_directory_is_opening_error() {
    let dir = tempdir().unwrap();
    let err = Archive::open(Destination::file(dir.path()), ArchiveOptions::new())
        .err()
        .unwrap();
    assert_eq!(err.kind(), ErrorKind::Opening);
    assert!(err.to_string().contains("Is a directory"));
}

#[test]
fn stream_destination_rewritten_on_close() {
    let mut stream = Cursor::new(Vec::new());
    {
        let mut archive =
            Archive::open(Destination::Stream(&mut stream), ArchiveOptions::new()).unwrap();
        archive
            .add_bytes("s.txt", b"streamed", CompressionPolicy::Medium)
            .unwrap();
    }
    {
        // Position of the stream does not matter, it is loaded from the start
        stream.seek(SeekFrom::End(0)).unwrap();
        let options = ArchiveOptions::new().stream_copy_chunk_size(7);
        let mut archive = Archive::open(Destination::Stream(&mut stream), options).unwrap();
        assert_eq!(archive.entries().len(), 1);
        archive
            .add_bytes("t.txt", b"more", CompressionPolicy::Medium)
            .unwrap();
    }

    let mut reader = ZipArchiveReader::new(Cursor::new(stream.into_inner())).unwrap();
    assert_eq!(names(&reader), ["s.txt", "t.txt"]);
    assert_eq!(reader.read_entry_by_name("s.txt").unwrap(), b"streamed");
}

#[test]
fn add_reads_from_current_position_with_timestamp() {
    let mut buffer = Vec::new();
    let ts = Timestamp::new(2021, 6, 15, 12, 30, 44);
    {
        let mut archive =
            Archive::open(Destination::Memory(&mut buffer), ArchiveOptions::new()).unwrap();
        let mut source = Cursor::new(b"ignored:payload".to_vec());
        source.set_position(8);
        archive
            .add("dated.txt", &mut source, ts, CompressionPolicy::Store)
            .unwrap();
    }

    let mut reader = ZipArchiveReader::new(Cursor::new(buffer)).unwrap();
    let entry = reader.find_entry("dated.txt").unwrap().clone();
    assert_eq!(entry.timestamp(), ts);
    assert_eq!(reader.read_entry(&entry, None).unwrap(), b"payload");
}

#[test]
fn failed_stream_finalize_is_recorded() {
    /// Accepts reads and seeks but refuses every write
    struct ReadOnly(Cursor<Vec<u8>>);

    impl Read for ReadOnly {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            self.0.read(buf)
        }
    }

    impl Write for ReadOnly {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "read-only",
            ))
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl Seek for ReadOnly {
        fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
            self.0.seek(pos)
        }
    }

    let mut stream = ReadOnly(Cursor::new(Vec::new()));
    let mut archive =
        Archive::open(Destination::Stream(&mut stream), ArchiveOptions::new()).unwrap();
    archive
        .add_bytes("lost.txt", b"lost", CompressionPolicy::Medium)
        .unwrap();
    archive.close();

    assert!(!archive.is_open());
    assert_eq!(archive.error().map(|e| e.kind()), Some(ErrorKind::Internal));
}

// Two stored entries as another tool would write them: an extended timestamp
// extra field on both headers, a long per-entry comment, and a second name in
// a legacy code page. Returns the container and its central directory.
fn craft_foreign_container() -> (Vec<u8>, Vec<u8>) {
    let ut_extra: [u8; 9] = [0x55, 0x54, 0x05, 0x00, 0x01, 0x10, 0x20, 0x30, 0x40];
    let entries: [(&[u8], &[u8]); 2] = [
        (&b"f0.txt"[..], &b"zero"[..]),
        (&b"caf\xe9.txt"[..], &b"one"[..]),
    ];

    let mut out = Vec::new();
    let mut central = Vec::new();
    for (i, (name, data)) in entries.iter().enumerate() {
        let offset = out.len() as u32;
        let crc = crc32fast::hash(data);
        let comment = vec![b'a' + i as u8; 300];

        out.extend_from_slice(&[0x50, 0x4b, 0x03, 0x04]);
        out.extend_from_slice(&20u16.to_le_bytes()); // version needed
        out.extend_from_slice(&0u16.to_le_bytes()); // flags
        out.extend_from_slice(&0u16.to_le_bytes()); // stored
        out.extend_from_slice(&[0x00, 0x60, 0x21, 0x58]); // mod time/date
        out.extend_from_slice(&crc.to_le_bytes());
        out.extend_from_slice(&(data.len() as u32).to_le_bytes());
        out.extend_from_slice(&(data.len() as u32).to_le_bytes());
        out.extend_from_slice(&(name.len() as u16).to_le_bytes());
        out.extend_from_slice(&(ut_extra.len() as u16).to_le_bytes());
        out.extend_from_slice(name);
        out.extend_from_slice(&ut_extra);
        out.extend_from_slice(data);

        central.extend_from_slice(&[0x50, 0x4b, 0x01, 0x02]);
        central.extend_from_slice(&0x031eu16.to_le_bytes()); // made by unix
        central.extend_from_slice(&20u16.to_le_bytes());
        central.extend_from_slice(&0u16.to_le_bytes());
        central.extend_from_slice(&0u16.to_le_bytes());
        central.extend_from_slice(&[0x00, 0x60, 0x21, 0x58]);
        central.extend_from_slice(&crc.to_le_bytes());
        central.extend_from_slice(&(data.len() as u32).to_le_bytes());
        central.extend_from_slice(&(data.len() as u32).to_le_bytes());
        central.extend_from_slice(&(name.len() as u16).to_le_bytes());
        central.extend_from_slice(&(ut_extra.len() as u16).to_le_bytes());
        central.extend_from_slice(&(comment.len() as u16).to_le_bytes());
        central.extend_from_slice(&0u16.to_le_bytes()); // disk start
        central.extend_from_slice(&1u16.to_le_bytes()); // internal attrs: text
        central.extend_from_slice(&0x81a4_0000u32.to_le_bytes()); // -rw-r--r--
        central.extend_from_slice(&offset.to_le_bytes());
        central.extend_from_slice(name);
        central.extend_from_slice(&ut_extra);
        central.extend_from_slice(&comment);
    }

    let cd_offset = out.len() as u32;
    out.extend_from_slice(&central);
    out.extend_from_slice(&[0x50, 0x4b, 0x05, 0x06]);
    out.extend_from_slice(&0u16.to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes());
    out.extend_from_slice(&2u16.to_le_bytes());
    out.extend_from_slice(&2u16.to_le_bytes());
    out.extend_from_slice(&(central.len() as u32).to_le_bytes());
    out.extend_from_slice(&cd_offset.to_le_bytes());
    out.extend_from_slice(&12u16.to_le_bytes());
    out.extend_from_slice(b"archive note");
    (out, central)
}

// Old records are back unchanged, followed by the new one
fn assert_foreign_entries_kept(bytes: Vec<u8>, central: &[u8]) {
    assert!(bytes.windows(central.len()).any(|w| w == central));
    assert!(bytes.ends_with(b"archive note"));

    let mut reader = ZipArchiveReader::new(Cursor::new(bytes)).unwrap();
    assert_eq!(names(&reader), ["f0.txt", "caf\u{FFFD}.txt", "x"]);
    assert_eq!(reader.comment(), b"archive note");

    let entries = reader.entries().to_vec();
    assert_eq!(entries[0].comment, vec![b'a'; 300]);
    assert_eq!(entries[1].comment, vec![b'b'; 300]);
    assert_eq!(entries[0].extra.len(), 9);
    assert_eq!(entries[1].external_attributes, 0x81a4_0000);
    assert!(entries[2].comment.is_empty());

    assert_eq!(reader.read_entry(&entries[0], None).unwrap(), b"zero");
    assert_eq!(reader.read_entry(&entries[1], None).unwrap(), b"one");
    assert_eq!(reader.read_entry(&entries[2], None).unwrap(), b"y");
}

#[test]
fn memory_append_keeps_foreign_records() {
    let (mut buffer, central) = craft_foreign_container();
    {
        let mut archive =
            Archive::open(Destination::Memory(&mut buffer), ArchiveOptions::new()).unwrap();
        archive.add_bytes("x", b"y", CompressionPolicy::Store).unwrap();
        archive.close();
        assert!(archive.error().is_none());
    }
    assert_foreign_entries_kept(buffer, &central);
}

#[test]
fn file_append_keeps_foreign_records() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("foreign.zip");
    let (container, central) = craft_foreign_container();
    std::fs::write(&path, &container).unwrap();
    {
        let mut archive = Archive::open(Destination::file(&path), ArchiveOptions::new()).unwrap();
        archive.add_bytes("x", b"y", CompressionPolicy::Store).unwrap();
        archive.close();
        assert!(archive.error().is_none());
    }
    assert_foreign_entries_kept(std::fs::read(&path).unwrap(), &central);
}

#[test]
fn stream_append_keeps_foreign_records() {
    let (container, central) = craft_foreign_container();
    let original_len = container.len();
    let mut stream = Cursor::new(container);
    {
        let mut archive =
            Archive::open(Destination::Stream(&mut stream), ArchiveOptions::new()).unwrap();
        archive.add_bytes("x", b"y", CompressionPolicy::Store).unwrap();
        archive.close();
        assert!(archive.error().is_none());
    }

    // A single end record, at the very end of the stream
    let bytes = stream.into_inner();
    assert!(bytes.len() > original_len);
    let end_records = bytes
        .windows(4)
        .filter(|w| *w == [0x50, 0x4b, 0x05, 0x06])
        .count();
    assert_eq!(end_records, 1);
    assert_foreign_entries_kept(bytes, &central);
}

#[test]
fn stream_trailing_bytes_are_cleared_when_container_shrinks() {
    let (mut container, _) = craft_foreign_container();
    let valid_len = container.len();
    container.extend_from_slice(&[0xAA; 100]);
    let mut stream = Cursor::new(container);
    {
        let mut archive =
            Archive::open(Destination::Stream(&mut stream), ArchiveOptions::new()).unwrap();
        assert_eq!(archive.entries().len(), 2);
        archive.close();
        assert_eq!(archive.error().map(|e| e.kind()), Some(ErrorKind::Internal));
    }

    let bytes = stream.into_inner();
    assert_eq!(bytes.len(), valid_len + 100);
    assert!(bytes[valid_len..].iter().all(|&b| b == 0));

    let mut reader = ZipArchiveReader::new(Cursor::new(bytes)).unwrap();
    assert_eq!(reader.entries().len(), 2);
    assert_eq!(reader.read_entry_by_name("f0.txt").unwrap(), b"zero");
}
