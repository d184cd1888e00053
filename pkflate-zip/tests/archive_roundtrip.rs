//! Write archives and read them back through every store and extraction path.

use pkflate_zip::{
    AddOptions, ExtractFlags, HeapStore, ZipErrorKind, ZipReader, ZipWriter, ZipWriterOptions,
};
use std::error::Error;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, SystemTime};

fn temp_path(tag: &str) -> PathBuf {
    static COUNTER: AtomicUsize = AtomicUsize::new(0);
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    std::env::temp_dir().join(format!("pkflate-roundtrip-{}-{tag}-{n}", std::process::id()))
}

fn text(size: usize) -> Vec<u8> {
    let words = ["alpha ", "beta ", "gamma ", "delta ", "epsilon "];
    let mut data = Vec::with_capacity(size);
    let mut seed = 7u32;
    while data.len() < size {
        seed = seed.wrapping_mul(1_103_515_245).wrapping_add(12_345);
        data.extend_from_slice(words[(seed >> 16) as usize % words.len()].as_bytes());
    }
    data.truncate(size);
    data
}

fn noise(size: usize) -> Vec<u8> {
    let mut seed = 0x9E37_79B9_7F4A_7C15u64;
    (0..size)
        .map(|_| {
            seed ^= seed << 13;
            seed ^= seed >> 7;
            seed ^= seed << 17;
            seed as u8
        })
        .collect()
}

fn when() -> SystemTime {
    SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000)
}

#[test]
fn test_multiple_entries_all_levels() -> Result<(), Box<dyn Error>> {
    let mut writer = ZipWriter::new_heap(ZipWriterOptions::default())?;
    let mut expected = Vec::new();
    for level in 0..=10u8 {
        let data = text(5_000 + usize::from(level) * 1_000);
        let name = format!("level{level}.txt");
        writer.add_mem(&name, &data, &AddOptions::new().level(level).last_modified(when()))?;
        expected.push((name, data));
    }
    writer.add_mem("noise.bin", &noise(100_000), &AddOptions::new().level(9))?;
    let bytes = writer.finalize_to_vec()?;

    let mut reader = ZipReader::from_vec(bytes)?;
    assert_eq!(reader.file_count(), expected.len() + 1);
    reader.validate_archive(false)?;
    for (name, data) in &expected {
        let got = reader.extract_file_to_vec(name, ExtractFlags::new())?;
        assert_eq!(&got, data, "{name}");
        let index = reader.locate(name, ExtractFlags::new())?;
        assert_eq!(reader.stat(index)?.last_modified(), Some(when()));
    }
    assert_eq!(reader.extract_file_to_vec("noise.bin", ExtractFlags::new())?, noise(100_000));
    Ok(())
}

#[test]
fn test_extraction_targets_agree() -> Result<(), Box<dyn Error>> {
    let data = text(200_000);
    let mut writer = ZipWriter::new_heap(ZipWriterOptions::default())?;
    writer.add_mem("docs/big.txt", &data, &AddOptions::new().comment("large text"))?;
    let bytes = writer.finalize_to_vec()?;
    let mut reader = ZipReader::from_slice(&bytes)?;

    let mut slice = vec![0u8; data.len()];
    assert_eq!(reader.extract_to_slice(0, &mut slice, ExtractFlags::new())?, data.len());
    assert_eq!(slice, data);

    let mut chunks = Vec::new();
    let mut offsets = Vec::new();
    reader.extract_to_callback(0, ExtractFlags::new(), |offset, chunk| {
        offsets.push(offset);
        chunks.extend_from_slice(chunk);
        chunk.len()
    })?;
    assert_eq!(chunks, data);
    assert_eq!(offsets[0], 0);
    assert!(offsets.windows(2).all(|w| w[0] < w[1]));

    let mut sink = Vec::new();
    let written = reader.extract_file_to_writer("DOCS/BIG.TXT", &mut sink, ExtractFlags::new())?;
    assert_eq!(written, data.len() as u64);
    assert_eq!(sink, data);

    let by_base = reader.extract_file_to_vec("big.txt", ExtractFlags::new().ignore_path(true))?;
    assert_eq!(by_base, data);
    assert_eq!(reader.comment(0)?, "large text");

    let err = reader
        .extract_to_callback(0, ExtractFlags::new(), |_, chunk| chunk.len() / 2)
        .unwrap_err();
    assert_eq!(err.kind(), ZipErrorKind::WriteCallbackFailed);
    Ok(())
}

#[test]
fn test_file_store_roundtrip() -> Result<(), Box<dyn Error>> {
    let archive = temp_path("archive.zip");
    let source = temp_path("source.txt");
    let out = temp_path("out.txt");
    let data = text(150_000);
    std::fs::write(&source, &data)?;

    let mut writer = ZipWriter::create(&archive, ZipWriterOptions::default())?;
    writer.add_file("source.txt", &source, &AddOptions::new().last_modified(when()))?;
    writer.add_mem("note", b"written next to a file entry", &AddOptions::new())?;
    writer.finalize()?;
    drop(writer);

    let mut reader = ZipReader::open(&archive)?;
    assert_eq!(reader.file_count(), 2);
    reader.extract_file_to_file("source.txt", &out, ExtractFlags::new())?;
    assert_eq!(std::fs::read(&out)?, data);
    let mtime = filetime::FileTime::from_last_modification_time(&std::fs::metadata(&out)?);
    assert_eq!(mtime.unix_seconds(), 1_700_000_000);

    for path in [&archive, &source, &out] {
        std::fs::remove_file(path)?;
    }
    Ok(())
}

#[test]
fn test_callback_stores() -> Result<(), Box<dyn Error>> {
    let mut image = Vec::new();
    {
        let mut writer = ZipWriter::from_callbacks(
            |offset, data| {
                let end = offset as usize + data.len();
                if image.len() < end {
                    image.resize(end, 0);
                }
                image[offset as usize..end].copy_from_slice(data);
                data.len()
            },
            ZipWriterOptions::default(),
        )?;
        writer.add_mem("cb.txt", &text(10_000), &AddOptions::new())?;
        writer.finalize()?;
    }

    let size = image.len() as u64;
    let mut reader = ZipReader::from_callbacks(size, |offset, buf| {
        let start = offset as usize;
        let n = buf.len().min(image.len().saturating_sub(start));
        buf[..n].copy_from_slice(&image[start..start + n]);
        n
    })?;
    assert_eq!(reader.extract_to_vec(0, ExtractFlags::new())?, text(10_000));
    Ok(())
}

#[test]
fn test_streamed_add() -> Result<(), Box<dyn Error>> {
    let data = text(300_000);
    let mut writer = ZipWriter::new_heap(ZipWriterOptions::default())?;
    writer.add_callback(
        "streamed.txt",
        data.len() as u64,
        |offset, buf| {
            let start = offset as usize;
            let n = buf.len().min(data.len() - start).min(10_000);
            buf[..n].copy_from_slice(&data[start..start + n]);
            Ok(n)
        },
        &AddOptions::new().level(1),
    )?;
    let bytes = writer.finalize_to_vec()?;

    let mut reader = ZipReader::from_vec(bytes)?;
    let stat = reader.stat(0)?;
    assert_eq!(stat.uncompressed_size, data.len() as u64);
    assert!(stat.compressed_size < stat.uncompressed_size);
    assert_eq!(reader.extract_to_vec(0, ExtractFlags::new())?, data);
    reader.validate_entry(0, false)?;
    Ok(())
}

#[test]
fn test_copy_entries_between_archives() -> Result<(), Box<dyn Error>> {
    let mut source = ZipWriter::new_heap(ZipWriterOptions::default())?;
    source.add_mem("a.txt", &text(20_000), &AddOptions::new())?;
    source.add_mem("b.bin", &noise(3_000), &AddOptions::new().level(0))?;
    source.add_mem("c/", b"", &AddOptions::new())?;
    let mut source = ZipReader::from_vec(source.finalize_to_vec()?)?;

    for zip64 in [false, true] {
        let options = ZipWriterOptions::default().force_zip64(zip64).alignment(16);
        let mut dest = ZipWriter::new_heap(options)?;
        dest.add_mem("first", b"entry written before the copies", &AddOptions::new())?;
        for index in 0..source.file_count() {
            dest.add_from_reader(&mut source, index)?;
        }
        let mut copy = ZipReader::from_vec(dest.finalize_to_vec()?)?;
        assert_eq!(copy.is_zip64(), zip64);
        assert_eq!(copy.file_count(), 4);
        copy.validate_archive(false)?;
        assert_eq!(copy.extract_file_to_vec("a.txt", ExtractFlags::new())?, text(20_000));
        assert_eq!(copy.extract_file_to_vec("b.bin", ExtractFlags::new())?, noise(3_000));
        assert!(copy.is_directory(copy.locate("c/", ExtractFlags::new())?)?);
        assert_eq!(copy.stat(1)?.local_header_offset % 16, 0);
    }

    let mut zip64_source = ZipWriter::new_heap(ZipWriterOptions::default().force_zip64(true))?;
    zip64_source.add_mem("z", b"zip64 entry", &AddOptions::new())?;
    let mut zip64_source = ZipReader::from_vec(zip64_source.finalize_to_vec()?)?;
    let mut classic = ZipWriter::new_heap(ZipWriterOptions::default())?;
    let err = classic.add_from_reader(&mut zip64_source, 0).unwrap_err();
    assert_eq!(err.kind(), ZipErrorKind::InvalidParameter);
    Ok(())
}

#[test]
fn test_append_through_reader() -> Result<(), Box<dyn Error>> {
    let mut writer = ZipWriter::new_heap(ZipWriterOptions::default())?;
    writer.add_mem("one", b"first generation", &AddOptions::new())?;
    let bytes = writer.finalize_to_vec()?;

    let reader = ZipReader::new(HeapStore::from_vec(bytes))?;
    let mut writer = ZipWriter::from_reader(reader, ZipWriterOptions::default())?;
    assert_eq!(writer.file_count(), 1);
    writer.add_mem("two", &text(4_000), &AddOptions::new())?;
    let bytes = writer.finalize_to_vec()?;

    let mut reader = ZipReader::from_vec(bytes)?;
    assert_eq!(reader.file_count(), 2);
    assert_eq!(reader.extract_file_to_vec("one", ExtractFlags::new())?, b"first generation");
    assert_eq!(reader.extract_file_to_vec("two", ExtractFlags::new())?, text(4_000));
    reader.validate_archive(false)?;
    Ok(())
}

#[test]
fn test_reserved_prefix_and_empty_archive() -> Result<(), Box<dyn Error>> {
    let writer = ZipWriter::new_heap(ZipWriterOptions::default().reserve_bytes(100))?;
    let bytes = writer.finalize_to_vec()?;
    assert_eq!(bytes.len(), 122);
    let reader = ZipReader::from_slice(&bytes)?;
    assert_eq!(reader.file_count(), 0);

    let empty = ZipWriter::new_heap(ZipWriterOptions::default())?.finalize_to_vec()?;
    assert_eq!(empty.len(), 22);
    let mut reader = ZipReader::from_vec(empty)?;
    assert_eq!(reader.file_count(), 0);
    reader.validate_archive(false)?;
    assert_eq!(
        reader.extract_file_to_vec("missing", ExtractFlags::new()).unwrap_err().kind(),
        ZipErrorKind::FileNotFound
    );
    Ok(())
}

#[test]
fn test_ascii_names_and_directory_bits() -> Result<(), Box<dyn Error>> {
    let mut writer = ZipWriter::new_heap(ZipWriterOptions::default().ascii_filenames(true))?;
    writer.add_mem("plain.txt", b"plain", &AddOptions::new())?;
    writer.add_mem("folder/", b"", &AddOptions::new())?;
    let reader = ZipReader::from_vec(writer.finalize_to_vec()?)?;

    let file = reader.stat(0)?;
    assert_eq!(file.flags & 0x800, 0);
    assert!(!file.is_directory);
    let dir = reader.stat(1)?;
    assert!(dir.is_directory);
    assert_eq!(dir.uncompressed_size, 0);
    assert_eq!(dir.flags & 0x08, 0);
    Ok(())
}

#[test]
fn test_declared_size_forces_zip64() -> Result<(), Box<dyn Error>> {
    let data = text(50_000);
    let mut writer = ZipWriter::new_heap(ZipWriterOptions::default())?;
    writer.add_mem("before", b"classic entry", &AddOptions::new())?;
    assert!(!writer.is_zip64());
    writer.add_callback(
        "huge-declared",
        5 << 30,
        |offset, buf| {
            let start = (offset as usize).min(data.len());
            let n = buf.len().min(data.len() - start);
            buf[..n].copy_from_slice(&data[start..start + n]);
            Ok(n)
        },
        &AddOptions::new(),
    )?;
    assert!(writer.is_zip64());
    let bytes = writer.finalize_to_vec()?;

    let mut reader = ZipReader::from_vec(bytes)?;
    assert!(reader.is_zip64());
    assert_eq!(reader.stat(1)?.uncompressed_size, data.len() as u64);
    assert_eq!(reader.extract_file_to_vec("huge-declared", ExtractFlags::new())?, data);
    reader.validate_archive(false)?;
    Ok(())
}

#[test]
fn test_locate_returns_add_index() -> Result<(), Box<dyn Error>> {
    let names: Vec<String> = (0..200)
        .rev()
        .map(|i| format!("dir{}/file{i:03}.dat", i % 7))
        .collect();
    let mut writer = ZipWriter::new_heap(ZipWriterOptions::default())?;
    for name in &names {
        writer.add_mem(name, name.as_bytes(), &AddOptions::new())?;
    }
    let bytes = writer.finalize_to_vec()?;

    let sorted = ZipReader::from_slice(&bytes)?;
    let unsorted = ZipReader::with_options(
        pkflate_zip::SliceStore::new(&bytes),
        pkflate_zip::ZipReaderOptions {
            sort_central_dir: false,
        },
    )?;
    for (index, name) in names.iter().enumerate() {
        assert_eq!(sorted.locate(name, ExtractFlags::new())?, index);
        assert_eq!(sorted.locate(&name.to_uppercase(), ExtractFlags::new())?, index);
        assert_eq!(unsorted.locate(name, ExtractFlags::new().case_sensitive(true))?, index);
    }
    Ok(())
}
