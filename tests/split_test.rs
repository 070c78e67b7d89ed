use std::fs;

use jparch::archive::{ArchiveFormat, ArchiveWriter, WriterOptions};
use rand::{thread_rng, Rng};
use tempfile::tempdir;

mod reader;

fn jpa_writer(part_size: u64) -> ArchiveWriter {
    let mut opts = WriterOptions::new(ArchiveFormat::Jpa);
    opts.part_size = part_size;
    ArchiveWriter::new(opts)
}

#[test]
fn records_roll_over_at_part_boundaries() {
    let dir = tempdir().unwrap();
    let target = dir.path().join("out.jpa");

    let mut payloads = Vec::new();
    let mut rng = thread_rng();
    for _ in 0..3 {
        let mut buf = vec![0u8; 200];
        rng.fill(&mut buf[..]);
        payloads.push(buf);
    }

    let mut writer = jpa_writer(512);
    assert!(writer.initialize(&target));
    for (i, payload) in payloads.iter().enumerate() {
        assert!(writer.add_virtual_entry(&format!("file{}.bin", i), payload));
    }
    assert!(writer.finalize());

    // Two records fit in part 1; the third starts part 2 with its signature
    // at offset 0.
    let part1 = fs::read(dir.path().join("out.j01")).unwrap();
    let part2 = fs::read(&target).unwrap();
    assert!(part1.len() as u64 <= 512);
    assert_eq!(&part2[..3], b"JPF");

    let archive = reader::read_jpa(&target);
    assert_eq!(archive.header_len, 27);
    assert_eq!(archive.total_parts, Some(2));
    assert_eq!(archive.total_entries, 3);
    for (entry, payload) in archive.entries.iter().zip(&payloads) {
        assert_eq!(&entry.data, payload);
    }
}

#[test]
fn stored_payload_straddles_parts() {
    let dir = tempdir().unwrap();
    let source = dir.path().join("data.bin");
    let mut payload = vec![0u8; 400];
    thread_rng().fill(&mut payload[..]);
    fs::write(&source, &payload).unwrap();

    // Split run.
    let split_target = dir.path().join("split.jpa");
    let mut writer = jpa_writer(256);
    assert!(writer.initialize(&split_target));
    assert!(writer.add_entry_from_path(&source, "data.bin"));
    assert!(writer.finalize());

    // Single-part run over the same source.
    let single_target = dir.path().join("single.jpa");
    let mut writer = jpa_writer(0);
    assert!(writer.initialize(&single_target));
    assert!(writer.add_entry_from_path(&source, "data.bin"));
    assert!(writer.finalize());

    let part1 = fs::read(dir.path().join("split.j01")).unwrap();
    assert_eq!(part1.len(), 256, "first part filled to the byte");

    // The record stream is identical; only the standard header differs by
    // the split extension (19 vs 27 bytes).
    let concatenated = reader::read_concatenated(&split_target);
    let single = fs::read(&single_target).unwrap();
    assert_eq!(&concatenated[27..], &single[19..]);

    let archive = reader::read_jpa(&split_target);
    assert_eq!(archive.total_parts, Some(2));
    assert_eq!(archive.entries[0].data, payload);
    assert_eq!(archive.entries[0].compression, 0);
}

#[test]
fn part_sizes_never_exceed_the_limit() {
    let dir = tempdir().unwrap();
    let target = dir.path().join("out.jpa");
    let mut payload = vec![0u8; 3000];
    thread_rng().fill(&mut payload[..]);

    let mut writer = jpa_writer(300);
    assert!(writer.initialize(&target));
    assert!(writer.add_virtual_entry("noise.bin", &payload));
    assert!(writer.add_virtual_entry("more.bin", &payload[..700]));
    assert!(writer.finalize());

    for part in reader::collect_parts(&target) {
        assert!(fs::metadata(&part).unwrap().len() <= 300, "{:?} over limit", part);
    }

    let archive = reader::read_jpa(&target);
    assert_eq!(archive.entries[0].data, payload);
    assert_eq!(archive.entries[1].data, &payload[..700]);
}

#[test]
fn encrypted_blocks_straddle_parts() {
    let dir = tempdir().unwrap();
    let target = dir.path().join("out.jps");
    let mut payload = vec![0u8; 600];
    thread_rng().fill(&mut payload[..]);

    let mut opts = WriterOptions::new(ArchiveFormat::Jps);
    opts.part_size = 300;
    opts.password = Some(b"pw".to_vec());
    opts.static_salt = Some([9u8; 64]);
    let mut writer = ArchiveWriter::new(opts);

    assert!(writer.initialize(&target));
    assert!(writer.add_virtual_entry("noise.bin", &payload));
    assert!(writer.add_virtual_entry("text.txt", b"hello split world"));
    assert!(writer.finalize());

    let parts = reader::collect_parts(&target);
    assert!(parts.len() > 1, "archive must have split");
    // The end header may spill past the limit on the terminal part only.
    for part in &parts[..parts.len() - 1] {
        assert!(fs::metadata(part).unwrap().len() <= 300);
    }
    assert!(fs::metadata(&parts[parts.len() - 1]).unwrap().len() <= 300 + 17);

    let archive = reader::read_jps(&target, b"pw");
    assert!(archive.is_split);
    assert_eq!(archive.total_parts, parts.len() as u16);
    assert_eq!(archive.entries[0].data, payload);
    assert_eq!(archive.entries[1].data, b"hello split world");
}
