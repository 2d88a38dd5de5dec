// tests/rotation_layout.rs
use rfarchive::*;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

// 2014-03-09T12:30:30Z
const UNIX_START: u64 = 1_394_368_230;
const RATE: f64 = 100.0;

fn config(dir: &Path, start: u64) -> ChannelConfig {
    ChannelConfig::new(dir, SampleType::i16(), 40, 10, start, RATE)
        .complex(true)
        .channel_id("rotation-test")
}

/// Sorted subdirectories and the sorted files inside each
fn layout(dir: &Path) -> Vec<(String, Vec<PathBuf>)> {
    let mut dirs: Vec<PathBuf> = fs::read_dir(dir).unwrap().map(|e| e.unwrap().path()).collect();
    dirs.sort();
    dirs.into_iter()
        .map(|d| {
            let mut files: Vec<PathBuf> = fs::read_dir(&d).unwrap().map(|e| e.unwrap().path()).collect();
            files.sort();
            (d.file_name().unwrap().to_string_lossy().into_owned(), files)
        })
        .collect()
}

fn file_name(path: &Path) -> String {
    path.file_name().unwrap().to_string_lossy().into_owned()
}

fn check_layout(dir: &Path, start: u64) {
    let layout = layout(dir);
    assert_eq!(layout.len(), 2);
    assert_eq!(layout[0].0, "2014-03-09T12:30:30");
    assert_eq!(layout[1].0, "2014-03-09T12:30:34");
    assert_eq!(layout[0].1.len(), 10);
    assert_eq!(layout[1].1.len(), 8);

    let files: Vec<&PathBuf> = layout.iter().flat_map(|(_, files)| files).collect();
    for (sequence, path) in files.iter().enumerate() {
        let anchor = start + 40 * sequence as u64;
        let expected = format!("rf@{}.{:03}.rfc", anchor / 100, (anchor % 100) * 10);
        assert_eq!(file_name(path), expected);

        let mut reader = ContainerReader::open(path).unwrap();
        assert!(reader.is_finalized());
        assert_eq!(
            reader.attribute(DATA_DATASET, "sequence_num"),
            Some(&AttributeValue::I64(sequence as i64))
        );
        assert_eq!(reader.attribute(DATA_DATASET, "is_complex"), Some(&AttributeValue::I32(1)));
        assert_eq!(
            reader.attribute(DATA_DATASET, "channel_id").and_then(|v| v.as_str()),
            Some("rotation-test")
        );
        assert_eq!(reader.attribute(DATA_DATASET, "epoch").and_then(|v| v.as_str()), Some(EPOCH));

        // One anchor row per file, nothing else
        assert_eq!(reader.read_index(INDEX_DATASET).unwrap(), vec![[anchor, 0]]);

        let spec = reader.dataset(DATA_DATASET).unwrap();
        // Complex samples keep the subchannel axis even for one subchannel
        assert_eq!(spec.dims.as_slice(), &[40, 1]);
    }
}

#[test]
fn test_single_write_spans_two_directories() {
    let dir = TempDir::new().unwrap();
    let start = UNIX_START * 100;
    let mut writer = ChannelWriter::open(config(dir.path(), start)).unwrap();

    let samples: Vec<[i16; 2]> = (0..700).map(|i| [i as i16, -(i as i16)]).collect();
    writer.write_samples(0, &samples).unwrap();

    assert_eq!(writer.files_created(), 18);
    assert_eq!(writer.cursor().file_sequence, Some(17));
    assert_eq!(writer.cursor().dataset_index, 20);
    assert_eq!(writer.next_sample(), 700);
    writer.close().unwrap();

    check_layout(dir.path(), start);
}

#[test]
fn test_many_writes_match_single_write() {
    let dir = TempDir::new().unwrap();
    let start = UNIX_START * 100 + 1;
    let mut writer = ChannelWriter::open(config(dir.path(), start)).unwrap();

    let block = vec![[7i16, 7i16]; 100];
    for i in 0..7 {
        writer.write_samples(i * 100, &block).unwrap();
    }
    assert_eq!(writer.samples_written(), 700);
    assert_eq!(writer.gap_samples(), 0);
    drop(writer);

    check_layout(dir.path(), start);
}

#[test]
fn test_sample_values_survive_rotation() {
    let dir = TempDir::new().unwrap();
    let start = UNIX_START * 100;
    let mut writer = ChannelWriter::open(config(dir.path(), start).complex(false)).unwrap();

    let samples: Vec<i16> = (0..100).collect();
    writer.write_samples(0, &samples).unwrap();
    writer.close().unwrap();

    let layout = layout(dir.path());
    let files = &layout[0].1;
    assert_eq!(files.len(), 3);

    let mut values = Vec::new();
    for path in files {
        let mut reader = ContainerReader::open(path).unwrap();
        let bytes = reader.read_rows(DATA_DATASET, 0, 40).unwrap();
        values.extend(bytes.chunks_exact(2).map(|c| i16::from_ne_bytes([c[0], c[1]])));
    }
    assert_eq!(&values[..100], &samples[..]);
    assert!(values[100..].iter().all(|v| *v == i16::MIN));
}

#[test]
fn test_progress_reports_each_file() {
    let dir = TempDir::new().unwrap();
    let start = UNIX_START * 100;
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);

    let mut writer = ChannelWriter::open(config(dir.path(), start))
        .unwrap()
        .with_progress(move |event: &FileCreated<'_>| {
            sink.lock().unwrap().push((event.sequence, event.anchor_sample, event.new_directory));
        });
    writer.write_samples(0, &vec![[0i16; 2]; 700]).unwrap();
    writer.close().unwrap();

    let events = events.lock().unwrap();
    assert_eq!(events.len(), 18);
    for (i, (sequence, anchor, new_directory)) in events.iter().enumerate() {
        assert_eq!(*sequence, i as u64);
        assert_eq!(*anchor, start + 40 * i as u64);
        assert_eq!(*new_directory, i == 0 || i == 10);
    }
}
