#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    clippy::uninlined_format_args
)]

mod common;

use approx::{assert_abs_diff_eq, assert_relative_eq};
use common::{build_sector, build_streams, pattern, write_fileset};
use k2is_core::{Image, SECTOR_COUNT, STRIPES_PER_SECTOR_PER_FRAME, STRIPE_SIZE};
use k2is_io::{
    AxisIndex, DatasetMetadata, Error, FrameSink, K2DataArray, K2Dataset, MetadataSource,
    NoiseCorrection, NullMetadataSource, ReduceAxes, Result, SectorStreams,
};

const VISIBLE: (usize, usize) = (1792, 1920);

fn meta_2x2() -> DatasetMetadata {
    DatasetMetadata {
        scan_shape: Some((2, 2)),
        detector_shape: Some(VISIBLE),
        ..DatasetMetadata::default()
    }
}

/// A 2x2 scan, 4 frames, aligned streams, shutter open throughout.
fn dataset_2x2() -> K2DataArray<Vec<u8>> {
    let streams = build_streams([0; SECTOR_COUNT], 4, 0, pattern);
    K2DataArray::from_streams(streams, meta_2x2()).unwrap()
}

/// Truncated hidden-row column mean of `value` for one frame, replicating
/// the auto-correction definition from first principles.
fn hidden_mean(value: common::ValueFn, frame: usize, col: usize) -> i16 {
    let sum: i64 = (1792..1860).map(|row| i64::from(value(frame, row, col))).sum();
    (sum as f64 / 68.0) as i16
}

fn noisy(frame: usize, row: usize, col: usize) -> u16 {
    if row >= 1792 {
        64
    } else {
        500 + ((row + 2 * col + frame) % 256) as u16
    }
}

#[test]
fn test_raw_decode_matches_encoded_pattern() {
    let ds = dataset_2x2();
    let frame = ds.decode_frame(3);
    for row in (0..1860).step_by(121) {
        for col in (0..2048).step_by(97) {
            assert_eq!(frame.get(row, col), pattern(3, row, col) as i16);
        }
    }
}

#[test]
fn test_corrupt_stripe_leaves_region_zero() {
    // Corrupt the sync marker of stripe 3 in sector 2's second frame (the
    // sync protocol inspects the first frame, so leave that one intact).
    let mut sources: Vec<Vec<u8>> = (0..SECTOR_COUNT)
        .map(|s| build_sector(s, 0, 4 * STRIPES_PER_SECTOR_PER_FRAME, 0, pattern))
        .collect();
    sources[2][(STRIPES_PER_SECTOR_PER_FRAME + 3) * STRIPE_SIZE] = 0;
    let ds = K2DataArray::from_streams(SectorStreams::new(sources), meta_2x2()).unwrap();

    let frame = ds.decode_frame(1);
    // Stripe 3 covers sector-local columns 48..64, rows 0..930.
    let (c0, c1) = (2 * 256 + 48, 2 * 256 + 64);
    for row in (0..930).step_by(41) {
        for col in c0..c1 {
            assert_eq!(frame.get(row, col), 0, "row {row} col {col}");
        }
    }
    // Neighboring stripes decode normally.
    assert_eq!(frame.get(0, c0 - 1), pattern(1, 0, c0 - 1) as i16);
    assert_eq!(frame.get(0, c1), pattern(1, 0, c1) as i16);
    assert_eq!(frame.get(930, c0), pattern(1, 930, c0) as i16);

    // The intact first frame is unaffected.
    assert_eq!(ds.decode_frame(0).get(0, c0), pattern(0, 0, c0) as i16);
}

#[test]
fn test_decode_past_stream_end_yields_zero_frame() {
    let streams = build_streams([0; SECTOR_COUNT], 2, 0, pattern);
    let ds = K2DataArray::from_streams(streams, meta_2x2()).unwrap();

    // The metadata claims 4 frames but only 2 exist on disk; every stripe of
    // frame 3 is past end of stream, so the frame degrades to all zeros.
    let frame = ds.decode_frame(3);
    assert!(frame.as_slice().iter().all(|&v| v == 0));
}

#[test]
fn test_closed_shutter_stripe_is_still_placed() {
    let mut sources: Vec<Vec<u8>> = (0..SECTOR_COUNT)
        .map(|s| build_sector(s, 0, 4 * STRIPES_PER_SECTOR_PER_FRAME, 0, pattern))
        .collect();
    // Blank the shutter flag of stripe 5 in sector 3's first frame. Stripe 0
    // keeps the shutter open so synchronization does not skip the frame.
    sources[3][5 * STRIPE_SIZE + 9] = 0;
    let ds = K2DataArray::from_streams(SectorStreams::new(sources), meta_2x2()).unwrap();

    // Stripe 5 covers sector-local columns 80..96; the shutter flag is
    // informational and its pixels decode anyway.
    let frame = ds.decode_frame(0);
    let col = 3 * 256 + 80;
    for row in (0..930).step_by(77) {
        assert_eq!(frame.get(row, col), pattern(0, row, col) as i16);
    }
}

#[test]
fn test_auto_correction_subtracts_hidden_row_mean() {
    let streams = build_streams([0; SECTOR_COUNT], 4, 0, noisy);
    let ds = K2DataArray::from_streams(streams, meta_2x2()).unwrap();

    let frame = ds.corrected_frame(0);
    for row in (0..1792).step_by(131) {
        for col in (0..2048).step_by(83) {
            let expected = noisy(0, row, col) as i16 - 64;
            assert_eq!(frame.get(row, col), expected);
        }
    }
    // The hidden rows themselves correct to zero.
    assert_eq!(frame.get(1800, 100), 0);
}

#[test]
fn test_dark_reference_roundtrip_restores_auto_output() {
    let mut ds = dataset_2x2();
    let auto = ds.corrected_frame(0);

    let dark = Image::from_vec(VISIBLE.0, VISIBLE.1, vec![10i16; VISIBLE.0 * VISIBLE.1]);
    ds.set_noise_correction(NoiseCorrection::DarkReference(dark))
        .unwrap();
    let subtracted = ds.corrected_frame(0);
    assert_eq!(subtracted.get(5, 7), pattern(0, 5, 7) as i16 - 10);
    // Hidden rows are beyond the reference's extent and stay uncorrected.
    assert_eq!(subtracted.get(1800, 7), pattern(0, 1800, 7) as i16);
    assert!(ds.dark_reference().is_some());

    ds.set_noise_correction(NoiseCorrection::Auto).unwrap();
    assert!(ds.dark_reference().is_none());
    assert_eq!(ds.corrected_frame(0), auto);
}

#[test]
fn test_dark_reference_shape_is_enforced() {
    let mut ds = dataset_2x2();
    let err = ds
        .set_noise_correction(NoiseCorrection::DarkReference(Image::zeroed(100, 100)))
        .unwrap_err();
    assert!(matches!(
        err,
        Error::DarkReferenceShape {
            rows: 100,
            cols: 100
        }
    ));
    // The previous mode stays active.
    assert_eq!(*ds.noise_correction(), NoiseCorrection::Auto);
}

#[test]
fn test_scalar_and_slice_indexing_agree_after_squeeze() {
    let ds = dataset_2x2();
    let a = ds
        .get([
            AxisIndex::from(0),
            AxisIndex::from(0),
            AxisIndex::full(),
            AxisIndex::full(),
        ])
        .unwrap();
    let b = ds
        .get([
            AxisIndex::from(0..1),
            AxisIndex::from(0..1),
            AxisIndex::full(),
            AxisIndex::full(),
        ])
        .unwrap();

    assert_eq!(a.shape(), [VISIBLE.0, VISIBLE.1]);
    assert_eq!(a, b);
}

#[test]
fn test_scan_axes_come_out_in_cartesian_order() {
    let ds = dataset_2x2();
    let probe = ds
        .get([
            AxisIndex::full(),
            AxisIndex::full(),
            AxisIndex::from(10),
            AxisIndex::from(20),
        ])
        .unwrap();

    // Cartesian scan gridding: axis 0 runs over scan_y, axis 1 over scan_x.
    assert_eq!(probe.shape(), [2, 2, 1, 1]);
    for y in 0..2 {
        for x in 0..2 {
            let expected = ds.corrected_frame(ds.frame_index(x, y)).get(10, 20);
            assert_eq!(probe.at(&[y, x, 0, 0]), expected);
        }
    }
}

#[test]
fn test_fancy_index_lists_honor_order_and_repeats() {
    let ds = dataset_2x2();
    let out = ds
        .get([
            AxisIndex::from(vec![1, 0, 1]),
            AxisIndex::from(0),
            AxisIndex::from(0),
            AxisIndex::from(vec![30, 10]),
        ])
        .unwrap();

    // Leading scan_y singleton squeezes away.
    assert_eq!(out.shape(), [3, 1, 2]);
    for (b, &x) in [1usize, 0, 1].iter().enumerate() {
        let frame = ds.corrected_frame(ds.frame_index(x, 0));
        assert_eq!(out.at(&[b, 0, 0]), frame.get(0, 30));
        assert_eq!(out.at(&[b, 0, 1]), frame.get(0, 10));
    }
}

#[test]
fn test_index_out_of_bounds_is_per_call() {
    let ds = dataset_2x2();
    let err = ds
        .get([
            AxisIndex::from(2),
            AxisIndex::from(0),
            AxisIndex::full(),
            AxisIndex::full(),
        ])
        .unwrap_err();
    assert!(matches!(
        err,
        Error::IndexOutOfBounds {
            axis: 0,
            index: 2,
            len: 2
        }
    ));
}

#[test]
fn test_mean_over_scan_axes_is_frame_average() {
    let ds = dataset_2x2();
    let mean = ds.mean(ReduceAxes::Scan);
    assert_eq!(mean.rows(), VISIBLE.0);
    assert_eq!(mean.cols(), VISIBLE.1);

    for row in (0..VISIBLE.0).step_by(97) {
        for col in (0..VISIBLE.1).step_by(89) {
            let mut expected = 0.0;
            for frame in 0..4 {
                let corrected =
                    pattern(frame, row, col) as i16 - hidden_mean(pattern, frame, col);
                expected += f64::from(corrected);
            }
            expected /= 4.0;
            assert_abs_diff_eq!(mean.get(row, col), expected, epsilon = 1e-9);
        }
    }
}

#[test]
fn test_detector_reductions_are_per_frame_scalars() {
    let ds = dataset_2x2();

    let mean = ds.mean(ReduceAxes::Detector);
    let sum = ds.sum(ReduceAxes::Detector);
    let max = ds.max(ReduceAxes::Detector);
    assert_eq!((mean.rows(), mean.cols()), (2, 2));

    for y in 0..2 {
        for x in 0..2 {
            let frame = ds.corrected_visible_frame(x, y);
            let total: f64 = frame.as_slice().iter().map(|&v| f64::from(v)).sum();
            let n = (VISIBLE.0 * VISIBLE.1) as f64;
            assert_relative_eq!(sum.get(x, y), total);
            assert_abs_diff_eq!(mean.get(x, y), total / n, epsilon = 1e-9);
            assert_eq!(
                max.get(x, y),
                frame.as_slice().iter().copied().max().unwrap()
            );
        }
    }
}

#[test]
fn test_max_over_scan_axes_is_elementwise() {
    let ds = dataset_2x2();
    let max = ds.max(ReduceAxes::Scan);

    for row in (0..VISIBLE.0).step_by(113) {
        for col in (0..VISIBLE.1).step_by(101) {
            let expected = (0..4)
                .map(|f| pattern(f, row, col) as i16 - hidden_mean(pattern, f, col))
                .max()
                .unwrap();
            assert_eq!(max.get(row, col), expected);
        }
    }
}

struct RecordingSink {
    calls: Vec<(usize, usize)>,
    shape: Option<(usize, usize)>,
}

impl FrameSink for RecordingSink {
    fn write_frame(&mut self, scan_x: usize, scan_y: usize, frame: &Image<i16>) -> Result<()> {
        self.calls.push((scan_x, scan_y));
        self.shape = Some((frame.rows(), frame.cols()));
        Ok(())
    }
}

#[test]
fn test_export_walks_scan_in_row_major_order() {
    let ds = dataset_2x2();
    let mut sink = RecordingSink {
        calls: Vec::new(),
        shape: None,
    };
    ds.export(&mut sink).unwrap();

    assert_eq!(sink.calls, vec![(0, 0), (1, 0), (0, 1), (1, 1)]);
    assert_eq!(sink.shape, Some(VISIBLE));
}

#[test]
fn test_empty_scan_shape_falls_back() {
    let streams = build_streams([0; SECTOR_COUNT], 2, 0, pattern);
    let meta = DatasetMetadata {
        scan_shape: Some((0, 0)),
        detector_shape: Some(VISIBLE),
        ..DatasetMetadata::default()
    };
    let ds = K2DataArray::from_streams(streams, meta).unwrap();

    // A zero-area scan grid is treated like a missing one.
    assert_eq!(ds.shape(), (2, 1, VISIBLE.0, VISIBLE.1));
}

#[test]
fn test_missing_metadata_falls_back_to_derived_shapes() {
    let streams = build_streams([0; SECTOR_COUNT], 3, 0, pattern);
    let ds = K2DataArray::from_streams(streams, DatasetMetadata::default()).unwrap();

    // Degraded mode: one scan row of stream-derived length, default detector.
    assert_eq!(ds.shape(), (3, 1, VISIBLE.0, VISIBLE.1));
    assert_eq!(ds.frame_count(), 3);
    assert_eq!(ds.len(), 3 * VISIBLE.0 * VISIBLE.1);
}

struct UnreadableSidecar;

impl MetadataSource for UnreadableSidecar {
    fn read(&self, _sidecar: &std::path::Path) -> Result<DatasetMetadata> {
        Err(Error::Metadata("tag tree is damaged".into()))
    }
}

#[test]
fn test_failing_metadata_source_falls_back() {
    let dir = tempfile::tempdir().unwrap();
    write_fileset(dir.path(), 2, pattern);

    let ds = K2Dataset::open(dir.path(), &UnreadableSidecar).unwrap();
    assert_eq!(ds.shape(), (2, 1, VISIBLE.0, VISIBLE.1));
}

#[test]
fn test_open_fileset_from_directory() {
    let dir = tempfile::tempdir().unwrap();
    write_fileset(dir.path(), 2, pattern);

    let ds = K2Dataset::open(dir.path(), &NullMetadataSource).unwrap();
    assert_eq!(ds.shape(), (2, 1, VISIBLE.0, VISIBLE.1));
    assert_eq!(ds.sync_offsets().as_array(), [0; SECTOR_COUNT]);
    assert_eq!(ds.decode_frame(1).get(0, 0), pattern(1, 0, 0) as i16);
}
