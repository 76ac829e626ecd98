use super::helpers::id;
use crate::direct::*;
use anyhow::Result;
use sigindex::{IndexError, LocationRecord, SignalIndex};
use source::{Fault, MemorySource, MemorySourceBuilder, SourceError};

/// One read stored as a full row of 3 and a partial row of 2.
fn split_read(builder: MemorySourceBuilder) -> MemorySource {
    let mut b = builder;
    b.add_read_rows(id(1), 10.0, 0.5, vec![vec![1, 2, 3], vec![4, 5]]);
    b.build()
}

// -------------------- Raw fetch --------------------

#[test]
fn fetch_concatenates_rows_in_order() -> Result<()> {
    let src = split_read(MemorySource::builder());
    let index = SignalIndex::build(&src)?;

    let raw = fetch_signal(&src, index.locate(&id(1))?)?;
    assert_eq!(raw, vec![1, 2, 3, 4, 5]);
    Ok(())
}

#[test]
fn fetch_reads_only_the_traces_rows() -> Result<()> {
    let mut b = MemorySource::builder().row_capacity(4);
    b.add_read(id(1), 0.0, 1.0, &[7; 9]);
    b.add_read(id(2), 0.0, 1.0, &[8; 5]);
    b.add_read(id(3), 0.0, 1.0, &[9; 4]);
    let src = b.build();
    let index = SignalIndex::build(&src)?;

    let raw = fetch_signal(&src, index.locate(&id(2))?)?;
    assert_eq!(raw, vec![8; 5]);
    assert_eq!(src.stats().row_info_calls(), 1);
    assert_eq!(src.stats().chunks_read(), 2);
    // Never touches the read-metadata table.
    assert_eq!(src.stats().batches_opened(), 1);
    Ok(())
}

#[test]
fn fetch_into_fills_callers_buffer() -> Result<()> {
    let src = split_read(MemorySource::builder());
    let index = SignalIndex::build(&src)?;

    let mut out = [0i16; 5];
    fetch_signal_into(&src, index.locate(&id(1))?, &mut out)?;
    assert_eq!(out, [1, 2, 3, 4, 5]);
    Ok(())
}

#[test]
fn fetch_into_rejects_wrong_buffer_length() -> Result<()> {
    let src = split_read(MemorySource::builder());
    let index = SignalIndex::build(&src)?;

    let mut out = [0i16; 4];
    let err = fetch_signal_into(&src, index.locate(&id(1))?, &mut out).unwrap_err();
    assert!(matches!(
        err,
        IndexError::SampleCountMismatch {
            expected: 5,
            actual: 4,
            ..
        }
    ));
    assert_eq!(src.stats().chunks_read(), 0);
    Ok(())
}

#[test]
fn empty_trace_fetches_nothing() -> Result<()> {
    let mut b = MemorySource::builder();
    b.add_read(id(1), 0.0, 1.0, &[]);
    let src = b.build();
    let index = SignalIndex::build(&src)?;

    assert!(fetch_signal(&src, index.locate(&id(1))?)?.is_empty());
    Ok(())
}

#[test]
fn location_without_rows_skips_the_reader() -> Result<()> {
    let src = MemorySource::builder().build();
    let loc = LocationRecord {
        row_start: 0,
        row_count: 0,
        n_samples: 0,
        calibration_offset: 0.0,
        calibration_scale: 1.0,
    };
    assert!(fetch_signal(&src, &loc)?.is_empty());
    assert_eq!(src.stats().row_info_calls(), 0);
    Ok(())
}

// -------------------- Integrity --------------------

#[test]
fn row_range_past_u64_max_is_a_format_error() {
    let src = MemorySource::builder().build();
    let loc = LocationRecord {
        row_start: u64::MAX,
        row_count: 2,
        n_samples: 5,
        calibration_offset: 0.0,
        calibration_scale: 1.0,
    };
    let err = fetch_signal(&src, &loc).unwrap_err();
    assert!(matches!(err, IndexError::Format(_)));
    assert_eq!(src.stats().row_info_calls(), 0);
}

#[test]
fn stale_sample_count_is_a_mismatch() -> Result<()> {
    let src = split_read(MemorySource::builder());
    let mut loc = *SignalIndex::build(&src)?.locate(&id(1))?;
    loc.n_samples = 6;

    let err = fetch_signal(&src, &loc).unwrap_err();
    assert!(matches!(
        err,
        IndexError::SampleCountMismatch {
            row_start: 0,
            expected: 6,
            actual: 5
        }
    ));
    // Detected before any chunk is decoded.
    assert_eq!(src.stats().chunks_read(), 0);
    Ok(())
}

#[test]
fn missing_signal_row_is_a_source_error() -> Result<()> {
    let src = split_read(MemorySource::builder());
    let mut loc = *SignalIndex::build(&src)?.locate(&id(1))?;
    loc.row_count = 3;

    let err = fetch_signal(&src, &loc).unwrap_err();
    assert!(matches!(err, IndexError::Source(SourceError::NoSuchRow(2))));
    Ok(())
}

#[test]
fn row_info_failure_is_propagated() -> Result<()> {
    let src = split_read(MemorySource::builder().fault(Fault::RowInfo(1)));
    let index = SignalIndex::build(&src)?;

    let err = fetch_signal(&src, index.locate(&id(1))?).unwrap_err();
    assert!(matches!(
        err,
        IndexError::Source(SourceError::Call {
            call: "row_info",
            ..
        })
    ));
    Ok(())
}

#[test]
fn chunk_failure_is_propagated() -> Result<()> {
    let src = split_read(MemorySource::builder().fault(Fault::ReadChunk(1)));
    let index = SignalIndex::build(&src)?;

    let err = fetch_signal(&src, index.locate(&id(1))?).unwrap_err();
    assert!(matches!(
        err,
        IndexError::Source(SourceError::Call {
            call: "read_chunk",
            ..
        })
    ));
    Ok(())
}

// -------------------- Calibration --------------------

#[test]
fn calibrated_fetch_applies_offset_then_scale() -> Result<()> {
    let src = split_read(MemorySource::builder());
    let index = SignalIndex::build(&src)?;

    let pa = fetch_calibrated_signal(&src, index.locate(&id(1))?)?;
    assert_eq!(pa, vec![5.5, 6.0, 6.5, 7.0, 7.5]);
    Ok(())
}

#[test]
fn calibrate_handles_negative_samples() {
    let loc = LocationRecord {
        row_start: 0,
        row_count: 1,
        n_samples: 3,
        calibration_offset: -2.0,
        calibration_scale: 0.25,
    };
    assert_eq!(calibrate(&loc, &[0, -6, 10]), vec![-0.5, -2.0, 2.0]);
}
