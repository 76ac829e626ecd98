//! Direct signal-table access.
//!
//! A [`LocationRecord`] carries everything needed to pull a trace out of
//! the signal table: no read-metadata lookup happens here.

use sigindex::{IndexError, LocationRecord, Result};
use source::{SignalRows, SourceError};

/// Fetches the raw samples of the trace at `loc`.
///
/// # Errors
///
/// [`IndexError::Source`] if any reader call fails,
/// [`IndexError::SampleCountMismatch`] if the stored rows do not add up to
/// `loc.n_samples` and [`IndexError::Format`] if the row range overflows.
/// No partial buffer is returned.
pub fn fetch_signal<R>(rows: &R, loc: &LocationRecord) -> Result<Vec<i16>>
where
    R: SignalRows + ?Sized,
{
    let mut out = vec![0i16; loc.n_samples as usize];
    fetch_signal_into(rows, loc, &mut out)?;
    Ok(out)
}

/// Fetches the raw samples of the trace at `loc` into `out`.
///
/// `out` must be exactly `loc.n_samples` long. The row infos returned by
/// the reader partition `out`: row `i` fills
/// `out[offset_i .. offset_i + stored_samples_i]`, offsets strictly follow
/// row order, and the final offset must equal `n_samples`. The partition is
/// checked before any sample is read.
pub fn fetch_signal_into<R>(rows: &R, loc: &LocationRecord, out: &mut [i16]) -> Result<()>
where
    R: SignalRows + ?Sized,
{
    let expected = u64::from(loc.n_samples);
    if out.len() as u64 != expected {
        return Err(IndexError::SampleCountMismatch {
            row_start: loc.row_start,
            expected,
            actual: out.len() as u64,
        });
    }

    let row_ids: Vec<u64> = loc.rows()?.collect();
    let infos = if row_ids.is_empty() {
        Vec::new()
    } else {
        rows.row_info(&row_ids)?
    };
    if infos.len() != row_ids.len() {
        return Err(SourceError::Call {
            call: "row_info",
            reason: format!("asked for {} rows, got {}", row_ids.len(), infos.len()),
        }
        .into());
    }

    let stored: u64 = infos.iter().map(|i| u64::from(i.stored_samples)).sum();
    if stored != expected {
        return Err(IndexError::SampleCountMismatch {
            row_start: loc.row_start,
            expected,
            actual: stored,
        });
    }

    let mut offset = 0usize;
    for info in &infos {
        let end = offset + info.stored_samples as usize;
        rows.read_chunk(info, &mut out[offset..end])?;
        offset = end;
    }
    Ok(())
}

/// Fetches the trace at `loc` and converts it to physical units.
///
/// Offset and scale come from `loc`, so no second lookup is needed.
pub fn fetch_calibrated_signal<R>(rows: &R, loc: &LocationRecord) -> Result<Vec<f32>>
where
    R: SignalRows + ?Sized,
{
    let raw = fetch_signal(rows, loc)?;
    Ok(calibrate(loc, &raw))
}

/// Applies `(raw + offset) * scale` to every sample.
///
/// Meant for raw buffers only; applying it to calibrated output is wrong.
pub fn calibrate(loc: &LocationRecord, raw: &[i16]) -> Vec<f32> {
    raw.iter().map(|&r| loc.calibrate(r)).collect()
}
