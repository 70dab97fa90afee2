//! Samples read as text lines, one fix per line.
//!
//! Format: `lat,lng[,accuracy_m]`. Blank lines and lines starting with `#`
//! are skipped; malformed lines are logged and skipped.

use chrono::Utc;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::{PositionSource, WatchHandle};
use crate::geo::{GeoError, PositionSample};

/// Errors from parsing a sample line.
#[derive(Debug, Error, PartialEq)]
pub enum SampleParseError {
    #[error("Expected 'lat,lng[,accuracy]', got {0} field(s)")]
    FieldCount(usize),

    #[error("Field '{field}' is not a number: '{value}'")]
    NotANumber { field: &'static str, value: String },

    #[error(transparent)]
    Geo(#[from] GeoError),
}

/// Parse one `lat,lng[,accuracy_m]` line into a sample captured now.
pub fn parse_sample_line(line: &str) -> Result<PositionSample, SampleParseError> {
    let fields: Vec<&str> = line.split(',').map(str::trim).collect();
    if !(2..=3).contains(&fields.len()) {
        return Err(SampleParseError::FieldCount(fields.len()));
    }

    let lat = number("lat", fields[0])?;
    let lng = number("lng", fields[1])?;
    let accuracy = match fields.get(2) {
        Some(raw) if !raw.is_empty() => Some(number("accuracy", raw)?),
        _ => None,
    };

    Ok(PositionSample::new(lat, lng, accuracy, Utc::now())?)
}

fn number(field: &'static str, value: &str) -> Result<f64, SampleParseError> {
    value.parse().map_err(|_| SampleParseError::NotANumber {
        field,
        value: value.to_string(),
    })
}

/// Reads samples from any async line reader, such as stdin.
///
/// The reader is consumed by the first watch; later watches are inert.
pub struct LineSource<R> {
    reader: Option<R>,
}

impl<R> LineSource<R>
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    pub fn new(reader: R) -> Self {
        Self {
            reader: Some(reader),
        }
    }
}

impl<R> PositionSource for LineSource<R>
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    fn watch(&mut self, sink: mpsc::Sender<PositionSample>) -> WatchHandle {
        let Some(reader) = self.reader.take() else {
            warn!("Line source already consumed; watch is inert");
            return WatchHandle::inert();
        };

        WatchHandle::spawn(move |cancel| async move {
            let mut lines = reader.lines();
            let mut line_no = 0u64;
            loop {
                let line = tokio::select! {
                    _ = cancel.cancelled() => return,
                    line = lines.next_line() => line,
                };
                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) => {
                        debug!(lines = line_no, "Line source reached end of input");
                        return;
                    }
                    Err(e) => {
                        warn!(error = %e, "Line source read failed");
                        return;
                    }
                };
                line_no += 1;

                let trimmed = line.trim();
                if trimmed.is_empty() || trimmed.starts_with('#') {
                    continue;
                }
                match parse_sample_line(trimmed) {
                    Ok(sample) => {
                        if sink.send(sample).await.is_err() {
                            return;
                        }
                    }
                    Err(e) => warn!(line = line_no, error = %e, "Skipping malformed sample line"),
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::LatLng;

    #[test]
    fn test_parse_two_and_three_fields() {
        let s = parse_sample_line("-1.2864, 36.8172").unwrap();
        assert_eq!(s.point(), LatLng::new(-1.2864, 36.8172));
        assert_eq!(s.accuracy_m, None);

        let s = parse_sample_line("-1.2864,36.8172,12.5").unwrap();
        assert_eq!(s.accuracy_m, Some(12.5));
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(
            parse_sample_line("1.0").unwrap_err(),
            SampleParseError::FieldCount(1)
        );
        assert!(matches!(
            parse_sample_line("north,36.8"),
            Err(SampleParseError::NotANumber { field: "lat", .. })
        ));
        assert_eq!(
            parse_sample_line("91,0").unwrap_err(),
            SampleParseError::Geo(GeoError::InvalidLatitude(91.0))
        );
        assert!(matches!(
            parse_sample_line("1,2,-3"),
            Err(SampleParseError::Geo(GeoError::InvalidAccuracy(_)))
        ));
    }

    #[tokio::test]
    async fn test_reads_lines_and_skips_noise() {
        let input = "# header\n1.0,2.0\n\nbogus\n3.0,4.0,5\n";
        let mut source = LineSource::new(tokio::io::BufReader::new(input.as_bytes()));
        let (tx, mut rx) = mpsc::channel(8);
        let _watch = source.watch(tx);

        assert_eq!(rx.recv().await.unwrap().point(), LatLng::new(1.0, 2.0));
        assert_eq!(rx.recv().await.unwrap().point(), LatLng::new(3.0, 4.0));
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_second_watch_is_inert() {
        let mut source = LineSource::new(tokio::io::BufReader::new("1,2\n".as_bytes()));
        let (tx, _rx) = mpsc::channel(8);
        let first = source.watch(tx.clone());
        let second = source.watch(tx);
        assert!(!second.is_active());
        first.finished().await;
    }
}
