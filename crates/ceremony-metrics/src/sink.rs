//! Destinations for exported points

use std::path::Path;

use async_trait::async_trait;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::error::{MetricsError, Result};
use crate::point::ExportedPoint;

/// Accepts batches of points; each batch is written once and discarded
#[async_trait]
pub trait PointSink: Send + Sync {
    async fn write_points(&self, points: &[ExportedPoint]) -> Result<()>;
}

/// Encoding used by [`FileSink`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkFormat {
    /// One JSON object per point per line
    JsonLines,
    /// Time-series line protocol
    LineProtocol,
}

impl SinkFormat {
    /// Pick a format from a file extension (`.lp` selects line protocol)
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("lp") | Some("line") => SinkFormat::LineProtocol,
            _ => SinkFormat::JsonLines,
        }
    }
}

/// Appends encoded points to a local file
pub struct FileSink {
    file: Mutex<File>,
    format: SinkFormat,
}

impl FileSink {
    /// Open `path` for appending, creating it if needed
    pub async fn create(path: &Path, format: SinkFormat) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;
        Ok(Self {
            file: Mutex::new(file),
            format,
        })
    }

    fn encode(&self, points: &[ExportedPoint]) -> Result<String> {
        let mut buf = String::new();
        for point in points {
            match self.format {
                SinkFormat::JsonLines => {
                    buf.push_str(&serde_json::to_string(point)?);
                    buf.push('\n');
                }
                SinkFormat::LineProtocol => {
                    if let Some(line) = point.to_line_protocol() {
                        buf.push_str(&line);
                        buf.push('\n');
                    }
                }
            }
        }
        Ok(buf)
    }
}

#[async_trait]
impl PointSink for FileSink {
    async fn write_points(&self, points: &[ExportedPoint]) -> Result<()> {
        let buf = self.encode(points)?;
        let mut file = self.file.lock().await;
        file.write_all(buf.as_bytes())
            .await
            .map_err(|e| MetricsError::Sink(e.to_string()))?;
        file.flush()
            .await
            .map_err(|e| MetricsError::Sink(e.to_string()))?;
        Ok(())
    }
}
