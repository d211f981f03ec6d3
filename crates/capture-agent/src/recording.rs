//! Flight recording, persistence and loading.
//!
//! Recordings keep raw native values, not derived ones, so a recorded flight can
//! be replayed through the virtual simulator under any conversion profile.

use flightlink_telemetry_core::{RawFrame, RawValue, Schema, telemetry_now_ns};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// Flight recording container.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlightRecording {
    pub metadata: RecordingMetadata,
    /// Native field names, in frame value order.
    pub fields: Vec<String>,
    pub frames: Vec<RecordedFrame>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordingMetadata {
    pub simulator: String,
    pub schema: String,
    pub schema_fingerprint: u32,
    pub timestamp: u64,
    pub duration_seconds: f64,
    pub frame_count: usize,
    pub average_fps: f32,
    pub aircraft: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedFrame {
    pub timestamp_ns: u64,
    pub values: Vec<RawValue>,
}

impl FlightRecording {
    /// Rebuild raw frames against `schema`.
    ///
    /// # Errors
    ///
    /// Fails if the recording was made with a different layout.
    pub fn frames_for(&self, schema: &Schema) -> anyhow::Result<Vec<RawFrame>> {
        if self.metadata.schema_fingerprint != schema.fingerprint() {
            anyhow::bail!(
                "Recording layout {:08x} does not match schema '{}' ({:08x})",
                self.metadata.schema_fingerprint,
                schema.name(),
                schema.fingerprint()
            );
        }
        self.frames
            .iter()
            .map(|frame| {
                RawFrame::from_values(schema, frame.values.clone()).map_err(anyhow::Error::from)
            })
            .collect()
    }
}

/// Records raw frames and persists them as JSON.
pub struct FlightRecorder {
    output_path: PathBuf,
    schema: Schema,
    frames: Vec<RecordedFrame>,
    start_time: Option<SystemTime>,
    start_ns: u64,
    simulator: String,
    aircraft: Option<String>,
}

impl FlightRecorder {
    /// # Errors
    ///
    /// Fails if the output directory cannot be created.
    pub fn new(output_path: PathBuf, schema: Schema) -> anyhow::Result<Self> {
        if let Some(parent) = output_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        Ok(Self {
            output_path,
            schema,
            frames: Vec::new(),
            start_time: None,
            start_ns: 0,
            simulator: "unknown".to_string(),
            aircraft: None,
        })
    }

    pub fn start_recording(&mut self, simulator: String) {
        self.simulator = simulator;
        self.start_time = Some(SystemTime::now());
        self.start_ns = telemetry_now_ns();
        self.frames.clear();
    }

    pub fn set_aircraft(&mut self, title: impl Into<String>) {
        self.aircraft = Some(title.into());
    }

    pub fn record_frame(&mut self, frame: &RawFrame) {
        if self.start_time.is_some() {
            self.frames.push(RecordedFrame {
                timestamp_ns: telemetry_now_ns().saturating_sub(self.start_ns),
                values: frame.values().to_vec(),
            });
        }
    }

    /// Finish the recording and write it to the output path.
    ///
    /// # Errors
    ///
    /// Fails if recording was never started or the file cannot be written.
    pub fn stop_recording(
        &mut self,
        description: Option<String>,
    ) -> anyhow::Result<FlightRecording> {
        let start_time = self
            .start_time
            .take()
            .ok_or_else(|| anyhow::anyhow!("Recording not started"))?;

        let duration = SystemTime::now().duration_since(start_time)?;
        let frame_count = self.frames.len();

        let metadata = RecordingMetadata {
            simulator: self.simulator.clone(),
            schema: self.schema.name().to_string(),
            schema_fingerprint: self.schema.fingerprint(),
            timestamp: start_time.duration_since(UNIX_EPOCH)?.as_secs(),
            duration_seconds: duration.as_secs_f64(),
            frame_count,
            average_fps: if duration.as_secs_f64() > 0.0 {
                frame_count as f32 / duration.as_secs_f32()
            } else {
                0.0
            },
            aircraft: self.aircraft.clone(),
            description,
        };

        let recording = FlightRecording {
            metadata,
            fields: self
                .schema
                .fields()
                .iter()
                .map(|f| f.native_name.clone())
                .collect(),
            frames: std::mem::take(&mut self.frames),
        };

        self.save_recording(&recording)?;
        Ok(recording)
    }

    fn save_recording(&self, recording: &FlightRecording) -> anyhow::Result<()> {
        let file = File::create(&self.output_path)?;
        let writer = BufWriter::new(file);
        serde_json::to_writer_pretty(writer, recording)?;
        Ok(())
    }

    /// # Errors
    ///
    /// Fails if the file cannot be read or is not a recording.
    pub fn load_recording<P: AsRef<Path>>(path: P) -> anyhow::Result<FlightRecording> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        Ok(serde_json::from_reader(reader)?)
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    pub fn is_recording(&self) -> bool {
        self.start_time.is_some()
    }

    pub fn output_path(&self) -> &Path {
        &self.output_path
    }
}

impl std::fmt::Debug for FlightRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlightRecorder")
            .field("output_path", &self.output_path)
            .field("schema", &self.schema.name())
            .field("frames", &self.frames.len())
            .field("recording", &self.is_recording())
            .finish()
    }
}
