use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, error, info, trace, warn};
use serde_json::Value as JsonValue;

use super::{
    Candidate, CandidateStep, CaptureBackend, CaptureHandle, FenceStatus, InitProgress,
    MetadataLog, Placement, PlacementValidator, Sample, SamplingStrategy, SessionLayout,
    SkipReason, capture::write_image, jobs::BackgroundJob, naming::utm_image_name,
};
use crate::{
    Error,
    loading::SamplerConfig,
    model::{Georeference, clamp_axis},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    InitSampling,
    FindNextSampleLocation,
    PreCaptureValidate,
    CaptureSample,
    /// Draining in-flight work before closing the session
    EndSession,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineStatus {
    /// Not started yet
    Idle,
    Running,
    /// All locations visited or cancelled; the log is closed
    Finished,
    /// Stopped on a fatal error. Samples written so far are kept and the
    /// session can be resumed.
    Halted(String),
}

/// Per-session tallies, for progress reporting
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineCounters {
    pub candidates: usize,
    pub duplicates: usize,
    pub rejected: usize,
    pub already_captured: usize,
    pub captured: usize,
}

/// A capture waiting on its fence. Its record is logged only once the
/// image is on disk.
#[derive(Debug)]
struct InFlightCapture {
    handle: CaptureHandle,
    path: PathBuf,
    sample: Sample,
}

#[derive(Debug)]
struct ImageWrite {
    job: BackgroundJob<Result<(), Error>>,
    sample: Sample,
}

/// Cooperative state machine driving one sampling session.
///
/// Each [`tick`](Self::tick) runs at most one state step and never blocks:
/// render fences and background writes are polled, and the pipeline simply
/// stays in its state until they resolve. At most one capture and one image
/// write are in flight at any time.
pub struct SamplingPipeline {
    config: SamplerConfig,
    layout: SessionLayout,
    strategy: Box<dyn SamplingStrategy>,
    validator: PlacementValidator,
    capture: Box<dyn CaptureBackend>,
    georef: Arc<dyn Georeference>,

    state: PipelineState,
    status: PipelineStatus,
    wait_ticks: u32,
    cancel_requested: bool,
    capture_prepared: bool,

    metadata: Option<MetadataLog>,
    candidate: Option<Candidate>,
    placement: Option<Placement>,
    in_flight: Option<InFlightCapture>,
    image_writer: Option<ImageWrite>,
    counters: PipelineCounters,
}

impl SamplingPipeline {
    /// Creates an idle pipeline whose session lives under
    /// `root/<config name>`.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(
        config: SamplerConfig,
        root: impl AsRef<Path>,
        strategy: Box<dyn SamplingStrategy>,
        validator: PlacementValidator,
        capture: Box<dyn CaptureBackend>,
        georef: Arc<dyn Georeference>,
    ) -> Result<Self, Error> {
        config.validate()?;
        let layout = SessionLayout::new(root, &config.config_name());
        Ok(Self {
            config,
            layout,
            strategy,
            validator,
            capture,
            georef,
            state: PipelineState::Idle,
            status: PipelineStatus::Idle,
            wait_ticks: 0,
            cancel_requested: false,
            capture_prepared: false,
            metadata: None,
            candidate: None,
            placement: None,
            in_flight: None,
            image_writer: None,
            counters: PipelineCounters::default(),
        })
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn status(&self) -> &PipelineStatus {
        &self.status
    }

    pub fn layout(&self) -> &SessionLayout {
        &self.layout
    }

    pub fn counters(&self) -> PipelineCounters {
        self.counters
    }

    pub fn strategy(&self) -> &dyn SamplingStrategy {
        self.strategy.as_ref()
    }

    pub fn is_running(&self) -> bool {
        self.status == PipelineStatus::Running
    }

    /// Starts the session. Initialization runs after the configured number
    /// of warm-up ticks.
    pub fn start(&mut self) {
        if self.state != PipelineState::Idle || self.status == PipelineStatus::Running {
            warn!("Sampling session already started");
            return;
        }
        info!(
            "Starting {} sampling session in {}",
            self.strategy.name(),
            self.layout.session_dir().display()
        );
        self.counters = PipelineCounters::default();
        self.cancel_requested = false;
        self.state = PipelineState::InitSampling;
        self.status = PipelineStatus::Running;
        self.wait_ticks = self.config.init_wait_ticks;
    }

    /// Requests a stop. No new candidates are taken; in-flight captures and
    /// writes drain before the log is closed.
    pub fn cancel(&mut self) {
        match self.status {
            PipelineStatus::Running => {
                if !self.cancel_requested {
                    info!("Cancelling sampling session");
                }
                self.cancel_requested = true;
            }
            PipelineStatus::Idle => self.status = PipelineStatus::Finished,
            PipelineStatus::Finished | PipelineStatus::Halted(_) => {}
        }
    }

    /// Advances the state machine by one step
    pub fn tick(&mut self) -> &PipelineStatus {
        if self.status != PipelineStatus::Running {
            return &self.status;
        }
        if self.wait_ticks > 0 {
            self.wait_ticks -= 1;
            return &self.status;
        }
        if self.cancel_requested && self.state != PipelineState::EndSession {
            self.candidate = None;
            self.placement = None;
            self.state = PipelineState::EndSession;
        }

        let result = match self.state {
            PipelineState::Idle => Ok(()),
            PipelineState::InitSampling => self.init_sampling(),
            PipelineState::FindNextSampleLocation => self.find_next_sample_location(),
            PipelineState::PreCaptureValidate => self.pre_capture_validate(),
            PipelineState::CaptureSample => self.capture_sample(),
            PipelineState::EndSession => self.end_session(),
        };
        if let Err(e) = result {
            self.halt(&e);
        }
        &self.status
    }

    fn init_sampling(&mut self) -> Result<(), Error> {
        if !self.capture_prepared {
            self.capture.prepare(&self.config.capture)?;
            self.capture_prepared = true;
        }

        if self.strategy.init(&self.layout)? == InitProgress::Pending {
            trace!("Waiting for {} strategy data", self.strategy.name());
            return Ok(());
        }

        self.layout.create_dirs()?;
        let info = self.session_info();
        self.metadata = Some(MetadataLog::open(&self.layout.metadata_path(), &info)?);

        info!(
            "Sampling initialized, about {} samples to capture",
            self.strategy.estimated_sample_count()
        );
        self.state = PipelineState::FindNextSampleLocation;
        Ok(())
    }

    fn session_info(&self) -> JsonValue {
        let mut info = self.strategy.describe_config();
        if let Some(object) = info.as_object_mut() {
            object.insert("Strategy".to_string(), self.strategy.name().into());
            object.insert("ConfigName".to_string(), self.config.config_name().into());
        }
        info
    }

    fn find_next_sample_location(&mut self) -> Result<(), Error> {
        loop {
            match self.strategy.next_candidate()? {
                CandidateStep::Candidate(candidate) => {
                    self.counters.candidates += 1;
                    self.candidate = Some(candidate);
                    self.state = PipelineState::PreCaptureValidate;
                    return Ok(());
                }
                CandidateStep::Skipped(SkipReason::Duplicate) => self.counters.duplicates += 1,
                CandidateStep::Skipped(SkipReason::AlreadyCaptured) => {
                    self.counters.already_captured += 1;
                }
                CandidateStep::Exhausted => {
                    info!("All sample locations visited");
                    self.state = PipelineState::EndSession;
                    return Ok(());
                }
            }
        }
    }

    fn pre_capture_validate(&mut self) -> Result<(), Error> {
        let candidate = self
            .candidate
            .as_ref()
            .ok_or(Error::UnrecoverableError("validation without a candidate"))?;

        match self.strategy.validate(candidate, &self.validator) {
            Some(placement) => {
                self.placement = Some(placement);
                self.state = PipelineState::CaptureSample;
                self.wait_ticks = self.config.capture_wait_ticks;
            }
            None => {
                trace!("Rejected candidate at {:?}", candidate.pose.location);
                self.counters.rejected += 1;
                self.candidate = None;
                self.state = PipelineState::FindNextSampleLocation;
            }
        }
        Ok(())
    }

    fn capture_sample(&mut self) -> Result<(), Error> {
        if !self.collect_capture()? {
            return Ok(());
        }
        if !self.metadata_log()?.poll()? {
            return Ok(());
        }

        let (Some(candidate), Some(placement)) = (self.candidate.take(), self.placement.take())
        else {
            return Err(Error::UnrecoverableError("capture without a placement"));
        };
        self.state = PipelineState::FindNextSampleLocation;

        let mut sample = self.sample_for(&candidate, &placement);
        let name = candidate
            .image_name
            .clone()
            .unwrap_or_else(|| utm_image_name(&sample));
        let path = candidate
            .image_dir
            .clone()
            .unwrap_or_else(|| self.layout.images_dir())
            .join(name);
        if path.exists() {
            trace!("Skipping already captured {}", path.display());
            self.counters.already_captured += 1;
            return Ok(());
        }
        sample.image_path = Some(self.layout.relative_path(&path));

        let handle = self.capture.begin_capture(&placement.pose)?;
        self.in_flight = Some(InFlightCapture {
            handle,
            path,
            sample,
        });
        Ok(())
    }

    fn record_sample(&mut self, sample: &Sample) -> Result<(), Error> {
        let metadata = self.metadata_log()?;
        metadata.append(sample)?;
        debug!(
            "Captured sample {} at {:.5}, {:.5}",
            metadata.record_count(),
            sample.lat,
            sample.lon
        );
        self.counters.captured += 1;
        Ok(())
    }

    fn metadata_log(&mut self) -> Result<&mut MetadataLog, Error> {
        self.metadata
            .as_mut()
            .ok_or(Error::UnrecoverableError("capture without an open sample log"))
    }

    fn sample_for(&self, candidate: &Candidate, placement: &Placement) -> Sample {
        let pose = placement.pose;
        let geodetic = self.georef.to_geodetic(pose.location);
        Sample {
            image_path: None,
            heading_angle: pose.rotation.compass_heading(),
            pitch: clamp_axis(pose.rotation.pitch + 90.0),
            roll: pose.rotation.roll,
            lon: geodetic.lon,
            lat: geodetic.lat,
            altitude: geodetic.height,
            street_name: candidate.street_name.clone(),
            artifact_probability: placement.artifact_probability,
        }
    }

    /// Moves the in-flight capture to the image writer once its fence has
    /// signaled and the writer slot is free. Returns `true` when no capture
    /// is in flight.
    fn collect_capture(&mut self) -> Result<bool, Error> {
        if !self.collect_image_write()? {
            return Ok(self.in_flight.is_none());
        }

        let Some(in_flight) = self.in_flight.as_ref() else {
            return Ok(true);
        };
        match self.capture.poll_fence(in_flight.handle) {
            FenceStatus::Pending => return Ok(false),
            FenceStatus::Failed(reason) => return Err(Error::CaptureResource(reason)),
            FenceStatus::Signaled => {}
        }

        let Some(InFlightCapture {
            handle,
            path,
            sample,
        }) = self.in_flight.take()
        else {
            return Ok(true);
        };
        let image = self.capture.read_pixels(handle);
        self.capture.release(handle);
        let image = image?;
        self.image_writer = Some(ImageWrite {
            job: BackgroundJob::spawn(move || write_image(&path, &image)),
            sample,
        });
        Ok(true)
    }

    /// Logs the record of a finished image write. Returns `true` when the
    /// writer slot is free.
    fn collect_image_write(&mut self) -> Result<bool, Error> {
        let Some(write) = self.image_writer.as_mut() else {
            return Ok(true);
        };
        let Some(outcome) = write.job.try_take() else {
            return Ok(false);
        };
        let Some(ImageWrite { sample, .. }) = self.image_writer.take() else {
            return Ok(true);
        };
        outcome??;
        self.record_sample(&sample)?;
        Ok(true)
    }

    fn end_session(&mut self) -> Result<(), Error> {
        if !self.collect_capture()? || !self.collect_image_write()? {
            return Ok(());
        }
        if let Some(metadata) = self.metadata.as_mut() {
            if !metadata.poll()? {
                return Ok(());
            }
        }

        if let Some(metadata) = self.metadata.take() {
            metadata.close()?;
        }
        if self.capture_prepared {
            self.capture.shutdown();
            self.capture_prepared = false;
        }

        let counters = self.counters;
        info!(
            "Sampling session finished: {} captured, {} already captured, {} rejected, {} duplicates",
            counters.captured, counters.already_captured, counters.rejected, counters.duplicates
        );
        self.state = PipelineState::Idle;
        self.status = PipelineStatus::Finished;
        Ok(())
    }

    /// Stops the session. An image already being written still gets its
    /// record; the log is left unclosed and gets repaired when the session
    /// is resumed.
    fn halt(&mut self, reason: &Error) {
        error!("Sampling halted: {reason}");
        if let Some(in_flight) = self.in_flight.take() {
            self.capture.release(in_flight.handle);
        }
        if let Err(e) = self.salvage_writes() {
            warn!("Could not log the last written image: {e}");
        }
        if self.capture_prepared {
            self.capture.shutdown();
            self.capture_prepared = false;
        }
        self.metadata = None;
        self.candidate = None;
        self.placement = None;
        self.state = PipelineState::Idle;
        self.status = PipelineStatus::Halted(reason.to_string());
    }

    fn salvage_writes(&mut self) -> Result<(), Error> {
        if let Some(ImageWrite { job, sample }) = self.image_writer.take() {
            job.wait()??;
            self.record_sample(&sample)?;
        }
        match self.metadata.as_mut() {
            Some(metadata) => metadata.flush(),
            None => Ok(()),
        }
    }
}
