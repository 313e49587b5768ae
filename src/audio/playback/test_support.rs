//! Deterministic stand-ins for the clock, the output device and the
//! retrieval service.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::oneshot;

use crate::audio::decoding::DecodedTrack;
use crate::audio::errors::{PlaybackError, RetrievalError};
use crate::audio::retrieval::AudioRetriever;

use super::clock::EngineClock;
use super::sink::{CompletionCallback, OutputSink, RenderHandle, RenderRequest};

/// A track of silence at 100 Hz mono.
pub(crate) fn test_track(duration_seconds: f64) -> Arc<DecodedTrack> {
    let frames = (duration_seconds * 100.0).round() as usize;
    Arc::new(DecodedTrack::from_interleaved(vec![0.0; frames], 100, 1).unwrap())
}

// --- Clock ---

/// Engine clock that only moves when told to.
#[derive(Clone, Default)]
pub(crate) struct ManualClock {
    bits: Arc<AtomicU64>,
}

impl ManualClock {
    pub(crate) fn new() -> Self {
        Self::at(0.0)
    }

    pub(crate) fn at(seconds: f64) -> Self {
        ManualClock {
            bits: Arc::new(AtomicU64::new(seconds.to_bits())),
        }
    }

    pub(crate) fn advance(&self, seconds: f64) {
        self.set(self.now() + seconds);
    }

    pub(crate) fn set(&self, seconds: f64) {
        self.bits.store(seconds.to_bits(), Ordering::SeqCst);
    }
}

impl EngineClock for ManualClock {
    fn now(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::SeqCst))
    }
}

// --- Sink ---

struct HandleRecord {
    start_clock_time: f64,
    remaining_seconds: f64,
    offset_seconds: f64,
    stopped: bool,
    finished: bool,
    on_ended: Option<CompletionCallback>,
}

#[derive(Default)]
struct SinkLog {
    records: Vec<HandleRecord>,
    stops: usize,
    fail_next_start: bool,
}

/// Output sink that renders nothing and records every start and stop.
#[derive(Clone)]
pub(crate) struct RecordingSink {
    log: Arc<Mutex<SinkLog>>,
    clock: ManualClock,
}

impl RecordingSink {
    pub(crate) fn new() -> Self {
        Self::with_clock(ManualClock::new())
    }

    pub(crate) fn with_clock(clock: ManualClock) -> Self {
        RecordingSink {
            log: Arc::new(Mutex::new(SinkLog::default())),
            clock,
        }
    }

    pub(crate) fn starts(&self) -> usize {
        self.log.lock().unwrap().records.len()
    }

    pub(crate) fn stops(&self) -> usize {
        self.log.lock().unwrap().stops
    }

    pub(crate) fn live_handles(&self) -> usize {
        self.log
            .lock()
            .unwrap()
            .records
            .iter()
            .filter(|r| !r.stopped && !r.finished)
            .count()
    }

    pub(crate) fn last_offset(&self) -> Option<f64> {
        self.log
            .lock()
            .unwrap()
            .records
            .last()
            .map(|r| r.offset_seconds)
    }

    pub(crate) fn fail_next_start(&self) {
        self.log.lock().unwrap().fail_next_start = true;
    }

    /// Finishes every live handle whose remaining audio has played out by `now`.
    pub(crate) fn fire_due(&self, now: f64) {
        let callbacks: Vec<CompletionCallback> = {
            let mut log = self.log.lock().unwrap();
            log.records
                .iter_mut()
                .filter(|r| {
                    !r.stopped
                        && !r.finished
                        && r.start_clock_time + r.remaining_seconds <= now + 1e-9
                })
                .filter_map(|r| {
                    r.finished = true;
                    r.on_ended.take()
                })
                .collect()
        };
        for callback in callbacks {
            callback();
        }
    }

    /// Fires every completion not yet fired, including for stopped handles,
    /// the way a late end-of-buffer event can race a stop.
    pub(crate) fn fire_all_pending(&self) {
        let callbacks: Vec<CompletionCallback> = {
            let mut log = self.log.lock().unwrap();
            log.records
                .iter_mut()
                .filter_map(|r| r.on_ended.take())
                .collect()
        };
        for callback in callbacks {
            callback();
        }
    }
}

struct RecordingHandle {
    log: Arc<Mutex<SinkLog>>,
    index: usize,
}

impl RenderHandle for RecordingHandle {
    fn stop(&mut self) -> Result<(), PlaybackError> {
        let mut log = self.log.lock().unwrap();
        let record = &mut log.records[self.index];
        if record.stopped || record.finished {
            return Err(PlaybackError::HandleAlreadyStopped);
        }
        record.stopped = true;
        log.stops += 1;
        Ok(())
    }
}

impl OutputSink for RecordingSink {
    fn start(&self, request: RenderRequest<'_>) -> Result<Box<dyn RenderHandle>, PlaybackError> {
        let mut log = self.log.lock().unwrap();
        if std::mem::take(&mut log.fail_next_start) {
            return Err(PlaybackError::OutputInitError("no device".to_string()));
        }
        let remaining_seconds =
            (request.track.duration_seconds() - request.offset_seconds).max(0.0);
        log.records.push(HandleRecord {
            start_clock_time: self.clock.now(),
            remaining_seconds,
            offset_seconds: request.offset_seconds,
            stopped: false,
            finished: false,
            on_ended: Some(request.on_ended),
        });
        Ok(Box::new(RecordingHandle {
            log: self.log.clone(),
            index: log.records.len() - 1,
        }))
    }
}

// --- Retriever ---

type Payload = Result<Vec<u8>, RetrievalError>;

/// Retriever whose responses are released by the test, one source at a time.
#[derive(Default)]
pub(crate) struct GatedRetriever {
    gates: Mutex<HashMap<String, oneshot::Receiver<Payload>>>,
}

impl GatedRetriever {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Registers `source`; the returned sender releases its response.
    pub(crate) fn gate(&self, source: &str) -> oneshot::Sender<Payload> {
        let (tx, rx) = oneshot::channel();
        self.gates.lock().unwrap().insert(source.to_string(), rx);
        tx
    }

    /// Registers `source` with an immediately available response.
    pub(crate) fn ready(&self, source: &str, payload: Payload) {
        let _ = self.gate(source).send(payload);
    }
}

#[async_trait]
impl AudioRetriever for GatedRetriever {
    async fn fetch(&self, source: &str) -> Result<Vec<u8>, RetrievalError> {
        let gate = self.gates.lock().unwrap().remove(source);
        match gate {
            Some(rx) => rx
                .await
                .unwrap_or_else(|_| {
                    Err(RetrievalError::ServerStatus {
                        status: 503,
                        reason: "gate dropped".to_string(),
                    })
                }),
            None => Err(RetrievalError::ServerStatus {
                status: 404,
                reason: format!("no gate for '{}'", source),
            }),
        }
    }
}
