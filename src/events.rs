//! Progress event types and the sink the pipeline reports through.
//!
//! A recommendation run emits any number of progress frames followed by
//! exactly one terminal frame. The sink either forwards frames into a
//! bounded channel (the SSE bridge) or discards them (the non-streaming
//! endpoint). Reported percentages are clamped so observers never see the
//! number go backwards.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc;

use crate::models::RecommendedPaper;

/// An intermediate progress frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressUpdate {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,
}

/// The single terminal frame ending a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TerminalUpdate {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub papers: Option<Vec<RecommendedPaper>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cached: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// One frame on the progress stream.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Progress(ProgressUpdate),
    Terminal(TerminalUpdate),
}

impl StreamEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::Terminal(_))
    }
}

/// How a recommendation run ended.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineOutcome {
    Success {
        papers: Vec<RecommendedPaper>,
        cached: bool,
        reference_count: usize,
    },
    /// Nothing to recommend from (empty library or empty selection).
    Empty { reason: String },
    Error { message: String },
}

impl PipelineOutcome {
    /// Wire form of this outcome for the progress stream.
    pub fn to_terminal(&self) -> TerminalUpdate {
        match self {
            PipelineOutcome::Success {
                papers,
                cached,
                reference_count,
            } => TerminalUpdate {
                success: true,
                total: Some(papers.len()),
                papers: Some(papers.clone()),
                cached: Some(*cached),
                reference_count: Some(*reference_count),
                error: None,
            },
            PipelineOutcome::Empty { reason } => TerminalUpdate {
                success: false,
                papers: None,
                total: None,
                cached: None,
                reference_count: None,
                error: Some(reason.clone()),
            },
            PipelineOutcome::Error { message } => TerminalUpdate {
                success: false,
                papers: None,
                total: None,
                cached: None,
                reference_count: None,
                error: Some(message.clone()),
            },
        }
    }
}

#[derive(Debug, Clone)]
enum SinkInner {
    Channel(mpsc::Sender<StreamEvent>),
    Discard,
}

/// Destination for a single run's progress frames.
#[derive(Debug, Clone)]
pub struct ProgressSink {
    inner: SinkInner,
    high_water: Arc<AtomicU8>,
}

impl ProgressSink {
    /// Sink backed by a bounded channel; the receiver feeds the SSE stream.
    pub fn channel(buffer: usize) -> (Self, mpsc::Receiver<StreamEvent>) {
        let (tx, rx) = mpsc::channel(buffer);
        (
            Self {
                inner: SinkInner::Channel(tx),
                high_water: Arc::new(AtomicU8::new(0)),
            },
            rx,
        )
    }

    /// Sink that drops every frame.
    pub fn discard() -> Self {
        Self {
            inner: SinkInner::Discard,
            high_water: Arc::new(AtomicU8::new(0)),
        }
    }

    /// Emit a progress frame. Percentages never go backwards: a value below
    /// the high-water mark is raised to it.
    pub async fn progress(&self, message: impl Into<String>, percent: Option<u8>) {
        let progress = percent.map(|p| {
            let p = p.min(100);
            let prev = self.high_water.fetch_max(p, Ordering::Relaxed);
            p.max(prev)
        });
        self.send(StreamEvent::Progress(ProgressUpdate {
            message: message.into(),
            progress,
        }))
        .await;
    }

    /// Emit the terminal frame.
    pub async fn terminal(&self, update: TerminalUpdate) {
        self.send(StreamEvent::Terminal(update)).await;
    }

    async fn send(&self, event: StreamEvent) {
        match &self.inner {
            SinkInner::Channel(tx) => {
                // A closed channel means the client went away; the
                // cancellation token stops the run, so just drop the frame.
                if tx.send(event).await.is_err() {
                    tracing::debug!("progress receiver dropped, frame discarded");
                }
            }
            SinkInner::Discard => {}
        }
    }
}
