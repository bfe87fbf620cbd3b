//! Render loops: the endless streaming engine and the offline driver.

use crate::Result;
use crate::offline::OfflineBuffer;
use crate::sink::OutputSink;
use bytebeat_core::{BufferReport, ReloadWatcher, Sample, SampleRenderer};
use std::sync::atomic::{AtomicBool, Ordering};

/// Counters for a finished or running render.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Buffers rendered.
    pub buffers: u64,
    /// Samples rendered.
    pub samples: u64,
    /// Evaluations replaced with silence.
    pub faults: u64,
    /// Formulas swapped in by the watcher.
    pub reloads: u64,
}

impl RunSummary {
    fn record(&mut self, report: &BufferReport) {
        self.buffers += 1;
        self.samples += report.samples as u64;
        self.faults += report.faults as u64;
    }
}

/// Streaming loop: render a buffer, hand it to the sink, poll for reloads.
///
/// The buffer is allocated once and reused. A reload only ever affects the
/// buffer after the one just written.
#[derive(Debug)]
pub struct StreamEngine<S> {
    renderer: SampleRenderer,
    buffer: Vec<S>,
    summary: RunSummary,
}

impl<S: Sample> StreamEngine<S> {
    /// Creates an engine with a buffer sized from the renderer's config.
    pub fn new(renderer: SampleRenderer) -> Self {
        let buffer = vec![S::SILENCE; renderer.config().buffer_size];
        Self {
            renderer,
            buffer,
            summary: RunSummary::default(),
        }
    }

    /// The renderer.
    pub fn renderer(&self) -> &SampleRenderer {
        &self.renderer
    }

    /// Counters so far.
    pub fn summary(&self) -> RunSummary {
        self.summary
    }

    /// Unwraps the renderer.
    pub fn into_renderer(self) -> SampleRenderer {
        self.renderer
    }

    /// Renders and writes one buffer, then consults the watcher.
    pub fn step<W, K>(&mut self, watcher: &mut W, sink: &mut K) -> Result<BufferReport>
    where
        W: ReloadWatcher + ?Sized,
        K: OutputSink<S> + ?Sized,
    {
        let report = self.renderer.render(&mut self.buffer);
        sink.write(&self.buffer)?;
        self.summary.record(&report);

        if let Some(formula) = watcher.poll(report.samples) {
            self.renderer.swap_formula(formula);
            self.summary.reloads += 1;
        }
        Ok(report)
    }

    /// Runs until `running` is cleared or the consumer closes the pipe.
    ///
    /// A closed pipe ends the run normally; other write errors are returned.
    pub fn run<W, K>(
        &mut self,
        watcher: &mut W,
        sink: &mut K,
        running: &AtomicBool,
    ) -> Result<RunSummary>
    where
        W: ReloadWatcher + ?Sized,
        K: OutputSink<S> + ?Sized,
    {
        tracing::info!(
            sample_rate = self.renderer.config().sample_rate,
            buffer_size = self.buffer.len(),
            "streaming started"
        );
        while running.load(Ordering::SeqCst) {
            match self.step(watcher, sink) {
                Ok(_) => {}
                Err(e) if e.is_broken_pipe() => {
                    tracing::info!("output closed by consumer");
                    return Ok(self.summary);
                }
                Err(e) => return Err(e),
            }
        }
        match sink.flush() {
            Err(e) if !e.is_broken_pipe() => return Err(e),
            _ => {}
        }
        tracing::info!(
            buffers = self.summary.buffers,
            samples = self.summary.samples,
            reloads = self.summary.reloads,
            "streaming stopped"
        );
        Ok(self.summary)
    }
}

/// Renders `total_samples` into a preallocated [`OfflineBuffer`].
///
/// Rendering proceeds one configured buffer at a time; `progress` receives
/// the number of samples finished after each one.
pub fn render_offline<S: Sample>(
    renderer: &mut SampleRenderer,
    total_samples: usize,
    mut progress: impl FnMut(usize),
) -> (OfflineBuffer<S>, RunSummary) {
    let sample_rate = renderer.config().sample_rate;
    let block = renderer.config().buffer_size.max(1);
    let mut buffer = OfflineBuffer::silent(sample_rate, total_samples);
    let mut summary = RunSummary::default();

    let mut done = 0;
    for chunk in buffer.samples_mut().chunks_mut(block) {
        let report = renderer.render(chunk);
        summary.record(&report);
        done += chunk.len();
        progress(done);
    }

    tracing::info!(
        samples = summary.samples,
        faults = summary.faults,
        "offline render finished"
    );
    (buffer, summary)
}
