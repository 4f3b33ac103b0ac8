//! Worker pool that projects chunks off the render thread.

use crate::projector::{project_chunk, HeightMap, ProjectionOptions};
use crossbeam_channel::{Receiver, Sender, TrySendError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use voxmap_common::types::{ChunkCoordinate, ChunkRaw, Result};
use voxmap_common::VoxmapError;

/// A chunk waiting to be projected.
pub struct ProjectionJob {
    pub coord: ChunkCoordinate,
    pub chunk: ChunkRaw,
}

/// A projected chunk, tagged with where it belongs.
pub struct ProjectionResult {
    pub coord: ChunkCoordinate,
    /// Submission order across the whole pipeline. A higher value is a newer
    /// update of the same chunk.
    pub seq: u64,
    pub height_map: HeightMap,
}

type StampedJob = (u64, ProjectionJob);

/// Cloneable handle for feeding jobs from other threads.
#[derive(Clone)]
pub struct ProjectionSubmitter {
    jobs: Sender<StampedJob>,
    next_seq: Arc<AtomicU64>,
}

impl ProjectionSubmitter {
    /// Queues a job, blocking while the queue is full.
    pub fn submit(&self, job: ProjectionJob) -> Result<()> {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        self.jobs.send((seq, job)).map_err(|_| VoxmapError::PipelineClosed)
    }
}

/// Fixed set of projection threads fed by a bounded job queue.
///
/// Results arrive in completion order, which is not submission order when more
/// than one worker runs; `ProjectionResult::seq` restores it. `drain_results`
/// never blocks.
pub struct ProjectionPipeline {
    jobs: Option<Sender<StampedJob>>,
    next_seq: Arc<AtomicU64>,
    results: Receiver<ProjectionResult>,
    workers: Vec<JoinHandle<()>>,
}

impl ProjectionPipeline {
    pub fn new(worker_count: usize, queue_capacity: usize, options: ProjectionOptions) -> Self {
        let (job_tx, job_rx) = crossbeam_channel::bounded::<StampedJob>(queue_capacity.max(1));
        let (result_tx, result_rx) = crossbeam_channel::unbounded();

        let workers = (0..worker_count.max(1))
            .map(|_| {
                let jobs = job_rx.clone();
                let results = result_tx.clone();
                std::thread::spawn(move || {
                    while let Ok((seq, job)) = jobs.recv() {
                        let height_map = project_chunk(&job.chunk, options);
                        let result = ProjectionResult {
                            coord: job.coord,
                            seq,
                            height_map,
                        };
                        if results.send(result).is_err() {
                            break;
                        }
                    }
                })
            })
            .collect();

        Self {
            jobs: Some(job_tx),
            next_seq: Arc::new(AtomicU64::new(0)),
            results: result_rx,
            workers,
        }
    }

    /// Queues a job without waiting. Fails with `QueueFull` when the queue is at
    /// capacity.
    pub fn try_submit(&self, job: ProjectionJob) -> Result<()> {
        let jobs = self.jobs.as_ref().ok_or(VoxmapError::PipelineClosed)?;
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        jobs.try_send((seq, job)).map_err(|e| match e {
            TrySendError::Full(_) => VoxmapError::QueueFull,
            TrySendError::Disconnected(_) => VoxmapError::PipelineClosed,
        })
    }

    pub fn submitter(&self) -> Result<ProjectionSubmitter> {
        let jobs = self.jobs.clone().ok_or(VoxmapError::PipelineClosed)?;
        Ok(ProjectionSubmitter {
            jobs,
            next_seq: self.next_seq.clone(),
        })
    }

    /// Every finished result so far. Called once per frame.
    pub fn drain_results(&self) -> Vec<ProjectionResult> {
        self.results.try_iter().collect()
    }

    /// Closes the queue and joins the workers once they finish what is queued.
    /// Outstanding submitters must be dropped first or this waits for them.
    pub fn shutdown(&mut self) {
        self.jobs.take();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

impl Drop for ProjectionPipeline {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::projector::ColumnProjection;
    use assert_matches::assert_matches;
    use std::time::{Duration, Instant};
    use voxmap_common::types::ChunkRawBuilder;

    fn job(x: i32, z: i32) -> ProjectionJob {
        let mut builder = ChunkRawBuilder::new();
        builder.set(0, 10, 0, 0x808080);
        ProjectionJob {
            coord: ChunkCoordinate::new(x, z),
            chunk: builder.build(),
        }
    }

    fn collect(pipeline: &ProjectionPipeline, count: usize) -> Vec<ProjectionResult> {
        let start = Instant::now();
        let mut results = Vec::new();
        while results.len() < count {
            results.extend(pipeline.drain_results());
            assert!(start.elapsed() < Duration::from_secs(5), "projection timed out");
            std::thread::sleep(Duration::from_millis(1));
        }
        results
    }

    #[test]
    fn test_jobs_are_projected() {
        let pipeline = ProjectionPipeline::new(2, 8, ProjectionOptions::default());
        for x in 0..4 {
            pipeline.try_submit(job(x, 1)).unwrap();
        }

        let results = collect(&pipeline, 4);
        let mut xs: Vec<i32> = results.iter().map(|r| r.coord.x).collect();
        xs.sort();
        assert_eq!(xs, vec![0, 1, 2, 3]);
        assert!(results.iter().all(|r| r.height_map.column(0, 0)
            == ColumnProjection::Surface {
                color: [0x80, 0x80, 0x80],
                y: 10
            }));
    }

    #[test]
    fn test_results_carry_submission_order() {
        let pipeline = ProjectionPipeline::new(3, 16, ProjectionOptions::default());
        let submitter = pipeline.submitter().unwrap();
        for x in 0..6 {
            if x % 2 == 0 {
                pipeline.try_submit(job(x, 0)).unwrap();
            } else {
                submitter.submit(job(x, 0)).unwrap();
            }
        }

        let mut results = collect(&pipeline, 6);
        results.sort_by_key(|r| r.seq);
        let xs: Vec<i32> = results.iter().map(|r| r.coord.x).collect();
        assert_eq!(xs, vec![0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_drain_results_does_not_block() {
        let pipeline = ProjectionPipeline::new(1, 4, ProjectionOptions::default());
        assert!(pipeline.drain_results().is_empty());
    }

    #[test]
    fn test_submitter_from_other_thread() {
        let pipeline = ProjectionPipeline::new(1, 1, ProjectionOptions::default());
        let submitter = pipeline.submitter().unwrap();

        let feeder = std::thread::spawn(move || {
            for z in 0..5 {
                submitter.submit(job(0, z)).unwrap();
            }
        });

        let results = collect(&pipeline, 5);
        feeder.join().unwrap();
        assert_eq!(results.len(), 5);
    }

    #[test]
    fn test_submit_after_shutdown() {
        let mut pipeline = ProjectionPipeline::new(1, 1, ProjectionOptions::default());
        pipeline.shutdown();
        assert_matches!(pipeline.try_submit(job(0, 0)), Err(VoxmapError::PipelineClosed));
        assert!(pipeline.submitter().is_err());
    }

    #[test]
    fn test_queue_full() {
        let pipeline = ProjectionPipeline::new(1, 1, ProjectionOptions::default());
        let chunk = job(0, 0).chunk;

        // Enqueueing is far cheaper than projecting, so the single slot fills up
        let outcome = (0..10_000)
            .map(|x| {
                pipeline.try_submit(ProjectionJob {
                    coord: ChunkCoordinate::new(x, 0),
                    chunk: chunk.clone(),
                })
            })
            .find(|result| result.is_err());
        assert_matches!(outcome, Some(Err(VoxmapError::QueueFull)));
    }
}
