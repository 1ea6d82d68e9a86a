//! Tag-correlated "move to targets" execution.
//!
//! Targets are split into frames of [`TARGETS_PER_FRAME`]. Frames are
//! dealt alternately into two slots; each slot runs its frames one after
//! another, waiting for the cube's tagged response before writing the
//! next, while both slots progress concurrently. Only the very first
//! frame may overwrite what the motors are doing, every later one is
//! queued behind it.
//!
//! Each slot runs as its own task. A rejection stops the rejected slot
//! and fails the operation right away; the other slot keeps going.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use futures::future::{select, Either};
use log::{debug, trace};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::errors::{CubeError, ResponseReason, Result};
use crate::lock;
use crate::protocol::motor::{MotorSpec, MoveToOptions, MoveToResponse, MoveToTarget, TARGETS_PER_FRAME};
use crate::tag::TagAllocator;
use crate::transport::GattCharacteristic;
use crate::version::Capabilities;

struct Matcher {
    registration: u64,
    tx: oneshot::Sender<ResponseReason>,
}

#[derive(Default)]
pub struct MoveToPipeline {
    tags: Mutex<TagAllocator>,
    pending: Mutex<HashMap<u8, Matcher>>,
    registrations: AtomicU64,
}

/// Removes a matcher when the waiting future goes away, unless a newer
/// registration already took its tag.
struct MatcherGuard<'a> {
    pipeline: &'a MoveToPipeline,
    tag: u8,
    registration: u64,
}

impl Drop for MatcherGuard<'_> {
    fn drop(&mut self) {
        let mut pending = lock(&self.pipeline.pending);
        if pending
            .get(&self.tag)
            .is_some_and(|m| m.registration == self.registration)
        {
            pending.remove(&self.tag);
        }
    }
}

type Chunk = (usize, Vec<MoveToTarget>);

/// A spawned slot. Aborted when dropped unless detached.
struct SlotTask {
    handle: Option<JoinHandle<Result<()>>>,
}

impl SlotTask {
    fn spawn(
        pipeline: &Arc<MoveToPipeline>,
        motor: &Arc<dyn GattCharacteristic>,
        chunks: Vec<Chunk>,
        options: MoveToOptions,
    ) -> Self {
        if chunks.is_empty() {
            return Self { handle: None };
        }
        let pipeline = Arc::clone(pipeline);
        let motor = Arc::clone(motor);
        let handle = tokio::spawn(async move {
            pipeline.run_slot(motor.as_ref(), chunks, &options).await
        });
        Self {
            handle: Some(handle),
        }
    }

    /// Let the slot finish on its own.
    fn detach(&mut self) {
        self.handle.take();
    }
}

impl Future for SlotTask {
    type Output = Result<()>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<()>> {
        let Some(handle) = self.handle.as_mut() else {
            return Poll::Ready(Ok(()));
        };
        let joined = match Pin::new(handle).poll(cx) {
            Poll::Ready(joined) => joined,
            Poll::Pending => return Poll::Pending,
        };
        self.handle = None;
        match joined {
            Ok(result) => Poll::Ready(result),
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(_) => Poll::Ready(Err(CubeError::Disconnected)),
        }
    }
}

impl Drop for SlotTask {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

impl MoveToPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tag of the most recently written frame.
    pub fn current_tag(&self) -> u8 {
        lock(&self.tags).current()
    }

    /// Number of frames still waiting for a response.
    pub fn pending_count(&self) -> usize {
        lock(&self.pending).len()
    }

    /// Resolves once every frame was acknowledged with a success reason,
    /// fails with the first rejection. Firmware without move-to support
    /// makes this a no-op.
    ///
    /// Dropping the returned future stops both slots.
    pub async fn run(
        self: &Arc<Self>,
        motor: Arc<dyn GattCharacteristic>,
        capabilities: &Capabilities,
        targets: &[MoveToTarget],
        options: &MoveToOptions,
    ) -> Result<()> {
        if !capabilities.move_to {
            debug!("move-to not supported by this firmware, ignoring {} targets", targets.len());
            return Ok(());
        }

        let mut slots: [Vec<Chunk>; 2] = [Vec::new(), Vec::new()];
        for (index, chunk) in targets.chunks(TARGETS_PER_FRAME).enumerate() {
            slots[index % 2].push((index, chunk.to_vec()));
        }
        let [even, odd] = slots;

        let mut even = SlotTask::spawn(self, &motor, even, *options);
        let mut odd = SlotTask::spawn(self, &motor, odd, *options);

        let first = match select(&mut even, &mut odd).await {
            Either::Left((result, _)) | Either::Right((result, _)) => result,
        };
        if let Err(e) = first {
            even.detach();
            odd.detach();
            return Err(e);
        }
        even.await?;
        odd.await?;
        Ok(())
    }

    async fn run_slot(
        &self,
        motor: &dyn GattCharacteristic,
        chunks: Vec<Chunk>,
        options: &MoveToOptions,
    ) -> Result<()> {
        for (index, chunk) in chunks {
            let options = if index == 0 {
                *options
            } else {
                MoveToOptions {
                    overwrite: false,
                    ..*options
                }
            };
            let tag = lock(&self.tags).next();
            let encoded = MotorSpec::encode_move_to(tag, &chunk, &options);

            let (rx, _guard) = self.register(tag);
            debug!("move-to tag={} targets={}", tag, chunk.len());
            motor.write(encoded.frame, false).await?;

            let reason = rx.await.map_err(|_| CubeError::Disconnected)?;
            if !reason.is_success() {
                debug!("move-to tag={} rejected: {:?}", tag, reason);
                return Err(CubeError::Rejected(reason));
            }
        }
        Ok(())
    }

    fn register(&self, tag: u8) -> (oneshot::Receiver<ResponseReason>, MatcherGuard<'_>) {
        let (tx, rx) = oneshot::channel();
        let registration = self.registrations.fetch_add(1, Ordering::Relaxed);
        lock(&self.pending).insert(tag, Matcher { registration, tx });
        (
            rx,
            MatcherGuard {
                pipeline: self,
                tag,
                registration,
            },
        )
    }

    /// Route a response frame to the frame waiting on its tag.
    pub fn on_response(&self, response: MoveToResponse) {
        let matcher = lock(&self.pending).remove(&response.tag);
        match matcher {
            Some(matcher) => {
                let _ = matcher.tx.send(response.reason);
            }
            None => trace!("move-to response for unknown tag {}", response.tag),
        }
    }

    /// Fail every pending frame with [`CubeError::Disconnected`].
    pub fn cancel_all(&self) {
        lock(&self.pending).clear();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::protocol::MOTOR_CHARACTERISTIC_UUID;
    use crate::transport::memory::MemoryCharacteristic;
    use crate::transport::CharacteristicProperties;

    fn motor() -> Arc<MemoryCharacteristic> {
        MemoryCharacteristic::new(
            MOTOR_CHARACTERISTIC_UUID,
            CharacteristicProperties::new(false, true, true, true),
        )
    }

    fn targets(n: usize) -> Vec<MoveToTarget> {
        (0..n).map(|i| MoveToTarget::new(i as u16, i as u16)).collect()
    }

    fn spawn_run(
        pipeline: &Arc<MoveToPipeline>,
        motor: &Arc<MemoryCharacteristic>,
        n: usize,
    ) -> JoinHandle<Result<()>> {
        let pipeline = Arc::clone(pipeline);
        let motor = Arc::clone(motor);
        tokio::spawn(async move {
            pipeline
                .run(motor, &Capabilities::ALL, &targets(n), &MoveToOptions::default())
                .await
        })
    }

    fn respond(pipeline: &MoveToPipeline, tag: u8, reason: ResponseReason) {
        pipeline.on_response(MoveToResponse { tag, reason });
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    fn first_x(frame: &[u8]) -> u16 {
        u16::from_le_bytes([frame[8], frame[9]])
    }

    #[tokio::test]
    async fn gated_off_writes_nothing() {
        let pipeline = Arc::new(MoveToPipeline::new());
        let motor = motor();
        let caps = Capabilities {
            move_to: false,
            ..Capabilities::ALL
        };
        pipeline
            .run(motor.clone(), &caps, &targets(3), &MoveToOptions::default())
            .await
            .unwrap();
        assert!(motor.writes().is_empty());
    }

    #[tokio::test]
    async fn empty_target_list_resolves_without_writing() {
        let pipeline = Arc::new(MoveToPipeline::new());
        let motor = motor();
        pipeline
            .run(motor.clone(), &Capabilities::ALL, &[], &MoveToOptions::default())
            .await
            .unwrap();
        assert!(motor.writes().is_empty());
    }

    #[tokio::test]
    async fn resolves_on_success_responses() {
        let pipeline = Arc::new(MoveToPipeline::new());
        let motor = motor();
        let run = spawn_run(&pipeline, &motor, 2);

        let frames = motor.wait_for_writes(1).await;
        assert_eq!(frames[0][1], 1);
        assert_eq!(pipeline.pending_count(), 1);
        respond(&pipeline, 1, ResponseReason::OtherWriteAccepted);
        run.await.unwrap().unwrap();
        assert_eq!(pipeline.pending_count(), 0);
    }

    #[tokio::test]
    async fn rejection_carries_reason() {
        let pipeline = Arc::new(MoveToPipeline::new());
        let motor = motor();
        let run = spawn_run(&pipeline, &motor, 1);

        motor.wait_for_writes(1).await;
        // Unrelated tags are ignored.
        respond(&pipeline, 42, ResponseReason::Success);
        respond(&pipeline, 1, ResponseReason::IdMissed);
        let err = run.await.unwrap().unwrap_err();
        assert!(matches!(err, CubeError::Rejected(ResponseReason::IdMissed)));
    }

    #[tokio::test]
    async fn next_chunk_of_a_slot_waits_for_the_previous_one() {
        let pipeline = Arc::new(MoveToPipeline::new());
        let motor = motor();
        // Three chunks: 0 and 2 share a slot, 1 runs in the other.
        let run = spawn_run(&pipeline, &motor, 60);

        let frames = motor.wait_for_writes(2).await;
        settle().await;
        assert_eq!(motor.writes().len(), 2);
        let first = frames.iter().find(|f| f[7] == 0x00).unwrap();
        let second = frames.iter().find(|f| f[7] == 0x01).unwrap();
        assert_eq!(first_x(first), 0);
        assert_eq!(first_x(second), 29);

        respond(&pipeline, second[1], ResponseReason::Success);
        settle().await;
        assert_eq!(motor.writes().len(), 2);

        respond(&pipeline, first[1], ResponseReason::Success);
        let frames = motor.wait_for_writes(3).await;
        let third = &frames[2];
        assert_eq!(third[1], 3);
        assert_eq!(third[7], 0x01);
        assert_eq!(first_x(third), 58);

        respond(&pipeline, 3, ResponseReason::Success);
        run.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn rejection_stops_only_its_own_slot() {
        let pipeline = Arc::new(MoveToPipeline::new());
        let motor = motor();
        // Four chunks: 0 and 2 in one slot, 1 and 3 in the other.
        let run = spawn_run(&pipeline, &motor, 116);

        let frames = motor.wait_for_writes(2).await;
        let chunk0 = frames.iter().find(|f| first_x(f) == 0).unwrap().clone();
        let chunk1 = frames.iter().find(|f| first_x(f) == 29).unwrap().clone();

        respond(&pipeline, chunk0[1], ResponseReason::InvalidState);
        let err = run.await.unwrap().unwrap_err();
        assert!(matches!(err, CubeError::Rejected(ResponseReason::InvalidState)));

        respond(&pipeline, chunk1[1], ResponseReason::Success);
        let frames = motor.wait_for_writes(3).await;
        assert_eq!(first_x(&frames[2]), 87);

        respond(&pipeline, frames[2][1], ResponseReason::Success);
        settle().await;
        let written = motor.written_frames();
        assert_eq!(written.len(), 3);
        assert!(written.iter().all(|f| first_x(f) != 58));
        assert_eq!(pipeline.pending_count(), 0);
    }

    #[tokio::test]
    async fn cancel_all_reports_disconnect() {
        let pipeline = Arc::new(MoveToPipeline::new());
        let motor = motor();
        let run = spawn_run(&pipeline, &motor, 1);

        motor.wait_for_writes(1).await;
        pipeline.cancel_all();
        assert!(matches!(
            run.await.unwrap(),
            Err(CubeError::Disconnected)
        ));
    }

    #[tokio::test]
    async fn dropping_the_future_removes_its_matcher() {
        let pipeline = Arc::new(MoveToPipeline::new());
        let motor = motor();
        let chunk = targets(1);
        let options = MoveToOptions::default();

        let run = pipeline.run(motor.clone(), &Capabilities::ALL, &chunk, &options);
        let _ = tokio::time::timeout(Duration::from_millis(10), run).await;
        settle().await;

        assert_eq!(motor.writes().len(), 1);
        assert_eq!(pipeline.pending_count(), 0);
    }

    #[tokio::test]
    async fn failed_write_leaves_no_matcher() {
        let pipeline = Arc::new(MoveToPipeline::new());
        let motor = motor();
        motor.set_fail_writes(true);
        let err = pipeline
            .run(motor.clone(), &Capabilities::ALL, &targets(1), &MoveToOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, CubeError::Write(_)));
        assert_eq!(pipeline.pending_count(), 0);
    }
}
