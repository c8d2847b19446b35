//! Argument buffer ownership and the write → transition → readable protocol.
//!
//! wgpu infers barriers from buffer usage, so the GPU-side transition from `COPY_DST` /
//! `STORAGE` writes to `INDIRECT` reads happens when the submission is built. The
//! [`ArgumentProtocol`] tracks the same transition on the CPU side: indirect submissions
//! need a [`ReadableArguments`] token, and that token is only handed out by
//! [`ArgumentProtocol::acquire_readable`].

use std::ops::Range;

use wgpu::util::DeviceExt;

use crate::draw_args::{IndexedDrawRecord, ARGUMENT_BUFFER_SIZE, GEOMETRY_CLASS_COUNT};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgumentState {
    /// Contents were written (by the CPU or the producer stage) and not yet made readable.
    Writable,
    /// Contents may be consumed by indirect draws.
    IndirectReadable,
}

/// Who writes the argument buffer and therefore how often it must be re-transitioned.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ArgumentOwnership {
    /// The orchestrator allocates the buffer and authors the records on the CPU. Records are
    /// only rewritten when they change, so the buffer is transitioned once per change.
    #[default]
    Owned,
    /// A frame-level owner supplies the buffer on every `render` call and its producer
    /// rewrites it every frame, so it is transitioned every frame.
    External,
}

/// Proof that the argument buffer was transitioned to the indirect-readable state.
#[derive(Debug)]
pub struct ReadableArguments {
    _private: (),
}

/// Result of [`ArgumentProtocol::acquire_readable`].
#[derive(Debug)]
pub struct Transition {
    pub readable: ReadableArguments,
    /// `true` when a writable → readable transition was recorded by this call.
    pub recorded: bool,
}

#[derive(Debug)]
pub struct ArgumentProtocol {
    state: ArgumentState,
    transitions: u64,
    submissions_since_transition: u64,
}

impl Default for ArgumentProtocol {
    fn default() -> Self {
        Self::new()
    }
}

impl ArgumentProtocol {
    pub fn new() -> Self {
        Self {
            state: ArgumentState::Writable,
            transitions: 0,
            submissions_since_transition: 0,
        }
    }

    pub fn state(&self) -> ArgumentState {
        self.state
    }

    /// Total writable → readable transitions recorded over the buffer's lifetime.
    pub fn transitions(&self) -> u64 {
        self.transitions
    }

    pub fn submissions_since_transition(&self) -> u64 {
        self.submissions_since_transition
    }

    /// Marks the contents as pending: the next read has to be preceded by a transition.
    pub fn record_write(&mut self) {
        self.state = ArgumentState::Writable;
        self.submissions_since_transition = 0;
    }

    pub fn acquire_readable(&mut self) -> Transition {
        let recorded = self.state == ArgumentState::Writable;
        if recorded {
            self.state = ArgumentState::IndirectReadable;
            self.transitions += 1;
            self.submissions_since_transition = 0;
            tracing::trace!(
                transitions = self.transitions,
                "argument buffer transitioned to indirect-readable"
            );
        }

        Transition {
            readable: ReadableArguments { _private: () },
            recorded,
        }
    }

    pub fn record_submission(&mut self, _readable: &ReadableArguments) {
        self.submissions_since_transition += 1;
    }
}

/// Records staged for one frame, indexed by geometry class. `None` leaves a record untouched.
pub type StagedRecords = [Option<IndexedDrawRecord>; GEOMETRY_CLASS_COUNT];

/// Applies staged records to the CPU mirror of the buffer.
///
/// Returns the class range to upload when anything changed. The range covers every staged
/// record so the whole frame goes out in a single write.
pub(crate) fn apply_staged_records(
    shadow: &mut [IndexedDrawRecord; GEOMETRY_CLASS_COUNT],
    staged: &StagedRecords,
) -> Option<Range<usize>> {
    let first = staged.iter().position(Option::is_some)?;
    let last = staged.iter().rposition(Option::is_some)?;

    let mut changed = false;
    for (slot, record) in shadow.iter_mut().zip(staged.iter()) {
        if let Some(record) = record {
            if slot != record {
                *slot = *record;
                changed = true;
            }
        }
    }

    changed.then_some(first..last + 1)
}

/// Argument buffer allocated and authored by the orchestrator.
pub struct ArgumentBuffer {
    buffer: wgpu::Buffer,
    shadow: [IndexedDrawRecord; GEOMETRY_CLASS_COUNT],
    protocol: ArgumentProtocol,
}

impl ArgumentBuffer {
    pub(crate) fn new(device: &wgpu::Device) -> Self {
        let shadow = [IndexedDrawRecord::default(); GEOMETRY_CLASS_COUNT];
        let buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Ivy_IndirectArgs"),
            contents: bytemuck::cast_slice(&shadow),
            usage: wgpu::BufferUsages::INDIRECT
                | wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::COPY_DST
                | wgpu::BufferUsages::COPY_SRC,
        });
        debug_assert_eq!(buffer.size(), ARGUMENT_BUFFER_SIZE);

        Self {
            buffer,
            shadow,
            protocol: ArgumentProtocol::new(),
        }
    }

    pub fn buffer(&self) -> &wgpu::Buffer {
        &self.buffer
    }

    /// CPU mirror of what was last uploaded.
    pub fn records(&self) -> &[IndexedDrawRecord; GEOMETRY_CLASS_COUNT] {
        &self.shadow
    }

    pub fn protocol(&self) -> &ArgumentProtocol {
        &self.protocol
    }

    pub(crate) fn parts_mut(&mut self) -> (&wgpu::Buffer, &mut ArgumentProtocol) {
        (&self.buffer, &mut self.protocol)
    }

    /// Uploads the staged records in one batched write. Returns the number of bytes written.
    pub(crate) fn stage(&mut self, queue: &wgpu::Queue, staged: &StagedRecords) -> u64 {
        let Some(classes) = apply_staged_records(&mut self.shadow, staged) else {
            return 0;
        };

        let offset = classes.start as wgpu::BufferAddress * IndexedDrawRecord::SIZE;
        let bytes: &[u8] = bytemuck::cast_slice(&self.shadow[classes]);
        queue.write_buffer(&self.buffer, offset, bytes);
        self.protocol.record_write();

        bytes.len() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_protocol_starts_writable() {
        let protocol = ArgumentProtocol::new();
        assert_eq!(protocol.state(), ArgumentState::Writable);
        assert_eq!(protocol.transitions(), 0);
    }

    #[test]
    fn transition_is_recorded_once_until_the_next_write() {
        let mut protocol = ArgumentProtocol::new();

        let first = protocol.acquire_readable();
        assert!(first.recorded);
        protocol.record_submission(&first.readable);

        let second = protocol.acquire_readable();
        assert!(!second.recorded);
        protocol.record_submission(&second.readable);

        assert_eq!(protocol.transitions(), 1);
        assert_eq!(protocol.submissions_since_transition(), 2);
        assert_eq!(protocol.state(), ArgumentState::IndirectReadable);
    }

    #[test]
    fn write_after_submission_requires_a_new_transition() {
        let mut protocol = ArgumentProtocol::new();
        let transition = protocol.acquire_readable();
        protocol.record_submission(&transition.readable);

        protocol.record_write();
        assert_eq!(protocol.state(), ArgumentState::Writable);
        assert_eq!(protocol.submissions_since_transition(), 0);

        assert!(protocol.acquire_readable().recorded);
        assert_eq!(protocol.transitions(), 2);
    }

    #[test]
    fn staging_nothing_writes_nothing() {
        let mut shadow = [IndexedDrawRecord::default(); GEOMETRY_CLASS_COUNT];
        assert_eq!(apply_staged_records(&mut shadow, &[None, None]), None);
    }

    #[test]
    fn staging_covers_every_valid_record_in_one_range() {
        let mut shadow = [IndexedDrawRecord::default(); GEOMETRY_CLASS_COUNT];
        let leaf = IndexedDrawRecord::new(36, 2, 0, 0, 0);
        let stem = IndexedDrawRecord::new(24, 2, 0, 0, 2);

        let range = apply_staged_records(&mut shadow, &[Some(leaf), Some(stem)]);
        assert_eq!(range, Some(0..2));
        assert_eq!(shadow, [leaf, stem]);
    }

    #[test]
    fn skipped_class_keeps_its_previous_record() {
        let leaf = IndexedDrawRecord::new(36, 2, 0, 0, 0);
        let stem = IndexedDrawRecord::new(24, 2, 0, 0, 2);
        let mut shadow = [leaf, stem];

        let new_stem = IndexedDrawRecord::new(30, 2, 0, 0, 2);
        let range = apply_staged_records(&mut shadow, &[None, Some(new_stem)]);

        assert_eq!(range, Some(1..2));
        assert_eq!(shadow, [leaf, new_stem]);
    }

    #[test]
    fn identical_records_are_not_rewritten() {
        let leaf = IndexedDrawRecord::new(36, 1, 0, 0, 0);
        let mut shadow = [leaf, IndexedDrawRecord::default()];

        assert_eq!(apply_staged_records(&mut shadow, &[Some(leaf), None]), None);
    }
}
