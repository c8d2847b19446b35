use super::planning::PassCommand;

/// Work recorded by one `render` call, or accumulated over an orchestrator's lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// Indirect draws recorded.
    pub draws_submitted: u32,
    /// Geometry classes left out because their surface reference was invalid.
    pub classes_skipped: u32,
    /// Writable → indirect-readable transitions of the argument buffer.
    pub transitions: u32,
    /// `set_bind_group` calls, dynamic-offset rebinds included.
    pub bind_group_sets: u32,
    pub argument_bytes_written: u64,
}

impl FrameStats {
    pub(super) fn from_commands(commands: &[PassCommand]) -> Self {
        let mut stats = Self::default();
        for command in commands {
            if command.is_bind() {
                stats.bind_group_sets += 1;
            }
            if matches!(command, PassCommand::DrawIndexedIndirect { .. }) {
                stats.draws_submitted += 1;
            }
        }
        stats
    }

    /// Merge another frame's counts into this accumulator.
    pub fn accumulate(&mut self, other: &Self) {
        self.draws_submitted += other.draws_submitted;
        self.classes_skipped += other.classes_skipped;
        self.transitions += other.transitions;
        self.bind_group_sets += other.bind_group_sets;
        self.argument_bytes_written += other.argument_bytes_written;
    }
}
