use super::*;

use crate::argument_buffer::ReadableArguments;
use crate::binding::{FrameUniforms, FRAME_GROUP, INSTANCE_GROUP, SELECTOR_GROUP};
use crate::pipeline::{NORMAL_SLOT, POSITION_SLOT};

/// Everything a recorded [`PassCommand`] may refer to.
struct PassResources<'r> {
    pipeline: &'r wgpu::RenderPipeline,
    frame_bind_group: &'r wgpu::BindGroup,
    instance_bind_groups: &'r [wgpu::BindGroup],
    selector_bind_group: Option<&'r wgpu::BindGroup>,
    vertex_buffers: &'r [&'r wgpu::Buffer],
    index_buffers: &'r [&'r wgpu::Buffer],
    arguments: &'r wgpu::Buffer,
}

impl IndirectDrawOrchestrator {
    fn narrates_this_frame(&self) -> bool {
        self.config.diagnostics.narrates(self.frames_rendered)
    }

    fn report(&mut self, notice: Notice, message: &'static str) {
        let first = self.notices.first(notice);
        if self.config.diagnostics.narrates_notice(first) {
            tracing::debug!(label = %self.config.label, ?notice, "{message}");
        } else {
            tracing::trace!(label = %self.config.label, ?notice, "{message}");
        }
    }

    /// Records this frame's indirect draws into `pass`.
    ///
    /// Returns without recording anything when the device cannot execute indirect draws, or
    /// when the argument buffer is externally owned and `inputs` carries none. Classes with
    /// an invalid surface reference are skipped; the others still draw.
    ///
    /// The frame transform and owned argument records are uploaded with `queue.write_buffer`,
    /// which takes effect before the submission executes. Call `render` at most once per
    /// orchestrator per submission; orchestrators sharing a [`BindingLayout`] may each record
    /// into the same submission.
    pub fn render(&mut self, pass: &mut wgpu::RenderPass<'_>, inputs: &FrameInputs<'_>) {
        if !self.gpu.supports_indirect() {
            self.report(
                Notice::IndirectUnsupported,
                "indirect execution unsupported, skipping frame",
            );
            return;
        }

        match (&self.arguments, inputs.argument_buffer) {
            (ArgumentStore::External(_), None) => {
                self.report(
                    Notice::MissingArgumentBuffer,
                    "no argument buffer supplied, skipping frame",
                );
                return;
            }
            (ArgumentStore::Owned(_), Some(_)) => {
                self.report(
                    Notice::IgnoredArgumentOverride,
                    "ignoring argument buffer override for owned arguments",
                );
            }
            _ => {}
        }

        let narrate = self.narrates_this_frame();

        let plan = plan_frame(
            self.layout.instance_layout(),
            inputs.surfaces,
            inputs.surface_indices,
            inputs.vertex_buffers.len(),
            inputs.index_buffers.len(),
        );
        for (class, reason) in &plan.skipped {
            if narrate {
                tracing::debug!(class = class.label(), ?reason, "geometry class skipped");
            } else {
                tracing::trace!(class = class.label(), ?reason, "geometry class skipped");
            }
        }

        let commands = pass_commands(&plan, self.layout.strategy(), self.layout.selector_stride());
        let mut stats = FrameStats::from_commands(&commands);
        stats.classes_skipped = plan.skipped.len() as u32;

        self.frame.write(
            &self.gpu.queue,
            &FrameUniforms {
                view_projection: inputs.frame_transform,
            },
        );

        // All records go out before the first submission of the frame.
        let (arguments, protocol) = match &mut self.arguments {
            ArgumentStore::Owned(owned) => {
                stats.argument_bytes_written = owned.stage(&self.gpu.queue, &plan.records);
                owned.parts_mut()
            }
            ArgumentStore::External(protocol) => match inputs.argument_buffer {
                Some(buffer) => {
                    // The producer rewrites external arguments every frame.
                    protocol.record_write();
                    (buffer, protocol)
                }
                None => return,
            },
        };

        let override_groups = match inputs.instance_buffers {
            Some(buffers) if buffers.len() == self.layout.strategy().instance_slot_count() => {
                Some(self.layout.create_instance_bind_groups(&self.gpu.device, buffers))
            }
            Some(buffers) => {
                tracing::warn!(
                    supplied = buffers.len(),
                    expected = self.layout.strategy().instance_slot_count(),
                    "ignoring instance buffer override with the wrong number of buffers"
                );
                None
            }
            None => None,
        };

        if !commands.is_empty() {
            let transition = protocol.acquire_readable();
            if transition.recorded {
                stats.transitions += 1;
            }

            let resources = PassResources {
                pipeline: &self.pipeline,
                frame_bind_group: self.frame.bind_group(),
                instance_bind_groups: override_groups
                    .as_deref()
                    .unwrap_or_else(|| self.layout.instance_bind_groups()),
                selector_bind_group: self.layout.selector_bind_group(),
                vertex_buffers: inputs.vertex_buffers,
                index_buffers: inputs.index_buffers,
                arguments,
            };
            record_commands(pass, &commands, &resources, protocol, &transition.readable);
        }

        if narrate {
            tracing::debug!(
                label = %self.config.label,
                draws = stats.draws_submitted,
                skipped = stats.classes_skipped,
                transitions = stats.transitions,
                bind_group_sets = stats.bind_group_sets,
                argument_bytes = stats.argument_bytes_written,
                "indirect frame recorded"
            );
        }

        self.frames_rendered += 1;
        self.last_frame = stats;
        self.lifetime.accumulate(&stats);
        self.last_skipped = plan.skipped;
    }
}

fn record_commands(
    pass: &mut wgpu::RenderPass<'_>,
    commands: &[PassCommand],
    resources: &PassResources<'_>,
    protocol: &mut ArgumentProtocol,
    readable: &ReadableArguments,
) {
    for command in commands {
        match *command {
            PassCommand::SetPipeline => pass.set_pipeline(resources.pipeline),
            PassCommand::BindFrame => {
                pass.set_bind_group(FRAME_GROUP, resources.frame_bind_group, &[]);
            }
            PassCommand::BindInstances { index } => {
                if let Some(bind_group) = resources.instance_bind_groups.get(index) {
                    pass.set_bind_group(INSTANCE_GROUP, bind_group, &[]);
                }
            }
            PassCommand::BindSelector { dynamic_offset } => {
                if let Some(bind_group) = resources.selector_bind_group {
                    pass.set_bind_group(SELECTOR_GROUP, bind_group, &[dynamic_offset]);
                }
            }
            PassCommand::SetVertexBuffers {
                position_slot,
                normal_slot,
            } => {
                let position = resources.vertex_buffers[position_slot as usize];
                let normal = resources.vertex_buffers[normal_slot as usize];
                pass.set_vertex_buffer(POSITION_SLOT, position.slice(..));
                pass.set_vertex_buffer(NORMAL_SLOT, normal.slice(..));
            }
            PassCommand::SetIndexBuffer { slot, format } => {
                pass.set_index_buffer(resources.index_buffers[slot as usize].slice(..), format);
            }
            PassCommand::DrawIndexedIndirect { class, offset } => {
                pass.draw_indexed_indirect(resources.arguments, offset);
                protocol.record_submission(readable);
                tracing::trace!(class = class.label(), offset, "indirect draw submitted");
            }
        }
    }
}
