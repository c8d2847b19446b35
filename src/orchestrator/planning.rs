//! Pure frame planning: which classes draw, what their records hold and the exact command
//! sequence recorded into the pass. Nothing here touches the GPU.

use smallvec::SmallVec;

use crate::argument_buffer::StagedRecords;
use crate::binding::{BindingStrategy, ClassBinding};
use crate::draw_args::{GeometryClass, IndexedDrawRecord, GEOMETRY_CLASS_COUNT};
use crate::instance::InstanceLayout;
use crate::surface::{resolve_surface, SkipReason, SurfaceDescriptor, TableBounds, ValidSurface};

/// One indirect draw of one geometry class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubDraw {
    pub class: GeometryClass,
    pub surface: ValidSurface,
    pub argument_offset: wgpu::BufferAddress,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FramePlan {
    /// Record per valid class, `None` for skipped classes.
    pub records: StagedRecords,
    /// Valid classes in draw order.
    pub draws: SmallVec<[SubDraw; GEOMETRY_CLASS_COUNT]>,
    pub skipped: SmallVec<[(GeometryClass, SkipReason); GEOMETRY_CLASS_COUNT]>,
}

pub fn plan_frame(
    instance_layout: &InstanceLayout,
    surfaces: &[SurfaceDescriptor],
    surface_indices: [Option<usize>; GEOMETRY_CLASS_COUNT],
    vertex_buffers: usize,
    index_buffers: usize,
) -> FramePlan {
    let bounds = TableBounds {
        vertex_buffers,
        index_buffers,
        surfaces: surfaces.len(),
    };

    let mut plan = FramePlan::default();
    for class in GeometryClass::ALL {
        match resolve_surface(surface_indices[class.index()], surfaces, bounds) {
            Ok(surface) => {
                let range = instance_layout.range(class);
                plan.records[class.index()] = Some(IndexedDrawRecord::new(
                    surface.descriptor.index_count,
                    range.count,
                    0,
                    0,
                    range.start,
                ));
                plan.draws.push(SubDraw {
                    class,
                    surface,
                    argument_offset: class.argument_offset(),
                });
            }
            Err(reason) => plan.skipped.push((class, reason)),
        }
    }

    plan
}

/// A single command recorded into the render pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassCommand {
    SetPipeline,
    BindFrame,
    /// Sets the instance group to the layout's bind group at `index`.
    BindInstances { index: usize },
    BindSelector { dynamic_offset: u32 },
    SetVertexBuffers { position_slot: u32, normal_slot: u32 },
    SetIndexBuffer { slot: u32, format: wgpu::IndexFormat },
    DrawIndexedIndirect {
        class: GeometryClass,
        offset: wgpu::BufferAddress,
    },
}

impl PassCommand {
    pub fn is_bind(&self) -> bool {
        matches!(
            self,
            PassCommand::BindFrame
                | PassCommand::BindInstances { .. }
                | PassCommand::BindSelector { .. }
        )
    }
}

pub type PassCommands = SmallVec<[PassCommand; 16]>;

/// Orders the pass commands for `plan`.
///
/// Shared slots are set once. Per-class bindings are only re-set when their value changes.
/// A plan without draws records nothing.
pub fn pass_commands(
    plan: &FramePlan,
    strategy: BindingStrategy,
    selector_stride: u64,
) -> PassCommands {
    let mut commands = PassCommands::new();
    if plan.draws.is_empty() {
        return commands;
    }

    commands.push(PassCommand::SetPipeline);
    commands.push(PassCommand::BindFrame);

    let mut bound_instances = None;
    if strategy.binds_instances_once() {
        commands.push(PassCommand::BindInstances { index: 0 });
        bound_instances = Some(0);
    }

    let mut bound_selector = None;
    for draw in &plan.draws {
        let descriptor = draw.surface.descriptor;
        commands.push(PassCommand::SetVertexBuffers {
            position_slot: descriptor.position_slot,
            normal_slot: descriptor.normal_slot,
        });
        commands.push(PassCommand::SetIndexBuffer {
            slot: descriptor.index_slot,
            format: descriptor.index_format,
        });

        match strategy.class_binding(draw.class, selector_stride) {
            ClassBinding::Shared => {}
            ClassBinding::InstanceGroup(class) => {
                if bound_instances != Some(class.index()) {
                    commands.push(PassCommand::BindInstances {
                        index: class.index(),
                    });
                    bound_instances = Some(class.index());
                }
            }
            ClassBinding::Selector { dynamic_offset } => {
                if bound_selector != Some(dynamic_offset) {
                    commands.push(PassCommand::BindSelector { dynamic_offset });
                    bound_selector = Some(dynamic_offset);
                }
            }
        }

        commands.push(PassCommand::DrawIndexedIndirect {
            class: draw.class,
            offset: draw.argument_offset,
        });
    }

    commands
}

#[cfg(test)]
mod tests {
    use super::*;

    const STRIDE: u64 = 256;

    fn leaf_and_stem() -> Vec<SurfaceDescriptor> {
        vec![
            SurfaceDescriptor::new(0, 1, 0, 36),
            SurfaceDescriptor::new(2, 3, 1, 24),
        ]
    }

    fn plan(
        instances_per_class: u32,
        surfaces: &[SurfaceDescriptor],
        indices: [Option<usize>; 2],
    ) -> FramePlan {
        plan_frame(
            &InstanceLayout::contiguous(instances_per_class).unwrap(),
            surfaces,
            indices,
            4,
            2,
        )
    }

    fn draw_offsets(commands: &[PassCommand]) -> Vec<u64> {
        commands
            .iter()
            .filter_map(|command| match command {
                PassCommand::DrawIndexedIndirect { offset, .. } => Some(*offset),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn leaf_only_frame_draws_once_at_offset_zero() {
        let surfaces = [SurfaceDescriptor::new(0, 1, 0, 36)];
        let plan = plan(2, &surfaces, [Some(0), None]);

        assert_eq!(plan.draws.len(), 1);
        assert_eq!(plan.records[0], Some(IndexedDrawRecord::new(36, 2, 0, 0, 0)));
        assert_eq!(plan.records[1], None);
        assert_eq!(plan.skipped.as_slice(), &[(GeometryClass::Stem, SkipReason::NoSurface)]);

        let commands = pass_commands(&plan, BindingStrategy::ArraySelector, STRIDE);
        assert_eq!(draw_offsets(&commands), vec![0]);
    }

    #[test]
    fn out_of_range_position_slot_skips_the_class() {
        let surfaces = [SurfaceDescriptor::new(9, 1, 0, 36)];
        let plan = plan(2, &surfaces, [Some(0), None]);

        assert!(plan.draws.is_empty());
        assert_eq!(plan.records, [None, None]);
        assert_eq!(
            plan.skipped[0],
            (
                GeometryClass::Leaf,
                SkipReason::PositionSlotOutOfRange { slot: 9 }
            )
        );
        assert!(pass_commands(&plan, BindingStrategy::ArraySelector, STRIDE).is_empty());
    }

    #[test]
    fn both_classes_draw_at_record_offsets_with_contiguous_instances() {
        let surfaces = leaf_and_stem();
        let plan = plan(2, &surfaces, [Some(0), Some(1)]);

        let leaf = plan.records[0].unwrap();
        let stem = plan.records[1].unwrap();
        assert_eq!(stem.start_instance_location, leaf.instance_count);
        assert_eq!(stem.index_count_per_instance, 24);

        let commands = pass_commands(&plan, BindingStrategy::ArraySelector, STRIDE);
        assert_eq!(draw_offsets(&commands), vec![0, IndexedDrawRecord::SIZE]);
    }

    #[test]
    fn minimal_policy_draws_one_instance_per_class() {
        let surfaces = leaf_and_stem();
        let plan = plan(1, &surfaces, [Some(0), Some(1)]);
        assert_eq!(plan.records[0].unwrap().instance_count, 1);
        assert_eq!(plan.records[1].unwrap().start_instance_location, 1);
    }

    #[test]
    fn skipped_leaf_keeps_the_stem_range() {
        let surfaces = leaf_and_stem();
        let plan = plan(2, &surfaces, [None, Some(1)]);

        assert_eq!(plan.draws.len(), 1);
        assert_eq!(plan.records[1].unwrap().start_instance_location, 2);
        let commands = pass_commands(&plan, BindingStrategy::ArraySelector, STRIDE);
        assert_eq!(draw_offsets(&commands), vec![IndexedDrawRecord::SIZE]);
    }

    #[test]
    fn draw_count_matches_valid_classes() {
        let surfaces = leaf_and_stem();
        for indices in [
            [None, None],
            [Some(0), None],
            [None, Some(1)],
            [Some(0), Some(1)],
            [Some(5), Some(1)],
        ] {
            let plan = plan(2, &surfaces, indices);
            let valid = indices
                .iter()
                .filter(|index| matches!(index, Some(i) if *i < surfaces.len()))
                .count();
            for strategy in [
                BindingStrategy::SingleSlot,
                BindingStrategy::PerCallRebind,
                BindingStrategy::ArraySelector,
            ] {
                let commands = pass_commands(&plan, strategy, STRIDE);
                assert_eq!(draw_offsets(&commands).len(), valid);
            }
        }
    }

    #[test]
    fn zero_index_count_is_still_a_valid_class() {
        let surfaces = [SurfaceDescriptor::new(0, 1, 0, 0)];
        let plan = plan(2, &surfaces, [Some(0), None]);
        assert_eq!(plan.draws.len(), 1);
        assert_eq!(plan.records[0].unwrap().index_count_per_instance, 0);
    }

    #[test]
    fn single_slot_binds_shared_slots_once() {
        let surfaces = leaf_and_stem();
        let plan = plan(2, &surfaces, [Some(0), Some(1)]);
        let commands = pass_commands(&plan, BindingStrategy::SingleSlot, STRIDE);

        assert_eq!(
            commands.as_slice(),
            &[
                PassCommand::SetPipeline,
                PassCommand::BindFrame,
                PassCommand::BindInstances { index: 0 },
                PassCommand::SetVertexBuffers {
                    position_slot: 0,
                    normal_slot: 1
                },
                PassCommand::SetIndexBuffer {
                    slot: 0,
                    format: wgpu::IndexFormat::Uint32
                },
                PassCommand::DrawIndexedIndirect {
                    class: GeometryClass::Leaf,
                    offset: 0
                },
                PassCommand::SetVertexBuffers {
                    position_slot: 2,
                    normal_slot: 3
                },
                PassCommand::SetIndexBuffer {
                    slot: 1,
                    format: wgpu::IndexFormat::Uint32
                },
                PassCommand::DrawIndexedIndirect {
                    class: GeometryClass::Stem,
                    offset: 20
                },
            ]
        );
    }

    #[test]
    fn per_call_rebind_sets_instances_before_every_class() {
        let surfaces = leaf_and_stem();
        let plan = plan(2, &surfaces, [Some(0), Some(1)]);
        let commands = pass_commands(&plan, BindingStrategy::PerCallRebind, STRIDE);

        let binds: Vec<_> = commands
            .iter()
            .filter(|command| matches!(command, PassCommand::BindInstances { .. }))
            .collect();
        assert_eq!(
            binds,
            vec![
                &PassCommand::BindInstances { index: 0 },
                &PassCommand::BindInstances { index: 1 }
            ]
        );
        assert_eq!(
            commands
                .iter()
                .filter(|command| **command == PassCommand::BindFrame)
                .count(),
            1
        );
    }

    #[test]
    fn array_selector_binds_instances_once_and_selects_per_draw() {
        let surfaces = leaf_and_stem();
        let plan = plan(2, &surfaces, [Some(0), Some(1)]);
        let commands = pass_commands(&plan, BindingStrategy::ArraySelector, STRIDE);

        let instance_binds = commands
            .iter()
            .filter(|command| matches!(command, PassCommand::BindInstances { .. }))
            .count();
        assert_eq!(instance_binds, 1);

        let selectors: Vec<u32> = commands
            .iter()
            .filter_map(|command| match command {
                PassCommand::BindSelector { dynamic_offset } => Some(*dynamic_offset),
                _ => None,
            })
            .collect();
        assert_eq!(selectors, vec![0, STRIDE as u32]);
    }

    #[test]
    fn selector_precedes_its_draw() {
        let surfaces = leaf_and_stem();
        let plan = plan(2, &surfaces, [Some(0), Some(1)]);
        let commands = pass_commands(&plan, BindingStrategy::ArraySelector, STRIDE);

        for (position, command) in commands.iter().enumerate() {
            if let PassCommand::DrawIndexedIndirect { class, .. } = command {
                let selector = commands[..position]
                    .iter()
                    .rev()
                    .find_map(|command| match command {
                        PassCommand::BindSelector { dynamic_offset } => Some(*dynamic_offset),
                        _ => None,
                    });
                assert_eq!(selector, Some(class.index() as u32 * STRIDE as u32));
            }
        }
    }

    #[test]
    fn identical_inputs_plan_identically() {
        let surfaces = leaf_and_stem();
        let first = plan(2, &surfaces, [Some(0), Some(1)]);
        let second = plan(2, &surfaces, [Some(0), Some(1)]);
        assert_eq!(first, second);
        assert_eq!(
            pass_commands(&first, BindingStrategy::PerCallRebind, STRIDE),
            pass_commands(&second, BindingStrategy::PerCallRebind, STRIDE)
        );
    }

    #[test]
    fn no_draw_is_recorded_before_the_pipeline_and_frame_bindings() {
        let surfaces = leaf_and_stem();
        let plan = plan(2, &surfaces, [Some(0), Some(1)]);
        let commands = pass_commands(&plan, BindingStrategy::SingleSlot, STRIDE);
        assert_eq!(commands[0], PassCommand::SetPipeline);
        assert_eq!(commands[1], PassCommand::BindFrame);
        assert_eq!(commands.iter().filter(|command| command.is_bind()).count(), 2);
    }
}
