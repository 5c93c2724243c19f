use std::mem::size_of;
use std::sync::Arc;

use ash::vk;
use ash_renderer::vulkan::{Allocator, ComputePipeline, VulkanDevice};
use log::{debug, info, trace, warn};
use parking_lot::Mutex;

use super::{DispatchHandle, ReadbackScope, Result, SolverError, SolverFacade, UploadScope};
use crate::config::DEFAULT_MAX_NEIGHBORS_PER_PARTICLE;
use crate::core::assets::AssetRegistry;
use crate::core::params::SimParams;
use crate::core::shapes::{CollisionGeometry, ShapeBuffers};
use crate::core::store::ParticleStore;

/// Invocations per workgroup the solve kernel is compiled with.
pub const SOLVE_WORKGROUP_SIZE: u32 = 64;

pub struct GpuBuffer {
    pub buffer: vk::Buffer,
    pub allocation: vk_mem::Allocation,
    pub size: u64,
}

/// Storage-buffer bindings of descriptor set 0, in binding order.
///
/// 3-wide streams are tightly packed `float[3 * n]`.
#[repr(usize)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Binding {
    Positions,
    Velocities,
    Phases,
    Normals,
    RestPositions,
    ActiveIndices,
    SpringIndices,
    SpringParams,
    RigidOffsets,
    RigidIndices,
    RigidParams,
    RigidLocalPositions,
    RigidRotations,
    RigidTranslations,
    Triangles,
    TriangleNormals,
    Shapes,
}

impl Binding {
    pub const COUNT: usize = 17;

    pub fn index(self) -> u32 {
        self as u32
    }
}

/// Device layout of one collision shape.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GpuShape {
    pub position: [f32; 4],
    pub rotation: [f32; 4],
    pub prev_position: [f32; 4],
    pub prev_rotation: [f32; 4],
    /// Sphere: radius. Capsule: radius, half height. Box: half extents.
    /// Mesh-backed: scale, with `w` holding the asset slot.
    pub geometry: [f32; 4],
    pub flags: u32,
    pub _pad: [u32; 3],
}

impl GpuShape {
    pub fn pack(shapes: &ShapeBuffers, index: usize) -> Self {
        let geometry = match shapes.geometry[index] {
            CollisionGeometry::Sphere { radius } => [radius, 0.0, 0.0, 0.0],
            CollisionGeometry::Capsule {
                radius,
                half_height,
            } => [radius, half_height, 0.0, 0.0],
            CollisionGeometry::Box { half_extents } => half_extents.extend(0.0).to_array(),
            CollisionGeometry::ConvexMesh { mesh, scale }
            | CollisionGeometry::TriangleMesh { mesh, scale } => {
                scale.extend(mesh.index as f32).to_array()
            }
            CollisionGeometry::Sdf { field, scale } => [scale, scale, scale, field.index as f32],
        };

        Self {
            position: shapes.positions[index].to_array(),
            rotation: shapes.rotations[index].to_array(),
            prev_position: shapes.prev_positions[index].to_array(),
            prev_rotation: shapes.prev_rotations[index].to_array(),
            geometry,
            flags: shapes.flags[index].0,
            _pad: [0; 3],
        }
    }
}

/// Per-substep constants pushed ahead of every solve dispatch.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolvePushConstants {
    /// xyz gravity, w particle radius.
    pub gravity: [f32; 4],
    pub dt: f32,
    pub substep: u32,
    pub active_count: u32,
    pub iterations: u32,
    pub num_springs: u32,
    pub num_rigids: u32,
    pub num_shapes: u32,
    pub num_planes: u32,
    pub max_neighbors: u32,
    pub _pad: [u32; 3],
}

impl SolvePushConstants {
    /// Range to declare in the solve kernel's pipeline layout.
    pub fn range() -> vk::PushConstantRange {
        vk::PushConstantRange::default()
            .stage_flags(vk::ShaderStageFlags::COMPUTE)
            .offset(0)
            .size(size_of::<Self>() as u32)
    }

    pub fn as_bytes(&self) -> &[u8] {
        // plain-old-data: every field is 4 bytes wide, no padding
        unsafe { std::slice::from_raw_parts((self as *const Self).cast::<u8>(), size_of::<Self>()) }
    }
}

/// Byte size of a device buffer holding `count` elements of `T`.
/// Never zero, so empty scenes still get a bindable buffer.
pub fn buffer_bytes<T>(count: usize) -> u64 {
    (count.max(1) * size_of::<T>()) as u64
}

/// Coefficient and plastic parameters of each rigid, one vec4 per cluster.
pub fn pack_rigid_params(store: &ParticleStore) -> Vec<[f32; 4]> {
    (0..store.rigid_coefficients.len())
        .map(|i| {
            [
                store.rigid_coefficients[i],
                store.rigid_plastic_thresholds.get(i).copied().unwrap_or(0.0),
                store.rigid_plastic_creeps.get(i).copied().unwrap_or(0.0),
                0.0,
            ]
        })
        .collect()
}

fn device_error(what: &'static str) -> impl Fn(vk::Result) -> SolverError {
    move |e| SolverError::Device(format!("{what}: {e:?}"))
}

fn init_error(what: &'static str) -> impl Fn(vk::Result) -> SolverError {
    move |e| SolverError::DeviceInit(format!("{what}: {e:?}"))
}

/// Command buffer, fence and descriptor set the solve is recorded with.
struct SolveResources {
    command_pool: vk::CommandPool,
    command_buffer: vk::CommandBuffer,
    fence: vk::Fence,
    set_layout: vk::DescriptorSetLayout,
    descriptor_pool: vk::DescriptorPool,
    descriptor_set: vk::DescriptorSet,
}

impl SolveResources {
    unsafe fn create(device: &ash::Device, queue_family: u32) -> Result<Self> {
        let command_pool = device
            .create_command_pool(
                &vk::CommandPoolCreateInfo::default()
                    .queue_family_index(queue_family)
                    .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER),
                None,
            )
            .map_err(init_error("solve command pool"))?;
        let command_buffer = device
            .allocate_command_buffers(
                &vk::CommandBufferAllocateInfo::default()
                    .command_pool(command_pool)
                    .level(vk::CommandBufferLevel::PRIMARY)
                    .command_buffer_count(1),
            )
            .map_err(init_error("solve command buffer"))?[0];
        let fence = device
            .create_fence(&vk::FenceCreateInfo::default(), None)
            .map_err(init_error("solve fence"))?;

        let bindings: Vec<vk::DescriptorSetLayoutBinding> = (0..Binding::COUNT as u32)
            .map(|binding| {
                vk::DescriptorSetLayoutBinding::default()
                    .binding(binding)
                    .descriptor_type(vk::DescriptorType::STORAGE_BUFFER)
                    .descriptor_count(1)
                    .stage_flags(vk::ShaderStageFlags::COMPUTE)
            })
            .collect();
        let set_layout = device
            .create_descriptor_set_layout(
                &vk::DescriptorSetLayoutCreateInfo::default().bindings(&bindings),
                None,
            )
            .map_err(init_error("solve descriptor layout"))?;

        let pool_sizes = [vk::DescriptorPoolSize {
            ty: vk::DescriptorType::STORAGE_BUFFER,
            descriptor_count: Binding::COUNT as u32,
        }];
        let descriptor_pool = device
            .create_descriptor_pool(
                &vk::DescriptorPoolCreateInfo::default()
                    .max_sets(1)
                    .pool_sizes(&pool_sizes),
                None,
            )
            .map_err(init_error("solve descriptor pool"))?;
        let layouts = [set_layout];
        let descriptor_set = device
            .allocate_descriptor_sets(
                &vk::DescriptorSetAllocateInfo::default()
                    .descriptor_pool(descriptor_pool)
                    .set_layouts(&layouts),
            )
            .map_err(init_error("solve descriptor set"))?[0];

        Ok(Self {
            command_pool,
            command_buffer,
            fence,
            set_layout,
            descriptor_pool,
            descriptor_set,
        })
    }

    unsafe fn destroy(&self, device: &ash::Device) {
        device.destroy_descriptor_pool(self.descriptor_pool, None);
        device.destroy_descriptor_set_layout(self.set_layout, None);
        device.destroy_fence(self.fence, None);
        device.destroy_command_pool(self.command_pool, None);
    }
}

/// Vulkan solver backend.
///
/// Owns one host-visible storage buffer per [`Binding`]. The solve kernel
/// is supplied by the caller through [`AshSolver::set_solve_pipeline`]; it
/// must be built against [`AshSolver::descriptor_set_layout`] and
/// [`SolvePushConstants::range`]. Each substep records one dispatch of
/// `ceil(active / SOLVE_WORKGROUP_SIZE)` groups on the graphics queue, which
/// must not be submitted to concurrently. Until a kernel is bound the
/// backend only mirrors the host buffers: dispatches complete immediately
/// and readback returns the uploaded state.
pub struct AshSolver {
    pub device: Arc<VulkanDevice>,
    pub allocator: Arc<Allocator>,

    slots: [Mutex<Option<GpuBuffer>>; Binding::COUNT],
    solve: SolveResources,
    solve_pipeline: Option<Arc<ComputePipeline>>,
    in_flight: bool,

    params: SimParams,
    particle_count: usize,
    active_count: usize,
    num_springs: usize,
    num_rigids: usize,
    num_shapes: usize,
}

impl AshSolver {
    pub fn new(device: Arc<VulkanDevice>) -> Result<Self> {
        let allocator = unsafe { Allocator::new(&device) }
            .map_err(|e| SolverError::DeviceInit(e.to_string()))?;
        let solve = unsafe { SolveResources::create(&device.device, device.graphics_queue_family)? };
        info!("Vulkan solver backend ready");
        Ok(Self {
            device,
            allocator: Arc::new(allocator),
            slots: std::array::from_fn(|_| Mutex::new(None)),
            solve,
            solve_pipeline: None,
            in_flight: false,
            params: SimParams::default(),
            particle_count: 0,
            active_count: 0,
            num_springs: 0,
            num_rigids: 0,
            num_shapes: 0,
        })
    }

    /// Layout of descriptor set 0 the solve kernel must be compiled against.
    pub fn descriptor_set_layout(&self) -> vk::DescriptorSetLayout {
        self.solve.set_layout
    }

    pub fn set_solve_pipeline(&mut self, pipeline: Arc<ComputePipeline>) {
        self.solve_pipeline = Some(pipeline);
    }

    pub fn has_solve_pipeline(&self) -> bool {
        self.solve_pipeline.is_some()
    }

    fn slot(&self, binding: Binding) -> &Mutex<Option<GpuBuffer>> {
        &self.slots[binding as usize]
    }

    fn ensure_buffer(&self, existing: &mut Option<GpuBuffer>, size: u64) -> Result<()> {
        if let Some(buf) = existing {
            if buf.size >= size {
                return Ok(());
            }
            // too small: recreate
            unsafe {
                self.allocator
                    .destroy_buffer(buf.buffer, &mut buf.allocation);
            }
            *existing = None;
        }

        let (buffer, allocation) = unsafe {
            self.allocator.create_buffer(
                size,
                vk::BufferUsageFlags::STORAGE_BUFFER,
                vk_mem::MemoryUsage::AutoPreferHost,
            )?
        };
        *existing = Some(GpuBuffer {
            buffer,
            allocation,
            size,
        });
        Ok(())
    }

    fn write_slice<T: Copy>(&self, binding: Binding, data: &[T]) -> Result<()> {
        let mut lock = self.slot(binding).lock();
        self.ensure_buffer(&mut lock, buffer_bytes::<T>(data.len()))?;
        let Some(buf) = lock.as_mut() else {
            return Ok(());
        };

        unsafe {
            let ptr = self
                .allocator
                .vma
                .map_memory(&mut buf.allocation)
                .map_err(|e| SolverError::Device(format!("map failed: {e:?}")))?;
            std::ptr::copy_nonoverlapping(data.as_ptr(), ptr as *mut T, data.len());
            self.allocator.vma.unmap_memory(&mut buf.allocation);
        }
        Ok(())
    }

    fn read_slice<T: Copy>(&self, binding: Binding, out: &mut [T]) -> Result<()> {
        let mut lock = self.slot(binding).lock();
        let Some(buf) = lock.as_mut() else {
            return Ok(());
        };
        if buf.size < buffer_bytes::<T>(out.len()) {
            return Err(SolverError::BufferMismatch {
                buffer: "readback",
                expected: buf.size as usize / size_of::<T>(),
                actual: out.len(),
            });
        }

        unsafe {
            let ptr = self
                .allocator
                .vma
                .map_memory(&mut buf.allocation)
                .map_err(|e| SolverError::Device(format!("map failed: {e:?}")))?;
            std::ptr::copy_nonoverlapping(ptr as *const T, out.as_mut_ptr(), out.len());
            self.allocator.vma.unmap_memory(&mut buf.allocation);
        }
        Ok(())
    }

    fn check_count(&self, buffer: &'static str, actual: usize) -> Result<()> {
        if actual != self.particle_count {
            return Err(SolverError::BufferMismatch {
                buffer,
                expected: self.particle_count,
                actual,
            });
        }
        Ok(())
    }

    /// Blocks until the last submitted solve has signalled its fence.
    fn wait_for_solve(&mut self) -> Result<()> {
        if self.in_flight {
            unsafe {
                self.device
                    .device
                    .wait_for_fences(&[self.solve.fence], true, u64::MAX)
            }
            .map_err(device_error("wait for solve fence"))?;
            self.in_flight = false;
        }
        Ok(())
    }

    /// Points every binding of the solve descriptor set at its current buffer.
    fn bind_buffers(&self) -> Result<()> {
        let mut infos = Vec::with_capacity(Binding::COUNT);
        for slot in &self.slots {
            let mut lock = slot.lock();
            // unbound streams still need a valid buffer behind the binding
            self.ensure_buffer(&mut lock, buffer_bytes::<u32>(0))?;
            if let Some(buf) = lock.as_ref() {
                infos.push(
                    vk::DescriptorBufferInfo::default()
                        .buffer(buf.buffer)
                        .offset(0)
                        .range(vk::WHOLE_SIZE),
                );
            }
        }
        let writes: Vec<vk::WriteDescriptorSet> = infos
            .iter()
            .enumerate()
            .map(|(binding, info)| {
                vk::WriteDescriptorSet::default()
                    .dst_set(self.solve.descriptor_set)
                    .dst_binding(binding as u32)
                    .descriptor_type(vk::DescriptorType::STORAGE_BUFFER)
                    .buffer_info(std::slice::from_ref(info))
            })
            .collect();
        unsafe { self.device.device.update_descriptor_sets(&writes, &[]) };
        Ok(())
    }

    fn push_constants(&self, dt: f32, substep: u32) -> SolvePushConstants {
        SolvePushConstants {
            gravity: self.params.gravity.extend(self.params.radius).to_array(),
            dt,
            substep,
            active_count: self.active_count as u32,
            iterations: self.params.num_iterations,
            num_springs: self.num_springs as u32,
            num_rigids: self.num_rigids as u32,
            num_shapes: self.num_shapes as u32,
            num_planes: self.params.num_planes as u32,
            max_neighbors: DEFAULT_MAX_NEIGHBORS_PER_PARTICLE,
            _pad: [0; 3],
        }
    }

    /// Records `substeps` dispatches separated by compute barriers and
    /// submits them with the solve fence.
    fn submit_solve(&mut self, pipeline: &ComputePipeline, dt: f32, substeps: u32) -> Result<()> {
        self.wait_for_solve()?;
        self.bind_buffers()?;

        let substeps = substeps.max(1);
        let sub_dt = dt / substeps as f32;
        let groups = (self.active_count as u32).div_ceil(SOLVE_WORKGROUP_SIZE);
        let device = &self.device.device;
        let cb = self.solve.command_buffer;

        unsafe {
            device
                .reset_command_buffer(cb, vk::CommandBufferResetFlags::empty())
                .map_err(device_error("reset solve commands"))?;
            device
                .begin_command_buffer(
                    cb,
                    &vk::CommandBufferBeginInfo::default()
                        .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT),
                )
                .map_err(device_error("begin solve commands"))?;
            device.cmd_bind_pipeline(cb, vk::PipelineBindPoint::COMPUTE, pipeline.handle());
            device.cmd_bind_descriptor_sets(
                cb,
                vk::PipelineBindPoint::COMPUTE,
                pipeline.layout(),
                0,
                &[self.solve.descriptor_set],
                &[],
            );

            for substep in 0..substeps {
                let constants = self.push_constants(sub_dt, substep);
                device.cmd_push_constants(
                    cb,
                    pipeline.layout(),
                    vk::ShaderStageFlags::COMPUTE,
                    0,
                    constants.as_bytes(),
                );
                device.cmd_dispatch(cb, groups, 1, 1);

                let last = substep + 1 == substeps;
                let (dst_stage, dst_access) = if last {
                    (vk::PipelineStageFlags::HOST, vk::AccessFlags::HOST_READ)
                } else {
                    (
                        vk::PipelineStageFlags::COMPUTE_SHADER,
                        vk::AccessFlags::SHADER_READ | vk::AccessFlags::SHADER_WRITE,
                    )
                };
                let barrier = vk::MemoryBarrier::default()
                    .src_access_mask(vk::AccessFlags::SHADER_WRITE)
                    .dst_access_mask(dst_access);
                device.cmd_pipeline_barrier(
                    cb,
                    vk::PipelineStageFlags::COMPUTE_SHADER,
                    dst_stage,
                    vk::DependencyFlags::empty(),
                    &[barrier],
                    &[],
                    &[],
                );
            }

            device
                .end_command_buffer(cb)
                .map_err(device_error("end solve commands"))?;
            device
                .reset_fences(&[self.solve.fence])
                .map_err(device_error("reset solve fence"))?;
            let command_buffers = [cb];
            let submit = vk::SubmitInfo::default().command_buffers(&command_buffers);
            device
                .queue_submit(self.device.graphics_queue, &[submit], self.solve.fence)
                .map_err(device_error("submit solve"))?;
        }
        self.in_flight = true;
        trace!(
            "Submitted {} substeps of {:.5}s in {} groups",
            substeps,
            sub_dt,
            groups
        );
        Ok(())
    }

    fn download_into(&mut self, store: &mut ParticleStore, scope: ReadbackScope) -> Result<()> {
        self.wait_for_solve()?;
        self.check_count("positions", store.positions.len())?;
        self.read_slice(Binding::Positions, &mut store.positions)?;
        if scope == ReadbackScope::Frame {
            self.read_slice(Binding::Velocities, &mut store.velocities)?;
            self.read_slice(Binding::Normals, &mut store.normals)?;
            self.read_slice(Binding::TriangleNormals, &mut store.triangle_normals)?;
            self.read_slice(Binding::RigidRotations, &mut store.rigid_rotations)?;
            self.read_slice(Binding::RigidTranslations, &mut store.rigid_translations)?;
        }
        Ok(())
    }

    fn destroy_slot(&self, slot: &Mutex<Option<GpuBuffer>>) {
        if let Some(mut buf) = slot.lock().take() {
            unsafe {
                self.allocator
                    .destroy_buffer(buf.buffer, &mut buf.allocation);
            }
        }
    }
}

impl SolverFacade for AshSolver {
    fn name(&self) -> &str {
        "vulkan-ash"
    }

    fn configure(&mut self, params: &SimParams) {
        self.params = *params;
    }

    fn params(&self) -> SimParams {
        self.params
    }

    fn upload(&mut self, store: &ParticleStore, scope: UploadScope) -> Result<()> {
        // the kernel may still be reading the buffers we are about to overwrite
        self.wait_for_solve()?;
        match scope {
            UploadScope::Full => {
                store.validate()?;
                self.particle_count = store.positions.len();
                self.num_springs = store.num_springs();
                self.num_rigids = store.num_rigids();

                let spring_params: Vec<[f32; 2]> = store
                    .spring_lengths
                    .iter()
                    .zip(&store.spring_stiffness)
                    .map(|(&l, &s)| [l, s])
                    .collect();

                self.write_slice(Binding::Positions, &store.positions)?;
                self.write_slice(Binding::Velocities, &store.velocities)?;
                self.write_slice(Binding::Phases, &store.phases)?;
                self.write_slice(Binding::Normals, &store.normals)?;
                self.write_slice(Binding::RestPositions, &store.rest_positions)?;
                self.write_slice(Binding::SpringIndices, &store.spring_indices)?;
                self.write_slice(Binding::SpringParams, &spring_params)?;
                self.write_slice(Binding::RigidOffsets, &store.rigid_offsets)?;
                self.write_slice(Binding::RigidIndices, &store.rigid_indices)?;
                self.write_slice(Binding::RigidParams, &pack_rigid_params(store))?;
                self.write_slice(Binding::RigidLocalPositions, &store.rigid_local_positions)?;
                self.write_slice(Binding::RigidRotations, &store.rigid_rotations)?;
                self.write_slice(Binding::RigidTranslations, &store.rigid_translations)?;
                self.write_slice(Binding::Triangles, &store.triangles)?;
                self.write_slice(Binding::TriangleNormals, &store.triangle_normals)?;
                debug!(
                    "Staged {} particles, {} springs and {} rigids on {}",
                    self.particle_count,
                    self.num_springs,
                    self.num_rigids,
                    self.name()
                );
            }
            UploadScope::Dynamic => {
                self.check_count("positions", store.positions.len())?;
                self.write_slice(Binding::Positions, &store.positions)?;
                self.write_slice(Binding::Velocities, &store.velocities)?;
                self.write_slice(Binding::Phases, &store.phases)?;
            }
            UploadScope::Velocities => {
                self.check_count("velocities", store.velocities.len())?;
                self.write_slice(Binding::Velocities, &store.velocities)?;
                return Ok(());
            }
        }

        self.write_slice(Binding::ActiveIndices, &store.active_indices)?;
        self.active_count = store.active_indices.len();
        Ok(())
    }

    fn upload_shapes(&mut self, shapes: &ShapeBuffers, _assets: &AssetRegistry) -> Result<()> {
        if !shapes.lengths_consistent() {
            return Err(SolverError::BufferMismatch {
                buffer: "shapes",
                expected: shapes.flags.len(),
                actual: shapes.geometry.len(),
            });
        }
        self.wait_for_solve()?;
        let packed: Vec<GpuShape> = (0..shapes.len()).map(|i| GpuShape::pack(shapes, i)).collect();
        self.write_slice(Binding::Shapes, &packed)?;
        self.num_shapes = packed.len();
        Ok(())
    }

    fn dispatch(&mut self, dt: f32, substeps: u32) -> DispatchHandle {
        let Some(pipeline) = self.solve_pipeline.clone() else {
            trace!("No solve kernel bound; mirroring host buffers only");
            return DispatchHandle::completed();
        };
        if self.active_count == 0 {
            return DispatchHandle::completed();
        }

        if let Err(err) = self.submit_solve(&pipeline, dt, substeps) {
            warn!("Solve dispatch failed: {err}");
            return DispatchHandle::completed();
        }

        let device = Arc::clone(&self.device.device);
        let fence = self.solve.fence;
        DispatchHandle::deferred(move || {
            if let Err(err) = unsafe { device.wait_for_fences(&[fence], true, u64::MAX) } {
                warn!("Waiting for the solve fence failed: {err:?}");
            }
        })
    }

    fn download(&mut self, store: &mut ParticleStore, scope: ReadbackScope) {
        if let Err(err) = self.download_into(store, scope) {
            warn!("Readback failed: {err}");
        }
    }

    fn active_count(&self) -> usize {
        self.active_count
    }

    fn release_assets(&mut self) {
        if let Err(err) = self.wait_for_solve() {
            warn!("Releasing assets with a solve in flight: {err}");
        }
        self.destroy_slot(self.slot(Binding::Shapes));
        self.num_shapes = 0;
    }
}

impl Drop for AshSolver {
    fn drop(&mut self) {
        if let Err(err) = self.wait_for_solve() {
            warn!("Dropping solver with a solve in flight: {err}");
        }
        for slot in &self.slots {
            self.destroy_slot(slot);
        }
        unsafe { self.solve.destroy(&self.device.device) };
    }
}
