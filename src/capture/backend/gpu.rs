use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use async_trait::async_trait;
use bytemuck::{Pod, Zeroable};

use super::{
    dispatch_size, padded_buffer_size, padded_bytes_per_row, BackendError, ComputeBackend, WORKGROUP_SIZE,
};
use crate::image::{Frame, Histogram, PixelFormat};

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct Params {
    width: u32,
    height: u32,
    _pad: [u32; 2],
}

/// Per-frame-size resources
struct FrameResources {
    width: u32,
    height: u32,
    format: PixelFormat,
    texture: wgpu::Texture,
    bind_group: wgpu::BindGroup,
    staging: wgpu::Buffer,
    /// Frame written by the last `reduce`, reused only by the `stage` that follows it
    pending: Option<FrameKey>,
}

/// Identity of a frame for the span of one tick
type FrameKey = (usize, u64);

fn frame_key(frame: &Frame) -> FrameKey {
    (frame.data().as_ptr() as usize, frame.sequence())
}

impl FrameResources {
    fn matches(&self, frame: &Frame) -> bool {
        self.width == frame.width() && self.height == frame.height() && self.format == frame.format()
    }

    fn extent(&self) -> wgpu::Extent3d {
        wgpu::Extent3d {
            width: self.width,
            height: self.height,
            depth_or_array_layers: 1,
        }
    }
}

fn texture_format(format: PixelFormat) -> wgpu::TextureFormat {
    match format {
        PixelFormat::Bgra8 => wgpu::TextureFormat::Bgra8Unorm,
        PixelFormat::Rgba8 => wgpu::TextureFormat::Rgba8Unorm,
    }
}

/// Reduction pass running as a wgpu compute shader
pub struct GpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
    pipeline: wgpu::ComputePipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    params: wgpu::Buffer,
    output: wgpu::Buffer,
    readback: wgpu::Buffer,
    resources: Option<FrameResources>,
    format: PixelFormat,
    lost: Arc<AtomicBool>,
}

impl std::fmt::Debug for GpuBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GpuBackend")
            .field("size", &self.resources.as_ref().map(|r| (r.width, r.height)))
            .field("lost", &self.is_lost())
            .finish()
    }
}

impl GpuBackend {
    /// Open a compute-capable graphics device
    #[instrument]
    pub async fn new() -> Result<Self, BackendError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await?;

        let info = adapter.get_info();
        info!(adapter = %info.name, backend = ?info.backend, "using graphics adapter");

        if !adapter
            .get_downlevel_capabilities()
            .flags
            .contains(wgpu::DownlevelFlags::COMPUTE_SHADERS)
        {
            return Err(BackendError::NoCompute);
        }

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("edgelight"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::downlevel_defaults().using_resolution(adapter.limits()),
                memory_hints: wgpu::MemoryHints::Performance,
                trace: wgpu::Trace::Off,
            })
            .await?;

        let lost = Arc::new(AtomicBool::new(false));
        device.set_device_lost_callback({
            let lost = lost.clone();
            move |reason, message| {
                match reason {
                    wgpu::DeviceLostReason::Destroyed => debug!(%message, "graphics device destroyed"),
                    _ => error!(?reason, %message, "graphics device lost"),
                }

                lost.store(true, Ordering::SeqCst);
            }
        });

        // The default handler panics
        device.on_uncaptured_error(Box::new(|error| {
            error!(%error, "uncaptured graphics error");
        }));

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("edgelight-reduce"),
            source: wgpu::ShaderSource::Wgsl(include_str!("reduce.wgsl").into()),
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("edgelight-reduce"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: false },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Storage { read_only: false },
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("edgelight-reduce"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("edgelight-reduce"),
            layout: Some(&pipeline_layout),
            module: &shader,
            entry_point: Some("main"),
            compilation_options: Default::default(),
            cache: None,
        });

        let params = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("edgelight-params"),
            size: padded_buffer_size(std::mem::size_of::<Params>() as u64),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let histogram_size = padded_buffer_size(Histogram::BYTE_SIZE as u64);

        let output = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("edgelight-histogram"),
            size: histogram_size,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let readback = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("edgelight-histogram-readback"),
            size: histogram_size,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        Ok(Self {
            device,
            queue,
            pipeline,
            bind_group_layout,
            params,
            output,
            readback,
            resources: None,
            format: PixelFormat::Bgra8,
            lost,
        })
    }

    fn allocate(&mut self, width: u32, height: u32, format: PixelFormat) -> Result<(), BackendError> {
        let max = self.device.limits().max_texture_dimension_2d;
        if width == 0 || height == 0 || width > max || height > max {
            return Err(BackendError::Validation(format!(
                "unsupported frame size {}x{} (max {})",
                width, height, max
            )));
        }

        debug!(width, height, ?format, "allocating frame resources");

        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("edgelight-frame"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: texture_format(format),
            usage: wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_DST
                | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("edgelight-reduce"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: self.params.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: self.output.as_entire_binding(),
                },
            ],
        });

        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("edgelight-staging"),
            size: padded_bytes_per_row(width) as u64 * height as u64,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        self.queue.write_buffer(
            &self.params,
            0,
            bytemuck::bytes_of(&Params {
                width,
                height,
                _pad: [0; 2],
            }),
        );

        self.format = format;
        self.resources = Some(FrameResources {
            width,
            height,
            format,
            texture,
            bind_group,
            staging,
            pending: None,
        });

        Ok(())
    }

    /// Write the frame to the input texture
    fn upload(&mut self, frame: &Frame) -> Result<(), BackendError> {
        if self.is_lost() {
            return Err(BackendError::DeviceLost);
        }

        if !self.resources.as_ref().map(|r| r.matches(frame)).unwrap_or(false) {
            self.allocate(frame.width(), frame.height(), frame.format())?;
        }

        let resources = self.resources.as_mut().ok_or(BackendError::NotPrepared {
            width: frame.width(),
            height: frame.height(),
        })?;

        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &resources.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            frame.data(),
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(frame.row_pitch()),
                rows_per_image: Some(frame.height()),
            },
            resources.extent(),
        );

        resources.pending = None;
        Ok(())
    }

    /// Submit an encoder and report validation errors it caused
    async fn submit(&self, encoder: wgpu::CommandEncoder) -> Result<(), BackendError> {
        self.queue.submit(Some(encoder.finish()));

        if let Some(error) = self.device.pop_error_scope().await {
            return Err(BackendError::Validation(error.to_string()));
        }

        Ok(())
    }

    /// Map a buffer for reading, blocking until the GPU is done with it
    async fn map_read(&self, buffer: &wgpu::Buffer) -> Result<(), BackendError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        buffer.slice(..).map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });

        self.device.poll(wgpu::PollType::Wait)?;

        rx.await
            .map_err(|_| BackendError::Map("mapping callback dropped".to_owned()))?
            .map_err(|error| BackendError::Map(error.to_string()))
    }
}

#[async_trait]
impl ComputeBackend for GpuBackend {
    fn prepare(&mut self, width: u32, height: u32) -> Result<(), BackendError> {
        if self.is_lost() {
            return Err(BackendError::DeviceLost);
        }

        self.allocate(width, height, self.format)
    }

    async fn reduce(&mut self, frame: &Frame) -> Result<Histogram, BackendError> {
        self.upload(frame)?;

        let resources = self.resources.as_ref().ok_or(BackendError::NotPrepared {
            width: frame.width(),
            height: frame.height(),
        })?;

        self.device.push_error_scope(wgpu::ErrorFilter::Validation);

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("edgelight-reduce"),
        });

        encoder.clear_buffer(&self.output, 0, None);

        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("edgelight-reduce"),
                timestamp_writes: None,
            });

            pass.set_pipeline(&self.pipeline);
            pass.set_bind_group(0, &resources.bind_group, &[]);
            pass.dispatch_workgroups(
                dispatch_size(resources.width, WORKGROUP_SIZE),
                dispatch_size(resources.height, WORKGROUP_SIZE),
                1,
            );
        }

        encoder.copy_buffer_to_buffer(&self.output, 0, &self.readback, 0, self.readback.size());

        self.submit(encoder).await?;
        self.map_read(&self.readback).await?;

        let words = {
            let view = self.readback.slice(..).get_mapped_range();
            bytemuck::try_cast_slice::<u8, u32>(&view[..Histogram::BYTE_SIZE])
                .map(|words| words.to_vec())
                .map_err(|error| BackendError::Map(format!("{:?}", error)))
        };

        self.readback.unmap();

        if let Some(resources) = self.resources.as_mut() {
            resources.pending = Some(frame_key(frame));
        }

        Ok(Histogram::from_words(words?)?)
    }

    async fn stage(&mut self, frame: &Frame) -> Result<Frame, BackendError> {
        let reduced = self
            .resources
            .as_mut()
            .and_then(|resources| resources.pending.take())
            .map(|key| key == frame_key(frame))
            .unwrap_or(false);

        if !reduced {
            self.upload(frame)?;
        }

        let resources = self.resources.as_ref().ok_or(BackendError::NotPrepared {
            width: frame.width(),
            height: frame.height(),
        })?;

        let row_pitch = padded_bytes_per_row(resources.width);

        self.device.push_error_scope(wgpu::ErrorFilter::Validation);

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("edgelight-stage"),
        });

        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &resources.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &resources.staging,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(row_pitch),
                    rows_per_image: Some(resources.height),
                },
            },
            resources.extent(),
        );

        self.submit(encoder).await?;
        self.map_read(&resources.staging).await?;

        let data = resources.staging.slice(..).get_mapped_range().to_vec();
        resources.staging.unmap();

        Ok(Frame::with_row_pitch(data, resources.width, resources.height, row_pitch, resources.format)?
            .with_sequence(frame.sequence()))
    }

    fn is_lost(&self) -> bool {
        self.lost.load(Ordering::SeqCst)
    }

    fn release(&mut self) {
        debug!("releasing frame resources");
        self.resources = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        color::opaque,
        image::{ColorAlgorithm, Frame},
    };

    async fn backend() -> Option<GpuBackend> {
        match GpuBackend::new().await {
            Ok(backend) => Some(backend),
            Err(error) => {
                eprintln!("skipping, no compute device: {}", error);
                None
            }
        }
    }

    #[tokio::test]
    async fn every_tick_sees_its_own_frame() {
        let mut backend = match backend().await {
            Some(backend) => backend,
            None => return,
        };
        backend.prepare(32, 16).unwrap();

        // Frames built directly all share sequence 0
        let red = Frame::from_fn(32, 16, PixelFormat::Bgra8, |_, _| opaque(255, 0, 0)).unwrap();
        let blue = Frame::from_fn(32, 16, PixelFormat::Bgra8, |_, _| opaque(0, 0, 255)).unwrap();
        assert_eq!(red.sequence(), blue.sequence());

        for (frame, expected) in [(&red, opaque(255, 0, 0)), (&blue, opaque(0, 0, 255)), (&red, opaque(255, 0, 0))] {
            let histogram = backend.reduce(frame).await.unwrap();
            assert_eq!(ColorAlgorithm.predominant_color(&histogram), expected);
        }

        // Staging without a preceding reduce of the same frame uploads it
        let staged = backend.stage(&blue).await.unwrap();
        assert_eq!(staged.rgb_at(0, 0), (0, 0, 255));

        backend.reduce(&red).await.unwrap();
        let staged = backend.stage(&red).await.unwrap();
        assert_eq!(staged.rgb_at(31, 15), (255, 0, 0));
    }
}
