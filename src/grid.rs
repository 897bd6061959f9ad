//! GPU-resident cell grids.
//!
//! A [`CellGrid`] is a 2D texture of cells with a declared element format and
//! a resolution fixed at creation. Two grids of identical format and
//! resolution form the simulation's ping-pong pair. Bind operations hand out
//! stateless descriptors (bind-group entries); rebinding to another slot or
//! role never requires an unbind. The role passed must match how the
//! following compute or render stage accesses the grid; a mismatch is a
//! caller contract error, not a recoverable condition.

use glam::UVec2;

use crate::error::GpuError;
use crate::gpu::GpuContext;
use crate::handle::GpuHandle;

/// Element format of one cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellFormat {
    /// One byte per cell host-side, values `{0, 1}`, stored as `r32uint`
    /// texels so the grid is usable as a write-only storage texture.
    Occupancy,
    /// Four `f32` channels per cell.
    Rgba32Float,
}

impl CellFormat {
    /// Size of one cell in host upload data.
    pub fn host_element_size(&self) -> usize {
        match self {
            CellFormat::Occupancy => 1,
            CellFormat::Rgba32Float => 16,
        }
    }

    /// Size of one texel on the device.
    pub fn texel_size(&self) -> u32 {
        match self {
            CellFormat::Occupancy => 4,
            CellFormat::Rgba32Float => 16,
        }
    }

    pub fn texture_format(&self) -> wgpu::TextureFormat {
        match self {
            CellFormat::Occupancy => wgpu::TextureFormat::R32Uint,
            CellFormat::Rgba32Float => wgpu::TextureFormat::Rgba32Float,
        }
    }

    fn sample_type(&self) -> wgpu::TextureSampleType {
        match self {
            CellFormat::Occupancy => wgpu::TextureSampleType::Uint,
            CellFormat::Rgba32Float => wgpu::TextureSampleType::Float { filterable: false },
        }
    }
}

/// Access role for a compute binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageAccess {
    /// Read-only input to the dispatch (bound as a plain texture, loaded
    /// per-texel in the shader).
    Read,
    /// Write-only output of the dispatch (bound as a storage texture).
    Write,
}

/// A 2D GPU-resident grid of cells.
pub struct CellGrid {
    texture: GpuHandle<wgpu::Texture>,
    view: wgpu::TextureView,
    resolution: UVec2,
    format: CellFormat,
    label: String,
}

impl CellGrid {
    /// Allocate backing storage for `resolution` cells. Initial contents are
    /// undefined until the first [`upload`](Self::upload).
    pub fn new(ctx: &GpuContext, label: &str, resolution: UVec2, format: CellFormat) -> Self {
        let (texture, view) = create_texture(ctx, label, resolution, format);
        Self {
            texture,
            view,
            resolution,
            format,
            label: label.to_string(),
        }
    }

    #[inline]
    pub fn resolution(&self) -> UVec2 {
        self.resolution
    }

    #[inline]
    pub fn format(&self) -> CellFormat {
        self.format
    }

    /// Identity of the owning handle; two grids alias iff these are equal.
    #[inline]
    pub fn texture_id(&self) -> u64 {
        self.texture.id()
    }

    /// Replace the grid's contents (and possibly format) from host data.
    ///
    /// `data` must be row-major, `resolution.x * resolution.y` elements of
    /// `format.host_element_size()` bytes each, and `resolution` must match
    /// the grid's fixed resolution. A format change recreates the backing
    /// texture under a fresh identity; texture formats are immutable on the
    /// device.
    pub fn upload(&mut self, ctx: &GpuContext, data: &[u8], resolution: UVec2, format: CellFormat) {
        assert_eq!(
            resolution, self.resolution,
            "grid resolution is fixed at creation"
        );
        assert_eq!(
            data.len(),
            host_len(resolution, format),
            "upload data length does not match grid extent"
        );

        if format != self.format {
            let (texture, view) = create_texture(ctx, &self.label, self.resolution, format);
            self.texture = texture;
            self.view = view;
            self.format = format;
        }

        let texels: Vec<u8> = match format {
            // Widen occupancy bytes to r32uint texels.
            CellFormat::Occupancy => data.iter().flat_map(|&c| (c as u32).to_le_bytes()).collect(),
            CellFormat::Rgba32Float => data.to_vec(),
        };

        ctx.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: self.texture.get(),
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &texels,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(resolution.x * format.texel_size()),
                rows_per_image: Some(resolution.y),
            },
            wgpu::Extent3d {
                width: resolution.x,
                height: resolution.y,
                depth_or_array_layers: 1,
            },
        );
    }

    /// Bind-group entry exposing the grid to a compute dispatch at `slot`.
    pub fn bind_for_compute(&self, slot: u32, _access: StorageAccess) -> wgpu::BindGroupEntry<'_> {
        wgpu::BindGroupEntry {
            binding: slot,
            resource: wgpu::BindingResource::TextureView(&self.view),
        }
    }

    /// Layout entry matching [`bind_for_compute`](Self::bind_for_compute).
    pub fn layout_for_compute(&self, slot: u32, access: StorageAccess) -> wgpu::BindGroupLayoutEntry {
        let ty = match access {
            StorageAccess::Read => wgpu::BindingType::Texture {
                sample_type: self.format.sample_type(),
                view_dimension: wgpu::TextureViewDimension::D2,
                multisampled: false,
            },
            StorageAccess::Write => wgpu::BindingType::StorageTexture {
                access: wgpu::StorageTextureAccess::WriteOnly,
                format: self.format.texture_format(),
                view_dimension: wgpu::TextureViewDimension::D2,
            },
        };
        wgpu::BindGroupLayoutEntry {
            binding: slot,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty,
            count: None,
        }
    }

    /// Bind-group entry exposing the grid to the presentation pass at `slot`.
    pub fn bind_for_sample(&self, slot: u32) -> wgpu::BindGroupEntry<'_> {
        wgpu::BindGroupEntry {
            binding: slot,
            resource: wgpu::BindingResource::TextureView(&self.view),
        }
    }

    /// Layout entry matching [`bind_for_sample`](Self::bind_for_sample).
    pub fn layout_for_sample(&self, slot: u32) -> wgpu::BindGroupLayoutEntry {
        wgpu::BindGroupLayoutEntry {
            binding: slot,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Texture {
                sample_type: self.format.sample_type(),
                view_dimension: wgpu::TextureViewDimension::D2,
                multisampled: false,
            },
            count: None,
        }
    }

    /// Copy the grid back to the host, inverting the upload encoding.
    ///
    /// Blocks until the copy completes. Used by the live-cell counter and by
    /// tests; the simulation loop itself never reads back.
    pub fn read_back(&self, ctx: &GpuContext) -> Result<Vec<u8>, GpuError> {
        let texel_size = self.format.texel_size();
        let unpadded_bytes_per_row = self.resolution.x * texel_size;
        let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let padded_bytes_per_row = unpadded_bytes_per_row.div_ceil(align) * align;

        let staging = ctx.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Grid Readback Buffer"),
            size: u64::from(padded_bytes_per_row) * u64::from(self.resolution.y),
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Grid Readback Encoder"),
            });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: self.texture.get(),
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &staging,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_bytes_per_row),
                    rows_per_image: Some(self.resolution.y),
                },
            },
            wgpu::Extent3d {
                width: self.resolution.x,
                height: self.resolution.y,
                depth_or_array_layers: 1,
            },
        );
        ctx.queue.submit(std::iter::once(encoder.finish()));

        let slice = staging.slice(..);
        let (sender, receiver) = futures_intrusive::channel::shared::oneshot_channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        let _ = ctx.device.poll(wgpu::Maintain::Wait);

        match pollster::block_on(receiver.receive()) {
            Some(Ok(())) => {}
            Some(Err(e)) => return Err(GpuError::BufferMapping(e.to_string())),
            None => return Err(GpuError::BufferMapping("map callback dropped".into())),
        }

        let mapped = slice.get_mapped_range();
        let mut out = Vec::with_capacity(host_len(self.resolution, self.format));
        for row in 0..self.resolution.y {
            let start = (row * padded_bytes_per_row) as usize;
            let row_bytes = &mapped[start..start + unpadded_bytes_per_row as usize];
            match self.format {
                CellFormat::Occupancy => {
                    for texel in row_bytes.chunks_exact(4) {
                        let v = u32::from_le_bytes([texel[0], texel[1], texel[2], texel[3]]);
                        out.push(v.min(1) as u8);
                    }
                }
                CellFormat::Rgba32Float => out.extend_from_slice(row_bytes),
            }
        }
        drop(mapped);
        staging.unmap();

        Ok(out)
    }
}

/// Host byte length of a full grid. Widens before multiplying so extents
/// whose cell count exceeds `u32::MAX` size correctly.
fn host_len(resolution: UVec2, format: CellFormat) -> usize {
    resolution.x as usize * resolution.y as usize * format.host_element_size()
}

fn create_texture(
    ctx: &GpuContext,
    label: &str,
    resolution: UVec2,
    format: CellFormat,
) -> (GpuHandle<wgpu::Texture>, wgpu::TextureView) {
    let texture = ctx.device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size: wgpu::Extent3d {
            width: resolution.x,
            height: resolution.y,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: format.texture_format(),
        usage: wgpu::TextureUsages::TEXTURE_BINDING
            | wgpu::TextureUsages::STORAGE_BINDING
            | wgpu::TextureUsages::COPY_DST
            | wgpu::TextureUsages::COPY_SRC,
        view_formats: &[],
    });
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    (GpuHandle::new(texture), view)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_element_sizes() {
        assert_eq!(CellFormat::Occupancy.host_element_size(), 1);
        assert_eq!(CellFormat::Rgba32Float.host_element_size(), 16);
    }

    #[test]
    fn test_texel_sizes() {
        assert_eq!(CellFormat::Occupancy.texel_size(), 4);
        assert_eq!(CellFormat::Rgba32Float.texel_size(), 16);
    }

    #[test]
    fn test_host_len_widens_before_multiplying() {
        assert_eq!(host_len(UVec2::new(400, 400), CellFormat::Occupancy), 160_000);
        assert_eq!(
            host_len(UVec2::new(64, 64), CellFormat::Rgba32Float),
            64 * 64 * 16
        );
        // 100k x 100k cells overflows a u32 product.
        assert_eq!(
            host_len(UVec2::new(100_000, 100_000), CellFormat::Occupancy),
            10_000_000_000
        );
    }

    #[test]
    fn test_occupancy_maps_to_storage_capable_format() {
        assert_eq!(
            CellFormat::Occupancy.texture_format(),
            wgpu::TextureFormat::R32Uint
        );
    }
}
