//! Direct3D 11 graphics binding: uploads each module's font atlas and draws
//! its imgui draw data onto the host's back buffer.
//!
//! The host's pipeline state is preserved by swapping in a private
//! `ID3DDeviceContextState` for the duration of the overlay pass.

use std::ffi::{c_void, CString};
use std::mem;

use imgui::internal::RawWrapper;
use imgui::{BackendFlags, DrawCmd, DrawCmdParams, DrawData, DrawIdx, DrawVert, TextureId};
use tracing::{debug, warn};
use windows::core::{s, Interface, PCSTR};
use windows::Win32::Foundation::{HWND, RECT};
use windows::Win32::Graphics::Direct3D::Fxc::{D3DCompile, D3DCOMPILE_ENABLE_STRICTNESS};
use windows::Win32::Graphics::Direct3D::{ID3DBlob, D3D_PRIMITIVE_TOPOLOGY_TRIANGLELIST};
use windows::Win32::Graphics::Direct3D11::*;
use windows::Win32::Graphics::Dxgi::Common::{
    DXGI_FORMAT_R16_UINT, DXGI_FORMAT_R32G32_FLOAT, DXGI_FORMAT_R8G8B8A8_UNORM, DXGI_SAMPLE_DESC,
};
use windows::Win32::Graphics::Dxgi::IDXGISwapChain;

use imstack_core::{DeviceObjects, GraphicsBinding};

use crate::context::ImguiContext;
use crate::Dx11Error;

const SHADER_SOURCE: &str = r#"
cbuffer Projection : register(b0) { float4x4 projection; };

struct VsInput { float2 pos : POSITION; float2 uv : TEXCOORD0; float4 col : COLOR0; };
struct PsInput { float4 pos : SV_POSITION; float4 col : COLOR0; float2 uv : TEXCOORD0; };

PsInput vs_main(VsInput input) {
    PsInput output;
    output.pos = mul(projection, float4(input.pos.xy, 0.f, 1.f));
    output.col = input.col;
    output.uv  = input.uv;
    return output;
}

sampler sampler0 : register(s0);
Texture2D texture0 : register(t0);

float4 ps_main(PsInput input) : SV_Target {
    return input.col * texture0.Sample(sampler0, input.uv);
}
"#;

const VERTEX_HEADROOM: usize = 5_000;
const INDEX_HEADROOM: usize = 10_000;

// ─── Helpers ─────────────────────────────────────────────────────────────────

unsafe fn compile(entry: &str, target: &str) -> Result<ID3DBlob, Dx11Error> {
    let entry = CString::new(entry).map_err(|e| Dx11Error::Shader(e.to_string()))?;
    let target = CString::new(target).map_err(|e| Dx11Error::Shader(e.to_string()))?;
    let mut blob: Option<ID3DBlob> = None;
    let mut errors: Option<ID3DBlob> = None;
    let result = D3DCompile(
        SHADER_SOURCE.as_ptr() as *const _,
        SHADER_SOURCE.len(),
        None,
        None,
        None,
        PCSTR(entry.as_ptr() as *const u8),
        PCSTR(target.as_ptr() as *const u8),
        D3DCOMPILE_ENABLE_STRICTNESS,
        0,
        &mut blob,
        Some(&mut errors),
    );
    if let Err(e) = result {
        let detail = errors
            .map(|errors| String::from_utf8_lossy(blob_bytes(&errors)).into_owned())
            .unwrap_or_else(|| e.to_string());
        return Err(Dx11Error::Shader(detail));
    }
    blob.ok_or(Dx11Error::Missing("D3DCompile"))
}

unsafe fn blob_bytes(blob: &ID3DBlob) -> &[u8] {
    std::slice::from_raw_parts(blob.GetBufferPointer() as *const u8, blob.GetBufferSize())
}

fn dynamic_buffer_desc(bytes: usize, bind: D3D11_BIND_FLAG) -> D3D11_BUFFER_DESC {
    D3D11_BUFFER_DESC {
        ByteWidth: bytes as u32,
        Usage: D3D11_USAGE_DYNAMIC,
        BindFlags: bind.0 as u32,
        CPUAccessFlags: D3D11_CPU_ACCESS_WRITE.0 as u32,
        MiscFlags: 0,
        StructureByteStride: 0,
    }
}

/// Orthographic projection covering the draw data's display rectangle.
fn projection(draw_data: &DrawData) -> [[f32; 4]; 4] {
    let l = draw_data.display_pos[0];
    let r = draw_data.display_pos[0] + draw_data.display_size[0];
    let t = draw_data.display_pos[1];
    let b = draw_data.display_pos[1] + draw_data.display_size[1];
    [
        [2.0 / (r - l), 0.0, 0.0, 0.0],
        [0.0, 2.0 / (t - b), 0.0, 0.0],
        [0.0, 0.0, 0.5, 0.0],
        [(r + l) / (l - r), (t + b) / (b - t), 0.5, 1.0],
    ]
}

/// Scissor rectangle of a command, or `None` when it clips everything.
fn scissor(clip_rect: [f32; 4], clip_off: [f32; 2]) -> Option<RECT> {
    let rect = RECT {
        left:   (clip_rect[0] - clip_off[0]) as i32,
        top:    (clip_rect[1] - clip_off[1]) as i32,
        right:  (clip_rect[2] - clip_off[0]) as i32,
        bottom: (clip_rect[3] - clip_off[1]) as i32,
    };
    (rect.right > rect.left && rect.bottom > rect.top).then_some(rect)
}

// ─── Pipeline ────────────────────────────────────────────────────────────────

struct Pipeline {
    vertex_shader: ID3D11VertexShader,
    pixel_shader:  ID3D11PixelShader,
    input_layout:  ID3D11InputLayout,
    constants:     ID3D11Buffer,
    sampler:       ID3D11SamplerState,
    blend:         ID3D11BlendState,
    rasterizer:    ID3D11RasterizerState,
    depth_stencil: ID3D11DepthStencilState,
}

impl Pipeline {
    unsafe fn new(device: &ID3D11Device) -> Result<Self, Dx11Error> {
        let vs_blob = compile("vs_main", "vs_4_0")?;
        let ps_blob = compile("ps_main", "ps_4_0")?;

        let mut vertex_shader = None;
        device.CreateVertexShader(blob_bytes(&vs_blob), None, Some(&mut vertex_shader))?;
        let mut pixel_shader = None;
        device.CreatePixelShader(blob_bytes(&ps_blob), None, Some(&mut pixel_shader))?;

        let elements = [
            D3D11_INPUT_ELEMENT_DESC {
                SemanticName: s!("POSITION"),
                SemanticIndex: 0,
                Format: DXGI_FORMAT_R32G32_FLOAT,
                InputSlot: 0,
                AlignedByteOffset: mem::offset_of!(DrawVert, pos) as u32,
                InputSlotClass: D3D11_INPUT_PER_VERTEX_DATA,
                InstanceDataStepRate: 0,
            },
            D3D11_INPUT_ELEMENT_DESC {
                SemanticName: s!("TEXCOORD"),
                SemanticIndex: 0,
                Format: DXGI_FORMAT_R32G32_FLOAT,
                InputSlot: 0,
                AlignedByteOffset: mem::offset_of!(DrawVert, uv) as u32,
                InputSlotClass: D3D11_INPUT_PER_VERTEX_DATA,
                InstanceDataStepRate: 0,
            },
            D3D11_INPUT_ELEMENT_DESC {
                SemanticName: s!("COLOR"),
                SemanticIndex: 0,
                Format: DXGI_FORMAT_R8G8B8A8_UNORM,
                InputSlot: 0,
                AlignedByteOffset: mem::offset_of!(DrawVert, col) as u32,
                InputSlotClass: D3D11_INPUT_PER_VERTEX_DATA,
                InstanceDataStepRate: 0,
            },
        ];
        let mut input_layout = None;
        device.CreateInputLayout(&elements, blob_bytes(&vs_blob), Some(&mut input_layout))?;

        let mut constants = None;
        device.CreateBuffer(
            &dynamic_buffer_desc(mem::size_of::<[[f32; 4]; 4]>(), D3D11_BIND_CONSTANT_BUFFER),
            None,
            Some(&mut constants),
        )?;

        let mut sampler = None;
        device.CreateSamplerState(
            &D3D11_SAMPLER_DESC {
                Filter: D3D11_FILTER_MIN_MAG_MIP_LINEAR,
                AddressU: D3D11_TEXTURE_ADDRESS_CLAMP,
                AddressV: D3D11_TEXTURE_ADDRESS_CLAMP,
                AddressW: D3D11_TEXTURE_ADDRESS_CLAMP,
                MipLODBias: 0.0,
                MaxAnisotropy: 1,
                ComparisonFunc: D3D11_COMPARISON_ALWAYS,
                BorderColor: [0.0; 4],
                MinLOD: 0.0,
                MaxLOD: 0.0,
            },
            Some(&mut sampler),
        )?;

        let mut blend_desc = D3D11_BLEND_DESC {
            AlphaToCoverageEnable: false.into(),
            IndependentBlendEnable: false.into(),
            ..Default::default()
        };
        blend_desc.RenderTarget[0] = D3D11_RENDER_TARGET_BLEND_DESC {
            BlendEnable: true.into(),
            SrcBlend: D3D11_BLEND_SRC_ALPHA,
            DestBlend: D3D11_BLEND_INV_SRC_ALPHA,
            BlendOp: D3D11_BLEND_OP_ADD,
            SrcBlendAlpha: D3D11_BLEND_ONE,
            DestBlendAlpha: D3D11_BLEND_INV_SRC_ALPHA,
            BlendOpAlpha: D3D11_BLEND_OP_ADD,
            RenderTargetWriteMask: D3D11_COLOR_WRITE_ENABLE_ALL.0 as u8,
        };
        let mut blend = None;
        device.CreateBlendState(&blend_desc, Some(&mut blend))?;

        let mut rasterizer = None;
        device.CreateRasterizerState(
            &D3D11_RASTERIZER_DESC {
                FillMode: D3D11_FILL_SOLID,
                CullMode: D3D11_CULL_NONE,
                ScissorEnable: true.into(),
                DepthClipEnable: true.into(),
                ..Default::default()
            },
            Some(&mut rasterizer),
        )?;

        let mut depth_stencil = None;
        device.CreateDepthStencilState(
            &D3D11_DEPTH_STENCIL_DESC {
                DepthEnable: false.into(),
                DepthWriteMask: D3D11_DEPTH_WRITE_MASK_ALL,
                DepthFunc: D3D11_COMPARISON_ALWAYS,
                StencilEnable: false.into(),
                FrontFace: D3D11_DEPTH_STENCILOP_DESC {
                    StencilFailOp: D3D11_STENCIL_OP_KEEP,
                    StencilDepthFailOp: D3D11_STENCIL_OP_KEEP,
                    StencilPassOp: D3D11_STENCIL_OP_KEEP,
                    StencilFunc: D3D11_COMPARISON_ALWAYS,
                },
                BackFace: D3D11_DEPTH_STENCILOP_DESC {
                    StencilFailOp: D3D11_STENCIL_OP_KEEP,
                    StencilDepthFailOp: D3D11_STENCIL_OP_KEEP,
                    StencilPassOp: D3D11_STENCIL_OP_KEEP,
                    StencilFunc: D3D11_COMPARISON_ALWAYS,
                },
                ..Default::default()
            },
            Some(&mut depth_stencil),
        )?;

        Ok(Self {
            vertex_shader: vertex_shader.ok_or(Dx11Error::Missing("CreateVertexShader"))?,
            pixel_shader:  pixel_shader.ok_or(Dx11Error::Missing("CreatePixelShader"))?,
            input_layout:  input_layout.ok_or(Dx11Error::Missing("CreateInputLayout"))?,
            constants:     constants.ok_or(Dx11Error::Missing("CreateBuffer"))?,
            sampler:       sampler.ok_or(Dx11Error::Missing("CreateSamplerState"))?,
            blend:         blend.ok_or(Dx11Error::Missing("CreateBlendState"))?,
            rasterizer:    rasterizer.ok_or(Dx11Error::Missing("CreateRasterizerState"))?,
            depth_stencil: depth_stencil.ok_or(Dx11Error::Missing("CreateDepthStencilState"))?,
        })
    }
}

// ─── Geometry buffers ────────────────────────────────────────────────────────

#[derive(Default)]
struct Geometry {
    vertices:       Option<ID3D11Buffer>,
    vertex_capacity: usize,
    indices:        Option<ID3D11Buffer>,
    index_capacity: usize,
}

impl Geometry {
    /// Grow the dynamic buffers so they hold at least the given counts.
    unsafe fn reserve(&mut self, device: &ID3D11Device, vertices: usize, indices: usize) -> Result<(), Dx11Error> {
        if self.vertices.is_none() || self.vertex_capacity < vertices {
            let capacity = vertices + VERTEX_HEADROOM;
            let mut buffer = None;
            device.CreateBuffer(
                &dynamic_buffer_desc(capacity * mem::size_of::<DrawVert>(), D3D11_BIND_VERTEX_BUFFER),
                None,
                Some(&mut buffer),
            )?;
            self.vertices = buffer;
            self.vertex_capacity = capacity;
        }
        if self.indices.is_none() || self.index_capacity < indices {
            let capacity = indices + INDEX_HEADROOM;
            let mut buffer = None;
            device.CreateBuffer(
                &dynamic_buffer_desc(capacity * mem::size_of::<DrawIdx>(), D3D11_BIND_INDEX_BUFFER),
                None,
                Some(&mut buffer),
            )?;
            self.indices = buffer;
            self.index_capacity = capacity;
        }
        Ok(())
    }
}

// ─── D3D11Renderer ───────────────────────────────────────────────────────────

pub struct D3D11Renderer {
    device:     ID3D11Device,
    context:    ID3D11DeviceContext,
    swap_chain: IDXGISwapChain,
    window:     HWND,
    pipeline:   Pipeline,
    geometry:   Geometry,
    target:     Option<ID3D11RenderTargetView>,
    /// Private pipeline state, swapped in while drawing.
    overlay_state: Option<ID3DDeviceContextState>,
    /// The host's state while ours is swapped in.
    host_state:    Option<ID3DDeviceContextState>,
}

// Only used from the host's render thread, under the backend's renderer lock.
unsafe impl Send for D3D11Renderer {}

impl std::fmt::Debug for D3D11Renderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("D3D11Renderer")
            .field("window", &self.window)
            .field("has_target", &self.target.is_some())
            .field("vertex_capacity", &self.geometry.vertex_capacity)
            .field("index_capacity", &self.geometry.index_capacity)
            .finish_non_exhaustive()
    }
}

impl D3D11Renderer {
    /// Build the shared pipeline on the device behind `swap_chain`.
    ///
    /// # Safety
    ///
    /// Must be called on the thread that presents `swap_chain`.
    pub unsafe fn new(swap_chain: &IDXGISwapChain) -> Result<Self, Dx11Error> {
        let desc = swap_chain.GetDesc()?;
        let device: ID3D11Device = swap_chain.GetDevice()?;
        let context = device.GetImmediateContext()?;
        let pipeline = Pipeline::new(&device)?;
        let overlay_state = match create_state_block(&device) {
            Ok(state) => Some(state),
            Err(e) => {
                warn!("no device context state available, host state will not be preserved: {e}");
                None
            }
        };
        debug!(
            "d3d11 renderer ready: {}x{} buffers, window {:?}",
            desc.BufferDesc.Width, desc.BufferDesc.Height, desc.OutputWindow
        );
        Ok(Self {
            device,
            context,
            swap_chain: swap_chain.clone(),
            window: desc.OutputWindow,
            pipeline,
            geometry: Geometry::default(),
            target: None,
            overlay_state,
            host_state: None,
        })
    }

    /// The window the swap chain presents to.
    pub fn window(&self) -> HWND {
        self.window
    }

    pub(crate) fn presents_to(&self, swap_chain: *mut std::ffi::c_void) -> bool {
        self.swap_chain.as_raw() == swap_chain
    }

    /// Whether `swap_chain` is the one this renderer draws on. A new swap
    /// chain on the same device is adopted; one on another device is not.
    pub(crate) fn adopt(&mut self, swap_chain: &IDXGISwapChain) -> bool {
        if swap_chain.as_raw() == self.swap_chain.as_raw() {
            return true;
        }
        let same_device = unsafe { swap_chain.GetDevice::<ID3D11Device>() }
            .map(|device| device.as_raw() == self.device.as_raw())
            .unwrap_or(false);
        if same_device {
            debug!("adopting a new swap chain on the same device");
            self.swap_chain = swap_chain.clone();
            self.target = None;
        }
        same_device
    }

    fn create_target(&mut self) -> Result<(), Dx11Error> {
        unsafe {
            let back_buffer: ID3D11Texture2D = self.swap_chain.GetBuffer(0)?;
            let mut target = None;
            self.device.CreateRenderTargetView(&back_buffer, None, Some(&mut target))?;
            self.target = Some(target.ok_or(Dx11Error::Missing("CreateRenderTargetView"))?);
        }
        Ok(())
    }

    /// Swap in the overlay state and bind the back buffer.
    pub(crate) fn begin(&mut self) -> Result<(), Dx11Error> {
        if self.target.is_none() {
            self.create_target()?;
        }
        unsafe {
            if let (Some(ours), Ok(context1)) =
                (self.overlay_state.as_ref(), self.context.cast::<ID3D11DeviceContext1>())
            {
                let mut previous = None;
                context1.SwapDeviceContextState(ours, Some(&mut previous));
                self.host_state = previous;
            }
            self.context.OMSetRenderTargets(Some(&[self.target.clone()]), None);
        }
        Ok(())
    }

    /// Unbind the back buffer and give the host its state back.
    pub(crate) fn end(&mut self) {
        unsafe {
            // A bound view would keep the back buffer alive across ResizeBuffers.
            self.context.OMSetRenderTargets(None, None);
            if let (Some(host), Ok(context1)) =
                (self.host_state.take(), self.context.cast::<ID3D11DeviceContext1>())
            {
                context1.SwapDeviceContextState(&host, None);
            }
        }
    }

    unsafe fn upload_fonts(&self, ctx: &mut ImguiContext) -> Result<(), Dx11Error> {
        let device = self.device.clone();
        let view = ctx.with_context(|imgui| -> Result<ID3D11ShaderResourceView, Dx11Error> {
            let fonts = imgui.fonts();
            let view = {
                let atlas = fonts.build_rgba32_texture();
                create_texture(&device, atlas.width, atlas.height, atlas.data)?
            };
            fonts.tex_id = TextureId::from(view.as_raw() as usize);
            Ok(view)
        })??;
        ctx.font_texture = Some(view);
        Ok(())
    }

    fn setup_render_state(&self, draw_data: &DrawData) {
        let stride = mem::size_of::<DrawVert>() as u32;
        let offset = 0u32;
        let viewport = D3D11_VIEWPORT {
            TopLeftX: 0.0,
            TopLeftY: 0.0,
            Width: draw_data.display_size[0],
            Height: draw_data.display_size[1],
            MinDepth: 0.0,
            MaxDepth: 1.0,
        };
        let p = &self.pipeline;
        unsafe {
            let ctx = &self.context;
            ctx.RSSetViewports(Some(&[viewport]));
            ctx.IASetInputLayout(&p.input_layout);
            ctx.IASetVertexBuffers(0, 1, Some(&self.geometry.vertices.clone()), Some(&stride), Some(&offset));
            ctx.IASetIndexBuffer(self.geometry.indices.as_ref(), DXGI_FORMAT_R16_UINT, 0);
            ctx.IASetPrimitiveTopology(D3D_PRIMITIVE_TOPOLOGY_TRIANGLELIST);
            ctx.VSSetShader(&p.vertex_shader, None);
            ctx.VSSetConstantBuffers(0, Some(&[Some(p.constants.clone())]));
            ctx.PSSetShader(&p.pixel_shader, None);
            ctx.PSSetSamplers(0, Some(&[Some(p.sampler.clone())]));
            ctx.GSSetShader(None::<&ID3D11GeometryShader>, None);
            ctx.HSSetShader(None::<&ID3D11HullShader>, None);
            ctx.DSSetShader(None::<&ID3D11DomainShader>, None);
            ctx.CSSetShader(None::<&ID3D11ComputeShader>, None);
            ctx.OMSetBlendState(&p.blend, Some(&[0.0; 4]), 0xffff_ffff);
            ctx.OMSetDepthStencilState(&p.depth_stencil, 0);
            ctx.RSSetState(&p.rasterizer);
        }
    }

    unsafe fn upload_geometry(&mut self, draw_data: &DrawData) -> Result<(), Dx11Error> {
        self.geometry.reserve(
            &self.device,
            draw_data.total_vtx_count as usize,
            draw_data.total_idx_count as usize,
        )?;
        let (Some(vertices), Some(indices)) = (&self.geometry.vertices, &self.geometry.indices) else {
            return Err(Dx11Error::Missing("CreateBuffer"));
        };

        let mut vtx_map = D3D11_MAPPED_SUBRESOURCE::default();
        self.context.Map(vertices, 0, D3D11_MAP_WRITE_DISCARD, 0, Some(&mut vtx_map))?;
        let mut idx_map = D3D11_MAPPED_SUBRESOURCE::default();
        if let Err(e) = self.context.Map(indices, 0, D3D11_MAP_WRITE_DISCARD, 0, Some(&mut idx_map)) {
            self.context.Unmap(vertices, 0);
            return Err(e.into());
        }
        let mut vtx_dst = vtx_map.pData as *mut DrawVert;
        let mut idx_dst = idx_map.pData as *mut DrawIdx;
        for list in draw_data.draw_lists() {
            let vtx = list.vtx_buffer();
            let idx = list.idx_buffer();
            std::ptr::copy_nonoverlapping(vtx.as_ptr(), vtx_dst, vtx.len());
            std::ptr::copy_nonoverlapping(idx.as_ptr(), idx_dst, idx.len());
            vtx_dst = vtx_dst.add(vtx.len());
            idx_dst = idx_dst.add(idx.len());
        }
        self.context.Unmap(indices, 0);
        self.context.Unmap(vertices, 0);

        let mut cb_map = D3D11_MAPPED_SUBRESOURCE::default();
        self.context.Map(&self.pipeline.constants, 0, D3D11_MAP_WRITE_DISCARD, 0, Some(&mut cb_map))?;
        std::ptr::write(cb_map.pData as *mut [[f32; 4]; 4], projection(draw_data));
        self.context.Unmap(&self.pipeline.constants, 0);
        Ok(())
    }

    unsafe fn render_draw_data(&mut self, draw_data: &DrawData) -> Result<(), Dx11Error> {
        if draw_data.display_size[0] <= 0.0 || draw_data.display_size[1] <= 0.0 || draw_data.total_vtx_count <= 0 {
            return Ok(());
        }
        self.upload_geometry(draw_data)?;
        self.setup_render_state(draw_data);

        let clip_off = draw_data.display_pos;
        let mut vtx_base = 0usize;
        let mut idx_base = 0usize;
        for list in draw_data.draw_lists() {
            for cmd in list.commands() {
                match cmd {
                    DrawCmd::Elements {
                        count,
                        cmd_params: DrawCmdParams { clip_rect, texture_id, vtx_offset, idx_offset },
                    } => {
                        let Some(rect) = scissor(clip_rect, clip_off) else {
                            continue;
                        };
                        let raw = texture_id.id() as *mut c_void;
                        let view = ID3D11ShaderResourceView::from_raw_borrowed(&raw).cloned();
                        self.context.RSSetScissorRects(Some(&[rect]));
                        self.context.PSSetShaderResources(0, Some(&[view]));
                        self.context.DrawIndexed(
                            count as u32,
                            (idx_base + idx_offset) as u32,
                            (vtx_base + vtx_offset) as i32,
                        );
                    }
                    DrawCmd::ResetRenderState => self.setup_render_state(draw_data),
                    DrawCmd::RawCallback { callback, raw_cmd } => callback(list.raw(), raw_cmd),
                }
            }
            vtx_base += list.vtx_buffer().len();
            idx_base += list.idx_buffer().len();
        }
        Ok(())
    }
}

unsafe fn create_state_block(device: &ID3D11Device) -> Result<ID3DDeviceContextState, Dx11Error> {
    let device1: ID3D11Device1 = device.cast()?;
    let levels = [device.GetFeatureLevel()];
    let mut state = None;
    device1.CreateDeviceContextState(
        0,
        &levels,
        D3D11_SDK_VERSION,
        &ID3D11Device::IID,
        None,
        Some(&mut state),
    )?;
    state.ok_or(Dx11Error::Missing("CreateDeviceContextState"))
}

unsafe fn create_texture(
    device: &ID3D11Device,
    width: u32,
    height: u32,
    rgba: &[u8],
) -> Result<ID3D11ShaderResourceView, Dx11Error> {
    let desc = D3D11_TEXTURE2D_DESC {
        Width: width,
        Height: height,
        MipLevels: 1,
        ArraySize: 1,
        Format: DXGI_FORMAT_R8G8B8A8_UNORM,
        SampleDesc: DXGI_SAMPLE_DESC { Count: 1, Quality: 0 },
        Usage: D3D11_USAGE_DEFAULT,
        BindFlags: D3D11_BIND_SHADER_RESOURCE.0 as u32,
        CPUAccessFlags: 0,
        MiscFlags: 0,
    };
    let init = D3D11_SUBRESOURCE_DATA {
        pSysMem: rgba.as_ptr() as *const _,
        SysMemPitch: width * 4,
        SysMemSlicePitch: 0,
    };
    let mut texture = None;
    device.CreateTexture2D(&desc, Some(&init), Some(&mut texture))?;
    let texture = texture.ok_or(Dx11Error::Missing("CreateTexture2D"))?;
    let mut view = None;
    device.CreateShaderResourceView(&texture, None, Some(&mut view))?;
    view.ok_or(Dx11Error::Missing("CreateShaderResourceView"))
}

// ─── Bindings ────────────────────────────────────────────────────────────────

impl GraphicsBinding<ImguiContext> for D3D11Renderer {
    fn init_context(&mut self, ctx: &mut ImguiContext) -> anyhow::Result<()> {
        ctx.with_context(|imgui| {
            imgui.set_renderer_name(Some(format!("imstack-dx11 {}", env!("CARGO_PKG_VERSION"))));
            imgui.io_mut().backend_flags.insert(BackendFlags::RENDERER_HAS_VTX_OFFSET);
        })?;
        unsafe { self.upload_fonts(ctx)? };
        Ok(())
    }

    fn new_frame(&mut self, ctx: &mut ImguiContext) -> anyhow::Result<()> {
        // Fonts added by the module after init invalidate the atlas.
        let built = ctx.with_context(|imgui| imgui.fonts().is_built())?;
        if !built || ctx.font_texture.is_none() {
            unsafe { self.upload_fonts(ctx)? };
        }
        Ok(())
    }

    fn submit(&mut self, ctx: &mut ImguiContext) -> anyhow::Result<()> {
        if self.target.is_none() {
            return Ok(());
        }
        if let Some(draw_data) = ctx.draw_data() {
            unsafe { self.render_draw_data(draw_data)? };
        }
        Ok(())
    }

    fn shutdown_context(&mut self, ctx: &mut ImguiContext) {
        ctx.font_texture = None;
        let _ = ctx.with_context(|imgui| {
            imgui.fonts().tex_id = TextureId::from(0usize);
            imgui.set_renderer_name(None);
        });
    }
}

impl DeviceObjects for D3D11Renderer {
    fn invalidate_device_objects(&mut self) {
        self.target = None;
    }

    fn create_device_objects(&mut self) -> anyhow::Result<()> {
        self.create_target()?;
        Ok(())
    }
}
