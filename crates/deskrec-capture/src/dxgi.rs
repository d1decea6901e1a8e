//! DXGI Desktop Duplication backend.
//!
//! One [`DxgiDevice`] owns a D3D11 device, an `IDXGIOutputDuplication` for the
//! bound output and a reusable CPU-readable staging texture.

use std::time::Duration;

use deskrec_core::{DeskrecError, PixelFormat, Result, Rotation, SurfaceDescriptor};
use tracing::{debug, info, warn};
use windows::{
    core::Interface,
    Win32::Graphics::{
        Direct3D::{
            D3D_DRIVER_TYPE, D3D_DRIVER_TYPE_HARDWARE, D3D_DRIVER_TYPE_REFERENCE,
            D3D_DRIVER_TYPE_WARP,
        },
        Direct3D11::{
            D3D11CreateDevice, ID3D11Device, ID3D11DeviceContext, ID3D11Texture2D,
            D3D11_CPU_ACCESS_READ, D3D11_CREATE_DEVICE_BGRA_SUPPORT,
            D3D11_MAPPED_SUBRESOURCE, D3D11_MAP_READ,
            D3D11_SDK_VERSION, D3D11_TEXTURE2D_DESC, D3D11_USAGE_STAGING,
        },
        Dxgi::{
            Common::{DXGI_FORMAT, DXGI_SAMPLE_DESC},
            IDXGIAdapter, IDXGIDevice, IDXGIOutput, IDXGIOutput1, IDXGIOutputDuplication,
            IDXGIResource, DXGI_ERROR_ACCESS_LOST, DXGI_ERROR_NOT_CURRENTLY_AVAILABLE,
            DXGI_ERROR_NOT_FOUND, DXGI_ERROR_WAIT_TIMEOUT, DXGI_OUTDUPL_DESC,
            DXGI_OUTDUPL_FRAME_INFO,
        },
    },
};

use crate::{Acquire, CaptureBackend, CaptureDevice, MappedFrame};

const DRIVER_TYPES: [(D3D_DRIVER_TYPE, &str); 3] = [
    (D3D_DRIVER_TYPE_HARDWARE, "hardware"),
    (D3D_DRIVER_TYPE_WARP, "warp"),
    (D3D_DRIVER_TYPE_REFERENCE, "reference"),
];

// ── DxgiBackend ───────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct DxgiBackend;

impl DxgiBackend {
    pub fn new() -> Self {
        Self
    }
}

impl CaptureBackend for DxgiBackend {
    fn name(&self) -> &'static str {
        "dxgi"
    }

    fn surfaces(&self) -> Result<Vec<String>> {
        let (device, _, _) = create_device()?;
        let adapter = adapter_of(&device)?;
        Ok(outputs(&adapter)?.into_iter().map(|(name, _)| name).collect())
    }

    fn open(&self, surface_id: &str) -> Result<Box<dyn CaptureDevice>> {
        let (device, context, driver) = create_device()?;
        let adapter = adapter_of(&device)?;

        let output = outputs(&adapter)?
            .into_iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(surface_id))
            .map(|(_, output)| output)
            .ok_or_else(|| DeskrecError::SurfaceNotFound { surface: surface_id.to_owned() })?;

        let output1: IDXGIOutput1 = output.cast().map_err(|e| device_error("IDXGIOutput1", e))?;
        let duplication = unsafe { output1.DuplicateOutput(&device) }.map_err(|e| {
            if e.code() == DXGI_ERROR_NOT_CURRENTLY_AVAILABLE {
                DeskrecError::DuplicationUnavailable {
                    reason: "too many applications are duplicating this output".into(),
                }
            } else {
                DeskrecError::DuplicationUnavailable { reason: format!("DuplicateOutput: {e}") }
            }
        })?;

        let mut desc = DXGI_OUTDUPL_DESC::default();
        unsafe { duplication.GetDesc(&mut desc) };

        let descriptor = SurfaceDescriptor::new(
            desc.ModeDesc.Width,
            desc.ModeDesc.Height,
            PixelFormat(desc.ModeDesc.Format.0 as u32),
            Rotation::from_dxgi(desc.Rotation.0),
        );
        info!(surface = surface_id, driver, "[DXGI] duplicating output: {descriptor}");

        let staging = create_staging_texture(&device, &descriptor, desc.ModeDesc.Format)?;

        Ok(Box::new(DxgiDevice {
            descriptor,
            duplication,
            context,
            staging,
            _device: device,
            held: false,
        }))
    }
}

// ── DxgiDevice ────────────────────────────────────────────────────────────────

pub(crate) struct DxgiDevice {
    descriptor:  SurfaceDescriptor,
    duplication: IDXGIOutputDuplication,
    context:     ID3D11DeviceContext,
    staging:     ID3D11Texture2D,
    _device:     ID3D11Device,
    held:        bool,
}

// SAFETY: the device is only ever used from one thread at a time; ownership
// moves to the acquisition thread and back, never shared.
unsafe impl Send for DxgiDevice {}

impl CaptureDevice for DxgiDevice {
    fn descriptor(&self) -> SurfaceDescriptor {
        self.descriptor
    }

    fn acquire_frame(
        &mut self,
        timeout: Duration,
        read: &mut dyn FnMut(MappedFrame<'_>),
    ) -> Result<Acquire> {
        let mut info = DXGI_OUTDUPL_FRAME_INFO::default();
        let mut resource: Option<IDXGIResource> = None;
        let timeout_ms = timeout.as_millis().min(u32::MAX as u128) as u32;

        if let Err(e) = unsafe { self.duplication.AcquireNextFrame(timeout_ms, &mut info, &mut resource) } {
            if e.code() == DXGI_ERROR_WAIT_TIMEOUT {
                return Ok(Acquire::TimedOut);
            }
            if e.code() == DXGI_ERROR_ACCESS_LOST {
                warn!("[DXGI] duplication access lost (mode change or secure desktop)");
            }
            return Err(device_error("AcquireNextFrame", e));
        }
        self.held = true;

        let resource = resource.ok_or_else(|| DeskrecError::DeviceError {
            reason: "AcquireNextFrame returned no desktop resource".into(),
        })?;
        let texture: ID3D11Texture2D = resource.cast().map_err(|e| device_error("ID3D11Texture2D", e))?;

        unsafe { self.context.CopyResource(&self.staging, &texture) };

        let mut mapped = D3D11_MAPPED_SUBRESOURCE::default();
        unsafe { self.context.Map(&self.staging, 0, D3D11_MAP_READ, 0, Some(&mut mapped)) }
            .map_err(|e| device_error("Map", e))?;

        let row_pitch = mapped.RowPitch as usize;
        let height = self.descriptor.height as usize;
        let len = row_pitch * height.saturating_sub(1) + self.descriptor.row_bytes();
        // SAFETY: Map succeeded, so pData points at `height` rows of `RowPitch`
        // bytes that stay valid until Unmap below.
        let data = unsafe { std::slice::from_raw_parts(mapped.pData as *const u8, len) };
        read(MappedFrame { data, row_pitch });

        unsafe { self.context.Unmap(&self.staging, 0) };
        Ok(Acquire::Frame)
    }

    fn release_frame(&mut self) -> Result<()> {
        if !self.held {
            return Err(DeskrecError::DeviceError { reason: "no frame held".into() });
        }
        self.held = false;
        unsafe { self.duplication.ReleaseFrame() }.map_err(|e| device_error("ReleaseFrame", e))
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn device_error(call: &str, e: windows::core::Error) -> DeskrecError {
    DeskrecError::DeviceError { reason: format!("{call}: {e}") }
}

/// Create a D3D11 device, falling back from hardware to WARP to reference.
fn create_device() -> Result<(ID3D11Device, ID3D11DeviceContext, &'static str)> {
    let mut last_error = None;
    for (driver_type, name) in DRIVER_TYPES {
        let mut device: Option<ID3D11Device> = None;
        let mut context: Option<ID3D11DeviceContext> = None;
        let created = unsafe {
            D3D11CreateDevice(
                None,
                driver_type,
                None,
                D3D11_CREATE_DEVICE_BGRA_SUPPORT,
                None,
                D3D11_SDK_VERSION,
                Some(&mut device),
                None,
                Some(&mut context),
            )
        };
        match (created, device, context) {
            (Ok(()), Some(device), Some(context)) => {
                debug!(driver = name, "[DXGI] D3D11 device created");
                return Ok((device, context, name));
            }
            (Err(e), _, _) => {
                debug!(driver = name, "[DXGI] D3D11CreateDevice failed: {e}");
                last_error = Some(e.to_string());
            }
            _ => last_error = Some(format!("{name} driver returned no device")),
        }
    }
    Err(DeskrecError::DeviceError {
        reason: format!(
            "D3D11CreateDevice failed for every driver type: {}",
            last_error.unwrap_or_default()
        ),
    })
}

fn adapter_of(device: &ID3D11Device) -> Result<IDXGIAdapter> {
    let dxgi_device: IDXGIDevice = device.cast().map_err(|e| device_error("IDXGIDevice", e))?;
    unsafe { dxgi_device.GetAdapter() }.map_err(|e| device_error("GetAdapter", e))
}

/// All outputs of `adapter` with their device names, in enumeration order.
fn outputs(adapter: &IDXGIAdapter) -> Result<Vec<(String, IDXGIOutput)>> {
    let mut found = Vec::new();
    for index in 0.. {
        let output = match unsafe { adapter.EnumOutputs(index) } {
            Ok(output) => output,
            Err(e) if e.code() == DXGI_ERROR_NOT_FOUND => break,
            Err(e) => return Err(device_error("EnumOutputs", e)),
        };
        let desc = unsafe { output.GetDesc() }.map_err(|e| device_error("GetDesc", e))?;
        let end = desc.DeviceName.iter().position(|&c| c == 0).unwrap_or(desc.DeviceName.len());
        found.push((String::from_utf16_lossy(&desc.DeviceName[..end]), output));
    }
    Ok(found)
}

fn create_staging_texture(
    device: &ID3D11Device,
    descriptor: &SurfaceDescriptor,
    format: DXGI_FORMAT,
) -> Result<ID3D11Texture2D> {
    let desc = D3D11_TEXTURE2D_DESC {
        Width:          descriptor.width,
        Height:         descriptor.height,
        MipLevels:      1,
        ArraySize:      1,
        Format:         format,
        SampleDesc:     DXGI_SAMPLE_DESC { Count: 1, Quality: 0 },
        Usage:          D3D11_USAGE_STAGING,
        BindFlags:      0,
        CPUAccessFlags: D3D11_CPU_ACCESS_READ.0 as u32,
        MiscFlags:      0,
    };
    let mut texture: Option<ID3D11Texture2D> = None;
    unsafe { device.CreateTexture2D(&desc, None, Some(&mut texture)) }
        .map_err(|e| device_error("CreateTexture2D", e))?;
    texture.ok_or_else(|| DeskrecError::DeviceError {
        reason: "CreateTexture2D returned no staging texture".into(),
    })
}
