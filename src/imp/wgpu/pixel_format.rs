// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
use crate::pixel_formats::PixelFormat;

/// The wgpu format carrying `format`, if wgpu has one.
///
/// ETC1 is a subset of ETC2 RGB8, so ETC1 payloads upload as ETC2.  wgpu has no 16-bit
/// packed RGB or PVRTC formats.
pub(crate) const fn wgpu_format(format: PixelFormat) -> Option<wgpu::TextureFormat> {
    use wgpu::TextureFormat as T;
    match format {
        PixelFormat::Rgba8Unorm => Some(T::Rgba8Unorm),
        PixelFormat::Rgba8UnormSrgb => Some(T::Rgba8UnormSrgb),
        PixelFormat::Rgb565Unorm => None,
        PixelFormat::Bc1RgbaUnorm => Some(T::Bc1RgbaUnorm),
        PixelFormat::Bc1RgbaUnormSrgb => Some(T::Bc1RgbaUnormSrgb),
        PixelFormat::Bc2RgbaUnorm => Some(T::Bc2RgbaUnorm),
        PixelFormat::Bc3RgbaUnorm => Some(T::Bc3RgbaUnorm),
        PixelFormat::Bc7RgbaUnorm => Some(T::Bc7RgbaUnorm),
        PixelFormat::Bc7RgbaUnormSrgb => Some(T::Bc7RgbaUnormSrgb),
        PixelFormat::Etc1RgbUnorm => Some(T::Etc2Rgb8Unorm),
        PixelFormat::Etc2Rgb8Unorm => Some(T::Etc2Rgb8Unorm),
        PixelFormat::Etc2Rgba8Unorm => Some(T::Etc2Rgba8Unorm),
        PixelFormat::Astc4x4Unorm => Some(T::Astc {
            block: wgpu::AstcBlock::B4x4,
            channel: wgpu::AstcChannel::Unorm,
        }),
        PixelFormat::Pvrtc1Rgb4bpp | PixelFormat::Pvrtc1Rgba4bpp => None,
    }
}

/// Formats usable on a device with `features`, in table order.
pub(crate) fn supported_formats(features: wgpu::Features) -> Vec<PixelFormat> {
    PixelFormat::ALL
        .into_iter()
        .filter(|f| match wgpu_format(*f) {
            Some(t) => features.contains(t.required_features()),
            None => false,
        })
        .collect()
}

/// The compression features the adapter offers that we can make use of.
pub(crate) fn wanted_features(adapter_features: wgpu::Features) -> wgpu::Features {
    adapter_features
        & (wgpu::Features::TEXTURE_COMPRESSION_BC
            | wgpu::Features::TEXTURE_COMPRESSION_ETC2
            | wgpu::Features::TEXTURE_COMPRESSION_ASTC)
}
