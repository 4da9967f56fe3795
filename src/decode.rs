// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
Decoding browser-style images into [`PixelSource`]s.

PNG goes through the `png` crate directly; JPEG, GIF and WebP go through `image`.  Every
decoder produces tightly packed 8-bit RGBA.  Animated GIFs contribute their first frame.

```
use texture_transit::decode::{decode_image, ImageType};

let error = decode_image(b"definitely not a png", ImageType::Png).unwrap_err();
assert!(matches!(error, texture_transit::Error::DecodeFailure(_)));
```
*/

use crate::error::Error;
use crate::texture_data::PixelSource;
use std::io::Cursor;

/// Image types decoded on the caller's side, without a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageType {
    Png,
    Jpeg,
    Gif,
    WebP,
}

/// Decodes `bytes` into RGBA8 texels.
pub fn decode_image(bytes: &[u8], image_type: ImageType) -> Result<PixelSource, Error> {
    let _guard = logwise::perfwarn_begin!("decode_image");
    let source = match image_type {
        ImageType::Png => decode_png(bytes)?,
        ImageType::Jpeg => decode_with_image(bytes, image::ImageFormat::Jpeg)?,
        ImageType::Gif => decode_with_image(bytes, image::ImageFormat::Gif)?,
        ImageType::WebP => decode_with_image(bytes, image::ImageFormat::WebP)?,
    };
    logwise::trace_sync!(
        "decoded {kind} {width}x{height}",
        kind = logwise::privacy::LogIt(image_type),
        width = source.width,
        height = source.height
    );
    Ok(source)
}

fn decode_png(bytes: &[u8]) -> Result<PixelSource, Error> {
    let mut decoder = png::Decoder::new(Cursor::new(bytes));
    // palette and 16-bit images come out as 8-bit channels
    decoder.set_transformations(png::Transformations::EXPAND | png::Transformations::STRIP_16);
    let mut reader = decoder
        .read_info()
        .map_err(|e| Error::decode(format!("invalid PNG: {e}")))?;
    let size = reader
        .output_buffer_size()
        .ok_or_else(|| Error::decode("PNG is too large to decode"))?;
    let mut buf = vec![0; size];
    let info = reader
        .next_frame(&mut buf)
        .map_err(|e| Error::decode(format!("invalid PNG: {e}")))?;
    buf.truncate(info.buffer_size());
    let rgba = match info.color_type {
        png::ColorType::Rgba => buf,
        png::ColorType::Rgb => buf
            .chunks_exact(3)
            .flat_map(|p| [p[0], p[1], p[2], 255])
            .collect(),
        png::ColorType::GrayscaleAlpha => buf
            .chunks_exact(2)
            .flat_map(|p| [p[0], p[0], p[0], p[1]])
            .collect(),
        png::ColorType::Grayscale => buf.iter().flat_map(|&g| [g, g, g, 255]).collect(),
        png::ColorType::Indexed => {
            return Err(Error::decode("PNG palette was not expanded"));
        }
    };
    Ok(PixelSource {
        width: info.width,
        height: info.height,
        rgba,
    })
}

fn decode_with_image(bytes: &[u8], format: image::ImageFormat) -> Result<PixelSource, Error> {
    let decoded = image::load_from_memory_with_format(bytes, format)
        .map_err(|e| Error::decode(format!("invalid {format:?}: {e}")))?
        .to_rgba8();
    let (width, height) = decoded.dimensions();
    Ok(PixelSource {
        width,
        height,
        rgba: decoded.into_raw(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_png(width: u32, height: u32, color: png::ColorType, data: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        {
            let mut encoder = png::Encoder::new(&mut out, width, height);
            encoder.set_color(color);
            encoder.set_depth(png::BitDepth::Eight);
            let mut writer = encoder.write_header().unwrap();
            writer.write_image_data(data).unwrap();
        }
        out
    }

    #[test]
    fn rgba_png() {
        let texels = [1, 2, 3, 4, 5, 6, 7, 8];
        let png = encode_png(2, 1, png::ColorType::Rgba, &texels);
        let source = decode_image(&png, ImageType::Png).unwrap();
        assert_eq!((source.width, source.height), (2, 1));
        assert_eq!(source.rgba, texels);
    }

    #[test]
    fn rgb_and_gray_are_expanded() {
        let png = encode_png(1, 1, png::ColorType::Rgb, &[9, 8, 7]);
        assert_eq!(
            decode_image(&png, ImageType::Png).unwrap().rgba,
            vec![9, 8, 7, 255]
        );
        let png = encode_png(2, 1, png::ColorType::Grayscale, &[50, 60]);
        assert_eq!(
            decode_image(&png, ImageType::Png).unwrap().rgba,
            vec![50, 50, 50, 255, 60, 60, 60, 255]
        );
    }

    #[test]
    fn bad_jpeg() {
        assert!(matches!(
            decode_image(&[0xFF, 0xD8, 0x00], ImageType::Jpeg),
            Err(Error::DecodeFailure(_))
        ));
    }
}
