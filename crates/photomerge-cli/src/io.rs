use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use image::codecs::jpeg::JpegEncoder;
use image::{ColorType, DynamicImage, ImageBuffer, ImageFormat, Rgb};
use ndarray::Array2;
use photomerge_core::color::{convert_depth, PixelLayout, RawFrame};
use photomerge_core::consts::MAX_NAME_COUNTER;
use photomerge_core::frame::{Frame, Mask, SampleDepth};

use crate::settings::{OutputDepth, OutputFormat, OutputSettings};

/// Base output name when no input gives a usable one.
pub const DEFAULT_NAME: &str = "output";

/// Decode an image file into an interleaved RGB(A) raw frame.
///
/// Grayscale and float images are expanded to RGB so they take part in the
/// merge like any colour photo.
pub fn load_raw_frame(path: &Path) -> Result<RawFrame> {
    let img = image::open(path).with_context(|| format!("Failed to decode {}", path.display()))?;
    let width = img.width() as usize;
    let height = img.height() as usize;

    let widen = |raw: &[u8]| raw.iter().map(|&v| u16::from(v)).collect::<Vec<u16>>();
    let (layout, bits, samples) = match &img {
        DynamicImage::ImageRgb8(buf) => (PixelLayout::Rgb, 8, widen(buf.as_raw())),
        DynamicImage::ImageRgba8(buf) => (PixelLayout::Rgba, 8, widen(buf.as_raw())),
        DynamicImage::ImageRgb16(buf) => (PixelLayout::Rgb, 16, buf.as_raw().clone()),
        DynamicImage::ImageRgba16(buf) => (PixelLayout::Rgba, 16, buf.as_raw().clone()),
        DynamicImage::ImageLuma8(_) | DynamicImage::ImageLumaA8(_) => {
            (PixelLayout::Rgb, 8, widen(img.to_rgb8().as_raw()))
        }
        _ => (PixelLayout::Rgb, 16, img.to_rgb16().into_raw()),
    };

    Ok(RawFrame {
        width,
        height,
        layout,
        bits,
        samples,
    })
}

/// Load a mask image. Pixels brighter than mid-gray are included.
pub fn load_mask(path: &Path) -> Result<Mask> {
    let img = image::open(path)
        .with_context(|| format!("Failed to decode mask {}", path.display()))?
        .to_luma8();
    let (w, h) = img.dimensions();
    let data = Array2::from_shape_fn((h as usize, w as usize), |(r, c)| {
        if img.get_pixel(c as u32, r as u32).0[0] > 127 {
            Mask::INCLUDED
        } else {
            Mask::EXCLUDED
        }
    });
    Ok(Mask::new(data))
}

/// Output base name: the first input's file stem, or [`DEFAULT_NAME`].
pub fn output_name(inputs: &[PathBuf]) -> String {
    inputs
        .first()
        .and_then(|p| p.file_stem())
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .map_or_else(|| DEFAULT_NAME.to_string(), str::to_string)
}

/// First free `<name>_<label>.<ext>` path in `dir`, trying `_001` .. `_998`
/// suffixes on collision. The last candidate is returned even if taken.
pub fn unique_path(dir: &Path, name: &str, label: &str, ext: &str) -> PathBuf {
    let mut path = dir.join(format!("{}_{}.{}", name, label, ext));
    let mut counter = 0;
    while path.exists() && counter < MAX_NAME_COUNTER {
        counter += 1;
        path = dir.join(format!("{}_{}_{:03}.{}", name, label, counter, ext));
    }
    path
}

fn target_depth(frame: &Frame, output: &OutputSettings) -> SampleDepth {
    match (output.format, output.depth) {
        (OutputFormat::Jpeg, _) | (_, OutputDepth::Bits8) => SampleDepth::Eight,
        (_, OutputDepth::Bits16) => SampleDepth::Sixteen,
        (_, OutputDepth::Auto) => frame.depth,
    }
}

fn write_frame(frame: &Frame, path: &Path, output: &OutputSettings) -> Result<()> {
    let frame = convert_depth(frame, target_depth(frame, output));
    let (w, h) = (frame.width() as u32, frame.height() as u32);

    match frame.depth {
        SampleDepth::Eight => {
            let pixels: Vec<u8> = frame.data.iter().map(|&v| v as u8).collect();
            let img = ImageBuffer::<Rgb<u8>, Vec<u8>>::from_raw(w, h, pixels)
                .context("Frame buffer does not match its dimensions")?;
            match output.format {
                OutputFormat::Jpeg => {
                    let file = File::create(path)
                        .with_context(|| format!("Failed to create {}", path.display()))?;
                    let mut encoder =
                        JpegEncoder::new_with_quality(BufWriter::new(file), output.jpeg_quality);
                    encoder.encode_image(&img)?;
                }
                OutputFormat::Png => img.save_with_format(path, ImageFormat::Png)?,
                OutputFormat::Tiff => img.save_with_format(path, ImageFormat::Tiff)?,
            }
        }
        SampleDepth::Sixteen => {
            let pixels: Vec<u16> = frame.data.iter().copied().collect();
            let img = ImageBuffer::<Rgb<u16>, Vec<u16>>::from_raw(w, h, pixels)
                .context("Frame buffer does not match its dimensions")?;
            let format = match output.format {
                OutputFormat::Tiff => ImageFormat::Tiff,
                _ => ImageFormat::Png,
            };
            img.save_with_format(path, format)?;
        }
    }
    Ok(())
}

/// Save every result frame as `<name>_<label>.<ext>` in the output directory.
pub fn save_output(
    frames: &[Frame],
    name: &str,
    label: &str,
    output: &OutputSettings,
) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(&output.directory)
        .with_context(|| format!("Failed to create {}", output.directory.display()))?;

    let mut saved = Vec::with_capacity(frames.len());
    for frame in frames {
        let path = unique_path(&output.directory, name, label, output.format.extension());
        write_frame(frame, &path, output)?;
        tracing::info!(path = %path.display(), "Saved result");
        saved.push(path);
    }
    Ok(saved)
}

pub fn describe_color(color: ColorType) -> &'static str {
    match color {
        ColorType::L8 | ColorType::L16 => "grayscale",
        ColorType::La8 | ColorType::La16 => "grayscale + alpha",
        ColorType::Rgb8 | ColorType::Rgb16 | ColorType::Rgb32F => "RGB",
        ColorType::Rgba8 | ColorType::Rgba16 | ColorType::Rgba32F => "RGBA",
        _ => "other",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient(depth: SampleDepth) -> Frame {
        let scale = u32::from(depth.max_value()) / 255;
        let data = ndarray::Array3::from_shape_fn((12, 16, 3), |(r, c, ch)| {
            ((r * 10 + c * 5 + ch * 20) as u32 * scale) as u16
        });
        Frame::new(data, depth).unwrap()
    }

    fn settings(dir: &Path, format: OutputFormat, depth: OutputDepth) -> OutputSettings {
        OutputSettings {
            format,
            depth,
            directory: dir.to_path_buf(),
            ..OutputSettings::default()
        }
    }

    #[test]
    fn test_collisions_get_a_counter() {
        let dir = tempfile::tempdir().unwrap();
        let output = settings(dir.path(), OutputFormat::Png, OutputDepth::Auto);
        let frame = gradient(SampleDepth::Eight);

        let saved = save_output(&[frame.clone(), frame.clone()], "scene", "hdr", &output).unwrap();
        let again = save_output(&[frame], "scene", "hdr", &output).unwrap();

        let names: Vec<_> = saved
            .iter()
            .chain(again.iter())
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, ["scene_hdr.png", "scene_hdr_001.png", "scene_hdr_002.png"]);
    }

    #[test]
    fn test_jpeg_is_always_8_bit() {
        let dir = tempfile::tempdir().unwrap();
        let output = settings(dir.path(), OutputFormat::Jpeg, OutputDepth::Bits16);
        let saved = save_output(&[gradient(SampleDepth::Sixteen)], "a", "longexposure_average", &output)
            .unwrap();
        assert_eq!(saved[0].extension().unwrap(), "jpeg");
        assert_eq!(image::open(&saved[0]).unwrap().color(), ColorType::Rgb8);
    }

    #[test]
    fn test_png_keeps_16_bit_samples() {
        let dir = tempfile::tempdir().unwrap();
        let output = settings(dir.path(), OutputFormat::Png, OutputDepth::Auto);
        let frame = gradient(SampleDepth::Sixteen);
        let saved = save_output(&[frame.clone()], "a", "align", &output).unwrap();

        let raw = load_raw_frame(&saved[0]).unwrap();
        assert_eq!(raw.bits, 16);
        assert_eq!(raw.layout, PixelLayout::Rgb);
        assert_eq!(raw.samples, frame.data.iter().copied().collect::<Vec<_>>());
    }

    #[test]
    fn test_grayscale_input_expands_to_rgb() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gray.png");
        image::GrayImage::from_fn(5, 4, |x, _| image::Luma([x as u8 * 40]))
            .save(&path)
            .unwrap();

        let raw = load_raw_frame(&path).unwrap();
        assert_eq!((raw.width, raw.height), (5, 4));
        assert_eq!(raw.layout, PixelLayout::Rgb);
        assert_eq!(raw.samples.len(), 5 * 4 * 3);
        assert_eq!(&raw.samples[3..6], &[40, 40, 40]);
    }

    #[test]
    fn test_mask_thresholds_at_mid_gray() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mask.png");
        image::GrayImage::from_fn(4, 2, |x, _| image::Luma([if x < 2 { 0 } else { 255 }]))
            .save(&path)
            .unwrap();

        let mask = load_mask(&path).unwrap();
        assert_eq!((mask.width(), mask.height()), (4, 2));
        assert!(!mask.includes(0, 1));
        assert!(mask.includes(1, 3));
    }

    #[test]
    fn test_output_name_from_first_input() {
        assert_eq!(output_name(&[PathBuf::from("/tmp/IMG_0042.jpg")]), "IMG_0042");
        assert_eq!(output_name(&[]), DEFAULT_NAME);
    }
}
