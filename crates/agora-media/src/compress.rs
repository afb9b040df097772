use std::io::{self, Cursor};
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, Rgb, RgbImage};
use tokio::process::Command;
use tracing::{info, warn};

use crate::classify::{FileKind, extension, mime_type};
use crate::Result;

/// Longest edge of a re-encoded image.
pub const MAX_DIMENSION: u32 = 1920;

#[derive(Debug, Clone)]
pub struct CompressionSettings {
    pub compress_images: bool,
    pub compress_videos: bool,
    pub image_quality: u8,
    pub video_crf: u8,
    pub ffmpeg: String,
    pub video_timeout: Duration,
}

impl Default for CompressionSettings {
    fn default() -> Self {
        Self {
            compress_images: true,
            compress_videos: true,
            image_quality: 85,
            video_crf: 28,
            ffmpeg: "ffmpeg".into(),
            video_timeout: Duration::from_secs(300),
        }
    }
}

/// An upload after optional compression.
#[derive(Debug, Clone)]
pub struct Processed {
    pub bytes: Vec<u8>,
    pub file_name: String,
    pub mime_type: String,
    pub compressed: bool,
}

impl Processed {
    fn original(bytes: Vec<u8>, file_name: &str) -> Self {
        Self {
            mime_type: mime_type(file_name),
            file_name: file_name.to_string(),
            bytes,
            compressed: false,
        }
    }
}

fn with_extension(file_name: &str, ext: &str) -> String {
    let stem = Path::new(file_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .unwrap_or("upload");
    format!("{}.{}", stem, ext)
}

/// Re-encodes an image as JPEG within [`MAX_DIMENSION`], flattening any
/// transparency onto white. Anything that fails to decode comes back untouched.
pub fn compress_image(bytes: Vec<u8>, file_name: &str, quality: u8) -> Processed {
    match encode_jpeg(&bytes, quality) {
        Ok(jpeg) => Processed {
            bytes: jpeg,
            file_name: with_extension(file_name, "jpg"),
            mime_type: "image/jpeg".into(),
            compressed: true,
        },
        Err(e) => {
            warn!("Image compression failed for {}: {}", file_name, e);
            Processed::original(bytes, file_name)
        }
    }
}

fn encode_jpeg(bytes: &[u8], quality: u8) -> image::ImageResult<Vec<u8>> {
    let img = image::load_from_memory(bytes)?;
    let (width, height) = img.dimensions();
    let img = if width.max(height) > MAX_DIMENSION {
        img.resize(MAX_DIMENSION, MAX_DIMENSION, FilterType::Lanczos3)
    } else {
        img
    };
    let rgb = flatten_on_white(&img);

    let mut out = Cursor::new(Vec::new());
    JpegEncoder::new_with_quality(&mut out, quality).encode_image(&rgb)?;
    Ok(out.into_inner())
}

fn flatten_on_white(img: &DynamicImage) -> RgbImage {
    let rgba = img.to_rgba8();
    RgbImage::from_fn(rgba.width(), rgba.height(), |x, y| {
        let [r, g, b, a] = rgba.get_pixel(x, y).0;
        let alpha = u32::from(a);
        let blend = |c: u8| ((u32::from(c) * alpha + 255 * (255 - alpha)) / 255) as u8;
        Rgb([blend(r), blend(g), blend(b)])
    })
}

/// Transcodes a video to H.264/AAC MP4 with the external encoder. Any failure,
/// including a missing encoder or a timeout, returns the original bytes.
pub async fn compress_video(bytes: Vec<u8>, file_name: &str, settings: &CompressionSettings) -> Processed {
    match transcode(&bytes, file_name, settings).await {
        Ok(mp4) => {
            info!("Compressed video {} from {} to {} bytes", file_name, bytes.len(), mp4.len());
            Processed {
                bytes: mp4,
                file_name: with_extension(file_name, "mp4"),
                mime_type: "video/mp4".into(),
                compressed: true,
            }
        }
        Err(e) => {
            warn!("Video compression failed for {}: {}", file_name, e);
            Processed::original(bytes, file_name)
        }
    }
}

async fn transcode(bytes: &[u8], file_name: &str, settings: &CompressionSettings) -> Result<Vec<u8>> {
    let dir = tempfile::tempdir()?;
    let input = dir
        .path()
        .join(format!("input.{}", extension(file_name).unwrap_or_else(|| "bin".into())));
    let output = dir.path().join("output.mp4");
    tokio::fs::write(&input, bytes).await?;

    let mut command = Command::new(&settings.ffmpeg);
    command
        .arg("-i")
        .arg(&input)
        .args(["-c:v", "libx264", "-crf"])
        .arg(settings.video_crf.to_string())
        .args(["-preset", "medium", "-c:a", "aac", "-b:a", "128k", "-movflags", "+faststart", "-y"])
        .arg(&output)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let run = tokio::time::timeout(settings.video_timeout, command.output())
        .await
        .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "encoder timed out"))??;
    if !run.status.success() {
        let stderr = String::from_utf8_lossy(&run.stderr);
        let tail = stderr.lines().last().unwrap_or_default();
        return Err(io::Error::other(format!("encoder exited with {}: {}", run.status, tail)).into());
    }
    Ok(tokio::fs::read(&output).await?)
}

/// Compresses an upload according to its kind and the settings. Kinds other
/// than image and video pass through.
pub async fn process_upload(
    kind: FileKind,
    bytes: Vec<u8>,
    file_name: &str,
    settings: &CompressionSettings,
) -> Processed {
    match kind {
        FileKind::Image if settings.compress_images => {
            let name = file_name.to_string();
            let quality = settings.image_quality;
            let fallback = bytes.clone();
            tokio::task::spawn_blocking(move || compress_image(bytes, &name, quality))
                .await
                .unwrap_or_else(|e| {
                    warn!("Image compression task failed: {}", e);
                    Processed::original(fallback, file_name)
                })
        }
        FileKind::Video if settings.compress_videos => compress_video(bytes, file_name, settings).await,
        _ => Processed::original(bytes, file_name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgba, RgbaImage};

    fn png(width: u32, height: u32, pixel: Rgba<u8>) -> Vec<u8> {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(width, height, pixel));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    #[test]
    fn large_image_is_bounded_and_becomes_jpeg() {
        let result = compress_image(png(3000, 1500, Rgba([10, 20, 30, 255])), "site.png", 85);
        assert!(result.compressed);
        assert_eq!(result.file_name, "site.jpg");
        assert_eq!(result.mime_type, "image/jpeg");

        let decoded = image::load_from_memory(&result.bytes).unwrap();
        assert_eq!(image::guess_format(&result.bytes).unwrap(), ImageFormat::Jpeg);
        assert_eq!(decoded.dimensions(), (1920, 960));
    }

    #[test]
    fn transparency_flattens_to_white() {
        let result = compress_image(png(4, 4, Rgba([0, 0, 0, 0])), "clear.png", 95);
        let decoded = image::load_from_memory(&result.bytes).unwrap().to_rgb8();
        let [r, g, b] = decoded.get_pixel(1, 1).0;
        assert!(r > 240 && g > 240 && b > 240);
    }

    #[test]
    fn non_image_falls_back() {
        let result = compress_image(b"%PDF-1.4".to_vec(), "scan.png", 85);
        assert!(!result.compressed);
        assert_eq!(result.bytes, b"%PDF-1.4");
        assert_eq!(result.file_name, "scan.png");
    }

    #[tokio::test]
    async fn missing_encoder_falls_back() {
        let settings = CompressionSettings {
            ffmpeg: "agora-no-such-encoder".into(),
            ..Default::default()
        };
        let result = compress_video(vec![1, 2, 3], "clip.mov", &settings).await;
        assert!(!result.compressed);
        assert_eq!(result.bytes, vec![1, 2, 3]);
        assert_eq!(result.file_name, "clip.mov");
    }

    #[tokio::test]
    async fn disabled_compression_passes_through() {
        let settings = CompressionSettings { compress_images: false, ..Default::default() };
        let bytes = png(10, 10, Rgba([1, 2, 3, 255]));
        let result = process_upload(FileKind::Image, bytes.clone(), "a.png", &settings).await;
        assert!(!result.compressed);
        assert_eq!(result.bytes, bytes);
        assert_eq!(result.mime_type, "image/png");
    }
}
