//! Pixel format knowledge and negotiated image layouts.
//!
//! This module holds the static format table (color model classification,
//! bytes per pixel, exact buffer-size formulas), the padding rules that turn
//! a requested width/height into a row stride and padded row count
//! ("elevation"), and the [`VideoCaps`] capability descriptor handed to the
//! transform backend during negotiation.
//!
//! # Design Principles
//!
//! - **Type safety**: formats are a closed enum, not strings; unknown labels
//!   are rejected at the parsing boundary
//! - **Static knowledge**: every table is `const` data, shared freely across
//!   concurrent jobs without locking
//! - **Exact arithmetic**: buffer sizes dispatch per label, since rounding
//!   granularity differs even within one color model

use crate::error::{Error, Result};

/// Round `n` up to the next multiple of `k` (`k` must be a power of two).
///
/// Idempotent, and never smaller than `n`:
///
/// ```rust
/// use reframe::format::round_up;
///
/// assert_eq!(round_up(170, 4), 172);
/// assert_eq!(round_up(172, 4), 172);
/// assert_eq!(round_up(0, 8), 0);
/// ```
pub const fn round_up(n: u32, k: u32) -> u32 {
    (n + k - 1) & !(k - 1)
}

// ============================================================================
// Color models
// ============================================================================

/// Classification of a pixel format's channel layout.
///
/// The color model alone decides the stride/elevation padding rule; the
/// exact byte count of a frame additionally depends on the concrete format.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ColorModel {
    /// Planar or packed YUV.
    Yuv,
    /// Packed RGB without alpha (16 or 24 bits per pixel).
    Rgb,
    /// Packed RGB with alpha (32 bits per pixel).
    Rgba,
    /// Packed RGB with a padding byte instead of alpha (e.g. BGRX).
    ///
    /// This model carries no row-padding rule; formats classified here can
    /// be sized but not resolved into a padded layout.
    PackedRgbx,
}

// ============================================================================
// Pixel formats
// ============================================================================

/// A supported pixel format label.
///
/// Each variant corresponds to one canonical label (`"I420"`,
/// `"RGBA8888"`, ...). Parse labels with [`PixelFormat::from_label`] or
/// [`str::parse`]; anything outside this table fails with
/// [`Error::UnknownFormat`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// YUV 4:2:0 planar (Y plane, then U plane, then V plane).
    I420,
    /// YUV 4:2:0 planar with swapped chroma planes.
    Yv12,
    /// YUV 4:2:2 planar.
    Y42b,
    /// YUV 4:2:2 planar, alternate label with Y42B semantics.
    Yuv422,
    /// YUV 4:4:4 planar.
    Y444,
    /// YUV 4:2:0 semi-planar (Y plane, then interleaved UV plane).
    Nv12,
    /// YUV 4:2:2 packed (U Y0 V Y1).
    Uyvy,
    /// YUV 4:2:2 packed (Y0 U Y1 V).
    Yuyv,
    /// RGB 5:6:5, 16 bits per pixel.
    Rgb565,
    /// RGB 8-bit per channel, 24 bits per pixel.
    Rgb888,
    /// BGR 8-bit per channel, 24 bits per pixel.
    Bgr888,
    /// ARGB 8-bit per channel, 32 bits per pixel.
    Argb8888,
    /// BGRA 8-bit per channel, 32 bits per pixel.
    Bgra8888,
    /// RGBA 8-bit per channel, 32 bits per pixel.
    Rgba8888,
    /// ABGR 8-bit per channel, 32 bits per pixel.
    Abgr8888,
    /// BGR with a padding byte, 32 bits per pixel.
    Bgrx,
}

impl PixelFormat {
    /// Every supported format, in table order.
    pub const ALL: [PixelFormat; 16] = [
        PixelFormat::I420,
        PixelFormat::Yv12,
        PixelFormat::Y42b,
        PixelFormat::Yuv422,
        PixelFormat::Y444,
        PixelFormat::Nv12,
        PixelFormat::Uyvy,
        PixelFormat::Yuyv,
        PixelFormat::Rgb565,
        PixelFormat::Rgb888,
        PixelFormat::Bgr888,
        PixelFormat::Argb8888,
        PixelFormat::Bgra8888,
        PixelFormat::Rgba8888,
        PixelFormat::Abgr8888,
        PixelFormat::Bgrx,
    ];

    /// The canonical label for this format.
    pub const fn label(self) -> &'static str {
        match self {
            PixelFormat::I420 => "I420",
            PixelFormat::Yv12 => "YV12",
            PixelFormat::Y42b => "Y42B",
            PixelFormat::Yuv422 => "YUV422",
            PixelFormat::Y444 => "Y444",
            PixelFormat::Nv12 => "NV12",
            PixelFormat::Uyvy => "UYVY",
            PixelFormat::Yuyv => "YUYV",
            PixelFormat::Rgb565 => "RGB565",
            PixelFormat::Rgb888 => "RGB888",
            PixelFormat::Bgr888 => "BGR888",
            PixelFormat::Argb8888 => "ARGB8888",
            PixelFormat::Bgra8888 => "BGRA8888",
            PixelFormat::Rgba8888 => "RGBA8888",
            PixelFormat::Abgr8888 => "ABGR8888",
            PixelFormat::Bgrx => "BGRX",
        }
    }

    /// Parse a canonical label.
    pub fn from_label(label: &str) -> Result<Self> {
        for format in Self::ALL {
            if format.label() == label {
                return Ok(format);
            }
        }
        Err(Error::UnknownFormat(label.to_string()))
    }

    /// The format name used during backend negotiation.
    ///
    /// Identical to [`label`](Self::label) except for YUYV, which backends
    /// know under the name `YVYU`.
    pub const fn backend_name(self) -> &'static str {
        match self {
            PixelFormat::Yuyv => "YVYU",
            other => other.label(),
        }
    }

    /// The color model this format belongs to.
    pub const fn color_model(self) -> ColorModel {
        match self {
            PixelFormat::I420
            | PixelFormat::Yv12
            | PixelFormat::Y42b
            | PixelFormat::Yuv422
            | PixelFormat::Y444
            | PixelFormat::Nv12
            | PixelFormat::Uyvy
            | PixelFormat::Yuyv => ColorModel::Yuv,
            PixelFormat::Rgb565 | PixelFormat::Rgb888 | PixelFormat::Bgr888 => ColorModel::Rgb,
            PixelFormat::Argb8888
            | PixelFormat::Bgra8888
            | PixelFormat::Rgba8888
            | PixelFormat::Abgr8888 => ColorModel::Rgba,
            PixelFormat::Bgrx => ColorModel::PackedRgbx,
        }
    }

    /// Bytes per pixel for packed RGB-family formats.
    ///
    /// Planar YUV formats report 1 (the Y-plane sample width); their real
    /// frame size comes from [`buffer_size`](Self::buffer_size).
    pub const fn bytes_per_pixel(self) -> u32 {
        match self {
            PixelFormat::Rgb565 => 2,
            PixelFormat::Rgb888 | PixelFormat::Bgr888 => 3,
            PixelFormat::Argb8888
            | PixelFormat::Bgra8888
            | PixelFormat::Rgba8888
            | PixelFormat::Abgr8888
            | PixelFormat::Bgrx => 4,
            _ => 1,
        }
    }

    /// Exact frame size in bytes for a `width` × `height` image.
    ///
    /// The formula dispatches per label: rounding granularity differs even
    /// between formats of the same color model, and the 32-bit RGBA family
    /// applies no rounding at all.
    ///
    /// ```rust
    /// use reframe::format::PixelFormat;
    ///
    /// assert_eq!(PixelFormat::I420.buffer_size(160, 120), 28_800);
    /// assert_eq!(PixelFormat::Rgb888.buffer_size(170, 100), 51_600);
    /// assert_eq!(PixelFormat::Rgba8888.buffer_size(64, 64), 16_384);
    /// ```
    pub const fn buffer_size(self, width: u32, height: u32) -> usize {
        let w = width as usize;
        let h = height as usize;
        let w2 = round_up(width, 2) as usize;
        let w4 = round_up(width, 4) as usize;
        let w8 = round_up(width, 8) as usize;
        let h2 = round_up(height, 2) as usize;
        match self {
            PixelFormat::I420 | PixelFormat::Yv12 => w4 * h2 + w8 * h2 / 2,
            PixelFormat::Y42b | PixelFormat::Yuv422 => w4 * h + w8 * h,
            PixelFormat::Y444 => w4 * h * 3,
            PixelFormat::Nv12 => w4 * h2 * 3 / 2,
            PixelFormat::Rgb565 => w4 * 2 * h,
            PixelFormat::Rgb888 | PixelFormat::Bgr888 => w4 * 3 * h,
            PixelFormat::Uyvy | PixelFormat::Yuyv => w2 * 2 * h,
            PixelFormat::Argb8888
            | PixelFormat::Bgra8888
            | PixelFormat::Rgba8888
            | PixelFormat::Abgr8888
            | PixelFormat::Bgrx => w * h * 4,
        }
    }

    /// Channel masks and depth for RGB-family formats, `None` for YUV.
    pub const fn rgb_layout(self) -> Option<RgbLayout> {
        let layout = match self {
            PixelFormat::Rgb888 => RgbLayout {
                bits_per_pixel: 24,
                depth: 24,
                red_mask: 0x00FF_0000,
                green_mask: 0x0000_FF00,
                blue_mask: 0x0000_00FF,
                alpha_mask: 0,
                byte_order: ByteOrder::BigEndian,
            },
            PixelFormat::Bgr888 => RgbLayout {
                bits_per_pixel: 24,
                depth: 24,
                red_mask: 0x0000_00FF,
                green_mask: 0x0000_FF00,
                blue_mask: 0x00FF_0000,
                alpha_mask: 0,
                byte_order: ByteOrder::BigEndian,
            },
            PixelFormat::Rgb565 => RgbLayout {
                bits_per_pixel: 16,
                depth: 16,
                red_mask: 0xF800,
                green_mask: 0x07E0,
                blue_mask: 0x001F,
                alpha_mask: 0,
                byte_order: ByteOrder::LittleEndian,
            },
            PixelFormat::Bgrx => RgbLayout {
                bits_per_pixel: 32,
                depth: 24,
                red_mask: 0x0000_FF00,
                green_mask: 0x00FF_0000,
                blue_mask: 0xFF00_0000,
                alpha_mask: 0,
                byte_order: ByteOrder::BigEndian,
            },
            PixelFormat::Argb8888 => RgbLayout {
                bits_per_pixel: 32,
                depth: 32,
                red_mask: 0x00FF_0000,
                green_mask: 0x0000_FF00,
                blue_mask: 0x0000_00FF,
                alpha_mask: 0xFF00_0000,
                byte_order: ByteOrder::BigEndian,
            },
            PixelFormat::Bgra8888 => RgbLayout {
                bits_per_pixel: 32,
                depth: 32,
                red_mask: 0x0000_FF00,
                green_mask: 0x00FF_0000,
                blue_mask: 0xFF00_0000,
                alpha_mask: 0x0000_00FF,
                byte_order: ByteOrder::BigEndian,
            },
            PixelFormat::Rgba8888 => RgbLayout {
                bits_per_pixel: 32,
                depth: 32,
                red_mask: 0xFF00_0000,
                green_mask: 0x00FF_0000,
                blue_mask: 0x0000_FF00,
                alpha_mask: 0x0000_00FF,
                byte_order: ByteOrder::BigEndian,
            },
            PixelFormat::Abgr8888 => RgbLayout {
                bits_per_pixel: 32,
                depth: 32,
                red_mask: 0x0000_00FF,
                green_mask: 0x0000_FF00,
                blue_mask: 0x00FF_0000,
                alpha_mask: 0xFF00_0000,
                byte_order: ByteOrder::BigEndian,
            },
            _ => return None,
        };
        Some(layout)
    }
}

impl std::fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

impl std::str::FromStr for PixelFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_label(s)
    }
}

// ============================================================================
// Capability descriptor
// ============================================================================

/// An exact ratio, used for framerate and pixel aspect ratio.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Fraction {
    /// Numerator.
    pub numerator: u32,
    /// Denominator.
    pub denominator: u32,
}

impl Fraction {
    /// Create a new fraction.
    pub const fn new(numerator: u32, denominator: u32) -> Self {
        Self {
            numerator,
            denominator,
        }
    }
}

impl std::fmt::Display for Fraction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.numerator, self.denominator)
    }
}

/// Byte order of a packed RGB layout.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ByteOrder {
    /// Least significant byte first.
    LittleEndian,
    /// Most significant byte first.
    BigEndian,
}

impl ByteOrder {
    /// The conventional numeric code (`1234` little, `4321` big).
    pub const fn code(self) -> u32 {
        match self {
            ByteOrder::LittleEndian => 1234,
            ByteOrder::BigEndian => 4321,
        }
    }
}

/// Channel masks, depth and byte order of a packed RGB format.
///
/// Backends negotiate RGB-family formats from these masks rather than from
/// the label, so the table must match the wire layout bit for bit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RgbLayout {
    /// Total bits per pixel, including padding bits.
    pub bits_per_pixel: u32,
    /// Significant color bits per pixel.
    pub depth: u32,
    /// Red channel mask.
    pub red_mask: u32,
    /// Green channel mask.
    pub green_mask: u32,
    /// Blue channel mask.
    pub blue_mask: u32,
    /// Alpha channel mask (0 when there is no alpha channel).
    pub alpha_mask: u32,
    /// Byte order the masks are expressed in.
    pub byte_order: ByteOrder,
}

/// Negotiated format description exchanged with the transform backend.
///
/// The descriptor is opaque to the job: it is built once per side during
/// resolution and attached verbatim to the source or sink stage. Which
/// dimensions it carries depends on the side and the color model — YUV
/// sources advertise the logical size, RGB sources the padded size, RGBA
/// sources the logical width with the padded row count.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VideoCaps {
    /// Media type, always raw video.
    pub media_type: &'static str,
    /// Negotiated format name (see [`PixelFormat::backend_name`]).
    pub format_name: &'static str,
    /// Advertised width in samples.
    pub width: u32,
    /// Advertised row count.
    pub height: u32,
    /// Nominal framerate; a single frame is negotiated as 1/1.
    pub framerate: Fraction,
    /// Pixel aspect ratio, advertised only on YUV source caps.
    pub pixel_aspect_ratio: Option<Fraction>,
    /// Channel-mask layout for RGB-family formats.
    pub rgb_layout: Option<RgbLayout>,
}

/// Media type string for raw video caps.
pub const VIDEO_RAW: &str = "video/x-raw";

impl VideoCaps {
    fn for_input(
        format: PixelFormat,
        width: u32,
        height: u32,
        stride: u32,
        elevation: u32,
    ) -> Self {
        let (caps_width, caps_height, par) = match format.color_model() {
            ColorModel::Yuv => (width, height, Some(Fraction::new(1, 1))),
            ColorModel::Rgb | ColorModel::PackedRgbx => (stride, elevation, None),
            ColorModel::Rgba => (width, elevation, None),
        };
        Self {
            media_type: VIDEO_RAW,
            format_name: format.backend_name(),
            width: caps_width,
            height: caps_height,
            framerate: Fraction::new(1, 1),
            pixel_aspect_ratio: par,
            rgb_layout: format.rgb_layout(),
        }
    }

    fn for_output(format: PixelFormat, width: u32, height: u32) -> Self {
        Self {
            media_type: VIDEO_RAW,
            format_name: format.backend_name(),
            width,
            height,
            framerate: Fraction::new(1, 1),
            pixel_aspect_ratio: None,
            rgb_layout: format.rgb_layout(),
        }
    }
}

impl std::fmt::Display for VideoCaps {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}, format={}, width={}, height={}, framerate={}",
            self.media_type, self.format_name, self.width, self.height, self.framerate
        )?;
        if let Some(par) = self.pixel_aspect_ratio {
            write!(f, ", pixel-aspect-ratio={par}")?;
        }
        Ok(())
    }
}

// ============================================================================
// Resolved image formats
// ============================================================================

/// A fully-derived per-side image format.
///
/// Built fresh for each job from a [`PixelFormat`] and the requested
/// dimensions; owns the padded layout and the capability descriptor for one
/// side of the transform. Invariants: `stride >= width` and
/// `elevation >= height`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageFormat {
    /// The pixel format.
    pub pixel_format: PixelFormat,
    /// Logical width in samples. On the output side this may have been
    /// overwritten by padding propagation (see [`ImageFormat::resolve_output`]).
    pub width: u32,
    /// Logical row count, possibly overwritten like `width`.
    pub height: u32,
    /// Row width in samples after alignment padding.
    pub stride: u32,
    /// Row count after alignment padding.
    pub elevation: u32,
    /// Total frame bytes per the size table, evaluated at the dimensions
    /// the caller requested.
    pub block_size: usize,
    /// Capability descriptor for backend negotiation.
    pub caps: VideoCaps,
}

fn derive_stride_elevation(format: PixelFormat, width: u32, height: u32) -> Result<(u32, u32)> {
    match format.color_model() {
        ColorModel::Yuv => Ok((round_up(width, 8), round_up(height, 2))),
        ColorModel::Rgb => Ok((round_up(width, 4), round_up(height, 2))),
        ColorModel::Rgba => Ok((width, round_up(height, 2))),
        ColorModel::PackedRgbx => Err(Error::NoLayoutRule { format }),
    }
}

impl ImageFormat {
    /// Resolve the source-side format for a job.
    ///
    /// Fails with [`Error::InvalidDimensions`] for zero width or height and
    /// with [`Error::NoLayoutRule`] for formats whose color model carries no
    /// padding rule.
    pub fn resolve_input(format: PixelFormat, width: u32, height: u32) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(Error::InvalidDimensions { width, height });
        }
        let (stride, elevation) = derive_stride_elevation(format, width, height)?;
        let block_size = format.buffer_size(width, height);
        let caps = VideoCaps::for_input(format, width, height, stride, elevation);
        tracing::debug!(
            "resolved input {format}: {width}x{height}, stride {stride}, elevation {elevation}, {block_size} bytes"
        );
        Ok(Self {
            pixel_format: format,
            width,
            height,
            stride,
            elevation,
            block_size,
            caps,
        })
    }

    /// Resolve the destination-side format for a job.
    ///
    /// The block size is always evaluated at the requested `width` and
    /// `height`. The logical dimensions, however, propagate the input side's
    /// padding decision: an RGB output takes its stride as width
    /// unconditionally, and RGB/RGBA outputs take their elevation as height
    /// whenever the input format is height-padded.
    pub fn resolve_output(
        format: PixelFormat,
        width: u32,
        height: u32,
        input: &ImageFormat,
    ) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(Error::InvalidDimensions { width, height });
        }
        let (stride, elevation) = derive_stride_elevation(format, width, height)?;
        let block_size = format.buffer_size(width, height);

        let input_padded = input.height != input.elevation;
        let (mut width, mut height) = (width, height);
        match format.color_model() {
            ColorModel::Rgb => {
                width = stride;
                if input_padded {
                    height = elevation;
                }
            }
            ColorModel::Rgba => {
                if input_padded {
                    height = elevation;
                }
            }
            ColorModel::Yuv | ColorModel::PackedRgbx => {}
        }

        let caps = VideoCaps::for_output(format, width, height);
        tracing::debug!(
            "resolved output {format}: {width}x{height}, stride {stride}, elevation {elevation}, {block_size} bytes"
        );
        Ok(Self {
            pixel_format: format,
            width,
            height,
            stride,
            elevation,
            block_size,
            caps,
        })
    }

    /// The color model of this format.
    pub const fn color_model(&self) -> ColorModel {
        self.pixel_format.color_model()
    }
}
