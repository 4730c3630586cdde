// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
Built-in representations.

| Type                | Rust value          | Notes                                         |
|---------------------|---------------------|-----------------------------------------------|
| [IMAGE_URL]         | [String]            | path of a PNG file                            |
| [IMAGE]             | [DecodedImage]      | immutable 8-bit RGBA pixels                   |
| [CONTEXT_2D]        | [DrawingSurface]    | mutable RGBA surface; must be released        |

Conversions, from [learn_builtins]:

```text
imageUrl --(read + decode)--> image --(rasterize)--> context2d
imageUrl <--(source path)---- image <--(read back)-- context2d
```
*/

use crate::Priority;
use crate::conversion::{ConversionRegistry, Data, DataType, Destructor, Transform};
use crate::error::LoadError;
use futures::FutureExt;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

pub const IMAGE_URL: &str = "imageUrl";
pub const IMAGE: &str = "image";
pub const CONTEXT_2D: &str = "context2d";

/// Decoded 8-bit RGBA pixels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedImage {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
    source: Option<String>,
}

impl DecodedImage {
    /**
    # Panics
    If `pixels` is not exactly `width * height * 4` bytes.
    */
    pub fn new(width: u32, height: u32, pixels: Vec<u8>, source: Option<String>) -> Self {
        assert_eq!(pixels.len(), width as usize * height as usize * 4, "RGBA buffer size mismatch");
        DecodedImage {
            width,
            height,
            pixels,
            source,
        }
    }
    pub fn width(&self) -> u32 {
        self.width
    }
    pub fn height(&self) -> u32 {
        self.height
    }
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }
    /// Path the image was loaded from, if it came from a file.
    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }
}

/**
A mutable RGBA drawing surface.

Surfaces stand in for GPU-backed canvases: they hold storage until they are explicitly
released, after which they are empty and every read returns `None`.
*/
#[derive(Debug)]
pub struct DrawingSurface {
    width: u32,
    height: u32,
    pixels: Mutex<Vec<u8>>,
    released: AtomicBool,
}

impl DrawingSurface {
    pub fn new(width: u32, height: u32) -> Self {
        DrawingSurface {
            width,
            height,
            pixels: Mutex::new(vec![0; width as usize * height as usize * 4]),
            released: AtomicBool::new(false),
        }
    }

    pub fn from_image(image: &DecodedImage) -> Self {
        DrawingSurface {
            width: image.width,
            height: image.height,
            pixels: Mutex::new(image.pixels.clone()),
            released: AtomicBool::new(false),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }
    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    /// Runs `f` over the pixel storage.  Returns `None` once the surface is released.
    pub fn with_pixels_mut<R>(&self, f: impl FnOnce(&mut [u8]) -> R) -> Option<R> {
        let mut pixels = self.pixels.lock().unwrap();
        if self.is_released() {
            return None;
        }
        Some(f(&mut pixels))
    }

    /// Copies the current contents out.  Returns `None` once the surface is released.
    pub fn snapshot(&self) -> Option<DecodedImage> {
        let pixels = self.pixels.lock().unwrap();
        if self.is_released() {
            return None;
        }
        Some(DecodedImage::new(self.width, self.height, pixels.clone(), None))
    }

    /// A new surface with the same contents.
    pub fn duplicate(&self) -> Option<DrawingSurface> {
        self.snapshot().map(|image| DrawingSurface::from_image(&image))
    }

    /// Frees the pixel storage.  Idempotent.
    pub fn release(&self) {
        let mut pixels = self.pixels.lock().unwrap();
        self.released.store(true, Ordering::Release);
        *pixels = Vec::new();
    }
}

/// Largest decoded image [decode_png] accepts.
pub const MAX_DECODED_BYTES: usize = 1 << 28;

/// Decodes an 8-bit RGBA PNG.
pub fn decode_png(bytes: &[u8], source: Option<String>) -> Result<DecodedImage, LoadError> {
    let decoder = png::Decoder::new(std::io::Cursor::new(bytes));
    let mut reader = decoder.read_info()?;
    let (width, height, color, depth) = {
        let info = reader.info();
        (info.width, info.height, info.color_type, info.bit_depth)
    };
    if color != png::ColorType::Rgba || depth != png::BitDepth::Eight {
        return Err(LoadError::UnsupportedFormat { color, depth });
    }
    let Some(size) = reader.output_buffer_size().filter(|s| *s <= MAX_DECODED_BYTES) else {
        return Err(LoadError::TooLarge { width, height });
    };
    let mut pixels = vec![0; size];
    let frame = reader.next_frame(&mut pixels)?;
    pixels.truncate(frame.buffer_size());
    Ok(DecodedImage::new(frame.width, frame.height, pixels, source))
}

/// Reads and decodes the PNG at `path`.
pub async fn load_png(path: &Path, priority: Priority) -> Result<DecodedImage, LoadError> {
    let io_error = |e: &dyn std::fmt::Debug| LoadError::Io {
        path: path.display().to_string(),
        reason: format!("{e:?}"),
    };
    let file = async_file::File::open(path, priority).await.map_err(|e| io_error(&e))?;
    let data = file.read_all(priority).await.map_err(|e| io_error(&e))?;
    decode_png(&*data, Some(path.display().to_string()))
}

/**
Teaches `registry` the built-in types.

`priority` is used for file reads by the `imageUrl -> image` conversion.
*/
pub fn learn_builtins(registry: &ConversionRegistry, priority: Priority) {
    let url = DataType::new(IMAGE_URL);
    let image = DataType::new(IMAGE);
    let context = DataType::new(CONTEXT_2D);

    registry.learn(
        &url,
        &image,
        Transform::new_async(move |_, data| {
            async move {
                let path = data.downcast_ref::<String>()?;
                match load_png(Path::new(path), priority).await {
                    Ok(image) => Some(Arc::new(image) as Data),
                    Err(e) => {
                        logwise::error_sync!("Can't load tile image: {err}", err = logwise::privacy::LogIt(&e));
                        None
                    }
                }
            }
            .boxed()
        }),
        1,
        1,
    );
    registry.learn(
        &image,
        &url,
        Transform::new(|_, data| {
            let source = data.downcast_ref::<DecodedImage>()?.source()?;
            Some(Arc::new(source.to_string()) as Data)
        }),
        0,
        1,
    );
    registry.learn(
        &image,
        &context,
        Transform::new(|_, data| {
            let image = data.downcast_ref::<DecodedImage>()?;
            Some(Arc::new(DrawingSurface::from_image(image)) as Data)
        }),
        1,
        1,
    );
    registry.learn(
        &context,
        &image,
        Transform::new(|_, data| {
            let surface = data.downcast_ref::<DrawingSurface>()?;
            Some(Arc::new(surface.snapshot()?) as Data)
        }),
        1,
        1,
    );

    //copies
    registry.learn(
        &url,
        &url,
        Transform::new(|_, data| Some(Arc::new(data.downcast_ref::<String>()?.clone()) as Data)),
        0,
        1,
    );
    registry.learn(
        &image,
        &image,
        Transform::new(|_, data| Some(Arc::new(data.downcast_ref::<DecodedImage>()?.clone()) as Data)),
        1,
        1,
    );
    registry.learn(
        &context,
        &context,
        Transform::new(|_, data| Some(Arc::new(data.downcast_ref::<DrawingSurface>()?.duplicate()?) as Data)),
        1,
        1,
    );

    registry.learn_destroy(
        &context,
        Destructor::new(|data| {
            if let Some(surface) = data.downcast_ref::<DrawingSurface>() {
                surface.release();
            }
        }),
    );
}
