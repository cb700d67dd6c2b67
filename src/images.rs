use std::collections::HashMap;
use std::path::PathBuf;

/// Height for regular image placeholders in terminal cells
const IMAGE_HEIGHT_REGULAR: u16 = 12;
/// Height for wide images (aspect ratio > 3:1) in terminal cells
const IMAGE_HEIGHT_WIDE: u16 = 6;
/// Aspect ratio threshold for wide images
const WIDE_IMAGE_ASPECT_RATIO: f32 = 3.0;

#[derive(Debug, Clone, PartialEq)]
pub enum ImageState {
    Loading,
    Loaded { width: u32, height: u32 },
    Failed { reason: String },
}

impl ImageState {
    /// Failed counts as settled: a broken image must never stall
    /// page measurement.
    pub fn is_settled(&self) -> bool {
        !matches!(self, ImageState::Loading)
    }
}

#[derive(Debug, Clone)]
pub struct EmbeddedImage {
    pub src: String,
    pub alt_text: String,
    pub state: ImageState,
}

impl EmbeddedImage {
    pub fn height_in_cells(&self) -> u16 {
        match &self.state {
            ImageState::Loaded { width, height } => {
                let aspect_ratio = *width as f32 / (*height).max(1) as f32;
                if aspect_ratio > WIDE_IMAGE_ASPECT_RATIO || *height < 150 {
                    IMAGE_HEIGHT_WIDE
                } else {
                    IMAGE_HEIGHT_REGULAR
                }
            }
            ImageState::Loading => IMAGE_HEIGHT_REGULAR,
            ImageState::Failed { .. } => 1,
        }
    }
}

/// Tracks every image embedded in the current chapter and whether its
/// dimensions are known yet. Dimension probing happens from the event loop
/// (`resolve_pending`), never during the render pass.
#[derive(Debug, Default)]
pub struct ImageTracker {
    base_dir: Option<PathBuf>,
    images: HashMap<String, EmbeddedImage>,
}

impl ImageTracker {
    pub fn new(base_dir: Option<PathBuf>) -> Self {
        Self {
            base_dir,
            images: HashMap::new(),
        }
    }

    /// Called when the chapter changes; all prior registrations are stale.
    pub fn reset(&mut self) {
        self.images.clear();
    }

    pub fn register(&mut self, src: &str, alt_text: &str) {
        self.images
            .entry(src.to_string())
            .or_insert_with(|| EmbeddedImage {
                src: src.to_string(),
                alt_text: alt_text.to_string(),
                state: ImageState::Loading,
            });
    }

    pub fn get(&self, src: &str) -> Option<&EmbeddedImage> {
        self.images.get(src)
    }

    pub fn all_settled(&self) -> bool {
        self.images.values().all(|img| img.state.is_settled())
    }

    /// Probes dimensions for every still-loading image. Returns true if any
    /// image settled, meaning a page recomputation is due.
    pub fn resolve_pending(&mut self) -> bool {
        let mut settled_any = false;
        for img in self.images.values_mut() {
            if img.state.is_settled() {
                continue;
            }
            img.state = match self.base_dir.as_ref() {
                Some(dir) => match imagesize::size(dir.join(&img.src)) {
                    Ok(dim) => ImageState::Loaded {
                        width: dim.width as u32,
                        height: dim.height as u32,
                    },
                    Err(e) => ImageState::Failed {
                        reason: e.to_string(),
                    },
                },
                None => ImageState::Failed {
                    reason: "no base directory".to_string(),
                },
            };
            settled_any = true;
        }
        settled_any
    }

}
