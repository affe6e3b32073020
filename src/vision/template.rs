//! Template storage
//!
//! Holds the named reference images the matcher scans frames for.
//! Templates are loaded once, up front; the library is immutable while
//! detection runs.

use std::path::Path;

use image::{DynamicImage, GrayImage, RgbImage};

use super::VisionError;

/// Image file extensions accepted by the bulk loader
const SUPPORTED_EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "bmp", "tiff"];

/// One visual target class: a named reference image
#[derive(Debug, Clone)]
pub struct Template {
    name: String,
    reference: RgbImage,
    gray: GrayImage,
}

impl Template {
    /// Create a template from a decoded image
    pub fn from_image(name: impl Into<String>, image: &DynamicImage) -> Self {
        Self {
            name: name.into(),
            reference: image.to_rgb8(),
            gray: image.to_luma8(),
        }
    }

    /// Load a template from an image file
    pub fn from_file(name: impl Into<String>, path: &Path) -> Result<Self, VisionError> {
        let image = image::open(path).map_err(|e| VisionError::TemplateLoad {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self::from_image(name, &image))
    }

    /// Template name (unique within a library)
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Original color reference image
    pub fn reference(&self) -> &RgbImage {
        &self.reference
    }

    /// Grayscale image used for correlation
    pub fn gray(&self) -> &GrayImage {
        &self.gray
    }

    /// Template width in pixels
    pub fn width(&self) -> u32 {
        self.gray.width()
    }

    /// Template height in pixels
    pub fn height(&self) -> u32 {
        self.gray.height()
    }
}

/// Collection of templates the matcher scans for
#[derive(Debug, Clone, Default)]
pub struct TemplateLibrary {
    templates: Vec<Template>,
}

impl TemplateLibrary {
    /// Create an empty library
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a template, replacing any existing one with the same name
    ///
    /// Duplicate names are last-write-wins; the replacement is logged
    /// rather than silent.
    pub fn insert(&mut self, template: Template) {
        if let Some(existing) = self
            .templates
            .iter_mut()
            .find(|t| t.name == template.name)
        {
            log::warn!(
                "template '{}' already loaded, replacing with new image",
                template.name
            );
            *existing = template;
        } else {
            self.templates.push(template);
        }
    }

    /// Bulk-load every supported image file in a directory
    ///
    /// Each template is named after its file stem. A file that fails to
    /// decode is skipped with a warning; only an unreadable directory
    /// fails the whole load. Returns the number of templates loaded.
    pub fn load_dir(&mut self, dir: &Path) -> Result<usize, VisionError> {
        let entries = std::fs::read_dir(dir)
            .map_err(|e| VisionError::TemplateDir(format!("{}: {}", dir.display(), e)))?;

        let mut loaded = 0;
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
                continue;
            };
            if !SUPPORTED_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };

            match Template::from_file(stem, &path) {
                Ok(template) => {
                    log::debug!(
                        "loaded template '{}' ({}x{})",
                        template.name(),
                        template.width(),
                        template.height()
                    );
                    self.insert(template);
                    loaded += 1;
                }
                Err(e) => {
                    log::warn!("skipping template file: {e}");
                }
            }
        }

        log::info!("loaded {} templates from {}", loaded, dir.display());
        Ok(loaded)
    }

    /// Look up a template by name
    pub fn get(&self, name: &str) -> Option<&Template> {
        self.templates.iter().find(|t| t.name == name)
    }

    /// Iterate over all templates in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &Template> {
        self.templates.iter()
    }

    /// Number of templates in the library
    pub fn len(&self) -> usize {
        self.templates.len()
    }

    /// Whether the library holds no templates
    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn checker_image(size: u32) -> DynamicImage {
        let img = RgbImage::from_fn(size, size, |x, y| {
            if (x + y) % 2 == 0 {
                Rgb([255, 255, 255])
            } else {
                Rgb([0, 0, 0])
            }
        });
        DynamicImage::ImageRgb8(img)
    }

    #[test]
    fn test_insert_and_lookup() {
        let mut library = TemplateLibrary::new();
        library.insert(Template::from_image("sword", &checker_image(8)));

        assert_eq!(library.len(), 1);
        assert!(library.get("sword").is_some());
        assert!(library.get("shield").is_none());
    }

    #[test]
    fn test_duplicate_name_last_write_wins() {
        let mut library = TemplateLibrary::new();
        library.insert(Template::from_image("sword", &checker_image(8)));
        library.insert(Template::from_image("sword", &checker_image(16)));

        assert_eq!(library.len(), 1);
        assert_eq!(library.get("sword").unwrap().width(), 16);
    }

    #[test]
    fn test_load_dir_names_from_stem_and_skips_bad_files() {
        let dir = std::env::temp_dir().join("loothound_template_test");
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();

        checker_image(8)
            .save(dir.join("epic_sword.png"))
            .unwrap();
        checker_image(12)
            .save(dir.join("rare_helm.png"))
            .unwrap();
        std::fs::write(dir.join("corrupt.png"), b"not an image").unwrap();
        std::fs::write(dir.join("notes.txt"), b"ignored").unwrap();

        let mut library = TemplateLibrary::new();
        let loaded = library.load_dir(&dir).unwrap();

        assert_eq!(loaded, 2);
        assert!(library.get("epic_sword").is_some());
        assert!(library.get("rare_helm").is_some());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_load_missing_dir_fails() {
        let mut library = TemplateLibrary::new();
        let result = library.load_dir(Path::new("/nonexistent/loothound"));
        assert!(matches!(result, Err(VisionError::TemplateDir(_))));
    }
}
