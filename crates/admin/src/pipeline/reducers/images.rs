//! Product image metadata export.

use serde::Serialize;

use catalog_ops_core::CanonicalRecord;

use crate::pipeline::Reducer;
use crate::pipeline::normalize::attr;

/// One exported image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageRow {
    /// Owning record id.
    pub record_id: String,
    /// Owning record title.
    pub record_title: String,
    /// Owning record handle.
    pub handle: Option<String>,
    /// Image id.
    pub image_id: Option<String>,
    /// Image URL.
    pub url: String,
    /// Alt text.
    pub alt_text: Option<String>,
    /// Width in pixels.
    pub width: Option<i64>,
    /// Height in pixels.
    pub height: Option<i64>,
}

/// Id and title of a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordRef {
    /// Record id.
    pub id: String,
    /// Record title.
    pub title: String,
}

/// Flattens record images into rows.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageMetadataReducer;

/// Running image export.
#[derive(Debug, Clone, Default)]
pub struct ImageState {
    rows: Vec<ImageRow>,
    with_images: usize,
    without_images: Vec<RecordRef>,
}

/// Final image export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageReport {
    /// Number of images exported.
    pub image_count: usize,
    /// Records with at least one image.
    pub records_with_images: usize,
    /// Records with no image.
    pub records_without_images: usize,
    /// Images with no alt text.
    pub missing_alt_text: usize,
    /// Records with no image, in fold order.
    pub missing_images: Vec<RecordRef>,
    /// Every image, in fold order.
    pub rows: Vec<ImageRow>,
}

impl Reducer for ImageMetadataReducer {
    type State = ImageState;
    type Report = ImageReport;

    fn init(&self) -> ImageState {
        ImageState::default()
    }

    fn fold(&self, mut state: ImageState, record: CanonicalRecord) -> ImageState {
        if record.images.is_empty() {
            state.without_images.push(RecordRef {
                id: record.id,
                title: record.title,
            });
            return state;
        }

        state.with_images += 1;
        let handle = record.attribute(attr::HANDLE).map(str::to_string);
        state.rows.extend(record.images.into_iter().map(|image| ImageRow {
            record_id: record.id.clone(),
            record_title: record.title.clone(),
            handle: handle.clone(),
            image_id: image.id,
            url: image.url,
            alt_text: image.alt_text,
            width: image.width,
            height: image.height,
        }));
        state
    }

    fn finalize(&self, state: ImageState) -> ImageReport {
        ImageReport {
            image_count: state.rows.len(),
            records_with_images: state.with_images,
            records_without_images: state.without_images.len(),
            missing_alt_text: state.rows.iter().filter(|r| r.alt_text.is_none()).count(),
            missing_images: state.without_images,
            rows: state.rows,
        }
    }
}

#[cfg(test)]
#[allow(clippy::indexing_slicing)]
mod tests {
    use super::*;
    use catalog_ops_core::RecordImage;

    fn image(id: &str, alt: Option<&str>) -> RecordImage {
        RecordImage {
            id: Some(id.to_string()),
            url: format!("https://cdn.example.com/{id}.jpg"),
            alt_text: alt.map(str::to_string),
            width: Some(1024),
            height: Some(1024),
        }
    }

    #[test]
    fn test_flattens_images_and_tracks_missing() {
        let reducer = ImageMetadataReducer;
        let mut with_images = CanonicalRecord::new("p1", "Onyx Rounds", 3).with_attribute("handle", "onyx-rounds");
        with_images.images = vec![image("i1", Some("Onyx")), image("i2", None)];
        let without = CanonicalRecord::new("p2", "Bare Product", 1);

        let state = reducer.fold(reducer.fold(reducer.init(), with_images), without);
        let report = reducer.finalize(state);

        assert_eq!(report.image_count, 2);
        assert_eq!(report.records_with_images, 1);
        assert_eq!(report.records_without_images, 1);
        assert_eq!(report.missing_alt_text, 1);
        assert_eq!(report.missing_images[0].title, "Bare Product");
        assert_eq!(report.rows[1].record_id, "p1");
        assert_eq!(report.rows[1].handle.as_deref(), Some("onyx-rounds"));
        assert_eq!(report.rows[1].image_id.as_deref(), Some("i2"));
    }
}
