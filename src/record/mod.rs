//! The canonical scraped record and how script output becomes one

mod assembly;

pub use assembly::{assemble_record, normalize_covers};

use serde::{Deserialize, Serialize};

/// Kind stamped on every record
pub const RECORD_KIND: &str = "VR";

/// One scraped entity
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputRecord {
    /// Deterministic id: `slug(site + "-" + site_local_id)`
    pub id: String,

    /// Identifier of the entity on its own site
    pub site_local_id: String,

    pub kind: String,
    pub site: String,
    pub studio: String,

    pub covers: Vec<String>,
    pub gallery: Vec<String>,

    pub title: String,
    pub synopsis: String,
    pub release_date: String,
    /// Duration in minutes
    pub duration: i64,
    pub tags: Vec<String>,
    pub cast: Vec<String>,
    pub filenames: Vec<String>,

    pub homepage_url: String,
}

/// Builds the deterministic record id used for downstream deduplication
///
/// # Examples
///
/// ```
/// use scene_scraper::record::generate_id;
///
/// assert_eq!(generate_id("Example VR", "Scene 12"), "example-vr-scene-12");
/// assert_eq!(generate_id("Example VR", "Scene 12"), generate_id("Example VR", "Scene 12"));
/// ```
pub fn generate_id(site: &str, site_local_id: &str) -> String {
    slug::slugify(format!("{}-{}", site, site_local_id))
}

impl OutputRecord {
    /// Recomputes `id` from `site` and `site_local_id`
    pub fn refresh_id(&mut self) {
        self.id = generate_id(&self.site, &self.site_local_id);
    }

    /// Copies every field of `other` into fields of `self` that are still
    /// empty. Fields already set are never overwritten.
    pub fn fill_missing(&mut self, other: &OutputRecord) {
        let id_changed = fill_text(&mut self.site_local_id, &other.site_local_id);

        fill_list(&mut self.covers, &other.covers);
        fill_list(&mut self.gallery, &other.gallery);
        fill_text(&mut self.title, &other.title);
        fill_text(&mut self.synopsis, &other.synopsis);
        fill_text(&mut self.release_date, &other.release_date);
        if self.duration == 0 {
            self.duration = other.duration;
        }
        fill_list(&mut self.tags, &other.tags);
        fill_list(&mut self.cast, &other.cast);
        fill_list(&mut self.filenames, &other.filenames);
        fill_text(&mut self.homepage_url, &other.homepage_url);

        if id_changed {
            self.refresh_id();
        }
    }
}

fn fill_text(target: &mut String, source: &str) -> bool {
    if target.is_empty() && !source.is_empty() {
        *target = source.to_string();
        true
    } else {
        false
    }
}

fn fill_list(target: &mut Vec<String>, source: &[String]) {
    if target.is_empty() && !source.is_empty() {
        *target = source.to_vec();
    }
}
