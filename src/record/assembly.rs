use crate::config::ScraperDefinition;
use crate::record::{generate_id, OutputRecord, RECORD_KIND};
use crate::script::{ScriptOutput, ScriptValue};

/// Maps script output into a new record
///
/// | script key      | record field    | coercion            |
/// |-----------------|-----------------|---------------------|
/// | `site_id`       | `site_local_id` | trim                |
/// | `cast`          | `cast`          | each entry trimmed  |
/// | `cover_url`     | `covers`        | scalar -> list      |
/// | `duration`      | `duration`      | integer             |
/// | `filenames`     | `filenames`     | list                |
/// | `gallery_urls`  | `gallery`       | list                |
/// | `homepage_url`  | `homepage_url`  | trim                |
/// | `released`      | `release_date`  | trim                |
/// | `synopsis`      | `synopsis`      | trim                |
/// | `tags`          | `tags`          | list                |
/// | `title`         | `title`         | trim                |
///
/// Kind is fixed, site and studio come from the definition.
pub fn assemble_record(definition: &ScraperDefinition, output: &ScriptOutput) -> OutputRecord {
    let site_local_id = output.site_id.trim().to_string();

    OutputRecord {
        id: generate_id(&definition.site_id, &site_local_id),
        site_local_id,
        kind: RECORD_KIND.to_string(),
        site: definition.site_id.clone(),
        studio: definition.studio.clone(),
        covers: normalize_covers(&output.cover_url),
        gallery: trim_all(&output.gallery_urls),
        title: output.title.trim().to_string(),
        synopsis: output.synopsis.trim().to_string(),
        release_date: output.released.trim().to_string(),
        duration: output.duration,
        tags: trim_all(&output.tags),
        cast: trim_all(&output.cast),
        filenames: trim_all(&output.filenames),
        homepage_url: output.homepage_url.trim().to_string(),
    }
}

/// Covers are always a list; a scalar becomes a single-element list and an
/// empty scalar an empty one
pub fn normalize_covers(value: &ScriptValue) -> Vec<String> {
    match value {
        ScriptValue::Text(text) => {
            let text = text.trim();
            if text.is_empty() {
                Vec::new()
            } else {
                vec![text.to_string()]
            }
        }
        ScriptValue::List(items) => trim_all(items),
    }
}

fn trim_all(items: &[String]) -> Vec<String> {
    items.iter().map(|s| s.trim().to_string()).collect()
}
