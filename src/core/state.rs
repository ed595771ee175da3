//! CK-013: Field set files. Loading checks shapes; saving is atomic.

use super::fieldset::FieldSet;
use std::path::Path;

/// Load a field set from a YAML file. Every field must hold exactly
/// `points * levels` values.
pub fn load_fields(path: &Path) -> Result<FieldSet, String> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("cannot read {}: {}", path.display(), e))?;
    let fields: FieldSet = serde_yaml_ng::from_str(&content)
        .map_err(|e| format!("invalid field file {}: {}", path.display(), e))?;
    for (name, field) in &fields.fields {
        field
            .check_shape()
            .map_err(|e| format!("{}: field '{}': {}", path.display(), name, e))?;
    }
    Ok(fields)
}

/// Save a field set atomically (write to temp, then rename).
pub fn save_fields(path: &Path, fields: &FieldSet) -> Result<(), String> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .map_err(|e| format!("cannot create dir {}: {}", parent.display(), e))?;
    }

    let yaml = serde_yaml_ng::to_string(fields).map_err(|e| format!("serialize error: {}", e))?;

    let tmp_path = path.with_extension("yaml.tmp");
    std::fs::write(&tmp_path, &yaml)
        .map_err(|e| format!("cannot write {}: {}", tmp_path.display(), e))?;
    std::fs::rename(&tmp_path, path).map_err(|e| {
        format!(
            "cannot rename {} -> {}: {}",
            tmp_path.display(),
            path.display(),
            e
        )
    })?;

    Ok(())
}
