//! Mapping files on disk.

use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::model::MappingModel;
use crate::error::{DecoyError, Result};

/// Parse a document holding either one mapping object or an array of them.
pub fn parse_mapping_models(text: &str) -> Result<Vec<MappingModel>> {
    let value: Value = serde_json::from_str(text)?;
    match value {
        Value::Array(items) => items
            .into_iter()
            .map(|item| serde_json::from_value(item).map_err(DecoyError::from))
            .collect(),
        Value::Object(_) => Ok(vec![serde_json::from_value(value)?]),
        _ => Err(DecoyError::MalformedMapping(
            "Expected a mapping object or an array of mappings".to_string(),
        )),
    }
}

/// Read every `*.json` file in `dir`, in file name order.
pub fn load_mappings_from_dir(dir: &Path) -> Result<Vec<MappingModel>> {
    let mut paths: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.is_file()
                && path
                    .extension()
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
        })
        .collect();
    paths.sort();

    let mut models = Vec::new();
    for path in paths {
        let text = fs::read_to_string(&path)?;
        let parsed = parse_mapping_models(&text).map_err(|e| {
            DecoyError::MalformedMapping(format!("{}: {}", path.display(), e))
        })?;
        debug!(file = %path.display(), count = parsed.len(), "Read mapping file");
        models.extend(parsed);
    }
    info!(dir = %dir.display(), count = models.len(), "Loaded static mappings");
    Ok(models)
}

/// Write `model` as pretty JSON to `{dir}/{guid}.json`, creating `dir` if needed.
pub async fn save_mapping_to_file(dir: &Path, model: &MappingModel) -> Result<PathBuf> {
    let guid = model.guid.ok_or_else(|| {
        DecoyError::MalformedMapping("Cannot save a mapping without a Guid".to_string())
    })?;
    let contents = serde_json::to_vec_pretty(model)?;
    tokio::fs::create_dir_all(dir).await?;
    let path = dir.join(format!("{guid}.json"));
    tokio::fs::write(&path, contents).await?;
    debug!(file = %path.display(), "Saved mapping");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use uuid::Uuid;

    #[test]
    fn test_parse_single_and_array() {
        let single = parse_mapping_models(r#"{"Title": "a"}"#).unwrap();
        assert_eq!(single.len(), 1);

        let many = parse_mapping_models(r#"[{"Title": "a"}, {"Title": "b"}]"#).unwrap();
        assert_eq!(many.len(), 2);
        assert_eq!(many[1].title.as_deref(), Some("b"));

        assert!(parse_mapping_models("42").is_err());
        assert!(parse_mapping_models("{not json").is_err());
    }

    #[test]
    fn test_load_dir_in_name_order_and_skips_other_files() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("b.json"), r#"{"Title": "second"}"#).unwrap();
        fs::write(dir.path().join("a.json"), r#"[{"Title": "first"}]"#).unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let models = load_mappings_from_dir(dir.path()).unwrap();
        let titles: Vec<_> = models.iter().filter_map(|m| m.title.as_deref()).collect();
        assert_eq!(titles, vec!["first", "second"]);
    }

    #[test]
    fn test_load_dir_reports_bad_file() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("bad.json"), "[1, 2").unwrap();
        let err = load_mappings_from_dir(dir.path()).unwrap_err();
        assert!(err.to_string().contains("bad.json"));
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("nested");
        let model = MappingModel {
            guid: Some(Uuid::new_v4()),
            title: Some("saved".to_string()),
            ..Default::default()
        };

        let path = save_mapping_to_file(&target, &model).await.unwrap();
        assert!(path.ends_with(format!("{}.json", model.guid.unwrap())));

        let loaded = load_mappings_from_dir(&target).unwrap();
        assert_eq!(loaded, vec![model]);
    }

    #[tokio::test]
    async fn test_save_requires_guid() {
        let dir = TempDir::new().unwrap();
        assert!(save_mapping_to_file(dir.path(), &MappingModel::default())
            .await
            .is_err());
    }
}
