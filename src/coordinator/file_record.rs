//! `<root>/files.json` persistence: `{file_path: mod_stamp}`.

use std::collections::HashMap;
use std::path::Path;

pub fn load(root: impl AsRef<Path>) -> HashMap<String, i64> {
    let path = root.as_ref().join("files.json");
    match std::fs::read(&path) {
        Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_default(),
        Err(_) => HashMap::new(),
    }
}

pub fn save(root: impl AsRef<Path>, records: &HashMap<String, i64>) -> std::io::Result<()> {
    let root = root.as_ref();
    std::fs::create_dir_all(root)?;
    let bytes = serde_json::to_vec_pretty(records)?;
    std::fs::write(root.join("files.json"), bytes)
}
