use std::fs;
use std::path::Path;

#[derive(Debug, Default)]
pub struct AssetSummary {
    pub dialogue_files: usize,
    pub action_files: usize,
    pub story_files: usize,
    pub order_files: usize,
}

pub fn scan(root: &Path) -> Result<AssetSummary, String> {
    Ok(AssetSummary {
        dialogue_files: count_dir(root.join("dialogue"))?,
        action_files: count_dir(root.join("actions"))?,
        story_files: count_dir(root.join("save").join("stories"))?,
        order_files: count_dir(root.join("save").join("orders"))?,
    })
}

fn count_dir(path: impl AsRef<Path>) -> Result<usize, String> {
    let path = path.as_ref();
    let entries = match fs::read_dir(path) {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(err) => return Err(format!("failed to read {}: {}", path.display(), err)),
    };

    let mut count = 0usize;
    for entry in entries {
        if entry.is_ok() {
            count += 1;
        }
    }

    Ok(count)
}
