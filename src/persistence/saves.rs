use base64::engine::general_purpose::STANDARD as BASE64_ENGINE;
use base64::Engine as _;
use sha1::{Digest, Sha1};
use std::fs;
use std::path::{Path, PathBuf};

pub const CURRENT_SAVE_VERSION: u32 = 3;

/// Minimal resumption state for one conversation story: an opaque blob
/// the interpreter left behind, plus enough header to find it again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoryRecord {
    pub version: u32,
    pub story: String,
    pub participant: Option<String>,
    pub blob: Vec<u8>,
}

/// A pure step lifting a record from its version to the next one.
type MigrationStep = fn(StoryRecord) -> StoryRecord;

/// Ordered migration chain. Loading applies every step from the stored
/// version up to CURRENT_SAVE_VERSION; each step is testable on its own.
const MIGRATIONS: &[(u32, MigrationStep)] = &[
    (1, migrate_v1_story_keys),
    (2, migrate_v2_empty_participant),
];

/// v1 story ids were free-form display names; v2 keys are lowercase with
/// dashes.
fn migrate_v1_story_keys(mut record: StoryRecord) -> StoryRecord {
    record.story = record
        .story
        .trim()
        .to_ascii_lowercase()
        .replace(char::is_whitespace, "-");
    record.version = 2;
    record
}

/// v2 wrote an empty participant field for unknown speakers; v3 omits it.
fn migrate_v2_empty_participant(mut record: StoryRecord) -> StoryRecord {
    if record
        .participant
        .as_ref()
        .map(|name| name.trim().is_empty())
        .unwrap_or(false)
    {
        record.participant = None;
    }
    record.version = 3;
    record
}

pub fn migrate(mut record: StoryRecord) -> Result<StoryRecord, String> {
    if record.version > CURRENT_SAVE_VERSION {
        return Err(format!(
            "story save version {} is newer than supported {}",
            record.version, CURRENT_SAVE_VERSION
        ));
    }
    while record.version < CURRENT_SAVE_VERSION {
        let version = record.version;
        let Some((_, step)) = MIGRATIONS.iter().find(|(from, _)| *from == version) else {
            return Err(format!("no migration from story save version {}", version));
        };
        record = step(record);
        if record.version <= version {
            return Err(format!(
                "migration from story save version {} did not advance",
                version
            ));
        }
    }
    Ok(record)
}

impl StoryRecord {
    fn serialize(&self) -> String {
        let mut lines = Vec::new();
        lines.push(format!("# moonshard story save v{}", self.version));
        lines.push(format!("version={}", self.version));
        lines.push(format!("story={}", self.story));
        if let Some(participant) = self.participant.as_ref() {
            lines.push(format!("participant={}", participant));
        }
        lines.push(format!("digest={}", blob_digest(&self.blob)));
        lines.push(format!("blob={}", BASE64_ENGINE.encode(&self.blob)));
        lines.push(String::new());
        lines.join("\n")
    }

    fn parse(data: &str) -> Result<Self, String> {
        let mut version = None;
        let mut story = None;
        let mut participant = None;
        let mut digest = None;
        let mut blob = None;
        for line in data.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                return Err(format!("malformed story save line '{}'", line));
            };
            match key.trim() {
                "version" => {
                    version = Some(
                        value
                            .trim()
                            .parse::<u32>()
                            .map_err(|_| format!("invalid story save version '{}'", value))?,
                    );
                }
                "story" => story = Some(value.trim().to_string()),
                "participant" => participant = Some(value.trim().to_string()),
                "digest" => digest = Some(value.trim().to_string()),
                "blob" => {
                    blob = Some(
                        BASE64_ENGINE
                            .decode(value.trim())
                            .map_err(|err| format!("invalid story save blob: {}", err))?,
                    );
                }
                _ => {}
            }
        }
        let version = version.ok_or_else(|| "story save missing version".to_string())?;
        let story = story.ok_or_else(|| "story save missing story".to_string())?;
        let blob = blob.ok_or_else(|| "story save missing blob".to_string())?;
        if let Some(expected) = digest {
            let actual = blob_digest(&blob);
            if expected != actual {
                return Err(format!(
                    "story save digest mismatch: expected {}, got {}",
                    expected, actual
                ));
            }
        }
        Ok(Self {
            version,
            story,
            participant,
            blob,
        })
    }
}

fn blob_digest(blob: &[u8]) -> String {
    let digest = Sha1::digest(blob);
    let mut hex = String::with_capacity(digest.len() * 2);
    for byte in digest {
        hex.push_str(&format!("{:02x}", byte));
    }
    hex
}

#[derive(Debug, Default)]
pub struct StorySaveReport {
    pub story_files: usize,
    pub parsed: usize,
    pub skipped: usize,
    pub errors: Vec<String>,
    pub missing_dir: bool,
}

/// Story save files under `<root>/save/stories/`, one per (story,
/// participant) key, with a one-deep backup written before every
/// overwrite. Corrupt or tampered files fall back to the backup.
#[derive(Debug, Clone)]
pub struct StorySaveStore {
    root: PathBuf,
}

impl StorySaveStore {
    pub fn from_root(root: &Path) -> Self {
        Self {
            root: root.join("save"),
        }
    }

    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn story_dir(&self) -> PathBuf {
        self.root.join("stories")
    }

    fn story_path(&self, key: &str) -> PathBuf {
        self.story_dir().join(format!("{}.sav", key))
    }

    fn story_backup_path(&self, key: &str) -> PathBuf {
        self.story_dir().join(format!("{}.bak", key))
    }

    pub fn save_story(&self, key: &str, record: &StoryRecord) -> Result<(), String> {
        validate_key(key)?;
        fs::create_dir_all(self.story_dir()).map_err(|err| {
            format!(
                "story save dir create failed for {}: {}",
                self.story_dir().display(),
                err
            )
        })?;
        let path = self.story_path(key);
        let backup_path = self.story_backup_path(key);
        if path.exists() {
            fs::copy(&path, &backup_path).map_err(|err| {
                format!(
                    "story save backup failed for {}: {}",
                    backup_path.display(),
                    err
                )
            })?;
        }
        fs::write(&path, record.serialize())
            .map_err(|err| format!("story save write failed for {}: {}", path.display(), err))
    }

    pub fn load_story(&self, key: &str) -> Result<Option<StoryRecord>, String> {
        validate_key(key)?;
        let path = self.story_path(key);
        let backup_path = self.story_backup_path(key);
        let data = match fs::read_to_string(&path) {
            Ok(data) => data,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return self.load_story_from_backup(&backup_path);
            }
            Err(err) => {
                return Err(format!(
                    "story save read failed for {}: {}",
                    path.display(),
                    err
                ))
            }
        };
        match StoryRecord::parse(&data) {
            Ok(record) => Ok(Some(migrate(record)?)),
            Err(err) => {
                if let Some(fallback) = self.load_story_from_backup(&backup_path)? {
                    eprintln!(
                        "moonshard: story save parse failed for {}, using backup: {}",
                        path.display(),
                        err
                    );
                    return Ok(Some(fallback));
                }
                Err(err)
            }
        }
    }

    fn load_story_from_backup(&self, backup_path: &Path) -> Result<Option<StoryRecord>, String> {
        let data = match fs::read_to_string(backup_path) {
            Ok(data) => data,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(format!(
                    "story save backup read failed for {}: {}",
                    backup_path.display(),
                    err
                ))
            }
        };
        let record = StoryRecord::parse(&data)?;
        Ok(Some(migrate(record)?))
    }

    pub fn validate_story_saves(&self) -> StorySaveReport {
        let story_dir = self.story_dir();
        let entries = match fs::read_dir(&story_dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                let mut report = StorySaveReport::default();
                report.missing_dir = true;
                return report;
            }
            Err(err) => {
                return StorySaveReport {
                    errors: vec![format!(
                        "story save dir read failed for {}: {}",
                        story_dir.display(),
                        err
                    )],
                    ..StorySaveReport::default()
                };
            }
        };

        let mut report = StorySaveReport::default();
        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    report.errors.push(format!(
                        "story save dir entry failed for {}: {}",
                        story_dir.display(),
                        err
                    ));
                    continue;
                }
            };
            let path = entry.path();
            let is_save = path
                .extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| ext.eq_ignore_ascii_case("sav"))
                .unwrap_or(false);
            if !is_save {
                report.skipped += 1;
                continue;
            }
            report.story_files += 1;
            let data = match fs::read_to_string(&path) {
                Ok(data) => data,
                Err(err) => {
                    report
                        .errors
                        .push(format!("story save {}: {}", path.display(), err));
                    continue;
                }
            };
            match StoryRecord::parse(&data).and_then(migrate) {
                Ok(_) => report.parsed += 1,
                Err(err) => report
                    .errors
                    .push(format!("story save {}: {}", path.display(), err)),
            }
        }
        report
    }
}

fn validate_key(key: &str) -> Result<(), String> {
    if key.is_empty() {
        return Err("story save key is empty".to_string());
    }
    if !key
        .chars()
        .all(|ch| ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '-')
    {
        return Err(format!("story save key '{}' has invalid characters", key));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static TEST_DIR_SEQ: AtomicUsize = AtomicUsize::new(0);

    fn scratch_store() -> (PathBuf, StorySaveStore) {
        let seq = TEST_DIR_SEQ.fetch_add(1, Ordering::SeqCst);
        let dir = std::env::temp_dir().join(format!(
            "moonshard-saves-{}-{}",
            std::process::id(),
            seq
        ));
        let _ = fs::remove_dir_all(&dir);
        (dir.clone(), StorySaveStore::new(dir))
    }

    fn record(blob: &[u8]) -> StoryRecord {
        StoryRecord {
            version: CURRENT_SAVE_VERSION,
            story: "gatewarden".to_string(),
            participant: Some("Elda".to_string()),
            blob: blob.to_vec(),
        }
    }

    #[test]
    fn save_then_load_round_trips() {
        let (dir, store) = scratch_store();
        store
            .save_story("gatewarden-1", &record(b"topic=3\n"))
            .expect("save");
        let loaded = store
            .load_story("gatewarden-1")
            .expect("load")
            .expect("record present");
        assert_eq!(loaded, record(b"topic=3\n"));
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn missing_story_loads_as_none() {
        let (dir, store) = scratch_store();
        assert_eq!(store.load_story("nobody-9").expect("load"), None);
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn tampered_blob_falls_back_to_the_backup() {
        let (dir, store) = scratch_store();
        store
            .save_story("gatewarden-1", &record(b"topic=1\n"))
            .expect("first save");
        // Second save moves the first file into the backup slot.
        store
            .save_story("gatewarden-1", &record(b"topic=2\n"))
            .expect("second save");

        let path = dir.join("stories").join("gatewarden-1.sav");
        let tampered = fs::read_to_string(&path)
            .expect("read save")
            .replace("digest=", "digest=0");
        fs::write(&path, tampered).expect("tamper");

        let loaded = store
            .load_story("gatewarden-1")
            .expect("load")
            .expect("backup record");
        assert_eq!(loaded.blob, b"topic=1\n".to_vec());
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn keys_with_path_characters_are_rejected() {
        let (dir, store) = scratch_store();
        assert!(store.load_story("../escape").is_err());
        assert!(store.save_story("UPPER", &record(b"x")).is_err());
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn v1_migration_normalizes_story_keys() {
        let old = StoryRecord {
            version: 1,
            story: "The Gate Warden".to_string(),
            participant: None,
            blob: Vec::new(),
        };
        let migrated = migrate_v1_story_keys(old);
        assert_eq!(migrated.version, 2);
        assert_eq!(migrated.story, "the-gate-warden");
    }

    #[test]
    fn v2_migration_drops_empty_participants() {
        let old = StoryRecord {
            version: 2,
            story: "gatewarden".to_string(),
            participant: Some("  ".to_string()),
            blob: Vec::new(),
        };
        let migrated = migrate_v2_empty_participant(old);
        assert_eq!(migrated.version, 3);
        assert_eq!(migrated.participant, None);
    }

    #[test]
    fn migration_chain_lifts_a_v1_record_to_current() {
        let old = StoryRecord {
            version: 1,
            story: "Old Tale".to_string(),
            participant: Some(String::new()),
            blob: b"turns=4\n".to_vec(),
        };
        let migrated = migrate(old).expect("migrate");
        assert_eq!(migrated.version, CURRENT_SAVE_VERSION);
        assert_eq!(migrated.story, "old-tale");
        assert_eq!(migrated.participant, None);
        assert_eq!(migrated.blob, b"turns=4\n".to_vec());
    }

    #[test]
    fn newer_versions_are_refused() {
        let record = StoryRecord {
            version: CURRENT_SAVE_VERSION + 1,
            story: "future".to_string(),
            participant: None,
            blob: Vec::new(),
        };
        assert!(migrate(record).is_err());
    }

    #[test]
    fn loading_applies_migrations_to_old_files() {
        let (dir, store) = scratch_store();
        let stories = dir.join("stories");
        fs::create_dir_all(&stories).expect("mkdir");
        let blob = b"topic=0\n";
        let data = format!(
            "version=1\nstory=Old Tale\ndigest={}\nblob={}\n",
            blob_digest(blob),
            BASE64_ENGINE.encode(blob)
        );
        fs::write(stories.join("old-tale-1.sav"), data).expect("write v1 save");

        let loaded = store
            .load_story("old-tale-1")
            .expect("load")
            .expect("record");
        assert_eq!(loaded.version, CURRENT_SAVE_VERSION);
        assert_eq!(loaded.story, "old-tale");
        let _ = fs::remove_dir_all(dir);
    }
}
