use crate::orders::deed::{LargeWorkOrder, Material, WorkOrder};
use std::fs;
use std::path::{Path, PathBuf};

pub const CURRENT_ORDER_VERSION: u32 = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderRecord {
    pub version: u32,
    pub large: bool,
    pub entries: Vec<WorkOrder>,
}

// v1 deeds wrote the legacy catch-all "wood" material; the entry parser
// maps it to oak, and loaded records are lifted to the current version.

impl OrderRecord {
    pub fn from_large(order: &LargeWorkOrder) -> Self {
        Self {
            version: CURRENT_ORDER_VERSION,
            large: true,
            entries: order.entries.clone(),
        }
    }

    pub fn from_small(order: &WorkOrder) -> Self {
        Self {
            version: CURRENT_ORDER_VERSION,
            large: false,
            entries: vec![order.clone()],
        }
    }

    pub fn into_large(self) -> LargeWorkOrder {
        LargeWorkOrder::new(self.entries)
    }

    fn serialize(&self) -> String {
        let mut lines = Vec::new();
        lines.push(format!("# moonshard work order v{}", self.version));
        lines.push(format!("version={}", self.version));
        lines.push(format!("kind={}", if self.large { "large" } else { "small" }));
        for entry in &self.entries {
            lines.push(format!(
                "entry={},{},{},{},{}",
                entry.item_kind,
                entry.material.name(),
                if entry.require_exceptional { 1 } else { 0 },
                entry.amount_cur,
                entry.amount_max
            ));
        }
        lines.push(String::new());
        lines.join("\n")
    }

    fn parse(data: &str, legacy_material: Material) -> Result<Self, String> {
        let mut version = None;
        let mut large = false;
        let mut entries = Vec::new();
        for line in data.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                return Err(format!("malformed work order line '{}'", line));
            };
            match key.trim() {
                "version" => {
                    version = Some(
                        value
                            .trim()
                            .parse::<u32>()
                            .map_err(|_| format!("invalid work order version '{}'", value))?,
                    );
                }
                "kind" => large = value.trim().eq_ignore_ascii_case("large"),
                "entry" => entries.push(parse_entry(value, legacy_material)?),
                _ => {}
            }
        }
        let version = version.ok_or_else(|| "work order missing version".to_string())?;
        if entries.is_empty() {
            return Err("work order has no entries".to_string());
        }
        Ok(Self {
            version,
            large,
            entries,
        })
    }
}

fn parse_entry(value: &str, legacy_material: Material) -> Result<WorkOrder, String> {
    let fields: Vec<&str> = value.split(',').collect();
    if fields.len() != 5 {
        return Err(format!("work order entry expects 5 fields, got '{}'", value));
    }
    let item_kind = fields[0].trim();
    if item_kind.is_empty() {
        return Err("work order entry missing item kind".to_string());
    }
    let material = match fields[1].trim() {
        "wood" => legacy_material,
        name => Material::from_name(name)
            .ok_or_else(|| format!("unknown work order material '{}'", name))?,
    };
    let require_exceptional = fields[2].trim() == "1";
    let amount_cur = fields[3]
        .trim()
        .parse::<u32>()
        .map_err(|_| format!("invalid work order amount '{}'", fields[3]))?;
    let amount_max = fields[4]
        .trim()
        .parse::<u32>()
        .map_err(|_| format!("invalid work order amount '{}'", fields[4]))?;
    let mut entry = WorkOrder::new(item_kind, material, require_exceptional, amount_max);
    entry.amount_cur = amount_cur.min(entry.amount_max);
    Ok(entry)
}

/// Work order deeds under `<root>/save/orders/`, one file per deed key,
/// same backup-before-overwrite discipline as the story saves.
#[derive(Debug, Clone)]
pub struct OrderStore {
    root: PathBuf,
}

impl OrderStore {
    pub fn from_root(root: &Path) -> Self {
        Self {
            root: root.join("save"),
        }
    }

    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn order_dir(&self) -> PathBuf {
        self.root.join("orders")
    }

    fn order_path(&self, key: &str) -> PathBuf {
        self.order_dir().join(format!("{}.bod", key))
    }

    fn order_backup_path(&self, key: &str) -> PathBuf {
        self.order_dir().join(format!("{}.bak", key))
    }

    pub fn save_order(&self, key: &str, record: &OrderRecord) -> Result<(), String> {
        validate_key(key)?;
        fs::create_dir_all(self.order_dir()).map_err(|err| {
            format!(
                "work order dir create failed for {}: {}",
                self.order_dir().display(),
                err
            )
        })?;
        let path = self.order_path(key);
        let backup_path = self.order_backup_path(key);
        if path.exists() {
            fs::copy(&path, &backup_path).map_err(|err| {
                format!(
                    "work order backup failed for {}: {}",
                    backup_path.display(),
                    err
                )
            })?;
        }
        fs::write(&path, record.serialize())
            .map_err(|err| format!("work order write failed for {}: {}", path.display(), err))
    }

    pub fn load_order(&self, key: &str) -> Result<Option<OrderRecord>, String> {
        validate_key(key)?;
        let path = self.order_path(key);
        let data = match fs::read_to_string(&path) {
            Ok(data) => data,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(format!(
                    "work order read failed for {}: {}",
                    path.display(),
                    err
                ))
            }
        };
        let mut record = OrderRecord::parse(&data, Material::Oak)?;
        if record.version > CURRENT_ORDER_VERSION {
            return Err(format!(
                "work order version {} is newer than supported {}",
                record.version, CURRENT_ORDER_VERSION
            ));
        }
        record.version = CURRENT_ORDER_VERSION;
        Ok(Some(record))
    }
}

fn validate_key(key: &str) -> Result<(), String> {
    if key.is_empty() {
        return Err("work order key is empty".to_string());
    }
    if !key
        .chars()
        .all(|ch| ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '-')
    {
        return Err(format!("work order key '{}' has invalid characters", key));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static TEST_DIR_SEQ: AtomicUsize = AtomicUsize::new(0);

    fn scratch_store() -> (PathBuf, OrderStore) {
        let seq = TEST_DIR_SEQ.fetch_add(1, Ordering::SeqCst);
        let dir = std::env::temp_dir().join(format!(
            "moonshard-orders-{}-{}",
            std::process::id(),
            seq
        ));
        let _ = fs::remove_dir_all(&dir);
        (dir.clone(), OrderStore::new(dir))
    }

    #[test]
    fn deed_round_trips_through_the_store() {
        let (dir, store) = scratch_store();
        let mut deed = LargeWorkOrder::new(vec![
            WorkOrder::new("buckler", Material::Iron, false, 10),
            WorkOrder::new("heater shield", Material::Iron, true, 5),
        ]);
        deed.entries[0].amount_cur = 3;
        store
            .save_order("smith-deed-7", &OrderRecord::from_large(&deed))
            .expect("save");
        let loaded = store
            .load_order("smith-deed-7")
            .expect("load")
            .expect("record");
        assert!(loaded.large);
        assert_eq!(loaded.into_large(), deed);
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn legacy_wood_material_maps_to_oak() {
        let (dir, store) = scratch_store();
        let orders = dir.join("orders");
        fs::create_dir_all(&orders).expect("mkdir");
        fs::write(
            orders.join("old-deed.bod"),
            "version=1\nkind=small\nentry=serving bowl,wood,0,2,6\n",
        )
        .expect("write legacy order");

        let loaded = store
            .load_order("old-deed")
            .expect("load")
            .expect("record");
        assert_eq!(loaded.version, CURRENT_ORDER_VERSION);
        assert_eq!(loaded.entries[0].material, Material::Oak);
        assert_eq!(loaded.entries[0].amount_cur, 2);
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn overfilled_amounts_are_clamped_on_load() {
        let entry = parse_entry("buckler,iron,0,9,5", Material::Oak).expect("parse entry");
        assert_eq!(entry.amount_cur, 5);
        assert!(entry.is_full());
    }

    #[test]
    fn unknown_material_is_an_error() {
        assert!(parse_entry("buckler,mithril,0,0,5", Material::Oak).is_err());
    }

    #[test]
    fn newer_order_versions_are_refused() {
        let (dir, store) = scratch_store();
        let orders = dir.join("orders");
        fs::create_dir_all(&orders).expect("mkdir");
        fs::write(
            orders.join("future-deed.bod"),
            format!(
                "version={}\nkind=small\nentry=buckler,iron,0,0,5\n",
                CURRENT_ORDER_VERSION + 1
            ),
        )
        .expect("write future order");
        assert!(store.load_order("future-deed").is_err());
        let _ = fs::remove_dir_all(dir);
    }
}
