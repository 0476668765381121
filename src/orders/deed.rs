/// Materials a work order can demand. The crafting tables of the full
/// shard carry many more; the combine protocol only needs identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Material {
    Iron,
    Copper,
    Bronze,
    Oak,
    Ash,
}

impl Material {
    pub fn name(self) -> &'static str {
        match self {
            Material::Iron => "iron",
            Material::Copper => "copper",
            Material::Bronze => "bronze",
            Material::Oak => "oak",
            Material::Ash => "ash",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "iron" => Some(Material::Iron),
            "copper" => Some(Material::Copper),
            "bronze" => Some(Material::Bronze),
            "oak" => Some(Material::Oak),
            "ash" => Some(Material::Ash),
            _ => None,
        }
    }
}

/// Capability lookups for combinable items. Each item variant answers
/// for itself; the order never inspects concrete types.
pub trait HasMaterial {
    fn material(&self) -> Material;
}

pub trait HasQuality {
    fn is_exceptional(&self) -> bool;
}

pub trait OrderItem: HasMaterial + HasQuality {
    fn item_kind(&self) -> &str;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CraftedItem {
    pub kind: String,
    pub material: Material,
    pub exceptional: bool,
}

impl HasMaterial for CraftedItem {
    fn material(&self) -> Material {
        self.material
    }
}

impl HasQuality for CraftedItem {
    fn is_exceptional(&self) -> bool {
        self.exceptional
    }
}

impl OrderItem for CraftedItem {
    fn item_kind(&self) -> &str {
        &self.kind
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CombineOutcome {
    Accepted,
    AlreadyFull,
    WrongKind,
    WrongMaterial,
    NotExceptional,
}

/// One line of a work order: so many of one item kind, in one material,
/// optionally exceptional only. The first failing check decides.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkOrder {
    pub item_kind: String,
    pub material: Material,
    pub require_exceptional: bool,
    pub amount_cur: u32,
    pub amount_max: u32,
}

impl WorkOrder {
    pub fn new(
        item_kind: impl Into<String>,
        material: Material,
        require_exceptional: bool,
        amount_max: u32,
    ) -> Self {
        Self {
            item_kind: item_kind.into(),
            material,
            require_exceptional,
            amount_cur: 0,
            amount_max: amount_max.max(1),
        }
    }

    pub fn is_full(&self) -> bool {
        self.amount_cur >= self.amount_max
    }

    pub fn combine(&mut self, item: &impl OrderItem) -> CombineOutcome {
        if self.is_full() {
            return CombineOutcome::AlreadyFull;
        }
        if !item.item_kind().eq_ignore_ascii_case(&self.item_kind) {
            return CombineOutcome::WrongKind;
        }
        if item.material() != self.material {
            return CombineOutcome::WrongMaterial;
        }
        if self.require_exceptional && !item.is_exceptional() {
            return CombineOutcome::NotExceptional;
        }
        self.amount_cur += 1;
        CombineOutcome::Accepted
    }
}

/// A set of work orders filled as one deed. Combining routes the item to
/// the first entry that wants it; the deed completes when every entry is
/// full.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LargeWorkOrder {
    pub entries: Vec<WorkOrder>,
}

impl LargeWorkOrder {
    pub fn new(entries: Vec<WorkOrder>) -> Self {
        Self { entries }
    }

    pub fn is_complete(&self) -> bool {
        !self.entries.is_empty() && self.entries.iter().all(WorkOrder::is_full)
    }

    pub fn combine(&mut self, item: &impl OrderItem) -> CombineOutcome {
        let mut outcome = CombineOutcome::WrongKind;
        for entry in &mut self.entries {
            match entry.combine(item) {
                CombineOutcome::Accepted => return CombineOutcome::Accepted,
                CombineOutcome::WrongKind => {}
                other => outcome = other,
            }
        }
        outcome
    }
}
