/// One labeled image flowing between stages. Stages consume items by value
/// and produce new ones; `id` is carried through unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetItem {
    pub id: u32,
    pub label: String,
    pub image: Vec<u8>,
    pub storage_url: Option<String>,
}

impl DatasetItem {
    pub fn new(id: u32, label: impl Into<String>, image: Vec<u8>) -> Self {
        Self {
            id,
            label: label.into(),
            image,
            storage_url: None,
        }
    }

    /// Same id and label, new bytes. Any previous storage URL pointed at the
    /// old bytes and is dropped.
    pub fn with_image(&self, image: Vec<u8>) -> Self {
        Self {
            id: self.id,
            label: self.label.clone(),
            image,
            storage_url: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Variation {
    pub id: u32,
    pub name: &'static str,
    pub scene: &'static str,
}

pub const VARIATIONS: [Variation; 5] = [
    Variation {
        id: 1,
        name: "professional",
        scene: "Professional headshot, studio lighting, clean background, confident expression",
    },
    Variation {
        id: 2,
        name: "casual_3/4",
        scene: "Casual 3/4 angle portrait, natural light, relaxed smile, indoor setting",
    },
    Variation {
        id: 3,
        name: "side_profile",
        scene: "Artistic side profile, dramatic lighting, dark background, thoughtful expression",
    },
    Variation {
        id: 4,
        name: "outdoor",
        scene: "Outdoor portrait, natural daylight, urban background, candid",
    },
    Variation {
        id: 5,
        name: "serious",
        scene: "Direct eye contact, serious authoritative expression, high contrast",
    },
];

pub const MAX_DATASET_COUNT: usize = VARIATIONS.len();
pub const DEFAULT_DATASET_COUNT: usize = MAX_DATASET_COUNT;

/// First `count` variations, clamped to the table size.
pub fn variations_for(count: usize) -> &'static [Variation] {
    &VARIATIONS[..count.min(MAX_DATASET_COUNT)]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn count_is_clamped_to_table() {
        assert_eq!(variations_for(50).len(), MAX_DATASET_COUNT);
        assert_eq!(variations_for(0).len(), 0);
        let ids: Vec<u32> = variations_for(3).iter().map(|v| v.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn with_image_keeps_identity_and_drops_stale_url() {
        let mut item = DatasetItem::new(4, "outdoor", vec![1]);
        item.storage_url = Some("https://example.test/a.jpg".to_string());
        let next = item.with_image(vec![2]);
        assert_eq!(next.id, 4);
        assert_eq!(next.label, "outdoor");
        assert_eq!(next.image, vec![2]);
        assert!(next.storage_url.is_none());
    }
}
