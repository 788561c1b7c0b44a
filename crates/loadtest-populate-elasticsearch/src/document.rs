//! Random placeholder documents.

use rand::Rng;
use serde::Serialize;
use std::collections::BTreeMap;

/// Flag fields a document may carry, always taken from the front of the list.
pub const SYSTEM_SETTINGS: [&str; 6] = [
    "SETTING_1",
    "SETTING_2",
    "SETTING_3",
    "SETTING_4",
    "SETTING_5",
    "SETTING_6",
];

/// Exclusive upper bound of `another_id`.
pub const ANOTHER_ID_BOUND: u32 = 1000;

/// `{"user_id": .., "another_id": .., "SETTING_1": 0|1, ...}`
#[derive(Debug, Clone, Serialize)]
pub struct MockDocument {
    pub user_id: i32,
    pub another_id: u32,
    #[serde(flatten)]
    pub settings: BTreeMap<&'static str, u8>,
}

impl MockDocument {
    /// Draw a document. The flag count is drawn from `0..6` and raised to 1
    /// when zero, so a document has between 1 and 5 flags.
    pub fn random<R: Rng>(rng: &mut R) -> Self {
        let user_id = rng.gen_range(0..i32::MAX);
        let another_id = rng.gen_range(0..ANOTHER_ID_BOUND);
        let count = rng.gen_range(0..SYSTEM_SETTINGS.len()).max(1);
        let settings = SYSTEM_SETTINGS[..count]
            .iter()
            .map(|name| (*name, u8::from(rng.gen_bool(0.5))))
            .collect();

        Self {
            user_id,
            another_id,
            settings,
        }
    }

    pub fn to_json(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::to_value(self)
    }
}
