//! Symbolic keys for static array indices.
//!
//! Elements of static arrays are addressed by a bare array index on the
//! wire, but the JSON form uses the matching game enum entry as the key so
//! edited files stay readable. Arrays without a known enum (or indices past
//! the end of one) fall back to `<ArrayName>_<index>`, which parses back to
//! the same index.

use crate::error::{Error, Result};

struct IndexEnum {
    array: &'static str,
    entries: &'static [&'static str],
}

/// Known index enums, in game order. These lists only need to cover the
/// indices that actually occur, the fallback key handles the rest.
static INDEX_ENUMS: &[IndexEnum] = &[
    IndexEnum {
        array: "Currency",
        entries: &["Gold", "Chips"],
    },
    IndexEnum {
        array: "Stats",
        entries: &["Health", "Attack", "Defense", "Magic"],
    },
    IndexEnum {
        array: "NumConsumable",
        entries: &[
            "SmallHealthPotion",
            "LargeHealthPotion",
            "AttackElixir",
            "DefenseElixir",
            "MagicElixir",
            "ShieldOil",
        ],
    },
    IndexEnum {
        array: "ShowConsumableBadge",
        entries: &[
            "SmallHealthPotion",
            "LargeHealthPotion",
            "AttackElixir",
            "DefenseElixir",
            "MagicElixir",
            "ShieldOil",
        ],
    },
    IndexEnum {
        array: "LastEquippedWeaponOfType",
        entries: &["LightWeapon", "HeavyWeapon", "DualWeapon"],
    },
    IndexEnum {
        array: "SavedCheevo",
        entries: &[
            "FirstKill",
            "BloodlineFive",
            "BloodlineTen",
            "AllTreasure",
            "MaxLevel",
        ],
    },
];

fn entries_for(array: &str) -> Option<&'static [&'static str]> {
    INDEX_ENUMS
        .iter()
        .find(|e| e.array == array)
        .map(|e| e.entries)
}

/// Key used in JSON for the element of `array` stored at `index`.
pub fn key_for_index(array: &str, index: i32) -> String {
    if index >= 0 {
        if let Some(entries) = entries_for(array) {
            if let Some(entry) = entries.get(index as usize) {
                return (*entry).to_string();
            }
        }
    }
    format!("{array}_{index}")
}

/// Maps a JSON key back to the array index it stands for.
pub fn index_for_key(array: &str, key: &str) -> Result<i32> {
    if let Some(entries) = entries_for(array) {
        if let Some(position) = entries.iter().position(|e| *e == key) {
            return Ok(position as i32);
        }
    }
    key.strip_prefix(array)
        .and_then(|rest| rest.strip_prefix('_'))
        .and_then(|digits| digits.parse().ok())
        .ok_or_else(|| Error::UnknownIndexKey {
            array: array.to_string(),
            key: key.to_string(),
        })
}
