use std::collections::HashMap;

use once_cell::sync::Lazy;
use serde::Serialize;

use crate::package::Title;

/// Element kind of an array field. Array payloads carry no per-element type
/// information, so the kind always comes from the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ElementKind {
    Int,
    Float,
    Bool,
    Byte,
    Str,
    Name,
    Struct,
}

/// How an array field is laid out on the wire.
///
/// Static arrays are not tagged as arrays at all. Each element appears as an
/// ordinary field that reuses the array's name with its own array index, and
/// the run of same-named fields is grouped back together during decoding.
/// Dynamic arrays carry a real `ArrayProperty` tag with an entry count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ArrayStorage {
    Static,
    Dynamic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArrayShape {
    pub name: &'static str,
    pub kind: ElementKind,
    pub storage: ArrayStorage,
    /// Struct name written inside elements of struct-kind static arrays,
    /// which is not recoverable from JSON and has to be restored from here.
    pub alt_struct_name: Option<&'static str>,
}

const fn shape(
    name: &'static str,
    kind: ElementKind,
    storage: ArrayStorage,
    alt_struct_name: Option<&'static str>,
) -> ArrayShape {
    ArrayShape {
        name,
        kind,
        storage,
        alt_struct_name,
    }
}

use ArrayStorage::{Dynamic, Static};
use ElementKind::{Byte, Float, Int, Name, Str, Struct};

/// Shapes shared by every title.
static COMMON: &[ArrayShape] = &[
    // static arrays
    shape("Currency", Struct, Static, Some("CurrencyStruct")),
    shape("Stats", Struct, Static, Some("PlayerSavedStats")),
    shape("NumConsumable", Int, Static, None),
    shape("ShowConsumableBadge", Byte, Static, Some("ShowConsumableBadge")),
    shape("GemCooker", Struct, Static, Some("GemCookerData")),
    shape("ItemForge", Struct, Static, Some("ItemForgeData")),
    shape("PotionCauldron", Struct, Static, Some("PotionCauldronData")),
    shape("SavedCheevo", Struct, Static, Some("SavedCheevoData")),
    shape("LastEquippedWeaponOfType", Name, Static, Some("LastEquippedWeaponOfType")),
    shape("CharacterEquippedList", Struct, Static, Some("PlayerEquippedItemList")),
    // dynamic arrays
    shape("EquippedItemNames", Name, Dynamic, None),
    shape("EquippedItems", Name, Dynamic, None),
    shape("LinkNotificationBadges", Struct, Dynamic, None),
    shape("CurrentKeyItemList", Name, Dynamic, None),
    shape("UsedKeyItemList", Name, Dynamic, None),
    shape("PlayerInventory", Struct, Dynamic, None),
    shape("PlayerUnequippedGems", Struct, Dynamic, None),
    shape("CurrentStoreGems", Struct, Dynamic, None),
    shape("InActivePotionList", Struct, Dynamic, None),
    shape("ActivePotions", Struct, Dynamic, None),
    shape("PurchasedPerks", Name, Dynamic, None),
    shape("GameFlagList", Int, Dynamic, None),
    shape("BossFixedWorldInfo", Struct, Dynamic, None),
    shape("WorldItemOrderList", Name, Dynamic, None),
    shape("TreasureChestOpened", Name, Dynamic, None),
    shape("BossesGeneratedThisBloodline", Str, Dynamic, None),
    shape("PotentialBossElementalAttacks", Name, Dynamic, None),
    shape("PerLevelData", Struct, Dynamic, None),
    shape("CurrentBattleChallengeList", Name, Dynamic, None),
    shape("SavedPersistentBossData", Struct, Dynamic, None),
    shape("HardCoreCurrentQuestData", Name, Dynamic, None),
    shape("LoggedAnalyticsAchievements", Name, Dynamic, None),
    shape("McpAuthorizedServices", Name, Dynamic, None),
    // arrays that only occur nested inside struct elements
    shape("Gems", Struct, Dynamic, None),
    shape("SocketedGemData", Struct, Dynamic, None),
    shape("Reagents", Name, Dynamic, None),
    shape("BossElementalRandList", Float, Dynamic, None),
    shape("PersistActorCounts", Struct, Dynamic, None),
    shape("DontClearPersistActorCounts", Struct, Dynamic, None),
    shape("SavedItems", Name, Dynamic, None),
    shape("Quests", Struct, Dynamic, None),
    shape("PendingAction", Struct, Dynamic, None),
    shape("PlayerCookerGems", Struct, Dynamic, None),
    shape("SuperBoss", Int, Dynamic, None),
    shape("ActiveBattlePotions", Name, Dynamic, None),
    shape("SocialChallengeSaveEvents", Struct, Dynamic, Some("SocialChallengeSave")),
    shape("GiftedTo", Struct, Dynamic, None),
    shape("GiftedFrom", Struct, Dynamic, None),
    shape("PlaythroughItemsGiven", Name, Dynamic, None),
    shape("EquippedListO", Name, Dynamic, None),
    shape("EquippedListR", Name, Dynamic, None),
];

// TouchTreasureAwards changed representation after the first game.
static IB1_OVERRIDES: &[ArrayShape] = &[shape("TouchTreasureAwards", Name, Dynamic, None)];
static LATER_OVERRIDES: &[ArrayShape] = &[shape("TouchTreasureAwards", Struct, Dynamic, None)];

fn overrides(title: Title) -> &'static [ArrayShape] {
    match title {
        Title::Ib1 => IB1_OVERRIDES,
        Title::Ib2 | Title::Ib3 | Title::Vote => LATER_OVERRIDES,
    }
}

static TABLES: Lazy<HashMap<Title, HashMap<&'static str, &'static ArrayShape>>> = Lazy::new(|| {
    [Title::Ib1, Title::Ib2, Title::Ib3, Title::Vote]
        .into_iter()
        .map(|title| {
            let mut table: HashMap<&'static str, &'static ArrayShape> =
                COMMON.iter().map(|s| (s.name, s)).collect();
            for s in overrides(title) {
                table.insert(s.name, s);
            }
            (title, table)
        })
        .collect()
});

/// Looks up the shape of an array field for the given title.
pub fn lookup(title: Title, name: &str) -> Option<&'static ArrayShape> {
    TABLES[&title].get(name).copied()
}

/// Struct name for standalone struct fields whose wire form does not repeat
/// the field name. Unlisted fields write an empty struct name.
pub fn struct_alt_name(field_name: &str) -> Option<&'static str> {
    match field_name {
        "Data" => Some("ItemEnhanceData"),
        "ForcedMapVariation" => Some("BossMapDefinition"),
        "CurrentTotalTrackingStats" => Some("BattleTrackingStats"),
        "GameOptions" => Some("PersistGameOptions"),
        "SocialChallengeSaveEvents" => Some("SocialChallengeSave"),
        _ => None,
    }
}
