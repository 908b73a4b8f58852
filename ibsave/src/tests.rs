use serde_json::json;

use crate::*;

fn ws(buf: &mut Vec<u8>, value: &str) {
    if value.is_empty() {
        buf.extend_from_slice(&0i32.to_le_bytes());
        return;
    }
    buf.extend_from_slice(&(value.len() as i32 + 1).to_le_bytes());
    buf.extend_from_slice(value.as_bytes());
    buf.push(0);
}

fn wi(buf: &mut Vec<u8>, value: i32) {
    buf.extend_from_slice(&value.to_le_bytes());
}

fn wu(buf: &mut Vec<u8>, value: u32) {
    buf.extend_from_slice(&value.to_le_bytes());
}

fn header(version: u32, magic: u32) -> Vec<u8> {
    let mut buf = Vec::new();
    wu(&mut buf, version);
    wu(&mut buf, magic);
    buf
}

fn tag(buf: &mut Vec<u8>, name: &str, type_name: &str, size: i32, array_index: i32) {
    ws(buf, name);
    ws(buf, type_name);
    wi(buf, size);
    wi(buf, array_index);
}

fn int_field(buf: &mut Vec<u8>, name: &str, array_index: i32, value: i32) {
    tag(buf, name, "IntProperty", 4, array_index);
    wi(buf, value);
}

fn unencrypted_ib3_info(package_name: &str) -> PackageInfo {
    PackageInfo {
        package_name: package_name.to_string(),
        save_version: SAVE_FILE_VERSION_IB3,
        save_magic: NO_MAGIC,
        encrypted: false,
        title: Title::Ib3,
    }
}

#[test]
fn gold_round_trips_through_json() {
    let mut data = header(SAVE_FILE_VERSION_IB3, NO_MAGIC);
    int_field(&mut data, "Gold", 0, 100);
    ws(&mut data, NONE);

    let save = SaveFile::read_as(&data, "Save", Title::Ib3).unwrap();
    assert_eq!(save.properties.len(), 1);
    assert_eq!(save.properties[0].inner, PropertyInner::Int(100));

    let doc = save.to_json().unwrap();
    assert_eq!(doc, json!({ "Gold": 100 }));

    let rebuilt = SaveFile::from_json(save.info.clone(), &doc).unwrap();
    assert_eq!(rebuilt.write().unwrap(), data);
}

#[test]
fn binary_round_trip_preserves_declared_sizes() {
    let mut data = header(SAVE_FILE_VERSION_IB3, NO_MAGIC);
    // declared sizes are echoed as stored, never re-measured, so even an
    // off-by-a-few declared size must survive the trip
    let mut payload = Vec::new();
    ws(&mut payload, "PersistGameOptions");
    int_field(&mut payload, "MusicVolume", 0, 3);
    ws(&mut payload, NONE);
    tag(&mut data, "GameOptions", "StructProperty", 57, 0);
    data.extend_from_slice(&payload);
    ws(&mut data, NONE);

    let save = SaveFile::read_as(&data, "Save", Title::Ib3).unwrap();
    assert_eq!(save.properties[0].size, 57);
    assert_eq!(save.write().unwrap(), data);
}

#[test]
fn classifies_unencrypted_headers() {
    let mut pc = header(SAVE_FILE_VERSION_PC, NO_MAGIC);
    ws(&mut pc, NONE);
    let info = PackageInfo::resolve(&pc, "pc").unwrap();
    assert_eq!(info.title, Title::Ib1);
    assert!(!info.encrypted);

    // version three with no engine marker is a backup from the second game
    let mut ib2 = header(SAVE_FILE_VERSION_IB3, NO_MAGIC);
    ws(&mut ib2, NONE);
    let info = PackageInfo::resolve(&ib2, "ib2").unwrap();
    assert_eq!(info.title, Title::Ib2);
    assert!(!info.encrypted);
}

#[test]
fn classifies_ib3_by_engine_version_marker() {
    let mut data = header(SAVE_FILE_VERSION_IB3, NO_MAGIC);
    ws(&mut data, NONE);
    // the marker string sits exactly 62 bytes before the end of the file
    ws(&mut data, "CurrentEngineVersion");
    data.extend_from_slice(&[0u8; 37]);

    let info = PackageInfo::resolve(&data, "ib3").unwrap();
    assert_eq!(info.title, Title::Ib3);
}

#[test]
fn unclassifiable_encrypted_header_is_an_error() {
    let mut data = header(7, NO_MAGIC);
    data.extend_from_slice(&[0u8; 16]);
    match PackageInfo::resolve(&data, "junk") {
        Err(Error::UnknownTitle { save_version, .. }) => assert_eq!(save_version, 7),
        other => panic!("expected UnknownTitle, got {other:?}"),
    }
}

fn scalar_fixture() -> Vec<Property> {
    vec![
        Property {
            name: "Gold".to_string(),
            size: 4,
            array_index: 0,
            element_size: None,
            inner: PropertyInner::Int(500),
        },
        Property {
            name: "HeroName".to_string(),
            size: string_wire_len("Siris"),
            array_index: 0,
            element_size: None,
            inner: PropertyInner::Str("Siris".to_string()),
        },
    ]
}

#[test]
fn encrypted_ib2_round_trips() {
    let info = PackageInfo {
        package_name: "slot0".to_string(),
        save_version: IB2_SAVE_MAGIC,
        save_magic: 0,
        encrypted: true,
        title: Title::Ib2,
    };
    let save = SaveFile {
        info,
        properties: scalar_fixture(),
    };
    let data = save.write().unwrap();

    let read = SaveFile::read(&data, "slot0").unwrap();
    assert_eq!(read.info.title, Title::Ib2);
    assert!(read.info.encrypted);
    assert_eq!(read.properties, save.properties);
    assert_eq!(read.write().unwrap(), data);
}

#[test]
fn encrypted_vote_round_trips() {
    let info = PackageInfo {
        package_name: "vote".to_string(),
        save_version: IB2_SAVE_MAGIC,
        save_magic: 0,
        encrypted: true,
        title: Title::Vote,
    };
    let save = SaveFile {
        info,
        properties: scalar_fixture(),
    };
    let data = save.write().unwrap();

    // shares the second game's outer header, told apart by trial decryption
    let read = SaveFile::read(&data, "vote").unwrap();
    assert_eq!(read.info.title, Title::Vote);
    assert_eq!(read.properties, save.properties);
    assert_eq!(read.write().unwrap(), data);
}

#[test]
fn encrypted_ib1_round_trips() {
    let info = PackageInfo {
        package_name: "swordsave".to_string(),
        save_version: 2,
        save_magic: IB1_SAVE_MAGIC,
        encrypted: true,
        title: Title::Ib1,
    };
    let save = SaveFile {
        info,
        properties: scalar_fixture(),
    };
    let data = save.write().unwrap();
    assert_eq!(&data[4..8], &IB1_SAVE_MAGIC.to_le_bytes());

    let read = SaveFile::read(&data, "swordsave").unwrap();
    assert_eq!(read.info.title, Title::Ib1);
    assert!(read.info.encrypted);
    assert_eq!(read.properties, save.properties);
    assert_eq!(read.write().unwrap(), data);
}

#[test]
fn static_int_array_keys_survive_sparse_indices() {
    let mut data = header(SAVE_FILE_VERSION_IB3, NO_MAGIC);
    int_field(&mut data, "NumConsumable", 0, 3);
    int_field(&mut data, "NumConsumable", 2, 7);
    int_field(&mut data, "NumConsumable", 5, 1);
    ws(&mut data, NONE);

    let save = SaveFile::read_as(&data, "Save", Title::Ib3).unwrap();
    assert_eq!(save.properties.len(), 1);
    let PropertyInner::Array { count, value, .. } = &save.properties[0].inner else {
        panic!("expected the run of fields to group into one array");
    };
    assert_eq!(*count, 3);
    let ValueArray::Static(elements) = value else {
        panic!("expected a static array");
    };
    assert_eq!(elements[2].array_index, 5);

    let doc = save.to_json().unwrap();
    assert_eq!(
        doc,
        json!({ "NumConsumable": [{ "SmallHealthPotion": 3, "AttackElixir": 7, "ShieldOil": 1 }] })
    );

    let rebuilt = SaveFile::from_json(save.info.clone(), &doc).unwrap();
    assert_eq!(rebuilt.write().unwrap(), data);
}

#[test]
fn static_struct_array_round_trips() {
    let mut data = header(SAVE_FILE_VERSION_IB3, NO_MAGIC);
    for (index, health) in [(0, 250), (1, 300)] {
        let mut payload = Vec::new();
        ws(&mut payload, "PlayerSavedStats");
        int_field(&mut payload, "Value", 0, health);
        ws(&mut payload, NONE);
        // declared size counts the field list and terminator, not the
        // struct name string
        tag(&mut data, "Stats", "StructProperty", 47, index);
        data.extend_from_slice(&payload);
    }
    ws(&mut data, NONE);

    let save = SaveFile::read_as(&data, "Save", Title::Ib3).unwrap();
    let doc = save.to_json().unwrap();
    assert_eq!(
        doc,
        json!({ "Stats": [{ "Value": 250 }, { "Value": 300 }] })
    );

    let rebuilt = SaveFile::from_json(save.info.clone(), &doc).unwrap();
    assert_eq!(rebuilt.write().unwrap(), data);
}

#[test]
fn cheevo_array_is_keyed_by_achievement() {
    let mut data = header(SAVE_FILE_VERSION_IB3, NO_MAGIC);
    for index in [0, 3] {
        let mut payload = Vec::new();
        ws(&mut payload, "SavedCheevoData");
        int_field(&mut payload, "Progress", 0, index * 10);
        ws(&mut payload, NONE);
        tag(&mut data, "SavedCheevo", "StructProperty", 50, index);
        data.extend_from_slice(&payload);
    }
    ws(&mut data, NONE);

    let save = SaveFile::read_as(&data, "Save", Title::Ib3).unwrap();
    let doc = save.to_json().unwrap();
    assert_eq!(
        doc,
        json!({ "SavedCheevo": [{
            "FirstKill": { "Progress": 0 },
            "AllTreasure": { "Progress": 30 },
        }] })
    );

    let rebuilt = SaveFile::from_json(save.info.clone(), &doc).unwrap();
    assert_eq!(rebuilt.write().unwrap(), data);
}

#[test]
fn enum_byte_prefix_and_player_type_exemption() {
    let mut data = header(SAVE_FILE_VERSION_IB3, NO_MAGIC);
    tag(
        &mut data,
        "eCurrentPlayerType",
        "ByteProperty",
        string_wire_len("EPT_Hero"),
        0,
    );
    ws(&mut data, "EPlayerType");
    ws(&mut data, "EPT_Hero");
    tag(
        &mut data,
        "CurrentTouchItem",
        "ByteProperty",
        string_wire_len("ETI_None"),
        0,
    );
    ws(&mut data, "ETouchItem");
    ws(&mut data, "ETI_None");
    ws(&mut data, NONE);

    let save = SaveFile::read_as(&data, "Save", Title::Ib3).unwrap();
    let doc = save.to_json().unwrap();
    assert_eq!(
        doc,
        json!({
            "eCurrentPlayerType": { "Enum": "EPlayerType", "Enum Value": "EPT_Hero" },
            "eCurrentTouchItem": { "Enum": "ETouchItem", "Enum Value": "ETI_None" },
        })
    );

    // the exempted name keeps its leading letter, the other loses the
    // added prefix again
    let rebuilt = SaveFile::from_json(save.info.clone(), &doc).unwrap();
    assert_eq!(rebuilt.properties[0].name, "eCurrentPlayerType");
    assert_eq!(rebuilt.properties[1].name, "CurrentTouchItem");
    assert_eq!(rebuilt.write().unwrap(), data);
}

#[test]
fn simple_byte_writes_sentinel_discriminator() {
    let mut data = header(SAVE_FILE_VERSION_IB3, NO_MAGIC);
    tag(&mut data, "ColorId", "ByteProperty", 1, 0);
    ws(&mut data, NONE);
    data.push(7);
    ws(&mut data, NONE);

    let save = SaveFile::read_as(&data, "Save", Title::Ib3).unwrap();
    assert_eq!(save.properties[0].inner, PropertyInner::Byte(Byte::Byte(7)));

    let doc = save.to_json().unwrap();
    assert_eq!(doc, json!({ "bColorId": 7 }));
    let rebuilt = SaveFile::from_json(save.info.clone(), &doc).unwrap();
    assert_eq!(rebuilt.write().unwrap(), data);
}

#[test]
fn was_encrypted_stays_an_int() {
    let doc = json!({ "bWasEncrypted": 1, "bFirstLaunch": 1 });
    let save = SaveFile::from_json(unencrypted_ib3_info("Save"), &doc).unwrap();
    assert_eq!(save.properties[0].name, "bWasEncrypted");
    assert_eq!(save.properties[0].inner, PropertyInner::Int(1));
    assert_eq!(save.properties[1].name, "FirstLaunch");
    assert_eq!(save.properties[1].inner, PropertyInner::Byte(Byte::Byte(1)));
    assert_eq!(save.to_json().unwrap(), doc);
}

#[test]
fn empty_string_and_empty_array_round_trip() {
    let mut data = header(SAVE_FILE_VERSION_IB3, NO_MAGIC);
    tag(&mut data, "HeroName", "StrProperty", 4, 0);
    ws(&mut data, "");
    tag(&mut data, "GameFlagList", "ArrayProperty", 4, 0);
    wi(&mut data, 0);
    ws(&mut data, NONE);

    let save = SaveFile::read_as(&data, "Save", Title::Ib3).unwrap();
    let doc = save.to_json().unwrap();
    assert_eq!(doc, json!({ "HeroName": "", "GameFlagList": [] }));

    let rebuilt = SaveFile::from_json(save.info.clone(), &doc).unwrap();
    assert_eq!(rebuilt.write().unwrap(), data);
}

#[test]
fn nested_fields_round_trip_from_json() {
    let doc = json!({
        "GameOptions": {
            "MusicVolume": 3,
            "bInvertLook": true,
            "ini_CurrentMap": "SwordFrontYard",
            "PurchasedPerks": ["Perk_Health", "Perk_Magic"],
        },
        "PlayerInventory": [
            { "ini_ItemName": "Weapon_Sword1", "Quantity": 1 },
            { "ini_ItemName": "Shield_Wood", "Quantity": 2 },
        ],
    });

    let save = SaveFile::from_json(unencrypted_ib3_info("Save"), &doc).unwrap();
    let data = save.write().unwrap();

    let read = SaveFile::read_as(&data, "Save", Title::Ib3).unwrap();
    assert_eq!(read.to_json().unwrap(), doc);
    assert_eq!(read.write().unwrap(), data);
}

#[test]
fn touch_treasure_awards_shape_depends_on_title() {
    let shape = registry::lookup(Title::Ib1, "TouchTreasureAwards").unwrap();
    assert_eq!(shape.kind, ElementKind::Name);
    let shape = registry::lookup(Title::Ib2, "TouchTreasureAwards").unwrap();
    assert_eq!(shape.kind, ElementKind::Struct);
    assert!(registry::lookup(Title::Ib3, "NoSuchArray").is_none());

    let mut data = header(SAVE_FILE_VERSION_PC, NO_MAGIC);
    tag(
        &mut data,
        "TouchTreasureAwards",
        "ArrayProperty",
        4 + string_wire_len("AwardA"),
        0,
    );
    wi(&mut data, 1);
    ws(&mut data, "AwardA");
    ws(&mut data, NONE);

    let save = SaveFile::read_as(&data, "Save", Title::Ib1).unwrap();
    let PropertyInner::Array { value, .. } = &save.properties[0].inner else {
        panic!("expected an array");
    };
    assert_eq!(
        value,
        &ValueArray::Dynamic(ValueVec::Name(vec!["AwardA".to_string()]))
    );
}

#[test]
fn negative_int_clamps_to_max() {
    let mut data = header(SAVE_FILE_VERSION_IB3, NO_MAGIC);
    int_field(&mut data, "Gold", 0, -5);
    int_field(&mut data, "Keys", 0, -1);
    ws(&mut data, NONE);

    let save = SaveFile::read_as(&data, "Save", Title::Ib3).unwrap();
    assert_eq!(save.properties[0].inner, PropertyInner::Int(i32::MAX));
    assert_eq!(save.properties[1].inner, PropertyInner::Int(-1));
}

#[test]
fn non_finite_float_is_rejected() {
    let mut data = header(SAVE_FILE_VERSION_IB3, NO_MAGIC);
    tag(&mut data, "PlayTime", "FloatProperty", 4, 0);
    data.extend_from_slice(&f32::NAN.to_le_bytes());
    ws(&mut data, NONE);

    let error = SaveFile::read_as(&data, "Save", Title::Ib3).unwrap_err();
    assert!(matches!(error.error, Error::InvalidFloat(_)));
    assert_eq!(error.offset, 8);
}

#[test]
fn parse_errors_carry_field_offsets() {
    let mut data = header(SAVE_FILE_VERSION_IB3, NO_MAGIC);
    int_field(&mut data, "Gold", 0, 1);
    let second_field = data.len() as u64;
    tag(&mut data, "Broken", "BogusProperty", 4, 0);
    wi(&mut data, 1);
    ws(&mut data, NONE);

    let error = SaveFile::read_as(&data, "Save", Title::Ib3).unwrap_err();
    assert_eq!(error.offset, second_field);
    assert!(matches!(error.error, Error::UnknownPropertyType(_)));
}

#[test]
fn package_without_terminator_reads_to_stream_end() {
    let mut data = header(SAVE_FILE_VERSION_IB3, NO_MAGIC);
    int_field(&mut data, "Gold", 0, 42);

    let save = SaveFile::read_as(&data, "Save", Title::Ib3).unwrap();
    assert_eq!(save.properties.len(), 1);
}

#[test]
fn unknown_dynamic_array_is_fatal() {
    let doc = json!({ "NotARealArray": [1, 2, 3] });
    let error = SaveFile::from_json(unencrypted_ib3_info("Save"), &doc).unwrap_err();
    assert!(matches!(error, Error::UnknownArray(name) if name == "NotARealArray"));
}

#[test]
fn null_field_is_fatal() {
    let doc = json!({ "Gold": null });
    let error = SaveFile::from_json(unencrypted_ib3_info("Save"), &doc).unwrap_err();
    assert!(matches!(error, Error::NullField(name) if name == "Gold"));
}

#[test]
fn index_keys_fall_back_to_name_and_index() {
    assert_eq!(index_enum::key_for_index("NumConsumable", 1), "LargeHealthPotion");
    assert_eq!(index_enum::key_for_index("NumConsumable", 99), "NumConsumable_99");
    assert_eq!(index_enum::key_for_index("UnknownArray", 2), "UnknownArray_2");

    assert_eq!(index_enum::index_for_key("NumConsumable", "LargeHealthPotion").unwrap(), 1);
    assert_eq!(index_enum::index_for_key("NumConsumable", "NumConsumable_99").unwrap(), 99);
    assert!(index_enum::index_for_key("NumConsumable", "NotAKey").is_err());
}

#[test]
fn runaway_static_array_is_detected() {
    let mut data = header(SAVE_FILE_VERSION_IB3, NO_MAGIC);
    for _ in 0..=2000 {
        int_field(&mut data, "NumConsumable", 0, 1);
    }
    ws(&mut data, NONE);

    let error = SaveFile::read_as(&data, "Save", Title::Ib3).unwrap_err();
    assert!(matches!(error.error, Error::RunawayStaticArray(_)));
}

#[test]
fn ciphertext_length_must_be_block_aligned() {
    let mut data = header(2, IB1_SAVE_MAGIC);
    data.extend_from_slice(&[0u8; 15]);
    let error = SaveFile::read(&data, "bad").unwrap_err();
    assert!(matches!(error.error, Error::BadBlockLength(15)));
}
