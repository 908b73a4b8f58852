//! Conversion between decoded properties and an editable JSON document.
//!
//! The document flattens type tags into naming conventions instead of
//! carrying them explicitly. Plain byte fields gain a `b` prefix, enum byte
//! fields gain an `e` prefix and become `{"Enum": .., "Enum Value": ..}`
//! objects, and name fields gain an `ini_` prefix. A handful of wire names
//! already start with those letters and are exempted so the prefix survives
//! the round trip. Static arrays of scalars render as a single keyed object
//! whose keys come from the index enum service, which keeps hand edits
//! stable when elements are sparse.

use serde_json::{Map, Number, Value};

use crate::error::{Error, Result};
use crate::index_enum;
use crate::package::Title;
use crate::registry::{self, ArrayShape, ArrayStorage, ElementKind};
use crate::{
    property_list_wire_size, string_wire_len, Byte, Property, PropertyInner, ValueArray, ValueVec,
};

const BYTE_PREFIX: &str = "b";
const ENUM_PREFIX: &str = "e";
const NAME_PREFIX: &str = "ini_";
const ENUM_NAME_KEY: &str = "Enum";
const ENUM_VALUE_KEY: &str = "Enum Value";

/// Int fields whose wire name happens to start with the byte prefix.
const INT_PREFIX_EXEMPTIONS: &[&str] = &["bWasEncrypted"];
/// Enum byte fields whose wire name already carries the enum prefix.
const ENUM_PREFIX_EXEMPTIONS: &[&str] = &["eCurrentPlayerType"];
/// Static struct arrays whose elements are keyed by their index enum
/// instead of listed positionally.
const KEYED_STRUCT_ARRAYS: &[&str] = &["SavedCheevo"];

pub(crate) fn properties_to_json(properties: &[Property]) -> Result<Value> {
    let mut out = Map::new();
    for property in properties {
        write_field(&mut out, property)?;
    }
    Ok(Value::Object(out))
}

pub(crate) fn properties_from_json(title: Title, value: &Value) -> Result<Vec<Property>> {
    let Value::Object(map) = value else {
        return Err(Error::Other(
            "top level of a save document must be a JSON object".to_string(),
        ));
    };
    let mut out = Vec::new();
    for (key, val) in map {
        read_field(title, key, val, false, &mut out)?;
    }
    Ok(out)
}

fn float_value(value: f32) -> Result<Value> {
    Number::from_f64(f64::from(value))
        .map(Value::Number)
        .ok_or(Error::InvalidFloat(value))
}

fn enum_key(name: &str) -> String {
    if ENUM_PREFIX_EXEMPTIONS.contains(&name) {
        name.to_string()
    } else {
        format!("{ENUM_PREFIX}{name}")
    }
}

fn object_of(elements: &[Property]) -> Result<Value> {
    let mut map = Map::new();
    for element in elements {
        write_field(&mut map, element)?;
    }
    Ok(Value::Object(map))
}

fn write_field(out: &mut Map<String, Value>, property: &Property) -> Result<()> {
    let (key, value) = match &property.inner {
        PropertyInner::Int(v) => (property.name.clone(), Value::from(*v)),
        PropertyInner::Float(v) => (property.name.clone(), float_value(*v)?),
        PropertyInner::Bool(v) => (property.name.clone(), Value::from(*v)),
        PropertyInner::Str(v) => (property.name.clone(), Value::from(v.clone())),
        PropertyInner::Name(v) => (
            format!("{NAME_PREFIX}{}", property.name),
            Value::from(v.clone()),
        ),
        PropertyInner::Byte(Byte::Byte(v)) => {
            (format!("{BYTE_PREFIX}{}", property.name), Value::from(*v))
        }
        PropertyInner::Byte(Byte::Enum {
            enum_name,
            enum_value,
        }) => {
            let mut map = Map::new();
            map.insert(ENUM_NAME_KEY.to_string(), Value::from(enum_name.clone()));
            map.insert(ENUM_VALUE_KEY.to_string(), Value::from(enum_value.clone()));
            (enum_key(&property.name), Value::Object(map))
        }
        PropertyInner::Struct { elements, .. } => (property.name.clone(), object_of(elements)?),
        PropertyInner::Array { shape, value, .. } => (
            property.name.clone(),
            array_to_json(property, shape, value)?,
        ),
    };
    out.insert(key, value);
    Ok(())
}

fn array_to_json(property: &Property, shape: &ArrayShape, value: &ValueArray) -> Result<Value> {
    match value {
        ValueArray::Dynamic(vec) => dynamic_to_json(vec),
        ValueArray::Static(elements) => static_to_json(property, shape, elements),
    }
}

fn dynamic_to_json(vec: &ValueVec) -> Result<Value> {
    let items = match vec {
        ValueVec::Int(values) => values.iter().map(|v| Value::from(*v)).collect(),
        ValueVec::Float(values) => values
            .iter()
            .map(|v| float_value(*v))
            .collect::<Result<_>>()?,
        ValueVec::Bool(values) => values.iter().map(|v| Value::from(*v)).collect(),
        ValueVec::Byte(values) => values.iter().map(|v| Value::from(*v)).collect(),
        ValueVec::Str(values) | ValueVec::Name(values) => {
            values.iter().map(|v| Value::from(v.clone())).collect()
        }
        ValueVec::Struct(lists) => lists
            .iter()
            .map(|elements| object_of(elements))
            .collect::<Result<_>>()?,
    };
    Ok(Value::Array(items))
}

fn struct_elements<'p>(array: &str, element: &'p Property) -> Result<&'p [Property]> {
    match &element.inner {
        PropertyInner::Struct { elements, .. } => Ok(elements),
        _ => Err(Error::InvalidValue {
            field: array.to_string(),
            reason: format!(
                "static array element is a {}, expected a struct",
                element.property_type().get_name()
            ),
        }),
    }
}

fn static_to_json(property: &Property, shape: &ArrayShape, elements: &[Property]) -> Result<Value> {
    match shape.kind {
        ElementKind::Struct if KEYED_STRUCT_ARRAYS.contains(&property.name.as_str()) => {
            let mut keyed = Map::new();
            for element in elements {
                keyed.insert(
                    index_enum::key_for_index(&property.name, element.array_index),
                    object_of(struct_elements(&property.name, element)?)?,
                );
            }
            Ok(Value::Array(vec![Value::Object(keyed)]))
        }
        ElementKind::Struct => {
            let items = elements
                .iter()
                .map(|element| object_of(struct_elements(&property.name, element)?))
                .collect::<Result<_>>()?;
            Ok(Value::Array(items))
        }
        ElementKind::Int | ElementKind::Byte | ElementKind::Name => {
            let mut keyed = Map::new();
            for element in elements {
                let value = match &element.inner {
                    PropertyInner::Int(v) if shape.kind == ElementKind::Int => Value::from(*v),
                    PropertyInner::Byte(Byte::Byte(v)) if shape.kind == ElementKind::Byte => {
                        Value::from(*v)
                    }
                    PropertyInner::Name(v) if shape.kind == ElementKind::Name => {
                        Value::from(v.clone())
                    }
                    _ => {
                        return Err(Error::InvalidValue {
                            field: property.name.clone(),
                            reason: format!(
                                "static array element is a {}, expected {:?}",
                                element.property_type().get_name(),
                                shape.kind
                            ),
                        })
                    }
                };
                keyed.insert(
                    index_enum::key_for_index(&property.name, element.array_index),
                    value,
                );
            }
            Ok(Value::Array(vec![Value::Object(keyed)]))
        }
        // no registered static array uses the remaining kinds
        _ => Err(Error::UnsupportedJson(property.name.clone())),
    }
}

fn as_str<'v>(field: &str, value: &'v Value) -> Result<&'v str> {
    value.as_str().ok_or_else(|| Error::InvalidValue {
        field: field.to_string(),
        reason: "expected a string".to_string(),
    })
}

fn as_i64(field: &str, value: &Value) -> Result<i64> {
    value.as_i64().ok_or_else(|| Error::InvalidValue {
        field: field.to_string(),
        reason: "expected an integer".to_string(),
    })
}

fn int_in_range<T: TryFrom<i64>>(field: &str, value: i64) -> Result<T> {
    T::try_from(value).map_err(|_| Error::InvalidValue {
        field: field.to_string(),
        reason: format!("integer {value} is out of range"),
    })
}

fn push(
    out: &mut Vec<Property>,
    nested: bool,
    name: String,
    size: i32,
    array_index: i32,
    inner: PropertyInner,
) {
    let mut property = Property {
        name,
        size,
        array_index,
        element_size: None,
        inner,
    };
    if nested {
        property.populate_element_size();
    }
    out.push(property);
}

/// Converts one JSON entry back into properties. Most entries produce
/// exactly one, static arrays splice all their elements into `out`.
fn read_field(
    title: Title,
    key: &str,
    value: &Value,
    nested: bool,
    out: &mut Vec<Property>,
) -> Result<()> {
    match value {
        Value::Null => Err(Error::NullField(key.to_string())),
        Value::Bool(v) => {
            push(out, nested, key.to_string(), 0, 0, PropertyInner::Bool(*v));
            Ok(())
        }
        Value::Number(n) if n.is_f64() => {
            let v = n.as_f64().unwrap_or_default() as f32;
            push(out, nested, key.to_string(), 4, 0, PropertyInner::Float(v));
            Ok(())
        }
        Value::Number(_) => {
            let raw = as_i64(key, value)?;
            if key.starts_with(BYTE_PREFIX) && !INT_PREFIX_EXEMPTIONS.contains(&key) {
                let name = key[BYTE_PREFIX.len()..].to_string();
                let v: u8 = int_in_range(key, raw)?;
                push(out, nested, name, 1, 0, PropertyInner::Byte(Byte::Byte(v)));
            } else {
                let v: i32 = int_in_range(key, raw)?;
                push(out, nested, key.to_string(), 4, 0, PropertyInner::Int(v));
            }
            Ok(())
        }
        Value::String(v) => {
            let size = string_wire_len(v);
            if let Some(name) = key.strip_prefix(NAME_PREFIX) {
                push(
                    out,
                    nested,
                    name.to_string(),
                    size,
                    0,
                    PropertyInner::Name(v.clone()),
                );
            } else {
                push(
                    out,
                    nested,
                    key.to_string(),
                    size,
                    0,
                    PropertyInner::Str(v.clone()),
                );
            }
            Ok(())
        }
        Value::Object(map) => {
            if key.starts_with(ENUM_PREFIX) {
                read_enum_byte(key, map, nested, out)
            } else {
                read_struct(title, key, map, out)
            }
        }
        Value::Array(items) => read_array(title, key, items, nested, out),
    }
}

fn read_enum_byte(
    key: &str,
    map: &Map<String, Value>,
    nested: bool,
    out: &mut Vec<Property>,
) -> Result<()> {
    let name = if ENUM_PREFIX_EXEMPTIONS.contains(&key) {
        key.to_string()
    } else {
        key[ENUM_PREFIX.len()..].to_string()
    };
    let enum_name = map
        .get(ENUM_NAME_KEY)
        .ok_or_else(|| Error::MissingEnumKey(key.to_string(), ENUM_NAME_KEY))
        .and_then(|v| as_str(key, v))?
        .to_string();
    let enum_value = map
        .get(ENUM_VALUE_KEY)
        .ok_or_else(|| Error::MissingEnumKey(key.to_string(), ENUM_VALUE_KEY))
        .and_then(|v| as_str(key, v))?
        .to_string();
    let size = string_wire_len(&enum_value);
    push(
        out,
        nested,
        name,
        size,
        0,
        PropertyInner::Byte(Byte::Enum {
            enum_name,
            enum_value,
        }),
    );
    Ok(())
}

fn read_struct_elements(
    title: Title,
    map: &Map<String, Value>,
) -> Result<Vec<Property>> {
    let mut elements = Vec::new();
    for (key, value) in map {
        read_field(title, key, value, true, &mut elements)?;
    }
    Ok(elements)
}

fn push_struct(
    out: &mut Vec<Property>,
    name: String,
    struct_name: String,
    elements: Vec<Property>,
    array_index: i32,
) {
    let size = property_list_wire_size(&elements);
    let mut property = Property {
        name,
        size,
        array_index,
        element_size: None,
        inner: PropertyInner::Struct {
            struct_name,
            elements,
        },
    };
    property.populate_element_size();
    out.push(property);
}

fn read_struct(
    title: Title,
    key: &str,
    map: &Map<String, Value>,
    out: &mut Vec<Property>,
) -> Result<()> {
    let elements = read_struct_elements(title, map)?;
    let struct_name = registry::struct_alt_name(key).unwrap_or_default().to_string();
    push_struct(out, key.to_string(), struct_name, elements, 0);
    Ok(())
}

fn read_array(
    title: Title,
    key: &str,
    items: &[Value],
    nested: bool,
    out: &mut Vec<Property>,
) -> Result<()> {
    let shape = registry::lookup(title, key).ok_or_else(|| Error::UnknownArray(key.to_string()))?;
    match shape.storage {
        ArrayStorage::Dynamic => read_dynamic_array(title, key, shape, items, out),
        ArrayStorage::Static => read_static_array(title, key, shape, items, nested, out),
    }
}

fn read_dynamic_array(
    title: Title,
    key: &str,
    shape: &'static ArrayShape,
    items: &[Value],
    out: &mut Vec<Property>,
) -> Result<()> {
    let (content_size, value) = match shape.kind {
        ElementKind::Int => {
            let values = items
                .iter()
                .map(|v| as_i64(key, v).and_then(|raw| int_in_range::<i32>(key, raw)))
                .collect::<Result<Vec<_>>>()?;
            (4 * values.len() as i32, ValueVec::Int(values))
        }
        ElementKind::Float => {
            let values = items
                .iter()
                .map(|v| {
                    v.as_f64().map(|f| f as f32).ok_or_else(|| Error::InvalidValue {
                        field: key.to_string(),
                        reason: "expected a number".to_string(),
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            (4 * values.len() as i32, ValueVec::Float(values))
        }
        ElementKind::Bool => {
            let values = items
                .iter()
                .map(|v| {
                    v.as_bool().ok_or_else(|| Error::InvalidValue {
                        field: key.to_string(),
                        reason: "expected a boolean".to_string(),
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            (values.len() as i32, ValueVec::Bool(values))
        }
        ElementKind::Byte => {
            let values = items
                .iter()
                .map(|v| as_i64(key, v).and_then(|raw| int_in_range::<u8>(key, raw)))
                .collect::<Result<Vec<_>>>()?;
            (values.len() as i32, ValueVec::Byte(values))
        }
        ElementKind::Str | ElementKind::Name => {
            let values = items
                .iter()
                .map(|v| as_str(key, v).map(str::to_string))
                .collect::<Result<Vec<_>>>()?;
            let content = values.iter().map(|v| string_wire_len(v)).sum();
            if shape.kind == ElementKind::Str {
                (content, ValueVec::Str(values))
            } else {
                (content, ValueVec::Name(values))
            }
        }
        ElementKind::Struct => {
            let lists = items
                .iter()
                .map(|item| match item {
                    Value::Object(map) => read_struct_elements(title, map),
                    _ => Err(Error::UnsupportedJson(key.to_string())),
                })
                .collect::<Result<Vec<_>>>()?;
            let content = lists.iter().map(|l| property_list_wire_size(l)).sum();
            (content, ValueVec::Struct(lists))
        }
    };

    let count = match &value {
        ValueVec::Int(v) => v.len(),
        ValueVec::Float(v) => v.len(),
        ValueVec::Bool(v) => v.len(),
        ValueVec::Byte(v) => v.len(),
        ValueVec::Str(v) | ValueVec::Name(v) => v.len(),
        ValueVec::Struct(v) => v.len(),
    } as i32;

    // the declared size always includes the entry count word
    let mut property = Property {
        name: key.to_string(),
        size: 4 + content_size,
        array_index: 0,
        element_size: None,
        inner: PropertyInner::Array {
            shape,
            count,
            value: ValueArray::Dynamic(value),
        },
    };
    property.populate_element_size();
    out.push(property);
    Ok(())
}

/// Rebuilds the individual element fields of a static array and splices
/// them into the surrounding property list.
fn read_static_array(
    title: Title,
    key: &str,
    shape: &'static ArrayShape,
    items: &[Value],
    nested: bool,
    out: &mut Vec<Property>,
) -> Result<()> {
    match shape.kind {
        ElementKind::Int | ElementKind::Byte | ElementKind::Name => {
            let keyed = keyed_object(key, items)?;
            for (entry_key, entry_value) in keyed {
                let index = index_enum::index_for_key(key, entry_key)?;
                let (size, inner) = match shape.kind {
                    ElementKind::Int => {
                        let v: i32 = int_in_range(key, as_i64(key, entry_value)?)?;
                        (4, PropertyInner::Int(v))
                    }
                    ElementKind::Byte => {
                        let v: u8 = int_in_range(key, as_i64(key, entry_value)?)?;
                        (1, PropertyInner::Byte(Byte::Byte(v)))
                    }
                    _ => {
                        let v = as_str(key, entry_value)?.to_string();
                        (string_wire_len(&v), PropertyInner::Name(v))
                    }
                };
                push(out, nested, key.to_string(), size, index, inner);
            }
            Ok(())
        }
        ElementKind::Struct => {
            let struct_name = shape.alt_struct_name.unwrap_or_default().to_string();
            if KEYED_STRUCT_ARRAYS.contains(&key) {
                let keyed = keyed_object(key, items)?;
                for (entry_key, entry_value) in keyed {
                    let index = index_enum::index_for_key(key, entry_key)?;
                    let Value::Object(map) = entry_value else {
                        return Err(Error::UnsupportedJson(key.to_string()));
                    };
                    let elements = read_struct_elements(title, map)?;
                    push_struct(out, key.to_string(), struct_name.clone(), elements, index);
                }
            } else {
                for (index, item) in items.iter().enumerate() {
                    let Value::Object(map) = item else {
                        return Err(Error::UnsupportedJson(key.to_string()));
                    };
                    let elements = read_struct_elements(title, map)?;
                    push_struct(
                        out,
                        key.to_string(),
                        struct_name.clone(),
                        elements,
                        index as i32,
                    );
                }
            }
            Ok(())
        }
        _ => Err(Error::UnsupportedJson(key.to_string())),
    }
}

/// Static scalar arrays are rendered as an array wrapping one keyed object.
/// An empty array stands for no elements at all.
fn keyed_object<'v>(key: &str, items: &'v [Value]) -> Result<&'v Map<String, Value>> {
    static EMPTY: once_cell::sync::Lazy<Map<String, Value>> =
        once_cell::sync::Lazy::new(Map::new);
    match items {
        [] => Ok(&EMPTY),
        [Value::Object(map)] => Ok(map),
        _ => Err(Error::UnsupportedJson(key.to_string())),
    }
}
