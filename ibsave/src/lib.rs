//! Codec for the tagged-property save packages used by the Infinity Blade
//! games and VOTE!!!.
//!
//! A package is a flat list of tagged fields. Every field carries its name,
//! its property type name, a declared payload size and an array index, and
//! nesting (structs, struct array elements) is closed off with a `None`
//! sentinel field. [`SaveFile`] ties the pieces together: it classifies a
//! raw package, decrypts it when needed, and converts between the binary
//! form and an editable JSON document.
//!
//! ```no_run
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let data = std::fs::read("UnencryptedSave0.bin")?;
//! let save = ibsave::SaveFile::read(&data, "UnencryptedSave0")?;
//! let json = save.to_json()?;
//! let rebuilt = ibsave::SaveFile::from_json(save.info.clone(), &json)?;
//! assert_eq!(rebuilt.write()?, data);
//! # Ok(()) }
//! ```

mod archive;
mod context;
mod error;
mod index_enum;
mod json;
mod package;
mod registry;
#[cfg(test)]
mod tests;

use std::io::{Cursor, Seek, SeekFrom};

use byteorder::{ReadBytesExt, WriteBytesExt, LE};
use tracing::instrument;

pub use archive::{ArchiveReader, ArchiveWriter};
pub use error::{Error, ParseError, Result};
pub use package::{
    decrypt_package, encrypt_package, PackageInfo, Title, IB1_SAVE_MAGIC, IB2_SAVE_MAGIC, NO_MAGIC,
    SAVE_FILE_VERSION_IB3, SAVE_FILE_VERSION_PC,
};
pub use registry::{ArrayShape, ArrayStorage, ElementKind};

use context::Context;

/// Sentinel field name closing a property list.
pub const NONE: &str = "None";

/// Ceiling on same-named fields grouped into one static array. A run longer
/// than this means the stream is feeding us garbage.
const MAX_STATIC_ARRAY_ELEMENTS: usize = 2000;

const ENCRYPTED_IB1_HEADER: u64 = 4;
const HEADER_SIZE: u64 = 8;

/// Wire footprint of a length-prefixed string, including the length word
/// and the NUL.
pub(crate) fn string_wire_len(value: &str) -> i32 {
    if value.is_empty() {
        4
    } else {
        4 + value.len() as i32 + 1
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyType {
    IntProperty,
    FloatProperty,
    BoolProperty,
    ByteProperty,
    StrProperty,
    NameProperty,
    StructProperty,
    ArrayProperty,
}

impl PropertyType {
    pub fn get_name(&self) -> &'static str {
        match self {
            PropertyType::IntProperty => "IntProperty",
            PropertyType::FloatProperty => "FloatProperty",
            PropertyType::BoolProperty => "BoolProperty",
            PropertyType::ByteProperty => "ByteProperty",
            PropertyType::StrProperty => "StrProperty",
            PropertyType::NameProperty => "NameProperty",
            PropertyType::StructProperty => "StructProperty",
            PropertyType::ArrayProperty => "ArrayProperty",
        }
    }

    fn try_from(name: &str) -> Result<Self> {
        match name {
            "IntProperty" => Ok(PropertyType::IntProperty),
            "FloatProperty" => Ok(PropertyType::FloatProperty),
            "BoolProperty" => Ok(PropertyType::BoolProperty),
            "ByteProperty" => Ok(PropertyType::ByteProperty),
            "StrProperty" => Ok(PropertyType::StrProperty),
            "NameProperty" => Ok(PropertyType::NameProperty),
            "StructProperty" => Ok(PropertyType::StructProperty),
            "ArrayProperty" => Ok(PropertyType::ArrayProperty),
            _ => Err(Error::UnknownPropertyType(name.to_string())),
        }
    }

    fn read<R: ArchiveReader>(reader: &mut R) -> Result<Self> {
        Self::try_from(&reader.read_string()?)
    }
}

/// Payload of a `ByteProperty` field. The wire form starts with an enum
/// name string either way; the plain variant writes the sentinel there and
/// follows it with the raw byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Byte {
    Byte(u8),
    Enum {
        enum_name: String,
        enum_value: String,
    },
}

/// Elements of a dynamic array. The element kind is not stored per element
/// on the wire, it comes from the format registry.
#[derive(Debug, Clone, PartialEq)]
pub enum ValueVec {
    Int(Vec<i32>),
    Float(Vec<f32>),
    Bool(Vec<bool>),
    Byte(Vec<u8>),
    Str(Vec<String>),
    Name(Vec<String>),
    Struct(Vec<Vec<Property>>),
}

/// Array payload. Static arrays are a decoding convenience: their elements
/// are complete fields that write themselves back out individually, the
/// synthesized array tag itself never reaches the wire.
#[derive(Debug, Clone, PartialEq)]
pub enum ValueArray {
    Dynamic(ValueVec),
    Static(Vec<Property>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum PropertyInner {
    Int(i32),
    Float(f32),
    Bool(bool),
    Byte(Byte),
    Str(String),
    Name(String),
    Struct {
        struct_name: String,
        elements: Vec<Property>,
    },
    Array {
        shape: &'static ArrayShape,
        count: i32,
        value: ValueArray,
    },
}

/// One tagged field of a save package.
#[derive(Debug, Clone, PartialEq)]
pub struct Property {
    pub name: String,
    /// Declared payload size. Decoded values keep whatever the stream said;
    /// values built from JSON compute it fresh. Serialization writes this
    /// value back out as-is.
    pub size: i32,
    pub array_index: i32,
    /// Full wire footprint of the field, tag included. Only populated on
    /// fields built from JSON that sit inside a struct or array, where the
    /// parent needs it for its own size.
    pub element_size: Option<i32>,
    pub inner: PropertyInner,
}

impl Property {
    pub fn property_type(&self) -> PropertyType {
        match &self.inner {
            PropertyInner::Int(_) => PropertyType::IntProperty,
            PropertyInner::Float(_) => PropertyType::FloatProperty,
            PropertyInner::Bool(_) => PropertyType::BoolProperty,
            PropertyInner::Byte(_) => PropertyType::ByteProperty,
            PropertyInner::Str(_) => PropertyType::StrProperty,
            PropertyInner::Name(_) => PropertyType::NameProperty,
            PropertyInner::Struct { .. } => PropertyType::StructProperty,
            PropertyInner::Array { .. } => PropertyType::ArrayProperty,
        }
    }

    /// Fills in [`Property::element_size`] from the field's own tag and
    /// declared size, plus the pieces the declared size leaves out for some
    /// kinds (the bool payload byte, the byte property's enum name string,
    /// the struct's name string).
    pub(crate) fn populate_element_size(&mut self) {
        let seed = match &self.inner {
            PropertyInner::Bool(_) => 1,
            PropertyInner::Byte(Byte::Byte(_)) => string_wire_len(NONE),
            PropertyInner::Byte(Byte::Enum { enum_name, .. }) => string_wire_len(enum_name),
            PropertyInner::Struct { struct_name, .. } => string_wire_len(struct_name),
            _ => 0,
        };
        self.element_size = Some(
            seed + string_wire_len(&self.name)
                + string_wire_len(self.property_type().get_name())
                + 4
                + 4
                + self.size,
        );
    }
}

/// Wire size of a property list as embedded in a struct payload or a
/// dynamic struct array element, terminator included.
pub(crate) fn property_list_wire_size(elements: &[Property]) -> i32 {
    elements
        .iter()
        .map(|e| e.element_size.unwrap_or(0))
        .sum::<i32>()
        + string_wire_len(NONE)
}

struct Tag {
    name: String,
    type_: PropertyType,
    size: i32,
    array_index: i32,
    entry_count: i32,
    shape: Option<&'static ArrayShape>,
}

fn read_int<R: ArchiveReader>(reader: &mut R) -> Result<i32> {
    let value = reader.read_i32::<LE>()?;
    // negative values other than -1 are corruption, clamp instead of failing
    if value < 0 && value != -1 {
        return Ok(i32::MAX);
    }
    Ok(value)
}

fn read_float<R: ArchiveReader>(reader: &mut R) -> Result<f32> {
    let value = reader.read_f32::<LE>()?;
    if !value.is_finite() {
        return Err(Error::InvalidFloat(value));
    }
    Ok(value)
}

/// Reads one field. Returns `None` when the next field is the terminator.
fn read_property<R: ArchiveReader>(
    reader: &mut R,
    allow_static_detection: bool,
) -> Result<Option<Property>> {
    let name = reader.read_string()?;
    if name == NONE {
        return Ok(None);
    }

    let shape = registry::lookup(reader.title(), &name);
    let tag = if allow_static_detection
        && shape.is_some_and(|s| s.storage == ArrayStorage::Static)
    {
        // A known static array name. The field is an ordinary element tag,
        // back up and let the array loop consume the whole run.
        reader.rewind_string(&name)?;
        Tag {
            name,
            type_: PropertyType::ArrayProperty,
            size: -1,
            array_index: -1,
            entry_count: 0,
            shape,
        }
    } else {
        let type_ = PropertyType::read(reader)?;
        let size = reader.read_i32::<LE>()?;
        let array_index = reader.read_i32::<LE>()?;
        let entry_count = if type_ == PropertyType::ArrayProperty {
            reader.read_i32::<LE>()?
        } else {
            0
        };
        Tag {
            name,
            type_,
            size,
            array_index,
            entry_count,
            shape,
        }
    };

    let inner = match tag.type_ {
        PropertyType::IntProperty => PropertyInner::Int(read_int(reader)?),
        PropertyType::FloatProperty => PropertyInner::Float(read_float(reader)?),
        PropertyType::BoolProperty => PropertyInner::Bool(reader.read_u8()? != 0),
        PropertyType::ByteProperty => PropertyInner::Byte(read_byte_value(reader, &tag)?),
        PropertyType::StrProperty => PropertyInner::Str(reader.read_string()?),
        PropertyType::NameProperty => PropertyInner::Name(reader.read_string()?),
        PropertyType::StructProperty => {
            let struct_name = reader.read_string()?;
            let elements = read_property_list(reader)?;
            PropertyInner::Struct {
                struct_name,
                elements,
            }
        }
        PropertyType::ArrayProperty => read_array_value(reader, &tag)?,
    };

    Ok(Some(Property {
        name: tag.name,
        size: tag.size,
        array_index: tag.array_index,
        element_size: None,
        inner,
    }))
}

fn read_byte_value<R: ArchiveReader>(reader: &mut R, tag: &Tag) -> Result<Byte> {
    let enum_name = reader.read_string()?;
    match tag.size {
        1 => Ok(Byte::Byte(reader.read_u8()?)),
        s if s > 1 => Ok(Byte::Enum {
            enum_name,
            enum_value: reader.read_string()?,
        }),
        s => Err(Error::InvalidValue {
            field: tag.name.clone(),
            reason: format!("byte property with size {s}"),
        }),
    }
}

/// Fields until the terminator, static array detection included.
fn read_property_list<R: ArchiveReader>(reader: &mut R) -> Result<Vec<Property>> {
    let mut elements = Vec::new();
    while let Some(property) = read_property(reader, true)? {
        elements.push(property);
    }
    Ok(elements)
}

fn read_array_value<R: ArchiveReader>(reader: &mut R, tag: &Tag) -> Result<PropertyInner> {
    let shape = tag
        .shape
        .ok_or_else(|| Error::UnknownArray(tag.name.clone()))?;

    if shape.storage == ArrayStorage::Static {
        let mut elements = Vec::new();
        loop {
            if elements.len() >= MAX_STATIC_ARRAY_ELEMENTS {
                return Err(Error::RunawayStaticArray(tag.name.clone()));
            }
            if reader.peek_string()? != tag.name {
                break;
            }
            let Some(element) = read_property(reader, false)? else {
                break;
            };
            elements.push(element);
        }
        return Ok(PropertyInner::Array {
            shape,
            count: elements.len() as i32,
            value: ValueArray::Static(elements),
        });
    }

    let count = tag.entry_count;
    let value = match shape.kind {
        ElementKind::Int => ValueVec::Int(
            (0..count.max(0))
                .map(|_| read_int(reader))
                .collect::<Result<_>>()?,
        ),
        ElementKind::Float => ValueVec::Float(
            (0..count.max(0))
                .map(|_| read_float(reader))
                .collect::<Result<_>>()?,
        ),
        ElementKind::Bool => ValueVec::Bool(
            (0..count.max(0))
                .map(|_| Ok(reader.read_u8()? != 0))
                .collect::<Result<_>>()?,
        ),
        ElementKind::Byte => ValueVec::Byte(
            (0..count.max(0))
                .map(|_| Ok(reader.read_u8()?))
                .collect::<Result<_>>()?,
        ),
        ElementKind::Str => ValueVec::Str(
            (0..count.max(0))
                .map(|_| reader.read_string())
                .collect::<Result<_>>()?,
        ),
        ElementKind::Name => ValueVec::Name(
            (0..count.max(0))
                .map(|_| reader.read_string())
                .collect::<Result<_>>()?,
        ),
        ElementKind::Struct => ValueVec::Struct(
            (0..count.max(0))
                .map(|_| read_property_list(reader))
                .collect::<Result<_>>()?,
        ),
    };
    Ok(PropertyInner::Array {
        shape,
        count,
        value: ValueArray::Dynamic(value),
    })
}

/// Top level of a plaintext package body. Reads fields until the terminator
/// or, for packages that end without one, the end of the stream. Failures
/// are reported with the offset of the field that caused them.
#[instrument(skip_all)]
fn read_properties<R: ArchiveReader>(reader: &mut R) -> Result<Vec<Property>, ParseError> {
    let at_offset = |offset: u64| move |error: Error| ParseError { offset, error };
    let io_at = |offset: u64| move |error: std::io::Error| ParseError {
        offset,
        error: Error::Io(error),
    };

    let start = reader.stream_position().map_err(io_at(0))?;
    let end = reader.seek(SeekFrom::End(0)).map_err(io_at(0))?;
    reader.seek(SeekFrom::Start(start)).map_err(io_at(0))?;

    let mut properties = Vec::new();
    loop {
        let offset = reader.stream_position().map_err(io_at(0))?;
        if offset >= end {
            break;
        }
        match read_property(reader, true).map_err(at_offset(offset))? {
            Some(property) => properties.push(property),
            None => break,
        }
    }
    Ok(properties)
}

fn write_tag<W: ArchiveWriter>(writer: &mut W, property: &Property) -> Result<()> {
    writer.write_string(&property.name)?;
    writer.write_string(property.property_type().get_name())?;
    writer.write_i32::<LE>(property.size)?;
    writer.write_i32::<LE>(property.array_index)?;
    Ok(())
}

fn write_property<W: ArchiveWriter>(writer: &mut W, property: &Property) -> Result<()> {
    // static arrays have no tag of their own, each element is a full field
    if let PropertyInner::Array {
        value: ValueArray::Static(elements),
        ..
    } = &property.inner
    {
        for element in elements {
            write_property(writer, element)?;
        }
        return Ok(());
    }

    write_tag(writer, property)?;
    match &property.inner {
        PropertyInner::Int(value) => writer.write_i32::<LE>(*value)?,
        PropertyInner::Float(value) => writer.write_f32::<LE>(*value)?,
        PropertyInner::Bool(value) => writer.write_u8(*value as u8)?,
        PropertyInner::Byte(Byte::Byte(value)) => {
            writer.write_string(NONE)?;
            writer.write_u8(*value)?;
        }
        PropertyInner::Byte(Byte::Enum {
            enum_name,
            enum_value,
        }) => {
            writer.write_string(enum_name)?;
            writer.write_string(enum_value)?;
        }
        PropertyInner::Str(value) | PropertyInner::Name(value) => writer.write_string(value)?,
        PropertyInner::Struct {
            struct_name,
            elements,
        } => {
            if !struct_name.is_empty() {
                writer.write_string(struct_name)?;
            }
            write_properties(writer, elements)?;
        }
        PropertyInner::Array { count, value, .. } => {
            let ValueArray::Dynamic(vec) = value else {
                unreachable!("static arrays are expanded above");
            };
            writer.write_i32::<LE>(*count)?;
            match vec {
                ValueVec::Int(values) => {
                    for v in values {
                        writer.write_i32::<LE>(*v)?;
                    }
                }
                ValueVec::Float(values) => {
                    for v in values {
                        writer.write_f32::<LE>(*v)?;
                    }
                }
                ValueVec::Bool(values) => {
                    for v in values {
                        writer.write_u8(*v as u8)?;
                    }
                }
                ValueVec::Byte(values) => {
                    for v in values {
                        writer.write_u8(*v)?;
                    }
                }
                ValueVec::Str(values) | ValueVec::Name(values) => {
                    for v in values {
                        writer.write_string(v)?;
                    }
                }
                ValueVec::Struct(lists) => {
                    for elements in lists {
                        write_properties(writer, elements)?;
                    }
                }
            }
        }
    }
    Ok(())
}

/// Writes a property list followed by the terminator.
fn write_properties<W: ArchiveWriter>(writer: &mut W, properties: &[Property]) -> Result<()> {
    for property in properties {
        write_property(writer, property)?;
    }
    writer.write_string(NONE)
}

/// A fully decoded save package.
#[derive(Debug, Clone, PartialEq)]
pub struct SaveFile {
    pub info: PackageInfo,
    pub properties: Vec<Property>,
}

impl SaveFile {
    /// Classifies, decrypts when needed, and decodes a raw save package.
    pub fn read(data: &[u8], package_name: &str) -> Result<SaveFile, ParseError> {
        let info = PackageInfo::resolve(data, package_name)
            .map_err(|error| ParseError { offset: 0, error })?;
        Self::read_resolved(data, info)
    }

    /// Decodes a package under a caller-chosen title, bypassing automatic
    /// classification.
    pub fn read_as(data: &[u8], package_name: &str, title: Title) -> Result<SaveFile, ParseError> {
        let info = PackageInfo::resolve_as(data, package_name, title)
            .map_err(|error| ParseError { offset: 0, error })?;
        Self::read_resolved(data, info)
    }

    fn read_resolved(data: &[u8], info: PackageInfo) -> Result<SaveFile, ParseError> {
        let wrap = |error: Error| ParseError { offset: 0, error };

        let plaintext = if info.encrypted {
            decrypt_package(&info, data).map_err(wrap)?
        } else {
            data.to_vec()
        };
        // reported parse offsets are relative to this plaintext stream
        let skip = if info.encrypted && info.title == Title::Ib1 {
            ENCRYPTED_IB1_HEADER
        } else {
            HEADER_SIZE
        };
        let mut stream = Cursor::new(plaintext);
        stream
            .seek(SeekFrom::Start(skip))
            .map_err(|e| wrap(Error::Io(e)))?;

        let properties = Context::run(stream, info.title, |reader| read_properties(reader))?;
        Ok(SaveFile { info, properties })
    }

    /// Serializes the package back to its on-disk form, re-encrypting when
    /// the package was encrypted. Declared sizes are written out as stored,
    /// never re-measured, so a decoded package round-trips byte for byte.
    pub fn write(&self) -> Result<Vec<u8>> {
        let mut plaintext = Vec::new();
        Context::run(Cursor::new(&mut plaintext), self.info.title, |writer| {
            if self.info.encrypted {
                match self.info.title {
                    Title::Ib1 => writer.write_u32::<LE>(NO_MAGIC)?,
                    Title::Ib2 | Title::Vote => {
                        writer.write_u32::<LE>(0)?;
                        writer.write_u32::<LE>(NO_MAGIC)?;
                    }
                    Title::Ib3 => return Err(Error::UnsupportedEncryption(Title::Ib3)),
                }
            } else {
                writer.write_u32::<LE>(self.info.save_version)?;
                writer.write_u32::<LE>(self.info.save_magic)?;
            }
            write_properties(writer, &self.properties)
        })?;

        if self.info.encrypted {
            encrypt_package(&self.info, &plaintext)
        } else {
            Ok(plaintext)
        }
    }

    /// Renders the package as an editable JSON document.
    pub fn to_json(&self) -> Result<serde_json::Value> {
        json::properties_to_json(&self.properties)
    }

    /// Rebuilds a package from an edited JSON document. The package info is
    /// carried over from the decode that produced the document, JSON holds
    /// no header material of its own.
    pub fn from_json(info: PackageInfo, value: &serde_json::Value) -> Result<SaveFile> {
        let properties = json::properties_from_json(info.title, value)?;
        Ok(SaveFile { info, properties })
    }
}
