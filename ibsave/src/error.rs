use crate::package::Title;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("unknown property type: {0:?}")]
    UnknownPropertyType(String),
    #[error("array {0:?} is not present in the format registry")]
    UnknownArray(String),
    #[error("cannot classify save package: save_version={save_version:#010x} save_magic={save_magic:#010x}")]
    UnknownTitle { save_version: u32, save_magic: u32 },
    #[error("save package is truncated: {0} bytes")]
    Truncated(usize),
    #[error("encrypted payload length {0} is not a multiple of the AES block size")]
    BadBlockLength(usize),
    #[error("{0:?} does not support encrypted packages")]
    UnsupportedEncryption(Title),
    #[error("static array {0:?} ran past the element cap, stream is likely corrupt")]
    RunawayStaticArray(String),
    #[error("float field holds a non-finite value: {0}")]
    InvalidFloat(f32),
    #[error("field {0:?} is null")]
    NullField(String),
    #[error("enum object for {0:?} is missing the {1:?} key")]
    MissingEnumKey(String, &'static str),
    #[error("cannot map key {key:?} back to an index of static array {array:?}")]
    UnknownIndexKey { array: String, key: String },
    #[error("invalid value for field {field:?}: {reason}")]
    InvalidValue { field: String, reason: String },
    #[error("unsupported JSON shape for field {0:?}")]
    UnsupportedJson(String),
    #[error("{0}")]
    Other(String),
}

/// A deserialization failure annotated with the stream offset of the field
/// that was being read when it occurred.
#[derive(thiserror::Error, Debug)]
#[error("{error} (field starting at offset {offset:#x})")]
pub struct ParseError {
    pub offset: u64,
    #[source]
    pub error: Error,
}
