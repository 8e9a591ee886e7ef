use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use thiserror::Error;

/// Minimum number of whitespace-separated fields in a census line.
pub const CENSUS_FIELD_COUNT: usize = 11;

/// Entry type column of a census line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
    Symlink,
    Other,
}

impl EntryKind {
    fn from_field(field: &str) -> Self {
        match field {
            "f" => EntryKind::File,
            "d" => EntryKind::Directory,
            "l" => EntryKind::Symlink,
            _ => EntryKind::Other,
        }
    }
}

/// One decoded line of a census file.
///
/// Field layout (positional, no header):
///
/// | idx | field                          |
/// |-----|--------------------------------|
/// | 0   | path, base64                   |
/// | 1   | size in bytes                  |
/// | 2   | owner uid                      |
/// | 3   | group gid                      |
/// | 4-6 | atime, mtime, ctime (unix)     |
/// | 7   | type (`f`, `d`, `l`, ...)      |
/// | 8   | inode                          |
/// | 9   | hard link count                |
/// | 10  | device id                      |
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CensusRecord {
    pub path: String,
    pub size_bytes: u64,
    pub owner_id: u32,
    pub group_id: u32,
    pub atime: i64,
    pub mtime: i64,
    pub ctime: i64,
    pub kind: EntryKind,
    pub inode: u64,
    pub link_count: u32,
    pub device_id: u32,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("expected at least {CENSUS_FIELD_COUNT} fields, found {0}")]
    FieldCount(usize),

    #[error("path is not valid base64")]
    Base64,

    #[error("field {field} is not an integer: {value:?}")]
    InvalidNumber { field: usize, value: String },
}

impl CensusRecord {
    /// Decode one raw census line. The path is decoded lossily, so invalid
    /// UTF-8 sequences become U+FFFD rather than failing the line.
    pub fn decode(line: &str) -> Result<Self, DecodeError> {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < CENSUS_FIELD_COUNT {
            return Err(DecodeError::FieldCount(fields.len()));
        }

        let raw_path = STANDARD
            .decode(fields[0])
            .map_err(|_| DecodeError::Base64)?;
        let path = String::from_utf8_lossy(&raw_path).into_owned();

        Ok(CensusRecord {
            path,
            size_bytes: parse_field(&fields, 1)?,
            owner_id: parse_field(&fields, 2)?,
            group_id: parse_field(&fields, 3)?,
            atime: parse_field(&fields, 4)?,
            mtime: parse_field(&fields, 5)?,
            ctime: parse_field(&fields, 6)?,
            kind: EntryKind::from_field(fields[7]),
            inode: parse_field(&fields, 8)?,
            link_count: parse_field(&fields, 9)?,
            device_id: parse_field(&fields, 10)?,
        })
    }
}

fn parse_field<T: std::str::FromStr>(fields: &[&str], idx: usize) -> Result<T, DecodeError> {
    fields[idx]
        .parse::<T>()
        .map_err(|_| DecodeError::InvalidNumber {
            field: idx,
            value: fields[idx].to_string(),
        })
}

/// Build a census line from its parts. Used by fixtures and tooling that
/// needs to produce files the decoder accepts.
#[allow(clippy::too_many_arguments)]
pub fn encode_line(
    path: &str,
    size_bytes: u64,
    owner_id: u32,
    group_id: u32,
    mtime: i64,
    kind: char,
    inode: u64,
    link_count: u32,
) -> String {
    format!(
        "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
        STANDARD.encode(path.as_bytes()),
        size_bytes,
        owner_id,
        group_id,
        mtime,
        mtime,
        mtime,
        kind,
        inode,
        link_count,
        1
    )
}
