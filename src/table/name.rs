use std::cmp::Ordering;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Suffix of committed table files.
pub const TSSP_FILE_SUFFIX: &str = "tssp";
/// Suffix of incomplete files still being written by the writer subsystem.
pub const TMP_FILE_SUFFIX: &str = "init";

/// Subdirectory of a shard holding ordered table files.
pub const TSSP_DIR: &str = "tssp";
/// Subdirectory of `TSSP_DIR` holding out-of-order table files.
pub const OUT_OF_ORDER_DIR: &str = "out-of-order";
/// Subdirectory of a shard holding compaction logs.
pub const COMPACT_LOG_DIR: &str = "compact_log";
/// Subdirectory of a shard holding downsample logs.
pub const DOWNSAMPLE_LOG_DIR: &str = "downsample_log";

/// A basename is temporary iff it carries the `.init` suffix.
pub fn is_temp_file(name: &str) -> bool {
    Path::new(name)
        .extension()
        .is_some_and(|ext| ext == TMP_FILE_SUFFIX)
}

/// Identity of a table file, encoded in its basename as
/// `<seq:hex>-<level>-<merge>-<extent>`.
///
/// `seq` and `extent` define the total order of files within a set; `level`
/// and `merge` are compaction metadata and take no part in ordering. The
/// order class is not encoded in the basename: out-of-order files live under
/// the `out-of-order` subdirectory instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileName {
    seq: u64,
    level: u16,
    merge: u16,
    extent: u16,
    order: bool,
}

impl FileName {
    pub fn new(seq: u64, level: u16, merge: u16, extent: u16) -> Self {
        Self {
            seq,
            level,
            merge,
            extent,
            order: true,
        }
    }

    pub fn with_order(mut self, order: bool) -> Self {
        self.order = order;
        self
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn level(&self) -> u16 {
        self.level
    }

    pub fn merge(&self) -> u16 {
        self.merge
    }

    pub fn extent(&self) -> u16 {
        self.extent
    }

    pub fn order(&self) -> bool {
        self.order
    }

    pub fn level_and_sequence(&self) -> (u16, u64) {
        (self.level, self.seq)
    }

    /// Parse a basename of the form `<seq>-<level>-<merge>-<extent>[.<ext>]`
    /// where the extension, if present, must be `tssp` or `init`. A full
    /// path is accepted; only the final component is inspected. Order
    /// defaults to true, see [`FileName::from_path`].
    pub fn parse(name: &str) -> Result<FileName> {
        let base = Path::new(name)
            .file_name()
            .and_then(|b| b.to_str())
            .ok_or_else(|| parse_err(name, "format"))?;

        let stem = match base.rsplit_once('.') {
            Some((stem, ext)) if ext == TSSP_FILE_SUFFIX || ext == TMP_FILE_SUFFIX => stem,
            Some(_) => return Err(parse_err(name, "suffix")),
            None => base,
        };

        let mut fields = stem.split('-');
        let seq = next_field(&mut fields, name, "sequence")?;
        let level = next_field(&mut fields, name, "level")?;
        let merge = next_field(&mut fields, name, "merge")?;
        let extent = next_field(&mut fields, name, "extent")?;
        if fields.next().is_some() {
            return Err(parse_err(name, "format"));
        }

        let seq = u64::from_str_radix(seq, 16).map_err(|_| parse_err(name, "sequence"))?;
        let level: u16 = level.parse().map_err(|_| parse_err(name, "level"))?;
        let merge: u16 = merge.parse().map_err(|_| parse_err(name, "merge"))?;
        let extent: u16 = extent.parse().map_err(|_| parse_err(name, "extent"))?;

        Ok(FileName::new(seq, level, merge, extent))
    }

    /// Parse a full path, inferring the order class from the parent
    /// directory: files under `out-of-order` are unordered.
    pub fn from_path(path: &Path) -> Result<FileName> {
        let base = path
            .file_name()
            .and_then(|b| b.to_str())
            .ok_or_else(|| parse_err(&path.display().to_string(), "format"))?;
        let order = path
            .parent()
            .and_then(|p| p.file_name())
            .map(|d| d != OUT_OF_ORDER_DIR)
            .unwrap_or(true);
        Ok(Self::parse(base)?.with_order(order))
    }

    /// Basename without suffix: `{seq:08x}-{level:04}-{merge:04}-{extent:04}`.
    pub fn base_name(&self) -> String {
        format!(
            "{:08x}-{:04}-{:04}-{:04}",
            self.seq, self.level, self.merge, self.extent
        )
    }

    /// Committed basename, `<base>.tssp`.
    pub fn tssp_name(&self) -> String {
        format!("{}.{}", self.base_name(), TSSP_FILE_SUFFIX)
    }

    /// In-progress basename, `<base>.init`.
    pub fn tmp_name(&self) -> String {
        format!("{}.{}", self.base_name(), TMP_FILE_SUFFIX)
    }

    /// Full path of the committed file below a shard directory, routing
    /// through `tssp/` or `tssp/out-of-order/` by order class.
    pub fn path_in(&self, shard_dir: &Path) -> PathBuf {
        let mut dir = shard_dir.join(TSSP_DIR);
        if !self.order {
            dir.push(OUT_OF_ORDER_DIR);
        }
        dir.join(self.tssp_name())
    }
}

impl fmt::Display for FileName {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.base_name())
    }
}

impl Ord for FileName {
    /// Primary key `seq` ascending, tiebreaker `extent` ascending. The
    /// remaining fields only break ties so the ordering stays consistent
    /// with equality.
    fn cmp(&self, other: &Self) -> Ordering {
        self.seq
            .cmp(&other.seq)
            .then(self.extent.cmp(&other.extent))
            .then(self.level.cmp(&other.level))
            .then(self.merge.cmp(&other.merge))
            .then(self.order.cmp(&other.order))
    }
}

impl PartialOrd for FileName {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

fn parse_err(name: &str, field: &str) -> Error {
    Error::FileNameParse {
        name: name.to_string(),
        field: field.to_string(),
    }
}

fn next_field<'a>(
    fields: &mut impl Iterator<Item = &'a str>,
    name: &str,
    field: &str,
) -> Result<&'a str> {
    fields.next().ok_or_else(|| parse_err(name, field))
}
