//! The format plug-in contract and the process-wide registry dispatching on
//! format names and file extensions.

use std::sync::{OnceLock, RwLock, RwLockReadGuard};

use crate::{
    error::{Error, Result},
    files::{Compression, Mode, Source},
    frame::Frame,
};

pub(crate) mod cssr;
pub(crate) mod dcd;
pub(crate) mod gro;
pub(crate) mod lammps_data;
pub(crate) mod lammps_trajectory;
pub(crate) mod mmcif;
pub(crate) mod mol2;
pub(crate) mod pdb;
pub(crate) mod sdf;
pub(crate) mod smi;
pub(crate) mod tinker;
pub(crate) mod xyz;

/// The uniform contract implemented by every format plug-in.
///
/// Formats only implement the operations they support; the default bodies
/// produce "does not support" format errors. Reading must fill the frame
/// completely or fail without touching it: the trajectory engine always
/// hands a fresh frame in.
pub trait Format: Send {
    /// The registered name of this format, for diagnostics.
    fn name(&self) -> &'static str;

    /// Total number of steps in the file. May scan and index the file on
    /// the first call.
    fn nsteps(&mut self) -> Result<usize>;

    /// Read the next step sequentially.
    fn read(&mut self, _frame: &mut Frame) -> Result<()> {
        Err(Error::Format(format!(
            "the {} format does not support reading",
            self.name()
        )))
    }

    /// Read the given `step` with random access.
    fn read_step(&mut self, _step: usize, _frame: &mut Frame) -> Result<()> {
        Err(Error::Format(format!(
            "the {} format does not support random-access reading",
            self.name()
        )))
    }

    /// Append one frame to the file.
    fn write(&mut self, _frame: &Frame) -> Result<()> {
        Err(Error::Format(format!(
            "the {} format does not support writing",
            self.name()
        )))
    }

    /// Release buffered content. Called by the trajectory engine on close.
    fn finalize(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Static description of a registered format.
#[derive(Clone, Copy, Debug)]
pub struct FormatMetadata {
    pub name: &'static str,
    /// Canonical extension, with the leading dot.
    pub extension: Option<&'static str>,
    pub description: &'static str,
    /// Link to the community specification, when one exists.
    pub reference: Option<&'static str>,

    pub read: bool,
    pub write: bool,
    pub memory: bool,

    pub positions: bool,
    pub velocities: bool,
    pub unit_cell: bool,
    pub atoms: bool,
    pub bonds: bool,
    pub residues: bool,
}

/// Constructor for a format plug-in from a byte source, an open mode, and a
/// compression method.
pub type FormatBuilder = fn(Source, Mode, Compression) -> Result<Box<dyn Format>>;

#[derive(Clone)]
struct Registration {
    metadata: FormatMetadata,
    builder: FormatBuilder,
}

static REGISTRY: OnceLock<RwLock<Vec<Registration>>> = OnceLock::new();

fn registry() -> &'static RwLock<Vec<Registration>> {
    REGISTRY.get_or_init(|| {
        RwLock::new(vec![
            Registration { metadata: xyz::METADATA, builder: xyz::builder },
            Registration { metadata: pdb::METADATA, builder: pdb::builder },
            Registration { metadata: mmcif::METADATA, builder: mmcif::builder },
            Registration { metadata: mol2::METADATA, builder: mol2::builder },
            Registration { metadata: sdf::METADATA, builder: sdf::builder },
            Registration { metadata: gro::METADATA, builder: gro::builder },
            Registration { metadata: lammps_data::METADATA, builder: lammps_data::builder },
            Registration {
                metadata: lammps_trajectory::METADATA,
                builder: lammps_trajectory::builder,
            },
            Registration { metadata: tinker::METADATA, builder: tinker::builder },
            Registration { metadata: cssr::METADATA, builder: cssr::builder },
            Registration { metadata: smi::METADATA, builder: smi::builder },
            Registration { metadata: dcd::METADATA, builder: dcd::builder },
        ])
    })
}

fn read_registry() -> RwLockReadGuard<'static, Vec<Registration>> {
    registry().read().unwrap_or_else(|e| e.into_inner())
}

/// Register a user-provided format. Re-registering an existing name or
/// extension is an error.
pub fn register_format(metadata: FormatMetadata, builder: FormatBuilder) -> Result<()> {
    let mut guard = registry().write().unwrap_or_else(|e| e.into_inner());
    for existing in guard.iter() {
        if existing.metadata.name.eq_ignore_ascii_case(metadata.name) {
            return Err(Error::Other(format!(
                "a format named '{}' is already registered",
                metadata.name
            )));
        }
        if let (Some(a), Some(b)) = (existing.metadata.extension, metadata.extension) {
            if a.eq_ignore_ascii_case(b) {
                return Err(Error::Other(format!(
                    "the '{b}' extension is already registered to the {} format",
                    existing.metadata.name
                )));
            }
        }
    }
    guard.push(Registration { metadata, builder });
    Ok(())
}

/// Metadata for every registered format, in registration order.
pub fn formats_list() -> Vec<FormatMetadata> {
    read_registry().iter().map(|r| r.metadata).collect()
}

/// Metadata for the format registered under `name`.
pub fn format_metadata(name: &str) -> Result<FormatMetadata> {
    Ok(find_by_name(name)?.0)
}

pub(crate) fn find_by_name(name: &str) -> Result<(FormatMetadata, FormatBuilder)> {
    for registration in read_registry().iter() {
        if registration.metadata.name.eq_ignore_ascii_case(name) {
            return Ok((registration.metadata, registration.builder));
        }
    }
    Err(Error::Format(format!(
        "can not find a format named '{name}'"
    )))
}

pub(crate) fn find_by_extension(extension: &str) -> Result<(FormatMetadata, FormatBuilder)> {
    for registration in read_registry().iter() {
        if let Some(ext) = registration.metadata.extension {
            if ext.eq_ignore_ascii_case(extension) {
                return Ok((registration.metadata, registration.builder));
            }
        }
    }
    Err(Error::Format(format!(
        "can not find a format associated with the '{extension}' extension"
    )))
}

/// Guess the format name for `path` from its extension, ignoring any
/// trailing compression extension.
pub fn guess_format(path: &str) -> Result<String> {
    let (_, stripped) = Compression::from_path(path);
    let extension = match stripped.rfind('.') {
        Some(position) => &stripped[position..],
        None => {
            return Err(Error::Format(format!(
                "file at '{path}' does not have an extension, provide a format name to read it"
            )));
        }
    };
    find_by_name_or_extension(None, extension).map(|(metadata, _)| metadata.name.to_owned())
}

fn find_by_name_or_extension(
    name: Option<&str>,
    extension: &str,
) -> Result<(FormatMetadata, FormatBuilder)> {
    match name {
        Some(name) => find_by_name(name),
        None => find_by_extension(extension),
    }
}

/// Split a `"NAME"`, `"NAME/COMPRESSION"`, `""` or `"/COMPRESSION"` format
/// string into its halves.
pub(crate) fn parse_format_string(format: &str) -> Result<(Option<String>, Option<Compression>)> {
    let format = format.trim();
    if format.is_empty() {
        return Ok((None, None));
    }
    match format.split_once('/') {
        Some((name, compression)) => {
            let name = name.trim();
            let name = if name.is_empty() {
                None
            } else {
                Some(name.to_owned())
            };
            Ok((name, Some(Compression::from_tag(compression)?)))
        }
        None => Ok((Some(format.to_owned()), None)),
    }
}

/// Resolve the format and compression for opening `path` with the given
/// format string, following the dispatch rules: an explicit name wins, an
/// explicit compression wins, and the (compression-stripped) extension
/// fills whatever is missing.
pub(crate) fn resolve(
    path: &str,
    format: &str,
) -> Result<(FormatMetadata, FormatBuilder, Compression)> {
    let (name, mut compression) = parse_format_string(format)?;

    let mut remaining = path;
    if compression.is_none() {
        let (detected, stripped) = Compression::from_path(path);
        if detected != Compression::None {
            compression = Some(detected);
            remaining = stripped;
        }
    }

    let (metadata, builder) = match name {
        Some(name) => find_by_name(&name)?,
        None => {
            let extension = match remaining.rfind('.') {
                Some(position) => &remaining[position..],
                None => {
                    return Err(Error::Format(format!(
                        "file at '{path}' does not have an extension, provide a format name to read it"
                    )));
                }
            };
            find_by_extension(extension)?
        }
    };

    Ok((metadata, builder, compression.unwrap_or_default()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_strings() {
        assert_eq!(parse_format_string("").unwrap(), (None, None));
        assert_eq!(
            parse_format_string("XYZ").unwrap(),
            (Some("XYZ".to_owned()), None)
        );
        assert_eq!(
            parse_format_string("XYZ / GZ").unwrap(),
            (Some("XYZ".to_owned()), Some(Compression::Gzip))
        );
        assert_eq!(
            parse_format_string("/BZ2").unwrap(),
            (None, Some(Compression::Bzip2))
        );
        assert!(parse_format_string("XYZ/ZIP").is_err());
    }

    #[test]
    fn guessing() {
        assert_eq!(guess_format("traj.xyz").unwrap(), "XYZ");
        assert_eq!(guess_format("traj.pdb.gz").unwrap(), "PDB");
        assert_eq!(guess_format("traj.lammpstrj").unwrap(), "LAMMPS");
        assert!(guess_format("no-extension").is_err());
        assert!(guess_format("traj.unknown").is_err());
    }

    #[test]
    fn lookups() {
        assert!(find_by_name("XYZ").is_ok());
        assert!(find_by_name("xyz").is_ok());
        assert!(find_by_name("nope").is_err());
        assert!(find_by_extension(".pdb").is_ok());
    }

    #[test]
    fn resolution() {
        let (metadata, _, compression) = resolve("file.xyz.gz", "").unwrap();
        assert_eq!(metadata.name, "XYZ");
        assert_eq!(compression, Compression::Gzip);

        let (metadata, _, compression) = resolve("file.dat", "PDB").unwrap();
        assert_eq!(metadata.name, "PDB");
        assert_eq!(compression, Compression::None);

        let (metadata, _, compression) = resolve("file.xyz", "/XZ").unwrap();
        assert_eq!(metadata.name, "XYZ");
        assert_eq!(compression, Compression::Lzma);

        assert!(resolve("file.unknown", "").is_err());
    }

    #[test]
    fn duplicate_registration() {
        let metadata = FormatMetadata {
            name: "XYZ",
            extension: Some(".duplicated"),
            description: "",
            reference: None,
            read: true,
            write: false,
            memory: false,
            positions: true,
            velocities: false,
            unit_cell: false,
            atoms: true,
            bonds: false,
            residues: false,
        };
        assert!(register_format(metadata, |_, _, _| unreachable!()).is_err());
    }
}
