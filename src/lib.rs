//! Read and write molecular structure and trajectory file formats through a
//! single [`Trajectory`] type, inspect and edit the in-memory chemistry data
//! ([`Frame`], [`Topology`], [`Atom`], [`Residue`], [`UnitCell`]), and select
//! atoms with a small query language ([`Selection`]).
//!
//! ```no_run
//! use mol_files::{Selection, Trajectory};
//!
//! let mut trajectory = Trajectory::open("water.xyz")?;
//! let frame = trajectory.read()?;
//!
//! let mut selection = Selection::new("name O and z < 10")?;
//! let oxygens = selection.list(&frame)?;
//! # Ok::<(), mol_files::Error>(())
//! ```

pub mod element;

mod atom;
mod cell;
mod config;
mod connectivity;
mod error;
mod frame;
mod property;
mod residue;
mod topology;
mod warnings;

pub mod files;
pub mod formats;
mod trajectory;

pub mod selection;

pub use atom::Atom;
pub use cell::{CellShape, UnitCell};
pub use config::add_configuration;
pub use connectivity::{Angle, Bond, BondOrder, Dihedral, Improper};
pub use error::{Error, Result};
pub use frame::Frame;
pub use property::{Property, PropertyMap};
pub use residue::Residue;
pub use selection::{Match, Selection};
pub use topology::Topology;
pub use trajectory::Trajectory;
pub use warnings::{reset_warning_callback, set_warning_callback};

pub use files::{Compression, Mode};
pub use formats::{FormatMetadata, formats_list, guess_format, register_format};
