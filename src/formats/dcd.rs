//! DCD binary trajectories, as written by CHARMM, NAMD, and LAMMPS. Frames
//! are fortran records (payload sandwiched between length markers); both
//! endiannesses and 32/64-bit markers are handled on read. The CHARMM
//! version field in the header selects how the unit cell record is encoded:
//! direct angles in degrees (X-PLOR, version 0), cosines of the angles
//! (up to version 24), or cell vectors (version 25 and later).

use lin_alg::f64::Vec3;

use crate::{
    cell::{CellShape, UnitCell},
    error::{Error, Result},
    files::{
        Compression, Mode, Source,
        binary::{BinaryFile, Endianness},
    },
    formats::{Format, FormatMetadata},
    frame::Frame,
    warnings::warning,
};

pub(crate) static METADATA: FormatMetadata = FormatMetadata {
    name: "DCD",
    extension: Some(".dcd"),
    description: "DCD binary format",
    reference: Some("https://userguide.mdanalysis.org/stable/formats/reference/dcd.html"),
    read: true,
    write: true,
    memory: false,
    positions: true,
    velocities: false,
    unit_cell: true,
    atoms: false,
    bonds: false,
    residues: false,
};

pub(crate) fn builder(
    source: Source,
    mode: Mode,
    compression: Compression,
) -> Result<Box<dyn Format>> {
    Ok(Box::new(DcdFormat::new(source, mode, compression)?))
}

const HEADER_SIZE: u64 = 84;

pub(crate) struct DcdFormat {
    file: BinaryFile,
    /// 8-byte fortran record markers instead of 4-byte ones.
    wide_markers: bool,
    charmm_version: i32,
    has_cell: bool,
    has_4d: bool,
    natoms: usize,
    /// 0-based indices of the free atoms when some atoms are fixed.
    free_atoms: Vec<usize>,
    /// Full coordinates of the first frame, needed to fill in fixed atoms.
    first_positions: Vec<Vec3>,
    nsteps: usize,
    frames_start: u64,
    first_frame_size: u64,
    frame_size: u64,
    current: usize,
    header_written: bool,
}

impl DcdFormat {
    pub fn new(source: Source, mode: Mode, compression: Compression) -> Result<DcdFormat> {
        let file = BinaryFile::open(source, mode, compression)?;

        let mut format = DcdFormat {
            file,
            wide_markers: false,
            charmm_version: 24,
            has_cell: false,
            has_4d: false,
            natoms: 0,
            free_atoms: Vec::new(),
            first_positions: Vec::new(),
            nsteps: 0,
            frames_start: 0,
            first_frame_size: 0,
            frame_size: 0,
            current: 0,
            header_written: false,
        };

        match mode {
            Mode::Read => format.read_header()?,
            Mode::Write => {}
            Mode::Append => {
                if format.file.file_len()? > 0 {
                    format.read_header()?;
                    format.header_written = true;
                    format.file.seek_end()?;
                }
            }
        }

        Ok(format)
    }

    fn detect_layout(&mut self) -> Result<()> {
        let start = self.file.read_bytes(12)?;
        let le32 = u32::from_le_bytes(start[0..4].try_into().expect("4 bytes"));
        let be32 = u32::from_be_bytes(start[0..4].try_into().expect("4 bytes"));
        let le64 = u64::from_le_bytes(start[0..8].try_into().expect("8 bytes"));
        let be64 = u64::from_be_bytes(start[0..8].try_into().expect("8 bytes"));

        if le32 == 84 && &start[4..8] == b"CORD" {
            self.file.endianness = Endianness::Little;
            self.wide_markers = false;
        } else if be32 == 84 && &start[4..8] == b"CORD" {
            self.file.endianness = Endianness::Big;
            self.wide_markers = false;
        } else if le64 == 84 && &start[8..12] == b"CORD" {
            self.file.endianness = Endianness::Little;
            self.wide_markers = true;
        } else if be64 == 84 && &start[8..12] == b"CORD" {
            self.file.endianness = Endianness::Big;
            self.wide_markers = true;
        } else {
            return Err(Error::Format(format!(
                "'{}' is not a DCD file: missing the CORD header",
                self.file.path()
            )));
        }

        self.file.seek(0)?;
        Ok(())
    }

    fn marker_size(&self) -> u64 {
        if self.wide_markers { 8 } else { 4 }
    }

    fn read_marker(&mut self) -> Result<u64> {
        if self.wide_markers {
            let low = self.file.read_u32()?;
            let high = self.file.read_u32()?;
            match self.file.endianness {
                Endianness::Little => Ok(low as u64 | (high as u64) << 32),
                Endianness::Big => Ok((low as u64) << 32 | high as u64),
            }
        } else {
            Ok(self.file.read_u32()? as u64)
        }
    }

    fn expect_marker(&mut self, expected: u64) -> Result<()> {
        let marker = self.read_marker()?;
        if marker != expected {
            return Err(Error::Format(format!(
                "inconsistent fortran record marker in '{}': expected {expected}, got {marker}",
                self.file.path()
            )));
        }
        Ok(())
    }

    fn read_header(&mut self) -> Result<()> {
        self.detect_layout()?;

        self.expect_marker(HEADER_SIZE)?;
        let magic = self.file.read_bytes(4)?;
        if &magic != b"CORD" {
            return Err(Error::Format(format!(
                "'{}' is not a DCD file",
                self.file.path()
            )));
        }
        let mut icntrl = [0i32; 20];
        for value in &mut icntrl {
            *value = self.file.read_i32()?;
        }
        self.expect_marker(HEADER_SIZE)?;

        let nset = icntrl[0].max(0) as usize;
        let nfixed = icntrl[8].max(0) as usize;
        self.charmm_version = icntrl[19];
        // X-PLOR files (version 0) never carry a cell record.
        self.has_cell = self.charmm_version != 0 && icntrl[10] != 0;
        self.has_4d = self.charmm_version != 0 && icntrl[11] != 0;

        // Title block
        let title_size = self.read_marker()?;
        self.file.skip(title_size)?;
        self.expect_marker(title_size)?;

        // Atom count
        self.expect_marker(4)?;
        self.natoms = self.file.read_i32()?.max(0) as usize;
        self.expect_marker(4)?;

        if nfixed > self.natoms {
            return Err(Error::Format(format!(
                "invalid DCD header in '{}': {} fixed atoms but only {} atoms",
                self.file.path(),
                nfixed,
                self.natoms
            )));
        }

        if nfixed > 0 {
            let nfree = self.natoms - nfixed;
            let size = 4 * nfree as u64;
            self.expect_marker(size)?;
            self.free_atoms = Vec::with_capacity(nfree);
            for _ in 0..nfree {
                let index = self.file.read_i32()?;
                if index < 1 || index as usize > self.natoms {
                    return Err(Error::Format(format!(
                        "invalid free atom index {index} in '{}'",
                        self.file.path()
                    )));
                }
                self.free_atoms.push(index as usize - 1);
            }
            self.expect_marker(size)?;
        }

        self.frames_start = self.file.tell()?;

        let marker = self.marker_size();
        let cell_size = if self.has_cell { 2 * marker + 48 } else { 0 };
        let coords = if self.has_4d { 4 } else { 3 };
        self.first_frame_size = cell_size + coords * (2 * marker + 4 * self.natoms as u64);
        let nfree = if self.free_atoms.is_empty() {
            self.natoms
        } else {
            self.free_atoms.len()
        };
        self.frame_size = cell_size + coords * (2 * marker + 4 * nfree as u64);

        let remaining = self.file.file_len()?.saturating_sub(self.frames_start);
        let computed = if remaining < self.first_frame_size {
            0
        } else {
            1 + (remaining - self.first_frame_size) / self.frame_size
        };
        self.nsteps = if nset == 0 {
            computed as usize
        } else {
            if nset as u64 != computed {
                warning!(
                    "DCD header in '{}' claims {} frames, the file contains {}",
                    self.file.path(),
                    nset,
                    computed
                );
            }
            (nset as u64).min(computed) as usize
        };

        // Fixed atoms need the first frame as the reference.
        if !self.free_atoms.is_empty() && self.nsteps > 0 {
            self.first_positions = self.read_coordinates(0)?;
        }

        Ok(())
    }

    fn step_offset(&self, step: usize) -> u64 {
        if step == 0 {
            self.frames_start
        } else {
            self.frames_start + self.first_frame_size + (step as u64 - 1) * self.frame_size
        }
    }

    fn read_cell(&mut self) -> Result<UnitCell> {
        self.expect_marker(48)?;
        let values = self.file.read_f64_array(6)?;
        self.expect_marker(48)?;

        if self.charmm_version >= 25 {
            // The six values are the cell vectors, upper triangular.
            return UnitCell::from_vectors(
                Vec3::new(values[0], 0.0, 0.0),
                Vec3::new(values[1], values[2], 0.0),
                Vec3::new(values[3], values[4], values[5]),
            );
        }

        let lengths = [values[0], values[2], values[5]];
        let raw = [values[4], values[3], values[1]]; // alpha, beta, gamma
        if lengths == [0.0, 0.0, 0.0] {
            return Ok(UnitCell::infinite());
        }

        let all_cosines = raw.iter().all(|v| v.abs() <= 1.0);
        let angles = if self.charmm_version > 0 && all_cosines {
            raw.map(|cos| cos.acos().to_degrees())
        } else {
            raw
        };
        UnitCell::triclinic(lengths, angles)
    }

    /// Read the x/y/z records of the frame the file is positioned on,
    /// merging fixed atoms from the first frame when needed.
    fn read_frame_coordinates(&mut self, step: usize) -> Result<Vec<Vec3>> {
        let partial = step > 0 && !self.free_atoms.is_empty();
        let count = if partial {
            self.free_atoms.len()
        } else {
            self.natoms
        };

        let size = 4 * count as u64;
        let mut buffers = Vec::with_capacity(3);
        for _ in 0..3 {
            self.expect_marker(size)?;
            buffers.push(self.file.read_f32_array(count)?);
            self.expect_marker(size)?;
        }
        if self.has_4d {
            self.expect_marker(size)?;
            self.file.skip(size)?;
            self.expect_marker(size)?;
        }

        if partial {
            let mut positions = self.first_positions.clone();
            for (n, &index) in self.free_atoms.clone().iter().enumerate() {
                positions[index] = Vec3::new(
                    buffers[0][n] as f64,
                    buffers[1][n] as f64,
                    buffers[2][n] as f64,
                );
            }
            Ok(positions)
        } else {
            Ok((0..count)
                .map(|n| {
                    Vec3::new(buffers[0][n] as f64, buffers[1][n] as f64, buffers[2][n] as f64)
                })
                .collect())
        }
    }

    fn read_coordinates(&mut self, step: usize) -> Result<Vec<Vec3>> {
        self.file.seek(self.step_offset(step))?;
        if self.has_cell {
            let marker = self.marker_size();
            self.file.skip(2 * marker + 48)?;
        }
        self.read_frame_coordinates(step)
    }

    fn write_header(&mut self, natoms: usize, has_cell: bool) -> Result<()> {
        self.file.write_u32(HEADER_SIZE as u32)?;
        self.file.write_bytes(b"CORD")?;
        let mut icntrl = [0i32; 20];
        icntrl[0] = 0; // frame count, updated on every write
        icntrl[1] = 0; // first step
        icntrl[2] = 1; // steps between saves
        icntrl[10] = has_cell as i32;
        icntrl[19] = self.charmm_version;
        for value in icntrl {
            self.file.write_i32(value)?;
        }
        self.file.write_u32(HEADER_SIZE as u32)?;

        let mut title = [b' '; 80];
        let text = b"Written by the mol_files library";
        title[..text.len()].copy_from_slice(text);
        self.file.write_u32(84)?;
        self.file.write_i32(1)?;
        self.file.write_bytes(&title)?;
        self.file.write_u32(84)?;

        self.file.write_u32(4)?;
        self.file.write_i32(natoms as i32)?;
        self.file.write_u32(4)?;

        self.natoms = natoms;
        self.has_cell = has_cell;
        self.header_written = true;
        Ok(())
    }
}

impl Format for DcdFormat {
    fn name(&self) -> &'static str {
        "DCD"
    }

    fn nsteps(&mut self) -> Result<usize> {
        Ok(self.nsteps)
    }

    fn read(&mut self, frame: &mut Frame) -> Result<()> {
        let step = self.current;
        self.read_step(step, frame)
    }

    fn read_step(&mut self, step: usize, frame: &mut Frame) -> Result<()> {
        self.file.seek(self.step_offset(step))?;

        let mut parsed = Frame::new();
        if self.has_cell {
            parsed.set_cell(self.read_cell()?);
        }
        let positions = self.read_frame_coordinates(step)?;
        parsed.resize(positions.len())?;
        parsed.positions_mut().copy_from_slice(&positions);

        self.current = step + 1;
        *frame = parsed;
        Ok(())
    }

    fn write(&mut self, frame: &Frame) -> Result<()> {
        if !self.header_written {
            self.write_header(
                frame.len(),
                frame.cell().shape() != CellShape::Infinite,
            )?;
            self.frames_start = self.file.tell()?;
        }
        if frame.len() != self.natoms {
            return Err(Error::Format(format!(
                "can not write a frame with {} atoms to '{}': it contains {} atoms per frame",
                frame.len(),
                self.file.path(),
                self.natoms
            )));
        }

        if self.has_cell {
            let cell = frame.cell();
            let [a, b, c] = cell.lengths();
            let [alpha, beta, gamma] = cell.angles();
            self.file.write_u32(48)?;
            for value in [
                a,
                gamma.to_radians().cos(),
                b,
                beta.to_radians().cos(),
                alpha.to_radians().cos(),
                c,
            ] {
                self.file.write_f64(value)?;
            }
            self.file.write_u32(48)?;
        }

        let size = 4 * frame.len() as u32;
        for axis in 0..3 {
            self.file.write_u32(size)?;
            for position in frame.positions() {
                let value = match axis {
                    0 => position.x,
                    1 => position.y,
                    _ => position.z,
                };
                self.file.write_f32(value as f32)?;
            }
            self.file.write_u32(size)?;
        }

        self.nsteps += 1;
        // Frame count lives just past the record marker and "CORD".
        let end = self.file.tell()?;
        self.file.seek(self.marker_size() + 4)?;
        self.file.write_i32(self.nsteps as i32)?;
        self.file.seek(end)?;
        self.file.flush()?;
        Ok(())
    }

    fn finalize(&mut self) -> Result<()> {
        self.file.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(name)
    }

    fn frame_with_cell() -> Frame {
        let mut frame = Frame::new();
        frame
            .set_cell(UnitCell::triclinic([12.0, 13.0, 14.0], [80.0, 90.0, 120.0]).unwrap());
        for i in 0..5 {
            frame.add_atom(
                crate::Atom::new("C"),
                Vec3::new(i as f64, 2.0 * i as f64, -(i as f64)),
                None,
            );
        }
        frame
    }

    #[test]
    fn roundtrip() {
        let path = temp("mol_files_dcd_roundtrip.dcd");

        {
            let mut format = DcdFormat::new(
                Source::Path(path.clone()),
                Mode::Write,
                Compression::None,
            )
            .unwrap();
            format.write(&frame_with_cell()).unwrap();

            let mut second = frame_with_cell();
            second.positions_mut()[0] = Vec3::new(42.0, 0.0, 0.0);
            format.write(&second).unwrap();
        }

        let mut format = DcdFormat::new(
            Source::Path(path.clone()),
            Mode::Read,
            Compression::None,
        )
        .unwrap();
        assert_eq!(format.nsteps().unwrap(), 2);

        let mut frame = Frame::new();
        format.read(&mut frame).unwrap();
        assert_eq!(frame.len(), 5);
        assert!((frame.positions()[3].y - 6.0).abs() < 1e-6);
        let lengths = frame.cell().lengths();
        assert!((lengths[0] - 12.0).abs() < 1e-6);
        let angles = frame.cell().angles();
        assert!((angles[2] - 120.0).abs() < 1e-6);

        format.read(&mut frame).unwrap();
        assert!((frame.positions()[0].x - 42.0).abs() < 1e-6);

        std::fs::remove_file(path).unwrap();
    }

    #[test]
    fn append_extends_the_file() {
        let path = temp("mol_files_dcd_append.dcd");

        {
            let mut format = DcdFormat::new(
                Source::Path(path.clone()),
                Mode::Write,
                Compression::None,
            )
            .unwrap();
            format.write(&frame_with_cell()).unwrap();
        }
        {
            let mut format = DcdFormat::new(
                Source::Path(path.clone()),
                Mode::Append,
                Compression::None,
            )
            .unwrap();
            format.write(&frame_with_cell()).unwrap();
        }

        let mut format = DcdFormat::new(
            Source::Path(path.clone()),
            Mode::Read,
            Compression::None,
        )
        .unwrap();
        assert_eq!(format.nsteps().unwrap(), 2);

        std::fs::remove_file(path).unwrap();
    }

    #[test]
    fn rejects_other_files() {
        let path = temp("mol_files_dcd_garbage.dcd");
        std::fs::write(&path, b"this is not a binary trajectory at all").unwrap();

        let result = DcdFormat::new(
            Source::Path(path.clone()),
            Mode::Read,
            Compression::None,
        );
        assert!(result.is_err());

        std::fs::remove_file(path).unwrap();
    }
}
