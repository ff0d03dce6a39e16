//! The entry point of the crate: a trajectory is a chemistry file opened
//! through a format plug-in. It enforces the open mode, tracks the current
//! step, and applies user-provided topology and cell overrides to every
//! frame crossing it.

use std::path::Path;

use crate::{
    cell::UnitCell,
    config,
    error::{Error, Result},
    files::{
        Mode, Source,
        memory::{SharedBuffer, new_shared_buffer},
    },
    formats::{self, Format},
    frame::Frame,
    topology::Topology,
};

pub struct Trajectory {
    path: String,
    mode: Mode,
    /// Index of the next step returned by a sequential `read`.
    step: usize,
    nsteps: usize,
    /// `None` once the trajectory is closed.
    format: Option<Box<dyn Format>>,
    custom_topology: Option<Topology>,
    custom_cell: Option<UnitCell>,
    buffer: Option<SharedBuffer>,
}

impl Trajectory {
    /// Open the file at `path` for reading, guessing the format from the
    /// extension.
    pub fn open(path: impl AsRef<Path>) -> Result<Trajectory> {
        Trajectory::open_with(path, Mode::Read, "")
    }

    /// Open the file at `path` for writing (truncating any existing file),
    /// guessing the format from the extension.
    pub fn create(path: impl AsRef<Path>) -> Result<Trajectory> {
        Trajectory::open_with(path, Mode::Write, "")
    }

    /// Open the file at `path` in `mode`, with an explicit format string:
    /// `""` guesses everything from the extension, `"NAME"` forces a
    /// format, `"NAME/GZ"` additionally forces a compression method, and
    /// `"/GZ"` forces only the compression.
    pub fn open_with(path: impl AsRef<Path>, mode: Mode, format: &str) -> Result<Trajectory> {
        let path = path.as_ref();
        let display = path.display().to_string();
        let (metadata, builder, compression) = formats::resolve(&display, format)?;
        check_mode_support(&metadata, mode)?;

        let mut format = builder(Source::Path(path.to_path_buf()), mode, compression)?;
        let nsteps = format.nsteps()?;

        Ok(Trajectory {
            path: display,
            mode,
            step: 0,
            nsteps,
            format: Some(format),
            custom_topology: None,
            custom_cell: None,
            buffer: None,
        })
    }

    /// Read `data` as though it were a file in the given format. The format
    /// string must name the format; it may also carry a compression tag.
    pub fn memory_reader(data: &[u8], format: &str) -> Result<Trajectory> {
        let (name, compression) = formats::parse_format_string(format)?;
        let name = name.ok_or_else(|| {
            Error::Format(
                "a format name is needed to read a memory buffer".to_owned(),
            )
        })?;
        let (metadata, builder) = formats::find_by_name(&name)?;
        if !metadata.memory {
            return Err(Error::Format(format!(
                "in-memory I/O is not supported by the {} format",
                metadata.name
            )));
        }
        check_mode_support(&metadata, Mode::Read)?;

        let mut format = builder(
            Source::MemoryRead(data.to_vec()),
            Mode::Read,
            compression.unwrap_or_default(),
        )?;
        let nsteps = format.nsteps()?;

        Ok(Trajectory {
            path: "<memory>".to_owned(),
            mode: Mode::Read,
            step: 0,
            nsteps,
            format: Some(format),
            custom_topology: None,
            custom_cell: None,
            buffer: None,
        })
    }

    /// Write to an in-memory buffer as though it were a file in the given
    /// format. The accumulated bytes are available from `memory_buffer`.
    /// Compression is not supported here.
    pub fn memory_writer(format: &str) -> Result<Trajectory> {
        let (name, compression) = formats::parse_format_string(format)?;
        if compression.is_some() {
            return Err(Error::File(
                "compression is not supported when writing to memory".to_owned(),
            ));
        }
        let name = name.ok_or_else(|| {
            Error::Format(
                "a format name is needed to write to a memory buffer".to_owned(),
            )
        })?;
        let (metadata, builder) = formats::find_by_name(&name)?;
        if !metadata.memory {
            return Err(Error::Format(format!(
                "in-memory I/O is not supported by the {} format",
                metadata.name
            )));
        }
        check_mode_support(&metadata, Mode::Write)?;

        let buffer = new_shared_buffer();
        let format = builder(
            Source::MemoryWrite(buffer.clone()),
            Mode::Write,
            Default::default(),
        )?;

        Ok(Trajectory {
            path: "<memory>".to_owned(),
            mode: Mode::Write,
            step: 0,
            nsteps: 0,
            format: Some(format),
            custom_topology: None,
            custom_cell: None,
            buffer: Some(buffer),
        })
    }

    /// Read the next frame. The frame step is the index of the step in this
    /// trajectory; formats carrying a native step number also store it as a
    /// frame property.
    pub fn read(&mut self) -> Result<Frame> {
        self.check_read()?;
        if self.step >= self.nsteps {
            return Err(Error::File(format!(
                "can not read file '{}' past its end: it contains {} steps",
                self.path, self.nsteps
            )));
        }

        let mut frame = Frame::new();
        self.format_mut()?.read(&mut frame)?;
        frame.set_step(self.step);
        self.step += 1;
        self.post_read(&mut frame)?;
        Ok(frame)
    }

    /// Read the frame at `step`. A subsequent sequential `read` resumes
    /// from `step + 1`.
    pub fn read_step(&mut self, step: usize) -> Result<Frame> {
        self.check_read()?;
        if step >= self.nsteps {
            return Err(Error::File(format!(
                "can not read step {step} of '{}': it only contains {} steps",
                self.path, self.nsteps
            )));
        }

        let mut frame = Frame::new();
        self.format_mut()?.read_step(step, &mut frame)?;
        frame.set_step(step);
        self.step = step + 1;
        self.post_read(&mut frame)?;
        Ok(frame)
    }

    /// Append one frame to the trajectory.
    pub fn write(&mut self, frame: &Frame) -> Result<()> {
        self.check_opened()?;
        if self.mode == Mode::Read {
            return Err(Error::File(format!(
                "the file at '{}' was not opened in write or append mode",
                self.path
            )));
        }

        if self.custom_topology.is_some() || self.custom_cell.is_some() {
            let mut frame = frame.clone();
            self.apply_overrides(&mut frame)?;
            self.format_mut()?.write(&frame)?;
        } else {
            self.format_mut()?.write(frame)?;
        }

        self.step += 1;
        self.nsteps += 1;
        Ok(())
    }

    /// Use `topology` for every frame read from or written to this
    /// trajectory, instead of whatever the file contains.
    pub fn set_topology(&mut self, topology: Topology) {
        self.custom_topology = Some(topology);
    }

    /// Read the topology of the first frame of the file at `path` and use
    /// it for this trajectory. The format string follows `open_with`.
    pub fn set_topology_file(&mut self, path: impl AsRef<Path>, format: &str) -> Result<()> {
        let mut trajectory = Trajectory::open_with(path, Mode::Read, format)?;
        let frame = trajectory.read()?;
        self.custom_topology = Some(frame.topology().clone());
        Ok(())
    }

    /// Use `cell` for every frame read from or written to this trajectory.
    pub fn set_cell(&mut self, cell: UnitCell) {
        self.custom_cell = Some(cell);
    }

    /// Number of steps in this trajectory.
    pub fn nsteps(&self) -> usize {
        self.nsteps
    }

    /// Have all steps of this trajectory been read?
    pub fn done(&self) -> bool {
        self.step >= self.nsteps
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// The bytes accumulated by a memory writer, or `None` for any other
    /// trajectory.
    pub fn memory_buffer(&self) -> Option<Vec<u8>> {
        self.buffer
            .as_ref()
            .map(|buffer| buffer.lock().unwrap_or_else(|e| e.into_inner()).clone())
    }

    /// Close the trajectory and flush buffered content. Closing twice is a
    /// no-op; any other operation on a closed trajectory fails with a file
    /// error.
    pub fn close(&mut self) -> Result<()> {
        if let Some(mut format) = self.format.take() {
            format.finalize()?;
        }
        Ok(())
    }

    fn check_opened(&self) -> Result<()> {
        if self.format.is_none() {
            return Err(Error::File(format!(
                "the trajectory at '{}' is closed",
                self.path
            )));
        }
        Ok(())
    }

    fn check_read(&self) -> Result<()> {
        self.check_opened()?;
        if self.mode != Mode::Read {
            return Err(Error::File(format!(
                "the file at '{}' was not opened in read mode",
                self.path
            )));
        }
        Ok(())
    }

    fn format_mut(&mut self) -> Result<&mut Box<dyn Format>> {
        self.format.as_mut().ok_or_else(|| {
            Error::File(format!("the trajectory at '{}' is closed", self.path))
        })
    }

    fn post_read(&mut self, frame: &mut Frame) -> Result<()> {
        // Configured atom-type renames apply before any override.
        let topology = frame.topology_mut();
        for i in 0..topology.len() {
            if let Some(renamed) = config::rename_type(topology[i].atomic_type()) {
                topology[i].set_type(renamed);
            }
        }

        self.apply_overrides(frame)
    }

    fn apply_overrides(&self, frame: &mut Frame) -> Result<()> {
        if let Some(topology) = &self.custom_topology {
            if topology.len() != frame.len() {
                return Err(Error::Other(format!(
                    "the topology override contains {} atoms, but the frame contains {}",
                    topology.len(),
                    frame.len()
                )));
            }
            frame.set_topology(topology.clone())?;
        }
        if let Some(cell) = &self.custom_cell {
            frame.set_cell(cell.clone());
        }
        Ok(())
    }
}

fn check_mode_support(metadata: &formats::FormatMetadata, mode: Mode) -> Result<()> {
    match mode {
        Mode::Read if !metadata.read => Err(Error::Format(format!(
            "the {} format does not support reading",
            metadata.name
        ))),
        Mode::Write | Mode::Append if !metadata.write => Err(Error::Format(format!(
            "the {} format does not support writing",
            metadata.name
        ))),
        _ => Ok(()),
    }
}
