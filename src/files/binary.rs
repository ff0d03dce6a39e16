//! Byte-oriented file access with run-time endianness, used by the binary
//! trajectory formats.

use std::{
    fs::{File, OpenOptions},
    io::{Read, Seek, SeekFrom, Write},
    path::Path,
};

use byteorder::{BigEndian, LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::{
    error::{Error, Result},
    files::{Compression, Mode, Source},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Endianness {
    Big,
    Little,
}

/// A binary file on disk, readable and writable depending on the open mode.
pub(crate) struct BinaryFile {
    file: File,
    pub endianness: Endianness,
    path: String,
}

impl BinaryFile {
    pub fn open(source: Source, mode: Mode, compression: Compression) -> Result<BinaryFile> {
        if compression != Compression::None {
            return Err(Error::File(
                "compression is not supported for binary formats".to_owned(),
            ));
        }
        let path = match source {
            Source::Path(path) => path,
            Source::MemoryRead(_) | Source::MemoryWrite(_) => {
                return Err(Error::File(
                    "in-memory I/O is not supported for binary formats".to_owned(),
                ));
            }
        };
        BinaryFile::open_path(&path, mode)
    }

    pub fn open_path(path: &Path, mode: Mode) -> Result<BinaryFile> {
        let display = path.display().to_string();
        let mut options = OpenOptions::new();
        match mode {
            Mode::Read => options.read(true),
            Mode::Write => options.read(true).write(true).create(true).truncate(true),
            // Appending to a framed binary file requires reading the
            // existing header, so open read+write and let the format seek.
            Mode::Append => options.read(true).write(true).create(true),
        };
        let file = options
            .open(path)
            .map_err(|e| Error::File(format!("can not open '{display}': {e}")))?;

        Ok(BinaryFile {
            file,
            endianness: Endianness::Little,
            path: display,
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn file_len(&self) -> Result<u64> {
        Ok(self.file.metadata()?.len())
    }

    pub fn tell(&mut self) -> Result<u64> {
        Ok(self.file.stream_position()?)
    }

    pub fn seek(&mut self, offset: u64) -> Result<()> {
        self.file.seek(SeekFrom::Start(offset))?;
        Ok(())
    }

    pub fn seek_end(&mut self) -> Result<u64> {
        Ok(self.file.seek(SeekFrom::End(0))?)
    }

    pub fn skip(&mut self, bytes: u64) -> Result<()> {
        self.file.seek(SeekFrom::Current(bytes as i64))?;
        Ok(())
    }

    pub fn read_bytes(&mut self, count: usize) -> Result<Vec<u8>> {
        let mut buffer = vec![0u8; count];
        self.file
            .read_exact(&mut buffer)
            .map_err(|e| Error::File(format!("can not read from '{}': {e}", self.path)))?;
        Ok(buffer)
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        let value = match self.endianness {
            Endianness::Big => self.file.read_u32::<BigEndian>(),
            Endianness::Little => self.file.read_u32::<LittleEndian>(),
        };
        value.map_err(|e| Error::File(format!("can not read from '{}': {e}", self.path)))
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        let value = match self.endianness {
            Endianness::Big => self.file.read_i32::<BigEndian>(),
            Endianness::Little => self.file.read_i32::<LittleEndian>(),
        };
        value.map_err(|e| Error::File(format!("can not read from '{}': {e}", self.path)))
    }

    pub fn read_f32_array(&mut self, count: usize) -> Result<Vec<f32>> {
        let mut values = vec![0.0f32; count];
        let result = match self.endianness {
            Endianness::Big => self.file.read_f32_into::<BigEndian>(&mut values),
            Endianness::Little => self.file.read_f32_into::<LittleEndian>(&mut values),
        };
        result.map_err(|e| Error::File(format!("can not read from '{}': {e}", self.path)))?;
        Ok(values)
    }

    pub fn read_f64_array(&mut self, count: usize) -> Result<Vec<f64>> {
        let mut values = vec![0.0f64; count];
        let result = match self.endianness {
            Endianness::Big => self.file.read_f64_into::<BigEndian>(&mut values),
            Endianness::Little => self.file.read_f64_into::<LittleEndian>(&mut values),
        };
        result.map_err(|e| Error::File(format!("can not read from '{}': {e}", self.path)))?;
        Ok(values)
    }

    pub fn write_bytes(&mut self, data: &[u8]) -> Result<()> {
        self.file
            .write_all(data)
            .map_err(|e| Error::File(format!("can not write to '{}': {e}", self.path)))
    }

    pub fn write_u32(&mut self, value: u32) -> Result<()> {
        let result = match self.endianness {
            Endianness::Big => self.file.write_u32::<BigEndian>(value),
            Endianness::Little => self.file.write_u32::<LittleEndian>(value),
        };
        result.map_err(|e| Error::File(format!("can not write to '{}': {e}", self.path)))
    }

    pub fn write_i32(&mut self, value: i32) -> Result<()> {
        let result = match self.endianness {
            Endianness::Big => self.file.write_i32::<BigEndian>(value),
            Endianness::Little => self.file.write_i32::<LittleEndian>(value),
        };
        result.map_err(|e| Error::File(format!("can not write to '{}': {e}", self.path)))
    }

    pub fn write_f32(&mut self, value: f32) -> Result<()> {
        let result = match self.endianness {
            Endianness::Big => self.file.write_f32::<BigEndian>(value),
            Endianness::Little => self.file.write_f32::<LittleEndian>(value),
        };
        result.map_err(|e| Error::File(format!("can not write to '{}': {e}", self.path)))
    }

    pub fn write_f64(&mut self, value: f64) -> Result<()> {
        let result = match self.endianness {
            Endianness::Big => self.file.write_f64::<BigEndian>(value),
            Endianness::Little => self.file.write_f64::<LittleEndian>(value),
        };
        result.map_err(|e| Error::File(format!("can not write to '{}': {e}", self.path)))
    }

    pub fn flush(&mut self) -> Result<()> {
        self.file
            .flush()
            .map_err(|e| Error::File(format!("can not flush '{}': {e}", self.path)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endian_roundtrip() {
        let path = std::env::temp_dir().join("mol_files_binary_test.bin");

        let mut file = BinaryFile::open_path(&path, Mode::Write).unwrap();
        file.endianness = Endianness::Big;
        file.write_u32(84).unwrap();
        file.write_f32(1.5).unwrap();
        file.write_f64(-2.25).unwrap();
        file.flush().unwrap();

        let mut file = BinaryFile::open_path(&path, Mode::Read).unwrap();
        file.endianness = Endianness::Big;
        assert_eq!(file.read_u32().unwrap(), 84);
        assert_eq!(file.read_f32_array(1).unwrap(), vec![1.5]);
        assert_eq!(file.read_f64_array(1).unwrap(), vec![-2.25]);

        // The same bytes read with the wrong endianness are garbage.
        let mut file = BinaryFile::open_path(&path, Mode::Read).unwrap();
        assert_ne!(file.read_u32().unwrap(), 84);

        std::fs::remove_file(path).unwrap();
    }
}
