//! Line-oriented file access, over disk or memory, with transparent
//! compression. All of `\n`, `\r\n`, and lone `\r` line terminators are
//! handled when reading.

use std::{
    fs::{File, OpenOptions},
    io::{self, BufRead, BufReader, Cursor, Read, Seek, SeekFrom, Write},
    path::Path,
};

use crate::{
    error::{Error, Result},
    files::{
        Compression, Mode, Source,
        memory::MemoryWriter,
    },
};

pub(crate) trait ReadSeek: Read + Seek + Send {}
impl<T: Read + Seek + Send> ReadSeek for T {}

enum Inner {
    Reader(BufReader<Box<dyn ReadSeek>>),
    Writer { writer: Box<dyn Write + Send>, written: u64 },
}

/// A text file, open for either reading or writing.
pub struct TextFile {
    inner: Inner,
    path: String,
}

impl TextFile {
    /// Open `source` in `mode`, decompressing or compressing with
    /// `compression`.
    pub fn open(source: Source, mode: Mode, compression: Compression) -> Result<TextFile> {
        let path = source.display();
        match source {
            Source::Path(disk_path) => match mode {
                Mode::Read => TextFile::reader_from_path(&disk_path, compression),
                Mode::Write | Mode::Append => {
                    TextFile::writer_from_path(&disk_path, mode, compression)
                }
            },
            Source::MemoryRead(data) => {
                if mode != Mode::Read {
                    return Err(Error::File(
                        "in-memory data can only be opened in read mode".to_owned(),
                    ));
                }
                let decompressed = decompress(data, compression, &path)?;
                Ok(TextFile {
                    inner: Inner::Reader(BufReader::new(Box::new(Cursor::new(decompressed)))),
                    path,
                })
            }
            Source::MemoryWrite(buffer) => {
                if compression != Compression::None {
                    return Err(Error::File(
                        "compression is not supported when writing to memory".to_owned(),
                    ));
                }
                Ok(TextFile {
                    inner: Inner::Writer {
                        writer: Box::new(MemoryWriter::new(buffer)),
                        written: 0,
                    },
                    path,
                })
            }
        }
    }

    fn reader_from_path(path: &Path, compression: Compression) -> Result<TextFile> {
        let display = path.display().to_string();
        let file = File::open(path)
            .map_err(|e| Error::File(format!("can not open '{display}' for reading: {e}")))?;

        let reader: BufReader<Box<dyn ReadSeek>> = match compression {
            Compression::None => BufReader::new(Box::new(file)),
            // Decompress fully so formats keep random access to their steps.
            _ => {
                let mut data = Vec::new();
                file.take(u64::MAX)
                    .read_to_end(&mut data)
                    .map_err(|e| Error::File(format!("can not read '{display}': {e}")))?;
                let decompressed = decompress(data, compression, &display)?;
                BufReader::new(Box::new(Cursor::new(decompressed)))
            }
        };

        Ok(TextFile {
            inner: Inner::Reader(reader),
            path: display,
        })
    }

    fn writer_from_path(path: &Path, mode: Mode, compression: Compression) -> Result<TextFile> {
        let display = path.display().to_string();
        let mut options = OpenOptions::new();
        match mode {
            Mode::Write => options.write(true).create(true).truncate(true),
            Mode::Append => options.append(true).create(true),
            Mode::Read => unreachable!("writer_from_path called in read mode"),
        };
        let file = options
            .open(path)
            .map_err(|e| Error::File(format!("can not open '{display}' for writing: {e}")))?;
        let written = file
            .metadata()
            .map(|metadata| metadata.len())
            .unwrap_or(0);

        let writer: Box<dyn Write + Send> = match compression {
            Compression::None => Box::new(file),
            Compression::Gzip => Box::new(flate2::write::GzEncoder::new(
                file,
                flate2::Compression::default(),
            )),
            Compression::Bzip2 => Box::new(bzip2::write::BzEncoder::new(
                file,
                bzip2::Compression::default(),
            )),
            Compression::Lzma => {
                return Err(Error::File(format!(
                    "xz compression is not supported when writing '{display}'"
                )));
            }
        };

        Ok(TextFile {
            inner: Inner::Writer { writer, written },
            path: display,
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Read one line, without its terminator. Fails with a file error at
    /// end of file.
    pub fn readline(&mut self) -> Result<String> {
        match self.readline_opt()? {
            Some(line) => Ok(line),
            None => Err(Error::File(format!(
                "end of file reached while reading '{}'",
                self.path
            ))),
        }
    }

    /// Read one line, or `None` at end of file.
    pub fn readline_opt(&mut self) -> Result<Option<String>> {
        let reader = self.reader()?;
        let mut bytes = Vec::new();
        loop {
            let (consumed, terminator) = {
                let buffer = reader.fill_buf()?;
                if buffer.is_empty() {
                    break;
                }
                match buffer.iter().position(|&b| b == b'\n' || b == b'\r') {
                    Some(position) => {
                        bytes.extend_from_slice(&buffer[..position]);
                        (position + 1, Some(buffer[position]))
                    }
                    None => {
                        bytes.extend_from_slice(buffer);
                        (buffer.len(), None)
                    }
                }
            };
            reader.consume(consumed);

            match terminator {
                Some(b'\r') => {
                    // Swallow the \n of a \r\n pair.
                    let next_is_newline = {
                        let buffer = reader.fill_buf()?;
                        buffer.first() == Some(&b'\n')
                    };
                    if next_is_newline {
                        reader.consume(1);
                    }
                    return Ok(Some(String::from_utf8_lossy(&bytes).into_owned()));
                }
                Some(_) => return Ok(Some(String::from_utf8_lossy(&bytes).into_owned())),
                None => continue,
            }
        }

        if bytes.is_empty() {
            Ok(None)
        } else {
            Ok(Some(String::from_utf8_lossy(&bytes).into_owned()))
        }
    }

    /// Read exactly `count` lines.
    pub fn readlines(&mut self, count: usize) -> Result<Vec<String>> {
        let mut lines = Vec::with_capacity(count);
        for _ in 0..count {
            lines.push(self.readline()?);
        }
        Ok(lines)
    }

    /// Current byte offset: read position for readers, bytes written for
    /// writers.
    pub fn tell(&mut self) -> Result<u64> {
        match &mut self.inner {
            Inner::Reader(reader) => Ok(reader.stream_position()?),
            Inner::Writer { written, .. } => Ok(*written),
        }
    }

    /// Move the read position to `offset` bytes from the start.
    pub fn seek(&mut self, offset: u64) -> Result<()> {
        let reader = self.reader()?;
        reader.seek(SeekFrom::Start(offset))?;
        Ok(())
    }

    pub fn rewind(&mut self) -> Result<()> {
        self.seek(0)
    }

    /// Is the read position at the end of the file?
    pub fn eof(&mut self) -> bool {
        match &mut self.inner {
            Inner::Reader(reader) => reader.fill_buf().map(|b| b.is_empty()).unwrap_or(true),
            Inner::Writer { .. } => false,
        }
    }

    fn reader(&mut self) -> Result<&mut BufReader<Box<dyn ReadSeek>>> {
        match &mut self.inner {
            Inner::Reader(reader) => Ok(reader),
            Inner::Writer { .. } => Err(Error::File(format!(
                "'{}' is open for writing, not reading",
                self.path
            ))),
        }
    }
}

impl Write for TextFile {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        match &mut self.inner {
            Inner::Writer { writer, written } => {
                let n = writer.write(data)?;
                *written += n as u64;
                Ok(n)
            }
            Inner::Reader(_) => Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "this file is open for reading, not writing",
            )),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match &mut self.inner {
            Inner::Writer { writer, .. } => writer.flush(),
            Inner::Reader(_) => Ok(()),
        }
    }
}

fn decompress(data: Vec<u8>, compression: Compression, path: &str) -> Result<Vec<u8>> {
    let mut decompressed = Vec::new();
    match compression {
        Compression::None => return Ok(data),
        Compression::Gzip => {
            flate2::read::MultiGzDecoder::new(data.as_slice())
                .read_to_end(&mut decompressed)
                .map_err(|e| Error::File(format!("error inflating gzip data in '{path}': {e}")))?;
        }
        Compression::Bzip2 => {
            bzip2::read::MultiBzDecoder::new(data.as_slice())
                .read_to_end(&mut decompressed)
                .map_err(|e| Error::File(format!("error inflating bzip2 data in '{path}': {e}")))?;
        }
        Compression::Lzma => {
            xz2::read::XzDecoder::new(data.as_slice())
                .read_to_end(&mut decompressed)
                .map_err(|e| Error::File(format!("error inflating xz data in '{path}': {e}")))?;
        }
    }
    Ok(decompressed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_reader(data: &str) -> TextFile {
        TextFile::open(
            Source::MemoryRead(data.as_bytes().to_vec()),
            Mode::Read,
            Compression::None,
        )
        .unwrap()
    }

    #[test]
    fn line_terminators() {
        let mut file = memory_reader("unix\nwindows\r\nmac\rlast");
        assert_eq!(file.readline().unwrap(), "unix");
        assert_eq!(file.readline().unwrap(), "windows");
        assert_eq!(file.readline().unwrap(), "mac");
        assert_eq!(file.readline().unwrap(), "last");
        assert!(file.eof());
        assert!(matches!(file.readline(), Err(Error::File(_))));
    }

    #[test]
    fn seek_and_tell() {
        let mut file = memory_reader("aaa\nbbb\nccc\n");
        assert_eq!(file.tell().unwrap(), 0);
        assert_eq!(file.readline().unwrap(), "aaa");
        let position = file.tell().unwrap();
        assert_eq!(position, 4);
        assert_eq!(file.readline().unwrap(), "bbb");

        file.seek(position).unwrap();
        assert_eq!(file.readline().unwrap(), "bbb");

        file.rewind().unwrap();
        assert_eq!(file.readline().unwrap(), "aaa");
    }

    #[test]
    fn readlines() {
        let mut file = memory_reader("1\n2\n3\n");
        assert_eq!(file.readlines(2).unwrap(), vec!["1", "2"]);
        assert!(file.readlines(2).is_err());
    }

    #[test]
    fn gzip_roundtrip() {
        let path = std::env::temp_dir().join("mol_files_text_gz_test.txt.gz");
        {
            let mut file = TextFile::open(
                Source::Path(path.clone()),
                Mode::Write,
                Compression::Gzip,
            )
            .unwrap();
            writeln!(file, "compressed line").unwrap();
        }

        let mut file = TextFile::open(
            Source::Path(path.clone()),
            Mode::Read,
            Compression::Gzip,
        )
        .unwrap();
        assert_eq!(file.readline().unwrap(), "compressed line");

        std::fs::remove_file(path).unwrap();
    }

    #[test]
    fn memory_writer_rejects_compression() {
        let buffer = crate::files::memory::new_shared_buffer();
        let result = TextFile::open(
            Source::MemoryWrite(buffer),
            Mode::Write,
            Compression::Gzip,
        );
        assert!(result.is_err());
    }
}
