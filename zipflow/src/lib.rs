//! Streaming single-pass ZIP64 archive writer.
//!
//! Compresses each member with a built-in fixed-Huffman DEFLATE encoder
//! ([`zipflow_deflate`]) and frames the result as a strict ZIP64 archive.
//! Every member gets a data descriptor and a ZIP64 extra field, so nothing
//! needs to be buffered or seeked: bytes go straight to a [`Sink`] in
//! archive order.
//!
//! ```
//! use zipflow::{WriteSink, ZipWriter};
//!
//! let mut zip = ZipWriter::with_sink(Box::new(WriteSink::new(Vec::new())));
//! zip.begin_file("letter.txt")?;
//! zip.write_text("hello, world!")?;
//! zip.finish()?;
//! # Ok::<(), zipflow::ZipflowError>(())
//! ```

mod dostime;
mod sink;

use std::io::{self, Write};
use std::mem;
use std::path::Path;

use log::debug;
use thiserror::Error;
use zipflow_deflate::Deflater;

use crate::sink::SinkStream;

pub use crate::dostime::DosDateTime;
pub use crate::sink::{FileSink, Sink, WriteSink};

const LOCAL_FILE_HEADER_SIG: u32 = 0x0403_4b50;
const CENTRAL_DIR_HEADER_SIG: u32 = 0x0201_4b50;
const EOCD_SIG: u32 = 0x0605_4b50;
const ZIP64_EOCD_SIG: u32 = 0x0606_4b50;
const ZIP64_EOCD_LOCATOR_SIG: u32 = 0x0706_4b50;

const ZIP64_EXTRA_FIELD_TAG: u16 = 0x0001;
/// Tag + length + three u64 values.
const ZIP64_EXTRA_FIELD_LEN: u16 = 28;

const ZIP_VERSION_ZIP64: u16 = 45;
const DEFLATE_METHOD: u16 = 8;
const GP_FLAG_DATA_DESCRIPTOR: u16 = 1 << 3;

/// Longest stored member name in bytes; longer names are truncated.
const MAX_NAME_LEN: usize = 0xFFFE;

#[derive(Debug, Error)]
pub enum ZipflowError {
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
    #[error("archive output already failed")]
    StreamFailed,
    #[error("entry name is empty")]
    EmptyEntryName,
    #[error("no entry is active")]
    NoActiveEntry,
}

struct Member {
    name: Vec<u8>,
    start_offset: u64,
    uncompressed_size: u64,
    crc: crc32fast::Hasher,
}

/// A single-use archive session.
///
/// Members are written strictly in sequence: [`begin_file`](Self::begin_file)
/// opens one (ending any previous member), [`write`](Self::write) streams
/// its contents, and [`finish`](Self::finish) closes the last member,
/// writes the central directory and ZIP64 footer, and closes the sink.
/// The first sink failure latches the session; later operations fail fast
/// and `finish` reports the latched error after running its cleanup.
pub struct ZipWriter {
    stream: SinkStream,
    deflate: Deflater,
    central_dir: Vec<u8>,
    num_files: u64,
    stamp: DosDateTime,
    current: Option<Member>,
}

impl ZipWriter {
    /// Opens `path` for writing with the default file sink.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self, ZipflowError> {
        Ok(Self::with_sink(Box::new(FileSink::create(path)?)))
    }

    /// Builds a session over a caller-supplied sink. The member timestamp
    /// is captured here, once, from the local wall clock.
    pub fn with_sink(sink: Box<dyn Sink>) -> Self {
        Self {
            stream: SinkStream::new(sink),
            deflate: Deflater::new(),
            central_dir: Vec::new(),
            num_files: 0,
            stamp: DosDateTime::now(),
            current: None,
        }
    }

    /// Starts a new member, ending the previous one if still open.
    pub fn begin_file(&mut self, name: &str) -> Result<(), ZipflowError> {
        if self.stream.is_poisoned() {
            return Err(ZipflowError::StreamFailed);
        }
        self.end_file()?;
        if name.is_empty() {
            return Err(ZipflowError::EmptyEntryName);
        }
        let name_bytes = &name.as_bytes()[..name.len().min(MAX_NAME_LEN)];
        let start_offset = self.stream.offset();

        // Local file header. CRC and sizes are unknown while streaming;
        // they stay zero here and travel in the data descriptor and the
        // central directory's ZIP64 extra field.
        write_u32(&mut self.stream, LOCAL_FILE_HEADER_SIG)?;
        write_u16(&mut self.stream, ZIP_VERSION_ZIP64)?;
        write_u16(&mut self.stream, GP_FLAG_DATA_DESCRIPTOR)?;
        write_u16(&mut self.stream, DEFLATE_METHOD)?;
        write_u16(&mut self.stream, self.stamp.time)?;
        write_u16(&mut self.stream, self.stamp.date)?;
        write_u32(&mut self.stream, 0)?; // crc
        write_u32(&mut self.stream, 0)?; // compressed size
        write_u32(&mut self.stream, 0)?; // uncompressed size
        write_u16(&mut self.stream, name_bytes.len() as u16)?;
        write_u16(&mut self.stream, 0)?; // extra field length
        self.stream.write_all(name_bytes)?;

        self.deflate.begin_stream(&mut self.stream)?;
        self.current = Some(Member {
            name: name_bytes.to_vec(),
            start_offset,
            uncompressed_size: 0,
            crc: crc32fast::Hasher::new(),
        });
        self.num_files += 1;
        debug!("begin entry {:?} at offset {}", name, start_offset);
        Ok(())
    }

    /// Appends bytes to the active member.
    pub fn write(&mut self, data: &[u8]) -> Result<(), ZipflowError> {
        let member = self.current.as_mut().ok_or(ZipflowError::NoActiveEntry)?;
        if self.stream.is_poisoned() {
            return Err(ZipflowError::StreamFailed);
        }
        member.crc.update(data);
        member.uncompressed_size += data.len() as u64;
        self.deflate.write(data, &mut self.stream)?;
        Ok(())
    }

    /// Appends a string to the active member.
    pub fn write_text(&mut self, text: &str) -> Result<(), ZipflowError> {
        self.write(text.as_bytes())
    }

    /// Ends the active member, writes the archive footer, closes the sink
    /// and consumes the session. Returns `Err` if any sink failure was
    /// latched along the way; cleanup runs regardless.
    pub fn finish(mut self) -> Result<(), ZipflowError> {
        let result = self.write_footer();
        self.stream.close();
        if let Some(err) = self.stream.take_error() {
            return Err(ZipflowError::Io(err));
        }
        result
    }

    /// Closes out the active member: terminates its DEFLATE stream,
    /// writes the data descriptor and queues the central-directory entry.
    fn end_file(&mut self) -> Result<(), ZipflowError> {
        let Some(member) = self.current.take() else {
            return Ok(());
        };
        self.deflate.finish_stream(&mut self.stream)?;
        let compressed_size = self.deflate.compressed_bytes();
        let crc = member.crc.finalize();

        // 12-byte data descriptor. The 32-bit size fields are always the
        // ZIP64 sentinel; the true sizes live only in the central
        // directory's ZIP64 extra field.
        write_u32(&mut self.stream, crc)?;
        write_u32(&mut self.stream, u32::MAX)?;
        write_u32(&mut self.stream, u32::MAX)?;

        let dir = &mut self.central_dir;
        write_u32(dir, CENTRAL_DIR_HEADER_SIG)?;
        write_u16(dir, ZIP_VERSION_ZIP64)?; // version made by, host FAT
        write_u16(dir, ZIP_VERSION_ZIP64)?; // version needed
        write_u16(dir, GP_FLAG_DATA_DESCRIPTOR)?;
        write_u16(dir, DEFLATE_METHOD)?;
        write_u16(dir, self.stamp.time)?;
        write_u16(dir, self.stamp.date)?;
        write_u32(dir, crc)?;
        write_u32(dir, u32::MAX)?; // compressed size, see ZIP64 extra
        write_u32(dir, u32::MAX)?; // uncompressed size, see ZIP64 extra
        write_u16(dir, member.name.len() as u16)?;
        write_u16(dir, ZIP64_EXTRA_FIELD_LEN)?;
        write_u16(dir, 0)?; // comment length
        write_u16(dir, 0)?; // start disk
        write_u16(dir, 0)?; // internal attributes
        write_u32(dir, 0)?; // external attributes
        write_u32(dir, u32::MAX)?; // local header offset, see ZIP64 extra
        dir.extend_from_slice(&member.name);

        write_u16(dir, ZIP64_EXTRA_FIELD_TAG)?;
        write_u16(dir, ZIP64_EXTRA_FIELD_LEN - 4)?;
        write_u64(dir, member.uncompressed_size)?;
        write_u64(dir, compressed_size)?;
        write_u64(dir, member.start_offset)?;

        debug!(
            "end entry {:?}: {} -> {} bytes, crc {:08x}",
            String::from_utf8_lossy(&member.name),
            member.uncompressed_size,
            compressed_size,
            crc
        );
        Ok(())
    }

    fn write_footer(&mut self) -> Result<(), ZipflowError> {
        self.end_file()?;

        let central_dir_offset = self.stream.offset();
        let central_dir = mem::take(&mut self.central_dir);
        self.stream.write_all(&central_dir)?;
        let central_dir_size = central_dir.len() as u64;
        let zip64_eocd_offset = self.stream.offset();

        // ZIP64 end of central directory, 56 bytes. Its size field counts
        // everything past the signature and the size field itself.
        write_u32(&mut self.stream, ZIP64_EOCD_SIG)?;
        write_u64(&mut self.stream, 56 - 12)?;
        write_u16(&mut self.stream, ZIP_VERSION_ZIP64)?; // version made by
        write_u16(&mut self.stream, ZIP_VERSION_ZIP64)?; // version needed
        write_u32(&mut self.stream, 0)?; // this disk
        write_u32(&mut self.stream, 0)?; // central directory disk
        write_u64(&mut self.stream, self.num_files)?;
        write_u64(&mut self.stream, self.num_files)?;
        write_u64(&mut self.stream, central_dir_size)?;
        write_u64(&mut self.stream, central_dir_offset)?;

        // ZIP64 end-of-central-directory locator, 20 bytes.
        write_u32(&mut self.stream, ZIP64_EOCD_LOCATOR_SIG)?;
        write_u32(&mut self.stream, 0)?; // disk with the ZIP64 EOCD
        write_u64(&mut self.stream, zip64_eocd_offset)?;
        write_u32(&mut self.stream, 1)?; // total disks

        // Classic EOCD, 22 bytes. Every 16/32-bit field is the 0xFF
        // sentinel that steers readers to the ZIP64 records above.
        let mut eocd = [0xFF_u8; 22];
        eocd[..4].copy_from_slice(&EOCD_SIG.to_le_bytes());
        eocd[20] = 0; // comment length
        eocd[21] = 0;
        self.stream.write_all(&eocd)?;

        debug!(
            "archive finished: {} entries, {} bytes",
            self.num_files,
            self.stream.offset()
        );
        Ok(())
    }
}

impl Drop for ZipWriter {
    fn drop(&mut self) {
        // Abandoned sessions still release the sink; errors here have
        // nowhere to go.
        self.stream.close();
    }
}

fn write_u16<W: Write>(out: &mut W, value: u16) -> io::Result<()> {
    out.write_all(&value.to_le_bytes())
}

fn write_u32<W: Write>(out: &mut W, value: u32) -> io::Result<()> {
    out.write_all(&value.to_le_bytes())
}

fn write_u64<W: Write>(out: &mut W, value: u64) -> io::Result<()> {
    out.write_all(&value.to_le_bytes())
}
