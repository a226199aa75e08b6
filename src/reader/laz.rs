use crate::reader::header::RawHeader;
use crate::reader::record::RecordReader;
use crate::{Error, Point, Result};
use laz::{LasZipDecompressor, LazVlr};
use std::fs::File;
use std::io::BufReader;

/// Backend for laszip-compressed point data.
///
/// Each record is decompressed into a scratch buffer and then decoded exactly like an
/// uncompressed record.
pub(crate) struct LazBackend {
    decompressor: LasZipDecompressor<'static, BufReader<File>>,
    buffer: Vec<u8>,
}

impl LazBackend {
    /// Creates a decompressor from the laszip vlr carried in the header.
    ///
    /// The underlying reader must be positioned at the start of the compressed point data, which
    /// is where the raw header parser leaves it.
    pub fn new(read: BufReader<File>, header: &RawHeader) -> Result<LazBackend> {
        let vlr = header
            .vlrs
            .iter()
            .find(|vlr| vlr.user_id == LazVlr::USER_ID && vlr.record_id == LazVlr::RECORD_ID)
            .ok_or(Error::LasZipVlrNotFound)?;
        let vlr = LazVlr::from_buffer(&vlr.data)?;
        let decompressor = LasZipDecompressor::new(read, vlr)?;
        Ok(LazBackend {
            decompressor,
            buffer: vec![0u8; usize::from(header.point_data_record_length)],
        })
    }

    pub fn read_record(&mut self, record: &mut RecordReader) -> Result<Point> {
        self.decompressor.decompress_one(&mut self.buffer)?;
        let mut bytes: &[u8] = &self.buffer;
        record.read_from(&mut bytes)
    }
}
