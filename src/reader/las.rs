use crate::Result;
use crate::reader::record::RecordReader;
use crate::Point;
use std::fs::File;
use std::io::BufReader;

/// Backend for uncompressed las point data.
///
/// The raw header parser leaves the underlying reader at the first point record; from there the
/// records are a plain sequential run.
#[derive(Debug)]
pub(crate) struct LasBackend {
    read: BufReader<File>,
}

impl LasBackend {
    pub fn new(read: BufReader<File>) -> LasBackend {
        LasBackend { read }
    }

    pub fn read_record(&mut self, record: &mut RecordReader) -> Result<Point> {
        record.read_from(&mut self.read)
    }
}
