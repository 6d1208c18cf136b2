use super::ArchiveBackend;
use crate::walker::FileEntry;
use crate::Result;
use std::fs::File;
use std::io::{self, BufWriter};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Entries at or above this size need zip64 headers
const ZIP64_THRESHOLD: u64 = u32::MAX as u64;

pub(super) struct ZipBackend {
    writer: ZipWriter<BufWriter<File>>,
}

impl ZipBackend {
    pub(super) fn new(file: File) -> Self {
        Self {
            writer: ZipWriter::new(BufWriter::new(file)),
        }
    }
}

impl ArchiveBackend for ZipBackend {
    fn append(&mut self, entry: &FileEntry) -> Result<u64> {
        let mut source = File::open(entry.path())?;
        let metadata = source.metadata()?;

        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .large_file(metadata.len() >= ZIP64_THRESHOLD);

        #[cfg(unix)]
        let options = {
            use std::os::unix::fs::PermissionsExt;
            options.unix_permissions(metadata.permissions().mode())
        };

        self.writer.start_file(entry.archive_name(), options)?;
        let copied = io::copy(&mut source, &mut self.writer)?;
        Ok(copied)
    }

    fn finish(self: Box<Self>) -> Result<()> {
        let ZipBackend { writer } = *self;
        let buffered = writer.finish()?;
        let file = buffered.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;
        Ok(())
    }
}
