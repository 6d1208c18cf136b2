use super::ArchiveBackend;
use crate::walker::FileEntry;
use crate::Result;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::File;
use std::io::BufWriter;
use tar::{Builder, HeaderMode};

pub(super) struct TarBackend {
    builder: Builder<GzEncoder<BufWriter<File>>>,
}

impl TarBackend {
    pub(super) fn new(file: File) -> Self {
        let encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
        let mut builder = Builder::new(encoder);
        builder.mode(HeaderMode::Complete);
        Self { builder }
    }
}

impl ArchiveBackend for TarBackend {
    fn append(&mut self, entry: &FileEntry) -> Result<u64> {
        let mut source = File::open(entry.path())?;
        let size = source.metadata()?.len();

        self.builder.append_file(entry.relative_path(), &mut source)?;
        Ok(size)
    }

    fn finish(self: Box<Self>) -> Result<()> {
        let TarBackend { builder } = *self;
        let encoder = builder.into_inner()?;
        let buffered = encoder.finish()?;
        let file = buffered.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;
        Ok(())
    }
}
