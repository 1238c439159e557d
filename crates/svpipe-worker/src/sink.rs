//! TSV output for combined calls.

use std::fmt;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use svpipe_core::{CallWriter, ResultError};

use crate::call::SvCall;

const HEADER: &str = "#CONTIG\tPOSITION\tID\tSVTYPE\tSVLEN\tSUPPORT";

/// Writes one tab-separated line per call.
pub struct TsvCallWriter<W: Write> {
    out: W,
    description: String,
    written: usize,
}

impl TsvCallWriter<BufWriter<File>> {
    /// Create (or truncate) `path` and write the header line.
    pub fn create(path: &Path) -> io::Result<Self> {
        let file = File::create(path)?;
        Self::new(BufWriter::new(file), path.display().to_string())
    }
}

impl<W: Write> TsvCallWriter<W> {
    pub fn new(mut out: W, description: impl Into<String>) -> io::Result<Self> {
        writeln!(out, "{HEADER}")?;
        Ok(Self {
            out,
            description: description.into(),
            written: 0,
        })
    }

    /// Calls written so far.
    pub fn written(&self) -> usize {
        self.written
    }

    /// Flush and return the underlying writer.
    pub fn finish(mut self) -> io::Result<W> {
        self.out.flush()?;
        Ok(self.out)
    }
}

impl<W: Write> fmt::Display for TsvCallWriter<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.description)
    }
}

impl<W: Write> CallWriter<SvCall> for TsvCallWriter<W> {
    fn write_call(&mut self, call: &SvCall) -> Result<(), ResultError> {
        writeln!(
            self.out,
            "{}\t{}\t{}\t{}\t{}\t{}",
            call.contig, call.position, call.id, call.svtype, call.svlen, call.support
        )?;
        self.written += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::call::SvType;

    #[test]
    fn test_writes_header_and_rows() {
        let mut writer = TsvCallWriter::new(Vec::new(), "memory").unwrap();
        let call = SvCall {
            id: "sv1".to_string(),
            contig: "chr3".to_string(),
            position: 42,
            svtype: SvType::Dup,
            svlen: 800,
            support: 11,
        };
        writer.write_call(&call).unwrap();
        assert_eq!(writer.written(), 1);
        assert_eq!(writer.to_string(), "memory");

        let out = String::from_utf8(writer.finish().unwrap()).unwrap();
        assert_eq!(out, format!("{HEADER}\nchr3\t42\tsv1\tDUP\t800\t11\n"));
    }
}
