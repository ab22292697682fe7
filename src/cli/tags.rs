use std::io::Write;

use crate::cli::app::ChecksumArg;
use crate::cli::{open_segment, parse_lsn, parse_range, report_diagnostic};
use crate::pg::attribute::AttributeSchema;
use crate::pg::driver::{DecodeOutcome, Driver};
use crate::pg::session::{ChecksumMode, DecodeOptions};
use crate::util::sink::{JsonSink, WxHexEditorSink};
use crate::HexeditError;

/// Options for the tags subcommand.
pub struct TagsOptions {
    pub file: String,
    pub range: Vec<u32>,
    pub checksum: Option<ChecksumArg>,
    pub skip_leaf: bool,
    pub after_lsn: Option<String>,
    pub segment_size: Option<u32>,
    pub segment_number: Option<u32>,
    pub block_size: Option<u32>,
    pub attrs: Option<String>,
    pub json: bool,
    pub mmap: bool,
}

impl TagsOptions {
    /// Validate the arguments and build the decoder options. Every argument
    /// error is reported here, before any output is written.
    pub fn decode_options(&self) -> Result<DecodeOptions, HexeditError> {
        let checksum = match self.checksum {
            None => ChecksumMode::Off,
            Some(ChecksumArg::Always) => ChecksumMode::Always,
            Some(ChecksumArg::Nonzero) => ChecksumMode::IfNonZero,
        };
        let options = DecodeOptions {
            range: parse_range(&self.range)?,
            checksum,
            skip_leaf: self.skip_leaf,
            skip_before_lsn: self.after_lsn.as_deref().map(parse_lsn).transpose()?,
            segment_size: self.segment_size,
            segment_number: self.segment_number,
            block_size: self.block_size,
            schema: self.attrs.as_deref().map(AttributeSchema::parse).transpose()?,
        };
        options.validate()?;
        Ok(options)
    }
}

/// Decode a relation segment and write one tag per annotated byte range.
///
/// The default output is a wxHexEditor tag file: an XML preamble naming the
/// dump time, the options used and the file, then one `<TAG>` element per
/// tag. With `--json` the same tags are written as a JSON document.
///
/// Structural problems are reported on stderr as they are found and do not
/// stop decoding; if any were found the command returns an error after all
/// output has been written, so the process exits non-zero.
pub fn execute(opts: &TagsOptions, writer: &mut dyn Write) -> Result<(), HexeditError> {
    let options = opts.decode_options()?;
    let segment = open_segment(&opts.file, options.block_size, opts.mmap)?;
    let mut driver = Driver::new(segment, options)?;

    let outcome = if opts.json {
        let mut sink = JsonSink::new(&mut *writer);
        driver.run(&mut sink, report_diagnostic)?
    } else {
        let created = chrono::Local::now().format("%H:%M:%S %A, %B %d %Y").to_string();
        let mut sink = WxHexEditorSink::new(&mut *writer, created);
        driver.run(&mut sink, report_diagnostic)?
    };

    check_outcome(&outcome)
}

fn check_outcome(outcome: &DecodeOutcome) -> Result<(), HexeditError> {
    if outcome.had_errors {
        return Err(HexeditError::Parse(format!(
            "{} structural error(s) found in {} block(s)",
            outcome.error_count, outcome.blocks_read
        )));
    }
    Ok(())
}
