use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "pg_hexedit")]
#[command(about = "PostgreSQL relation file decoder producing hex editor tags")]
#[command(version)]
pub struct Cli {
    /// Control colored output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Write output to a file instead of stdout
    #[arg(short, long, global = true)]
    pub output: Option<String>,

    /// Read input through memory-mapped I/O
    #[arg(long, global = true)]
    pub mmap: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum ColorMode {
    Auto,
    Always,
    Never,
}

/// When `-k` verifies checksums.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ChecksumArg {
    /// Verify every page
    Always,
    /// Verify only pages with a non-zero stored checksum
    Nonzero,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Emit annotated tags for every block (wxHexEditor XML or JSON)
    Tags {
        /// Path to the relation segment file
        #[arg(short, long)]
        file: String,

        /// Block range to decode: START [END]
        #[arg(short = 'R', long, num_args = 1..=2, value_names = ["START", "END"])]
        range: Vec<u32>,

        /// Verify page checksums (optionally only non-zero ones)
        #[arg(short = 'k', long, num_args = 0..=1, default_missing_value = "always")]
        checksum: Option<ChecksumArg>,

        /// Tag non-root index leaf pages as a single region
        #[arg(short = 'l', long = "skip-leaf")]
        skip_leaf: bool,

        /// Skip pages whose LSN is before this value (XXXXXXXX/XXXXXXXX)
        #[arg(short = 'x', long = "after-lsn")]
        after_lsn: Option<String>,

        /// Segment size in bytes (default: 131072 blocks)
        #[arg(short = 's', long = "segment-size")]
        segment_size: Option<u32>,

        /// Segment number (default: from the file name suffix)
        #[arg(short = 'n', long = "segment-number")]
        segment_number: Option<u32>,

        /// Override block size (default: detect from block 0)
        #[arg(long = "block-size")]
        block_size: Option<u32>,

        /// Attribute schema: comma-separated len,name,align triples
        #[arg(short = 'D', long = "attrs")]
        attrs: Option<String>,

        /// Output tags as JSON instead of wxHexEditor XML
        #[arg(long)]
        json: bool,
    },

    /// One-line summary of each block's page variant and header
    Classify {
        /// Path to the relation segment file
        #[arg(short, long)]
        file: String,

        /// Block range to summarize: START [END]
        #[arg(short = 'R', long, num_args = 1..=2, value_names = ["START", "END"])]
        range: Vec<u32>,

        /// Segment number (default: from the file name suffix)
        #[arg(short = 'n', long = "segment-number")]
        segment_number: Option<u32>,

        /// Override block size (default: detect from block 0)
        #[arg(long = "block-size")]
        block_size: Option<u32>,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Verify data checksums of every block
    Checksum {
        /// Path to the relation segment file
        #[arg(short, long)]
        file: String,

        /// Show per-block checksum details
        #[arg(short, long)]
        verbose: bool,

        /// Skip blocks whose stored checksum is zero
        #[arg(long)]
        nonzero: bool,

        /// Segment number (default: from the file name suffix)
        #[arg(short = 'n', long = "segment-number")]
        segment_number: Option<u32>,

        /// Segment size in bytes (default: 131072 blocks)
        #[arg(short = 's', long = "segment-size")]
        segment_size: Option<u32>,

        /// Override block size (default: detect from block 0)
        #[arg(long = "block-size")]
        block_size: Option<u32>,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Hex dump of raw block bytes
    Dump {
        /// Path to the relation segment file
        #[arg(short, long)]
        file: String,

        /// Block number to dump (default: 0)
        #[arg(short, long)]
        block: Option<u32>,

        /// Absolute byte offset to start dumping (bypasses block mode)
        #[arg(long)]
        offset: Option<u64>,

        /// Number of bytes to dump (default: block size or 256 for offset mode)
        #[arg(short, long)]
        length: Option<usize>,

        /// Output raw binary bytes (no formatting)
        #[arg(long)]
        raw: bool,

        /// Annotate dump lines with the tags that start on them
        #[arg(short, long)]
        tags: bool,

        /// Override block size (default: detect from block 0)
        #[arg(long = "block-size")]
        block_size: Option<u32>,
    },

    /// Generate shell completion scripts
    Completions {
        /// Shell to generate completions for
        shell: clap_complete::Shell,
    },
}
