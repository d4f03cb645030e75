use apkalign::inspect::{DEFAULT_ARCHIVE, DEFAULT_ENTRIES, DEFAULT_PAGE_SIZE};
use clap::{ArgAction, Parser};
use std::path::PathBuf;

/// Report where native libraries start inside an APK and whether they are page aligned
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Arg {
    /// APK to inspect
    #[arg(default_value = DEFAULT_ARCHIVE)]
    pub archive: PathBuf,
    #[arg(short = 'e', long = "entry", value_name = "NAME")]
    /// Entry to check, may be repeated (default: the app's arm64-v8a libraries)
    pub entries: Vec<String>,
    #[arg(long, action = ArgAction::SetTrue, conflicts_with = "entries")]
    /// Check every .so under lib/ instead
    pub all_native_libs: bool,
    #[arg(long, value_name = "BYTES", default_value_t = DEFAULT_PAGE_SIZE, value_parser = clap::value_parser!(u64).range(1..))]
    /// Alignment boundary in bytes
    pub page_size: u64,
    #[arg(short, long, action = ArgAction::Count)]
    /// More log output on stderr, may be repeated
    pub verbose: u8,
}

impl Arg {
    /// The entries named on the command line, or the defaults.
    pub fn entry_names(&self) -> Vec<String> {
        if self.entries.is_empty() {
            DEFAULT_ENTRIES.iter().map(|s| s.to_string()).collect()
        } else {
            self.entries.clone()
        }
    }
}

/// Parse the command line, leaving the exit status of a usage error to the caller.
pub fn parse_args() -> Result<Arg, clap::Error> {
    Arg::try_parse()
}
