//! Command-line parsing.

use clap::error::ErrorKind;
use clap::Parser;
use loadtest_populate_elasticsearch::ElasticsearchPopulateArgs;
use std::ffi::OsString;

/// One-line usage printed when positional arguments are missing.
pub const USAGE: &str =
    "es-index-loader <clusterId> <region> <username> <password> 3 10000 1000";

#[derive(Parser, Debug)]
#[command(name = "es-index-loader")]
#[command(about = "Create a time-stamped Elasticsearch index and fill it with mock documents")]
#[command(version)]
pub struct Cli {
    #[command(flatten)]
    pub args: ElasticsearchPopulateArgs,
}

/// What the process should do after looking at its arguments.
#[derive(Debug)]
pub enum Invocation {
    Run(Box<Cli>),
    /// Not enough positional arguments: print [`USAGE`] and stop.
    Usage,
}

/// Parse arguments. Missing positionals are not an error but a request for
/// the usage line; every other parse failure (bad numbers, unknown flags,
/// `--help`) is returned for clap to report.
pub fn parse_invocation<I, T>(argv: I) -> Result<Invocation, clap::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    match Cli::try_parse_from(argv) {
        Ok(cli) => Ok(Invocation::Run(Box::new(cli))),
        Err(e) if e.kind() == ErrorKind::MissingRequiredArgument => Ok(Invocation::Usage),
        Err(e) => Err(e),
    }
}
