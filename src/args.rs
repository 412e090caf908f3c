use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Directory where the playlist, cover art and parts are written
    pub output_dir: PathBuf,

    /// The .odm file to download. It is removed after a successful download unless `--keep-source` is set.
    pub odm_file: PathBuf,

    /// Write into a new subdirectory of OUTPUT_DIR named after the title
    #[arg(short, long, default_value_t = false)]
    pub make_output_dir: bool,

    /// Parse the .odm file and log its contents without downloading anything
    #[arg(short, long, default_value_t = false)]
    pub dry_run: bool,

    /// Keep the .odm file after a successful download
    #[arg(short, long, default_value_t = false)]
    pub keep_source: bool,

    /// Max number of retries for each file in case of a network error or a non-success response
    #[arg(long, value_name = "COUNT")]
    pub retry: Option<u32>,

    /// Wait number of seconds before the first retry; doubles on each further retry. Fractions are supported.
    #[arg(long, value_name = "Seconds")]
    pub waitretry: Option<f64>,

    /// Path of the config file. Defaults to `odm-dl/config.toml` in the user's config directory.
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,
}
