//! `image-extend certs` command: show how certificate paths are classified.

use clap::Args;
use extender_core::{CertConfig, CertConventions};

#[derive(Args)]
pub struct CertsArgs {
    /// Certificate paths, optionally prefixed with `build:` or `run:`
    #[arg(required = true)]
    pub paths: Vec<String>,

    /// Read every file and fail on the first one that cannot be read
    #[arg(long)]
    pub check: bool,
}

pub async fn execute(args: CertsArgs) -> Result<(), Box<dyn std::error::Error>> {
    let classified = CertConfig::classify(args.paths.as_slice(), &CertConventions::default());
    if args.check {
        classified.read_contents()?;
    }
    println!("{}", serde_json::to_string_pretty(&classified)?);
    Ok(())
}
