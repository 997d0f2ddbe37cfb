//! CLI command definitions and dispatch.

mod certs;
mod extend;

use clap::{Parser, Subcommand};
use extender_core::LogLevel;

/// Image extender: run an image's extension binary and keep the layer it
/// produces.
#[derive(Parser)]
#[command(name = "image-extend", version, about)]
pub struct Cli {
    /// Log level when RUST_LOG is unset (debug, info, warn, error)
    #[arg(long, global = true)]
    pub log_level: Option<LogLevel>,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Subcommand)]
pub enum Command {
    /// Extend an image by running its extension in a scratch container
    Extend(extend::ExtendArgs),
    /// Classify certificate paths into build and run sets
    Certs(certs::CertsArgs),
}

/// Dispatch a parsed CLI command to its handler.
pub async fn dispatch(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Command::Extend(args) => extend::execute(args).await,
        Command::Certs(args) => certs::execute(args).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_extend() {
        let cli = Cli::try_parse_from([
            "image-extend",
            "extend",
            "--kind",
            "build",
            "--base-image",
            "cnbs/sample-stack-build:bionic",
            "--cert",
            "build:/a.crt",
            "--cert",
            "/c.crt",
            "--interactive",
        ])
        .unwrap();
        match cli.command {
            Command::Extend(args) => {
                assert_eq!(args.kind, "build");
                assert_eq!(args.base_image, "cnbs/sample-stack-build:bionic");
                assert_eq!(args.certs, vec!["build:/a.crt", "/c.crt"]);
                assert!(args.interactive);
                assert!(!args.embed_certs);
                assert_eq!(args.suffix, "-extended");
            }
            _ => panic!("expected extend"),
        }
    }

    #[test]
    fn test_parse_extend_requires_base_image() {
        assert!(Cli::try_parse_from(["image-extend", "extend", "--kind", "run"]).is_err());
    }

    #[test]
    fn test_parse_certs() {
        let cli =
            Cli::try_parse_from(["image-extend", "certs", "build:/a.crt,run:/b.crt"]).unwrap();
        assert!(matches!(cli.command, Command::Certs(_)));
        assert_eq!(cli.log_level, None);
    }

    #[test]
    fn test_parse_log_level_after_subcommand() {
        let cli = Cli::try_parse_from(["image-extend", "certs", "/a.crt", "--log-level", "debug"])
            .unwrap();
        assert_eq!(cli.log_level, Some(LogLevel::Debug));
        assert!(Cli::try_parse_from(["image-extend", "--log-level", "loud", "certs", "/a.crt"])
            .is_err());
    }
}
