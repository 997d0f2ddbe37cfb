//! `image-extend extend` command: run an image's extension and graft the result.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Args;
use extender_core::error::Result;
use extender_core::{CertConfig, CertConventions, EventEmitter, ExtendConfig, RelayMode};
use extender_runtime::{
    build_payload, payload_from_file, CancellationToken, DaemonImageStore, DockerEngine,
    ExtendToml, ExtensionRequest, ImageExtender, LogSinks,
};

#[derive(Args)]
pub struct ExtendArgs {
    /// Extension kind (e.g., build, run)
    #[arg(long)]
    pub kind: String,

    /// Image to extend
    #[arg(long = "base-image")]
    pub base_image: String,

    /// Existing extend.toml to stage instead of a generated one
    #[arg(long)]
    pub payload: Option<PathBuf>,

    /// Certificate path; prefix with `build:` or `run:` to limit it to one image
    #[arg(long = "cert")]
    pub certs: Vec<String>,

    /// Stage certificate contents instead of their paths
    #[arg(long)]
    pub embed_certs: bool,

    /// Relay output as a raw TTY stream
    #[arg(long)]
    pub interactive: bool,

    /// Docker daemon socket (`unix://...` or a path); defaults to DOCKER_HOST
    #[arg(long)]
    pub docker_host: Option<String>,

    /// Suffix appended to the base tag
    #[arg(long, default_value = "-extended")]
    pub suffix: String,
}

pub async fn execute(args: ExtendArgs) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let config = ExtendConfig {
        relay: RelayMode::from_interactive(args.interactive),
        extended_suffix: args.suffix.clone(),
        ..Default::default()
    };
    let payload = request_payload(&args, &config.certs)?;

    let engine = match &args.docker_host {
        Some(host) => DockerEngine::from_host(host)?,
        None => DockerEngine::from_env()?,
    };
    let store = Arc::new(DaemonImageStore::new(engine.clone())?);
    let extender = ImageExtender::new(Arc::new(engine), store, config, EventEmitter::default());

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nCancelling, cleaning up scratch resources...");
            trigger.cancel();
        }
    });

    let request = ExtensionRequest::new(args.kind, args.base_image, payload);
    let mut sinks = LogSinks::stdio();
    let result = extender.extend(&cancel, &request, &mut sinks).await;
    ctrl_c.abort();

    println!("{}", result?);
    Ok(())
}

/// Build the payload archive: the given file, or an `extend.toml` listing
/// the certificates that apply to the kind.
fn request_payload(args: &ExtendArgs, conventions: &CertConventions) -> Result<Vec<u8>> {
    if let Some(path) = &args.payload {
        return payload_from_file(path);
    }

    let classified = CertConfig::classify(args.certs.as_slice(), conventions);
    let certs = if args.embed_certs {
        let contents = classified.read_contents()?;
        for_kind(&args.kind, contents.build, contents.run)
    } else {
        for_kind(&args.kind, classified.build, classified.run)
    };
    build_payload(&ExtendToml { certs })
}

/// `run` extensions get the run set; every other kind builds.
fn for_kind(kind: &str, build: Vec<String>, run: Vec<String>) -> Vec<String> {
    if kind == "run" {
        run
    } else {
        build
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    fn args(kind: &str, certs: &[&str]) -> ExtendArgs {
        ExtendArgs {
            kind: kind.to_string(),
            base_image: "app".to_string(),
            payload: None,
            certs: certs.iter().map(|s| s.to_string()).collect(),
            embed_certs: false,
            interactive: false,
            docker_host: None,
            suffix: "-extended".to_string(),
        }
    }

    fn staged_toml(archive: &[u8]) -> ExtendToml {
        let mut ar = tar::Archive::new(archive);
        let mut entry = ar.entries().unwrap().next().unwrap().unwrap();
        let mut body = String::new();
        entry.read_to_string(&mut body).unwrap();
        ExtendToml::from_toml(&body).unwrap()
    }

    #[test]
    fn test_for_kind() {
        let build = vec!["b".to_string()];
        let run = vec!["r".to_string()];
        assert_eq!(for_kind("run", build.clone(), run.clone()), run);
        assert_eq!(for_kind("build", build.clone(), run.clone()), build);
        assert_eq!(for_kind("custom", build.clone(), run), build);
    }

    #[test]
    fn test_payload_selects_kind_set() {
        let conventions = CertConventions::default();
        let certs = ["build:/a.crt", "run:/b.crt", "/c.crt"];

        let build = request_payload(&args("build", &certs), &conventions).unwrap();
        assert_eq!(staged_toml(&build).certs, vec!["/a.crt", "/c.crt"]);

        let run = request_payload(&args("run", &certs), &conventions).unwrap();
        assert_eq!(staged_toml(&run).certs, vec!["/b.crt", "/c.crt"]);
    }

    #[test]
    fn test_payload_embeds_contents() {
        let tmp = tempfile::TempDir::new().unwrap();
        let cert = tmp.path().join("ca.pem");
        std::fs::write(&cert, "-----BEGIN CERTIFICATE-----\n").unwrap();

        let mut a = args("build", &[]);
        a.certs = vec![cert.to_string_lossy().to_string()];
        a.embed_certs = true;

        let archive = request_payload(&a, &CertConventions::default()).unwrap();
        assert_eq!(
            staged_toml(&archive).certs,
            vec!["-----BEGIN CERTIFICATE-----\n"]
        );
    }

    #[test]
    fn test_payload_embed_missing_cert() {
        let mut a = args("build", &["/nonexistent/ca.pem"]);
        a.embed_certs = true;
        assert!(request_payload(&a, &CertConventions::default()).is_err());
    }

    #[test]
    fn test_payload_from_file_wins() {
        let tmp = tempfile::TempDir::new().unwrap();
        let file = tmp.path().join("extend.toml");
        std::fs::write(&file, "certs = [\"/custom.pem\"]\n").unwrap();

        let mut a = args("build", &["/ignored.pem"]);
        a.payload = Some(file);
        let archive = request_payload(&a, &CertConventions::default()).unwrap();
        assert_eq!(staged_toml(&archive).certs, vec!["/custom.pem"]);
    }
}
