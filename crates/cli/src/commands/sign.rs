// `pushsync sign`: compute the X-Hub-Signature-256 value for a payload.

use std::io::Read;
use std::path::PathBuf;

use anyhow::Context;
use clap::Args;
use pushsync_common::signature::{self, SIGNATURE_HEADER};
use serde::Serialize;

use crate::exit_code::{ExitCode, UsageError};
use crate::output::{self, OutputFormat};

#[derive(Debug, Args)]
pub struct SignArgs {
    /// Shared secret.
    #[arg(long, conflicts_with = "secret_env", required_unless_present = "secret_env")]
    secret: Option<String>,

    /// Read the shared secret from this environment variable.
    #[arg(long)]
    secret_env: Option<String>,

    /// Payload file (defaults to stdin).
    #[arg(long)]
    file: Option<PathBuf>,

    /// Emit JSON instead of the bare token.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SignResult {
    pub header: &'static str,
    pub signature: String,
    pub body_bytes: usize,
}

pub fn run(args: SignArgs) -> anyhow::Result<ExitCode> {
    // The bare token is the useful form inside `$(...)`, so only JSON on request.
    let format = if args.json { OutputFormat::Json } else { OutputFormat::Human };

    let result = resolve_secret(&args, |key| std::env::var(key).ok())
        .and_then(|secret| read_body(args.file.as_ref()).map(|body| sign_body(&secret, &body)));

    match result {
        Ok(result) => {
            output::print_output(format, &result, format_human)?;
            Ok(ExitCode::Success)
        }
        Err(error) => {
            output::print_anyhow_error(format, &error);
            Err(error)
        }
    }
}

fn resolve_secret<F>(args: &SignArgs, env: F) -> anyhow::Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    let secret = match (&args.secret, &args.secret_env) {
        (Some(secret), _) => secret.clone(),
        (None, Some(var)) => env(var.as_str())
            .ok_or_else(|| UsageError(format!("environment variable {var} is not set")))?,
        (None, None) => return Err(UsageError("a secret is required".into()).into()),
    };
    if secret.is_empty() {
        return Err(UsageError("secret must not be empty".into()).into());
    }
    Ok(secret)
}

fn read_body(file: Option<&PathBuf>) -> anyhow::Result<Vec<u8>> {
    match file {
        Some(path) => std::fs::read(path)
            .with_context(|| format!("failed to read payload from {}", path.display())),
        None => {
            let mut body = Vec::new();
            std::io::stdin().lock().read_to_end(&mut body).context("failed to read payload from stdin")?;
            Ok(body)
        }
    }
}

fn sign_body(secret: &str, body: &[u8]) -> SignResult {
    SignResult {
        header: SIGNATURE_HEADER,
        signature: signature::sign(secret.as_bytes(), body),
        body_bytes: body.len(),
    }
}

fn format_human(result: &SignResult) -> String {
    result.signature.clone()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(secret: Option<&str>, secret_env: Option<&str>) -> SignArgs {
        SignArgs {
            secret: secret.map(str::to_string),
            secret_env: secret_env.map(str::to_string),
            file: None,
            json: false,
        }
    }

    #[test]
    fn signature_matches_webhook_verification() {
        let result = sign_body("It's a Secret to Everybody", b"Hello, World!");
        assert_eq!(
            result.signature,
            "sha256=757107ea0eb2509fc211221cce984b8a37570b6d7586c22c46f4379c8b043e17"
        );
        assert_eq!(result.header, "x-hub-signature-256");
        assert_eq!(result.body_bytes, 13);
        assert!(signature::verify(b"It's a Secret to Everybody", b"Hello, World!", Some(result.signature.as_str())).is_ok());
    }

    #[test]
    fn secret_env_is_resolved() {
        let secret = resolve_secret(&args(None, Some("HOOK_SECRET")), |key| {
            (key == "HOOK_SECRET").then(|| "from-env".to_string())
        })
        .expect("secret should resolve");
        assert_eq!(secret, "from-env");
    }

    #[test]
    fn unset_secret_env_is_usage_error() {
        let err = resolve_secret(&args(None, Some("HOOK_SECRET")), |_| None)
            .expect_err("unset variable should fail");
        assert_eq!(ExitCode::from_error(&err), ExitCode::Usage);
        assert!(err.to_string().contains("HOOK_SECRET"));
    }

    #[test]
    fn empty_secret_is_rejected() {
        let err = resolve_secret(&args(Some(""), None), |_| None).expect_err("empty secret");
        assert_eq!(ExitCode::from_error(&err), ExitCode::Usage);
    }

    #[test]
    fn payload_is_read_from_file() {
        let temp = tempfile::TempDir::new().expect("tempdir should be created");
        let path = temp.path().join("push.json");
        std::fs::write(&path, br#"{"ref":"refs/heads/main"}"#).expect("payload should be written");

        let body = read_body(Some(&path)).expect("payload should be read");
        assert_eq!(body, br#"{"ref":"refs/heads/main"}"#);
    }

    #[test]
    fn json_output_carries_header_name() {
        let mut buf = Vec::new();
        output::write_output(&mut buf, OutputFormat::Json, &sign_body("s", b"{}"), format_human)
            .unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&buf).unwrap();
        assert_eq!(parsed["header"], "x-hub-signature-256");
        assert!(parsed["signature"].as_str().unwrap().starts_with("sha256="));
    }
}
