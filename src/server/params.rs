//! Server launch parameters
//!
//! A start request may leave any field out; [`RunParameters::resolve`]
//! fills the gaps from the stored defaults and [`ResolvedParams::to_args`]
//! turns the result into the `llama-server` argument vector.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config::{host_threads, DefaultParams};

/// Parameters as supplied by the caller
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RunParameters {
    pub port: Option<u16>,
    pub host: Option<String>,
    #[serde(alias = "contextSize")]
    pub ctx_size: Option<u32>,
    pub gpu_layers: Option<u32>,
    pub threads: Option<u32>,
    pub batch_size: Option<u32>,
    #[serde(alias = "flashAttention")]
    pub flash_attn: Option<bool>,
    pub mlock: Option<bool>,
    pub no_mmap: Option<bool>,
    pub api_key: Option<String>,
}

/// Every field decided
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedParams {
    pub port: u16,
    pub host: String,
    pub ctx_size: u32,
    pub gpu_layers: u32,
    pub threads: u32,
    pub batch_size: u32,
    pub flash_attn: bool,
    pub mlock: bool,
    pub no_mmap: bool,
    pub api_key: Option<String>,
}

impl RunParameters {
    pub fn resolve(&self, defaults: &DefaultParams) -> ResolvedParams {
        let threads = self.threads.unwrap_or(defaults.threads);
        ResolvedParams {
            port: self.port.unwrap_or(defaults.port),
            host: self.host.clone().unwrap_or_else(|| defaults.host.clone()),
            ctx_size: self.ctx_size.unwrap_or(defaults.ctx_size),
            gpu_layers: self.gpu_layers.unwrap_or(defaults.gpu_layers),
            // Zero means "let the host decide"
            threads: if threads == 0 { host_threads() } else { threads },
            batch_size: self.batch_size.unwrap_or(defaults.batch_size),
            flash_attn: self.flash_attn.unwrap_or(false),
            mlock: self.mlock.unwrap_or(false),
            no_mmap: self.no_mmap.unwrap_or(false),
            api_key: self.api_key.clone().filter(|k| !k.is_empty()),
        }
    }
}

impl ResolvedParams {
    /// Argument vector in llama-server's flag order
    pub fn to_args(&self, model_path: &Path) -> Vec<String> {
        let mut args = vec![
            "-m".to_string(),
            model_path.display().to_string(),
            "--port".to_string(),
            self.port.to_string(),
            "--host".to_string(),
            self.host.clone(),
            "-c".to_string(),
            self.ctx_size.to_string(),
            "-ngl".to_string(),
            self.gpu_layers.to_string(),
            "-t".to_string(),
            self.threads.to_string(),
            "-b".to_string(),
            self.batch_size.to_string(),
        ];

        if let Some(key) = &self.api_key {
            args.push("--api-key".to_string());
            args.push(key.clone());
        }
        if self.flash_attn {
            args.push("-fa".to_string());
        }
        if self.mlock {
            args.push("--mlock".to_string());
        }
        if self.no_mmap {
            args.push("--no-mmap".to_string());
        }
        args
    }
}

/// Argument line for the log, with the API key masked
pub fn display_args(args: &[String]) -> String {
    let mut shown = Vec::with_capacity(args.len());
    let mut mask_next = false;
    for arg in args {
        if mask_next {
            shown.push("****".to_string());
            mask_next = false;
        } else {
            mask_next = arg == "--api-key";
            shown.push(arg.clone());
        }
    }
    shown.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defaults() -> DefaultParams {
        DefaultParams {
            ctx_size: 4096,
            gpu_layers: 0,
            port: 8080,
            host: "127.0.0.1".into(),
            threads: 8,
            batch_size: 512,
        }
    }

    #[test]
    fn test_defaults_fill_every_field() {
        let args = RunParameters::default()
            .resolve(&defaults())
            .to_args(Path::new("/m/model.gguf"));
        assert_eq!(
            args,
            vec![
                "-m", "/m/model.gguf", "--port", "8080", "--host", "127.0.0.1", "-c", "4096", "-ngl", "0", "-t",
                "8", "-b", "512"
            ]
        );
    }

    #[test]
    fn test_overrides_and_flags() {
        let params = RunParameters {
            port: Some(9000),
            gpu_layers: Some(99),
            flash_attn: Some(true),
            no_mmap: Some(true),
            mlock: Some(false),
            api_key: Some("secret".into()),
            ..RunParameters::default()
        };
        let args = params.resolve(&defaults()).to_args(Path::new("m.gguf"));

        assert_eq!(args[3], "9000");
        assert_eq!(args[9], "99");
        assert_eq!(&args[14..], ["--api-key", "secret", "-fa", "--no-mmap"]);
        assert!(!args.contains(&"--mlock".to_string()));
    }

    #[test]
    fn test_empty_api_key_is_omitted() {
        let params = RunParameters {
            api_key: Some(String::new()),
            ..RunParameters::default()
        };
        let args = params.resolve(&defaults()).to_args(Path::new("m.gguf"));
        assert!(!args.contains(&"--api-key".to_string()));
    }

    #[test]
    fn test_zero_threads_uses_host_cores() {
        let mut d = defaults();
        d.threads = 0;
        let resolved = RunParameters::default().resolve(&d);
        assert_eq!(resolved.threads, host_threads());
    }

    #[test]
    fn test_wire_names() {
        let params: RunParameters =
            serde_json::from_str(r#"{"port": 8081, "ctxSize": 2048, "flashAttention": true, "noMmap": true}"#).unwrap();
        assert_eq!(params.port, Some(8081));
        assert_eq!(params.ctx_size, Some(2048));
        assert_eq!(params.flash_attn, Some(true));
        assert_eq!(params.no_mmap, Some(true));
    }

    #[test]
    fn test_display_args_masks_key() {
        let args: Vec<String> = ["-m", "x", "--api-key", "secret", "-fa"].iter().map(|s| s.to_string()).collect();
        assert_eq!(display_args(&args), "-m x --api-key **** -fa");
    }
}
