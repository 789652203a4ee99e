// Terminal front-end: command line definition, logging setup and the
// `send` / `upload` flows. This is the only layer that decides how an
// error ends the process.

use std::collections::BTreeMap;
use std::io::{IsTerminal, Read};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context as _, Result};
use clap::{Args, Parser, Subcommand};
use dialoguer::Password;
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::blocking::Response;
use tracing_subscriber::EnvFilter;

use crate::api::ApiClient;
use crate::config::{Config, ConfigError};
use crate::context::Context;
use crate::error::{HttpError, EXIT_CODE_CONFIG, EXIT_CODE_IO_ERROR};
use crate::http::parse_method;

#[derive(Debug, Parser)]
#[command(name = "rest-courier", version, about = "Send authenticated requests with retry and streamed uploads")]
pub struct Cli {
    /// JSON config file (default: ~/.rest-courier.json if it exists)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Base URL that relative request paths are resolved against
    #[arg(long, global = true)]
    pub server: Option<String>,

    #[arg(long, global = true)]
    pub user: Option<String>,

    #[arg(long, global = true)]
    pub apitoken: Option<String>,

    /// Seconds to wait between retries
    #[arg(long, global = true)]
    pub wait_seconds: Option<u64>,

    /// Retries after the first attempt
    #[arg(long, global = true)]
    pub max_retries: Option<u32>,

    /// Log requests and responses
    #[arg(long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Send a request with a JSON (or custom) payload
    Send(SendArgs),
    /// Upload a file as multipart/form-data
    Upload(UploadArgs),
}

#[derive(Debug, Args)]
pub struct SendArgs {
    pub method: String,
    pub url: String,

    /// Literal request body
    #[arg(long, conflicts_with_all = ["data_file", "template"])]
    pub data: Option<String>,

    /// Read the request body from a file ("-" for stdin)
    #[arg(long, conflicts_with = "template")]
    pub data_file: Option<PathBuf>,

    /// Body template whose {{ .NAME }} placeholders are filled from the environment
    #[arg(long)]
    pub template: Option<PathBuf>,

    /// Extra header as NAME:VALUE; replaces the JSON defaults
    #[arg(short = 'H', long = "header", value_parser = parse_header)]
    pub headers: Vec<(String, String)>,
}

#[derive(Debug, Args)]
pub struct UploadArgs {
    pub url: String,

    #[arg(long)]
    pub file: PathBuf,

    /// Form field name of the file part
    #[arg(long, default_value = "file")]
    pub name: String,

    /// Form field as KEY=VALUE
    #[arg(short = 'F', long = "field", value_parser = parse_field)]
    pub fields: Vec<(String, String)>,
}

fn split_pair(s: &str, sep: char) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once(sep)
        .ok_or_else(|| format!("expected KEY{sep}VALUE, got {s:?}"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty key in {s:?}"));
    }
    Ok((key.to_string(), value.trim_start().to_string()))
}

fn parse_header(s: &str) -> Result<(String, String), String> {
    split_pair(s, ':')
}

fn parse_field(s: &str) -> Result<(String, String), String> {
    split_pair(s, '=')
}

/// Install the stderr log subscriber. `RUST_LOG` wins over `debug`.
pub fn init_logging(debug: bool) {
    let default = if debug { "rest_courier=debug,info" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    // A second init (tests, embedding) keeps the first subscriber.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .with_target(false)
        .try_init();
}

/// Exit status for an error that reached `main`.
pub fn exit_code_for(err: &anyhow::Error) -> i32 {
    if let Some(http) = err.downcast_ref::<HttpError>() {
        return http.exit_code();
    }
    if err.downcast_ref::<ConfigError>().is_some() {
        return EXIT_CODE_CONFIG;
    }
    if err.downcast_ref::<std::io::Error>().is_some() {
        return EXIT_CODE_IO_ERROR;
    }
    1
}

pub fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(server) = &cli.server {
        config.server = Some(server.clone());
    }
    if let Some(user) = &cli.user {
        config.user = user.clone();
    }
    if let Some(token) = &cli.apitoken {
        config.api_token = token.clone();
    }
    if let Some(wait) = cli.wait_seconds {
        config.wait_seconds = wait;
    }
    if let Some(retries) = cli.max_retries {
        config.max_retries = retries;
    }
    config.debug |= cli.debug;
    Ok(config)
}

/// Ask for the API token when none is configured and a user is at the
/// terminal.
fn prompt_token(config: &mut Config) -> Result<()> {
    if config.api_token.is_empty() && std::io::stdin().is_terminal() {
        config.api_token = Password::new()
            .with_prompt(format!("API token for {}", config.user))
            .interact()
            .context("Failed to read API token")?;
    }
    Ok(())
}

pub fn run(cli: Cli) -> Result<()> {
    let mut config = load_config(&cli)?;
    init_logging(config.debug);
    prompt_token(&mut config)?;
    config.validate_credentials()?;

    let context = Context::from_config(&config)?;
    let mut api = ApiClient::new(context);

    match cli.command {
        Command::Send(args) => handle_send(&mut api, &config, args),
        Command::Upload(args) => handle_upload(&api, &config, args),
    }
}

fn handle_send(api: &mut ApiClient, config: &Config, args: SendArgs) -> Result<()> {
    let method = parse_method(&args.method)?;
    let url = config.resolve_url(&args.url);

    let ctx = api.context_mut();
    if let Some(data) = args.data {
        ctx.set_content(data);
    } else if let Some(path) = args.data_file {
        ctx.set_content(read_input(&path)?);
    } else if let Some(path) = args.template {
        let template = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read template {}", path.display()))?;
        ctx.set_template(&template);
    } else {
        ctx.clear_content();
    }

    let response = if args.headers.is_empty() {
        api.send_with_default_header(method, &url)?
    } else {
        let headers: BTreeMap<String, String> = args.headers.into_iter().collect();
        api.send_with_header(method, &url, &headers)?
    };
    print_response(response)
}

fn handle_upload(api: &ApiClient, config: &Config, args: UploadArgs) -> Result<()> {
    let url = config.resolve_url(&args.url);
    let fields: BTreeMap<String, String> = args.fields.into_iter().collect();

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::with_template("{spinner} {msg}")?);
    spinner.set_message(format!("Uploading {}...", args.file.display()));
    spinner.enable_steady_tick(Duration::from_millis(120));

    let result = api.upload_file(&url, &fields, &args.name, &args.file);
    spinner.finish_and_clear();
    print_response(result?)
}

fn read_input(path: &Path) -> Result<Vec<u8>> {
    if path.as_os_str() == "-" {
        let mut buf = Vec::new();
        std::io::stdin()
            .read_to_end(&mut buf)
            .context("Failed to read request body from stdin")?;
        return Ok(buf);
    }
    std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))
}

fn print_response(response: Response) -> Result<()> {
    let status = response.status();
    let body = response.text().context("Failed to read response body")?;
    eprintln!("{status}");
    if !body.is_empty() {
        println!("{body}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_send_command() {
        let cli = Cli::try_parse_from([
            "rest-courier",
            "--debug",
            "send",
            "post",
            "/api/job",
            "--data",
            "{}",
            "-H",
            "Accept: text/plain",
        ])
        .unwrap();
        assert!(cli.debug);
        match cli.command {
            Command::Send(args) => {
                assert_eq!(args.method, "post");
                assert_eq!(args.data.as_deref(), Some("{}"));
                assert_eq!(args.headers, vec![("Accept".to_string(), "text/plain".to_string())]);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn parses_upload_command() {
        let cli = Cli::try_parse_from([
            "rest-courier",
            "upload",
            "https://h/upload",
            "--file",
            "a/b/src.zip",
            "-F",
            "checksum=abc",
            "--max-retries",
            "2",
        ])
        .unwrap();
        assert_eq!(cli.max_retries, Some(2));
        match cli.command {
            Command::Upload(args) => {
                assert_eq!(args.name, "file");
                assert_eq!(args.fields, vec![("checksum".to_string(), "abc".to_string())]);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn data_and_template_conflict() {
        let parsed = Cli::try_parse_from([
            "rest-courier", "send", "GET", "/x", "--data", "{}", "--template", "t.json",
        ]);
        assert!(parsed.is_err());
    }

    #[test]
    fn pair_parsing() {
        assert_eq!(parse_field("k=v=w").unwrap(), ("k".into(), "v=w".into()));
        assert!(parse_field("novalue").is_err());
        assert!(parse_header(": x").is_err());
    }

    #[test]
    fn exit_codes_follow_error_kind() {
        let http = anyhow::Error::new(HttpError::InvalidRequest("x".into()));
        assert_eq!(exit_code_for(&http), crate::error::EXIT_CODE_HTTP_ERROR);

        let config = anyhow::Error::new(ConfigError::Missing("user"));
        assert_eq!(exit_code_for(&config), EXIT_CODE_CONFIG);

        let io = anyhow::Error::new(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"))
            .context("Failed to read body");
        assert_eq!(exit_code_for(&io), EXIT_CODE_IO_ERROR);

        assert_eq!(exit_code_for(&anyhow::anyhow!("other")), 1);
    }

    #[test]
    fn missing_explicit_config_is_a_config_error() {
        let cli = Cli::try_parse_from([
            "rest-courier",
            "--config",
            "/definitely/missing.json",
            "send",
            "GET",
            "/x",
        ])
        .unwrap();
        let err = load_config(&cli).unwrap_err();
        assert_eq!(exit_code_for(&err), EXIT_CODE_CONFIG);
    }
}
