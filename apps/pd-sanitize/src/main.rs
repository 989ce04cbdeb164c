//! `pd-sanitize`: hardens links and forms in an HTML file or stream.

mod args;
mod decode;

use std::fs;
use std::io;
use std::io::Read;
use std::io::Write;
use std::path::Path;
use std::process::ExitCode;

use pd_core::ErrorKind;
use pd_core::PdError;
use pd_core::PdResult;
use pd_engine::Sanitized;
use serde_json::Map;
use serde_json::Value;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::args::Command;
use crate::args::Invocation;
use crate::args::USAGE;

const EXIT_RUNTIME: u8 = 1;
const EXIT_USAGE: u8 = 2;

fn main() -> ExitCode {
    let invocation = match args::parse_args(std::env::args().skip(1)) {
        Ok(Command::Run(invocation)) => invocation,
        Ok(Command::Help) => {
            print!("{USAGE}");
            return ExitCode::SUCCESS;
        }
        Err(message) => {
            eprintln!("pd-sanitize: {message}\n\n{USAGE}");
            return ExitCode::from(EXIT_USAGE);
        }
    };

    if let Err(message) = init_logging(invocation.verbose) {
        eprintln!("pd-sanitize: {message}");
        return ExitCode::from(EXIT_USAGE);
    }

    match run(&invocation) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("pd-sanitize: {error}");
            ExitCode::from(EXIT_RUNTIME)
        }
    }
}

/// `PD_LOG` first, then `RUST_LOG`, then `warn` (`debug` with `--verbose`).
fn init_logging(verbose: bool) -> Result<(), String> {
    let directives = std::env::var("PD_LOG")
        .or_else(|_| std::env::var("RUST_LOG"))
        .unwrap_or_else(|_| if verbose { "debug" } else { "warn" }.to_owned());
    let filter = EnvFilter::try_new(&directives)
        .map_err(|error| format!("invalid log filter `{directives}`: {error}"))?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init()
        .map_err(|error| format!("cannot install logger: {error}"))
}

fn run(invocation: &Invocation) -> PdResult<()> {
    let bytes = match &invocation.input {
        Some(path) => fs::read(path).map_err(|error| io_error(path, &error))?,
        None => {
            let mut bytes = Vec::new();
            io::stdin().lock().read_to_end(&mut bytes)?;
            bytes
        }
    };
    let markup = decode::decode_markup(&bytes, invocation.charset);

    let base = match &invocation.config {
        Some(path) => load_config(path)?,
        None => Map::new(),
    };
    let config = Value::Object(apply_flags(base, invocation));
    debug!(config = %config, "resolved command line options");

    let rendered = render(pd_engine::sanitize(markup.as_str(), &config)?);

    match &invocation.output {
        Some(path) => fs::write(path, rendered).map_err(|error| io_error(path, &error)),
        None => {
            let mut stdout = io::stdout().lock();
            stdout.write_all(rendered.as_bytes())?;
            stdout.flush()?;
            Ok(())
        }
    }
}

fn load_config(path: &Path) -> PdResult<Map<String, Value>> {
    let text = fs::read_to_string(path).map_err(|error| io_error(path, &error))?;
    match serde_json::from_str(&text) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(PdError::new(
            ErrorKind::InvalidConfig,
            format!("{} must hold a JSON object", path.display()),
        )),
        Err(error) => Err(PdError::new(
            ErrorKind::InvalidConfig,
            format!("{}: {error}", path.display()),
        )),
    }
}

/// Command line flags override keys loaded from `--config`.
fn apply_flags(mut config: Map<String, Value>, invocation: &Invocation) -> Map<String, Value> {
    if invocation.whole_document {
        config.insert("wholeDocument".to_owned(), Value::Bool(true));
    }
    if let Some(base_url) = &invocation.base_url {
        config.insert("baseUrl".to_owned(), Value::String(base_url.clone()));
    }
    if let Some(rules) = &invocation.rules {
        config.insert("rules".to_owned(), rules.clone());
    }
    config
}

/// Text written for each kind of result. A tree requested through the
/// config file is written as its outer markup.
fn render(sanitized: Sanitized<'_>) -> String {
    match sanitized {
        Sanitized::Tree(tree) => tree.map(|tree| tree.outer_html()).unwrap_or_default(),
        other => other.into_markup().unwrap_or_default(),
    }
}

fn io_error(path: &Path, error: &io::Error) -> PdError {
    PdError::new(ErrorKind::Io, format!("{}: {error}", path.display()))
}

#[cfg(test)]
mod tests {
    use serde_json::Map;
    use serde_json::Value;
    use serde_json::json;

    use super::apply_flags;
    use super::render;
    use crate::args::Invocation;

    #[test]
    fn flags_override_config_file_keys() {
        let Value::Object(base) = json!({
            "wholeDocument": false,
            "rules": {"noopener": true},
            "returnTree": false,
        }) else {
            panic!("literal is an object");
        };
        let invocation = Invocation {
            whole_document: true,
            base_url: Some("https://example.org/".to_owned()),
            rules: Some(json!({"blankTarget": true})),
            ..Invocation::default()
        };

        let merged = Value::Object(apply_flags(base, &invocation));
        assert_eq!(
            merged,
            json!({
                "wholeDocument": true,
                "rules": {"blankTarget": true},
                "returnTree": false,
                "baseUrl": "https://example.org/",
            })
        );
    }

    #[test]
    fn absent_flags_leave_config_alone() {
        let merged = apply_flags(Map::new(), &Invocation::default());
        assert!(merged.is_empty());
    }

    #[test]
    fn renders_markup_and_trees() {
        let markup = pd_engine::sanitize("<a href=\"https://x.test/\">x</a>", &json!({}));
        assert_eq!(
            markup.map(render),
            Ok("<a href=\"https://x.test/\" target=\"_blank\" rel=\"noopener noreferrer\" referrerpolicy=\"no-referrer\">x</a>".to_owned())
        );

        let tree = pd_engine::sanitize("<p>x</p>", &json!({"returnTree": true, "rules": {}}));
        assert_eq!(tree.map(render), Ok("<body><p>x</p></body>".to_owned()));
    }
}
