use std::path::PathBuf;

use encoding_rs::Encoding;
use serde_json::Value;

pub(crate) const USAGE: &str = "\
usage: pd-sanitize [OPTIONS] [FILE]

Hardens links and forms in HTML read from FILE (or stdin when FILE is
absent or `-`) and writes the result to stdout.

options:
  --whole-document     keep and return the html/head/body wrapper
  --base-url <url>     resolve relative href/action values against <url>
  --rules <json>       rule table, e.g. '{\"validateURI\":{\"schemes\":[\"https\"]}}'
  --config <file>      JSON options record; other flags override it
  --charset <label>    input encoding (default: <meta charset> sniffing, then UTF-8)
  --output <file>      write to <file> instead of stdout
  --verbose            log at debug level unless PD_LOG/RUST_LOG is set
  --help               print this text
";

#[derive(Debug, PartialEq)]
pub(crate) enum Command {
    Help,
    Run(Invocation),
}

#[derive(Debug, Default, PartialEq)]
pub(crate) struct Invocation {
    pub(crate) whole_document: bool,
    pub(crate) base_url: Option<String>,
    pub(crate) rules: Option<Value>,
    pub(crate) config: Option<PathBuf>,
    pub(crate) charset: Option<&'static Encoding>,
    pub(crate) output: Option<PathBuf>,
    pub(crate) verbose: bool,
    /// `None` reads stdin.
    pub(crate) input: Option<PathBuf>,
}

/// Parses arguments without the program name. Errors are usage errors.
pub(crate) fn parse_args<I>(args: I) -> Result<Command, String>
where
    I: IntoIterator<Item = String>,
{
    let mut invocation = Invocation::default();
    let mut args = args.into_iter();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-h" | "--help" => return Ok(Command::Help),
            "--whole-document" => invocation.whole_document = true,
            "--verbose" | "-v" => invocation.verbose = true,
            "--base-url" => invocation.base_url = Some(value_for(&arg, &mut args)?),
            "--config" => invocation.config = Some(PathBuf::from(value_for(&arg, &mut args)?)),
            "--output" | "-o" => {
                invocation.output = Some(PathBuf::from(value_for(&arg, &mut args)?));
            }
            "--rules" => {
                let raw = value_for(&arg, &mut args)?;
                let rules: Value = serde_json::from_str(&raw)
                    .map_err(|error| format!("--rules is not valid JSON: {error}"))?;
                if !rules.is_object() {
                    return Err("--rules expects a JSON object".to_owned());
                }
                invocation.rules = Some(rules);
            }
            "--charset" => {
                let label = value_for(&arg, &mut args)?;
                let encoding = Encoding::for_label(label.trim().as_bytes())
                    .ok_or_else(|| format!("unknown charset `{label}`"))?;
                invocation.charset = Some(encoding);
            }
            "-" => set_input(&mut invocation, None)?,
            flag if flag.starts_with('-') => return Err(format!("unknown option `{flag}`")),
            path => set_input(&mut invocation, Some(PathBuf::from(path)))?,
        }
    }

    Ok(Command::Run(invocation))
}

fn value_for<I>(flag: &str, args: &mut I) -> Result<String, String>
where
    I: Iterator<Item = String>,
{
    args.next()
        .ok_or_else(|| format!("missing value after {flag}"))
}

fn set_input(invocation: &mut Invocation, path: Option<PathBuf>) -> Result<(), String> {
    if invocation.input.is_some() {
        return Err("more than one input file given".to_owned());
    }
    invocation.input = path;
    Ok(())
}
