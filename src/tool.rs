//! Command registry and dispatcher for the generic CLI.
//!
//! A tool registers named commands and option flags once at startup, then
//! calls [`CliTool::run`], which parses the command line, connects to the
//! server and invokes the selected command. Flag parsing, `-h`/`--help`
//! output and usage errors (exit code 2) are delegated to clap; address and
//! connection failures surface as errors the binary reports with exit code 1.

use std::collections::BTreeMap;

use clap::{Arg, ArgMatches, Command, ErrorKind};

use crate::addr::parse_address;
use crate::client::{Client, McClient};
use crate::{McError, Result};

const BASE_USAGE: &str = "host[:dataport] command [options]\n\ndataport [default:11210]";

/// Client method a command can be bound to directly, resolved by `match`
/// instead of a runtime name lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientMethod {
    /// `Client::get`, args: `<key>`.
    Get,
    /// `Client::set`, args: `<key> <value>`.
    Set,
    /// `Client::add`, args: `<key> <value>`.
    Add,
    /// `Client::replace`, args: `<key> <value>`.
    Replace,
    /// `Client::delete`, args: `<key>`.
    Delete,
}

impl ClientMethod {
    /// Invoke the bound method with the remaining positional arguments and
    /// print the result.
    pub fn invoke(&self, client: &mut dyn Client, args: &[String]) -> Result<()> {
        match self {
            ClientMethod::Get => {
                let key = one_arg(args, "get <key>")?;
                match client.get(key)? {
                    Some(value) => println!("{}", String::from_utf8_lossy(&value)),
                    None => println!("Key not found"),
                }
            }
            ClientMethod::Set => {
                let (key, value) = two_args(args, "set <key> <value>")?;
                println!("{}", client.set(key, value.as_bytes())?);
            }
            ClientMethod::Add => {
                let (key, value) = two_args(args, "add <key> <value>")?;
                println!("{}", client.add(key, value.as_bytes())?);
            }
            ClientMethod::Replace => {
                let (key, value) = two_args(args, "replace <key> <value>")?;
                println!("{}", client.replace(key, value.as_bytes())?);
            }
            ClientMethod::Delete => {
                let key = one_arg(args, "delete <key>")?;
                println!("{}", client.delete(key)?);
            }
        }
        Ok(())
    }
}

fn one_arg<'a>(args: &'a [String], usage: &str) -> Result<&'a str> {
    match args {
        [key] => Ok(key.as_str()),
        _ => Err(McError::Argument(format!("Usage: {}", usage))),
    }
}

fn two_args<'a>(args: &'a [String], usage: &str) -> Result<(&'a str, &'a str)> {
    match args {
        [key, value] => Ok((key.as_str(), value.as_str())),
        _ => Err(McError::Argument(format!("Usage: {}", usage))),
    }
}

/// Function commands receive the open connection, the positional arguments
/// after the command name, and the parsed option flags.
pub type Invocable = fn(&mut dyn Client, &[String], &ToolOptions) -> Result<()>;

/// Session-setup step run on the fresh connection before any handler,
/// typically authentication and bucket selection driven by option flags.
pub type SessionSetup = fn(&mut dyn Client, &ToolOptions) -> Result<()>;

/// How a registered command is executed.
pub enum Handler {
    /// A function called with (connection, remaining args, options).
    Invocable(Invocable),
    /// A client method called with the remaining args only.
    Method(ClientMethod),
}

struct CommandEntry {
    handler: Handler,
    help: String,
}

/// Whether a flag carries a value or is a plain switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FlagKind {
    Bool,
    Valued,
}

struct FlagSpec {
    flag: String,
    key: String,
    help: String,
    kind: FlagKind,
    hidden: bool,
}

/// Option flags parsed from the command line, keyed by destination key.
#[derive(Debug, Default)]
pub struct ToolOptions {
    switches: BTreeMap<String, bool>,
    values: BTreeMap<String, String>,
}

impl ToolOptions {
    /// Whether the boolean flag stored under `key` was given.
    pub fn flag(&self, key: &str) -> bool {
        self.switches.get(key).copied().unwrap_or(false)
    }

    /// Value of the option stored under `key`, if given.
    pub fn value(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    fn from_matches(specs: &[FlagSpec], matches: &ArgMatches) -> ToolOptions {
        let mut opts = ToolOptions::default();
        for spec in specs {
            match spec.kind {
                FlagKind::Bool => {
                    opts.switches
                        .insert(spec.key.clone(), matches.is_present(spec.key.as_str()));
                }
                FlagKind::Valued => {
                    if let Some(value) = matches.value_of(spec.key.as_str()) {
                        opts.values.insert(spec.key.clone(), value.to_string());
                    }
                }
            }
        }
        opts
    }
}

/// Command registry and dispatcher. Built once at startup, then immutable
/// for the single `run` call of the process.
pub struct CliTool {
    name: String,
    cmds: BTreeMap<String, CommandEntry>,
    flags: Vec<FlagSpec>,
    setup: Option<SessionSetup>,
    extra_usage: String,
}

impl CliTool {
    /// Create a tool named `name` (shown in usage output). `extra_usage` is
    /// appended after the command list in `--help`.
    pub fn new(name: &str, extra_usage: &str) -> CliTool {
        CliTool {
            name: name.to_string(),
            cmds: BTreeMap::new(),
            flags: Vec::new(),
            setup: None,
            extra_usage: extra_usage.trim().to_string(),
        }
    }

    /// Register a session-setup step applied before every command.
    pub fn register_setup(&mut self, setup: SessionSetup) {
        self.setup = Some(setup);
    }

    /// Register `name` with the given handler. Registering the same name
    /// twice keeps only the later registration. `help` defaults to the
    /// command name.
    pub fn register_command(&mut self, name: &str, handler: Handler, help: Option<&str>) {
        self.cmds.insert(
            name.to_string(),
            CommandEntry {
                handler,
                help: help.unwrap_or(name).to_string(),
            },
        );
    }

    /// Register a boolean flag such as `-v` or `--verbose`, stored under
    /// `key` in the parsed options.
    pub fn register_flag(&mut self, flag: &str, key: &str, help: &str) {
        self.push_flag(flag, key, help, FlagKind::Bool, false);
    }

    /// Register a boolean flag omitted from the generated help text.
    pub fn register_hidden_flag(&mut self, flag: &str, key: &str) {
        self.push_flag(flag, key, "", FlagKind::Bool, true);
    }

    /// Register a value-carrying option such as `-u <user>`.
    pub fn register_option(&mut self, flag: &str, key: &str, help: &str) {
        self.push_flag(flag, key, help, FlagKind::Valued, false);
    }

    fn push_flag(&mut self, flag: &str, key: &str, help: &str, kind: FlagKind, hidden: bool) {
        self.flags.push(FlagSpec {
            flag: flag.to_string(),
            key: key.to_string(),
            help: help.to_string(),
            kind,
            hidden,
        });
    }

    /// Help strings of the registered commands, sorted, as shown in usage.
    pub fn command_list(&self) -> String {
        let mut helps: Vec<&str> = self.cmds.values().map(|e| e.help.as_str()).collect();
        helps.sort_unstable();

        let mut output = String::from("Commands:\n");
        for help in helps {
            output.push_str("    ");
            output.push_str(help);
            output.push('\n');
        }
        output.push_str(&self.extra_usage);
        output
    }

    /// Parse `argv`, connect and invoke the selected command.
    ///
    /// Usage errors (too few arguments, unknown command, bad flags) exit the
    /// process with code 2 via clap; `-h` exits 0. Address and connection
    /// failures, and command errors, are returned for the binary to report.
    pub fn run<I>(&self, argv: I) -> Result<()>
    where
        I: IntoIterator<Item = String>,
    {
        let command_list = self.command_list();
        let mut parser = self.build_parser(&command_list);

        let matches = match parser.clone().try_get_matches_from(argv) {
            Ok(matches) => matches,
            Err(e) => e.exit(),
        };

        let (address, command) = match (matches.value_of("address"), matches.value_of("command")) {
            (Some(address), Some(command)) => (address, command),
            _ => parser.error(ErrorKind::TooFewValues, "Too few arguments").exit(),
        };
        let rest: Vec<String> = matches
            .values_of("args")
            .map(|values| values.map(String::from).collect())
            .unwrap_or_default();

        let target = parse_address(address)?;
        let mut client = McClient::connect(&target)?;

        let entry = match self.cmds.get(command) {
            Some(entry) => entry,
            None => parser.error(ErrorKind::InvalidValue, "Unknown command").exit(),
        };

        let opts = ToolOptions::from_matches(&self.flags, &matches);
        let result = (|| {
            if let Some(setup) = self.setup {
                setup(&mut client, &opts)?;
            }
            match &entry.handler {
                Handler::Invocable(f) => f(&mut client, &rest, &opts),
                Handler::Method(method) => method.invoke(&mut client, &rest),
            }
        })();

        result.map_err(|e| e.remap_connection_drop(&target.host, target.port))
    }

    fn build_parser<'help>(&'help self, command_list: &'help str) -> Command<'help> {
        let mut parser = Command::new(self.name.clone())
            .override_usage(BASE_USAGE)
            .after_help(command_list)
            .disable_version_flag(true)
            .arg(Arg::new("address").takes_value(true))
            .arg(Arg::new("command").takes_value(true))
            .arg(Arg::new("args").takes_value(true).multiple_values(true));

        for spec in &self.flags {
            let mut arg = Arg::new(spec.key.as_str());
            if let Some(long) = spec.flag.strip_prefix("--") {
                arg = arg.long(long);
            } else if let Some(short) = spec.flag.strip_prefix('-').and_then(|s| s.chars().next()) {
                arg = arg.short(short);
            }
            if spec.kind == FlagKind::Valued {
                arg = arg.takes_value(true);
            }
            if spec.hidden {
                arg = arg.hide(true);
            } else {
                arg = arg.help(spec.help.as_str());
            }
            parser = parser.arg(arg);
        }
        parser
    }
}
