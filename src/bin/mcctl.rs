use std::{env, process::exit};

use log::{error, info, LevelFilter};

use mctools::client::{Client, DurabilityRequirement};
use mctools::exercise::parse_durability;
use mctools::tool::{CliTool, ClientMethod, Handler, ToolOptions};
use mctools::{McError, Result};

const EXTRA_USAGE: &str = "
Durable commands accept -l <level> (0-3) and -t <timeout-ms>.
";

fn main() {
    env_logger::builder().filter_level(LevelFilter::Info).init();

    let tool = build_tool();
    if let Err(e) = tool.run(env::args()) {
        error!("{}", e);
        exit(1);
    }
}

fn build_tool() -> CliTool {
    let mut tool = CliTool::new("mcctl", EXTRA_USAGE);

    tool.register_command("get", Handler::Method(ClientMethod::Get), Some("get <key>"));
    tool.register_command(
        "set",
        Handler::Method(ClientMethod::Set),
        Some("set <key> <value>"),
    );
    tool.register_command(
        "add",
        Handler::Method(ClientMethod::Add),
        Some("add <key> <value>"),
    );
    tool.register_command(
        "replace",
        Handler::Method(ClientMethod::Replace),
        Some("replace <key> <value>"),
    );
    tool.register_command(
        "delete",
        Handler::Method(ClientMethod::Delete),
        Some("delete <key>"),
    );
    tool.register_command(
        "set-durable",
        Handler::Invocable(cmd_set_durable),
        Some("set-durable <key> <value>"),
    );
    tool.register_command(
        "delete-durable",
        Handler::Invocable(cmd_delete_durable),
        Some("delete-durable <key>"),
    );

    tool.register_setup(setup_session);
    tool.register_option("-u", "username", "Username for authentication");
    tool.register_option("-P", "password", "Password for authentication");
    tool.register_option("-b", "bucket", "Bucket to select after authentication");
    tool.register_option("-l", "level", "Durability level (0-3)");
    tool.register_option("-t", "timeout", "Durability timeout in milliseconds");
    tool.register_hidden_flag("-v", "verbose");

    tool
}

/// Authenticate and select a bucket when the corresponding options were
/// given. Runs on the fresh connection before every command.
fn setup_session(client: &mut dyn Client, opts: &ToolOptions) -> Result<()> {
    if let (Some(user), Some(password)) = (opts.value("username"), opts.value("password")) {
        client.sasl_auth_plain(user, password)?;
        if opts.flag("verbose") {
            info!("Authenticated as {}", user);
        }
    }
    if let Some(bucket) = opts.value("bucket") {
        client.select_bucket(bucket)?;
        if opts.flag("verbose") {
            info!("Selected bucket {}", bucket);
        }
    }
    Ok(())
}

fn durability_from_opts(opts: &ToolOptions) -> Result<DurabilityRequirement> {
    let level = parse_durability(opts.value("level"))?;
    let timeout = match opts.value("timeout") {
        Some(raw) => Some(
            raw.parse()
                .map_err(|_| McError::Argument(format!("invalid timeout '{}'", raw)))?,
        ),
        None => None,
    };
    Ok(DurabilityRequirement { level, timeout })
}

fn cmd_set_durable(client: &mut dyn Client, args: &[String], opts: &ToolOptions) -> Result<()> {
    let (key, value) = match args {
        [key, value] => (key, value),
        _ => {
            return Err(McError::Argument(
                "Usage: set-durable <key> <value>".to_string(),
            ))
        }
    };
    let durability = durability_from_opts(opts)?;
    println!("{}", client.set_durable(key, value.as_bytes(), durability)?);
    Ok(())
}

fn cmd_delete_durable(client: &mut dyn Client, args: &[String], opts: &ToolOptions) -> Result<()> {
    let key = match args {
        [key] => key,
        _ => {
            return Err(McError::Argument(
                "Usage: delete-durable <key>".to_string(),
            ))
        }
    };
    let durability = durability_from_opts(opts)?;
    println!("{}", client.delete_durable(key, durability)?);
    Ok(())
}
