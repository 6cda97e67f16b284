//! toolshell command implementations

use anyhow::{Context, Result};
use std::io::Write;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use toolshell_config::{self, CommandStyleConfig, Config, ProfileConfig};
use toolshell_endpoint::HttpToolEndpoint;
use toolshell_engine::parser::coerce;
use toolshell_engine::{
    ChatCompletion, CommandStyle, DriverSettings, Executor, SequenceDriver, Termination,
    ThoughtTool, ToolEndpoint, TranslationContext, Translator,
};
use toolshell_provider::CompatProvider;

use crate::render;

/// Per-session flags shared by `repl` and `run`
#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    pub profile: Option<String>,
    pub url: Option<String>,
    pub no_translator: bool,
    pub context: Vec<String>,
}

/// A resolved profile wired to its endpoint and driver
struct Session {
    profile_name: String,
    profile: ProfileConfig,
    endpoint: Arc<HttpToolEndpoint>,
    driver: SequenceDriver,
}

/// Load config from `path` or the default location, then apply the environment
async fn load_config(path: Option<&str>) -> Result<Config> {
    let mut config = match path {
        Some(path) => {
            let path = toolshell_config::expand_home(path);
            Config::load_from(&path)
                .await
                .with_context(|| format!("Cannot read config {}", path.display()))?
        }
        None => Config::load().await.context("Cannot read config")?,
    };
    config.apply_env(|name| std::env::var(name).ok());
    Ok(config)
}

fn resolve_profile(config: &Config, name: Option<String>) -> Result<(String, ProfileConfig)> {
    let name = name.unwrap_or_else(|| config.default_profile.clone());
    let profile = config.profile(&name)?;
    Ok((name, profile))
}

fn command_style(style: &CommandStyleConfig) -> CommandStyle {
    match style {
        CommandStyleConfig::KeyValue => CommandStyle::KeyValue,
        CommandStyleConfig::Argv {
            tool,
            argument,
            strip_prefix,
        } => CommandStyle::Argv {
            tool: tool.clone(),
            argument: argument.clone(),
            strip_prefix: strip_prefix.clone(),
        },
    }
}

fn driver_settings(config: &Config, profile: &ProfileConfig) -> DriverSettings {
    DriverSettings {
        max_iterations: config.driver.max_iterations,
        step_pause: config.step_pause(),
        thought_tool: profile.thought_tool.as_ref().map(|t| ThoughtTool {
            name: t.name.clone(),
            continue_key: t.continue_key.clone(),
            number_key: t.number_key.clone(),
            total_key: t.total_key.clone(),
        }),
        style: command_style(&profile.command_style),
    }
}

fn build_translator(config: &Config, profile: &ProfileConfig, disabled: bool) -> Translator {
    if disabled {
        info!("◆ translator disabled, using pass-through");
        return Translator::passthrough();
    }
    let Some(api_key) = config.api_key() else {
        info!("◆ no translator key, using pass-through");
        return Translator::passthrough();
    };

    let provider = CompatProvider::new(
        api_key,
        config.translator.api_base.clone(),
        config.translator.model.clone(),
    );
    debug!("◆ translator vendor {:?} at {}", provider.vendor(), provider.api_base());

    let mut completion = ChatCompletion::new(provider)
        .with_temperature(config.translator.temperature)
        .with_max_tokens(config.translator.max_tokens);
    if config.translator.keep_history {
        completion = completion.with_history(config.translator.max_history_messages);
    }

    Translator::new(Arc::new(completion), profile.full_instruction())
        .with_timeout(config.translator_timeout())
}

fn open_session(config: &Config, options: &SessionOptions) -> Result<Session> {
    let (profile_name, profile) = resolve_profile(config, options.profile.clone())?;
    let url = options
        .url
        .clone()
        .unwrap_or_else(|| config.endpoint_url_for(&profile));

    // Client-side backstop; the executor enforces the real bound
    let endpoint = Arc::new(HttpToolEndpoint::new(
        url,
        config.endpoint_timeout() + std::time::Duration::from_secs(5),
    ));
    let executor = Executor::new(endpoint.clone()).with_timeout(config.endpoint_timeout());
    let translator = build_translator(config, &profile, options.no_translator);
    let driver = SequenceDriver::new(translator, executor, driver_settings(config, &profile));

    Ok(Session {
        profile_name,
        profile,
        endpoint,
        driver,
    })
}

/// Parse `key=value` context entries
fn parse_context(entries: &[String]) -> Result<TranslationContext> {
    let mut context = TranslationContext::new();
    for entry in entries {
        let (key, value) = entry
            .split_once('=')
            .filter(|(key, _)| !key.is_empty())
            .with_context(|| format!("Context entry '{}' is not key=value", entry))?;
        context.insert(key.to_string(), coerce(value));
    }
    Ok(context)
}

/// Read line from stdin; `None` at end of input
fn read_line() -> Result<Option<String>> {
    let mut input = String::new();
    let read = std::io::stdin().read_line(&mut input)?;
    if read == 0 {
        return Ok(None);
    }
    Ok(Some(input.trim().to_string()))
}

/// Read password from stdin (masked input)
fn read_password() -> String {
    rpassword::read_password()
        .ok()
        .or_else(|| read_line().ok().flatten())
        .unwrap_or_default()
}

/// Initialize config
pub async fn init_command(config_path: Option<String>) -> Result<()> {
    println!("◆ Initializing toolshell...");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let path = match config_path {
        Some(path) => {
            let path = toolshell_config::expand_home(&path);
            if path.exists() {
                println!("Config already exists at {}", path.display());
            } else {
                Config::default().save_to(&path).await?;
            }
            path
        }
        None => {
            toolshell_config::init().await?;
            toolshell_config::config_path()
        }
    };

    println!("\n◆ Config at {}", path.display());
    println!("\nNext steps:");
    println!("  1. Add a translator API key (translator.api_key) or set TOOLSHELL_API_KEY");
    println!("  2. Point endpoint.url at your tool server");
    println!("  3. Start a session: toolshell repl -p generic");
    Ok(())
}

/// Interactive session
pub async fn repl_command(config_path: Option<String>, options: SessionOptions) -> Result<()> {
    let mut config = load_config(config_path.as_deref()).await?;
    let mut context = parse_context(&options.context)?;

    if !options.no_translator && !config.has_api_key() {
        print!("No translator key configured. Enter an API key (Enter to skip): ");
        std::io::stdout().flush()?;
        let key = read_password();
        if key.is_empty() {
            println!("Continuing without translator: input is used as literal commands.");
        } else {
            config.translator.api_key = key;
        }
    }

    let session = open_session(&config, &options)?;

    println!(
        "◆ toolshell [{}] → {}",
        session.profile_name,
        session.endpoint.base_url()
    );
    println!(
        "Translator: {}",
        if session.driver.translator().is_configured() {
            "on"
        } else {
            "off (pass-through)"
        }
    );
    println!("Type 'exit' to quit, ':help' for session commands");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    match session.endpoint.list_tools().await {
        Ok(tools) if !tools.is_empty() => {
            let names: Vec<&str> = tools.iter().map(|t| t.name.as_str()).collect();
            println!("◆ {} tools: {}", tools.len(), names.join(", "));
        }
        Ok(_) => {}
        Err(e) => warn!("◆ Could not list tools: {}", e),
    }

    loop {
        print!("{}> ", session.profile.prompt);
        std::io::stdout().flush()?;

        let Some(input) = read_line()? else {
            println!();
            break;
        };
        if input.is_empty() {
            continue;
        }
        if input == "exit" || input == "quit" {
            break;
        }
        if let Some(rest) = input.strip_prefix(':') {
            session_command(rest, &mut context);
            continue;
        }

        let cancel = CancellationToken::new();
        let watcher = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    cancel.cancel();
                }
            })
        };

        let report = session
            .driver
            .submit_with_cancel(&input, Some(&context), &cancel)
            .await;
        watcher.abort();

        print!("{}", render::report(&report));
        println!();
    }

    Ok(())
}

/// `:set key=value`, `:unset key`, `:context`, `:help`
fn session_command(line: &str, context: &mut TranslationContext) {
    let (name, arg) = line.split_once(' ').unwrap_or((line, ""));
    match name {
        "set" => match parse_context(&[arg.trim().to_string()]) {
            Ok(entries) => context.extend(entries),
            Err(e) => println!("✗ {}", e),
        },
        "unset" => {
            context.remove(arg.trim());
        }
        "context" => {
            if context.is_empty() {
                println!("(no context)");
            }
            for (key, value) in context.iter() {
                println!("  {} = {}", key, value);
            }
        }
        _ => {
            println!("Session commands:");
            println!("  :set key=value   add translator context");
            println!("  :unset key       remove a context entry");
            println!("  :context         show context");
        }
    }
}

/// Submit one request; `Ok(false)` when it did not succeed
pub async fn run_command(
    config_path: Option<String>,
    options: SessionOptions,
    text: String,
) -> Result<bool> {
    let config = load_config(config_path.as_deref()).await?;
    let context = parse_context(&options.context)?;
    let session = open_session(&config, &options)?;

    let report = session.driver.submit(&text, Some(&context)).await;
    print!("{}", render::report(&report));

    let answered = matches!(report.termination, Termination::NeedsInfo(_));
    Ok(report.is_success() || answered)
}

/// Parse a command string with a profile's style and print it
pub async fn parse_command(
    config_path: Option<String>,
    profile: Option<String>,
    command: String,
) -> Result<()> {
    let config = load_config(config_path.as_deref()).await?;
    let (_, profile) = resolve_profile(&config, profile)?;

    let parsed = command_style(&profile.command_style)
        .parse(&command)
        .with_context(|| format!("Cannot parse '{}'", command))?;

    let json = serde_json::json!({
        "tool": parsed.command.tool_name,
        "arguments": parsed.command.arguments_json(),
        "skipped": parsed.skipped,
    });
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}

/// List endpoint tools
pub async fn tools_command(
    config_path: Option<String>,
    profile: Option<String>,
    url: Option<String>,
) -> Result<()> {
    let config = load_config(config_path.as_deref()).await?;
    let (_, profile) = resolve_profile(&config, profile)?;
    let url = url.unwrap_or_else(|| config.endpoint_url_for(&profile));

    let endpoint = HttpToolEndpoint::new(url, config.endpoint_timeout());
    let tools = endpoint
        .list_tools()
        .await
        .with_context(|| format!("Cannot list tools at {}", endpoint.base_url()))?;

    if tools.is_empty() {
        println!("No tools advertised at {}", endpoint.base_url());
        return Ok(());
    }

    println!("◆ Tools at {}", endpoint.base_url());
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    for tool in tools {
        if tool.description.is_empty() {
            println!("  {}", tool.name);
        } else {
            println!("  {} - {}", tool.name, tool.description);
        }
    }
    Ok(())
}

/// List profiles
pub async fn profiles_command(config_path: Option<String>) -> Result<()> {
    let config = load_config(config_path.as_deref()).await?;

    println!("◆ Profiles");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    for name in config.profile_names() {
        let profile = config.profile(&name)?;
        let marker = if name == config.default_profile { "*" } else { " " };
        let style = match &profile.command_style {
            CommandStyleConfig::KeyValue => "key=value".to_string(),
            CommandStyleConfig::Argv { tool, .. } => format!("argv -> {}", tool),
        };
        let thought = profile
            .thought_tool
            .as_ref()
            .map(|t| t.name.as_str())
            .unwrap_or("-");
        println!(
            "{} {:<22} style: {:<28} thought tool: {}",
            marker, name, style, thought
        );
    }
    Ok(())
}

/// Show configuration status
pub async fn status_command(config_path: Option<String>) -> Result<()> {
    let path = config_path
        .as_deref()
        .map(toolshell_config::expand_home)
        .unwrap_or_else(toolshell_config::config_path);
    let config = load_config(config_path.as_deref()).await?;

    println!("◆ toolshell Status");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!(
        "Config: {} {}",
        path.display(),
        if path.exists() { "✓" } else { "(not created)" }
    );
    println!("Default profile: {}", config.default_profile);
    println!("Endpoint: {}", config.endpoint.url);
    println!(
        "Translator key: {}",
        if config.has_api_key() {
            "[Set]"
        } else {
            "[Not set]"
        }
    );
    println!(
        "Model: {}",
        config
            .translator
            .model
            .as_deref()
            .unwrap_or("(provider default)")
    );
    println!(
        "Timeouts: translator {}s, tool calls {}s",
        config.translator.timeout_secs, config.endpoint.timeout_secs
    );
    println!(
        "Sequence bound: {} steps, pause {}ms",
        config.driver.max_iterations, config.driver.step_pause_ms
    );
    Ok(())
}
