use crate::api::ApiClient;
use crate::commands::{self, ExportFormat};
use crate::config::{fill, Config, Parameters, SessionStore};
use crate::credentials::{confirm, TerminalPrompt};
use crate::error::ClientError;
use crate::format::relative_time;
use crate::http::HttpClient;
use crate::logs::{self, LogOptions, LogSource};
use crate::output::Console;
use crate::session::{LoginMode, SessionManager};
use crate::{Args, Command};
use anyhow::{bail, Context as _, Result};
use chrono::Utc;
use clap::ValueEnum;
use std::path::Path;

/// Log entries shown when neither `--lines` nor the parameters file say
const DEFAULT_LOG_LINES: usize = 5;

pub struct Context {
    pub store: SessionStore,
    pub params: Parameters,
    pub console: Console,
}

impl Context {
    /// Open the config and apply the commands that change it before
    /// anything else runs (`config --overwrite`, `params`, `verbose`)
    pub fn load(args: &Args) -> Result<Self> {
        let console = Console::default();
        let path = match &args.config_file {
            Some(path) => path.clone(),
            None => Config::default_path()?,
        };

        let overwrite = matches!(args.command, Command::Config { overwrite: true });
        if overwrite || !path.is_file() {
            console.print("Creating config file");
        }
        let mut store = SessionStore::open(&path, overwrite)?;

        if let Command::Params { file, disable, .. } = &args.command {
            set_parameters_file(&mut store, &console, file.as_deref(), *disable)?;
        }
        let params = load_parameters(&mut store, &console)?;
        if matches!(args.command, Command::Verbose) {
            toggle_verbose(&mut store, &console)?;
        }

        let console = Console::new(store.config().verbose);
        Ok(Self {
            store,
            params,
            console,
        })
    }

    /// Run `f` against the server with the persisted session
    fn with_api<T>(
        &mut self,
        f: impl FnOnce(&mut ApiClient, &Console) -> Result<T, ClientError>,
    ) -> Result<T> {
        let transport = HttpClient::new()?;
        let console = self.console;
        let mut api = ApiClient::new(SessionManager::new(&mut self.store, &transport));
        Ok(f(&mut api, &console)?)
    }
}

fn set_parameters_file(
    store: &mut SessionStore,
    console: &Console,
    file: Option<&Path>,
    disable: bool,
) -> Result<()> {
    if disable {
        store.config_mut().parameters_file = None;
        store.save()?;
        console.print("Disabling parameters-file");
        return Ok(());
    }
    if let Some(file) = file {
        store.config_mut().parameters_file = Some(file.to_path_buf());
        store.save()?;
        console.print("Setting parameters-file");
    }
    Ok(())
}

/// Read the configured parameters file. A missing file is ignored and an
/// unreadable one is reported without failing the command.
fn load_parameters(store: &mut SessionStore, console: &Console) -> Result<Parameters> {
    let Some(file) = store.config().parameters_file.clone() else {
        return Ok(Parameters::default());
    };
    if !file.is_file() {
        return Ok(Parameters::default());
    }
    let params = match Parameters::load_from(&file) {
        Ok(params) => params,
        Err(err) => {
            console.print(&err.to_string());
            return Ok(Parameters::default());
        }
    };
    console.print(&format!("Loaded {} parameters from file", params.len()));

    // verbose is a persisted setting rather than a command option
    if let Some(verbose) = params.verbose {
        store.config_mut().verbose = verbose;
        store.save()?;
    }
    Ok(params)
}

fn toggle_verbose(store: &mut SessionStore, console: &Console) -> Result<()> {
    let verbose = !store.config().verbose;
    store.config_mut().verbose = verbose;
    store.save()?;
    console.print(&format!("verbose mode: {}", verbose));
    Ok(())
}

fn display_parameters(ctx: &Context) -> Result<()> {
    let Some(file) = &ctx.store.config().parameters_file else {
        return Ok(());
    };
    let loaded = std::fs::read_to_string(file)
        .ok()
        .and_then(|content| serde_yaml::from_str::<serde_yaml::Value>(&content).ok());
    match loaded {
        Some(params) => ctx.console.print(serde_yaml::to_string(&params)?.trim_end()),
        None => ctx.console.print("Could not load parameters file"),
    }
    Ok(())
}

fn display_status(ctx: &Context) -> Result<()> {
    let console = &ctx.console;
    console.print(&format!(
        "Application version: {}",
        env!("CARGO_PKG_VERSION")
    ));
    console.print(&format!("Config file: {}", ctx.store.path().display()));
    if let Some(file) = &ctx.store.config().parameters_file {
        console.print(&format!("Params file: {}", file.display()));
    }

    let session = ctx.store.session();
    if !session.is_present() {
        return Err(ClientError::Unauthenticated("Not logged in".to_string()).into());
    }
    let now = Utc::now();
    if let Some(last_login) = session.last_login {
        console.print(&format!("Logged in  : {}", relative_time(last_login, now)));
    }
    if let Some(expires) = session.token_expires {
        console.print(&format!("Expiration : {}", relative_time(expires, now)));
    }
    Ok(())
}

fn login(ctx: &mut Context, mut url: Option<String>, mut password: Option<String>) -> Result<()> {
    fill(&mut url, &ctx.params.url);
    fill(&mut password, &ctx.params.password);

    let transport = HttpClient::new()?;
    let console = ctx.console;
    let mut session = SessionManager::new(&mut ctx.store, &transport);
    if session.login(url.as_deref(), password, &TerminalPrompt)? == LoginMode::Password {
        console.result("Connected", Some(200));
    }
    console.print("Login successful");
    Ok(())
}

fn logout(ctx: &mut Context) -> Result<()> {
    ctx.console.print("Logging out...");
    let transport = HttpClient::new()?;
    SessionManager::new(&mut ctx.store, &transport).logout()?;
    Ok(())
}

fn export_format(cli: Option<ExportFormat>, params: &Parameters) -> Result<ExportFormat> {
    if let Some(format) = cli {
        return Ok(format);
    }
    match &params.output {
        Some(name) => match ExportFormat::from_str(name, true) {
            Ok(format) => Ok(format),
            Err(_) => bail!("Unknown output format in parameters file: {}", name),
        },
        None => Ok(ExportFormat::default()),
    }
}

pub fn dispatch(ctx: &mut Context, command: Command) -> Result<()> {
    match command {
        Command::Login { url, password } => login(ctx, url, password),
        Command::Logout => logout(ctx),
        Command::Status => display_status(ctx),
        Command::Config { .. } => {
            ctx.console.print(ctx.store.config().to_yaml()?.trim_end());
            Ok(())
        }
        // Applied while loading the context
        Command::Verbose => Ok(()),
        Command::Params { file, show, .. } => {
            if show || file.is_none() {
                display_parameters(ctx)?;
            }
            Ok(())
        }
        Command::List { resource } => {
            ctx.with_api(|api, console| commands::list(api, console, resource))
        }
        Command::Get { kind, ids } => {
            ctx.with_api(|api, console| commands::get(api, console, kind, &ids))
        }
        Command::Describe { kind, id } => {
            ctx.with_api(|api, console| commands::describe(api, console, kind, &id.to_string()))
        }
        Command::Run { id } => ctx.with_api(|api, console| commands::run(api, console, id)),
        Command::Abort { id } => ctx.with_api(|api, console| commands::abort(api, console, id)),
        Command::Delete {
            id,
            delete_db,
            confirm: confirmed,
            ..
        } => ctx.with_api(|api, console| {
            commands::delete(api, console, id, delete_db, confirmed, confirm)
        }),
        Command::Export {
            id,
            output,
            mut output_path,
            ..
        } => {
            let format = export_format(output, &ctx.params)?;
            fill(&mut output_path, &ctx.params.output_path);
            ctx.with_api(|api, console| {
                commands::export(api, console, id, format, output_path.as_deref(), confirm)
            })?;
            Ok(())
        }
        Command::Import {
            file,
            id,
            import_metadata,
            strip_metadata,
            ..
        } => {
            // Updates keep the server's metadata unless told to strip it
            let import_metadata = import_metadata || (id.is_some() && !strip_metadata);
            ctx.with_api(|api, console| {
                commands::import(api, console, &file, id.as_deref(), import_metadata)
            })
            .with_context(|| format!("Could not import {}", file.display()))
        }
        Command::Logs {
            kind,
            id,
            remote,
            follow,
            mut lines,
            all,
        } => {
            fill(&mut lines, &ctx.params.lines);
            let options = LogOptions {
                source: LogSource::resolve(kind, id, remote)?,
                lines: lines.unwrap_or(DEFAULT_LOG_LINES),
                show_all: all,
            };
            ctx.with_api(|api, console| {
                if follow {
                    logs::follow(api, &options)
                } else {
                    logs::show(api, console, &options)
                }
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use tempfile::TempDir;

    fn args(dir: &TempDir, rest: &[&str]) -> Args {
        let config = dir.path().join("config.yml");
        let mut argv = vec!["duplicati", "--config-file", config.to_str().unwrap()];
        argv.extend_from_slice(rest);
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_load_creates_config() {
        let dir = TempDir::new().unwrap();
        let ctx = Context::load(&args(&dir, &["status"])).unwrap();
        assert!(dir.path().join("config.yml").is_file());
        assert!(!ctx.console.verbose());
        assert_eq!(ctx.params, Parameters::default());
    }

    #[test]
    fn test_verbose_toggles_and_persists() {
        let dir = TempDir::new().unwrap();
        let ctx = Context::load(&args(&dir, &["verbose"])).unwrap();
        assert!(ctx.console.verbose());
        let ctx = Context::load(&args(&dir, &["verbose"])).unwrap();
        assert!(!ctx.console.verbose());
    }

    #[test]
    fn test_parameters_file_fills_options() {
        let dir = TempDir::new().unwrap();
        let params = dir.path().join("params.yml");
        std::fs::write(&params, "lines: 12\noutput: JSON\nverbose: true\n").unwrap();

        Context::load(&args(&dir, &["params", params.to_str().unwrap()])).unwrap();
        let ctx = Context::load(&args(&dir, &["status"])).unwrap();
        assert_eq!(ctx.params.lines, Some(12));
        assert!(ctx.console.verbose());
        assert_eq!(export_format(None, &ctx.params).unwrap(), ExportFormat::Json);
        assert_eq!(
            export_format(Some(ExportFormat::Yaml), &ctx.params).unwrap(),
            ExportFormat::Yaml
        );

        let ctx = Context::load(&args(&dir, &["params", "--disable"])).unwrap();
        assert_eq!(ctx.store.config().parameters_file, None);
        assert_eq!(ctx.params, Parameters::default());
    }

    #[test]
    fn test_status_requires_login() {
        let dir = TempDir::new().unwrap();
        let ctx = Context::load(&args(&dir, &["status"])).unwrap();
        let err = display_status(&ctx).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ClientError>(),
            Some(ClientError::Unauthenticated(_))
        ));
    }

    #[test]
    fn test_overwrite_resets_session() {
        let dir = TempDir::new().unwrap();
        let mut ctx = Context::load(&args(&dir, &["status"])).unwrap();
        ctx.store.session_mut().token = Some("tok".to_string());
        ctx.store.save().unwrap();

        let ctx = Context::load(&args(&dir, &["config", "--overwrite"])).unwrap();
        assert_eq!(ctx.store.session().token, None);
    }

    #[test]
    fn test_logout_clears_token() {
        let dir = TempDir::new().unwrap();
        let mut ctx = Context::load(&args(&dir, &["logout"])).unwrap();
        ctx.store.session_mut().token = Some("tok".to_string());
        ctx.store.save().unwrap();

        dispatch(&mut ctx, Command::Logout).unwrap();
        let ctx = Context::load(&args(&dir, &["status"])).unwrap();
        assert_eq!(ctx.store.session().token, None);
    }
}
