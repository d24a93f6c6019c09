use std::path::Path;
use std::sync::Arc;

use crossterm::style::{style, Color, Stylize};
use tokio::runtime::Handle;
use tracing_subscriber::EnvFilter;

use ts::cli::{self, CliArgs, ConfigFile};
use ts::compile::{compile_unit, CompileOptions};
use ts::config::{self, Config, ConfigError};
use ts::debugger::Debugger;
use ts::def::{DefErrorList, Module};
use ts::ffi::ExecIf;
use ts::interp::{AbortSignal, InterpretError, Interpreter};
use ts::stdlib::{self, HostBridge, HostMessage, StdlibOptions};

/// Exit status when the program halted on an exception.
const EXIT_EXCEPTION: i32 = 2;

#[tokio::main]
async fn main() {
    let args = match cli::parse_args() {
        Ok(a) => a,
        Err(e) => {
            eprintln!("tsi: {e}");
            eprintln!("{}", cli::USAGE);
            std::process::exit(1);
        }
    };
    if args.help {
        println!("{}\n{}", cli::USAGE, cli::HELP);
        return;
    }

    init_logging(args.log_debug);
    let style = Style::detect();
    let config = load_config(&args, style);
    let Some(invocation) = args.invocation else {
        eprintln!("{}", cli::USAGE);
        std::process::exit(1);
    };

    let code = run(invocation, config, style).await;
    std::process::exit(code);
}

fn init_logging(debug: bool) {
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_env("TS_LOG").unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

// ── Configuration ─────────────────────────────────────────────────────────────

fn load_config(args: &CliArgs, style: Style) -> Config {
    let mut config = Config::new();

    let file = match &args.config {
        ConfigFile::Skip => None,
        ConfigFile::Explicit(path) => Some((path.clone(), true)),
        ConfigFile::Search => config::user_config_path().map(|path| (path, false)),
    };
    if let Some((path, explicit)) = file {
        match Config::load_file(&path) {
            Ok((layer, errors)) => {
                report_config_errors(style, &path, &errors);
                config = config.overlay(layer);
            }
            Err(e) if explicit || e.kind() != std::io::ErrorKind::NotFound => {
                style.warning(&format!("tsi: cannot read {}: {e}", path.display()));
            }
            Err(_) => {}
        }
    }

    let (env, errors) = Config::from_env();
    report_config_errors(style, Path::new("environment"), &errors);
    config.overlay(env).overlay(args.config_layer())
}

fn report_config_errors(style: Style, source: &Path, errors: &[ConfigError]) {
    for e in errors {
        style.warning(&format!("tsi: {}: {e}", source.display()));
    }
}

// ── Running ───────────────────────────────────────────────────────────────────

async fn run(invocation: String, config: Config, style: Style) -> i32 {
    let handle = Handle::current();
    let (bridge, bridge_task) = HostBridge::spawn(&handle, |message: HostMessage| match message {
        HostMessage::Output(text) => println!("{text}"),
        HostMessage::Alert(severity, text) => eprintln!("{severity}: {text}"),
        HostMessage::ExceptionText(text) => eprintln!("exception: {text}"),
    });

    let abort = AbortSignal::new();
    {
        let abort = abort.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::debug!("interrupted");
                abort.signal();
            }
        });
    }

    let job = tokio::task::spawn_blocking(move || execute(&invocation, &config, bridge, handle, abort, style));
    let code = job.await.unwrap_or_else(|e| {
        style.error(&format!("tsi: {e}"));
        1
    });
    // Every bridge handle is gone once the job ends.
    if let Err(e) = bridge_task.await {
        tracing::warn!("host bridge: {e}");
    }
    code
}

/// Compile and run on a blocking thread; returns the exit status.
fn execute(
    invocation: &str,
    config: &Config,
    bridge: HostBridge,
    handle: Handle,
    abort: AbortSignal,
    style: Style,
) -> i32 {
    let mut module = Module::new();
    for (name, value) in &config.variables {
        module.set_ffi_variable(name, value);
    }
    let options = StdlibOptions { bridge: Some(bridge.clone()), runtime: Some(handle) };
    if let Err(e) = stdlib::register(&mut module, options) {
        style.error(&format!("tsi: {e}"));
        return 1;
    }

    let paths = config.search_paths();
    let mut errors = DefErrorList::new();
    let mut notify = |name: &str| tracing::debug!(unit = name, "searching for unit");
    let compiled = compile_unit(
        invocation,
        CompileOptions::default(),
        &paths,
        config.extension(),
        &mut notify,
        &mut errors,
        &mut module,
    );
    for diagnostic in errors.iter() {
        if diagnostic.warning {
            style.warning(&diagnostic.to_string());
        } else {
            style.error(&diagnostic.to_string());
        }
    }
    let compiled = match compiled {
        Ok(compiled) => compiled,
        Err(e) => {
            style.error(&format!("tsi: {e}"));
            return 1;
        }
    };
    if config.compile_only {
        return 0;
    }
    if compiled.warnings > 0 && !config.ignore_warnings {
        style.error("tsi: compilation produced warnings; use -y to run anyway");
        return 1;
    }

    let execif: Arc<dyn ExecIf> = Arc::new(bridge);
    let mut interp = Interpreter::new(&module, execif).with_abort_signal(abort);
    if config.debug {
        let debugger = Debugger::new(std::io::stdin().lock(), std::io::stderr());
        interp = interp.with_controller(Box::new(debugger));
    }
    let result = interp.interpret_module();
    drop(interp);

    match result {
        Ok(_) => 0,
        Err(e @ InterpretError::Exception { .. }) => {
            style.error(&format!("tsi: {e}"));
            EXIT_EXCEPTION
        }
        Err(e) => {
            style.error(&format!("tsi: {e}"));
            1
        }
    }
}

// ── Diagnostics ───────────────────────────────────────────────────────────────

/// Colours stderr diagnostics when stderr is a terminal.
#[derive(Debug, Clone, Copy)]
struct Style {
    color: bool,
}

impl Style {
    fn detect() -> Self {
        let color = unsafe { libc::isatty(libc::STDERR_FILENO) != 0 };
        Style { color }
    }

    fn error(&self, text: &str) {
        self.line(text, Color::Red);
    }

    fn warning(&self, text: &str) {
        self.line(text, Color::Yellow);
    }

    fn line(&self, text: &str, color: Color) {
        if self.color {
            eprintln!("{}", style(text).with(color));
        } else {
            eprintln!("{text}");
        }
    }
}
