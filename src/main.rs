use std::process::ExitCode;

use clap::Parser;
use gistore::cli::{Cli, Command};
use gistore::error::GistoreError;
use gistore::orchestrator::{Orchestrator, Task};
use gistore::{styling, task as task_registry};

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    match dispatch(&cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!(
                "{ERROR}error:{ERROR:#} {err}",
                ERROR = styling::ERROR_BOLD,
                err = err
            );
            exit_code_for(&err)
        }
    }
}

fn init_logging(verbose: u8, quiet: bool) {
    let level = if quiet {
        "warn"
    } else {
        match verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();
}

fn exit_code_for(err: &anyhow::Error) -> ExitCode {
    match err.downcast_ref::<GistoreError>() {
        Some(e) => ExitCode::from(e.exit_code() as u8),
        None => ExitCode::FAILURE,
    }
}

fn dispatch(cli: &Cli) -> anyhow::Result<ExitCode> {
    match &cli.command {
        Command::Init => {
            let root = task_registry::resolve_for_init(cli.task.as_deref())?;
            let mut orch = Orchestrator::new(Task::open(root)?);
            orch.init()?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Status => {
            let orch = open_orchestrator(cli.task.as_deref())?;
            for line in orch.status()? {
                println!("{} {}", line.code, line.path);
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Commit { message } => {
            let orch = open_orchestrator(cli.task.as_deref())?;
            let message = message.clone();
            run_with_signal_cleanup(orch, move |o| o.commit(message.as_deref()))?;
            Ok(ExitCode::SUCCESS)
        }
        Command::CommitAll { message } => Ok(commit_all(message.as_deref())),
        Command::Add { paths } => {
            let mut orch = open_orchestrator(cli.task.as_deref())?;
            for path in paths {
                orch.add_source(path)?;
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Rm { paths } => {
            let mut orch = open_orchestrator(cli.task.as_deref())?;
            for path in paths {
                orch.remove_source(path)?;
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::List => {
            for (name, root) in task_registry::list_tasks() {
                println!("{name}\t{}", root.display());
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Log { args } => {
            let orch = open_orchestrator(cli.task.as_deref())?;
            let refs: Vec<&str> = args.iter().map(String::as_str).collect();
            print!("{}", orch.log(&refs)?);
            Ok(ExitCode::SUCCESS)
        }
        Command::Mount | Command::Umount => {
            // Internal-only entry points reserved for a future split-process
            // design; refuse when reached from a plain CLI invocation.
            Err(GistoreError::NotImplemented(
                "mount/umount are internal operations".to_string(),
            )
            .into())
        }
    }
}

fn open_orchestrator(task_arg: Option<&str>) -> anyhow::Result<Orchestrator> {
    let root = task_registry::resolve(task_arg)?;
    let task = Task::open(root)?;
    Ok(Orchestrator::new(task))
}

/// Run `commit-all`, isolating each task's failure from the others (§4.8
/// Batch mode): every task is attempted, failures are reported per task, and
/// the overall exit code reflects whether any task failed.
fn commit_all(message: Option<&str>) -> ExitCode {
    let mut any_failed = false;
    for (name, root) in task_registry::list_tasks() {
        let message = message.map(str::to_string);
        let outcome: anyhow::Result<()> = Task::open(root)
            .map(Orchestrator::new)
            .map_err(anyhow::Error::from)
            .and_then(|orch| run_with_signal_cleanup(orch, move |o| o.commit(message.as_deref())));
        if let Err(err) = outcome {
            any_failed = true;
            eprintln!(
                "{ERROR}error:{ERROR:#} task '{name}': {err}",
                ERROR = styling::ERROR_BOLD
            );
        }
    }
    if any_failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

/// Install the Cleanup contract (§5) around a lock-holding operation: on a
/// fatal signal, a background thread takes the orchestrator's mutex,
/// releases whatever locks/mounts it still owes, and exits with the
/// `128 + signum` convention. Takes `orch` by value (rather than a raw
/// pointer shared across threads) so the handoff stays entirely safe.
#[cfg(unix)]
fn run_with_signal_cleanup(
    orch: Orchestrator,
    op: impl FnOnce(&mut Orchestrator) -> gistore::Result<()> + Send + 'static,
) -> anyhow::Result<()> {
    use signal_hook::consts::{SIGABRT, SIGHUP, SIGINT, SIGPIPE, SIGQUIT, SIGSEGV, SIGTERM};
    use signal_hook::iterator::Signals;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};

    const FATAL_SIGNALS: &[i32] = &[SIGINT, SIGHUP, SIGQUIT, SIGABRT, SIGSEGV, SIGPIPE, SIGTERM];

    let shared = Arc::new(Mutex::new(orch));
    let shared_for_thread = Arc::clone(&shared);
    let armed = Arc::new(AtomicBool::new(true));
    let armed_for_thread = Arc::clone(&armed);

    let mut signals = Signals::new(FATAL_SIGNALS)?;
    let handle = signals.handle();
    let watcher = std::thread::spawn(move || {
        if let Some(signum) = signals.forever().next() {
            if armed_for_thread.load(Ordering::SeqCst) {
                if let Ok(mut guard) = shared_for_thread.lock() {
                    guard.cleanup_on_signal();
                }
            }
            std::process::exit(128 + signum);
        }
    });

    let result = {
        let mut guard = shared.lock().unwrap();
        op(&mut guard)
    };

    armed.store(false, Ordering::SeqCst);
    handle.close();
    let _ = watcher.join();

    result.map_err(Into::into)
}

#[cfg(not(unix))]
fn run_with_signal_cleanup(
    mut orch: Orchestrator,
    op: impl FnOnce(&mut Orchestrator) -> gistore::Result<()>,
) -> anyhow::Result<()> {
    op(&mut orch).map_err(Into::into)
}
