//! Line-oriented console that keeps a bounded pool of live sessions.
//!
//! Every session the console materializes gets a headless transcript
//! instance; switching focus goes through the Session Pool, so sessions
//! beyond capacity are made dormant in the daemon and restored on demand.

use std::collections::HashSet;
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::mpsc;
use std::thread::JoinHandle;

use clap::ArgMatches;
use tracing::{debug, info, warn};

use termhive_core::daemon::{CreateSessionRequest, OutputStream};
use termhive_core::pool::{
    CloseHandle, EvictionPass, InstanceError, LiveInstance, Mount, RestoredSession,
    TranscriptInstance, tail_lines,
};
use termhive_core::protocol::SupervisorEvent;
use termhive_core::{
    DaemonSupervisor, SessionId, SessionKind, SessionPool, SessionRegistry, SupervisorError,
};

use super::helpers::{load_config_with_warning, match_id, report_supervisor_error, supervisor};
use crate::table::{human_bytes, short_id};

const TRANSCRIPT_CAPACITY: usize = 256 * 1024;
const SHOW_LINES: usize = 20;

const HELP: &str = "\
Commands:
  new <project> [worktree] [--shell]  create a session and focus it
  switch <session>                    focus a session (restores it if dormant)
  pin <session> / unpin <session>     keep a session live regardless of capacity
  send <session> <text>               type a line into a session
  show [session]                      last lines of a session's transcript
  capacity <n>                        change the live instance capacity
  ls                                  list sessions
  close <session>                     kill a session
  quit                                leave (sessions keep running)";

#[derive(Debug, Clone, PartialEq, Eq)]
enum ConsoleCommand {
    New {
        project: String,
        worktree: Option<String>,
        shell: bool,
    },
    Switch(String),
    Pin(String),
    Unpin(String),
    Send { session: String, text: String },
    Show(Option<String>),
    Capacity(usize),
    Ls,
    Close(String),
    Help,
    Quit,
}

fn parse_command(line: &str) -> Result<Option<ConsoleCommand>, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let (verb, rest) = match line.split_once(char::is_whitespace) {
        Some((verb, rest)) => (verb, rest.trim()),
        None => (line, ""),
    };
    let words: Vec<&str> = rest.split_whitespace().collect();

    let one = |usage: &str| -> Result<String, String> {
        match words.as_slice() {
            [arg] => Ok(arg.to_string()),
            _ => Err(format!("usage: {}", usage)),
        }
    };

    let command = match verb {
        "new" => {
            let shell = words.contains(&"--shell");
            let positional: Vec<&str> = words.iter().copied().filter(|w| *w != "--shell").collect();
            match positional.as_slice() {
                [project] => ConsoleCommand::New {
                    project: project.to_string(),
                    worktree: None,
                    shell,
                },
                [project, worktree] => ConsoleCommand::New {
                    project: project.to_string(),
                    worktree: Some(worktree.to_string()),
                    shell,
                },
                _ => return Err("usage: new <project> [worktree] [--shell]".to_string()),
            }
        }
        "switch" | "s" => ConsoleCommand::Switch(one("switch <session>")?),
        "pin" => ConsoleCommand::Pin(one("pin <session>")?),
        "unpin" => ConsoleCommand::Unpin(one("unpin <session>")?),
        "send" => match rest.split_once(char::is_whitespace) {
            Some((session, text)) if !text.trim().is_empty() => ConsoleCommand::Send {
                session: session.to_string(),
                text: text.trim_start().to_string(),
            },
            _ => return Err("usage: send <session> <text>".to_string()),
        },
        "show" => match words.as_slice() {
            [] => ConsoleCommand::Show(None),
            [session] => ConsoleCommand::Show(Some(session.to_string())),
            _ => return Err("usage: show [session]".to_string()),
        },
        "capacity" => {
            let n = one("capacity <n>")?;
            let n = n
                .parse::<usize>()
                .map_err(|_| format!("'{}' is not a number", n))?;
            ConsoleCommand::Capacity(n)
        }
        "ls" | "list" => ConsoleCommand::Ls,
        "close" => ConsoleCommand::Close(one("close <session>")?),
        "help" | "?" => ConsoleCommand::Help,
        "quit" | "exit" | "q" => ConsoleCommand::Quit,
        other => return Err(format!("unknown command '{}' (try 'help')", other)),
    };
    Ok(Some(command))
}

pub(crate) fn handle_console_command(
    matches: &ArgMatches,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config_with_warning();
    let max_size = matches
        .get_one::<usize>("max-size")
        .copied()
        .unwrap_or(config.pool.max_size);

    let supervisor = supervisor(&config);
    if let Err(e) = supervisor.ping() {
        report_supervisor_error(&e);
        return Err(e.into());
    }

    let mut console = Console::open(supervisor, max_size)?;
    println!(
        "termhive console: capacity {}, {} known session(s). Type 'help' for commands.",
        console.pool.max_size(),
        console.registry.len()
    );

    let stdin = std::io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        print!("termhive> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next() else { break };
        let line = line?;
        console.drain_events();

        match parse_command(&line) {
            Ok(Some(ConsoleCommand::Quit)) => break,
            Ok(Some(command)) => {
                if let Err(e) = console.execute(command) {
                    println!("error: {}", e);
                }
            }
            Ok(None) => {}
            Err(msg) => println!("{}", msg),
        }
    }

    console.shutdown();
    Ok(())
}

struct Console {
    pool: SessionPool<DaemonSupervisor>,
    registry: SessionRegistry,
    pinned: HashSet<SessionId>,
    active: Option<SessionId>,
    events: mpsc::Receiver<SupervisorEvent>,
    events_closer: Option<Box<dyn CloseHandle>>,
    events_thread: Option<JoinHandle<()>>,
    cwd: PathBuf,
}

impl Console {
    fn open(supervisor: DaemonSupervisor, max_size: usize) -> Result<Self, Box<dyn std::error::Error>> {
        let stream = supervisor.subscribe_events()?;
        let closer: Box<dyn CloseHandle> = Box::new(stream.closer()?);
        let (tx, rx) = mpsc::channel();
        let events_thread = std::thread::Builder::new()
            .name("console-events".to_string())
            .spawn(move || {
                let mut stream = stream;
                loop {
                    match stream.next_event() {
                        Ok(Some(event)) => {
                            if tx.send(event).is_err() {
                                break;
                            }
                        }
                        Ok(None) => break,
                        Err(e) => {
                            debug!(event = "cli.console.events_ended", error = %e);
                            break;
                        }
                    }
                }
            })?;

        let view = supervisor.list_sessions(None)?;
        let mut pool = SessionPool::new(supervisor, max_size);
        let mut registry = SessionRegistry::new();
        let report = pool.reconcile(&view, &mut registry);
        info!(
            event = "cli.console.start_completed",
            sessions = registry.len(),
            max_size = pool.max_size(),
            unresolved = report.unresolved.len(),
        );

        Ok(Self {
            pool,
            registry,
            pinned: HashSet::new(),
            active: None,
            events: rx,
            events_closer: Some(closer),
            events_thread: Some(events_thread),
            cwd: std::env::current_dir()?,
        })
    }

    /// Apply supervisor events that arrived since the last command.
    fn drain_events(&mut self) {
        let mut resync = false;
        while let Ok(event) = self.events.try_recv() {
            match event {
                SupervisorEvent::StateChanged { session_id, state } => {
                    if self.registry.contains(&session_id) {
                        self.pool
                            .handle_state_change(&mut self.registry, &session_id, state);
                    }
                }
                SupervisorEvent::Exited {
                    session_id,
                    exit_code,
                } => {
                    if let Some(session) =
                        self.pool
                            .handle_exit(&mut self.registry, &session_id, exit_code)
                    {
                        match exit_code {
                            Some(code) => println!("{} exited with code {}", session.title, code),
                            None => println!("{} ended", session.title),
                        }
                    }
                    self.forget(&session_id);
                }
                SupervisorEvent::Resync { events_dropped } => {
                    debug!(
                        event = "cli.console.resync_requested",
                        events_dropped = events_dropped,
                    );
                    resync = true;
                }
                SupervisorEvent::Data { .. } | SupervisorEvent::OutputDropped { .. } => {}
            }
        }

        if resync && let Err(e) = self.resync() {
            println!("could not resync with the daemon: {}", e);
        }
    }

    /// Rebuild the local view after missed events.
    fn resync(&mut self) -> Result<(), SupervisorError> {
        let view = self.pool.supervisor().list_sessions(None)?;
        let report = self.pool.reconcile(&view, &mut self.registry);
        for id in &report.dropped {
            println!("{} is gone", short_id(id));
            self.forget(id);
        }
        info!(
            event = "cli.console.resync_completed",
            dropped = report.dropped.len(),
            unresolved = report.unresolved.len(),
        );
        Ok(())
    }

    fn execute(&mut self, command: ConsoleCommand) -> Result<(), Box<dyn std::error::Error>> {
        match command {
            ConsoleCommand::New {
                project,
                worktree,
                shell,
            } => self.create(&project, worktree, shell),
            ConsoleCommand::Switch(needle) => {
                let id = self.resolve(&needle)?;
                self.switch(&id)
            }
            ConsoleCommand::Pin(needle) => {
                let id = self.resolve(&needle)?;
                println!("pinned {}", short_id(&id));
                self.pinned.insert(id);
                Ok(())
            }
            ConsoleCommand::Unpin(needle) => {
                let id = self.resolve(&needle)?;
                self.pinned.remove(&id);
                println!("unpinned {}", short_id(&id));
                let pass = self
                    .pool
                    .enforce_capacity(&self.registry, self.active.as_deref(), &self.pinned);
                self.report_pass(&pass);
                Ok(())
            }
            ConsoleCommand::Send { session, text } => {
                let id = self.resolve(&session)?;
                let mut bytes = text.into_bytes();
                bytes.push(b'\r');
                self.pool.supervisor().write_stdin(&id, &bytes)?;
                self.registry.record_activity(&id);
                Ok(())
            }
            ConsoleCommand::Show(needle) => {
                let id = match needle {
                    Some(needle) => self.resolve(&needle)?,
                    None => self.active.clone().ok_or("no session is focused")?,
                };
                self.show(&id)
            }
            ConsoleCommand::Capacity(n) => {
                let pass = self
                    .pool
                    .resize(n, &self.registry, self.active.as_deref(), &self.pinned);
                println!("capacity {}", self.pool.max_size());
                self.report_pass(&pass);
                Ok(())
            }
            ConsoleCommand::Ls => {
                self.print_sessions();
                Ok(())
            }
            ConsoleCommand::Close(needle) => {
                let id = self.resolve(&needle)?;
                let result = self.pool.close(&id, &mut self.registry);
                self.forget(&id);
                result?;
                println!("closed {}", short_id(&id));
                Ok(())
            }
            ConsoleCommand::Help => {
                println!("{}", HELP);
                Ok(())
            }
            ConsoleCommand::Quit => Ok(()),
        }
    }

    fn resolve(&self, needle: &str) -> Result<SessionId, String> {
        let ids = self.registry.ids();
        match_id(ids.iter().map(String::as_str), needle).map(String::from)
    }

    fn forget(&mut self, id: &str) {
        self.pinned.remove(id);
        if self.active.as_deref() == Some(id) {
            self.active = None;
        }
    }

    fn create(
        &mut self,
        project: &str,
        worktree: Option<String>,
        shell: bool,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let kind = if shell {
            SessionKind::PlainShell
        } else {
            SessionKind::InteractiveAgent
        };
        let mut request = CreateSessionRequest::new(project, kind, self.cwd.clone());
        request.worktree_id = worktree;

        let info = self.pool.supervisor().create_session(&request)?;
        self.registry.upsert(info.to_session());

        let stream = self.pool.supervisor().attach(&info.id)?;
        let instance = TranscriptInstance::spawn(&info.id, Vec::new(), stream, TRANSCRIPT_CAPACITY)?;
        self.pool.register(&info.id, Box::new(instance))?;
        println!("created {} ({})", short_id(&info.id), info.title);

        self.switch(&info.id)
    }

    /// Materialize a session this console has not seen live yet.
    fn adopt(&mut self, id: &str) -> Result<(), Box<dyn std::error::Error>> {
        let instance = match self.pool.supervisor().attach(id) {
            Ok(stream) => TranscriptInstance::spawn(id, Vec::new(), stream, TRANSCRIPT_CAPACITY)?,
            Err(SupervisorError::DaemonError { code, .. }) if code == "session_dormant" => {
                let restoration = self.pool.supervisor().restore(id)?;
                TranscriptInstance::spawn(
                    id,
                    restoration.flushed,
                    restoration.stream,
                    TRANSCRIPT_CAPACITY,
                )?
            }
            Err(e) => return Err(e.into()),
        };
        self.pool.register(id, Box::new(instance))?;
        debug!(event = "cli.console.session_adopted", session_id = id);
        Ok(())
    }

    fn switch(&mut self, id: &str) -> Result<(), Box<dyn std::error::Error>> {
        if !self.pool.contains(id) {
            self.adopt(id)?;
        }

        let was_dormant = self.pool.is_dormant(id);
        let mount: Box<Mount<'_, OutputStream>> = Box::new(
            |restored: RestoredSession<OutputStream>| -> Result<Box<dyn LiveInstance>, InstanceError> {
                let instance = TranscriptInstance::from_restored(restored, TRANSCRIPT_CAPACITY)?;
                Ok(Box::new(instance))
            },
        );
        let pass = self.pool.switch_to(id, &self.registry, &self.pinned, mount)?;
        self.active = Some(id.to_string());

        let title = self
            .registry
            .get(id)
            .map(|s| s.title.clone())
            .unwrap_or_else(|| short_id(id));
        if was_dormant {
            println!("focused {} (restored)", title);
        } else {
            println!("focused {}", title);
        }
        self.report_pass(&pass);
        Ok(())
    }

    fn report_pass(&self, pass: &EvictionPass) {
        for id in &pass.evicted {
            println!("  made dormant: {}", short_id(id));
        }
        for id in &pass.failed {
            println!("  could not snapshot {}; it stays live", short_id(id));
        }
        if pass.deferred {
            println!(
                "  over capacity ({} live / {}): remaining sessions are protected",
                self.pool.active_live_count(),
                self.pool.max_size()
            );
        }
        if pass.runaway {
            warn!(event = "cli.console.eviction_runaway", iterations = pass.iterations);
        }
    }

    fn show(&self, id: &str) -> Result<(), Box<dyn std::error::Error>> {
        let bytes = if let Some(instance) = self.pool.instance(id) {
            instance.serialize()?
        } else if let Some(snapshot) = self.pool.snapshot_of(id) {
            let buffered = self
                .pool
                .supervisor()
                .get_session(id)
                .map(|info| info.buffered_bytes)
                .unwrap_or(0);
            println!(
                "(dormant; {} buffered since eviction)",
                human_bytes(buffered)
            );
            snapshot.to_vec()
        } else {
            return Err(format!("{} is not materialized here; switch to it first", short_id(id)).into());
        };

        let tail = tail_lines(&bytes, SHOW_LINES);
        if !tail.is_empty() {
            println!("{}", tail);
        }
        Ok(())
    }

    fn print_sessions(&self) {
        println!(
            "live {}/{}  dormant {}",
            self.pool.active_live_count(),
            self.pool.max_size(),
            self.pool.dormant_ids().len()
        );
        for session in self.registry.list() {
            let mode = if self.pool.is_live(&session.id) {
                "live"
            } else if self.pool.is_dormant(&session.id) {
                "dormant"
            } else {
                "-"
            };
            let focus = if self.active.as_deref() == Some(session.id.as_str()) {
                '*'
            } else {
                ' '
            };
            let pin = if self.pinned.contains(&session.id) {
                'p'
            } else {
                ' '
            };
            println!(
                "{}{} {}  {:<8} {:<10} {}",
                focus,
                pin,
                short_id(&session.id),
                mode,
                session.state.as_str(),
                session.title
            );
        }
    }

    fn shutdown(&mut self) {
        if let Some(closer) = self.events_closer.take() {
            closer.close();
        }
        if let Some(handle) = self.events_thread.take()
            && handle.join().is_err()
        {
            warn!(event = "cli.console.events_thread_panicked");
        }
        info!(
            event = "cli.console.shutdown_completed",
            live = self.pool.active_live_count(),
            dormant = self.pool.dormant_ids().len(),
        );
    }
}
