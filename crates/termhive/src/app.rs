use clap::{Arg, ArgAction, Command};
use clap_complete::Shell;

const STATES: [&str; 6] = ["starting", "busy", "permission", "question", "done", "stopped"];

pub fn build_cli() -> Command {
    Command::new("termhive")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Run many agent terminals across projects and worktrees")
        .long_about("termhive keeps every agent terminal alive in a background daemon while only a bounded number stay materialized. Terminals you are not looking at are made dormant and their output is buffered until you switch back.")
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Enable verbose logging output")
                .action(ArgAction::SetTrue)
                .global(true),
        )
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(
            Command::new("daemon")
                .about("Control the PTY daemon")
                .subcommand_required(true)
                .subcommand(Command::new("start").about("Start the daemon in the background"))
                .subcommand(Command::new("stop").about("Stop the daemon and every session it owns"))
                .subcommand(Command::new("status").about("Show whether the daemon is running"))
        )
        .subcommand(
            Command::new("create")
                .about("Create a session in the daemon")
                .arg(
                    Arg::new("project")
                        .help("Project the session belongs to")
                        .required(true)
                        .index(1)
                )
                .arg(
                    Arg::new("worktree")
                        .long("worktree")
                        .short('w')
                        .help("Git worktree inside the project")
                )
                .arg(
                    Arg::new("shell")
                        .long("shell")
                        .help("Start a plain login shell instead of the agent")
                        .action(ArgAction::SetTrue)
                )
                .arg(
                    Arg::new("title")
                        .long("title")
                        .short('t')
                        .help("Display title (default: derived from project and worktree)")
                )
                .arg(
                    Arg::new("cwd")
                        .long("cwd")
                        .help("Working directory (default: current directory)")
                )
        )
        .subcommand(
            Command::new("list")
                .about("List sessions known to the daemon")
                .arg(
                    Arg::new("project")
                        .long("project")
                        .short('p')
                        .help("Only sessions of this project")
                )
                .arg(
                    Arg::new("json")
                        .long("json")
                        .help("Output in JSON format")
                        .action(ArgAction::SetTrue)
                )
        )
        .subcommand(
            Command::new("send")
                .about("Type text into a session (a newline is appended)")
                .arg(
                    Arg::new("session")
                        .help("Session id or unique id prefix")
                        .required(true)
                        .index(1)
                )
                .arg(
                    Arg::new("text")
                        .help("Text to send")
                        .required(true)
                        .index(2)
                )
        )
        .subcommand(
            Command::new("resize")
                .about("Resize a session's terminal")
                .arg(
                    Arg::new("session")
                        .help("Session id or unique id prefix")
                        .required(true)
                        .index(1)
                )
                .arg(
                    Arg::new("cols")
                        .help("Columns")
                        .required(true)
                        .index(2)
                        .value_parser(clap::value_parser!(u16).range(1..))
                )
                .arg(
                    Arg::new("rows")
                        .help("Rows")
                        .required(true)
                        .index(3)
                        .value_parser(clap::value_parser!(u16).range(1..))
                )
        )
        .subcommand(
            Command::new("state")
                .about("Report a session's lifecycle state")
                .arg(
                    Arg::new("session")
                        .help("Session id or unique id prefix")
                        .required(true)
                        .index(1)
                )
                .arg(
                    Arg::new("state")
                        .help("New lifecycle state")
                        .required(true)
                        .index(2)
                        .value_parser(STATES)
                )
        )
        .subcommand(
            Command::new("close")
                .about("Kill a session and forget it")
                .arg(
                    Arg::new("session")
                        .help("Session id or unique id prefix")
                        .required(true)
                        .index(1)
                )
        )
        .subcommand(
            Command::new("console")
                .about("Interactive console that keeps a bounded pool of live sessions")
                .arg(
                    Arg::new("max-size")
                        .long("max-size")
                        .short('n')
                        .help("Live instance capacity (overrides config)")
                        .value_parser(clap::value_parser!(usize))
                )
        )
        .subcommand(
            Command::new("completions")
                .about("Generate shell completions")
                .arg(
                    Arg::new("shell")
                        .help("Shell to generate completions for")
                        .required(true)
                        .index(1)
                        .value_parser(clap::value_parser!(Shell))
                )
        )
}
