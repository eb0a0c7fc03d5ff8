use anyhow::{Result, anyhow};
use pico_args::Arguments;
use std::{
    env,
    fs::File,
    io::{self, BufReader},
    path::PathBuf,
    process::Command,
};

use crate::config::{ConfigState, Profile, load_profile_file};
use crate::ipc;

pub fn run() -> Result<()> {
    let mut pargs = Arguments::from_env();

    // Hidden daemon mode (spawned by `start`)
    if pargs.contains("--daemon") {
        return ipc::run_daemon();
    }

    // No args -> general help
    if env::args().len() == 1 {
        print_help();
        return Ok(());
    }

    if pargs.contains("-h") || pargs.contains("--help") {
        print_help();
        return Ok(());
    }

    let subcmd: Option<String> = pargs.free_from_str().ok();

    match subcmd.as_deref() {
        Some("help") => {
            let topic: Option<String> = pargs.free_from_str().ok();
            if let Some(t) = topic {
                print_subcmd_help(&t);
            } else {
                print_help();
            }
            Ok(())
        }

        Some("run") => {
            let input: Option<PathBuf> = pargs.opt_value_from_str("--input")?;
            let name: Option<String> = pargs.opt_value_from_str("--profile")?;
            let file: Option<PathBuf> = pargs.opt_value_from_str("--profile-file")?;
            let profile = resolve_profile(name, file)?;

            let mut session = ipc::build_session(&profile)?;
            let stdout = io::stdout().lock();
            match input {
                Some(path) => {
                    let f = File::open(&path)
                        .map_err(|e| anyhow!("open {}: {e}", path.display()))?;
                    ipc::run_stream(BufReader::new(f), stdout, &mut session)?;
                }
                None => {
                    ipc::run_stream(io::stdin().lock(), stdout, &mut session)?;
                }
            }
            Ok(())
        }

        Some("start") => {
            let exe = env::current_exe()?;
            let child = Command::new(exe).arg("--daemon").spawn()?;
            println!("handctl: started daemon (pid={})", child.id());
            Ok(())
        }

        Some("stop") => {
            let r = ipc::client_request(serde_json::json!({"op":"shutdown"}))?;
            print_response(&r);
            Ok(())
        }

        Some("status") => {
            let r = ipc::client_request(serde_json::json!({"op":"status"}))?;
            print_response(&r);
            Ok(())
        }

        Some("reload") => {
            let r = ipc::client_request(serde_json::json!({"op":"reload"}))?;
            print_response(&r);
            Ok(())
        }

        Some("use") => {
            let name: String = pargs
                .free_from_str()
                .map_err(|_| anyhow!("usage: handctl use <profile_name>"))?;
            let r = ipc::client_request(serde_json::json!({"op":"use","profile":name}))?;
            print_response(&r);
            Ok(())
        }

        Some("list") => {
            let r = ipc::client_request(serde_json::json!({"op":"list"}))?;
            print_response(&r);
            Ok(())
        }

        Some(other) => {
            eprintln!("unknown subcommand: {other}\n");
            print_help();
            Ok(())
        }

        None => {
            print_help();
            Ok(())
        }
    }
}

/// `--profile-file` wins over `--profile`; with neither, the active profile is used.
/// Naming a profile here does not move the active pointer.
fn resolve_profile(name: Option<String>, file: Option<PathBuf>) -> Result<Profile> {
    if let Some(path) = file {
        return load_profile_file(&path);
    }
    let state = ConfigState::load_or_install_default()?;
    match name {
        Some(n) => load_profile_file(&state.profiles_dir.join(format!("{n}.toml"))),
        None => Ok(state.profile),
    }
}

fn print_help() {
    println!(
        r#"handctl - hand gesture stream processor

USAGE:
  handctl help [command]                  Show general or command-specific help
  handctl run [--input FILE]              Process frames from FILE or stdin, replies on stdout
      [--profile NAME | --profile-file PATH]
  handctl start                           Start the daemon
  handctl stop                            Stop the daemon
  handctl status                          Show daemon state
  handctl reload                          Reload active profile
  handctl use <name>                      Switch active profile
  handctl list                            List profiles

TIPS:
  - Profiles: ~/.config/handctl/profiles
  - Active profile pointer: ~/.config/handctl/active
  - Log level: RUST_LOG=debug
"#
    );
}

fn print_subcmd_help(cmd: &str) {
    match cmd {
        "run" => println!(
            "usage: handctl run [--input FILE] [--profile NAME | --profile-file PATH]\nReads one JSON request per line ({{\"op\":\"frame\",...}} or {{\"op\":\"reset\"}}) and writes one JSON reply per line."
        ),
        "start" => println!("usage: handctl start\nStarts the background daemon."),
        "stop" => println!("usage: handctl stop\nStops the running daemon."),
        "status" => println!(
            "usage: handctl status\nShows active profile, socket, open sessions and PID."
        ),
        "reload" => println!(
            "usage: handctl reload\nReloads the current profile; keeps last good on error."
        ),
        "use" => {
            println!("usage: handctl use <name>\nSwitches active profile to <name> and reloads.")
        }
        "list" => println!("usage: handctl list\nLists available profiles."),
        _ => {
            eprintln!("unknown command: {cmd}\n");
            print_help();
        }
    }
}

fn print_response(v: &serde_json::Value) {
    println!("{}", serde_json::to_string_pretty(v).unwrap_or_default());
}
