use anyhow::{Result, anyhow};
use log::{error, info, warn};
use std::{
    io::{BufRead, BufReader, ErrorKind, Write},
    os::unix::net::{UnixListener, UnixStream},
    sync::{
        Arc, Mutex, MutexGuard,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    thread,
    time::Duration,
};

use super::pipeline::{Session, build_session};
use super::runtime::socket_path;
use crate::config::ConfigState;

/// State shared by every client thread. Pipeline state is never shared: each
/// connection owns its own session.
struct DaemonState {
    cfg: Mutex<ConfigState>,
    sessions: AtomicUsize,
    shutdown: AtomicBool,
}

impl DaemonState {
    fn cfg(&self) -> Result<MutexGuard<'_, ConfigState>> {
        self.cfg.lock().map_err(|_| anyhow!("config lock poisoned"))
    }
}

struct SessionSlot<'a>(&'a AtomicUsize);

impl<'a> SessionSlot<'a> {
    fn claim(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for SessionSlot<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

pub fn run_daemon() -> Result<()> {
    // socket
    let sock = socket_path()?;
    if sock.exists() {
        let _ = std::fs::remove_file(&sock);
    }
    let listener = UnixListener::bind(&sock)?;
    info!("daemon: listening on {}", sock.display());

    // state
    let cfg = ConfigState::load_or_install_default()?;
    info!("daemon: active profile '{}'", cfg.active_name);
    let state = Arc::new(DaemonState {
        cfg: Mutex::new(cfg),
        sessions: AtomicUsize::new(0),
        shutdown: AtomicBool::new(false),
    });

    // accept loop
    listener.set_nonblocking(true)?;
    while !state.shutdown.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((stream, _)) => {
                let st = state.clone();
                thread::spawn(move || {
                    if let Err(e) = handle_client(stream, &st) {
                        error!("ipc client error: {e}");
                    }
                });
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => {
                thread::sleep(Duration::from_millis(10));
            }
            Err(e) => {
                warn!("accept failed: {e}");
                thread::sleep(Duration::from_millis(10));
            }
        }
    }

    let _ = std::fs::remove_file(&sock);
    info!("daemon: stopped");
    Ok(())
}

fn handle_client(mut stream: UnixStream, st: &DaemonState) -> Result<()> {
    stream.set_nonblocking(false)?;
    let reader = BufReader::new(stream.try_clone()?);
    let mut session: Option<(Session, SessionSlot<'_>)> = None;

    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let req = serde_json::from_str::<serde_json::Value>(&line);
        let resp = match &req {
            Ok(req) => handle_request(req, &line, st, &mut session),
            Err(e) => serde_json::json!({"ok": false, "error": format!("bad request: {e}")}),
        };
        writeln!(stream, "{resp}")?;
        stream.flush()?;

        // only stop once the reply is out
        if req.is_ok_and(|r| r.get("op").and_then(|v| v.as_str()) == Some("shutdown")) {
            st.shutdown.store(true, Ordering::SeqCst);
            break;
        }
    }

    if let Some((s, _slot)) = session {
        info!("client disconnected after {} frames", s.frames());
    }
    Ok(())
}

fn handle_request<'a>(
    req: &serde_json::Value,
    line: &str,
    st: &'a DaemonState,
    session: &mut Option<(Session, SessionSlot<'a>)>,
) -> serde_json::Value {
    let op = req.get("op").and_then(|v| v.as_str()).unwrap_or("");

    let result: Result<serde_json::Value> = match op {
        "reset" if session.is_none() => Ok(serde_json::json!({"ok": true, "data": "reset"})),
        "frame" | "reset" => {
            if session.is_none() {
                match open_session(st) {
                    Ok(s) => *session = Some((s, SessionSlot::claim(&st.sessions))),
                    Err(e) => {
                        error!("failed to start session: {e}");
                        return serde_json::json!({"ok": false, "error": e.to_string()});
                    }
                }
            }
            match session.as_mut() {
                Some((s, _)) => Ok(s.handle_line(line)),
                None => Err(anyhow!("no session")),
            }
        }
        "status" => st.cfg().map(|cfg| {
            serde_json::json!({"ok": true, "data": {
                "active_profile": cfg.active_name,
                "config_dir": cfg.config_dir,
                "socket": socket_path().ok(),
                "sessions": st.sessions.load(Ordering::SeqCst),
                "pid": std::process::id(),
            }})
        }),
        "reload" => st.cfg().and_then(|mut cfg| {
            cfg.reload()?;
            info!("profile reloaded");
            Ok(serde_json::json!({"ok": true, "data": {"active_profile": cfg.active_name}}))
        }),
        "use" => {
            let name = req.get("profile").and_then(|v| v.as_str()).unwrap_or("");
            st.cfg().and_then(|mut cfg| {
                cfg.set_active(name)?;
                info!("switched active profile to {}", cfg.active_name);
                Ok(serde_json::json!({"ok": true, "data": {"active_profile": cfg.active_name}}))
            })
        }
        "list" => st.cfg().map(|cfg| {
            serde_json::json!({"ok": true, "data": {
                "profiles": cfg.list_profiles(),
                "active": cfg.active_name,
            }})
        }),
        "shutdown" => Ok(serde_json::json!({"ok": true, "data": "shutting down"})),
        _ => Err(anyhow!("unknown op: {op}")),
    };

    result.unwrap_or_else(|e| serde_json::json!({"ok": false, "error": e.to_string()}))
}

fn open_session(st: &DaemonState) -> Result<Session> {
    // sessions pick up the profile active at their first frame
    let profile = st.cfg()?.profile.clone();
    build_session(&profile)
}

// client helper
pub fn client_request(req: serde_json::Value) -> Result<serde_json::Value> {
    let sock = socket_path()?;
    if !sock.exists() {
        return Err(anyhow!(
            "handctl daemon is not running (socket missing at {})",
            sock.display()
        ));
    }
    let mut stream = UnixStream::connect(sock)?;
    let line = serde_json::to_string(&req)? + "\n";
    stream.write_all(line.as_bytes())?;
    let mut reader = BufReader::new(stream);
    let mut resp = String::new();
    reader.read_line(&mut resp)?;
    let v: serde_json::Value = serde_json::from_str(&resp)?;
    Ok(v)
}
