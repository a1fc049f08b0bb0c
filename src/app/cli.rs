use std::{
    io::{self, Write},
    path::{Path, PathBuf},
    sync::Arc,
};

use chrono::Utc;
use crossbeam_channel::Sender;
use crossterm::{
    cursor,
    event::{self, Event, KeyCode, KeyEventKind},
    execute,
    terminal
};
use log::warn;

use crate::app::auth::Authorizer;
use crate::app::upload::stage_upload;
use crate::error::SupervisorError;
use crate::manager::{StopOutcome, Supervisor};
use crate::models::message::MonitorMessage;
use crate::models::script::ScriptRecord;

const HELP: &[&str] = &[
    "tenant <id>      - act as another tenant",
    "host <path>      - upload and run a .py script",
    "status           - running scripts",
    "list             - all scripts (admin)",
    "users            - tenants and their scripts (admin)",
    "stop <id>        - stop a script",
    "restart <id>     - restart a script",
    "killall          - stop every running script (admin)",
    "health           - liveness probe",
    "sweep            - reap exited scripts now",
    "exit             - quit",
];

#[derive(Debug, PartialEq, Eq)]
pub enum Reply {
    Lines(Vec<String>),
    Exit,
}

/// Operator console: one tenant at a time, commands mapped onto the supervisor.
pub struct Console {
    supervisor: Arc<Supervisor>,
    auth: Box<dyn Authorizer>,
    scripts_dir: PathBuf,
    monitor: Option<Sender<MonitorMessage>>,
    tenant: String,
}

impl Console {
    pub fn new(
        supervisor: Arc<Supervisor>,
        auth: Box<dyn Authorizer>,
        scripts_dir: impl Into<PathBuf>,
        tenant: impl Into<String>) -> Self
    {
        Console {
            supervisor,
            auth,
            scripts_dir: scripts_dir.into(),
            monitor: None,
            tenant: tenant.into(),
        }
    }

    pub fn with_monitor(mut self, monitor: Sender<MonitorMessage>) -> Self {
        self.monitor = Some(monitor);
        self
    }

    pub fn tenant(&self) -> &str {
        &self.tenant
    }

    fn privileged(&self) -> bool {
        self.auth.is_privileged(&self.tenant)
    }

    pub fn execute(&mut self, line: &str) -> Reply {
        let mut args = line.split_whitespace();
        let lines = match (args.next(), args.next()) {
            (None, _) => Vec::new(),
            (Some("help"), _) => HELP.iter().map(|l| l.to_string()).collect(),
            (Some("tenant"), Some(id)) => {
                self.tenant = id.to_string();
                let role = if self.privileged() { "admin" } else { "tenant" };
                vec![format!("Now acting as {} '{}'.", role, self.tenant)]
            }
            (Some("host"), Some(_)) => {
                // paths may contain spaces
                let path = line.trim()["host".len()..].trim();
                self.host(Path::new(path))
            }
            (Some("status"), _) => self.status(),
            (Some("list"), _) => self.list(),
            (Some("users"), _) => self.users(),
            (Some("stop"), Some(id)) => {
                match self.supervisor.stop(id, &self.tenant, self.privileged()) {
                    Ok(StopOutcome::AlreadyStopped) => vec![format!("Script {} was already stopped.", id)],
                    Ok(_) => vec![format!("Stopped script {}.", id)],
                    Err(e) => vec![describe(&e)],
                }
            }
            (Some("restart"), Some(id)) => {
                match self.supervisor.restart(id, &self.tenant, self.privileged()) {
                    Ok(record) => vec![format!("Restarted script {} as process {}.", id, pid_text(&record))],
                    Err(e) => vec![describe(&e)],
                }
            }
            (Some("killall"), _) => match self.supervisor.kill_all(&self.tenant, self.privileged()) {
                Ok(count) => vec![format!("Stopped all {} running scripts.", count)],
                Err(e) => vec![describe(&e)],
            },
            (Some("health"), _) => match serde_json::to_string(&self.supervisor.health()) {
                Ok(json) => vec![json],
                Err(e) => vec![format!("Failed to encode health: {}", e)],
            },
            (Some("sweep"), _) => self.sweep(),
            (Some("exit"), _) => return Reply::Exit,
            (Some(cmd @ ("host" | "stop" | "restart" | "tenant")), None) => {
                vec![format!("Usage: {} <argument>", cmd)]
            }
            (Some(cmd), _) => vec![format!("Unknown command: {}. Type 'help' for commands.", cmd)],
        };
        Reply::Lines(lines)
    }

    fn host(&self, source: &Path) -> Vec<String> {
        let staged = match stage_upload(&self.scripts_dir, &self.tenant, source) {
            Ok(staged) => staged,
            Err(e) => return vec![format!("Upload rejected: {}", e)],
        };
        match self.supervisor.start(&self.tenant, &staged.path, &staged.file_name) {
            Ok(record) => vec![
                "Script hosted.".to_string(),
                format!("ID: {}", record.id),
                format!("File: {}", record.file_name),
                format!("Status: {:?} (process {})", record.status, pid_text(&record)),
            ],
            Err(e) => vec![describe(&e)],
        }
    }

    fn status(&self) -> Vec<String> {
        let privileged = self.privileged();
        let records = match self.supervisor.status(&self.tenant, privileged) {
            Ok(records) => records,
            Err(e) => return vec![describe(&e)],
        };
        let now = Utc::now();
        let mut lines: Vec<String> = records
            .iter()
            .filter_map(|record| {
                let uptime = record.uptime(now)?;
                let owner = if privileged { format!("{}\t", record.tenant_id) } else { String::new() };
                Some(format!(
                    "{}{}\t{}\t{}",
                    owner,
                    record.id,
                    record.file_name,
                    format_uptime(uptime.num_seconds())
                ))
            })
            .collect();
        if lines.is_empty() {
            lines.push("No running scripts found.".to_string());
        }
        lines
    }

    fn list(&self) -> Vec<String> {
        if !self.privileged() {
            return vec!["Admin only command.".to_string()];
        }
        let records = match self.supervisor.status(&self.tenant, true) {
            Ok(records) => records,
            Err(e) => return vec![describe(&e)],
        };
        let mut lines = vec![format!("{}\t{}\t{}\t{}\t{}", "Tenant", "ID", "Status", "PID", "File")];
        lines.push("-".repeat(60));
        for record in records {
            lines.push(format!(
                "{}\t{}\t{:?}\t{}\t{}",
                record.tenant_id,
                record.id,
                record.status,
                pid_text(&record),
                record.file_name
            ));
        }
        lines
    }

    fn users(&self) -> Vec<String> {
        match self.supervisor.list_tenants(self.privileged()) {
            Ok(tenants) if tenants.is_empty() => vec!["No tenants yet.".to_string()],
            Ok(tenants) => tenants
                .into_iter()
                .map(|t| format!("{}\t{} running / {} total", t.tenant_id, t.running, t.total))
                .collect(),
            Err(SupervisorError::Forbidden(_)) => vec!["Admin only command.".to_string()],
            Err(e) => vec![describe(&e)],
        }
    }

    fn sweep(&self) -> Vec<String> {
        match &self.monitor {
            Some(monitor) => match monitor.send(MonitorMessage::Sweep) {
                Ok(()) => vec!["Sweep requested.".to_string()],
                Err(e) => vec![format!("Monitor is not running: {}", e)],
            },
            None => vec![format!("Reaped {} exited scripts.", self.supervisor.reap_exited())],
        }
    }
}

fn describe(error: &SupervisorError) -> String {
    match error {
        SupervisorError::NotFound(id) => format!("Script {} not found.", id),
        SupervisorError::Forbidden(_) => "Not allowed for this tenant.".to_string(),
        other => format!("Error: {}", other),
    }
}

fn pid_text(record: &ScriptRecord) -> String {
    record.pid.map_or_else(|| "NONE".to_string(), |pid| pid.to_string())
}

fn format_uptime(total_secs: i64) -> String {
    let secs = total_secs.max(0);
    format!("{}:{:02}:{:02}", secs / 3600, secs / 60 % 60, secs % 60)
}

pub fn run_cli(mut console: Console) -> io::Result<()> {
    println!("Script supervisor started as '{}'. Type 'help' for commands or 'exit' to quit.", console.tenant());
    let mut commands_history: Vec<String> = Vec::new();

    terminal::enable_raw_mode()?;
    let result = (|| -> io::Result<()> {
        loop {
            let input = read_command(&commands_history)?;
            if !input.trim().is_empty() {
                commands_history.push(input.clone());
            }
            match console.execute(&input) {
                Reply::Lines(lines) => {
                    for line in lines {
                        println!("\r{}", line);
                    }
                }
                Reply::Exit => {
                    println!("\rExiting the program...");
                    return Ok(());
                }
            }
        }
    })();
    if let Err(e) = terminal::disable_raw_mode() {
        warn!("Failed to disable raw mode: {}", e);
    }
    result
}

/// Reads one line in raw mode, with Up/Down walking `history`.
fn read_command(history: &[String]) -> io::Result<String> {
    let mut history_index = history.len();
    let mut input = String::new();
    print!("\r>>> ");
    io::stdout().flush()?;

    loop {
        let Event::Key(key_event) = event::read()? else {
            continue;
        };
        if key_event.kind != KeyEventKind::Press {
            continue;
        }
        match key_event.code {
            KeyCode::Enter => {
                println!();
                return Ok(input);
            }
            KeyCode::Up => {
                if history_index > 0 {
                    history_index -= 1;
                }
                if let Some(command) = history.get(history_index) {
                    input = command.clone();
                    redraw(&input)?;
                }
            }
            KeyCode::Down => {
                if history_index < history.len() {
                    history_index += 1;
                }
                input = history.get(history_index).cloned().unwrap_or_default();
                redraw(&input)?;
            }
            KeyCode::Char(c) => {
                input.push(c);
                print!("{}", c);
                io::stdout().flush()?;
            }
            KeyCode::Backspace => {
                input.pop();
                redraw(&input)?;
            }
            _ => {}
        }
    }
}

fn redraw(input: &str) -> io::Result<()> {
    execute!(io::stdout(),
            cursor::MoveToColumn(0),
            terminal::Clear(terminal::ClearType::CurrentLine))?;
    print!(">>> {}", input);
    io::stdout().flush()
}
