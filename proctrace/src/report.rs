use crate::config::OutputFormat;
use crate::resolver::ProcessIdentity;
use serde::Serialize;
use std::io::{self, Write};
use tracing::info;

#[derive(Debug, Clone, Copy)]
pub struct ExecReport<'a> {
    pub pid: u32,
    pub tgid: u32,
    /// Kernel timestamp, nanoseconds since boot.
    pub timestamp_ns: u64,
    pub identity: &'a ProcessIdentity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitReport {
    pub pid: u32,
    pub tgid: u32,
    pub timestamp_ns: u64,
    pub exit_code: u32,
    pub exit_signal: u32,
    pub parent_pid: Option<u32>,
}

impl ExitReport {
    /// Human form of the wait status the kernel puts in `exit_code`.
    pub fn status(&self) -> String {
        let termsig = self.exit_code & 0x7f;
        if termsig == 0 {
            format!("exited with code {}", (self.exit_code >> 8) & 0xff)
        } else {
            format!("killed by signal {}", termsig)
        }
    }
}

/// Where decoded events end up.
pub trait Reporter {
    fn report_exec(&mut self, report: &ExecReport<'_>) -> io::Result<()>;
    fn report_exit(&mut self, report: &ExitReport) -> io::Result<()>;
}

#[derive(Serialize)]
struct JsonRecord<'a> {
    time: String,
    event: &'static str,
    pid: u32,
    tgid: u32,
    timestamp_ns: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    exe: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    cmdline: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    parent_pid: Option<u32>,
}

impl<'a> JsonRecord<'a> {
    fn new(event: &'static str, pid: u32, tgid: u32, timestamp_ns: u64) -> Self {
        Self {
            time: chrono::Local::now().to_rfc3339(),
            event,
            pid,
            tgid,
            timestamp_ns,
            exe: None,
            cmdline: None,
            status: None,
            parent_pid: None,
        }
    }
}

/// One line per event on any writer: `[pid] cmdline` or JSON lines.
pub struct LineReporter<W: Write> {
    writer: W,
    format: OutputFormat,
    show_exe: bool,
}

impl<W: Write> LineReporter<W> {
    pub fn new(writer: W, format: OutputFormat, show_exe: bool) -> Self {
        Self {
            writer,
            format,
            show_exe,
        }
    }

    pub fn get_ref(&self) -> &W {
        &self.writer
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    fn write_json(&mut self, record: &JsonRecord<'_>) -> io::Result<()> {
        serde_json::to_writer(&mut self.writer, record)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()
    }
}

impl<W: Write> Reporter for LineReporter<W> {
    fn report_exec(&mut self, report: &ExecReport<'_>) -> io::Result<()> {
        let identity = report.identity;
        match self.format {
            OutputFormat::Text => {
                if self.show_exe {
                    writeln!(
                        self.writer,
                        "[{}] {} ({})",
                        report.pid,
                        identity.cmdline,
                        identity.exe.display()
                    )?;
                } else {
                    writeln!(self.writer, "[{}] {}", report.pid, identity.cmdline)?;
                }
                self.writer.flush()
            }
            OutputFormat::Json => {
                let mut record =
                    JsonRecord::new("exec", report.pid, report.tgid, report.timestamp_ns);
                record.exe = Some(identity.exe.display().to_string());
                record.cmdline = Some(&identity.cmdline);
                self.write_json(&record)
            }
        }
    }

    fn report_exit(&mut self, report: &ExitReport) -> io::Result<()> {
        match self.format {
            OutputFormat::Text => {
                writeln!(self.writer, "[{}] {}", report.pid, report.status())?;
                self.writer.flush()
            }
            OutputFormat::Json => {
                let mut record =
                    JsonRecord::new("exit", report.pid, report.tgid, report.timestamp_ns);
                record.status = Some(report.status());
                record.parent_pid = report.parent_pid;
                self.write_json(&record)
            }
        }
    }
}

/// Sends reports through `tracing`, for daemon mode where stdout is gone.
#[derive(Debug, Default)]
pub struct LogReporter;

impl Reporter for LogReporter {
    fn report_exec(&mut self, report: &ExecReport<'_>) -> io::Result<()> {
        info!(
            target: "proctrace::exec",
            pid = report.pid,
            exe = %report.identity.exe.display(),
            "[{}] {}",
            report.pid,
            report.identity.cmdline
        );
        Ok(())
    }

    fn report_exit(&mut self, report: &ExitReport) -> io::Result<()> {
        info!(
            target: "proctrace::exit",
            pid = report.pid,
            "[{}] {}",
            report.pid,
            report.status()
        );
        Ok(())
    }
}
