//! Read-only system views: resources, services, network and recent logs.
//!
//! Every view is a list of titled sections holding raw command output. The
//! commands never change anything; the ones that read root-only state
//! (`ss -p`, journals, log files, dmesg) run elevated.

use std::fmt;
use std::str::FromStr;

use crate::cmd_abstraction::{CommandResult, Runner};
use crate::error::ZappyError;

/// Lines of `top` kept for the CPU summary.
const TOP_LINES: usize = 5;
/// Lines of `ss -s` kept for the connection summary.
const SS_SUMMARY_LINES: usize = 10;
/// Lines shown per nginx log.
const NGINX_LOG_LINES: usize = 20;

const SSH_LOG_FILES: [&str; 2] = ["/var/log/auth.log", "/var/log/secure"];

/// One titled block of command output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub title: String,
    pub body: String,
}

impl Section {
    fn new(title: &str, body: impl Into<String>) -> Self {
        Self {
            title: title.to_string(),
            body: body.into(),
        }
    }
}

/// Which log `logs` shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogSource {
    System,
    Nginx,
    Ssh,
    Kernel,
}

impl fmt::Display for LogSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LogSource::System => "system",
            LogSource::Nginx => "nginx",
            LogSource::Ssh => "ssh",
            LogSource::Kernel => "kernel",
        })
    }
}

impl FromStr for LogSource {
    type Err = ZappyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "system" | "journal" => Ok(LogSource::System),
            "nginx" => Ok(LogSource::Nginx),
            "ssh" | "auth" => Ok(LogSource::Ssh),
            "kernel" | "dmesg" => Ok(LogSource::Kernel),
            other => Err(ZappyError::InvalidParameter(format!(
                "unknown log '{}' (system, nginx, ssh, kernel)",
                other
            ))),
        }
    }
}

pub struct SystemMonitor {
    runner: Runner,
}

impl SystemMonitor {
    pub fn new(runner: Runner) -> Self {
        Self { runner }
    }

    /// CPU, memory, disk and load.
    pub fn resources(&self) -> Vec<Section> {
        vec![
            Section::new(
                "CPU",
                head(&self.output(&["top", "-b", "-n", "1"], false), TOP_LINES),
            ),
            Section::new("Memory", self.output(&["free", "-h"], false)),
            Section::new("Disk", self.output(&["df", "-h", "/"], false)),
            Section::new("Load", self.output(&["uptime"], false)),
        ]
    }

    /// Running service units.
    pub fn running_services(&self) -> Section {
        Section::new("Running services", self.list_units("running"))
    }

    /// Failed service units, `None` when there are none.
    pub fn failed_services(&self) -> Option<Section> {
        let listing = self.list_units("failed");
        if listing.trim().is_empty() || listing.contains("0 loaded units") {
            None
        } else {
            Some(Section::new("Failed services", listing))
        }
    }

    /// Listening sockets, a connection summary and the host's addresses.
    pub fn network(&self) -> Vec<Section> {
        vec![
            Section::new("Listening ports", self.output(&["ss", "-tulnp"], true)),
            Section::new(
                "Connection summary",
                head(&self.output(&["ss", "-s"], false), SS_SUMMARY_LINES),
            ),
            Section::new("IP addresses", self.output(&["hostname", "-I"], false)),
        ]
    }

    /// The last `lines` lines of one log.
    pub fn logs(&self, source: LogSource, lines: usize) -> Vec<Section> {
        let count = lines.to_string();
        match source {
            LogSource::System => vec![Section::new(
                "System journal",
                self.output(&["journalctl", "-n", &count, "--no-pager"], true),
            )],
            LogSource::Nginx => {
                let n = NGINX_LOG_LINES.to_string();
                vec![
                    Section::new(
                        "nginx access log",
                        self.output(&["tail", "-n", &n, "/var/log/nginx/access.log"], true),
                    ),
                    Section::new(
                        "nginx error log",
                        self.output(&["tail", "-n", &n, "/var/log/nginx/error.log"], true),
                    ),
                ]
            }
            LogSource::Ssh => vec![Section::new("SSH authentication", self.ssh_log(&count))],
            LogSource::Kernel => {
                let dmesg = self.output(&["dmesg", "--time-format=reltime"], true);
                vec![Section::new("Kernel messages", last_lines(&dmesg, lines))]
            }
        }
    }

    /// The first non-empty auth log file, else the sshd journal.
    fn ssh_log(&self, count: &str) -> String {
        for file in SSH_LOG_FILES {
            let result = self.runner.run(&["tail", "-n", count, file], true);
            if result.success && !result.stdout.trim().is_empty() {
                return result.stdout;
            }
        }
        self.output(
            &["journalctl", "-u", "sshd", "-u", "ssh", "-n", count, "--no-pager"],
            true,
        )
    }

    fn list_units(&self, state: &str) -> String {
        let state = format!("--state={}", state);
        self.output(
            &["systemctl", "list-units", "--type=service", &state, "--no-pager"],
            true,
        )
    }

    fn output(&self, argv: &[&str], elevated: bool) -> String {
        output_of(self.runner.run(argv, elevated))
    }
}

/// Output on success, the error text otherwise.
fn output_of(result: CommandResult) -> String {
    if result.success {
        result.stdout
    } else {
        result.output_text().to_string()
    }
}

fn head(text: &str, n: usize) -> String {
    text.lines().take(n).collect::<Vec<_>>().join("\n")
}

fn last_lines(text: &str, n: usize) -> String {
    let lines: Vec<&str> = text.lines().collect();
    lines[lines.len().saturating_sub(n)..].join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cmd_abstraction::{args_to_strings, MockCommandExecutor, Privilege};
    use mockall::Sequence;
    use std::sync::Arc;

    fn monitor(mock: MockCommandExecutor) -> SystemMonitor {
        SystemMonitor::new(Runner::new(Arc::new(mock), Privilege::Sudo))
    }

    fn expect(mock: &mut MockCommandExecutor, cmd: &'static str, argv: &'static [&'static str], out: CommandResult) {
        mock.expect_execute()
            .withf(move |c, args, _| c == cmd && args == args_to_strings(argv).as_slice())
            .times(1)
            .returning(move |_, _, _| Ok(out.clone()));
    }

    #[test]
    fn test_failed_services_none() {
        let mut mock = MockCommandExecutor::new();
        expect(
            &mut mock,
            "sudo",
            &["systemctl", "list-units", "--type=service", "--state=failed", "--no-pager"],
            CommandResult::ok("  UNIT LOAD ACTIVE SUB DESCRIPTION\n0 loaded units listed.\n"),
        );
        assert!(monitor(mock).failed_services().is_none());
    }

    #[test]
    fn test_failed_services_listed() {
        let mut mock = MockCommandExecutor::new();
        expect(
            &mut mock,
            "sudo",
            &["systemctl", "list-units", "--type=service", "--state=failed", "--no-pager"],
            CommandResult::ok("● nginx.service loaded failed failed A high performance web server\n1 loaded units listed.\n"),
        );
        let section = monitor(mock).failed_services().unwrap();
        assert!(section.body.contains("nginx.service"));
    }

    #[test]
    fn test_resources_trims_top() {
        let mut mock = MockCommandExecutor::new();
        let top = (1..=12).map(|i| format!("line {}", i)).collect::<Vec<_>>().join("\n");
        expect(&mut mock, "top", &["-b", "-n", "1"], CommandResult::ok(top));
        expect(&mut mock, "free", &["-h"], CommandResult::ok("Mem: 2.0Gi"));
        expect(&mut mock, "df", &["-h", "/"], CommandResult::ok("/dev/vda1 40G"));
        expect(&mut mock, "uptime", &[], CommandResult::ok("load average: 0.01"));

        let sections = monitor(mock).resources();
        assert_eq!(sections.len(), 4);
        assert_eq!(sections[0].body, "line 1\nline 2\nline 3\nline 4\nline 5");
        assert_eq!(sections[3].title, "Load");
    }

    #[test]
    fn test_network_argv() {
        let mut mock = MockCommandExecutor::new();
        expect(&mut mock, "sudo", &["ss", "-tulnp"], CommandResult::ok("LISTEN 0.0.0.0:22"));
        expect(&mut mock, "ss", &["-s"], CommandResult::ok("Total: 120"));
        expect(&mut mock, "hostname", &["-I"], CommandResult::ok("203.0.113.7"));

        let sections = monitor(mock).network();
        assert!(sections[0].body.contains(":22"));
        assert_eq!(sections[2].body, "203.0.113.7");
    }

    #[test]
    fn test_system_journal_argv() {
        let mut mock = MockCommandExecutor::new();
        expect(
            &mut mock,
            "sudo",
            &["journalctl", "-n", "50", "--no-pager"],
            CommandResult::ok("Oct 16 sshd[1]: Accepted publickey"),
        );
        let sections = monitor(mock).logs(LogSource::System, 50);
        assert!(sections[0].body.contains("Accepted publickey"));
    }

    #[test]
    fn test_ssh_log_falls_back_to_journal() {
        let mut mock = MockCommandExecutor::new();
        let mut seq = Sequence::new();
        mock.expect_execute()
            .withf(|c, args, _| c == "sudo" && args == args_to_strings(&["tail", "-n", "30", "/var/log/auth.log"]).as_slice())
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Ok(CommandResult::failed("tail: cannot open '/var/log/auth.log'")));
        mock.expect_execute()
            .withf(|c, args, _| c == "sudo" && args == args_to_strings(&["tail", "-n", "30", "/var/log/secure"]).as_slice())
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Ok(CommandResult::ok("")));
        mock.expect_execute()
            .withf(|c, args, _| {
                c == "sudo"
                    && args
                        == args_to_strings(&["journalctl", "-u", "sshd", "-u", "ssh", "-n", "30", "--no-pager"])
                            .as_slice()
            })
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Ok(CommandResult::ok("sshd[42]: Failed password for root")));

        let sections = monitor(mock).logs(LogSource::Ssh, 30);
        assert_eq!(sections[0].body, "sshd[42]: Failed password for root");
    }

    #[test]
    fn test_kernel_log_keeps_last_lines() {
        let mut mock = MockCommandExecutor::new();
        expect(
            &mut mock,
            "sudo",
            &["dmesg", "--time-format=reltime"],
            CommandResult::ok("a\nb\nc\nd\n"),
        );
        let sections = monitor(mock).logs(LogSource::Kernel, 2);
        assert_eq!(sections[0].body, "c\nd");
    }

    #[test]
    fn test_failed_command_shows_error_text() {
        let mut mock = MockCommandExecutor::new();
        expect(&mut mock, "sudo", &["ss", "-tulnp"], CommandResult::ok(""));
        expect(&mut mock, "ss", &["-s"], CommandResult::ok(""));
        expect(&mut mock, "hostname", &["-I"], CommandResult::failed("hostname: invalid option -- 'I'"));
        let sections = monitor(mock).network();
        assert!(sections[2].body.contains("invalid option"));
    }

    #[test]
    fn test_log_source_parse() {
        assert_eq!("dmesg".parse::<LogSource>().unwrap(), LogSource::Kernel);
        assert_eq!("Auth".parse::<LogSource>().unwrap(), LogSource::Ssh);
        assert!(matches!(
            "apache".parse::<LogSource>(),
            Err(ZappyError::InvalidParameter(_))
        ));
    }
}
