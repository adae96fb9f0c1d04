//! CLI command implementations.

pub mod cert;
pub mod fail2ban;
pub mod firewall;
pub mod init;
pub mod nginx;
pub mod packages;
pub mod ssh;
pub mod status;
pub mod system;
pub mod updates;

use anyhow::Result;

use crate::cmd_abstraction::CommandResult;

/// Print whatever the command wrote.
pub(crate) fn print_output(result: &CommandResult) {
    let text = result.output_text().trim_end();
    if !text.is_empty() {
        println!("{}", text);
    }
}

/// Print `[OK] <done>` on success, or fail with the command's diagnostics.
pub(crate) fn report(result: CommandResult, command: &str, done: &str) -> Result<()> {
    result.check(command)?;
    println!("[OK] {}", done);
    Ok(())
}

pub(crate) fn mark(ok: bool) -> &'static str {
    if ok {
        "[OK]  "
    } else {
        "[WARN]"
    }
}
