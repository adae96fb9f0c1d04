//! System monitoring command implementation.

use anyhow::Result;

use crate::cli::SystemAction;
use crate::context::Context;
use crate::monitor::{LogSource, Section, SystemMonitor};

/// Run the system command
pub fn run(action: SystemAction, ctx: &Context) -> Result<()> {
    let monitor = SystemMonitor::new(ctx.runner().clone());
    match action {
        SystemAction::Resources => print_sections(&monitor.resources()),
        SystemAction::Services { failed: false } => {
            print_sections(&[monitor.running_services()])
        }
        SystemAction::Services { failed: true } => match monitor.failed_services() {
            Some(section) => print_sections(&[section]),
            None => println!("[OK] No failed services"),
        },
        SystemAction::Network => print_sections(&monitor.network()),
        SystemAction::Logs { source, lines } => {
            let source: LogSource = source.parse()?;
            print_sections(&monitor.logs(source, lines));
        }
    }
    Ok(())
}

fn print_sections(sections: &[Section]) {
    for section in sections {
        println!("== {} ==", section.title);
        let body = section.body.trim_end();
        if body.is_empty() {
            println!("(no output)");
        } else {
            println!("{}", body);
        }
        println!();
    }
}
