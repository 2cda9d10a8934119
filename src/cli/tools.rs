//! Tool listing command.

use std::sync::Arc;

use xiaoclaw::config::Config;
use xiaoclaw::security::{AuditLog, SecurityGate};
use xiaoclaw::tools::builtin_registry;

pub(crate) fn cmd_tools(config: &Config) {
    // Listing only; nothing runs, so nothing needs auditing.
    let gate = Arc::new(SecurityGate::new(&config.security, AuditLog::disabled()));
    let registry = builtin_registry(config, gate, None);

    println!("Available tools:");
    println!();
    for def in registry.definitions() {
        println!("  {:<14} {}", def.name, def.description);
    }

    let mut disabled: Vec<&String> = config
        .tools
        .disabled
        .iter()
        .filter(|name| registry.is_disabled(name))
        .collect();
    if !disabled.is_empty() {
        disabled.sort();
        println!();
        println!(
            "Disabled: {}",
            disabled
                .iter()
                .map(|s| s.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );
    }
}
