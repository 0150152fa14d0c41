//! Help text rendering. Every scope's help is a pure function of declared
//! fields, rendered once while the configuration is compiled.

use std::fmt::Write;

pub fn render_root<'a>(
    description: &str,
    groups: impl IntoIterator<Item = (&'a str, &'a str)>,
) -> String {
    let mut help = String::new();
    if !description.is_empty() {
        help.push_str(description);
        help.push('\n');
    }
    help.push_str("_*Groups:*_");
    for (id, group_description) in groups {
        let _ = write!(help, "\n`{id}`   _{group_description}_");
    }
    help
}

pub fn render_group<'a>(
    description: &str,
    hosts: impl IntoIterator<Item = &'a str>,
    commands: impl IntoIterator<Item = (&'a str, &'a str)>,
) -> String {
    let mut help = format!("{description}\n_*Hosts:*_");
    for host in hosts {
        let _ = write!(help, " `{host}`");
    }
    help.push_str("\n_*Commands:*_");
    for (id, command_description) in commands {
        let _ = write!(help, "\n`{id}`   _{command_description}_");
    }
    help
}

/// `arguments` yields `(argument id, argument help)` in declaration order.
pub fn render_command<'a>(
    group_id: &str,
    command_id: &str,
    description: &str,
    arguments: impl IntoIterator<Item = (&'a str, &'a str)>,
) -> String {
    let mut help = format!("_{description}_\n_*Format:*_\n```{group_id} [host] {command_id}");
    let mut arguments_help = String::new();
    for (id, argument_help) in arguments {
        let _ = write!(help, " <{id}>");
        let _ = write!(arguments_help, "\n{argument_help}");
    }
    help.push_str("```");
    help.push_str(&arguments_help);
    help
}

pub fn render_argument<'a>(
    id: &str,
    description: &str,
    item_names: impl IntoIterator<Item = &'a str>,
) -> String {
    let mut help = format!("`{id}`   _{description}:_");
    for name in item_names {
        let _ = write!(help, " `{name}`");
    }
    help
}
