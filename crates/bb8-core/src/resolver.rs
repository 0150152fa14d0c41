//! Action resolution.
//!
//! An action is tokenized on whitespace and walked through four states:
//! `ExpectGroup -> ExpectHostOrCommand -> ExpectCommand -> ExpectArguments`.
//! Each state has one decision function that either advances or stops with
//! the help text of the scope where resolution ended.

use bb8_common::{Command, Config, Group, Host, HostRef};
use thiserror::Error;
use tracing::debug;

use crate::format::{FormatError, format_command};

const HELP_TOKEN: &str = "help";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Root,
    Group,
    Command,
    /// A missing or unknown argument value. The text is the command's help.
    Argument,
}

impl Scope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Root => "root",
            Self::Group => "group",
            Self::Command => "command",
            Self::Argument => "argument",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    /// Help or error text for the scope where resolution stopped.
    #[error("{text}")]
    Help { scope: Scope, text: String },
    #[error(transparent)]
    Format(#[from] FormatError),
}

impl Rejection {
    fn help(scope: Scope, text: impl Into<String>) -> Self {
        Self::Help {
            scope,
            text: text.into(),
        }
    }

    pub fn scope(&self) -> Option<Scope> {
        match self {
            Self::Help { scope, .. } => Some(*scope),
            Self::Format(_) => None,
        }
    }
}

/// A fully resolved action, ready to hand to a remote executor.
#[derive(Debug, Clone)]
pub struct Invocation<'c> {
    pub raw_command: String,
    pub group: &'c Group,
    pub command: &'c Command,
    pub host: &'c Host,
}

enum State<'c> {
    ExpectGroup,
    ExpectHostOrCommand {
        group: &'c Group,
    },
    ExpectCommand {
        group: &'c Group,
        host: &'c Host,
        cmd_index: usize,
    },
    ExpectArguments {
        group: &'c Group,
        host: &'c Host,
        command: &'c Command,
        cmd_index: usize,
    },
}

enum Step<'c> {
    Next(State<'c>),
    Done(Result<Invocation<'c>, Rejection>),
}

pub fn resolve<'c>(action: &str, config: &'c Config) -> Result<Invocation<'c>, Rejection> {
    debug!(action, "resolving action");
    let resolver = Resolver {
        config,
        tokens: action.split_whitespace().collect(),
    };
    let outcome = resolver.run();
    match &outcome {
        Ok(invocation) => debug!(
            group = %invocation.group.id,
            command = %invocation.command.id,
            host = %invocation.host.id,
            "action resolved"
        ),
        Err(rejection) => debug!(
            scope = rejection.scope().map(|s| s.as_str()).unwrap_or("format"),
            "action rejected"
        ),
    }
    outcome
}

struct Resolver<'c, 't> {
    config: &'c Config,
    tokens: Vec<&'t str>,
}

impl<'c> Resolver<'c, '_> {
    fn run(&self) -> Result<Invocation<'c>, Rejection> {
        let mut state = State::ExpectGroup;
        loop {
            let step = match state {
                State::ExpectGroup => self.expect_group(),
                State::ExpectHostOrCommand { group } => self.expect_host_or_command(group),
                State::ExpectCommand {
                    group,
                    host,
                    cmd_index,
                } => self.expect_command(group, host, cmd_index),
                State::ExpectArguments {
                    group,
                    host,
                    command,
                    cmd_index,
                } => self.expect_arguments(group, host, command, cmd_index),
            };
            match step {
                Step::Next(next) => state = next,
                Step::Done(outcome) => return outcome,
            }
        }
    }

    fn token(&self, idx: usize) -> Option<&str> {
        self.tokens.get(idx).copied()
    }

    fn is_help_at(&self, idx: usize) -> bool {
        self.token(idx) == Some(HELP_TOKEN)
    }

    fn root_help(&self) -> Step<'c> {
        Step::Done(Err(Rejection::help(Scope::Root, self.config.help())))
    }

    fn expect_group(&self) -> Step<'c> {
        let Some(group_id) = self.token(0) else {
            return self.root_help();
        };
        if self.tokens.len() == 1 && group_id == HELP_TOKEN {
            return self.root_help();
        }
        let Some(group) = self.config.group(group_id) else {
            return Step::Done(Err(Rejection::help(
                Scope::Root,
                format!("group *{group_id}* not found\n{}", self.config.help()),
            )));
        };
        if self.tokens.len() < 2 {
            return Step::Done(Err(Rejection::help(Scope::Group, group.help.as_str())));
        }
        Step::Next(State::ExpectHostOrCommand { group })
    }

    fn expect_host_or_command(&self, group: &'c Group) -> Step<'c> {
        let host_or_command = self.tokens[1];

        // `<group> <command> help` answers before any host is considered.
        if self.tokens.len() == 3 && self.is_help_at(2) {
            if let Some(command) = group.command(host_or_command) {
                return Step::Done(Err(Rejection::help(Scope::Command, command.help.as_str())));
            }
        }

        let host = match group.host_refs() {
            [] => {
                return Step::Done(Err(Rejection::help(
                    Scope::Group,
                    format!("hosts for group *{}* not found\n{}", group.id, group.help),
                )));
            }
            [HostRef::Known(host_id)] => self.config.host(*host_id),
            [HostRef::Dangling(_)] => {
                return Step::Done(Err(Rejection::help(
                    Scope::Root,
                    format!(
                        "host or command *{host_or_command}* not found\n{}",
                        self.config.help()
                    ),
                )));
            }
            _ => match group.exposed_host(self.config, host_or_command) {
                Some(host) => host,
                None => {
                    return Step::Done(Err(Rejection::help(
                        Scope::Group,
                        format!("host *{host_or_command}* not found,\n{}", group.help),
                    )));
                }
            },
        };

        let single_host = group.host_refs().len() == 1;
        let names_command = single_host && group.command(host_or_command).is_some();
        if host.id != host_or_command || names_command {
            return Step::Next(State::ExpectCommand {
                group,
                host,
                cmd_index: 1,
            });
        }
        if self.tokens.len() < 3 {
            return Step::Done(Err(Rejection::help(
                Scope::Group,
                format!("command *{host_or_command}* not found\n{}", group.help),
            )));
        }
        Step::Next(State::ExpectCommand {
            group,
            host,
            cmd_index: 2,
        })
    }

    fn expect_command(&self, group: &'c Group, host: &'c Host, cmd_index: usize) -> Step<'c> {
        let command_id = self.tokens[cmd_index];
        let Some(command) = group.command(command_id) else {
            return Step::Done(Err(Rejection::help(
                Scope::Group,
                format!("command *{command_id}* not found\n{}", group.help),
            )));
        };
        if self.is_help_at(cmd_index + 1) {
            return Step::Done(Err(Rejection::help(Scope::Command, command.help.as_str())));
        }
        Step::Next(State::ExpectArguments {
            group,
            host,
            command,
            cmd_index,
        })
    }

    fn expect_arguments(
        &self,
        group: &'c Group,
        host: &'c Host,
        command: &'c Command,
        cmd_index: usize,
    ) -> Step<'c> {
        let cut_set = self.config.settings().arguments_trim_cut_set.as_str();
        let mut values = Vec::with_capacity(command.arguments.len());
        for (position, argument_id) in command.arguments.iter().enumerate() {
            let argument = group.argument(*argument_id);
            let Some(token) = self.token(cmd_index + 1 + position) else {
                return Step::Done(Err(Rejection::help(
                    Scope::Argument,
                    format!("*{}* argument not found\n{}", position + 1, command.help),
                )));
            };
            let wanted = trim_cut_set(token, cut_set);
            let Some(item) = argument.find_item(wanted) else {
                return Step::Done(Err(Rejection::help(
                    Scope::Argument,
                    format!("argument value *{token}* not found\n{}", command.help),
                )));
            };
            values.push(item.value.as_str());
        }

        let outcome = format_command(&command.template, &values)
            .map(|raw_command| Invocation {
                raw_command,
                group,
                command,
                host,
            })
            .map_err(Rejection::from);
        Step::Done(outcome)
    }
}

fn trim_cut_set<'a>(token: &'a str, cut_set: &str) -> &'a str {
    if cut_set.is_empty() {
        return token;
    }
    token.trim_matches(|c: char| cut_set.contains(c))
}
