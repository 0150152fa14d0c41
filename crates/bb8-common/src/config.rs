use std::collections::{BTreeSet, HashMap};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::duration::parse_duration;
use crate::help;
use crate::model::{
    Argument, ArgumentId, Auth, Command, Config, Group, Host, HostId, HostRef, Item, Settings,
};
use crate::template::{Template, TemplateError};

const DEFAULT_CONFIG_FILE: &str = ".bb8/config.toml";
const DEFAULT_TIMEOUT: &str = "30s";
const DEFAULT_POLL_INTERVAL: &str = "2s";

/// The declarative source exactly as written in the TOML file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawConfig {
    #[serde(default)]
    pub settings: RawSettings,
    #[serde(default, rename = "host")]
    pub hosts: Vec<RawHost>,
    #[serde(default, rename = "group")]
    pub groups: Vec<RawGroup>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawSettings {
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub timeout: String,
    #[serde(default)]
    pub max_symbols_per_message: i64,
    #[serde(default)]
    pub max_messages: i64,
    #[serde(default)]
    pub arguments_trim_cut_set: String,
    #[serde(default)]
    pub channels: Vec<String>,
    #[serde(default)]
    pub users: Vec<String>,
    #[serde(default)]
    pub admins: Vec<String>,
    #[serde(default)]
    pub strict_references: bool,
    #[serde(default)]
    pub report_truncation: bool,
    #[serde(default)]
    pub wrap_code_block: bool,
    #[serde(default)]
    pub log_level: Option<String>,
    #[serde(default)]
    pub poll_interval: String,
    #[serde(default)]
    pub poll_channels: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawHost {
    pub id: String,
    pub address: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub auth: Auth,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawGroup {
    pub id: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub hosts: Vec<String>,
    #[serde(default, rename = "command")]
    pub commands: Vec<RawCommand>,
    #[serde(default, rename = "argument")]
    pub arguments: Vec<RawArgument>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawCommand {
    pub id: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "cmdFmt")]
    pub format: String,
    #[serde(default)]
    pub arguments: Vec<String>,
    #[serde(default)]
    pub timeout: String,
    #[serde(default)]
    pub max_symbols_per_message: i64,
    #[serde(default)]
    pub max_messages: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawArgument {
    pub id: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, rename = "item")]
    pub items: Vec<Item>,
}

fn default_port() -> u16 {
    22
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config at {path}: {source}")]
    ReadFailed {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    ParseFailed(#[from] toml::de::Error),
    #[error("invalid duration for {field} ({value:?}): {reason}")]
    InvalidDuration {
        field: String,
        value: String,
        reason: String,
    },
    #[error("duplicate {kind} id '{id}' in {scope}")]
    DuplicateId {
        kind: &'static str,
        scope: String,
        id: String,
    },
    #[error("group '{group}' references unknown host '{host}'")]
    UnknownHost { group: String, host: String },
    #[error("command '{command}' in group '{group}' references unknown argument '{argument}'")]
    UnknownArgument {
        group: String,
        command: String,
        argument: String,
    },
    #[error("argument '{argument}' in group '{group}' has no items")]
    EmptyArgument { group: String, argument: String },
    #[error(
        "command '{command}' in group '{group}' has {placeholders} placeholders but {arguments} arguments"
    )]
    TemplateArity {
        group: String,
        command: String,
        placeholders: usize,
        arguments: usize,
    },
    #[error("command '{command}' in group '{group}' has an invalid cmdFmt: {source}")]
    InvalidTemplate {
        group: String,
        command: String,
        source: TemplateError,
    },
}

impl RawConfig {
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(raw)?)
    }
}

impl Config {
    /// `BB8_CONFIG` if set, otherwise `~/.bb8/config.toml`.
    pub fn resolve_path() -> PathBuf {
        if let Ok(path) = env::var("BB8_CONFIG") {
            return PathBuf::from(path);
        }

        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(DEFAULT_CONFIG_FILE)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::ReadFailed {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&raw)
    }

    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        Self::compile(RawConfig::parse(raw)?)
    }

    /// Validates references and renders every help string in one pass.
    pub fn compile(raw: RawConfig) -> Result<Self, ConfigError> {
        let settings = compile_settings(&raw.settings)?;

        let mut hosts = Vec::with_capacity(raw.hosts.len());
        let mut host_index = HashMap::new();
        for h in raw.hosts {
            if host_index.contains_key(&h.id) {
                return Err(ConfigError::DuplicateId {
                    kind: "host",
                    scope: "config".to_string(),
                    id: h.id,
                });
            }
            host_index.insert(h.id.clone(), HostId(hosts.len()));
            hosts.push(Host {
                id: h.id,
                address: h.address,
                port: h.port,
                auth: h.auth,
            });
        }

        let mut groups = Vec::with_capacity(raw.groups.len());
        let mut group_index = HashMap::new();
        for g in &raw.groups {
            if group_index.contains_key(&g.id) {
                return Err(ConfigError::DuplicateId {
                    kind: "group",
                    scope: "config".to_string(),
                    id: g.id.clone(),
                });
            }
            let group = compile_group(g, &settings, &host_index)?;
            group_index.insert(g.id.clone(), groups.len());
            groups.push(group);
        }

        let help = help::render_root(
            &settings.description,
            groups
                .iter()
                .map(|g| (g.id.as_str(), g.description.as_str())),
        );
        debug!(
            hosts = hosts.len(),
            groups = groups.len(),
            "configuration compiled"
        );

        Ok(Self {
            settings,
            hosts,
            host_index,
            groups,
            group_index,
            help,
        })
    }
}

fn compile_settings(raw: &RawSettings) -> Result<Settings, ConfigError> {
    let timeout = duration_or_default(&raw.timeout, DEFAULT_TIMEOUT, "settings.timeout")?;
    let poll_interval = duration_or_default(
        &raw.poll_interval,
        DEFAULT_POLL_INTERVAL,
        "settings.pollInterval",
    )?;
    Ok(Settings {
        token: raw.token.clone(),
        description: raw.description.clone(),
        timeout,
        max_symbols_per_message: non_negative(raw.max_symbols_per_message),
        max_messages: non_negative(raw.max_messages),
        arguments_trim_cut_set: raw.arguments_trim_cut_set.clone(),
        channels: raw.channels.iter().cloned().collect::<BTreeSet<_>>(),
        users: raw.users.iter().cloned().collect(),
        admins: raw.admins.iter().cloned().collect(),
        strict_references: raw.strict_references,
        report_truncation: raw.report_truncation,
        wrap_code_block: raw.wrap_code_block,
        log_level: raw
            .log_level
            .clone()
            .filter(|level| !level.trim().is_empty())
            .unwrap_or_else(|| "info".to_string()),
        poll_interval,
        poll_channels: dedup_in_order(&raw.poll_channels),
    })
}

fn dedup_in_order(ids: &[String]) -> Vec<String> {
    let mut seen = BTreeSet::new();
    ids.iter()
        .filter(|id| seen.insert(id.as_str()))
        .cloned()
        .collect()
}

fn compile_group(
    g: &RawGroup,
    settings: &Settings,
    host_index: &HashMap<String, HostId>,
) -> Result<Group, ConfigError> {
    let mut hosts = Vec::with_capacity(g.hosts.len());
    for id in &g.hosts {
        if hosts.iter().any(|existing: &(String, HostRef)| &existing.0 == id) {
            return Err(ConfigError::DuplicateId {
                kind: "host reference",
                scope: format!("group '{}'", g.id),
                id: id.clone(),
            });
        }
        let host_ref = match host_index.get(id) {
            Some(host_id) => HostRef::Known(*host_id),
            None if settings.strict_references => {
                return Err(ConfigError::UnknownHost {
                    group: g.id.clone(),
                    host: id.clone(),
                });
            }
            None => {
                warn!(group = %g.id, host = %id, "group references an undeclared host");
                HostRef::Dangling(id.clone())
            }
        };
        hosts.push((id.clone(), host_ref));
    }

    let mut arguments: Vec<Argument> = Vec::with_capacity(g.arguments.len());
    let mut argument_index = HashMap::new();
    for a in &g.arguments {
        if argument_index.contains_key(&a.id) {
            return Err(ConfigError::DuplicateId {
                kind: "argument",
                scope: format!("group '{}'", g.id),
                id: a.id.clone(),
            });
        }
        let mut seen = BTreeSet::new();
        for item in &a.items {
            if !seen.insert(item.name.as_str()) {
                return Err(ConfigError::DuplicateId {
                    kind: "item",
                    scope: format!("argument '{}' of group '{}'", a.id, g.id),
                    id: item.name.clone(),
                });
            }
        }
        argument_index.insert(a.id.clone(), ArgumentId(arguments.len()));
        arguments.push(Argument {
            id: a.id.clone(),
            description: a.description.clone(),
            help: help::render_argument(
                &a.id,
                &a.description,
                a.items.iter().map(|item| item.name.as_str()),
            ),
            items: a.items.clone(),
        });
    }

    let mut commands = Vec::with_capacity(g.commands.len());
    let mut command_index = HashMap::new();
    for c in &g.commands {
        if command_index.contains_key(&c.id) {
            return Err(ConfigError::DuplicateId {
                kind: "command",
                scope: format!("group '{}'", g.id),
                id: c.id.clone(),
            });
        }
        let command = compile_command(&g.id, c, settings, &arguments, &argument_index)?;
        command_index.insert(c.id.clone(), commands.len());
        commands.push(command);
    }

    let help = help::render_group(
        &g.description,
        hosts.iter().map(|(id, _)| id.as_str()),
        commands
            .iter()
            .map(|c: &Command| (c.id.as_str(), c.description.as_str())),
    );

    Ok(Group {
        id: g.id.clone(),
        description: g.description.clone(),
        help,
        hosts: hosts.into_iter().map(|(_, host_ref)| host_ref).collect(),
        commands,
        command_index,
        arguments,
    })
}

fn compile_command(
    group_id: &str,
    c: &RawCommand,
    settings: &Settings,
    arguments: &[Argument],
    argument_index: &HashMap<String, ArgumentId>,
) -> Result<Command, ConfigError> {
    let mut argument_ids = Vec::with_capacity(c.arguments.len());
    for name in &c.arguments {
        let id = *argument_index
            .get(name)
            .ok_or_else(|| ConfigError::UnknownArgument {
                group: group_id.to_string(),
                command: c.id.clone(),
                argument: name.clone(),
            })?;
        if arguments[id.0].items.is_empty() {
            return Err(ConfigError::EmptyArgument {
                group: group_id.to_string(),
                argument: name.clone(),
            });
        }
        argument_ids.push(id);
    }

    let template = Template::parse(&c.format).map_err(|source| ConfigError::InvalidTemplate {
        group: group_id.to_string(),
        command: c.id.clone(),
        source,
    })?;
    if template.placeholder_count() != argument_ids.len() {
        return Err(ConfigError::TemplateArity {
            group: group_id.to_string(),
            command: c.id.clone(),
            placeholders: template.placeholder_count(),
            arguments: argument_ids.len(),
        });
    }

    let timeout = if c.timeout.trim().is_empty() {
        settings.timeout
    } else {
        parse_field(
            &c.timeout,
            &format!("group '{group_id}' command '{}' timeout", c.id),
        )?
    };

    let help = help::render_command(
        group_id,
        &c.id,
        &c.description,
        argument_ids.iter().map(|id| {
            let argument = &arguments[id.0];
            (argument.id.as_str(), argument.help.as_str())
        }),
    );

    Ok(Command {
        id: c.id.clone(),
        description: c.description.clone(),
        help,
        template,
        arguments: argument_ids,
        timeout,
        max_symbols_per_message: override_or(
            c.max_symbols_per_message,
            settings.max_symbols_per_message,
        ),
        max_messages: override_or(c.max_messages, settings.max_messages),
    })
}

fn duration_or_default(raw: &str, default: &str, field: &str) -> Result<Duration, ConfigError> {
    if raw.trim().is_empty() {
        parse_field(default, field)
    } else {
        parse_field(raw, field)
    }
}

fn parse_field(raw: &str, field: &str) -> Result<Duration, ConfigError> {
    parse_duration(raw).map_err(|reason| ConfigError::InvalidDuration {
        field: field.to_string(),
        value: raw.to_string(),
        reason,
    })
}

fn non_negative(value: i64) -> usize {
    usize::try_from(value).unwrap_or(0)
}

fn override_or(value: i64, fallback: usize) -> usize {
    match non_negative(value) {
        0 => fallback,
        v => v,
    }
}
