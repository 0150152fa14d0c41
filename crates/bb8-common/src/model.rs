use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

use serde::Deserialize;

use crate::template::Template;

/// Compiled, read-only configuration. Hosts live in one arena and groups
/// refer to them by index, so a host shared by several groups is stored once.
#[derive(Debug, Clone)]
pub struct Config {
    pub(crate) settings: Settings,
    pub(crate) hosts: Vec<Host>,
    pub(crate) host_index: HashMap<String, HostId>,
    pub(crate) groups: Vec<Group>,
    pub(crate) group_index: HashMap<String, usize>,
    pub(crate) help: String,
}

impl Config {
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Root help: settings description followed by one line per group.
    pub fn help(&self) -> &str {
        &self.help
    }

    pub fn groups(&self) -> &[Group] {
        &self.groups
    }

    pub fn group(&self, id: &str) -> Option<&Group> {
        self.group_index.get(id).map(|idx| &self.groups[*idx])
    }

    pub fn hosts(&self) -> &[Host] {
        &self.hosts
    }

    pub fn host(&self, id: HostId) -> &Host {
        &self.hosts[id.0]
    }

    pub fn host_by_id(&self, id: &str) -> Option<&Host> {
        self.host_index.get(id).map(|host_id| self.host(*host_id))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub token: String,
    pub description: String,
    pub timeout: Duration,
    pub max_symbols_per_message: usize,
    pub max_messages: usize,
    pub arguments_trim_cut_set: String,
    pub channels: BTreeSet<String>,
    pub users: BTreeSet<String>,
    pub admins: BTreeSet<String>,
    pub strict_references: bool,
    pub report_truncation: bool,
    pub wrap_code_block: bool,
    pub log_level: String,
    pub poll_interval: Duration,
    /// Channels `serve` reads. Independent of the `channels` allow-list.
    pub poll_channels: Vec<String>,
}

impl Settings {
    /// `pollChannels` when set, else the `channels` allow-list.
    pub fn polled_channels(&self) -> Vec<String> {
        if self.poll_channels.is_empty() {
            self.channels.iter().cloned().collect()
        } else {
            self.poll_channels.clone()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HostId(pub(crate) usize);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Host {
    pub id: String,
    pub address: String,
    pub port: u16,
    pub auth: Auth,
}

impl Host {
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Auth {
    Password {
        username: String,
        #[serde(default)]
        password: String,
    },
    #[serde(rename = "publickey", rename_all = "camelCase")]
    PublicKey {
        username: String,
        private_key_path: String,
        #[serde(default)]
        passphrase: String,
    },
}

impl Auth {
    pub fn username(&self) -> &str {
        match self {
            Self::Password { username, .. } | Self::PublicKey { username, .. } => username,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Password { .. } => "password",
            Self::PublicKey { .. } => "publickey",
        }
    }
}

/// A group's view of one declared host id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostRef {
    Known(HostId),
    /// Declared in the group but absent from `[[host]]`; kept when
    /// `strictReferences` is off and reported at resolution time.
    Dangling(String),
}

impl HostRef {
    pub fn id<'a>(&'a self, config: &'a Config) -> &'a str {
        match self {
            Self::Known(host_id) => &config.host(*host_id).id,
            Self::Dangling(id) => id,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Group {
    pub id: String,
    pub description: String,
    pub help: String,
    pub(crate) hosts: Vec<HostRef>,
    pub(crate) commands: Vec<Command>,
    pub(crate) command_index: HashMap<String, usize>,
    pub(crate) arguments: Vec<Argument>,
}

impl Group {
    pub fn host_refs(&self) -> &[HostRef] {
        &self.hosts
    }

    /// Finds a host this group exposes. Dangling references never match.
    pub fn exposed_host<'a>(&self, config: &'a Config, id: &str) -> Option<&'a Host> {
        self.hosts.iter().find_map(|host_ref| match host_ref {
            HostRef::Known(host_id) if config.host(*host_id).id == id => {
                Some(config.host(*host_id))
            }
            _ => None,
        })
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn command(&self, id: &str) -> Option<&Command> {
        self.command_index.get(id).map(|idx| &self.commands[*idx])
    }

    pub fn arguments(&self) -> &[Argument] {
        &self.arguments
    }

    pub fn argument(&self, id: ArgumentId) -> &Argument {
        &self.arguments[id.0]
    }
}

#[derive(Debug, Clone)]
pub struct Command {
    pub id: String,
    pub description: String,
    pub help: String,
    pub template: Template,
    /// Substitution and token-position order.
    pub arguments: Vec<ArgumentId>,
    pub timeout: Duration,
    pub max_symbols_per_message: usize,
    pub max_messages: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ArgumentId(pub(crate) usize);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Argument {
    pub id: String,
    pub description: String,
    pub help: String,
    pub items: Vec<Item>,
}

impl Argument {
    /// First item whose display name equals `name` exactly.
    pub fn find_item(&self, name: &str) -> Option<&Item> {
        self.items.iter().find(|item| item.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Item {
    pub name: String,
    pub value: String,
}
