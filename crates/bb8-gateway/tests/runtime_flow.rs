use std::cell::RefCell;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, bail};
use bb8_common::{Config, Host};
use bb8_exec::RemoteExecutor;
use bb8_gateway::{BotRuntime, InboundMessage};
use tempfile::tempdir;

const CONFIG: &str = r#"
[settings]
description = "ops bot"
timeout = "45s"
users = ["U1", "U2"]
admins = ["ROOT"]
channels = ["C1"]
argumentsTrimCutSet = "`"
maxSymbolsPerMessage = 12
maxMessages = 5

[[host]]
id = "web1"
address = "10.1.0.1"
[host.auth]
type = "password"
username = "ops"
password = "secret"

[[group]]
id = "web"
description = "Web tier"
hosts = ["web1"]

[[group.command]]
id = "logs"
description = "Tail logs"
cmdFmt = "tail -n %s /var/log/app.log"
arguments = ["lines"]
timeout = "5s"

[[group.command]]
id = "broken"
description = "Always fails"
cmdFmt = "false"

[[group.argument]]
id = "lines"
description = "Line count"
[[group.argument.item]]
name = "ten"
value = "10"
"#;

#[derive(Default)]
struct RecordingExecutor {
    calls: RefCell<Vec<(String, String, Duration)>>,
    output: String,
}

impl RemoteExecutor for RecordingExecutor {
    fn execute(&self, host: &Host, command: &str, timeout: Duration) -> Result<String> {
        self.calls
            .borrow_mut()
            .push((host.id.clone(), command.to_string(), timeout));
        if command == "false" {
            bail!("error calling ssh command: exit status: 1, out: ");
        }
        Ok(self.output.clone())
    }
}

fn runtime(output: &str) -> BotRuntime<RecordingExecutor> {
    let tmp = tempdir().expect("tempdir");
    let path = tmp.path().join("config.toml");
    std::fs::write(&path, CONFIG).expect("write config");
    let config = Config::load(&path).expect("load config");
    BotRuntime::new(
        Arc::new(config),
        RecordingExecutor {
            output: output.to_string(),
            ..RecordingExecutor::default()
        },
    )
}

#[test]
fn executes_resolved_command_and_chunks_output() {
    let runtime = runtime("0123456789\n0123456789");
    let replies = runtime
        .handle(&InboundMessage::new("U1", "C1", "<@42> web logs `ten`"), "42")
        .expect("addressed to bot");
    assert_eq!(replies, vec!["0123456789", "0123456789"]);
}

#[test]
fn ignores_messages_without_mention() {
    let runtime = runtime("unused");
    assert!(
        runtime
            .handle(&InboundMessage::new("U1", "C1", "web logs ten"), "42")
            .is_none()
    );
}

#[test]
fn denies_unknown_users_and_channels() {
    let runtime = runtime("unused");
    assert_eq!(
        runtime.handle_action("U9", "C1", "web logs ten"),
        vec!["You don't have enough permissions"]
    );
    assert_eq!(
        runtime.handle_action("U1", "C9", "web logs ten"),
        vec!["This channel doesn't have enough permissions"]
    );
    let replies = runtime.handle_action("ROOT", "C9", "web logs ten");
    assert_eq!(replies, vec!["unused"]);
}

#[test]
fn help_is_returned_without_execution() {
    let runtime = runtime("unused");
    let replies = runtime.handle_action("U1", "C1", "  ");
    assert_eq!(replies, vec![runtime.config().help().to_string()]);

    let replies = runtime.handle_action("U1", "C1", "web logs");
    assert!(replies[0].starts_with("*1* argument not found\n_Tail logs_"));
}

#[test]
fn passes_command_timeout_to_executor() {
    let runtime = runtime("ok");
    runtime.handle_action("U2", "C1", "web logs ten");
    let runtime_calls = runtime_calls(&runtime);
    assert_eq!(
        runtime_calls,
        vec![(
            "web1".to_string(),
            "tail -n 10 /var/log/app.log".to_string(),
            Duration::from_secs(5)
        )]
    );
}

#[test]
fn reports_execution_errors() {
    let runtime = runtime("unused");
    let replies = runtime.handle_action("U1", "C1", "web broken");
    assert_eq!(replies.len(), 1);
    assert!(replies[0].starts_with("error execution action: error calling ssh command"));
}

fn runtime_calls(runtime: &BotRuntime<RecordingExecutor>) -> Vec<(String, String, Duration)> {
    runtime.executor().calls.borrow().clone()
}

struct NoisyFailure;

impl RemoteExecutor for NoisyFailure {
    fn execute(&self, _host: &Host, _command: &str, _timeout: Duration) -> Result<String> {
        bail!(
            "error calling ssh command: exit status: 2, out: {}",
            "permission denied\n".repeat(300)
        )
    }
}

fn crowded_config() -> Config {
    let mut raw = String::from(
        r#"
[settings]
description = "ops bot"

[[host]]
id = "h1"
address = "10.2.0.1"
[host.auth]
type = "password"
username = "ops"
password = "secret"
"#,
    );
    for i in 0..80 {
        raw.push_str(&format!(
            "\n[[group]]\nid = \"group{i:02}\"\ndescription = \"{}\"\nhosts = [\"h1\"]\n\
             [[group.command]]\nid = \"fail\"\ncmdFmt = \"false\"\n",
            "a rather long group description ".repeat(2)
        ));
    }
    Config::parse(&raw).expect("crowded config")
}

#[test]
fn help_and_errors_are_split_to_the_transport_limit() {
    let runtime =
        BotRuntime::new(Arc::new(crowded_config()), NoisyFailure).with_transport_limit(2000);
    assert!(runtime.config().help().chars().count() > 2000);

    let help = runtime.handle_action("U1", "C1", "help");
    assert!(help.len() > 1);
    assert!(help.iter().all(|m| m.chars().count() <= 2000));
    assert!(help[0].starts_with("ops bot\n_*Groups:*_"));
    assert_eq!(help.join("\n"), runtime.config().help());

    let errors = runtime.handle_action("U1", "C1", "group07 fail");
    assert!(errors.len() > 1);
    assert!(errors.iter().all(|m| m.chars().count() <= 2000));
    assert!(errors[0].starts_with("error execution action: error calling ssh command"));
}
