//! Transport launch recipes.
//!
//! Every way of reaching a console is a child process attached to a PTY: a
//! local shell, an `ssh` client, a `telnet` client, a serial terminal
//! program, or any other bridge command. A recipe knows the command line,
//! what "the session is live" looks like and which messages mean the
//! connection failed.

use std::collections::BTreeMap;

use crate::pattern::Pattern;
use crate::result::{ConfigError, PatternError};

/// Default SSH keepalive interval in seconds.
const DEFAULT_SSH_KEEPALIVE: u32 = 30;

/// Messages that mean the connection attempt is dead.
const COMMON_FAILURES: &[&str] = &[
    "Connection refused",
    "No route to host",
    "Connection timed out",
    "Network is unreachable",
    "Could not resolve hostname",
    "Name or service not known",
];

/// How to launch a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportRecipe {
    /// Local subshell
    Local {
        /// Shell program
        shell: String,
        /// Shell arguments
        args: Vec<String>,
    },
    /// OpenSSH client
    Ssh {
        /// Target host
        host: String,
        /// Target port
        port: u16,
        /// Login user
        user: Option<String>,
        /// Private key file
        identity: Option<String>,
        /// ServerAliveInterval in seconds
        keepalive: u32,
        /// Extra `-o` options
        options: Vec<String>,
    },
    /// Telnet client, e.g. to a terminal server port
    Telnet {
        /// Target host
        host: String,
        /// Target port
        port: u16,
    },
    /// Serial terminal program bridging a local tty
    Serial {
        /// tty device path
        device: String,
        /// Baud rate
        baud: u32,
        /// Bridge program: picocom, microcom or screen
        bridge: String,
    },
    /// Any other bridge command
    Command {
        /// Program to run
        program: String,
        /// Arguments
        args: Vec<String>,
    },
}

impl TransportRecipe {
    /// Select a recipe by tag and read its parameters.
    ///
    /// Tags: `local`, `ssh`, `telnet`, `serial`, `command`.
    pub fn from_tag(tag: &str, params: &BTreeMap<String, String>) -> Result<Self, ConfigError> {
        let get = |key: &str| params.get(key).map(String::as_str);
        let require = |key: &str| {
            get(key).map(str::to_string).ok_or_else(|| ConfigError::MissingParam {
                recipe: tag.to_string(),
                param: key.to_string(),
            })
        };

        let recipe = match tag {
            "local" => {
                let mut words = split_words(get("shell").unwrap_or("sh"));
                let shell = if words.is_empty() {
                    "sh".to_string()
                } else {
                    words.remove(0)
                };
                TransportRecipe::Local { shell, args: words }
            }
            "ssh" => TransportRecipe::Ssh {
                host: require("host")?,
                port: parse_param(params, "port")?.unwrap_or(22),
                user: get("user").map(str::to_string),
                identity: get("identity").map(str::to_string),
                keepalive: parse_param(params, "keepalive")?.unwrap_or(DEFAULT_SSH_KEEPALIVE),
                options: get("options")
                    .map(|o| {
                        o.split(',')
                            .map(str::trim)
                            .filter(|s| !s.is_empty())
                            .map(str::to_string)
                            .collect()
                    })
                    .unwrap_or_default(),
            },
            "telnet" => TransportRecipe::Telnet {
                host: require("host")?,
                port: parse_param(params, "port")?.unwrap_or(23),
            },
            "serial" => {
                let bridge = get("bridge").unwrap_or("picocom").to_string();
                if !matches!(bridge.as_str(), "picocom" | "microcom" | "screen") {
                    return Err(ConfigError::InvalidParam {
                        param: "bridge".into(),
                        value: bridge,
                    });
                }
                TransportRecipe::Serial {
                    device: require("device")?,
                    baud: parse_param(params, "baud")?.unwrap_or(115_200),
                    bridge,
                }
            }
            "command" => {
                let mut words = split_words(&require("command")?);
                if words.is_empty() {
                    return Err(ConfigError::InvalidParam {
                        param: "command".into(),
                        value: String::new(),
                    });
                }
                let program = words.remove(0);
                TransportRecipe::Command {
                    program,
                    args: words,
                }
            }
            other => return Err(ConfigError::UnknownTransport(other.to_string())),
        };
        Ok(recipe)
    }

    /// The recipe's tag.
    pub fn tag(&self) -> &'static str {
        match self {
            TransportRecipe::Local { .. } => "local",
            TransportRecipe::Ssh { .. } => "ssh",
            TransportRecipe::Telnet { .. } => "telnet",
            TransportRecipe::Serial { .. } => "serial",
            TransportRecipe::Command { .. } => "command",
        }
    }

    /// Program and arguments to spawn.
    pub fn command_line(&self) -> (String, Vec<String>) {
        match self {
            TransportRecipe::Local { shell, args } => (shell.clone(), args.clone()),
            TransportRecipe::Ssh {
                host,
                port,
                user,
                identity,
                keepalive,
                options,
            } => {
                let mut args: Vec<String> = vec![
                    "-o".into(),
                    "StrictHostKeyChecking=no".into(),
                    "-o".into(),
                    "UserKnownHostsFile=/dev/null".into(),
                    "-o".into(),
                    format!("ServerAliveInterval={keepalive}"),
                    "-o".into(),
                    "ServerAliveCountMax=5".into(),
                    "-p".into(),
                    port.to_string(),
                ];
                if let Some(identity) = identity {
                    args.push("-i".into());
                    args.push(identity.clone());
                }
                for option in options {
                    args.push("-o".into());
                    args.push(option.clone());
                }
                args.push(match user {
                    Some(user) => format!("{user}@{host}"),
                    None => host.clone(),
                });
                ("ssh".into(), args)
            }
            TransportRecipe::Telnet { host, port } => {
                ("telnet".into(), vec![host.clone(), port.to_string()])
            }
            TransportRecipe::Serial {
                device,
                baud,
                bridge,
            } => match bridge.as_str() {
                "microcom" => (
                    "microcom".into(),
                    vec!["-s".into(), baud.to_string(), device.clone()],
                ),
                "screen" => ("screen".into(), vec![device.clone(), baud.to_string()]),
                _ => (
                    "picocom".into(),
                    vec!["-b".into(), baud.to_string(), device.clone()],
                ),
            },
            TransportRecipe::Command { program, args } => (program.clone(), args.clone()),
        }
    }

    /// Signal that the bridge itself is up, when it prints one.
    pub fn default_ready(&self) -> Option<Pattern> {
        match self {
            TransportRecipe::Telnet { .. } => Some(Pattern::exact("Escape character is")),
            TransportRecipe::Serial { bridge, .. } if bridge == "picocom" => {
                Some(Pattern::exact("Terminal ready"))
            }
            TransportRecipe::Ssh { .. } => Pattern::regex(r"[$#>]\s*$").ok(),
            _ => None,
        }
    }

    /// True when spawning the process is all it takes to be live.
    pub fn live_on_spawn(&self) -> bool {
        matches!(
            self,
            TransportRecipe::Local { .. } | TransportRecipe::Command { .. }
        )
    }

    /// Messages that mean the connection failed.
    pub fn failure_signals(&self) -> Result<Vec<Pattern>, PatternError> {
        let mut signals: Vec<Pattern> = COMMON_FAILURES.iter().map(|s| Pattern::exact(*s)).collect();
        match self {
            TransportRecipe::Ssh { .. } => {
                signals.push(Pattern::exact("Permission denied"));
                signals.push(Pattern::exact("Host key verification failed"));
            }
            TransportRecipe::Telnet { .. } => {
                signals.push(Pattern::exact("Connection closed by foreign host"));
                signals.push(Pattern::regex(r"(?i)port .*in use")?);
            }
            TransportRecipe::Serial { .. } => {
                signals.push(Pattern::exact("Device or resource busy"));
                signals.push(Pattern::exact("already in use"));
                signals.push(Pattern::regex(r"FATAL: cannot (open|lock)")?);
                signals.push(Pattern::exact("No such file or directory"));
            }
            TransportRecipe::Local { .. } | TransportRecipe::Command { .. } => {}
        }
        Ok(signals)
    }
}

fn parse_param<T: std::str::FromStr>(
    params: &BTreeMap<String, String>,
    key: &str,
) -> Result<Option<T>, ConfigError> {
    params
        .get(key)
        .map(|v| {
            v.trim().parse::<T>().map_err(|_| ConfigError::InvalidParam {
                param: key.to_string(),
                value: v.clone(),
            })
        })
        .transpose()
}

fn split_words(s: &str) -> Vec<String> {
    s.split_whitespace().map(str::to_string).collect()
}
