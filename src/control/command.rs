//! Parsing and applying control requests.

use std::{
    fmt,
    net::{AddrParseError, SocketAddr},
    str::FromStr,
};

use thiserror::Error;

use crate::{
    frame::{LabelField, ValidationError, validate::encode_label},
    subscription::SubscriptionRegistry,
};

/// Why a control line was refused.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ControlError {
    #[error("empty request")]
    Empty,
    #[error("malformed pair {token:?}: expected key=value")]
    Malformed { token: String },
    #[error("key {key:?} given twice")]
    DuplicateKey { key: String },
    #[error("missing {key:?}")]
    MissingField { key: &'static str },
    #[error("unexpected key {key:?} for this command")]
    UnexpectedKey { key: String },
    #[error("unknown command {command:?}")]
    UnknownCommand { command: String },
    #[error("invalid address {value:?}: {source}")]
    InvalidAddress {
        value: String,
        #[source]
        source: AddrParseError,
    },
    #[error("invalid flow: {0}")]
    InvalidFlow(#[from] ValidationError),
    #[error("request exceeds {max} bytes")]
    LineTooLong { max: usize },
}

/// A parsed control request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ControlCommand {
    Subscribe { flow: String, address: SocketAddr },
    Unsubscribe { flow: String },
    List,
}

impl FromStr for ControlCommand {
    type Err = ControlError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let pairs = Pairs::parse(line)?;
        let command = pairs.require("command")?;
        match command.to_ascii_lowercase().as_str() {
            "subscribe" => {
                pairs.only(&["command", "flow", "address"])?;
                let flow = checked_flow(pairs.require("flow")?)?;
                let value = pairs.require("address")?;
                let address = value.parse().map_err(|source| ControlError::InvalidAddress {
                    value: value.to_owned(),
                    source,
                })?;
                Ok(Self::Subscribe { flow, address })
            }
            "unsubscribe" => {
                pairs.only(&["command", "flow"])?;
                let flow = checked_flow(pairs.require("flow")?)?;
                Ok(Self::Unsubscribe { flow })
            }
            "list" => {
                pairs.only(&["command"])?;
                Ok(Self::List)
            }
            _ => Err(ControlError::UnknownCommand {
                command: command.to_owned(),
            }),
        }
    }
}

/// Renders the request line, without the terminating newline.
impl fmt::Display for ControlCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Subscribe { flow, address } => {
                write!(f, "command=subscribe flow={flow} address={address}")
            }
            Self::Unsubscribe { flow } => write!(f, "command=unsubscribe flow={flow}"),
            Self::List => f.write_str("command=list"),
        }
    }
}

impl ControlCommand {
    /// Apply the request to `registry`.
    #[must_use]
    pub fn apply(self, registry: &SubscriptionRegistry) -> ControlReply {
        match self {
            Self::Subscribe { flow, address } => {
                let replaced = registry.subscribe(flow.clone(), address);
                ControlReply::Subscribed {
                    flow,
                    address,
                    replaced,
                }
            }
            Self::Unsubscribe { flow } => {
                let removed = registry.unsubscribe(&flow);
                ControlReply::Unsubscribed { flow, removed }
            }
            Self::List => ControlReply::Listing(registry.list()),
        }
    }
}

/// Successful outcome of a request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ControlReply {
    Subscribed {
        flow: String,
        address: SocketAddr,
        replaced: Option<SocketAddr>,
    },
    Unsubscribed {
        flow: String,
        removed: Option<SocketAddr>,
    },
    Listing(Vec<(String, SocketAddr)>),
}

impl fmt::Display for ControlReply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Subscribed {
                flow,
                address,
                replaced,
            } => {
                write!(f, "status=ok flow={flow} address={address}")?;
                if let Some(previous) = replaced {
                    write!(f, " replaced={previous}")?;
                }
                Ok(())
            }
            Self::Unsubscribed { flow, removed } => {
                write!(f, "status=ok flow={flow} removed={}", removed.is_some())
            }
            Self::Listing(entries) => {
                write!(f, "status=ok count={} flows=", entries.len())?;
                for (index, (flow, address)) in entries.iter().enumerate() {
                    if index > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{flow}@{address}")?;
                }
                Ok(())
            }
        }
    }
}

/// Reply line for a refused request.
pub(crate) fn error_reply(err: &ControlError) -> String { format!("status=error reason={err}") }

/// Parse and apply one line, producing the reply line.
pub(crate) fn handle_line(line: &str, registry: &SubscriptionRegistry) -> String {
    match line.parse::<ControlCommand>() {
        Ok(command) => command.apply(registry).to_string(),
        Err(err) => error_reply(&err),
    }
}

fn checked_flow(flow: &str) -> Result<String, ControlError> {
    encode_label(flow, LabelField::Flow)?;
    Ok(flow.to_owned())
}

/// The `key=value` pairs of one request line.
///
/// Keys compare without regard to ASCII case. Any token that is not a pair
/// refuses the whole line rather than being skipped.
struct Pairs<'a>(Vec<(&'a str, &'a str)>);

impl<'a> Pairs<'a> {
    fn parse(line: &'a str) -> Result<Self, ControlError> {
        let mut pairs: Vec<(&str, &str)> = Vec::new();
        for token in line.split_whitespace() {
            let (key, value) = token
                .split_once('=')
                .filter(|(key, _)| !key.is_empty())
                .ok_or_else(|| ControlError::Malformed {
                    token: token.to_owned(),
                })?;
            if pairs.iter().any(|(seen, _)| seen.eq_ignore_ascii_case(key)) {
                return Err(ControlError::DuplicateKey {
                    key: key.to_owned(),
                });
            }
            pairs.push((key, value));
        }
        if pairs.is_empty() {
            return Err(ControlError::Empty);
        }
        Ok(Self(pairs))
    }

    fn require(&self, key: &'static str) -> Result<&'a str, ControlError> {
        self.0
            .iter()
            .find_map(|(k, v)| k.eq_ignore_ascii_case(key).then_some(*v))
            .ok_or(ControlError::MissingField { key })
    }

    fn only(&self, allowed: &[&str]) -> Result<(), ControlError> {
        let unexpected = self
            .0
            .iter()
            .find(|(key, _)| !allowed.iter().any(|name| name.eq_ignore_ascii_case(key)));
        match unexpected {
            Some((key, _)) => Err(ControlError::UnexpectedKey {
                key: (*key).to_owned(),
            }),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;

    use rstest::rstest;

    use super::{ControlCommand, ControlError, ControlReply, handle_line};
    use crate::{
        frame::{LabelError, LabelField, ValidationError},
        subscription::SubscriptionRegistry,
    };

    fn addr(port: u16) -> SocketAddr { SocketAddr::from(([127, 0, 0, 1], port)) }

    #[rstest]
    #[case::subscribe(
        "command=subscribe flow=video1 address=127.0.0.1:5000",
        ControlCommand::Subscribe { flow: "video1".into(), address: addr(5000) },
    )]
    #[case::reordered_pairs(
        "  address=127.0.0.1:5000   flow=video1 command=subscribe ",
        ControlCommand::Subscribe { flow: "video1".into(), address: addr(5000) },
    )]
    #[case::unsubscribe("command=unsubscribe flow=audio1", ControlCommand::Unsubscribe { flow: "audio1".into() })]
    #[case::list("command=list", ControlCommand::List)]
    #[case::upper_case_keys(
        "COMMAND=Subscribe Flow=video1 ADDRESS=127.0.0.1:5000",
        ControlCommand::Subscribe { flow: "video1".into(), address: addr(5000) },
    )]
    #[case::upper_case_list("Command=LIST", ControlCommand::List)]
    fn parses_requests(#[case] line: &str, #[case] expected: ControlCommand) {
        assert_eq!(line.parse::<ControlCommand>(), Ok(expected));
    }

    #[rstest]
    #[case::empty("   ", ControlError::Empty)]
    #[case::bare_word("command=list now", ControlError::Malformed { token: "now".into() })]
    #[case::empty_key("=list", ControlError::Malformed { token: "=list".into() })]
    #[case::duplicate("command=list command=list", ControlError::DuplicateKey { key: "command".into() })]
    #[case::duplicate_any_case("command=list COMMAND=list", ControlError::DuplicateKey { key: "COMMAND".into() })]
    #[case::malformed_among_pairs(
        "command=unsubscribe junk flow=video1",
        ControlError::Malformed { token: "junk".into() },
    )]
    #[case::no_command("flow=video1", ControlError::MissingField { key: "command" })]
    #[case::no_address("command=subscribe flow=video1", ControlError::MissingField { key: "address" })]
    #[case::unknown("command=reboot", ControlError::UnknownCommand { command: "reboot".into() })]
    #[case::extra_key("command=list flow=video1", ControlError::UnexpectedKey { key: "flow".into() })]
    #[case::flow_too_wide(
        "command=unsubscribe flow=video_stream",
        ControlError::InvalidFlow(ValidationError::Label {
            field: LabelField::Flow,
            source: LabelError::TooLong { len: 12 },
        }),
    )]
    fn refuses_bad_requests(#[case] line: &str, #[case] expected: ControlError) {
        assert_eq!(line.parse::<ControlCommand>(), Err(expected));
    }

    #[test]
    fn refuses_unparseable_addresses() {
        let err = "command=subscribe flow=video1 address=localhost"
            .parse::<ControlCommand>()
            .expect_err("not an ip:port");
        assert!(matches!(err, ControlError::InvalidAddress { value, .. } if value == "localhost"));
    }

    #[rstest]
    #[case(ControlCommand::Subscribe { flow: "video1".into(), address: addr(5000) })]
    #[case(ControlCommand::Unsubscribe { flow: "video1".into() })]
    #[case(ControlCommand::List)]
    fn rendered_requests_parse_back(#[case] command: ControlCommand) {
        assert_eq!(command.to_string().parse::<ControlCommand>(), Ok(command));
    }

    #[test]
    fn applies_requests_to_the_registry() {
        let registry = SubscriptionRegistry::new();
        let reply = ControlCommand::Subscribe {
            flow: "video1".into(),
            address: addr(5000),
        }
        .apply(&registry);
        assert_eq!(
            reply,
            ControlReply::Subscribed {
                flow: "video1".into(),
                address: addr(5000),
                replaced: None
            }
        );
        assert_eq!(registry.lookup("video1"), Some(addr(5000)));
    }

    #[test]
    fn replies_render_as_lines() {
        let registry = SubscriptionRegistry::new();
        assert_eq!(
            handle_line("command=subscribe flow=video1 address=127.0.0.1:5000", &registry),
            "status=ok flow=video1 address=127.0.0.1:5000"
        );
        assert_eq!(
            handle_line("command=subscribe flow=video1 address=127.0.0.1:6000", &registry),
            "status=ok flow=video1 address=127.0.0.1:6000 replaced=127.0.0.1:5000"
        );
        handle_line("command=subscribe flow=audio1 address=127.0.0.1:5002", &registry);
        assert_eq!(
            handle_line("command=list", &registry),
            "status=ok count=2 flows=audio1@127.0.0.1:5002,video1@127.0.0.1:6000"
        );
        assert_eq!(
            handle_line("command=unsubscribe flow=audio1", &registry),
            "status=ok flow=audio1 removed=true"
        );
        assert_eq!(
            handle_line("command=unsubscribe flow=audio1", &registry),
            "status=ok flow=audio1 removed=false"
        );
        assert_eq!(
            handle_line("command=reboot", &registry),
            "status=error reason=unknown command \"reboot\""
        );
    }
}
