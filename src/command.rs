//! Trading command vocabulary and its two codecs: the line format used by
//! workload files and the JSON wire envelope carried across the broker.
//!
//! A workload line looks like `[1] ADD,oY01WVirLr,63511.53` — an annotation
//! prefix the parser discards, then a comma-separated body whose first field
//! selects the kind and whose remaining fields are positional.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One trading instruction. Each variant carries exactly the fields that are
/// legal for its kind; a decoder never produces a partially populated value.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Add { user: String, amount: Decimal },
    Buy { user: String, stock: String, amount: Decimal },
    Sell { user: String, stock: String, amount: Decimal },
    CommitBuy { user: String },
    CancelBuy { user: String },
    CommitSell { user: String },
    CancelSell { user: String },
    SetBuyAmount { user: String, stock: String, amount: Decimal },
    SetBuyTrigger { user: String, stock: String, amount: Decimal },
    SetSellAmount { user: String, stock: String, amount: Decimal },
    SetSellTrigger { user: String, stock: String, amount: Decimal },
    CancelSetBuy { user: String, stock: String },
    CancelSetSell { user: String, stock: String },
    Quote { user: String, stock: String },
    /// `user` is absent for the system-wide dump.
    DumpLog { user: Option<String>, filename: String },
    DisplaySummary { user: String },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    #[error("line has no annotation/body split: {0:?}")]
    MalformedLine(String),
    #[error("unknown command kind: {0}")]
    UnknownCommand(String),
    #[error("{kind} expects {expected} body fields, got {got}")]
    ArityMismatch {
        kind: &'static str,
        expected: &'static str,
        got: usize,
    },
    #[error("{kind} amount field is not a decimal: {raw:?}")]
    InvalidAmount { kind: &'static str, raw: String },
}

impl Command {
    /// Canonical kind tag, as it appears in workload files and on the wire.
    pub fn kind(&self) -> &'static str {
        match self {
            Command::Add { .. } => "ADD",
            Command::Buy { .. } => "BUY",
            Command::Sell { .. } => "SELL",
            Command::CommitBuy { .. } => "COMMIT_BUY",
            Command::CancelBuy { .. } => "CANCEL_BUY",
            Command::CommitSell { .. } => "COMMIT_SELL",
            Command::CancelSell { .. } => "CANCEL_SELL",
            Command::SetBuyAmount { .. } => "SET_BUY_AMOUNT",
            Command::SetBuyTrigger { .. } => "SET_BUY_TRIGGER",
            Command::SetSellAmount { .. } => "SET_SELL_AMOUNT",
            Command::SetSellTrigger { .. } => "SET_SELL_TRIGGER",
            Command::CancelSetBuy { .. } => "CANCEL_SET_BUY",
            Command::CancelSetSell { .. } => "CANCEL_SET_SELL",
            Command::Quote { .. } => "QUOTE",
            Command::DumpLog { .. } => "DUMPLOG",
            Command::DisplaySummary { .. } => "DISPLAY_SUMMARY",
        }
    }

    /// Decode one full workload line, annotation prefix included.
    pub fn decode(line: &str) -> Result<Command, DecodeError> {
        let trimmed = line.trim();
        let (_annotation, body) = trimmed
            .split_once(char::is_whitespace)
            .ok_or_else(|| DecodeError::MalformedLine(line.to_string()))?;
        Self::decode_body(body.trim())
    }

    /// Decode the CSV body of a line (everything after the annotation).
    pub fn decode_body(body: &str) -> Result<Command, DecodeError> {
        let mut split = body.split(',');
        let kind = split.next().unwrap_or_default();
        let fields: Vec<&str> = split.collect();

        match kind {
            "ADD" => user_amount(&fields, "ADD", |user, amount| Command::Add { user, amount }),
            "BUY" => user_stock_amount(&fields, "BUY", |user, stock, amount| Command::Buy {
                user,
                stock,
                amount,
            }),
            "SELL" => user_stock_amount(&fields, "SELL", |user, stock, amount| Command::Sell {
                user,
                stock,
                amount,
            }),
            "COMMIT_BUY" => user_only(&fields, "COMMIT_BUY", |user| Command::CommitBuy { user }),
            "CANCEL_BUY" => user_only(&fields, "CANCEL_BUY", |user| Command::CancelBuy { user }),
            "COMMIT_SELL" => user_only(&fields, "COMMIT_SELL", |user| Command::CommitSell { user }),
            "CANCEL_SELL" => user_only(&fields, "CANCEL_SELL", |user| Command::CancelSell { user }),
            "SET_BUY_AMOUNT" => {
                user_stock_amount(&fields, "SET_BUY_AMOUNT", |user, stock, amount| {
                    Command::SetBuyAmount {
                        user,
                        stock,
                        amount,
                    }
                })
            }
            "SET_BUY_TRIGGER" => {
                user_stock_amount(&fields, "SET_BUY_TRIGGER", |user, stock, amount| {
                    Command::SetBuyTrigger {
                        user,
                        stock,
                        amount,
                    }
                })
            }
            "SET_SELL_AMOUNT" => {
                user_stock_amount(&fields, "SET_SELL_AMOUNT", |user, stock, amount| {
                    Command::SetSellAmount {
                        user,
                        stock,
                        amount,
                    }
                })
            }
            "SET_SELL_TRIGGER" => {
                user_stock_amount(&fields, "SET_SELL_TRIGGER", |user, stock, amount| {
                    Command::SetSellTrigger {
                        user,
                        stock,
                        amount,
                    }
                })
            }
            "CANCEL_SET_BUY" => user_stock(&fields, "CANCEL_SET_BUY", |user, stock| {
                Command::CancelSetBuy { user, stock }
            }),
            "CANCEL_SET_SELL" => user_stock(&fields, "CANCEL_SET_SELL", |user, stock| {
                Command::CancelSetSell { user, stock }
            }),
            "QUOTE" => user_stock(&fields, "QUOTE", |user, stock| Command::Quote { user, stock }),
            // DUMPLOG is irregular: two arities, disambiguated on count alone
            // because both fields are free-form strings.
            "DUMPLOG" => match fields.as_slice() {
                [filename] => Ok(Command::DumpLog {
                    user: None,
                    filename: (*filename).to_string(),
                }),
                [user, filename] => Ok(Command::DumpLog {
                    user: Some((*user).to_string()),
                    filename: (*filename).to_string(),
                }),
                _ => Err(DecodeError::ArityMismatch {
                    kind: "DUMPLOG",
                    expected: "1 or 2",
                    got: fields.len(),
                }),
            },
            "DISPLAY_SUMMARY" => user_only(&fields, "DISPLAY_SUMMARY", |user| {
                Command::DisplaySummary { user }
            }),
            other => Err(DecodeError::UnknownCommand(other.to_string())),
        }
    }

    /// Encode back to the CSV body form. `decode("[n] " + encode())` is the
    /// identity for every well-formed command.
    pub fn encode(&self) -> String {
        match self {
            Command::Add { user, amount } => format!("ADD,{user},{amount}"),
            Command::Buy {
                user,
                stock,
                amount,
            } => format!("BUY,{user},{stock},{amount}"),
            Command::Sell {
                user,
                stock,
                amount,
            } => format!("SELL,{user},{stock},{amount}"),
            Command::CommitBuy { user } => format!("COMMIT_BUY,{user}"),
            Command::CancelBuy { user } => format!("CANCEL_BUY,{user}"),
            Command::CommitSell { user } => format!("COMMIT_SELL,{user}"),
            Command::CancelSell { user } => format!("CANCEL_SELL,{user}"),
            Command::SetBuyAmount {
                user,
                stock,
                amount,
            } => format!("SET_BUY_AMOUNT,{user},{stock},{amount}"),
            Command::SetBuyTrigger {
                user,
                stock,
                amount,
            } => format!("SET_BUY_TRIGGER,{user},{stock},{amount}"),
            Command::SetSellAmount {
                user,
                stock,
                amount,
            } => format!("SET_SELL_AMOUNT,{user},{stock},{amount}"),
            Command::SetSellTrigger {
                user,
                stock,
                amount,
            } => format!("SET_SELL_TRIGGER,{user},{stock},{amount}"),
            Command::CancelSetBuy { user, stock } => format!("CANCEL_SET_BUY,{user},{stock}"),
            Command::CancelSetSell { user, stock } => format!("CANCEL_SET_SELL,{user},{stock}"),
            Command::Quote { user, stock } => format!("QUOTE,{user},{stock}"),
            Command::DumpLog {
                user: Some(user),
                filename,
            } => format!("DUMPLOG,{user},{filename}"),
            Command::DumpLog {
                user: None,
                filename,
            } => format!("DUMPLOG,{filename}"),
            Command::DisplaySummary { user } => format!("DISPLAY_SUMMARY,{user}"),
        }
    }

    pub fn to_wire(&self) -> WireCommand {
        WireCommand::from(self)
    }
}

fn parse_amount(kind: &'static str, raw: &str) -> Result<Decimal, DecodeError> {
    raw.parse().map_err(|_| DecodeError::InvalidAmount {
        kind,
        raw: raw.to_string(),
    })
}

fn user_only(
    fields: &[&str],
    kind: &'static str,
    build: impl FnOnce(String) -> Command,
) -> Result<Command, DecodeError> {
    match fields {
        [user] => Ok(build((*user).to_string())),
        _ => Err(DecodeError::ArityMismatch {
            kind,
            expected: "1",
            got: fields.len(),
        }),
    }
}

fn user_stock(
    fields: &[&str],
    kind: &'static str,
    build: impl FnOnce(String, String) -> Command,
) -> Result<Command, DecodeError> {
    match fields {
        [user, stock] => Ok(build((*user).to_string(), (*stock).to_string())),
        _ => Err(DecodeError::ArityMismatch {
            kind,
            expected: "2",
            got: fields.len(),
        }),
    }
}

fn user_amount(
    fields: &[&str],
    kind: &'static str,
    build: impl FnOnce(String, Decimal) -> Command,
) -> Result<Command, DecodeError> {
    match fields {
        [user, amount] => Ok(build((*user).to_string(), parse_amount(kind, amount)?)),
        _ => Err(DecodeError::ArityMismatch {
            kind,
            expected: "2",
            got: fields.len(),
        }),
    }
}

fn user_stock_amount(
    fields: &[&str],
    kind: &'static str,
    build: impl FnOnce(String, String, Decimal) -> Command,
) -> Result<Command, DecodeError> {
    match fields {
        [user, stock, amount] => Ok(build(
            (*user).to_string(),
            (*stock).to_string(),
            parse_amount(kind, amount)?,
        )),
        _ => Err(DecodeError::ArityMismatch {
            kind,
            expected: "3",
            got: fields.len(),
        }),
    }
}

/// Flat wire shape of a command: `{kind, user?, stock?, amount?, filename?}`.
/// Absent fields are omitted from the JSON rather than sent empty, so the
/// envelope stays self-describing across schema growth.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WireCommand {
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stock: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum WireError {
    #[error("unknown command kind on the wire: {0}")]
    UnknownKind(String),
    #[error("{kind} envelope is missing required field `{field}`")]
    MissingField { kind: String, field: &'static str },
    #[error("{kind} envelope carries illegal field `{field}`")]
    UnexpectedField { kind: String, field: &'static str },
}

impl From<&Command> for WireCommand {
    fn from(command: &Command) -> Self {
        let kind = command.kind().to_string();
        let blank = WireCommand {
            kind,
            user: None,
            stock: None,
            amount: None,
            filename: None,
        };
        match command.clone() {
            Command::Add { user, amount } => WireCommand {
                user: Some(user),
                amount: Some(amount),
                ..blank
            },
            Command::Buy {
                user,
                stock,
                amount,
            }
            | Command::Sell {
                user,
                stock,
                amount,
            }
            | Command::SetBuyAmount {
                user,
                stock,
                amount,
            }
            | Command::SetBuyTrigger {
                user,
                stock,
                amount,
            }
            | Command::SetSellAmount {
                user,
                stock,
                amount,
            }
            | Command::SetSellTrigger {
                user,
                stock,
                amount,
            } => WireCommand {
                user: Some(user),
                stock: Some(stock),
                amount: Some(amount),
                ..blank
            },
            Command::CommitBuy { user }
            | Command::CancelBuy { user }
            | Command::CommitSell { user }
            | Command::CancelSell { user }
            | Command::DisplaySummary { user } => WireCommand {
                user: Some(user),
                ..blank
            },
            Command::CancelSetBuy { user, stock }
            | Command::CancelSetSell { user, stock }
            | Command::Quote { user, stock } => WireCommand {
                user: Some(user),
                stock: Some(stock),
                ..blank
            },
            Command::DumpLog { user, filename } => WireCommand {
                user,
                filename: Some(filename),
                ..blank
            },
        }
    }
}

impl TryFrom<WireCommand> for Command {
    type Error = WireError;

    fn try_from(wire: WireCommand) -> Result<Self, WireError> {
        let WireCommand {
            kind,
            user,
            stock,
            amount,
            filename,
        } = wire;

        let require_user = |user: Option<String>| {
            user.ok_or(WireError::MissingField {
                kind: kind.clone(),
                field: "user",
            })
        };
        let require_stock = |stock: Option<String>| {
            stock.ok_or(WireError::MissingField {
                kind: kind.clone(),
                field: "stock",
            })
        };
        let require_amount = |amount: Option<Decimal>| {
            amount.ok_or(WireError::MissingField {
                kind: kind.clone(),
                field: "amount",
            })
        };
        let forbid = |present: bool, field: &'static str| {
            if present {
                Err(WireError::UnexpectedField {
                    kind: kind.clone(),
                    field,
                })
            } else {
                Ok(())
            }
        };

        match kind.as_str() {
            "ADD" => {
                forbid(stock.is_some(), "stock")?;
                forbid(filename.is_some(), "filename")?;
                Ok(Command::Add {
                    user: require_user(user)?,
                    amount: require_amount(amount)?,
                })
            }
            "BUY" | "SELL" | "SET_BUY_AMOUNT" | "SET_BUY_TRIGGER" | "SET_SELL_AMOUNT"
            | "SET_SELL_TRIGGER" => {
                forbid(filename.is_some(), "filename")?;
                let user = require_user(user)?;
                let stock = require_stock(stock)?;
                let amount = require_amount(amount)?;
                Ok(match kind.as_str() {
                    "BUY" => Command::Buy {
                        user,
                        stock,
                        amount,
                    },
                    "SELL" => Command::Sell {
                        user,
                        stock,
                        amount,
                    },
                    "SET_BUY_AMOUNT" => Command::SetBuyAmount {
                        user,
                        stock,
                        amount,
                    },
                    "SET_BUY_TRIGGER" => Command::SetBuyTrigger {
                        user,
                        stock,
                        amount,
                    },
                    "SET_SELL_AMOUNT" => Command::SetSellAmount {
                        user,
                        stock,
                        amount,
                    },
                    _ => Command::SetSellTrigger {
                        user,
                        stock,
                        amount,
                    },
                })
            }
            "COMMIT_BUY" | "CANCEL_BUY" | "COMMIT_SELL" | "CANCEL_SELL" | "DISPLAY_SUMMARY" => {
                forbid(stock.is_some(), "stock")?;
                forbid(amount.is_some(), "amount")?;
                forbid(filename.is_some(), "filename")?;
                let user = require_user(user)?;
                Ok(match kind.as_str() {
                    "COMMIT_BUY" => Command::CommitBuy { user },
                    "CANCEL_BUY" => Command::CancelBuy { user },
                    "COMMIT_SELL" => Command::CommitSell { user },
                    "CANCEL_SELL" => Command::CancelSell { user },
                    _ => Command::DisplaySummary { user },
                })
            }
            "QUOTE" | "CANCEL_SET_BUY" | "CANCEL_SET_SELL" => {
                forbid(amount.is_some(), "amount")?;
                forbid(filename.is_some(), "filename")?;
                let user = require_user(user)?;
                let stock = require_stock(stock)?;
                Ok(match kind.as_str() {
                    "QUOTE" => Command::Quote { user, stock },
                    "CANCEL_SET_BUY" => Command::CancelSetBuy { user, stock },
                    _ => Command::CancelSetSell { user, stock },
                })
            }
            "DUMPLOG" => {
                forbid(stock.is_some(), "stock")?;
                forbid(amount.is_some(), "amount")?;
                let filename = filename.ok_or(WireError::MissingField {
                    kind: kind.clone(),
                    field: "filename",
                })?;
                Ok(Command::DumpLog { user, filename })
            }
            other => Err(WireError::UnknownKind(other.to_string())),
        }
    }
}
