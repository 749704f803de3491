//! Subcommands that drive the engine headlessly.
//!
//! Each command runs one engine operation and returns its result as JSON. Session
//! games are not exposed: a process exits between commands, so a session could
//! never be acted on.

use crate::engine::NodeEngine;
use anyhow::{bail, Context, Result};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command as Cli};
use mora_execution::{GameParams, PendingResult};
use mora_types::casino::{Currency, EconomicEffect, UserId};
use serde_json::{json, Value};
use tracing::debug;

#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    Balance { user: UserId },
    Grant { user: UserId, effect: EconomicEffect },
    Play { user: UserId, bet: u64, params: GameParams },
    Open { user: UserId, chest: String },
    Wish { user: UserId, pulls: u32 },
    Rob { robber: UserId, victim: UserId },
    Daily { user: UserId },
    Pay { from: UserId, to: UserId, amount: u64 },
}

fn user_arg(name: &'static str) -> Arg {
    Arg::new(name)
        .required(true)
        .value_parser(value_parser!(u64))
}

/// Argument parser for the `node` binary.
pub fn cli() -> Cli {
    Cli::new("mora-node")
        .about("Headless runner for the mora economy engine.")
        .arg(Arg::new("config").long("config").required(true))
        .arg(
            Arg::new("dry-run")
                .long("dry-run")
                .help("Validate config and exit without touching the ledger")
                .action(ArgAction::SetTrue),
        )
        .subcommand_required(false)
        .subcommand(
            Cli::new("balance")
                .about("Show a profile")
                .arg(user_arg("user")),
        )
        .subcommand(
            Cli::new("grant")
                .about("Admin grant; negative amounts debit")
                .arg(user_arg("user"))
                .arg(
                    Arg::new("mora")
                        .long("mora")
                        .allow_negative_numbers(true)
                        .value_parser(value_parser!(i64)),
                )
                .arg(
                    Arg::new("dust")
                        .long("dust")
                        .allow_negative_numbers(true)
                        .value_parser(value_parser!(i64)),
                )
                .arg(
                    Arg::new("fates")
                        .long("fates")
                        .allow_negative_numbers(true)
                        .value_parser(value_parser!(i64)),
                )
                .arg(Arg::new("exp").long("exp").value_parser(value_parser!(u64)))
                .arg(
                    Arg::new("item")
                        .long("item")
                        .help("item=quantity")
                        .action(ArgAction::Append),
                ),
        )
        .subcommand(
            Cli::new("play")
                .about("Play an instant game")
                .arg(user_arg("user"))
                .arg(Arg::new("game").required(true))
                .arg(
                    Arg::new("bet")
                        .required(true)
                        .value_parser(value_parser!(u64)),
                )
                .arg(
                    Arg::new("with")
                        .long("with")
                        .help("Game choices as a JSON object, e.g. {\"side\":\"heads\"}"),
                ),
        )
        .subcommand(
            Cli::new("open")
                .about("Open a chest")
                .arg(user_arg("user"))
                .arg(Arg::new("chest").required(true)),
        )
        .subcommand(
            Cli::new("wish")
                .about("Spend fates on the banner")
                .arg(user_arg("user"))
                .arg(
                    Arg::new("pulls")
                        .long("pulls")
                        .default_value("1")
                        .value_parser(value_parser!(u32)),
                ),
        )
        .subcommand(
            Cli::new("rob")
                .about("Attempt a robbery")
                .arg(user_arg("robber"))
                .arg(user_arg("victim")),
        )
        .subcommand(
            Cli::new("daily")
                .about("Claim the daily reward")
                .arg(user_arg("user")),
        )
        .subcommand(
            Cli::new("pay")
                .about("Send mora")
                .arg(user_arg("from"))
                .arg(user_arg("to"))
                .arg(
                    Arg::new("amount")
                        .required(true)
                        .value_parser(value_parser!(u64)),
                ),
        )
}

fn user(matches: &ArgMatches, name: &str) -> Result<UserId> {
    matches
        .get_one::<u64>(name)
        .copied()
        .map(UserId)
        .with_context(|| format!("missing {name}"))
}

fn parse_item(value: &str) -> Result<(String, i64)> {
    let (item, quantity) = value
        .split_once('=')
        .with_context(|| format!("expected item=quantity, got {value}"))?;
    let quantity = quantity
        .parse::<i64>()
        .with_context(|| format!("invalid quantity for {item}"))?;
    Ok((item.to_string(), quantity))
}

/// Build game parameters from the game name and an optional JSON object of choices.
pub fn parse_params(game: &str, with: Option<&str>) -> Result<GameParams> {
    let mut value = match with {
        Some(raw) => serde_json::from_str::<Value>(raw).context("--with must be JSON")?,
        None => json!({}),
    };
    let Some(object) = value.as_object_mut() else {
        bail!("--with must be a JSON object");
    };
    object.insert("game".to_string(), Value::String(game.to_string()));
    serde_json::from_value(value).with_context(|| format!("invalid choices for {game}"))
}

impl Command {
    /// `None` when no subcommand was given.
    pub fn from_matches(matches: &ArgMatches) -> Result<Option<Self>> {
        let Some((name, sub)) = matches.subcommand() else {
            return Ok(None);
        };
        let command = match name {
            "balance" => Command::Balance {
                user: user(sub, "user")?,
            },
            "grant" => {
                let mut effect = EconomicEffect::new();
                for (flag, currency) in [
                    ("mora", Currency::Mora),
                    ("dust", Currency::Dust),
                    ("fates", Currency::Fates),
                ] {
                    if let Some(amount) = sub.get_one::<i64>(flag) {
                        effect.add_currency(currency, *amount);
                    }
                }
                if let Some(exp) = sub.get_one::<u64>("exp") {
                    effect.exp = *exp;
                }
                for raw in sub.get_many::<String>("item").into_iter().flatten() {
                    let (item, quantity) = parse_item(raw)?;
                    effect.add_item(item, quantity);
                }
                if effect.is_empty() {
                    bail!("grant needs at least one of --mora, --dust, --fates, --exp, --item");
                }
                Command::Grant {
                    user: user(sub, "user")?,
                    effect,
                }
            }
            "play" => {
                let game = sub.get_one::<String>("game").context("missing game")?;
                let params =
                    parse_params(game, sub.get_one::<String>("with").map(String::as_str))?;
                if params.kind().is_session() {
                    bail!("{game} is a session game and cannot be played from the command line");
                }
                Command::Play {
                    user: user(sub, "user")?,
                    bet: *sub.get_one::<u64>("bet").context("missing bet")?,
                    params,
                }
            }
            "open" => Command::Open {
                user: user(sub, "user")?,
                chest: sub
                    .get_one::<String>("chest")
                    .context("missing chest")?
                    .clone(),
            },
            "wish" => Command::Wish {
                user: user(sub, "user")?,
                pulls: *sub.get_one::<u32>("pulls").context("missing pulls")?,
            },
            "rob" => Command::Rob {
                robber: user(sub, "robber")?,
                victim: user(sub, "victim")?,
            },
            "daily" => Command::Daily {
                user: user(sub, "user")?,
            },
            "pay" => Command::Pay {
                from: user(sub, "from")?,
                to: user(sub, "to")?,
                amount: *sub.get_one::<u64>("amount").context("missing amount")?,
            },
            other => bail!("unknown subcommand {other}"),
        };
        Ok(Some(command))
    }
}

/// Run one command and return its JSON result.
pub async fn run(engine: &NodeEngine, command: Command) -> Result<Value> {
    debug!(?command, "running command");
    let value = match command {
        Command::Balance { user } => serde_json::to_value(engine.profile(user)?)?,
        Command::Grant { user, effect } => serde_json::to_value(engine.grant(user, effect).await?)?,
        Command::Play { user, bet, params } => {
            let kind = params.kind();
            match engine.invoke_game(user, kind, bet, params).await? {
                PendingResult::Instant(play) => serde_json::to_value(play)?,
                PendingResult::Session(view) => {
                    bail!("{kind} opened session {} unexpectedly", view.id)
                }
            }
        }
        Command::Open { user, chest } => serde_json::to_value(engine.open_chest(user, &chest).await?)?,
        Command::Wish { user, pulls } => serde_json::to_value(engine.wish(user, pulls).await?)?,
        Command::Rob { robber, victim } => serde_json::to_value(engine.rob(robber, victim).await?)?,
        Command::Daily { user } => serde_json::to_value(engine.claim_daily(user).await?)?,
        Command::Pay { from, to, amount } => {
            serde_json::to_value(engine.pay(from, to, amount).await?)?
        }
    };
    Ok(value)
}
